use keel_model::{Registry, RegistryError, RegistryIndex, ReleaseEntry, ReleaseSelector};
use std::collections::BTreeMap;

fn write_registry(dir: &std::path::Path) {
    let mut v1 = BTreeMap::new();
    v1.insert("Event_events".into(), "Event".into());
    let mut deprecations = BTreeMap::new();
    deprecations.insert("v1".into(), v1);
    for (label, semver) in [("rel_1_25", "1.25.0"), ("rel_1_26", "1.26.0")] {
        let entry = ReleaseEntry {
            release: label.into(),
            semver: semver.into(),
            default_version: "v1".into(),
            versions: vec!["v1".into(), "v1beta1".into()],
            deprecations: deprecations.clone(),
        };
        std::fs::write(
            dir.join(format!("{label}.json")),
            serde_json::to_string_pretty(&entry).unwrap(),
        )
        .unwrap();
    }
    let index = RegistryIndex {
        default_release: Some("rel_1_26".into()),
        releases: vec!["rel_1_25".into(), "rel_1_26".into()],
    };
    std::fs::write(
        dir.join("index.json"),
        serde_json::to_string_pretty(&index).unwrap(),
    )
    .unwrap();
}

#[test]
fn load_and_resolve() {
    let tmp = tempfile::tempdir().unwrap();
    write_registry(tmp.path());
    let registry = Registry::load_dir(tmp.path()).unwrap();
    assert_eq!(registry.default_release(), Some("rel_1_26"));
    assert_eq!(registry.releases().count(), 2);

    let selector = ReleaseSelector::new();
    let r = registry.resolve(&selector, None, None, "Event_events").unwrap();
    assert_eq!((r.release.as_str(), r.version.as_str(), r.name.as_str()), ("rel_1_26", "v1", "Event"));

    selector.set_global(Some("rel_1_25"));
    let r = registry.resolve(&selector, None, Some("v1beta1"), "Pod").unwrap();
    assert_eq!(r.release, "rel_1_25");
    assert_eq!(r.version, "v1beta1");

    {
        let _g = selector.override_thread("rel_1_26");
        let r = registry.resolve(&selector, None, None, "Pod").unwrap();
        assert_eq!(r.release, "rel_1_26");
        let r = registry.resolve(&selector, Some("rel_1_25"), None, "Pod").unwrap();
        assert_eq!(r.release, "rel_1_25");
    }

    assert!(matches!(
        registry.resolve(&selector, Some("rel_9"), None, "Pod"),
        Err(RegistryError::UnknownRelease(_))
    ));
}

#[test]
fn thread_override_does_not_leak() {
    let selector = ReleaseSelector::with_default("rel_1_25");
    let _g = selector.override_thread("rel_1_26");
    let other = selector.clone();
    let seen = std::thread::spawn(move || other.current(None).map(|r| r.to_string()))
        .join()
        .unwrap();
    assert_eq!(seen.as_deref(), Some("rel_1_25"));
    assert_eq!(selector.current(None).as_deref(), Some("rel_1_26"));
}

#[test]
fn missing_directory_is_load_error() {
    let tmp = tempfile::tempdir().unwrap();
    assert!(matches!(
        Registry::load_dir(tmp.path().join("nope")),
        Err(RegistryError::Load { .. })
    ));
}

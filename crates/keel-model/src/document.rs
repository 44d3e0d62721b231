//! Capability trait carried by every top-level (document) type.

use crate::error::RegistryError;

/// A top-level, independently addressable resource type.
///
/// Generated document structs implement this with the `apiVersion`/`kind`
/// pair from their schema, and read `metadata.name`/`metadata.namespace`
/// when an object-metadata field exists.
pub trait Document {
    /// `group/version`, or just `version` for the core group
    const API_VERSION: &'static str;
    /// Resource kind, e.g. `Pod`
    const KIND: &'static str;

    /// `metadata.name`, when set
    fn name(&self) -> Option<&str> {
        None
    }

    /// `metadata.namespace`, when set
    fn namespace(&self) -> Option<&str> {
        None
    }
}

/// Split an api version into `(group, version)`; the core group is `""`.
pub fn split_api_version(api_version: &str) -> (&str, &str) {
    match api_version.rsplit_once('/') {
        Some((group, version)) => (group, version),
        None => ("", api_version),
    }
}

/// Whether `version` looks like `v1`, `v2beta1`, `v1alpha3`
pub fn is_version_segment(version: &str) -> bool {
    let Some(rest) = version.strip_prefix('v') else {
        return false;
    };
    let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return false;
    }
    let tail = &rest[digits..];
    if tail.is_empty() {
        return true;
    }
    let stage = tail
        .strip_prefix("alpha")
        .or_else(|| tail.strip_prefix("beta"));
    matches!(stage, Some(n) if !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
}

/// Check the structural markers of a document type.
///
/// Used by [`KindRegistry`](crate::registry::KindRegistry) when user-defined
/// types extend the generated model.
pub fn validate_markers<T: Document + ?Sized>() -> Result<(), RegistryError> {
    let type_name = std::any::type_name::<T>();
    if T::KIND.is_empty() {
        return Err(RegistryError::MalformedDocument {
            type_name,
            reason: "KIND is empty".into(),
        });
    }
    if T::API_VERSION.is_empty() {
        return Err(RegistryError::MalformedDocument {
            type_name,
            reason: "API_VERSION is empty".into(),
        });
    }
    let (_, version) = split_api_version(T::API_VERSION);
    if !is_version_segment(version) {
        return Err(RegistryError::MalformedDocument {
            type_name,
            reason: format!("API_VERSION {:?} has no version segment", T::API_VERSION),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_segments() {
        assert!(is_version_segment("v1"));
        assert!(is_version_segment("v2beta1"));
        assert!(is_version_segment("v1alpha3"));
        assert!(!is_version_segment("v1beta"));
        assert!(!is_version_segment("stable"));
        assert!(!is_version_segment("v"));
    }

    #[test]
    fn test_split_api_version() {
        assert_eq!(split_api_version("v1"), ("", "v1"));
        assert_eq!(split_api_version("batch/v1beta1"), ("batch", "v1beta1"));
    }
}

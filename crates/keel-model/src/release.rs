//! Release selection with explicit, thread-local and process-global layers.
//!
//! Precedence is explicit argument > thread-local override > global default.
//! Reads of the global default take no lock in the steady state: each thread
//! caches the value together with the epoch it was read at, and only goes back
//! to the lock after a writer bumped the epoch. Cache entries of dropped
//! selectors are removed on the dropping thread and pruned lazily elsewhere.

use std::cell::RefCell;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, RwLock, Weak};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static GLOBAL_CACHE: RefCell<HashMap<u64, CachedGlobal>> = RefCell::new(HashMap::new());
    static OVERRIDES: RefCell<HashMap<u64, Vec<Arc<str>>>> = RefCell::new(HashMap::new());
}

/// A thread's copy of one selector's global default
#[derive(Debug)]
struct CachedGlobal {
    owner: Weak<Shared>,
    epoch: u64,
    value: Option<Arc<str>>,
}

#[derive(Debug)]
struct Shared {
    id: u64,
    epoch: AtomicU64,
    global: RwLock<Option<Arc<str>>>,
}

impl Drop for Shared {
    fn drop(&mut self) {
        let id = self.id;
        let _ = GLOBAL_CACHE.try_with(|cache| cache.borrow_mut().remove(&id));
    }
}

/// Injectable release selector.
///
/// Clones share the same global default and thread overrides.
#[derive(Debug, Clone)]
pub struct ReleaseSelector {
    shared: Arc<Shared>,
}

impl Default for ReleaseSelector {
    fn default() -> Self {
        Self::new()
    }
}

impl ReleaseSelector {
    /// Selector with no global default
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
                epoch: AtomicU64::new(0),
                global: RwLock::new(None),
            }),
        }
    }

    /// Selector whose global default is `release`
    pub fn with_default(release: &str) -> Self {
        let selector = Self::new();
        selector.set_global(Some(release));
        selector
    }

    /// Replace the process-global default; `None` clears it
    pub fn set_global(&self, release: Option<&str>) {
        let mut slot = self
            .shared
            .global
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = release.map(Arc::from);
        self.shared.epoch.fetch_add(1, Ordering::Release);
        #[cfg(feature = "tracing")]
        tracing::debug!(selector = self.shared.id, release = ?release, "global release changed");
    }

    /// Current global default
    pub fn global(&self) -> Option<Arc<str>> {
        let id = self.shared.id;
        let epoch = self.shared.epoch.load(Ordering::Acquire);
        let cached = GLOBAL_CACHE.with(|cache| {
            cache
                .borrow()
                .get(&id)
                .filter(|entry| entry.epoch == epoch)
                .map(|entry| entry.value.clone())
        });
        if let Some(value) = cached {
            return value;
        }

        let (epoch, value) = {
            let slot = self
                .shared
                .global
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            (self.shared.epoch.load(Ordering::Acquire), slot.clone())
        };
        GLOBAL_CACHE.with(|cache| {
            let mut cache = cache.borrow_mut();
            cache.retain(|_, entry| entry.owner.strong_count() > 0);
            cache.insert(
                id,
                CachedGlobal {
                    owner: Arc::downgrade(&self.shared),
                    epoch,
                    value: value.clone(),
                },
            );
        });
        value
    }

    /// Override the release for the current thread until the guard drops.
    ///
    /// Guards nest; dropping the inner one restores the outer override.
    pub fn override_thread(&self, release: &str) -> ThreadOverride {
        let id = self.shared.id;
        OVERRIDES.with(|o| o.borrow_mut().entry(id).or_default().push(Arc::from(release)));
        ThreadOverride {
            id,
            _not_send: PhantomData,
        }
    }

    /// Innermost override on the current thread
    pub fn thread_override(&self) -> Option<Arc<str>> {
        let id = self.shared.id;
        OVERRIDES.with(|o| o.borrow().get(&id).and_then(|stack| stack.last().cloned()))
    }

    /// Effective release for a lookup
    pub fn current(&self, explicit: Option<&str>) -> Option<Arc<str>> {
        if let Some(explicit) = explicit {
            return Some(Arc::from(explicit));
        }
        self.thread_override().or_else(|| self.global())
    }
}

/// Scoped thread-local override returned by [`ReleaseSelector::override_thread`].
#[must_use = "the override ends when the guard is dropped"]
#[derive(Debug)]
pub struct ThreadOverride {
    id: u64,
    _not_send: PhantomData<*const ()>,
}

impl Drop for ThreadOverride {
    fn drop(&mut self) {
        let id = self.id;
        let _ = OVERRIDES.try_with(|o| {
            let mut map = o.borrow_mut();
            if let Some(stack) = map.get_mut(&id) {
                stack.pop();
                if stack.is_empty() {
                    map.remove(&id);
                }
            }
        });
    }
}

/// Process-wide selector for callers that do not inject their own
pub fn process_selector() -> &'static ReleaseSelector {
    static SELECTOR: OnceLock<ReleaseSelector> = OnceLock::new();
    SELECTOR.get_or_init(ReleaseSelector::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precedence() {
        let sel = ReleaseSelector::with_default("rel_a");
        assert_eq!(sel.current(None).as_deref(), Some("rel_a"));
        {
            let _g = sel.override_thread("rel_b");
            assert_eq!(sel.current(None).as_deref(), Some("rel_b"));
            assert_eq!(sel.current(Some("rel_c")).as_deref(), Some("rel_c"));
            {
                let _inner = sel.override_thread("rel_d");
                assert_eq!(sel.current(None).as_deref(), Some("rel_d"));
            }
            assert_eq!(sel.current(None).as_deref(), Some("rel_b"));
        }
        assert_eq!(sel.current(None).as_deref(), Some("rel_a"));
    }

    #[test]
    fn test_global_change_invalidates_cache() {
        let sel = ReleaseSelector::new();
        assert_eq!(sel.global(), None);
        sel.set_global(Some("rel_a"));
        assert_eq!(sel.global().as_deref(), Some("rel_a"));
        sel.set_global(Some("rel_b"));
        assert_eq!(sel.global().as_deref(), Some("rel_b"));
        sel.set_global(None);
        assert_eq!(sel.global(), None);
    }

    #[test]
    fn test_selectors_are_independent() {
        let a = ReleaseSelector::with_default("rel_a");
        let b = ReleaseSelector::with_default("rel_b");
        let _g = a.override_thread("rel_x");
        assert_eq!(b.current(None).as_deref(), Some("rel_b"));
    }

    fn cached(id: u64) -> bool {
        GLOBAL_CACHE.with(|cache| cache.borrow().contains_key(&id))
    }

    #[test]
    fn test_dropped_selector_leaves_no_cache_entry() {
        let sel = ReleaseSelector::with_default("rel_a");
        let id = sel.shared.id;
        assert_eq!(sel.global().as_deref(), Some("rel_a"));
        assert!(cached(id));
        let clone = sel.clone();
        drop(sel);
        assert!(cached(id));
        drop(clone);
        assert!(!cached(id));
    }

    #[test]
    fn test_entry_of_selector_dropped_elsewhere_is_pruned() {
        let sel = ReleaseSelector::with_default("rel_a");
        let id = sel.shared.id;
        assert_eq!(sel.global().as_deref(), Some("rel_a"));
        let last = sel.clone();
        drop(sel);
        std::thread::spawn(move || drop(last)).join().unwrap();
        assert!(cached(id));

        let other = ReleaseSelector::with_default("rel_b");
        assert_eq!(other.global().as_deref(), Some("rel_b"));
        assert!(!cached(id));
    }
}

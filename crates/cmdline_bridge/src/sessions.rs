//! Fronts shared by several local consumers, keyed by target.

use std::{cell::RefCell, collections::BTreeMap, fmt, rc::Rc};

use tracing::{debug, trace};

use crate::front::RequisitionFront;

struct SessionEntry {
    front: Rc<RequisitionFront>,
    leases: usize,
}

type Entries<K> = Rc<RefCell<BTreeMap<K, SessionEntry>>>;

/// Keyed cache of fronts with lease counting.
///
/// The first [`SessionCache::connect`] for a key opens the front; later ones share it. The front is
/// disconnected exactly once, when its last [`SessionLease`] goes away.
pub struct SessionCache<K> {
    entries: Entries<K>,
}

impl<K> Default for SessionCache<K> {
    fn default() -> Self {
        Self {
            entries: Rc::new(RefCell::new(BTreeMap::new())),
        }
    }
}

impl<K> Clone for SessionCache<K> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
        }
    }
}

impl<K: Ord + Clone + fmt::Debug> SessionCache<K> {
    /// Empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Leases the front for `key`, calling `open` only when no live lease exists.
    pub fn connect(&self, key: K, open: impl FnOnce() -> RequisitionFront) -> SessionLease<K> {
        let shared = self.entries.borrow_mut().get_mut(&key).map(|entry| {
            entry.leases += 1;
            trace!(key = ?key, leases = entry.leases, "sharing bridge session");
            entry.front.clone()
        });
        let front = match shared {
            Some(front) => front,
            None => {
                let front = Rc::new(open());
                debug!(key = ?key, "opened bridge session");
                self.entries.borrow_mut().insert(
                    key.clone(),
                    SessionEntry {
                        front: front.clone(),
                        leases: 1,
                    },
                );
                front
            }
        };
        SessionLease {
            entries: self.entries.clone(),
            key,
            front,
        }
    }

    /// Live leases for `key`.
    pub fn lease_count(&self, key: &K) -> usize {
        self.entries.borrow().get(key).map_or(0, |entry| entry.leases)
    }

    /// Number of open sessions.
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    /// Whether no session is open.
    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

/// One consumer's claim on a shared front. Dropping it releases the claim.
pub struct SessionLease<K: Ord + Clone + fmt::Debug> {
    entries: Entries<K>,
    key: K,
    front: Rc<RequisitionFront>,
}

impl<K: Ord + Clone + fmt::Debug> SessionLease<K> {
    /// Shared front.
    pub fn front(&self) -> &Rc<RequisitionFront> {
        &self.front
    }

    /// Target key.
    pub fn key(&self) -> &K {
        &self.key
    }

    /// Releases the lease now.
    pub fn disconnect(self) {}
}

impl<K: Ord + Clone + fmt::Debug> Drop for SessionLease<K> {
    fn drop(&mut self) {
        let released = {
            let mut entries = self.entries.borrow_mut();
            let remaining = entries.get_mut(&self.key).map(|entry| {
                entry.leases = entry.leases.saturating_sub(1);
                entry.leases
            });
            match remaining {
                Some(0) => entries.remove(&self.key),
                _ => None,
            }
        };
        if let Some(entry) = released {
            debug!(key = ?self.key, "last lease released, closing bridge session");
            entry.front.disconnect();
        }
    }
}

impl<K: Ord + Clone + fmt::Debug> fmt::Debug for SessionLease<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionLease").field("key", &self.key).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::TransportError,
        transport::{Transport, TransportFuture},
    };
    use futures::stream::LocalBoxStream;
    use pretty_assertions::assert_eq;
    use std::cell::Cell;

    #[derive(Default)]
    struct CountingTransport {
        closes: Rc<Cell<usize>>,
    }

    impl Transport for CountingTransport {
        fn request<'a>(&'a self, _frame: String) -> TransportFuture<'a, Result<String, TransportError>> {
            Box::pin(async { Err(TransportError::Closed) })
        }

        fn events(&self) -> Option<LocalBoxStream<'static, String>> {
            None
        }

        fn close(&self) {
            self.closes.set(self.closes.get() + 1);
        }
    }

    fn opener(opens: &Rc<Cell<usize>>, closes: &Rc<Cell<usize>>) -> impl FnOnce() -> RequisitionFront {
        let opens = opens.clone();
        let closes = closes.clone();
        move || {
            opens.set(opens.get() + 1);
            RequisitionFront::new(Rc::new(CountingTransport { closes }))
        }
    }

    #[test]
    fn shared_front_closes_once_on_last_release() {
        let cache = SessionCache::new();
        let opens = Rc::new(Cell::new(0));
        let closes = Rc::new(Cell::new(0));

        let first = cache.connect("tab-1", opener(&opens, &closes));
        let second = cache.connect("tab-1", opener(&opens, &closes));
        assert!(Rc::ptr_eq(first.front(), second.front()));
        assert_eq!(opens.get(), 1);
        assert_eq!(cache.lease_count(&"tab-1"), 2);

        drop(first);
        assert_eq!(cache.lease_count(&"tab-1"), 1);
        assert_eq!(closes.get(), 0);

        second.disconnect();
        assert_eq!(closes.get(), 1);
        assert!(cache.is_empty());

        let third = cache.connect("tab-1", opener(&opens, &closes));
        assert_eq!(opens.get(), 2);
        assert_eq!(third.key(), &"tab-1");
    }

    #[test]
    fn keys_do_not_share_fronts() {
        let cache = SessionCache::new();
        let opens = Rc::new(Cell::new(0));
        let closes = Rc::new(Cell::new(0));
        let left = cache.connect(1_u32, opener(&opens, &closes));
        let right = cache.connect(2_u32, opener(&opens, &closes));
        assert_eq!(cache.len(), 2);
        assert!(!Rc::ptr_eq(left.front(), right.front()));

        drop(left);
        assert_eq!(closes.get(), 1);
        assert_eq!(cache.lease_count(&1), 0);
        assert_eq!(cache.lease_count(&2), 1);
    }

    #[test]
    fn leases_outlive_the_cache_handle() {
        let opens = Rc::new(Cell::new(0));
        let closes = Rc::new(Cell::new(0));
        let lease = {
            let cache = SessionCache::new();
            cache.connect("tab", opener(&opens, &closes))
        };
        assert_eq!(closes.get(), 0);
        drop(lease);
        assert_eq!(closes.get(), 1);
    }
}

//! Request cache for fast-path callbacks.
//!
//! Requests satisfied in-process (see [`Operation::is_fast_path`]) never touch
//! the completion bus. Their callbacks are parked here under
//! `{client id, conversation id, request id}` and resolved directly by the
//! notifier. There is no expiry: an entry whose request never completes stays
//! until it is removed or the owning context is torn down.
//!
//! [`Operation::is_fast_path`]: optube_core::Operation::is_fast_path

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use optube_core::RequestId;
use parking_lot::Mutex;

use super::error::CacheError;
use super::listener::BoxedCallback;

/// Cache key. The conversation id is part of the key; callers that do not
/// scope a request to a conversation use `None` on both sides.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub client_id: String,
    pub conversation_id: Option<String>,
    pub request_id: RequestId,
}

impl CacheKey {
    #[must_use]
    pub fn new(client_id: &str, conversation_id: Option<&str>, request_id: RequestId) -> Self {
        Self {
            client_id: client_id.to_string(),
            conversation_id: conversation_id.map(str::to_string),
            request_id,
        }
    }
}

/// Concurrent map from [`CacheKey`] to a parked callback.
#[derive(Default)]
pub struct RequestCache {
    // Mutex only so the map is `Sync`; a callback is unwrapped on removal.
    entries: DashMap<CacheKey, Mutex<BoxedCallback>>,
}

impl RequestCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parks `callback` under the given key.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::KeyInUse` if the key already holds a callback.
    pub fn put(
        &self,
        client_id: &str,
        conversation_id: Option<&str>,
        request_id: RequestId,
        callback: BoxedCallback,
    ) -> Result<(), CacheError> {
        match self
            .entries
            .entry(CacheKey::new(client_id, conversation_id, request_id))
        {
            Entry::Occupied(_) => Err(CacheError::KeyInUse {
                client_id: client_id.to_string(),
                request_id: request_id.get(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(Mutex::new(callback));
                Ok(())
            }
        }
    }

    /// Removes and returns the callback for the key, if present.
    #[must_use]
    pub fn take(
        &self,
        client_id: &str,
        conversation_id: Option<&str>,
        request_id: RequestId,
    ) -> Option<BoxedCallback> {
        self.entries
            .remove(&CacheKey::new(client_id, conversation_id, request_id))
            .map(|(_, callback)| callback.into_inner())
    }

    /// Drops the entry for the key without invoking it. Idempotent; returns
    /// whether an entry was removed.
    pub fn remove(
        &self,
        client_id: &str,
        conversation_id: Option<&str>,
        request_id: RequestId,
    ) -> bool {
        self.take(client_id, conversation_id, request_id).is_some()
    }

    #[must_use]
    pub fn contains(
        &self,
        client_id: &str,
        conversation_id: Option<&str>,
        request_id: RequestId,
    ) -> bool {
        self.entries
            .contains_key(&CacheKey::new(client_id, conversation_id, request_id))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every entry without invoking it. Returns how many were dropped.
    pub fn clear(&self) -> usize {
        let keys: Vec<CacheKey> = self.entries.iter().map(|e| e.key().clone()).collect();
        keys.into_iter()
            .filter(|key| self.entries.remove(key).is_some())
            .count()
    }
}

impl std::fmt::Debug for RequestCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestCache")
            .field("len", &self.entries.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::dispatch::listener::callback;

    fn noop() -> BoxedCallback {
        callback(|_| {})
    }

    #[test]
    fn take_removes_entry() {
        let cache = RequestCache::new();
        cache.put("u1", None, RequestId(42), noop()).unwrap();
        assert!(cache.contains("u1", None, RequestId(42)));

        assert!(cache.take("u1", None, RequestId(42)).is_some());
        assert!(cache.take("u1", None, RequestId(42)).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn remove_is_idempotent() {
        let cache = RequestCache::new();
        cache.put("u1", Some("c1"), RequestId(7), noop()).unwrap();

        assert!(cache.remove("u1", Some("c1"), RequestId(7)));
        assert!(!cache.remove("u1", Some("c1"), RequestId(7)));
        assert!(cache.take("u1", Some("c1"), RequestId(7)).is_none());
    }

    #[test]
    fn conversation_is_part_of_the_key() {
        let cache = RequestCache::new();
        cache.put("u1", Some("c1"), RequestId(1), noop()).unwrap();

        assert!(cache.take("u1", None, RequestId(1)).is_none());
        assert!(cache.take("u1", Some("c2"), RequestId(1)).is_none());
        assert!(cache.take("u2", Some("c1"), RequestId(1)).is_none());
        assert!(cache.take("u1", Some("c1"), RequestId(1)).is_some());
    }

    #[test]
    fn duplicate_put_is_rejected() {
        let cache = RequestCache::new();
        cache.put("u1", None, RequestId(3), noop()).unwrap();
        let err = cache.put("u1", None, RequestId(3), noop()).unwrap_err();
        assert_eq!(
            err,
            CacheError::KeyInUse {
                client_id: "u1".into(),
                request_id: 3
            }
        );
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn entries_persist_until_removed() {
        let cache = RequestCache::new();
        cache.put("u1", None, RequestId(9), noop()).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));
        assert!(cache.contains("u1", None, RequestId(9)));
    }

    #[test]
    fn concurrent_put_take_remove() {
        let cache = Arc::new(RequestCache::new());
        let hits = Arc::new(AtomicU32::new(0));

        let handles: Vec<_> = (0..8_u64)
            .map(|t| {
                let cache = Arc::clone(&cache);
                let hits = Arc::clone(&hits);
                std::thread::spawn(move || {
                    let client = format!("u{t}");
                    for id in 1..=250 {
                        let hits = Arc::clone(&hits);
                        cache
                            .put(
                                &client,
                                None,
                                RequestId(id),
                                callback(move |_| {
                                    hits.fetch_add(1, Ordering::SeqCst);
                                }),
                            )
                            .unwrap();
                    }
                    for id in 1..=250 {
                        if id % 5 == 0 {
                            assert!(cache.remove(&client, None, RequestId(id)));
                        } else {
                            let cb = cache.take(&client, None, RequestId(id)).unwrap();
                            cb(Ok(None));
                        }
                        assert!(cache.take(&client, None, RequestId(id)).is_none());
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(hits.load(Ordering::SeqCst), 8 * 200);
        assert!(cache.is_empty());
    }

    #[test]
    fn clear_never_invokes_callbacks() {
        let calls = Arc::new(AtomicU32::new(0));
        let cache = RequestCache::new();
        for id in 1..=4 {
            let calls = Arc::clone(&calls);
            cache
                .put(
                    "u1",
                    None,
                    RequestId(id),
                    callback(move |_| {
                        calls.fetch_add(1, Ordering::SeqCst);
                    }),
                )
                .unwrap();
        }
        assert_eq!(cache.clear(), 4);
        assert!(cache.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}

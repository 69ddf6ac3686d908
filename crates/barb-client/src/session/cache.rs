//! Bounded in-memory history cache.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use barb_protocol::Message;

/// Conversation id -> message list, evicting the least recently *set* entry.
///
/// Reads do not refresh an entry; only [`HistoryCache::set`] does.
#[derive(Debug)]
pub struct HistoryCache {
    capacity: usize,
    inner: Mutex<CacheInner>,
}

#[derive(Debug, Default)]
struct CacheInner {
    entries: HashMap<String, Vec<Message>>,
    /// Oldest write at the front.
    order: VecDeque<String>,
}

impl HistoryCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(CacheInner::default()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn lock(&self) -> MutexGuard<'_, CacheInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, conversation_id: &str) -> Option<Vec<Message>> {
        self.lock().entries.get(conversation_id).cloned()
    }

    /// Store `messages`, making the entry the most recent one.
    pub fn set(&self, conversation_id: &str, messages: Vec<Message>) {
        if self.capacity == 0 {
            return;
        }
        let mut inner = self.lock();
        if inner.entries.contains_key(conversation_id) {
            inner.order.retain(|id| id != conversation_id);
        }
        inner.entries.insert(conversation_id.to_string(), messages);
        inner.order.push_back(conversation_id.to_string());

        while inner.order.len() > self.capacity {
            if let Some(evicted) = inner.order.pop_front() {
                log::debug!("evicting cached history for {}", evicted);
                inner.entries.remove(&evicted);
            }
        }
    }

    pub fn contains(&self, conversation_id: &str) -> bool {
        self.lock().entries.contains_key(conversation_id)
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cached ids, oldest write first.
    pub fn keys(&self) -> Vec<String> {
        self.lock().order.iter().cloned().collect()
    }
}

impl Default for HistoryCache {
    fn default() -> Self {
        Self::new(super::DEFAULT_CACHE_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history(conv: &str) -> Vec<Message> {
        vec![Message::user(conv, "hi")]
    }

    #[test]
    fn test_evicts_least_recently_set() {
        let cache = HistoryCache::new(3);
        cache.set("a", history("a"));
        cache.set("b", history("b"));
        cache.set("c", history("c"));

        // A read does not protect "a".
        assert!(cache.get("a").is_some());
        cache.set("d", history("d"));
        assert!(!cache.contains("a"));
        assert_eq!(cache.keys(), vec!["b", "c", "d"]);
    }

    #[test]
    fn test_overwrite_refreshes_position() {
        let cache = HistoryCache::new(2);
        cache.set("a", history("a"));
        cache.set("b", history("b"));
        cache.set("a", vec![]);
        cache.set("c", history("c"));

        assert_eq!(cache.keys(), vec!["a", "c"]);
        assert_eq!(cache.get("a"), Some(vec![]));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_default_capacity_bound() {
        let cache = HistoryCache::default();
        for i in 0..11 {
            cache.set(&format!("conv-{i}"), history("x"));
        }
        assert_eq!(cache.len(), 10);
        assert!(!cache.contains("conv-0"));
        assert!(cache.contains("conv-10"));
    }

    #[test]
    fn test_zero_capacity_stores_nothing() {
        let cache = HistoryCache::new(0);
        cache.set("a", history("a"));
        assert!(cache.is_empty());
    }
}

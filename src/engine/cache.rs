//! Short-lived result cache keyed by destination and task.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

use super::executor::ExecutionResult;
use crate::task::Task;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub destination: String,
    pub task_id: i64,
}

impl CacheKey {
    pub fn for_task(task: &Task) -> Self {
        Self {
            destination: task.destination.clone(),
            task_id: task.id,
        }
    }
}

struct CacheEntry {
    result: ExecutionResult,
    created_at: Instant,
}

/// TTL-bounded map of unsuppressed results. Suppression is applied by the
/// reader, so a judged-not-showable alert is still served from here.
pub struct ResponseCache {
    entries: HashMap<CacheKey, CacheEntry>,
    ttl: Duration,
    max_size: usize,
}

impl ResponseCache {
    pub fn new(ttl: Duration, max_size: usize) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
            max_size: max_size.max(1),
        }
    }

    /// Fresh entry for `key`. Expired entries are dropped on the way.
    pub fn get(&mut self, key: &CacheKey) -> Option<ExecutionResult> {
        let entry = self.entries.get(key)?;
        if entry.created_at.elapsed() > self.ttl {
            self.entries.remove(key);
            tracing::debug!(
                destination = %key.destination,
                task_id = key.task_id,
                "Cached response expired"
            );
            return None;
        }
        Some(entry.result.clone())
    }

    /// Store a result. Failures are refused; returns whether it was stored.
    pub fn insert(&mut self, key: CacheKey, result: ExecutionResult) -> bool {
        if !result.is_cacheable() {
            tracing::debug!(task_id = key.task_id, "Skipping cache for failed result");
            return false;
        }
        if !self.entries.contains_key(&key) && self.entries.len() >= self.max_size {
            self.evict_oldest();
        }
        self.entries.insert(
            key,
            CacheEntry {
                result,
                created_at: Instant::now(),
            },
        );
        true
    }

    fn evict_oldest(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.created_at)
            .map(|(key, _)| key.clone());
        if let Some(key) = oldest {
            self.entries.remove(&key);
            tracing::info!(task_id = key.task_id, "Removed oldest cache entry");
        }
    }

    /// Drop every expired entry. Returns how many went.
    pub fn sweep_expired(&mut self) -> usize {
        let ttl = self.ttl;
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.created_at.elapsed() <= ttl);
        let cleared = before - self.entries.len();
        if cleared > 0 {
            tracing::info!("Cleared {} expired cache entries", cleared);
        }
        cleared
    }

    /// Forget every entry for `task_id`, whatever its destination.
    pub fn invalidate_task(&mut self, task_id: i64) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| key.task_id != task_id);
        let cleared = before - self.entries.len();
        if cleared > 0 {
            tracing::info!(task_id, "Cleared cache for task");
        }
        cleared
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

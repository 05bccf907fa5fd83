use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};

use super::url_key;

const FAILURE_PENALTY: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskSource {
    Initial,
    Discovered,
    Persona,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageTask {
    pub url: String,
    pub priority: u32,
    pub source: TaskSource,
    pub metadata: Value,
    pub added_at: DateTime<Utc>,
    // Insertion order; breaks priority ties deterministically.
    pub sequence: u64,
    pub attempts: u32,
}

impl PageTask {
    pub fn new(url: impl Into<String>, priority: u32, source: TaskSource) -> Self {
        Self {
            url: url.into(),
            priority,
            source,
            metadata: Value::Null,
            added_at: Utc::now(),
            sequence: 0,
            attempts: 0,
        }
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Pages waiting to be explored, ordered by priority then insertion.
///
/// A URL lives in exactly one of queued, processing or completed. Completed
/// URLs can never be queued again; failed ones go back with lower priority.
#[derive(Debug, Default)]
pub struct WorkQueue {
    queue: Vec<PageTask>,
    processing: HashMap<String, PageTask>,
    completed: HashSet<String>,
    next_sequence: u64,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    // Returns false when the URL is already queued, processing or completed.
    pub fn enqueue(&mut self, mut task: PageTask) -> bool {
        let key = url_key(&task.url);
        if self.contains(&key) {
            return false;
        }

        task.sequence = self.bump_sequence();
        self.insert_sorted(task);
        true
    }

    pub fn dequeue(&mut self) -> Option<PageTask> {
        if self.queue.is_empty() {
            return None;
        }
        let mut task = self.queue.remove(0);
        task.attempts += 1;
        self.processing.insert(url_key(&task.url), task.clone());
        Some(task)
    }

    pub fn complete(&mut self, url: &str) {
        let key = url_key(url);
        self.processing.remove(&key);
        self.queue.retain(|t| url_key(&t.url) != key);
        self.completed.insert(key);
    }

    pub fn fail(&mut self, url: &str) -> Option<u32> {
        let key = url_key(url);
        let mut task = self.processing.remove(&key)?;
        task.priority = task.priority.saturating_sub(FAILURE_PENALTY);
        task.sequence = self.bump_sequence();
        let priority = task.priority;
        self.insert_sorted(task);
        Some(priority)
    }

    pub fn size(&self) -> usize {
        self.queue.len()
    }

    pub fn processing_count(&self) -> usize {
        self.processing.len()
    }

    pub fn completed_count(&self) -> usize {
        self.completed.len()
    }

    pub fn is_idle(&self) -> bool {
        self.queue.is_empty() && self.processing.is_empty()
    }

    pub fn contains(&self, url: &str) -> bool {
        let key = url_key(url);
        self.completed.contains(&key)
            || self.processing.contains_key(&key)
            || self.queue.iter().any(|t| url_key(&t.url) == key)
    }

    pub fn peek(&self) -> Option<&PageTask> {
        self.queue.first()
    }

    fn bump_sequence(&mut self) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        sequence
    }

    fn insert_sorted(&mut self, task: PageTask) {
        let rank = |t: &PageTask| (t.priority, Reverse(t.sequence));
        let index = self.queue.partition_point(|t| rank(t) > rank(&task));
        self.queue.insert(index, task);
    }
}

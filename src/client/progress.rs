use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::watch;

/// Immutable view of in-flight files and their last known percentage
pub type ProgressSnapshot = Arc<BTreeMap<String, u8>>;

/// Latest progress per file name.
///
/// Only the orchestrator writes to it. Every change publishes a fresh
/// snapshot, so readers never observe a map while it is being modified.
#[derive(Debug)]
pub struct ProgressTracker {
    entries: BTreeMap<String, u8>,
    publisher: watch::Sender<ProgressSnapshot>,
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressTracker {
    pub fn new() -> Self {
        let (publisher, _) = watch::channel(ProgressSnapshot::default());
        Self {
            entries: BTreeMap::new(),
            publisher,
        }
    }

    /// Replaces the stored value. `None` keeps the last known value, or 0 for
    /// a file that has not reported yet. Returns the value now stored.
    pub fn update(&mut self, file_name: &str, percent: Option<u8>) -> u8 {
        let value = match percent {
            Some(p) => p.min(100),
            None => self.entries.get(file_name).copied().unwrap_or(0),
        };
        self.entries.insert(file_name.to_string(), value);
        self.publish();
        value
    }

    /// Drops a file once its terminal record arrived
    pub fn finish(&mut self, file_name: &str) {
        if self.entries.remove(file_name).is_some() {
            self.publish();
        }
    }

    pub fn clear(&mut self) {
        if !self.entries.is_empty() {
            self.entries.clear();
            self.publish();
        }
    }

    pub fn get(&self, file_name: &str) -> Option<u8> {
        self.entries.get(file_name).copied()
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        Arc::clone(&self.publisher.borrow())
    }

    pub fn subscribe(&self) -> watch::Receiver<ProgressSnapshot> {
        self.publisher.subscribe()
    }

    fn publish(&self) {
        // send_replace works without any live receiver
        self.publisher.send_replace(Arc::new(self.entries.clone()));
    }
}

use std::sync::{Arc, Mutex};

use libpack::engine::LifecycleEvent;
use libpack::ui::Reporter;

/// Reporter that keeps every lifecycle event. Clones share the log.
#[derive(Debug, Clone, Default)]
pub struct RecordingReporter {
    events: Arc<Mutex<Vec<LifecycleEvent>>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Generations that reported `Completed`, in order.
    pub fn completed(&self) -> Vec<u64> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                LifecycleEvent::Completed { generation, .. } => Some(generation),
                _ => None,
            })
            .collect()
    }

    /// Generations that reported `Started`, in order.
    pub fn started(&self) -> Vec<u64> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                LifecycleEvent::Started { generation } => Some(generation),
                _ => None,
            })
            .collect()
    }

    /// Aggregate progress values, in order.
    pub fn progress(&self) -> Vec<u64> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                LifecycleEvent::Progress { completed, .. } => Some(completed),
                _ => None,
            })
            .collect()
    }
}

impl Reporter for RecordingReporter {
    fn report(&mut self, event: &LifecycleEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

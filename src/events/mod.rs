// events/mod.rs
use dashmap::DashMap;

pub const SCAN_COMPLETED: &str = "scan_completed";
pub const SCAN_FAILED: &str = "scan_failed";
pub const DEVICE_SELECTED: &str = "device_selected";
pub const COMMAND_FINISHED: &str = "command_finished";

type Callback = Box<dyn Fn(serde_json::Value) + Send + Sync>;

/// In-process fan-out of session events (scans, selections, commands).
#[derive(Default)]
pub struct EventBus {
    subscribers: DashMap<String, Vec<Callback>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscribers: DashMap::new(),
        }
    }

    /// Callbacks run synchronously on the publishing task and must not subscribe.
    pub fn publish(&self, event_type: &str, data: serde_json::Value) {
        if let Some(subscribers) = self.subscribers.get(event_type) {
            for callback in subscribers.iter() {
                (callback)(data.clone());
            }
        }
    }

    pub fn subscribe<F: Fn(serde_json::Value) + Send + Sync + 'static>(
        &self,
        event_type: &str,
        callback: F,
    ) {
        self.subscribers
            .entry(event_type.to_string())
            .or_default()
            .push(Box::new(callback));
    }
}

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Event key type
pub type EventKey = String;

/// Reconstruction phase.
///
/// Phases advance strictly in declaration order; `Failed` may only follow
/// `Reconciling` for integrity failures, while environmental errors
/// (I/O, cancellation) can end any phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Start,
    ExtractingArchive,
    ExtractingBaseline,
    Reconciling,
    Sealing,
    Done,
    Failed,
}

impl Phase {
    /// Whether `next` is a legal successor of `self`.
    pub fn can_advance_to(self, next: Phase) -> bool {
        use Phase::*;
        matches!(
            (self, next),
            (Start, ExtractingArchive)
                | (ExtractingArchive, ExtractingBaseline)
                | (ExtractingBaseline, Reconciling)
                | (Reconciling, Sealing)
                | (Sealing, Done)
                | (Reconciling, Failed)
        )
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::Start => "start",
            Phase::ExtractingArchive => "extracting_archive",
            Phase::ExtractingBaseline => "extracting_baseline",
            Phase::Reconciling => "reconciling",
            Phase::Sealing => "sealing",
            Phase::Done => "done",
            Phase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Event payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventPayload {
    Empty,
    Phase(Phase),
    String(String),
}

/// Delta event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeltaEvent {
    /// Event key (e.g., "reconstruct.phase", "entry.failed")
    pub key: EventKey,

    /// Image the event belongs to
    pub image: String,

    /// Event payload
    pub payload: EventPayload,

    /// Timestamp
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl DeltaEvent {
    /// Create a new event
    pub fn new(key: impl Into<String>, image: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            key: key.into(),
            image: image.into(),
            payload,
            timestamp: chrono::Utc::now(),
        }
    }

    /// Create a phase transition event
    pub fn phase(image: impl Into<String>, phase: Phase) -> Self {
        Self::new(events::RECONSTRUCT_PHASE, image, EventPayload::Phase(phase))
    }

    /// Create an event with a string payload
    pub fn with_string(
        key: impl Into<String>,
        image: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(key, image, EventPayload::String(message.into()))
    }
}

/// Event emitter
#[derive(Clone)]
pub struct EventEmitter {
    sender: Arc<broadcast::Sender<DeltaEvent>>,
}

impl EventEmitter {
    /// Create a new event emitter
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Emit an event. Events with no subscribers are dropped.
    pub fn emit(&self, event: DeltaEvent) {
        let _ = self.sender.send(event);
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<DeltaEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Event catalog - predefined event keys
pub mod events {
    pub const RECONSTRUCT_PHASE: &str = "reconstruct.phase";

    pub const ENTRY_STARTED: &str = "entry.started";
    pub const ENTRY_COMPLETED: &str = "entry.completed";
    pub const ENTRY_FAILED: &str = "entry.failed";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_order() {
        assert!(Phase::Start.can_advance_to(Phase::ExtractingArchive));
        assert!(Phase::Reconciling.can_advance_to(Phase::Failed));
        assert!(Phase::Sealing.can_advance_to(Phase::Done));
        assert!(!Phase::Start.can_advance_to(Phase::Sealing));
        assert!(!Phase::Sealing.can_advance_to(Phase::Failed));
        assert!(!Phase::Done.can_advance_to(Phase::Start));
    }

    #[tokio::test]
    async fn test_emit_and_subscribe() {
        let emitter = EventEmitter::new(16);
        let mut rx = emitter.subscribe();

        emitter.emit(DeltaEvent::phase("nginx", Phase::Reconciling));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.key, events::RECONSTRUCT_PHASE);
        assert_eq!(event.image, "nginx");
        assert_eq!(event.payload, EventPayload::Phase(Phase::Reconciling));
    }

    #[test]
    fn test_emit_without_subscribers_is_silent() {
        let emitter = EventEmitter::default();
        emitter.emit(DeltaEvent::with_string(events::ENTRY_FAILED, "x", "boom"));
    }

    #[test]
    fn test_phase_serialization() {
        let json = serde_json::to_string(&Phase::ExtractingBaseline).unwrap();
        assert_eq!(json, "\"extracting_baseline\"");
    }
}

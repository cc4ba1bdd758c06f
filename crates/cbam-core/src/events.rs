//! Lifecycle event notifier
//!
//! Injectable synchronous pub/sub so later stages can react to earlier
//! ones without tight coupling. Publication is fire-and-forget: a handler
//! failure is logged and isolated, never propagated back to the publisher.

use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    EntryCreated { entry_id: String },
    EntryUpdated { entry_id: String },
    EntryDeleted { entry_id: String },
    EntryCalculated { entry_id: String },
    EntryValidated { entry_id: String, status: String },
    VerificationChanged { entry_id: String, from: String, to: String },
    ChangeRequestOpened { request_id: String, entry_id: String },
    ChangeRequestDecided { request_id: String, approved: bool },
    RecalculationExecuted { request_id: String, succeeded: usize, failed: usize },
    VersionActivated { version_id: String },
    ReportGenerated { report_id: String },
    ReportSubmitted { report_id: String },
    CertificatesPurchased { certificate_id: String, quantity: u64 },
    CertificatesSurrendered { report_id: String, quantity: u64 },
}

pub trait EventHandler: Send + Sync {
    fn on_event(&self, event: &DomainEvent);
}

/// Synchronous fan-out dispatcher.
pub struct Notifier {
    handlers: Mutex<Vec<Arc<dyn EventHandler>>>,
}

impl Notifier {
    pub fn new() -> Self {
        Self {
            handlers: Mutex::new(Vec::new()),
        }
    }

    pub fn subscribe(&self, handler: Arc<dyn EventHandler>) {
        self.handlers.lock().unwrap().push(handler);
    }

    /// Dispatch to every handler. Panics and errors stay inside the
    /// handler; the publisher's operation is already committed.
    pub fn publish(&self, event: DomainEvent) {
        let handlers = self.handlers.lock().unwrap().clone();
        for handler in handlers {
            let result = catch_unwind(AssertUnwindSafe(|| handler.on_event(&event)));
            if result.is_err() {
                tracing::warn!(?event, "event handler panicked; continuing dispatch");
            }
        }
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

/// Test helper that records everything it sees.
pub struct RecordingHandler {
    seen: Mutex<Vec<DomainEvent>>,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self {
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn seen(&self) -> Vec<DomainEvent> {
        self.seen.lock().unwrap().clone()
    }
}

impl Default for RecordingHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl EventHandler for RecordingHandler {
    fn on_event(&self, event: &DomainEvent) {
        self.seen.lock().unwrap().push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct PanickingHandler;

    impl EventHandler for PanickingHandler {
        fn on_event(&self, _event: &DomainEvent) {
            panic!("handler blew up");
        }
    }

    #[test]
    fn test_fan_out() {
        let notifier = Notifier::new();
        let a = Arc::new(RecordingHandler::new());
        let b = Arc::new(RecordingHandler::new());
        notifier.subscribe(a.clone());
        notifier.subscribe(b.clone());

        notifier.publish(DomainEvent::EntryCreated {
            entry_id: "e-1".to_string(),
        });

        assert_eq!(a.seen().len(), 1);
        assert_eq!(b.seen().len(), 1);
    }

    #[test]
    fn test_handler_panic_does_not_stop_dispatch() {
        let notifier = Notifier::new();
        let recorder = Arc::new(RecordingHandler::new());
        notifier.subscribe(Arc::new(PanickingHandler));
        notifier.subscribe(recorder.clone());

        notifier.publish(DomainEvent::ReportSubmitted {
            report_id: "r-1".to_string(),
        });

        // The panicking handler is isolated; later handlers still run.
        assert_eq!(recorder.seen().len(), 1);
    }

    #[test]
    fn test_event_serde_tag() {
        let event = DomainEvent::EntryValidated {
            entry_id: "e-1".to_string(),
            status: "pass".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"entry_validated\""));
    }
}

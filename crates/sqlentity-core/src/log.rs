//! Failure reporting.
//!
//! Data-access calls that swallow a command failure still report it here.
//! Sinks must never block or fail the operation that triggered them.

use std::sync::Mutex;
use std::sync::mpsc::{self, Receiver, Sender};

/// One swallowed or degraded failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureEvent {
    /// Short operation tag, e.g. `"fetch"` or `"reconcile"`
    pub operation: &'static str,
    pub message: String,
    /// Usually the SQL involved
    pub detail: Option<String>,
    /// Usually the entity or table involved
    pub context: Option<String>,
}

impl FailureEvent {
    pub fn new(operation: &'static str, message: impl Into<String>) -> Self {
        Self {
            operation,
            message: message.into(),
            detail: None,
            context: None,
        }
    }

    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}

/// Fire-and-forget receiver of failure events.
pub trait FailureSink: Send + Sync {
    fn record(&self, event: FailureEvent);
}

/// Emits every event as a `tracing` error.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl FailureSink for TracingSink {
    fn record(&self, event: FailureEvent) {
        tracing::error!(
            operation = event.operation,
            detail = event.detail.as_deref().unwrap_or(""),
            context = event.context.as_deref().unwrap_or(""),
            "{}",
            event.message
        );
    }
}

/// Forwards events over an unbounded channel; a dropped receiver is ignored.
#[derive(Debug)]
pub struct ChannelSink {
    sender: Mutex<Sender<FailureEvent>>,
}

impl ChannelSink {
    pub fn new() -> (Self, Receiver<FailureEvent>) {
        let (sender, receiver) = mpsc::channel();
        (
            Self {
                sender: Mutex::new(sender),
            },
            receiver,
        )
    }
}

impl FailureSink for ChannelSink {
    fn record(&self, event: FailureEvent) {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let _ = sender.send(event);
    }
}

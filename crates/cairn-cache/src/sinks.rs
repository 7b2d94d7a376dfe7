//! Event sink implementations.

use cairn_core::events::{ConsoleLevel, Event};
use cairn_core::ports::EventSink;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Writes every event to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn post(&self, event: Event) {
        match &event {
            Event::Console(p) => match p.level {
                ConsoleLevel::Info => info!(subject = %event.subject(), "{}", p.message),
                ConsoleLevel::Warning => warn!(subject = %event.subject(), "{}", p.message),
                ConsoleLevel::Severe => error!(subject = %event.subject(), "{}", p.message),
            },
            Event::ArtifactCompressionStarted(p) => {
                debug!(subject = %event.subject(), keys = p.rule_keys.len(), "Compression started")
            }
            Event::ArtifactCompressionFinished(p) => {
                debug!(subject = %event.subject(), duration_ms = p.duration_ms, "Compression finished")
            }
        }
    }
}

/// Forwards events into an unbounded channel.
///
/// Posting never blocks; events posted after the receiver is dropped are
/// discarded.
#[derive(Debug, Clone)]
pub struct ChannelEventSink {
    tx: mpsc::UnboundedSender<Event>,
}

impl ChannelEventSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelEventSink {
    fn post(&self, event: Event) {
        let _ = self.tx.send(event);
    }
}

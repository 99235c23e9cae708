//! Downstream trigger implementations

use super::traits::{DownstreamTrigger, TriggerPayload};
use crate::pipeline::PipelineError;
use tokio::sync::mpsc;

/// Writes the payload to the log as JSON
#[derive(Debug, Clone, Copy, Default)]
pub struct LogTrigger;

impl DownstreamTrigger for LogTrigger {
    fn dispatch(&self, consumer: &str, payload: TriggerPayload) -> Result<(), PipelineError> {
        let json = serde_json::to_string(&payload)
            .map_err(|e| PipelineError::Io(format!("cannot encode trigger payload: {e}")))?;
        tracing::info!(consumer, payload = %json, "Downstream verification triggered");
        Ok(())
    }
}

/// A dispatched trigger, as received by a [`ChannelTrigger`] consumer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerMessage {
    /// Consumer name
    pub consumer: String,
    /// Payload snapshot
    pub payload: TriggerPayload,
}

/// Forwards payloads into an unbounded channel
#[derive(Debug, Clone)]
pub struct ChannelTrigger {
    sender: mpsc::UnboundedSender<TriggerMessage>,
}

impl ChannelTrigger {
    /// Creates the trigger and the receiving end
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TriggerMessage>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl DownstreamTrigger for ChannelTrigger {
    fn dispatch(&self, consumer: &str, payload: TriggerPayload) -> Result<(), PipelineError> {
        self.sender
            .send(TriggerMessage {
                consumer: consumer.to_string(),
                payload,
            })
            .map_err(|_| PipelineError::Io(format!("consumer '{consumer}' is gone")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> TriggerPayload {
        TriggerPayload {
            url: "https://s3.amazonaws.com/julianightlies/bin/linux/x64/0.6/julia-0.6.0-linux64.tar.gz".into(),
            commitmessage: "Fix the thing".into(),
            commitname: "Jane Doe".into(),
            commitemail: "jane@example.com".into(),
            authorname: "John Roe".into(),
            authoremail: "john@example.com".into(),
            shortcommit: "0123456789".into(),
        }
    }

    #[test]
    fn test_channel_trigger_delivers() {
        let (trigger, mut rx) = ChannelTrigger::new();
        trigger.dispatch("Julia Coverage Testing", payload()).unwrap();
        let msg = rx.try_recv().unwrap();
        assert_eq!(msg.consumer, "Julia Coverage Testing");
        assert_eq!(msg.payload, payload());
    }

    #[test]
    fn test_channel_trigger_closed_receiver() {
        let (trigger, rx) = ChannelTrigger::new();
        drop(rx);
        assert!(trigger.dispatch("x", payload()).is_err());
    }

    #[test]
    fn test_log_trigger() {
        assert!(LogTrigger.dispatch("Julia Coverage Testing", payload()).is_ok());
    }
}

//! Event stream between the engine and any presentation layer

use std::time::Instant;

use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use uca_core::{AgentResult, Phase, UpdateEvent};

/// Producer half of the event stream
///
/// Sending never blocks; a dropped consumer silently disables delivery.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<UnboundedSender<UpdateEvent>>,
}

impl EventSink {
    /// Sink that drops every event
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn emit(&self, index: usize, phase: Phase, result: &AgentResult, visible: bool) {
        let Some(tx) = &self.tx else {
            return;
        };
        let event = UpdateEvent {
            index,
            phase,
            result: result.clone(),
            at: Instant::now(),
            visible,
        };
        if tx.send(event).is_err() {
            tracing::trace!("Event consumer gone; dropping {} event", phase);
        }
    }
}

/// Create a connected sink and receiver
pub fn event_channel() -> (EventSink, UnboundedReceiver<UpdateEvent>) {
    let (tx, rx) = unbounded_channel();
    (EventSink { tx: Some(tx) }, rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_events_arrive_in_order() {
        let (sink, mut rx) = event_channel();
        let result = AgentResult::new("amp");
        sink.emit(0, Phase::Detect, &result, true);
        sink.emit(0, Phase::Start, &result, true);
        sink.emit(0, Phase::Finish, &result, true);
        drop(sink);

        let mut phases = Vec::new();
        while let Some(event) = rx.recv().await {
            phases.push(event.phase);
        }
        assert_eq!(phases, vec![Phase::Detect, Phase::Start, Phase::Finish]);
    }

    #[test]
    fn test_disabled_and_closed_sinks_do_not_panic() {
        EventSink::disabled().emit(0, Phase::Detect, &AgentResult::new("amp"), false);

        let (sink, rx) = event_channel();
        drop(rx);
        sink.emit(0, Phase::Finish, &AgentResult::new("amp"), false);
    }
}

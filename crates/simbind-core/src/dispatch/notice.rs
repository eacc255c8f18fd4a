// Simbind Engine Notices
// Execution results and state changes published to subscribers

use std::sync::mpsc::{channel, Receiver, Sender};

use super::EngineState;
use crate::action::ActionError;
use crate::binding::Slot;
use crate::document::BindingId;

/// Something the engine did, for a UI or log consumer
#[derive(Debug, Clone, PartialEq)]
pub enum EngineNotice {
    StateChanged {
        from: EngineState,
        to: EngineState,
    },
    ActionExecuted {
        id: BindingId,
        slot: Slot,
    },
    ActionFailed {
        id: BindingId,
        slot: Slot,
        error: ActionError,
    },
    OutputChanged {
        id: BindingId,
        value: String,
    },
    OutputFailed {
        id: BindingId,
        reason: String,
    },
    TestModeFailed {
        id: BindingId,
        reason: String,
    },
}

/// Fan-out of notices to every live subscriber
#[derive(Debug, Default)]
pub struct NoticeBus {
    subscribers: Vec<Sender<EngineNotice>>,
}

impl NoticeBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self) -> Receiver<EngineNotice> {
        let (tx, rx) = channel();
        self.subscribers.push(tx);
        rx
    }

    /// Send to every subscriber, dropping those whose receiver is gone
    pub fn publish(&mut self, notice: EngineNotice) {
        self.subscribers
            .retain(|subscriber| subscriber.send(notice.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_reaches_all_subscribers() {
        let mut bus = NoticeBus::new();
        let a = bus.subscribe();
        let b = bus.subscribe();
        let notice = EngineNotice::StateChanged {
            from: EngineState::Idle,
            to: EngineState::Armed,
        };
        bus.publish(notice.clone());
        assert_eq!(a.try_recv().unwrap(), notice);
        assert_eq!(b.try_recv().unwrap(), notice);
    }

    #[test]
    fn test_closed_subscribers_pruned() {
        let mut bus = NoticeBus::new();
        let kept = bus.subscribe();
        drop(bus.subscribe());
        bus.publish(EngineNotice::OutputChanged {
            id: BindingId::generate(),
            value: "1".to_string(),
        });
        assert_eq!(bus.subscriber_count(), 1);
        assert!(kept.try_recv().is_ok());
    }
}

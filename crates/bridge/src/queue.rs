//! Host event queue
//!
//! Single producer (the reader thread) and single consumer (the host thread).
//! The producer only pushes; the consumer only drains, once per host tick.

use async_channel::{Receiver, Sender, unbounded};
use protocol::Event;
use std::process::ExitStatus;

/// Message handed from the reader thread to the host thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeMessage {
    /// A decoded, actionable event
    Event(Event),

    /// The daemon's output ended and the process was reaped
    Exited {
        /// Which `start` this daemon belonged to
        generation: u64,
        /// `None` when the process could not be reaped
        status: Option<ExitStatus>,
    },
}

/// Reader-thread side
#[derive(Clone)]
pub struct QueueProducer {
    tx: Sender<BridgeMessage>,
}

impl QueueProducer {
    /// Enqueue a message; false if the consumer is gone
    pub fn push(&self, message: BridgeMessage) -> bool {
        self.tx.try_send(message).is_ok()
    }
}

/// Host-thread side
pub struct QueueConsumer {
    rx: Receiver<BridgeMessage>,
}

impl QueueConsumer {
    /// Next message, without waiting
    pub fn pop(&self) -> Option<BridgeMessage> {
        self.rx.try_recv().ok()
    }

    /// Messages currently queued
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

/// Create an unbounded host queue
pub fn event_queue() -> (QueueProducer, QueueConsumer) {
    let (tx, rx) = unbounded();
    (QueueProducer { tx }, QueueConsumer { rx })
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::{Action, Control};

    #[test]
    fn test_fifo_order() {
        let (producer, consumer) = event_queue();
        let events = [
            Event::input(Control::DpadUp, Action::Press),
            Event::input(Control::DpadUp, Action::Release),
        ];
        for event in &events {
            assert!(producer.push(BridgeMessage::Event(event.clone())));
        }

        assert_eq!(consumer.len(), 2);
        assert_eq!(consumer.pop(), Some(BridgeMessage::Event(events[0].clone())));
        assert_eq!(consumer.pop(), Some(BridgeMessage::Event(events[1].clone())));
        assert_eq!(consumer.pop(), None);
        assert!(consumer.is_empty());
    }

    #[test]
    fn test_push_after_consumer_dropped() {
        let (producer, consumer) = event_queue();
        drop(consumer);
        assert!(!producer.push(BridgeMessage::Exited {
            generation: 1,
            status: None
        }));
    }
}

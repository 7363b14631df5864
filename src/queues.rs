use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;

use crate::message::Message;

/// The outbound and inbound FIFOs of information messages. These are the only part of a
///  station's state that is shared between the event loop and application code.
///
/// Locks are held only for the duration of a single queue operation and never across an
///  `.await`, so a plain std mutex is sufficient.
#[derive(Default)]
pub(crate) struct MessageQueues {
    outbound: Mutex<VecDeque<Message>>,
    inbound: Mutex<VecDeque<Message>>,
    inbound_available: Notify,
}

/// A panic while holding the lock cannot leave a VecDeque in an inconsistent state, so poisoning
///  is ignored
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MessageQueues {
    pub fn push_outbound(&self, msg: Message) {
        lock(&self.outbound).push_back(msg);
    }

    /// Put back a message that was sent but not acknowledged, so it is the next to be sent
    pub fn push_outbound_front(&self, msg: Message) {
        lock(&self.outbound).push_front(msg);
    }

    pub fn pop_outbound(&self) -> Option<Message> {
        lock(&self.outbound).pop_front()
    }

    pub fn has_outbound(&self) -> bool {
        !lock(&self.outbound).is_empty()
    }

    pub fn outbound_len(&self) -> usize {
        lock(&self.outbound).len()
    }

    pub fn push_inbound(&self, msg: Message) {
        lock(&self.inbound).push_back(msg);
        self.inbound_available.notify_one();
    }

    pub fn pop_inbound(&self) -> Option<Message> {
        lock(&self.inbound).pop_front()
    }

    pub fn inbound_len(&self) -> usize {
        lock(&self.inbound).len()
    }

    /// Wait until a received message is available and return it
    pub async fn next_inbound(&self) -> Message {
        loop {
            if let Some(msg) = self.pop_inbound() {
                return msg;
            }
            self.inbound_available.notified().await;
        }
    }

    /// Drop the contents of both queues, returning the number of dropped inbound and outbound
    ///  messages
    pub fn clear(&self) -> (usize, usize) {
        let dropped_inbound = {
            let mut inbound = lock(&self.inbound);
            let len = inbound.len();
            inbound.clear();
            len
        };
        let dropped_outbound = {
            let mut outbound = lock(&self.outbound);
            let len = outbound.len();
            outbound.clear();
            len
        };
        (dropped_inbound, dropped_outbound)
    }
}

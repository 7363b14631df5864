use tokio::sync::broadcast;
use tracing::trace;

use crate::message::MessageKind;
use crate::state::ProtocolState;
use crate::timers::TimerKind;

/// Observable events of a station. Events are informational: the protocol does not depend on
///  anybody listening.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum LinkEvent {
    StateChanged(StateChangedData),
    /// A clear request was received (or sent) and queued data was dropped
    ChannelCleared(ChannelClearedData),
    /// The peer refused a bid for the master role, or an information message, too often
    RetriesExhausted(RetriesExhaustedData),
    /// A timeout aborted the current exchange
    Timeout(TimerKind),
    /// A message arrived that is not valid in the current state
    ProtocolViolation(ProtocolViolationData),
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StateChangedData {
    pub old_state: ProtocolState,
    pub new_state: ProtocolState,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ChannelClearedData {
    pub dropped_inbound: usize,
    /// This includes an information message that was sent but not acknowledged yet
    pub dropped_outbound: usize,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RetryKind {
    Enq,
    Info,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RetriesExhaustedData {
    pub kind: RetryKind,
    pub tries: u32,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProtocolViolationData {
    pub state: ProtocolState,
    pub received: MessageKind,
}


pub struct LinkEventNotifier {
    sender: broadcast::Sender<LinkEvent>,
}
impl LinkEventNotifier {
    pub fn new() -> LinkEventNotifier {
        let (sender, _) = broadcast::channel(128);

        LinkEventNotifier {
            sender
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LinkEvent> {
        self.sender.subscribe()
    }

    pub fn send_event(&self, event: LinkEvent) {
        trace!("event: {:?}", event);
        let _ = self.sender.send(event);
    }
}

impl Default for LinkEventNotifier {
    fn default() -> Self {
        Self::new()
    }
}

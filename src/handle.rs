use std::sync::Arc;

use anyhow::bail;
use bytes::Bytes;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, warn};

use crate::control_chars::{ETX, STX};
use crate::events::{LinkEvent, LinkEventNotifier};
use crate::message::Message;
use crate::queues::MessageQueues;

/// Requests from application code that are executed on the event loop, since they touch engine
///  state that is owned by the loop
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub(crate) enum PeerCommand {
    SetAcceptingInput(bool),
    ClearChannel,
    Shutdown,
}

/// The application's side of a station. A handle is cheap to clone, and all of its methods can
///  be called from any thread without blocking.
#[derive(Clone)]
pub struct PeerHandle {
    queues: Arc<MessageQueues>,
    commands: mpsc::UnboundedSender<PeerCommand>,
    events: Arc<LinkEventNotifier>,
    max_message_len: usize,
}

impl PeerHandle {
    pub(crate) fn new(
        queues: Arc<MessageQueues>,
        commands: mpsc::UnboundedSender<PeerCommand>,
        events: Arc<LinkEventNotifier>,
        max_message_len: usize,
    ) -> PeerHandle {
        PeerHandle {
            queues,
            commands,
            events,
            max_message_len,
        }
    }

    /// Append an information message to the outbound queue. A message that can not be framed
    ///  is logged and discarded.
    pub fn enqueue_message(&self, header: impl Into<Bytes>, body: impl Into<Bytes>) {
        if let Err(e) = self.try_enqueue_message(header, body) {
            error!("Error enqueueing message: {}", e);
        }
    }

    /// Append an information message to the outbound queue, failing if the message can not be
    ///  framed unambiguously or exceeds the maximum message length.
    pub fn try_enqueue_message(&self, header: impl Into<Bytes>, body: impl Into<Bytes>) -> anyhow::Result<()> {
        let header = header.into();
        let body = body.into();

        if header.iter().any(|&b| b == STX || b == ETX) {
            bail!("message header must not contain STX or ETX");
        }
        if body.contains(&ETX) {
            bail!("message body must not contain ETX");
        }

        let msg = Message::info(header, body);
        if msg.serialized_len() > self.max_message_len {
            bail!("message has {} bytes on the wire, maximum is {}", msg.serialized_len(), self.max_message_len);
        }

        debug!("enqueueing {:?}", msg);
        self.queues.push_outbound(msg);
        Ok(())
    }

    /// Return header and body of the oldest received information message, if any
    pub fn get_next_message(&self) -> Option<(Bytes, Bytes)> {
        self.queues.pop_inbound()
            .map(|msg| (msg.header, msg.body))
    }

    /// Wait for the next received information message and return its header and body
    pub async fn next_message(&self) -> (Bytes, Bytes) {
        let msg = self.queues.next_inbound().await;
        (msg.header, msg.body)
    }

    pub fn outbound_len(&self) -> usize {
        self.queues.outbound_len()
    }

    pub fn inbound_len(&self) -> usize {
        self.queues.inbound_len()
    }

    /// Change whether this station agrees to being selected as slave
    pub fn set_accepting_input(&self, accepting_input: bool) {
        self.send_command(PeerCommand::SetAcceptingInput(accepting_input));
    }

    /// Send a clear request to the peer, dropping all queued messages on both sides
    pub fn clear_channel(&self) {
        self.send_command(PeerCommand::ClearChannel);
    }

    /// Terminate the station's event loop
    pub fn shutdown(&self) {
        self.send_command(PeerCommand::Shutdown);
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<LinkEvent> {
        self.events.subscribe()
    }

    fn send_command(&self, command: PeerCommand) {
        if self.commands.send(command).is_err() {
            warn!("event loop is not running - ignoring {:?}", command);
        }
    }
}

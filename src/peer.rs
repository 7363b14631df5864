use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::select;
use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, span, trace, warn, Instrument, Level};

use crate::config::HalfDuplexConfig;
use crate::control_chars::{SOH, STX};
use crate::events::{ChannelClearedData, LinkEvent, LinkEventNotifier, ProtocolViolationData, RetriesExhaustedData, RetryKind, StateChangedData};
use crate::framing::parse_message;
use crate::handle::{PeerCommand, PeerHandle};
use crate::message::{Message, MessageKind};
use crate::queues::MessageQueues;
use crate::serial_link::SerialWriter;
use crate::state::ProtocolState;
use crate::timers::{ProtocolTimers, TimerEvent, TimerKind};

const READ_BUFFER_SIZE: usize = 1024;

/// The protocol engine of a single station. All protocol state is owned by the engine and
///  changed only from its event loop ([Peer::run]); application code interacts with it through
///  the [PeerHandle] that is created alongside it.
pub struct Peer {
    config: Arc<HalfDuplexConfig>,
    writer: Arc<dyn SerialWriter>,

    state: ProtocolState,
    accepting_input: bool,
    enq_nak_count: u32,
    info_nak_count: u32,

    /// received bytes that were not parsed into a message yet
    unprocessed: BytesMut,
    /// the information message that is awaiting acknowledgement, if any. It is no longer in the
    ///  outbound queue.
    last_sent: Option<Message>,

    queues: Arc<MessageQueues>,
    events: Arc<LinkEventNotifier>,
    timers: ProtocolTimers,
    timer_events: mpsc::UnboundedReceiver<TimerEvent>,
    commands: mpsc::UnboundedReceiver<PeerCommand>,
}

impl Peer {
    pub fn new(config: Arc<HalfDuplexConfig>, writer: Arc<dyn SerialWriter>) -> anyhow::Result<(Peer, PeerHandle)> {
        config.validate()?;

        let queues = Arc::new(MessageQueues::default());
        let events = Arc::new(LinkEventNotifier::new());
        let (command_sender, commands) = mpsc::unbounded_channel();
        let (timers, timer_events) = ProtocolTimers::new(&config);

        let handle = PeerHandle::new(queues.clone(), command_sender, events.clone(), config.max_message_len);
        let peer = Peer {
            writer,
            state: ProtocolState::Neutral,
            accepting_input: config.accepting_input,
            enq_nak_count: 0,
            info_nak_count: 0,
            unprocessed: BytesMut::with_capacity(2 * config.max_message_len),
            last_sent: None,
            queues,
            events,
            timers,
            timer_events,
            commands,
            config,
        };
        Ok((peer, handle))
    }

    /// The event loop: it processes received bytes, timer expiry, the controller's poll interval
    ///  and commands from application code, one at a time.
    ///
    /// The loop terminates when the serial line is closed (returning `Ok`), when reading from it
    ///  fails (returning the error), and when it is shut down through the [PeerHandle] or all
    ///  handles are dropped.
    pub async fn run<R: AsyncRead + Unpin>(self, reader: R) -> anyhow::Result<()> {
        let span = span!(Level::DEBUG, "peer", station = %String::from_utf8_lossy(&self.config.local_prefix));
        self.event_loop(reader).instrument(span).await
    }

    async fn event_loop<R: AsyncRead + Unpin>(mut self, mut reader: R) -> anyhow::Result<()> {
        debug!("starting event loop as {}", if self.config.controller { "controller" } else { "responder" });

        let mut poll_ticks = time::interval_at(Instant::now() + self.config.poll_interval, self.config.poll_interval);
        poll_ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut read_buf = [0u8; READ_BUFFER_SIZE];
        loop {
            select! {
                read_result = reader.read(&mut read_buf) => {
                    match read_result {
                        Ok(0) => {
                            debug!("serial line was closed - terminating event loop");
                            return Ok(());
                        }
                        Ok(n) => self.on_bytes_received(&read_buf[..n]).await,
                        Err(e) => {
                            error!("error reading from the serial line: {}", e);
                            return Err(e.into());
                        }
                    }
                }
                Some(event) = self.timer_events.recv() => self.on_timer_event(event).await,
                _ = poll_ticks.tick() => self.on_poll_tick().await,
                command = self.commands.recv() => {
                    let keep_running = match command {
                        Some(command) => self.on_command(command).await,
                        None => false,
                    };
                    if !keep_running {
                        debug!("shutting down event loop");
                        return Ok(());
                    }
                }
            }
        }
    }

    async fn on_bytes_received(&mut self, data: &[u8]) {
        trace!("received {} bytes", data.len());
        self.timers.start(TimerKind::NoActivity);
        self.unprocessed.extend_from_slice(data);

        loop {
            let msg = parse_message(&mut self.unprocessed, self.config.max_message_len);
            if msg.kind == MessageKind::None {
                break;
            }
            self.on_message(msg).await;
        }

        self.update_no_receive_timer();
    }

    /// The no-receive timer bounds the time a partial information message may sit in the buffer.
    ///  This applies in every state: outside [ProtocolState::SlaveInfoReceive] a partial block
    ///  is line noise, and it would swallow all following supervisory messages until it reached
    ///  the maximum message length. The timer is not restarted by further bytes of the same
    ///  message.
    fn update_no_receive_timer(&mut self) {
        let is_assembling = matches!(self.unprocessed.first(), Some(&SOH) | Some(&STX));

        if !is_assembling {
            self.timers.cancel(TimerKind::NoReceive);
        }
        else if !self.timers.is_armed(TimerKind::NoReceive) {
            self.timers.start(TimerKind::NoReceive);
        }
    }

    async fn on_message(&mut self, msg: Message) {
        debug!("received {:?} in state {}", msg, self.state);
        let result = self.dispatch(msg).await;
        self.on_write_result(result);
    }

    async fn dispatch(&mut self, msg: Message) -> anyhow::Result<()> {
        use MessageKind as Kind;
        use ProtocolState as State;

        match (self.state, msg.kind) {
            (_, Kind::None) => Ok(()),
            (_, Kind::DleEot) => {
                warn!("received clear request");
                self.clear_channel();
                Ok(())
            }

            (State::Neutral, Kind::Eot) => {
                trace!("channel flush");
                Ok(())
            }
            (State::Neutral, Kind::Malformed) => {
                debug!("discarding line noise");
                Ok(())
            }
            (State::Neutral, Kind::Enq) if msg.is_enq_for(&self.config.remote_prefix) => {
                debug!("peer is taking the master role");
                self.change_state(State::SlaveSelectReceive);
                Ok(())
            }
            (State::Neutral, Kind::Enq) if msg.is_enq_for(&self.config.local_prefix) => self.on_polled().await,
            (State::Neutral, Kind::Ack | Kind::Nak | Kind::Enq | Kind::Info) => self.on_protocol_violation(&msg).await,

            (State::SlaveSelectReceive, Kind::Enq) if msg.is_enq_for(&self.config.local_prefix) => self.on_selected().await,
            (State::SlaveSelectReceive, Kind::Eot) => {
                debug!("peer declined the master role");
                self.return_to_neutral();
                Ok(())
            }
            (State::SlaveSelectReceive, Kind::Ack | Kind::Nak | Kind::Enq | Kind::Info | Kind::Malformed) => self.on_protocol_violation(&msg).await,

            (State::MasterSelectAckReceive, Kind::Ack) => self.on_select_acknowledged().await,
            (State::MasterSelectAckReceive, Kind::Nak) => self.on_select_refused().await,
            (State::MasterSelectAckReceive, Kind::Eot) => {
                debug!("peer ended the exchange");
                self.return_to_neutral();
                Ok(())
            }
            (State::MasterSelectAckReceive, Kind::Enq) if msg.is_enq_for(&self.config.local_prefix) => self.on_select_collision().await,
            (State::MasterSelectAckReceive, Kind::Enq | Kind::Info | Kind::Malformed) => self.on_protocol_violation(&msg).await,

            (State::MasterInfoAckReceive, Kind::Ack) => self.on_info_acknowledged().await,
            (State::MasterInfoAckReceive, Kind::Nak) => self.on_info_refused().await,
            (State::MasterInfoAckReceive, Kind::Eot | Kind::Enq | Kind::Info | Kind::Malformed) => self.on_protocol_violation(&msg).await,

            (State::SlaveInfoReceive, Kind::Info) => self.on_info_received(msg).await,
            (State::SlaveInfoReceive, Kind::Malformed) => self.on_malformed_info().await,
            (State::SlaveInfoReceive, Kind::Eot) => {
                debug!("master station ended the transfer");
                self.return_to_neutral();
                Ok(())
            }
            (State::SlaveInfoReceive, Kind::Ack | Kind::Nak | Kind::Enq) => self.on_protocol_violation(&msg).await,

            // only the transient states are left
            (state, _) => {
                debug_assert!(state.is_transient());
                error!("internal error: message dispatched in transient state {}", state);
                self.on_protocol_violation(&msg).await
            }
        }
    }

    /// A failed write leaves the peer in an unknown state, so the only safe place to be is neutral
    fn on_write_result(&mut self, result: anyhow::Result<()>) {
        if let Err(e) = result {
            error!("error writing to the serial line: {}", e);
            self.return_to_neutral();
        }
    }

    async fn send(&mut self, msg: &Message) -> anyhow::Result<()> {
        trace!("sending {:?}", msg);
        self.writer.write_bytes(&msg.to_bytes()).await?;
        self.timers.start(TimerKind::NoActivity);
        Ok(())
    }

    fn change_state(&mut self, new_state: ProtocolState) {
        if new_state == self.state {
            return;
        }

        debug!("state change: {} -> {}", self.state, new_state);
        let old_state = std::mem::replace(&mut self.state, new_state);
        self.events.send_event(LinkEvent::StateChanged(StateChangedData { old_state, new_state }));
    }

    fn return_to_neutral(&mut self) {
        self.timers.cancel(TimerKind::NoResponse);
        self.timers.cancel(TimerKind::NoReceive);
        self.enq_nak_count = 0;
        self.info_nak_count = 0;

        if let Some(msg) = self.last_sent.take() {
            debug!("returning unacknowledged {:?} to the outbound queue", msg);
            self.queues.push_outbound_front(msg);
        }

        self.change_state(ProtocolState::Neutral);
    }

    async fn on_protocol_violation(&mut self, msg: &Message) -> anyhow::Result<()> {
        warn!("protocol violation: received {:?} in state {}", msg, self.state);
        self.events.send_event(LinkEvent::ProtocolViolation(ProtocolViolationData {
            state: self.state,
            received: msg.kind,
        }));

        if self.state != ProtocolState::Neutral {
            self.send(&Message::eot()).await?;
            self.return_to_neutral();
        }
        Ok(())
    }

    fn clear_channel(&mut self) {
        let dropped_bytes = self.unprocessed.len();
        self.unprocessed.clear();

        let in_flight = usize::from(self.last_sent.take().is_some());
        let (dropped_inbound, dropped_outbound) = self.queues.clear();
        let dropped_outbound = dropped_outbound + in_flight;

        warn!("clearing channel: dropping {} inbound messages, {} outbound messages and {} unprocessed bytes", dropped_inbound, dropped_outbound, dropped_bytes);
        self.return_to_neutral();
        self.events.send_event(LinkEvent::ChannelCleared(ChannelClearedData { dropped_inbound, dropped_outbound }));
    }

    async fn on_poll_tick(&mut self) {
        if !self.config.controller || self.state != ProtocolState::Neutral {
            return;
        }

        let result = self.poll().await;
        self.on_write_result(result);
    }

    async fn poll(&mut self) -> anyhow::Result<()> {
        self.send(&Message::eot()).await?;
        self.change_state(ProtocolState::PollTransmit);

        if self.queues.has_outbound() {
            debug!("poll: {} queued messages - bidding for the master role", self.queues.outbound_len());
            self.bid_for_master().await
        }
        else {
            trace!("poll: offering the master role to the peer");
            self.send(&Message::enq(self.config.remote_prefix.clone())).await?;
            self.timers.start(TimerKind::NoResponse);
            self.change_state(ProtocolState::SlaveSelectReceive);
            Ok(())
        }
    }

    /// announce this station as master, then select the peer as slave
    async fn bid_for_master(&mut self) -> anyhow::Result<()> {
        self.send(&Message::enq(self.config.local_prefix.clone())).await?;
        self.change_state(ProtocolState::MasterSelectTransmit);
        self.send(&Message::enq(self.config.remote_prefix.clone())).await?;
        self.timers.start(TimerKind::NoResponse);
        self.change_state(ProtocolState::MasterSelectAckReceive);
        Ok(())
    }

    async fn on_polled(&mut self) -> anyhow::Result<()> {
        if self.queues.has_outbound() {
            debug!("polled with {} queued messages - bidding for the master role", self.queues.outbound_len());
            self.change_state(ProtocolState::MasterSelectTransmit);
            self.send(&Message::enq(self.config.remote_prefix.clone())).await?;
            self.timers.start(TimerKind::NoResponse);
            self.change_state(ProtocolState::MasterSelectAckReceive);
        }
        else {
            trace!("polled without queued messages - declining");
            self.send(&Message::eot()).await?;
        }
        Ok(())
    }

    async fn on_selected(&mut self) -> anyhow::Result<()> {
        self.timers.cancel(TimerKind::NoResponse);
        self.change_state(ProtocolState::SlaveSelectAckTransmit);

        if self.accepting_input {
            self.send(&Message::ack()).await?;
            self.change_state(ProtocolState::SlaveInfoReceive);
        }
        else {
            debug!("not accepting input - refusing selection");
            self.send(&Message::nak()).await?;
            self.return_to_neutral();
        }
        Ok(())
    }

    /// Both stations bid for the master role at the same time. The controller's bid wins.
    async fn on_select_collision(&mut self) -> anyhow::Result<()> {
        if self.config.controller {
            debug!("colliding bid for the master role - ignoring the peer's bid");
            Ok(())
        }
        else {
            debug!("colliding bid for the master role - conceding");
            self.enq_nak_count = 0;
            self.on_selected().await
        }
    }

    async fn on_select_acknowledged(&mut self) -> anyhow::Result<()> {
        debug!("peer accepted this station as master");
        self.timers.cancel(TimerKind::NoResponse);
        self.enq_nak_count = 0;
        self.send_next_or_eot().await
    }

    async fn on_select_refused(&mut self) -> anyhow::Result<()> {
        self.timers.cancel(TimerKind::NoResponse);

        if !self.config.controller {
            debug!("peer refused this station as master");
            self.return_to_neutral();
            return Ok(());
        }

        self.enq_nak_count += 1;
        if self.enq_nak_count < self.config.max_enq_tries {
            debug!("peer refused this station as master ({} of {} tries) - retrying", self.enq_nak_count, self.config.max_enq_tries);
            self.change_state(ProtocolState::PollTransmit);
            self.bid_for_master().await
        }
        else {
            warn!("peer refused this station as master {} times - giving up", self.enq_nak_count);
            self.events.send_event(LinkEvent::RetriesExhausted(RetriesExhaustedData {
                kind: RetryKind::Enq,
                tries: self.enq_nak_count,
            }));
            self.send(&Message::eot()).await?;
            self.return_to_neutral();
            Ok(())
        }
    }

    async fn send_next_or_eot(&mut self) -> anyhow::Result<()> {
        match self.queues.pop_outbound() {
            Some(msg) => {
                self.change_state(ProtocolState::MasterInfoTransmit);
                self.last_sent = Some(msg.clone());
                self.send(&msg).await?;
                self.timers.start(TimerKind::NoResponse);
                self.change_state(ProtocolState::MasterInfoAckReceive);
            }
            None => {
                debug!("no more queued messages - ending the transfer");
                self.send(&Message::eot()).await?;
                self.return_to_neutral();
            }
        }
        Ok(())
    }

    async fn on_info_acknowledged(&mut self) -> anyhow::Result<()> {
        trace!("peer acknowledged information message");
        self.timers.cancel(TimerKind::NoResponse);
        self.info_nak_count = 0;
        self.last_sent = None;
        self.send_next_or_eot().await
    }

    async fn on_info_refused(&mut self) -> anyhow::Result<()> {
        self.timers.cancel(TimerKind::NoResponse);

        self.info_nak_count += 1;
        if self.info_nak_count < self.config.max_info_tries {
            debug!("peer refused information message ({} of {} tries) - retransmitting", self.info_nak_count, self.config.max_info_tries);
            self.retransmit().await
        }
        else {
            warn!("peer refused information message {} times - giving up", self.info_nak_count);
            self.events.send_event(LinkEvent::RetriesExhausted(RetriesExhaustedData {
                kind: RetryKind::Info,
                tries: self.info_nak_count,
            }));
            self.send(&Message::eot()).await?;
            self.return_to_neutral();
            Ok(())
        }
    }

    async fn retransmit(&mut self) -> anyhow::Result<()> {
        let msg = match &self.last_sent {
            Some(msg) => msg.clone(),
            None => {
                error!("internal error: no information message to retransmit");
                self.send(&Message::eot()).await?;
                self.return_to_neutral();
                return Ok(());
            }
        };

        self.change_state(ProtocolState::MasterInfoTransmit);
        self.send(&msg).await?;
        self.timers.start(TimerKind::NoResponse);
        self.change_state(ProtocolState::MasterInfoAckReceive);
        Ok(())
    }

    async fn on_info_received(&mut self, msg: Message) -> anyhow::Result<()> {
        debug!("accepting {:?}", msg);
        self.change_state(ProtocolState::SlaveInfoAckTransmit);
        self.queues.push_inbound(msg);
        self.send(&Message::ack()).await?;
        self.change_state(ProtocolState::SlaveInfoReceive);
        Ok(())
    }

    async fn on_malformed_info(&mut self) -> anyhow::Result<()> {
        debug!("rejecting malformed information message");
        self.change_state(ProtocolState::SlaveInfoAckTransmit);
        self.send(&Message::nak()).await?;
        self.change_state(ProtocolState::SlaveInfoReceive);
        Ok(())
    }

    async fn on_timer_event(&mut self, event: TimerEvent) {
        if !self.timers.on_expired(event) {
            return;
        }

        let result = match event.kind {
            TimerKind::NoResponse => self.on_no_response_timeout().await,
            TimerKind::NoReceive => self.on_no_receive_timeout().await,
            TimerKind::NoActivity => self.on_no_activity_timeout().await,
        };
        self.on_write_result(result);
    }

    async fn on_no_response_timeout(&mut self) -> anyhow::Result<()> {
        match self.state {
            ProtocolState::MasterSelectAckReceive | ProtocolState::MasterInfoAckReceive | ProtocolState::SlaveSelectReceive => {
                warn!("no response from peer in state {} - aborting the exchange", self.state);
                self.events.send_event(LinkEvent::Timeout(TimerKind::NoResponse));
                self.discard_unprocessed();
                self.send(&Message::eot()).await?;
                self.return_to_neutral();
            }
            _ => trace!("no-response timeout in state {} - ignoring", self.state),
        }
        Ok(())
    }

    async fn on_no_receive_timeout(&mut self) -> anyhow::Result<()> {
        if self.unprocessed.is_empty() {
            trace!("no-receive timeout in state {} - ignoring", self.state);
            return Ok(());
        }

        warn!("incomplete information message timed out in state {} - discarding {} bytes", self.state, self.unprocessed.len());
        self.events.send_event(LinkEvent::Timeout(TimerKind::NoReceive));
        self.discard_unprocessed();

        if self.state == ProtocolState::SlaveInfoReceive {
            self.on_malformed_info().await
        }
        else {
            Ok(())
        }
    }

    async fn on_no_activity_timeout(&mut self) -> anyhow::Result<()> {
        if self.state == ProtocolState::Neutral {
            return Ok(());
        }

        warn!("no activity on the serial line in state {} - returning to neutral", self.state);
        self.events.send_event(LinkEvent::Timeout(TimerKind::NoActivity));
        self.discard_unprocessed();
        self.send(&Message::eot()).await?;
        self.return_to_neutral();
        Ok(())
    }

    /// A timeout means that whatever is left in the buffer will not be completed by the peer
    fn discard_unprocessed(&mut self) {
        if !self.unprocessed.is_empty() {
            debug!("discarding {} unprocessed bytes", self.unprocessed.len());
            self.unprocessed.clear();
        }
        self.timers.cancel(TimerKind::NoReceive);
    }

    /// returns `false` if the event loop should terminate
    async fn on_command(&mut self, command: PeerCommand) -> bool {
        match command {
            PeerCommand::SetAcceptingInput(accepting_input) => {
                debug!("accepting input: {}", accepting_input);
                self.accepting_input = accepting_input;
            }
            PeerCommand::ClearChannel => {
                if let Err(e) = self.send(&Message::dle_eot()).await {
                    error!("error sending clear request: {}", e);
                }
                self.clear_channel();
            }
            PeerCommand::Shutdown => return false,
        }
        true
    }
}

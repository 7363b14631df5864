use std::fmt::{Display, Formatter};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::trace;

use crate::config::HalfDuplexConfig;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum TimerKind {
    /// bounds the wait for the reply to a select or an information message
    NoResponse,
    /// bounds the assembly of a partially received information message
    NoReceive,
    /// detects a dead line
    NoActivity,
}

impl Display for TimerKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TimerKind::NoResponse => "no-response",
            TimerKind::NoReceive => "no-receive",
            TimerKind::NoActivity => "no-activity",
        };
        write!(f, "{}", s)
    }
}

/// Posted to the event loop when a timer expires. The generation identifies the start of the
///  timer that produced the event, so an event from a timer that was restarted or cancelled in
///  the meantime can be recognized and dropped.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct TimerEvent {
    pub kind: TimerKind,
    pub generation: u64,
}

struct ProtocolTimer {
    kind: TimerKind,
    duration: Duration,
    generation: u64,
    active: Option<JoinHandle<()>>,
}

impl Drop for ProtocolTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl ProtocolTimer {
    fn new(kind: TimerKind, duration: Duration) -> ProtocolTimer {
        ProtocolTimer {
            kind,
            duration,
            generation: 0,
            active: None,
        }
    }

    fn start(&mut self, events: &mpsc::UnboundedSender<TimerEvent>) {
        self.cancel();
        self.generation += 1;

        let event = TimerEvent { kind: self.kind, generation: self.generation };
        let duration = self.duration;
        let events = events.clone();
        self.active = Some(tokio::spawn(async move {
            time::sleep(duration).await;
            // the receiver is gone if the event loop terminated, which is fine
            let _ = events.send(event);
        }));
    }

    fn cancel(&mut self) {
        if let Some(handle) = self.active.take() {
            handle.abort();
        }
    }

    fn is_armed(&self) -> bool {
        self.active.is_some()
    }

    /// Aborting a sleeping task does not recall an event that was posted already, so this is
    ///  the check that makes a superseded expiry a no-op.
    fn on_expired(&mut self, event: TimerEvent) -> bool {
        if self.active.is_none() || event.generation != self.generation {
            trace!("ignoring stale expiry of {} timer (generation {}, current {})", self.kind, event.generation, self.generation);
            return false;
        }
        self.active = None;
        true
    }
}

/// The three one-shot timers of a station. Each of them can be restarted and cancelled, and
///  expiry is reported as a [TimerEvent] through the channel that is returned on creation.
///
/// The poll timer is periodic, and it is part of the event loop itself rather than living here.
pub struct ProtocolTimers {
    events: mpsc::UnboundedSender<TimerEvent>,
    no_response: ProtocolTimer,
    no_receive: ProtocolTimer,
    no_activity: ProtocolTimer,
}

impl ProtocolTimers {
    pub fn new(config: &HalfDuplexConfig) -> (ProtocolTimers, mpsc::UnboundedReceiver<TimerEvent>) {
        let (send, recv) = mpsc::unbounded_channel();
        let timers = ProtocolTimers {
            events: send,
            no_response: ProtocolTimer::new(TimerKind::NoResponse, config.no_response_timeout),
            no_receive: ProtocolTimer::new(TimerKind::NoReceive, config.no_receive_timeout),
            no_activity: ProtocolTimer::new(TimerKind::NoActivity, config.no_activity_timeout),
        };
        (timers, recv)
    }

    fn timer(&mut self, kind: TimerKind) -> &mut ProtocolTimer {
        match kind {
            TimerKind::NoResponse => &mut self.no_response,
            TimerKind::NoReceive => &mut self.no_receive,
            TimerKind::NoActivity => &mut self.no_activity,
        }
    }

    /// (Re)start a timer, superseding a previous start that did not expire yet
    pub fn start(&mut self, kind: TimerKind) {
        trace!("starting {} timer", kind);
        let events = self.events.clone();
        self.timer(kind).start(&events);
    }

    pub fn cancel(&mut self, kind: TimerKind) {
        self.timer(kind).cancel();
    }

    pub fn is_armed(&self, kind: TimerKind) -> bool {
        match kind {
            TimerKind::NoResponse => self.no_response.is_armed(),
            TimerKind::NoReceive => self.no_receive.is_armed(),
            TimerKind::NoActivity => self.no_activity.is_armed(),
        }
    }

    /// Returns `true` if the event is the expiry of the timer's current start, which disarms the
    ///  timer. Events from earlier starts or from cancelled timers return `false`.
    pub fn on_expired(&mut self, event: TimerEvent) -> bool {
        self.timer(event.kind).on_expired(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn config() -> HalfDuplexConfig {
        let mut config = HalfDuplexConfig::controller();
        config.no_response_timeout = Duration::from_secs(3);
        config.no_receive_timeout = Duration::from_secs(2);
        config.no_activity_timeout = Duration::from_secs(20);
        config
    }

    #[rstest]
    #[case::no_response(TimerKind::NoResponse, 3)]
    #[case::no_receive(TimerKind::NoReceive, 2)]
    #[case::no_activity(TimerKind::NoActivity, 20)]
    #[tokio::test(start_paused = true)]
    async fn test_expiry(#[case] kind: TimerKind, #[case] secs: u64) {
        let (mut timers, mut events) = ProtocolTimers::new(&config());

        timers.start(kind);
        assert!(timers.is_armed(kind));

        time::sleep(Duration::from_secs(secs) - Duration::from_millis(1)).await;
        assert!(events.try_recv().is_err());

        time::sleep(Duration::from_millis(2)).await;
        let event = events.try_recv().unwrap();
        assert_eq!(event.kind, kind);
        assert!(timers.on_expired(event));
        assert!(!timers.is_armed(kind));

        // an event is acted upon only once
        assert!(!timers.on_expired(event));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel() {
        let (mut timers, mut events) = ProtocolTimers::new(&config());

        timers.start(TimerKind::NoResponse);
        timers.cancel(TimerKind::NoResponse);
        assert!(!timers.is_armed(TimerKind::NoResponse));

        time::sleep(Duration::from_secs(10)).await;
        assert!(events.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_supersedes_previous_start() {
        let (mut timers, mut events) = ProtocolTimers::new(&config());

        timers.start(TimerKind::NoActivity);
        time::sleep(Duration::from_secs(15)).await;
        timers.start(TimerKind::NoActivity);

        time::sleep(Duration::from_secs(10)).await;
        assert!(events.try_recv().is_err());

        time::sleep(Duration::from_secs(11)).await;
        let event = events.try_recv().unwrap();
        assert_eq!(event.generation, 2);
        assert!(timers.on_expired(event));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_event_is_ignored() {
        let (mut timers, mut events) = ProtocolTimers::new(&config());

        // the event is posted, but it is not processed before the timer is restarted
        timers.start(TimerKind::NoReceive);
        time::sleep(Duration::from_secs(3)).await;
        timers.start(TimerKind::NoReceive);

        let stale = events.try_recv().unwrap();
        assert!(!timers.on_expired(stale));
        assert!(timers.is_armed(TimerKind::NoReceive));

        timers.cancel(TimerKind::NoReceive);
        time::sleep(Duration::from_secs(3)).await;
        assert!(events.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timers_are_independent() {
        let (mut timers, mut events) = ProtocolTimers::new(&config());

        timers.start(TimerKind::NoResponse);
        timers.start(TimerKind::NoReceive);
        timers.cancel(TimerKind::NoResponse);

        time::sleep(Duration::from_secs(5)).await;
        let event = events.try_recv().unwrap();
        assert_eq!(event.kind, TimerKind::NoReceive);
        assert!(timers.on_expired(event));
        assert!(events.try_recv().is_err());
    }
}

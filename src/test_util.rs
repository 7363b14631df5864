//! Utilities for testing a station without a serial line

use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};

use crate::events::LinkEvent;
use crate::serial_link::SerialWriter;

/// A [SerialWriter] that keeps track of everything written to it
#[derive(Default)]
pub struct TrackingSerialWriter {
    tracker: Mutex<Vec<Bytes>>,
}
impl TrackingSerialWriter {
    /// All bytes written since the last call, concatenated
    pub fn take_written(&self) -> Vec<u8> {
        self.take_writes().concat()
    }

    /// The individual writes since the last call
    pub fn take_writes(&self) -> Vec<Bytes> {
        std::mem::take(&mut *self.tracker.lock().unwrap())
    }

    pub fn assert_written(&self, expected: &[u8]) {
        let actual = self.take_written();
        assert_eq!(Bytes::from(actual), Bytes::copy_from_slice(expected));
    }

    pub fn assert_nothing_written(&self) {
        let actual = self.take_writes();
        assert!(actual.is_empty(), "unexpected writes: {:?}", actual);
    }
}

#[async_trait]
impl SerialWriter for TrackingSerialWriter {
    async fn write_bytes(&self, data: &[u8]) -> anyhow::Result<()> {
        self.tracker.lock().unwrap()
            .push(Bytes::copy_from_slice(data));
        Ok(())
    }
}

/// All events that were emitted and not consumed yet
pub fn drain_events(events: &mut broadcast::Receiver<LinkEvent>) -> Vec<LinkEvent> {
    let mut result = Vec::new();
    loop {
        match events.try_recv() {
            Ok(evt) => result.push(evt),
            Err(TryRecvError::Lagged(_)) => continue,
            Err(_) => return result,
        }
    }
}

/// The events except state changes, which are too noisy for most assertions
pub fn drain_non_state_events(events: &mut broadcast::Receiver<LinkEvent>) -> Vec<LinkEvent> {
    drain_events(events)
        .into_iter()
        .filter(|evt| !matches!(evt, LinkEvent::StateChanged(_)))
        .collect()
}

/// Wait for the first event matching the predicate, skipping all others
pub async fn wait_for_event(events: &mut broadcast::Receiver<LinkEvent>, predicate: impl Fn(&LinkEvent) -> bool) -> LinkEvent {
    loop {
        match events.recv().await {
            Ok(evt) if predicate(&evt) => return evt,
            Ok(_) | Err(RecvError::Lagged(_)) => {}
            Err(RecvError::Closed) => panic!("event channel closed"),
        }
    }
}

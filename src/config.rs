use std::time::Duration;

use anyhow::bail;
use bytes::Bytes;

use crate::control_chars::{is_graphic, MAX_MESSAGE_LEN, MAX_PREFIX_LEN};

pub struct HalfDuplexConfig {
    /// Exactly one of the two stations on a link is the controller: it polls the line while it
    ///  is neutral and wins when both stations bid for the master role at the same time.
    pub controller: bool,

    /// Initial value for whether this station accepts information messages. A station that does
    ///  not accept input refuses to be selected. This can be changed at runtime through
    ///  [crate::handle::PeerHandle::set_accepting_input].
    pub accepting_input: bool,

    /// The address prefix of this station, i.e. the prefix of `ENQ` messages addressed to it
    pub local_prefix: Bytes,
    /// The address prefix of the peer station
    pub remote_prefix: Bytes,

    /// How often the controller polls the line while it is neutral
    pub poll_interval: Duration,
    /// Maximum time to wait for the reply to a select or an information message
    pub no_response_timeout: Duration,
    /// Maximum time an incomplete information message may sit in the receive buffer
    pub no_receive_timeout: Duration,
    /// Maximum time without any traffic on the line before a station gives up its role
    pub no_activity_timeout: Duration,

    /// How often a refused bid for the master role is repeated before giving up
    pub max_enq_tries: u32,
    /// How often an information message is retransmitted after `NAK` before giving up
    pub max_info_tries: u32,

    /// The maximum length of a framed information message on the wire
    pub max_message_len: usize,
}

impl HalfDuplexConfig {
    pub fn controller() -> HalfDuplexConfig {
        HalfDuplexConfig {
            controller: true,
            accepting_input: true,
            local_prefix: Bytes::from_static(b"alpha"),
            remote_prefix: Bytes::from_static(b"bravo"),
            poll_interval: Duration::from_secs(7),
            no_response_timeout: Duration::from_secs(30),
            no_receive_timeout: Duration::from_secs(20),
            no_activity_timeout: Duration::from_secs(200),
            max_enq_tries: 20,
            max_info_tries: 20,
            max_message_len: MAX_MESSAGE_LEN,
        }
    }

    pub fn responder() -> HalfDuplexConfig {
        HalfDuplexConfig {
            controller: false,
            local_prefix: Bytes::from_static(b"bravo"),
            remote_prefix: Bytes::from_static(b"alpha"),
            ..Self::controller()
        }
    }

    /// Timeouts suitable for lines with short turnaround times
    pub fn with_short_timeouts(self) -> HalfDuplexConfig {
        HalfDuplexConfig {
            poll_interval: Duration::from_secs(1),
            no_response_timeout: Duration::from_secs(3),
            no_receive_timeout: Duration::from_secs(2),
            no_activity_timeout: Duration::from_secs(20),
            ..self
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        Self::validate_prefix("local", &self.local_prefix)?;
        Self::validate_prefix("remote", &self.remote_prefix)?;
        if self.local_prefix == self.remote_prefix {
            bail!("local and remote prefix must be different");
        }

        if self.poll_interval.is_zero() {
            bail!("poll interval must be positive");
        }
        if self.no_response_timeout.is_zero() || self.no_receive_timeout.is_zero() || self.no_activity_timeout.is_zero() {
            bail!("timeouts must be positive");
        }

        if self.max_enq_tries == 0 || self.max_info_tries == 0 {
            bail!("retry ceilings must be at least 1");
        }

        // introducer, ETX and checksum
        if self.max_message_len < 3 || self.max_message_len > MAX_MESSAGE_LEN {
            bail!("maximum message length must be between 3 and {}", MAX_MESSAGE_LEN);
        }

        Ok(())
    }

    fn validate_prefix(name: &str, prefix: &[u8]) -> anyhow::Result<()> {
        if prefix.is_empty() || prefix.len() > MAX_PREFIX_LEN {
            bail!("{} prefix must have between 1 and {} bytes", name, MAX_PREFIX_LEN);
        }
        if !prefix.iter().all(|&b| is_graphic(b)) {
            bail!("{} prefix must consist of printable non-space ASCII characters", name);
        }
        Ok(())
    }
}

use std::fmt::{Display, Formatter};

/// The protocol state of a station. There are two role specific sub-machines (master / slave)
///  joined by the shared neutral state.
///
/// The `*Transmit` states are transient: they are only held while a handler writes to the serial
///  line, and they are never observed when a message is dispatched.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ProtocolState {
    /// Neither station is master or slave
    Neutral,
    /// sending a poll
    PollTransmit,

    /// sending a request to become the master station
    MasterSelectTransmit,
    /// waiting for the peer to accept (or refuse) this station as master
    MasterSelectAckReceive,
    /// sending an information message
    MasterInfoTransmit,
    /// waiting for the acknowledgement of an information message
    MasterInfoAckReceive,

    /// waiting for a selection addressed to this station
    SlaveSelectReceive,
    /// answering a selection
    SlaveSelectAckTransmit,
    /// waiting for information messages from the master station
    SlaveInfoReceive,
    /// acknowledging an information message
    SlaveInfoAckTransmit,
}

impl ProtocolState {
    pub fn is_transient(&self) -> bool {
        use ProtocolState::*;

        match self {
            PollTransmit | MasterSelectTransmit | MasterInfoTransmit | SlaveSelectAckTransmit | SlaveInfoAckTransmit => true,
            Neutral | MasterSelectAckReceive | MasterInfoAckReceive | SlaveSelectReceive | SlaveInfoReceive => false,
        }
    }
}

impl Display for ProtocolState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        use ProtocolState::*;

        let s = match self {
            Neutral => "NEUTRAL",
            PollTransmit => "POLL_TRANSMIT",
            MasterSelectTransmit => "MASTER_SELECT_TRANSMIT",
            MasterSelectAckReceive => "MASTER_SELECT_ACK_RECEIVE",
            MasterInfoTransmit => "MASTER_INFO_TRANSMIT",
            MasterInfoAckReceive => "MASTER_INFO_ACK_RECEIVE",
            SlaveSelectReceive => "SLAVE_SELECT_RECEIVE",
            SlaveSelectAckTransmit => "SLAVE_SELECT_ACK_TRANSMIT",
            SlaveInfoReceive => "SLAVE_INFO_RECEIVE",
            SlaveInfoAckTransmit => "SLAVE_INFO_ACK_TRANSMIT",
        };
        write!(f, "{}", s)
    }
}

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// The transmission control characters of ISO 1745 that appear on the wire.
#[repr(u8)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, TryFromPrimitive, IntoPrimitive)]
pub enum ControlChar {
    /// start of heading - introduces an information message with a header
    Soh = 0x01,
    /// start of text - introduces the body (or the whole information message if there is no header)
    Stx = 0x02,
    /// end of text - followed by exactly one block check character
    Etx = 0x03,
    /// end of transmission - return to neutral
    Eot = 0x04,
    /// enquiry - poll or select, depending on context
    Enq = 0x05,
    /// positive acknowledgement
    Ack = 0x06,
    /// data link escape - `DLE EOT` is the clear request
    Dle = 0x10,
    /// negative acknowledgement
    Nak = 0x15,
    Syn = 0x16,
    Etb = 0x17,
}

pub const SOH: u8 = ControlChar::Soh as u8;
pub const STX: u8 = ControlChar::Stx as u8;
pub const ETX: u8 = ControlChar::Etx as u8;
pub const EOT: u8 = ControlChar::Eot as u8;
pub const ENQ: u8 = ControlChar::Enq as u8;
pub const ACK: u8 = ControlChar::Ack as u8;
pub const DLE: u8 = ControlChar::Dle as u8;
pub const NAK: u8 = ControlChar::Nak as u8;

/// Station prefixes are limited to this many bytes
pub const MAX_PREFIX_LEN: usize = 15;

/// Maximum length of a framed information message, including introducer, ETX and checksum
pub const MAX_MESSAGE_LEN: usize = 1550;

impl ControlChar {
    /// Every control character that can start a message. SYN, ETB and ETX never do.
    pub fn is_message_start(&self) -> bool {
        use ControlChar::*;

        match self {
            Soh | Stx | Eot | Enq | Ack | Dle | Nak => true,
            Etx | Syn | Etb => false,
        }
    }
}

pub fn is_message_start(b: u8) -> bool {
    ControlChar::try_from(b)
        .map(|c| c.is_message_start())
        .unwrap_or(false)
}

/// Printable characters excluding space, i.e. what is allowed in a station prefix
pub fn is_graphic(b: u8) -> bool {
    b.is_ascii_graphic()
}

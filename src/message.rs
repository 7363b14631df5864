use std::fmt::{Debug, Display, Formatter};

use bytes::{BufMut, Bytes, BytesMut};

use crate::checksum::block_check_character;
use crate::control_chars::{ACK, DLE, ENQ, EOT, ETX, NAK, SOH, STX};

/// What kind of protocol unit a [Message] is, including the two outcomes of parsing that are not
///  actual messages
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum MessageKind {
    /// The unprocessed buffer does not (yet) contain a complete message - wait for more bytes
    None,
    Ack,
    Nak,
    Eot,
    /// Clear request: the receiving station drops all queued data and returns to neutral
    DleEot,
    Enq,
    Info,
    /// Garbage was detected and the unprocessed buffer was discarded
    Malformed,
}

impl Display for MessageKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        use MessageKind::*;

        let s = match self {
            None => "NONE",
            Ack => "ACK",
            Nak => "NAK",
            Eot => "EOT",
            DleEot => "DLE_EOT",
            Enq => "ENQ",
            Info => "INFO",
            Malformed => "MALFORMED",
        };
        write!(f, "{}", s)
    }
}

/// One protocol unit. Supervisory messages may carry a station prefix, information messages
///  carry header and body instead - never both.
#[derive(Clone, Eq, PartialEq)]
pub struct Message {
    pub kind: MessageKind,
    pub prefix: Bytes,
    pub header: Bytes,
    pub body: Bytes,
    /// The block check character. For parsed information messages this is the received (and
    ///  verified) value, it is recalculated during serialization.
    pub checksum: u8,
}

impl Debug for Message {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            MessageKind::Info => write!(f, "INFO{{header:{:?}, body:{} bytes}}", self.header, self.body.len()),
            kind if self.prefix.is_empty() => write!(f, "{}", kind),
            kind => write!(f, "{:?}+{}", self.prefix, kind),
        }
    }
}

impl Message {
    fn supervisory(kind: MessageKind, prefix: Bytes) -> Message {
        Message {
            kind,
            prefix,
            header: Bytes::new(),
            body: Bytes::new(),
            checksum: 0,
        }
    }

    pub fn none() -> Message {
        Self::supervisory(MessageKind::None, Bytes::new())
    }

    pub fn malformed() -> Message {
        Self::supervisory(MessageKind::Malformed, Bytes::new())
    }

    pub fn ack() -> Message {
        Self::supervisory(MessageKind::Ack, Bytes::new())
    }

    pub fn nak() -> Message {
        Self::supervisory(MessageKind::Nak, Bytes::new())
    }

    pub fn eot() -> Message {
        Self::supervisory(MessageKind::Eot, Bytes::new())
    }

    pub fn dle_eot() -> Message {
        Self::supervisory(MessageKind::DleEot, Bytes::new())
    }

    /// A poll or select addressed to the station with the given prefix
    pub fn enq(prefix: impl Into<Bytes>) -> Message {
        Self::supervisory(MessageKind::Enq, prefix.into())
    }

    pub fn with_prefix(kind: MessageKind, prefix: impl Into<Bytes>) -> Message {
        Self::supervisory(kind, prefix.into())
    }

    pub fn info(header: impl Into<Bytes>, body: impl Into<Bytes>) -> Message {
        let mut result = Message {
            kind: MessageKind::Info,
            prefix: Bytes::new(),
            header: header.into(),
            body: body.into(),
            checksum: 0,
        };
        result.checksum = block_check_character(&result.checksum_covered_bytes());
        result
    }

    pub fn is_enq_for(&self, prefix: &[u8]) -> bool {
        self.kind == MessageKind::Enq && self.prefix.as_ref() == prefix
    }

    /// The number of bytes this message occupies on the wire
    pub fn serialized_len(&self) -> usize {
        use MessageKind::*;

        match self.kind {
            Ack | Nak | Eot | Enq => self.prefix.len() + 1,
            DleEot => self.prefix.len() + 2,
            Info => {
                let heading_len = if self.header.is_empty() { 0 } else { self.header.len() + 1 };
                heading_len + 1 + self.body.len() + 2
            }
            None | Malformed => 0,
        }
    }

    /// The bytes of an information message that the block check character covers: everything
    ///  after the introducer up to and including ETX
    fn checksum_covered_bytes(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(self.header.len() + self.body.len() + 2);
        if !self.header.is_empty() {
            buf.put_slice(&self.header);
            buf.put_u8(STX);
        }
        buf.put_slice(&self.body);
        buf.put_u8(ETX);
        buf
    }

    /// Render the message in its exact wire representation.
    ///
    /// NB: Serializing [MessageKind::None] or [MessageKind::Malformed] is a bug in the calling
    ///      code, not a wire condition, and it panics
    pub fn ser(&self, buf: &mut BytesMut) {
        use MessageKind::*;

        if self.kind != Info {
            buf.put_slice(&self.prefix);
        }

        match self.kind {
            Ack => buf.put_u8(ACK),
            Nak => buf.put_u8(NAK),
            Eot => buf.put_u8(EOT),
            Enq => buf.put_u8(ENQ),
            DleEot => {
                buf.put_u8(DLE);
                buf.put_u8(EOT);
            }
            Info => {
                debug_assert!(self.prefix.is_empty(), "information messages have no prefix");

                let covered = self.checksum_covered_bytes();
                buf.put_u8(if self.header.is_empty() { STX } else { SOH });
                buf.put_slice(&covered);
                buf.put_u8(block_check_character(&covered));
            }
            None | Malformed => panic!("this is a bug: attempting to serialize a message of kind {}", self.kind),
        }
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.serialized_len());
        self.ser(&mut buf);
        buf.freeze()
    }
}

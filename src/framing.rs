use bytes::{Buf, BytesMut};
use tracing::debug;

use crate::checksum::block_check_character;
use crate::control_chars::{is_graphic, is_message_start, ACK, DLE, ENQ, EOT, ETX, MAX_PREFIX_LEN, NAK, SOH, STX};
use crate::message::{Message, MessageKind};

/// Try to extract a single message from the front of the unprocessed buffer.
///
/// The result is either
/// * a message of kind [MessageKind::None] if the buffer does not contain a complete message yet.
///    The buffer is left untouched, and the caller should wait for more bytes.
/// * a fully populated message, in which case its bytes are removed from the buffer
/// * a message of kind [MessageKind::Malformed] if garbage was detected. The entire buffer is
///    discarded in this case.
///
/// This function never blocks, and it is meant to be called repeatedly until it returns
///  [MessageKind::None].
///
/// For well-formed input, the sequence of parsed messages does not depend on how the bytes are
///  split into chunks. This does not hold for garbage: it discards the whole buffer, so a message
///  following it is lost if it arrived in the same chunk.
pub fn parse_message(buf: &mut BytesMut, max_message_len: usize) -> Message {
    if buf.is_empty() {
        return Message::none();
    }

    let pos_intro = match buf.iter().position(|&b| is_message_start(b)) {
        Some(pos) => pos,
        None => {
            if buf.len() > MAX_PREFIX_LEN {
                return discard(buf, "prefix too long");
            }
            return Message::none();
        }
    };

    if pos_intro > MAX_PREFIX_LEN {
        return discard(buf, "prefix too long");
    }
    if !buf[..pos_intro].iter().all(|&b| is_graphic(b)) {
        return discard(buf, "prefix contains non-graphic characters");
    }

    let supervisory_kind = match buf[pos_intro] {
        ENQ => Some(MessageKind::Enq),
        EOT => Some(MessageKind::Eot),
        ACK => Some(MessageKind::Ack),
        NAK => Some(MessageKind::Nak),
        DLE => {
            match buf.get(pos_intro + 1) {
                None => return Message::none(),
                Some(&EOT) => {
                    let prefix = buf.split_to(pos_intro).freeze();
                    buf.advance(2);
                    return Message::with_prefix(MessageKind::DleEot, prefix);
                }
                Some(_) => return discard(buf, "DLE not followed by EOT"),
            }
        }
        _ => None,
    };
    if let Some(kind) = supervisory_kind {
        let prefix = buf.split_to(pos_intro).freeze();
        buf.advance(1);
        return Message::with_prefix(kind, prefix);
    }

    // the only remaining introducers are SOH and STX
    let introducer = buf[pos_intro];
    debug_assert!(introducer == SOH || introducer == STX);

    if pos_intro > 0 {
        return discard(buf, "information message with prefix");
    }

    let pos_etx = match buf.iter().position(|&b| b == ETX) {
        Some(pos) => pos,
        None => {
            if buf.len() > max_message_len {
                return discard(buf, "information message without ETX exceeds maximum length");
            }
            return Message::none();
        }
    };

    let pos_stx = if introducer == STX {
        Some(0)
    }
    else {
        buf[..pos_etx].iter().position(|&b| b == STX)
    };
    let pos_stx = match pos_stx {
        Some(pos) => pos,
        None => return discard(buf, "information message without STX"),
    };

    if buf.len() == pos_etx + 1 {
        // checksum not received yet
        return Message::none();
    }

    if pos_etx + 2 > max_message_len {
        return discard(buf, "information message too long");
    }

    let received_checksum = buf[pos_etx + 1];
    let expected_checksum = block_check_character(&buf[1..=pos_etx]);
    if received_checksum != expected_checksum {
        debug!("checksum mismatch: received {:#04x}, expected {:#04x}", received_checksum, expected_checksum);
        return discard(buf, "information message with checksum error");
    }

    let mut frame = buf.split_to(pos_etx + 2);
    frame.advance(1);
    let header = if pos_stx > 0 {
        let header = frame.split_to(pos_stx - 1).freeze();
        frame.advance(1);
        header
    }
    else {
        Default::default()
    };
    let body = frame.split_to(pos_etx - pos_stx - 1).freeze();

    Message {
        kind: MessageKind::Info,
        prefix: Default::default(),
        header,
        body,
        checksum: received_checksum,
    }
}

fn discard(buf: &mut BytesMut, reason: &str) -> Message {
    debug!("malformed input ({}) - discarding {} unprocessed bytes", reason, buf.len());
    buf.clear();
    Message::malformed()
}

//! A half-duplex link layer for a single serial channel, following the basic mode control
//!  procedures of ISO 1745 ("alternate two-way transfer of information with alternate
//!  supervision on the same channel").
//!
//! The underlying transport (typically a serial radio modem) cannot send and receive at the same
//!  time, and it loses or mangles bytes. Both stations therefore need to agree, byte for byte, on
//!  whose turn it is to talk. At any given time a station is either *master* (allowed to send
//!  information blocks), *slave* (expected to receive and acknowledge them) or *neutral*.
//!
//! ## Roles
//!
//! * Exactly one station of a link is the *controller*. It periodically polls the channel while
//!   it is neutral, either bidding for the master role itself (if it has data to send) or
//!   offering the master role to its peer.
//! * The other station is the *responder*. It never initiates anything, it only answers polls
//!   and selections.
//! * Stations are addressed by a short printable prefix: the controller is `alpha`, the
//!   responder is `bravo` by default.
//!
//! ## Wire format
//!
//! All control characters are single bytes:
//!
//! ```ascii
//! SOH=01 STX=02 ETX=03 EOT=04 ENQ=05 ACK=06 DLE=10 NAK=15 SYN=16 ETB=17
//! ```
//!
//! *Supervisory messages* carry an optional station prefix (0-15 printable graphic characters):
//!
//! ```ascii
//! [prefix] ENQ | EOT | ACK | NAK
//! [prefix] DLE EOT                        clear request
//! ```
//!
//! *Information messages* never carry a prefix:
//!
//! ```ascii
//! SOH [header] STX [body] ETX [bcc]
//! STX [body] ETX [bcc]                    no header
//! ```
//!
//! `bcc` is the block check character: the 8-bit sum of all bytes after the introducing SOH /
//!  STX up to and including the ETX, plus one (see [checksum]). An information message is at
//!  most 1550 bytes long including framing.
//!
//! ## Exchanges
//!
//! Controller with data to send (P = alpha, Q = bravo):
//!
//! ```ascii
//! P: EOT  alpha ENQ  bravo ENQ          flush, announce, select bravo as slave
//! Q:                             ACK
//! P: STX ... ETX bcc                    one block at a time
//! Q:                             ACK    (NAK requests a retransmission)
//! P: EOT                                back to neutral
//! ```
//!
//! Controller without data to send:
//!
//! ```ascii
//! P: EOT  bravo ENQ                     poll bravo
//! Q:                 alpha ENQ          bravo has data and selects alpha as slave
//! P: ACK                                ... and the roles of the first exchange are swapped
//! Q:                 EOT                (instead: bravo has nothing to send)
//! ```
//!
//! A `DLE EOT` clear request from either side discards all queued (and unacknowledged) data on
//!  the receiving station and returns it to neutral.
//!
//! ## Timers
//!
//! * no-response (timer A): bounds the wait for a reply to a poll, selection or block
//! * no-receive (timer B): bounds the assembly of a partially received block
//! * no-activity (timer D): returns a station to neutral when the line goes quiet
//! * poll: the controller's polling period
//!
//! The [peer::Peer] engine runs as a single task; application code talks to it through a
//!  [handle::PeerHandle] from any thread.

pub mod checksum;
pub mod config;
pub mod control_chars;
pub mod events;
pub mod framing;
pub mod handle;
pub mod message;
pub mod peer;
mod queues;
pub mod serial_link;
pub mod state;
pub mod timers;

#[cfg(test)]
mod test_util;

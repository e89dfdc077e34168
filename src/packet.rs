//! RSP packet framing.
//!
//! A packet is `$<payload>#<cc>`, where `cc` is the mod-256 sum of the payload bytes
//! as they appear on the wire. Asynchronous notifications use `%` in place of `$`.
//! Within a payload, `}` escapes the following byte (XOR 0x20), and `*` repeats the
//! previous byte `n - 29` more times, where `n` is the byte following the `*`.

use std::fmt;
use std::io::Read;

use tracing::trace;

use crate::error::{Error, Result};
use crate::hex;

/// Header of a stop notification, following the `%`.
const STOP_NOTIFICATION_HEADER: &[u8; 5] = b"Stop:";

/// Leading bytes of the syscall stop replies that we cache while awaiting other replies.
const SYSCALL_STOP_PREFIX: &[u8] = b"T05syscall";

const ESCAPE: u8 = b'}';
const REPEAT: u8 = b'*';

/// Count bytes are offset by this amount, so that they stay printable.
const REPEAT_BIAS: u8 = 29;

/// A decoded packet payload, with escapes and run-length encoding undone.
#[derive(Clone, Eq, PartialEq)]
pub struct Packet {
    data: Vec<u8>,
    notification: bool,
}

impl Packet {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        let data = data.into();
        Self { data, notification: false }
    }

    pub fn notification(data: impl Into<Vec<u8>>) -> Self {
        let data = data.into();
        Self { data, notification: true }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Whether this arrived as a `%`-framed asynchronous notification.
    pub fn is_notification(&self) -> bool {
        self.notification
    }

    pub fn is_ok(&self) -> bool {
        self.data == b"OK"
    }

    /// Whether this has the shape of a syscall entry/return stop, which may arrive
    /// unsolicited between synchronous exchanges.
    pub fn is_syscall_stop(&self) -> bool {
        self.data.starts_with(SYSCALL_STOP_PREFIX)
    }

    /// The code of an `Exx` error reply.
    pub fn error_code(&self) -> Option<u8> {
        match self.data.as_slice() {
            [b'E', hi, lo] => {
                let hi = hex::decode_hex_digit(*hi)?;
                let lo = hex::decode_hex_digit(*lo)?;
                Some((hi << 4) | lo)
            },
            _ => None,
        }
    }

    pub fn starts_with(&self, prefix: &[u8]) -> bool {
        self.data.starts_with(prefix)
    }
}

impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sigil = if self.notification { '%' } else { '$' };
        write!(f, "{}{}", sigil, String::from_utf8_lossy(&self.data))
    }
}

/// Sum of `data`, mod 256.
pub fn checksum(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |sum, b| sum.wrapping_add(*b))
}

/// Frame `payload` as `$<payload>#<cc>`.
///
/// The payload is sent as-is: callers embedding binary data must [`escape`] it first.
pub fn frame(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 4);

    out.push(b'$');
    out.extend_from_slice(payload);
    out.push(b'#');
    out.extend_from_slice(&hex::encode_hex_byte(checksum(payload)));

    out
}

/// Append `data` to `out`, escaping bytes that are significant to the framing.
pub fn escape(data: &[u8], out: &mut Vec<u8>) {
    out.reserve(data.len());

    for b in data {
        match *b {
            b'$' | b'#' | b'%' | ESCAPE | REPEAT => {
                out.push(ESCAPE);
                out.push(b ^ 0x20);
            },
            b => out.push(b),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum State {
    // Scanning for the start of a packet.
    Seek,

    // Inside the payload.
    Data,

    // After a `}`.
    Escape,

    // After a `*`, expecting a count byte.
    Repeat,

    // After the `#`, with the number of checksum digits seen so far.
    Checksum(usize),
}

struct Decoder {
    data: Vec<u8>,
    notification: bool,
    sum: u8,
    received: [u8; 2],
}

impl Decoder {
    fn new() -> Self {
        Self {
            data: Vec::new(),
            notification: false,
            sum: 0,
            received: [0; 2],
        }
    }

    fn start(&mut self, notification: bool) -> State {
        if !self.data.is_empty() {
            trace!(discarded = self.data.len(), "packet start inside payload, restarting");
        }

        self.data.clear();
        self.sum = 0;
        self.notification = notification;

        State::Data
    }

    fn data(&mut self, b: u8) -> State {
        match b {
            b'#' => return State::Checksum(0),
            b'$' => return self.start(false),
            _ => {},
        }

        self.sum = self.sum.wrapping_add(b);

        match b {
            ESCAPE => State::Escape,
            REPEAT if !self.data.is_empty() => State::Repeat,
            _ => {
                self.data.push(b);
                State::Data
            },
        }
    }

    fn escaped(&mut self, b: u8) -> State {
        self.sum = self.sum.wrapping_add(b);
        self.data.push(b ^ 0x20);
        State::Data
    }

    fn repeat(&mut self, b: u8) -> State {
        let valid = (REPEAT_BIAS..=126).contains(&b) && b != b'#' && b != b'$';

        if !valid {
            // Not a run: keep the `*` as data, and treat `b` as an ordinary payload byte.
            self.data.push(REPEAT);
            return self.data(b);
        }

        self.sum = self.sum.wrapping_add(b);

        let count = usize::from(b - REPEAT_BIAS);

        if let Some(last) = self.data.last().copied() {
            self.data.resize(self.data.len() + count, last);
        }

        State::Data
    }

    fn finish(mut self) -> (Packet, bool) {
        let received = match (
            hex::decode_hex_digit(self.received[0]),
            hex::decode_hex_digit(self.received[1]),
        ) {
            (Some(hi), Some(lo)) => Some((hi << 4) | lo),
            _ => None,
        };

        let ok = received == Some(self.sum);

        if !ok {
            trace!(computed = self.sum, ?received, "checksum mismatch");
        }

        if self.notification && self.data.starts_with(STOP_NOTIFICATION_HEADER) {
            self.data.drain(..STOP_NOTIFICATION_HEADER.len());
        }

        let packet = Packet { data: self.data, notification: self.notification };

        (packet, ok)
    }
}

/// Read the next packet from `reader`, returning it with whether its checksum matched.
///
/// Bytes before the next `$` or `%` (such as stray acks) are skipped. Reaching the end
/// of the stream is an error: a torn stream cannot be resynchronized.
pub fn read_packet<R: Read>(reader: &mut R) -> Result<(Packet, bool)> {
    let mut decoder = Decoder::new();
    let mut state = State::Seek;

    for byte in reader.bytes() {
        let b = byte?;

        state = match state {
            State::Seek => {
                match b {
                    b'$' => decoder.start(false),
                    b'%' => decoder.start(true),
                    _ => {
                        trace!(byte = b, "skipping byte outside of packet");
                        State::Seek
                    },
                }
            },
            State::Data => decoder.data(b),
            State::Escape => decoder.escaped(b),
            State::Repeat => decoder.repeat(b),
            State::Checksum(seen) => {
                decoder.received[seen] = b;

                if seen == 1 {
                    let (packet, ok) = decoder.finish();
                    trace!(?packet, ok, "received packet");
                    return Ok((packet, ok));
                }

                State::Checksum(seen + 1)
            },
        };
    }

    Err(Error::Disconnected)
}

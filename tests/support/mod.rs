use std::io::{self, Cursor, Write};
use std::sync::{Arc, Mutex};

use rsptrace::packet::frame;
use rsptrace::Connection;

#[allow(unused)]
macro_rules! pid {
    ($raw: expr) => {
        rsptrace::Pid::from_raw($raw)
    };
}

/// Parse a stop reply payload from a string literal.
#[allow(unused)]
macro_rules! stop {
    ($payload: expr) => {
        rsptrace::StopReply::parse($payload.as_bytes())
    };
}

/// Frame `payload` as a `$` packet.
#[allow(unused)]
pub fn packet(payload: &str) -> Vec<u8> {
    frame(payload.as_bytes())
}

/// Frame `payload` as a `%` notification.
#[allow(unused)]
pub fn notification(payload: &str) -> Vec<u8> {
    let mut framed = frame(payload.as_bytes());
    framed[0] = b'%';
    framed
}

/// Bytes a stub sends, in order.
///
/// A stub in ack mode acks each request with `+` before its reply, so `reply()`
/// prepends one while acks are on.
#[derive(Clone, Debug)]
pub struct Script {
    bytes: Vec<u8>,
    ack: bool,
}

#[allow(unused)]
impl Script {
    pub fn new() -> Self {
        Self { bytes: vec![], ack: true }
    }

    /// Stop acking, as after a stub has accepted `QStartNoAckMode`.
    pub fn no_ack(mut self) -> Self {
        self.ack = false;
        self
    }

    pub fn ack(mut self) -> Self {
        self.bytes.push(b'+');
        self
    }

    pub fn nack(mut self) -> Self {
        self.bytes.push(b'-');
        self
    }

    pub fn raw(mut self, bytes: &[u8]) -> Self {
        self.bytes.extend_from_slice(bytes);
        self
    }

    /// Ack the request, then send `payload` as its reply.
    pub fn reply(self, payload: &str) -> Self {
        let script = if self.ack { self.ack() } else { self };
        script.send(payload)
    }

    /// Ack a request that gets no reply packet.
    pub fn accept(self) -> Self {
        if self.ack {
            self.ack()
        } else {
            self
        }
    }

    /// Send `payload` without acking anything.
    pub fn send(self, payload: &str) -> Self {
        let framed = packet(payload);
        self.raw(&framed)
    }

    pub fn notify(self, payload: &str) -> Self {
        let framed = notification(payload);
        self.raw(&framed)
    }

    pub fn connect(self) -> io::Result<(Connection, Capture)> {
        let capture = Capture::default();
        let conn = Connection::begin(Cursor::new(self.bytes), capture.clone())
            .map_err(|err| io::Error::new(io::ErrorKind::Other, err))?;

        Ok((conn, capture))
    }
}

/// Bytes written by the client.
#[derive(Clone, Debug, Default)]
pub struct Capture(Arc<Mutex<Vec<u8>>>);

#[allow(unused)]
impl Capture {
    pub fn bytes(&self) -> Vec<u8> {
        self.0.lock().unwrap().clone()
    }

    /// Payloads of the packets sent, in order.
    pub fn packets(&self) -> Vec<String> {
        let bytes = self.bytes();
        let mut packets = vec![];
        let mut rest = &bytes[..];

        while let Some(start) = rest.iter().position(|b| *b == b'$') {
            let body = &rest[start + 1..];
            let end = body.iter().position(|b| *b == b'#').unwrap();
            packets.push(String::from_utf8_lossy(&body[..end]).into_owned());
            rest = &body[end + 3..];
        }

        packets
    }

    /// Acks and nacks sent, in order.
    pub fn acks(&self) -> String {
        let bytes = self.bytes();
        let mut acks = String::new();
        let mut in_packet = false;

        // Checksum digits are never `+` or `-`.
        for b in bytes {
            match b {
                b'$' => in_packet = true,
                b'#' if in_packet => in_packet = false,
                b'+' | b'-' if !in_packet => acks.push(b as char),
                _ => {},
            }
        }

        acks
    }
}

impl Write for Capture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

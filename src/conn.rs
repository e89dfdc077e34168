//! Transport to the remote stub: framing, acknowledgments and reply sequencing.
//!
//! Exactly one synchronous request is outstanding at a time. Every send blocks until
//! the stub acks (while acks are enabled), and every receive blocks until a complete
//! packet arrives. There is no recovery from a torn stream.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::os::unix::io::OwnedFd;

use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::notify::NotificationQueue;
use crate::packet::{self, Packet};

/// Duplex byte stream to a stub, with separate read and write handles.
pub struct Connection {
    reader: BufReader<Box<dyn Read + Send>>,
    writer: Box<dyn Write + Send>,

    /// Whether packets are acknowledged with `+`/`-`.
    ack: bool,

    /// Whether the stub was put in non-stop mode.
    non_stop: bool,

    notifications: NotificationQueue,

    /// Other stop notifications that arrived while awaiting a reply, such as a
    /// process exit reported before the `OK` to a resume.
    deferred: VecDeque<Packet>,
}

impl Connection {
    /// Start a session over the given read and write halves of one stream.
    ///
    /// Acks start enabled. An initial `+` is written to resynchronize with a stub
    /// that may still be waiting on an ack for stale output.
    pub fn begin(
        reader: impl Read + Send + 'static,
        writer: impl Write + Send + 'static,
    ) -> Result<Self> {
        let reader: Box<dyn Read + Send> = Box::new(reader);
        let writer: Box<dyn Write + Send> = Box::new(writer);

        let mut conn = Self {
            reader: BufReader::new(reader),
            writer,
            ack: true,
            non_stop: false,
            notifications: NotificationQueue::default(),
            deferred: VecDeque::new(),
        };

        conn.write_raw(b"+")?;

        Ok(conn)
    }

    /// Start a session over a descriptor, duplicating it into read and write handles.
    pub fn begin_fd(fd: OwnedFd) -> Result<Self> {
        let writer = File::from(fd);
        let reader = writer.try_clone()?;

        Self::begin(reader, writer)
    }

    pub fn acks_enabled(&self) -> bool {
        self.ack
    }

    pub fn non_stop(&self) -> bool {
        self.non_stop
    }

    pub(crate) fn set_non_stop(&mut self, non_stop: bool) {
        self.non_stop = non_stop;
    }

    pub fn notifications(&self) -> &NotificationQueue {
        &self.notifications
    }

    pub fn notifications_mut(&mut self) -> &mut NotificationQueue {
        &mut self.notifications
    }

    /// Whether a cached stop notification awaits the next event poll.
    pub fn has_pending_notification(&self) -> bool {
        self.notifications.has_pending() || !self.deferred.is_empty()
    }

    /// Take the oldest deferred stop notification.
    pub fn take_deferred(&mut self) -> Option<Packet> {
        self.deferred.pop_front()
    }

    fn write_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.writer.write_all(bytes)?;
        self.writer.flush()?;
        Ok(())
    }

    fn read_byte(&mut self) -> Result<u8> {
        let mut byte = [0u8];

        match self.reader.read_exact(&mut byte) {
            Ok(()) => Ok(byte[0]),
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => Err(Error::Disconnected),
            Err(err) => Err(err.into()),
        }
    }

    /// Send `payload` as one packet.
    ///
    /// While acks are enabled, this blocks for the stub's ack and resends the whole
    /// packet for as long as it answers with `-`.
    pub fn send(&mut self, payload: &[u8]) -> Result<()> {
        let framed = packet::frame(payload);

        loop {
            trace!(packet = %String::from_utf8_lossy(payload), "sending packet");
            self.write_raw(&framed)?;

            if !self.ack {
                return Ok(());
            }

            loop {
                match self.read_byte()? {
                    b'+' => return Ok(()),
                    b'-' => {
                        warn!(packet = %String::from_utf8_lossy(payload), "stub rejected packet, resending");
                        break;
                    },
                    other => trace!(byte = other, "skipping byte while awaiting ack"),
                }
            }
        }
    }

    pub fn send_str(&mut self, payload: &str) -> Result<()> {
        self.send(payload.as_bytes())
    }

    /// Receive one packet.
    ///
    /// Unless `want_stop` is set, a syscall stop that shows up in place of the awaited
    /// reply is moved to the notification queue, any other stop notification is
    /// deferred, and the next packet is received instead. While acks are enabled, packets with a bad checksum are rejected with
    /// `-` until the stub retransmits them intact.
    pub fn recv(&mut self, want_stop: bool) -> Result<Packet> {
        loop {
            let (packet, ok) = packet::read_packet(&mut self.reader)?;

            if self.ack {
                self.write_raw(if ok { b"+" } else { b"-" })?;

                if !ok {
                    warn!(?packet, "bad checksum, requesting retransmission");
                    continue;
                }
            } else if !ok {
                warn!(?packet, "bad checksum with acks disabled, accepting packet");
            }

            if !want_stop {
                if packet.is_syscall_stop() {
                    // Overflow is logged by the queue, and the stub will resend.
                    let _ = self.notifications.push(packet);
                    continue;
                }

                if packet.is_notification() {
                    debug!(?packet, "deferring notification received while awaiting a reply");
                    self.deferred.push_back(packet);
                    continue;
                }
            }

            return Ok(packet);
        }
    }

    /// Send `payload`, then receive its reply.
    pub fn request(&mut self, payload: &[u8]) -> Result<Packet> {
        self.send(payload)?;
        self.recv(false)
    }

    pub fn request_str(&mut self, payload: &str) -> Result<Packet> {
        self.request(payload.as_bytes())
    }

    /// Send `payload`, and fail unless the stub replies `OK`.
    pub fn request_ok(&mut self, payload: &str) -> Result<()> {
        let reply = self.request_str(payload)?;

        if reply.is_ok() {
            return Ok(());
        }

        if let Some(code) = reply.error_code() {
            let request = payload.to_owned();
            return Err(Error::Remote { request, code });
        }

        Err(Error::unexpected(payload, reply.data()))
    }

    /// Ask the stub to stop acknowledging packets.
    ///
    /// Returns whether the stub agreed. Once it has, acks stay disabled for the rest of
    /// the session.
    pub fn enable_noack(&mut self) -> Result<bool> {
        let reply = self.request_str("QStartNoAckMode")?;

        if reply.is_ok() {
            debug!("acks disabled");
            self.ack = false;
        }

        Ok(!self.ack)
    }
}

//! Stop replies: receiving them, and classifying them into structured events.

use std::convert::TryFrom;
use std::fmt;

use tracing::{debug, trace};

use crate::conn::Connection;
use crate::error::Result;
use crate::hex;
use crate::packet::Packet;
use crate::signal::{GdbSignal, GDB_SIGNAL_0, GDB_SIGNAL_TRAP};
use crate::tracees::Pid;

/// A thread as named on the wire: `p<pid>.<tid>`, or a bare `<tid>` naming the
/// thread group leader.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct ThreadId {
    pub pid: Pid,
    pub tid: Pid,
}

impl ThreadId {
    pub fn new(pid: Pid, tid: Pid) -> Self {
        Self { pid, tid }
    }

    /// A thread that leads its own thread group.
    pub fn leader(pid: Pid) -> Self {
        Self { pid, tid: pid }
    }

    /// Parse a thread id. A `-1` thread part is kept as-is, meaning all threads.
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        match bytes.strip_prefix(b"p") {
            Some(rest) => {
                let mut parts = rest.splitn(2, |b| *b == b'.');
                let pid = parse_id(parts.next()?)?;
                let tid = match parts.next() {
                    Some(tid) => parse_id(tid)?,
                    None => pid,
                };

                Some(Self { pid, tid })
            },
            None => {
                let tid = parse_id(bytes)?;
                Some(Self::leader(tid))
            },
        }
    }

    /// Encode for a request, in multiprocess form if the stub supports it.
    pub fn encode(&self, multiprocess: bool) -> String {
        if multiprocess {
            format!("p{}.{}", encode_id(self.pid), encode_id(self.tid))
        } else {
            encode_id(self.tid)
        }
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.pid, self.tid)
    }
}

fn parse_id(bytes: &[u8]) -> Option<Pid> {
    if bytes == b"-1" {
        return Some(Pid::from_raw(-1));
    }

    let id = hex::decode_hex_number(bytes).ok()?;

    i32::try_from(id).ok().map(Pid::from_raw)
}

pub(crate) fn encode_id(id: Pid) -> String {
    match id.as_raw() {
        -1 => "-1".into(),
        id => format!("{:x}", id),
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StopKind {
    Unknown,

    /// `Exx`, with the error number as code.
    Error,

    /// `S`/`T` with a signal other than a trap, with the RSP signal as code.
    Signal,

    /// `S`/`T` with a trap or no signal.
    Trap,

    /// A trap at syscall entry, with the syscall number as code.
    SyscallEntry,

    /// A trap at syscall return, with the syscall number as code.
    SyscallReturn,

    /// `W`, with the exit status as code.
    Exited,

    /// `X`, with the terminating RSP signal as code.
    Terminated,
}

impl StopKind {
    /// Whether this is one of the `S`/`T` kinds.
    pub fn is_signal(self) -> bool {
        matches!(
            self,
            StopKind::Signal | StopKind::Trap | StopKind::SyscallEntry | StopKind::SyscallReturn
        )
    }
}

/// A classified stop reply.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct StopReply {
    pub kind: StopKind,
    pub code: u64,

    /// Thread group of the stopped thread, if the reply names one.
    pub pid: Option<Pid>,

    /// Stopped thread, if the reply names one.
    pub tid: Option<Pid>,
}

/// Result of [`StopReply::parse()`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ParsedStop {
    pub stop: StopReply,

    /// A second `thread:` annotation, naming the stub's new focus thread.
    pub focus: Option<ThreadId>,
}

impl StopReply {
    pub fn unknown() -> Self {
        Self {
            kind: StopKind::Unknown,
            code: 0,
            pid: None,
            tid: None,
        }
    }

    /// The RSP signal of a signal or termination stop.
    pub fn signal(&self) -> Option<GdbSignal> {
        match self.kind {
            StopKind::Signal | StopKind::Trap | StopKind::Terminated => Some(self.code as GdbSignal),
            _ => None,
        }
    }

    /// Classify a stop reply payload.
    ///
    /// Payloads shorter than 3 bytes, or with an unknown leading byte, are `Unknown`.
    /// Annotations without a `:` are skipped.
    pub fn parse(data: &[u8]) -> ParsedStop {
        let mut stop = Self::unknown();
        let mut focus = None;

        if data.len() < 3 {
            return ParsedStop { stop, focus };
        }

        match data[0] {
            b'E' => {
                stop.kind = StopKind::Error;
                stop.code = hex::decode_hex_run(&data[1..], 2);
            },
            b'S' | b'T' => {
                stop.code = hex::decode_hex_run(&data[1..], 2);

                let sig = stop.code as GdbSignal;
                stop.kind = if sig == GDB_SIGNAL_TRAP || sig == GDB_SIGNAL_0 {
                    StopKind::Trap
                } else {
                    StopKind::Signal
                };

                for (key, value) in annotations(&data[3..]) {
                    match key {
                        b"thread" => {
                            let id = match ThreadId::parse(value) {
                                Some(id) => id,
                                None => continue,
                            };

                            if stop.tid.is_none() {
                                stop.pid = Some(id.pid);
                                stop.tid = Some(id.tid);
                            } else {
                                focus = Some(id);
                            }
                        },
                        b"syscall_entry" if stop.kind == StopKind::Trap => {
                            stop.kind = StopKind::SyscallEntry;
                            stop.code = hex::decode_hex_run(value, 16);
                        },
                        b"syscall_return" if stop.kind == StopKind::Trap => {
                            stop.kind = StopKind::SyscallReturn;
                            stop.code = hex::decode_hex_run(value, 16);
                        },
                        _ => {},
                    }
                }
            },
            b'W' | b'X' => {
                stop.kind = if data[0] == b'W' {
                    StopKind::Exited
                } else {
                    StopKind::Terminated
                };
                stop.code = hex::decode_hex_run(&data[1..], 8);

                for (key, value) in annotations(&data[1..]) {
                    if key == b"process" {
                        if let Ok(pid) = hex::decode_hex_number(value) {
                            // Process exits carry no thread.
                            let pid = Pid::from_raw(pid as i32);
                            stop.pid = Some(pid);
                            stop.tid = Some(pid);
                        }
                    }
                }
            },
            _ => {},
        }

        ParsedStop { stop, focus }
    }
}

/// Iterate the `key:value` annotations of a stop reply body.
fn annotations(body: &[u8]) -> impl Iterator<Item = (&[u8], &[u8])> {
    body.split(|b| *b == b';').enumerate().filter_map(|(i, field)| {
        let colon = field.iter().position(|b| *b == b':')?;
        let key = &field[..colon];
        let key = if i == 0 { first_key(key) } else { key };

        Some((key, &field[colon + 1..]))
    })
}

// A register number may run into the first key, as in `T0508thread:`. Keys made of
// letters alone, such as `core` or `fork`, are left whole.
fn first_key(name: &[u8]) -> &[u8] {
    if !name.iter().any(u8::is_ascii_digit) {
        return name;
    }

    let start = name
        .iter()
        .position(|b| !b.is_ascii_hexdigit())
        .unwrap_or(name.len());

    &name[start..]
}

/// Receive the next stop reply packet.
///
/// A `staged` packet, already pulled from the notification queue, is used as-is.
/// Otherwise, in non-stop mode, a cached or deferred notification is preferred over
/// reading the stream, and packets other than `T`/`W` stops (such as the `OK` that may trail a
/// `%Stop`) are skipped. A live `T` stop in non-stop mode is followed by draining the
/// stub's remaining stops with `vStopped`, queueing each until the stub replies `OK`.
pub fn recv_stop(conn: &mut Connection, staged: Option<Packet>) -> Result<Packet> {
    if let Some(packet) = staged {
        trace!(?packet, "replaying staged stop");
        return Ok(packet);
    }

    if !conn.non_stop() {
        return match conn.take_deferred() {
            Some(packet) => Ok(packet),
            None => conn.recv(true),
        };
    }

    if let Some(packet) = conn.notifications_mut().pop() {
        trace!(?packet, "replaying cached stop");
        return Ok(packet);
    }

    let packet = match conn.take_deferred() {
        Some(packet) => {
            trace!(?packet, "replaying deferred stop");
            packet
        },
        None => loop {
            let packet = conn.recv(true)?;

            if packet.starts_with(b"T") || packet.starts_with(b"W") {
                break packet;
            }

            trace!(?packet, "skipping non-stop reply while awaiting stop");
        },
    };

    if packet.starts_with(b"T") {
        drain_stopped(conn)?;
    }

    Ok(packet)
}

fn drain_stopped(conn: &mut Connection) -> Result<()> {
    loop {
        conn.send_str("vStopped")?;
        let reply = conn.recv(true)?;

        if reply.is_ok() {
            return Ok(());
        }

        if reply.starts_with(b"T") {
            debug!(?reply, "queueing stop from vStopped");

            // A full queue is logged, and the stub will report the stop again.
            let _ = conn.notifications_mut().push(reply);
        } else {
            trace!(?reply, "ignoring vStopped reply");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(body: &[u8]) -> Vec<&[u8]> {
        annotations(body).map(|(key, _)| key).collect()
    }

    #[test]
    fn test_annotation_keys() {
        assert_eq!(keys(b"08thread:p1.1;"), vec![&b"thread"[..]]);
        assert_eq!(keys(b"core:1;fork:p1.2;thread:p1.1;"), vec![
            &b"core"[..],
            &b"fork"[..],
            &b"thread"[..],
        ]);
        assert_eq!(keys(b"thread:p1.1;0a:ff;"), vec![&b"thread"[..], &b"0a"[..]]);
        assert_eq!(keys(b"garbage;thread:p1.1;"), vec![&b"thread"[..]]);
    }
}

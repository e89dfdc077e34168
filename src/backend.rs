//! The tracing backend facade, and its implementation over a remote stub.

use std::ffi::OsStr;
use std::os::unix::ffi::OsStrExt;
use std::path::PathBuf;
use std::process::Child;

use nix::errno::Errno;
use tracing::{debug, info, trace, warn};

use crate::conn::Connection;
use crate::error::{Error, Result};
use crate::hex;
use crate::interrupt;
use crate::notify::{NotificationQueue, DEFAULT_CAPACITY};
use crate::packet::{self, Packet};
use crate::session::Session;
use crate::signal::{GdbSignal, Personality, SignalMap, UNMAPPED};
use crate::stop::{self, ParsedStop, StopKind, StopReply, ThreadId};
use crate::target::Target;
use crate::tracees::{Pid, ProcessTable, Tracees};

#[cfg(target_arch = "aarch64")]
use crate::aarch64 as arch;
#[cfg(target_arch = "x86_64")]
use crate::x86 as arch;

pub use arch::Registers;

/// Features requested in `qSupported`.
const SUPPORTED: &str = "qSupported:multiprocess+;QThreadEvents+";

/// Packet size assumed when the stub does not report one.
const DEFAULT_PACKET_SIZE: usize = 0x1000;

/// Room for the framing and command prefix of a reply.
const PACKET_OVERHEAD: usize = 32;

/// A tracing event, as consumed by a generic event loop.
///
/// Every event but `Break` and the process exits leaves the thread `pid` stopped,
/// to be resumed with [`Backend::restart_process()`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Event {
    /// Nothing more to trace, or tracing was interrupted.
    Break,

    /// A stop with nothing to report. The thread should be resumed without a signal.
    Restart { pid: Pid },

    SyscallEnter { pid: Pid, scno: u64 },

    SyscallExit { pid: Pid, scno: u64 },

    /// Signal about to be delivered, as a native signal number.
    SignalDelivery { pid: Pid, signal: i32 },

    /// Group-stop. Never reported by a remote stub, which cannot tell it apart from a
    /// signal delivery.
    GroupStop { pid: Pid, signal: i32 },

    Exited { pid: Pid, exit_code: i32 },

    Signalled { pid: Pid, signal: i32 },
}

/// Operations a tracer needs from a tracing backend.
pub trait Backend {
    /// Connect, and negotiate the protocol features tracing depends on.
    fn init(&mut self) -> Result<()>;

    /// Configure signal reporting, once the backend is initialized.
    fn post_init(&mut self) -> Result<()>;

    /// Start `argv` as a new tracee. Returns the tid of its initial thread.
    fn startup_child(&mut self, argv: &[String]) -> Result<Pid>;

    fn attach_thread(&mut self, pid: Pid) -> Result<()>;

    fn detach_thread(&mut self, pid: Pid) -> Result<()>;

    /// Detach from everything still traced, and release the connection.
    fn cleanup(&mut self) -> Result<()>;

    /// Block for the next event.
    fn next_event(&mut self) -> Result<Event>;

    /// Resume the stopped thread `pid`, delivering the native signal `signal` if set.
    fn restart_process(&mut self, pid: Pid, signal: Option<i32>) -> Result<()>;

    fn registers(&mut self, pid: Pid) -> Result<Registers>;

    fn syscall_number(&mut self, pid: Pid) -> Result<u64>;

    fn set_syscall_number(&mut self, pid: Pid, scno: u64) -> Result<()>;

    /// Read up to `len` bytes at `addr`. A read that fails part way returns the bytes
    /// read so far.
    fn read_memory(&mut self, pid: Pid, addr: u64, len: usize) -> Result<Vec<u8>>;

    /// Write `data` at `addr`, returning the count of bytes written.
    fn write_memory(&mut self, pid: Pid, addr: u64, data: &[u8]) -> Result<usize>;

    /// Read one tracee-sized word.
    fn peek_word(&mut self, pid: Pid, addr: u64) -> Result<u64>;

    /// Write one tracee-sized word.
    fn poke_word(&mut self, pid: Pid, addr: u64, word: u64) -> Result<()>;

    /// Path of the open file `fd` of process `pid`.
    fn fd_path(&mut self, pid: Pid, fd: i32) -> Result<PathBuf>;

    fn handle_group_stop(&mut self, _pid: Pid, _signal: i32) -> Result<()> {
        Ok(())
    }
}

/// Tunables of an [`RspBackend`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Options {
    /// Entries the notification queue can hold.
    pub queue_capacity: usize,

    /// Whether to turn acks off, if the stub allows it.
    pub no_ack: bool,

    /// Whether to try attaching in non-stop mode.
    pub non_stop: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_CAPACITY,
            no_ack: true,
            non_stop: false,
        }
    }
}

/// Features the stub reported in its `qSupported` reply.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Features {
    pub packet_size: Option<usize>,
    pub multiprocess: bool,
    pub no_ack: bool,
    pub catch_syscalls: bool,
    pub xfer_features: bool,
    pub xfer_exec_file: bool,
}

impl Features {
    pub fn parse(reply: &[u8]) -> Self {
        let mut features = Self::default();

        for feature in reply.split(|b| *b == b';') {
            if let Some(size) = feature.strip_prefix(b"PacketSize=") {
                features.packet_size = hex::decode_hex_number(size).ok().map(|n| n as usize);
                continue;
            }

            let enabled = match feature.strip_suffix(b"+") {
                Some(name) => name,
                None => continue,
            };

            match enabled {
                b"multiprocess" => features.multiprocess = true,
                b"QStartNoAckMode" => features.no_ack = true,
                b"QCatchSyscalls" => features.catch_syscalls = true,
                b"qXfer:features:read" => features.xfer_features = true,
                b"qXfer:exec-file:read" => features.xfer_exec_file = true,
                _ => {},
            }
        }

        features
    }

    /// Largest payload to request in one reply.
    fn chunk_size(&self) -> usize {
        let size = self.packet_size.unwrap_or(DEFAULT_PACKET_SIZE);
        size.saturating_sub(PACKET_OVERHEAD).max(1)
    }

    /// Most memory bytes to move per packet. Hex and escaping both can double them.
    fn memory_chunk(&self) -> usize {
        (self.chunk_size() / 2).max(1)
    }
}

/// Tracing backend driving a GDB remote stub, such as `gdbserver --multi`.
pub struct RspBackend<T: ProcessTable = Tracees> {
    target: Option<Target>,
    options: Options,
    conn: Option<Connection>,

    /// Stub spawned for a command target, reaped at cleanup.
    stub: Option<Child>,

    session: Session<T>,
    features: Features,
    signals: SignalMap,

    /// Cleared once the stub rejects a binary `X` write.
    binary_writes: bool,
}

impl RspBackend<Tracees> {
    /// Backend that connects to `target` on [`init()`](Backend::init).
    pub fn new(target: Target) -> Self {
        let options = Options {
            non_stop: target.non_stop(),
            ..Options::default()
        };

        let mut backend = Self::with_table(Tracees::new(), options);
        backend.target = Some(target);
        backend
    }
}

impl<T: ProcessTable> RspBackend<T> {
    /// Backend without a target, using `tracees` as its process table.
    pub fn with_table(tracees: T, options: Options) -> Self {
        Self {
            target: None,
            options,
            conn: None,
            stub: None,
            session: Session::new(tracees),
            features: Features::default(),
            signals: SignalMap::new(Personality::Native),
            binary_writes: true,
        }
    }

    /// Backend over an already established connection.
    pub fn with_connection(conn: Connection, tracees: T, options: Options) -> Self {
        let mut backend = Self::with_table(tracees, options);
        backend.conn = Some(conn);
        backend
    }

    pub fn options(&self) -> Options {
        self.options
    }

    pub fn set_queue_capacity(&mut self, capacity: usize) {
        self.options.queue_capacity = capacity;
    }

    pub fn set_no_ack(&mut self, no_ack: bool) {
        self.options.no_ack = no_ack;
    }

    pub fn set_non_stop(&mut self, non_stop: bool) {
        self.options.non_stop = non_stop;
    }

    pub fn features(&self) -> Features {
        self.features
    }

    pub fn personality(&self) -> Personality {
        self.signals.personality()
    }

    pub fn signals(&self) -> &SignalMap {
        &self.signals
    }

    pub fn session(&self) -> &Session<T> {
        &self.session
    }

    pub fn connection(&self) -> Option<&Connection> {
        self.conn.as_ref()
    }

    fn parts(&mut self) -> Result<(&mut Connection, &mut Session<T>)> {
        match self.conn.as_mut() {
            Some(conn) => Ok((conn, &mut self.session)),
            None => internal_error!("backend not initialized"),
        }
    }

    fn conn(&mut self) -> Result<&mut Connection> {
        self.parts().map(|(conn, _)| conn)
    }

    /// Point register and memory requests at thread `tid`.
    fn select(&mut self, tid: Pid) -> Result<()> {
        let (conn, session) = self.parts()?;
        let thread = session.thread_id(tid)?;
        session.select(conn, thread)
    }

    fn request(&mut self, request: &str) -> Result<Packet> {
        let reply = self.conn()?.request_str(request)?;

        if let Some(code) = reply.error_code() {
            let request = request.to_owned();
            return Err(Error::Remote { request, code });
        }

        Ok(reply)
    }

    /// Read a whole `qXfer` object, in chunks the stub's packet size allows.
    pub fn xfer_read(&mut self, object: &str, annex: &str) -> Result<Vec<u8>> {
        let chunk = self.features.chunk_size();
        let mut data = Vec::new();

        loop {
            let request = format!("qXfer:{}:read:{}:{:x},{:x}", object, annex, data.len(), chunk);
            let reply = self.request(&request)?;

            match reply.data().split_first() {
                Some((b'm', more)) => data.extend_from_slice(more),
                Some((b'l', last)) => {
                    data.extend_from_slice(last);
                    break;
                },
                Some(_) => return Err(Error::unexpected(request, reply.data())),
                None => return Err(Error::Unsupported { what: "qXfer" }),
            }
        }

        Ok(data)
    }

    /// Path of the executable of process `pid`.
    pub fn exec_file(&mut self, pid: Pid) -> Result<PathBuf> {
        if !self.features.xfer_exec_file {
            return Err(Error::Unsupported { what: "qXfer:exec-file" });
        }

        let path = self.xfer_read("exec-file", &stop::encode_id(pid))?;

        Ok(PathBuf::from(OsStr::from_bytes(&path)))
    }

    /// Detect the tracee personality from the target description, and rebuild the
    /// signal map if it changed.
    fn refresh_personality(&mut self) -> Result<()> {
        let personality = if self.features.xfer_features {
            let xml = match self.xfer_read("features", "target.xml") {
                Ok(xml) => xml,
                Err(err) if !err.is_fatal() => {
                    warn!(%err, "could not read target description");
                    return Ok(());
                },
                Err(err) => return Err(err),
            };

            let architecture = architecture(&xml);

            match architecture.and_then(arch::personality_of) {
                Some(personality) => personality,
                None => {
                    warn!(?architecture, "unsupported architecture, assuming native");
                    Personality::Native
                },
            }
        } else {
            Personality::Native
        };

        if personality != self.signals.personality() {
            info!(?personality, "tracee personality changed");
            self.signals = SignalMap::new(personality);
        }

        Ok(())
    }

    fn exit_syscalls(&self) -> (u64, u64) {
        arch::exit_syscalls(self.signals.personality())
    }

    fn classify(&mut self, packet: &Packet) -> Result<Event> {
        let ParsedStop { stop, focus } = StopReply::parse(packet.data());

        trace!(?stop, ?focus, "classified stop");

        let unknown = || Error::UnknownStop {
            reply: String::from_utf8_lossy(packet.data()).into_owned(),
        };

        let non_stop = self.conn()?.non_stop();

        match stop.kind {
            StopKind::Unknown => Err(unknown()),
            StopKind::Error => {
                warn!(code = stop.code, "stub reported an error stop");
                Ok(Event::Break)
            },
            StopKind::Exited | StopKind::Terminated => {
                let pid = match stop.pid.or_else(|| self.session.focus().map(|f| f.pid)) {
                    Some(pid) => pid,
                    None => return Err(unknown()),
                };

                info!(pid = pid.as_raw(), ?stop, "process exited");
                self.session.on_process_exit(pid);

                if stop.kind == StopKind::Exited {
                    Ok(Event::Exited { pid, exit_code: stop.code as i32 })
                } else {
                    let signal = self.to_native(stop.code as GdbSignal).unwrap_or(UNMAPPED);
                    Ok(Event::Signalled { pid, signal })
                }
            },
            _ => {
                let thread = match self.session.resolve(&stop) {
                    Some(thread) => thread,
                    None => return Err(unknown()),
                };

                self.session.register(thread);

                // An all-stop stub moves its focus to the thread that stopped.
                if !non_stop {
                    self.session.set_focus(thread);
                }

                if let Some(focus) = focus {
                    self.session.set_focus(focus);
                }

                Ok(self.signal_event(thread, stop))
            },
        }
    }

    fn signal_event(&mut self, thread: ThreadId, stop: StopReply) -> Event {
        let pid = thread.tid;

        match stop.kind {
            StopKind::SyscallEntry => {
                let exits = self.exit_syscalls();
                self.session.on_syscall_entry(pid, stop.code, exits);
                Event::SyscallEnter { pid, scno: stop.code }
            },
            StopKind::SyscallReturn => {
                self.session.on_syscall_return(pid, stop.code);
                Event::SyscallExit { pid, scno: stop.code }
            },
            StopKind::Signal => match self.to_native(stop.code as GdbSignal) {
                Some(signal) => Event::SignalDelivery { pid, signal },
                None => Event::Restart { pid },
            },
            _ => Event::Restart { pid },
        }
    }

    fn to_native(&self, sig: GdbSignal) -> Option<i32> {
        let native = self.signals.to_native(sig);

        if native.is_none() {
            warn!(signal = sig, "no native counterpart for signal");
        }

        native
    }

    fn read_chunk(&mut self, addr: u64, len: usize, out: &mut Vec<u8>) -> Result<usize> {
        let request = format!("m{:x},{:x}", addr, len);
        let reply = self.request(&request)?;
        let data = reply.data();

        if data.is_empty() {
            return Ok(0);
        }

        let n = data.len().min(len * 2);
        hex::decode_hex_buffer(data, n, out)?;

        Ok(n / 2)
    }

    fn write_chunk(&mut self, addr: u64, data: &[u8]) -> Result<()> {
        if self.binary_writes {
            let mut request = format!("X{:x},{:x}:", addr, data.len()).into_bytes();
            packet::escape(data, &mut request);

            let reply = self.conn()?.request(&request)?;

            if reply.is_ok() {
                return Ok(());
            }

            if let Some(code) = reply.error_code() {
                let request = format!("X{:x},{:x}", addr, data.len());
                return Err(Error::Remote { request, code });
            }

            debug!(?reply, "binary writes unsupported, falling back to hex");
            self.binary_writes = false;
        }

        let request = format!("M{:x},{:x}:{}", addr, data.len(), hex::encode_hex(data));
        self.conn()?.request_ok(&request)
    }
}

/// Text of the `<architecture>` element of a target description.
fn architecture(xml: &[u8]) -> Option<&str> {
    const OPEN: &[u8] = b"<architecture>";
    const CLOSE: &[u8] = b"</architecture>";

    let start = xml.windows(OPEN.len()).position(|w| w == OPEN)? + OPEN.len();
    let len = xml[start..].windows(CLOSE.len()).position(|w| w == CLOSE)?;

    std::str::from_utf8(&xml[start..start + len]).ok().map(str::trim)
}

/// Decode the hex of a `g` reply. Unavailable registers (`xx`) read as zero.
fn decode_registers(data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(data.len() / 2);

    if data.len() % 2 != 0 {
        return Err(Error::InvalidHex);
    }

    for pair in data.chunks_exact(2) {
        if pair == b"xx" {
            out.push(0);
        } else {
            hex::decode_hex_buffer(pair, 2, &mut out)?;
        }
    }

    Ok(out)
}

/// Parse a host I/O reply, `F<result>[,<errno>][;<attachment>]`.
fn parse_file_reply(request: &str, reply: &[u8]) -> Result<(u64, Vec<u8>)> {
    let body = match reply.strip_prefix(b"F") {
        Some(body) => body,
        None => return Err(Error::unexpected(request, reply)),
    };

    let (head, attachment) = match body.iter().position(|b| *b == b';') {
        Some(semi) => (&body[..semi], &body[semi + 1..]),
        None => (body, &[][..]),
    };

    if let Some(rest) = head.strip_prefix(b"-1") {
        let errno = rest
            .strip_prefix(b",")
            .and_then(|errno| hex::decode_hex_number(errno).ok())
            .unwrap_or(libc::EIO as u64);

        return Err(Error::OS(Errno::from_i32(errno as i32)));
    }

    let result = hex::decode_hex_number(head).map_err(|_| Error::unexpected(request, reply))?;

    Ok((result, attachment.to_vec()))
}

impl<T: ProcessTable> Backend for RspBackend<T> {
    fn init(&mut self) -> Result<()> {
        if self.conn.is_none() {
            let target = match &self.target {
                Some(target) => target,
                None => internal_error!("no target to connect to"),
            };

            let (conn, stub) = target.connect()?;
            self.conn = Some(conn);
            self.stub = stub;
        }

        let capacity = self.options.queue_capacity;
        let conn = self.conn()?;
        *conn.notifications_mut() = NotificationQueue::with_capacity(capacity);

        let reply = conn.request_str(SUPPORTED)?;
        let features = Features::parse(reply.data());
        debug!(?features, "stub features");

        if !features.catch_syscalls {
            return Err(Error::MissingFeature { feature: "QCatchSyscalls" });
        }

        if features.no_ack && self.options.no_ack {
            self.conn()?.enable_noack()?;
        }

        let reply = self.conn()?.request_str("!")?;

        if !reply.is_ok() {
            return Err(Error::MissingFeature { feature: "extended-remote" });
        }

        let reply = self.conn()?.request_str("vCont?")?;
        let actions: Vec<&[u8]> = match reply.data().strip_prefix(b"vCont") {
            Some(list) => list.split(|b| *b == b';').skip(1).collect(),
            None => vec![],
        };

        for action in [&b"c"[..], &b"C"[..], &b"t"[..]] {
            if !actions.contains(&action) {
                return Err(Error::MissingFeature { feature: "vCont" });
            }
        }

        self.features = features;
        self.session.set_multiprocess(features.multiprocess);

        info!(multiprocess = features.multiprocess, acks = self.conn()?.acks_enabled(), "initialized");

        Ok(())
    }

    fn post_init(&mut self) -> Result<()> {
        let program = self
            .signals
            .mapped()
            .map(|sig| format!("{:x}", sig))
            .collect::<Vec<_>>()
            .join(";");

        for request in [String::from("QPassSignals:"), format!("QProgramSignals:{}", program)] {
            let reply = self.conn()?.request_str(&request)?;

            if !reply.is_ok() {
                warn!(%request, ?reply, "stub did not accept signal settings");
            }
        }

        Ok(())
    }

    fn startup_child(&mut self, argv: &[String]) -> Result<Pid> {
        let thread = {
            let (conn, session) = self.parts()?;
            session.startup(conn, argv)?
        };

        self.refresh_personality()?;

        match self.exec_file(thread.pid) {
            Ok(path) => info!(pid = thread.pid.as_raw(), path = %path.display(), "tracee executable"),
            Err(err) => debug!(pid = thread.pid.as_raw(), %err, "no tracee executable"),
        }

        Ok(thread.tid)
    }

    fn attach_thread(&mut self, pid: Pid) -> Result<()> {
        let non_stop = self.options.non_stop;

        {
            let (conn, session) = self.parts()?;
            session.attach(conn, pid, non_stop)?;
        }

        self.refresh_personality()
    }

    fn detach_thread(&mut self, pid: Pid) -> Result<()> {
        let (conn, session) = self.parts()?;
        session.detach(conn, pid)
    }

    fn cleanup(&mut self) -> Result<()> {
        if self.conn.is_some() {
            let mut pids: Vec<Pid> = vec![];

            for tid in self.session.tracees().tids() {
                if let Some(thread) = self.session.tracees().lookup(tid) {
                    if !pids.contains(&thread.pid) {
                        pids.push(thread.pid);
                    }
                }
            }

            for pid in pids {
                if let Err(err) = self.detach_thread(pid) {
                    warn!(pid = pid.as_raw(), %err, "could not detach during cleanup");
                }
            }
        }

        self.conn = None;

        if let Some(mut stub) = self.stub.take() {
            debug!(pid = stub.id(), "reaping stub");

            // The stub may already be gone with the connection.
            let _ = stub.kill();
            let status = stub.wait()?;
            debug!(%status, "stub exited");
        }

        Ok(())
    }

    fn next_event(&mut self) -> Result<Event> {
        if interrupt::interrupted() {
            info!("interrupted");
            return Ok(Event::Break);
        }

        let packet = {
            let (conn, session) = self.parts()?;

            if session.is_done(conn) {
                debug!("no tracees left");
                return Ok(Event::Break);
            }

            let mut staged = conn.notifications_mut().pop();

            loop {
                let packet = stop::recv_stop(conn, staged.take())?;

                // Console output of the tracee, relayed by the stub.
                if packet.starts_with(b"O") && !packet.is_ok() {
                    let text = hex::decode_hex(&packet.data()[1..]).unwrap_or_default();
                    info!(output = %String::from_utf8_lossy(&text), "stub output");
                    continue;
                }

                break packet;
            }
        };

        let event = self.classify(&packet)?;
        debug!(?event, "next event");

        Ok(event)
    }

    fn restart_process(&mut self, pid: Pid, signal: Option<i32>) -> Result<()> {
        let sig = match signal {
            None | Some(0) => None,
            Some(native) => {
                let sig = self.signals.to_gdb(native);

                if sig.is_none() {
                    warn!(pid = pid.as_raw(), signal = native, "no RSP number for signal, dropping it");
                }

                sig
            },
        };

        let (conn, session) = self.parts()?;
        let thread = session.thread_id(pid)?;

        session.restart(conn, thread, sig)
    }

    fn registers(&mut self, pid: Pid) -> Result<Registers> {
        self.select(pid)?;

        let reply = self.request("g")?;
        let bytes = decode_registers(reply.data())?;

        Registers::decode(&bytes, self.signals.personality())
    }

    fn syscall_number(&mut self, pid: Pid) -> Result<u64> {
        let cached = self.session.tracees().lookup(pid).and_then(|t| t.scno);

        match cached {
            Some(scno) => Ok(scno),
            None => Ok(self.registers(pid)?.syscall_number()),
        }
    }

    fn set_syscall_number(&mut self, pid: Pid, scno: u64) -> Result<()> {
        self.select(pid)?;

        let personality = self.signals.personality();
        let regno = arch::syscall_regno(personality);
        let value = &scno.to_le_bytes()[..personality.word_size()];

        let request = format!("P{:x}={}", regno, hex::encode_hex(value));
        self.conn()?.request_ok(&request)?;

        if let Some(thread) = self.session.tracees_mut().lookup_mut(pid) {
            thread.scno = Some(scno);
        }

        Ok(())
    }

    fn read_memory(&mut self, pid: Pid, addr: u64, len: usize) -> Result<Vec<u8>> {
        self.select(pid)?;

        let chunk = self.features.memory_chunk();
        let mut data = Vec::with_capacity(len);

        while data.len() < len {
            let want = (len - data.len()).min(chunk);
            let at = addr.wrapping_add(data.len() as u64);

            match self.read_chunk(at, want, &mut data) {
                Ok(n) if n == want => {},
                Ok(_) => break,
                Err(err) if data.is_empty() => return Err(err),
                Err(err) => {
                    debug!(%err, read = data.len(), "partial memory read");
                    break;
                },
            }
        }

        Ok(data)
    }

    fn write_memory(&mut self, pid: Pid, addr: u64, data: &[u8]) -> Result<usize> {
        self.select(pid)?;

        let chunk = self.features.memory_chunk();
        let mut written = 0;

        for part in data.chunks(chunk) {
            let at = addr.wrapping_add(written as u64);

            match self.write_chunk(at, part) {
                Ok(()) => written += part.len(),
                Err(err) if written == 0 => return Err(err),
                Err(err) => {
                    debug!(%err, written, "partial memory write");
                    break;
                },
            }
        }

        Ok(written)
    }

    fn peek_word(&mut self, pid: Pid, addr: u64) -> Result<u64> {
        let size = self.signals.personality().word_size();
        let data = self.read_memory(pid, addr, size)?;

        if data.len() < size {
            let request = format!("m{:x},{:x}", addr, size);
            return Err(Error::Remote { request, code: libc::EIO as u8 });
        }

        let mut word = [0u8; 8];
        word[..size].copy_from_slice(&data);

        Ok(u64::from_le_bytes(word))
    }

    fn poke_word(&mut self, pid: Pid, addr: u64, word: u64) -> Result<()> {
        let size = self.signals.personality().word_size();
        let written = self.write_memory(pid, addr, &word.to_le_bytes()[..size])?;

        if written < size {
            let request = format!("M{:x},{:x}", addr, size);
            return Err(Error::Remote { request, code: libc::EIO as u8 });
        }

        Ok(())
    }

    fn fd_path(&mut self, pid: Pid, fd: i32) -> Result<PathBuf> {
        let group = self
            .session
            .tracees()
            .lookup(pid)
            .map(|t| t.pid)
            .unwrap_or(pid);

        let path = format!("/proc/{}/fd/{}", group, fd);
        let request = format!("vFile:readlink:{}", hex::encode_hex(path.as_bytes()));

        let reply = self.conn()?.request_str(&request)?;
        let (len, target) = parse_file_reply(&request, reply.data())?;

        if target.len() as u64 != len {
            return Err(Error::unexpected(request, reply.data()));
        }

        Ok(PathBuf::from(OsStr::from_bytes(&target)))
    }
}

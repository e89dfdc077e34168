//! Session state shared by every exchange with the stub: the thread table, the
//! stub's focus thread, and the counters that decide when tracing is over.
//!
//! All the attach, startup, continue and detach handshakes live here, so that focus
//! and the counters are only ever updated in one place.

use std::collections::BTreeSet;

use tracing::{debug, info, trace, warn};

use crate::conn::Connection;
use crate::error::{Error, Result};
use crate::hex;
use crate::signal::{GdbSignal, GDB_SIGNAL_STOP};
use crate::stop::{self, encode_id, StopKind, StopReply, ThreadId};
use crate::tracees::{Pid, ProcessTable, State, Thread, Tracees};

pub struct Session<T: ProcessTable = Tracees> {
    tracees: T,

    /// Thread the stub's register and memory requests currently apply to.
    focus: Option<ThreadId>,

    /// Threads registered and not yet seen exiting.
    live: usize,

    /// Thread groups seen entering `exit_group`, but whose exit is not yet reported.
    exit_groups: BTreeSet<i32>,

    multiprocess: bool,

    /// Whether `QCatchSyscalls:1` has been accepted.
    catching: bool,
}

impl<T: ProcessTable + Default> Default for Session<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: ProcessTable> Session<T> {
    pub fn new(tracees: T) -> Self {
        Self {
            tracees,
            focus: None,
            live: 0,
            exit_groups: BTreeSet::new(),
            multiprocess: false,
            catching: false,
        }
    }

    pub fn tracees(&self) -> &T {
        &self.tracees
    }

    pub fn tracees_mut(&mut self) -> &mut T {
        &mut self.tracees
    }

    pub fn multiprocess(&self) -> bool {
        self.multiprocess
    }

    pub fn set_multiprocess(&mut self, multiprocess: bool) {
        self.multiprocess = multiprocess;
    }

    pub fn focus(&self) -> Option<ThreadId> {
        self.focus
    }

    pub fn set_focus(&mut self, thread: ThreadId) {
        trace!(%thread, "setting focus");
        self.focus = Some(thread);
    }

    pub fn live(&self) -> usize {
        self.live
    }

    pub fn exit_groups(&self) -> usize {
        self.exit_groups.len()
    }

    /// Whether no further stop can be expected from the stub.
    pub fn is_done(&self, conn: &Connection) -> bool {
        self.live == 0 && self.exit_groups.is_empty() && !conn.has_pending_notification()
    }

    /// Look up the full id of a known thread.
    pub fn thread_id(&self, tid: Pid) -> Result<ThreadId> {
        self.tracees
            .lookup(tid)
            .map(|t| ThreadId::new(t.pid, t.tid))
            .ok_or(Error::UnknownTracee { tid })
    }

    /// Track `thread`, if it is not known yet.
    ///
    /// Returns whether the thread is new.
    pub fn register(&mut self, thread: ThreadId) -> bool {
        if let Some(known) = self.tracees.lookup_mut(thread.tid) {
            known.pid = thread.pid;
            return false;
        }

        let mut record = Thread::new(thread.pid, thread.tid);

        if self.catching {
            record.state = State::Active;
        }

        let record = self.tracees.alloc(record).clone();
        self.tracees.new_tracee(&record);
        self.live += 1;

        debug!(pid = thread.pid.as_raw(), tid = thread.tid.as_raw(), state = ?record.state, live = self.live, "registered thread");

        true
    }

    /// The thread a stop applies to: the one it names, or else the focus thread.
    pub fn resolve(&self, stop: &StopReply) -> Option<ThreadId> {
        match (stop.pid, stop.tid) {
            (Some(pid), Some(tid)) => Some(ThreadId::new(pid, tid)),
            _ => self.focus,
        }
    }

    /// Point the stub's register and memory requests at `thread`.
    pub fn select(&mut self, conn: &mut Connection, thread: ThreadId) -> Result<()> {
        if self.focus == Some(thread) {
            return Ok(());
        }

        conn.request_ok(&format!("Hg{}", thread.encode(self.multiprocess)))?;
        self.set_focus(thread);

        Ok(())
    }

    /// Start `argv` under the stub, stopped before its first instruction.
    pub fn startup(&mut self, conn: &mut Connection, argv: &[String]) -> Result<ThreadId> {
        let mut request = String::from("vRun");

        for arg in argv {
            request.push(';');
            request.push_str(&hex::encode_hex(arg.as_bytes()));
        }

        conn.send_str(&request)?;

        let packet = stop::recv_stop(conn, None)?;
        let parsed = StopReply::parse(packet.data());

        if parsed.stop.kind != StopKind::Trap {
            let reply = String::from_utf8_lossy(packet.data()).into_owned();
            return Err(Error::Startup { reply });
        }

        let thread = match self.resolve(&parsed.stop) {
            Some(thread) => thread,
            None => self.query_current(conn)?,
        };

        info!(pid = thread.pid.as_raw(), tid = thread.tid.as_raw(), "started tracee");

        self.register(thread);
        self.set_focus(thread);
        self.enable_syscall_catching(conn)?;

        Ok(thread)
    }

    /// Ask the stub which thread it is focused on.
    pub fn query_current(&mut self, conn: &mut Connection) -> Result<ThreadId> {
        let reply = conn.request_str("qC")?;

        reply
            .data()
            .strip_prefix(b"QC")
            .and_then(ThreadId::parse)
            .ok_or_else(|| Error::unexpected("qC", reply.data()))
    }

    /// Attach to the process `pid`, halting all of its threads.
    ///
    /// If `non_stop` is set, attaching in non-stop mode is tried first. Any failure
    /// there, short of losing the stream, falls back to attaching in all-stop mode.
    pub fn attach(&mut self, conn: &mut Connection, pid: Pid, non_stop: bool) -> Result<ThreadId> {
        let mut attached = None;

        if non_stop {
            match self.attach_non_stop(conn, pid) {
                Ok(stop) => attached = Some(stop),
                Err(err @ Error::Disconnected) | Err(err @ Error::IO(_)) => return Err(err),
                Err(err) => {
                    warn!(pid = pid.as_raw(), %err, "non-stop attach failed, retrying in all-stop mode");
                    conn.set_non_stop(false);
                },
            }
        }

        let stop = match attached {
            Some(stop) => stop,
            None => self.attach_all_stop(conn, pid)?,
        };

        // Bare thread ids carry no process.
        let group = if self.multiprocess {
            stop.pid.unwrap_or(pid)
        } else {
            pid
        };
        let thread = ThreadId::new(group, stop.tid.unwrap_or(pid));

        if thread.tid != pid {
            // A record made for the requested pid names the wrong thread.
            self.forget(pid);
        }

        info!(pid = thread.pid.as_raw(), tid = thread.tid.as_raw(), non_stop = conn.non_stop(), "attached");

        self.register(thread);
        self.set_focus(thread);
        self.enumerate(conn)?;
        self.enable_syscall_catching(conn)?;

        Ok(thread)
    }

    fn attach_non_stop(&mut self, conn: &mut Connection, pid: Pid) -> Result<StopReply> {
        conn.request_ok("QNonStop:1")?;
        conn.set_non_stop(true);

        conn.request_ok(&format!("vAttach;{}", encode_id(pid)))?;

        let halt = ThreadId::new(pid, Pid::from_raw(-1));
        conn.request_ok(&format!("vCont;t:{}", halt.encode(true)))?;

        let packet = stop::recv_stop(conn, None)?;
        let stop = StopReply::parse(packet.data()).stop;

        match stop.kind {
            StopKind::Trap => Ok(stop),
            StopKind::Signal if stop.code == u64::from(GDB_SIGNAL_STOP) => Ok(stop),
            _ => Err(Error::Attach { pid }),
        }
    }

    fn attach_all_stop(&mut self, conn: &mut Connection, pid: Pid) -> Result<StopReply> {
        let reply = conn.request_str("QNonStop:0")?;

        if !reply.is_ok() {
            debug!(?reply, "stub did not confirm all-stop mode");
        }

        conn.set_non_stop(false);
        conn.send_str(&format!("vAttach;{}", encode_id(pid)))?;

        let packet = stop::recv_stop(conn, None)?;
        let stop = StopReply::parse(packet.data()).stop;

        if stop.kind != StopKind::Trap {
            warn!(pid = pid.as_raw(), ?packet, "unexpected attach stop");
            return Err(Error::Attach { pid });
        }

        Ok(stop)
    }

    /// Register every thread the stub reports. Returns the count of new threads.
    pub fn enumerate(&mut self, conn: &mut Connection) -> Result<usize> {
        let mut request = "qfThreadInfo";
        let mut added = 0;

        loop {
            let reply = conn.request_str(request)?;
            let data = reply.data();

            if data.starts_with(b"l") {
                break;
            }

            let list = match data.strip_prefix(b"m") {
                Some(list) => list,
                None => return Err(Error::unexpected(request, data)),
            };

            for id in list.split(|b| *b == b',') {
                let mut thread = match ThreadId::parse(id) {
                    Some(thread) => thread,
                    None => return Err(Error::unexpected(request, data)),
                };

                // Without multiprocess ids, threads belong to the focused process.
                if !id.starts_with(b"p") {
                    if let Some(focus) = self.focus {
                        thread.pid = focus.pid;
                    }
                }

                if self.register(thread) {
                    added += 1;
                }
            }

            request = "qsThreadInfo";
        }

        debug!(added, "enumerated threads");

        Ok(added)
    }

    /// Ask the stub to report syscall entries and returns.
    pub fn enable_syscall_catching(&mut self, conn: &mut Connection) -> Result<()> {
        if !self.catching {
            conn.request_ok("QCatchSyscalls:1")?;
            self.catching = true;
        }

        for tid in self.tracees.tids() {
            if let Some(thread) = self.tracees.lookup_mut(tid) {
                if thread.state != State::Active {
                    debug!(tid = tid.as_raw(), "thread is active");
                    thread.state = State::Active;
                }
            }
        }

        Ok(())
    }

    /// Resume after a stop of `thread`, delivering `signal` to it if given.
    ///
    /// Nothing is sent while a cached stop is pending, since the next event poll will
    /// consume it without the stub having to run.
    pub fn restart(
        &mut self,
        conn: &mut Connection,
        thread: ThreadId,
        signal: Option<GdbSignal>,
    ) -> Result<()> {
        if conn.has_pending_notification() {
            trace!(%thread, "stop pending, not resuming");
            return Ok(());
        }

        let request = match signal {
            Some(sig) if self.multiprocess => {
                format!("vCont;C{:02x}:{};c", sig, thread.encode(true))
            },
            Some(sig) => format!("C{:02x}", sig),
            // Non-stop mode resumes the focus thread.
            None if conn.non_stop() && self.multiprocess => {
                let focus = self.focus.unwrap_or(thread);
                format!("vCont;c:{}", focus.encode(true))
            },
            None => "vCont;c".into(),
        };

        // Only non-stop mode acknowledges a resume before the next stop.
        if conn.non_stop() {
            conn.request_ok(&request)
        } else {
            conn.send_str(&request)
        }
    }

    /// Detach from process `pid`, and stop tracking its threads.
    ///
    /// A detach the stub refuses is only a warning.
    pub fn detach(&mut self, conn: &mut Connection, pid: Pid) -> Result<()> {
        let request = if self.multiprocess {
            format!("D;{}", encode_id(pid))
        } else {
            "D".into()
        };

        let reply = conn.request_str(&request)?;

        if reply.is_ok() {
            info!(pid = pid.as_raw(), "detached");
        } else {
            let probe = conn.request_str(&format!("T;{}", encode_id(pid)))?;

            if probe.is_ok() {
                warn!(pid = pid.as_raw(), ?reply, "detach failed, process still alive");
            } else {
                debug!(pid = pid.as_raw(), ?reply, "detach failed, process gone");
            }
        }

        self.forget(pid);

        if self.focus.map(|f| f.pid) == Some(pid) {
            self.focus = None;
        }

        Ok(())
    }

    /// Record a syscall entry of `tid`. `exits` holds the `exit` and `exit_group`
    /// syscall numbers of the thread's personality.
    pub fn on_syscall_entry(&mut self, tid: Pid, scno: u64, exits: (u64, u64)) {
        let (exit, exit_group) = exits;

        let pid = match self.tracees.lookup_mut(tid) {
            Some(thread) => {
                thread.scno = Some(scno);
                thread.pid
            },
            None => return,
        };

        if scno == exit {
            self.mark_exiting(tid);
        } else if scno == exit_group {
            debug!(pid = pid.as_raw(), "thread group exiting");
            self.exit_groups.insert(pid.as_raw());

            for tid in self.tracees.threads_of(pid) {
                self.mark_exiting(tid);
            }
        }
    }

    pub fn on_syscall_return(&mut self, tid: Pid, scno: u64) {
        if let Some(thread) = self.tracees.lookup_mut(tid) {
            thread.scno = Some(scno);
        }
    }

    /// Record the reported exit of process `pid`.
    pub fn on_process_exit(&mut self, pid: Pid) {
        self.forget(pid);

        if self.focus.map(|f| f.pid) == Some(pid) {
            self.focus = None;
        }
    }

    fn mark_exiting(&mut self, tid: Pid) {
        if let Some(thread) = self.tracees.lookup_mut(tid) {
            if !thread.exiting {
                thread.exiting = true;
                self.live = self.live.saturating_sub(1);
                debug!(tid = tid.as_raw(), live = self.live, "thread exiting");
            }
        }
    }

    /// Drop every record of `pid`, uncounting those still live.
    fn forget(&mut self, pid: Pid) {
        let mut tids = self.tracees.threads_of(pid);

        // Threads allocated under the pid before their group was known.
        if self.tracees.lookup(pid).is_some() && !tids.contains(&pid) {
            tids.push(pid);
        }

        for tid in tids {
            if let Some(thread) = self.tracees.remove(tid) {
                if !thread.exiting {
                    self.live = self.live.saturating_sub(1);
                }
            }
        }

        self.exit_groups.remove(&pid.as_raw());

        debug!(pid = pid.as_raw(), live = self.live, exit_groups = self.exit_groups.len(), "forgot process");
    }
}

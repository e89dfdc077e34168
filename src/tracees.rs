//! Bookkeeping of traced threads.
//!
//! The tracer owns its process table; the backend only needs to look threads up,
//! allocate records for newly seen ones, and drop records of threads that are gone.

use std::collections::btree_map::{BTreeMap, Entry};

use tracing::debug;

pub use nix::unistd::Pid;

/// Tracing state of a known thread. Threads not in the table are unknown.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum State {
    /// Allocated, but the stub is not yet catching its syscalls.
    Registered,

    /// Syscall catching is enabled, and events flow normally.
    Active,
}

/// Record of one traced thread.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Thread {
    /// Thread group id.
    pub pid: Pid,

    /// Thread id.
    pub tid: Pid,

    pub state: State,

    /// Syscall number reported by the last syscall stop.
    pub scno: Option<u64>,

    /// Seen entering an exit syscall; no longer counted as live.
    pub exiting: bool,
}

impl Thread {
    pub fn new(pid: Pid, tid: Pid) -> Self {
        Self {
            pid,
            tid,
            state: State::Registered,
            scno: None,
            exiting: false,
        }
    }
}

/// Process table interface consumed by the backend.
pub trait ProcessTable {
    fn lookup(&self, tid: Pid) -> Option<&Thread>;

    fn lookup_mut(&mut self, tid: Pid) -> Option<&mut Thread>;

    /// Insert a record, replacing any record with the same tid.
    fn alloc(&mut self, thread: Thread) -> &mut Thread;

    fn remove(&mut self, tid: Pid) -> Option<Thread>;

    /// Tids of all known threads, in ascending order.
    fn tids(&self) -> Vec<Pid>;

    /// Called once for each thread the first time it is seen.
    fn new_tracee(&mut self, _thread: &Thread) {}

    /// Tids of the known threads of thread group `pid`.
    fn threads_of(&self, pid: Pid) -> Vec<Pid> {
        self.tids()
            .into_iter()
            .filter(|tid| self.lookup(*tid).map(|t| t.pid) == Some(pid))
            .collect()
    }

    fn is_empty(&self) -> bool {
        self.tids().is_empty()
    }
}

/// Default process table, keyed by tid.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Tracees {
    threads: BTreeMap<i32, Thread>,
}

impl Tracees {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.threads.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Thread> {
        self.threads.values()
    }
}

impl ProcessTable for Tracees {
    fn lookup(&self, tid: Pid) -> Option<&Thread> {
        self.threads.get(&tid.as_raw())
    }

    fn lookup_mut(&mut self, tid: Pid) -> Option<&mut Thread> {
        self.threads.get_mut(&tid.as_raw())
    }

    fn alloc(&mut self, thread: Thread) -> &mut Thread {
        debug!(pid = thread.pid.as_raw(), tid = thread.tid.as_raw(), "allocating tracee");

        match self.threads.entry(thread.tid.as_raw()) {
            Entry::Occupied(mut entry) => {
                entry.insert(thread);
                entry.into_mut()
            },
            Entry::Vacant(entry) => entry.insert(thread),
        }
    }

    fn remove(&mut self, tid: Pid) -> Option<Thread> {
        debug!(tid = tid.as_raw(), "removing tracee");

        self.threads.remove(&tid.as_raw())
    }

    fn tids(&self) -> Vec<Pid> {
        self.threads.keys().map(|tid| Pid::from_raw(*tid)).collect()
    }

    fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }
}

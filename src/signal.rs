//! Translation between RSP signal numbers and the tracee's native signal numbers.
//!
//! RSP numbers signals independently of the target OS (`GDB_SIGNAL_*` in GDB). Most
//! ids are matched to native signals by name. The real-time signals are numbered in
//! two disjoint RSP ranges, which map onto one contiguous native range.

use tracing::debug;

/// An RSP (GDB) signal number.
pub type GdbSignal = u8;

pub const GDB_SIGNAL_0: GdbSignal = 0;
pub const GDB_SIGNAL_INT: GdbSignal = 2;
pub const GDB_SIGNAL_TRAP: GdbSignal = 5;
pub const GDB_SIGNAL_KILL: GdbSignal = 9;
pub const GDB_SIGNAL_STOP: GdbSignal = 17;
pub const GDB_SIGNAL_REALTIME_33: GdbSignal = 45;
pub const GDB_SIGNAL_REALTIME_63: GdbSignal = 75;
pub const GDB_SIGNAL_REALTIME_32: GdbSignal = 77;
pub const GDB_SIGNAL_REALTIME_64: GdbSignal = 78;
pub const GDB_SIGNAL_REALTIME_127: GdbSignal = 141;
pub const GDB_SIGNAL_LAST: GdbSignal = 152;

/// Marks an RSP signal with no native counterpart.
pub const UNMAPPED: i32 = -1;

const TABLE_LEN: usize = GDB_SIGNAL_LAST as usize + 1;

/// Canonical name of a non-real-time RSP signal, as GDB spells it.
pub fn gdb_signal_name(sig: GdbSignal) -> Option<&'static str> {
    let name = match sig {
        1 => "SIGHUP",
        2 => "SIGINT",
        3 => "SIGQUIT",
        4 => "SIGILL",
        5 => "SIGTRAP",
        6 => "SIGABRT",
        7 => "SIGEMT",
        8 => "SIGFPE",
        9 => "SIGKILL",
        10 => "SIGBUS",
        11 => "SIGSEGV",
        12 => "SIGSYS",
        13 => "SIGPIPE",
        14 => "SIGALRM",
        15 => "SIGTERM",
        16 => "SIGURG",
        17 => "SIGSTOP",
        18 => "SIGTSTP",
        19 => "SIGCONT",
        20 => "SIGCHLD",
        21 => "SIGTTIN",
        22 => "SIGTTOU",
        23 => "SIGIO",
        24 => "SIGXCPU",
        25 => "SIGXFSZ",
        26 => "SIGVTALRM",
        27 => "SIGPROF",
        28 => "SIGWINCH",
        29 => "SIGLOST",
        30 => "SIGUSR1",
        31 => "SIGUSR2",
        32 => "SIGPWR",
        33 => "SIGPOLL",
        34 => "SIGWIND",
        35 => "SIGPHONE",
        36 => "SIGWAITING",
        37 => "SIGLWP",
        38 => "SIGDANGER",
        39 => "SIGGRANT",
        40 => "SIGRETRACT",
        41 => "SIGMSG",
        42 => "SIGSOUND",
        43 => "SIGSAK",
        44 => "SIGPRIO",
        76 => "SIGCANCEL",
        142 => "SIGINFO",
        145 => "EXC_BAD_ACCESS",
        146 => "EXC_BAD_INSTRUCTION",
        147 => "EXC_ARITHMETIC",
        148 => "EXC_EMULATION",
        149 => "EXC_SOFTWARE",
        150 => "EXC_BREAKPOINT",
        151 => "SIGLIBRT",
        _ => return None,
    };

    Some(name)
}

/// Native signal names for Linux on x86 and arm, indexed by signal number.
const LINUX_SIGNALS: &[&str] = &[
    "SIG_0",
    "SIGHUP",
    "SIGINT",
    "SIGQUIT",
    "SIGILL",
    "SIGTRAP",
    "SIGABRT",
    "SIGBUS",
    "SIGFPE",
    "SIGKILL",
    "SIGUSR1",
    "SIGSEGV",
    "SIGUSR2",
    "SIGPIPE",
    "SIGALRM",
    "SIGTERM",
    "SIGSTKFLT",
    "SIGCHLD",
    "SIGCONT",
    "SIGSTOP",
    "SIGTSTP",
    "SIGTTIN",
    "SIGTTOU",
    "SIGURG",
    "SIGXCPU",
    "SIGXFSZ",
    "SIGVTALRM",
    "SIGPROF",
    "SIGWINCH",
    "SIGIO",
    "SIGPWR",
    "SIGSYS",
];

/// The word size and ABI variant of a tracee.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Personality {
    /// The tracer's own ABI.
    Native,

    /// 32-bit compat ABI on a 64-bit host.
    Compat32,
}

impl Default for Personality {
    fn default() -> Self {
        Personality::Native
    }
}

impl Personality {
    /// Native signal names, indexed by native signal number.
    pub fn signal_names(self) -> &'static [&'static str] {
        match self {
            Personality::Native | Personality::Compat32 => LINUX_SIGNALS,
        }
    }

    /// Size in bytes of a tracee word.
    pub fn word_size(self) -> usize {
        match self {
            Personality::Native => std::mem::size_of::<libc::c_long>(),
            Personality::Compat32 => 4,
        }
    }
}

/// RSP-to-native signal table for one personality.
///
/// Built whole and never modified; a personality change builds a new map.
#[derive(Clone)]
pub struct SignalMap {
    personality: Personality,
    table: [i32; TABLE_LEN],
}

impl std::fmt::Debug for SignalMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalMap")
            .field("personality", &self.personality)
            .finish()
    }
}

impl SignalMap {
    pub fn new(personality: Personality) -> Self {
        let names = personality.signal_names();
        let mut table = [UNMAPPED; TABLE_LEN];

        for (sig, native) in table.iter_mut().enumerate() {
            *native = map_signal(sig as GdbSignal, names);
        }

        debug!(?personality, "built signal map");

        Self { personality, table }
    }

    pub fn personality(&self) -> Personality {
        self.personality
    }

    /// Native number of an RSP signal, if it has one.
    pub fn to_native(&self, sig: GdbSignal) -> Option<i32> {
        match self.table.get(usize::from(sig)) {
            Some(&native) if native != UNMAPPED => Some(native),
            _ => None,
        }
    }

    /// RSP number of a native signal, if it has one.
    pub fn to_gdb(&self, native: i32) -> Option<GdbSignal> {
        if native < 0 {
            return None;
        }

        self.table
            .iter()
            .position(|&n| n == native)
            .map(|sig| sig as GdbSignal)
    }

    /// RSP signals with a native counterpart, excluding signal 0.
    pub fn mapped(&self) -> impl Iterator<Item = GdbSignal> + '_ {
        self.table
            .iter()
            .enumerate()
            .skip(1)
            .filter(|(_, &native)| native != UNMAPPED)
            .map(|(sig, _)| sig as GdbSignal)
    }
}

fn map_signal(sig: GdbSignal, names: &[&str]) -> i32 {
    match sig {
        GDB_SIGNAL_0 => return 0,
        GDB_SIGNAL_REALTIME_32 => return 32,
        GDB_SIGNAL_REALTIME_33..=GDB_SIGNAL_REALTIME_63 => {
            return i32::from(sig - GDB_SIGNAL_REALTIME_33) + 33;
        },
        GDB_SIGNAL_REALTIME_64..=GDB_SIGNAL_REALTIME_127 => {
            return i32::from(sig - GDB_SIGNAL_REALTIME_64) + 64;
        },
        _ => {},
    }

    let name = match gdb_signal_name(sig) {
        Some(name) => name,
        None => return UNMAPPED,
    };

    // Most low ids agree with the native numbering.
    if names.get(usize::from(sig)) == Some(&name) {
        return i32::from(sig);
    }

    names
        .iter()
        .position(|native| *native == name)
        .map(|native| native as i32)
        .unwrap_or(UNMAPPED)
}

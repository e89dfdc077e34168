#[macro_use]
pub mod error;

pub mod backend;
pub mod conn;
pub mod hex;
pub mod interrupt;
pub mod notify;
pub mod packet;
pub mod session;
pub mod signal;
pub mod stop;
pub mod target;
pub mod tracees;

#[cfg(target_arch = "aarch64")]
pub mod aarch64;

#[cfg(target_arch = "x86_64")]
pub mod x86;

pub use backend::{Backend, Event, Options, Registers, RspBackend};
pub use conn::Connection;
pub use error::Error;
pub use signal::{Personality, SignalMap};
pub use stop::{StopKind, StopReply, ThreadId};
pub use target::Target;
pub use tracees::{Pid, ProcessTable, Tracees};

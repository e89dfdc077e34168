//! Target descriptors, and establishing the connection they name.

use std::fmt;
use std::fs::OpenOptions;
use std::net::TcpStream;
use std::os::unix::io::OwnedFd;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::str::FromStr;

use tracing::info;

use crate::conn::Connection;
use crate::error::{Error, Result};

/// Suffix of a TCP descriptor that selects non-stop mode.
const NON_STOP_SUFFIX: &str = "#non-stop";

/// Where to find the stub.
///
/// Parsed from one of:
///
/// - `|<command> [args...]`: spawn a command, and talk to it over its stdin/stdout
/// - `<host>:<port>[#non-stop]`: connect over TCP
/// - `/path` or `./path`: open a device or file read-write
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Target {
    Command(Vec<String>),
    Tcp { addr: String, non_stop: bool },
    Device(PathBuf),
}

impl Target {
    /// Whether the descriptor asked for non-stop mode.
    pub fn non_stop(&self) -> bool {
        match self {
            Target::Tcp { non_stop, .. } => *non_stop,
            _ => false,
        }
    }

    /// Open the connection. A spawned stub is returned so it can be reaped at cleanup.
    pub fn connect(&self) -> Result<(Connection, Option<Child>)> {
        info!(target = %self, "connecting to stub");

        match self {
            Target::Command(argv) => {
                let (program, args) = match argv.split_first() {
                    Some(split) => split,
                    None => internal_error!("empty stub command"),
                };

                let mut child = Command::new(program)
                    .args(args)
                    .stdin(Stdio::piped())
                    .stdout(Stdio::piped())
                    .spawn()?;

                let (stdin, stdout) = match (child.stdin.take(), child.stdout.take()) {
                    (Some(stdin), Some(stdout)) => (stdin, stdout),
                    _ => internal_error!("stub pipes not captured"),
                };

                let conn = Connection::begin(stdout, stdin)?;

                Ok((conn, Some(child)))
            },
            Target::Tcp { addr, .. } => {
                let stream = TcpStream::connect(addr.as_str())?;
                stream.set_nodelay(true)?;
                let reader = stream.try_clone()?;

                Ok((Connection::begin(reader, stream)?, None))
            },
            Target::Device(path) => {
                let file = OpenOptions::new().read(true).write(true).open(path)?;

                Ok((Connection::begin_fd(OwnedFd::from(file))?, None))
            },
        }
    }
}

impl FromStr for Target {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |reason| Error::Target {
            descriptor: s.to_owned(),
            reason,
        };

        if let Some(cmd) = s.strip_prefix('|') {
            let argv: Vec<String> = cmd.split_whitespace().map(String::from).collect();

            if argv.is_empty() {
                return Err(invalid("missing command"));
            }

            return Ok(Target::Command(argv));
        }

        if s.starts_with('/') || s.starts_with('.') || Path::new(s).exists() {
            return Ok(Target::Device(PathBuf::from(s)));
        }

        let (addr, non_stop) = match s.strip_suffix(NON_STOP_SUFFIX) {
            Some(addr) => (addr, true),
            None => (s, false),
        };

        match addr.rsplit_once(':') {
            Some((_, port)) if port.parse::<u16>().is_ok() => Ok(Target::Tcp {
                addr: addr.to_owned(),
                non_stop,
            }),
            Some(_) => Err(invalid("bad port")),
            None => Err(invalid("expected `|command`, `host:port` or a path")),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Command(argv) => write!(f, "|{}", argv.join(" ")),
            Target::Tcp { addr, non_stop: false } => write!(f, "{}", addr),
            Target::Tcp { addr, non_stop: true } => write!(f, "{}{}", addr, NON_STOP_SUFFIX),
            Target::Device(path) => write!(f, "{}", path.display()),
        }
    }
}

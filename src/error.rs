use std::io;

use crate::tracees::Pid;


pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Lost connection to the remote stub")]
    Disconnected,

    #[error("Input/output error")]
    IO(#[from] io::Error),

    #[error("OS error")]
    OS(#[from] nix::Error),

    #[error("Invalid hex encoding")]
    InvalidHex,

    #[error("Remote stub does not support `{feature}`")]
    MissingFeature { feature: &'static str },

    #[error("Unexpected reply to `{request}`: `{reply}`")]
    UnexpectedReply { request: String, reply: String },

    #[error("Remote stub replied with error {code:#04x} to `{request}`")]
    Remote { request: String, code: u8 },

    #[error("Unknown stop reply `{reply}`")]
    UnknownStop { reply: String },

    #[error("Notification queue is full")]
    QueueFull,

    #[error("Could not attach to tracee = {pid}")]
    Attach { pid: Pid },

    #[error("Could not start tracee, stop reply = `{reply}`")]
    Startup { reply: String },

    #[error("No tracee with tid = {tid}")]
    UnknownTracee { tid: Pid },

    #[error("Invalid target descriptor `{descriptor}`: {reason}")]
    Target { descriptor: String, reason: &'static str },

    #[error("Unsupported operation: {what}")]
    Unsupported { what: &'static str },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether tracing can continue after this error.
    ///
    /// Transport loss and handshake failures leave the session in an unknown
    /// state, so callers are expected to abort with the error as a diagnostic.
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::QueueFull |
            Error::Remote { .. } |
            Error::InvalidHex |
            Error::UnknownTracee { .. } |
            Error::Unsupported { .. } => false,
            _ => true,
        }
    }

    pub(crate) fn unexpected(request: impl Into<String>, reply: &[u8]) -> Self {
        let request = request.into();
        let reply = String::from_utf8_lossy(reply).into_owned();
        Error::UnexpectedReply { request, reply }
    }
}

macro_rules! internal_error {
    ($msg: expr) => {
        return Err($crate::error::Error::Internal($msg.into()))
    };
}

use std::io;

use thiserror::Error;

use crate::state::ConnectionPhase;

/// Failures while decoding a single STUN datagram. Fatal for that datagram
/// only; the discovery loop keeps running.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("truncated stun message: {len} bytes")]
    Truncated { len: usize },
    #[error("bad magic cookie: {0:#010x}")]
    BadMagicCookie(u32),
}

/// Violations of the forward-only phase ordering. Surfaced immediately at
/// the call site.
#[derive(Error, Debug)]
pub enum StateError {
    #[error("invalid transition: {event} while {phase}")]
    InvalidTransition {
        phase: ConnectionPhase,
        event: &'static str,
    },
    #[error("phase cannot move backward: {current} -> {requested}")]
    BackwardPhase {
        current: ConnectionPhase,
        requested: ConnectionPhase,
    },
    #[error("unknown phase: {0}")]
    UnknownPhase(String),
    #[error("no directory record for peer {0}")]
    PeerUnknown(String),
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    State(#[from] StateError),
    #[error("io")]
    Io(#[from] io::Error),
    #[error("http")]
    Http(#[from] reqwest::Error),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

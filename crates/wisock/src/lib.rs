//! # wisock
//!
//! Bookkeeping for the sockets a border-router command surface opens on a
//! Wi-SUN protocol stack.
//!
//! The [`Registry`] tracks every endpoint opened through it in a fixed
//! capacity [`pool`], moves each through its connection lifecycle, and routes
//! the stack's asynchronous events back to the right endpoint. ICMP echo
//! traffic is correlated on its own path and never touches the pool.
//!
//! A [`service`] wraps the registry in a task that owns it outright, so
//! commands and stack events are handled strictly one at a time.

#![allow(clippy::result_unit_err)]

use core::fmt;

use serde::{Deserialize, Serialize};

pub mod address;
pub mod config;
pub mod endpoint;
pub mod logging;
pub mod options;
pub mod ping;
pub mod pool;
pub mod printable;
pub mod registry;
pub mod service;
pub mod stack;

pub use address::{IpAddressKind, MacAddress, RemoteAddress};
pub use config::Settings;
pub use endpoint::{Endpoint, SocketKind, SocketState};
pub use registry::{Notice, Registry, SocketInfo, StackEvent};
pub use service::{ServiceHandle, SocketService};
pub use stack::{Status, WisunStack};

use options::OptionError;
use stack::StackOp;

/// Identifier the stack assigns to a socket when it is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SocketId(pub u32);

impl SocketId {
    /// Marks a slot that holds no socket.
    pub const INVALID: Self = Self(u32::MAX);
}

impl fmt::Display for SocketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// Every pool slot is in use
    RegistryFull,
    /// No active endpoint has this id
    UnknownSocket(SocketId),
    /// A stack primitive failed
    Stack { op: StackOp, status: Status },
    InvalidAddress,
    InvalidPort,
    InvalidLength,
    EmptyData,
    Option(OptionError),
    /// This kind of socket can't be read from
    NotReadable(SocketKind),
    /// This kind of socket can't be written to
    NotWritable(SocketKind),
    /// UDP servers have no peer, use `write_to`
    RequiresWriteTo,
    /// The service task has stopped
    ServiceGone,
}

impl Error {
    pub(crate) fn stack(op: StackOp) -> impl FnOnce(Status) -> Self {
        move |status| Error::Stack { op, status }
    }

    /// The stack's status code, if a stack primitive is what failed.
    pub fn status(&self) -> Option<Status> {
        match self {
            Error::Stack { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::RegistryFull => f.write_str("unable to allocate a socket entry"),
            Error::UnknownSocket(id) => write!(f, "unable to find the specified socket: {id}"),
            Error::Stack { op, status } => write!(f, "unable to {}: {status}", op.describe()),
            Error::InvalidAddress => f.write_str("invalid remote address parameter"),
            Error::InvalidPort => f.write_str("invalid port parameter"),
            Error::InvalidLength => f.write_str("invalid amount of bytes"),
            Error::EmptyData => f.write_str("invalid data to be written"),
            Error::Option(e) => fmt::Display::fmt(e, f),
            Error::NotReadable(kind) => write!(f, "{kind} socket is not readable"),
            Error::NotWritable(kind) => write!(f, "{kind} socket is not writable"),
            Error::RequiresWriteTo => f.write_str("UDP server socket requires socket_writeto"),
            Error::ServiceGone => f.write_str("socket service is not running"),
        }
    }
}

impl From<OptionError> for Error {
    fn from(value: OptionError) -> Self {
        Error::Option(value)
    }
}

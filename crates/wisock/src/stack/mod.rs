//! The wireless protocol stack, as seen from the registry.
//!
//! The stack owns the real sockets. The registry only ever talks to it through
//! [`WisunStack`], and everything it gets back is either a value or a
//! [`Status`] from the stack's shared result-code space.

use core::{fmt, net::Ipv6Addr};

use serde::{Deserialize, Serialize};

use crate::{
    SocketId,
    address::IpAddressKind,
    options::{OptionData, SocketOptionCode},
};

pub mod mock;
pub mod null;

/// A non-OK result code returned by the stack.
///
/// Serialized as its raw code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u32", try_from = "u32")]
#[non_exhaustive]
pub enum Status {
    Fail,
    InvalidState,
    Busy,
    Timeout,
    WouldBlock,
    NotSupported,
    NoMoreResource,
    InvalidParameter,
    /// Any nonzero code this crate doesn't name
    Other(UnnamedCode),
}

/// A raw result code with no [`Status`] variant of its own.
///
/// Only [`Status::from_raw`] builds one, so it is never `0` and never one of
/// the named codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UnnamedCode(u32);

impl UnnamedCode {
    pub fn get(self) -> u32 {
        self.0
    }
}

impl Status {
    pub const RAW_OK: u32 = 0x0000;

    pub fn to_raw(self) -> u32 {
        match self {
            Status::Fail => 0x0001,
            Status::InvalidState => 0x0002,
            Status::Busy => 0x0004,
            Status::Timeout => 0x0007,
            Status::WouldBlock => 0x0009,
            Status::NotSupported => 0x000F,
            Status::NoMoreResource => 0x001A,
            Status::InvalidParameter => 0x0021,
            Status::Other(code) => code.get(),
        }
    }

    /// Map a raw result code. `0` is OK.
    pub fn from_raw(raw: u32) -> Result<(), Status> {
        let status = match raw {
            Self::RAW_OK => return Ok(()),
            0x0001 => Status::Fail,
            0x0002 => Status::InvalidState,
            0x0004 => Status::Busy,
            0x0007 => Status::Timeout,
            0x0009 => Status::WouldBlock,
            0x000F => Status::NotSupported,
            0x001A => Status::NoMoreResource,
            0x0021 => Status::InvalidParameter,
            other => Status::Other(UnnamedCode(other)),
        };
        Err(status)
    }
}

impl From<Status> for u32 {
    fn from(status: Status) -> Self {
        status.to_raw()
    }
}

impl TryFrom<u32> for Status {
    type Error = &'static str;

    fn try_from(raw: u32) -> Result<Self, Self::Error> {
        match Status::from_raw(raw) {
            Ok(()) => Err("0 is not an error status"),
            Err(status) => Ok(status),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_raw())
    }
}

/// Transport of a socket opened on the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SocketProtocol {
    Udp,
    Tcp,
    Icmp,
}

/// Which stack primitive failed, used to give [`Status`] some context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackOp {
    Open,
    Bind,
    Connect,
    Listen,
    Accept,
    Send,
    Receive,
    Close,
    SetOption,
    GetOption,
    ResolveAddress,
}

impl StackOp {
    pub fn describe(self) -> &'static str {
        match self {
            StackOp::Open => "open a socket",
            StackOp::Bind => "bind a socket",
            StackOp::Connect => "connect a socket",
            StackOp::Listen => "listen on a socket",
            StackOp::Accept => "accept a connection",
            StackOp::Send => "write to a socket",
            StackOp::Receive => "read from a socket",
            StackOp::Close => "close a socket",
            StackOp::SetOption => "set socket option",
            StackOp::GetOption => "get socket option",
            StackOp::ResolveAddress => "resolve the remote address",
        }
    }
}

/// A connection taken off a listening socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Accepted {
    pub id: SocketId,
    pub remote_address: Ipv6Addr,
    pub remote_port: u16,
}

/// Metadata of a datagram or stream chunk pulled with [`WisunStack::receive`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Received {
    pub remote_address: Ipv6Addr,
    pub remote_port: u16,
    pub len: usize,
}

/// Socket and timing primitives of the protocol stack.
///
/// All calls may block briefly inside the stack. None of them are expected to
/// call back into the registry.
pub trait WisunStack {
    fn open_socket(&mut self, protocol: SocketProtocol) -> Result<SocketId, Status>;

    fn bind(&mut self, id: SocketId, address: &Ipv6Addr, port: u16) -> Result<(), Status>;

    fn connect(&mut self, id: SocketId, address: &Ipv6Addr, port: u16) -> Result<(), Status>;

    fn listen(&mut self, id: SocketId) -> Result<(), Status>;

    fn accept(&mut self, listener: SocketId) -> Result<Accepted, Status>;

    fn send(&mut self, id: SocketId, data: &[u8]) -> Result<(), Status>;

    fn send_to(
        &mut self,
        id: SocketId,
        address: &Ipv6Addr,
        port: u16,
        data: &[u8],
    ) -> Result<(), Status>;

    fn receive(&mut self, id: SocketId, buf: &mut [u8]) -> Result<Received, Status>;

    fn close(&mut self, id: SocketId) -> Result<(), Status>;

    fn set_option(
        &mut self,
        id: SocketId,
        code: SocketOptionCode,
        data: &OptionData,
    ) -> Result<(), Status>;

    fn get_option(&mut self, id: SocketId, code: SocketOptionCode) -> Result<OptionData, Status>;

    fn get_ip_address(&mut self, kind: IpAddressKind) -> Result<Ipv6Addr, Status>;

    /// Free running tick counter, wraps.
    fn tick_count(&self) -> u32;

    fn tick_to_ms(&self, ticks: u32) -> u32;
}

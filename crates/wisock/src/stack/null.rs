use core::net::Ipv6Addr;

use crate::{
    SocketId,
    address::IpAddressKind,
    options::{OptionData, SocketOptionCode},
};

use super::{Accepted, Received, SocketProtocol, Status, WisunStack};

/// A stack that supports nothing.
///
/// Every socket primitive answers [`Status::NotSupported`], so a registry on
/// top of it can be exercised without a radio: every command ends in the
/// rollback path.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullStack {
    _priv: (),
}

impl NullStack {
    pub const fn new() -> Self {
        Self { _priv: () }
    }
}

impl WisunStack for NullStack {
    fn open_socket(&mut self, _protocol: SocketProtocol) -> Result<SocketId, Status> {
        Err(Status::NotSupported)
    }

    fn bind(&mut self, _id: SocketId, _address: &Ipv6Addr, _port: u16) -> Result<(), Status> {
        Err(Status::NotSupported)
    }

    fn connect(&mut self, _id: SocketId, _address: &Ipv6Addr, _port: u16) -> Result<(), Status> {
        Err(Status::NotSupported)
    }

    fn listen(&mut self, _id: SocketId) -> Result<(), Status> {
        Err(Status::NotSupported)
    }

    fn accept(&mut self, _listener: SocketId) -> Result<Accepted, Status> {
        Err(Status::NotSupported)
    }

    fn send(&mut self, _id: SocketId, _data: &[u8]) -> Result<(), Status> {
        Err(Status::NotSupported)
    }

    fn send_to(
        &mut self,
        _id: SocketId,
        _address: &Ipv6Addr,
        _port: u16,
        _data: &[u8],
    ) -> Result<(), Status> {
        Err(Status::NotSupported)
    }

    fn receive(&mut self, _id: SocketId, _buf: &mut [u8]) -> Result<Received, Status> {
        Err(Status::NotSupported)
    }

    fn close(&mut self, _id: SocketId) -> Result<(), Status> {
        Err(Status::NotSupported)
    }

    fn set_option(
        &mut self,
        _id: SocketId,
        _code: SocketOptionCode,
        _data: &OptionData,
    ) -> Result<(), Status> {
        Err(Status::NotSupported)
    }

    fn get_option(
        &mut self,
        _id: SocketId,
        _code: SocketOptionCode,
    ) -> Result<OptionData, Status> {
        Err(Status::NotSupported)
    }

    fn get_ip_address(&mut self, _kind: IpAddressKind) -> Result<Ipv6Addr, Status> {
        Err(Status::NotSupported)
    }

    fn tick_count(&self) -> u32 {
        0
    }

    fn tick_to_ms(&self, ticks: u32) -> u32 {
        ticks
    }
}

//! The socket registry
//!
//! [`Registry`] owns the endpoint pool, the stack and the ping correlator.
//! Every command below either completes or leaves the registry and the stack
//! exactly as it found them: whatever was opened on the stack is closed again
//! and whatever slot was reserved is released before the error is returned.
//!
//! Asynchronous stack events come in through [`Registry::dispatch`].

use core::{fmt, net::Ipv6Addr};

use crate::{
    Error, SocketId,
    address::RemoteAddress,
    config::Settings,
    endpoint::{Endpoint, SocketKind, SocketState},
    logging::{debug, info, warn},
    options,
    ping::{self, Correlator, ICMP_PORT, PingSession},
    pool::{EndpointHandle, EndpointPool},
    printable::PrintableData,
    stack::{SocketProtocol, StackOp, WisunStack},
};

mod dispatch;

pub use dispatch::{Notice, StackEvent};

/// Number of sockets tracked unless a registry says otherwise.
pub const DEFAULT_CAPACITY: usize = 10;

/// Most bytes a single [`Registry::read`] pulls from the stack.
pub const READ_BUFFER_SIZE: usize = 40;

/// A snapshot of one tracked socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocketInfo {
    pub id: SocketId,
    pub kind: SocketKind,
    pub state: SocketState,
    pub remote_address: Ipv6Addr,
    pub remote_port: u16,
}

impl From<&Endpoint> for SocketInfo {
    fn from(ep: &Endpoint) -> Self {
        Self {
            id: ep.id,
            kind: ep.kind,
            state: ep.state,
            remote_address: ep.remote_address,
            remote_port: ep.remote_port,
        }
    }
}

impl fmt::Display for SocketInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#  {:>2}  {:>10}  {} ({}) ({})",
            self.id, self.kind, self.remote_address, self.remote_port, self.state
        )
    }
}

/// Render sockets as the table printed by the `socket_list` command.
pub fn render_socket_table(sockets: &[SocketInfo]) -> String {
    let mut out = String::from("!  ##  Type        Info\n");
    for info in sockets {
        out.push_str(&info.to_string());
        out.push('\n');
    }
    out.push_str("!\n");
    out
}

/// Payload pulled from (or pushed by) the stack, ready to print.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataReport {
    pub id: SocketId,
    pub remote_address: Ipv6Addr,
    pub remote_port: u16,
    pub len: usize,
    /// Empty when the dump is disabled
    pub lines: Vec<String>,
}

impl fmt::Display for DataReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[Data from {} ({}): {},{}",
            self.remote_address, self.remote_port, self.id, self.len
        )?;
        for line in &self.lines {
            write!(f, "\n{line}")?;
        }
        f.write_str("]")
    }
}

/// An echo request that went out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingStarted {
    pub id: SocketId,
    pub remote: Ipv6Addr,
    pub bytes: usize,
}

impl fmt::Display for PingStarted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PING {}: {} data bytes", self.remote, self.bytes)
    }
}

pub struct Registry<S: WisunStack, const N: usize = DEFAULT_CAPACITY> {
    pool: EndpointPool<N>,
    stack: S,
    ping: Correlator,
    settings: Settings,
}

impl<S: WisunStack, const N: usize> Registry<S, N> {
    pub fn new(stack: S) -> Self {
        Self::new_with_settings(stack, Settings::default())
    }

    pub fn new_with_settings(stack: S, settings: Settings) -> Self {
        Self {
            pool: EndpointPool::new(),
            stack,
            ping: Correlator::new(),
            settings,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    pub fn capacity(&self) -> usize {
        N
    }

    /// The echo session in flight, if any.
    pub fn ping_session(&self) -> Option<&PingSession> {
        self.ping.current()
    }

    //
    // Opening sockets
    //

    pub fn udp_client(&mut self, remote: RemoteAddress, port: u16) -> Result<SocketInfo, Error> {
        let port = nonzero_port(port)?;
        let remote = self.resolve(remote)?;
        self.open(
            Endpoint {
                kind: SocketKind::UdpClient,
                state: SocketState::Active,
                remote_address: remote,
                remote_port: port,
                ..Endpoint::ZERO
            },
            SocketProtocol::Udp,
            |stack, id| {
                stack
                    .connect(id, &remote, port)
                    .map_err(Error::stack(StackOp::Connect))
            },
        )
    }

    pub fn udp_server(&mut self, port: u16) -> Result<SocketInfo, Error> {
        let port = nonzero_port(port)?;
        self.open(
            Endpoint {
                kind: SocketKind::UdpServer,
                state: SocketState::Active,
                remote_port: port,
                ..Endpoint::ZERO
            },
            SocketProtocol::Udp,
            |stack, id| {
                stack
                    .bind(id, &Ipv6Addr::UNSPECIFIED, port)
                    .map_err(Error::stack(StackOp::Bind))
            },
        )
    }

    /// Start connecting. The socket stays `Connecting` until the stack
    /// reports the outcome through [`StackEvent::Connected`].
    pub fn tcp_client(&mut self, remote: RemoteAddress, port: u16) -> Result<SocketInfo, Error> {
        let port = nonzero_port(port)?;
        let remote = self.resolve(remote)?;
        self.open(
            Endpoint {
                kind: SocketKind::TcpClient,
                state: SocketState::Connecting,
                remote_address: remote,
                remote_port: port,
                ..Endpoint::ZERO
            },
            SocketProtocol::Tcp,
            |stack, id| {
                stack
                    .connect(id, &remote, port)
                    .map_err(Error::stack(StackOp::Connect))
            },
        )
    }

    pub fn tcp_server(&mut self, port: u16) -> Result<SocketInfo, Error> {
        let port = nonzero_port(port)?;
        self.open(
            Endpoint {
                kind: SocketKind::TcpServer,
                state: SocketState::Listening,
                remote_port: port,
                ..Endpoint::ZERO
            },
            SocketProtocol::Tcp,
            |stack, id| {
                stack
                    .bind(id, &Ipv6Addr::UNSPECIFIED, port)
                    .map_err(Error::stack(StackOp::Bind))?;
                stack.listen(id).map_err(Error::stack(StackOp::Listen))
            },
        )
    }

    /// Reserve a slot, open a socket and run `setup` on it. Only if all of
    /// that worked does the endpoint become visible.
    fn open<F>(
        &mut self,
        template: Endpoint,
        protocol: SocketProtocol,
        setup: F,
    ) -> Result<SocketInfo, Error>
    where
        F: FnOnce(&mut S, SocketId) -> Result<(), Error>,
    {
        let hdl = self.pool.allocate().ok_or(Error::RegistryFull)?;

        let id = match self.stack.open_socket(protocol) {
            Ok(id) => id,
            Err(status) => {
                self.pool.release(hdl);
                return Err(Error::Stack {
                    op: StackOp::Open,
                    status,
                });
            }
        };

        if let Err(e) = setup(&mut self.stack, id) {
            self.close_quietly(id);
            self.pool.release(hdl);
            return Err(e);
        }

        let info = self.commit(hdl, Endpoint { id, ..template });
        info!("socket {} opened as {} ({})", info.id, info.kind, info.state);
        Ok(info)
    }

    /// Fill a reserved slot and put it on the active list.
    fn commit(&mut self, hdl: EndpointHandle, endpoint: Endpoint) -> SocketInfo {
        if let Some(ep) = self.pool.get_mut(hdl) {
            *ep = endpoint;
        }
        self.pool.activate(hdl);
        SocketInfo::from(&endpoint)
    }

    fn close_quietly(&mut self, id: SocketId) {
        if let Err(status) = self.stack.close(id) {
            warn!("closing socket {id} during rollback failed: {status}");
        }
    }

    fn resolve(&mut self, remote: RemoteAddress) -> Result<Ipv6Addr, Error> {
        match remote {
            RemoteAddress::Literal(addr) => Ok(addr),
            RemoteAddress::Named(kind) => self
                .stack
                .get_ip_address(kind)
                .map_err(Error::stack(StackOp::ResolveAddress)),
        }
    }

    fn find(&self, id: SocketId) -> Result<(EndpointHandle, SocketInfo), Error> {
        let hdl = self.pool.lookup(id).ok_or(Error::UnknownSocket(id))?;
        let ep = self.pool.get(hdl).ok_or(Error::UnknownSocket(id))?;
        Ok((hdl, SocketInfo::from(ep)))
    }

    //
    // Operating on open sockets
    //

    /// Close a socket and stop tracking it.
    ///
    /// If the stack refuses, the socket stays tracked so the close can be
    /// retried.
    pub fn close(&mut self, id: SocketId) -> Result<(), Error> {
        let (hdl, _) = self.find(id)?;
        self.stack.close(id).map_err(Error::stack(StackOp::Close))?;
        self.pool.release(hdl);
        info!("socket {id} closed");
        Ok(())
    }

    /// Pull up to `len` bytes (at most [`READ_BUFFER_SIZE`]) off a socket.
    pub fn read(&mut self, id: SocketId, len: u16) -> Result<DataReport, Error> {
        if len == 0 {
            return Err(Error::InvalidLength);
        }
        let (_, info) = self.find(id)?;
        if info.kind == SocketKind::TcpServer {
            return Err(Error::NotReadable(info.kind));
        }

        let mut buf = [0u8; READ_BUFFER_SIZE];
        let want = READ_BUFFER_SIZE.min(len as usize);
        let rx = self
            .stack
            .receive(id, &mut buf[..want])
            .map_err(Error::stack(StackOp::Receive))?;
        let got = rx.len.min(want);
        Ok(self.report(id, rx.remote_address, rx.remote_port, &buf[..got]))
    }

    /// Send on a connected socket. Returns the number of bytes handed to the
    /// stack.
    pub fn write(&mut self, id: SocketId, data: &[u8]) -> Result<usize, Error> {
        if data.is_empty() {
            return Err(Error::EmptyData);
        }
        let (_, info) = self.find(id)?;
        match info.kind {
            SocketKind::TcpServer => return Err(Error::NotWritable(info.kind)),
            SocketKind::UdpServer => return Err(Error::RequiresWriteTo),
            SocketKind::UdpClient | SocketKind::TcpClient => {}
        }
        self.stack
            .send(id, data)
            .map_err(Error::stack(StackOp::Send))?;
        debug!("wrote {} bytes to socket {id}", data.len());
        Ok(data.len())
    }

    /// Send to an explicit destination.
    pub fn write_to(
        &mut self,
        id: SocketId,
        remote: RemoteAddress,
        port: u16,
        data: &[u8],
    ) -> Result<usize, Error> {
        let port = nonzero_port(port)?;
        if data.is_empty() {
            return Err(Error::EmptyData);
        }
        let remote = self.resolve(remote)?;
        let (_, info) = self.find(id)?;
        if info.kind == SocketKind::TcpServer {
            return Err(Error::NotWritable(info.kind));
        }
        self.stack
            .send_to(id, &remote, port, data)
            .map_err(Error::stack(StackOp::Send))?;
        debug!("wrote {} bytes to {remote} ({port}) on socket {id}", data.len());
        Ok(data.len())
    }

    /// Every tracked socket, oldest first.
    pub fn list(&self) -> Vec<SocketInfo> {
        self.pool
            .iter_active()
            .map(|(_, ep)| SocketInfo::from(ep))
            .collect()
    }

    pub fn option_names(&self) -> impl Iterator<Item = &'static str> {
        options::names()
    }

    pub fn set_option(&mut self, id: SocketId, name: &str, raw: &str) -> Result<(), Error> {
        let (code, data) = options::encode(name, raw)?;
        self.find(id)?;
        self.stack
            .set_option(id, code, &data)
            .map_err(Error::stack(StackOp::SetOption))?;
        debug!("socket {id}: {name} set to {raw}");
        Ok(())
    }

    pub fn get_option(&mut self, id: SocketId, name: &str) -> Result<String, Error> {
        self.find(id)?;
        let desc =
            options::descriptor(name).ok_or(Error::Option(options::OptionError::InvalidName))?;
        let data = self
            .stack
            .get_option(id, desc.code)
            .map_err(Error::stack(StackOp::GetOption))?;
        Ok(options::format(desc, &data)?)
    }

    //
    // Ping
    //

    /// Send an echo request of `packet_length` bytes (header included), or
    /// of the configured length.
    ///
    /// Any previous echo session is closed first. If the request can't be
    /// sent, the new socket is closed again and no session remains.
    pub fn ping(
        &mut self,
        remote: RemoteAddress,
        packet_length: Option<u16>,
    ) -> Result<PingStarted, Error> {
        let packet_length = packet_length.unwrap_or(self.settings.ping.packet_length);
        let packet = ping::build_request(&self.settings.ping, packet_length)
            .ok_or(Error::InvalidLength)?;
        let remote = self.resolve(remote)?;

        if let Some(old) = self.ping.take() {
            debug!("replacing echo session on socket {}", old.id);
            self.close_quietly(old.id);
        }

        let id = self
            .stack
            .open_socket(SocketProtocol::Icmp)
            .map_err(Error::stack(StackOp::Open))?;

        if let Err(status) = self.stack.send_to(id, &remote, ICMP_PORT, &packet) {
            self.close_quietly(id);
            return Err(Error::Stack {
                op: StackOp::Send,
                status,
            });
        }

        self.ping.start(PingSession {
            id,
            remote,
            sequence_number: self.settings.ping.sequence_number,
            sent_at: self.stack.tick_count(),
        });
        Ok(PingStarted {
            id,
            remote,
            bytes: packet.len(),
        })
    }

    fn report(
        &self,
        id: SocketId,
        remote_address: Ipv6Addr,
        remote_port: u16,
        data: &[u8],
    ) -> DataReport {
        let app = &self.settings.app;
        DataReport {
            id,
            remote_address,
            remote_port,
            len: data.len(),
            lines: PrintableData::new(
                data,
                app.printable_data_length as usize,
                app.printable_data_as_hex,
            )
            .collect(),
        }
    }
}

fn nonzero_port(port: u16) -> Result<u16, Error> {
    if port == 0 {
        Err(Error::InvalidPort)
    } else {
        Ok(port)
    }
}

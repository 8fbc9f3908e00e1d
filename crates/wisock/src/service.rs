//! The socket service task
//!
//! One task owns the [`Registry`] outright. Commands from any number of
//! [`ServiceHandle`]s and events from the stack arrive on the same channel and
//! are handled strictly in arrival order, one at a time, so the registry never
//! needs a lock.
//!
//! Notices produced while dispatching events go out on a separate bounded
//! channel. The service never waits on it: if nobody drains it fast enough,
//! notices are dropped with a warning.

use tokio::sync::{
    mpsc::{Receiver, Sender, channel, error::TrySendError},
    oneshot,
};

use crate::{
    Error, SocketId,
    address::RemoteAddress,
    logging::{debug, info, trace, warn},
    options,
    registry::{DataReport, Notice, PingStarted, Registry, SocketInfo, StackEvent},
    stack::WisunStack,
};

/// Depth of the request channel shared by commands and events.
pub const REQUEST_DEPTH: usize = 64;

/// Depth of the outgoing notice channel.
pub const NOTICE_DEPTH: usize = 64;

type Reply<T> = oneshot::Sender<Result<T, Error>>;

enum Command {
    UdpClient {
        remote: RemoteAddress,
        port: u16,
        reply: Reply<SocketInfo>,
    },
    UdpServer {
        port: u16,
        reply: Reply<SocketInfo>,
    },
    TcpClient {
        remote: RemoteAddress,
        port: u16,
        reply: Reply<SocketInfo>,
    },
    TcpServer {
        port: u16,
        reply: Reply<SocketInfo>,
    },
    Close {
        id: SocketId,
        reply: Reply<()>,
    },
    Read {
        id: SocketId,
        len: u16,
        reply: Reply<DataReport>,
    },
    Write {
        id: SocketId,
        data: Vec<u8>,
        reply: Reply<usize>,
    },
    WriteTo {
        id: SocketId,
        remote: RemoteAddress,
        port: u16,
        data: Vec<u8>,
        reply: Reply<usize>,
    },
    List {
        reply: Reply<Vec<SocketInfo>>,
    },
    SetOption {
        id: SocketId,
        name: String,
        raw: String,
        reply: Reply<()>,
    },
    GetOption {
        id: SocketId,
        name: String,
        reply: Reply<String>,
    },
    Ping {
        remote: RemoteAddress,
        packet_length: Option<u16>,
        reply: Reply<PingStarted>,
    },
}

enum Request {
    Command(Command),
    Event(StackEvent),
}

/// Why an event couldn't be queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum DeliverError {
    QueueFull,
    ServiceGone,
}

pub struct SocketService<S: WisunStack, const N: usize> {
    registry: Registry<S, N>,
    requests: Receiver<Request>,
    notices: Sender<Notice>,
}

impl<S: WisunStack, const N: usize> SocketService<S, N> {
    /// Wrap `registry`. The service does nothing until [`run`](Self::run)
    /// is polled.
    pub fn new(registry: Registry<S, N>) -> (Self, ServiceHandle, Receiver<Notice>) {
        let (req_tx, req_rx) = channel(REQUEST_DEPTH);
        let (note_tx, note_rx) = channel(NOTICE_DEPTH);
        let svc = Self {
            registry,
            requests: req_rx,
            notices: note_tx,
        };
        (svc, ServiceHandle { tx: req_tx }, note_rx)
    }

    /// Handle requests until every [`ServiceHandle`] is gone, then hand the
    /// registry back.
    pub async fn run(mut self) -> Registry<S, N> {
        info!("socket service started");
        while let Some(req) = self.requests.recv().await {
            match req {
                Request::Command(cmd) => self.handle(cmd),
                Request::Event(event) => {
                    if let Some(notice) = self.registry.dispatch(event) {
                        self.notify(notice);
                    }
                }
            }
        }
        info!("socket service stopped");
        self.registry
    }

    fn handle(&mut self, cmd: Command) {
        let reg = &mut self.registry;
        match cmd {
            Command::UdpClient {
                remote,
                port,
                reply,
            } => respond(reply, reg.udp_client(remote, port)),
            Command::UdpServer { port, reply } => respond(reply, reg.udp_server(port)),
            Command::TcpClient {
                remote,
                port,
                reply,
            } => respond(reply, reg.tcp_client(remote, port)),
            Command::TcpServer { port, reply } => respond(reply, reg.tcp_server(port)),
            Command::Close { id, reply } => respond(reply, reg.close(id)),
            Command::Read { id, len, reply } => respond(reply, reg.read(id, len)),
            Command::Write { id, data, reply } => respond(reply, reg.write(id, &data)),
            Command::WriteTo {
                id,
                remote,
                port,
                data,
                reply,
            } => respond(reply, reg.write_to(id, remote, port, &data)),
            Command::List { reply } => respond(reply, Ok(reg.list())),
            Command::SetOption {
                id,
                name,
                raw,
                reply,
            } => respond(reply, reg.set_option(id, &name, &raw)),
            Command::GetOption { id, name, reply } => respond(reply, reg.get_option(id, &name)),
            Command::Ping {
                remote,
                packet_length,
                reply,
            } => respond(reply, reg.ping(remote, packet_length)),
        }
    }

    fn notify(&mut self, notice: Notice) {
        match self.notices.try_send(notice) {
            Ok(()) => {}
            Err(TrySendError::Full(notice)) => warn!("notice queue full, dropping: {notice}"),
            Err(TrySendError::Closed(notice)) => debug!("nobody listening, dropping: {notice}"),
        }
    }
}

impl<S, const N: usize> SocketService<S, N>
where
    S: WisunStack + Send + 'static,
{
    /// Start the service on the current tokio runtime.
    pub fn spawn(
        registry: Registry<S, N>,
    ) -> (
        ServiceHandle,
        Receiver<Notice>,
        tokio::task::JoinHandle<Registry<S, N>>,
    ) {
        let (svc, hdl, notices) = Self::new(registry);
        let join = tokio::task::spawn(svc.run());
        (hdl, notices, join)
    }
}

fn respond<T>(reply: Reply<T>, res: Result<T, Error>) {
    if reply.send(res).is_err() {
        trace!("caller went away before the reply");
    }
}

/// The way into a running [`SocketService`].
#[derive(Clone)]
pub struct ServiceHandle {
    tx: Sender<Request>,
}

impl ServiceHandle {
    async fn call<T>(&self, make: impl FnOnce(Reply<T>) -> Command) -> Result<T, Error> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(Request::Command(make(tx)))
            .await
            .map_err(|_| Error::ServiceGone)?;
        rx.await.map_err(|_| Error::ServiceGone)?
    }

    pub async fn udp_client(&self, remote: RemoteAddress, port: u16) -> Result<SocketInfo, Error> {
        self.call(|reply| Command::UdpClient {
            remote,
            port,
            reply,
        })
        .await
    }

    pub async fn udp_server(&self, port: u16) -> Result<SocketInfo, Error> {
        self.call(|reply| Command::UdpServer { port, reply }).await
    }

    pub async fn tcp_client(&self, remote: RemoteAddress, port: u16) -> Result<SocketInfo, Error> {
        self.call(|reply| Command::TcpClient {
            remote,
            port,
            reply,
        })
        .await
    }

    pub async fn tcp_server(&self, port: u16) -> Result<SocketInfo, Error> {
        self.call(|reply| Command::TcpServer { port, reply }).await
    }

    pub async fn close(&self, id: SocketId) -> Result<(), Error> {
        self.call(|reply| Command::Close { id, reply }).await
    }

    pub async fn read(&self, id: SocketId, len: u16) -> Result<DataReport, Error> {
        self.call(|reply| Command::Read { id, len, reply }).await
    }

    pub async fn write(&self, id: SocketId, data: &[u8]) -> Result<usize, Error> {
        let data = data.to_vec();
        self.call(|reply| Command::Write { id, data, reply }).await
    }

    pub async fn write_to(
        &self,
        id: SocketId,
        remote: RemoteAddress,
        port: u16,
        data: &[u8],
    ) -> Result<usize, Error> {
        let data = data.to_vec();
        self.call(|reply| Command::WriteTo {
            id,
            remote,
            port,
            data,
            reply,
        })
        .await
    }

    pub async fn list(&self) -> Result<Vec<SocketInfo>, Error> {
        self.call(|reply| Command::List { reply }).await
    }

    /// Names accepted by [`set_option`](Self::set_option) and
    /// [`get_option`](Self::get_option). Doesn't need the service.
    pub fn option_names(&self) -> impl Iterator<Item = &'static str> {
        options::names()
    }

    pub async fn set_option(&self, id: SocketId, name: &str, raw: &str) -> Result<(), Error> {
        let name = name.to_string();
        let raw = raw.to_string();
        self.call(|reply| Command::SetOption {
            id,
            name,
            raw,
            reply,
        })
        .await
    }

    pub async fn get_option(&self, id: SocketId, name: &str) -> Result<String, Error> {
        let name = name.to_string();
        self.call(|reply| Command::GetOption { id, name, reply })
            .await
    }

    pub async fn ping(
        &self,
        remote: RemoteAddress,
        packet_length: Option<u16>,
    ) -> Result<PingStarted, Error> {
        self.call(|reply| Command::Ping {
            remote,
            packet_length,
            reply,
        })
        .await
    }

    /// Queue a stack event, waiting for room if the queue is full.
    pub async fn deliver(&self, event: StackEvent) -> Result<(), DeliverError> {
        self.tx
            .send(Request::Event(event))
            .await
            .map_err(|_| DeliverError::ServiceGone)
    }

    /// Queue a stack event without waiting, for callers outside the runtime
    /// such as the stack's own callback context.
    pub fn try_deliver(&self, event: StackEvent) -> Result<(), DeliverError> {
        self.tx
            .try_send(Request::Event(event))
            .map_err(|e| match e {
                TrySendError::Full(_) => DeliverError::QueueFull,
                TrySendError::Closed(_) => DeliverError::ServiceGone,
            })
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

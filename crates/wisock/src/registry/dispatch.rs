use core::{fmt, net::Ipv6Addr};

use crate::{
    Error, SocketId,
    address::MacAddress,
    endpoint::{Endpoint, SocketKind, SocketState, TransitionError},
    logging::{debug, info, trace, warn},
    ping::{PingReply, PingSession, ReplyError},
    pool::EndpointHandle,
    stack::{StackOp, Status, WisunStack},
};

use super::{DataReport, Registry};

/// Asynchronous indications delivered by the stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackEvent {
    /// Payload pushed along with the indication
    Data {
        id: SocketId,
        remote_address: Ipv6Addr,
        remote_port: u16,
        data: Vec<u8>,
    },
    /// Data is waiting, pull it with a read
    DataAvailable { id: SocketId, len: usize },
    /// Outcome of a TCP connect
    Connected {
        id: SocketId,
        status: Result<(), Status>,
    },
    /// A peer is waiting on a listening socket
    ConnectionAvailable { id: SocketId },
    /// The peer is shutting the connection down
    Closing { id: SocketId },
    DataSent {
        id: SocketId,
        status: Result<(), Status>,
        space_left: u32,
    },
    ModeSwitchFallback { address: MacAddress },
    JoinState { state: u32 },
    /// Anything this crate doesn't know about
    Unrecognized { kind: u32 },
}

/// Something worth telling the user about, produced by dispatching an event.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Notice {
    Data(DataReport),
    DataAvailable {
        id: SocketId,
        len: usize,
    },
    Opened(SocketId),
    OpenFailed(Status),
    Accepted {
        listener: SocketId,
        id: SocketId,
        remote_address: Ipv6Addr,
        remote_port: u16,
    },
    AcceptFailed {
        listener: SocketId,
        error: Error,
    },
    NotListening(SocketId),
    Closing(SocketId),
    DataSent {
        id: SocketId,
        space_left: u32,
    },
    SendFailed {
        id: SocketId,
        status: Status,
    },
    ModeSwitchFallback(MacAddress),
    PingReply(PingReply),
    PingRejected(ReplyError),
    UnknownSocket(SocketId),
    IllegalTransition {
        id: SocketId,
        error: TransitionError,
    },
    Unrecognized {
        kind: u32,
    },
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::Data(report) => fmt::Display::fmt(report, f),
            Notice::DataAvailable { id, len } => write!(f, "[Data available: {id},{len}]"),
            Notice::Opened(id) => write!(f, "[Opened: {id}]"),
            Notice::OpenFailed(status) => write!(f, "[Open failed: {status}]"),
            Notice::Accepted {
                id,
                remote_address,
                remote_port,
                ..
            } => write!(f, "[Accepted {remote_address} ({remote_port}): {id}]"),
            Notice::AcceptFailed { error, .. } => write!(f, "[Failed: {error}]"),
            Notice::NotListening(id) => write!(f, "[Failed: socket {id} is not listening]"),
            Notice::Closing(id) => write!(f, "[Closing: {id}]"),
            Notice::DataSent { id, space_left } => write!(f, "[Data sent: {id},{space_left}]"),
            Notice::SendFailed { id, status } => {
                write!(f, "[Failed: data sent, error {status} (socket {id})]")
            }
            Notice::ModeSwitchFallback(mac) => write!(f, "[mode switch fallback for {mac} !!]"),
            Notice::PingReply(reply) => fmt::Display::fmt(reply, f),
            Notice::PingRejected(e) => fmt::Display::fmt(e, f),
            Notice::UnknownSocket(id) => {
                write!(f, "[Failed: unable to find the specified socket: {id}]")
            }
            Notice::IllegalTransition { id, error } => write!(
                f,
                "[Failed: socket {id} can't go from {} to {}]",
                error.from, error.to
            ),
            Notice::Unrecognized { kind } => write!(f, "[Unknown event: {kind}]"),
        }
    }
}

/// Where an event for a given socket id belongs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Ping(PingSession),
    Endpoint(EndpointHandle),
    Unknown,
}

impl<S: WisunStack, const N: usize> Registry<S, N> {
    fn classify(&self, id: SocketId) -> Target {
        if let Some(session) = self.ping.session_for(id) {
            Target::Ping(*session)
        } else if let Some(hdl) = self.pool.lookup(id) {
            Target::Endpoint(hdl)
        } else {
            Target::Unknown
        }
    }

    /// Route one stack event.
    ///
    /// Never fails: whatever goes wrong is reported in the returned notice.
    /// `None` means the event needs no output.
    pub fn dispatch(&mut self, event: StackEvent) -> Option<Notice> {
        trace!("dispatching {event:?}");
        match event {
            StackEvent::Data {
                id,
                remote_address,
                remote_port,
                data,
            } => Some(match self.classify(id) {
                Target::Ping(session) => {
                    match session.on_reply(&self.stack, remote_address, &data) {
                        Ok(reply) => Notice::PingReply(reply),
                        Err(e) => {
                            debug!("dropping ICMP message on socket {id}: {e}");
                            Notice::PingRejected(e)
                        }
                    }
                }
                Target::Endpoint(_) => {
                    Notice::Data(self.report(id, remote_address, remote_port, &data))
                }
                Target::Unknown => Notice::UnknownSocket(id),
            }),
            StackEvent::DataAvailable { id, len } => match self.classify(id) {
                // echo replies always come with their payload
                Target::Ping(_) => None,
                Target::Endpoint(_) => Some(Notice::DataAvailable { id, len }),
                Target::Unknown => Some(Notice::UnknownSocket(id)),
            },
            StackEvent::Connected { id, status } => Some(self.on_connected(id, status)),
            StackEvent::ConnectionAvailable { id } => Some(self.on_connection_available(id)),
            StackEvent::Closing { id } => Some(match self.classify(id) {
                Target::Endpoint(hdl) => match self.transition(hdl, SocketState::Closing) {
                    Ok(()) => Notice::Closing(id),
                    Err(error) => Notice::IllegalTransition { id, error },
                },
                Target::Ping(_) | Target::Unknown => Notice::UnknownSocket(id),
            }),
            StackEvent::DataSent {
                id,
                status,
                space_left,
            } => match self.classify(id) {
                Target::Ping(_) => None,
                Target::Endpoint(_) => Some(match status {
                    Ok(()) => Notice::DataSent { id, space_left },
                    Err(status) => Notice::SendFailed { id, status },
                }),
                Target::Unknown => Some(Notice::UnknownSocket(id)),
            },
            StackEvent::ModeSwitchFallback { address } => {
                Some(Notice::ModeSwitchFallback(address))
            }
            StackEvent::JoinState { state } => {
                trace!("join state {state}");
                None
            }
            StackEvent::Unrecognized { kind } => {
                warn!("unrecognized stack event {kind}");
                Some(Notice::Unrecognized { kind })
            }
        }
    }

    fn transition(&mut self, hdl: EndpointHandle, next: SocketState) -> Result<(), TransitionError> {
        match self.pool.get_mut(hdl) {
            Some(ep) => ep.transition_to(next),
            // classify just found it
            None => Ok(()),
        }
    }

    /// A connect outcome only applies to a socket that is still connecting.
    /// Anything else is reported and leaves the socket alone.
    fn on_connected(&mut self, id: SocketId, status: Result<(), Status>) -> Notice {
        let Target::Endpoint(hdl) = self.classify(id) else {
            return Notice::UnknownSocket(id);
        };
        let state = self.pool.get(hdl).map_or(SocketState::Connecting, |ep| ep.state);
        if state != SocketState::Connecting {
            return Notice::IllegalTransition {
                id,
                error: TransitionError {
                    from: state,
                    to: SocketState::Active,
                },
            };
        }

        match status {
            Ok(()) => match self.transition(hdl, SocketState::Active) {
                Ok(()) => {
                    info!("socket {id} connected");
                    Notice::Opened(id)
                }
                Err(error) => Notice::IllegalTransition { id, error },
            },
            Err(status) => {
                info!("socket {id} failed to connect: {status}");
                self.close_quietly(id);
                self.pool.release(hdl);
                Notice::OpenFailed(status)
            }
        }
    }

    fn on_connection_available(&mut self, listener: SocketId) -> Notice {
        let Target::Endpoint(lhdl) = self.classify(listener) else {
            return Notice::UnknownSocket(listener);
        };
        let listening = self.pool.get(lhdl).is_some_and(|ep| {
            ep.kind == SocketKind::TcpServer && ep.state == SocketState::Listening
        });
        if !listening {
            return Notice::NotListening(listener);
        }

        let Some(hdl) = self.pool.allocate() else {
            return Notice::AcceptFailed {
                listener,
                error: Error::RegistryFull,
            };
        };

        let accepted = match self.stack.accept(listener) {
            Ok(accepted) => accepted,
            Err(status) => {
                self.pool.release(hdl);
                return Notice::AcceptFailed {
                    listener,
                    error: Error::Stack {
                        op: StackOp::Accept,
                        status,
                    },
                };
            }
        };

        self.commit(
            hdl,
            Endpoint {
                id: accepted.id,
                kind: SocketKind::TcpClient,
                state: SocketState::Active,
                remote_address: accepted.remote_address,
                remote_port: accepted.remote_port,
            },
        );
        info!(
            "socket {} accepted {} ({}) as {}",
            listener, accepted.remote_address, accepted.remote_port, accepted.id
        );
        Notice::Accepted {
            listener,
            id: accepted.id,
            remote_address: accepted.remote_address,
            remote_port: accepted.remote_port,
        }
    }
}

#[cfg(test)]
mod test {
    use core::net::Ipv6Addr;

    use crate::{
        Error, SocketId,
        address::{MacAddress, RemoteAddress},
        endpoint::{SocketKind, SocketState, TransitionError},
        ping::{EchoHeader, ECHO_REPLY, ReplyError},
        registry::Registry,
        stack::{
            StackOp, Status,
            mock::{Call, MockStack},
        },
    };

    use super::{Notice, StackEvent};

    fn setup<const N: usize>() -> (Registry<MockStack, N>, MockStack) {
        let stack = MockStack::new();
        (Registry::new(stack.clone()), stack)
    }

    fn peer() -> Ipv6Addr {
        "2001:db8::77".parse().unwrap()
    }

    fn state_of<const N: usize>(reg: &Registry<MockStack, N>, id: SocketId) -> Option<SocketState> {
        reg.list().into_iter().find(|s| s.id == id).map(|s| s.state)
    }

    #[test]
    fn connect_success() {
        let (mut reg, _stack) = setup::<2>();
        let info = reg
            .tcp_client(RemoteAddress::Literal(peer()), 80)
            .unwrap();
        assert_eq!(state_of(&reg, info.id), Some(SocketState::Connecting));

        let n = reg.dispatch(StackEvent::Connected {
            id: info.id,
            status: Ok(()),
        });
        assert_eq!(n, Some(Notice::Opened(info.id)));
        assert_eq!(n.unwrap().to_string(), "[Opened: 1]");
        assert_eq!(state_of(&reg, info.id), Some(SocketState::Active));

        // a second success is out of order
        let n = reg.dispatch(StackEvent::Connected {
            id: info.id,
            status: Ok(()),
        });
        assert_eq!(
            n,
            Some(Notice::IllegalTransition {
                id: info.id,
                error: TransitionError {
                    from: SocketState::Active,
                    to: SocketState::Active
                }
            })
        );
        assert_eq!(state_of(&reg, info.id), Some(SocketState::Active));
    }

    #[test]
    fn connect_failure_releases() {
        let (mut reg, stack) = setup::<1>();
        let info = reg
            .tcp_client(RemoteAddress::Literal(peer()), 80)
            .unwrap();
        let n = reg
            .dispatch(StackEvent::Connected {
                id: info.id,
                status: Err(Status::Timeout),
            })
            .unwrap();
        assert_eq!(n.to_string(), "[Open failed: 7]");
        assert!(reg.list().is_empty());
        assert!(stack.open_sockets().is_empty());
        // slot is free again
        reg.udp_server(9).unwrap();
    }

    #[test]
    fn accept_path() {
        let (mut reg, stack) = setup::<3>();
        let srv = reg.tcp_server(5002).unwrap();
        stack.queue_accept(peer(), 40000);

        let n = reg
            .dispatch(StackEvent::ConnectionAvailable { id: srv.id })
            .unwrap();
        let Notice::Accepted { id, .. } = &n else {
            panic!("expected accept, got {n:?}");
        };
        assert_eq!(n.to_string(), "[Accepted 2001:db8::77 (40000): 2]");

        let list = reg.list();
        assert_eq!(list.len(), 2);
        assert_eq!(list[1].id, *id);
        assert_eq!(list[1].kind, SocketKind::TcpClient);
        assert_eq!(list[1].state, SocketState::Active);
        assert_eq!(list[1].remote_port, 40000);
        // listener is untouched
        assert_eq!(list[0], srv);
    }

    #[test]
    fn accept_failure_does_not_leak() {
        let (mut reg, stack) = setup::<2>();
        let srv = reg.tcp_server(5002).unwrap();
        stack.fail_next(StackOp::Accept, Status::Fail);

        let n = reg.dispatch(StackEvent::ConnectionAvailable { id: srv.id });
        assert_eq!(
            n,
            Some(Notice::AcceptFailed {
                listener: srv.id,
                error: Error::Stack {
                    op: StackOp::Accept,
                    status: Status::Fail
                }
            })
        );
        assert_eq!(
            n.unwrap().to_string(),
            "[Failed: unable to accept a connection: 1]"
        );
        assert_eq!(reg.list(), [srv]);
        // both remaining slots can still be used
        reg.udp_server(1).unwrap();

        stack.queue_accept(peer(), 1);
        let n = reg.dispatch(StackEvent::ConnectionAvailable { id: srv.id });
        assert_eq!(
            n,
            Some(Notice::AcceptFailed {
                listener: srv.id,
                error: Error::RegistryFull
            })
        );
        let accepts = stack
            .calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Accept(_)))
            .count();
        assert_eq!(accepts, 1);
    }

    #[test]
    fn accept_needs_a_listener() {
        let (mut reg, _stack) = setup::<2>();
        let udp = reg.udp_server(7).unwrap();
        assert_eq!(
            reg.dispatch(StackEvent::ConnectionAvailable { id: udp.id }),
            Some(Notice::NotListening(udp.id))
        );
        assert_eq!(
            reg.dispatch(StackEvent::ConnectionAvailable { id: SocketId(50) }),
            Some(Notice::UnknownSocket(SocketId(50)))
        );
    }

    #[test]
    fn closing_is_terminal() {
        let (mut reg, _stack) = setup::<2>();
        let srv = reg.tcp_server(5002).unwrap();
        let n = reg.dispatch(StackEvent::Closing { id: srv.id }).unwrap();
        assert_eq!(n.to_string(), "[Closing: 1]");
        assert_eq!(state_of(&reg, srv.id), Some(SocketState::Closing));

        let n = reg.dispatch(StackEvent::Connected {
            id: srv.id,
            status: Ok(()),
        });
        assert!(matches!(n, Some(Notice::IllegalTransition { .. })));
        assert_eq!(state_of(&reg, srv.id), Some(SocketState::Closing));

        // still tracked until closed explicitly
        reg.close(srv.id).unwrap();
        assert_eq!(
            reg.dispatch(StackEvent::Closing { id: srv.id }),
            Some(Notice::UnknownSocket(srv.id))
        );
    }

    #[test]
    fn data_rendering() {
        let (mut reg, _stack) = setup::<2>();
        let udp = reg.udp_server(7).unwrap();
        let ev = |data: &[u8]| StackEvent::Data {
            id: udp.id,
            remote_address: peer(),
            remote_port: 9,
            data: data.to_vec(),
        };

        let n = reg.dispatch(ev(b"ping\x00pong")).unwrap();
        assert_eq!(n.to_string(), "[Data from 2001:db8::77 (9): 1,9\nping.pong]");

        reg.settings_mut().app.printable_data_as_hex = true;
        reg.settings_mut().app.printable_data_length = 2;
        let n = reg.dispatch(ev(&[0xde, 0xad, 0xbe])).unwrap();
        assert_eq!(n.to_string(), "[Data from 2001:db8::77 (9): 1,3\nde ad\nbe]");

        reg.settings_mut().app.printable_data_length = 0;
        let n = reg.dispatch(ev(b"quiet")).unwrap();
        assert_eq!(n.to_string(), "[Data from 2001:db8::77 (9): 1,5]");

        let n = reg.dispatch(StackEvent::Data {
            id: SocketId(30),
            remote_address: peer(),
            remote_port: 9,
            data: vec![1],
        });
        assert_eq!(n, Some(Notice::UnknownSocket(SocketId(30))));
    }

    #[test]
    fn data_sent() {
        let (mut reg, _stack) = setup::<2>();
        let c = reg
            .udp_client(RemoteAddress::Literal(peer()), 5)
            .unwrap();
        let n = reg
            .dispatch(StackEvent::DataSent {
                id: c.id,
                status: Ok(()),
                space_left: 1024,
            })
            .unwrap();
        assert_eq!(n.to_string(), "[Data sent: 1,1024]");

        let n = reg
            .dispatch(StackEvent::DataSent {
                id: c.id,
                status: Err(Status::NoMoreResource),
                space_left: 0,
            })
            .unwrap();
        assert_eq!(n.to_string(), "[Failed: data sent, error 26 (socket 1)]");
    }

    #[test]
    fn ping_traffic() {
        let (mut reg, stack) = setup::<2>();
        let started = reg
            .ping(RemoteAddress::Literal(peer()), Some(16))
            .unwrap();

        // completions for the echo socket are silent
        assert_eq!(
            reg.dispatch(StackEvent::DataSent {
                id: started.id,
                status: Ok(()),
                space_left: 0,
            }),
            None
        );

        stack.advance_ticks(12);
        let mut reply = EchoHeader {
            kind: ECHO_REPLY,
            code: 0,
            identifier: 0xEEEE,
            sequence_number: 1,
        }
        .encode()
        .to_vec();
        reply.extend_from_slice(b"01234567");
        let n = reg
            .dispatch(StackEvent::Data {
                id: started.id,
                remote_address: peer(),
                remote_port: 0,
                data: reply.clone(),
            })
            .unwrap();
        assert_eq!(n.to_string(), "16 bytes from 2001:db8::77: icmp_seq=1 time=12 ms");

        reply[0] = 3;
        let n = reg.dispatch(StackEvent::Data {
            id: started.id,
            remote_address: peer(),
            remote_port: 0,
            data: reply,
        });
        assert_eq!(n, Some(Notice::PingRejected(ReplyError::UnexpectedType(3))));
        // the echo socket is never a tracked socket
        assert_eq!(
            reg.dispatch(StackEvent::Closing { id: started.id }),
            Some(Notice::UnknownSocket(started.id))
        );
    }

    #[test]
    fn quiet_and_unknown_events() {
        let (mut reg, _stack) = setup::<2>();
        assert_eq!(reg.dispatch(StackEvent::JoinState { state: 5 }), None);

        let n = reg.dispatch(StackEvent::Unrecognized { kind: 0xA7 }).unwrap();
        assert_eq!(n.to_string(), "[Unknown event: 167]");

        let mac = MacAddress([0, 1, 2, 3, 4, 5, 6, 7]);
        let n = reg
            .dispatch(StackEvent::ModeSwitchFallback { address: mac })
            .unwrap();
        assert_eq!(
            n.to_string(),
            "[mode switch fallback for 00:01:02:03:04:05:06:07 !!]"
        );

        assert_eq!(
            reg.dispatch(StackEvent::DataAvailable {
                id: SocketId(4),
                len: 12,
            }),
            Some(Notice::UnknownSocket(SocketId(4)))
        );
    }

    #[test]
    fn data_available_needs_a_tracked_socket() {
        let (mut reg, _stack) = setup::<2>();
        let udp = reg.udp_server(7).unwrap();
        let n = reg
            .dispatch(StackEvent::DataAvailable { id: udp.id, len: 12 })
            .unwrap();
        assert_eq!(n.to_string(), "[Data available: 1,12]");

        let ping = reg
            .ping(RemoteAddress::Literal(peer()), None)
            .unwrap();
        assert_eq!(
            reg.dispatch(StackEvent::DataAvailable { id: ping.id, len: 8 }),
            None
        );

        reg.close(udp.id).unwrap();
        assert_eq!(
            reg.dispatch(StackEvent::DataAvailable { id: udp.id, len: 3 }),
            Some(Notice::UnknownSocket(udp.id))
        );
    }

    #[test]
    fn stray_connect_failure_leaves_live_sockets() {
        let (mut reg, stack) = setup::<2>();
        let tcp = reg
            .tcp_client(RemoteAddress::Literal(peer()), 80)
            .unwrap();
        reg.dispatch(StackEvent::Connected {
            id: tcp.id,
            status: Ok(()),
        });
        let udp = reg.udp_server(5000).unwrap();

        for id in [tcp.id, udp.id] {
            let n = reg.dispatch(StackEvent::Connected {
                id,
                status: Err(Status::Fail),
            });
            assert_eq!(
                n,
                Some(Notice::IllegalTransition {
                    id,
                    error: TransitionError {
                        from: SocketState::Active,
                        to: SocketState::Active
                    }
                })
            );
        }

        assert_eq!(state_of(&reg, tcp.id), Some(SocketState::Active));
        assert_eq!(state_of(&reg, udp.id), Some(SocketState::Active));
        assert_eq!(stack.open_sockets(), [tcp.id, udp.id]);
    }
}

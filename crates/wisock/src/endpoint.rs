use core::{fmt, net::Ipv6Addr};

use serde::{Deserialize, Serialize};

use crate::SocketId;

/// What a tracked socket is. Fixed when the socket is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SocketKind {
    #[default]
    UdpClient,
    UdpServer,
    TcpClient,
    TcpServer,
}

impl fmt::Display for SocketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            SocketKind::UdpClient => "UDP client",
            SocketKind::UdpServer => "UDP server",
            SocketKind::TcpClient => "TCP client",
            SocketKind::TcpServer => "TCP server",
        })
    }
}

/// Connection lifecycle state.
///
/// ```text
/// Connecting ──▶ Active ──▶ Closing
/// Listening ───────────────▶ Closing
/// ```
///
/// UDP sockets and accepted TCP peers start out `Active`. `Closing` is
/// terminal: a closing socket stays tracked until it is closed explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SocketState {
    #[default]
    Active,
    Listening,
    Connecting,
    Closing,
}

impl SocketState {
    pub fn can_transition_to(self, next: SocketState) -> bool {
        use SocketState::*;
        matches!(
            (self, next),
            (Connecting, Active)
                | (Connecting, Closing)
                | (Listening, Closing)
                | (Active, Closing)
                | (Closing, Closing)
        )
    }
}

impl fmt::Display for SocketState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            SocketState::Active => "ACTIVE",
            SocketState::Listening => "LISTENING",
            SocketState::Connecting => "CONNECTING",
            SocketState::Closing => "CLOSING",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionError {
    pub from: SocketState,
    pub to: SocketState,
}

/// One tracked socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    pub id: SocketId,
    pub kind: SocketKind,
    pub state: SocketState,
    /// Peer address, `::` for servers
    pub remote_address: Ipv6Addr,
    /// Peer port, or the bound local port for servers
    pub remote_port: u16,
}

impl Endpoint {
    /// The state every slot is reset to when it is handed out or given back.
    pub const ZERO: Self = Self {
        id: SocketId::INVALID,
        kind: SocketKind::UdpClient,
        state: SocketState::Active,
        remote_address: Ipv6Addr::UNSPECIFIED,
        remote_port: 0,
    };

    pub fn transition_to(&mut self, next: SocketState) -> Result<(), TransitionError> {
        if !self.state.can_transition_to(next) {
            return Err(TransitionError {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Self::ZERO
    }
}

#[cfg(test)]
mod test {
    use super::{Endpoint, SocketKind, SocketState, TransitionError};

    #[test]
    fn client_path() {
        let mut ep = Endpoint {
            kind: SocketKind::TcpClient,
            state: SocketState::Connecting,
            ..Endpoint::ZERO
        };
        ep.transition_to(SocketState::Active).unwrap();
        ep.transition_to(SocketState::Closing).unwrap();
        // peer may repeat the indication
        ep.transition_to(SocketState::Closing).unwrap();
        assert_eq!(
            ep.transition_to(SocketState::Active),
            Err(TransitionError {
                from: SocketState::Closing,
                to: SocketState::Active
            })
        );
        assert_eq!(ep.state, SocketState::Closing);
    }

    #[test]
    fn no_skipping_back() {
        use SocketState::*;
        assert!(!Active.can_transition_to(Connecting));
        assert!(!Active.can_transition_to(Listening));
        assert!(!Active.can_transition_to(Active));
        assert!(!Listening.can_transition_to(Active));
        assert!(!Closing.can_transition_to(Listening));
        assert!(Listening.can_transition_to(Closing));
    }

    #[test]
    fn table_text() {
        assert_eq!(format!("{:>10}", SocketKind::TcpServer), "TCP server");
        assert_eq!(format!("{:>10}", SocketKind::UdpClient), "UDP client");
        assert_eq!(SocketState::Connecting.to_string(), "CONNECTING");
    }
}

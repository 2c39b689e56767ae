use super::queue::WriteQueue;
use crate::message::Request;
use crate::net::socket::Socket;
use mio::Token;
use std::net::SocketAddr;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundState {
    RecvRequest,
    Resolving,
    AwaitingOrigin,
    Streaming,
    Closed,
}

/// The client-facing half of one proxied transaction (§3). Owns the outbound
/// session it creates by identity (via `assigned`'s token) — when the inbound
/// tears down it force-disconnects that outbound and removes it from the engine.
pub struct Inbound {
    pub socket: Socket,
    pub peer: SocketAddr,
    pub idle_deadline: Instant,
    pub state: InboundState,
    pub request: Option<Request>,
    pub write_queue: WriteQueue,
    pub assigned: Option<Token>,
    pub writable_registered: bool,
}

impl Inbound {
    pub fn new(socket: Socket, peer: SocketAddr, idle_deadline: Instant) -> Self {
        Inbound {
            socket,
            peer,
            idle_deadline,
            state: InboundState::RecvRequest,
            request: None,
            write_queue: WriteQueue::new(),
            assigned: None,
            writable_registered: false,
        }
    }

    pub fn recharge_idle(&mut self, idle_timeout: std::time::Duration) {
        self.idle_deadline = Instant::now() + idle_timeout;
    }
}

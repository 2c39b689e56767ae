use super::queue::WriteQueue;
use crate::message::{Request, Response};
use crate::net::socket::Socket;
use mio::Token;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboundState {
    Connecting,
    SendingRequest,
    AwaitingResponse,
    Streaming,
    Discarding,
    Closed,
}

/// The origin-facing half of one proxied transaction (§3). `inbound` is a
/// non-owning back-reference (a `Token` key, not a strong pointer) — it is cleared
/// logically by the engine removing this outbound from its map before any further
/// dispatch can use it, so no ownership cycle exists (§9).
pub struct Outbound {
    pub socket: Socket,
    pub inbound: Token,
    pub connect_deadline: Instant,
    pub connect_disarmed: bool,
    pub state: OutboundState,
    pub response: Option<Response>,
    pub host: String,
    pub uri: String,
    /// True iff this outbound injected its own `If-None-Match` because the client's
    /// request wasn't already conditional and a cached entry existed (spec's
    /// `mode = REVALIDATING`) — distinct from the client having sent its own
    /// validator, which the proxy simply passes through without special 304 handling.
    pub revalidating: bool,
    pub cache_hit: bool,
    pub write_queue: WriteQueue,
    pub read_enabled: bool,
    pub any_bytes_delivered: bool,
    pub request: Request,
}

impl Outbound {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        socket: Socket,
        inbound: Token,
        connect_deadline: Instant,
        host: String,
        uri: String,
        revalidating: bool,
        cache_hit: bool,
        request: Request,
    ) -> Self {
        Outbound {
            socket,
            inbound,
            connect_deadline,
            connect_disarmed: false,
            state: OutboundState::Connecting,
            response: None,
            host,
            uri,
            revalidating,
            cache_hit,
            write_queue: WriteQueue::new(),
            read_enabled: true,
            any_bytes_delivered: false,
            request,
        }
    }
}

//! The collaborator layer named (but not designed) by the core spec: a thin
//! `mio`-backed event loop, non-blocking socket wrappers, an acceptor and an
//! event-fd-style waker. `dignifiedquire-rotor-http`'s `Protocol`/`Scope` split is
//! itself a thin abstraction over the same primitives; here the session engine plays
//! the role rotor's `Scope` plays, dispatching on `Token` directly against `mio::Poll`.

pub mod acceptor;
pub mod socket;

use mio::{Events, Poll, Token, Waker};
use std::io;
use std::sync::Arc;
use std::time::Duration;

/// Reserved tokens. Session sockets are allocated tokens starting at `FIRST_DYNAMIC`.
pub const ACCEPT_TOKEN: Token = Token(0);
pub const RESOLVE_WAKE_TOKEN: Token = Token(1);
pub const SIGNAL_TOKEN: Token = Token(2);
pub const FIRST_DYNAMIC: usize = 3;

pub struct EventLoop {
    poll: Poll,
    events: Events,
}

impl EventLoop {
    pub fn new(events_capacity: usize) -> io::Result<Self> {
        Ok(EventLoop {
            poll: Poll::new()?,
            events: Events::with_capacity(events_capacity),
        })
    }

    pub fn registry(&self) -> &mio::Registry {
        self.poll.registry()
    }

    /// Makes a waker bound to this loop's registry, to be handed to a background
    /// thread (the resolver's worker pool) as the "event-fd primitive" of §6.
    pub fn make_waker(&self, token: Token) -> io::Result<Arc<Waker>> {
        Ok(Arc::new(Waker::new(self.poll.registry(), token)?))
    }

    /// Blocks until readiness events arrive or `timeout` elapses, then makes them
    /// available via `events()`. A `None` timeout blocks indefinitely.
    pub fn poll(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        self.poll.poll(&mut self.events, timeout)
    }

    pub fn events(&self) -> &Events {
        &self.events
    }
}

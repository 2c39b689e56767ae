//! Component E: the proxy session engine, the central state machine pairing
//! inbound (client) and outbound (origin) sessions.

use super::inbound::{Inbound, InboundState};
use super::outbound::{Outbound, OutboundState};
use super::placeholder;
use crate::config::Config;
use crate::error::{ProxyError, Result};
use crate::message::{ParseState, Request, Response};
use crate::net::acceptor::Acceptor;
use crate::net::socket::Socket;
use crate::net::{self, EventLoop};
use crate::resolver::{Endpoint, ResolveResult, Resolver};
use crate::response_cache::ResponseCache;
use mio::{Interest, Token};
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook_mio::v0_8::Signals;
use std::collections::HashMap;
use std::time::{Duration, Instant};

fn interest_for(readable: bool, writable: bool) -> Option<Interest> {
    match (readable, writable) {
        (true, true) => Some(Interest::READABLE.add(Interest::WRITABLE)),
        (true, false) => Some(Interest::READABLE),
        (false, true) => Some(Interest::WRITABLE),
        (false, false) => None,
    }
}

pub struct Engine {
    event_loop: EventLoop,
    acceptor: Acceptor,
    resolver: Resolver,
    response_cache: ResponseCache,
    inbounds: HashMap<Token, Inbound>,
    outbounds: HashMap<Token, Outbound>,
    resolve_waiters: Vec<Token>,
    next_token: usize,
    shutdown: bool,
    idle_timeout: Duration,
    connect_timeout: Duration,
    signals: Signals,
}

impl Engine {
    pub fn new(config: &Config) -> Result<Self> {
        let mut event_loop = EventLoop::new(1024)?;
        let mut acceptor = Acceptor::bind(config.listen_addr)?;
        event_loop
            .registry()
            .register(acceptor.listener_mut(), net::ACCEPT_TOKEN, Interest::READABLE)?;

        let waker = event_loop.make_waker(net::RESOLVE_WAKE_TOKEN)?;
        let resolver = Resolver::new(config.resolver_pool_size, config.dns_cache_capacity, waker);

        let mut signals = Signals::new([SIGINT, SIGTERM])?;
        event_loop
            .registry()
            .register(&mut signals, net::SIGNAL_TOKEN, Interest::READABLE)?;

        Ok(Engine {
            event_loop,
            acceptor,
            resolver,
            response_cache: ResponseCache::new(config.response_cache_capacity),
            inbounds: HashMap::new(),
            outbounds: HashMap::new(),
            resolve_waiters: Vec::new(),
            next_token: net::FIRST_DYNAMIC,
            shutdown: false,
            idle_timeout: config.idle_timeout,
            connect_timeout: config.connect_timeout,
            signals,
        })
    }

    fn next_token(&mut self) -> Token {
        let t = Token(self.next_token);
        self.next_token += 1;
        t
    }

    /// The address actually bound, useful when `Config::listen_addr` asked for an
    /// ephemeral port (`:0`).
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.acceptor.local_addr()
    }

    /// Runs until a SIGINT/SIGTERM has been handled and every inbound has drained,
    /// matching the "may exit" idle-callback contract of §4.E.
    pub fn run(&mut self) -> Result<()> {
        loop {
            self.event_loop.poll(Some(Duration::from_millis(200)))?;
            let snapshot: Vec<(Token, bool, bool)> = self
                .event_loop
                .events()
                .iter()
                .map(|e| (e.token(), e.is_readable(), e.is_writable()))
                .collect();
            for (token, readable, writable) in snapshot {
                if token == net::ACCEPT_TOKEN {
                    self.handle_accept()?;
                } else if token == net::RESOLVE_WAKE_TOKEN {
                    self.handle_resolve_wake();
                } else if token == net::SIGNAL_TOKEN {
                    self.handle_signal();
                } else if self.inbounds.contains_key(&token) {
                    // An `Io` error here means this one connection is dead, not the
                    // whole engine (per the error taxonomy's contract) — tear down
                    // just this inbound and move on to the next readiness event.
                    if writable && self.inbound_writable(token).is_err() {
                        self.teardown_inbound(token);
                        continue;
                    }
                    if self.inbounds.contains_key(&token)
                        && readable
                        && self.inbound_readable(token).is_err()
                    {
                        self.teardown_inbound(token);
                    }
                } else if self.outbounds.contains_key(&token) {
                    if writable && self.outbound_writable(token).is_err() {
                        self.teardown_outbound(token, true);
                        continue;
                    }
                    if self.outbounds.contains_key(&token)
                        && readable
                        && self.outbound_readable(token).is_err()
                    {
                        self.teardown_outbound(token, true);
                    }
                }
            }
            self.sweep_idle_and_connect_timeouts();
            if self.shutdown && self.inbounds.is_empty() {
                return Ok(());
            }
        }
    }

    fn handle_signal(&mut self) {
        for signal in self.signals.pending() {
            if signal == SIGINT || signal == SIGTERM {
                log::info!("received shutdown signal, draining in-flight sessions");
                self.shutdown = true;
            }
        }
    }

    fn handle_accept(&mut self) -> Result<()> {
        loop {
            let accepted = self.acceptor.accept()?;
            let (mut socket, peer) = match accepted {
                Some(v) => v,
                None => break,
            };
            if self.shutdown {
                socket.force_disconnect();
                continue;
            }
            let token = self.next_token();
            self.event_loop
                .registry()
                .register(socket.inner_mut(), token, Interest::READABLE)?;
            let idle_deadline = Instant::now() + self.idle_timeout;
            log::info!("accepted {peer} as {token:?}");
            self.inbounds
                .insert(token, Inbound::new(socket, peer, idle_deadline));
        }
        Ok(())
    }

    // ---- inbound ----

    fn inbound_readable(&mut self, token: Token) -> Result<()> {
        let idle_timeout = self.idle_timeout;
        let mut bytes = Vec::new();
        let mut disconnected = false;
        let mut state = InboundState::Closed;
        if let Some(inbound) = self.inbounds.get_mut(&token) {
            match inbound.socket.read_available(&mut bytes) {
                Ok(true) => disconnected = true,
                Ok(false) => {
                    if !bytes.is_empty() {
                        inbound.recharge_idle(idle_timeout);
                    }
                }
                Err(e) => return Err(ProxyError::Io(e)),
            }
            state = inbound.state;
        }
        if disconnected {
            self.teardown_inbound(token);
            return Ok(());
        }
        if state != InboundState::RecvRequest || bytes.is_empty() {
            return Ok(());
        }

        let parse_state = {
            let inbound = self.inbounds.get_mut(&token).unwrap();
            let request = inbound.request.get_or_insert_with(Request::new);
            request.append(&bytes);
            request.state()
        };

        match parse_state {
            ParseState::Fail => {
                log::warn!("{token:?}: malformed request");
                self.send_placeholder_and_close(token, placeholder::BAD_REQUEST);
            }
            s if s.is_body_full() => {
                self.begin_resolve(token)?;
            }
            _ => {}
        }
        Ok(())
    }

    fn begin_resolve(&mut self, token: Token) -> Result<()> {
        let host = {
            let inbound = self.inbounds.get(&token).unwrap();
            inbound.request.as_ref().and_then(|r| r.host())
        };
        let host = match host {
            Some(h) => h,
            None => {
                self.send_placeholder_and_close(token, placeholder::BAD_REQUEST);
                return Ok(());
            }
        };
        let is_connect = {
            let inbound = self.inbounds.get(&token).unwrap();
            matches!(
                inbound.request.as_ref().and_then(|r| r.method()),
                Some(crate::message::Method::Connect)
            )
        };
        if is_connect {
            // Tunnel behavior is out of scope; reject as the spec permits.
            self.send_placeholder_and_close(token, placeholder::BAD_REQUEST);
            return Ok(());
        }

        if let Some(inbound) = self.inbounds.get_mut(&token) {
            inbound.state = InboundState::Resolving;
            self.event_loop
                .registry()
                .deregister(inbound.socket.inner_mut())?;
        }

        self.pending_resolve(token);
        self.resolver.resolve(&host);
        Ok(())
    }

    fn pending_resolve(&mut self, token: Token) {
        self.resolve_waiters.push(token);
    }

    fn handle_resolve_wake(&mut self) {
        loop {
            let result = match self.resolver.take_one() {
                Some(r) => r,
                None => break,
            };
            self.dispatch_resolve(result);
        }
    }

    fn dispatch_resolve(&mut self, result: ResolveResult) {
        // Find the first still-waiting inbound whose request host matches.
        let mut claimed_index = None;
        for (i, token) in self.resolve_waiters.iter().enumerate() {
            let matches = self
                .inbounds
                .get(token)
                .and_then(|ib| ib.request.as_ref())
                .and_then(|r| r.host())
                .map(|h| h == result.host)
                .unwrap_or(false);
            if matches {
                claimed_index = Some(i);
                break;
            }
        }
        let token = match claimed_index {
            Some(i) => self.resolve_waiters.remove(i),
            None => return,
        };

        if !self.inbounds.contains_key(&token) {
            return;
        }
        if !result.ok {
            self.send_placeholder_and_close(token, placeholder::NOT_FOUND);
            return;
        }
        let endpoint = result.endpoint.unwrap();
        self.resolver.cache_result(&result.host, endpoint);
        if let Err(e) = self.spawn_outbound(token, endpoint) {
            log::error!("{token:?}: failed to connect outbound: {e}");
            self.send_placeholder_and_close(token, placeholder::NOT_FOUND);
        }
    }

    fn spawn_outbound(&mut self, inbound_token: Token, endpoint: Endpoint) -> Result<()> {
        let (host, uri, request_clone) = {
            let inbound = self.inbounds.get(&inbound_token).unwrap();
            let req = inbound.request.as_ref().unwrap();
            (
                req.host().unwrap_or_default(),
                req.uri().unwrap_or("/").to_string(),
                req.clone(),
            )
        };

        let mut request_clone = request_clone;
        let key = ResponseCache::key(&host, &uri);
        let cache_hit = self.response_cache.exists(&key);
        let already_validating = request_clone.is_validating();
        let revalidating = !already_validating && cache_hit;
        if revalidating {
            if let Some(entry) = self.response_cache.get(&key) {
                request_clone.set_if_none_match(&entry.etag);
            }
        }

        let socket = Socket::connect(endpoint.to_socket_addr())?;
        let out_token = self.next_token();
        let connect_deadline = Instant::now() + self.connect_timeout;
        let rendered = request_clone.render();
        let mut outbound = Outbound::new(
            socket,
            inbound_token,
            connect_deadline,
            host,
            uri,
            revalidating,
            cache_hit,
            request_clone,
        );
        outbound.write_queue.push(rendered);
        self.event_loop.registry().register(
            outbound.socket.inner_mut(),
            out_token,
            Interest::WRITABLE,
        )?;
        self.outbounds.insert(out_token, outbound);

        if let Some(inbound) = self.inbounds.get_mut(&inbound_token) {
            inbound.state = InboundState::AwaitingOrigin;
            inbound.assigned = Some(out_token);
            inbound.request = None;
        }
        Ok(())
    }

    fn inbound_writable(&mut self, token: Token) -> Result<()> {
        let idle_timeout = self.idle_timeout;
        let mut drained = false;
        let mut assigned = None;
        if let Some(inbound) = self.inbounds.get_mut(&token) {
            inbound.recharge_idle(idle_timeout);
            drained = inbound.write_queue.drain_into(&mut inbound.socket)?;
            if drained {
                assigned = inbound.assigned;
            }
        }
        if drained {
            if let Some(inbound) = self.inbounds.get_mut(&token) {
                inbound.writable_registered = false;
                let readable = inbound.state == InboundState::RecvRequest;
                if let Some(interest) = interest_for(readable, false) {
                    self.event_loop
                        .registry()
                        .reregister(inbound.socket.inner_mut(), token, interest)?;
                } else {
                    self.event_loop
                        .registry()
                        .deregister(inbound.socket.inner_mut())?;
                }
            }
            if let Some(out_token) = assigned {
                self.ask_more(out_token)?;
            }
        }
        Ok(())
    }

    /// Pushes bytes to the client inbound, queueing the remainder and arming the
    /// writable-ready handler on a partial write (§4.E "On outbound data").
    fn try_send(&mut self, token: Token, data: Vec<u8>) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        let idle_timeout = self.idle_timeout;
        let mut need_register = false;
        let mut notify_outbound = None;
        if let Some(inbound) = self.inbounds.get_mut(&token) {
            if inbound.write_queue.is_empty() {
                let n = inbound.socket.write_partial(&data)?;
                inbound.recharge_idle(idle_timeout);
                if n == data.len() {
                    notify_outbound = inbound.assigned;
                } else {
                    inbound.write_queue.push(data[n..].to_vec());
                    if !inbound.writable_registered {
                        inbound.writable_registered = true;
                        need_register = true;
                    }
                }
            } else {
                inbound.write_queue.push(data);
            }
        }
        if need_register {
            if let Some(inbound) = self.inbounds.get_mut(&token) {
                self.event_loop.registry().reregister(
                    inbound.socket.inner_mut(),
                    token,
                    Interest::READABLE.add(Interest::WRITABLE),
                )?;
            }
        }
        if let Some(out_token) = notify_outbound {
            self.ask_more(out_token)?;
        }
        Ok(())
    }

    fn teardown_inbound(&mut self, token: Token) {
        if let Some(mut inbound) = self.inbounds.remove(&token) {
            let _ = self.event_loop.registry().deregister(inbound.socket.inner_mut());
            inbound.socket.force_disconnect();
            self.resolve_waiters.retain(|t| *t != token);
            if let Some(out_token) = inbound.assigned {
                self.teardown_outbound(out_token, false);
            }
            log::info!("{token:?}: inbound closed ({})", inbound.peer);
        }
    }

    fn send_placeholder_and_close(&mut self, token: Token, placeholder: &'static [u8]) {
        if let Some(inbound) = self.inbounds.get_mut(&token) {
            inbound.state = InboundState::Closed;
        }
        let _ = self.try_send(token, placeholder.to_vec());
        self.teardown_inbound(token);
    }

    // ---- outbound ----

    fn outbound_writable(&mut self, token: Token) -> Result<()> {
        let mut just_connected = false;
        let mut drained = false;
        if let Some(outbound) = self.outbounds.get_mut(&token) {
            if !outbound.connect_disarmed {
                match outbound.socket.inner_mut().take_error() {
                    Ok(None) => {
                        outbound.connect_disarmed = true;
                        just_connected = true;
                    }
                    Ok(Some(e)) => return Err(ProxyError::Io(e)),
                    Err(e) => return Err(ProxyError::Io(e)),
                }
            }
            drained = outbound.write_queue.drain_into(&mut outbound.socket)?;
        }
        let _ = just_connected;
        if drained {
            if let Some(outbound) = self.outbounds.get_mut(&token) {
                outbound.state = OutboundState::AwaitingResponse;
                self.event_loop
                    .registry()
                    .reregister(outbound.socket.inner_mut(), token, Interest::READABLE)?;
            }
        }
        Ok(())
    }

    fn outbound_readable(&mut self, token: Token) -> Result<()> {
        let idle_timeout = self.idle_timeout;
        let inbound_token = match self.outbounds.get(&token) {
            Some(o) => o.inbound,
            None => return Ok(()),
        };

        let mut bytes = Vec::new();
        let mut disconnected = false;
        if let Some(outbound) = self.outbounds.get_mut(&token) {
            match outbound.socket.read_available(&mut bytes) {
                Ok(true) => disconnected = true,
                Ok(false) => {
                    if !bytes.is_empty() {
                        outbound.any_bytes_delivered = true;
                    }
                }
                Err(e) => return Err(ProxyError::Io(e)),
            }
        }
        if !bytes.is_empty() {
            if let Some(inbound) = self.inbounds.get_mut(&inbound_token) {
                inbound.recharge_idle(idle_timeout);
            }
        }
        if disconnected {
            self.teardown_outbound(token, true);
            return Ok(());
        }
        if bytes.is_empty() {
            return Ok(());
        }

        let state = self.outbounds.get(&token).map(|o| o.state);
        if state == Some(OutboundState::Discarding) {
            // Draining origin bytes after a 304 cache hit; nothing is forwarded,
            // but we keep parsing so we notice when the discarded response is
            // structurally complete and can close the socket instead of leaving
            // it open until idle (§9 "SHOULD close").
            let done = {
                let outbound = self.outbounds.get_mut(&token).unwrap();
                let response = outbound.response.get_or_insert_with(Response::new);
                response.append(&bytes);
                response.state().is_body_full()
            };
            if done {
                self.teardown_outbound(token, false);
            }
            return Ok(());
        }

        let (revalidating, response_code, response_state) = {
            let outbound = self.outbounds.get_mut(&token).unwrap();
            let response = outbound.response.get_or_insert_with(Response::new);
            response.append(&bytes);
            (
                outbound.revalidating,
                response.code().map(|s| s.to_string()),
                response.state(),
            )
        };

        // Readiness is re-armed only via `ask_more`; disable read interest until
        // the inbound acknowledges consumption, per §4.E. (Discarding is the
        // exception — origin bytes are drained continuously once a 304 hit is
        // detected below, so it leaves read interest untouched.)
        if let Some(outbound) = self.outbounds.get_mut(&token) {
            self.event_loop
                .registry()
                .deregister(outbound.socket.inner_mut())?;
        }

        if revalidating
            && response_state.at_least(ParseState::FirstLine)
            && response_code.as_deref() == Some("304")
        {
            self.serve_from_cache_and_discard(token)?;
            if response_state.is_body_full() {
                self.teardown_outbound(token, false);
            }
            return Ok(());
        }

        if revalidating && response_state.at_least(ParseState::FirstLine) {
            if let Some(code) = &response_code {
                if code != "304" {
                    if let Some(outbound) = self.outbounds.get_mut(&token) {
                        outbound.cache_hit = false;
                    }
                }
            }
        }

        self.try_send(inbound_token, bytes)?;

        if response_state.is_body_full() {
            self.complete_outbound_response(token);
        }
        Ok(())
    }

    fn serve_from_cache_and_discard(&mut self, token: Token) -> Result<()> {
        let inbound_token = self.outbounds.get(&token).unwrap().inbound;
        let key = {
            let outbound = self.outbounds.get(&token).unwrap();
            ResponseCache::key(&outbound.host, &outbound.uri)
        };
        if let Some(stored) = self.response_cache.get(&key) {
            self.try_send(inbound_token, stored.text)?;
        }
        if let Some(outbound) = self.outbounds.get_mut(&token) {
            outbound.state = OutboundState::Discarding;
            self.event_loop
                .registry()
                .reregister(outbound.socket.inner_mut(), token, Interest::READABLE)?;
        }
        Ok(())
    }

    /// Re-arms the outbound's read interest once the inbound has finished
    /// consuming the previously forwarded chunk (§4.E "On ask_more").
    fn ask_more(&mut self, token: Token) -> Result<()> {
        let should_read = self
            .outbounds
            .get(&token)
            .map(|o| !o.cache_hit && o.state != OutboundState::Discarding)
            .unwrap_or(false);
        if should_read {
            if let Some(outbound) = self.outbounds.get_mut(&token) {
                self.event_loop
                    .registry()
                    .reregister(outbound.socket.inner_mut(), token, Interest::READABLE)?;
            }
        }
        Ok(())
    }

    fn complete_outbound_response(&mut self, token: Token) {
        if let Some(outbound) = self.outbounds.get(&token) {
            if !outbound.cache_hit {
                if let Some(response) = outbound.response.as_ref() {
                    let key = ResponseCache::key(&outbound.host, &outbound.uri);
                    self.response_cache.try_store(&key, &outbound.request, response);
                }
            }
        }
        self.teardown_outbound(token, false);
    }

    /// Tears down an outbound and, if it is still the inbound's assigned
    /// transaction, recovers that inbound for its next request (keep-alive; §7
    /// explicitly scopes out pipelining, not sequential reuse of the connection).
    /// `abrupt` distinguishes an unexpected disconnect (EOF/IO error mid-response)
    /// from an orderly completion (content-length satisfied, or a discarded
    /// revalidation hit fully drained) — only the former can leave the client with
    /// nothing useful, in which case a placeholder response is substituted instead
    /// of silently reopening the connection for a request that never arrives.
    fn teardown_outbound(&mut self, token: Token, abrupt: bool) {
        if let Some(mut outbound) = self.outbounds.remove(&token) {
            let _ = self
                .event_loop
                .registry()
                .deregister(outbound.socket.inner_mut());
            outbound.socket.force_disconnect();

            let recover = self
                .inbounds
                .get(&outbound.inbound)
                .map(|ib| ib.assigned == Some(token))
                .unwrap_or(false);
            if recover {
                if abrupt && outbound.state != OutboundState::Discarding && !outbound.any_bytes_delivered {
                    self.send_placeholder_and_close(outbound.inbound, placeholder::BAD_REQUEST);
                } else {
                    let mut interest = None;
                    if let Some(inbound) = self.inbounds.get_mut(&outbound.inbound) {
                        inbound.assigned = None;
                        inbound.state = InboundState::RecvRequest;
                        inbound.request = None;
                        inbound.writable_registered = false;
                        interest = interest_for(true, !inbound.write_queue.is_empty());
                    }
                    // The inbound socket was deregistered in `begin_resolve` for the
                    // duration of resolution and response forwarding; re-register it
                    // now that it's back to waiting for the client's next request, or
                    // the connection would hang silently until the idle sweep reaps it.
                    if let (Some(interest), Some(inbound)) =
                        (interest, self.inbounds.get_mut(&outbound.inbound))
                    {
                        let _ = self
                            .event_loop
                            .registry()
                            .register(inbound.socket.inner_mut(), outbound.inbound, interest);
                    }
                }
            }
        }
    }

    fn sweep_idle_and_connect_timeouts(&mut self) {
        let now = Instant::now();
        let idle_expired: Vec<Token> = self
            .inbounds
            .iter()
            .filter(|(_, ib)| now >= ib.idle_deadline)
            .map(|(t, _)| *t)
            .collect();
        for token in idle_expired {
            log::debug!("{token:?}: idle timeout");
            self.teardown_inbound(token);
        }

        let connect_expired: Vec<Token> = self
            .outbounds
            .iter()
            .filter(|(_, ob)| !ob.connect_disarmed && now >= ob.connect_deadline)
            .map(|(t, _)| *t)
            .collect();
        for token in connect_expired {
            if let Some(outbound) = self.outbounds.get(&token) {
                let inbound_token = outbound.inbound;
                self.send_placeholder_and_close(inbound_token, placeholder::NOT_FOUND);
            }
            self.teardown_outbound(token, false);
        }
    }
}

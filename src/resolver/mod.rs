//! Component C: a worker-pool name resolver feeding an event-loop-owned result
//! queue, with a bounded DNS cache.
//!
//! The task queue and completion queue translate the source's boost
//! `lockfree::queue` + `condition_variable` and `distribute_mutex` into
//! `std::sync::{Mutex, Condvar}` pairs — the same shape, since both describe a
//! bounded MPSC handoff guarded by a wakeup. Blocking resolution itself is
//! `std::net::ToSocketAddrs`, which invokes `getaddrinfo` for us.

use crate::cache::LruCache;
use mio::Waker;
use std::net::{Ipv4Addr, ToSocketAddrs};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

/// A resolved IPv4 endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    pub addr: Ipv4Addr,
    pub port: u16,
}

impl Endpoint {
    pub fn to_socket_addr(self) -> std::net::SocketAddr {
        std::net::SocketAddr::new(std::net::IpAddr::V4(self.addr), self.port)
    }
}

/// One resolver result node: the host string it resolves, the endpoint (meaningful
/// only if `ok`), and the outcome.
#[derive(Debug, Clone)]
pub struct ResolveResult {
    pub host: String,
    pub endpoint: Option<Endpoint>,
    pub ok: bool,
}

struct Shared {
    tasks: Mutex<std::collections::VecDeque<String>>,
    new_task: Condvar,
    destroy_threads: Mutex<bool>,
    completions: Mutex<std::collections::VecDeque<ResolveResult>>,
    waker: Arc<Waker>,
}

/// The name resolver: a fixed-size blocking worker pool plus a DNS cache, both
/// touched only by the loop thread except for the worker bodies themselves.
pub struct Resolver {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
    dns_cache: LruCache<String, Endpoint>,
}

impl Resolver {
    pub fn new(pool_size: usize, dns_cache_capacity: usize, waker: Arc<Waker>) -> Self {
        let shared = Arc::new(Shared {
            tasks: Mutex::new(std::collections::VecDeque::new()),
            new_task: Condvar::new(),
            destroy_threads: Mutex::new(false),
            completions: Mutex::new(std::collections::VecDeque::new()),
            waker,
        });
        let mut workers = Vec::with_capacity(pool_size);
        for _ in 0..pool_size {
            workers.push(spawn_worker(shared.clone()));
        }
        Resolver {
            shared,
            workers,
            dns_cache: LruCache::new(dns_cache_capacity),
        }
    }

    /// Submits `host_with_optional_port` for resolution. A DNS cache hit is
    /// synthesized and posted directly to the completion queue, skipping the
    /// worker pool entirely.
    pub fn resolve(&mut self, host: &str) {
        if let Some(endpoint) = self.dns_cache.get(&host.to_string()) {
            let result = ResolveResult {
                host: host.to_string(),
                endpoint: Some(endpoint),
                ok: true,
            };
            self.shared.completions.lock().unwrap().push_back(result);
            let _ = self.shared.waker.wake();
            return;
        }
        self.shared.tasks.lock().unwrap().push_back(host.to_string());
        self.shared.new_task.notify_one();
    }

    /// Dequeues exactly one completed result, for the loop's resolve-event
    /// callback to broadcast to subscribers.
    pub fn take_one(&mut self) -> Option<ResolveResult> {
        self.shared.completions.lock().unwrap().pop_front()
    }

    /// Records a successful resolution in the DNS cache under the original host
    /// string, once its owning session has consumed it.
    pub fn cache_result(&mut self, host: &str, endpoint: Endpoint) {
        self.dns_cache.put(host.to_string(), endpoint);
    }

    /// Drains all workers and respawns `new_size` of them. Submissions during the
    /// resize are safe: the task queue is behind its own mutex independent of the
    /// worker handles, and results already queued are never lost.
    pub fn resize(&mut self, new_size: usize) {
        *self.shared.destroy_threads.lock().unwrap() = true;
        self.shared.new_task.notify_all();
        for w in self.workers.drain(..) {
            let _ = w.join();
        }
        *self.shared.destroy_threads.lock().unwrap() = false;
        for _ in 0..new_size {
            self.workers.push(spawn_worker(self.shared.clone()));
        }
    }
}

impl Drop for Resolver {
    fn drop(&mut self) {
        *self.shared.destroy_threads.lock().unwrap() = true;
        self.shared.new_task.notify_all();
        for w in self.workers.drain(..) {
            let _ = w.join();
        }
    }
}

fn spawn_worker(shared: Arc<Shared>) -> JoinHandle<()> {
    thread::spawn(move || worker_loop(shared))
}

fn worker_loop(shared: Arc<Shared>) {
    loop {
        let task = {
            let mut tasks = shared.tasks.lock().unwrap();
            loop {
                if let Some(t) = tasks.pop_front() {
                    break Some(t);
                }
                if *shared.destroy_threads.lock().unwrap() {
                    break None;
                }
                tasks = shared.new_task.wait(tasks).unwrap();
            }
        };
        let task = match task {
            Some(t) => t,
            None => return,
        };
        let result = resolve_one(&task);
        shared.completions.lock().unwrap().push_back(result);
        let _ = shared.waker.wake();
    }
}

fn resolve_one(task: &str) -> ResolveResult {
    let (host, port) = match split_host_port(task) {
        Some(v) => v,
        None => {
            log::warn!("resolve {task}: port suffix is not a valid u16");
            return ResolveResult {
                host: task.to_string(),
                endpoint: None,
                ok: false,
            };
        }
    };
    let target = format!("{host}:{port}");
    match target.to_socket_addrs() {
        Ok(addrs) => {
            for addr in addrs {
                if let std::net::SocketAddr::V4(v4) = addr {
                    return ResolveResult {
                        host: task.to_string(),
                        endpoint: Some(Endpoint {
                            addr: *v4.ip(),
                            port,
                        }),
                        ok: true,
                    };
                }
            }
            log::warn!("resolve {task}: no IPv4 address in result set");
            ResolveResult {
                host: task.to_string(),
                endpoint: None,
                ok: false,
            }
        }
        Err(e) => {
            log::warn!("resolve {task} failed: {e}");
            ResolveResult {
                host: task.to_string(),
                endpoint: None,
                ok: false,
            }
        }
    }
}

/// Splits `host[:port]`. `None` means a `:port` suffix was present but failed to
/// parse as `u16` — a failure node, not a fallback to port 80.
fn split_host_port(task: &str) -> Option<(String, u16)> {
    match task.rsplit_once(':') {
        Some((host, port_str)) => port_str.parse::<u16>().ok().map(|port| (host.to_string(), port)),
        None => Some((task.to_string(), 80)),
    }
}

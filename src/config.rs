//! Listening endpoint and tunables, supplied by the host program (§6).

use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;

fn parse_duration_secs(s: &str) -> Result<Duration, std::num::ParseIntError> {
    s.parse::<u64>().map(Duration::from_secs)
}

/// CLI surface for `cacheproxyd`. Every flag has a default so the proxy can be
/// started with no arguments at all.
#[derive(Parser, Debug, Clone)]
#[command(name = "cacheproxyd", about = "Forward HTTP/1.x caching proxy")]
pub struct Config {
    /// Address the proxy accepts inbound connections on.
    #[arg(long, default_value = "127.0.0.1:3128")]
    pub listen_addr: SocketAddr,

    /// Number of blocking DNS-resolution worker threads.
    #[arg(long, default_value_t = 5)]
    pub resolver_pool_size: usize,

    /// Maximum number of resolved host entries kept in the DNS LRU.
    #[arg(long, default_value_t = 500)]
    pub dns_cache_capacity: usize,

    /// Maximum number of cached origin responses kept in the response LRU.
    #[arg(long, default_value_t = 10_000)]
    pub response_cache_capacity: usize,

    /// Seconds an inbound connection may sit without activity before it is closed.
    #[arg(long, value_parser = parse_duration_secs, default_value = "60")]
    pub idle_timeout: Duration,

    /// Seconds allowed for an outbound TCP connect before it is given up on.
    #[arg(long, value_parser = parse_duration_secs, default_value = "10")]
    pub connect_timeout: Duration,
}

impl Config {
    pub fn from_args() -> Self {
        Config::parse()
    }
}

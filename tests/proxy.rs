//! End-to-end session-engine behavior: a real `Engine` listening on loopback,
//! driving requests against an in-process mock origin.

use cacheproxy::{Config, Engine};
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::thread;
use std::time::Duration;

fn test_config(listen_addr: SocketAddr) -> Config {
    Config {
        listen_addr,
        resolver_pool_size: 2,
        dns_cache_capacity: 16,
        response_cache_capacity: 16,
        idle_timeout: Duration::from_secs(5),
        connect_timeout: Duration::from_millis(500),
    }
}

/// Starts an `Engine` on an ephemeral loopback port and runs it on a background
/// thread for the remainder of the test process. Returns the address to connect to.
fn spawn_proxy() -> SocketAddr {
    let config = test_config("127.0.0.1:0".parse().unwrap());
    let mut engine = Engine::new(&config).expect("engine starts");
    let addr = engine.local_addr().expect("bound address");
    thread::spawn(move || {
        let _ = engine.run();
    });
    addr
}

/// Starts a listener that serves each entry of `responses` to one accepted
/// connection each, in order, then stops accepting.
fn spawn_mock_origin(responses: Vec<&'static [u8]>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind origin");
    let addr = listener.local_addr().expect("origin addr");
    thread::spawn(move || {
        for response in responses {
            let (mut stream, _) = match listener.accept() {
                Ok(v) => v,
                Err(_) => return,
            };
            let mut buf = [0u8; 4096];
            let mut seen = Vec::new();
            loop {
                let n = match stream.read(&mut buf) {
                    Ok(n) => n,
                    Err(_) => break,
                };
                if n == 0 {
                    break;
                }
                seen.extend_from_slice(&buf[..n]);
                if find_subslice(&seen, b"\r\n\r\n").is_some() {
                    break;
                }
            }
            let _ = stream.write_all(response);
            let _ = stream.flush();
        }
    });
    addr
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Sends `request` to `proxy_addr` over a fresh connection and reads one response.
/// The inbound connection is kept alive by the proxy for a possible next request
/// (keep-alive without pipelining), so this does not wait for EOF: it blocks for the
/// first byte, then drains whatever trails within a short idle window.
fn roundtrip(proxy_addr: SocketAddr, request: &[u8]) -> Vec<u8> {
    let mut stream = TcpStream::connect(proxy_addr).expect("connect to proxy");
    stream.write_all(request).unwrap();
    let mut out = Vec::new();
    let mut buf = [0u8; 4096];

    stream.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
    match stream.read(&mut buf) {
        Ok(0) => return out,
        Ok(n) => out.extend_from_slice(&buf[..n]),
        Err(e) => panic!("read from proxy: {e}"),
    }

    stream.set_read_timeout(Some(Duration::from_millis(150))).unwrap();
    loop {
        match stream.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => out.extend_from_slice(&buf[..n]),
            Err(_) => break,
        }
    }
    out
}

/// Like `roundtrip`, but reuses an already-open stream instead of dialing a new
/// one — for exercising keep-alive reuse of a single inbound connection.
fn roundtrip_on(stream: &mut TcpStream, request: &[u8]) -> Vec<u8> {
    stream.write_all(request).unwrap();
    let mut out = Vec::new();
    let mut buf = [0u8; 4096];

    stream.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
    match stream.read(&mut buf) {
        Ok(0) => return out,
        Ok(n) => out.extend_from_slice(&buf[..n]),
        Err(e) => panic!("read from proxy: {e}"),
    }

    stream.set_read_timeout(Some(Duration::from_millis(150))).unwrap();
    loop {
        match stream.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => out.extend_from_slice(&buf[..n]),
            Err(_) => break,
        }
    }
    out
}

#[test]
fn keep_alive_reuses_one_connection_for_two_requests() {
    let origin_addr = spawn_mock_origin(vec![
        b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nhi",
        b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nHI",
    ]);
    let proxy_addr = spawn_proxy();
    let request = format!("GET /a HTTP/1.1\r\nHost: {origin_addr}\r\n\r\n");

    let mut stream = TcpStream::connect(proxy_addr).expect("connect to proxy");
    let first = roundtrip_on(&mut stream, request.as_bytes());
    assert!(first.starts_with(b"HTTP/1.1 200 OK"));
    assert!(first.ends_with(b"hi"));

    // Same connection, second request: the proxy must have re-registered this
    // inbound socket's readable interest after completing the first response.
    let second = roundtrip_on(&mut stream, request.as_bytes());
    assert!(second.starts_with(b"HTTP/1.1 200 OK"));
    assert!(second.ends_with(b"HI"));
}

#[test]
fn simple_get_passthrough() {
    let origin_addr = spawn_mock_origin(vec![b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nhi"]);
    let proxy_addr = spawn_proxy();

    let request = format!("GET /a HTTP/1.1\r\nHost: {origin_addr}\r\n\r\n");
    let response = roundtrip(proxy_addr, request.as_bytes());

    assert!(response.starts_with(b"HTTP/1.1 200 OK"));
    assert!(response.ends_with(b"hi"));
}

#[test]
fn cacheable_get_is_served_through_on_first_request() {
    let origin_addr = spawn_mock_origin(vec![
        b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\nETag: \"x\"\r\n\r\nhi",
    ]);
    let proxy_addr = spawn_proxy();

    let request = format!("GET /a HTTP/1.1\r\nHost: {origin_addr}\r\n\r\n");
    let response = roundtrip(proxy_addr, request.as_bytes());

    assert!(response.starts_with(b"HTTP/1.1 200 OK"));
    assert!(response.windows(4).any(|w| w == b"ETag" || w == b"etag" || w == b"ETAG"));
    assert!(response.ends_with(b"hi"));
}

#[test]
fn revalidation_hit_serves_cached_body_on_304() {
    let origin_addr = spawn_mock_origin(vec![
        b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\nETag: \"x\"\r\n\r\nhi",
        b"HTTP/1.1 304 Not Modified\r\nContent-Length: 0\r\n\r\n",
    ]);
    let proxy_addr = spawn_proxy();
    let request = format!("GET /a HTTP/1.1\r\nHost: {origin_addr}\r\n\r\n");

    let first = roundtrip(proxy_addr, request.as_bytes());
    assert!(first.ends_with(b"hi"));

    let second = roundtrip(proxy_addr, request.as_bytes());
    assert!(second.starts_with(b"HTTP/1.1 200 OK"));
    assert!(second.ends_with(b"hi"));
    assert!(!second.windows(3).any(|w| w == b"304"));
}

#[test]
fn revalidation_miss_replaces_cached_body() {
    let origin_addr = spawn_mock_origin(vec![
        b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\nETag: \"x\"\r\n\r\nhi",
        b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\nETag: \"y\"\r\n\r\nHI",
    ]);
    let proxy_addr = spawn_proxy();
    let request = format!("GET /a HTTP/1.1\r\nHost: {origin_addr}\r\n\r\n");

    let first = roundtrip(proxy_addr, request.as_bytes());
    assert!(first.ends_with(b"hi"));

    let second = roundtrip(proxy_addr, request.as_bytes());
    assert!(second.starts_with(b"HTTP/1.1 200 OK"));
    assert!(second.ends_with(b"HI"));
}

#[test]
fn malformed_request_gets_placeholder_without_touching_origin() {
    let proxy_addr = spawn_proxy();
    let response = roundtrip(proxy_addr, b"FOO /a HTTP/1.1\r\n\r\n");
    assert!(response.starts_with(b"HTTP/1.1 400"));
}

#[test]
fn connect_failure_gets_not_found_placeholder() {
    // A bound-but-unlistened loopback port: the OS refuses the connection almost
    // immediately, with no DNS lookup involved.
    let closed = TcpListener::bind("127.0.0.1:0").unwrap();
    let dead_addr = closed.local_addr().unwrap();
    drop(closed);

    let proxy_addr = spawn_proxy();
    let request = format!("GET /a HTTP/1.1\r\nHost: {dead_addr}\r\n\r\n");
    let response = roundtrip(proxy_addr, request.as_bytes());
    assert!(response.starts_with(b"HTTP/1.1 400") || response.starts_with(b"HTTP/1.1 404"));
}

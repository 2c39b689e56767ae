//! The incremental HTTP/1.x message parser (component A).
//!
//! `Message` holds the state shared by requests and responses: the growing byte
//! buffer, the parse state machine, the header map and the body boundary. `request`
//! and `response` layer method/URI/code parsing on top.

pub mod headers;
pub mod request;
pub mod response;

pub use headers::HeaderMap;
pub use request::{Method, Request};
pub use response::Response;

pub(crate) const CRLF: &[u8] = b"\r\n";
const CRLFCRLF: &[u8] = b"\r\n\r\n";
const CHUNKED_TAIL: &[u8] = b"\r\n0\r\n\r\n";

/// Parse state, monotone along `Init -> FirstLine -> Headers -> (BodyPart <-> BodyFull)`.
/// `Fail` is terminal and reachable from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseState {
    Init,
    FirstLine,
    Headers,
    BodyPart,
    BodyFull,
    Fail,
}

impl ParseState {
    fn rank(self) -> u8 {
        match self {
            ParseState::Init => 0,
            ParseState::FirstLine => 1,
            ParseState::Headers => 2,
            ParseState::BodyPart | ParseState::BodyFull => 3,
            ParseState::Fail => 255,
        }
    }

    /// Whether `self` has progressed at least as far as `other` in the monotone chain.
    pub fn at_least(self, other: ParseState) -> bool {
        self.rank() >= other.rank()
    }

    pub fn is_fail(self) -> bool {
        matches!(self, ParseState::Fail)
    }

    pub fn is_body_full(self) -> bool {
        matches!(self, ParseState::BodyFull)
    }
}

/// Version token, restricted to the two the parser accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
    Http10,
    Http11,
}

impl Version {
    fn parse(s: &str) -> Option<Version> {
        match s {
            "HTTP/1.0" => Some(Version::Http10),
            "HTTP/1.1" => Some(Version::Http11),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Version::Http10 => "HTTP/1.0",
            Version::Http11 => "HTTP/1.1",
        }
    }
}

/// The message state shared by requests and responses.
#[derive(Debug, Clone)]
pub struct Message {
    text: Vec<u8>,
    state: ParseState,
    body_start: Option<usize>,
    headers: HeaderMap,
}

impl Message {
    pub(crate) fn new() -> Self {
        Message {
            text: Vec::new(),
            state: ParseState::Init,
            body_start: None,
            headers: HeaderMap::new(),
        }
    }

    pub fn state(&self) -> ParseState {
        self.state
    }

    pub fn text(&self) -> &[u8] {
        &self.text
    }

    pub fn header(&self, name: &str) -> &str {
        self.headers.get(name).unwrap_or("")
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub(crate) fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn body(&self) -> &[u8] {
        match self.body_start {
            Some(start) => &self.text[start..],
            None => &[],
        }
    }

    pub(crate) fn fail(&mut self) {
        self.state = ParseState::Fail;
    }

    pub(crate) fn set_state(&mut self, state: ParseState) {
        self.state = state;
    }

    /// Appends raw bytes to the buffer. `Request`/`Response` call this, then drive
    /// their own first-line parsing, then call `advance` to pick up headers/body.
    pub(crate) fn push_bytes(&mut self, bytes: &[u8]) {
        self.text.extend_from_slice(bytes);
    }

    /// Advances headers/body framing as far as the current buffer allows. Safe to
    /// call repeatedly; it is a no-op once `Fail` or `BodyFull` with nothing new.
    pub(crate) fn advance(&mut self) {
        if self.state.is_fail() {
            return;
        }
        if self.state == ParseState::FirstLine {
            self.try_parse_headers();
        }
        if self.state.at_least(ParseState::Headers) {
            self.update_body_framing();
        }
    }

    fn try_parse_headers(&mut self) {
        let first_crlf = match find(&self.text, CRLF) {
            Some(p) => p,
            None => return,
        };
        let blank = match find(&self.text, CRLFCRLF) {
            Some(p) => p,
            None => return,
        };
        let header_block = &self.text[first_crlf + CRLF.len()..blank];
        let mut headers = HeaderMap::new();
        for line in split_crlf(header_block) {
            if line.is_empty() {
                continue;
            }
            match line.iter().position(|&b| b == b':') {
                Some(colon) => {
                    let name = match std::str::from_utf8(&line[..colon]) {
                        Ok(s) => s,
                        Err(_) => {
                            self.fail();
                            return;
                        }
                    };
                    let mut rest = &line[colon + 1..];
                    if rest.first() == Some(&b' ') {
                        rest = &rest[1..];
                    }
                    let value = match std::str::from_utf8(rest) {
                        Ok(s) => s,
                        Err(_) => {
                            self.fail();
                            return;
                        }
                    };
                    headers.insert(name, value);
                }
                None => {
                    self.fail();
                    return;
                }
            }
        }
        self.headers = headers;
        self.body_start = Some(blank + CRLFCRLF.len());
        self.state = ParseState::Headers;
        self.update_body_framing();
    }

    /// Body framing, run once on entering `Headers` and again on every subsequent
    /// append while `BodyPart`.
    fn update_body_framing(&mut self) {
        if !self.state.at_least(ParseState::Headers) || self.state.is_fail() {
            return;
        }
        let body = self.body();
        if let Some(len_str) = self.headers.get("content-length") {
            match len_str.trim().parse::<usize>() {
                Ok(n) => {
                    self.state = if body.len() == n {
                        ParseState::BodyFull
                    } else {
                        ParseState::BodyPart
                    };
                }
                Err(_) => self.fail(),
            }
        } else if self
            .headers
            .get("transfer-encoding")
            .map(|v| v.eq_ignore_ascii_case("chunked"))
            .unwrap_or(false)
        {
            self.state = if body.ends_with(CHUNKED_TAIL) {
                ParseState::BodyFull
            } else {
                ParseState::BodyPart
            };
        } else if body.is_empty() {
            self.state = ParseState::BodyFull;
        } else {
            self.fail();
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::request::Request;

    struct Case {
        name: &'static str,
        chunks: &'static [&'static [u8]],
        want_state: ParseState,
    }

    const CASES: &[Case] = &[
        Case {
            name: "a split CRLF between appends still completes the first line",
            chunks: &[b"GET / HTTP/1.1\r", b"\nHost: a\r\n\r\n"],
            want_state: ParseState::BodyFull,
        },
        Case {
            name: "content-length: 0 is body-full as soon as headers complete",
            chunks: &[b"GET / HTTP/1.1\r\nHost: a\r\nContent-Length: 0\r\n\r\n"],
            want_state: ParseState::BodyFull,
        },
        Case {
            name: "chunked body is only body-part before the terminating chunk",
            chunks: &[b"GET / HTTP/1.1\r\nHost: a\r\nTransfer-Encoding: chunked\r\n\r\n4\r\nwiki\r\n"],
            want_state: ParseState::BodyPart,
        },
        Case {
            name: "chunked body reaches body-full once the 0-length tail arrives",
            chunks: &[
                b"GET / HTTP/1.1\r\nHost: a\r\nTransfer-Encoding: chunked\r\n\r\n4\r\nwiki\r\n0\r\n\r\n",
            ],
            want_state: ParseState::BodyFull,
        },
    ];

    #[test]
    fn state_machine_boundary_behaviors() {
        for case in CASES {
            let mut req = Request::new();
            for chunk in case.chunks {
                req.append(chunk);
            }
            assert_eq!(req.state(), case.want_state, "case: {}", case.name);
        }
    }

    #[test]
    fn parse_state_at_least_is_monotone() {
        assert!(ParseState::BodyFull.at_least(ParseState::FirstLine));
        assert!(ParseState::FirstLine.at_least(ParseState::FirstLine));
        assert!(!ParseState::Headers.at_least(ParseState::BodyFull));
    }
}

pub(crate) fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn split_crlf(block: &[u8]) -> impl Iterator<Item = &[u8]> {
    block.split(|w| *w == b'\n').map(|line| {
        if line.last() == Some(&b'\r') {
            &line[..line.len() - 1]
        } else {
            line
        }
    })
}

/// RFC 7230 §6.1 hop-by-hop headers stripped before forwarding, regardless of what the
/// `Connection` header additionally names.
pub const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-connection",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Header names that should not be forwarded upstream/downstream: the fixed
/// hop-by-hop set plus anything the `Connection` header itself names.
pub fn hop_by_hop_for(headers: &HeaderMap) -> Vec<String> {
    let mut names: Vec<String> = HOP_BY_HOP.iter().map(|s| s.to_string()).collect();
    if let Some(conn) = headers.get("connection") {
        for tok in conn.split(',') {
            let tok = tok.trim().to_ascii_lowercase();
            if !tok.is_empty() {
                names.push(tok);
            }
        }
    }
    names
}

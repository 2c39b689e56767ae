use super::{find, Message, ParseState, Version, CRLF};

/// Methods the parser accepts on the request line. CONNECT is recognized but the
/// session engine rejects it — tunnel behavior is out of scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Connect,
}

impl Method {
    fn parse(s: &str) -> Option<Method> {
        match s {
            "GET" => Some(Method::Get),
            "POST" => Some(Method::Post),
            "CONNECT" => Some(Method::Connect),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Connect => "CONNECT",
        }
    }
}

/// An incrementally parsed HTTP request.
#[derive(Debug, Clone)]
pub struct Request {
    msg: Message,
    method: Option<Method>,
    uri: Option<String>,
    version: Option<Version>,
}

impl Default for Request {
    fn default() -> Self {
        Self::new()
    }
}

impl Request {
    pub fn new() -> Self {
        Request {
            msg: Message::new(),
            method: None,
            uri: None,
            version: None,
        }
    }

    pub fn append(&mut self, bytes: &[u8]) {
        self.msg.push_bytes(bytes);
        if self.msg.state() == ParseState::Init {
            self.try_parse_first_line();
        }
        self.msg.advance();
    }

    fn try_parse_first_line(&mut self) {
        let text = self.msg.text();
        let end = match find(text, CRLF) {
            Some(p) => p,
            None => return,
        };
        let line = match std::str::from_utf8(&text[..end]) {
            Ok(s) => s,
            Err(_) => {
                self.msg.fail();
                return;
            }
        };
        let tokens: Vec<&str> = line.split(' ').collect();
        if tokens.len() != 3 {
            self.msg.fail();
            return;
        }
        let method = match Method::parse(tokens[0]) {
            Some(m) => m,
            None => {
                self.msg.fail();
                return;
            }
        };
        if tokens[1].is_empty() {
            self.msg.fail();
            return;
        }
        let version = match Version::parse(tokens[2]) {
            Some(v) => v,
            None => {
                self.msg.fail();
                return;
            }
        };
        self.method = Some(method);
        self.uri = Some(tokens[1].to_string());
        self.version = Some(version);
        self.msg.set_state(ParseState::FirstLine);
    }

    pub fn state(&self) -> ParseState {
        self.msg.state()
    }

    pub fn header(&self, name: &str) -> &str {
        self.msg.header(name)
    }

    pub fn method(&self) -> Option<Method> {
        self.method
    }

    pub fn uri(&self) -> Option<&str> {
        self.uri.as_deref()
    }

    pub fn version(&self) -> Option<Version> {
        self.version
    }

    pub fn body(&self) -> &[u8] {
        self.msg.body()
    }

    pub fn message(&self) -> &Message {
        &self.msg
    }

    pub fn message_mut(&mut self) -> &mut Message {
        &mut self.msg
    }

    /// Derived host: the request-line target for CONNECT, else the `Host` header.
    pub fn host(&self) -> Option<String> {
        match self.method {
            Some(Method::Connect) => self.uri.clone(),
            _ => {
                let h = self.msg.header("host");
                if h.is_empty() {
                    None
                } else {
                    Some(h.to_string())
                }
            }
        }
    }

    /// True iff the request already carries a conditional-request validator.
    pub fn is_validating(&self) -> bool {
        self.msg.headers().has_nonempty("if-none-match")
            || self.msg.headers().has_nonempty("if-modified-since")
    }

    /// Prepends an `If-None-Match` header carrying the cached entry's ETag, used
    /// when revalidating against the origin.
    pub fn set_if_none_match(&mut self, etag: &str) {
        self.msg.headers_mut().insert("If-None-Match", etag);
    }

    /// Serializes the request for forwarding upstream: request line, headers minus
    /// the hop-by-hop set, blank line, body. The URI is normalized to origin-form —
    /// the scheme+host prefix is stripped if present.
    pub fn render(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.msg.text().len());
        let method = self.method.map(Method::as_str).unwrap_or("GET");
        let version = self.version.map(Version::as_str).unwrap_or("HTTP/1.1");
        let uri = self.uri.as_deref().unwrap_or("/");
        out.extend_from_slice(method.as_bytes());
        out.push(b' ');
        out.extend_from_slice(origin_form(uri).as_bytes());
        out.push(b' ');
        out.extend_from_slice(version.as_bytes());
        out.extend_from_slice(CRLF);

        let drop = super::hop_by_hop_for(self.msg.headers());
        for (name, value) in self.msg.headers().iter() {
            if drop.iter().any(|d| d.eq_ignore_ascii_case(name)) {
                continue;
            }
            out.extend_from_slice(name.as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(value.as_bytes());
            out.extend_from_slice(CRLF);
        }
        out.extend_from_slice(CRLF);
        out.extend_from_slice(self.msg.body());
        out
    }
}

/// Strips a `scheme://host` prefix from an absolute-form URI, leaving origin-form
/// (`/path?query`). Already-origin-form URIs pass through unchanged.
fn origin_form(uri: &str) -> &str {
    if let Some(rest) = uri.strip_prefix("http://").or_else(|| uri.strip_prefix("https://")) {
        match rest.find('/') {
            Some(p) => &rest[p..],
            None => "/",
        }
    } else {
        uri
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_render_parse_round_trip() {
        let original =
            b"GET /a/b?x=1 HTTP/1.1\r\nHost: example.com\r\nContent-Length: 2\r\n\r\nhi";
        let mut req = Request::new();
        req.append(original);
        assert_eq!(req.state(), ParseState::BodyFull);

        let rendered = req.render();
        let mut reparsed = Request::new();
        reparsed.append(&rendered);

        assert_eq!(reparsed.state(), ParseState::BodyFull);
        assert_eq!(reparsed.method(), req.method());
        assert_eq!(reparsed.uri(), req.uri());
        assert_eq!(reparsed.body(), req.body());
        assert_eq!(reparsed.header("host"), req.header("host"));
    }

    #[test]
    fn render_strips_hop_by_hop_headers() {
        let mut req = Request::new();
        req.append(b"GET / HTTP/1.1\r\nHost: a\r\nConnection: keep-alive\r\nContent-Length: 0\r\n\r\n");
        let rendered = req.render();
        let rendered_str = String::from_utf8(rendered).unwrap();
        assert!(!rendered_str.to_ascii_lowercase().contains("connection:"));
        assert!(rendered_str.contains("Host: a"));
    }

    #[test]
    fn render_normalizes_absolute_form_uri_to_origin_form() {
        let mut req = Request::new();
        req.append(b"GET http://example.com/a?b=1 HTTP/1.1\r\nHost: example.com\r\n\r\n");
        let rendered = String::from_utf8(req.render()).unwrap();
        assert!(rendered.starts_with("GET /a?b=1 HTTP/1.1\r\n"));
    }
}

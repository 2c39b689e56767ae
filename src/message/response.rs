use super::{find, Message, ParseState, Version, CRLF};

/// An incrementally parsed HTTP response.
#[derive(Debug, Clone)]
pub struct Response {
    msg: Message,
    version: Option<Version>,
    code: Option<String>,
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

impl Response {
    pub fn new() -> Self {
        Response {
            msg: Message::new(),
            version: None,
            code: None,
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
        let mut parts = line.splitn(3, ' ');
        let version_tok = parts.next().unwrap_or("");
        let code_tok = parts.next().unwrap_or("");
        // Reason phrase (parts.next()) is not retained; it is not part of the data
        // model and is forwarded verbatim as part of raw `text` regardless.
        let version = match Version::parse(version_tok) {
            Some(v) => v,
            None => {
                self.msg.fail();
                return;
            }
        };
        if code_tok.len() != 3 || !code_tok.bytes().all(|b| b.is_ascii_digit()) {
            self.msg.fail();
            return;
        }
        self.version = Some(version);
        self.code = Some(code_tok.to_string());
        self.msg.set_state(ParseState::FirstLine);
    }

    pub fn state(&self) -> ParseState {
        self.msg.state()
    }

    pub fn header(&self, name: &str) -> &str {
        self.msg.header(name)
    }

    pub fn version(&self) -> Option<Version> {
        self.version
    }

    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    pub fn body(&self) -> &[u8] {
        self.msg.body()
    }

    pub fn text(&self) -> &[u8] {
        self.msg.text()
    }

    pub fn message(&self) -> &Message {
        &self.msg
    }

    /// `is_cacheable`: status 200, a non-empty `ETag`, and no `no-store`/`private`
    /// `Cache-Control` directive.
    pub fn is_cacheable(&self) -> bool {
        if self.code.as_deref() != Some("200") {
            return false;
        }
        if !self.msg.headers().has_nonempty("etag") {
            return false;
        }
        if let Some(cc) = self.msg.headers().get("cache-control") {
            let cc = cc.to_ascii_lowercase();
            if cc.contains("no-store") || cc.contains("private") {
                return false;
            }
        }
        true
    }

    pub fn etag(&self) -> Option<&str> {
        self.msg.headers().get("etag").filter(|s| !s.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_length_zero_reaches_body_full_on_first_append() {
        let mut resp = Response::new();
        resp.append(b"HTTP/1.1 304 Not Modified\r\nContent-Length: 0\r\n\r\n");
        assert_eq!(resp.state(), ParseState::BodyFull);
        assert_eq!(resp.code(), Some("304"));
    }

    #[test]
    fn is_cacheable_requires_200_and_etag_without_no_store() {
        let mut ok = Response::new();
        ok.append(b"HTTP/1.1 200 OK\r\nETag: \"x\"\r\nContent-Length: 0\r\n\r\n");
        assert!(ok.is_cacheable());

        let mut no_etag = Response::new();
        no_etag.append(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n");
        assert!(!no_etag.is_cacheable());

        let mut private = Response::new();
        private.append(b"HTTP/1.1 200 OK\r\nETag: \"x\"\r\nCache-Control: private\r\nContent-Length: 0\r\n\r\n");
        assert!(!private.is_cacheable());

        let mut not_200 = Response::new();
        not_200.append(b"HTTP/1.1 404 Not Found\r\nETag: \"x\"\r\nContent-Length: 0\r\n\r\n");
        assert!(!not_200.is_cacheable());
    }
}

//! Fixed canned responses used to report proxy-level errors to the client (§7).

/// Sent when the parser reaches `FAIL` on an inbound request.
pub const BAD_REQUEST: &[u8] =
    b"HTTP/1.1 400 Bad Request\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";

/// Sent on resolve failure or outbound connect timeout.
pub const NOT_FOUND: &[u8] =
    b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";

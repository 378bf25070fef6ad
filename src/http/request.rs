//! Request parser.
//!
//! Bytes arrive in bulk reads. The header block is collected until the blank
//! line, parsed once, and whatever follows goes to the body.

use heapless::{String, Vec};
use smoltcp::wire::Ipv4Address;

pub const MAX_HEAD: usize = 2048;
pub const MAX_HEADERS: usize = 16;
pub const MAX_BODY: usize = 1024;
pub const MAX_URI: usize = 128;
const MAX_NAME: usize = 32;
const MAX_VALUE: usize = 96;

/// Headers no handler looks at; skipped without storing.
const SKIPPED_HEADERS: [&str; 5] = [
    "connection",
    "user-agent",
    "cache-control",
    "dnt",
    "upgrade-insecure-requests",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

/// What the parser wants after a `feed`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Parse {
    NeedMore,
    Complete,
    /// Answer with this status and close.
    Reject(u16),
}

pub struct Header {
    name: String<MAX_NAME>,
    value: String<MAX_VALUE>,
}

impl Header {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

pub struct Request {
    head: Vec<u8, MAX_HEAD>,
    head_done: bool,
    method: Method,
    uri: String<MAX_URI>,
    headers: Vec<Header, MAX_HEADERS>,
    content_length: usize,
    body: Vec<u8, MAX_BODY>,
    remote: Ipv4Address,
}

impl Request {
    pub fn new() -> Self {
        Self {
            head: Vec::new(),
            head_done: false,
            method: Method::Get,
            uri: String::new(),
            headers: Vec::new(),
            content_length: 0,
            body: Vec::new(),
            remote: Ipv4Address::UNSPECIFIED,
        }
    }

    pub fn reset(&mut self, remote: Ipv4Address) {
        self.head.clear();
        self.head_done = false;
        self.method = Method::Get;
        self.uri.clear();
        self.headers.clear();
        self.content_length = 0;
        self.body.clear();
        self.remote = remote;
    }

    /// Feed received bytes.
    pub fn feed(&mut self, data: &[u8]) -> Parse {
        if self.head_done {
            self.take_body(data);
            return self.body_progress();
        }

        let taken = data.len().min(MAX_HEAD - self.head.len());
        self.head.extend_from_slice(&data[..taken]).ok();

        let end = match find_header_end(&self.head) {
            Some(end) => end,
            None if self.head.len() >= MAX_HEAD => return Parse::Reject(400),
            None => return Parse::NeedMore,
        };
        self.head_done = true;
        match parse_head(
            &self.head[..end],
            &mut self.method,
            &mut self.uri,
            &mut self.headers,
        ) {
            Ok(content_length) => self.content_length = content_length,
            Err(code) => return Parse::Reject(code),
        }

        let body_start = end + 4;
        if body_start < self.head.len() {
            let n = (self.head.len() - body_start).min(self.body_wanted());
            self.body
                .extend_from_slice(&self.head[body_start..body_start + n])
                .ok();
        }
        self.take_body(&data[taken..]);
        self.body_progress()
    }

    fn body_wanted(&self) -> usize {
        self.content_length.min(MAX_BODY) - self.body.len()
    }

    fn take_body(&mut self, data: &[u8]) {
        let n = data.len().min(self.body_wanted());
        self.body.extend_from_slice(&data[..n]).ok();
    }

    fn body_progress(&self) -> Parse {
        if self.body_wanted() == 0 {
            Parse::Complete
        } else {
            Parse::NeedMore
        }
    }

    /// The header block has been parsed; only body bytes are outstanding.
    pub fn head_complete(&self) -> bool {
        self.head_done
    }

    pub fn method(&self) -> Method {
        self.method
    }

    /// Full request target, query included.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn path(&self) -> &str {
        match self.uri.find('?') {
            Some(q) => &self.uri[..q],
            None => &self.uri,
        }
    }

    pub fn query(&self) -> Option<&str> {
        self.uri.find('?').map(|q| &self.uri[q + 1..])
    }

    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query()?.split('&').find_map(|pair| match pair.split_once('=') {
            Some((k, v)) if k == name => Some(v),
            None if pair == name => Some(""),
            _ => None,
        })
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    pub fn headers(&self) -> &[Header] {
        &self.headers
    }

    pub fn content_length(&self) -> usize {
        self.content_length
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn body_str(&self) -> &str {
        core::str::from_utf8(&self.body).unwrap_or("")
    }

    pub fn remote(&self) -> Ipv4Address {
        self.remote
    }
}

impl Default for Request {
    fn default() -> Self {
        Self::new()
    }
}

// ── Helpers ─────────────────────────────────────────────────────

fn parse_head(
    head: &[u8],
    method: &mut Method,
    uri: &mut String<MAX_URI>,
    headers: &mut Vec<Header, MAX_HEADERS>,
) -> Result<usize, u16> {
    let text = core::str::from_utf8(head).map_err(|_| 400u16)?;
    let mut lines = text.split("\r\n");

    let request_line = lines.next().unwrap_or("");
    let mut parts = request_line.split(' ');
    let verb = parts.next().unwrap_or("");
    let target = parts.next().unwrap_or("");
    if verb.is_empty() || target.is_empty() {
        return Err(400);
    }
    *method = match verb {
        "GET" => Method::Get,
        "POST" => Method::Post,
        _ => return Err(405),
    };
    if !target.starts_with('/') {
        return Err(400);
    }
    uri.push_str(target).map_err(|_| 400u16)?;

    let mut content_length = 0;
    for line in lines {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let name = name.trim();
        let value = value.trim();
        if name.eq_ignore_ascii_case("content-length") {
            content_length = parse_usize(value).ok_or(400u16)?;
        }
        if is_skipped(name) {
            continue;
        }
        let mut h = Header {
            name: String::new(),
            value: String::new(),
        };
        if h.name.push_str(name).is_err() || h.value.push_str(value).is_err() {
            log::debug!("http: header {} too long, dropped", name);
            continue;
        }
        if headers.push(h).is_err() {
            log::debug!("http: header table full, {} dropped", name);
        }
    }
    Ok(content_length)
}

fn is_skipped(name: &str) -> bool {
    let accept = b"accept";
    (name.len() >= accept.len() && name.as_bytes()[..accept.len()].eq_ignore_ascii_case(accept))
        || SKIPPED_HEADERS.iter().any(|s| name.eq_ignore_ascii_case(s))
}

pub(crate) fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

fn parse_usize(s: &str) -> Option<usize> {
    if s.is_empty() {
        return None;
    }
    let mut r: usize = 0;
    for b in s.bytes() {
        if !b.is_ascii_digit() {
            return None;
        }
        r = r.checked_mul(10)?.checked_add((b - b'0') as usize)?;
    }
    Some(r)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &[u8]) -> (Request, Parse) {
        let mut req = Request::new();
        req.reset(Ipv4Address([10, 0, 0, 9]));
        let p = req.feed(raw);
        (req, p)
    }

    #[test]
    fn get_with_query_and_headers() {
        let (req, p) = parse(
            b"GET /api/io?pin=3&fast HTTP/1.1\r\nHost: ioc\r\nAccept-Encoding: gzip\r\n\
              User-Agent: curl\r\nX-Token: abc\r\n\r\n",
        );
        assert_eq!(p, Parse::Complete);
        assert_eq!(req.method(), Method::Get);
        assert_eq!(req.uri(), "/api/io?pin=3&fast");
        assert_eq!(req.path(), "/api/io");
        assert_eq!(req.query_param("pin"), Some("3"));
        assert_eq!(req.query_param("fast"), Some(""));
        assert_eq!(req.query_param("slow"), None);
        assert_eq!(req.header("host"), Some("ioc"));
        assert_eq!(req.header("x-token"), Some("abc"));
        assert_eq!(req.header("User-Agent"), None);
        assert_eq!(req.header("Accept-Encoding"), None);
        assert_eq!(req.headers().len(), 2);
    }

    #[test]
    fn post_body_split_across_reads() {
        let mut req = Request::new();
        req.reset(Ipv4Address::UNSPECIFIED);
        assert_eq!(
            req.feed(b"POST /api/cfg HTTP/1.1\r\nContent-Length: 10\r\n\r\n{\"a\":"),
            Parse::NeedMore
        );
        assert!(req.head_complete());
        assert_eq!(req.feed(b"\"xy\"}"), Parse::Complete);
        assert_eq!(req.body_str(), "{\"a\":\"xy\"}");
        assert_eq!(req.content_length(), 10);
    }

    #[test]
    fn body_is_capped() {
        let mut req = Request::new();
        req.reset(Ipv4Address::UNSPECIFIED);
        req.feed(b"POST /up HTTP/1.1\r\nContent-Length: 5000\r\n\r\n");
        let chunk = [b'x'; 600];
        assert_eq!(req.feed(&chunk), Parse::NeedMore);
        assert_eq!(req.feed(&chunk), Parse::Complete);
        assert_eq!(req.body().len(), MAX_BODY);
    }

    #[test]
    fn rejects_bad_requests() {
        assert_eq!(parse(b"DELETE /x HTTP/1.1\r\n\r\n").1, Parse::Reject(405));
        assert_eq!(parse(b"PUT x HTTP/1.1\r\n\r\n").1, Parse::Reject(405));
        assert_eq!(parse(b"GET x HTTP/1.1\r\n\r\n").1, Parse::Reject(400));
        assert_eq!(parse(b"GARBAGE\r\n\r\n").1, Parse::Reject(400));
        assert_eq!(
            parse(b"POST /x HTTP/1.1\r\nContent-Length: ten\r\n\r\n").1,
            Parse::Reject(400)
        );
        let mut req = Request::new();
        req.reset(Ipv4Address::UNSPECIFIED);
        assert_eq!(req.feed(&[b'a'; MAX_HEAD]), Parse::Reject(400));
    }

    #[test]
    fn incomplete_head_waits() {
        let (req, p) = parse(b"GET /index.html HTTP/1.1\r\nHost: x\r\n");
        assert_eq!(p, Parse::NeedMore);
        assert!(!req.head_complete());
    }
}

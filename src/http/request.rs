use crate::http::form;
use crate::http::method::Method;
use crate::prelude::{HTTP_BAD_REQUEST, HTTP_METHOD_NOT_ALLOWED, HTTP_PAYLOAD_TOO_LARGE, HTTP_URI_TOO_LONG};
use std::collections::HashMap;

const MAX_HEADER_SECTION: usize = 8 * 1024;
const MAX_BODY: usize = 8 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParsingState {
    RequestLine,
    Headers,
    Body,
    Done,
    Invalid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    BadRequest,
    InvalidMethod,
    HeaderTooLong,
    PayloadTooLarge,
}

impl ParseError {
    pub fn status_code(self) -> u16 {
        match self {
            ParseError::PayloadTooLarge => HTTP_PAYLOAD_TOO_LARGE,
            ParseError::InvalidMethod => HTTP_METHOD_NOT_ALLOWED,
            ParseError::HeaderTooLong => HTTP_URI_TOO_LONG,
            ParseError::BadRequest => HTTP_BAD_REQUEST,
        }
    }
}

#[derive(Debug, PartialEq)]
pub enum ParseOutcome {
    Incomplete,
    Complete,
    Error(ParseError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: Option<u64>,
}

#[derive(Debug, Default)]
pub struct HttpRequest {
    pub method: Option<Method>,
    pub path: String,
    pub query: String,
    pub version: String,
    pub headers: HashMap<String, String>,
    pub form: HashMap<String, String>,
    pub body: Vec<u8>,
    pub content_length: usize,
    pub keep_alive: bool,
    pub range: Option<ByteRange>,
    pub state: ParsingState,
    pub buffer: Vec<u8>,
}

impl Default for ParsingState {
    fn default() -> Self {
        ParsingState::RequestLine
    }
}

impl HttpRequest {
    pub fn new() -> Self {
        Self { keep_alive: true, ..Default::default() }
    }

    /// Resets the request to its just-constructed state, for keep-alive reuse.
    pub fn clear(&mut self) {
        *self = Self::new();
    }

    pub fn host(&self) -> Option<&str> {
        self.headers.get("host").map(|s| s.as_str())
    }

    /// Feeds newly-read bytes into the parser. Every byte of `input` is
    /// absorbed into the parser's own accumulator regardless of outcome, so
    /// the caller always retires the full amount it just read; bytes beyond
    /// one complete request (pipelining) simply remain buffered here for the
    /// next request's `RequestLine` state.
    pub fn feed(&mut self, input: &[u8]) -> (ParseOutcome, usize) {
        self.buffer.extend_from_slice(input);
        let consumed = input.len();

        loop {
            match self.state {
                ParsingState::RequestLine => match self.try_parse_request_line() {
                    Some(Ok(())) => {
                        self.state = ParsingState::Headers;
                    }
                    Some(Err(e)) => {
                        self.state = ParsingState::Invalid;
                        return (ParseOutcome::Error(e), consumed);
                    }
                    None => {
                        if self.buffer.len() > MAX_HEADER_SECTION {
                            self.state = ParsingState::Invalid;
                            return (ParseOutcome::Error(ParseError::HeaderTooLong), consumed);
                        }
                        return (ParseOutcome::Incomplete, consumed);
                    }
                },
                ParsingState::Headers => match self.try_parse_headers() {
                    Some(Ok(())) => {
                        if let Err(e) = self.after_headers() {
                            self.state = ParsingState::Invalid;
                            return (ParseOutcome::Error(e), consumed);
                        }
                    }
                    Some(Err(e)) => {
                        self.state = ParsingState::Invalid;
                        return (ParseOutcome::Error(e), consumed);
                    }
                    None => {
                        if self.buffer.len() > MAX_HEADER_SECTION {
                            self.state = ParsingState::Invalid;
                            return (ParseOutcome::Error(ParseError::HeaderTooLong), consumed);
                        }
                        return (ParseOutcome::Incomplete, consumed);
                    }
                },
                ParsingState::Body => {
                    if self.content_length > MAX_BODY {
                        self.state = ParsingState::Invalid;
                        return (ParseOutcome::Error(ParseError::PayloadTooLarge), consumed);
                    }
                    if self.buffer.len() < self.content_length {
                        return (ParseOutcome::Incomplete, consumed);
                    }
                    let body: Vec<u8> = self.buffer.drain(..self.content_length).collect();
                    self.body = body;
                    self.finish_body();
                    self.state = ParsingState::Done;
                    return (ParseOutcome::Complete, consumed);
                }
                ParsingState::Done | ParsingState::Invalid => {
                    return (ParseOutcome::Complete, consumed);
                }
            }
        }
    }

    fn try_parse_request_line(&mut self) -> Option<Result<(), ParseError>> {
        let idx = find_crlf(&self.buffer)?;
        let line_bytes: Vec<u8> = self.buffer.drain(..idx + 2).collect();
        let line = String::from_utf8_lossy(&line_bytes[..idx]);

        let parts: Vec<&str> = line.split(' ').filter(|s| !s.is_empty()).collect();
        if parts.len() != 3 {
            return Some(Err(ParseError::BadRequest));
        }

        let method = match parts[0].parse::<Method>() {
            Ok(m) => m,
            Err(_) => return Some(Err(ParseError::InvalidMethod)),
        };

        if parts[2] != "HTTP/1.1" {
            return Some(Err(ParseError::BadRequest));
        }

        let target = parts[1];
        let target = strip_scheme_and_authority(target);
        if !target.starts_with('/') {
            return Some(Err(ParseError::BadRequest));
        }

        let (path, query) = match target.split_once('?') {
            Some((p, q)) => (p.to_string(), q.to_string()),
            None => (target.to_string(), String::new()),
        };

        self.method = Some(method);
        self.path = if path.is_empty() { "/".to_string() } else { path };
        self.query = query;
        self.version = parts[2].to_string();

        Some(Ok(()))
    }

    fn try_parse_headers(&mut self) -> Option<Result<(), ParseError>> {
        loop {
            let idx = find_crlf(&self.buffer)?;
            if idx == 0 {
                // blank line: end of header section
                self.buffer.drain(..2);
                return Some(Ok(()));
            }

            let line_bytes: Vec<u8> = self.buffer.drain(..idx + 2).collect();
            let line = String::from_utf8_lossy(&line_bytes[..idx]);

            let (key, value) = match line.split_once(':') {
                Some((k, v)) => (k.trim().to_lowercase(), v.trim().to_string()),
                None => return Some(Err(ParseError::BadRequest)),
            };
            self.headers.insert(key, value);
        }
    }

    fn after_headers(&mut self) -> Result<(), ParseError> {
        if let Some(cl) = self.headers.get("content-length") {
            match cl.parse::<usize>() {
                Ok(n) => self.content_length = n,
                Err(_) => return Err(ParseError::BadRequest),
            }
        }

        if let Some(conn) = self.headers.get("connection") {
            self.keep_alive = !conn.eq_ignore_ascii_case("close");
        }

        if let Some(range) = self.headers.get("range") {
            self.range = parse_range_header(range);
        }

        if self.method == Some(Method::Get) && !self.query.is_empty() {
            self.form = form::decode(&self.query);
        }

        if self.content_length == 0 {
            self.state = ParsingState::Done;
        } else {
            self.state = ParsingState::Body;
        }
        Ok(())
    }

    fn finish_body(&mut self) {
        let is_form = self
            .headers
            .get("content-type")
            .map(|ct| ct.starts_with("application/x-www-form-urlencoded"))
            .unwrap_or(false);
        if is_form {
            let body_str = String::from_utf8_lossy(&self.body).into_owned();
            self.form = form::decode(&body_str);
        }
    }
}

fn strip_scheme_and_authority(target: &str) -> &str {
    for scheme in ["http://", "https://"] {
        if let Some(rest) = target.strip_prefix(scheme) {
            if let Some(idx) = rest.find('/') {
                return &rest[idx..];
            }
            return "/";
        }
    }
    target
}

fn parse_range_header(value: &str) -> Option<ByteRange> {
    let spec = value.strip_prefix("bytes=")?;
    let (start_s, end_s) = spec.split_once('-')?;
    let start: u64 = start_s.parse().ok()?;
    let end = if end_s.is_empty() { None } else { end_s.parse().ok() };
    Some(ByteRange { start, end })
}

pub fn find_crlf(buf: &[u8]) -> Option<usize> {
    find_subsequence(buf, b"\r\n")
}

pub fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_whole(req: &mut HttpRequest, data: &[u8]) -> ParseOutcome {
        let (outcome, _) = req.feed(data);
        outcome
    }

    #[test]
    fn parses_simple_get() {
        let mut req = HttpRequest::new();
        let raw = b"GET /index.html HTTP/1.1\r\nHost: example.com\r\nConnection: keep-alive\r\n\r\n";
        let outcome = feed_whole(&mut req, raw);
        assert_eq!(outcome, ParseOutcome::Complete);
        assert_eq!(req.method, Some(Method::Get));
        assert_eq!(req.path, "/index.html");
        assert_eq!(req.host(), Some("example.com"));
        assert!(req.keep_alive);
    }

    #[test]
    fn fragmented_request_matches_whole_request() {
        let raw = b"GET /a/b.html?x=1&y=2 HTTP/1.1\r\nHost: h\r\nConnection: close\r\n\r\n";

        let mut whole = HttpRequest::new();
        feed_whole(&mut whole, raw);

        let mut fragmented = HttpRequest::new();
        let mut total_consumed = 0;
        for chunk in raw.chunks(3) {
            let (outcome, consumed) = fragmented.feed(chunk);
            total_consumed += consumed;
            if outcome == ParseOutcome::Complete {
                break;
            }
        }

        assert_eq!(fragmented.path, whole.path);
        assert_eq!(fragmented.query, whole.query);
        assert_eq!(fragmented.form, whole.form);
        assert_eq!(total_consumed, raw.len());
    }

    #[test]
    fn post_body_is_parsed_as_form() {
        let raw = b"POST /login HTTP/1.1\r\nHost: h\r\nContent-Type: application/x-www-form-urlencoded\r\nContent-Length: 21\r\n\r\nuser=jane&password=x";
        let mut req = HttpRequest::new();
        let outcome = feed_whole(&mut req, raw);
        assert_eq!(outcome, ParseOutcome::Complete);
        assert_eq!(req.form.get("user"), Some(&"jane".to_string()));
        assert_eq!(req.form.get("password"), Some(&"x".to_string()));
    }

    #[test]
    fn fragmented_post_body() {
        let raw = b"POST /login HTTP/1.1\r\nHost: h\r\nContent-Length: 11\r\n\r\nuser=abcde1";
        let mut req = HttpRequest::new();
        let mut outcome = ParseOutcome::Incomplete;
        for chunk in raw.chunks(7) {
            let (o, _) = req.feed(chunk);
            outcome = o;
        }
        assert_eq!(outcome, ParseOutcome::Complete);
        assert_eq!(req.body, b"user=abcde1");
    }

    #[test]
    fn invalid_method_is_rejected() {
        let mut req = HttpRequest::new();
        let raw = b"DELETE /x HTTP/1.1\r\nHost: h\r\n\r\n";
        let outcome = feed_whole(&mut req, raw);
        assert_eq!(outcome, ParseOutcome::Error(ParseError::InvalidMethod));
    }

    #[test]
    fn partial_request_line_is_incomplete() {
        let mut req = HttpRequest::new();
        let outcome = feed_whole(&mut req, b"GET /index");
        assert_eq!(outcome, ParseOutcome::Incomplete);
    }

    #[test]
    fn range_header_is_parsed() {
        let mut req = HttpRequest::new();
        let raw = b"GET /f.bin HTTP/1.1\r\nHost: h\r\nRange: bytes=10-20\r\n\r\n";
        feed_whole(&mut req, raw);
        assert_eq!(req.range, Some(ByteRange { start: 10, end: Some(20) }));
    }

    #[test]
    fn open_ended_range_header() {
        let mut req = HttpRequest::new();
        let raw = b"GET /f.bin HTTP/1.1\r\nHost: h\r\nRange: bytes=10-\r\n\r\n";
        feed_whole(&mut req, raw);
        assert_eq!(req.range, Some(ByteRange { start: 10, end: None }));
    }

    #[test]
    fn malformed_content_length_is_bad_request() {
        let mut req = HttpRequest::new();
        let raw = b"POST /login HTTP/1.1\r\nHost: h\r\nContent-Length: not-a-number\r\n\r\n";
        let outcome = feed_whole(&mut req, raw);
        assert_eq!(outcome, ParseOutcome::Error(ParseError::BadRequest));
    }

    #[test]
    fn method_is_case_insensitive() {
        let mut req = HttpRequest::new();
        let raw = b"get /index.html HTTP/1.1\r\nHost: h\r\n\r\n";
        let outcome = feed_whole(&mut req, raw);
        assert_eq!(outcome, ParseOutcome::Complete);
        assert_eq!(req.method, Some(Method::Get));
    }

    #[test]
    fn http_1_0_is_rejected() {
        let mut req = HttpRequest::new();
        let raw = b"GET /index.html HTTP/1.0\r\nHost: h\r\n\r\n";
        let outcome = feed_whole(&mut req, raw);
        assert_eq!(outcome, ParseOutcome::Error(ParseError::BadRequest));
    }

    #[test]
    fn clear_resets_to_fresh_state() {
        let mut req = HttpRequest::new();
        feed_whole(&mut req, b"GET / HTTP/1.1\r\nHost: h\r\n\r\n");
        req.clear();
        assert_eq!(req.state, ParsingState::RequestLine);
        assert!(req.path.is_empty());
        assert!(req.headers.is_empty());
    }
}

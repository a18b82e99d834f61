use crate::http::request::ByteRange;
use crate::prelude::*;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

pub struct FileSpec {
    pub path: PathBuf,
    pub range: Option<ByteRange>,
}

#[derive(Default)]
pub struct HttpResponse {
    pub status_code: u16,
    headers: HashMap<String, String>,
    header_order: Vec<String>,
    body: Vec<u8>,
    file: Option<FileSpec>,
    pub close_on_done: bool,
    pub handled: bool,
    /// Populated by `finalize`: the serialized status line + headers. If a
    /// file is set, this is headers-only; otherwise it also contains the body.
    pub serialized: Vec<u8>,
    /// Set by `finalize` when a file is to be streamed: (resolved path, start offset, length).
    pub file_payload: Option<(PathBuf, u64, u64)>,
}

impl HttpResponse {
    pub fn new() -> Self {
        Self { status_code: HTTP_OK, close_on_done: true, ..Default::default() }
    }

    pub fn clear(&mut self) {
        *self = Self::new();
    }

    pub fn set_status(&mut self, code: u16) -> &mut Self {
        self.status_code = code;
        self.handled = true;
        self
    }

    pub fn set_header(&mut self, key: &str, value: impl Into<String>) -> &mut Self {
        let key_owned = key.to_string();
        if !self.headers.contains_key(&key_owned) {
            self.header_order.push(key_owned.clone());
        }
        self.headers.insert(key_owned, value.into());
        self
    }

    pub fn set_body(&mut self, body: impl Into<Vec<u8>>) -> &mut Self {
        self.body = body.into();
        self.handled = true;
        self
    }

    pub fn set_file(&mut self, path: PathBuf) -> &mut Self {
        self.file = Some(FileSpec { path, range: None });
        self.handled = true;
        self
    }

    pub fn set_file_with_range(&mut self, path: PathBuf, range: ByteRange) -> &mut Self {
        self.file = Some(FileSpec { path, range: Some(range) });
        self.handled = true;
        self
    }

    pub fn set_keep_alive(&mut self, keep_alive: bool) -> &mut Self {
        self.close_on_done = !keep_alive;
        self
    }

    pub fn set_error_page(&mut self, code: u16) -> &mut Self {
        self.status_code = code;
        self.handled = true;
        self.file = None;
        let (title, detail) = error_copy(code);
        self.body = format!(
            "<!DOCTYPE html><html><head><title>{code} {title}</title></head>\
             <body><h1>{code} {title}</h1><p>{detail}</p></body></html>"
        )
        .into_bytes();
        self
    }

    fn status_text(code: u16) -> &'static str {
        match code {
            200 => "OK",
            201 => "Created",
            206 => "Partial Content",
            302 => "Found",
            304 => "Not Modified",
            400 => "Bad Request",
            401 => "Unauthorized",
            403 => "Forbidden",
            404 => "Not Found",
            405 => "Method Not Allowed",
            409 => "Conflict",
            413 => "Payload Too Large",
            414 => "URI Too Long",
            416 => "Range Not Satisfiable",
            500 => "Internal Server Error",
            501 => "Not Implemented",
            _ => "Unknown",
        }
    }

    /// Resolves defaults, downgrades a missing/bad file to a 404, resolves
    /// `Range` against the real file length, and serializes the status line
    /// and headers. If no file is set, the body is appended as well.
    pub fn finalize(&mut self) {
        self.file_payload = None;

        if let Some(spec) = self.file.take() {
            match fs::metadata(&spec.path) {
                Ok(meta) if meta.is_file() => {
                    let total = meta.len();
                    self.finalize_file(spec, total, meta.modified().ok());
                }
                _ => {
                    self.set_error_page(HTTP_NOT_FOUND);
                }
            }
        }

        if !self.headers.contains_key("Server") {
            self.set_header("Server", "reactor_httpd");
        }
        if !self.headers.contains_key("Connection") {
            let value = if self.close_on_done { "close" } else { "keep-alive" };
            self.set_header("Connection", value);
        }
        if !self.headers.contains_key("Content-Type") {
            let ct = if self.file_payload.is_some() {
                "application/octet-stream".to_string()
            } else {
                guess_body_content_type(&self.body)
            };
            self.set_header("Content-Type", ct);
        }
        if !self.headers.contains_key("Content-Length") {
            let len = match &self.file_payload {
                Some((_, _, length)) => *length,
                None => self.body.len() as u64,
            };
            self.set_header("Content-Length", len.to_string());
        }

        self.serialized = self.serialize_headers();
        if self.file_payload.is_none() {
            self.serialized.extend_from_slice(&self.body);
        }
    }

    fn finalize_file(&mut self, spec: FileSpec, total: u64, modified: Option<SystemTime>) {
        self.set_header("Accept-Ranges", "bytes");
        if let Some(mtime) = modified {
            if let Ok(since_epoch) = mtime.duration_since(UNIX_EPOCH) {
                self.set_header("ETag", format!("\"{}-{}\"", since_epoch.as_secs(), total));
                self.set_header("Last-Modified", format_http_date(since_epoch.as_secs()));
            }
        }
        self.set_header("Cache-Control", "public, max-age=3600");
        if let Some(ext) = spec.path.extension().and_then(|e| e.to_str()) {
            self.set_header("Content-Type", mime_for_extension(ext));
        }

        match spec.range {
            Some(range) => {
                let end = range.end.unwrap_or(total.saturating_sub(1));
                if range.start >= total || end < range.start || end >= total {
                    self.set_header("Content-Range", format!("bytes */{total}"));
                    self.status_code = HTTP_RANGE_NOT_SATISFIABLE;
                    self.body.clear();
                    self.file_payload = None;
                    return;
                }
                let length = end - range.start + 1;
                self.status_code = HTTP_PARTIAL_CONTENT;
                self.set_header("Content-Range", format!("bytes {}-{}/{}", range.start, end, total));
                self.file_payload = Some((spec.path, range.start, length));
            }
            None => {
                if self.status_code == 0 {
                    self.status_code = HTTP_OK;
                }
                self.file_payload = Some((spec.path, 0, total));
            }
        }
    }

    fn serialize_headers(&self) -> Vec<u8> {
        let code = if self.status_code == 0 { HTTP_OK } else { self.status_code };
        let mut out = format!("HTTP/1.1 {} {}\r\n", code, Self::status_text(code)).into_bytes();
        for key in &self.header_order {
            if let Some(value) = self.headers.get(key) {
                out.extend_from_slice(format!("{key}: {value}\r\n").as_bytes());
            }
        }
        out.extend_from_slice(b"\r\n");
        out
    }
}

fn guess_body_content_type(body: &[u8]) -> String {
    let prefix = &body[..body.len().min(15)];
    let text = String::from_utf8_lossy(prefix).to_lowercase();
    if text.starts_with("<!doctype html") || text.starts_with("<html") {
        "text/html".to_string()
    } else if body.first() == Some(&b'{') || body.first() == Some(&b'[') {
        "application/json".to_string()
    } else {
        "text/plain".to_string()
    }
}

pub fn mime_for_extension(ext: &str) -> &'static str {
    match ext.to_lowercase().as_str() {
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "js" => "application/javascript",
        "json" => "application/json",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "txt" => "text/plain",
        _ => "application/octet-stream",
    }
}

fn error_copy(code: u16) -> (&'static str, &'static str) {
    match code {
        400 => ("Bad Request", "The server could not understand the request."),
        401 => ("Unauthorized", "Valid credentials are required."),
        403 => ("Forbidden", "You do not have permission to access this resource."),
        404 => ("Not Found", "The requested resource was not found."),
        405 => ("Method Not Allowed", "This method is not allowed for the requested resource."),
        409 => ("Conflict", "The resource already exists."),
        413 => ("Payload Too Large", "The request body is too large."),
        414 => ("URI Too Long", "The request headers were too long."),
        416 => ("Range Not Satisfiable", "The requested range cannot be satisfied."),
        500 => ("Internal Server Error", "An unexpected error occurred."),
        _ => ("Error", "An error occurred."),
    }
}

/// Minimal RFC 7231 IMF-fixdate rendering, good enough for `Last-Modified`
/// without pulling in a date/time crate for one header.
fn format_http_date(epoch_secs: u64) -> String {
    const DAYS: [&str; 7] = ["Thu", "Fri", "Sat", "Sun", "Mon", "Tue", "Wed"]; // epoch was a Thursday
    const MONTHS: [&str; 12] =
        ["Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec"];

    let days_since_epoch = epoch_secs / 86_400;
    let secs_of_day = epoch_secs % 86_400;
    let (hour, minute, second) = (secs_of_day / 3600, (secs_of_day % 3600) / 60, secs_of_day % 60);

    let mut days_left = days_since_epoch as i64;
    let mut year = 1970i64;
    loop {
        let leap = is_leap(year);
        let days_in_year = if leap { 366 } else { 365 };
        if days_left < days_in_year {
            break;
        }
        days_left -= days_in_year;
        year += 1;
    }

    let month_lengths = month_lengths(is_leap(year));
    let mut month = 0usize;
    while days_left >= month_lengths[month] {
        days_left -= month_lengths[month];
        month += 1;
    }
    let day = days_left + 1;
    let weekday = DAYS[(days_since_epoch % 7) as usize];

    format!(
        "{}, {:02} {} {} {:02}:{:02}:{:02} GMT",
        weekday, day, MONTHS[month], year, hour, minute, second
    )
}

fn is_leap(year: i64) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

fn month_lengths(leap: bool) -> [i64; 12] {
    [31, if leap { 29 } else { 28 }, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finalize_sets_content_length_for_inline_body() {
        let mut resp = HttpResponse::new();
        resp.set_body(b"hello".to_vec());
        resp.finalize();
        let text = String::from_utf8_lossy(&resp.serialized);
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("Content-Length: 5\r\n"));
        assert!(text.ends_with("\r\n\r\nhello"));
    }

    #[test]
    fn error_page_sets_status_and_body() {
        let mut resp = HttpResponse::new();
        resp.set_error_page(HTTP_NOT_FOUND);
        resp.finalize();
        assert_eq!(resp.status_code, HTTP_NOT_FOUND);
        let text = String::from_utf8_lossy(&resp.serialized);
        assert!(text.starts_with("HTTP/1.1 404 Not Found\r\n"));
    }

    #[test]
    fn missing_file_downgrades_to_404() {
        let mut resp = HttpResponse::new();
        resp.set_file(PathBuf::from("/definitely/not/a/real/file.html"));
        resp.finalize();
        assert_eq!(resp.status_code, HTTP_NOT_FOUND);
    }

    #[test]
    fn serialized_header_section_has_single_content_length() {
        let mut resp = HttpResponse::new();
        resp.set_body(b"x".repeat(20));
        resp.finalize();
        let text = String::from_utf8_lossy(&resp.serialized);
        assert_eq!(text.matches("Content-Length:").count(), 1);
    }
}

use std::fs::File;
use std::io::{self, ErrorKind};
use std::os::unix::io::{AsRawFd, RawFd};
use std::ptr;

/// Outcome of one `write_to` call: exactly one syscall-bearing attempt per
/// readiness event, so the reactor loop never spins past what the kernel
/// actually accepted.
#[derive(Debug, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Every byte has been sent.
    Success,
    /// A short write occurred; re-arm `WRITE` and try again on the next event.
    Continue,
    /// `EPIPE`/`ECONNRESET`: the peer is gone. Never logged above debug.
    Error,
}

enum Segment1 {
    None,
    Mmap { addr: *mut libc::c_void, map_len: usize, map_offset: usize, len: usize },
    Sendfile { file: File, offset: i64, remaining: u64 },
}

/// Two-segment gathered output: response headers (+ inline body when there is
/// no file) in segment 0, and either a memory-mapped file region or a
/// `sendfile` descriptor in segment 1.
pub struct OutputBuffer {
    header: Vec<u8>,
    header_sent: usize,
    segment1: Segment1,
    bytes_sent_seg1: u64,
    pub close_on_done: bool,
}

impl Default for OutputBuffer {
    fn default() -> Self {
        Self { header: Vec::new(), header_sent: 0, segment1: Segment1::None, bytes_sent_seg1: 0, close_on_done: true }
    }
}

impl OutputBuffer {
    pub fn set_headers_only(&mut self, header: Vec<u8>, close_on_done: bool) {
        self.reset();
        self.header = header;
        self.close_on_done = close_on_done;
    }

    /// `file_offset`/`file_length` select the byte range already resolved by
    /// the response builder (the whole file, or a satisfied `Range`).
    pub fn set_mmap(&mut self, header: Vec<u8>, file: &File, file_offset: u64, file_length: u64, close_on_done: bool) -> io::Result<()> {
        self.reset();
        self.header = header;
        self.close_on_done = close_on_done;
        if file_length == 0 {
            return Ok(());
        }

        let page_size = page_size();
        let aligned_offset = (file_offset / page_size as u64) * page_size as u64;
        let skew = (file_offset - aligned_offset) as usize;
        let map_len = skew + file_length as usize;

        let addr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                map_len,
                libc::PROT_READ,
                libc::MAP_PRIVATE,
                file.as_raw_fd(),
                aligned_offset as libc::off_t,
            )
        };
        if addr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }

        self.segment1 = Segment1::Mmap { addr, map_len, map_offset: skew, len: file_length as usize };
        Ok(())
    }

    pub fn set_sendfile(&mut self, header: Vec<u8>, file: File, file_offset: u64, file_length: u64, close_on_done: bool) {
        self.reset();
        self.header = header;
        self.close_on_done = close_on_done;
        if file_length > 0 {
            self.segment1 = Segment1::Sendfile { file, offset: file_offset as i64, remaining: file_length };
        }
    }

    fn reset(&mut self) {
        if let Segment1::Mmap { addr, map_len, .. } = &self.segment1 {
            unsafe {
                libc::munmap(*addr, *map_len);
            }
        }
        self.segment1 = Segment1::None;
        self.header.clear();
        self.header_sent = 0;
        self.bytes_sent_seg1 = 0;
    }

    pub fn is_drained(&self) -> bool {
        self.header_sent >= self.header.len()
            && match &self.segment1 {
                Segment1::None => true,
                Segment1::Mmap { len, .. } => self.bytes_sent_seg1 as usize >= *len,
                Segment1::Sendfile { remaining, .. } => *remaining == 0,
            }
    }

    /// Performs exactly one gathered write (or one `write`+`sendfile` pair
    /// for sendfile mode) against `fd`, and reports what the caller should
    /// do next.
    pub fn write_to(&mut self, fd: RawFd) -> WriteOutcome {
        match &self.segment1 {
            Segment1::Sendfile { .. } => self.write_sendfile(fd),
            _ => self.write_gathered(fd),
        }
    }

    fn write_gathered(&mut self, fd: RawFd) -> WriteOutcome {
        let header_remaining = &self.header[self.header_sent..];
        let (seg1_ptr, seg1_len) = match &self.segment1 {
            Segment1::Mmap { addr, map_offset, len, .. } => {
                let base = unsafe { (*addr as *const u8).add(*map_offset + self.bytes_sent_seg1 as usize) };
                (base, len - self.bytes_sent_seg1 as usize)
            }
            _ => (std::ptr::null(), 0),
        };

        let mut iov = [
            libc::iovec { iov_base: header_remaining.as_ptr() as *mut libc::c_void, iov_len: header_remaining.len() },
            libc::iovec { iov_base: seg1_ptr as *mut libc::c_void, iov_len: seg1_len },
        ];
        let iov_count = if seg1_len > 0 { 2 } else { 1 };
        if header_remaining.is_empty() && seg1_len == 0 {
            return WriteOutcome::Success;
        }

        let n = unsafe { libc::writev(fd, iov.as_mut_ptr(), iov_count) };
        if n < 0 {
            return classify_error(io::Error::last_os_error());
        }

        let mut n = n as usize;
        let header_take = n.min(header_remaining.len());
        self.header_sent += header_take;
        n -= header_take;
        self.bytes_sent_seg1 += n as u64;

        if self.is_drained() {
            WriteOutcome::Success
        } else {
            WriteOutcome::Continue
        }
    }

    fn write_sendfile(&mut self, fd: RawFd) -> WriteOutcome {
        if self.header_sent < self.header.len() {
            match nix_write(fd, &self.header[self.header_sent..]) {
                Ok(n) => self.header_sent += n,
                Err(outcome) => return outcome,
            }
            if self.header_sent < self.header.len() {
                return WriteOutcome::Continue;
            }
        }

        if let Segment1::Sendfile { file, offset, remaining } = &mut self.segment1 {
            if *remaining == 0 {
                return WriteOutcome::Success;
            }
            let mut off = *offset;
            let n = unsafe { libc::sendfile(fd, file.as_raw_fd(), &mut off, *remaining as usize) };
            if n < 0 {
                return classify_error(io::Error::last_os_error());
            }
            *offset = off;
            *remaining -= n as u64;
        }

        if self.is_drained() {
            WriteOutcome::Success
        } else {
            WriteOutcome::Continue
        }
    }
}

fn nix_write(fd: RawFd, buf: &[u8]) -> Result<usize, WriteOutcome> {
    let n = unsafe { libc::write(fd, buf.as_ptr() as *const libc::c_void, buf.len()) };
    if n < 0 {
        Err(classify_error(io::Error::last_os_error()))
    } else {
        Ok(n as usize)
    }
}

fn classify_error(e: io::Error) -> WriteOutcome {
    match e.kind() {
        ErrorKind::WouldBlock => WriteOutcome::Continue,
        ErrorKind::BrokenPipe | ErrorKind::ConnectionReset => WriteOutcome::Error,
        _ => {
            if e.raw_os_error() == Some(libc::EPIPE) || e.raw_os_error() == Some(libc::ECONNRESET) {
                WriteOutcome::Error
            } else {
                proxy_log::debug!("write error: {e}");
                WriteOutcome::Error
            }
        }
    }
}

fn page_size() -> usize {
    unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize }
}

impl Drop for OutputBuffer {
    fn drop(&mut self) {
        self.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::net::{TcpListener, TcpStream};

    fn pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();
        server.set_nonblocking(true).unwrap();
        (client, server)
    }

    #[test]
    fn headers_only_write_completes_in_one_call() {
        let (mut client, server) = pair();
        let mut out = OutputBuffer::default();
        out.set_headers_only(b"HTTP/1.1 204 No Content\r\n\r\n".to_vec(), true);
        let outcome = out.write_to(server.as_raw_fd());
        assert_eq!(outcome, WriteOutcome::Success);

        let mut buf = [0u8; 64];
        let n = client.read(&mut buf).unwrap();
        assert!(String::from_utf8_lossy(&buf[..n]).starts_with("HTTP/1.1 204"));
    }

    #[test]
    fn sendfile_path_streams_file_contents() {
        let dir = std::env::temp_dir().join("reactor_httpd_output_buffer_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("body.txt");
        std::fs::write(&path, b"payload-bytes").unwrap();
        let file = File::open(&path).unwrap();

        let (mut client, server) = pair();
        let mut out = OutputBuffer::default();
        out.set_sendfile(b"HTTP/1.1 200 OK\r\n\r\n".to_vec(), file, 0, 13, true);

        loop {
            match out.write_to(server.as_raw_fd()) {
                WriteOutcome::Success => break,
                WriteOutcome::Continue => continue,
                WriteOutcome::Error => panic!("unexpected write error"),
            }
        }

        let mut buf = Vec::new();
        client.set_nonblocking(false).unwrap();
        let mut tmp = [0u8; 128];
        let n = client.read(&mut tmp).unwrap();
        buf.extend_from_slice(&tmp[..n]);
        assert!(String::from_utf8_lossy(&buf).ends_with("payload-bytes"));
    }
}

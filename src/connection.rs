use crate::config::ServerConfig;
use crate::http::{HttpRequest, HttpResponse, ParseOutcome};
use crate::io::{InputBuffer, OutputBuffer, ReadResult, TriggerMode, WriteOutcome};
use crate::router::Router;
use crate::task_pool::TaskPool;
use crate::timer::TimerHandle;
use mio::net::TcpStream;
use mio::{Token, Waker};
use std::collections::VecDeque;
use std::fs::File;
use std::net::SocketAddr;
use std::os::unix::io::AsRawFd;
use std::sync::{Arc, Mutex};

/// What interest the caller must re-arm after an I/O phase. Mio exposes no
/// raw `EPOLLONESHOT`, so "one-shot" is a convention: only the reactor loop
/// calls `reregister`, and only with the value returned here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextInterest {
    Read,
    Write,
    Both,
    /// Response production was handed to the task pool; the fd's
    /// registration must be left untouched until the completion queue
    /// delivers a result and re-arms `WRITE`.
    Pending,
    /// Terminal: the connection should be torn down, no reregistration.
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    ReadReady,
    Processing,
    WriteReady,
    Closed,
}

/// Results flow back from a `TaskPool` worker through this queue, keyed by
/// the connection's `Token`; the worker wakes the owning SubReactor after
/// pushing so it can drain the queue on its own thread.
pub type CompletionQueue = Arc<Mutex<VecDeque<(Token, HttpResponse)>>>;

/// Borrowed for the duration of a single event: everything needed to hand
/// response production to the task pool and have the result find its way
/// back to this exact connection on this exact SubReactor thread.
pub struct AsyncDispatch<'a> {
    pub pool: &'a Arc<TaskPool>,
    pub completions: &'a CompletionQueue,
    pub waker: &'a Arc<Waker>,
    pub token: Token,
}

pub struct Connection {
    pub stream: TcpStream,
    pub peer_addr: SocketAddr,
    pub input: InputBuffer,
    request: HttpRequest,
    response: HttpResponse,
    output: OutputBuffer,
    /// Bytes left over from a pipelined request, extracted before `request`
    /// was moved into a task-pool job (the job only needs the parsed
    /// method/path/headers/body, not whatever the client sent after them).
    pending_pipeline: Vec<u8>,
    pub state: ConnectionState,
    pub timer: Option<TimerHandle>,
    pub config: Arc<ServerConfig>,
}

impl Connection {
    pub fn new(stream: TcpStream, peer_addr: SocketAddr, config: Arc<ServerConfig>) -> Self {
        Self {
            stream,
            peer_addr,
            input: InputBuffer::with_default_capacity(),
            request: HttpRequest::new(),
            response: HttpResponse::new(),
            output: OutputBuffer::default(),
            pending_pipeline: Vec::new(),
            state: ConnectionState::ReadReady,
            timer: None,
            config,
        }
    }

    /// Drains the socket per the edge-triggered discipline, feeds whatever
    /// arrived to the parser, and produces a response once a request is
    /// fully parsed (or rejected). A single burst larger than the input
    /// buffer's capacity can fill it before the socket reaches `WouldBlock`;
    /// since edge-triggered readiness won't fire again for bytes already
    /// sitting in the kernel, that case loops back for another read instead
    /// of returning and stalling the connection.
    pub fn on_readable(&mut self, router: &Arc<Router>, async_dispatch: Option<&AsyncDispatch>) -> NextInterest {
        loop {
            match self.input.read_from(&mut self.stream, TriggerMode::EdgeTriggered) {
                ReadResult::Closed | ReadResult::Reset | ReadResult::Overflow => return NextInterest::None,
                ReadResult::Error(e) => {
                    proxy_log::debug!("read error on {}: {e}", self.peer_addr);
                    return NextInterest::None;
                }
                ReadResult::WouldBlock | ReadResult::Progress(_) => {}
            }

            let buffer_still_full = self.input.writable_len() == 0;

            if self.input.readable_len() == 0 {
                return NextInterest::Read;
            }

            let bytes = self.input.readable().to_vec();
            self.input.retrieve(bytes.len());
            let next = self.feed_and_respond(&bytes, router, async_dispatch);

            if next != NextInterest::Read || !buffer_still_full {
                return next;
            }
        }
    }

    fn feed_and_respond(
        &mut self,
        bytes: &[u8],
        router: &Arc<Router>,
        async_dispatch: Option<&AsyncDispatch>,
    ) -> NextInterest {
        let (outcome, _consumed) = self.request.feed(bytes);
        match outcome {
            ParseOutcome::Incomplete => NextInterest::Read,
            ParseOutcome::Error(err) => {
                self.state = ConnectionState::Processing;
                self.response.set_error_page(err.status_code());
                self.response.set_keep_alive(false);
                self.finish_processing()
            }
            ParseOutcome::Complete => {
                self.state = ConnectionState::Processing;
                match async_dispatch {
                    Some(ctx) => self.dispatch_async(router.clone(), ctx),
                    None => {
                        router.dispatch(&self.request, &mut self.response, &self.config);
                        let keep_alive = self.request.keep_alive;
                        self.response.set_keep_alive(keep_alive);
                        self.finish_processing()
                    }
                }
            }
        }
    }

    /// Hands routing and response finalization to the task pool. Per the
    /// optional-task-pool contract, the background job never touches epoll
    /// state directly: it only finalizes a response and pushes it onto the
    /// completion queue, then wakes this connection's SubReactor to install
    /// it and re-arm `WRITE` on its own thread.
    fn dispatch_async(&mut self, router: Arc<Router>, ctx: &AsyncDispatch) -> NextInterest {
        self.pending_pipeline = std::mem::take(&mut self.request.buffer);
        let request = std::mem::replace(&mut self.request, HttpRequest::new());
        let config = self.config.clone();
        let completions = ctx.completions.clone();
        let waker = ctx.waker.clone();
        let token = ctx.token;

        ctx.pool.submit(move || {
            let mut response = HttpResponse::new();
            router.dispatch(&request, &mut response, &config);
            response.set_keep_alive(request.keep_alive);
            response.finalize();
            completions.lock().unwrap().push_back((token, response));
            let _ = waker.wake();
        });

        NextInterest::Pending
    }

    /// Installs a response that finished on a task-pool thread. Called only
    /// from the owning SubReactor after draining its completion queue.
    pub fn complete_async(&mut self, response: HttpResponse) -> NextInterest {
        self.response = response;
        self.install_output();
        self.state = ConnectionState::WriteReady;
        NextInterest::Write
    }

    fn finish_processing(&mut self) -> NextInterest {
        self.response.finalize();
        self.install_output();
        self.state = ConnectionState::WriteReady;
        NextInterest::Write
    }

    fn install_output(&mut self) {
        let close_on_done = self.response.close_on_done;
        match self.response.file_payload.clone() {
            Some((path, offset, length)) => match File::open(&path) {
                Ok(file) => {
                    if self.config.use_sendfile {
                        self.output.set_sendfile(self.response.serialized.clone(), file, offset, length, close_on_done);
                    } else if self.output.set_mmap(self.response.serialized.clone(), &file, offset, length, close_on_done).is_err() {
                        self.output.set_headers_only(self.response.serialized.clone(), true);
                    }
                }
                Err(_) => {
                    self.output.set_headers_only(self.response.serialized.clone(), true);
                }
            },
            None => {
                self.output.set_headers_only(self.response.serialized.clone(), close_on_done);
            }
        }
    }

    /// Performs exactly one gathered write and interprets the outcome. On a
    /// keep-alive completion, any pipelined bytes left over in the request
    /// parser's buffer are routed immediately rather than waiting for the
    /// next readable edge, since none will come until new bytes arrive.
    pub fn on_writable(&mut self, router: &Arc<Router>, async_dispatch: Option<&AsyncDispatch>) -> NextInterest {
        match self.output.write_to(self.stream.as_raw_fd()) {
            WriteOutcome::Continue => NextInterest::Write,
            WriteOutcome::Error => NextInterest::None,
            WriteOutcome::Success => {
                let close_on_done = self.output.close_on_done;
                if close_on_done {
                    return NextInterest::None;
                }
                self.reset_for_keep_alive(router, async_dispatch)
            }
        }
    }

    fn reset_for_keep_alive(&mut self, router: &Arc<Router>, async_dispatch: Option<&AsyncDispatch>) -> NextInterest {
        let pipelined = if !self.pending_pipeline.is_empty() {
            std::mem::take(&mut self.pending_pipeline)
        } else {
            std::mem::take(&mut self.request.buffer)
        };
        self.request.clear();
        self.response.clear();
        self.state = ConnectionState::ReadReady;

        if pipelined.is_empty() {
            NextInterest::Read
        } else {
            self.feed_and_respond(&pipelined, router, async_dispatch)
        }
    }
}

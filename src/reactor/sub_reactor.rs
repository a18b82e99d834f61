use crate::config::ServerConfig;
use crate::connection::{AsyncDispatch, CompletionQueue, Connection, NextInterest};
use crate::router::Router;
use crate::task_pool::TaskPool;
use mio::net::TcpStream;
use mio::{Events, Interest, Poll, Token, Waker};
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

const WAKE_TOKEN: Token = Token(0);
const FIRST_CONNECTION_TOKEN: usize = 1;

/// Everything a SubReactor needs to route and resolve a request: the routing
/// table and the server block's configuration, both read-only and shared
/// across every SubReactor of that server block, plus the optional shared
/// task pool for `use_thread_pool` offload.
#[derive(Clone)]
pub struct ServerContext {
    pub config: Arc<ServerConfig>,
    pub router: Arc<Router>,
    pub pool: Option<Arc<TaskPool>>,
}

/// Thread-safe, cloneable handle for handing a freshly accepted connection
/// off to a SubReactor from the MainReactor thread.
#[derive(Clone)]
pub struct SubReactorHandle {
    pending: Arc<Mutex<VecDeque<(TcpStream, SocketAddr)>>>,
    waker: Arc<Waker>,
    running: Arc<AtomicBool>,
}

impl SubReactorHandle {
    pub fn dispatch(&self, stream: TcpStream, addr: SocketAddr) {
        self.pending.lock().unwrap().push_back((stream, addr));
        let _ = self.waker.wake();
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        let _ = self.waker.wake();
    }
}

/// One event-loop thread: its own connection table, its own timer wheel, no
/// locking except on the pending-connection handoff and the task-pool
/// completion queue. Readable/writable events drive
/// `Connection::on_readable`/`on_writable`; the returned `NextInterest` is
/// the only thing allowed to reregister the fd, so the one-shot discipline
/// lives entirely in this loop.
pub struct SubReactor {
    index: usize,
    poll: Poll,
    connections: HashMap<Token, Connection>,
    wheel: crate::timer::TimerWheel,
    expired: Rc<RefCell<Vec<Token>>>,
    next_token: usize,
    pending: Arc<Mutex<VecDeque<(TcpStream, SocketAddr)>>>,
    completions: CompletionQueue,
    waker: Arc<Waker>,
    running: Arc<AtomicBool>,
    ctx: ServerContext,
}

// SAFETY: a `SubReactor` is constructed on the spawning thread and then moved
// in its entirety into the new reactor thread's closure; the spawning thread
// never touches it again afterward, so none of its `Rc`/`RefCell`/raw-pointer
// internals are ever accessed from more than one thread concurrently.
unsafe impl Send for SubReactor {}

impl SubReactor {
    pub fn spawn(index: usize, ctx: ServerContext) -> std::io::Result<(SubReactorHandle, JoinHandle<()>)> {
        let poll = Poll::new()?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKE_TOKEN)?);
        let pending = Arc::new(Mutex::new(VecDeque::new()));
        let running = Arc::new(AtomicBool::new(true));

        let reactor = SubReactor {
            index,
            poll,
            connections: HashMap::new(),
            wheel: crate::timer::TimerWheel::new(),
            expired: Rc::new(RefCell::new(Vec::new())),
            next_token: FIRST_CONNECTION_TOKEN,
            pending: pending.clone(),
            completions: Arc::new(Mutex::new(VecDeque::new())),
            waker: waker.clone(),
            running: running.clone(),
            ctx,
        };

        let handle = SubReactorHandle { pending, waker, running };

        let join = thread::Builder::new()
            .name(format!("sub-reactor-{index}"))
            .spawn(move || reactor.run())?;

        Ok((handle, join))
    }

    fn run(mut self) {
        let mut events = Events::with_capacity(1024);
        while self.running.load(Ordering::SeqCst) {
            let timeout = Duration::from_millis(self.wheel.next_timeout_ms().max(1));
            if let Err(e) = self.poll.poll(&mut events, Some(timeout)) {
                if e.kind() == std::io::ErrorKind::Interrupted {
                    continue;
                }
                proxy_log::error!("sub-reactor {} poll failed: {e}", self.index);
                break;
            }

            for event in events.iter() {
                if event.token() == WAKE_TOKEN {
                    self.drain_pending();
                    self.drain_completions();
                    continue;
                }
                self.handle_event(event.token(), event.is_readable(), event.is_writable());
            }

            self.wheel.tick();
            self.reap_expired();
        }

        for token in self.connections.keys().cloned().collect::<Vec<_>>() {
            self.close(token);
        }
    }

    fn drain_pending(&mut self) {
        let items: Vec<_> = {
            let mut guard = self.pending.lock().unwrap();
            guard.drain(..).collect()
        };
        for (stream, addr) in items {
            self.install(stream, addr);
        }
    }

    /// Installs every response a task-pool worker finished since the last
    /// wake-up, re-arming `WRITE` for each connection still alive. A
    /// connection evicted or closed while its job was in flight is simply
    /// skipped -- the job's result is discarded.
    fn drain_completions(&mut self) {
        let items: Vec<_> = {
            let mut guard = self.completions.lock().unwrap();
            guard.drain(..).collect()
        };
        for (token, response) in items {
            let next = match self.connections.get_mut(&token) {
                Some(conn) => conn.complete_async(response),
                None => continue,
            };
            self.refresh_idle_timer(token);
            self.reregister(token, next);
        }
    }

    fn install(&mut self, mut stream: TcpStream, addr: SocketAddr) {
        let token = Token(self.next_token);
        self.next_token += 1;

        if let Err(e) = self.poll.registry().register(&mut stream, token, Interest::READABLE) {
            proxy_log::debug!("failed to register connection {addr}: {e}");
            return;
        }

        let mut conn = Connection::new(stream, addr, self.ctx.config.clone());
        conn.timer = Some(self.arm_idle_timer(token));
        self.connections.insert(token, conn);
    }

    fn arm_idle_timer(&mut self, token: Token) -> crate::timer::TimerHandle {
        let expired = self.expired.clone();
        let timeout = Duration::from_millis(self.ctx.config.timeout_ms as u64);
        self.wheel.insert(timeout, move || expired.borrow_mut().push(token))
    }

    fn refresh_idle_timer(&mut self, token: Token) {
        let Some(conn) = self.connections.get_mut(&token) else { return };
        if let Some(old) = conn.timer.take() {
            self.wheel.cancel(old);
        }
        let expired = self.expired.clone();
        let timeout = Duration::from_millis(self.ctx.config.timeout_ms as u64);
        let handle = self.wheel.insert(timeout, move || expired.borrow_mut().push(token));
        if let Some(conn) = self.connections.get_mut(&token) {
            conn.timer = Some(handle);
        }
    }

    fn reap_expired(&mut self) {
        let due: Vec<Token> = self.expired.borrow_mut().drain(..).collect();
        for token in due {
            if self.connections.contains_key(&token) {
                proxy_log::debug!("sub-reactor {} evicting idle connection {:?}", self.index, token);
                self.close(token);
            }
        }
    }

    fn handle_event(&mut self, token: Token, readable: bool, writable: bool) {
        let async_dispatch = self.ctx.pool.as_ref().map(|pool| AsyncDispatch {
            pool,
            completions: &self.completions,
            waker: &self.waker,
            token,
        });

        let next = if readable {
            self.connections.get_mut(&token).map(|c| c.on_readable(&self.ctx.router, async_dispatch.as_ref()))
        } else if writable {
            self.connections.get_mut(&token).map(|c| c.on_writable(&self.ctx.router, async_dispatch.as_ref()))
        } else {
            None
        };

        match next {
            Some(NextInterest::None) | None => self.close(token),
            Some(NextInterest::Pending) => self.refresh_idle_timer(token),
            Some(next) => {
                self.refresh_idle_timer(token);
                self.reregister(token, next);
            }
        }
    }

    fn reregister(&mut self, token: Token, next: NextInterest) {
        let interest = match next {
            NextInterest::Read => Interest::READABLE,
            NextInterest::Write => Interest::WRITABLE,
            NextInterest::Both => Interest::READABLE | Interest::WRITABLE,
            NextInterest::Pending | NextInterest::None => return,
        };
        if let Some(conn) = self.connections.get_mut(&token) {
            if let Err(e) = self.poll.registry().reregister(&mut conn.stream, token, interest) {
                proxy_log::debug!("reregister failed for {:?}: {e}", token);
                self.close(token);
            }
        }
    }

    fn close(&mut self, token: Token) {
        if let Some(mut conn) = self.connections.remove(&token) {
            if let Some(handle) = conn.timer.take() {
                self.wheel.cancel(handle);
            }
            let _ = self.poll.registry().deregister(&mut conn.stream);
        }
    }
}

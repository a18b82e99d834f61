use crate::config::AppConfig;
use crate::error::{ServerError, ServerResult};
use crate::prelude::TASK_POOL_SIZE;
use crate::reactor::sub_reactor::{ServerContext, SubReactor, SubReactorHandle};
use crate::router::Router;
use crate::task_pool::TaskPool;
use mio::net::TcpListener;
use mio::{Events, Interest, Poll, Token};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

struct ListenerEntry {
    listener: TcpListener,
    server_index: usize,
}

/// Per server block: its SubReactor handles (for round-robin dispatch) and
/// the join handles the destructor waits on.
struct ServerPool {
    handles: Vec<SubReactorHandle>,
    joins: Vec<JoinHandle<()>>,
    next: AtomicUsize,
}

impl ServerPool {
    fn pick(&self) -> &SubReactorHandle {
        let i = self.next.fetch_add(1, Ordering::Relaxed) % self.handles.len();
        &self.handles[i]
    }
}

/// Binds every `(host, port)` pair across every server block, spawns each
/// server block's SubReactor pool, and runs an accept-only loop that hands
/// freshly accepted sockets off round-robin. No per-connection state is ever
/// created on this thread.
pub struct MainReactor {
    poll: Poll,
    listeners: HashMap<Token, ListenerEntry>,
    pools: Vec<ServerPool>,
}

impl MainReactor {
    pub fn new(config: &AppConfig, routers: Vec<Arc<Router>>) -> ServerResult<Self> {
        if config.servers.is_empty() {
            return Err(ServerError::NoServers);
        }

        let poll = Poll::new()?;
        let mut listeners = HashMap::new();
        let mut pools = Vec::new();
        let mut next_token = 0usize;

        for (server_index, (server_cfg, router)) in config.servers.iter().zip(routers).enumerate() {
            let pool = server_cfg.use_thread_pool.then(|| Arc::new(TaskPool::new(TASK_POOL_SIZE)));
            let ctx = ServerContext { config: Arc::new(server_cfg.clone()), router, pool };

            let mut handles = Vec::new();
            let mut joins = Vec::new();
            for sub_index in 0..server_cfg.num_sub_reactor.max(1) {
                let (handle, join) = SubReactor::spawn(sub_index as usize, ctx.clone()).map_err(|source| {
                    ServerError::ReactorSpawn { index: sub_index as usize, source }
                })?;
                handles.push(handle);
                joins.push(join);
            }
            pools.push(ServerPool { handles, joins, next: AtomicUsize::new(0) });

            for &port in &server_cfg.ports {
                let addr = format!("{}:{}", server_cfg.host, port)
                    .parse()
                    .map_err(|_| ServerError::Bind {
                        host: server_cfg.host.clone(),
                        port,
                        source: std::io::Error::new(ErrorKind::InvalidInput, "unparseable address"),
                    })?;
                let mut listener = TcpListener::bind(addr).map_err(|source| ServerError::Bind {
                    host: server_cfg.host.clone(),
                    port,
                    source,
                })?;

                let token = Token(next_token);
                next_token += 1;
                poll.registry().register(&mut listener, token, Interest::READABLE)?;
                listeners.insert(token, ListenerEntry { listener, server_index });

                proxy_log::info!("listening on {}:{} (server '{}')", server_cfg.host, port, server_cfg.server_name);
            }
        }

        Ok(Self { poll, listeners, pools })
    }

    /// Runs forever, accepting connections and handing them to SubReactors.
    pub fn run(mut self) -> ServerResult<()> {
        let mut events = Events::with_capacity(256);
        loop {
            self.poll.poll(&mut events, None)?;
            for event in events.iter() {
                let token = event.token();
                self.accept_all(token);
            }
        }
    }

    fn accept_all(&mut self, token: Token) {
        let Some(entry) = self.listeners.get(&token) else { return };
        let server_index = entry.server_index;
        loop {
            match self.listeners.get(&token).unwrap().listener.accept() {
                Ok((stream, addr)) => {
                    let pool = &self.pools[server_index];
                    pool.pick().dispatch(stream, addr);
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    proxy_log::warn!("accept error: {e}");
                    break;
                }
            }
        }
    }
}

impl Drop for MainReactor {
    fn drop(&mut self) {
        for pool in &self.pools {
            for handle in &pool.handles {
                handle.stop();
            }
        }
        for pool in &mut self.pools {
            for join in pool.joins.drain(..) {
                let _ = join.join();
            }
        }
    }
}

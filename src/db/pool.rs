use rusqlite::Connection;
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};

struct Inner {
    idle: Mutex<VecDeque<Connection>>,
    not_empty: Condvar,
    capacity: usize,
}

/// A bounded pool of synchronous SQLite connections. `get()` blocks on a
/// condition variable while the pool is exhausted; the connection returns to
/// the queue and wakes one waiter when the guard drops.
#[derive(Clone)]
pub struct Pool {
    inner: Arc<Inner>,
}

impl Pool {
    pub fn new(path: &str, capacity: usize) -> rusqlite::Result<Self> {
        let mut idle = VecDeque::with_capacity(capacity);
        for _ in 0..capacity {
            idle.push_back(Connection::open(path)?);
        }
        Ok(Self {
            inner: Arc::new(Inner { idle: Mutex::new(idle), not_empty: Condvar::new(), capacity }),
        })
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    pub fn get(&self) -> PooledConnection {
        let mut idle = self.inner.idle.lock().unwrap();
        while idle.is_empty() {
            idle = self.inner.not_empty.wait(idle).unwrap();
        }
        let conn = idle.pop_front().unwrap();
        PooledConnection { conn: Some(conn), pool: self.inner.clone() }
    }
}

pub struct PooledConnection {
    conn: Option<Connection>,
    pool: Arc<Inner>,
}

impl std::ops::Deref for PooledConnection {
    type Target = Connection;
    fn deref(&self) -> &Connection {
        self.conn.as_ref().expect("connection taken")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            let mut idle = self.pool.idle.lock().unwrap();
            idle.push_back(conn);
            self.pool.not_empty.notify_one();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn pool_hands_out_and_returns_connections() {
        let pool = Pool::new(":memory:", 2).unwrap();
        let a = pool.get();
        let b = pool.get();
        drop(a);
        drop(b);
        let _c = pool.get();
    }

    #[test]
    fn get_blocks_until_a_connection_is_released() {
        let pool = Pool::new(":memory:", 1).unwrap();
        let held = pool.get();
        let pool2 = pool.clone();

        let (tx, rx) = mpsc::channel();
        let handle = thread::spawn(move || {
            let _conn = pool2.get();
            tx.send(()).unwrap();
        });

        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
        drop(held);
        rx.recv_timeout(Duration::from_secs(1)).expect("waiter should have been woken");
        handle.join().unwrap();
    }
}

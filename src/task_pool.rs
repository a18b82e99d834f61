use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// A fixed-size worker pool for offloading handler work off the reactor
/// thread when `use_thread_pool` is configured. Workers pull jobs off a
/// shared `mpsc` queue; there is no result channel here because jobs are
/// expected to finalize a response and signal completion themselves (via
/// whatever wake-up mechanism the caller wires in).
pub struct TaskPool {
    sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl TaskPool {
    pub fn new(size: usize) -> Self {
        let (sender, receiver) = mpsc::channel::<Job>();
        let receiver = std::sync::Arc::new(std::sync::Mutex::new(receiver));

        let workers = (0..size.max(1))
            .map(|index| {
                let receiver = receiver.clone();
                thread::Builder::new()
                    .name(format!("task-pool-{index}"))
                    .spawn(move || loop {
                        let job = {
                            let guard = receiver.lock().unwrap();
                            guard.recv()
                        };
                        match job {
                            Ok(job) => job(),
                            Err(_) => break,
                        }
                    })
                    .expect("failed to spawn task pool worker")
            })
            .collect();

        Self { sender: Some(sender), workers }
    }

    pub fn submit(&self, job: impl FnOnce() + Send + 'static) {
        if let Some(sender) = &self.sender {
            let _ = sender.send(Box::new(job));
        }
    }
}

impl Drop for TaskPool {
    fn drop(&mut self) {
        // Drop the sender first so every worker's blocking `recv()` returns
        // `Err` and the loop exits; joining before this would deadlock.
        self.sender.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::channel;
    use std::time::Duration;

    #[test]
    fn submitted_jobs_run_on_worker_threads() {
        let pool = TaskPool::new(2);
        let (tx, rx) = channel();
        for i in 0..4 {
            let tx = tx.clone();
            pool.submit(move || {
                tx.send(i).unwrap();
            });
        }
        let mut seen = Vec::new();
        for _ in 0..4 {
            seen.push(rx.recv_timeout(Duration::from_secs(1)).unwrap());
        }
        seen.sort();
        assert_eq!(seen, vec![0, 1, 2, 3]);
    }
}

use std::fmt::Display;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use thiserror::Error;

use crate::logging::{LogLevel, LogRecord, LogSink, SharedLogSink};

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue `{0}` is closed")]
    Closed(String),
}

/// One delivery of a job, carrying its redelivery count. Attempt 1 is the
/// first delivery.
#[derive(Clone, Debug)]
pub struct Delivery<T> {
    pub job: T,
    pub attempt: u32,
}

pub trait JobQueue<T>: Send + Sync {
    fn publish(&self, job: T) -> Result<(), QueueError>;
}

/// In-process stand-in for the platform queue: at-least-once delivery with a
/// bounded redelivery count. The consumer side is single-threaded, matching
/// one worker per queue.
pub struct MemoryQueue<T> {
    name: String,
    tx: Mutex<Sender<Delivery<T>>>,
    rx: Mutex<Receiver<Delivery<T>>>,
    max_attempts: u32,
}

impl<T: Send> MemoryQueue<T> {
    pub fn new(name: impl Into<String>, max_attempts: u32) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            name: name.into(),
            tx: Mutex::new(tx),
            rx: Mutex::new(rx),
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn next_timeout(&self, timeout: Duration) -> Option<Delivery<T>> {
        let guard = self.rx.lock().ok()?;
        match guard.recv_timeout(timeout) {
            Ok(delivery) => Some(delivery),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Put a failed delivery back on the queue. Returns false when the
    /// redelivery budget is spent and the job is dropped.
    pub fn redeliver(&self, delivery: Delivery<T>) -> bool {
        if delivery.attempt >= self.max_attempts {
            return false;
        }
        let next = Delivery {
            job: delivery.job,
            attempt: delivery.attempt + 1,
        };
        self.tx
            .lock()
            .map(|tx| tx.send(next).is_ok())
            .unwrap_or(false)
    }
}

impl<T: Send> JobQueue<T> for MemoryQueue<T> {
    fn publish(&self, job: T) -> Result<(), QueueError> {
        let tx = self
            .tx
            .lock()
            .map_err(|_| QueueError::Closed(self.name.clone()))?;
        tx.send(Delivery { job, attempt: 1 })
            .map_err(|_| QueueError::Closed(self.name.clone()))
    }
}

pub struct WorkerHandle {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn join(mut self) {
        self.stop();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.stop();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// One consumer thread per queue. Each job runs end-to-end on this thread;
/// a handler error sends the delivery back for redelivery.
pub fn spawn_worker<T, E>(
    queue: Arc<MemoryQueue<T>>,
    sink: SharedLogSink,
    handler: impl Fn(&T, u32) -> Result<(), E> + Send + 'static,
) -> WorkerHandle
where
    T: Send + 'static,
    E: Display,
{
    let stop = Arc::new(AtomicBool::new(false));
    let stop_flag = Arc::clone(&stop);

    let handle = thread::spawn(move || {
        while !stop_flag.load(Ordering::SeqCst) {
            let Some(delivery) = queue.next_timeout(Duration::from_millis(100)) else {
                continue;
            };
            match handler(&delivery.job, delivery.attempt) {
                Ok(()) => {}
                Err(err) => {
                    let attempt = delivery.attempt;
                    let redelivered = queue.redeliver(delivery);
                    let level = if redelivered {
                        LogLevel::Warn
                    } else {
                        LogLevel::Error
                    };
                    let outcome = if redelivered {
                        "returned for redelivery"
                    } else {
                        "redelivery budget spent, dropping"
                    };
                    sink.log(LogRecord::new(
                        level,
                        queue.name(),
                        format!("job attempt {attempt} failed: {err}; {outcome}"),
                    ));
                }
            }
        }
    });

    WorkerHandle {
        stop,
        handle: Some(handle),
    }
}

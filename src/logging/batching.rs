//! Writer threads for sinks that deliver events in batches.
//!
//! A [BatchQueue] pushes [LogEvent]s into a [crossbeam::channel] and a dedicated thread drains it, handing the
//! sink's writer batches of up to `limit` events, or whatever arrived within `period`.
//! The thread is only started by the first event.

use std::{
    fmt,
    thread::JoinHandle,
    time::{Duration, Instant},
};

use crossbeam::channel::{self, RecvTimeoutError};
use parking_lot::Mutex;

use super::{LogError, LogEvent, SELF_LOG_TARGET};

struct Worker {
    queue: channel::Sender<LogEvent>,
    handle: JoinHandle<()>,
}

enum WorkerState {
    Idle,
    Running(Worker),
    Closed,
}

pub(crate) struct BatchQueue {
    name: String,
    limit: usize,
    period: Duration,
    state: Mutex<WorkerState>,
}

impl fmt::Debug for BatchQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchQueue")
            .field("name", &self.name)
            .field("limit", &self.limit)
            .field("period", &self.period)
            .field("running", &self.is_running())
            .finish()
    }
}

impl BatchQueue {
    pub(crate) fn new(name: String, limit: usize, period: Duration) -> Self {
        Self {
            name,
            limit,
            period,
            state: Mutex::new(WorkerState::Idle),
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        matches!(*self.state.lock(), WorkerState::Running(_))
    }

    /// Queues `event`, starting the writer thread on first use.
    ///
    /// `opener` is only called when the thread is started. What it returns runs on the writer thread and
    /// produces the batch writer; an error there disables the sink.
    pub(crate) fn push<O, S, W>(&self, event: &LogEvent, opener: O)
    where
        O: FnOnce() -> S,
        S: FnOnce() -> Result<W, LogError> + Send + 'static,
        W: FnMut(Vec<LogEvent>) -> Result<(), LogError> + 'static,
    {
        let mut state = self.state.lock();
        if let WorkerState::Idle = *state {
            match self.spawn(opener()) {
                Ok(worker) => *state = WorkerState::Running(worker),
                Err(err) => {
                    tracing::error!(target: SELF_LOG_TARGET, "{} could not start: {err}", self.name);
                    *state = WorkerState::Closed;
                }
            }
        }
        if let WorkerState::Running(worker) = &*state {
            if worker.queue.send(event.clone()).is_err() {
                tracing::warn!(target: SELF_LOG_TARGET, "{}: {}", self.name, LogError::SendError);
            }
        }
    }

    fn spawn<S, W>(&self, open: S) -> Result<Worker, LogError>
    where
        S: FnOnce() -> Result<W, LogError> + Send + 'static,
        W: FnMut(Vec<LogEvent>) -> Result<(), LogError> + 'static,
    {
        let (queue, receiver) = channel::unbounded();
        let (name, limit, period) = (self.name.clone(), self.limit, self.period);
        let handle = std::thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || {
                let mut write = match open() {
                    Ok(write) => write,
                    Err(err) => {
                        tracing::error!(target: SELF_LOG_TARGET, "{name} disabled: {err}");
                        return;
                    }
                };
                drain_in_batches(&receiver, limit, period, |batch| {
                    let events = batch.len();
                    if let Err(err) = write(batch) {
                        tracing::error!(target: SELF_LOG_TARGET, events = events, "{name} dropped a batch: {err}");
                    }
                });
            })?;
        Ok(Worker { queue, handle })
    }

    /// Stops accepting events, then waits for the writer to drain what is queued.
    pub(crate) fn close(&self) {
        let previous = std::mem::replace(&mut *self.state.lock(), WorkerState::Closed);
        if let WorkerState::Running(Worker { queue, handle }) = previous {
            // Dropping the sender disconnects the writer once it has drained the queue.
            drop(queue);
            if handle.join().is_err() {
                tracing::error!(target: SELF_LOG_TARGET, "{} writer panicked", self.name);
            }
        }
    }
}

impl Drop for BatchQueue {
    fn drop(&mut self) {
        self.close();
    }
}

/// Hands the events on `queue` to `write` in batches of at most `limit`, cutting a batch short once `period`
/// has passed. Returns when every sender is gone and the last batch has been written.
pub(crate) fn drain_in_batches(
    queue: &channel::Receiver<LogEvent>,
    limit: usize,
    period: Duration,
    mut write: impl FnMut(Vec<LogEvent>),
) {
    let limit = limit.max(1);
    let mut should_continue = true;
    let mut batch = Vec::new();
    while should_continue {
        // No representable deadline: batches are only cut by size.
        let deadline = Instant::now().checked_add(period);
        while batch.len() < limit {
            let received = match deadline {
                Some(deadline) => queue.recv_deadline(deadline),
                None => queue.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };
            match received {
                Ok(event) => batch.push(event),
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => {
                    should_continue = false;
                    break;
                }
            }
        }
        if !batch.is_empty() {
            write(std::mem::take(&mut batch));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::logging::LogLevel;

    fn events(count: usize) -> channel::Receiver<LogEvent> {
        let (sender, receiver) = channel::unbounded();
        for i in 0..count {
            sender.send(LogEvent::new(LogLevel::Information, format!("event {i}"))).unwrap();
        }
        receiver
    }

    #[test]
    fn batches_are_cut_at_the_limit() {
        let mut sizes = vec![];
        drain_in_batches(&events(5), 2, Duration::from_secs(60), |batch| sizes.push(batch.len()));
        assert_eq!(sizes, vec![2, 2, 1]);
    }

    #[test]
    fn zero_limit_still_writes_one_at_a_time() {
        let mut sizes = vec![];
        drain_in_batches(&events(3), 0, Duration::from_secs(60), |batch| sizes.push(batch.len()));
        assert_eq!(sizes, vec![1, 1, 1]);
    }

    #[test]
    fn batches_are_cut_when_the_period_elapses() {
        let (sender, receiver) = channel::unbounded();
        let producer = std::thread::spawn(move || {
            sender.send(LogEvent::new(LogLevel::Warning, "first")).unwrap();
            std::thread::sleep(Duration::from_millis(300));
            sender.send(LogEvent::new(LogLevel::Warning, "second")).unwrap();
        });

        let mut batches = vec![];
        drain_in_batches(&receiver, 50, Duration::from_millis(50), |batch| {
            batches.push(batch.into_iter().map(|e| e.rendered_message).collect::<Vec<_>>())
        });
        producer.join().unwrap();

        assert_eq!(batches, vec![vec!["first".to_string()], vec!["second".to_string()]]);
    }

    #[test]
    fn unrepresentable_period_does_not_panic() {
        let mut sizes = vec![];
        drain_in_batches(&events(3), 10, Duration::MAX, |batch| sizes.push(batch.len()));
        assert_eq!(sizes, vec![3]);
    }

    #[test]
    fn queue_starts_lazily_and_drains_on_close() {
        let written = Arc::new(Mutex::new(vec![]));
        let queue = BatchQueue::new("test-sink".to_string(), 10, Duration::from_secs(60));
        assert!(!queue.is_running());

        for message in ["a", "b", "c"] {
            let written = written.clone();
            queue.push(&LogEvent::new(LogLevel::Error, message), move || {
                move || {
                    Ok::<_, LogError>(move |batch: Vec<LogEvent>| {
                        written.lock().push(batch.len());
                        Ok::<(), LogError>(())
                    })
                }
            });
        }
        assert!(queue.is_running());

        queue.close();
        assert!(!queue.is_running());
        assert_eq!(*written.lock(), vec![3]);
    }
}

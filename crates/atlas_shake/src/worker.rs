//! Single-owner worker thread for a cache instance.
//!
//! Caches are not safe to share: two racing `make` calls could interleave
//! map updates or rebuild twice. A [`Worker`] gives one thread exclusive
//! ownership of a cache and runs requests against it one at a time, in the
//! order they were sent. Callers block until their request has run.

use std::sync::mpsc;
use std::thread;

use tracing::debug;

type Job<C> = Box<dyn FnOnce(&mut C) + Send>;

/// Errors from talking to a worker thread.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    /// The operating system refused to start the thread.
    #[error("failed to spawn worker `{name}`: {source}")]
    Spawn {
        /// Worker thread name.
        name: String,
        /// The underlying error.
        source: std::io::Error,
    },

    /// The worker thread is gone, typically because a request panicked.
    #[error("worker `{name}` is no longer running")]
    Disconnected {
        /// Worker thread name.
        name: String,
    },
}

/// Handle to a thread that exclusively owns a value of type `C`.
///
/// Dropping the handle closes the request channel and joins the thread.
pub struct Worker<C> {
    name: String,
    sender: Option<mpsc::Sender<Job<C>>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl<C: 'static> Worker<C> {
    /// Starts a thread named `name` that builds its state with `init` and
    /// then serves requests until the handle is dropped.
    ///
    /// The state is created on the worker thread, so `C` itself need not be
    /// `Send`.
    pub fn spawn<F>(name: impl Into<String>, init: F) -> Result<Self, WorkerError>
    where
        F: FnOnce() -> C + Send + 'static,
    {
        let name = name.into();
        let (sender, receiver) = mpsc::channel::<Job<C>>();
        let thread_name = name.clone();
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                let mut state = init();
                for job in receiver {
                    job(&mut state);
                }
                debug!(target: "atlas::shake", worker = %thread_name, "worker stopped");
            })
            .map_err(|source| WorkerError::Spawn {
                name: name.clone(),
                source,
            })?;

        Ok(Self {
            name,
            sender: Some(sender),
            handle: Some(handle),
        })
    }

    /// Runs `f` against the owned state on the worker thread and returns its
    /// result.
    ///
    /// Requests from all callers are serialized; this blocks until `f` has
    /// run.
    pub fn call<R, F>(&self, f: F) -> Result<R, WorkerError>
    where
        F: FnOnce(&mut C) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (reply, response) = mpsc::channel();
        let job: Job<C> = Box::new(move |state| {
            let _ = reply.send(f(state));
        });
        self.sender
            .as_ref()
            .ok_or_else(|| self.disconnected())?
            .send(job)
            .map_err(|_| self.disconnected())?;
        response.recv().map_err(|_| self.disconnected())
    }

    /// The worker thread's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn disconnected(&self) -> WorkerError {
        WorkerError::Disconnected {
            name: self.name.clone(),
        }
    }
}

impl<C> Drop for Worker<C> {
    fn drop(&mut self) {
        // Closing the channel ends the worker's receive loop.
        self.sender.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::read_file::ReadFileRule;
    use crate::RuleSet;
    use std::path::PathBuf;
    use std::sync::Arc;

    #[test]
    fn call_runs_on_owned_state() {
        let worker = Worker::spawn("counter", || 0u32).unwrap();
        let after = worker
            .call(|n| {
                *n += 1;
                *n
            })
            .unwrap();
        assert_eq!(after, 1);
        assert_eq!(worker.call(|n| *n).unwrap(), 1);
        assert_eq!(worker.name(), "counter");
    }

    #[test]
    fn concurrent_callers_are_serialized() {
        let worker = Arc::new(Worker::spawn("serial", Vec::<usize>::new).unwrap());
        let threads: Vec<_> = (0..8)
            .map(|i| {
                let worker = Arc::clone(&worker);
                thread::spawn(move || {
                    for j in 0..50 {
                        worker.call(move |log| log.push(i * 100 + j)).unwrap();
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        let log = worker.call(|log| log.clone()).unwrap();
        assert_eq!(log.len(), 400);
        // Each caller's requests run in the order it sent them.
        for i in 0..8 {
            let mine: Vec<usize> = log.iter().copied().filter(|v| v / 100 == i).collect();
            assert!(mine.windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[test]
    fn panicking_request_disconnects() {
        let worker = Worker::spawn("fragile", || ()).unwrap();
        let err = worker.call::<(), _>(|_| panic!("boom")).unwrap_err();
        assert!(matches!(err, WorkerError::Disconnected { .. }));
        assert!(worker.call(|_| ()).is_err());
    }

    #[test]
    fn engine_behind_a_worker() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("demo.txt");
        std::fs::write(&path, "Hi\n").unwrap();

        let worker = Worker::spawn("engine", || {
            RuleSet::<PathBuf, String>::new(Vec::new()).rule(ReadFileRule::any_path())
        })
        .unwrap();

        let q = path.clone();
        let (changed, text) = worker
            .call(move |rules| rules.make(&q).map(|a| (a.changed, a.value.to_string())))
            .unwrap()
            .unwrap();
        assert!(changed);
        assert_eq!(text, "Hi\n");

        let changed = worker
            .call(move |rules| rules.make(&path).map(|a| a.changed))
            .unwrap()
            .unwrap();
        assert!(!changed);
    }
}

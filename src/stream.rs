//! Completion plumbing for runners.
//!
//! A runner signals completion in one of two ways: it calls its `done`
//! callback (possibly later), or it returns a [`Stream`] whose `finish` settles
//! the work. Nothing here blocks or polls; every helper is callback driven.

use crate::error::ChefResult;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Completion callback handed to every runner.
pub type Done = Box<dyn FnOnce(ChefResult<()>) + Send>;

/// A deferred unit of work: given a `done`, start it.
pub type Step = Box<dyn FnOnce(Done) -> ChefResult<Option<Stream>> + Send>;

/// One-shot latch around a [`Done`]: however many clones signal, the inner
/// callback fires at most once.
#[derive(Clone)]
pub struct Completion {
    inner: Arc<Mutex<Option<Done>>>,
}

impl Completion {
    pub fn new(done: Done) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(done))),
        }
    }

    /// Fire the callback. Returns false if it already fired.
    pub fn signal(&self, result: ChefResult<()>) -> bool {
        let done = self.inner.lock().take();
        match done {
            Some(done) => {
                done(result);
                true
            }
            None => false,
        }
    }

    pub fn is_signalled(&self) -> bool {
        self.inner.lock().is_none()
    }

    /// A [`Done`] that signals this latch.
    pub fn as_done(&self) -> Done {
        let completion = self.clone();
        Box::new(move |result| {
            completion.signal(result);
        })
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("signalled", &self.is_signalled())
            .finish()
    }
}

enum StreamState {
    Pending(Vec<Done>),
    Finished(ChefResult<()>),
}

/// Promise-like completion handle returned by runners.
///
/// Cloning shares the same state. Listeners registered after `finish` are
/// called immediately with the recorded outcome.
#[derive(Clone)]
pub struct Stream {
    label: Arc<str>,
    state: Arc<Mutex<StreamState>>,
}

impl Stream {
    pub fn new(label: impl Into<String>) -> Self {
        let label: String = label.into();
        Self {
            label: label.into(),
            state: Arc::new(Mutex::new(StreamState::Pending(Vec::new()))),
        }
    }

    /// A stream that is already finished successfully.
    pub fn finished(label: impl Into<String>) -> Self {
        let stream = Self::new(label);
        stream.finish(Ok(()));
        stream
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Settle the stream. Only the first call has any effect.
    pub fn finish(&self, result: ChefResult<()>) -> bool {
        let listeners = {
            let mut state = self.state.lock();
            match &mut *state {
                StreamState::Finished(_) => return false,
                StreamState::Pending(listeners) => {
                    let listeners = std::mem::take(listeners);
                    *state = StreamState::Finished(result.clone());
                    listeners
                }
            }
        };
        for listener in listeners {
            listener(result.clone());
        }
        true
    }

    /// Register a callback for the outcome.
    pub fn on_finish(&self, done: Done) {
        let outcome = {
            let mut state = self.state.lock();
            match &mut *state {
                StreamState::Pending(listeners) => {
                    listeners.push(done);
                    return;
                }
                StreamState::Finished(result) => result.clone(),
            }
        };
        done(outcome);
    }

    pub fn is_finished(&self) -> bool {
        matches!(*self.state.lock(), StreamState::Finished(_))
    }

    /// The outcome, once finished.
    pub fn outcome(&self) -> Option<ChefResult<()>> {
        match &*self.state.lock() {
            StreamState::Finished(result) => Some(result.clone()),
            StreamState::Pending(_) => None,
        }
    }
}

impl fmt::Debug for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream")
            .field("label", &self.label)
            .field("finished", &self.is_finished())
            .finish()
    }
}

/// Route a runner's return value into its completion latch.
///
/// - `Ok(Some(stream))`: the latch fires when the stream finishes
/// - `Ok(None)`: the runner calls `done` itself
/// - `Err(e)`: the runner failed synchronously
pub fn settle(completion: &Completion, returned: ChefResult<Option<Stream>>) {
    match returned {
        Ok(Some(stream)) => stream.on_finish(completion.as_done()),
        Ok(None) => {}
        Err(err) => {
            completion.signal(Err(err));
        }
    }
}

/// Start a step and settle its outcome into `done`.
pub fn start(step: Step, done: Done) {
    let completion = Completion::new(done);
    let returned = step(completion.as_done());
    settle(&completion, returned);
}

/// Aggregates the completion of a fixed number of members.
///
/// The first failing member completes the join immediately; otherwise it
/// completes once every member has succeeded. An empty join completes on
/// construction.
#[derive(Clone)]
pub struct Join {
    remaining: Arc<AtomicUsize>,
    completion: Completion,
}

impl Join {
    pub fn new(count: usize, done: Done) -> Self {
        let join = Self {
            remaining: Arc::new(AtomicUsize::new(count)),
            completion: Completion::new(done),
        };
        if count == 0 {
            join.completion.signal(Ok(()));
        }
        join
    }

    /// A [`Done`] for one member.
    pub fn member(&self) -> Done {
        let join = self.clone();
        Box::new(move |result| match result {
            Err(err) => {
                join.completion.signal(Err(err));
            }
            Ok(()) => {
                if join.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                    join.completion.signal(Ok(()));
                }
            }
        })
    }

    pub fn is_complete(&self) -> bool {
        self.completion.is_signalled()
    }
}

/// Start every step at once; `done` gets the first failure or success after
/// all of them.
pub fn join_all(steps: Vec<Step>, done: Done) {
    let join = Join::new(steps.len(), done);
    for step in steps {
        start(step, join.member());
    }
}

/// Run steps strictly one at a time; the first failure stops the sequence.
pub fn sequence(steps: Vec<Step>, done: Done) {
    run_next(steps.into(), done);
}

fn run_next(mut steps: VecDeque<Step>, done: Done) {
    let Some(step) = steps.pop_front() else {
        done(Ok(()));
        return;
    };
    start(
        step,
        Box::new(move |result| match result {
            Ok(()) => run_next(steps, done),
            Err(err) => done(Err(err)),
        }),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ChefError;

    type Log = Arc<Mutex<Vec<String>>>;

    fn recorder() -> (Log, Done) {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        let done: Done = Box::new(move |result| {
            sink.lock().push(match result {
                Ok(()) => "ok".to_string(),
                Err(err) => format!("err: {}", err.message),
            });
        });
        (log, done)
    }

    fn ok_step(log: &Log, name: &str) -> Step {
        let log = Arc::clone(log);
        let name = name.to_string();
        Box::new(move |done| {
            log.lock().push(name);
            done(Ok(()));
            Ok(None)
        })
    }

    #[test]
    fn test_completion_fires_once() {
        let (log, done) = recorder();
        let completion = Completion::new(done);
        assert!(completion.signal(Ok(())));
        assert!(!completion.signal(Err(ChefError::internal("late"))));
        assert_eq!(*log.lock(), vec!["ok"]);
    }

    #[test]
    fn test_stream_listeners_before_and_after_finish() {
        let stream = Stream::new("s");
        let (early, done) = recorder();
        stream.on_finish(done);
        assert!(early.lock().is_empty());

        assert!(stream.finish(Ok(())));
        assert!(!stream.finish(Err(ChefError::internal("again"))));
        assert_eq!(*early.lock(), vec!["ok"]);

        let (late, done) = recorder();
        stream.on_finish(done);
        assert_eq!(*late.lock(), vec!["ok"]);
        assert!(stream.outcome().is_some_and(|r| r.is_ok()));
    }

    #[test]
    fn test_settle_sync_error() {
        let (log, done) = recorder();
        let completion = Completion::new(done);
        settle(&completion, Err(ChefError::task_not_found("x")));
        assert_eq!(*log.lock(), vec!["err: referring task not found: x"]);
    }

    #[test]
    fn test_join_first_failure_then_ignored() {
        let (log, done) = recorder();
        let join = Join::new(3, done);
        let (a, b, c) = (join.member(), join.member(), join.member());
        a(Ok(()));
        b(Err(ChefError::task_failed("b", "boom")));
        assert!(join.is_complete());
        c(Ok(()));
        assert_eq!(*log.lock(), vec!["err: task b failed"]);
    }

    #[test]
    fn test_join_empty_completes_immediately() {
        let (log, done) = recorder();
        let join = Join::new(0, done);
        assert!(join.is_complete());
        assert_eq!(*log.lock(), vec!["ok"]);
    }

    #[test]
    fn test_sequence_runs_in_order_and_stops_on_failure() {
        let (log, done) = recorder();
        let failing: Step = Box::new(|_done| Err(ChefError::task_failed("two", "nope")));
        sequence(
            vec![ok_step(&log, "one"), failing, ok_step(&log, "three")],
            done,
        );
        let log = log.lock();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0], "one");
        assert!(log[1].starts_with("err"));
    }

    #[test]
    fn test_join_all_waits_for_streams() {
        let (log, done) = recorder();
        let pending = Stream::new("pending");
        let handle = pending.clone();
        let step: Step = Box::new(move |_done| Ok(Some(handle)));
        join_all(vec![step, ok_step(&log, "sync")], done);
        assert_eq!(*log.lock(), vec!["sync"]);

        pending.finish(Ok(()));
        assert_eq!(*log.lock(), vec!["sync", "ok"]);
    }

    #[test]
    fn test_finished_stream() {
        let stream = Stream::finished("noop");
        assert!(stream.is_finished());
        assert_eq!(stream.label(), "noop");
        assert!(stream.outcome().is_some_and(|r| r.is_ok()));
    }
}

//! Console evaluation queue.
//!
//! Any thread may queue a snippet through a [`ConsoleHandle`]. Nothing runs
//! until the engine drains the queue on its own thread during a tick, at which
//! point each request's [`EvalHandle`] resolves.

use std::sync::mpsc;

use tokio::sync::oneshot;

/// Outcome of one evaluation: printable value or error text.
pub type EvalOutcome = Result<String, String>;

/// Errors seen by the requester.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConsoleError {
    /// The engine that owned the queue is gone.
    #[error("Console queue closed")]
    QueueClosed,

    /// The request was dropped before it was evaluated.
    #[error("Evaluation dropped before completion")]
    Dropped,
}

struct EvalRequest {
    code: String,
    resp: oneshot::Sender<EvalOutcome>,
}

/// Engine-side end of the queue.
pub struct EvalQueue {
    tx: mpsc::Sender<EvalRequest>,
    rx: mpsc::Receiver<EvalRequest>,
}

/// Cloneable requester-side end of the queue.
#[derive(Clone)]
pub struct ConsoleHandle {
    tx: mpsc::Sender<EvalRequest>,
}

/// Deferred completion for one queued snippet.
pub struct EvalHandle {
    rx: oneshot::Receiver<EvalOutcome>,
}

impl EvalQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self { tx, rx }
    }

    pub fn handle(&self) -> ConsoleHandle {
        ConsoleHandle {
            tx: self.tx.clone(),
        }
    }

    /// Evaluate everything queued so far, in order. Returns how many ran.
    pub fn drain(&self, mut eval: impl FnMut(&str) -> EvalOutcome) -> usize {
        let mut count = 0;
        while let Ok(request) = self.rx.try_recv() {
            let outcome = eval(&request.code);
            if request.resp.send(outcome).is_err() {
                tracing::debug!("Console requester went away before its result arrived");
            }
            count += 1;
        }
        count
    }
}

impl Default for EvalQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsoleHandle {
    /// Queue `code` for the next tick.
    pub fn eval(&self, code: impl Into<String>) -> Result<EvalHandle, ConsoleError> {
        let (resp, rx) = oneshot::channel();
        self.tx
            .send(EvalRequest {
                code: code.into(),
                resp,
            })
            .map_err(|_| ConsoleError::QueueClosed)?;
        Ok(EvalHandle { rx })
    }
}

impl EvalHandle {
    /// Wait for the tick that evaluates this snippet.
    pub async fn wait(self) -> Result<EvalOutcome, ConsoleError> {
        self.rx.await.map_err(|_| ConsoleError::Dropped)
    }

    /// Blocking variant for threads outside any async runtime.
    pub fn blocking_wait(self) -> Result<EvalOutcome, ConsoleError> {
        self.rx.blocking_recv().map_err(|_| ConsoleError::Dropped)
    }

    /// Result if the snippet has already run.
    pub fn try_result(&mut self) -> Option<Result<EvalOutcome, ConsoleError>> {
        match self.rx.try_recv() {
            Ok(outcome) => Some(Ok(outcome)),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(ConsoleError::Dropped)),
        }
    }
}

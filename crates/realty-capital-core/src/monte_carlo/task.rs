use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::monte_carlo::simulation::{
    run_simulation, CancellationToken, SimulationHooks, SimulationInput, SimulationResult,
};
use crate::scenarios::operations::RevenueEngine;

/// A simulation request tagged with the caller's id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationRequest {
    pub id: u64,
    pub payload: SimulationInput,
}

/// Messages streamed back for a request. `Success` and `Error` are terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskResponse {
    Progress { id: u64, progress: u8 },
    Success { id: u64, payload: Box<SimulationResult> },
    Error { id: u64, error: String },
}

impl TaskResponse {
    pub fn id(&self) -> u64 {
        match self {
            TaskResponse::Progress { id, .. }
            | TaskResponse::Success { id, .. }
            | TaskResponse::Error { id, .. } => *id,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskResponse::Progress { .. })
    }
}

struct Job {
    request: SimulationRequest,
    cancel: CancellationToken,
}

/// Runs simulations on a background thread, one at a time. Submitting a new
/// request cancels the one in flight; responses for anything but the latest
/// request are dropped on receipt.
pub struct SimulationDriver {
    jobs: Option<Sender<Job>>,
    responses: Receiver<TaskResponse>,
    pending: Option<u64>,
    current: Option<CancellationToken>,
    worker: Option<JoinHandle<()>>,
}

impl SimulationDriver {
    pub fn spawn(engine: Arc<dyn RevenueEngine>) -> Self {
        let (job_tx, job_rx) = channel::unbounded::<Job>();
        let (resp_tx, resp_rx) = channel::unbounded::<TaskResponse>();

        let worker = std::thread::spawn(move || {
            for job in job_rx {
                let id = job.request.id;
                tracing::debug!(target: "realty_capital::monte_carlo", id, "simulation task started");
                let progress_tx = resp_tx.clone();
                let on_progress = move |progress: u8| {
                    let _ = progress_tx.send(TaskResponse::Progress { id, progress });
                };
                let hooks = SimulationHooks {
                    on_progress: Some(&on_progress),
                    cancel: Some(&job.cancel),
                };
                let response = match run_simulation(engine.as_ref(), &job.request.payload, hooks) {
                    Ok(result) => TaskResponse::Success {
                        id,
                        payload: Box::new(result),
                    },
                    Err(e) => TaskResponse::Error {
                        id,
                        error: e.to_string(),
                    },
                };
                if resp_tx.send(response).is_err() {
                    break;
                }
            }
        });

        Self {
            jobs: Some(job_tx),
            responses: resp_rx,
            pending: None,
            current: None,
            worker: Some(worker),
        }
    }

    /// Queue `request`, cancelling whatever was submitted before it.
    pub fn submit(&mut self, request: SimulationRequest) {
        if let Some(previous) = self.current.take() {
            previous.cancel();
        }
        let cancel = CancellationToken::new();
        self.pending = Some(request.id);
        self.current = Some(cancel.clone());
        if let Some(jobs) = &self.jobs {
            if jobs.send(Job { request, cancel }).is_err() {
                tracing::warn!(target: "realty_capital::monte_carlo", "simulation worker is gone");
            }
        }
    }

    /// Cancel the pending request. Its partial result is still delivered.
    pub fn cancel(&self) {
        if let Some(token) = &self.current {
            token.cancel();
        }
    }

    pub fn pending(&self) -> Option<u64> {
        self.pending
    }

    /// Next response for the pending request, blocking. `None` when nothing
    /// is pending or the worker has stopped.
    pub fn recv(&mut self) -> Option<TaskResponse> {
        loop {
            let pending = self.pending?;
            let response = self.responses.recv().ok()?;
            if let Some(r) = self.accept(pending, response) {
                return Some(r);
            }
        }
    }

    /// Like [`recv`](Self::recv) but gives up after `timeout`.
    pub fn recv_timeout(&mut self, timeout: Duration) -> Option<TaskResponse> {
        let deadline = Instant::now() + timeout;
        loop {
            let pending = self.pending?;
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.responses.recv_timeout(remaining) {
                Ok(response) => {
                    if let Some(r) = self.accept(pending, response) {
                        return Some(r);
                    }
                }
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => return None,
            }
        }
    }

    /// Block until the pending request reaches a terminal response.
    pub fn wait(&mut self) -> Option<TaskResponse> {
        while let Some(response) = self.recv() {
            if response.is_terminal() {
                return Some(response);
            }
        }
        None
    }

    fn accept(&mut self, pending: u64, response: TaskResponse) -> Option<TaskResponse> {
        if response.id() != pending {
            tracing::debug!(target: "realty_capital::monte_carlo", id = response.id(), "stale response ignored");
            return None;
        }
        if response.is_terminal() {
            self.pending = None;
            self.current = None;
        }
        Some(response)
    }
}

impl Drop for SimulationDriver {
    fn drop(&mut self) {
        if let Some(token) = self.current.take() {
            token.cancel();
        }
        self.jobs.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

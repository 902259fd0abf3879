//! The background thread evaluators run on.

use std::any::Any;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender};
use log::{debug, warn};
use loadroute_core::{EvaluateError, Evaluation, PathEvaluator, Prediction, SimNetwork};

/// One evaluation: an independent snapshot of the network and the state carried from the
/// previous evaluation.
#[derive(Debug, derive_new::new)]
pub struct Job {
    pub network: SimNetwork,
    pub carried: Option<Prediction>,
}

pub type Outcome = Result<Evaluation, EvaluateError>;

/// Runs evaluations one at a time on a dedicated thread.
///
/// The queue holds a single job: a submission made while an evaluation is running is dropped.
/// A panicking evaluator yields [`EvaluateError::Panicked`] and the worker keeps serving.
#[derive(Debug)]
pub struct EvalWorker {
    jobs: Sender<Job>,
    results: Receiver<Outcome>,
    busy: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl EvalWorker {
    pub fn spawn(evaluator: Box<dyn PathEvaluator>) -> io::Result<Self> {
        let (jobs, job_rx) = crossbeam_channel::bounded::<Job>(1);
        let (result_tx, results) = crossbeam_channel::unbounded();
        let busy = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&busy);
        let handle = thread::Builder::new()
            .name("evaluator".into())
            .spawn(move || {
                for job in job_rx.iter() {
                    let outcome = run_job(&*evaluator, job);
                    flag.store(false, Ordering::SeqCst);
                    if result_tx.send(outcome).is_err() {
                        break;
                    }
                }
            })?;
        Ok(Self {
            jobs,
            results,
            busy,
            handle,
        })
    }

    /// Hands `job` to the worker unless it is still busy. Returns whether the job was taken.
    pub fn submit(&self, job: Job) -> bool {
        if self.busy.swap(true, Ordering::SeqCst) {
            return false;
        }
        if self.jobs.try_send(job).is_err() {
            self.busy.store(false, Ordering::SeqCst);
            return false;
        }
        true
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// Completed evaluations, in order.
    pub fn results(&self) -> &Receiver<Outcome> {
        &self.results
    }

    /// Stops accepting jobs and waits for the running one, if any, to finish.
    pub fn shutdown(self) {
        let Self { jobs, handle, .. } = self;
        drop(jobs);
        if handle.join().is_err() {
            warn!("Evaluator thread panicked");
        }
    }
}

fn run_job(evaluator: &dyn PathEvaluator, job: Job) -> Outcome {
    let start = Instant::now();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        evaluator.evaluate(&job.network, job.carried.as_ref())
    }))
    .unwrap_or_else(|payload| Err(EvaluateError::Panicked(panic_message(&*payload))));
    debug!("Evaluation finished in {:?}", start.elapsed());
    outcome
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_owned())
}

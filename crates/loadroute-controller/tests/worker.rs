use std::time::Duration;

use crossbeam_channel::Receiver;
use loadroute_controller::{EvalWorker, Job};
use loadroute_core::{
    testing, EvaluateError, Evaluation, PathEvaluator, Prediction, SimNetwork,
};

#[derive(Debug)]
struct Gated {
    gate: Receiver<()>,
}

impl PathEvaluator for Gated {
    fn evaluate(
        &self,
        _network: &SimNetwork,
        _carried: Option<&Prediction>,
    ) -> Result<Evaluation, EvaluateError> {
        let _ = self.gate.recv();
        Ok(Evaluation::default())
    }
}

#[derive(Debug)]
struct Panicking;

impl PathEvaluator for Panicking {
    fn evaluate(
        &self,
        _network: &SimNetwork,
        _carried: Option<&Prediction>,
    ) -> Result<Evaluation, EvaluateError> {
        panic!("boom")
    }
}

fn job() -> anyhow::Result<Job> {
    Ok(Job::new(testing::loaded_linear_network(10.0)?, None))
}

#[test]
fn busy_worker_drops_submissions() -> anyhow::Result<()> {
    let (open, gate) = crossbeam_channel::unbounded();
    let worker = EvalWorker::spawn(Box::new(Gated { gate }))?;
    assert!(worker.submit(job()?));
    assert!(worker.is_busy());
    assert!(!worker.submit(job()?));

    open.send(())?;
    let outcome = worker.results().recv_timeout(Duration::from_secs(5))?;
    assert!(outcome.is_ok());
    assert!(!worker.is_busy());

    assert!(worker.submit(job()?));
    open.send(())?;
    worker.results().recv_timeout(Duration::from_secs(5))??;
    assert!(worker.results().try_recv().is_err());
    worker.shutdown();
    Ok(())
}

#[test]
fn panics_become_errors() -> anyhow::Result<()> {
    let worker = EvalWorker::spawn(Box::new(Panicking))?;
    for _ in 0..2 {
        assert!(worker.submit(job()?));
        let outcome = worker.results().recv_timeout(Duration::from_secs(5))?;
        match outcome {
            Err(EvaluateError::Panicked(msg)) => assert_eq!(msg, "boom"),
            other => panic!("unexpected outcome {other:?}"),
        }
    }
    worker.shutdown();
    Ok(())
}

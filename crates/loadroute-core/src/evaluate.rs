//! This module defines the [`PathEvaluator`] trait implemented by every routing policy.

use crate::network::{types::FlowLedger, SimNetwork};
use crate::route::RouteTable;

/// Hedged per-flow rate estimates carried from one evaluation to the next.
pub type Prediction = FlowLedger;

/// The outcome of one evaluation.
#[derive(Debug, Clone, Default, derive_new::new)]
pub struct Evaluation {
    /// New routes for the host pairs the evaluator wants changed. Pairs absent from this table keep
    /// their current route.
    pub routes: RouteTable,
    /// State to hand to the next evaluation.
    pub carried: Option<Prediction>,
}

/// The trait that must be implemented by all path evaluators.
///
/// An evaluator receives an independent snapshot of the network, so it may take as long as it
/// needs; it runs off the monitoring loop.
pub trait PathEvaluator: Send + Sync {
    /// Given a network snapshot and the state carried from the previous cycle, compute route
    /// updates.
    fn evaluate(
        &self,
        network: &SimNetwork,
        carried: Option<&Prediction>,
    ) -> Result<Evaluation, EvaluateError>;
}

impl<E: PathEvaluator + ?Sized> PathEvaluator for &E {
    fn evaluate(
        &self,
        network: &SimNetwork,
        carried: Option<&Prediction>,
    ) -> Result<Evaluation, EvaluateError> {
        (**self).evaluate(network, carried)
    }
}

impl<E: PathEvaluator + ?Sized> PathEvaluator for Box<E> {
    fn evaluate(
        &self,
        network: &SimNetwork,
        carried: Option<&Prediction>,
    ) -> Result<Evaluation, EvaluateError> {
        (**self).evaluate(network, carried)
    }
}

/// An evaluator that never changes routes. Used by the static policies.
#[derive(Debug, Default)]
pub struct NullEvaluator;

impl PathEvaluator for NullEvaluator {
    fn evaluate(
        &self,
        _network: &SimNetwork,
        _carried: Option<&Prediction>,
    ) -> Result<Evaluation, EvaluateError> {
        Ok(Evaluation::default())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EvaluateError {
    #[error("Evaluator panicked: {0}")]
    Panicked(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

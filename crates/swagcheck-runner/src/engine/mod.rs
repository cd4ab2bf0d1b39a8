//! Conformance run loop
//!
//! Operations run strictly in order, trials strictly one after another.
//! Per operation: build the composed strategy (or skip), then draw, dispatch
//! and classify up to `trials` times. With fail-fast on, the first FAIL is
//! delivered to every sink and then raises the run-wide abort signal.

mod sampler;

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info, warn};

use swagcheck_core::{
    DocumentedCodes, DryRunPlan, Operation, OperationStrategy, ParamValues, ParamsDisplay, Record,
    RecordSink, ReportError, RunReport, StrategyError, StrategyFactory,
};

use crate::client::{Dispatch, DispatchError, TransportError};
use crate::request::BuildError;

pub use sampler::{DrawError, Sampler, entropy_seed};

/// Trials per operation when none are configured.
pub const DEFAULT_TRIALS: u32 = 20;

/// Run-wide cancellation flag, checked before every operation and every draw.
#[derive(Debug, Default)]
pub struct AbortSignal(AtomicBool);

impl AbortSignal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Outcome of one trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Fail,
}

impl Verdict {
    #[must_use]
    pub fn classify(status: u16, documented: &DocumentedCodes) -> Self {
        if documented.contains(status) {
            Self::Pass
        } else {
            Self::Fail
        }
    }
}

/// Terminal state of one operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationState {
    /// Never started: this parameter has no usable type
    Skipped { parameter: String },
    Completed,
    /// Stopped by the abort signal
    Aborted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationOutcome {
    /// `"GET /items"`
    pub label: String,
    pub state: OperationState,
    pub trials: u32,
    pub failures: u32,
}

/// Everything a finished (or aborted) run produced.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub report: RunReport,
    /// One entry per operation reached, in schema order
    pub outcomes: Vec<OperationOutcome>,
    pub aborted: bool,
    pub seed: u64,
}

impl RunSummary {
    pub fn skipped(&self) -> impl Iterator<Item = (&str, &str)> {
        self.outcomes.iter().filter_map(|o| match &o.state {
            OperationState::Skipped { parameter } => Some((o.label.as_str(), parameter.as_str())),
            _ => None,
        })
    }

    /// 1 after a fail-fast abort, else 0. Conformance failures alone do not
    /// change the status.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        if self.aborted { 1 } else { 0 }
    }
}

/// A trial could not be built.
#[derive(Debug, thiserror::Error)]
pub enum ConstructionError {
    #[error(transparent)]
    Strategy(#[from] StrategyError),
    #[error(transparent)]
    Draw(#[from] DrawError),
    #[error(transparent)]
    Request(#[from] BuildError),
}

/// Fatal run errors; each ends the run with exit status 1.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("{operation}: cannot construct trial: {source}")]
    Construction {
        operation: String,
        source: ConstructionError,
    },
    #[error("{operation}: {source}")]
    Transport {
        operation: String,
        source: TransportError,
    },
    #[error("report sink failed: {0}")]
    Report(#[from] ReportError),
}

/// Drives every operation through its trials.
#[derive(Debug, Clone)]
pub struct ConformanceEngine {
    factory: StrategyFactory,
    trials: u32,
    fail_fast: bool,
    seed: u64,
}

impl ConformanceEngine {
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            factory: StrategyFactory::new(),
            trials: DEFAULT_TRIALS,
            fail_fast: true,
            seed,
        }
    }

    #[must_use]
    pub fn with_trials(mut self, trials: u32) -> Self {
        self.trials = trials;
        self
    }

    #[must_use]
    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    #[must_use]
    pub const fn seed(&self) -> u64 {
        self.seed
    }

    /// What a run would do, without sending anything.
    #[must_use]
    pub fn plan(&self, operations: &[Operation]) -> DryRunPlan {
        DryRunPlan::build(operations, self.trials)
    }

    /// Run every operation against `client`, feeding each record to the
    /// internal report and then to `sinks`.
    ///
    /// # Errors
    ///
    /// Returns [`RunError`] on a construction, transport or sink failure.
    /// A fail-fast abort is not an error; see [`RunSummary::aborted`].
    pub fn run<D: Dispatch + ?Sized>(
        &self,
        operations: &[Operation],
        client: &mut D,
        sinks: &mut [&mut dyn RecordSink],
    ) -> Result<RunSummary, RunError> {
        let abort = AbortSignal::new();
        self.run_with_signal(operations, client, sinks, &abort)
    }

    /// [`ConformanceEngine::run`] with an abort signal owned by the caller.
    ///
    /// # Errors
    ///
    /// See [`ConformanceEngine::run`].
    pub fn run_with_signal<D: Dispatch + ?Sized>(
        &self,
        operations: &[Operation],
        client: &mut D,
        sinks: &mut [&mut dyn RecordSink],
        abort: &AbortSignal,
    ) -> Result<RunSummary, RunError> {
        info!(
            seed = self.seed,
            operations = operations.len(),
            trials = self.trials,
            fail_fast = self.fail_fast,
            "run started"
        );

        let mut sampler = Sampler::new(self.seed);
        let mut report = RunReport::new();
        let mut outcomes = Vec::with_capacity(operations.len());

        for op in operations {
            if abort.is_raised() {
                break;
            }
            let outcome =
                self.run_operation(op, client, &mut sampler, &mut report, sinks, abort)?;
            outcomes.push(outcome);
        }

        let aborted = abort.is_raised();
        info!(
            passes = report.total_passes(),
            failures = report.total_failures(),
            aborted,
            "run finished"
        );
        Ok(RunSummary {
            report,
            outcomes,
            aborted,
            seed: self.seed,
        })
    }

    fn run_operation<D: Dispatch + ?Sized>(
        &self,
        op: &Operation,
        client: &mut D,
        sampler: &mut Sampler,
        report: &mut RunReport,
        sinks: &mut [&mut dyn RecordSink],
        abort: &AbortSignal,
    ) -> Result<OperationOutcome, RunError> {
        let label = op.label();
        let construction = |source: ConstructionError| RunError::Construction {
            operation: label.clone(),
            source,
        };

        let strategy = match self
            .factory
            .operation_strategy(op)
            .map_err(|e| construction(e.into()))?
        {
            OperationStrategy::Ready(strategy) => strategy,
            OperationStrategy::Unsupported { parameter } => {
                warn!(operation = %label, parameter = %parameter, "unsupported parameter type, skipping operation");
                return Ok(OperationOutcome {
                    label,
                    state: OperationState::Skipped { parameter },
                    trials: 0,
                    failures: 0,
                });
            }
        };

        emit(
            report,
            sinks,
            &Record::OperationStart {
                method: op.method.clone(),
                path: op.path.clone(),
            },
        )?;

        let mut trials = 0;
        let mut failures = 0;
        let mut state = OperationState::Completed;
        while trials < self.trials {
            if abort.is_raised() {
                state = OperationState::Aborted;
                break;
            }
            let params = sampler
                .draw(&strategy)
                .map_err(|e| construction(e.into()))?;
            let response = client.send(op, &params).map_err(|e| match e {
                DispatchError::Build(e) => construction(e.into()),
                DispatchError::Transport(source) => RunError::Transport {
                    operation: label.clone(),
                    source,
                },
            })?;
            trials += 1;
            debug!(
                operation = %label,
                trial = trials,
                status = response.status,
                params = %ParamsDisplay(&params),
                "trial"
            );

            match Verdict::classify(response.status, &op.documented) {
                Verdict::Pass => emit_trial(
                    report,
                    sinks,
                    &Record::Pass {
                        status: response.status,
                    },
                    &params,
                )?,
                Verdict::Fail => {
                    failures += 1;
                    emit_trial(
                        report,
                        sinks,
                        &Record::Fail {
                            status: response.status,
                            documented: op.documented.clone(),
                        },
                        &params,
                    )?;
                    if self.fail_fast {
                        warn!(operation = %label, status = response.status, "conformance failure, aborting run");
                        abort.raise();
                        state = OperationState::Aborted;
                        break;
                    }
                }
            }
        }

        Ok(OperationOutcome {
            label,
            state,
            trials,
            failures,
        })
    }
}

/// The live report sees a record first; every other sink then gets it
/// before the loop moves on.
fn emit(
    report: &mut RunReport,
    sinks: &mut [&mut dyn RecordSink],
    record: &Record,
) -> Result<(), ReportError> {
    report.accept(record)?;
    for sink in sinks.iter_mut() {
        sink.accept(record)?;
    }
    Ok(())
}

fn emit_trial(
    report: &mut RunReport,
    sinks: &mut [&mut dyn RecordSink],
    record: &Record,
    params: &ParamValues,
) -> Result<(), ReportError> {
    report.accept(record)?;
    for sink in sinks.iter_mut() {
        sink.accept_trial(record, params)?;
    }
    Ok(())
}

//! swagcheck-core: Schema model, value strategies and run reporting
//!
//! This crate holds everything a conformance run needs that does not touch
//! the network: the operation model, the descriptor → strategy mapping, the
//! record stream, and the aggregated report.

pub mod auth;
pub mod config;
pub mod descriptor;
pub mod dryrun;
pub mod model;
pub mod record;
pub mod report;
pub mod schema;
pub mod strategy;

pub use auth::{AuthMode, Credentials};
pub use config::{Config, ConfigError};
pub use descriptor::{StringFormat, TypeDescriptor};
pub use dryrun::{DryRunPlan, PlanStatus};
pub use model::{
    ApiKeyLocation, ApiSchema, CollectionFormat, DocumentedCodes, Location, Operation,
    ParamKey, ParameterSpec, SecurityScheme,
};
pub use record::{Record, RecordSink, ReportError, RunLog};
pub use report::{FailureEntry, OperationReport, RunReport};
pub use strategy::{
    OperationStrategy, ParamValues, ParamsDisplay, StrategyError, StrategyFactory,
};

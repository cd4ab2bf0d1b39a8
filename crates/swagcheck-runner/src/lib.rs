//! swagcheck-runner: schema loading, HTTP dispatch and the conformance run loop

pub mod client;
pub mod engine;
pub mod loader;
pub mod request;

pub use client::{
    Auth, ClientSettings, Dispatch, DispatchError, HttpClient, Response, RetryPolicy, SetupError,
    TransportError,
};
pub use engine::{
    AbortSignal, ConformanceEngine, DEFAULT_TRIALS, OperationOutcome, OperationState, RunError,
    RunSummary, Verdict,
};
pub use loader::{LoadError, SchemaSource};
pub use request::{BuildError, RequestPlan};
pub use reqwest::Url;

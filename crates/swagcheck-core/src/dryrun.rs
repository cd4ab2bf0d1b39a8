//! Dry run plan types
//!
//! Describes what a run *would* do without sending any requests.
//! Used for pre-flight validation and CI previews.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::model::{DocumentedCodes, Operation};
use crate::strategy::{OperationStrategy, StrategyFactory};

// ── Plan types ──

/// Complete dry run plan.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DryRunPlan {
    /// Per-operation execution plan, in schema order
    pub operations: Vec<OperationPlan>,
    /// Upper bound on requests sent (testable operations × trials)
    pub total_requests: u64,
}

/// Execution plan for a single operation.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct OperationPlan {
    /// Operation label, e.g. "POST /api/users"
    pub operation: String,
    /// HTTP method
    pub method: String,
    /// Path template
    pub path: String,
    /// Trials that would run
    pub trials: u32,
    pub status: PlanStatus,
    pub parameters: Vec<ParameterPlan>,
    pub documented: DocumentedCodes,
}

/// One declared parameter.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ParameterPlan {
    pub name: String,
    /// path, query, header, cookie, body or formData
    pub location: String,
    pub required: bool,
    /// Descriptor type, or `None` when unsupported
    pub kind: Option<String>,
}

/// Whether an operation would be tested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum PlanStatus {
    Testable,
    /// Skipped because this parameter's type is unsupported
    Skipped { parameter: String },
    /// Constraints that cannot be satisfied; a real run would abort here
    Invalid { reason: String },
}

impl DryRunPlan {
    /// Plan `operations` with `trials` trials each.
    #[must_use]
    pub fn build(operations: &[Operation], trials: u32) -> Self {
        let factory = StrategyFactory::new();
        let plans: Vec<OperationPlan> = operations
            .iter()
            .map(|op| {
                let status = match factory.operation_strategy(op) {
                    Ok(OperationStrategy::Ready(_)) => PlanStatus::Testable,
                    Ok(OperationStrategy::Unsupported { parameter }) => {
                        PlanStatus::Skipped { parameter }
                    }
                    Err(e) => PlanStatus::Invalid {
                        reason: e.to_string(),
                    },
                };
                let trials = if status == PlanStatus::Testable { trials } else { 0 };
                OperationPlan {
                    operation: op.label(),
                    method: op.method.clone(),
                    path: op.path.clone(),
                    trials,
                    status,
                    parameters: op
                        .parameters
                        .values()
                        .map(|p| ParameterPlan {
                            name: p.name.clone(),
                            location: p.location.to_string(),
                            required: p.required,
                            kind: p.descriptor.as_ref().map(|d| d.kind().to_string()),
                        })
                        .collect(),
                    documented: op.documented.clone(),
                }
            })
            .collect();

        let total_requests = plans.iter().map(|p| u64::from(p.trials)).sum();
        Self {
            operations: plans,
            total_requests,
        }
    }

    /// Operations that would be tested.
    #[must_use]
    pub fn testable(&self) -> usize {
        self.operations
            .iter()
            .filter(|p| p.status == PlanStatus::Testable)
            .count()
    }

    /// Returns true if any operation has unsatisfiable constraints.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.operations
            .iter()
            .any(|p| matches!(p.status, PlanStatus::Invalid { .. }))
    }

    // ── Display helpers ──

    /// Format as human-readable terminal output.
    #[must_use]
    pub fn to_terminal(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!(
            "Dry run: {} operations ({} testable), {} requests planned\n",
            self.operations.len(),
            self.testable(),
            self.total_requests,
        ));

        for op in &self.operations {
            match &op.status {
                PlanStatus::Testable => {
                    lines.push(format!("{} ({} trials):", op.operation, op.trials));
                }
                PlanStatus::Skipped { parameter } => lines.push(format!(
                    "{} [SKIP] unsupported input type for '{parameter}'",
                    op.operation
                )),
                PlanStatus::Invalid { reason } => {
                    lines.push(format!("{} [ERROR] {reason}", op.operation));
                }
            }
            for p in &op.parameters {
                let req = if p.required { ", required" } else { "" };
                let kind = p.kind.as_deref().unwrap_or("unsupported");
                lines.push(format!("  {} ({}{req}): {kind}", p.name, p.location));
            }
            lines.push(format!("  Documented: {}", op.documented));
            lines.push(String::new());
        }

        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{IntegerConstraints, TypeDescriptor};
    use crate::model::{Location, ParameterSpec};

    fn operations() -> Vec<Operation> {
        vec![
            Operation::new("get", "/items/{id}")
                .with_parameter(ParameterSpec::new(
                    "id",
                    Location::Path,
                    Some(TypeDescriptor::Integer(IntegerConstraints::default())),
                ))
                .with_documented(DocumentedCodes::from_codes([200, 404])),
            Operation::new("post", "/upload")
                .with_parameter(ParameterSpec::new("file", Location::FormData, None)),
            Operation::new("get", "/broken").with_parameter(ParameterSpec::new(
                "n",
                Location::Query,
                Some(TypeDescriptor::Integer(IntegerConstraints {
                    minimum: Some(3),
                    maximum: Some(1),
                    ..Default::default()
                })),
            )),
        ]
    }

    #[test]
    fn plan_statuses() {
        let plan = DryRunPlan::build(&operations(), 20);
        assert_eq!(plan.operations[0].status, PlanStatus::Testable);
        assert_eq!(
            plan.operations[1].status,
            PlanStatus::Skipped {
                parameter: "file".into()
            }
        );
        assert!(matches!(plan.operations[2].status, PlanStatus::Invalid { .. }));
        assert_eq!(plan.total_requests, 20);
        assert_eq!(plan.testable(), 1);
        assert!(plan.has_errors());
    }

    #[test]
    fn plan_terminal_output() {
        let text = DryRunPlan::build(&operations(), 20).to_terminal();
        assert!(text.contains("3 operations (1 testable), 20 requests planned"));
        assert!(text.contains("GET /items/{id} (20 trials):"));
        assert!(text.contains("  id (path, required): integer"));
        assert!(text.contains("  Documented: {200, 404}"));
        assert!(text.contains("POST /upload [SKIP] unsupported input type for 'file'"));
        assert!(text.contains("  file (formData): unsupported"));
        assert!(text.contains("GET /broken [ERROR] parameter 'n': empty range"));
    }

    #[test]
    fn plan_serializes_tagged_status() {
        let plan = DryRunPlan::build(&operations(), 2);
        let json = serde_json::to_value(&plan).unwrap();
        assert_eq!(json["operations"][1]["status"]["state"], "skipped");
        assert_eq!(json["operations"][1]["status"]["parameter"], "file");
    }
}

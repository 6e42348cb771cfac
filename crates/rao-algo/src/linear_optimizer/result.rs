use crate::linear_problem::LinearProblemStatus;
use rao_core::{
    FlowResult, ObjectiveFunctionResult, RangeActionActivationResult, SensitivityResult,
};
use serde::Serialize;
use std::fmt;

/// Outcome of an iterating linear optimisation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LinearOptimizationStatus {
    Optimal,
    /// A solve failed after the first iteration; the result holds the best
    /// point reached before
    Feasible,
    Infeasible,
    Unbounded,
    Abnormal,
    NotSolved,
    SensitivityComputationFailed,
    MaxIterationReached,
}

impl From<LinearProblemStatus> for LinearOptimizationStatus {
    fn from(status: LinearProblemStatus) -> Self {
        match status {
            LinearProblemStatus::Optimal => LinearOptimizationStatus::Optimal,
            LinearProblemStatus::Infeasible => LinearOptimizationStatus::Infeasible,
            LinearProblemStatus::Unbounded => LinearOptimizationStatus::Unbounded,
            LinearProblemStatus::Abnormal => LinearOptimizationStatus::Abnormal,
            LinearProblemStatus::NotSolved => LinearOptimizationStatus::NotSolved,
        }
    }
}

impl fmt::Display for LinearOptimizationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinearOptimizationStatus::Optimal => write!(f, "OPTIMAL"),
            LinearOptimizationStatus::Feasible => write!(f, "FEASIBLE"),
            LinearOptimizationStatus::Infeasible => write!(f, "INFEASIBLE"),
            LinearOptimizationStatus::Unbounded => write!(f, "UNBOUNDED"),
            LinearOptimizationStatus::Abnormal => write!(f, "ABNORMAL"),
            LinearOptimizationStatus::NotSolved => write!(f, "NOT_SOLVED"),
            LinearOptimizationStatus::SensitivityComputationFailed => {
                write!(f, "SENSITIVITY_COMPUTATION_FAILED")
            }
            LinearOptimizationStatus::MaxIterationReached => write!(f, "MAX_ITERATION_REACHED"),
        }
    }
}

/// Best operating point found by the linear optimiser, with the flows and
/// sensitivities computed at that point.
#[derive(Debug, Clone, Serialize)]
pub struct LinearOptimizationResult {
    pub status: LinearOptimizationStatus,
    /// Number of linear problems solved (MIP re-solves excluded)
    pub iterations: usize,
    pub flow_result: FlowResult,
    pub sensitivity_result: SensitivityResult,
    pub activation: RangeActionActivationResult,
    pub objective: ObjectiveFunctionResult,
}

impl LinearOptimizationResult {
    pub fn cost(&self) -> f64 {
        self.objective.cost()
    }

    pub fn functional_cost(&self) -> f64 {
        self.objective.functional_cost
    }

    pub fn virtual_cost(&self) -> f64 {
        self.objective.virtual_cost()
    }
}

//! Objective function contract and the margin-based implementation.
//!
//! The functional cost is the opposite of the worst margin among optimised
//! CNECs, so minimising the cost maximises the minimum margin. Virtual costs
//! penalise situations the optimiser is allowed to reach but should avoid.

use crate::cnec::{FlowCnec, Unit};
use crate::perimeter::OptimizationPerimeter;
use crate::results::{
    ComputationStatus, FlowResult, ObjectiveFunctionResult, RangeActionActivationResult,
    SensitivityResult,
};
use std::cmp::Ordering;
use std::sync::Arc;

pub const SENSITIVITY_FAILURE_COST: &str = "sensitivity-failure-cost";
pub const MNEC_COST: &str = "mnec-cost";

/// Evaluates the cost of a network situation.
pub trait ObjectiveFunction: Send + Sync {
    fn evaluate(
        &self,
        flow_result: &FlowResult,
        activation: &RangeActionActivationResult,
        sensitivity_result: &SensitivityResult,
        status: ComputationStatus,
    ) -> ObjectiveFunctionResult;
}

#[derive(Debug, Clone)]
struct MnecEvaluation {
    initial_flows: FlowResult,
    acceptable_margin_decrease: f64,
    violation_cost: f64,
}

/// Max-min margin (absolute or relative) objective.
#[derive(Debug, Clone)]
pub struct MarginObjectiveFunction {
    optimized_cnecs: Vec<Arc<FlowCnec>>,
    monitored_cnecs: Vec<Arc<FlowCnec>>,
    unit: Unit,
    relative: bool,
    sensitivity_failure_overcost: f64,
    mnec: Option<MnecEvaluation>,
}

impl MarginObjectiveFunction {
    pub fn new(perimeter: &OptimizationPerimeter, unit: Unit) -> Self {
        Self {
            optimized_cnecs: perimeter.optimized_flow_cnecs().cloned().collect(),
            monitored_cnecs: perimeter.monitored_flow_cnecs().cloned().collect(),
            unit,
            relative: false,
            sensitivity_failure_overcost: 10_000.0,
            mnec: None,
        }
    }

    /// Use PTDF-relative margins for positive margins.
    pub fn relative(mut self) -> Self {
        self.relative = true;
        self
    }

    pub fn with_sensitivity_failure_overcost(mut self, overcost: f64) -> Self {
        self.sensitivity_failure_overcost = overcost;
        self
    }

    /// Penalise monitored CNECs whose margin decreases by more than
    /// `acceptable_margin_decrease` (MW) compared to `initial_flows`.
    pub fn with_mnec(
        mut self,
        initial_flows: FlowResult,
        acceptable_margin_decrease: f64,
        violation_cost: f64,
    ) -> Self {
        self.mnec = Some(MnecEvaluation {
            initial_flows,
            acceptable_margin_decrease,
            violation_cost,
        });
        self
    }

    fn margin(&self, flow_result: &FlowResult, cnec: &FlowCnec) -> Option<f64> {
        let margin = if self.relative {
            flow_result.relative_margin(cnec, self.unit)
        } else {
            flow_result.margin(cnec, self.unit)
        };
        margin.ok().filter(|m| *m < f64::MAX)
    }

    fn mnec_violations(&self, flow_result: &FlowResult) -> Vec<(String, f64)> {
        let Some(mnec) = &self.mnec else {
            return Vec::new();
        };
        let mut violations: Vec<(String, f64)> = self
            .monitored_cnecs
            .iter()
            .filter_map(|cnec| {
                let initial = mnec.initial_flows.margin(cnec, Unit::Megawatt).ok()?;
                let current = flow_result.margin(cnec, Unit::Megawatt).ok()?;
                let allowed = (initial - mnec.acceptable_margin_decrease).min(0.0);
                let violation = (allowed - current).max(0.0);
                (violation > 0.0).then(|| (cnec.id.clone(), violation))
            })
            .collect();
        violations.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        violations
    }
}

impl ObjectiveFunction for MarginObjectiveFunction {
    fn evaluate(
        &self,
        flow_result: &FlowResult,
        _activation: &RangeActionActivationResult,
        _sensitivity_result: &SensitivityResult,
        status: ComputationStatus,
    ) -> ObjectiveFunctionResult {
        let mut margins: Vec<(&str, f64)> = self
            .optimized_cnecs
            .iter()
            .filter_map(|cnec| self.margin(flow_result, cnec).map(|m| (cnec.id.as_str(), m)))
            .collect();
        margins.sort_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.0.cmp(b.0))
        });

        let functional_cost = margins.first().map_or(0.0, |(_, m)| -m);
        let mut result = ObjectiveFunctionResult::new(functional_cost);
        result.most_limiting_elements = margins.iter().map(|(id, _)| id.to_string()).collect();

        let failure_cost = if status == ComputationStatus::Failure {
            self.sensitivity_failure_overcost
        } else {
            0.0
        };
        result
            .virtual_costs
            .insert(SENSITIVITY_FAILURE_COST.to_string(), failure_cost);

        if let Some(mnec) = &self.mnec {
            let violations = self.mnec_violations(flow_result);
            let cost = violations.iter().map(|(_, v)| v).sum::<f64>() * mnec.violation_cost;
            result.virtual_costs.insert(MNEC_COST.to_string(), cost);
            result.costly_elements.insert(
                MNEC_COST.to_string(),
                violations.into_iter().map(|(id, _)| id).collect(),
            );
        }
        result
    }
}

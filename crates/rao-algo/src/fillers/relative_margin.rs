//! Maximisation of the minimum relative margin.
//!
//! Positive margins are divided by the absolute PTDF zonal sum of the CNEC
//! (floored by `ptdf_sum_lower_bound`), computed once on the pre-perimeter
//! flows. The absolute minimum margin is kept but forced non-positive, so it
//! only drives the solution while some CNEC is overloaded:
//!
//! ```text
//! F[c] + MM / k <= ub[c]               MM <= 0
//! F[c] + MRM * ptdf[c] / k <= ub[c]    MRM <= max threshold / ptdf floor
//! ```
//!
//! (and the symmetric constraints on the lower thresholds), with
//! `-MM - MRM` in the objective.

use super::margin::add_margin_constraints;
use super::ProblemFiller;
use crate::linear_problem::{ConstraintKey, LinearProblem, VariableKey, VariableKind};
use rao_core::{
    largest_cnec_threshold, FlowCnec, FlowResult, RangeActionActivationResult, RaoResult,
    SensitivityResult, Unit,
};
use std::sync::Arc;

pub struct MaxMinRelativeMarginFiller {
    optimized_cnecs: Vec<Arc<FlowCnec>>,
    pre_perimeter_flows: FlowResult,
    unit: Unit,
    ptdf_sum_lower_bound: f64,
}

impl MaxMinRelativeMarginFiller {
    pub fn new(
        optimized_cnecs: Vec<Arc<FlowCnec>>,
        pre_perimeter_flows: FlowResult,
        unit: Unit,
        ptdf_sum_lower_bound: f64,
    ) -> Self {
        Self {
            optimized_cnecs,
            pre_perimeter_flows,
            unit,
            ptdf_sum_lower_bound,
        }
    }

    fn ptdf_sum(&self, cnec: &FlowCnec) -> f64 {
        self.pre_perimeter_flows
            .ptdf_zonal_sum(&cnec.id)
            .max(self.ptdf_sum_lower_bound)
    }

    /// Upper bound of the relative margin variable, in the objective unit.
    fn max_relative_margin(&self) -> f64 {
        let conversion = self
            .optimized_cnecs
            .iter()
            .map(|cnec| cnec.unit_conversion(self.unit))
            .fold(1.0, f64::max);
        largest_cnec_threshold(self.optimized_cnecs.iter().map(|c| c.as_ref())) * conversion
            / self.ptdf_sum_lower_bound
    }
}

impl ProblemFiller for MaxMinRelativeMarginFiller {
    fn name(&self) -> &'static str {
        "max-min-relative-margin"
    }

    fn fill(
        &self,
        problem: &mut LinearProblem,
        _flow_result: &FlowResult,
        _sensitivity_result: &SensitivityResult,
        _activation: &RangeActionActivationResult,
    ) -> RaoResult<()> {
        let unit = self.unit;
        let margin = problem.add_variable(
            VariableKey::MinimumMargin,
            -LinearProblem::infinity(),
            0.0,
            VariableKind::Continuous,
        )?;
        let relative_margin = problem.add_variable(
            VariableKey::MinimumRelativeMargin,
            -LinearProblem::infinity(),
            self.max_relative_margin(),
            VariableKind::Continuous,
        )?;

        add_margin_constraints(
            problem,
            &self.optimized_cnecs,
            margin,
            |cnec, extension| ConstraintKey::MinimumMargin {
                cnec: cnec.id.clone(),
                extension,
            },
            |cnec| 1.0 / cnec.unit_conversion(unit),
        )?;
        add_margin_constraints(
            problem,
            &self.optimized_cnecs,
            relative_margin,
            |cnec, extension| ConstraintKey::MinimumRelativeMargin {
                cnec: cnec.id.clone(),
                extension,
            },
            |cnec| self.ptdf_sum(cnec) / cnec.unit_conversion(unit),
        )?;

        problem.set_objective_coefficient(margin, -1.0);
        problem.set_objective_coefficient(relative_margin, -1.0);
        Ok(())
    }

    fn update_between_sensi_iteration(
        &self,
        _problem: &mut LinearProblem,
        _flow_result: &FlowResult,
        _sensitivity_result: &SensitivityResult,
        _activation: &RangeActionActivationResult,
        _iteration: usize,
    ) -> RaoResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fillers::test_support::{activation, cnec, flows, sensitivities};
    use crate::linear_problem::{LpSolverKind, MarginExtension};

    fn problem_with_flow() -> LinearProblem {
        let mut problem = LinearProblem::new(LpSolverKind::Microlp);
        problem
            .add_variable(
                VariableKey::Flow {
                    cnec: "cnec".into(),
                },
                -LinearProblem::infinity(),
                LinearProblem::infinity(),
                VariableKind::Continuous,
            )
            .unwrap();
        problem
    }

    #[test]
    fn test_relative_constraints_use_floored_ptdf() {
        let mut pre_perimeter = flows(&[("cnec", 100.0)]);
        pre_perimeter.set_ptdf_zonal_sum("cnec", 0.004);
        let mut problem = problem_with_flow();
        MaxMinRelativeMarginFiller::new(
            vec![cnec("cnec", -500.0, 500.0)],
            pre_perimeter,
            Unit::Megawatt,
            0.01,
        )
        .fill(&mut problem, &flows(&[]), &sensitivities(&[]), &activation(&[]))
        .unwrap();

        let margin = problem.variable(&VariableKey::MinimumMargin).unwrap();
        let relative = problem.variable(&VariableKey::MinimumRelativeMargin).unwrap();
        assert_eq!(problem.variable_bounds(margin).1, 0.0);
        assert!((problem.variable_bounds(relative).1 - 50_000.0).abs() < 1e-6);

        let above = problem
            .constraint(&ConstraintKey::MinimumRelativeMargin {
                cnec: "cnec".into(),
                extension: MarginExtension::AboveThreshold,
            })
            .unwrap();
        assert!((problem.coefficient(above, relative) - 0.01).abs() < 1e-12);
        assert_eq!(problem.objective_coefficient(relative), -1.0);
        assert_eq!(problem.objective_coefficient(margin), -1.0);
    }

    #[test]
    fn test_ptdf_above_floor_is_kept() {
        let mut pre_perimeter = flows(&[("cnec", 100.0)]);
        pre_perimeter.set_ptdf_zonal_sum("cnec", -0.9);
        let mut problem = problem_with_flow();
        MaxMinRelativeMarginFiller::new(
            vec![cnec("cnec", -500.0, 500.0)],
            pre_perimeter,
            Unit::Megawatt,
            0.01,
        )
        .fill(&mut problem, &flows(&[]), &sensitivities(&[]), &activation(&[]))
        .unwrap();

        let relative = problem.variable(&VariableKey::MinimumRelativeMargin).unwrap();
        let below = problem
            .constraint(&ConstraintKey::MinimumRelativeMargin {
                cnec: "cnec".into(),
                extension: MarginExtension::BelowThreshold,
            })
            .unwrap();
        assert!((problem.coefficient(below, relative) - 0.9).abs() < 1e-12);
    }
}

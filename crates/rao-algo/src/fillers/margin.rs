//! Maximisation of the minimum margin.
//!
//! With `k` the MW-to-unit conversion factor of a CNEC:
//!
//! ```text
//! F[c] + MM / k <= ub[c]       (above threshold)
//! -F[c] + MM / k <= -lb[c]     (below threshold)
//! ```
//!
//! and `-MM` in the objective.

use super::ProblemFiller;
use crate::linear_problem::{
    ConstraintKey, LinearProblem, MarginExtension, VariableId, VariableKey, VariableKind,
};
use rao_core::{
    FlowCnec, FlowResult, RangeActionActivationResult, RaoResult, SensitivityResult, Unit,
};
use std::sync::Arc;

pub struct MaxMinMarginFiller {
    optimized_cnecs: Vec<Arc<FlowCnec>>,
    unit: Unit,
}

impl MaxMinMarginFiller {
    pub fn new(optimized_cnecs: Vec<Arc<FlowCnec>>, unit: Unit) -> Self {
        Self {
            optimized_cnecs,
            unit,
        }
    }
}

/// Write one margin constraint per existing threshold of each CNEC.
///
/// `make_key` builds the constraint key and `coefficient` the factor of
/// `margin` in the constraint of a given CNEC.
pub(super) fn add_margin_constraints(
    problem: &mut LinearProblem,
    cnecs: &[Arc<FlowCnec>],
    margin: VariableId,
    make_key: impl Fn(&FlowCnec, MarginExtension) -> ConstraintKey,
    coefficient: impl Fn(&FlowCnec) -> f64,
) -> RaoResult<()> {
    for cnec in cnecs {
        let flow = problem.require_variable(&VariableKey::Flow {
            cnec: cnec.id.clone(),
        })?;
        let factor = coefficient(cnec);
        if let Some(lb) = cnec.lower_bound_mw {
            let below = problem.add_constraint(
                make_key(cnec, MarginExtension::BelowThreshold),
                -LinearProblem::infinity(),
                -lb,
            )?;
            problem.set_coefficient(below, flow, -1.0);
            problem.set_coefficient(below, margin, factor);
        }
        if let Some(ub) = cnec.upper_bound_mw {
            let above = problem.add_constraint(
                make_key(cnec, MarginExtension::AboveThreshold),
                -LinearProblem::infinity(),
                ub,
            )?;
            problem.set_coefficient(above, flow, 1.0);
            problem.set_coefficient(above, margin, factor);
        }
    }
    Ok(())
}

impl ProblemFiller for MaxMinMarginFiller {
    fn name(&self) -> &'static str {
        "max-min-margin"
    }

    fn fill(
        &self,
        problem: &mut LinearProblem,
        _flow_result: &FlowResult,
        _sensitivity_result: &SensitivityResult,
        _activation: &RangeActionActivationResult,
    ) -> RaoResult<()> {
        let margin = problem.add_variable(
            VariableKey::MinimumMargin,
            -LinearProblem::infinity(),
            LinearProblem::infinity(),
            VariableKind::Continuous,
        )?;
        let unit = self.unit;
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
        problem.set_objective_coefficient(margin, -1.0);
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

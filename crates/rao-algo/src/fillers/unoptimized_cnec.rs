//! CNECs the optimiser must not be driven by.
//!
//! Two families of CNECs are taken out of the minimum margin definition
//! unless their margin actually gets worse:
//!
//! - CNECs of an operator listed in `operators_not_to_optimize`: they only
//!   count once their margin drops below its pre-perimeter value
//!   (margin-decrease rule);
//! - CNECs in series with a PST: they only count when the PST alone could
//!   not bring them back within their thresholds (PST-limitation rule).
//!
//! A binary `B[c]` per CNEC switches it on (`B = 1`) in the minimum margin
//! constraints, which are relaxed by a big-M term otherwise.

use super::ProblemFiller;
use crate::linear_problem::{
    ConstraintKey, LinearProblem, MarginExtension, VariableId, VariableKey, VariableKind,
};
use crate::parameters::UnoptimizedCnecParameters;
use rao_core::{
    largest_cnec_threshold, FlowCnec, FlowResult, RangeAction, RangeActionActivationResult,
    RaoResult, SensitivityResult, Unit,
};
use std::sync::Arc;
use tracing::debug;

enum Rule {
    MarginDecrease,
    PstLimitation(Arc<RangeAction>),
}

pub struct UnoptimizedCnecFiller {
    cnecs: Vec<(Arc<FlowCnec>, Rule)>,
    pre_perimeter_flows: FlowResult,
    /// Big-M of the margin-decrease and PST-limitation constraints, in MW
    constraint_big_m: f64,
    /// Relaxation added to the minimum margin constraints, in MW
    relaxation: f64,
}

impl UnoptimizedCnecFiller {
    /// `optimized_cnecs` is the full list of optimized CNECs of the
    /// perimeter; only those matching one of the two rules are handled.
    pub fn new(
        optimized_cnecs: &[Arc<FlowCnec>],
        range_actions: &[Arc<RangeAction>],
        pre_perimeter_flows: FlowResult,
        parameters: &UnoptimizedCnecParameters,
    ) -> Self {
        let highest_threshold = largest_cnec_threshold(optimized_cnecs.iter().map(|c| c.as_ref()));
        let cnecs = optimized_cnecs
            .iter()
            .filter_map(|cnec| {
                if let Some(pst_id) = parameters.cnecs_in_series_with_psts.get(&cnec.id) {
                    let pst = range_actions.iter().find(|ra| &ra.id == pst_id);
                    match pst {
                        Some(pst) => return Some((cnec.clone(), Rule::PstLimitation(pst.clone()))),
                        None => debug!(
                            cnec = %cnec.id,
                            pst = %pst_id,
                            "PST in series is not available in this perimeter"
                        ),
                    }
                }
                let ignored = cnec
                    .operator
                    .as_ref()
                    .is_some_and(|op| parameters.operators_not_to_optimize.contains(op));
                ignored.then(|| (cnec.clone(), Rule::MarginDecrease))
            })
            .collect();
        Self {
            cnecs,
            pre_perimeter_flows,
            constraint_big_m: parameters.big_m.margin_decrease_factor * highest_threshold,
            relaxation: parameters.big_m.minimum_margin_relaxation_factor * highest_threshold,
        }
    }

    fn add_margin_decrease_constraints(
        &self,
        problem: &mut LinearProblem,
        cnec: &FlowCnec,
        binary: VariableId,
    ) -> RaoResult<()> {
        let flow = problem.require_variable(&VariableKey::Flow {
            cnec: cnec.id.clone(),
        })?;
        let pre_perimeter_margin = self.pre_perimeter_flows.margin(cnec, Unit::Megawatt)?;
        if let Some(lb) = cnec.lower_bound_mw {
            // F - lb >= pre-perimeter margin, unless B = 1
            let below = problem.add_constraint(
                ConstraintKey::DontOptimizeCnec {
                    cnec: cnec.id.clone(),
                    extension: MarginExtension::BelowThreshold,
                },
                pre_perimeter_margin + lb,
                LinearProblem::infinity(),
            )?;
            problem.set_coefficient(below, flow, 1.0);
            problem.set_coefficient(below, binary, self.constraint_big_m);
        }
        if let Some(ub) = cnec.upper_bound_mw {
            let above = problem.add_constraint(
                ConstraintKey::DontOptimizeCnec {
                    cnec: cnec.id.clone(),
                    extension: MarginExtension::AboveThreshold,
                },
                pre_perimeter_margin - ub,
                LinearProblem::infinity(),
            )?;
            problem.set_coefficient(above, flow, -1.0);
            problem.set_coefficient(above, binary, self.constraint_big_m);
        }
        Ok(())
    }

    /// Flow without the contribution of the PST, plus its most favourable
    /// contribution, must respect the thresholds unless B = 1.
    fn write_pst_limitation_constraints(
        &self,
        problem: &mut LinearProblem,
        cnec: &FlowCnec,
        pst: &RangeAction,
        binary: VariableId,
        sensitivity_result: &SensitivityResult,
    ) -> RaoResult<()> {
        let flow = problem.require_variable(&VariableKey::Flow {
            cnec: cnec.id.clone(),
        })?;
        let setpoint = problem.require_variable(&VariableKey::Setpoint {
            range_action: pst.id.clone(),
        })?;
        let sensitivity = sensitivity_result.sensitivity(&cnec.id, &pst.id);
        let (min, max) = (pst.min_admissible_setpoint(), pst.max_admissible_setpoint());

        if let Some(lb) = cnec.lower_bound_mw {
            let best = if sensitivity >= 0.0 { max * sensitivity } else { min * sensitivity };
            let key = ConstraintKey::DontOptimizeCnec {
                cnec: cnec.id.clone(),
                extension: MarginExtension::BelowThreshold,
            };
            let below = match problem.constraint(&key) {
                Some(id) => id,
                None => problem.add_constraint(key, lb - best, LinearProblem::infinity())?,
            };
            problem.set_constraint_bounds(below, lb - best, LinearProblem::infinity())?;
            problem.set_coefficient(below, flow, 1.0);
            problem.set_coefficient(below, setpoint, -sensitivity);
            problem.set_coefficient(below, binary, self.constraint_big_m);
        }
        if let Some(ub) = cnec.upper_bound_mw {
            let best = if sensitivity >= 0.0 { min * sensitivity } else { max * sensitivity };
            let key = ConstraintKey::DontOptimizeCnec {
                cnec: cnec.id.clone(),
                extension: MarginExtension::AboveThreshold,
            };
            let above = match problem.constraint(&key) {
                Some(id) => id,
                None => problem.add_constraint(key, -ub + best, LinearProblem::infinity())?,
            };
            problem.set_constraint_bounds(above, -ub + best, LinearProblem::infinity())?;
            problem.set_coefficient(above, flow, -1.0);
            problem.set_coefficient(above, setpoint, sensitivity);
            problem.set_coefficient(above, binary, self.constraint_big_m);
        }
        Ok(())
    }

    /// Let the minimum margin constraints of `cnec` go when B = 0.
    fn relax_minimum_margin_constraints(
        &self,
        problem: &mut LinearProblem,
        cnec: &FlowCnec,
        binary: VariableId,
    ) {
        for extension in [MarginExtension::BelowThreshold, MarginExtension::AboveThreshold] {
            let keys = [
                ConstraintKey::MinimumMargin {
                    cnec: cnec.id.clone(),
                    extension,
                },
                ConstraintKey::MinimumRelativeMargin {
                    cnec: cnec.id.clone(),
                    extension,
                },
            ];
            for key in keys {
                if let Some(constraint) = problem.constraint(&key) {
                    let (_, ub) = problem.constraint_bounds(constraint);
                    problem.set_coefficient(constraint, binary, self.relaxation);
                    problem.set_constraint_ub(constraint, ub + self.relaxation);
                }
            }
        }
    }
}

impl ProblemFiller for UnoptimizedCnecFiller {
    fn name(&self) -> &'static str {
        "unoptimized-cnec"
    }

    fn fill(
        &self,
        problem: &mut LinearProblem,
        _flow_result: &FlowResult,
        sensitivity_result: &SensitivityResult,
        _activation: &RangeActionActivationResult,
    ) -> RaoResult<()> {
        for (cnec, rule) in &self.cnecs {
            let binary = problem.add_variable(
                VariableKey::OptimizeCnecBinary {
                    cnec: cnec.id.clone(),
                },
                0.0,
                1.0,
                VariableKind::Binary,
            )?;
            match rule {
                Rule::MarginDecrease => self.add_margin_decrease_constraints(problem, cnec, binary)?,
                Rule::PstLimitation(pst) => self.write_pst_limitation_constraints(
                    problem,
                    cnec,
                    pst,
                    binary,
                    sensitivity_result,
                )?,
            }
            self.relax_minimum_margin_constraints(problem, cnec, binary);
        }
        Ok(())
    }

    fn update_between_sensi_iteration(
        &self,
        problem: &mut LinearProblem,
        _flow_result: &FlowResult,
        sensitivity_result: &SensitivityResult,
        _activation: &RangeActionActivationResult,
        _iteration: usize,
    ) -> RaoResult<()> {
        for (cnec, rule) in &self.cnecs {
            if let Rule::PstLimitation(pst) = rule {
                let binary = problem.require_variable(&VariableKey::OptimizeCnecBinary {
                    cnec: cnec.id.clone(),
                })?;
                self.write_pst_limitation_constraints(
                    problem,
                    cnec,
                    pst,
                    binary,
                    sensitivity_result,
                )?;
            }
        }
        Ok(())
    }
}

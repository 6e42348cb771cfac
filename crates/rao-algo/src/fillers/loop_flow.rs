//! Maximum loop-flow constraints.
//!
//! The loop flow of a CNEC is its flow minus its commercial flow. It must
//! stay below the larger of its threshold and its initial value plus the
//! acceptable increase; a penalised violation variable absorbs any excess:
//!
//! ```text
//! F[c] - V[c] <= bound + commercial + 0.01
//! F[c] + V[c] >= -bound + commercial - 0.01
//! ```
//!
//! Commercial flows move with the operating point and are refreshed at
//! each sensitivity iteration.

use super::ProblemFiller;
use crate::linear_problem::{AbsExtension, ConstraintKey, LinearProblem, VariableKey, VariableKind};
use crate::parameters::LoopFlowParameters;
use rao_core::{
    FlowCnec, FlowResult, RangeActionActivationResult, RaoError, RaoResult, SensitivityResult,
};
use std::sync::Arc;

/// Slack avoiding infeasibilities due to rounding on tight loop-flow bounds
const LOOP_FLOW_TOLERANCE: f64 = 0.01;

pub struct MaxLoopFlowFiller {
    loop_flow_cnecs: Vec<Arc<FlowCnec>>,
    initial_flows: FlowResult,
    parameters: LoopFlowParameters,
}

impl MaxLoopFlowFiller {
    pub fn new(
        loop_flow_cnecs: Vec<Arc<FlowCnec>>,
        initial_flows: FlowResult,
        parameters: LoopFlowParameters,
    ) -> Self {
        Self {
            loop_flow_cnecs,
            initial_flows,
            parameters,
        }
    }

    fn loop_flow_bound(&self, cnec: &FlowCnec) -> RaoResult<f64> {
        let threshold = cnec.loop_flow_threshold_mw.ok_or_else(|| {
            RaoError::Validation(format!("CNEC '{}' has no loop-flow threshold", cnec.id))
        })?;
        let initial = self.initial_flows.loop_flow(&cnec.id)?.abs();
        Ok(threshold.max(initial + self.parameters.acceptable_increase)
            - self.parameters.constraint_adjustment_coefficient)
    }

    fn write_bounds(&self, problem: &mut LinearProblem, flow_result: &FlowResult) -> RaoResult<()> {
        for cnec in &self.loop_flow_cnecs {
            let bound = self.loop_flow_bound(cnec)?;
            let commercial = flow_result.commercial_flow(&cnec.id);
            let positive = problem.require_constraint(&ConstraintKey::LoopFlowViolation {
                cnec: cnec.id.clone(),
                extension: AbsExtension::Positive,
            })?;
            let negative = problem.require_constraint(&ConstraintKey::LoopFlowViolation {
                cnec: cnec.id.clone(),
                extension: AbsExtension::Negative,
            })?;
            problem.set_constraint_bounds(
                positive,
                -LinearProblem::infinity(),
                bound + commercial + LOOP_FLOW_TOLERANCE,
            )?;
            problem.set_constraint_bounds(
                negative,
                -bound + commercial - LOOP_FLOW_TOLERANCE,
                LinearProblem::infinity(),
            )?;
        }
        Ok(())
    }
}

impl ProblemFiller for MaxLoopFlowFiller {
    fn name(&self) -> &'static str {
        "max-loop-flow"
    }

    fn fill(
        &self,
        problem: &mut LinearProblem,
        flow_result: &FlowResult,
        _sensitivity_result: &SensitivityResult,
        _activation: &RangeActionActivationResult,
    ) -> RaoResult<()> {
        for cnec in &self.loop_flow_cnecs {
            let flow = problem.require_variable(&VariableKey::Flow {
                cnec: cnec.id.clone(),
            })?;
            let violation = problem.add_variable(
                VariableKey::LoopFlowViolation {
                    cnec: cnec.id.clone(),
                },
                0.0,
                LinearProblem::infinity(),
                VariableKind::Continuous,
            )?;
            let positive = problem.add_constraint(
                ConstraintKey::LoopFlowViolation {
                    cnec: cnec.id.clone(),
                    extension: AbsExtension::Positive,
                },
                -LinearProblem::infinity(),
                LinearProblem::infinity(),
            )?;
            problem.set_coefficient(positive, flow, 1.0);
            problem.set_coefficient(positive, violation, -1.0);
            let negative = problem.add_constraint(
                ConstraintKey::LoopFlowViolation {
                    cnec: cnec.id.clone(),
                    extension: AbsExtension::Negative,
                },
                -LinearProblem::infinity(),
                LinearProblem::infinity(),
            )?;
            problem.set_coefficient(negative, flow, 1.0);
            problem.set_coefficient(negative, violation, 1.0);
            problem.set_objective_coefficient(violation, self.parameters.violation_cost);
        }
        self.write_bounds(problem, flow_result)
    }

    fn update_between_sensi_iteration(
        &self,
        problem: &mut LinearProblem,
        flow_result: &FlowResult,
        _sensitivity_result: &SensitivityResult,
        _activation: &RangeActionActivationResult,
        _iteration: usize,
    ) -> RaoResult<()> {
        self.write_bounds(problem, flow_result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fillers::test_support::{activation, flows, sensitivities};
    use crate::linear_problem::LpSolverKind;
    use rao_core::State;

    fn setup(acceptable_increase: f64) -> (LinearProblem, MaxLoopFlowFiller) {
        let cnec = Arc::new(
            FlowCnec::new("tie-line", "tie", State::preventive())
                .with_bounds(Some(-1000.0), Some(1000.0))
                .with_loop_flow_threshold(100.0),
        );
        let mut problem = LinearProblem::new(LpSolverKind::Microlp);
        problem
            .add_variable(
                VariableKey::Flow {
                    cnec: "tie-line".into(),
                },
                -LinearProblem::infinity(),
                LinearProblem::infinity(),
                VariableKind::Continuous,
            )
            .unwrap();
        // initial loop flow 130 - 40 = 90
        let mut initial = flows(&[("tie-line", 130.0)]);
        initial.set_commercial_flow("tie-line", 40.0);
        let parameters = LoopFlowParameters {
            acceptable_increase,
            violation_cost: 10.0,
            constraint_adjustment_coefficient: 5.0,
        };
        (problem, MaxLoopFlowFiller::new(vec![cnec], initial, parameters))
    }

    fn bounds(problem: &LinearProblem) -> (f64, f64) {
        let positive = problem
            .constraint(&ConstraintKey::LoopFlowViolation {
                cnec: "tie-line".into(),
                extension: AbsExtension::Positive,
            })
            .unwrap();
        let negative = problem
            .constraint(&ConstraintKey::LoopFlowViolation {
                cnec: "tie-line".into(),
                extension: AbsExtension::Negative,
            })
            .unwrap();
        (problem.constraint_bounds(negative).0, problem.constraint_bounds(positive).1)
    }

    #[test]
    fn test_threshold_bound() {
        let (mut problem, filler) = setup(0.0);
        let mut current = flows(&[("tie-line", 150.0)]);
        current.set_commercial_flow("tie-line", 49.0);
        filler
            .fill(&mut problem, &current, &sensitivities(&[]), &activation(&[]))
            .unwrap();
        let (lb, ub) = bounds(&problem);
        assert!((lb - (-(100.0 - 5.0) + 49.0 - 0.01)).abs() < 1e-9);
        assert!((ub - ((100.0 - 5.0) + 49.0 + 0.01)).abs() < 1e-9);

        let violation = problem
            .variable(&VariableKey::LoopFlowViolation {
                cnec: "tie-line".into(),
            })
            .unwrap();
        assert_eq!(problem.objective_coefficient(violation), 10.0);
    }

    #[test]
    fn test_initial_loop_flow_bound_and_update() {
        let (mut problem, filler) = setup(30.0);
        let mut current = flows(&[("tie-line", 150.0)]);
        current.set_commercial_flow("tie-line", 49.0);
        filler
            .fill(&mut problem, &current, &sensitivities(&[]), &activation(&[]))
            .unwrap();
        let (_, ub) = bounds(&problem);
        assert!((ub - ((120.0 - 5.0) + 49.0 + 0.01)).abs() < 1e-9);

        current.set_commercial_flow("tie-line", 67.0);
        filler
            .update_between_sensi_iteration(
                &mut problem,
                &current,
                &sensitivities(&[]),
                &activation(&[]),
                1,
            )
            .unwrap();
        let (lb, ub) = bounds(&problem);
        assert!((ub - ((120.0 - 5.0) + 67.0 + 0.01)).abs() < 1e-9);
        assert!((lb - (-(120.0 - 5.0) + 67.0 - 0.01)).abs() < 1e-9);
    }
}

//! Monitored-only CNECs (MNECs).
//!
//! An MNEC may go beyond its threshold, but not by more than the acceptable
//! margin decrease compared to its initial flow. Any excess is carried by a
//! penalised violation variable:
//!
//! ```text
//! F[c] - V[c] <= max(ub, F_init + acceptable) - adjustment
//! F[c] + V[c] >= min(lb, F_init - acceptable) + adjustment
//! ```

use super::ProblemFiller;
use crate::linear_problem::{
    ConstraintKey, LinearProblem, MarginExtension, VariableKey, VariableKind,
};
use crate::parameters::MnecParameters;
use rao_core::{
    FlowCnec, FlowResult, RangeActionActivationResult, RaoResult, SensitivityResult, Unit,
};
use std::sync::Arc;

pub struct MnecFiller {
    monitored_cnecs: Vec<Arc<FlowCnec>>,
    initial_flows: FlowResult,
    unit: Unit,
    parameters: MnecParameters,
}

impl MnecFiller {
    pub fn new(
        monitored_cnecs: Vec<Arc<FlowCnec>>,
        initial_flows: FlowResult,
        unit: Unit,
        parameters: MnecParameters,
    ) -> Self {
        Self {
            monitored_cnecs,
            initial_flows,
            unit,
            parameters,
        }
    }
}

impl ProblemFiller for MnecFiller {
    fn name(&self) -> &'static str {
        "mnec"
    }

    fn fill(
        &self,
        problem: &mut LinearProblem,
        _flow_result: &FlowResult,
        _sensitivity_result: &SensitivityResult,
        _activation: &RangeActionActivationResult,
    ) -> RaoResult<()> {
        let acceptable = self.parameters.acceptable_margin_decrease;
        let adjustment = self.parameters.constraint_adjustment_coefficient;
        for cnec in &self.monitored_cnecs {
            let initial = self.initial_flows.flow_mw(&cnec.id)?;
            let flow = problem.require_variable(&VariableKey::Flow {
                cnec: cnec.id.clone(),
            })?;
            let violation = problem.add_variable(
                VariableKey::MnecViolation {
                    cnec: cnec.id.clone(),
                },
                0.0,
                LinearProblem::infinity(),
                VariableKind::Continuous,
            )?;

            if let Some(ub) = cnec.upper_bound_mw {
                let max_flow = ub.max(initial + acceptable) - adjustment;
                let above = problem.add_constraint(
                    ConstraintKey::MnecViolation {
                        cnec: cnec.id.clone(),
                        extension: MarginExtension::AboveThreshold,
                    },
                    -LinearProblem::infinity(),
                    max_flow,
                )?;
                problem.set_coefficient(above, flow, 1.0);
                problem.set_coefficient(above, violation, -1.0);
            }
            if let Some(lb) = cnec.lower_bound_mw {
                let min_flow = lb.min(initial - acceptable) + adjustment;
                let below = problem.add_constraint(
                    ConstraintKey::MnecViolation {
                        cnec: cnec.id.clone(),
                        extension: MarginExtension::BelowThreshold,
                    },
                    min_flow,
                    LinearProblem::infinity(),
                )?;
                problem.set_coefficient(below, flow, 1.0);
                problem.set_coefficient(below, violation, 1.0);
            }

            problem.set_objective_coefficient(
                violation,
                self.parameters.violation_cost * cnec.unit_conversion(self.unit),
            );
        }
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
    use crate::fillers::test_support::{activation, flows, sensitivities};
    use crate::linear_problem::LpSolverKind;
    use rao_core::State;

    #[test]
    fn test_mnec_bounds() {
        let mnec = Arc::new(
            FlowCnec::new("mnec", "line", State::preventive())
                .with_bounds(Some(-1000.0), Some(1000.0))
                .as_monitored(),
        );
        let mut problem = LinearProblem::new(LpSolverKind::Microlp);
        let flow = problem
            .add_variable(
                VariableKey::Flow {
                    cnec: "mnec".into(),
                },
                -LinearProblem::infinity(),
                LinearProblem::infinity(),
                VariableKind::Continuous,
            )
            .unwrap();
        let parameters = MnecParameters {
            acceptable_margin_decrease: 50.0,
            violation_cost: 10.0,
            constraint_adjustment_coefficient: 5.0,
        };
        MnecFiller::new(
            vec![mnec],
            flows(&[("mnec", 980.0)]),
            Unit::Megawatt,
            parameters,
        )
        .fill(&mut problem, &flows(&[]), &sensitivities(&[]), &activation(&[]))
        .unwrap();

        let violation = problem
            .variable(&VariableKey::MnecViolation {
                cnec: "mnec".into(),
            })
            .unwrap();
        let above = problem
            .constraint(&ConstraintKey::MnecViolation {
                cnec: "mnec".into(),
                extension: MarginExtension::AboveThreshold,
            })
            .unwrap();
        let below = problem
            .constraint(&ConstraintKey::MnecViolation {
                cnec: "mnec".into(),
                extension: MarginExtension::BelowThreshold,
            })
            .unwrap();
        assert_eq!(problem.constraint_bounds(above).1, 1025.0);
        assert_eq!(problem.constraint_bounds(below).0, -995.0);
        assert_eq!(problem.coefficient(above, flow), 1.0);
        assert_eq!(problem.coefficient(above, violation), -1.0);
        assert_eq!(problem.coefficient(below, violation), 1.0);
        assert_eq!(problem.objective_coefficient(violation), 10.0);
    }
}

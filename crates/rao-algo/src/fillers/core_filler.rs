//! Flow and set-point variables.
//!
//! For every CNEC `c` and range action `r` of the perimeter:
//!
//! ```text
//! F[c] - Σ{|s[c,r]| >= threshold} s[c,r] * S[r] = F_ref[c] - Σ s[c,r] * S_cur[r]
//! min[r] <= S[r] <= max[r]
//! AV[r] >= S[r] - S_init[r]
//! AV[r] >= S_init[r] - S[r]
//! ```
//!
//! `AV` carries the penalty cost of moving the range action.

use super::{penalty_cost, sensitivity_threshold, ProblemFiller};
use crate::linear_problem::{
    AbsExtension, ConstraintKey, LinearProblem, VariableKey, VariableKind,
};
use crate::parameters::LinearOptimizerParameters;
use rao_core::{
    FlowCnec, FlowResult, RangeAction, RangeActionActivationResult, RangeActionSetpointResult,
    RaoResult, SensitivityResult,
};
use std::sync::Arc;

/// Shrink factor applied to the admissible range at each sensitivity iteration.
const RANGE_DIMINUTION_RATE: f64 = 0.667;

pub struct CoreProblemFiller {
    flow_cnecs: Vec<Arc<FlowCnec>>,
    range_actions: Vec<Arc<RangeAction>>,
    pre_perimeter_setpoints: RangeActionSetpointResult,
    parameters: LinearOptimizerParameters,
    ra_range_shrinking: bool,
}

impl CoreProblemFiller {
    pub fn new(
        flow_cnecs: Vec<Arc<FlowCnec>>,
        range_actions: Vec<Arc<RangeAction>>,
        pre_perimeter_setpoints: RangeActionSetpointResult,
        parameters: LinearOptimizerParameters,
        ra_range_shrinking: bool,
    ) -> Self {
        Self {
            flow_cnecs,
            range_actions,
            pre_perimeter_setpoints,
            parameters,
            ra_range_shrinking,
        }
    }

    fn build_range_action_variables(&self, problem: &mut LinearProblem) -> RaoResult<()> {
        for ra in &self.range_actions {
            let initial = self.pre_perimeter_setpoints.setpoint(&ra.id)?;
            let setpoint = problem.add_variable(
                VariableKey::Setpoint {
                    range_action: ra.id.clone(),
                },
                ra.min_admissible_setpoint(),
                ra.max_admissible_setpoint(),
                VariableKind::Continuous,
            )?;
            let absolute_variation = problem.add_variable(
                VariableKey::AbsoluteVariation {
                    range_action: ra.id.clone(),
                },
                0.0,
                LinearProblem::infinity(),
                VariableKind::Continuous,
            )?;

            // AV - S >= -S_init
            let negative = problem.add_constraint(
                ConstraintKey::AbsoluteVariation {
                    range_action: ra.id.clone(),
                    extension: AbsExtension::Negative,
                },
                -initial,
                LinearProblem::infinity(),
            )?;
            problem.set_coefficient(negative, absolute_variation, 1.0);
            problem.set_coefficient(negative, setpoint, -1.0);

            // AV + S >= S_init
            let positive = problem.add_constraint(
                ConstraintKey::AbsoluteVariation {
                    range_action: ra.id.clone(),
                    extension: AbsExtension::Positive,
                },
                initial,
                LinearProblem::infinity(),
            )?;
            problem.set_coefficient(positive, absolute_variation, 1.0);
            problem.set_coefficient(positive, setpoint, 1.0);

            problem.set_objective_coefficient(
                absolute_variation,
                penalty_cost(ra, &self.parameters),
            );
        }
        Ok(())
    }

    fn build_flow_variables_and_constraints(
        &self,
        problem: &mut LinearProblem,
        flow_result: &FlowResult,
        sensitivity_result: &SensitivityResult,
        activation: &RangeActionActivationResult,
    ) -> RaoResult<()> {
        for cnec in &self.flow_cnecs {
            let flow = problem.add_variable(
                VariableKey::Flow {
                    cnec: cnec.id.clone(),
                },
                -LinearProblem::infinity(),
                LinearProblem::infinity(),
                VariableKind::Continuous,
            )?;
            let reference = flow_result.flow_mw(&cnec.id)?;
            let constraint = problem.add_constraint(
                ConstraintKey::Flow {
                    cnec: cnec.id.clone(),
                },
                reference,
                reference,
            )?;
            problem.set_coefficient(constraint, flow, 1.0);
        }
        self.write_flow_constraints(problem, flow_result, sensitivity_result, activation)
    }

    /// (Re)write bounds and sensitivity coefficients of every flow constraint.
    fn write_flow_constraints(
        &self,
        problem: &mut LinearProblem,
        flow_result: &FlowResult,
        sensitivity_result: &SensitivityResult,
        activation: &RangeActionActivationResult,
    ) -> RaoResult<()> {
        for cnec in &self.flow_cnecs {
            let constraint = problem.require_constraint(&ConstraintKey::Flow {
                cnec: cnec.id.clone(),
            })?;
            let mut rhs = flow_result.flow_mw(&cnec.id)?;
            for ra in &self.range_actions {
                let setpoint = problem.require_variable(&VariableKey::Setpoint {
                    range_action: ra.id.clone(),
                })?;
                let sensitivity = sensitivity_result.sensitivity(&cnec.id, &ra.id);
                if sensitivity.abs() >= sensitivity_threshold(ra, &self.parameters) {
                    rhs -= sensitivity * activation.optimized_setpoint(&ra.id)?;
                    problem.set_coefficient(constraint, setpoint, -sensitivity);
                } else {
                    problem.set_coefficient(constraint, setpoint, 0.0);
                }
            }
            problem.set_constraint_bounds(constraint, rhs, rhs)?;
        }
        Ok(())
    }

    fn shrink_ranges(
        &self,
        problem: &mut LinearProblem,
        activation: &RangeActionActivationResult,
        iteration: usize,
    ) -> RaoResult<()> {
        for ra in &self.range_actions {
            let previous = activation.optimized_setpoint(&ra.id)?;
            let range = (ra.min_admissible_setpoint().abs() + ra.max_admissible_setpoint().abs())
                * RANGE_DIMINUTION_RATE.powi(iteration as i32);
            let key = ConstraintKey::IterativeShrink {
                range_action: ra.id.clone(),
            };
            match problem.constraint(&key) {
                Some(shrink) => problem.set_constraint_bounds(shrink, previous - range, previous + range)?,
                None => {
                    let setpoint = problem.require_variable(&VariableKey::Setpoint {
                        range_action: ra.id.clone(),
                    })?;
                    let shrink = problem.add_constraint(key, previous - range, previous + range)?;
                    problem.set_coefficient(shrink, setpoint, 1.0);
                }
            }
        }
        Ok(())
    }
}

impl ProblemFiller for CoreProblemFiller {
    fn name(&self) -> &'static str {
        "core"
    }

    fn fill(
        &self,
        problem: &mut LinearProblem,
        flow_result: &FlowResult,
        sensitivity_result: &SensitivityResult,
        activation: &RangeActionActivationResult,
    ) -> RaoResult<()> {
        self.build_range_action_variables(problem)?;
        self.build_flow_variables_and_constraints(
            problem,
            flow_result,
            sensitivity_result,
            activation,
        )
    }

    fn update_between_sensi_iteration(
        &self,
        problem: &mut LinearProblem,
        flow_result: &FlowResult,
        sensitivity_result: &SensitivityResult,
        activation: &RangeActionActivationResult,
        iteration: usize,
    ) -> RaoResult<()> {
        self.write_flow_constraints(problem, flow_result, sensitivity_result, activation)?;
        if self.ra_range_shrinking && iteration > 0 {
            self.shrink_ranges(problem, activation, iteration)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fillers::test_support::{activation, cnec, flows, sensitivities};
    use crate::linear_problem::LpSolverKind;
    use rao_core::RangeAction;

    fn filler(shrinking: bool) -> CoreProblemFiller {
        let injection = Arc::new(RangeAction::injection("ra", "ra-element", -15.0, 12.0));
        CoreProblemFiller::new(
            vec![cnec("cnec", -800.0, 800.0)],
            vec![injection],
            RangeActionSetpointResult::new([("ra".to_string(), 0.0)].into()),
            LinearOptimizerParameters::default(),
            shrinking,
        )
    }

    #[test]
    fn test_fill_flow_and_setpoint() {
        let mut problem = LinearProblem::new(LpSolverKind::Microlp);
        filler(false)
            .fill(
                &mut problem,
                &flows(&[("cnec", 500.0)]),
                &sensitivities(&[("cnec", "ra", 0.2)]),
                &activation(&[("ra", 0.0)]),
            )
            .unwrap();

        let flow = problem
            .variable(&VariableKey::Flow { cnec: "cnec".into() })
            .unwrap();
        assert_eq!(
            problem.variable_bounds(flow),
            (-LinearProblem::infinity(), LinearProblem::infinity())
        );

        let setpoint = problem
            .variable(&VariableKey::Setpoint {
                range_action: "ra".into(),
            })
            .unwrap();
        assert_eq!(problem.variable_bounds(setpoint), (-15.0, 12.0));

        let constraint = problem
            .constraint(&ConstraintKey::Flow { cnec: "cnec".into() })
            .unwrap();
        assert_eq!(problem.constraint_bounds(constraint), (500.0, 500.0));
        assert_eq!(problem.coefficient(constraint, flow), 1.0);
        assert_eq!(problem.coefficient(constraint, setpoint), -0.2);

        let av = problem
            .variable(&VariableKey::AbsoluteVariation {
                range_action: "ra".into(),
            })
            .unwrap();
        assert_eq!(problem.objective_coefficient(av), 0.001);
    }

    #[test]
    fn test_update_moves_linearisation_point() {
        let mut problem = LinearProblem::new(LpSolverKind::Microlp);
        let filler = filler(false);
        filler
            .fill(
                &mut problem,
                &flows(&[("cnec", 500.0)]),
                &sensitivities(&[("cnec", "ra", 0.2)]),
                &activation(&[("ra", 0.0)]),
            )
            .unwrap();

        let mut moved = activation(&[("ra", 0.0)]);
        moved.set_optimized_setpoint("ra", 10.0);
        filler
            .update_between_sensi_iteration(
                &mut problem,
                &flows(&[("cnec", 502.0)]),
                &sensitivities(&[("cnec", "ra", 0.3)]),
                &moved,
                1,
            )
            .unwrap();

        let constraint = problem
            .constraint(&ConstraintKey::Flow { cnec: "cnec".into() })
            .unwrap();
        let setpoint = problem
            .variable(&VariableKey::Setpoint {
                range_action: "ra".into(),
            })
            .unwrap();
        let (lb, ub) = problem.constraint_bounds(constraint);
        assert!((lb - 499.0).abs() < 1e-9);
        assert_eq!(lb, ub);
        assert_eq!(problem.coefficient(constraint, setpoint), -0.3);
        assert!(problem
            .constraint(&ConstraintKey::IterativeShrink {
                range_action: "ra".into()
            })
            .is_none());
    }

    #[test]
    fn test_sensitivity_below_threshold_is_ignored() {
        let mut problem = LinearProblem::new(LpSolverKind::Microlp);
        let mut parameters = LinearOptimizerParameters::default();
        parameters.injection_sensitivity_threshold = 0.5;
        let injection = Arc::new(RangeAction::injection("ra", "ra-element", -15.0, 12.0));
        let filler = CoreProblemFiller::new(
            vec![cnec("cnec", -800.0, 800.0)],
            vec![injection],
            RangeActionSetpointResult::new([("ra".to_string(), 3.0)].into()),
            parameters,
            false,
        );
        filler
            .fill(
                &mut problem,
                &flows(&[("cnec", 500.0)]),
                &sensitivities(&[("cnec", "ra", 0.2)]),
                &activation(&[("ra", 3.0)]),
            )
            .unwrap();
        let constraint = problem
            .constraint(&ConstraintKey::Flow { cnec: "cnec".into() })
            .unwrap();
        let setpoint = problem
            .variable(&VariableKey::Setpoint {
                range_action: "ra".into(),
            })
            .unwrap();
        assert_eq!(problem.coefficient(constraint, setpoint), 0.0);
        assert_eq!(problem.constraint_bounds(constraint), (500.0, 500.0));
    }

    #[test]
    fn test_iterative_shrink() {
        let mut problem = LinearProblem::new(LpSolverKind::Microlp);
        let filler = filler(true);
        let current = activation(&[("ra", 0.0)]);
        filler
            .fill(
                &mut problem,
                &flows(&[("cnec", 500.0)]),
                &sensitivities(&[("cnec", "ra", 0.2)]),
                &current,
            )
            .unwrap();
        filler
            .update_between_sensi_iteration(
                &mut problem,
                &flows(&[("cnec", 500.0)]),
                &sensitivities(&[("cnec", "ra", 0.2)]),
                &current,
                1,
            )
            .unwrap();
        let shrink = problem
            .constraint(&ConstraintKey::IterativeShrink {
                range_action: "ra".into(),
            })
            .unwrap();
        let (lb, ub) = problem.constraint_bounds(shrink);
        assert!((ub - 27.0 * 0.667).abs() < 1e-9);
        assert!((lb + 27.0 * 0.667).abs() < 1e-9);

        filler
            .update_between_sensi_iteration(
                &mut problem,
                &flows(&[("cnec", 500.0)]),
                &sensitivities(&[("cnec", "ra", 0.2)]),
                &current,
                2,
            )
            .unwrap();
        let (_, ub) = problem.constraint_bounds(shrink);
        assert!((ub - 27.0 * 0.667 * 0.667).abs() < 1e-9);
    }
}

//! Iterating linear optimisation of range action set-points.
//!
//! The flows are only linear around the point where sensitivities were
//! computed. The optimiser therefore alternates:
//!
//! 1. solve the linear problem built by the fillers,
//! 2. round the new set-points and apply them to the network,
//! 3. run a sensitivity computation at the new point,
//! 4. keep the point if its cost improved, and re-linearise the problem
//!    around it,
//!
//! until the set-points stop moving, the cost stops improving or the
//! iteration cap is hit. Solver and sensitivity failures are never fatal:
//! the best point so far is returned with a status telling what happened.

mod input;
mod result;

pub use input::{build_fillers, IteratingLinearOptimizerInput};
pub use result::{LinearOptimizationResult, LinearOptimizationStatus};

use crate::fillers::ProblemFiller;
use crate::linear_problem::{LinearProblem, LinearProblemStatus, VariableKey};
use crate::parameters::{PstModel, SearchTreeParameters};
use rao_core::{
    ComputationStatus, FlowResult, Network, RangeAction, RangeActionActivationResult, RaoResult,
    SensitivityResult, SETPOINT_ACTIVATION_EPSILON,
};
use std::sync::Arc;
use tracing::{debug, warn};

/// Drives the linear sub-problem of one leaf to convergence.
pub struct IteratingLinearOptimizer<'p> {
    parameters: &'p SearchTreeParameters,
}

impl<'p> IteratingLinearOptimizer<'p> {
    pub fn new(parameters: &'p SearchTreeParameters) -> Self {
        Self { parameters }
    }

    pub fn optimize<N: Network>(
        &self,
        mut input: IteratingLinearOptimizerInput<'_, N>,
    ) -> RaoResult<LinearOptimizationResult> {
        let fillers = build_fillers(&input, self.parameters);
        debug!(
            fillers = ?fillers.iter().map(|f| f.name()).collect::<Vec<_>>(),
            "building linear problem"
        );

        let mut best = self.evaluate(
            &input,
            input.pre_optimization_flows.clone(),
            input.pre_optimization_sensitivities.clone(),
            input.activation_from_parent_leaf.clone(),
            0,
        );
        let mut previous_activation = best.activation.clone();

        let mut problem = LinearProblem::new(self.parameters.linear_optimizer.solver);
        for filler in &fillers {
            filler.fill(
                &mut problem,
                input.pre_optimization_flows,
                input.pre_optimization_sensitivities,
                input.activation_from_parent_leaf,
            )?;
        }

        let range_actions = input.perimeter.range_actions();
        for iteration in 1..=self.parameters.linear_optimizer.max_iterations {
            let status = problem.solve();
            best.iterations = iteration;
            match status {
                LinearProblemStatus::Optimal => {}
                failed => {
                    warn!(iteration, status = %failed, "linear optimisation failed");
                    best.status = if iteration == 1 {
                        failed.into()
                    } else {
                        LinearOptimizationStatus::Feasible
                    };
                    return Ok(best);
                }
            }

            let mut activation = self.rounded_activation(&problem, &input)?;
            if self.parameters.linear_optimizer.pst_model == PstModel::ApproximatedIntegers {
                activation = self.resolve_with_refined_taps(&mut problem, &fillers, &input, activation)?;
            }

            if !has_any_range_action_changed(range_actions, &activation, &previous_activation)? {
                debug!(iteration, "same set-points as the previous iteration");
                return Ok(best);
            }

            apply_range_actions(input.network, range_actions, &activation)?;
            let outcome = input.sensitivity_computer.compute(input.network);
            if outcome.status() == ComputationStatus::Failure {
                warn!(iteration, "sensitivity computation failed, restoring the best set-points");
                apply_range_actions(input.network, range_actions, &best.activation)?;
                best.status = LinearOptimizationStatus::SensitivityComputationFailed;
                return Ok(best);
            }

            let current = self.evaluate(
                &input,
                outcome.flow_result,
                outcome.sensitivity_result,
                activation,
                iteration,
            );
            previous_activation = current.activation.clone();

            if current.cost() < best.cost() {
                debug!(
                    iteration,
                    cost = current.cost(),
                    functional_cost = current.functional_cost(),
                    virtual_cost = current.virtual_cost(),
                    "better set-points found"
                );
                for filler in &fillers {
                    filler.update_between_sensi_iteration(
                        &mut problem,
                        &current.flow_result,
                        &current.sensitivity_result,
                        &current.activation,
                        iteration,
                    )?;
                }
                best = current;
                continue;
            }

            debug!(
                iteration,
                best_cost = best.cost(),
                cost = current.cost(),
                "linear optimisation found a worse point"
            );
            apply_range_actions(input.network, range_actions, &best.activation)?;
            if !self.parameters.tree.ra_range_shrinking {
                return Ok(best);
            }
            for filler in &fillers {
                filler.update_between_sensi_iteration(
                    &mut problem,
                    &current.flow_result,
                    &current.sensitivity_result,
                    &current.activation,
                    iteration,
                )?;
            }
        }

        best.status = LinearOptimizationStatus::MaxIterationReached;
        Ok(best)
    }

    fn evaluate<N: Network>(
        &self,
        input: &IteratingLinearOptimizerInput<'_, N>,
        flow_result: FlowResult,
        sensitivity_result: SensitivityResult,
        activation: RangeActionActivationResult,
        iterations: usize,
    ) -> LinearOptimizationResult {
        let objective = input.objective_function.evaluate(
            &flow_result,
            &activation,
            &sensitivity_result,
            sensitivity_result.status(),
        );
        LinearOptimizationResult {
            status: LinearOptimizationStatus::Optimal,
            iterations,
            flow_result,
            sensitivity_result,
            activation,
            objective,
        }
    }

    /// Read the solved set-points. Range actions that did not move keep
    /// their pre-perimeter set-point; the others are snapped to a reachable
    /// value (closest tap angle for PSTs, integer otherwise).
    fn rounded_activation<N: Network>(
        &self,
        problem: &LinearProblem,
        input: &IteratingLinearOptimizerInput<'_, N>,
    ) -> RaoResult<RangeActionActivationResult> {
        let mut activation = RangeActionActivationResult::new(input.pre_perimeter_setpoints.clone());
        for ra in input.perimeter.range_actions() {
            let variable = problem.require_variable(&VariableKey::Setpoint {
                range_action: ra.id.clone(),
            })?;
            let setpoint = problem.solution_value(variable)?;
            let reference = input.pre_perimeter_setpoints.setpoint(&ra.id)?;
            if (setpoint - reference).abs() <= SETPOINT_ACTIVATION_EPSILON {
                continue;
            }
            activation.set_optimized_setpoint(ra.id.clone(), round_setpoint(ra, setpoint)?);
        }
        Ok(activation)
    }

    /// Recalibrate the tap model around the rounded taps and solve the MIP
    /// again; keeps the first solution if the second solve fails.
    fn resolve_with_refined_taps<N: Network>(
        &self,
        problem: &mut LinearProblem,
        fillers: &[Box<dyn ProblemFiller>],
        input: &IteratingLinearOptimizerInput<'_, N>,
        activation: RangeActionActivationResult,
    ) -> RaoResult<RangeActionActivationResult> {
        for filler in fillers {
            filler.update_between_mip_iteration(problem, &activation)?;
        }
        match problem.solve() {
            LinearProblemStatus::Optimal => self.rounded_activation(problem, input),
            status => {
                debug!(%status, "second MIP solve failed, keeping the first solution");
                Ok(activation)
            }
        }
    }
}

fn round_setpoint(range_action: &RangeAction, setpoint: f64) -> RaoResult<f64> {
    if range_action.is_pst() {
        range_action.tap_to_angle(range_action.angle_to_tap(setpoint)?)
    } else {
        Ok(setpoint.round())
    }
}

fn has_any_range_action_changed(
    range_actions: &[Arc<RangeAction>],
    new: &RangeActionActivationResult,
    old: &RangeActionActivationResult,
) -> RaoResult<bool> {
    for ra in range_actions {
        if (new.optimized_setpoint(&ra.id)? - old.optimized_setpoint(&ra.id)?).abs()
            >= SETPOINT_ACTIVATION_EPSILON
        {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Apply the optimised set-points of every range action to `network`.
pub fn apply_range_actions<N: Network>(
    network: &mut N,
    range_actions: &[Arc<RangeAction>],
    activation: &RangeActionActivationResult,
) -> RaoResult<()> {
    for ra in range_actions {
        ra.apply(network, activation.optimized_setpoint(&ra.id)?)?;
    }
    Ok(())
}

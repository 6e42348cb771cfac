//! Integer tap model of PSTs.
//!
//! The set-point of a PST is tied to two integer tap variations around the
//! current tap:
//!
//! ```text
//! S + k_down * down - k_up * up = angle(current tap)
//! down <= max_down * b_down,  up <= max_up * b_up,  b_down + b_up <= 1
//! ```
//!
//! The tap-to-angle curve is not linear. The first problem uses the mean
//! slope towards each end of the admissible range; every update recalibrates
//! `k_up` / `k_down` on a single tap step around the new tap.

use super::ProblemFiller;
use crate::linear_problem::{
    ConstraintKey, LinearProblem, VariableKey, VariableKind, VariationDirection,
};
use rao_core::{
    FlowResult, RangeAction, RangeActionActivationResult, RaoError, RaoResult, SensitivityResult,
};
use std::sync::Arc;

pub struct DiscretePstTapFiller {
    psts: Vec<Arc<RangeAction>>,
}

/// Admissible tap range of a PST, from its admissible angle range.
fn admissible_taps(pst: &RangeAction) -> RaoResult<(i32, i32)> {
    let a = pst.angle_to_tap(pst.min_admissible_setpoint())?;
    let b = pst.angle_to_tap(pst.max_admissible_setpoint())?;
    Ok((a.min(b), a.max(b)))
}

fn angle(pst: &RangeAction, tap: i32) -> RaoResult<f64> {
    pst.tap_to_angle(tap)
}

impl DiscretePstTapFiller {
    /// Non-PST range actions are ignored.
    pub fn new(range_actions: &[Arc<RangeAction>]) -> Self {
        Self {
            psts: range_actions
                .iter()
                .filter(|ra| ra.is_pst())
                .cloned()
                .collect(),
        }
    }

    fn build(
        &self,
        problem: &mut LinearProblem,
        pst: &RangeAction,
        activation: &RangeActionActivationResult,
    ) -> RaoResult<()> {
        let current_angle = activation.optimized_setpoint(&pst.id)?;
        let current_tap = activation.optimized_tap(pst)?;
        let (min_tap, max_tap) = admissible_taps(pst)?;
        let max_down = (current_tap - min_tap).max(0);
        let max_up = (max_tap - current_tap).max(0);
        let max_variation = f64::from(max_down + max_up);

        let id = || pst.id.clone();
        let down = problem.add_variable(
            VariableKey::PstTapVariation {
                range_action: id(),
                direction: VariationDirection::Downward,
            },
            0.0,
            max_variation,
            VariableKind::Integer,
        )?;
        let up = problem.add_variable(
            VariableKey::PstTapVariation {
                range_action: id(),
                direction: VariationDirection::Upward,
            },
            0.0,
            max_variation,
            VariableKind::Integer,
        )?;
        let down_binary = problem.add_variable(
            VariableKey::PstTapVariationBinary {
                range_action: id(),
                direction: VariationDirection::Downward,
            },
            0.0,
            1.0,
            VariableKind::Binary,
        )?;
        let up_binary = problem.add_variable(
            VariableKey::PstTapVariationBinary {
                range_action: id(),
                direction: VariationDirection::Upward,
            },
            0.0,
            1.0,
            VariableKind::Binary,
        )?;
        let setpoint = problem.require_variable(&VariableKey::Setpoint { range_action: id() })?;

        let conversion = problem.add_constraint(
            ConstraintKey::TapToAngleConversion { range_action: id() },
            current_angle,
            current_angle,
        )?;
        problem.set_coefficient(conversion, setpoint, 1.0);
        if max_down > 0 {
            let factor = (angle(pst, current_tap)? - angle(pst, min_tap)?) / f64::from(max_down);
            problem.set_coefficient(conversion, down, factor);
        }
        if max_up > 0 {
            let factor = (angle(pst, max_tap)? - angle(pst, current_tap)?) / f64::from(max_up);
            problem.set_coefficient(conversion, up, -factor);
        }

        let up_or_down = problem.add_constraint(
            ConstraintKey::UpOrDownPstVariation { range_action: id() },
            -LinearProblem::infinity(),
            1.0,
        )?;
        problem.set_coefficient(up_or_down, down_binary, 1.0);
        problem.set_coefficient(up_or_down, up_binary, 1.0);

        let down_authorization = problem.add_constraint(
            ConstraintKey::IsVariationInDirection {
                range_action: id(),
                direction: VariationDirection::Downward,
            },
            -LinearProblem::infinity(),
            0.0,
        )?;
        problem.set_coefficient(down_authorization, down, 1.0);
        problem.set_coefficient(down_authorization, down_binary, -f64::from(max_down));

        let up_authorization = problem.add_constraint(
            ConstraintKey::IsVariationInDirection {
                range_action: id(),
                direction: VariationDirection::Upward,
            },
            -LinearProblem::infinity(),
            0.0,
        )?;
        problem.set_coefficient(up_authorization, up, 1.0);
        problem.set_coefficient(up_authorization, up_binary, -f64::from(max_up));
        Ok(())
    }

    fn refine(
        &self,
        problem: &mut LinearProblem,
        pst: &RangeAction,
        activation: &RangeActionActivationResult,
    ) -> RaoResult<()> {
        let new_angle = activation.optimized_setpoint(&pst.id)?;
        let new_tap = activation.optimized_tap(pst)?;
        let (min_tap, max_tap) = admissible_taps(pst)?;
        let max_down = (new_tap - min_tap).max(0);
        let max_up = (max_tap - new_tap).max(0);
        let table = pst.tap_to_angle_map().ok_or_else(|| {
            RaoError::Validation(format!("range action '{}' is not a PST", pst.id))
        })?;

        let id = || pst.id.clone();
        let conversion =
            problem.require_constraint(&ConstraintKey::TapToAngleConversion { range_action: id() })?;
        let up = problem.require_variable(&VariableKey::PstTapVariation {
            range_action: id(),
            direction: VariationDirection::Upward,
        })?;
        let down = problem.require_variable(&VariableKey::PstTapVariation {
            range_action: id(),
            direction: VariationDirection::Downward,
        })?;
        let up_binary = problem.require_variable(&VariableKey::PstTapVariationBinary {
            range_action: id(),
            direction: VariationDirection::Upward,
        })?;
        let down_binary = problem.require_variable(&VariableKey::PstTapVariationBinary {
            range_action: id(),
            direction: VariationDirection::Downward,
        })?;
        let up_authorization = problem.require_constraint(&ConstraintKey::IsVariationInDirection {
            range_action: id(),
            direction: VariationDirection::Upward,
        })?;
        let down_authorization =
            problem.require_constraint(&ConstraintKey::IsVariationInDirection {
                range_action: id(),
                direction: VariationDirection::Downward,
            })?;

        problem.set_constraint_bounds(conversion, new_angle, new_angle)?;

        // slopes of one tap step; left untouched at the ends of the table
        let new_tap_angle = angle(pst, new_tap)?;
        if let Some(next) = table.get(&(new_tap + 1)) {
            problem.set_coefficient(conversion, up, -(next - new_tap_angle));
        }
        if let Some(previous) = table.get(&(new_tap - 1)) {
            problem.set_coefficient(conversion, down, new_tap_angle - previous);
        }

        problem.set_coefficient(down_authorization, down_binary, -f64::from(max_down));
        problem.set_coefficient(up_authorization, up_binary, -f64::from(max_up));
        Ok(())
    }
}

impl ProblemFiller for DiscretePstTapFiller {
    fn name(&self) -> &'static str {
        "discrete-pst-tap"
    }

    fn fill(
        &self,
        problem: &mut LinearProblem,
        _flow_result: &FlowResult,
        _sensitivity_result: &SensitivityResult,
        activation: &RangeActionActivationResult,
    ) -> RaoResult<()> {
        for pst in &self.psts {
            self.build(problem, pst, activation)?;
        }
        Ok(())
    }

    fn update_between_sensi_iteration(
        &self,
        problem: &mut LinearProblem,
        _flow_result: &FlowResult,
        _sensitivity_result: &SensitivityResult,
        activation: &RangeActionActivationResult,
        _iteration: usize,
    ) -> RaoResult<()> {
        for pst in &self.psts {
            self.refine(problem, pst, activation)?;
        }
        Ok(())
    }

    fn update_between_mip_iteration(
        &self,
        problem: &mut LinearProblem,
        activation: &RangeActionActivationResult,
    ) -> RaoResult<()> {
        for pst in &self.psts {
            self.refine(problem, pst, activation)?;
        }
        Ok(())
    }
}

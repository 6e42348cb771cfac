//! Range action usage limits.
//!
//! A binary `δ[r]` tells whether range action `r` moves away from its
//! pre-perimeter set-point:
//!
//! ```text
//! AV[r] - (max[r] - min[r] + ε) * δ[r] <= relaxation[r]
//! ```
//!
//! The caps are then plain sums of these binaries: over every range action
//! (max RA), over the range actions of one operator (max RA / max PST per
//! TSO), or over per-operator "TSO used" variables (max TSO). The number of
//! elementary actions of an operator is the sum of the absolute tap moves
//! of its PSTs since the pre-perimeter tap.

use super::ProblemFiller;
use crate::linear_problem::{
    AbsExtension, ConstraintKey, LinearProblem, VariableKey, VariableKind, VariationDirection,
};
use rao_core::{
    FlowResult, RangeAction, RangeActionActivationResult, RangeActionSetpointResult, RaoResult,
    SensitivityResult,
};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::debug;

const RANGE_ACTION_SETPOINT_EPSILON: f64 = 1e-4;

/// Usage budget left to the range actions of one leaf, once the network
/// actions it already applies have been accounted for.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RaLimitationParameters {
    pub max_ra: Option<usize>,
    pub max_tso: Option<usize>,
    /// Operators that already acted and therefore do not count against `max_tso`
    pub max_tso_exclusions: BTreeSet<String>,
    pub max_ra_per_tso: BTreeMap<String, usize>,
    pub max_pst_per_tso: BTreeMap<String, usize>,
    pub max_elementary_actions_per_tso: BTreeMap<String, usize>,
}

impl RaLimitationParameters {
    pub fn is_limited(&self) -> bool {
        self.max_ra.is_some()
            || self.max_tso.is_some()
            || !self.max_ra_per_tso.is_empty()
            || !self.max_pst_per_tso.is_empty()
            || !self.max_elementary_actions_per_tso.is_empty()
    }
}

pub struct RaUsageLimitsFiller {
    range_actions: Vec<Arc<RangeAction>>,
    pre_perimeter_setpoints: RangeActionSetpointResult,
    limits: RaLimitationParameters,
    pst_setpoints_approximated: bool,
}

impl RaUsageLimitsFiller {
    pub fn new(
        range_actions: Vec<Arc<RangeAction>>,
        pre_perimeter_setpoints: RangeActionSetpointResult,
        limits: RaLimitationParameters,
        pst_setpoints_approximated: bool,
    ) -> Self {
        Self {
            range_actions,
            pre_perimeter_setpoints,
            limits,
            pst_setpoints_approximated,
        }
    }

    /// Slack on the variation constraint keeping the pre-perimeter set-point
    /// feasible. With approximated PST taps the set-point may sit up to 30%
    /// of a mean tap step away from any reachable angle.
    fn initial_setpoint_relaxation(&self, range_action: &RangeAction) -> f64 {
        match range_action.tap_to_angle_map() {
            Some(table) if self.pst_setpoints_approximated && table.len() > 1 => {
                let (Some(min_tap), Some(max_tap)) =
                    (table.keys().next().copied(), table.keys().next_back().copied())
                else {
                    return RANGE_ACTION_SETPOINT_EPSILON;
                };
                let min_angle = table.values().copied().fold(f64::INFINITY, f64::min);
                let max_angle = table.values().copied().fold(f64::NEG_INFINITY, f64::max);
                0.3 * ((max_angle - min_angle) / f64::from(max_tap - min_tap)).abs()
            }
            _ => RANGE_ACTION_SETPOINT_EPSILON,
        }
    }

    fn of_operator<'a>(&'a self, tso: &'a str) -> impl Iterator<Item = &'a Arc<RangeAction>> {
        self.range_actions
            .iter()
            .filter(move |ra| ra.operator.as_deref() == Some(tso))
    }

    fn build_is_variation(
        &self,
        problem: &mut LinearProblem,
        range_action: &RangeAction,
    ) -> RaoResult<()> {
        let id = || range_action.id.clone();
        let binary = problem.add_variable(
            VariableKey::RangeActionVariationBinary { range_action: id() },
            0.0,
            1.0,
            VariableKind::Binary,
        )?;
        let variation =
            problem.require_variable(&VariableKey::AbsoluteVariation { range_action: id() })?;
        let constraint = problem.add_constraint(
            ConstraintKey::IsVariation { range_action: id() },
            -LinearProblem::infinity(),
            self.initial_setpoint_relaxation(range_action),
        )?;
        problem.set_coefficient(constraint, variation, 1.0);
        problem.set_coefficient(
            constraint,
            binary,
            -(range_action.max_admissible_setpoint() + RANGE_ACTION_SETPOINT_EPSILON
                - range_action.min_admissible_setpoint()),
        );
        Ok(())
    }

    fn add_max_ra(&self, problem: &mut LinearProblem, max_ra: usize) -> RaoResult<()> {
        if max_ra >= self.range_actions.len() {
            return Ok(());
        }
        let constraint = problem.add_constraint(ConstraintKey::MaxRa, 0.0, max_ra as f64)?;
        for ra in &self.range_actions {
            let binary = problem.require_variable(&VariableKey::RangeActionVariationBinary {
                range_action: ra.id.clone(),
            })?;
            problem.set_coefficient(constraint, binary, 1.0);
        }
        Ok(())
    }

    fn add_max_tso(&self, problem: &mut LinearProblem, max_tso: usize) -> RaoResult<()> {
        let operators: BTreeSet<&str> = self
            .range_actions
            .iter()
            .filter_map(|ra| ra.operator.as_deref())
            .filter(|tso| !self.limits.max_tso_exclusions.contains(*tso))
            .collect();
        if max_tso >= operators.len() {
            return Ok(());
        }
        let constraint = problem.add_constraint(ConstraintKey::MaxTso, 0.0, max_tso as f64)?;
        for tso in operators {
            let used = problem.add_variable(
                VariableKey::TsoRaUsed {
                    operator: tso.to_string(),
                },
                0.0,
                1.0,
                VariableKind::Continuous,
            )?;
            problem.set_coefficient(constraint, used, 1.0);
            // used >= δ[r] for every range action of the operator
            for ra in self.of_operator(tso) {
                let binary = problem.require_variable(&VariableKey::RangeActionVariationBinary {
                    range_action: ra.id.clone(),
                })?;
                let link = problem.add_constraint(
                    ConstraintKey::TsoRaUsed {
                        operator: tso.to_string(),
                        range_action: ra.id.clone(),
                    },
                    0.0,
                    LinearProblem::infinity(),
                )?;
                problem.set_coefficient(link, used, 1.0);
                problem.set_coefficient(link, binary, -1.0);
            }
        }
        Ok(())
    }

    fn add_per_tso_cap(
        &self,
        problem: &mut LinearProblem,
        caps: &BTreeMap<String, usize>,
        psts_only: bool,
        make_key: impl Fn(String) -> ConstraintKey,
    ) -> RaoResult<()> {
        for (tso, cap) in caps {
            let constraint = problem.add_constraint(make_key(tso.clone()), 0.0, *cap as f64)?;
            for ra in self.of_operator(tso).filter(|ra| !psts_only || ra.is_pst()) {
                let binary = problem.require_variable(&VariableKey::RangeActionVariationBinary {
                    range_action: ra.id.clone(),
                })?;
                problem.set_coefficient(constraint, binary, 1.0);
            }
        }
        Ok(())
    }

    fn add_max_elementary_actions(
        &self,
        problem: &mut LinearProblem,
        activation: &RangeActionActivationResult,
    ) -> RaoResult<()> {
        for (tso, cap) in &self.limits.max_elementary_actions_per_tso {
            let constraint = problem.add_constraint(
                ConstraintKey::MaxElementaryActionsPerTso {
                    operator: tso.clone(),
                },
                0.0,
                *cap as f64,
            )?;
            for pst in self.of_operator(tso).filter(|ra| ra.is_pst()) {
                let id = || pst.id.clone();
                let (Some(up), Some(down)) = (
                    problem.variable(&VariableKey::PstTapVariation {
                        range_action: id(),
                        direction: VariationDirection::Upward,
                    }),
                    problem.variable(&VariableKey::PstTapVariation {
                        range_action: id(),
                        direction: VariationDirection::Downward,
                    }),
                ) else {
                    debug!(pst = %pst.id, "no tap variables, elementary action cap not applied");
                    continue;
                };
                let initial_tap = self.pre_perimeter_setpoints.tap(pst)?;
                let current_tap = activation.optimized_tap(pst)?;

                let moved = problem.add_variable(
                    VariableKey::PstAbsoluteVariationFromInitialTap { range_action: id() },
                    0.0,
                    LinearProblem::infinity(),
                    VariableKind::Continuous,
                )?;
                let positive = problem.add_constraint(
                    ConstraintKey::PstAbsoluteVariationFromInitialTap {
                        range_action: id(),
                        extension: AbsExtension::Positive,
                    },
                    f64::from(current_tap - initial_tap),
                    LinearProblem::infinity(),
                )?;
                problem.set_coefficient(positive, moved, 1.0);
                problem.set_coefficient(positive, up, -1.0);
                problem.set_coefficient(positive, down, 1.0);
                let negative = problem.add_constraint(
                    ConstraintKey::PstAbsoluteVariationFromInitialTap {
                        range_action: id(),
                        extension: AbsExtension::Negative,
                    },
                    f64::from(initial_tap - current_tap),
                    LinearProblem::infinity(),
                )?;
                problem.set_coefficient(negative, moved, 1.0);
                problem.set_coefficient(negative, up, 1.0);
                problem.set_coefficient(negative, down, -1.0);

                problem.set_coefficient(constraint, moved, 1.0);
            }
        }
        Ok(())
    }

    /// Tap variations are counted from the current tap, which moves between
    /// iterations.
    fn refresh_initial_tap_distances(
        &self,
        problem: &mut LinearProblem,
        activation: &RangeActionActivationResult,
    ) -> RaoResult<()> {
        for tso in self.limits.max_elementary_actions_per_tso.keys() {
            for pst in self.of_operator(tso).filter(|ra| ra.is_pst()) {
                let positive = problem.constraint(&ConstraintKey::PstAbsoluteVariationFromInitialTap {
                    range_action: pst.id.clone(),
                    extension: AbsExtension::Positive,
                });
                let negative = problem.constraint(&ConstraintKey::PstAbsoluteVariationFromInitialTap {
                    range_action: pst.id.clone(),
                    extension: AbsExtension::Negative,
                });
                let (Some(positive), Some(negative)) = (positive, negative) else {
                    continue;
                };
                let initial_tap = self.pre_perimeter_setpoints.tap(pst)?;
                let current_tap = activation.optimized_tap(pst)?;
                problem.set_constraint_lb(positive, f64::from(current_tap - initial_tap));
                problem.set_constraint_lb(negative, f64::from(initial_tap - current_tap));
            }
        }
        Ok(())
    }
}

impl ProblemFiller for RaUsageLimitsFiller {
    fn name(&self) -> &'static str {
        "ra-usage-limits"
    }

    fn fill(
        &self,
        problem: &mut LinearProblem,
        _flow_result: &FlowResult,
        _sensitivity_result: &SensitivityResult,
        activation: &RangeActionActivationResult,
    ) -> RaoResult<()> {
        if !self.limits.is_limited() {
            return Ok(());
        }
        for ra in &self.range_actions {
            self.build_is_variation(problem, ra)?;
        }
        if let Some(max_ra) = self.limits.max_ra {
            self.add_max_ra(problem, max_ra)?;
        }
        if let Some(max_tso) = self.limits.max_tso {
            self.add_max_tso(problem, max_tso)?;
        }
        self.add_per_tso_cap(problem, &self.limits.max_ra_per_tso, false, |operator| {
            ConstraintKey::MaxRaPerTso { operator }
        })?;
        self.add_per_tso_cap(problem, &self.limits.max_pst_per_tso, true, |operator| {
            ConstraintKey::MaxPstPerTso { operator }
        })?;
        self.add_max_elementary_actions(problem, activation)
    }

    fn update_between_sensi_iteration(
        &self,
        problem: &mut LinearProblem,
        _flow_result: &FlowResult,
        _sensitivity_result: &SensitivityResult,
        activation: &RangeActionActivationResult,
        _iteration: usize,
    ) -> RaoResult<()> {
        self.refresh_initial_tap_distances(problem, activation)
    }

    fn update_between_mip_iteration(
        &self,
        problem: &mut LinearProblem,
        activation: &RangeActionActivationResult,
    ) -> RaoResult<()> {
        self.refresh_initial_tap_distances(problem, activation)
    }
}

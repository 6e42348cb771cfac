//! Problem fillers.
//!
//! A filler owns one cohesive slice of the linear problem: it creates its
//! variables, constraints and objective terms in [`ProblemFiller::fill`] and
//! refreshes them once a new linearisation point is known. Fillers run in a
//! fixed order because later ones look up what earlier ones created:
//!
//! 1. [`CoreProblemFiller`] (flow and set-point variables, always first)
//! 2. [`DiscretePstTapFiller`] (approximated-integers PST model only)
//! 3. [`MaxMinMarginFiller`] or [`MaxMinRelativeMarginFiller`]
//! 4. [`UnoptimizedCnecFiller`]
//! 5. [`MnecFiller`], [`MaxLoopFlowFiller`]
//! 6. [`RaUsageLimitsFiller`]

mod core_filler;
mod discrete_tap;
mod loop_flow;
mod margin;
mod mnec;
mod ra_usage_limits;
mod relative_margin;
mod unoptimized_cnec;

pub use core_filler::CoreProblemFiller;
pub use discrete_tap::DiscretePstTapFiller;
pub use loop_flow::MaxLoopFlowFiller;
pub use margin::MaxMinMarginFiller;
pub use mnec::MnecFiller;
pub use ra_usage_limits::{RaLimitationParameters, RaUsageLimitsFiller};
pub use relative_margin::MaxMinRelativeMarginFiller;
pub use unoptimized_cnec::UnoptimizedCnecFiller;

use crate::linear_problem::LinearProblem;
use crate::parameters::LinearOptimizerParameters;
use rao_core::{
    FlowResult, RangeAction, RangeActionActivationResult, RangeActionKind, RaoResult,
    SensitivityResult,
};

/// One slice of the linear problem of a leaf.
pub trait ProblemFiller: Send + Sync {
    /// Short identifier used in logs
    fn name(&self) -> &'static str;

    /// Create variables, constraints and objective terms.
    fn fill(
        &self,
        problem: &mut LinearProblem,
        flow_result: &FlowResult,
        sensitivity_result: &SensitivityResult,
        activation: &RangeActionActivationResult,
    ) -> RaoResult<()>;

    /// Refresh coefficients and bounds after a new sensitivity computation.
    ///
    /// `iteration` counts accepted sensitivity iterations, starting at 1.
    fn update_between_sensi_iteration(
        &self,
        problem: &mut LinearProblem,
        flow_result: &FlowResult,
        sensitivity_result: &SensitivityResult,
        activation: &RangeActionActivationResult,
        iteration: usize,
    ) -> RaoResult<()>;

    /// Refresh after the set-points of a MIP solve have been rounded.
    fn update_between_mip_iteration(
        &self,
        _problem: &mut LinearProblem,
        _activation: &RangeActionActivationResult,
    ) -> RaoResult<()> {
        Ok(())
    }
}

/// Sensitivities below this (absolute) value are left out of the flow constraints.
pub(crate) fn sensitivity_threshold(
    range_action: &RangeAction,
    parameters: &LinearOptimizerParameters,
) -> f64 {
    match range_action.kind {
        RangeActionKind::Pst { .. } => parameters.pst_sensitivity_threshold,
        RangeActionKind::Hvdc => parameters.hvdc_sensitivity_threshold,
        RangeActionKind::Injection => parameters.injection_sensitivity_threshold,
    }
}

/// Objective cost of moving a range action by one set-point unit.
pub(crate) fn penalty_cost(range_action: &RangeAction, parameters: &LinearOptimizerParameters) -> f64 {
    match range_action.kind {
        RangeActionKind::Pst { .. } => parameters.pst_penalty_cost,
        RangeActionKind::Hvdc => parameters.hvdc_penalty_cost,
        RangeActionKind::Injection => parameters.injection_penalty_cost,
    }
}

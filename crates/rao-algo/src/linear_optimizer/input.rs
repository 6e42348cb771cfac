use crate::fillers::{
    CoreProblemFiller, DiscretePstTapFiller, MaxLoopFlowFiller, MaxMinMarginFiller,
    MaxMinRelativeMarginFiller, MnecFiller, ProblemFiller, RaLimitationParameters,
    RaUsageLimitsFiller, UnoptimizedCnecFiller,
};
use crate::parameters::{PstModel, SearchTreeParameters};
use rao_core::{
    FlowCnec, FlowResult, Network, ObjectiveFunction, OptimizationPerimeter,
    RangeActionActivationResult, RangeActionSetpointResult, SensitivityComputer,
    SensitivityResult,
};
use std::sync::Arc;

/// Everything one leaf hands to the linear optimiser.
pub struct IteratingLinearOptimizerInput<'a, N: Network> {
    /// Network of the leaf; range actions are applied to it in place
    pub network: &'a mut N,
    pub perimeter: &'a OptimizationPerimeter,
    /// Flows before any remedial action of the perimeter
    pub pre_perimeter_flows: &'a FlowResult,
    pub pre_perimeter_setpoints: &'a RangeActionSetpointResult,
    /// Linearisation point: flows and sensitivities of the evaluated leaf
    pub pre_optimization_flows: &'a FlowResult,
    pub pre_optimization_sensitivities: &'a SensitivityResult,
    /// Set-points the leaf starts from
    pub activation_from_parent_leaf: &'a RangeActionActivationResult,
    pub objective_function: &'a dyn ObjectiveFunction,
    pub sensitivity_computer: &'a dyn SensitivityComputer<N>,
    /// Usage budget left after the leaf's network actions, if limited
    pub ra_limitation: Option<RaLimitationParameters>,
}

/// Build the filler chain of one leaf, in the order later fillers rely on.
pub fn build_fillers<N: Network>(
    input: &IteratingLinearOptimizerInput<'_, N>,
    parameters: &SearchTreeParameters,
) -> Vec<Box<dyn ProblemFiller>> {
    let perimeter = input.perimeter;
    let unit = parameters.objective.unit;
    let range_actions = perimeter.range_actions().to_vec();
    let optimized_cnecs: Vec<Arc<FlowCnec>> = perimeter.optimized_flow_cnecs().cloned().collect();
    let approximated_taps =
        parameters.linear_optimizer.pst_model == PstModel::ApproximatedIntegers;

    let mut fillers: Vec<Box<dyn ProblemFiller>> = vec![Box::new(CoreProblemFiller::new(
        perimeter.flow_cnecs().to_vec(),
        range_actions.clone(),
        input.pre_perimeter_setpoints.clone(),
        parameters.linear_optimizer.clone(),
        parameters.tree.ra_range_shrinking,
    ))];

    if approximated_taps {
        fillers.push(Box::new(DiscretePstTapFiller::new(&range_actions)));
    }

    if parameters.objective.kind.is_relative() {
        fillers.push(Box::new(MaxMinRelativeMarginFiller::new(
            optimized_cnecs.clone(),
            input.pre_perimeter_flows.clone(),
            unit,
            parameters.linear_optimizer.ptdf_sum_lower_bound,
        )));
    } else {
        fillers.push(Box::new(MaxMinMarginFiller::new(optimized_cnecs.clone(), unit)));
    }

    if parameters.unoptimized_cnecs.is_active() {
        fillers.push(Box::new(UnoptimizedCnecFiller::new(
            &optimized_cnecs,
            &range_actions,
            input.pre_perimeter_flows.clone(),
            &parameters.unoptimized_cnecs,
        )));
    }

    if let Some(mnec) = &parameters.mnec {
        let monitored: Vec<Arc<FlowCnec>> = perimeter.monitored_flow_cnecs().cloned().collect();
        if !monitored.is_empty() {
            fillers.push(Box::new(MnecFiller::new(
                monitored,
                input.pre_perimeter_flows.clone(),
                unit,
                mnec.clone(),
            )));
        }
    }

    if let Some(loop_flow) = &parameters.loop_flow {
        let loop_flow_cnecs: Vec<Arc<FlowCnec>> = perimeter.loop_flow_cnecs().cloned().collect();
        if !loop_flow_cnecs.is_empty() {
            fillers.push(Box::new(MaxLoopFlowFiller::new(
                loop_flow_cnecs,
                input.pre_perimeter_flows.clone(),
                loop_flow.clone(),
            )));
        }
    }

    if let Some(limits) = input.ra_limitation.as_ref().filter(|l| l.is_limited()) {
        fillers.push(Box::new(RaUsageLimitsFiller::new(
            range_actions,
            input.pre_perimeter_setpoints.clone(),
            limits.clone(),
            approximated_taps,
        )));
    }

    fillers
}

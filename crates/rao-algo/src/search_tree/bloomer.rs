use super::combination::NetworkActionCombination;
use super::filters::{
    AlreadyAppliedNetworkActionsFilter, AlreadyTestedCombinationsFilter, Candidates,
    ElementaryActionsCompatibilityFilter, FarFromMostLimitingElementFilter,
    HasImpactOnNetworkFilter, MaxElementaryActionsPerTsoFilter, MaxRaFilter, MaxRaPerTsoFilter,
    MaxTsoFilter, NetworkActionCombinationFilter, OnFlowConstraintFilter,
};
use super::leaf::OptimizationResult;
use crate::parameters::SearchTreeParameters;
use rao_core::{
    CountryGraph, Network, NetworkAction, OptimizationPerimeter, RangeActionSetpointResult,
};
use std::sync::Arc;
use tracing::debug;

/// Generates the children of a leaf.
pub struct SearchTreeBloomer {
    predefined: Vec<NetworkActionCombination>,
    filters: Vec<Box<dyn NetworkActionCombinationFilter>>,
}

impl SearchTreeBloomer {
    /// Build the filter chain. `network` is the root network, used to locate
    /// elements and to check whether actions change anything.
    pub fn new<N: Network>(
        network: Arc<N>,
        perimeter: Arc<OptimizationPerimeter>,
        pre_perimeter_setpoints: RangeActionSetpointResult,
        country_graph: CountryGraph,
        predefined: Vec<NetworkActionCombination>,
        parameters: &SearchTreeParameters,
    ) -> Self {
        let limits = &parameters.ra_usage_limits;
        let mut filters: Vec<Box<dyn NetworkActionCombinationFilter>> = vec![
            Box::new(AlreadyAppliedNetworkActionsFilter),
            Box::new(AlreadyTestedCombinationsFilter::new(predefined.clone())),
            Box::new(MaxRaFilter::new(limits.max_ra)),
            Box::new(MaxRaPerTsoFilter::new(
                perimeter.clone(),
                limits.max_ra_per_tso.clone(),
                limits.max_topo_per_tso.clone(),
            )),
            Box::new(MaxTsoFilter::new(perimeter.clone(), limits.max_tso)),
        ];
        if parameters.tree.skip_network_actions_far_from_most_limiting_element {
            filters.push(Box::new(FarFromMostLimitingElementFilter::new(
                network.clone(),
                perimeter.clone(),
                country_graph,
                parameters.tree.max_number_of_boundaries_for_skipping_network_actions,
            )));
        }
        filters.push(Box::new(MaxElementaryActionsPerTsoFilter::new(
            perimeter.clone(),
            pre_perimeter_setpoints,
            limits.max_elementary_actions_per_tso.clone(),
        )));
        filters.push(Box::new(ElementaryActionsCompatibilityFilter));
        filters.push(Box::new(OnFlowConstraintFilter::new(
            network.clone(),
            perimeter,
            parameters.objective.unit,
        )));
        filters.push(Box::new(HasImpactOnNetworkFilter::new(network)));

        Self {
            predefined,
            filters,
        }
    }

    /// Candidate combinations to try from `leaf`, each flagged when the
    /// parent's range actions must be dropped to respect the usage limits.
    pub fn bloom(&self, leaf: &OptimizationResult, available: &[Arc<NetworkAction>]) -> Candidates {
        let mut candidates = Candidates::new();
        for combination in &self.predefined {
            let usable = combination
                .network_actions()
                .iter()
                .all(|na| available.contains(na));
            if usable && !candidates.contains_key(combination) {
                candidates.insert(combination.clone(), false);
            }
        }
        for na in available {
            let single = NetworkActionCombination::single(na.clone());
            if !candidates.contains_key(&single) {
                candidates.insert(single, false);
            }
        }

        for filter in &self.filters {
            let before = candidates.len();
            candidates = filter.filter(candidates, leaf);
            debug!(
                filter = filter.name(),
                before,
                after = candidates.len(),
                "applied network action combination filter"
            );
        }
        candidates
    }

    pub fn has_predefined_combination(&self, combination: &NetworkActionCombination) -> bool {
        self.predefined.contains(combination)
    }
}

//! Network action combination filters.
//!
//! Each filter takes the candidate combinations of a leaf, mapped to the
//! "must drop range actions" flag, and returns the ones it keeps. Filters
//! may raise the flag, never lower it.

use super::combination::NetworkActionCombination;
use super::leaf::OptimizationResult;
use rao_core::{
    Country, CountryGraph, Network, NetworkAction, OptimizationPerimeter,
    RangeActionSetpointResult, Unit, UsageRule,
};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info};

/// Candidate combinations and whether the parent's range actions must be
/// reset to their pre-perimeter set-points before applying them.
pub type Candidates = BTreeMap<NetworkActionCombination, bool>;

pub trait NetworkActionCombinationFilter: Send + Sync {
    fn name(&self) -> &'static str;

    fn filter(&self, candidates: Candidates, leaf: &OptimizationResult) -> Candidates;
}

fn log_removed(before: usize, after: &Candidates, reason: &str) {
    if before > after.len() {
        info!(
            "{} network action combinations have been filtered out because {}",
            before - after.len(),
            reason
        );
    }
}

/// Operators of the range actions activated in `leaf`, one entry per
/// activated range action.
fn activated_range_action_operators(
    perimeter: &OptimizationPerimeter,
    leaf: &OptimizationResult,
) -> Vec<Option<String>> {
    leaf.activated_range_actions()
        .iter()
        .filter_map(|id| perimeter.range_action(id))
        .map(|ra| ra.operator.clone())
        .collect()
}

fn applied_for_operator(leaf: &OptimizationResult, operator: &str) -> usize {
    leaf.activated_network_actions
        .iter()
        .filter(|na| na.operator.as_deref() == Some(operator))
        .count()
}

/// Drops combinations containing an action the leaf already applies.
pub struct AlreadyAppliedNetworkActionsFilter;

impl NetworkActionCombinationFilter for AlreadyAppliedNetworkActionsFilter {
    fn name(&self) -> &'static str {
        "already-applied"
    }

    fn filter(&self, candidates: Candidates, leaf: &OptimizationResult) -> Candidates {
        candidates
            .into_iter()
            .filter(|(combination, _)| {
                combination
                    .network_actions()
                    .iter()
                    .all(|na| !leaf.is_activated(na))
            })
            .collect()
    }
}

/// Once all but one action of a predefined combination have been selected,
/// the last one alone has already been tried as part of the combination.
pub struct AlreadyTestedCombinationsFilter {
    predefined: Vec<NetworkActionCombination>,
}

impl AlreadyTestedCombinationsFilter {
    pub fn new(predefined: Vec<NetworkActionCombination>) -> Self {
        Self { predefined }
    }
}

impl NetworkActionCombinationFilter for AlreadyTestedCombinationsFilter {
    fn name(&self) -> &'static str {
        "already-tested"
    }

    fn filter(&self, candidates: Candidates, leaf: &OptimizationResult) -> Candidates {
        let already_tested: BTreeSet<&Arc<NetworkAction>> = self
            .predefined
            .iter()
            .filter(|combination| !combination.is_detected_during_rao())
            .filter_map(|combination| {
                let mut not_applied = combination
                    .network_actions()
                    .iter()
                    .filter(|na| !leaf.is_activated(na));
                match (not_applied.next(), not_applied.next()) {
                    (Some(last), None) => Some(last),
                    _ => None,
                }
            })
            .collect();

        candidates
            .into_iter()
            .filter(|(combination, _)| {
                combination.len() != 1
                    || combination
                        .network_actions()
                        .iter()
                        .all(|na| !already_tested.contains(na))
            })
            .collect()
    }
}

/// Maximum number of remedial actions, network and range actions together.
pub struct MaxRaFilter {
    max_ra: usize,
}

impl MaxRaFilter {
    pub fn new(max_ra: Option<usize>) -> Self {
        Self {
            max_ra: max_ra.unwrap_or(usize::MAX),
        }
    }
}

impl NetworkActionCombinationFilter for MaxRaFilter {
    fn name(&self) -> &'static str {
        "max-ra"
    }

    fn filter(&self, candidates: Candidates, leaf: &OptimizationResult) -> Candidates {
        let before = candidates.len();
        let applied = leaf.activated_network_actions.len();
        let activated_ras = leaf.activated_range_actions().len();
        let kept: Candidates = candidates
            .into_iter()
            .filter(|(combination, _)| combination.len().saturating_add(applied) <= self.max_ra)
            .map(|(combination, remove_ras)| {
                let with_ras = applied
                    .saturating_add(activated_ras)
                    .saturating_add(combination.len());
                let must_remove = with_ras > self.max_ra;
                (combination, remove_ras || must_remove)
            })
            .collect();
        log_removed(before, &kept, "the max number of usable RAs has been reached");
        kept
    }
}

/// Per-operator caps on remedial actions and on topological actions.
pub struct MaxRaPerTsoFilter {
    perimeter: Arc<OptimizationPerimeter>,
    max_ra_per_tso: BTreeMap<String, usize>,
    max_topo_per_tso: BTreeMap<String, usize>,
}

impl MaxRaPerTsoFilter {
    pub fn new(
        perimeter: Arc<OptimizationPerimeter>,
        max_ra_per_tso: BTreeMap<String, usize>,
        max_topo_per_tso: BTreeMap<String, usize>,
    ) -> Self {
        Self {
            perimeter,
            max_ra_per_tso,
            max_topo_per_tso,
        }
    }

    /// Network actions each capped operator may still apply.
    fn max_network_actions_per_tso(&self, leaf: &OptimizationResult) -> BTreeMap<&str, usize> {
        self.max_ra_per_tso
            .keys()
            .chain(self.max_topo_per_tso.keys())
            .map(|tso| {
                let applied = applied_for_operator(leaf, tso);
                let due_to_ra = self.max_ra_per_tso.get(tso).map_or(usize::MAX, |m| m.saturating_sub(applied));
                let due_to_topo = self.max_topo_per_tso.get(tso).map_or(usize::MAX, |m| m.saturating_sub(applied));
                (tso.as_str(), due_to_ra.min(due_to_topo))
            })
            .collect()
    }
}

impl NetworkActionCombinationFilter for MaxRaPerTsoFilter {
    fn name(&self) -> &'static str {
        "max-ra-per-tso"
    }

    fn filter(&self, candidates: Candidates, leaf: &OptimizationResult) -> Candidates {
        let before = candidates.len();
        let max_na_per_tso = self.max_network_actions_per_tso(leaf);
        let ra_operators = activated_range_action_operators(&self.perimeter, leaf);

        let mut kept = Candidates::new();
        'candidates: for (combination, remove_ras) in candidates {
            let mut must_remove = false;
            for tso in combination.operators() {
                let count = combination.count_for_operator(tso);
                if count > max_na_per_tso.get(tso.as_str()).copied().unwrap_or(usize::MAX) {
                    continue 'candidates;
                }
                let activated_ras = ra_operators
                    .iter()
                    .filter(|op| op.as_deref() == Some(tso.as_str()))
                    .count();
                let total = applied_for_operator(leaf, tso) + activated_ras + count;
                if total > self.max_ra_per_tso.get(tso).copied().unwrap_or(usize::MAX) {
                    must_remove = true;
                }
            }
            kept.insert(combination, remove_ras || must_remove);
        }
        log_removed(
            before,
            &kept,
            "the maximum number of network actions for their TSO has been reached",
        );
        kept
    }
}

/// Maximum number of operators using remedial actions.
pub struct MaxTsoFilter {
    perimeter: Arc<OptimizationPerimeter>,
    max_tso: usize,
}

impl MaxTsoFilter {
    pub fn new(perimeter: Arc<OptimizationPerimeter>, max_tso: Option<usize>) -> Self {
        Self {
            perimeter,
            max_tso: max_tso.unwrap_or(usize::MAX),
        }
    }

    fn exceeds(&self, combination: &NetworkActionCombination, already_used: &BTreeSet<String>) -> bool {
        combination.operators().union(already_used).count() > self.max_tso
    }
}

impl NetworkActionCombinationFilter for MaxTsoFilter {
    fn name(&self) -> &'static str {
        "max-tso"
    }

    fn filter(&self, candidates: Candidates, leaf: &OptimizationResult) -> Candidates {
        let before = candidates.len();
        let with_network_actions: BTreeSet<String> = leaf
            .activated_network_actions
            .iter()
            .filter_map(|na| na.operator.clone())
            .collect();
        let mut with_range_actions = with_network_actions.clone();
        with_range_actions.extend(
            activated_range_action_operators(&self.perimeter, leaf)
                .into_iter()
                .flatten(),
        );

        let kept: Candidates = candidates
            .into_iter()
            .filter(|(combination, _)| !self.exceeds(combination, &with_network_actions))
            .map(|(combination, remove_ras)| {
                let must_remove = self.exceeds(&combination, &with_range_actions);
                (combination, remove_ras || must_remove)
            })
            .collect();
        log_removed(before, &kept, "the max number of usable TSOs has been reached");
        kept
    }
}

/// Keeps combinations with at least one action close to the most limiting
/// element, or to an element causing a virtual cost.
///
/// Unknown locations are always considered close.
pub struct FarFromMostLimitingElementFilter<N: Network> {
    network: Arc<N>,
    perimeter: Arc<OptimizationPerimeter>,
    country_graph: CountryGraph,
    max_boundaries: usize,
}

impl<N: Network> FarFromMostLimitingElementFilter<N> {
    pub fn new(
        network: Arc<N>,
        perimeter: Arc<OptimizationPerimeter>,
        country_graph: CountryGraph,
        max_boundaries: usize,
    ) -> Self {
        Self {
            network,
            perimeter,
            country_graph,
            max_boundaries,
        }
    }

    fn cnec_location(&self, cnec_id: &str) -> Vec<Option<Country>> {
        match self.perimeter.flow_cnec(cnec_id) {
            Some(cnec) => self.network.element_countries(&cnec.network_element_id),
            None => vec![None],
        }
    }

    fn limiting_locations(&self, leaf: &OptimizationResult) -> BTreeSet<Option<Country>> {
        let objective = &leaf.objective;
        let costly = objective
            .virtual_costs
            .keys()
            .flat_map(|name| objective.costly_elements(name, usize::MAX));
        objective
            .most_limiting_elements(1)
            .iter()
            .chain(costly)
            .flat_map(|cnec_id| self.cnec_location(cnec_id))
            .collect()
    }

    fn is_close(&self, network_action: &NetworkAction, locations: &BTreeSet<Option<Country>>) -> bool {
        if locations.contains(&None) {
            return true;
        }
        let action_countries = network_action.location(&*self.network);
        if action_countries.contains(&None) {
            return true;
        }
        locations.iter().flatten().any(|location| {
            action_countries.iter().flatten().any(|country| {
                self.country_graph
                    .are_neighbors(location, country, self.max_boundaries)
            })
        })
    }
}

impl<N: Network> NetworkActionCombinationFilter for FarFromMostLimitingElementFilter<N> {
    fn name(&self) -> &'static str {
        "far-from-most-limiting-element"
    }

    fn filter(&self, candidates: Candidates, leaf: &OptimizationResult) -> Candidates {
        let before = candidates.len();
        let locations = self.limiting_locations(leaf);
        let kept: Candidates = candidates
            .into_iter()
            .filter(|(combination, _)| {
                combination
                    .network_actions()
                    .iter()
                    .any(|na| self.is_close(na, &locations))
            })
            .collect();
        log_removed(
            before,
            &kept,
            "they are too far from the most limiting element",
        );
        kept
    }
}

/// Per-operator cap on elementary actions. Moved PST taps count as
/// elementary actions of the PST's operator.
pub struct MaxElementaryActionsPerTsoFilter {
    perimeter: Arc<OptimizationPerimeter>,
    pre_perimeter_setpoints: RangeActionSetpointResult,
    max_elementary_actions_per_tso: BTreeMap<String, usize>,
}

impl MaxElementaryActionsPerTsoFilter {
    pub fn new(
        perimeter: Arc<OptimizationPerimeter>,
        pre_perimeter_setpoints: RangeActionSetpointResult,
        max_elementary_actions_per_tso: BTreeMap<String, usize>,
    ) -> Self {
        Self {
            perimeter,
            pre_perimeter_setpoints,
            max_elementary_actions_per_tso,
        }
    }

    /// Sum of |optimised tap - pre-perimeter tap| over the activated PSTs
    /// of each operator.
    fn moved_pst_taps_per_tso(&self, leaf: &OptimizationResult) -> BTreeMap<String, usize> {
        let mut moved: BTreeMap<String, usize> = BTreeMap::new();
        for id in leaf.activated_range_actions() {
            let Some(pst) = self.perimeter.range_action(&id).filter(|ra| ra.is_pst()) else {
                continue;
            };
            let Some(operator) = pst.operator.clone() else {
                continue;
            };
            let (Ok(optimized), Ok(initial)) = (
                leaf.activation.optimized_tap(pst),
                self.pre_perimeter_setpoints.tap(pst),
            ) else {
                debug!(range_action = %id, "could not compute moved taps");
                continue;
            };
            *moved.entry(operator).or_default() += optimized.abs_diff(initial) as usize;
        }
        moved
    }

    fn max_for(&self, operator: &str) -> usize {
        self.max_elementary_actions_per_tso
            .get(operator)
            .copied()
            .unwrap_or(usize::MAX)
    }
}

impl NetworkActionCombinationFilter for MaxElementaryActionsPerTsoFilter {
    fn name(&self) -> &'static str {
        "max-elementary-actions-per-tso"
    }

    fn filter(&self, candidates: Candidates, leaf: &OptimizationResult) -> Candidates {
        let before = candidates.len();
        let moved_taps = self.moved_pst_taps_per_tso(leaf);
        let elementary_for = |combination: &NetworkActionCombination, operator: &str| -> usize {
            combination
                .network_actions()
                .iter()
                .filter(|na| na.operator.as_deref() == Some(operator))
                .map(|na| na.elementary_action_count())
                .sum()
        };

        let kept: Candidates = candidates
            .into_iter()
            .filter(|(combination, _)| {
                combination
                    .operators()
                    .iter()
                    .all(|op| elementary_for(combination, op) <= self.max_for(op))
            })
            .map(|(combination, remove_ras)| {
                let must_remove = combination.operators().iter().any(|op| {
                    let taps = moved_taps.get(op).copied().unwrap_or(0);
                    elementary_for(&combination, op).saturating_add(taps) > self.max_for(op)
                });
                (combination, remove_ras || must_remove)
            })
            .collect();
        log_removed(
            before,
            &kept,
            "the maximum number of elementary actions for their TSO has been reached",
        );
        kept
    }
}

/// Drops combinations with an action incompatible with an applied one.
pub struct ElementaryActionsCompatibilityFilter;

impl NetworkActionCombinationFilter for ElementaryActionsCompatibilityFilter {
    fn name(&self) -> &'static str {
        "elementary-actions-compatibility"
    }

    fn filter(&self, candidates: Candidates, leaf: &OptimizationResult) -> Candidates {
        let before = candidates.len();
        let kept: Candidates = candidates
            .into_iter()
            .filter(|(combination, _)| {
                combination.network_actions().iter().all(|na| {
                    leaf.activated_network_actions
                        .iter()
                        .all(|applied| na.is_compatible_with(applied))
                })
            })
            .collect();
        log_removed(
            before,
            &kept,
            "they are incompatible with the network actions already applied",
        );
        kept
    }
}

/// Drops combinations whose actions would all leave the leaf's network
/// unchanged.
pub struct HasImpactOnNetworkFilter<N: Network> {
    root_network: Arc<N>,
}

impl<N: Network> HasImpactOnNetworkFilter<N> {
    pub fn new(root_network: Arc<N>) -> Self {
        Self { root_network }
    }
}

impl<N: Network> NetworkActionCombinationFilter for HasImpactOnNetworkFilter<N> {
    fn name(&self) -> &'static str {
        "has-impact-on-network"
    }

    fn filter(&self, candidates: Candidates, leaf: &OptimizationResult) -> Candidates {
        let before = candidates.len();
        let mut network = N::clone(&self.root_network);
        for na in &leaf.activated_network_actions {
            if !na.apply(&mut network) {
                debug!(network_action = %na.id, "could not replay network action");
            }
        }
        let kept: Candidates = candidates
            .into_iter()
            .filter(|(combination, _)| {
                combination
                    .network_actions()
                    .iter()
                    .any(|na| na.has_impact_on_network(&network))
            })
            .collect();
        log_removed(before, &kept, "they have no impact on the network");
        kept
    }
}

/// Drops combinations with an action whose usage rules are not met: every
/// action needs an on-instant rule for the optimised instant or an
/// overloaded CNEC triggering one of its on-flow-constraint rules.
pub struct OnFlowConstraintFilter<N: Network> {
    network: Arc<N>,
    perimeter: Arc<OptimizationPerimeter>,
    unit: Unit,
}

impl<N: Network> OnFlowConstraintFilter<N> {
    pub fn new(network: Arc<N>, perimeter: Arc<OptimizationPerimeter>, unit: Unit) -> Self {
        Self {
            network,
            perimeter,
            unit,
        }
    }

    fn overloaded_cnecs(&self, leaf: &OptimizationResult) -> Vec<&str> {
        self.perimeter
            .flow_cnecs()
            .iter()
            .filter(|cnec| cnec.state == self.perimeter.main_state)
            .filter(|cnec| {
                leaf.flow_result
                    .margin(cnec, self.unit)
                    .map_or(false, |margin| margin < 0.0)
            })
            .map(|cnec| cnec.id.as_str())
            .collect()
    }

    fn is_available(&self, network_action: &NetworkAction, overloaded: &[&str]) -> bool {
        let state = &self.perimeter.main_state;
        network_action
            .usage_rules
            .iter()
            .filter(|rule| rule.is_defined_for(state))
            .any(|rule| match rule {
                UsageRule::OnInstant { .. } => true,
                UsageRule::OnFlowConstraint { cnec_id, .. } => overloaded.contains(&cnec_id.as_str()),
                UsageRule::OnFlowConstraintInCountry { country, .. } => {
                    overloaded.iter().any(|cnec_id| {
                        self.perimeter.flow_cnec(cnec_id).map_or(false, |cnec| {
                            self.network
                                .element_countries(&cnec.network_element_id)
                                .contains(&Some(country.clone()))
                        })
                    })
                }
            })
    }
}

impl<N: Network> NetworkActionCombinationFilter for OnFlowConstraintFilter<N> {
    fn name(&self) -> &'static str {
        "on-flow-constraint"
    }

    fn filter(&self, candidates: Candidates, leaf: &OptimizationResult) -> Candidates {
        let before = candidates.len();
        let overloaded = self.overloaded_cnecs(leaf);
        let kept: Candidates = candidates
            .into_iter()
            .filter(|(combination, _)| {
                combination
                    .network_actions()
                    .iter()
                    .all(|na| self.is_available(na, &overloaded))
            })
            .collect();
        log_removed(
            before,
            &kept,
            "their usage rules are not met by the current overloads",
        );
        kept
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rao_core::{
        ComputationStatus, FlowCnec, FlowResult, InstantKind, LinearNetwork,
        ObjectiveFunctionResult, RangeAction, RangeActionActivationResult, SensitivityResult,
        State,
    };

    fn na(id: &str, tso: &str) -> Arc<NetworkAction> {
        Arc::new(NetworkAction::open(id, format!("{id}-line")).with_operator(tso))
    }

    fn leaf(applied: &[Arc<NetworkAction>], activation: RangeActionActivationResult) -> OptimizationResult {
        OptimizationResult {
            flow_result: FlowResult::new(ComputationStatus::Success),
            sensitivity_result: SensitivityResult::new(ComputationStatus::Success),
            objective: ObjectiveFunctionResult::new(-100.0),
            activation,
            activated_network_actions: applied.iter().cloned().collect(),
            linear_optimization_status: None,
        }
    }

    fn no_activation() -> RangeActionActivationResult {
        RangeActionActivationResult::default()
    }

    fn candidates(combinations: &[NetworkActionCombination]) -> Candidates {
        combinations.iter().map(|c| (c.clone(), false)).collect()
    }

    fn single(action: &Arc<NetworkAction>) -> NetworkActionCombination {
        NetworkActionCombination::single(action.clone())
    }

    #[test]
    fn test_already_applied() {
        let (a, b) = (na("a", "FR"), na("b", "FR"));
        let pair = NetworkActionCombination::new([a.clone(), b.clone()]);
        let kept = AlreadyAppliedNetworkActionsFilter.filter(
            candidates(&[single(&a), single(&b), pair]),
            &leaf(&[a], no_activation()),
        );
        assert_eq!(kept.len(), 1);
        assert!(kept.contains_key(&single(&b)));
    }

    #[test]
    fn test_already_tested() {
        let (a, b, c) = (na("a", "FR"), na("b", "FR"), na("c", "FR"));
        let predefined = NetworkActionCombination::predefined([a.clone(), b.clone()]);
        let filter = AlreadyTestedCombinationsFilter::new(vec![predefined]);
        let kept = filter.filter(
            candidates(&[single(&b), single(&c)]),
            &leaf(&[a], no_activation()),
        );
        assert!(!kept.contains_key(&single(&b)));
        assert!(kept.contains_key(&single(&c)));
    }

    #[test]
    fn test_max_ra_flags_range_actions() {
        let (a, b, c) = (na("a", "FR"), na("b", "FR"), na("c", "FR"));
        let pair = NetworkActionCombination::new([b.clone(), c.clone()]);
        let mut activation = RangeActionActivationResult::new(RangeActionSetpointResult::new(
            [("pst".to_string(), 0.0)].into(),
        ));
        activation.set_optimized_setpoint("pst", 1.0);

        let kept = MaxRaFilter::new(Some(3)).filter(
            candidates(&[single(&b), pair.clone()]),
            &leaf(&[a], activation),
        );
        // 1 applied + 1 range action + 1 = 3 fits, 1 + 2 fits only without the range action
        assert_eq!(kept.get(&single(&b)), Some(&false));
        assert_eq!(kept.get(&pair), Some(&true));

        let kept = MaxRaFilter::new(Some(2)).filter(candidates(&[pair.clone()]), &leaf(&[na("a", "FR")], no_activation()));
        assert!(kept.is_empty());
    }

    #[test]
    fn test_max_ra_per_tso() {
        let (fr1, fr2, be) = (na("fr1", "FR"), na("fr2", "FR"), na("be", "BE"));
        let perimeter = Arc::new(OptimizationPerimeter::new(State::preventive()));
        let filter = MaxRaPerTsoFilter::new(
            perimeter,
            [("FR".to_string(), 3)].into(),
            [("FR".to_string(), 1)].into(),
        );
        let pair = NetworkActionCombination::new([fr2.clone(), be.clone()]);
        let kept = filter.filter(
            candidates(&[single(&fr2), single(&be), pair]),
            &leaf(&[fr1], no_activation()),
        );
        // FR already used its single topological action
        assert_eq!(kept.len(), 1);
        assert!(kept.contains_key(&single(&be)));
    }

    #[test]
    fn test_max_tso() {
        let (fr, be, nl) = (na("fr", "FR"), na("be", "BE"), na("nl", "NL"));
        let perimeter = Arc::new(
            OptimizationPerimeter::new(State::preventive()).with_range_action(
                RangeAction::injection("ra-nl", "gen-nl", -100.0, 100.0).with_operator("NL"),
            ),
        );
        let mut activation = RangeActionActivationResult::new(RangeActionSetpointResult::new(
            [("ra-nl".to_string(), 0.0)].into(),
        ));
        activation.set_optimized_setpoint("ra-nl", 50.0);
        let be_nl = NetworkActionCombination::new([be.clone(), nl.clone()]);

        let kept = MaxTsoFilter::new(perimeter, Some(2)).filter(
            candidates(&[single(&be), be_nl.clone(), single(&nl)]),
            &leaf(&[fr], activation),
        );
        // BE would be a third operator once the NL range action is counted
        assert_eq!(kept.get(&single(&be)), Some(&true));
        assert_eq!(kept.get(&be_nl), None);
        assert_eq!(kept.get(&single(&nl)), Some(&false));
    }

    #[test]
    fn test_cardinality_filters_are_safe() {
        let actions: Vec<Arc<NetworkAction>> = ["FR", "FR", "BE", "BE", "NL", "DE"]
            .iter()
            .enumerate()
            .map(|(i, tso)| na(&format!("na{i}"), tso))
            .collect();
        let applied = vec![actions[0].clone()];
        let mut all = Vec::new();
        for i in 1..actions.len() {
            all.push(single(&actions[i]));
            for j in i + 1..actions.len() {
                all.push(NetworkActionCombination::new([actions[i].clone(), actions[j].clone()]));
            }
        }
        let perimeter = Arc::new(OptimizationPerimeter::new(State::preventive()));
        let max_ra_per_tso: BTreeMap<String, usize> = [("FR".to_string(), 1), ("BE".to_string(), 1)].into();
        let from = leaf(&applied, no_activation());

        let mut kept = candidates(&all);
        kept = MaxRaFilter::new(Some(2)).filter(kept, &from);
        kept = MaxRaPerTsoFilter::new(perimeter.clone(), max_ra_per_tso.clone(), BTreeMap::new())
            .filter(kept, &from);
        kept = MaxTsoFilter::new(perimeter, Some(2)).filter(kept, &from);

        assert!(!kept.is_empty());
        for combination in kept.keys() {
            assert!(combination.len() + applied.len() <= 2);
            for (tso, max) in &max_ra_per_tso {
                assert!(combination.count_for_operator(tso) + applied_for_operator(&from, tso) <= *max);
            }
            let mut operators = combination.operators().clone();
            operators.insert("FR".to_string());
            assert!(operators.len() <= 2);
        }
    }

    #[test]
    fn test_far_from_most_limiting_element() {
        let fr = Country::new("FR");
        let network = Arc::new(
            LinearNetwork::new("net")
                .with_countries("line-fr", vec![Some(fr.clone()), Some(fr.clone())])
                .with_countries("near-line", vec![Some(Country::new("BE"))])
                .with_countries("far-line", vec![Some(Country::new("PL"))]),
        );
        let perimeter = Arc::new(
            OptimizationPerimeter::new(State::preventive())
                .with_flow_cnec(FlowCnec::new("cnec-fr", "line-fr", State::preventive())),
        );
        let graph = CountryGraph::from_borders([("FR", "BE"), ("BE", "DE"), ("DE", "PL")]);
        let filter = FarFromMostLimitingElementFilter::new(network, perimeter, graph, 1);

        let near = Arc::new(NetworkAction::open("near", "near-line"));
        let far = Arc::new(NetworkAction::open("far", "far-line"));
        let unknown = Arc::new(NetworkAction::open("unknown", "nowhere"));
        let mut from = leaf(&[], no_activation());
        from.objective.most_limiting_elements = vec!["cnec-fr".to_string()];

        let kept = filter.filter(candidates(&[single(&near), single(&far), single(&unknown)]), &from);
        assert!(kept.contains_key(&single(&near)));
        assert!(!kept.contains_key(&single(&far)));
        assert!(kept.contains_key(&single(&unknown)));
    }

    #[test]
    fn test_max_elementary_actions_counts_moved_taps() {
        let taps = (-5..=5).map(|t| (t, t as f64)).collect();
        let perimeter = Arc::new(
            OptimizationPerimeter::new(State::preventive())
                .with_range_action(RangeAction::pst("pst", "pst-element", taps).with_operator("FR")),
        );
        let setpoints = RangeActionSetpointResult::new([("pst".to_string(), 0.0)].into());
        let mut activation = RangeActionActivationResult::new(setpoints.clone());
        activation.set_optimized_setpoint("pst", 2.0);
        let filter = MaxElementaryActionsPerTsoFilter::new(
            perimeter,
            setpoints,
            [("FR".to_string(), 2)].into(),
        );

        let double = Arc::new(
            NetworkAction::new(
                "double",
                vec![
                    rao_core::ElementaryAction::Topology { element_id: "l1".into(), connect: false },
                    rao_core::ElementaryAction::Topology { element_id: "l2".into(), connect: false },
                    rao_core::ElementaryAction::Topology { element_id: "l3".into(), connect: false },
                ],
            )
            .with_operator("FR"),
        );
        let simple = na("simple", "FR");
        let kept = filter.filter(candidates(&[single(&double), single(&simple)]), &leaf(&[], activation));
        assert!(!kept.contains_key(&single(&double)));
        // one topological action plus two moved taps exceeds the cap
        assert_eq!(kept.get(&single(&simple)), Some(&true));
    }

    #[test]
    fn test_has_impact_on_network() {
        let network = Arc::new(LinearNetwork::new("net").with_switchable("l1").with_switchable("l2"));
        let open_l1 = Arc::new(NetworkAction::open("open-l1", "l1"));
        let open_l1_again = Arc::new(NetworkAction::open("open-l1-again", "l1"));
        let open_l2 = Arc::new(NetworkAction::open("open-l2", "l2"));

        let kept = HasImpactOnNetworkFilter::new(network).filter(
            candidates(&[single(&open_l1_again), single(&open_l2)]),
            &leaf(&[open_l1], no_activation()),
        );
        assert_eq!(kept.len(), 1);
        assert!(kept.contains_key(&single(&open_l2)));
    }

    #[test]
    fn test_on_flow_constraint() {
        let network = Arc::new(LinearNetwork::new("net"));
        let perimeter = Arc::new(
            OptimizationPerimeter::new(State::preventive())
                .with_flow_cnec(FlowCnec::new("overloaded", "l1", State::preventive()).with_bounds(None, Some(100.0)))
                .with_flow_cnec(FlowCnec::new("secure", "l2", State::preventive()).with_bounds(None, Some(100.0))),
        );
        let rule = |cnec: &str| UsageRule::OnFlowConstraint {
            instant: InstantKind::Preventive,
            cnec_id: cnec.to_string(),
        };
        let triggered = Arc::new(NetworkAction::open("triggered", "x").with_usage_rules(vec![rule("overloaded")]));
        let idle = Arc::new(NetworkAction::open("idle", "y").with_usage_rules(vec![rule("secure")]));
        let free = Arc::new(NetworkAction::open("free", "z"));

        let mut from = leaf(&[], no_activation());
        from.flow_result = FlowResult::new(ComputationStatus::Success)
            .with_flow("overloaded", 120.0)
            .with_flow("secure", 20.0);
        let kept = OnFlowConstraintFilter::new(network, perimeter, Unit::Megawatt).filter(
            candidates(&[single(&triggered), single(&idle), single(&free)]),
            &from,
        );
        assert!(kept.contains_key(&single(&triggered)));
        assert!(!kept.contains_key(&single(&idle)));
        assert!(kept.contains_key(&single(&free)));
    }
}

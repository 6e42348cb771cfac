use rao_core::{NetworkAction, OptimizationPerimeter, RaoError, RaoResult};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// A set of network actions tried together as one child of a leaf.
///
/// Equality and ordering only look at the set of actions; the flags describe
/// where the combination comes from and only matter for prioritisation.
#[derive(Debug, Clone)]
pub struct NetworkActionCombination {
    network_actions: BTreeSet<Arc<NetworkAction>>,
    operators: BTreeSet<String>,
    concatenated_id: String,
    detected_during_rao: bool,
    predefined: bool,
}

impl NetworkActionCombination {
    pub fn new(network_actions: impl IntoIterator<Item = Arc<NetworkAction>>) -> Self {
        let network_actions: BTreeSet<Arc<NetworkAction>> = network_actions.into_iter().collect();
        let operators = network_actions
            .iter()
            .filter_map(|na| na.operator.clone())
            .collect();
        let concatenated_id = network_actions
            .iter()
            .map(|na| na.id.as_str())
            .collect::<Vec<_>>()
            .join(" + ");
        Self {
            network_actions,
            operators,
            concatenated_id,
            detected_during_rao: false,
            predefined: false,
        }
    }

    pub fn single(network_action: Arc<NetworkAction>) -> Self {
        Self::new([network_action])
    }

    /// Combination supplied by the user.
    pub fn predefined(network_actions: impl IntoIterator<Item = Arc<NetworkAction>>) -> Self {
        Self {
            predefined: true,
            ..Self::new(network_actions)
        }
    }

    /// Combination found worth trying by an earlier optimisation of the
    /// same situation.
    pub fn detected_during_rao(network_actions: impl IntoIterator<Item = Arc<NetworkAction>>) -> Self {
        Self {
            detected_during_rao: true,
            predefined: true,
            ..Self::new(network_actions)
        }
    }

    pub fn network_actions(&self) -> &BTreeSet<Arc<NetworkAction>> {
        &self.network_actions
    }

    /// Distinct operators of the member actions; actions without an
    /// operator are not counted.
    pub fn operators(&self) -> &BTreeSet<String> {
        &self.operators
    }

    pub fn concatenated_id(&self) -> &str {
        &self.concatenated_id
    }

    pub fn is_detected_during_rao(&self) -> bool {
        self.detected_during_rao
    }

    pub fn is_predefined(&self) -> bool {
        self.predefined
    }

    pub fn len(&self) -> usize {
        self.network_actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.network_actions.is_empty()
    }

    pub fn contains(&self, network_action: &NetworkAction) -> bool {
        self.network_actions.iter().any(|na| na.as_ref() == network_action)
    }

    /// Number of member actions belonging to `operator`.
    pub fn count_for_operator(&self, operator: &str) -> usize {
        self.network_actions
            .iter()
            .filter(|na| na.operator.as_deref() == Some(operator))
            .count()
    }

    pub fn elementary_action_count(&self) -> usize {
        self.network_actions
            .iter()
            .map(|na| na.elementary_action_count())
            .sum()
    }

    /// CRC32 of the concatenated id, read as a signed integer.
    pub fn checksum(&self) -> i32 {
        crc32fast::hash(self.concatenated_id.as_bytes()) as i32
    }
}

impl PartialEq for NetworkActionCombination {
    fn eq(&self, other: &Self) -> bool {
        self.network_actions == other.network_actions
    }
}

impl Eq for NetworkActionCombination {}

impl PartialOrd for NetworkActionCombination {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for NetworkActionCombination {
    fn cmp(&self, other: &Self) -> Ordering {
        self.network_actions.cmp(&other.network_actions)
    }
}

impl fmt::Display for NetworkActionCombination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.concatenated_id)
    }
}

/// Exploration priority of two combinations; `Less` is tried first and
/// wins ties on the stop criterion.
///
/// Combinations detected during the run come first, then predefined ones,
/// then larger ones. The CRC32 of the concatenated id settles the rest so
/// that the order never depends on thread scheduling.
pub fn compare_priority(a: &NetworkActionCombination, b: &NetworkActionCombination) -> Ordering {
    b.detected_during_rao
        .cmp(&a.detected_during_rao)
        .then_with(|| b.predefined.cmp(&a.predefined))
        .then_with(|| b.len().cmp(&a.len()))
        .then_with(|| a.checksum().cmp(&b.checksum()))
        .then_with(|| a.concatenated_id.cmp(&b.concatenated_id))
}

/// Resolve combinations given as lists of network action ids.
///
/// Every id must name a network action of the perimeter.
pub fn resolve_predefined_combinations(
    perimeter: &OptimizationPerimeter,
    combinations: &[Vec<String>],
) -> RaoResult<Vec<NetworkActionCombination>> {
    combinations
        .iter()
        .map(|ids| {
            let actions = ids
                .iter()
                .map(|id| {
                    perimeter.network_action(id).cloned().ok_or_else(|| {
                        RaoError::Config(format!(
                            "predefined combination refers to unknown network action '{id}'"
                        ))
                    })
                })
                .collect::<RaoResult<Vec<_>>>()?;
            Ok(NetworkActionCombination::predefined(actions))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn na(id: &str, tso: &str) -> Arc<NetworkAction> {
        Arc::new(NetworkAction::open(id, format!("{id}-line")).with_operator(tso))
    }

    #[test]
    fn test_operators_and_id() {
        let combination = NetworkActionCombination::new([na("b", "FR"), na("a", "FR"), na("c", "BE")]);
        assert_eq!(combination.concatenated_id(), "a + b + c");
        assert_eq!(
            combination.operators().iter().cloned().collect::<Vec<_>>(),
            vec!["BE".to_string(), "FR".to_string()]
        );
        assert_eq!(combination.count_for_operator("FR"), 2);
    }

    #[test]
    fn test_equality_ignores_flags() {
        let plain = NetworkActionCombination::new([na("a", "FR"), na("b", "FR")]);
        let predefined = NetworkActionCombination::predefined([na("b", "FR"), na("a", "FR")]);
        assert_eq!(plain, predefined);
    }

    #[test]
    fn test_priority_order() {
        let detected = NetworkActionCombination::detected_during_rao([na("z", "FR")]);
        let predefined = NetworkActionCombination::predefined([na("x", "FR"), na("y", "FR")]);
        let pair = NetworkActionCombination::new([na("a", "FR"), na("b", "FR")]);
        let single = NetworkActionCombination::single(na("c", "FR"));

        assert_eq!(compare_priority(&detected, &predefined), Ordering::Less);
        assert_eq!(compare_priority(&predefined, &pair), Ordering::Less);
        assert_eq!(compare_priority(&pair, &single), Ordering::Less);
        assert_eq!(compare_priority(&single, &detected), Ordering::Greater);
    }

    #[test]
    fn test_checksum_breaks_ties() {
        let a = NetworkActionCombination::single(na("a", "FR"));
        let b = NetworkActionCombination::single(na("b", "FR"));
        let expected = (crc32fast::hash(b"a") as i32).cmp(&(crc32fast::hash(b"b") as i32));
        assert_eq!(compare_priority(&a, &b), expected);
        assert_eq!(compare_priority(&a, &a), Ordering::Equal);
    }

    #[test]
    fn test_unknown_predefined_action() {
        let perimeter = OptimizationPerimeter::new(rao_core::State::preventive())
            .with_network_action(NetworkAction::open("a", "line"));
        assert!(resolve_predefined_combinations(&perimeter, &[vec!["a".into()]]).is_ok());
        assert!(resolve_predefined_combinations(&perimeter, &[vec!["nope".into()]]).is_err());
    }
}

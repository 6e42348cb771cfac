//! Remedial actions: discrete network actions and continuous range actions.
//!
//! A [`NetworkAction`] bundles one or more [`ElementaryAction`]s that are
//! applied together. A [`RangeAction`] exposes a continuous set-point
//! (a PST angle in degrees, an HVDC or injection set-point in MW).

use crate::country::Country;
use crate::error::{RaoError, RaoResult};
use crate::network::Network;
use crate::state::{InstantKind, State};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::hash::{Hash, Hasher};

/// Maximum distance, in degrees, between an angle and the closest tap angle
/// for the conversion to be accepted.
const ANGLE_TO_TAP_TOLERANCE: f64 = 1e-3;

/// A single modification of one network element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ElementaryAction {
    /// Open or close a switchable element
    Topology { element_id: String, connect: bool },
    /// Move a PST to a fixed tap
    PstSetpoint { element_id: String, tap: i32 },
    /// Set an HVDC line or injection to a fixed value (MW)
    InjectionSetpoint { element_id: String, setpoint: f64 },
}

impl ElementaryAction {
    pub fn element_id(&self) -> &str {
        match self {
            ElementaryAction::Topology { element_id, .. }
            | ElementaryAction::PstSetpoint { element_id, .. }
            | ElementaryAction::InjectionSetpoint { element_id, .. } => element_id,
        }
    }

    pub fn apply<N: Network>(&self, network: &mut N) -> bool {
        match self {
            ElementaryAction::Topology {
                element_id,
                connect,
            } => network.set_connected(element_id, *connect),
            ElementaryAction::PstSetpoint { element_id, tap } => {
                network.set_pst_tap(element_id, *tap)
            }
            ElementaryAction::InjectionSetpoint {
                element_id,
                setpoint,
            } => network.set_setpoint(element_id, *setpoint),
        }
    }

    /// False when the network is already in the state this action targets.
    pub fn has_impact_on_network<N: Network>(&self, network: &N) -> bool {
        match self {
            ElementaryAction::Topology {
                element_id,
                connect,
            } => network.is_connected(element_id) != Some(*connect),
            ElementaryAction::PstSetpoint { element_id, tap } => {
                network.pst_tap(element_id) != Some(*tap)
            }
            ElementaryAction::InjectionSetpoint {
                element_id,
                setpoint,
            } => network
                .setpoint(element_id)
                .map_or(true, |current| (current - setpoint).abs() > 1e-6),
        }
    }

    /// Two actions conflict when they drive the same element to different targets.
    pub fn is_compatible_with(&self, other: &ElementaryAction) -> bool {
        self.element_id() != other.element_id() || self == other
    }
}

/// When and under which conditions a network action may be used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum UsageRule {
    /// Always available at the given instant
    OnInstant { instant: InstantKind },
    /// Available when the given CNEC is overloaded
    OnFlowConstraint { instant: InstantKind, cnec_id: String },
    /// Available when any CNEC located in the given country is overloaded
    OnFlowConstraintInCountry {
        instant: InstantKind,
        country: Country,
    },
}

impl UsageRule {
    pub fn instant(&self) -> InstantKind {
        match self {
            UsageRule::OnInstant { instant }
            | UsageRule::OnFlowConstraint { instant, .. }
            | UsageRule::OnFlowConstraintInCountry { instant, .. } => *instant,
        }
    }

    pub fn is_defined_for(&self, state: &State) -> bool {
        self.instant() == state.instant.kind
    }
}

/// A discrete remedial action made of elementary actions.
///
/// Equality, hashing and ordering only look at the identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkAction {
    pub id: String,
    pub operator: Option<String>,
    pub elementary_actions: Vec<ElementaryAction>,
    /// Preventive only when omitted, as with [`NetworkAction::new`]
    #[serde(default = "preventive_usage_rules")]
    pub usage_rules: Vec<UsageRule>,
}

fn preventive_usage_rules() -> Vec<UsageRule> {
    vec![UsageRule::OnInstant {
        instant: InstantKind::Preventive,
    }]
}

impl NetworkAction {
    pub fn new(id: impl Into<String>, elementary_actions: Vec<ElementaryAction>) -> Self {
        Self {
            id: id.into(),
            operator: None,
            elementary_actions,
            usage_rules: preventive_usage_rules(),
        }
    }

    /// Single topological action opening `element_id`.
    pub fn open(id: impl Into<String>, element_id: impl Into<String>) -> Self {
        Self::new(
            id,
            vec![ElementaryAction::Topology {
                element_id: element_id.into(),
                connect: false,
            }],
        )
    }

    pub fn with_operator(mut self, operator: impl Into<String>) -> Self {
        self.operator = Some(operator.into());
        self
    }

    pub fn with_usage_rules(mut self, usage_rules: Vec<UsageRule>) -> Self {
        self.usage_rules = usage_rules;
        self
    }

    /// Apply every elementary action; false as soon as one is rejected.
    pub fn apply<N: Network>(&self, network: &mut N) -> bool {
        self.elementary_actions.iter().all(|ea| ea.apply(network))
    }

    pub fn has_impact_on_network<N: Network>(&self, network: &N) -> bool {
        self.elementary_actions
            .iter()
            .any(|ea| ea.has_impact_on_network(network))
    }

    pub fn is_compatible_with(&self, other: &NetworkAction) -> bool {
        self.elementary_actions.iter().all(|ea| {
            other
                .elementary_actions
                .iter()
                .all(|other_ea| ea.is_compatible_with(other_ea))
        })
    }

    pub fn elementary_action_count(&self) -> usize {
        self.elementary_actions.len()
    }

    /// Countries of all elements touched by this action.
    pub fn location<N: Network>(&self, network: &N) -> BTreeSet<Option<Country>> {
        self.elementary_actions
            .iter()
            .flat_map(|ea| network.element_countries(ea.element_id()))
            .collect()
    }
}

impl PartialEq for NetworkAction {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for NetworkAction {}

impl Hash for NetworkAction {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl PartialOrd for NetworkAction {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for NetworkAction {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }
}

/// Physical device behind a range action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum RangeActionKind {
    /// Phase-shifting transformer; set-points are angles in degrees
    Pst { tap_to_angle: BTreeMap<i32, f64> },
    Hvdc,
    Injection,
}

/// A continuous remedial action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeAction {
    pub id: String,
    pub network_element_id: String,
    pub operator: Option<String>,
    pub kind: RangeActionKind,
    pub min_setpoint: f64,
    pub max_setpoint: f64,
}

impl RangeAction {
    /// PST range action spanning its whole tap table.
    pub fn pst(
        id: impl Into<String>,
        network_element_id: impl Into<String>,
        tap_to_angle: BTreeMap<i32, f64>,
    ) -> Self {
        let min = tap_to_angle.values().copied().fold(f64::INFINITY, f64::min);
        let max = tap_to_angle
            .values()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max);
        Self {
            id: id.into(),
            network_element_id: network_element_id.into(),
            operator: None,
            kind: RangeActionKind::Pst { tap_to_angle },
            min_setpoint: min,
            max_setpoint: max,
        }
    }

    pub fn hvdc(id: impl Into<String>, network_element_id: impl Into<String>, min: f64, max: f64) -> Self {
        Self {
            id: id.into(),
            network_element_id: network_element_id.into(),
            operator: None,
            kind: RangeActionKind::Hvdc,
            min_setpoint: min,
            max_setpoint: max,
        }
    }

    pub fn injection(
        id: impl Into<String>,
        network_element_id: impl Into<String>,
        min: f64,
        max: f64,
    ) -> Self {
        Self {
            id: id.into(),
            network_element_id: network_element_id.into(),
            operator: None,
            kind: RangeActionKind::Injection,
            min_setpoint: min,
            max_setpoint: max,
        }
    }

    pub fn with_operator(mut self, operator: impl Into<String>) -> Self {
        self.operator = Some(operator.into());
        self
    }

    /// Restrict the admissible set-point range.
    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        self.min_setpoint = min;
        self.max_setpoint = max;
        self
    }

    pub fn is_pst(&self) -> bool {
        matches!(self.kind, RangeActionKind::Pst { .. })
    }

    pub fn tap_to_angle_map(&self) -> Option<&BTreeMap<i32, f64>> {
        match &self.kind {
            RangeActionKind::Pst { tap_to_angle } => Some(tap_to_angle),
            _ => None,
        }
    }

    pub fn min_admissible_setpoint(&self) -> f64 {
        self.min_setpoint
    }

    pub fn max_admissible_setpoint(&self) -> f64 {
        self.max_setpoint
    }

    pub fn tap_to_angle(&self, tap: i32) -> RaoResult<f64> {
        self.tap_to_angle_map()
            .and_then(|map| map.get(&tap).copied())
            .ok_or_else(|| {
                RaoError::Validation(format!("tap {} is not defined for PST '{}'", tap, self.id))
            })
    }

    /// Closest tap whose angle is within tolerance of the range covered by the table.
    pub fn angle_to_tap(&self, angle: f64) -> RaoResult<i32> {
        let map = self.tap_to_angle_map().ok_or_else(|| {
            RaoError::Validation(format!("range action '{}' is not a PST", self.id))
        })?;
        let min = map.values().copied().fold(f64::INFINITY, f64::min);
        let max = map.values().copied().fold(f64::NEG_INFINITY, f64::max);
        if angle < min - ANGLE_TO_TAP_TOLERANCE || angle > max + ANGLE_TO_TAP_TOLERANCE {
            return Err(RaoError::Validation(format!(
                "angle {:.4} is out of the range [{:.4}, {:.4}] of PST '{}'",
                angle, min, max, self.id
            )));
        }
        map.iter()
            .min_by(|(_, a), (_, b)| {
                (*a - angle)
                    .abs()
                    .partial_cmp(&(*b - angle).abs())
                    .unwrap_or(Ordering::Equal)
            })
            .map(|(tap, _)| *tap)
            .ok_or_else(|| RaoError::Validation(format!("PST '{}' has no taps", self.id)))
    }

    /// Set-point currently applied on `network`.
    pub fn current_setpoint<N: Network>(&self, network: &N) -> RaoResult<f64> {
        match &self.kind {
            RangeActionKind::Pst { .. } => {
                let tap = network.pst_tap(&self.network_element_id).ok_or_else(|| {
                    RaoError::Network(format!("unknown PST '{}'", self.network_element_id))
                })?;
                self.tap_to_angle(tap)
            }
            RangeActionKind::Hvdc | RangeActionKind::Injection => {
                network.setpoint(&self.network_element_id).ok_or_else(|| {
                    RaoError::Network(format!("unknown element '{}'", self.network_element_id))
                })
            }
        }
    }

    /// Apply `setpoint` on `network`; PSTs are moved to the closest tap.
    pub fn apply<N: Network>(&self, network: &mut N, setpoint: f64) -> RaoResult<()> {
        let applied = match &self.kind {
            RangeActionKind::Pst { .. } => {
                let tap = self.angle_to_tap(setpoint)?;
                network.set_pst_tap(&self.network_element_id, tap)
            }
            RangeActionKind::Hvdc | RangeActionKind::Injection => {
                network.set_setpoint(&self.network_element_id, setpoint)
            }
        };
        if applied {
            Ok(())
        } else {
            Err(RaoError::Network(format!(
                "could not apply set-point {:.4} of range action '{}'",
                setpoint, self.id
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pst() -> RangeAction {
        let taps = (-3..=3).map(|t| (t, t as f64 * 1.5)).collect();
        RangeAction::pst("pst-1", "pst-element", taps)
    }

    #[test]
    fn test_pst_range_from_table() {
        let pst = pst();
        assert_eq!(pst.min_admissible_setpoint(), -4.5);
        assert_eq!(pst.max_admissible_setpoint(), 4.5);
    }

    #[test]
    fn test_angle_to_tap_closest() {
        let pst = pst();
        assert_eq!(pst.angle_to_tap(1.4).unwrap(), 1);
        assert_eq!(pst.angle_to_tap(-2.9).unwrap(), -2);
        assert!(pst.angle_to_tap(10.0).is_err());
    }

    #[test]
    fn test_elementary_compatibility() {
        let open = ElementaryAction::Topology {
            element_id: "line".into(),
            connect: false,
        };
        let close = ElementaryAction::Topology {
            element_id: "line".into(),
            connect: true,
        };
        let other = ElementaryAction::Topology {
            element_id: "other".into(),
            connect: true,
        };
        assert!(open.is_compatible_with(&open.clone()));
        assert!(!open.is_compatible_with(&close));
        assert!(open.is_compatible_with(&other));
    }

    #[test]
    fn test_network_action_identity() {
        let a = NetworkAction::open("na", "line-1");
        let b = NetworkAction::open("na", "line-2");
        assert_eq!(a, b);
        assert!(NetworkAction::open("a", "x") < NetworkAction::open("b", "x"));
    }
}

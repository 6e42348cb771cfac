//! Search-tree configuration.
//!
//! Parameters are plain serde structures with defaults for every field, so a
//! TOML file only needs the values it changes:
//!
//! ```toml
//! [objective]
//! kind = "max-min-margin"
//! stop-criterion = "at-target-objective-value"
//! target-objective-value = -50.0
//!
//! [tree]
//! max-search-tree-depth = 3
//! leaves-in-parallel = 4
//!
//! [ra-usage-limits]
//! max-ra = 5
//! max-ra-per-tso = { FR = 2 }
//! ```

use crate::linear_problem::LpSolverKind;
use anyhow::Context;
use rao_core::{RaoError, RaoResult, Unit};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

/// Quantity maximised by the optimiser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ObjectiveKind {
    #[default]
    MaxMinMargin,
    MaxMinRelativeMargin,
}

impl ObjectiveKind {
    pub fn is_relative(&self) -> bool {
        matches!(self, ObjectiveKind::MaxMinRelativeMargin)
    }
}

/// When the search tree may stop before exhausting its depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StopCriterion {
    /// Never stop early: minimise the objective as far as possible
    #[default]
    MinObjective,
    /// Stop as soon as a leaf's cost is below the target value
    AtTargetObjectiveValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ObjectiveParameters {
    pub kind: ObjectiveKind,
    pub unit: Unit,
    pub stop_criterion: StopCriterion,
    pub target_objective_value: f64,
}

impl Default for ObjectiveParameters {
    fn default() -> Self {
        Self {
            kind: ObjectiveKind::MaxMinMargin,
            unit: Unit::Megawatt,
            stop_criterion: StopCriterion::MinObjective,
            target_objective_value: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct TreeParameters {
    pub max_search_tree_depth: usize,
    pub relative_network_action_minimum_impact_threshold: f64,
    pub absolute_network_action_minimum_impact_threshold: f64,
    /// Number of leaves evaluated concurrently; 0 means one per CPU
    pub leaves_in_parallel: usize,
    pub skip_network_actions_far_from_most_limiting_element: bool,
    pub max_number_of_boundaries_for_skipping_network_actions: usize,
    /// Network action combinations (by id) tried as a single candidate
    pub predefined_combinations: Vec<Vec<String>>,
    pub ra_range_shrinking: bool,
    /// How long a depth may wait for its leaves before giving up
    pub pool_wait_timeout_seconds: u64,
}

impl Default for TreeParameters {
    fn default() -> Self {
        Self {
            max_search_tree_depth: 2,
            relative_network_action_minimum_impact_threshold: 0.0,
            absolute_network_action_minimum_impact_threshold: 0.0,
            leaves_in_parallel: 1,
            skip_network_actions_far_from_most_limiting_element: false,
            max_number_of_boundaries_for_skipping_network_actions: 2,
            predefined_combinations: Vec::new(),
            ra_range_shrinking: false,
            pool_wait_timeout_seconds: 24 * 3600,
        }
    }
}

/// Caps on remedial action usage in the optimised state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RaUsageLimits {
    pub max_ra: Option<usize>,
    pub max_tso: Option<usize>,
    pub max_ra_per_tso: BTreeMap<String, usize>,
    pub max_topo_per_tso: BTreeMap<String, usize>,
    pub max_pst_per_tso: BTreeMap<String, usize>,
    pub max_elementary_actions_per_tso: BTreeMap<String, usize>,
}

impl RaUsageLimits {
    pub fn is_empty(&self) -> bool {
        self.max_ra.is_none()
            && self.max_tso.is_none()
            && self.max_ra_per_tso.is_empty()
            && self.max_topo_per_tso.is_empty()
            && self.max_pst_per_tso.is_empty()
            && self.max_elementary_actions_per_tso.is_empty()
    }
}

/// How PST set-points are modelled in the linear problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PstModel {
    #[default]
    Continuous,
    /// Integer tap variations around a locally linearised tap-to-angle curve
    ApproximatedIntegers,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct LinearOptimizerParameters {
    pub max_iterations: usize,
    pub pst_model: PstModel,
    pub solver: LpSolverKind,
    pub pst_sensitivity_threshold: f64,
    pub hvdc_sensitivity_threshold: f64,
    pub injection_sensitivity_threshold: f64,
    pub pst_penalty_cost: f64,
    pub hvdc_penalty_cost: f64,
    pub injection_penalty_cost: f64,
    /// Floor applied to PTDF zonal sums in relative margins
    pub ptdf_sum_lower_bound: f64,
}

impl Default for LinearOptimizerParameters {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            pst_model: PstModel::Continuous,
            solver: LpSolverKind::default(),
            pst_sensitivity_threshold: 0.0,
            hvdc_sensitivity_threshold: 0.0,
            injection_sensitivity_threshold: 0.0,
            pst_penalty_cost: 0.01,
            hvdc_penalty_cost: 0.001,
            injection_penalty_cost: 0.001,
            ptdf_sum_lower_bound: 0.01,
        }
    }
}

/// Big-M constants of the unoptimized CNEC filler.
///
/// The two factors apply to different constraints and are kept separate on
/// purpose: the margin-decrease detection uses `margin_decrease_factor`
/// times the largest CNEC threshold, the relaxation of the minimum margin
/// definition uses `minimum_margin_relaxation_factor` times the same
/// threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct BigMPolicy {
    pub margin_decrease_factor: f64,
    pub minimum_margin_relaxation_factor: f64,
}

impl Default for BigMPolicy {
    fn default() -> Self {
        Self {
            margin_decrease_factor: 20.0,
            minimum_margin_relaxation_factor: 2.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct UnoptimizedCnecParameters {
    pub operators_not_to_optimize: BTreeSet<String>,
    /// CNEC id -> id of the PST range action in series with it
    pub cnecs_in_series_with_psts: BTreeMap<String, String>,
    pub big_m: BigMPolicy,
}

impl UnoptimizedCnecParameters {
    pub fn is_active(&self) -> bool {
        !self.operators_not_to_optimize.is_empty() || !self.cnecs_in_series_with_psts.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct MnecParameters {
    /// MW
    pub acceptable_margin_decrease: f64,
    pub violation_cost: f64,
    pub constraint_adjustment_coefficient: f64,
}

impl Default for MnecParameters {
    fn default() -> Self {
        Self {
            acceptable_margin_decrease: 50.0,
            violation_cost: 10.0,
            constraint_adjustment_coefficient: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct LoopFlowParameters {
    /// MW
    pub acceptable_increase: f64,
    pub violation_cost: f64,
    pub constraint_adjustment_coefficient: f64,
}

impl Default for LoopFlowParameters {
    fn default() -> Self {
        Self {
            acceptable_increase: 0.0,
            violation_cost: 10.0,
            constraint_adjustment_coefficient: 0.0,
        }
    }
}

/// Complete configuration of one search-tree run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SearchTreeParameters {
    pub objective: ObjectiveParameters,
    pub tree: TreeParameters,
    pub ra_usage_limits: RaUsageLimits,
    pub linear_optimizer: LinearOptimizerParameters,
    pub unoptimized_cnecs: UnoptimizedCnecParameters,
    pub mnec: Option<MnecParameters>,
    pub loop_flow: Option<LoopFlowParameters>,
}

impl SearchTreeParameters {
    pub fn from_toml_str(content: &str) -> RaoResult<Self> {
        let parameters: SearchTreeParameters =
            toml::from_str(content).map_err(|e| RaoError::Parse(e.to_string()))?;
        parameters.validate()?;
        Ok(parameters)
    }

    pub fn from_path(path: impl AsRef<Path>) -> RaoResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading search-tree parameters from {}", path.display()))?;
        Self::from_toml_str(&content).map_err(|e| match e {
            RaoError::Parse(msg) => RaoError::Parse(format!("{}: {}", path.display(), msg)),
            other => other,
        })
    }

    pub fn to_toml_string(&self) -> RaoResult<String> {
        toml::to_string(self).map_err(|e| RaoError::Parse(e.to_string()))
    }

    pub fn validate(&self) -> RaoResult<()> {
        if self.objective.stop_criterion == StopCriterion::AtTargetObjectiveValue
            && !self.objective.target_objective_value.is_finite()
        {
            return Err(RaoError::Config(
                "target objective value must be finite".into(),
            ));
        }
        if self.linear_optimizer.max_iterations == 0 {
            return Err(RaoError::Config(
                "linear optimizer needs at least one iteration".into(),
            ));
        }
        if self.linear_optimizer.ptdf_sum_lower_bound <= 0.0 {
            return Err(RaoError::Config(
                "ptdf-sum-lower-bound must be strictly positive".into(),
            ));
        }
        let big_m = &self.unoptimized_cnecs.big_m;
        if big_m.margin_decrease_factor <= 0.0 || big_m.minimum_margin_relaxation_factor <= 0.0 {
            return Err(RaoError::Config("big-M factors must be strictly positive".into()));
        }
        let solver = self.linear_optimizer.solver;
        if !solver.supports_integer_variables() {
            let needs_integers = if self.linear_optimizer.pst_model == PstModel::ApproximatedIntegers {
                Some("pst-model = approximated-integers")
            } else if self.unoptimized_cnecs.is_active() {
                Some("unoptimized CNECs")
            } else if !self.ra_usage_limits.is_empty() {
                Some("remedial action usage limits")
            } else {
                None
            };
            if let Some(feature) = needs_integers {
                return Err(RaoError::Config(format!(
                    "{} needs integer variables, which solver {} does not support",
                    feature,
                    solver.as_str()
                )));
            }
        }
        if let Some(empty) = self
            .tree
            .predefined_combinations
            .iter()
            .position(|combination| combination.is_empty())
        {
            return Err(RaoError::Config(format!(
                "predefined combination #{} is empty",
                empty
            )));
        }
        Ok(())
    }
}

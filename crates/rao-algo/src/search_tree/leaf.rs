//! One node of the search tree.
//!
//! A leaf applies a set of network actions to its own network copy, gets
//! evaluated (one sensitivity computation) and may then have its range
//! actions optimised. Statuses only move forward:
//!
//! ```text
//! Created ──► Evaluated ──► Optimized
//!    │            │
//!    └────────────┴──► Error (sensitivity failure)
//! ```
//!
//! Once its results have been read, [`Leaf::finalize`] turns the leaf into a
//! [`FinalizedLeaf`] that keeps the results and gives the network back.

use super::combination::NetworkActionCombination;
use super::tree::SearchTreeInput;
use crate::fillers::RaLimitationParameters;
use crate::linear_optimizer::{
    apply_range_actions, IteratingLinearOptimizer, IteratingLinearOptimizerInput,
    LinearOptimizationResult, LinearOptimizationStatus,
};
use crate::parameters::{RaUsageLimits, SearchTreeParameters};
use rao_core::{
    ComputationStatus, FlowResult, Network, NetworkAction, ObjectiveFunction,
    ObjectiveFunctionResult, OptimizationPerimeter, RangeActionActivationResult,
    RangeActionSetpointResult, RaoError, RaoResult, SensitivityComputer, SensitivityOutcome,
    SensitivityResult,
};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LeafStatus {
    Created,
    Evaluated,
    Optimized,
    Error,
}

impl fmt::Display for LeafStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LeafStatus::Created => write!(f, "CREATED"),
            LeafStatus::Evaluated => write!(f, "EVALUATED"),
            LeafStatus::Optimized => write!(f, "OPTIMIZED"),
            LeafStatus::Error => write!(f, "ERROR"),
        }
    }
}

/// Read-only view of what a leaf reached: flows, cost and activated
/// remedial actions.
#[derive(Debug, Clone)]
pub struct OptimizationResult {
    pub flow_result: FlowResult,
    pub sensitivity_result: SensitivityResult,
    pub objective: ObjectiveFunctionResult,
    pub activation: RangeActionActivationResult,
    pub activated_network_actions: BTreeSet<Arc<NetworkAction>>,
    /// Status of the linear optimisation, `None` if range actions were not optimised
    pub linear_optimization_status: Option<LinearOptimizationStatus>,
}

impl OptimizationResult {
    pub fn cost(&self) -> f64 {
        self.objective.cost()
    }

    pub fn functional_cost(&self) -> f64 {
        self.objective.functional_cost
    }

    pub fn virtual_cost(&self) -> f64 {
        self.objective.virtual_cost()
    }

    pub fn is_activated(&self, network_action: &NetworkAction) -> bool {
        self.activated_network_actions
            .iter()
            .any(|na| na.as_ref() == network_action)
    }

    pub fn activated_network_action_ids(&self) -> Vec<String> {
        self.activated_network_actions
            .iter()
            .map(|na| na.id.clone())
            .collect()
    }

    /// Ids of range actions moved away from their pre-perimeter set-point.
    pub fn activated_range_actions(&self) -> Vec<String> {
        self.activation.activated_range_actions()
    }
}

/// A search-tree leaf holding its network copy.
pub struct Leaf<'n, N: Network> {
    perimeter: Arc<OptimizationPerimeter>,
    network: &'n mut N,
    applied_network_actions: BTreeSet<Arc<NetworkAction>>,
    activation_from_parent: RangeActionActivationResult,
    pre_perimeter_setpoints: RangeActionSetpointResult,
    status: LeafStatus,
    pre_optim_flows: Option<FlowResult>,
    pre_optim_sensitivities: Option<SensitivityResult>,
    pre_optim_objective: Option<ObjectiveFunctionResult>,
    post_optim: Option<LinearOptimizationResult>,
}

impl<'n, N: Network> Leaf<'n, N> {
    /// Root leaf: no network action, flows of the pre-perimeter computation.
    ///
    /// The root is `Evaluated` from the start (its objective is computed on
    /// the first [`Leaf::evaluate`]) unless that computation failed.
    pub fn root(
        perimeter: Arc<OptimizationPerimeter>,
        network: &'n mut N,
        pre_perimeter: &SensitivityOutcome,
        pre_perimeter_setpoints: RangeActionSetpointResult,
    ) -> Self {
        let failed = pre_perimeter.status() == ComputationStatus::Failure;
        Self {
            perimeter,
            network,
            applied_network_actions: BTreeSet::new(),
            activation_from_parent: RangeActionActivationResult::new(pre_perimeter_setpoints.clone()),
            pre_perimeter_setpoints,
            status: if failed {
                LeafStatus::Error
            } else {
                LeafStatus::Evaluated
            },
            pre_optim_flows: (!failed).then(|| pre_perimeter.flow_result.clone()),
            pre_optim_sensitivities: (!failed).then(|| pre_perimeter.sensitivity_result.clone()),
            pre_optim_objective: None,
            post_optim: None,
        }
    }

    /// Child of a leaf applying `parent_actions` plus `combination`.
    ///
    /// `network` must be in the pre-perimeter topology; every network action
    /// of the child is applied to it. Range actions are expected to already
    /// sit at the set-points of `activation_from_parent`.
    pub fn child(
        perimeter: Arc<OptimizationPerimeter>,
        network: &'n mut N,
        parent_actions: &BTreeSet<Arc<NetworkAction>>,
        combination: &NetworkActionCombination,
        activation_from_parent: RangeActionActivationResult,
        pre_perimeter_setpoints: RangeActionSetpointResult,
    ) -> RaoResult<Self> {
        let applied_network_actions: BTreeSet<Arc<NetworkAction>> = parent_actions
            .iter()
            .chain(combination.network_actions())
            .cloned()
            .collect();
        for na in &applied_network_actions {
            if !na.apply(&mut *network) {
                return Err(RaoError::ActionApplication(format!(
                    "{} could not be applied on the network",
                    na.id
                )));
            }
        }
        Ok(Self {
            perimeter,
            network,
            applied_network_actions,
            activation_from_parent,
            pre_perimeter_setpoints,
            status: LeafStatus::Created,
            pre_optim_flows: None,
            pre_optim_sensitivities: None,
            pre_optim_objective: None,
            post_optim: None,
        })
    }

    pub fn status(&self) -> LeafStatus {
        self.status
    }

    pub fn is_root(&self) -> bool {
        self.applied_network_actions.is_empty()
    }

    pub fn identifier(&self) -> String {
        leaf_identifier(&self.applied_network_actions)
    }

    pub fn applied_network_actions(&self) -> &BTreeSet<Arc<NetworkAction>> {
        &self.applied_network_actions
    }

    pub fn network(&self) -> &N {
        &*self.network
    }

    /// Run the sensitivity computation and the objective function.
    ///
    /// An already evaluated leaf only recomputes its objective. A failed
    /// sensitivity computation moves the leaf to `Error`.
    pub fn evaluate(
        &mut self,
        objective_function: &dyn ObjectiveFunction,
        sensitivity_computer: &dyn SensitivityComputer<N>,
    ) {
        match self.status {
            LeafStatus::Evaluated => {
                debug!(leaf = %self.identifier(), "leaf has already been evaluated");
                if let (Some(flows), Some(sensitivities)) =
                    (&self.pre_optim_flows, &self.pre_optim_sensitivities)
                {
                    self.pre_optim_objective = Some(objective_function.evaluate(
                        flows,
                        &self.activation_from_parent,
                        sensitivities,
                        ComputationStatus::Success,
                    ));
                }
            }
            LeafStatus::Optimized => {
                debug!(leaf = %self.identifier(), "leaf has already been optimized");
            }
            LeafStatus::Error => {
                debug!(leaf = %self.identifier(), "leaf evaluation already failed");
            }
            LeafStatus::Created => {
                debug!(leaf = %self.identifier(), "evaluating leaf");
                let outcome = sensitivity_computer.compute(&*self.network);
                if outcome.status() == ComputationStatus::Failure {
                    warn!(leaf = %self.identifier(), "failed to evaluate leaf: sensitivity analysis failed");
                    self.status = LeafStatus::Error;
                    return;
                }
                self.pre_optim_objective = Some(objective_function.evaluate(
                    &outcome.flow_result,
                    &self.activation_from_parent,
                    &outcome.sensitivity_result,
                    ComputationStatus::Success,
                ));
                self.pre_optim_flows = Some(outcome.flow_result);
                self.pre_optim_sensitivities = Some(outcome.sensitivity_result);
                self.status = LeafStatus::Evaluated;
            }
        }
    }

    /// Optimise the range actions of an evaluated leaf.
    ///
    /// Re-optimising an optimised leaf first puts the range actions back at
    /// the set-points inherited from the parent, so repeated calls with the
    /// same inputs give the same result.
    pub fn optimize(
        &mut self,
        input: &SearchTreeInput<N>,
        parameters: &SearchTreeParameters,
    ) -> RaoResult<()> {
        match self.status {
            LeafStatus::Created => {
                return Err(RaoError::InvalidState(format!(
                    "cannot optimize {}: it has not been evaluated",
                    self.identifier()
                )))
            }
            LeafStatus::Error => {
                return Err(RaoError::InvalidState(format!(
                    "cannot optimize {}: its evaluation failed",
                    self.identifier()
                )))
            }
            LeafStatus::Optimized => {
                debug!(leaf = %self.identifier(), "resetting range action set-points to their pre-optimization values");
                apply_range_actions(
                    &mut *self.network,
                    self.perimeter.range_actions(),
                    &self.activation_from_parent,
                )?;
            }
            LeafStatus::Evaluated => {}
        }

        if self.perimeter.range_actions().is_empty() {
            debug!(leaf = %self.identifier(), "no range action to optimize");
            return Ok(());
        }

        let ra_limitation = self.ra_limitation_parameters(&parameters.ra_usage_limits);
        let not_evaluated = || RaoError::InvalidState("leaf has no pre-optimization results".into());
        let flows = self.pre_optim_flows.as_ref().ok_or_else(not_evaluated)?;
        let sensitivities = self.pre_optim_sensitivities.as_ref().ok_or_else(not_evaluated)?;

        debug!(leaf = %leaf_identifier(&self.applied_network_actions), "optimizing leaf");
        let result = IteratingLinearOptimizer::new(parameters).optimize(
            IteratingLinearOptimizerInput {
                network: &mut *self.network,
                perimeter: &self.perimeter,
                pre_perimeter_flows: &input.pre_perimeter_outcome.flow_result,
                pre_perimeter_setpoints: &self.pre_perimeter_setpoints,
                pre_optimization_flows: flows,
                pre_optimization_sensitivities: sensitivities,
                activation_from_parent_leaf: &self.activation_from_parent,
                objective_function: input.objective_function.as_ref(),
                sensitivity_computer: input.sensitivity_computer.as_ref(),
                ra_limitation,
            },
        )?;
        self.post_optim = Some(result);
        self.status = LeafStatus::Optimized;
        Ok(())
    }

    /// Range action budget left once this leaf's network actions are
    /// counted against the usage limits.
    pub fn ra_limitation_parameters(&self, limits: &RaUsageLimits) -> Option<RaLimitationParameters> {
        if limits.is_empty() {
            return None;
        }
        let applied = &self.applied_network_actions;
        let operators: BTreeSet<String> = applied.iter().filter_map(|na| na.operator.clone()).collect();
        fn for_operator<'a>(
            applied: &'a BTreeSet<Arc<NetworkAction>>,
            tso: &'a str,
        ) -> impl Iterator<Item = &'a Arc<NetworkAction>> + 'a {
            applied.iter().filter(move |na| na.operator.as_deref() == Some(tso))
        }

        let max_ra_per_tso: BTreeMap<String, usize> = limits
            .max_ra_per_tso
            .iter()
            .map(|(tso, max)| (tso.clone(), max.saturating_sub(for_operator(applied, tso).count())))
            .collect();
        let max_elementary_actions_per_tso = limits
            .max_elementary_actions_per_tso
            .iter()
            .map(|(tso, max)| {
                let used: usize = for_operator(applied, tso).map(|na| na.elementary_action_count()).sum();
                (tso.clone(), max.saturating_sub(used))
            })
            .collect();

        Some(RaLimitationParameters {
            max_ra: limits.max_ra.map(|max| max.saturating_sub(applied.len())),
            max_tso: limits.max_tso.map(|max| max.saturating_sub(operators.len())),
            max_tso_exclusions: operators,
            max_ra_per_tso,
            max_pst_per_tso: limits.max_pst_per_tso.clone(),
            max_elementary_actions_per_tso,
        })
    }

    /// Current results: pre-optimisation ones for an evaluated leaf,
    /// post-optimisation ones for an optimised leaf.
    pub fn result(&self) -> RaoResult<OptimizationResult> {
        match self.status {
            LeafStatus::Evaluated => {
                let missing = || {
                    RaoError::InvalidState(format!(
                        "{} has no evaluation results",
                        self.identifier()
                    ))
                };
                Ok(OptimizationResult {
                    flow_result: self.pre_optim_flows.clone().ok_or_else(missing)?,
                    sensitivity_result: self.pre_optim_sensitivities.clone().ok_or_else(missing)?,
                    objective: self.pre_optim_objective.clone().ok_or_else(missing)?,
                    activation: self.activation_from_parent.clone(),
                    activated_network_actions: self.applied_network_actions.clone(),
                    linear_optimization_status: None,
                })
            }
            LeafStatus::Optimized => {
                let post = self.post_optim.as_ref().ok_or_else(|| {
                    RaoError::InvalidState(format!("{} has no optimization results", self.identifier()))
                })?;
                Ok(OptimizationResult {
                    flow_result: post.flow_result.clone(),
                    sensitivity_result: post.sensitivity_result.clone(),
                    objective: post.objective.clone(),
                    activation: post.activation.clone(),
                    activated_network_actions: self.applied_network_actions.clone(),
                    linear_optimization_status: Some(post.status),
                })
            }
            LeafStatus::Created | LeafStatus::Error => Err(RaoError::InvalidState(format!(
                "no results available for {} ({})",
                self.identifier(),
                self.status
            ))),
        }
    }

    /// Keep the results, release the network.
    pub fn finalize(self) -> FinalizedLeaf {
        FinalizedLeaf {
            identifier: self.identifier(),
            status: self.status,
            result: self.result().ok(),
            applied_network_actions: self.applied_network_actions,
        }
    }
}

impl<N: Network> fmt::Display for Leaf<'_, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.identifier())?;
        match self.result() {
            Ok(result) => write_costs(f, self.status, &result),
            Err(_) => Ok(()),
        }
    }
}

/// A leaf whose network has been released. Only its results remain.
#[derive(Debug, Clone)]
pub struct FinalizedLeaf {
    identifier: String,
    status: LeafStatus,
    applied_network_actions: BTreeSet<Arc<NetworkAction>>,
    result: Option<OptimizationResult>,
}

impl FinalizedLeaf {
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn status(&self) -> LeafStatus {
        self.status
    }

    pub fn is_root(&self) -> bool {
        self.applied_network_actions.is_empty()
    }

    pub fn applied_network_actions(&self) -> &BTreeSet<Arc<NetworkAction>> {
        &self.applied_network_actions
    }

    pub fn result(&self) -> RaoResult<&OptimizationResult> {
        self.result.as_ref().ok_or_else(|| {
            RaoError::InvalidState(format!(
                "no results available for {} ({})",
                self.identifier, self.status
            ))
        })
    }

    /// Total cost; infinite for a leaf without results.
    pub fn cost(&self) -> f64 {
        self.result.as_ref().map_or(f64::INFINITY, |r| r.cost())
    }

    pub fn virtual_cost(&self) -> f64 {
        self.result.as_ref().map_or(f64::INFINITY, |r| r.virtual_cost())
    }
}

impl fmt::Display for FinalizedLeaf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.identifier)?;
        match &self.result {
            Some(result) => write_costs(f, self.status, result),
            None => Ok(()),
        }
    }
}

fn write_costs(f: &mut fmt::Formatter<'_>, status: LeafStatus, result: &OptimizationResult) -> fmt::Result {
    if status == LeafStatus::Optimized {
        match result.activated_range_actions().len() {
            0 => write!(f, ", no range action(s) activated")?,
            n => write!(f, ", {n} range action(s) activated")?,
        }
    }
    write!(
        f,
        ", cost: {:.2} (functional: {:.2}, virtual: {:.2}",
        result.cost(),
        result.functional_cost(),
        result.virtual_cost()
    )?;
    let detailed: Vec<String> = result
        .objective
        .virtual_costs
        .iter()
        .filter(|(_, cost)| **cost > 1e-6)
        .map(|(name, cost)| format!("{name}={cost:.2}"))
        .collect();
    if detailed.is_empty() {
        write!(f, ")")
    } else {
        write!(f, " {{{}}})", detailed.join(", "))
    }
}

fn leaf_identifier(network_actions: &BTreeSet<Arc<NetworkAction>>) -> String {
    if network_actions.is_empty() {
        "Root leaf".to_string()
    } else {
        let ids: Vec<&str> = network_actions.iter().map(|na| na.id.as_str()).collect();
        format!("network action(s): {}", ids.join(", "))
    }
}

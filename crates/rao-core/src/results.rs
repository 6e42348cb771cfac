//! Computation results exchanged between the optimiser and its collaborators.
//!
//! All results are plain values keyed by identifier. They are produced once
//! (by a sensitivity computation, an objective evaluation or a linear
//! optimisation) and only read afterwards.

use crate::cnec::{FlowCnec, Unit};
use crate::error::{RaoError, RaoResult};
use crate::network::Network;
use crate::remedial_action::RangeAction;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Set-points closer than this are considered equal.
pub const SETPOINT_ACTIVATION_EPSILON: f64 = 1e-6;

/// Outcome of an external computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ComputationStatus {
    #[default]
    Success,
    Failure,
}

/// Flows on CNECs, in MW, with optional loop-flow and PTDF data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowResult {
    flows: BTreeMap<String, f64>,
    commercial_flows: BTreeMap<String, f64>,
    ptdf_zonal_sums: BTreeMap<String, f64>,
    status: ComputationStatus,
}

impl FlowResult {
    pub fn new(status: ComputationStatus) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    pub fn with_flow(mut self, cnec_id: impl Into<String>, flow_mw: f64) -> Self {
        self.set_flow(cnec_id, flow_mw);
        self
    }

    pub fn set_flow(&mut self, cnec_id: impl Into<String>, flow_mw: f64) {
        self.flows.insert(cnec_id.into(), flow_mw);
    }

    pub fn set_commercial_flow(&mut self, cnec_id: impl Into<String>, flow_mw: f64) {
        self.commercial_flows.insert(cnec_id.into(), flow_mw);
    }

    pub fn set_ptdf_zonal_sum(&mut self, cnec_id: impl Into<String>, ptdf_sum: f64) {
        self.ptdf_zonal_sums.insert(cnec_id.into(), ptdf_sum);
    }

    pub fn status(&self) -> ComputationStatus {
        self.status
    }

    /// Flow on `cnec`, in `unit`.
    pub fn flow(&self, cnec: &FlowCnec, unit: Unit) -> RaoResult<f64> {
        self.flow_mw(&cnec.id)
            .map(|flow| flow * cnec.unit_conversion(unit))
    }

    pub fn flow_mw(&self, cnec_id: &str) -> RaoResult<f64> {
        self.flows.get(cnec_id).copied().ok_or_else(|| {
            RaoError::Validation(format!("no flow computed for CNEC '{}'", cnec_id))
        })
    }

    pub fn margin(&self, cnec: &FlowCnec, unit: Unit) -> RaoResult<f64> {
        Ok(cnec.compute_margin(self.flow_mw(&cnec.id)?, unit))
    }

    /// Margin divided by the PTDF zonal sum when positive, plain margin otherwise.
    pub fn relative_margin(&self, cnec: &FlowCnec, unit: Unit) -> RaoResult<f64> {
        let margin = self.margin(cnec, unit)?;
        if margin > 0.0 {
            Ok(margin / self.ptdf_zonal_sum(&cnec.id))
        } else {
            Ok(margin)
        }
    }

    /// Absolute PTDF zonal sum; 1.0 when none was computed.
    pub fn ptdf_zonal_sum(&self, cnec_id: &str) -> f64 {
        self.ptdf_zonal_sums
            .get(cnec_id)
            .map(|sum| sum.abs())
            .unwrap_or(1.0)
    }

    pub fn commercial_flow(&self, cnec_id: &str) -> f64 {
        self.commercial_flows.get(cnec_id).copied().unwrap_or(0.0)
    }

    /// Flow minus commercial flow, in MW.
    pub fn loop_flow(&self, cnec_id: &str) -> RaoResult<f64> {
        Ok(self.flow_mw(cnec_id)? - self.commercial_flow(cnec_id))
    }
}

/// Sensitivities of CNEC flows (MW) to range action set-points.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SensitivityResult {
    sensitivities: BTreeMap<String, BTreeMap<String, f64>>,
    status: ComputationStatus,
}

impl SensitivityResult {
    pub fn new(status: ComputationStatus) -> Self {
        Self {
            sensitivities: BTreeMap::new(),
            status,
        }
    }

    pub fn with_sensitivity(
        mut self,
        cnec_id: impl Into<String>,
        range_action_id: impl Into<String>,
        value: f64,
    ) -> Self {
        self.set_sensitivity(cnec_id, range_action_id, value);
        self
    }

    pub fn set_sensitivity(
        &mut self,
        cnec_id: impl Into<String>,
        range_action_id: impl Into<String>,
        value: f64,
    ) {
        self.sensitivities
            .entry(cnec_id.into())
            .or_default()
            .insert(range_action_id.into(), value);
    }

    pub fn status(&self) -> ComputationStatus {
        self.status
    }

    /// Sensitivity in MW per set-point unit; 0.0 when not computed.
    pub fn sensitivity(&self, cnec_id: &str, range_action_id: &str) -> f64 {
        self.sensitivities
            .get(cnec_id)
            .and_then(|per_ra| per_ra.get(range_action_id))
            .copied()
            .unwrap_or(0.0)
    }
}

/// Set-points of range actions at a given moment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RangeActionSetpointResult {
    setpoints: BTreeMap<String, f64>,
}

impl RangeActionSetpointResult {
    pub fn new(setpoints: BTreeMap<String, f64>) -> Self {
        Self { setpoints }
    }

    /// Read the set-points of `range_actions` from `network`.
    pub fn from_network<'a, N: Network>(
        network: &N,
        range_actions: impl IntoIterator<Item = &'a RangeAction>,
    ) -> RaoResult<Self> {
        let setpoints = range_actions
            .into_iter()
            .map(|ra| Ok((ra.id.clone(), ra.current_setpoint(network)?)))
            .collect::<RaoResult<BTreeMap<_, _>>>()?;
        Ok(Self { setpoints })
    }

    pub fn setpoint(&self, range_action_id: &str) -> RaoResult<f64> {
        self.setpoints.get(range_action_id).copied().ok_or_else(|| {
            RaoError::Validation(format!(
                "no set-point known for range action '{}'",
                range_action_id
            ))
        })
    }

    pub fn tap(&self, range_action: &RangeAction) -> RaoResult<i32> {
        range_action.angle_to_tap(self.setpoint(&range_action.id)?)
    }

    pub fn setpoints(&self) -> &BTreeMap<String, f64> {
        &self.setpoints
    }
}

/// Optimised set-points relative to a reference (pre-perimeter) point.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RangeActionActivationResult {
    reference: RangeActionSetpointResult,
    optimized: BTreeMap<String, f64>,
}

impl RangeActionActivationResult {
    /// Start with every range action at its reference set-point.
    pub fn new(reference: RangeActionSetpointResult) -> Self {
        let optimized = reference.setpoints.clone();
        Self {
            reference,
            optimized,
        }
    }

    pub fn reference(&self) -> &RangeActionSetpointResult {
        &self.reference
    }

    pub fn set_optimized_setpoint(&mut self, range_action_id: impl Into<String>, setpoint: f64) {
        self.optimized.insert(range_action_id.into(), setpoint);
    }

    pub fn optimized_setpoint(&self, range_action_id: &str) -> RaoResult<f64> {
        match self.optimized.get(range_action_id) {
            Some(setpoint) => Ok(*setpoint),
            None => self.reference.setpoint(range_action_id),
        }
    }

    pub fn optimized_setpoints(&self) -> &BTreeMap<String, f64> {
        &self.optimized
    }

    pub fn optimized_tap(&self, range_action: &RangeAction) -> RaoResult<i32> {
        range_action.angle_to_tap(self.optimized_setpoint(&range_action.id)?)
    }

    /// Identifiers of range actions moved away from their reference set-point.
    pub fn activated_range_actions(&self) -> Vec<String> {
        self.optimized
            .iter()
            .filter(|(id, setpoint)| {
                self.reference
                    .setpoints
                    .get(*id)
                    .map_or(true, |reference| {
                        (*setpoint - reference).abs() > SETPOINT_ACTIVATION_EPSILON
                    })
            })
            .map(|(id, _)| id.clone())
            .collect()
    }
}

/// Cost of a situation: functional part plus named virtual (penalty) parts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectiveFunctionResult {
    pub functional_cost: f64,
    pub virtual_costs: BTreeMap<String, f64>,
    /// CNEC ids, most limiting first
    pub most_limiting_elements: Vec<String>,
    /// CNEC ids responsible for each virtual cost, most costly first
    pub costly_elements: BTreeMap<String, Vec<String>>,
}

impl ObjectiveFunctionResult {
    pub fn new(functional_cost: f64) -> Self {
        Self {
            functional_cost,
            ..Self::default()
        }
    }

    pub fn with_virtual_cost(mut self, name: impl Into<String>, cost: f64) -> Self {
        self.virtual_costs.insert(name.into(), cost);
        self
    }

    pub fn virtual_cost(&self) -> f64 {
        self.virtual_costs.values().sum()
    }

    pub fn named_virtual_cost(&self, name: &str) -> f64 {
        self.virtual_costs.get(name).copied().unwrap_or(0.0)
    }

    pub fn cost(&self) -> f64 {
        self.functional_cost + self.virtual_cost()
    }

    pub fn most_limiting_elements(&self, n: usize) -> &[String] {
        let end = n.min(self.most_limiting_elements.len());
        &self.most_limiting_elements[..end]
    }

    pub fn costly_elements(&self, virtual_cost_name: &str, n: usize) -> &[String] {
        match self.costly_elements.get(virtual_cost_name) {
            Some(elements) => &elements[..n.min(elements.len())],
            None => &[],
        }
    }
}

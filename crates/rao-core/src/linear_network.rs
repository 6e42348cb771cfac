//! A linear (DC-style) reference network and its sensitivity computer.
//!
//! Flows are an affine function of the network state:
//!
//! ```text
//! F[c] = F0[c] + Σ{e disconnected} Δ[e, c] + Σ{e} s[e, c] * (v[e] - v0[e])
//! ```
//!
//! where `Δ` is the flow change caused by opening a switchable element,
//! `s` the sensitivity of the flow to the set-point of a PST (MW/degree) or
//! an HVDC/injection (MW/MW), and `v0` the set-point at which `F0` holds.
//! Because the model is exactly linear, one iteration of the linear
//! optimiser already lands on the true optimum, which makes it convenient
//! for tests.

use crate::cnec::FlowCnec;
use crate::country::Country;
use crate::network::Network;
use crate::remedial_action::{RangeAction, RangeActionKind};
use crate::results::{ComputationStatus, FlowResult, SensitivityResult};
use crate::sensitivity::{SensitivityComputer, SensitivityOutcome};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Default)]
struct LinearFlowModel {
    base_flows: BTreeMap<String, f64>,
    ptdf_zonal_sums: BTreeMap<String, f64>,
    commercial_flows: BTreeMap<String, f64>,
    opening_effects: BTreeMap<String, BTreeMap<String, f64>>,
    sensitivities: BTreeMap<String, BTreeMap<String, f64>>,
    reference_setpoints: BTreeMap<String, f64>,
    initially_connected: BTreeMap<String, bool>,
    pst_tables: BTreeMap<String, BTreeMap<i32, f64>>,
    countries: BTreeMap<String, Vec<Option<Country>>>,
}

/// Network whose flows are linear in topology and set-points.
///
/// The flow model is shared between clones; only the mutable state
/// (connection status, taps, set-points) is copied.
#[derive(Debug, Clone)]
pub struct LinearNetwork {
    id: String,
    model: Arc<LinearFlowModel>,
    connected: BTreeMap<String, bool>,
    taps: BTreeMap<String, i32>,
    setpoints: BTreeMap<String, f64>,
}

impl LinearNetwork {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            model: Arc::new(LinearFlowModel::default()),
            connected: BTreeMap::new(),
            taps: BTreeMap::new(),
            setpoints: BTreeMap::new(),
        }
    }

    fn model_mut(&mut self) -> &mut LinearFlowModel {
        Arc::make_mut(&mut self.model)
    }

    /// Declare the flow on `cnec_id` in the reference state.
    pub fn with_base_flow(mut self, cnec_id: impl Into<String>, flow_mw: f64) -> Self {
        self.model_mut().base_flows.insert(cnec_id.into(), flow_mw);
        self
    }

    pub fn with_ptdf_zonal_sum(mut self, cnec_id: impl Into<String>, ptdf_sum: f64) -> Self {
        self.model_mut()
            .ptdf_zonal_sums
            .insert(cnec_id.into(), ptdf_sum);
        self
    }

    pub fn with_commercial_flow(mut self, cnec_id: impl Into<String>, flow_mw: f64) -> Self {
        self.model_mut()
            .commercial_flows
            .insert(cnec_id.into(), flow_mw);
        self
    }

    /// Declare a switchable element, initially connected.
    pub fn with_switchable(mut self, element_id: impl Into<String>) -> Self {
        let element_id = element_id.into();
        self.model_mut()
            .initially_connected
            .insert(element_id.clone(), true);
        self.connected.insert(element_id, true);
        self
    }

    /// Flow change on `cnec_id` when `element_id` is opened.
    pub fn with_opening_effect(
        mut self,
        element_id: impl Into<String>,
        cnec_id: impl Into<String>,
        delta_mw: f64,
    ) -> Self {
        self.model_mut()
            .opening_effects
            .entry(element_id.into())
            .or_default()
            .insert(cnec_id.into(), delta_mw);
        self
    }

    /// Declare a PST at `tap`, using the tap table of `range_action`.
    pub fn with_pst(mut self, range_action: &RangeAction, tap: i32) -> Self {
        if let RangeActionKind::Pst { tap_to_angle } = &range_action.kind {
            let element = range_action.network_element_id.clone();
            let angle = tap_to_angle.get(&tap).copied().unwrap_or(0.0);
            let model = self.model_mut();
            model.pst_tables.insert(element.clone(), tap_to_angle.clone());
            model.reference_setpoints.insert(element.clone(), angle);
            self.taps.insert(element, tap);
        }
        self
    }

    /// Declare an HVDC line or injection at `setpoint` MW.
    pub fn with_injection(mut self, element_id: impl Into<String>, setpoint: f64) -> Self {
        let element_id = element_id.into();
        self.model_mut()
            .reference_setpoints
            .insert(element_id.clone(), setpoint);
        self.setpoints.insert(element_id, setpoint);
        self
    }

    pub fn with_sensitivity(
        mut self,
        element_id: impl Into<String>,
        cnec_id: impl Into<String>,
        sensitivity: f64,
    ) -> Self {
        self.model_mut()
            .sensitivities
            .entry(element_id.into())
            .or_default()
            .insert(cnec_id.into(), sensitivity);
        self
    }

    pub fn with_countries(mut self, element_id: impl Into<String>, countries: Vec<Option<Country>>) -> Self {
        self.model_mut()
            .countries
            .insert(element_id.into(), countries);
        self
    }

    fn current_value(&self, element_id: &str) -> Option<f64> {
        if let Some(tap) = self.taps.get(element_id) {
            return self
                .model
                .pst_tables
                .get(element_id)
                .and_then(|table| table.get(tap))
                .copied();
        }
        self.setpoints.get(element_id).copied()
    }

    /// Flow on `cnec_id` in the current state.
    pub fn flow(&self, cnec_id: &str) -> f64 {
        let mut flow = self.model.base_flows.get(cnec_id).copied().unwrap_or(0.0);
        for (element, connected) in &self.connected {
            let initially = self
                .model
                .initially_connected
                .get(element)
                .copied()
                .unwrap_or(true);
            if *connected == initially {
                continue;
            }
            let delta = self
                .model
                .opening_effects
                .get(element)
                .and_then(|effects| effects.get(cnec_id))
                .copied()
                .unwrap_or(0.0);
            flow += if *connected { -delta } else { delta };
        }
        for (element, per_cnec) in &self.model.sensitivities {
            let Some(sensitivity) = per_cnec.get(cnec_id) else {
                continue;
            };
            let reference = self
                .model
                .reference_setpoints
                .get(element)
                .copied()
                .unwrap_or(0.0);
            let current = self.current_value(element).unwrap_or(reference);
            flow += sensitivity * (current - reference);
        }
        flow
    }

    pub fn element_sensitivity(&self, element_id: &str, cnec_id: &str) -> f64 {
        self.model
            .sensitivities
            .get(element_id)
            .and_then(|per_cnec| per_cnec.get(cnec_id))
            .copied()
            .unwrap_or(0.0)
    }
}

impl Network for LinearNetwork {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_connected(&self, element_id: &str) -> Option<bool> {
        self.connected.get(element_id).copied()
    }

    fn set_connected(&mut self, element_id: &str, connected: bool) -> bool {
        match self.connected.get_mut(element_id) {
            Some(status) => {
                *status = connected;
                true
            }
            None => false,
        }
    }

    fn pst_tap(&self, element_id: &str) -> Option<i32> {
        self.taps.get(element_id).copied()
    }

    fn set_pst_tap(&mut self, element_id: &str, tap: i32) -> bool {
        let known_tap = self
            .model
            .pst_tables
            .get(element_id)
            .is_some_and(|table| table.contains_key(&tap));
        if !known_tap {
            return false;
        }
        self.taps.insert(element_id.to_string(), tap);
        true
    }

    fn setpoint(&self, element_id: &str) -> Option<f64> {
        self.setpoints.get(element_id).copied()
    }

    fn set_setpoint(&mut self, element_id: &str, setpoint: f64) -> bool {
        match self.setpoints.get_mut(element_id) {
            Some(value) => {
                *value = setpoint;
                true
            }
            None => false,
        }
    }

    fn element_countries(&self, element_id: &str) -> Vec<Option<Country>> {
        self.model
            .countries
            .get(element_id)
            .cloned()
            .unwrap_or_else(|| vec![None])
    }
}

/// Exact sensitivity computer for [`LinearNetwork`].
#[derive(Debug, Clone)]
pub struct LinearSensitivityComputer {
    cnecs: Vec<Arc<FlowCnec>>,
    range_actions: Vec<Arc<RangeAction>>,
    failing_when_open: BTreeSet<String>,
}

impl LinearSensitivityComputer {
    pub fn new(cnecs: Vec<Arc<FlowCnec>>, range_actions: Vec<Arc<RangeAction>>) -> Self {
        Self {
            cnecs,
            range_actions,
            failing_when_open: BTreeSet::new(),
        }
    }

    /// Report a failed computation whenever `element_id` is disconnected,
    /// mimicking a load flow that diverges on that topology.
    pub fn failing_when_open(mut self, element_id: impl Into<String>) -> Self {
        self.failing_when_open.insert(element_id.into());
        self
    }
}

impl SensitivityComputer<LinearNetwork> for LinearSensitivityComputer {
    fn compute(&self, network: &LinearNetwork) -> SensitivityOutcome {
        let diverges = self
            .failing_when_open
            .iter()
            .any(|element| network.is_connected(element) == Some(false));
        if diverges {
            debug!(network = network.id(), "linear sensitivity computation failed");
            return SensitivityOutcome::failure();
        }

        let mut flows = FlowResult::new(ComputationStatus::Success);
        let mut sensitivities = SensitivityResult::new(ComputationStatus::Success);
        for cnec in &self.cnecs {
            flows.set_flow(cnec.id.clone(), network.flow(&cnec.id));
            flows.set_commercial_flow(
                cnec.id.clone(),
                network
                    .model
                    .commercial_flows
                    .get(&cnec.id)
                    .copied()
                    .unwrap_or(0.0),
            );
            if let Some(sum) = network.model.ptdf_zonal_sums.get(&cnec.id) {
                flows.set_ptdf_zonal_sum(cnec.id.clone(), *sum);
            }
            for ra in &self.range_actions {
                sensitivities.set_sensitivity(
                    cnec.id.clone(),
                    ra.id.clone(),
                    network.element_sensitivity(&ra.network_element_id, &cnec.id),
                );
            }
        }
        SensitivityOutcome::new(flows, sensitivities)
    }
}

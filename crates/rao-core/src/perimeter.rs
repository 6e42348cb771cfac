//! Optimisation perimeter: what a search tree may look at and act on.

use crate::cnec::FlowCnec;
use crate::remedial_action::{NetworkAction, RangeAction};
use crate::state::State;
use std::sync::Arc;

/// CNECs and remedial actions in scope for one optimisation.
///
/// Collections are kept sorted by identifier so every iteration over them is
/// deterministic.
#[derive(Debug, Clone)]
pub struct OptimizationPerimeter {
    pub main_state: State,
    flow_cnecs: Vec<Arc<FlowCnec>>,
    network_actions: Vec<Arc<NetworkAction>>,
    range_actions: Vec<Arc<RangeAction>>,
}

impl OptimizationPerimeter {
    pub fn new(main_state: State) -> Self {
        Self {
            main_state,
            flow_cnecs: Vec::new(),
            network_actions: Vec::new(),
            range_actions: Vec::new(),
        }
    }

    pub fn with_flow_cnec(mut self, cnec: FlowCnec) -> Self {
        self.flow_cnecs.push(Arc::new(cnec));
        self.flow_cnecs.sort_by(|a, b| a.id.cmp(&b.id));
        self
    }

    pub fn with_network_action(mut self, action: NetworkAction) -> Self {
        self.network_actions.push(Arc::new(action));
        self.network_actions.sort_by(|a, b| a.id.cmp(&b.id));
        self
    }

    pub fn with_range_action(mut self, action: RangeAction) -> Self {
        self.range_actions.push(Arc::new(action));
        self.range_actions.sort_by(|a, b| a.id.cmp(&b.id));
        self
    }

    pub fn flow_cnecs(&self) -> &[Arc<FlowCnec>] {
        &self.flow_cnecs
    }

    pub fn optimized_flow_cnecs(&self) -> impl Iterator<Item = &Arc<FlowCnec>> {
        self.flow_cnecs.iter().filter(|c| c.optimized)
    }

    pub fn monitored_flow_cnecs(&self) -> impl Iterator<Item = &Arc<FlowCnec>> {
        self.flow_cnecs.iter().filter(|c| c.monitored)
    }

    pub fn loop_flow_cnecs(&self) -> impl Iterator<Item = &Arc<FlowCnec>> {
        self.flow_cnecs
            .iter()
            .filter(|c| c.loop_flow_threshold_mw.is_some())
    }

    /// True when no CNEC contributes to the functional cost.
    pub fn is_purely_virtual(&self) -> bool {
        self.optimized_flow_cnecs().next().is_none()
    }

    pub fn network_actions(&self) -> &[Arc<NetworkAction>] {
        &self.network_actions
    }

    pub fn range_actions(&self) -> &[Arc<RangeAction>] {
        &self.range_actions
    }

    pub fn flow_cnec(&self, id: &str) -> Option<&Arc<FlowCnec>> {
        self.flow_cnecs.iter().find(|c| c.id == id)
    }

    pub fn network_action(&self, id: &str) -> Option<&Arc<NetworkAction>> {
        self.network_actions.iter().find(|na| na.id == id)
    }

    pub fn range_action(&self, id: &str) -> Option<&Arc<RangeAction>> {
        self.range_actions.iter().find(|ra| ra.id == id)
    }
}

//! Sensitivity computation contract.

use crate::network::Network;
use crate::results::{ComputationStatus, FlowResult, SensitivityResult};

/// Flows and sensitivities computed on one network state.
#[derive(Debug, Clone, Default)]
pub struct SensitivityOutcome {
    pub flow_result: FlowResult,
    pub sensitivity_result: SensitivityResult,
}

impl SensitivityOutcome {
    pub fn new(flow_result: FlowResult, sensitivity_result: SensitivityResult) -> Self {
        Self {
            flow_result,
            sensitivity_result,
        }
    }

    pub fn failure() -> Self {
        Self {
            flow_result: FlowResult::new(ComputationStatus::Failure),
            sensitivity_result: SensitivityResult::new(ComputationStatus::Failure),
        }
    }

    pub fn status(&self) -> ComputationStatus {
        self.sensitivity_result.status()
    }
}

/// Turns a network state into flows and sensitivities for a fixed set of
/// CNECs and range actions.
///
/// Implementations must be shareable across worker threads; each call gets
/// its own network clone.
pub trait SensitivityComputer<N: Network>: Send + Sync {
    fn compute(&self, network: &N) -> SensitivityOutcome;
}

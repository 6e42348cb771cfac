//! # rao-core: Remedial Action Optimisation Domain Model
//!
//! Data structures and collaborator contracts used by the search-tree
//! remedial action optimiser in `rao-algo`.
//!
//! ## Design Philosophy
//!
//! The optimiser is agnostic of the grid model and of the load-flow engine.
//! Everything it needs from them goes through three contracts:
//!
//! - [`Network`]: a cloneable, mutable network state (topology, PST taps,
//!   HVDC/injection set-points, element locations)
//! - [`SensitivityComputer`]: turns a network state into flows and
//!   sensitivities
//! - [`ObjectiveFunction`]: turns flows into a cost
//!
//! ## Core Data Structures
//!
//! - [`FlowCnec`] - a monitored element with flow thresholds
//! - [`NetworkAction`] / [`ElementaryAction`] - discrete remedial actions
//! - [`RangeAction`] - continuous remedial actions (PST, HVDC, injection)
//! - [`OptimizationPerimeter`] - CNECs and actions in scope
//! - [`FlowResult`], [`SensitivityResult`], [`RangeActionActivationResult`],
//!   [`ObjectiveFunctionResult`] - computation results
//!
//! [`LinearNetwork`] and [`LinearSensitivityComputer`] provide an exact
//! linear implementation of the contracts for tests and small studies.

pub mod cnec;
pub mod country;
pub mod error;
pub mod linear_network;
pub mod network;
pub mod objective;
pub mod perimeter;
pub mod remedial_action;
pub mod results;
pub mod sensitivity;
pub mod state;

pub use cnec::{largest_cnec_threshold, BoundSide, FlowCnec, Unit};
pub use country::{Country, CountryGraph};
pub use error::{RaoError, RaoResult};
pub use linear_network::{LinearNetwork, LinearSensitivityComputer};
pub use network::Network;
pub use objective::{MarginObjectiveFunction, ObjectiveFunction, MNEC_COST, SENSITIVITY_FAILURE_COST};
pub use perimeter::OptimizationPerimeter;
pub use remedial_action::{ElementaryAction, NetworkAction, RangeAction, RangeActionKind, UsageRule};
pub use results::{
    ComputationStatus, FlowResult, ObjectiveFunctionResult, RangeActionActivationResult,
    RangeActionSetpointResult, SensitivityResult, SETPOINT_ACTIVATION_EPSILON,
};
pub use sensitivity::{SensitivityComputer, SensitivityOutcome};
pub use state::{Instant, InstantKind, State};

//! The network model contract.
//!
//! The optimiser never solves a power flow itself; it only mutates network
//! copies (topology, PST taps, HVDC/injection set-points) and hands them to a
//! [`crate::SensitivityComputer`]. Clones must be fully independent: mutating
//! one clone never affects another.

use crate::country::Country;

/// Mutable grid model consumed by the search tree.
///
/// Setters return `false` when the element does not exist or the value is
/// not accepted; they never panic.
pub trait Network: Clone + Send + Sync + 'static {
    /// Identifier used in logs.
    fn id(&self) -> &str;

    /// Connection status of a switchable element, `None` if unknown.
    fn is_connected(&self, element_id: &str) -> Option<bool>;

    fn set_connected(&mut self, element_id: &str, connected: bool) -> bool;

    /// Current tap of a phase-shifting transformer.
    fn pst_tap(&self, element_id: &str) -> Option<i32>;

    fn set_pst_tap(&mut self, element_id: &str, tap: i32) -> bool;

    /// Current set-point of an HVDC line or injection, in MW.
    fn setpoint(&self, element_id: &str) -> Option<f64>;

    fn set_setpoint(&mut self, element_id: &str, setpoint: f64) -> bool;

    /// Countries at the terminals of an element. `None` entries mean the
    /// terminal location is unknown.
    fn element_countries(&self, element_id: &str) -> Vec<Option<Country>>;
}

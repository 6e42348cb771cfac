//! Critical network elements and contingencies (CNECs).
//!
//! Only flow CNECs are modelled. Thresholds are stored in MW; conversion to
//! amperes uses the element's nominal voltage, `I = P * 1000 / (sqrt(3) * U)`.

use crate::state::State;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Flow unit used by objective functions and fillers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Unit {
    #[default]
    Megawatt,
    Ampere,
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unit::Megawatt => write!(f, "MW"),
            Unit::Ampere => write!(f, "A"),
        }
    }
}

/// Which threshold of a CNEC a margin is measured against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BoundSide {
    Lower,
    Upper,
}

/// A monitored element in a given state, with flow thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowCnec {
    pub id: String,
    pub network_element_id: String,
    pub operator: Option<String>,
    pub state: State,
    /// Margin on this CNEC is part of the objective
    pub optimized: bool,
    /// Margin on this CNEC must not degrade beyond an acceptable amount
    pub monitored: bool,
    pub lower_bound_mw: Option<f64>,
    pub upper_bound_mw: Option<f64>,
    pub nominal_voltage_kv: f64,
    pub loop_flow_threshold_mw: Option<f64>,
}

impl FlowCnec {
    pub fn new(id: impl Into<String>, network_element_id: impl Into<String>, state: State) -> Self {
        Self {
            id: id.into(),
            network_element_id: network_element_id.into(),
            operator: None,
            state,
            optimized: true,
            monitored: false,
            lower_bound_mw: None,
            upper_bound_mw: None,
            nominal_voltage_kv: 400.0,
            loop_flow_threshold_mw: None,
        }
    }

    pub fn with_operator(mut self, operator: impl Into<String>) -> Self {
        self.operator = Some(operator.into());
        self
    }

    pub fn with_bounds(mut self, lower_mw: Option<f64>, upper_mw: Option<f64>) -> Self {
        self.lower_bound_mw = lower_mw;
        self.upper_bound_mw = upper_mw;
        self
    }

    pub fn with_nominal_voltage(mut self, kv: f64) -> Self {
        self.nominal_voltage_kv = kv;
        self
    }

    pub fn with_loop_flow_threshold(mut self, threshold_mw: f64) -> Self {
        self.loop_flow_threshold_mw = Some(threshold_mw);
        self
    }

    /// Monitored-only CNEC (MNEC): kept out of the margin objective.
    pub fn as_monitored(mut self) -> Self {
        self.optimized = false;
        self.monitored = true;
        self
    }

    /// Factor converting a MW value on this element into `unit`.
    pub fn unit_conversion(&self, unit: Unit) -> f64 {
        match unit {
            Unit::Megawatt => 1.0,
            Unit::Ampere => 1000.0 / (3f64.sqrt() * self.nominal_voltage_kv),
        }
    }

    pub fn bound(&self, side: BoundSide, unit: Unit) -> Option<f64> {
        let bound = match side {
            BoundSide::Lower => self.lower_bound_mw,
            BoundSide::Upper => self.upper_bound_mw,
        };
        bound.map(|b| b * self.unit_conversion(unit))
    }

    /// Signed distance from `flow_mw` to the closest threshold, in `unit`.
    ///
    /// Returns `f64::MAX` for an element without any threshold.
    pub fn compute_margin(&self, flow_mw: f64, unit: Unit) -> f64 {
        let lower = self
            .lower_bound_mw
            .map(|lb| flow_mw - lb)
            .unwrap_or(f64::MAX);
        let upper = self
            .upper_bound_mw
            .map(|ub| ub - flow_mw)
            .unwrap_or(f64::MAX);
        let margin = lower.min(upper);
        if margin == f64::MAX {
            margin
        } else {
            margin * self.unit_conversion(unit)
        }
    }

    /// Largest absolute threshold, in MW.
    pub fn largest_threshold_mw(&self) -> f64 {
        let lower = self.lower_bound_mw.map(f64::abs).unwrap_or(0.0);
        let upper = self.upper_bound_mw.map(f64::abs).unwrap_or(0.0);
        lower.max(upper)
    }
}

/// Largest absolute threshold over a set of CNECs, in MW.
pub fn largest_cnec_threshold<'a>(cnecs: impl IntoIterator<Item = &'a FlowCnec>) -> f64 {
    cnecs
        .into_iter()
        .map(FlowCnec::largest_threshold_mw)
        .fold(0.0, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cnec() -> FlowCnec {
        FlowCnec::new("cnec-1", "line-1", State::preventive()).with_bounds(Some(-800.0), Some(800.0))
    }

    #[test]
    fn test_margin_in_mw() {
        let cnec = cnec();
        assert_eq!(cnec.compute_margin(500.0, Unit::Megawatt), 300.0);
        assert_eq!(cnec.compute_margin(-900.0, Unit::Megawatt), -100.0);
    }

    #[test]
    fn test_ampere_conversion() {
        let cnec = cnec();
        let factor = cnec.unit_conversion(Unit::Ampere);
        assert!((factor - 1000.0 / (3f64.sqrt() * 400.0)).abs() < 1e-12);
        let margin = cnec.compute_margin(500.0, Unit::Ampere);
        assert!((margin - 300.0 * factor).abs() < 1e-9);
    }

    #[test]
    fn test_one_sided_threshold() {
        let cnec = FlowCnec::new("c", "l", State::preventive()).with_bounds(None, Some(100.0));
        assert_eq!(cnec.compute_margin(40.0, Unit::Megawatt), 60.0);
        assert_eq!(cnec.bound(BoundSide::Lower, Unit::Megawatt), None);
    }

    #[test]
    fn test_largest_threshold() {
        let a = cnec();
        let b = FlowCnec::new("c2", "l2", State::preventive()).with_bounds(Some(-1200.0), None);
        assert_eq!(largest_cnec_threshold([&a, &b]), 1200.0);
    }
}

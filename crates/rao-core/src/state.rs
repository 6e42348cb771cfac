//! Instants and states of the security analysis.
//!
//! A [`State`] is an [`Instant`] optionally paired with a contingency. The
//! preventive state has no contingency; every post-outage state has one.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of an instant, in chronological order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InstantKind {
    Preventive,
    Outage,
    Auto,
    Curative,
}

/// A named instant with its chronological order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Instant {
    pub order: u32,
    pub id: String,
    pub kind: InstantKind,
}

impl Instant {
    pub fn new(id: impl Into<String>, kind: InstantKind, order: u32) -> Self {
        Self {
            order,
            id: id.into(),
            kind,
        }
    }

    pub fn preventive() -> Self {
        Self::new("preventive", InstantKind::Preventive, 0)
    }

    pub fn outage() -> Self {
        Self::new("outage", InstantKind::Outage, 1)
    }

    pub fn curative() -> Self {
        Self::new("curative", InstantKind::Curative, 3)
    }

    pub fn is_preventive(&self) -> bool {
        self.kind == InstantKind::Preventive
    }

    pub fn is_curative(&self) -> bool {
        self.kind == InstantKind::Curative
    }

    pub fn comes_before(&self, other: &Instant) -> bool {
        self.order < other.order
    }
}

/// An instant, optionally after a contingency.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct State {
    pub instant: Instant,
    pub contingency: Option<String>,
}

impl State {
    pub fn preventive() -> Self {
        Self {
            instant: Instant::preventive(),
            contingency: None,
        }
    }

    pub fn after_contingency(instant: Instant, contingency: impl Into<String>) -> Self {
        Self {
            instant,
            contingency: Some(contingency.into()),
        }
    }

    pub fn is_preventive(&self) -> bool {
        self.contingency.is_none()
    }

    /// Stable identifier, e.g. `"preventive"` or `"co-fr-be - curative"`.
    pub fn id(&self) -> String {
        match &self.contingency {
            Some(co) => format!("{} - {}", co, self.instant.id),
            None => self.instant.id.clone(),
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}

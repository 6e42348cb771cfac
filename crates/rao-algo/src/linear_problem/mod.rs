//! Solver-independent linear problem store.
//!
//! Problem fillers build and update the model through this type; the model
//! is translated into a `good_lp` problem only when [`LinearProblem::solve`]
//! is called. Every variable and constraint is registered under a typed key
//! so fillers can find what another filler created (the margin fillers read
//! the flow variables of the core filler, the unoptimized CNEC filler relaxes
//! the margin constraints, ...).
//!
//! ## Conventions
//!
//! - Bounds use `f64::INFINITY` / `f64::NEG_INFINITY` for "unbounded".
//! - The objective is always minimised.
//! - A key can only be registered once; a second registration is an error.

mod keys;
mod solver;

pub use keys::{AbsExtension, ConstraintKey, MarginExtension, VariableKey, VariationDirection};
pub use solver::LpSolverKind;

use rao_core::{RaoError, RaoResult};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use thiserror::Error;
use tracing::debug;

/// Errors raised while building or querying a linear problem.
#[derive(Debug, Error)]
pub enum LinearProblemError {
    #[error("variable {0} has already been created")]
    DuplicateVariable(VariableKey),
    #[error("constraint {0} has already been created")]
    DuplicateConstraint(ConstraintKey),
    #[error("variable {0} has not been created yet")]
    MissingVariable(VariableKey),
    #[error("constraint {0} has not been created yet")]
    MissingConstraint(ConstraintKey),
    #[error("invalid bounds [{lb}, {ub}] for {name}")]
    InvalidBounds { name: String, lb: f64, ub: f64 },
}

impl From<LinearProblemError> for RaoError {
    fn from(err: LinearProblemError) -> Self {
        RaoError::Solver(err.to_string())
    }
}

/// Handle to a variable of a [`LinearProblem`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VariableId(usize);

/// Handle to a constraint of a [`LinearProblem`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConstraintId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableKind {
    Continuous,
    Integer,
    Binary,
}

/// Outcome of a solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinearProblemStatus {
    Optimal,
    Infeasible,
    Unbounded,
    Abnormal,
    NotSolved,
}

impl fmt::Display for LinearProblemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LinearProblemStatus::Optimal => "OPTIMAL",
            LinearProblemStatus::Infeasible => "INFEASIBLE",
            LinearProblemStatus::Unbounded => "UNBOUNDED",
            LinearProblemStatus::Abnormal => "ABNORMAL",
            LinearProblemStatus::NotSolved => "NOT_SOLVED",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone)]
struct VariableData {
    key: VariableKey,
    lb: f64,
    ub: f64,
    kind: VariableKind,
}

#[derive(Debug, Clone)]
struct ConstraintData {
    key: ConstraintKey,
    lb: f64,
    ub: f64,
    coefficients: BTreeMap<VariableId, f64>,
}

/// Variables, constraints and objective of one leaf's linear optimisation.
#[derive(Debug, Clone)]
pub struct LinearProblem {
    variables: Vec<VariableData>,
    variable_index: HashMap<VariableKey, VariableId>,
    constraints: Vec<ConstraintData>,
    constraint_index: HashMap<ConstraintKey, ConstraintId>,
    objective: BTreeMap<VariableId, f64>,
    solver: LpSolverKind,
    solution: Option<Vec<f64>>,
    status: LinearProblemStatus,
}

impl LinearProblem {
    pub fn new(solver: LpSolverKind) -> Self {
        Self {
            variables: Vec::new(),
            variable_index: HashMap::new(),
            constraints: Vec::new(),
            constraint_index: HashMap::new(),
            objective: BTreeMap::new(),
            solver,
            solution: None,
            status: LinearProblemStatus::NotSolved,
        }
    }

    pub fn infinity() -> f64 {
        f64::INFINITY
    }

    pub fn solver(&self) -> LpSolverKind {
        self.solver
    }

    pub fn num_variables(&self) -> usize {
        self.variables.len()
    }

    pub fn num_constraints(&self) -> usize {
        self.constraints.len()
    }

    pub fn add_variable(
        &mut self,
        key: VariableKey,
        lb: f64,
        ub: f64,
        kind: VariableKind,
    ) -> Result<VariableId, LinearProblemError> {
        if self.variable_index.contains_key(&key) {
            return Err(LinearProblemError::DuplicateVariable(key));
        }
        check_bounds(&key.to_string(), lb, ub)?;
        let id = VariableId(self.variables.len());
        self.variable_index.insert(key.clone(), id);
        self.variables.push(VariableData { key, lb, ub, kind });
        Ok(id)
    }

    pub fn variable(&self, key: &VariableKey) -> Option<VariableId> {
        self.variable_index.get(key).copied()
    }

    /// Like [`variable`](Self::variable) but a missing key is an error.
    pub fn require_variable(&self, key: &VariableKey) -> Result<VariableId, LinearProblemError> {
        self.variable(key)
            .ok_or_else(|| LinearProblemError::MissingVariable(key.clone()))
    }

    pub fn variable_key(&self, id: VariableId) -> &VariableKey {
        &self.variables[id.0].key
    }

    pub fn variable_kind(&self, id: VariableId) -> VariableKind {
        self.variables[id.0].kind
    }

    pub fn variable_bounds(&self, id: VariableId) -> (f64, f64) {
        let data = &self.variables[id.0];
        (data.lb, data.ub)
    }

    pub fn set_variable_bounds(
        &mut self,
        id: VariableId,
        lb: f64,
        ub: f64,
    ) -> Result<(), LinearProblemError> {
        let data = &mut self.variables[id.0];
        check_bounds(&data.key.to_string(), lb, ub)?;
        data.lb = lb;
        data.ub = ub;
        Ok(())
    }

    pub fn add_constraint(
        &mut self,
        key: ConstraintKey,
        lb: f64,
        ub: f64,
    ) -> Result<ConstraintId, LinearProblemError> {
        if self.constraint_index.contains_key(&key) {
            return Err(LinearProblemError::DuplicateConstraint(key));
        }
        check_bounds(&key.to_string(), lb, ub)?;
        let id = ConstraintId(self.constraints.len());
        self.constraint_index.insert(key.clone(), id);
        self.constraints.push(ConstraintData {
            key,
            lb,
            ub,
            coefficients: BTreeMap::new(),
        });
        Ok(id)
    }

    pub fn constraint(&self, key: &ConstraintKey) -> Option<ConstraintId> {
        self.constraint_index.get(key).copied()
    }

    pub fn require_constraint(
        &self,
        key: &ConstraintKey,
    ) -> Result<ConstraintId, LinearProblemError> {
        self.constraint(key)
            .ok_or_else(|| LinearProblemError::MissingConstraint(key.clone()))
    }

    pub fn constraint_key(&self, id: ConstraintId) -> &ConstraintKey {
        &self.constraints[id.0].key
    }

    pub fn constraint_bounds(&self, id: ConstraintId) -> (f64, f64) {
        let data = &self.constraints[id.0];
        (data.lb, data.ub)
    }

    /// Change both bounds of a constraint. `lb > ub` is accepted transiently
    /// by [`set_constraint_lb`](Self::set_constraint_lb) /
    /// [`set_constraint_ub`](Self::set_constraint_ub) but not here.
    pub fn set_constraint_bounds(
        &mut self,
        id: ConstraintId,
        lb: f64,
        ub: f64,
    ) -> Result<(), LinearProblemError> {
        let data = &mut self.constraints[id.0];
        check_bounds(&data.key.to_string(), lb, ub)?;
        data.lb = lb;
        data.ub = ub;
        Ok(())
    }

    pub fn set_constraint_lb(&mut self, id: ConstraintId, lb: f64) {
        self.constraints[id.0].lb = lb;
    }

    pub fn set_constraint_ub(&mut self, id: ConstraintId, ub: f64) {
        self.constraints[id.0].ub = ub;
    }

    /// Set (or overwrite) a coefficient; 0.0 removes the term.
    pub fn set_coefficient(&mut self, constraint: ConstraintId, variable: VariableId, value: f64) {
        let coefficients = &mut self.constraints[constraint.0].coefficients;
        if value == 0.0 {
            coefficients.remove(&variable);
        } else {
            coefficients.insert(variable, value);
        }
    }

    pub fn coefficient(&self, constraint: ConstraintId, variable: VariableId) -> f64 {
        self.constraints[constraint.0]
            .coefficients
            .get(&variable)
            .copied()
            .unwrap_or(0.0)
    }

    pub fn set_objective_coefficient(&mut self, variable: VariableId, value: f64) {
        if value == 0.0 {
            self.objective.remove(&variable);
        } else {
            self.objective.insert(variable, value);
        }
    }

    pub fn objective_coefficient(&self, variable: VariableId) -> f64 {
        self.objective.get(&variable).copied().unwrap_or(0.0)
    }

    pub fn has_integer_variables(&self) -> bool {
        self.variables
            .iter()
            .any(|v| v.kind != VariableKind::Continuous)
    }

    /// Solve with the configured backend. Previous solution values are
    /// discarded, whatever the outcome.
    pub fn solve(&mut self) -> LinearProblemStatus {
        debug!(
            solver = self.solver.as_str(),
            variables = self.variables.len(),
            constraints = self.constraints.len(),
            "solving linear problem"
        );
        match solver::solve(self) {
            Ok(values) => {
                self.solution = Some(values);
                self.status = LinearProblemStatus::Optimal;
            }
            Err(status) => {
                self.solution = None;
                self.status = status;
            }
        }
        self.status
    }

    pub fn status(&self) -> LinearProblemStatus {
        self.status
    }

    /// Value of `variable` in the last successful solve.
    pub fn solution_value(&self, variable: VariableId) -> RaoResult<f64> {
        self.solution
            .as_ref()
            .map(|values| values[variable.0])
            .ok_or_else(|| {
                RaoError::InvalidState(format!(
                    "no solution available for {} (status {})",
                    self.variable_key(variable),
                    self.status
                ))
            })
    }

    /// Objective value of the last successful solve.
    pub fn objective_value(&self) -> RaoResult<f64> {
        let values = self.solution.as_ref().ok_or_else(|| {
            RaoError::InvalidState(format!("no solution available (status {})", self.status))
        })?;
        Ok(self
            .objective
            .iter()
            .map(|(id, coefficient)| coefficient * values[id.0])
            .sum())
    }
}

fn check_bounds(name: &str, lb: f64, ub: f64) -> Result<(), LinearProblemError> {
    if lb.is_nan() || ub.is_nan() || lb > ub {
        return Err(LinearProblemError::InvalidBounds {
            name: name.to_string(),
            lb,
            ub,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flow(cnec: &str) -> VariableKey {
        VariableKey::Flow {
            cnec: cnec.to_string(),
        }
    }

    #[test]
    fn test_duplicate_keys_are_rejected() {
        let mut lp = LinearProblem::new(LpSolverKind::default());
        lp.add_variable(flow("c1"), -1.0, 1.0, VariableKind::Continuous)
            .unwrap();
        let err = lp
            .add_variable(flow("c1"), -1.0, 1.0, VariableKind::Continuous)
            .unwrap_err();
        assert!(matches!(err, LinearProblemError::DuplicateVariable(_)));
        assert!(err.to_string().contains("c1"));
    }

    #[test]
    fn test_missing_keys() {
        let lp = LinearProblem::new(LpSolverKind::default());
        assert!(lp.variable(&flow("c1")).is_none());
        let err = lp.require_variable(&flow("c1")).unwrap_err();
        let rao: RaoError = err.into();
        assert!(matches!(rao, RaoError::Solver(_)));
    }

    #[test]
    fn test_coefficients_and_bounds() {
        let mut lp = LinearProblem::new(LpSolverKind::default());
        let v = lp
            .add_variable(flow("c1"), f64::NEG_INFINITY, f64::INFINITY, VariableKind::Continuous)
            .unwrap();
        let c = lp
            .add_constraint(
                ConstraintKey::Flow {
                    cnec: "c1".to_string(),
                },
                10.0,
                10.0,
            )
            .unwrap();
        lp.set_coefficient(c, v, 1.0);
        assert_eq!(lp.coefficient(c, v), 1.0);
        lp.set_coefficient(c, v, 0.0);
        assert_eq!(lp.coefficient(c, v), 0.0);
        assert!(lp.set_constraint_bounds(c, 5.0, 1.0).is_err());
        assert_eq!(lp.constraint_bounds(c), (10.0, 10.0));
    }

    #[test]
    fn test_solution_before_solve_is_an_error() {
        let mut lp = LinearProblem::new(LpSolverKind::default());
        let v = lp
            .add_variable(flow("c1"), 0.0, 1.0, VariableKind::Continuous)
            .unwrap();
        assert!(lp.solution_value(v).is_err());
        assert_eq!(lp.status(), LinearProblemStatus::NotSolved);
    }

    #[test]
    fn test_solve_small_lp() {
        // min -x - y  s.t.  x + 2y <= 4, x <= 3, y >= 0
        let mut lp = LinearProblem::new(LpSolverKind::default());
        let x = lp
            .add_variable(flow("x"), 0.0, 3.0, VariableKind::Continuous)
            .unwrap();
        let y = lp
            .add_variable(flow("y"), 0.0, f64::INFINITY, VariableKind::Continuous)
            .unwrap();
        let c = lp
            .add_constraint(ConstraintKey::MaxRa, f64::NEG_INFINITY, 4.0)
            .unwrap();
        lp.set_coefficient(c, x, 1.0);
        lp.set_coefficient(c, y, 2.0);
        lp.set_objective_coefficient(x, -1.0);
        lp.set_objective_coefficient(y, -1.0);

        assert_eq!(lp.solve(), LinearProblemStatus::Optimal);
        assert!((lp.solution_value(x).unwrap() - 3.0).abs() < 1e-6);
        assert!((lp.solution_value(y).unwrap() - 0.5).abs() < 1e-6);
        assert!((lp.objective_value().unwrap() + 3.5).abs() < 1e-6);
    }

    #[test]
    fn test_solve_small_mip() {
        // min -x  s.t.  2x <= 5, x integer
        let mut lp = LinearProblem::new(LpSolverKind::Microlp);
        let x = lp
            .add_variable(flow("x"), 0.0, 10.0, VariableKind::Integer)
            .unwrap();
        let c = lp
            .add_constraint(ConstraintKey::MaxRa, f64::NEG_INFINITY, 5.0)
            .unwrap();
        lp.set_coefficient(c, x, 2.0);
        lp.set_objective_coefficient(x, -1.0);
        assert_eq!(lp.solve(), LinearProblemStatus::Optimal);
        assert!((lp.solution_value(x).unwrap() - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_infeasible() {
        let mut lp = LinearProblem::new(LpSolverKind::default());
        let x = lp
            .add_variable(flow("x"), 0.0, 1.0, VariableKind::Continuous)
            .unwrap();
        let c = lp.add_constraint(ConstraintKey::MaxRa, 2.0, 3.0).unwrap();
        lp.set_coefficient(c, x, 1.0);
        assert_eq!(lp.solve(), LinearProblemStatus::Infeasible);
        assert!(lp.solution_value(x).is_err());
    }
}

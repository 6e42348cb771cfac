//! Translation of a [`LinearProblem`] into a `good_lp` model.

use super::{LinearProblem, LinearProblemStatus, VariableKind};
use anyhow::anyhow;
use good_lp::{
    constraint, variable, Constraint, Expression, ProblemVariables, ResolutionError, Solution,
    SolverModel, Variable,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::warn;

/// Backend used to solve linear problems.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LpSolverKind {
    /// Pure-Rust simplex with branch and bound; handles integer variables
    #[default]
    Microlp,
    /// Interior point; continuous problems only
    #[cfg(feature = "solver-clarabel")]
    Clarabel,
    #[cfg(feature = "solver-highs")]
    Highs,
}

impl LpSolverKind {
    pub fn available() -> &'static [&'static str] {
        AVAILABLE_LP_SOLVERS
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LpSolverKind::Microlp => "microlp",
            #[cfg(feature = "solver-clarabel")]
            LpSolverKind::Clarabel => "clarabel",
            #[cfg(feature = "solver-highs")]
            LpSolverKind::Highs => "highs",
        }
    }

    pub fn supports_integer_variables(&self) -> bool {
        match self {
            LpSolverKind::Microlp => true,
            #[cfg(feature = "solver-clarabel")]
            LpSolverKind::Clarabel => false,
            #[cfg(feature = "solver-highs")]
            LpSolverKind::Highs => true,
        }
    }
}

const AVAILABLE_LP_SOLVERS: &[&str] = &[
    "microlp",
    #[cfg(feature = "solver-clarabel")]
    "clarabel",
    #[cfg(feature = "solver-highs")]
    "highs",
];

fn unknown_solver_error(label: &str) -> anyhow::Error {
    anyhow!(
        "unknown lp solver '{}'; supported values: {}",
        label,
        LpSolverKind::available().join(", ")
    )
}

impl FromStr for LpSolverKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.to_ascii_lowercase();
        match normalized.as_str() {
            "microlp" => Ok(LpSolverKind::Microlp),
            "clarabel" => {
                #[cfg(feature = "solver-clarabel")]
                {
                    Ok(LpSolverKind::Clarabel)
                }
                #[cfg(not(feature = "solver-clarabel"))]
                {
                    Err(unknown_solver_error(&normalized))
                }
            }
            "highs" => {
                #[cfg(feature = "solver-highs")]
                {
                    Ok(LpSolverKind::Highs)
                }
                #[cfg(not(feature = "solver-highs"))]
                {
                    Err(unknown_solver_error(&normalized))
                }
            }
            other => Err(unknown_solver_error(other)),
        }
    }
}

/// Solve `problem`, returning one value per variable (in creation order).
pub(super) fn solve(problem: &LinearProblem) -> Result<Vec<f64>, LinearProblemStatus> {
    if problem.has_integer_variables() && !problem.solver.supports_integer_variables() {
        warn!(
            solver = problem.solver.as_str(),
            "solver cannot handle integer variables"
        );
        return Err(LinearProblemStatus::Abnormal);
    }

    let mut vars = ProblemVariables::new();
    let handles: Vec<Variable> = problem
        .variables
        .iter()
        .map(|data| {
            let mut definition = variable();
            match data.kind {
                VariableKind::Continuous => {}
                VariableKind::Integer => definition = definition.integer(),
                VariableKind::Binary => definition = definition.binary(),
            }
            if data.lb.is_finite() {
                definition = definition.min(data.lb);
            }
            if data.ub.is_finite() {
                definition = definition.max(data.ub);
            }
            vars.add(definition)
        })
        .collect();

    let constraints = build_constraints(problem, &handles)?;
    let objective: Expression = problem
        .objective
        .iter()
        .map(|(id, coefficient)| *coefficient * handles[id.0])
        .sum();

    let model = vars.minimise(objective);
    match problem.solver {
        LpSolverKind::Microlp => run(
            model.using(good_lp::solvers::microlp::microlp),
            constraints,
            &handles,
        ),
        #[cfg(feature = "solver-clarabel")]
        LpSolverKind::Clarabel => run(
            model.using(good_lp::solvers::clarabel::clarabel),
            constraints,
            &handles,
        ),
        #[cfg(feature = "solver-highs")]
        LpSolverKind::Highs => run(
            model.using(good_lp::solvers::highs::highs),
            constraints,
            &handles,
        ),
    }
}

fn build_constraints(
    problem: &LinearProblem,
    handles: &[Variable],
) -> Result<Vec<Constraint>, LinearProblemStatus> {
    let mut constraints = Vec::with_capacity(problem.constraints.len());
    for data in &problem.constraints {
        if data.coefficients.is_empty() {
            // 0 must lie within the bounds of an empty row
            if data.lb > 0.0 || data.ub < 0.0 {
                warn!(constraint = %data.key, lb = data.lb, ub = data.ub, "empty constraint cannot be satisfied");
                return Err(LinearProblemStatus::Infeasible);
            }
            continue;
        }
        let row = || -> Expression {
            data.coefficients
                .iter()
                .map(|(id, coefficient)| *coefficient * handles[id.0])
                .sum()
        };
        if data.lb.is_finite() && data.ub.is_finite() && data.lb == data.ub {
            constraints.push(constraint::eq(row(), data.lb));
            continue;
        }
        if data.lb.is_finite() {
            constraints.push(constraint::geq(row(), data.lb));
        }
        if data.ub.is_finite() {
            constraints.push(constraint::leq(row(), data.ub));
        }
    }
    Ok(constraints)
}

fn run<M>(
    mut model: M,
    constraints: Vec<Constraint>,
    handles: &[Variable],
) -> Result<Vec<f64>, LinearProblemStatus>
where
    M: SolverModel<Error = ResolutionError>,
{
    for c in constraints {
        model.add_constraint(c);
    }
    match model.solve() {
        Ok(solution) => Ok(handles.iter().map(|v| solution.value(*v)).collect()),
        Err(ResolutionError::Infeasible) => Err(LinearProblemStatus::Infeasible),
        Err(ResolutionError::Unbounded) => Err(LinearProblemStatus::Unbounded),
        Err(other) => {
            warn!(error = %other, "linear solver failed");
            Err(LinearProblemStatus::Abnormal)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solver_kind_parsing() {
        assert_eq!("MicroLP".parse::<LpSolverKind>().unwrap(), LpSolverKind::Microlp);
        assert!("cplex".parse::<LpSolverKind>().is_err());
        assert_eq!(LpSolverKind::default().as_str(), "microlp");
        assert!(LpSolverKind::available().contains(&"microlp"));
    }
}

//! # rao-algo: search-tree remedial action optimisation
//!
//! Finds the set of remedial actions that maximises the worst margin on the
//! critical network elements of one optimisation perimeter.
//!
//! - **Network actions** (topology changes, set-point switches) are discrete
//!   and explored by the [`SearchTree`], a depth-bounded search whose leaves
//!   are evaluated in parallel.
//! - **Range actions** (PSTs, HVDC links, injections) are continuous and
//!   optimised in every leaf by the [`IteratingLinearOptimizer`], which
//!   solves a sequence of LP/MIP problems assembled by the [`fillers`].
//!
//! ## Architecture
//!
//! | Module | Role |
//! |--------|------|
//! | [`parameters`] | TOML configuration and validation |
//! | [`linear_problem`] | Variables, constraints and objective over `good_lp` |
//! | [`fillers`] | Slices of the linear problem (margins, limits, MNECs, loop-flows) |
//! | [`linear_optimizer`] | Solve / apply / re-linearise loop |
//! | [`search_tree`] | Leaves, bloomer, filters and the tree itself |
//!
//! The network model and sensitivity engine come from `rao-core` as the
//! [`Network`](rao_core::Network) and [`SensitivityComputer`](rao_core::SensitivityComputer)
//! traits.
//!
//! ## Example
//!
//! ```ignore
//! use rao_algo::{SearchTree, SearchTreeInput, SearchTreeParameters};
//!
//! let parameters = SearchTreeParameters::from_path("rao.toml")?;
//! let input = SearchTreeInput::new(network, perimeter, objective, computer)?;
//! let result = SearchTree::new(input, parameters)?.run();
//! println!("{} ({})", result.identifier(), result.cost());
//! ```

pub mod fillers;
pub mod linear_optimizer;
pub mod linear_problem;
pub mod logging;
pub mod parameters;
pub mod search_tree;

pub use linear_optimizer::{
    IteratingLinearOptimizer, IteratingLinearOptimizerInput, LinearOptimizationResult,
    LinearOptimizationStatus,
};
pub use logging::init_logging;
pub use parameters::{
    LinearOptimizerParameters, ObjectiveKind, PstModel, RaUsageLimits, SearchTreeParameters,
    StopCriterion,
};
pub use search_tree::{
    FinalizedLeaf, LeafStatus, NetworkActionCombination, OptimizationResult, SearchTree,
    SearchTreeInput, SearchTreeResult,
};

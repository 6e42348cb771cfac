//! Search tree over network action combinations.
//!
//! The root leaf is the pre-perimeter situation. Each depth blooms the
//! current optimal leaf into candidate combinations, filters them against
//! the usage limits and the network, then evaluates the survivors in
//! parallel: every child applies its network actions to a pooled network
//! copy, runs a sensitivity computation and has its range actions
//! optimised by the [`IteratingLinearOptimizer`](crate::linear_optimizer::IteratingLinearOptimizer).
//!
//! The search stops when a depth brings no sufficient improvement, when the
//! maximum depth is reached or when the optimal leaf meets the stop
//! criterion. When several leaves of one depth meet the stop criterion, the
//! one whose combination has the highest priority wins, whatever the order
//! in which the workers finished.

mod bloomer;
mod combination;
mod filters;
mod leaf;
mod network_pool;
mod tree;

pub use bloomer::SearchTreeBloomer;
pub use combination::{compare_priority, resolve_predefined_combinations, NetworkActionCombination};
pub use filters::{
    AlreadyAppliedNetworkActionsFilter, AlreadyTestedCombinationsFilter, Candidates,
    ElementaryActionsCompatibilityFilter, FarFromMostLimitingElementFilter,
    HasImpactOnNetworkFilter, MaxElementaryActionsPerTsoFilter, MaxRaFilter, MaxRaPerTsoFilter,
    MaxTsoFilter, NetworkActionCombinationFilter, OnFlowConstraintFilter,
};
pub use leaf::{FinalizedLeaf, Leaf, LeafStatus, OptimizationResult};
pub use network_pool::{NetworkLease, NetworkPool};
pub use tree::{SearchTree, SearchTreeInput, SearchTreeResult};

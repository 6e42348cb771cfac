use super::bloomer::SearchTreeBloomer;
use super::combination::{compare_priority, resolve_predefined_combinations, NetworkActionCombination};
use super::leaf::{FinalizedLeaf, Leaf, LeafStatus, OptimizationResult};
use super::network_pool::NetworkPool;
use crate::linear_optimizer::apply_range_actions;
use crate::parameters::{SearchTreeParameters, StopCriterion};
use parking_lot::Mutex;
use rao_core::{
    CountryGraph, Network, ObjectiveFunction, OptimizationPerimeter,
    RangeActionActivationResult, RangeActionSetpointResult, RaoResult, SensitivityComputer,
    SensitivityOutcome,
};
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::cmp::Ordering;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

const VIRTUAL_COST_EPSILON: f64 = 1e-6;

/// Everything a search tree works on.
pub struct SearchTreeInput<N: Network> {
    /// Network in its pre-perimeter state
    pub network: N,
    pub perimeter: Arc<OptimizationPerimeter>,
    /// Flows and sensitivities of `network`
    pub pre_perimeter_outcome: SensitivityOutcome,
    pub pre_perimeter_setpoints: RangeActionSetpointResult,
    pub objective_function: Arc<dyn ObjectiveFunction>,
    pub sensitivity_computer: Arc<dyn SensitivityComputer<N>>,
    /// Borders between countries, for the far-from-most-limiting-element filter
    pub country_graph: CountryGraph,
    /// Combinations found by an earlier optimisation, tried first
    pub detected_combinations: Vec<NetworkActionCombination>,
}

impl<N: Network> SearchTreeInput<N> {
    /// Read the pre-perimeter set-points from `network` and run the
    /// pre-perimeter sensitivity computation.
    pub fn new(
        network: N,
        perimeter: Arc<OptimizationPerimeter>,
        objective_function: Arc<dyn ObjectiveFunction>,
        sensitivity_computer: Arc<dyn SensitivityComputer<N>>,
    ) -> RaoResult<Self> {
        let pre_perimeter_setpoints = RangeActionSetpointResult::from_network(
            &network,
            perimeter.range_actions().iter().map(|ra| ra.as_ref()),
        )?;
        let pre_perimeter_outcome = sensitivity_computer.compute(&network);
        Ok(Self {
            network,
            perimeter,
            pre_perimeter_outcome,
            pre_perimeter_setpoints,
            objective_function,
            sensitivity_computer,
            country_graph: CountryGraph::new(),
            detected_combinations: Vec::new(),
        })
    }

    pub fn with_country_graph(mut self, country_graph: CountryGraph) -> Self {
        self.country_graph = country_graph;
        self
    }

    pub fn with_detected_combinations(mut self, combinations: Vec<NetworkActionCombination>) -> Self {
        self.detected_combinations = combinations;
        self
    }
}

/// Best leaf of a search.
#[derive(Debug, Clone)]
pub struct SearchTreeResult {
    pub leaf: Arc<FinalizedLeaf>,
    /// Depth at which the leaf was found; 0 for the root
    pub depth: usize,
}

impl SearchTreeResult {
    pub fn identifier(&self) -> &str {
        self.leaf.identifier()
    }

    pub fn status(&self) -> LeafStatus {
        self.leaf.status()
    }

    pub fn result(&self) -> RaoResult<&OptimizationResult> {
        self.leaf.result()
    }

    pub fn cost(&self) -> f64 {
        self.leaf.cost()
    }
}

/// Depth-bounded search over network action combinations, with the range
/// actions of every leaf optimised by the iterating linear optimiser.
pub struct SearchTree<N: Network> {
    context: Arc<TreeContext<N>>,
}

struct TreeContext<N: Network> {
    input: SearchTreeInput<N>,
    parameters: SearchTreeParameters,
    bloomer: SearchTreeBloomer,
}

/// State shared by the leaves of one depth. Lock order: `optimal`, then
/// `stop_combination`.
///
/// `epoch` identifies the depth being explored. Tasks of a closed depth
/// (e.g. after a wait timeout) keep running on the pool but must not touch
/// the shared results any more.
struct TreeState {
    optimal: Mutex<Arc<FinalizedLeaf>>,
    stop_combination: Mutex<Option<NetworkActionCombination>>,
    epoch: AtomicUsize,
}

impl TreeState {
    fn new(root: Arc<FinalizedLeaf>) -> Self {
        Self {
            optimal: Mutex::new(root),
            stop_combination: Mutex::new(None),
            epoch: AtomicUsize::new(0),
        }
    }

    fn optimal(&self) -> Arc<FinalizedLeaf> {
        Arc::clone(&self.optimal.lock())
    }

    fn epoch(&self) -> usize {
        self.epoch.load(AtomicOrdering::Acquire)
    }

    /// Ignore every task still running for the current depth. Taken under
    /// the `optimal` lock so that no update is half-way through.
    fn close_depth(&self) {
        let _optimal = self.optimal.lock();
        self.epoch.fetch_add(1, AtomicOrdering::AcqRel);
    }

    /// Ordering of `combination` against the one that reached the stop
    /// criterion, if any.
    fn compare_to_stop_combination(&self, combination: &NetworkActionCombination) -> Option<Ordering> {
        self.stop_combination
            .lock()
            .as_ref()
            .map(|stop| compare_priority(combination, stop))
    }
}

impl<N: Network> SearchTree<N> {
    pub fn new(input: SearchTreeInput<N>, parameters: SearchTreeParameters) -> RaoResult<Self> {
        parameters.validate()?;
        let mut predefined = input.detected_combinations.clone();
        predefined.extend(resolve_predefined_combinations(
            &input.perimeter,
            &parameters.tree.predefined_combinations,
        )?);
        let bloomer = SearchTreeBloomer::new(
            Arc::new(input.network.clone()),
            Arc::clone(&input.perimeter),
            input.pre_perimeter_setpoints.clone(),
            input.country_graph.clone(),
            predefined,
            &parameters,
        );
        Ok(Self {
            context: Arc::new(TreeContext {
                input,
                parameters,
                bloomer,
            }),
        })
    }

    pub fn run(&self) -> SearchTreeResult {
        let ctx = &self.context;
        let input = &ctx.input;

        let mut root_network = input.network.clone();
        let mut root = Leaf::root(
            Arc::clone(&input.perimeter),
            &mut root_network,
            &input.pre_perimeter_outcome,
            input.pre_perimeter_setpoints.clone(),
        );
        info!("evaluating root leaf");
        root.evaluate(
            input.objective_function.as_ref(),
            input.sensitivity_computer.as_ref(),
        );
        if root.status() == LeafStatus::Error {
            warn!("root leaf could not be evaluated, stopping the search");
            return root_result(root.finalize());
        }
        info!(leaf = %root, "root leaf evaluated");
        if ctx.reaches_stop_criterion(&root) {
            info!("stop criterion reached on root leaf");
            return root_result(root.finalize());
        }

        if !input.perimeter.range_actions().is_empty() {
            info!("linear optimization on root leaf");
            if let Err(e) = root.optimize(input, &ctx.parameters) {
                warn!(error = %e, "could not optimize root leaf");
            }
            info!(leaf = %root, "root leaf optimized");
            if ctx.reaches_stop_criterion(&root) {
                info!("stop criterion reached on root leaf");
                return root_result(root.finalize());
            }
        }

        let root = Arc::new(root.finalize());
        if input.perimeter.network_actions().is_empty() {
            info!("no network action available");
            return SearchTreeResult {
                leaf: root,
                depth: 0,
            };
        }
        let result = self.iterate_on_tree(root);
        info!(leaf = %result.leaf, depth = result.depth, "search tree finished");
        result
    }

    fn iterate_on_tree(&self, root: Arc<FinalizedLeaf>) -> SearchTreeResult {
        let ctx = &self.context;
        let tree = &ctx.parameters.tree;
        let leaves_in_parallel = ctx.leaves_in_parallel(ctx.input.perimeter.network_actions().len());

        let pool = match ThreadPoolBuilder::new()
            .num_threads(leaves_in_parallel)
            .thread_name(|i| format!("search-tree-leaf-{i}"))
            .panic_handler(|_| error!("a leaf task panicked"))
            .build()
        {
            Ok(pool) => pool,
            Err(e) => {
                error!(error = %e, "could not build the leaf thread pool");
                return SearchTreeResult {
                    leaf: root,
                    depth: 0,
                };
            }
        };
        debug!(leaves_in_parallel, "evaluating leaves in parallel");
        let state = Arc::new(TreeState::new(root));

        let mut depth = 0;
        let mut optimal_depth = 0;
        let mut has_improved = true;
        while depth < tree.max_search_tree_depth
            && has_improved
            && !ctx.finalized_reaches_stop_criterion(&state.optimal())
        {
            info!("search depth {} [start]", depth + 1);
            let previous = state.optimal();
            self.explore_next_depth(&pool, &state, &previous);
            state.close_depth();
            let optimal = state.optimal();
            has_improved = !Arc::ptr_eq(&previous, &optimal);
            if has_improved {
                optimal_depth = depth + 1;
                info!(leaf = %optimal, "optimal leaf at depth {}", depth + 1);
            } else {
                info!("no better result found in search depth {}", depth + 1);
            }
            info!("search depth {} [end]", depth + 1);
            depth += 1;
        }

        SearchTreeResult {
            leaf: state.optimal(),
            depth: optimal_depth,
        }
    }

    fn explore_next_depth(
        &self,
        pool: &ThreadPool,
        state: &Arc<TreeState>,
        previous: &Arc<FinalizedLeaf>,
    ) {
        let ctx = &self.context;
        let Ok(from) = previous.result() else {
            warn!(leaf = %previous, "optimal leaf has no results to bloom from");
            return;
        };
        let candidates = ctx.bloomer.bloom(from, ctx.input.perimeter.network_actions());
        if candidates.is_empty() {
            info!("no more network action available");
            return;
        }
        let mut ordered: Vec<(NetworkActionCombination, bool)> = candidates.into_iter().collect();
        ordered.sort_by(|a, b| compare_priority(&a.0, &b.0));
        info!("leaves to evaluate: {}", ordered.len());

        let count = ordered.len();
        let network_pool = NetworkPool::new(&ctx.input.network, ctx.leaves_in_parallel(count));
        let epoch = state.epoch();
        let (done, finished) = mpsc::channel();
        for (combination, remove_range_actions) in ordered {
            let task = LeafTask {
                context: Arc::clone(&self.context),
                state: Arc::clone(state),
                epoch,
                network_pool: Arc::clone(&network_pool),
                previous: Arc::clone(previous),
                combination,
                remove_range_actions,
            };
            let done = done.clone();
            pool.spawn(move || {
                task.run();
                let _ = done.send(());
            });
        }
        drop(done);

        let timeout = Duration::from_secs(ctx.parameters.tree.pool_wait_timeout_seconds);
        let deadline = Instant::now().checked_add(timeout);
        for received in 0..count {
            let outcome = match deadline {
                Some(deadline) => {
                    finished.recv_timeout(deadline.saturating_duration_since(Instant::now()))
                }
                None => finished.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };
            match outcome {
                Ok(()) => {}
                Err(RecvTimeoutError::Timeout) => {
                    error!(
                        finished = received,
                        count, "timed out waiting for the leaves of this depth"
                    );
                    break;
                }
                Err(RecvTimeoutError::Disconnected) => {
                    error!(
                        finished = received,
                        count, "leaf tasks stopped before reporting"
                    );
                    break;
                }
            }
        }
    }
}

fn root_result(root: FinalizedLeaf) -> SearchTreeResult {
    SearchTreeResult {
        leaf: Arc::new(root),
        depth: 0,
    }
}

impl<N: Network> TreeContext<N> {
    /// Leaves evaluated at once for `candidates` combinations; `0` in the
    /// parameters means one per CPU.
    fn leaves_in_parallel(&self, candidates: usize) -> usize {
        match self.parameters.tree.leaves_in_parallel {
            0 => num_cpus::get(),
            n => n,
        }
        .min(candidates)
        .max(1)
    }

    /// A leaf with a virtual cost never stops the search. In a purely
    /// virtual perimeter, reaching zero virtual cost is enough.
    fn stop_criterion_reached(&self, result: &OptimizationResult) -> bool {
        let virtual_cost = result.virtual_cost();
        if virtual_cost > VIRTUAL_COST_EPSILON {
            return false;
        }
        if self.input.perimeter.is_purely_virtual() && virtual_cost < VIRTUAL_COST_EPSILON {
            return true;
        }
        match self.parameters.objective.stop_criterion {
            StopCriterion::MinObjective => false,
            StopCriterion::AtTargetObjectiveValue => {
                result.cost() < self.parameters.objective.target_objective_value
            }
        }
    }

    fn reaches_stop_criterion(&self, leaf: &Leaf<'_, N>) -> bool {
        leaf.result()
            .map_or(false, |result| self.stop_criterion_reached(&result))
    }

    fn finalized_reaches_stop_criterion(&self, leaf: &FinalizedLeaf) -> bool {
        leaf.result()
            .map_or(false, |result| self.stop_criterion_reached(result))
    }

    /// Whether `leaf` beats `previous` by more than the configured absolute
    /// and relative thresholds. A leaf reaching the stop criterion only has
    /// to be better.
    fn improved_enough(&self, previous: &FinalizedLeaf, leaf: &FinalizedLeaf) -> bool {
        let tree = &self.parameters.tree;
        let relative = tree.relative_network_action_minimum_impact_threshold.max(0.0);
        let absolute = tree.absolute_network_action_minimum_impact_threshold.max(0.0);
        let previous_cost = previous.cost();
        let new_cost = leaf.cost();
        if previous_cost > new_cost && self.finalized_reaches_stop_criterion(leaf) {
            return true;
        }
        let sign = if previous_cost == 0.0 {
            0.0
        } else {
            previous_cost.signum()
        };
        previous_cost - absolute > new_cost && (1.0 - sign * relative) * previous_cost > new_cost
    }

    fn update_optimal_leaf(
        &self,
        state: &TreeState,
        leaf: Arc<FinalizedLeaf>,
        combination: &NetworkActionCombination,
        previous: &FinalizedLeaf,
        epoch: usize,
    ) {
        let mut optimal = state.optimal.lock();
        if state.epoch() != epoch {
            debug!(leaf = %leaf, "depth already closed, result discarded");
            return;
        }
        let mut stop_combination = state.stop_combination.lock();
        if !self.improved_enough(previous, &leaf) {
            return;
        }
        let reached = self.finalized_reaches_stop_criterion(&leaf);
        let accept = match stop_combination.as_ref() {
            None => leaf.cost() < optimal.cost(),
            Some(stop) => reached && compare_priority(combination, stop) == Ordering::Less,
        };
        if accept {
            debug!(leaf = %leaf, "new optimal leaf");
            *optimal = leaf;
            if reached {
                *stop_combination = Some(combination.clone());
            }
        }
    }
}

/// Build, evaluate and optimise one child leaf on a worker thread.
struct LeafTask<N: Network> {
    context: Arc<TreeContext<N>>,
    state: Arc<TreeState>,
    /// Depth the task was spawned for
    epoch: usize,
    network_pool: Arc<NetworkPool<N>>,
    previous: Arc<FinalizedLeaf>,
    combination: NetworkActionCombination,
    remove_range_actions: bool,
}

impl<N: Network> LeafTask<N> {
    fn run(self) {
        let ctx = &*self.context;
        let input = &ctx.input;
        let mut lease = self.network_pool.checkout();

        if self.state.epoch() != self.epoch {
            info!(combination = %self.combination, "skipping leaf: its depth is closed");
            return;
        }
        if self
            .state
            .compare_to_stop_combination(&self.combination)
            .map_or(false, |ord| ord != Ordering::Less)
        {
            info!(
                combination = %self.combination,
                "skipping leaf: a higher-priority combination already reached the stop criterion"
            );
            return;
        }

        let activation = if self.remove_range_actions {
            debug!(combination = %self.combination, "resetting range actions to their pre-perimeter set-points");
            RangeActionActivationResult::new(input.pre_perimeter_setpoints.clone())
        } else {
            match self.previous.result() {
                Ok(result) => result.activation.clone(),
                Err(e) => {
                    warn!(error = %e, "parent leaf has no range action results");
                    return;
                }
            }
        };
        if let Err(e) = apply_range_actions(&mut *lease, input.perimeter.range_actions(), &activation) {
            warn!(combination = %self.combination, error = %e, "could not apply range action set-points");
            return;
        }

        let mut leaf = match Leaf::child(
            Arc::clone(&input.perimeter),
            &mut *lease,
            self.previous.applied_network_actions(),
            &self.combination,
            activation,
            input.pre_perimeter_setpoints.clone(),
        ) {
            Ok(leaf) => leaf,
            Err(e) => {
                warn!(combination = %self.combination, error = %e, "could not create leaf");
                return;
            }
        };

        if self.state.epoch() != self.epoch {
            info!(leaf = %leaf.identifier(), "skipping leaf: its depth is closed");
            return;
        }
        leaf.evaluate(
            input.objective_function.as_ref(),
            input.sensitivity_computer.as_ref(),
        );
        if leaf.status() == LeafStatus::Error {
            info!(leaf = %leaf.identifier(), "leaf evaluation failed, it will not be optimized");
            return;
        }
        debug!(leaf = %leaf, "leaf evaluated");

        if !ctx.reaches_stop_criterion(&leaf) {
            let outranked = self
                .state
                .compare_to_stop_combination(&self.combination)
                .map_or(false, |ord| ord == Ordering::Greater);
            if outranked {
                info!(
                    leaf = %leaf.identifier(),
                    "skipping optimization: a higher-priority combination already reached the stop criterion"
                );
            } else if let Err(e) = leaf.optimize(input, &ctx.parameters) {
                warn!(leaf = %leaf.identifier(), error = %e, "could not optimize leaf");
            } else {
                info!(leaf = %leaf, "leaf optimized");
            }
        }

        let finalized = Arc::new(leaf.finalize());
        ctx.update_optimal_leaf(
            &self.state,
            finalized,
            &self.combination,
            &self.previous,
            self.epoch,
        );
    }
}

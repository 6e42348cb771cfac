//! End-to-end search tree runs on a small linear network.

use rao_algo::parameters::{LoopFlowParameters, MnecParameters};
use rao_algo::search_tree::compare_priority;
use rao_algo::{
    LeafStatus, NetworkActionCombination, ObjectiveKind, PstModel, SearchTree, SearchTreeInput,
    SearchTreeParameters, SearchTreeResult, StopCriterion,
};
use rao_core::{
    FlowCnec, LinearNetwork, LinearSensitivityComputer, MarginObjectiveFunction, Network,
    NetworkAction, OptimizationPerimeter, RangeAction, SensitivityComputer, SensitivityOutcome,
    State, Unit,
};
use std::cmp::Ordering;
use std::io::Write;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const TOLERANCE: f64 = 1e-3;

/// One CNEC at 500 MW out of 800. Opening `line-a` relieves it by 100 MW,
/// `line-c` by 60 MW, and the sensitivity computation fails whenever
/// `line-b` is open. The injection can shift 3 MW off the CNEC.
fn perimeter(with_range_action: bool) -> OptimizationPerimeter {
    let perimeter = OptimizationPerimeter::new(State::preventive())
        .with_flow_cnec(
            FlowCnec::new("cnec", "line", State::preventive()).with_bounds(Some(-800.0), Some(800.0)),
        )
        .with_network_action(NetworkAction::open("open-a", "line-a").with_operator("FR"))
        .with_network_action(NetworkAction::open("open-b", "line-b").with_operator("BE"))
        .with_network_action(NetworkAction::open("open-c", "line-c").with_operator("NL"));
    if with_range_action {
        perimeter.with_range_action(
            RangeAction::injection("ra", "ra-element", -15.0, 12.0).with_operator("FR"),
        )
    } else {
        perimeter
    }
}

fn network(opening_c: f64) -> LinearNetwork {
    LinearNetwork::new("net")
        .with_base_flow("cnec", 500.0)
        .with_switchable("line-a")
        .with_switchable("line-b")
        .with_switchable("line-c")
        .with_opening_effect("line-a", "cnec", -100.0)
        .with_opening_effect("line-b", "cnec", 50.0)
        .with_opening_effect("line-c", "cnec", opening_c)
        .with_injection("ra-element", 0.0)
        .with_sensitivity("ra-element", "cnec", 0.2)
}

fn input_with<C>(perimeter: OptimizationPerimeter, network: LinearNetwork, wrap: impl FnOnce(LinearSensitivityComputer) -> C) -> SearchTreeInput<LinearNetwork>
where
    C: SensitivityComputer<LinearNetwork> + 'static,
{
    let perimeter = Arc::new(perimeter);
    let computer = LinearSensitivityComputer::new(
        perimeter.flow_cnecs().to_vec(),
        perimeter.range_actions().to_vec(),
    )
    .failing_when_open("line-b");
    let objective = MarginObjectiveFunction::new(&perimeter, Unit::Megawatt);
    SearchTreeInput::new(network, perimeter, Arc::new(objective), Arc::new(wrap(computer))).unwrap()
}

fn input(perimeter: OptimizationPerimeter, network: LinearNetwork) -> SearchTreeInput<LinearNetwork> {
    input_with(perimeter, network, |computer| computer)
}

/// Sleeps before computing whenever `element` is open.
struct SlowWhenOpen {
    inner: LinearSensitivityComputer,
    element: &'static str,
    delay: Duration,
}

impl SlowWhenOpen {
    fn new(inner: LinearSensitivityComputer, element: &'static str) -> Self {
        Self {
            inner,
            element,
            delay: Duration::from_millis(200),
        }
    }
}

impl SensitivityComputer<LinearNetwork> for SlowWhenOpen {
    fn compute(&self, network: &LinearNetwork) -> SensitivityOutcome {
        if network.is_connected(self.element) == Some(false) {
            thread::sleep(self.delay);
        }
        self.inner.compute(network)
    }
}

#[test]
fn test_search_tree_combines_network_and_range_actions() {
    rao_algo::init_logging("rao_algo=debug");
    let tree = SearchTree::new(input(perimeter(true), network(-60.0)), SearchTreeParameters::default()).unwrap();

    let result = tree.run();

    assert_eq!(result.identifier(), "network action(s): open-a, open-c");
    assert_eq!(result.depth, 2);
    assert_eq!(result.status(), LeafStatus::Optimized);
    // 500 - 100 - 60 - 3 MW left on the CNEC
    assert!((result.cost() + 463.0).abs() < TOLERANCE, "cost {}", result.cost());
    let optimized = result.result().unwrap();
    assert_eq!(optimized.activated_range_actions(), vec!["ra".to_string()]);
    assert!(!optimized.activated_network_action_ids().contains(&"open-b".to_string()));
}

#[test]
fn test_failing_leaf_leaves_root_optimal() {
    let perimeter = OptimizationPerimeter::new(State::preventive())
        .with_flow_cnec(
            FlowCnec::new("cnec", "line", State::preventive()).with_bounds(Some(-800.0), Some(800.0)),
        )
        .with_network_action(NetworkAction::open("open-b", "line-b").with_operator("BE"));
    let tree = SearchTree::new(input(perimeter, network(-60.0)), SearchTreeParameters::default()).unwrap();

    let result = tree.run();

    assert_eq!(result.identifier(), "Root leaf");
    assert_eq!(result.depth, 0);
    assert!((result.cost() + 300.0).abs() < TOLERANCE);
}

#[test]
fn test_minimum_impact_threshold_keeps_root() {
    let mut parameters = SearchTreeParameters::default();
    parameters.tree.absolute_network_action_minimum_impact_threshold = 150.0;
    let tree = SearchTree::new(input(perimeter(false), network(-60.0)), parameters).unwrap();

    let result = tree.run();

    assert_eq!(result.identifier(), "Root leaf");
    assert_eq!(result.depth, 0);
}

#[test]
fn test_max_ra_drops_range_actions_for_topology() {
    let mut parameters = SearchTreeParameters::default();
    parameters.ra_usage_limits.max_ra = Some(1);
    let tree = SearchTree::new(input(perimeter(true), network(-60.0)), parameters).unwrap();

    let result = tree.run();

    assert_eq!(result.identifier(), "network action(s): open-a");
    assert_eq!(result.depth, 1);
    assert!((result.cost() + 400.0).abs() < TOLERANCE, "cost {}", result.cost());
    assert!(result.result().unwrap().activated_range_actions().is_empty());
}

fn stop_at_target_parameters() -> SearchTreeParameters {
    let mut parameters = SearchTreeParameters::default();
    parameters.objective.stop_criterion = StopCriterion::AtTargetObjectiveValue;
    parameters.objective.target_objective_value = -350.0;
    parameters.tree.leaves_in_parallel = 2;
    parameters
}

fn detected_open_c(input: &SearchTreeInput<LinearNetwork>) -> NetworkActionCombination {
    NetworkActionCombination::detected_during_rao([input.perimeter.network_action("open-c").unwrap().clone()])
}

#[test]
fn test_stop_criterion_prefers_priority_when_it_finishes_last() {
    let input = input_with(perimeter(false), network(-80.0), |inner| SlowWhenOpen::new(inner, "line-c"));
    let detected = detected_open_c(&input);
    let tree = SearchTree::new(input.with_detected_combinations(vec![detected]), stop_at_target_parameters()).unwrap();

    let result = tree.run();

    // open-a is cheaper (-400) but open-c (-380) was detected earlier and
    // both reach the target
    assert_eq!(result.identifier(), "network action(s): open-c");
    assert_eq!(result.depth, 1);
    assert!((result.cost() + 380.0).abs() < TOLERANCE);
}

#[test]
fn test_stop_criterion_prefers_priority_when_it_finishes_first() {
    let input = input_with(perimeter(false), network(-80.0), |inner| SlowWhenOpen::new(inner, "line-a"));
    let detected = detected_open_c(&input);
    let tree = SearchTree::new(input.with_detected_combinations(vec![detected]), stop_at_target_parameters()).unwrap();

    let result = tree.run();

    assert_eq!(result.identifier(), "network action(s): open-c");
    assert_eq!(result.depth, 1);
}

#[test]
fn test_leaf_finishing_after_timeout_is_ignored() {
    // open-a is the best leaf but only reports after its depth was given up
    let input = input_with(perimeter(false), network(-60.0), |inner| SlowWhenOpen {
        delay: Duration::from_millis(1500),
        ..SlowWhenOpen::new(inner, "line-a")
    });
    let mut parameters = SearchTreeParameters::default();
    parameters.tree.leaves_in_parallel = 3;
    parameters.tree.pool_wait_timeout_seconds = 1;
    let tree = SearchTree::new(input, parameters).unwrap();

    let result = tree.run();

    assert_eq!(result.identifier(), "network action(s): open-c");
    assert_eq!(result.depth, 1);
    assert!((result.cost() + 360.0).abs() < TOLERANCE, "cost {}", result.cost());
}

#[test]
fn test_parameters_from_toml_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        "[tree]\nmax-search-tree-depth = 1\nleaves-in-parallel = 0\n\n[objective]\nunit = \"megawatt\""
    )
    .unwrap();
    let parameters = SearchTreeParameters::from_path(file.path()).unwrap();
    let tree = SearchTree::new(input(perimeter(false), network(-60.0)), parameters).unwrap();

    let result = tree.run();

    assert_eq!(result.identifier(), "network action(s): open-a");
    assert_eq!(result.depth, 1);
}

#[test]
fn test_unknown_predefined_combination_is_rejected() {
    let mut parameters = SearchTreeParameters::default();
    parameters.tree.predefined_combinations = vec![vec!["open-a".into(), "missing".into()]];
    assert!(SearchTree::new(input(perimeter(false), network(-60.0)), parameters).is_err());
}

#[test]
fn test_priority_is_a_total_order() {
    let actions: Vec<Arc<NetworkAction>> = ["a", "b", "c", "d"]
        .iter()
        .map(|id| Arc::new(NetworkAction::open(*id, format!("{id}-line"))))
        .collect();
    let combinations = vec![
        NetworkActionCombination::single(actions[0].clone()),
        NetworkActionCombination::single(actions[1].clone()),
        NetworkActionCombination::single(actions[2].clone()),
        NetworkActionCombination::new([actions[0].clone(), actions[1].clone()]),
        NetworkActionCombination::predefined([actions[2].clone(), actions[3].clone()]),
        NetworkActionCombination::predefined([actions[0].clone(), actions[1].clone(), actions[2].clone()]),
        NetworkActionCombination::detected_during_rao([actions[3].clone()]),
    ];

    for a in &combinations {
        assert_eq!(compare_priority(a, a), Ordering::Equal);
        for b in &combinations {
            assert_eq!(compare_priority(a, b), compare_priority(b, a).reverse());
            for c in &combinations {
                if compare_priority(a, b) == Ordering::Less && compare_priority(b, c) == Ordering::Less {
                    assert_eq!(compare_priority(a, c), Ordering::Less);
                }
            }
        }
    }

    let mut sorted = combinations.clone();
    sorted.sort_by(compare_priority);
    assert!(sorted[0].is_detected_during_rao());
    assert_eq!(sorted[1].len(), 3);
    let mut reversed: Vec<_> = combinations.into_iter().rev().collect();
    reversed.sort_by(compare_priority);
    let ids = |v: &[NetworkActionCombination]| v.iter().map(|c| c.concatenated_id().to_string()).collect::<Vec<_>>();
    assert_eq!(ids(&sorted), ids(&reversed));
}

#[test]
fn test_network_actions_from_json() {
    let actions: Vec<NetworkAction> = serde_json::from_str(
        r#"[
            {
                "id": "open-a",
                "operator": "FR",
                "elementary_actions": [{ "type": "topology", "element_id": "line-a", "connect": false }]
            },
            {
                "id": "open-c",
                "operator": "NL",
                "elementary_actions": [{ "type": "topology", "element_id": "line-c", "connect": false }]
            }
        ]"#,
    )
    .unwrap();
    let perimeter = actions.into_iter().fold(
        OptimizationPerimeter::new(State::preventive())
            .with_flow_cnec(
                FlowCnec::new("cnec", "line", State::preventive()).with_bounds(Some(-800.0), Some(800.0)),
            )
            .with_range_action(RangeAction::injection("ra", "ra-element", -15.0, 12.0)),
        |perimeter, action| perimeter.with_network_action(action),
    );
    let tree = SearchTree::new(input(perimeter, network(-60.0)), SearchTreeParameters::default()).unwrap();

    let result = tree.run();

    assert_eq!(result.identifier(), "network action(s): open-a, open-c");
    assert!((result.cost() + 463.0).abs() < TOLERANCE, "cost {}", result.cost());
    assert_eq!(serde_json::to_value(result.status()).unwrap(), serde_json::json!("Optimized"));
}

/// One CNEC at 500 MW out of 800 that opening `line-a` relieves by 100 MW,
/// and an injection shifting 0.2 MW per MW off it.
fn filler_perimeter() -> OptimizationPerimeter {
    OptimizationPerimeter::new(State::preventive())
        .with_flow_cnec(
            FlowCnec::new("cnec", "line", State::preventive())
                .with_bounds(Some(-800.0), Some(800.0))
                .with_operator("FR"),
        )
        .with_network_action(NetworkAction::open("open-a", "line-a").with_operator("FR"))
        .with_range_action(RangeAction::injection("ra", "ra-element", -15.0, 12.0).with_operator("FR"))
}

fn filler_network() -> LinearNetwork {
    LinearNetwork::new("net")
        .with_base_flow("cnec", 500.0)
        .with_switchable("line-a")
        .with_opening_effect("line-a", "cnec", -100.0)
        .with_injection("ra-element", 0.0)
        .with_sensitivity("ra-element", "cnec", 0.2)
}

fn run_tree(
    perimeter: OptimizationPerimeter,
    network: LinearNetwork,
    parameters: SearchTreeParameters,
) -> SearchTreeResult {
    let perimeter = Arc::new(perimeter);
    let computer = LinearSensitivityComputer::new(
        perimeter.flow_cnecs().to_vec(),
        perimeter.range_actions().to_vec(),
    );
    let objective = MarginObjectiveFunction::new(&perimeter, parameters.objective.unit);
    let objective = if parameters.objective.kind.is_relative() {
        objective.relative()
    } else {
        objective
    };
    let input = SearchTreeInput::new(network, perimeter, Arc::new(objective), Arc::new(computer)).unwrap();
    SearchTree::new(input, parameters).unwrap().run()
}

fn setpoint(result: &SearchTreeResult, range_action_id: &str) -> f64 {
    result
        .result()
        .unwrap()
        .activation
        .optimized_setpoint(range_action_id)
        .unwrap()
}

#[test]
fn test_mnec_limits_injection_shift() {
    // every MW shifted off the CNEC pushes 2 MW onto the MNEC, which sits at
    // 94 MW out of 100
    let perimeter = filler_perimeter().with_flow_cnec(
        FlowCnec::new("mnec", "other-line", State::preventive())
            .with_bounds(Some(-100.0), Some(100.0))
            .as_monitored(),
    );
    let network = || {
        filler_network()
            .with_base_flow("mnec", 94.0)
            .with_sensitivity("ra-element", "mnec", -2.0)
    };

    let free = run_tree(perimeter.clone(), network(), SearchTreeParameters::default());
    assert_eq!(free.identifier(), "network action(s): open-a");
    assert!((setpoint(&free, "ra") + 15.0).abs() < TOLERANCE);

    let mut parameters = SearchTreeParameters::default();
    parameters.mnec = Some(MnecParameters {
        acceptable_margin_decrease: 0.0,
        ..MnecParameters::default()
    });
    let result = run_tree(perimeter, network(), parameters);

    assert_eq!(result.identifier(), "network action(s): open-a");
    assert!((setpoint(&result, "ra") + 3.0).abs() < TOLERANCE, "set-point {}", setpoint(&result, "ra"));
    assert!((result.cost() + 400.6).abs() < TOLERANCE, "cost {}", result.cost());
}

#[test]
fn test_loop_flow_limits_injection_shift() {
    // the border line carries 95 MW of loop flow, 100 MW allowed
    let perimeter = filler_perimeter().with_flow_cnec(
        FlowCnec::new("border", "border-line", State::preventive())
            .with_bounds(Some(-1000.0), Some(1000.0))
            .with_loop_flow_threshold(100.0),
    );
    let network = || {
        filler_network()
            .with_base_flow("border", 95.0)
            .with_commercial_flow("border", 0.0)
            .with_sensitivity("ra-element", "border", -1.0)
    };

    let free = run_tree(perimeter.clone(), network(), SearchTreeParameters::default());
    assert!((setpoint(&free, "ra") + 15.0).abs() < TOLERANCE);

    let mut parameters = SearchTreeParameters::default();
    parameters.loop_flow = Some(LoopFlowParameters::default());
    let result = run_tree(perimeter, network(), parameters);

    assert_eq!(result.identifier(), "network action(s): open-a");
    assert!((setpoint(&result, "ra") + 5.0).abs() < TOLERANCE, "set-point {}", setpoint(&result, "ra"));
}

/// `cnec` (FR) and `cnec-be` (BE, 700 MW out of 800) react in opposite
/// directions to the injection.
fn two_operator_perimeter() -> OptimizationPerimeter {
    filler_perimeter().with_flow_cnec(
        FlowCnec::new("cnec-be", "line-be", State::preventive())
            .with_bounds(Some(-800.0), Some(800.0))
            .with_operator("BE"),
    )
}

fn two_operator_network() -> LinearNetwork {
    filler_network()
        .with_base_flow("cnec-be", 700.0)
        .with_sensitivity("ra-element", "cnec-be", -0.2)
}

#[test]
fn test_unoptimized_operator_is_not_driven_by_the_optimizer() {
    let free = run_tree(two_operator_perimeter(), two_operator_network(), SearchTreeParameters::default());
    // the BE CNEC is the most limiting one and pulls the injection up
    assert_eq!(free.identifier(), "Root leaf");
    assert!((setpoint(&free, "ra") - 12.0).abs() < TOLERANCE);

    let mut parameters = SearchTreeParameters::default();
    parameters.unoptimized_cnecs.operators_not_to_optimize.insert("BE".into());
    let result = run_tree(two_operator_perimeter(), two_operator_network(), parameters);

    // BE only counts once its margin gets worse, which stops the FR CNEC
    // from pulling the injection down
    assert!(setpoint(&result, "ra").abs() < TOLERANCE, "set-point {}", setpoint(&result, "ra"));
}

#[test]
fn test_relative_margin_changes_the_chosen_leaf() {
    // 4.0 PTDF sum on the FR CNEC: its relative margin is the lowest
    let network = || {
        two_operator_network()
            .with_ptdf_zonal_sum("cnec", 4.0)
            .with_ptdf_zonal_sum("cnec-be", 1.0)
    };

    let absolute = run_tree(two_operator_perimeter(), network(), SearchTreeParameters::default());
    assert_eq!(absolute.identifier(), "Root leaf");
    assert!((setpoint(&absolute, "ra") - 12.0).abs() < TOLERANCE);

    let mut parameters = SearchTreeParameters::default();
    parameters.objective.kind = ObjectiveKind::MaxMinRelativeMargin;
    let result = run_tree(two_operator_perimeter(), network(), parameters);

    // (400 - 0.2 s) / 4 and 100 + 0.2 s balance at s = 0
    assert_eq!(result.identifier(), "network action(s): open-a");
    assert_eq!(result.depth, 1);
    assert!(setpoint(&result, "ra").abs() < TOLERANCE, "set-point {}", setpoint(&result, "ra"));
    assert!((result.cost() + 100.0).abs() < TOLERANCE, "cost {}", result.cost());
}

#[test]
fn test_integer_taps_reset_when_topology_takes_the_last_slot() {
    let taps = (-10..=10).map(|t| (t, t as f64 * 0.7)).collect();
    let pst = RangeAction::pst("pst", "pst-element", taps).with_operator("FR");
    let perimeter = OptimizationPerimeter::new(State::preventive())
        .with_flow_cnec(
            FlowCnec::new("cnec", "line", State::preventive()).with_bounds(Some(-800.0), Some(800.0)),
        )
        .with_network_action(NetworkAction::open("open-a", "line-a").with_operator("FR"))
        .with_range_action(pst.clone());
    let network = LinearNetwork::new("net")
        .with_base_flow("cnec", 500.0)
        .with_switchable("line-a")
        .with_opening_effect("line-a", "cnec", -100.0)
        .with_pst(&pst, 0)
        .with_sensitivity("pst-element", "cnec", -5.0);
    let mut parameters = SearchTreeParameters::default();
    parameters.linear_optimizer.pst_model = PstModel::ApproximatedIntegers;
    parameters.ra_usage_limits.max_ra = Some(1);

    let result = run_tree(perimeter, network, parameters);

    // the root moves the PST to its last tap (-335); open-a alone does better
    // once the PST is back to tap 0
    assert_eq!(result.identifier(), "network action(s): open-a");
    assert_eq!(result.depth, 1);
    let optimized = result.result().unwrap();
    assert!(optimized.activated_range_actions().is_empty());
    assert_eq!(optimized.activation.optimized_tap(&pst).unwrap(), 0);
    assert!((result.cost() + 400.0).abs() < TOLERANCE, "cost {}", result.cost());
}

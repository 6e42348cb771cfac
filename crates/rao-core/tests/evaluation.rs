use rao_core::{
    ComputationStatus, ElementaryAction, FlowCnec, LinearNetwork, LinearSensitivityComputer,
    MarginObjectiveFunction, Network, NetworkAction, ObjectiveFunction, OptimizationPerimeter,
    RangeAction, RangeActionActivationResult, RangeActionSetpointResult, SensitivityComputer,
    State, Unit, MNEC_COST, SENSITIVITY_FAILURE_COST,
};
use std::sync::Arc;

fn perimeter() -> OptimizationPerimeter {
    OptimizationPerimeter::new(State::preventive())
        .with_flow_cnec(
            FlowCnec::new("cnec", "line", State::preventive()).with_bounds(Some(-800.0), Some(800.0)),
        )
        .with_flow_cnec(
            FlowCnec::new("mnec", "other-line", State::preventive())
                .with_bounds(Some(-100.0), Some(100.0))
                .as_monitored(),
        )
        .with_network_action(NetworkAction::open("open-a", "line-a"))
        .with_range_action(RangeAction::hvdc("hvdc", "hvdc-line", -500.0, 500.0))
}

fn network() -> LinearNetwork {
    LinearNetwork::new("net")
        .with_base_flow("cnec", 500.0)
        .with_base_flow("mnec", 80.0)
        .with_switchable("line-a")
        .with_opening_effect("line-a", "cnec", -200.0)
        .with_opening_effect("line-a", "mnec", 70.0)
        .with_injection("hvdc-line", 0.0)
        .with_sensitivity("hvdc-line", "cnec", 0.5)
}

fn computer(perimeter: &OptimizationPerimeter) -> LinearSensitivityComputer {
    LinearSensitivityComputer::new(perimeter.flow_cnecs().to_vec(), perimeter.range_actions().to_vec())
}

#[test]
fn test_topology_trades_margin_for_mnec_violation() {
    let perimeter = perimeter();
    let computer = computer(&perimeter);
    let mut network = network();
    let initial = computer.compute(&network);
    let objective = MarginObjectiveFunction::new(&perimeter, Unit::Megawatt).with_mnec(
        initial.flow_result.clone(),
        50.0,
        10.0,
    );
    let activation = RangeActionActivationResult::new(
        RangeActionSetpointResult::from_network(&network, perimeter.range_actions().iter().map(|ra| ra.as_ref()))
            .unwrap(),
    );

    let before = objective.evaluate(
        &initial.flow_result,
        &activation,
        &initial.sensitivity_result,
        ComputationStatus::Success,
    );
    assert_eq!(before.functional_cost, -300.0);
    assert_eq!(before.named_virtual_cost(MNEC_COST), 0.0);

    assert!(perimeter.network_action("open-a").unwrap().apply(&mut network));
    let after_outcome = computer.compute(&network);
    let after = objective.evaluate(
        &after_outcome.flow_result,
        &activation,
        &after_outcome.sensitivity_result,
        ComputationStatus::Success,
    );
    // cnec relieved to 300 MW; the MNEC reaches 150 MW, 20 MW beyond what
    // its initial margin minus 50 MW allows
    assert_eq!(after.functional_cost, -500.0);
    assert!((after.named_virtual_cost(MNEC_COST) - 200.0).abs() < 1e-9);
    assert_eq!(after.costly_elements(MNEC_COST, 5), ["mnec".to_string()]);
    assert_eq!(after.most_limiting_elements(1), ["cnec".to_string()]);
}

#[test]
fn test_failed_computation_adds_overcost() {
    let perimeter = perimeter();
    let objective = MarginObjectiveFunction::new(&perimeter, Unit::Megawatt).with_sensitivity_failure_overcost(5000.0);
    let outcome = computer(&perimeter).compute(&network());

    let result = objective.evaluate(
        &outcome.flow_result,
        &RangeActionActivationResult::default(),
        &outcome.sensitivity_result,
        ComputationStatus::Failure,
    );

    assert_eq!(result.named_virtual_cost(SENSITIVITY_FAILURE_COST), 5000.0);
    assert_eq!(result.cost(), -300.0 + 5000.0);
}

#[test]
fn test_sensitivities_follow_the_range_action_element() {
    let perimeter = perimeter();
    let outcome = computer(&perimeter).compute(&network());

    assert_eq!(outcome.sensitivity_result.sensitivity("cnec", "hvdc"), 0.5);
    assert_eq!(outcome.sensitivity_result.sensitivity("mnec", "hvdc"), 0.0);

    let hvdc = Arc::clone(perimeter.range_action("hvdc").unwrap());
    let mut network = network();
    hvdc.apply(&mut network, -100.0).unwrap();
    assert_eq!(network.setpoint("hvdc-line"), Some(-100.0));
    assert_eq!(network.flow("cnec"), 450.0);
}

#[test]
fn test_network_action_from_json() {
    let action: NetworkAction = serde_json::from_str(
        r#"{
            "id": "open-a",
            "operator": "FR",
            "elementary_actions": [{ "type": "topology", "element_id": "line-a", "connect": false }]
        }"#,
    )
    .unwrap();

    assert_eq!(action.operator.as_deref(), Some("FR"));
    assert_eq!(action.usage_rules, NetworkAction::open("open-a", "line-a").usage_rules);
    assert!(action.usage_rules[0].is_defined_for(&State::preventive()));
    assert_eq!(
        action.elementary_actions,
        vec![ElementaryAction::Topology {
            element_id: "line-a".into(),
            connect: false
        }]
    );
    assert!(action.has_impact_on_network(&network()));
}

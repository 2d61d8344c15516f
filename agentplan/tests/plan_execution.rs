use agentplan::completion::ScriptedCompletionClient;
use agentplan::functions::{FunctionCatalog, NativeFunction, ParameterSchema};
use agentplan::planner::sequential::{parse_plan, SequentialPlanner};
use agentplan::{Kernel, KernelConfig, Plan, PlanError, PlanNodeId, PLAN_RESULT_KEY};
use pretty_assertions::assert_eq;
use promptlang::{ContextVariables, ExecutionContext, FunctionError, FunctionRegistry};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn catalog() -> FunctionCatalog {
    let mut catalog = FunctionCatalog::new();
    catalog.register_native(
        NativeFunction::builder("test", "echo")
            .description("Returns its input")
            .parameter(ParameterSchema::string("input"))
            .build_sync(|args| Ok(args.input().to_string())),
    );
    catalog.register_native(
        NativeFunction::builder("test", "join")
            .parameter(ParameterSchema::string("input"))
            .parameter(ParameterSchema::string("other").default_value("?"))
            .build_sync(|args| Ok(format!("{}+{}", args.input(), args.str("other")?))),
    );
    catalog.register_native(
        NativeFunction::builder("test", "upper")
            .parameter(ParameterSchema::string("input"))
            .build_sync(|args| Ok(args.input().to_uppercase())),
    );
    catalog.register_native(
        NativeFunction::builder("test", "fail")
            .build_sync(|_| Err(FunctionError::Execution("boom".to_string()))),
    );
    catalog
}

fn step(catalog: &FunctionCatalog, name: &str, params: &[(&str, &str)], outputs: &[&str]) -> Plan {
    let function = catalog.resolve("test", name).unwrap();
    let mut step = Plan::from_function(function.view());
    for (key, value) in params {
        step.root_mut().parameters.set(key, *value);
    }
    step.root_mut().outputs = outputs.iter().map(|o| o.to_string()).collect();
    step
}

#[tokio::test]
async fn test_caller_variables_win_over_plan_state() {
    let catalog = catalog();
    let ctx = ExecutionContext::new(&catalog);

    let mut plan = Plan::new("echo x");
    plan.add_step(step(&catalog, "echo", &[("input", "$x")], &[]));
    plan.state_mut(PlanNodeId::ROOT).unwrap().set("x", "2");

    let mut variables = ContextVariables::new();
    variables.set("x", "1");
    let result = plan.clone().invoke(&ctx, variables).await.unwrap();
    assert_eq!(result.input(), "1");

    let result = plan.invoke(&ctx, ContextVariables::new()).await.unwrap();
    assert_eq!(result.input(), "2");
}

#[tokio::test]
async fn test_outputs_flow_between_steps_and_into_result() {
    let catalog = catalog();
    let ctx = ExecutionContext::new(&catalog);

    let mut plan = Plan::new("chain");
    plan.add_step(step(&catalog, "echo", &[("input", "hello")], &["GREETING"]));
    plan.add_step(step(
        &catalog,
        "join",
        &[("input", "$GREETING"), ("other", "world")],
        &["RESULT__JOINED"],
    ));
    plan.add_output("RESULT__JOINED");

    let result = plan.invoke(&ctx, ContextVariables::new()).await.unwrap();
    assert_eq!(result.input(), "hello+world");
    assert_eq!(result.get("GREETING"), Some("hello"));
    assert_eq!(plan.root_state().get(PLAN_RESULT_KEY), Some("hello+world"));
    assert!(!plan.has_next_step());
}

#[tokio::test]
async fn test_step_without_input_uses_goal() {
    let catalog = catalog();
    let ctx = ExecutionContext::new(&catalog);

    let mut plan = Plan::new("the goal");
    plan.add_step(step(&catalog, "echo", &[], &[]));
    let result = plan.invoke(&ctx, ContextVariables::new()).await.unwrap();
    assert_eq!(result.input(), "the goal");
}

#[tokio::test]
async fn test_nested_plan_outputs_reach_later_siblings() {
    let catalog = catalog();
    let ctx = ExecutionContext::new(&catalog);

    let mut inner = Plan::new("inner goal");
    inner.add_step(step(&catalog, "upper", &[], &["X"]));
    inner.add_output("X");

    let mut plan = Plan::new("outer goal");
    let inner_id = plan.add_step(inner);
    plan.add_step(step(&catalog, "join", &[("input", "$X"), ("other", "done")], &[]));

    let state = plan.run_next_step(&ctx, ContextVariables::new()).await.unwrap();
    assert_eq!(state.get("X"), Some("INNER GOAL"));
    assert!(plan.has_next_step());

    let inner_state = plan.state(inner_id).unwrap();
    assert_eq!(inner_state.get("X"), Some("INNER GOAL"));
    assert_eq!(inner_state.get(PLAN_RESULT_KEY), Some("INNER GOAL"));

    let result = plan.invoke(&ctx, ContextVariables::new()).await.unwrap();
    assert_eq!(result.input(), "INNER GOAL+done");
    assert_eq!(plan.root_state().get("X"), Some("INNER GOAL"));
    assert!(!plan.has_next_step());
}

#[tokio::test]
async fn test_run_next_step_advances_one_step() {
    let catalog = catalog();
    let ctx = ExecutionContext::new(&catalog);

    let mut plan = Plan::new("two steps");
    plan.add_step(step(&catalog, "echo", &[("input", "a")], &[]));
    plan.add_step(step(&catalog, "join", &[], &[]));

    let state = plan.run_next_step(&ctx, ContextVariables::new()).await.unwrap();
    assert_eq!(state.input(), "a");
    assert!(plan.has_next_step());

    let state = plan
        .run_next_step(&ctx, ContextVariables::with_input("b"))
        .await
        .unwrap();
    assert_eq!(state.input(), "b+?");
    assert!(!plan.has_next_step());
}

#[tokio::test]
async fn test_failures_are_reported_with_the_step() {
    let catalog = catalog();
    let ctx = ExecutionContext::new(&catalog);

    let mut plan = Plan::new("fails");
    plan.add_step(step(&catalog, "fail", &[], &[]));
    let err = plan.invoke(&ctx, ContextVariables::new()).await.unwrap_err();
    assert!(matches!(err, PlanError::StepFailed { ref step, .. } if step == "test.fail"));

    let mut missing = Plan::new("missing");
    missing.add_step(step(&catalog, "echo", &[], &[]));
    let empty = FunctionCatalog::new();
    let err = missing
        .invoke(&ExecutionContext::new(&empty), ContextVariables::new())
        .await
        .unwrap_err();
    assert!(matches!(err, PlanError::FunctionNotFound(_)));
}

#[tokio::test]
async fn test_cancelled_plan_stops_before_next_step() {
    let catalog = catalog();
    let token = CancellationToken::new();
    token.cancel();
    let ctx = ExecutionContext::new(&catalog).with_cancellation(token);

    let mut plan = Plan::new("cancelled");
    plan.add_step(step(&catalog, "echo", &[("input", "a")], &[]));
    let err = plan.invoke(&ctx, ContextVariables::new()).await.unwrap_err();
    assert!(matches!(err, PlanError::Cancelled));
    assert!(plan.has_next_step());
}

#[tokio::test]
async fn test_saved_plan_resumes_where_it_stopped() {
    let catalog = catalog();
    let ctx = ExecutionContext::new(&catalog);

    let mut plan = Plan::new("resume");
    plan.add_step(step(&catalog, "echo", &[("input", "first")], &["FIRST"]));
    plan.add_step(step(&catalog, "join", &[("input", "$FIRST"), ("other", "second")], &[]));
    plan.run_next_step(&ctx, ContextVariables::new()).await.unwrap();

    let mut restored = Plan::from_json(&plan.to_json().unwrap()).unwrap();
    assert!(restored.has_next_step());
    let result = restored.invoke(&ctx, ContextVariables::new()).await.unwrap();
    assert_eq!(result.input(), "first+second");
}

#[tokio::test]
async fn test_parsed_plan_runs_against_builtins() {
    let mut kernel = Kernel::new(
        Arc::new(ScriptedCompletionClient::echo()),
        KernelConfig::default(),
    );
    kernel.register_builtin_plugins();

    let text = r#"<plan>
  <function.math.Add input="1" amount="2" setContextVariable="SUM"/>
  <function.text.concat input="sum is " input2="$SUM" appendToResult="RESULT__TEXT"/>
  <function.text.uppercase input="$RESULT__TEXT" appendToResult="RESULT__LOUD"/>
</plan>"#;
    let mut plan = parse_plan(text, "add", kernel.functions(), false).unwrap();
    let result = kernel
        .run_plan(&mut plan, ContextVariables::new(), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(
        plan.root_state().get(PLAN_RESULT_KEY),
        Some("sum is 3\nSUM IS 3")
    );
    assert_eq!(result.input(), "sum is 3\nSUM IS 3");
}

#[tokio::test]
async fn test_sequential_planner_end_to_end() {
    let client = Arc::new(ScriptedCompletionClient::new([
        r#"<plan>
<!-- shout it -->
<function.text.uppercase input="$INPUT" appendToResult="RESULT__ANSWER"/>
</plan>"#,
    ]));
    let mut kernel = Kernel::new(client.clone(), KernelConfig::default());
    kernel.register_builtin_plugins();

    let mut plan = SequentialPlanner::new(&kernel)
        .create_plan("make this loud", CancellationToken::new())
        .await
        .unwrap();
    let result = kernel
        .run_plan(
            &mut plan,
            ContextVariables::with_input("make this loud"),
            CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(result.input(), "MAKE THIS LOUD");
    assert_eq!(client.request_count(), 1);
}

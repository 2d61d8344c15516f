use agentplan::completion::{ChatHistory, RecordedRequest, ScriptedCompletionClient};
use agentplan::config::{KernelConfig, StepwiseConfig};
use agentplan::functions::NativeFunction;
use agentplan::planner::stepwise::{
    estimate_tokens, StepwiseError, StepwisePlanner, SystemStep, NOT_FOUND_MESSAGE,
};
use agentplan::Kernel;
use pretty_assertions::assert_eq;
use promptlang::FunctionError;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn kernel(client: Arc<ScriptedCompletionClient>) -> Kernel {
    let mut kernel = Kernel::new(client, KernelConfig::default());
    kernel.register_builtin_plugins();
    kernel.register_native_function(
        NativeFunction::builder("test", "fail")
            .description("Always fails")
            .build_sync(|_| Err(FunctionError::Execution("boom".to_string()))),
    );
    kernel.register_native_function(
        NativeFunction::builder("test", "silent")
            .description("Returns nothing")
            .build_sync(|_| Ok(String::new())),
    );
    kernel
}

fn chat(client: &ScriptedCompletionClient, index: usize) -> ChatHistory {
    match &client.requests()[index] {
        RecordedRequest::Chat(history) => history.clone(),
        other => panic!("expected a chat request, got {:?}", other),
    }
}

fn action(name: &str, variables: &str) -> String {
    format!(
        "[THOUGHT] calling {}\n[ACTION]\n{{\"action\": \"{}\", \"action_variables\": {}}}",
        name, name, variables
    )
}

#[tokio::test]
async fn test_final_answer_on_first_iteration() {
    let client = Arc::new(ScriptedCompletionClient::new(["[FINAL_ANSWER] 42"]));
    let kernel = kernel(client.clone());

    let outcome = StepwisePlanner::new(&kernel)
        .execute("What is six times seven?", CancellationToken::new())
        .await
        .unwrap();

    assert!(outcome.found);
    assert_eq!(outcome.answer, "42");
    assert_eq!(outcome.variables.input(), "42");
    assert_eq!(outcome.variables.get("iterations"), Some("1"));
    assert_eq!(outcome.variables.get("step_count"), Some("1"));
    assert_eq!(outcome.variables.get("function_count"), Some("0"));

    let history = chat(&client, 0);
    assert_eq!(history.len(), 2);
    assert!(history.messages()[0].content.contains("math.Add:"));
    assert!(history.messages()[1].content.contains("What is six times seven?"));
}

#[tokio::test]
async fn test_iteration_cap_without_answer() {
    let client = Arc::new(
        ScriptedCompletionClient::new(Vec::<String>::new()).with_fallback("[THOUGHT] still thinking"),
    );
    let kernel = kernel(client.clone());
    let config = StepwiseConfig {
        max_iterations: 3,
        ..StepwiseConfig::default()
    };

    let outcome = StepwisePlanner::with_config(&kernel, config)
        .execute("Will this ever end?", CancellationToken::new())
        .await
        .unwrap();

    assert!(!outcome.found);
    assert_eq!(outcome.answer, NOT_FOUND_MESSAGE);
    assert_eq!(outcome.variables.get("iterations"), Some("3"));
    assert_eq!(outcome.steps.len(), 3);
    assert_eq!(client.request_count(), 3);

    // thought-only turns are answered with an [ACTION] nudge
    let last = chat(&client, 2);
    assert_eq!(last.messages()[2].content, "[THOUGHT] still thinking");
    assert_eq!(last.messages()[3].content, "[ACTION]");
}

#[tokio::test]
async fn test_action_result_is_observed() {
    let client = Arc::new(ScriptedCompletionClient::new([
        action("math.Add", r#"{"input": "2", "amount": 40}"#),
        "[FINAL ANSWER] The sum is 42.".to_string(),
    ]));
    let kernel = kernel(client.clone());

    let outcome = StepwisePlanner::new(&kernel)
        .execute("Add 2 and 40", CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.answer, "The sum is 42.");
    assert_eq!(outcome.steps[0].action, "math.Add");
    assert_eq!(outcome.steps[0].observation, "42");
    assert_eq!(outcome.stats.function_count(), "1 (math.Add(1))");
    assert_eq!(
        outcome.variables.get("function_count"),
        Some("1 (math.Add(1))")
    );

    let second = chat(&client, 1);
    assert_eq!(second.last().unwrap().content, "[OBSERVATION] 42");
    assert!(second.messages()[2].content.starts_with("[THOUGHT] calling math.Add\n[ACTION]"));

    let steps: Vec<SystemStep> =
        serde_json::from_str(outcome.variables.get("steps_taken").unwrap()).unwrap();
    assert_eq!(steps, outcome.steps);
}

#[tokio::test]
async fn test_failures_become_observations() {
    let client = Arc::new(ScriptedCompletionClient::new([
        action("test.fail", "{}"),
        action("email.send", r#"{"input": "hi"}"#),
        action("test.silent", "{}"),
        action("a.b.c", "{}"),
        "[FINAL ANSWER] gave up".to_string(),
    ]));
    let kernel = kernel(client.clone());

    let outcome = StepwisePlanner::new(&kernel)
        .execute("Try things", CancellationToken::new())
        .await
        .unwrap();

    let observations: Vec<&str> = outcome.steps.iter().map(|s| s.observation.as_str()).collect();
    assert!(observations[0].starts_with("Error invoking action test.fail:"));
    assert!(observations[1].contains("'email.send' is not available"));
    assert_eq!(observations[2], "Got no result from action");
    assert!(observations[3].starts_with("Unable to resolve action 'a.b.c'"));
    assert_eq!(
        outcome.stats.function_count(),
        "2 (test.fail(1), test.silent(1))"
    );
}

#[tokio::test]
async fn test_excluded_functions_cannot_be_called() {
    let client = Arc::new(ScriptedCompletionClient::new([
        action("math.Add", r#"{"input": "1", "amount": "1"}"#),
        "[FINAL ANSWER] no".to_string(),
    ]));
    let kernel = kernel(client.clone());
    let config = StepwiseConfig {
        excluded_plugins: vec!["math".to_string()],
        ..StepwiseConfig::default()
    };

    let outcome = StepwisePlanner::with_config(&kernel, config)
        .execute("Add", CancellationToken::new())
        .await
        .unwrap();

    assert!(outcome.steps[0].observation.contains("is not available"));
    assert!(!chat(&client, 0).messages()[0].content.contains("math.Add:"));
    assert!(outcome.stats.function_calls.is_empty());
}

#[tokio::test]
async fn test_malformed_action_is_reported_back() {
    let client = Arc::new(ScriptedCompletionClient::new([
        "[THOUGHT] try\n[ACTION] {\"action\": math.Add}",
        "",
        "[FINAL ANSWER] recovered",
    ]));
    let kernel = kernel(client.clone());

    let outcome = StepwisePlanner::new(&kernel)
        .execute("Recover", CancellationToken::new())
        .await
        .unwrap();

    assert!(outcome.found);
    assert_eq!(outcome.steps.len(), 3);
    assert!(!outcome.steps[0].has_action());
    assert_eq!(outcome.steps[0].thought, "try");

    let second = chat(&client, 1);
    assert!(second
        .last()
        .unwrap()
        .content
        .starts_with("[OBSERVATION] The action JSON could not be parsed"));

    // an empty reply is answered with a [THOUGHT] nudge
    let third = chat(&client, 2);
    assert_eq!(third.last().unwrap().content, "[THOUGHT]");
}

#[tokio::test]
async fn test_action_completes_preceding_thought() {
    let client = Arc::new(ScriptedCompletionClient::new([
        "[THOUGHT] I should add the numbers".to_string(),
        "[ACTION] {\"action\": \"math.Add\", \"action_variables\": {\"input\": \"1\", \"amount\": \"2\"}}".to_string(),
        "[FINAL ANSWER] 3".to_string(),
    ]));
    let kernel = kernel(client.clone());

    let outcome = StepwisePlanner::new(&kernel)
        .execute("1 + 2", CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.steps.len(), 2);
    let merged = &outcome.steps[0];
    assert_eq!(merged.thought, "I should add the numbers");
    assert_eq!(merged.action, "math.Add");
    assert_eq!(merged.observation, "3");

    let third = chat(&client, 2);
    let contents: Vec<&str> = third.messages().iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents.len(), 4);
    assert!(contents[2].starts_with("[THOUGHT] I should add the numbers\n[ACTION]"));
    assert_eq!(contents[3], "[OBSERVATION] 3");
}

#[tokio::test]
async fn test_slow_iterations_are_not_paced_again() {
    let client = Arc::new(ScriptedCompletionClient::new([
        action("wait.seconds", r#"{"input": "0.3"}"#),
        "[FINAL ANSWER] waited".to_string(),
    ]));
    let kernel = kernel(client.clone());
    let config = StepwiseConfig {
        min_iteration_time_ms: 300,
        ..StepwiseConfig::default()
    };

    let started = std::time::Instant::now();
    let outcome = StepwisePlanner::with_config(&kernel, config)
        .execute("Wait a moment", CancellationToken::new())
        .await
        .unwrap();
    let elapsed = started.elapsed();

    assert!(outcome.found);
    assert!(elapsed >= std::time::Duration::from_millis(300));
    assert!(elapsed < std::time::Duration::from_millis(550), "took {:?}", elapsed);
}

#[tokio::test]
async fn test_thought_after_observation_is_not_merged() {
    let client = Arc::new(ScriptedCompletionClient::new([
        action("math.Add", r#"{"input": "1", "amount": "2"}"#),
        "[ACTION] {\"action\": \"math.Add\", \"action_variables\": {\"input\": \"3\", \"amount\": \"4\"}}".to_string(),
        "[FINAL ANSWER] 7".to_string(),
    ]));
    let kernel = kernel(client.clone());

    let outcome = StepwisePlanner::new(&kernel)
        .execute("1 + 2 + 4", CancellationToken::new())
        .await
        .unwrap();

    // the previous step already acted, so the thought-less action stands alone
    assert_eq!(outcome.steps.len(), 3);
    assert_eq!(outcome.steps[0].observation, "3");
    assert!(outcome.steps[1].thought.is_empty());
    assert_eq!(outcome.steps[1].observation, "7");
    assert_eq!(outcome.stats.function_count(), "2 (math.Add(2))");
}

#[tokio::test]
async fn test_action_after_rejected_reply_is_not_merged() {
    let client = Arc::new(ScriptedCompletionClient::new([
        "[THOUGHT] add them\n[ACTION] {\"action\": math.Add}",
        "[ACTION] {\"action\": \"math.Add\", \"action_variables\": {\"input\": \"1\", \"amount\": \"1\"}}",
        "[FINAL ANSWER] 2",
    ]));
    let kernel = kernel(client.clone());

    let outcome = StepwisePlanner::new(&kernel)
        .execute("1 + 1", CancellationToken::new())
        .await
        .unwrap();

    // the first step has a thought but was already answered with an observation
    assert_eq!(outcome.steps.len(), 3);
    assert_eq!(outcome.steps[0].thought, "add them");
    assert!(!outcome.steps[0].has_action());
    assert!(outcome.steps[0].observation.starts_with("The action JSON could not be parsed"));
    assert!(outcome.steps[1].thought.is_empty());
    assert_eq!(outcome.steps[1].action, "math.Add");
    assert_eq!(outcome.steps[1].observation, "2");
}

#[tokio::test]
async fn test_long_sessions_are_trimmed_to_budget() {
    let long = "a".repeat(400);
    let mut replies: Vec<String> = (0..6)
        .map(|_| action("text.echo", &format!("{{\"input\": \"{}\"}}", long)))
        .collect();
    replies.push("[FINAL ANSWER] done".to_string());
    let client = Arc::new(ScriptedCompletionClient::new(replies));
    let kernel = kernel(client.clone());
    let config = StepwiseConfig {
        max_tokens: 1000,
        max_tokens_ratio: 0.1,
        included_functions: vec!["text.echo".to_string()],
        ..StepwiseConfig::default()
    };
    let budget = config.max_prompt_tokens();

    let outcome = StepwisePlanner::with_config(&kernel, config)
        .with_prompt("Answer with the functions below.\n{{$function_descriptions}}")
        .unwrap()
        .execute("Echo a lot", CancellationToken::new())
        .await
        .unwrap();

    assert!(outcome.found);
    let mut trimmed = false;
    for i in 0..client.request_count() {
        let history = chat(&client, i);
        assert!(estimate_tokens(&history) < budget);
        if history
            .messages()
            .iter()
            .any(|m| m.content.ends_with("earlier messages trimmed]"))
        {
            trimmed = true;
            assert_eq!(history.messages()[2].content, "[THOUGHT] calling text.echo");
            assert!(history.last().unwrap().content.starts_with("[OBSERVATION] aaa"));
        }
    }
    assert!(trimmed);
}

#[tokio::test]
async fn test_prompt_over_budget_fails() {
    let client = Arc::new(ScriptedCompletionClient::new(["[FINAL ANSWER] x"]));
    let kernel = kernel(client.clone());
    let config = StepwiseConfig {
        max_tokens: 100,
        ..StepwiseConfig::default()
    };

    let err = StepwisePlanner::with_config(&kernel, config)
        .execute("Anything", CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, StepwiseError::BudgetExceeded { .. }));
    assert_eq!(client.request_count(), 0);
}

#[tokio::test]
async fn test_cancellation_and_empty_question() {
    let client = Arc::new(ScriptedCompletionClient::new(["[FINAL ANSWER] x"]));
    let kernel = kernel(client.clone());
    let planner = StepwisePlanner::new(&kernel);

    let token = CancellationToken::new();
    token.cancel();
    assert!(matches!(
        planner.execute("Anything", token).await,
        Err(StepwiseError::Cancelled)
    ));
    assert!(matches!(
        planner.execute("   ", CancellationToken::new()).await,
        Err(StepwiseError::EmptyQuestion)
    ));
    assert_eq!(client.request_count(), 0);
}

//! End-to-end runs: one request, one outcome.

use std::time::Duration;

use serde_json::json;
use stepflow::state::INTERNAL_ERROR_MESSAGE;
use stepflow::{
    ExecResponse, MockLlm, Outcome, ProgressEvent, ProgressWriter, ScriptedExecutor, Settings,
    WorkflowState, DISPATCHER_STAGE, PLANNER_STAGE, RECOVERY_STAGE,
};

use crate::common::{
    completions, harness, harness_with, plan, recoveries, recording_writer, shell_plan,
};

/// **Scenario**: Every step succeeds; the run ends succeeded with a summary and one Complete event.
#[tokio::test]
async fn all_steps_succeed() {
    let h = harness(
        MockLlm::new([shell_plan(&["mkdir -p ~/reports", "ls ~/reports"])]),
        ScriptedExecutor::new([ExecResponse::success(""), ExecResponse::success("q3.pdf\n")]),
    );
    let (writer, events) = recording_writer();

    let state = h.runner.run("make a reports folder", vec![], writer).await;
    assert_eq!(state.outcome(), Outcome::Succeeded);
    assert!(state.task_complete);
    assert_eq!(state.skill_cursor, 2);
    assert!(state.skill_results.iter().all(|r| r.ok));
    assert!(state.summary.is_some());
    assert_eq!(state.final_answer, state.summary);
    assert_eq!(state.trace.count_for(PLANNER_STAGE), 1);
    assert_eq!(state.trace.count_for(DISPATCHER_STAGE), 3);
    assert_eq!(state.trace.count_for(RECOVERY_STAGE), 0);
    assert_eq!(h.llm.call_count(), 1);

    let events = events.lock().unwrap();
    assert_eq!(completions(&events), vec!["succeeded"]);
    let successes = events
        .iter()
        .filter(|e| matches!(e, ProgressEvent::StepSuccess { .. }))
        .count();
    assert_eq!(successes, 2);
}

/// **Scenario**: A failing optional step is skipped and the plan carries on.
#[tokio::test]
async fn optional_failure_is_skipped() {
    let steps = plan(vec![
        json!({"skill": "shell_run", "args": {"command": "open -a Preview"}, "optional": true}),
        json!({"skill": "shell_run", "args": {"command": "echo done"}}),
    ]);
    let h = harness(
        MockLlm::new([steps]),
        ScriptedExecutor::new([
            ExecResponse::failure("Unable to find application named 'Preview'"),
            ExecResponse::success("done"),
        ]),
    );
    let state = h.runner.run("open preview", vec![], ProgressWriter::noop()).await;
    assert_eq!(state.outcome(), Outcome::Succeeded);
    assert_eq!(state.skill_results.len(), 2);
    assert!(!state.skill_results[0].ok);
    assert_eq!(state.trace.count_for(RECOVERY_STAGE), 0);
}

/// **Scenario**: Permission denied asks the user where to write instead, without an LLM call.
#[tokio::test]
async fn permission_denied_asks_user() {
    let h = harness(
        MockLlm::new([shell_plan(&["mkdir /root/reports"])]),
        ScriptedExecutor::new([ExecResponse::failure(
            "mkdir: cannot create directory '/root/reports': Permission denied",
        )
        .with_exit_code(1)]),
    );
    let (writer, events) = recording_writer();

    let state = h.runner.run("make a reports folder", vec![], writer).await;
    assert_eq!(state.outcome(), Outcome::AwaitingUser);
    let question = state.pending_question.as_ref().unwrap();
    assert!(question.question.contains("create that directory"));
    assert_eq!(question.options.len(), 3);
    assert_eq!(question.options[2], "Cancel the task");
    assert_eq!(state.final_answer.as_deref(), Some(question.render().as_str()));
    assert_eq!(state.skill_cursor, 0);
    assert_eq!(state.plan.len(), 1);
    assert_eq!(h.llm.call_count(), 1);

    let events = events.lock().unwrap();
    assert_eq!(recoveries(&events), vec![("ask_user".to_string(), true)]);
    assert_eq!(completions(&events), vec!["awaiting_user"]);
}

/// **Scenario**: A search that finds nothing replans with a wider scope instead of asking.
#[tokio::test]
async fn empty_search_replans_wider() {
    let h = harness(
        MockLlm::new([
            shell_plan(&["find ~/Documents -name report.pdf"]),
            shell_plan(&["find ~ -iname '*report*'"]),
        ]),
        ScriptedExecutor::new([
            ExecResponse::success(""),
            ExecResponse::success("/home/me/old/report.pdf\n"),
        ]),
    );
    let (writer, events) = recording_writer();

    let state = h.runner.run("find my report", vec![], writer).await;
    assert_eq!(state.outcome(), Outcome::Succeeded);
    assert_eq!(state.search_scope_level, 1);
    assert_eq!(state.replan_count, 1);
    assert_eq!(state.skill_results.len(), 2);
    assert!(state.skill_results[0]
        .error
        .as_deref()
        .unwrap()
        .starts_with("[no_results]"));

    let prompts = h.llm.prompts();
    assert_eq!(prompts.len(), 2);
    assert!(prompts[1].contains("Widen it"));
    assert!(prompts[1].contains("Failed skill: shell_run"));
    assert_eq!(
        recoveries(&events.lock().unwrap()),
        vec![("replan".to_string(), true)]
    );
}

/// **Scenario**: An empty search whose terms look like an error message still widens the
/// search instead of asking the user.
#[tokio::test]
async fn empty_search_for_error_text_replans_wider() {
    let h = harness(
        MockLlm::new([
            shell_plan(&["grep -ri 'permission denied' /var/log/app"]),
            shell_plan(&["grep -ri 'permission denied' /var/log"]),
        ]),
        ScriptedExecutor::new([
            ExecResponse::success(""),
            ExecResponse::success("/var/log/auth.log: permission denied for user\n"),
        ]),
    );
    let (writer, events) = recording_writer();

    let state = h.runner.run("find permission errors", vec![], writer).await;
    assert_eq!(state.outcome(), Outcome::Succeeded);
    assert!(state.pending_question.is_none());
    assert_eq!(state.search_scope_level, 1);
    assert_eq!(
        recoveries(&events.lock().unwrap()),
        vec![("replan".to_string(), true)]
    );
}

/// **Scenario**: Replans past the configured limit become a question.
#[tokio::test]
async fn replan_limit_asks_user() {
    let settings = Settings {
        max_replans: 1,
        ..Settings::default()
    };
    let h = harness_with(
        MockLlm::always(shell_plan(&["find . -name missing.txt"])),
        ScriptedExecutor::from_fn(|_| Ok(ExecResponse::success(""))),
        settings,
    );

    let state = h.runner.run("find missing.txt", vec![], ProgressWriter::noop()).await;
    assert_eq!(state.outcome(), Outcome::AwaitingUser);
    assert_eq!(state.replan_count, 1);
    assert_eq!(state.search_scope_level, 2);
    assert_eq!(h.executor.call_count(), 2);
    let question = state.pending_question.unwrap();
    assert!(question.question.contains("re-planned this task 1 times"));
}

/// **Scenario**: Timeouts retry with a doubled then tripled budget, then ask the user.
#[tokio::test]
async fn timeouts_escalate_then_ask() {
    let h = harness(
        MockLlm::new([shell_plan(&["./long-export.sh"])]),
        ScriptedExecutor::new([
            ExecResponse::failure("command timed out"),
            ExecResponse::failure("command timed out"),
            ExecResponse::failure("command timed out"),
        ]),
    );
    let (writer, events) = recording_writer();

    let state = h.runner.run("run the export", vec![], writer).await;
    assert_eq!(
        h.executor.timeouts(),
        vec![
            Duration::from_millis(30_000),
            Duration::from_millis(60_000),
            Duration::from_millis(90_000),
        ]
    );
    assert_eq!(state.outcome(), Outcome::AwaitingUser);
    assert_eq!(state.step_retry_count, 2);
    assert_eq!(state.plan[0].args["timeout_ms"], json!(90_000));
    assert!(state
        .pending_question
        .unwrap()
        .question
        .contains("keeps timing out"));
    assert_eq!(h.llm.call_count(), 1);
    assert_eq!(
        recoveries(&events.lock().unwrap()),
        vec![
            ("auto_patch".to_string(), true),
            ("auto_patch".to_string(), true),
            ("ask_user".to_string(), true),
        ]
    );
}

/// **Scenario**: An unknown failure with no usable LLM answer asks with the default options.
#[tokio::test]
async fn unmatched_failure_without_llm_answer_asks_default() {
    let h = harness(
        MockLlm::new([shell_plan(&["./build.sh"])]),
        ScriptedExecutor::new([ExecResponse::failure("segmentation fault").with_exit_code(139)]),
    );
    let (writer, events) = recording_writer();

    let state = h.runner.run("build it", vec![], writer).await;
    assert_eq!(state.outcome(), Outcome::AwaitingUser);
    let question = state.pending_question.unwrap();
    assert!(question.question.contains("segmentation fault"));
    assert_eq!(
        question.options,
        vec!["Retry the step", "Try a different approach", "Cancel the task"]
    );
    assert_eq!(h.llm.call_count(), 2);
    assert_eq!(
        recoveries(&events.lock().unwrap()),
        vec![("ask_user".to_string(), false)]
    );
}

/// **Scenario**: A single-session plan is moved onto the open browser session and the
/// navigation to the already-open page is dropped.
#[tokio::test]
async fn open_session_is_reused() {
    let steps = plan(vec![
        json!({"skill": "browser_act", "args": {"action": "navigate", "url": "https://www.example.com", "session_id": "s1"}}),
        json!({"skill": "browser_act", "args": {"action": "click", "target": "More", "session_id": "s1"}}),
    ]);
    let h = harness(
        MockLlm::new([steps]),
        ScriptedExecutor::new([ExecResponse::success("")]),
    );
    let mut state = WorkflowState::new("click More", vec![]);
    state.browser.active_session_id = Some("live".into());
    state.browser.active_url = Some("https://example.com/".into());

    let state = h.runner.execute(state, ProgressWriter::noop()).await;
    assert_eq!(state.outcome(), Outcome::Succeeded);
    assert_eq!(state.plan.len(), 1);
    let requests = h.executor.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].args["action"], json!("click"));
    assert_eq!(requests[0].args["session_id"], json!("live"));
    assert!(h.llm.prompts()[0].contains("session_id \"live\""));
}

/// **Scenario**: A plan comparing two sites keeps its own session ids.
#[tokio::test]
async fn multi_session_plan_is_untouched() {
    let steps = plan(vec![
        json!({"skill": "browser_act", "args": {"action": "navigate", "url": "https://example.com", "session_id": "a"}}),
        json!({"skill": "browser_act", "args": {"action": "navigate", "url": "https://example.org", "session_id": "b"}}),
    ]);
    let h = harness(
        MockLlm::new([steps]),
        ScriptedExecutor::new([ExecResponse::success(""), ExecResponse::success("")]),
    );
    let mut state = WorkflowState::new("compare the two sites", vec![]);
    state.browser.active_session_id = Some("live".into());
    state.browser.active_url = Some("https://example.com/".into());

    let state = h.runner.execute(state, ProgressWriter::noop()).await;
    assert_eq!(state.outcome(), Outcome::Succeeded);
    let sessions: Vec<_> = h
        .executor
        .requests()
        .iter()
        .map(|r| r.args["session_id"].clone())
        .collect();
    assert_eq!(sessions, vec![json!("a"), json!("b")]);
}

/// **Scenario**: A plan longer than the iteration cap halts failed with the generic message.
#[tokio::test]
async fn iteration_cap_fails_run() {
    let h = harness_with(
        MockLlm::new([shell_plan(&["echo 1", "echo 2", "echo 3", "echo 4", "echo 5"])]),
        ScriptedExecutor::from_fn(|_| Ok(ExecResponse::success("ok"))),
        Settings::default().with_max_iterations(3),
    );
    let (writer, events) = recording_writer();

    let state = h.runner.run("count to five", vec![], writer).await;
    assert_eq!(state.outcome(), Outcome::Failed);
    assert_eq!(state.final_answer.as_deref(), Some(INTERNAL_ERROR_MESSAGE));
    assert!(state.error.as_deref().unwrap().contains('3'));
    assert_eq!(h.executor.call_count(), 2);
    assert_eq!(state.trace.len(), 3);

    let events = events.lock().unwrap();
    match events.last() {
        Some(ProgressEvent::Complete { outcome, summary }) => {
            assert_eq!(outcome, "failed");
            assert_eq!(summary, INTERNAL_ERROR_MESSAGE);
        }
        other => panic!("expected a final Complete event, got {:?}", other),
    }
}

/// **Scenario**: With no LLM backend the run fails at planning and never calls the executor.
#[tokio::test]
async fn no_backend_fails_at_planning() {
    let h = harness(MockLlm::unavailable(), ScriptedExecutor::new([]));
    let (writer, events) = recording_writer();

    let state = h.runner.run("anything", vec![], writer).await;
    assert_eq!(state.outcome(), Outcome::Failed);
    assert!(state.plan_error.is_some());
    assert!(state
        .final_answer
        .as_deref()
        .unwrap()
        .starts_with("No language model is available"));
    assert_eq!(h.executor.call_count(), 0);
    let events = events.lock().unwrap();
    assert!(events
        .iter()
        .any(|e| matches!(e, ProgressEvent::PlanError { .. })));
    assert_eq!(completions(&events), vec!["failed"]);
}

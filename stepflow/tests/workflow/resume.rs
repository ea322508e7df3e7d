//! Continuing a finished run: answering a pending question, or a follow-up request.

use serde_json::json;
use stepflow::{
    ExecResponse, Message, MockLlm, Outcome, Phase, ProgressEvent, ProgressWriter,
    ScriptedExecutor, WorkflowState,
};

use crate::common::{harness, plan, recording_writer, shell_plan};

/// **Scenario**: After a permission question, the reply goes to the planner and the run
/// finishes; the saved state survives a JSON round trip in between.
#[tokio::test]
async fn reply_to_question_replans_and_succeeds() {
    let h = harness(
        MockLlm::new([
            shell_plan(&["mkdir /root/reports"]),
            shell_plan(&["mkdir -p /tmp/stepflow/reports"]),
        ]),
        ScriptedExecutor::new([
            ExecResponse::failure("mkdir: /root/reports: Permission denied").with_exit_code(1),
            ExecResponse::success(""),
        ]),
    );
    let first = h
        .runner
        .run("make a reports folder", vec![], ProgressWriter::noop())
        .await;
    assert_eq!(first.outcome(), Outcome::AwaitingUser);

    let saved = serde_json::to_string(&first).unwrap();
    let restored: WorkflowState = serde_json::from_str(&saved).unwrap();
    assert!(restored.pending_question.is_some());

    let (writer, events) = recording_writer();
    let state = h
        .runner
        .resume(restored, "Use /tmp/stepflow", writer)
        .await;
    assert_eq!(state.outcome(), Outcome::Succeeded);
    assert!(state.pending_question.is_none());
    assert_eq!(state.skill_results.len(), 2);
    assert!(!state.skill_results[0].ok);
    assert!(state.skill_results[1].ok);
    assert!(matches!(state.conversation.first(), Some(Message::Assistant(_))));
    assert!(matches!(state.conversation.last(), Some(Message::User(_))));

    let prompts = h.llm.prompts();
    assert!(prompts[1].contains("The user replied: Use /tmp/stepflow"));
    let events = events.lock().unwrap();
    assert!(events
        .iter()
        .any(|e| matches!(e, ProgressEvent::PlanStart { replan: true, .. })));
}

/// **Scenario**: A follow-up request without a pending question starts fresh but keeps the
/// browser session, and the new plan is moved onto it.
#[tokio::test]
async fn follow_up_reuses_browser_session() {
    let h = harness(
        MockLlm::new([
            plan(vec![json!({"skill": "browser_act", "args": {"action": "navigate", "url": "https://example.com", "session_id": "s1"}})]),
            plan(vec![json!({"skill": "browser_act", "args": {"action": "click", "target": "More", "session_id": "s7"}})]),
        ]),
        ScriptedExecutor::new([
            ExecResponse {
                session_id: Some("s1".into()),
                ..ExecResponse::success("").with_url("https://example.com/")
            },
            ExecResponse::success(""),
        ]),
    );
    let first = h
        .runner
        .run("open example.com", vec![], ProgressWriter::noop())
        .await;
    assert_eq!(first.outcome(), Outcome::Succeeded);
    assert_eq!(first.browser.active_session_id.as_deref(), Some("s1"));

    let state = h
        .runner
        .resume(first, "click the More link", ProgressWriter::noop())
        .await;
    assert_eq!(state.request, "click the More link");
    assert_eq!(state.outcome(), Outcome::Succeeded);
    assert_eq!(state.skill_results.len(), 1);
    assert_eq!(state.conversation.len(), 2);
    assert_eq!(state.conversation[0].content(), "open example.com");

    let requests = h.executor.requests();
    assert_eq!(requests[1].args["session_id"], json!("s1"));
    assert!(h.llm.prompts()[1].contains("Recent conversation"));
}

/// **Scenario**: Resuming resets per-request recovery bookkeeping but keeps the results.
#[test]
fn resume_resets_recovery_counters() {
    let mut state = WorkflowState::new("x", vec![]);
    state.replan_count = 2;
    state.step_retry_count = 1;
    state.recovery_occurrences.insert("timeout".into(), 2);
    state.phase = Phase::AwaitingUser;
    state.final_answer = Some("Which folder?".into());

    state.resume_with_reply("the second one");
    assert_eq!(state.replan_count, 0);
    assert_eq!(state.step_retry_count, 0);
    assert!(state.recovery_occurrences.is_empty());
    assert_eq!(state.phase, Phase::Planning);
    assert_eq!(state.conversation.len(), 2);
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use sandbox::{RunReport, TestResult};
use serde_json::json;

use super::{
    hint_instruction, summarize_results, system_prompt, NudgeReason, TurnContext,
    CODE_EXCERPT_MAX,
};
use crate::test_support::two_sum;
use crate::session_log::{ChatMessage, InterviewPhase, Mode, Role};

#[test]
fn system_prompt_carries_problem_and_mode() {
    let problem = two_sum();
    let text = system_prompt(&problem, Mode::Learning, None);
    assert!(text.contains("Two Sum"));
    assert!(text.contains("twoSum"));
    assert!(text.contains("coding tutor"));
    assert!(text.contains("./solution.py"));
}

#[test]
fn interview_prompt_differs_from_learning() {
    let problem = two_sum();
    let learning = system_prompt(&problem, Mode::Learning, None);
    let interview = system_prompt(&problem, Mode::Interview, None);
    assert_ne!(learning, interview);
    assert!(interview.contains("mock coding interview"));
}

#[test]
fn resume_prompt_replays_history() {
    let problem = two_sum();
    let history = vec![
        ChatMessage { role: Role::User, content: "hi".to_owned(), timestamp_ms: 1 },
        ChatMessage {
            role: Role::Assistant,
            content: "What do you notice about the input?".to_owned(),
            timestamp_ms: 2,
        },
    ];
    let text = system_prompt(&problem, Mode::Learning, Some(&history));
    assert!(text.contains("resumed after a disconnect"));
    assert!(text.contains("[student] hi"));
    assert!(text.contains("[tutor] What do you notice"));
}

#[test]
fn context_renders_clock_and_phase() {
    let ctx = TurnContext {
        problem_title: "Two Sum",
        mode: Mode::Interview,
        hint_level: 2,
        hints_given: 2,
        time_remaining_s: Some(125),
        interview_phase: Some(InterviewPhase::Coding),
        last_results: None,
        code: None,
    };
    let text = ctx.render();
    assert!(text.starts_with("[context]"));
    assert!(text.contains("time remaining: 2:05"));
    assert!(text.contains("interview phase: coding"));
    assert!(text.contains("rung 2 (concept), 2 given so far"));
}

#[test]
fn context_truncates_code_at_byte_budget() {
    let code = "x".repeat(CODE_EXCERPT_MAX + 500);
    let ctx = TurnContext {
        problem_title: "Two Sum",
        mode: Mode::Learning,
        hint_level: 0,
        hints_given: 0,
        time_remaining_s: None,
        interview_phase: None,
        last_results: None,
        code: Some(&code),
    };
    let text = ctx.render();
    assert!(text.contains(&format!("code ({} bytes)", code.len())));
    assert!(text.contains("(truncated; full file at ./solution.py)"));
    assert!(text.len() < code.len());
}

fn report_with_failure() -> RunReport {
    let failing = TestResult {
        test_num: 2,
        input: serde_json::Map::new(),
        expected: json!([0, 1]),
        actual: None,
        passed: false,
        error: Some("TypeError: unsupported operand\n  long traceback".to_owned()),
        runtime_ms: None,
        stdout: String::new(),
    };
    RunReport { passed: 1, failed: 1, results: vec![failing] }
}

#[test]
fn results_summary_names_first_failure() {
    let summary = summarize_results(&report_with_failure());
    assert_eq!(summary, "1/2 passing; test 2 error: TypeError: unsupported operand");
}

#[test]
fn results_summary_all_passing() {
    let report = RunReport { passed: 3, failed: 0, results: vec![] };
    assert_eq!(summarize_results(&report), "3/3 passing");
}

#[test]
fn hint_instruction_embeds_rung_constraint() {
    let text = hint_instruction(2, None, None);
    assert!(text.contains("Rung 2 is in effect"));
    assert!(text.contains("data structure family"));
}

#[test]
fn hint_instruction_with_coaching_and_explanation() {
    let text = hint_instruction(4, Some("coach first"), Some("I think it's a graph"));
    assert!(text.starts_with("coach first"));
    assert!(text.contains("I think it's a graph"));
    assert!(text.contains("Rung 4"));
}

#[test]
fn nudge_instructions_differ_by_reason() {
    let idle = super::nudge_instruction(NudgeReason::Idle);
    let flail = super::nudge_instruction(NudgeReason::Flailing { level: 2 });
    let avoid = super::nudge_instruction(NudgeReason::Avoidance);
    assert!(idle.contains("inactive"));
    assert!(flail.contains("rung 2"));
    assert!(avoid.contains("without asking for help"));
}

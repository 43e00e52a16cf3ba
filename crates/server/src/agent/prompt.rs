// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! System prompt and per-turn context assembly.
//!
//! The subprocess gets one system prompt at spawn; everything volatile
//! (code, test results, hint ladder position, clock) is re-rendered into
//! a context block on every turn so the model never works from stale
//! state.

use std::fmt::Write as _;

use sandbox::RunReport;

use crate::catalog::Problem;
use crate::hints;
use crate::session_log::{ChatMessage, InterviewPhase, Mode, Role};

/// Cap on the code excerpt embedded in a turn (the full file is always
/// available at ./solution.py).
pub const CODE_EXCERPT_MAX: usize = 4 * 1024;

/// Cap on replayed history when rebuilding an expired session.
const RESUME_HISTORY_MAX: usize = 40;

const LEARNING_TEMPLATE: &str = "You are a patient coding tutor. Guide the student toward their \
own solution with questions and targeted observations. Never paste a full solution unless the \
hint ladder explicitly reaches its final rung.";

const INTERVIEW_TEMPLATE: &str = "You are conducting a timed mock coding interview. Stay in \
role: probe for clarifying questions first, then observe the candidate coding, and keep \
assistance minimal. When the interview enters its review phase, switch to honest, specific \
feedback on correctness, complexity, and communication.";

const QUIZ_TEMPLATE: &str = "You are running a pattern-recognition quiz. Present the problem, \
ask which algorithmic pattern applies and why, and challenge shallow answers. Do not discuss \
implementation details until the pattern is named correctly.";

/// Build the system prompt for a fresh or resumed subprocess.
pub fn system_prompt(
    problem: &Problem,
    mode: Mode,
    resume_history: Option<&[ChatMessage]>,
) -> String {
    let template = match mode {
        Mode::Learning => LEARNING_TEMPLATE,
        Mode::Interview => INTERVIEW_TEMPLATE,
        Mode::PatternQuiz => QUIZ_TEMPLATE,
    };

    let mut out = String::new();
    let _ = writeln!(out, "{template}");
    let _ = writeln!(out);
    let _ = writeln!(out, "Problem: {} ({})", problem.title, problem.difficulty);
    let _ = writeln!(out, "Target function: {}", problem.function_name);
    if let Some(ref complexity) = problem.optimal_complexity {
        let _ = writeln!(out, "Optimal complexity: {complexity}");
    }
    if !problem.approaches.is_empty() {
        let _ = writeln!(out, "Known approaches: {}", problem.approaches.join(", "));
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "{}", problem.description.trim());
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "The student's current code is at ./solution.py and their latest test run at \
./test_results.json; read them when you need detail beyond the turn context."
    );
    let _ = writeln!(
        out,
        "Hints follow a five-rung ladder; each turn tells you the rung in effect. Never \
exceed the stated rung's specificity."
    );

    if let Some(history) = resume_history {
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "This session is being resumed after a disconnect. Prior conversation, oldest \
first:"
        );
        let skip = history.len().saturating_sub(RESUME_HISTORY_MAX);
        for msg in &history[skip..] {
            let role = match msg.role {
                Role::User => "student",
                Role::Assistant => "tutor",
                Role::System => "system",
            };
            let _ = writeln!(out, "[{role}] {}", truncate_bytes(&msg.content, 600));
        }
        let _ = writeln!(out, "Continue the conversation; do not re-introduce yourself.");
    }

    out
}

/// Per-turn context. Rendered fresh before every turn.
#[derive(Debug)]
pub struct TurnContext<'a> {
    pub problem_title: &'a str,
    pub mode: Mode,
    pub hint_level: u8,
    pub hints_given: u32,
    pub time_remaining_s: Option<u32>,
    pub interview_phase: Option<InterviewPhase>,
    pub last_results: Option<&'a RunReport>,
    pub code: Option<&'a str>,
}

impl TurnContext<'_> {
    pub fn render(&self) -> String {
        let mut out = String::from("[context]\n");
        let _ = writeln!(out, "problem: {}", self.problem_title);
        let _ = writeln!(out, "mode: {}", self.mode);
        let level = usize::from(self.hint_level.min(hints::MAX_LEVEL));
        let _ = writeln!(
            out,
            "hint ladder: rung {} ({}), {} given so far",
            self.hint_level,
            hints::LEVEL_NAMES[level],
            self.hints_given,
        );
        if let Some(seconds) = self.time_remaining_s {
            let _ = writeln!(out, "time remaining: {}:{:02}", seconds / 60, seconds % 60);
        }
        if let Some(phase) = self.interview_phase {
            let _ = writeln!(out, "interview phase: {}", phase.as_str());
        }
        if let Some(report) = self.last_results {
            let _ = writeln!(out, "last run: {}", summarize_results(report));
        }
        if let Some(code) = self.code {
            let excerpt = truncate_bytes(code, CODE_EXCERPT_MAX);
            let _ = writeln!(out, "code ({} bytes):", code.len());
            let _ = writeln!(out, "```python\n{excerpt}\n```");
            if excerpt.len() < code.len() {
                let _ = writeln!(out, "(truncated; full file at ./solution.py)");
            }
        }
        out.push_str("[/context]\n");
        out
    }
}

/// One-line summary of a test run for the context block.
pub fn summarize_results(report: &RunReport) -> String {
    let total = report.passed + report.failed;
    if report.failed == 0 {
        return format!("{}/{total} passing", report.passed);
    }
    let first_failure = report
        .results
        .iter()
        .find(|r| !r.passed)
        .map(|r| match &r.error {
            Some(e) => format!("test {} error: {}", r.test_num, first_line(e, 120)),
            None => format!("test {} returned a wrong answer", r.test_num),
        })
        .unwrap_or_else(|| "unknown failure".to_owned());
    format!("{}/{total} passing; {first_failure}", report.passed)
}

/// Instruction payload for a hint turn at the given rung.
pub fn hint_instruction(level: u8, coaching: Option<&str>, explanation: Option<&str>) -> String {
    let rung = usize::from(level.min(hints::MAX_LEVEL));
    let mut out = String::new();
    if let Some(coaching) = coaching {
        let _ = writeln!(out, "{coaching}");
    }
    if let Some(explanation) = explanation {
        let _ = writeln!(
            out,
            "The student explained their current understanding as: {explanation}"
        );
        let _ = writeln!(out, "Address their actual misconception directly.");
    }
    let _ = writeln!(out, "The student asked for a hint. Rung {level} is in effect:");
    let _ = writeln!(out, "{}", hints::LEVEL_PROMPTS[rung]);
    out
}

/// Instruction payload for an unsolicited nudge.
pub fn nudge_instruction(reason: NudgeReason) -> String {
    match reason {
        NudgeReason::Idle => format!(
            "The student has been inactive for a while. Check in with one short, friendly \
message. {}",
            hints::LEVEL_PROMPTS[0]
        ),
        NudgeReason::Flailing { level } => format!(
            "The student keeps hitting the same kind of error. Without being asked, give a \
hint at rung {level}:\n{}",
            hints::LEVEL_PROMPTS[usize::from(level.min(hints::MAX_LEVEL))]
        ),
        NudgeReason::Avoidance => hints::AVOIDANCE_OFFER.to_owned(),
    }
}

/// Why an unsolicited turn is being taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NudgeReason {
    Idle,
    Flailing { level: u8 },
    Avoidance,
}

/// Instruction payload for the interview review transition.
pub const REVIEW_INSTRUCTION: &str = "The coding portion of the interview is over. Enter the \
review phase: walk through the candidate's final code, assess correctness and complexity, \
note what was communicated well, and give two concrete improvements. Do not continue \
coaching on the solution.";

/// Instruction payload for the session-opening greeting.
pub const GREETING_INSTRUCTION: &str = "The session just started. Greet the student briefly, \
introduce the problem in one or two sentences, and invite their first question or attempt.";

/// Truncate at a byte budget, backing up to a char boundary.
fn truncate_bytes(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

fn first_line(s: &str, max: usize) -> &str {
    truncate_bytes(s.lines().next().unwrap_or_default(), max)
}

#[cfg(test)]
#[path = "prompt_tests.rs"]
mod tests;

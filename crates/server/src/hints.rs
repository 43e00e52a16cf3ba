// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Hint ladder policy.
//!
//! Five rungs, 0..=4. Rung 0 is the unsolicited-encouragement register
//! used by nudges; explicit requests climb 1..=4. The policy decides the
//! rung and any coaching prefix from observable signals only; the level
//! is recorded as delivered after the tutor turn succeeds, so a failed
//! turn never skips a rung.

use std::time::{Duration, Instant};

pub const MAX_LEVEL: u8 = 4;

/// Two requests inside this window with no intervening edit is abuse.
pub const ABUSE_WINDOW: Duration = Duration::from_secs(15);

/// Errors with no hint ever requested before we proactively offer help.
pub const AVOIDANCE_STREAK: u32 = 5;

/// Total time on the problem after which the self-explanation gate is
/// bypassed.
pub const GATE_BYPASS_AFTER: Duration = Duration::from_secs(600);

/// Specificity constraints injected into the tutor prompt per rung.
pub const LEVEL_PROMPTS: [&str; 5] = [
    "Offer brief encouragement and one orienting question. Give away nothing about the approach.",
    "Restate what the problem is really asking and point at the relevant part of the input. No techniques.",
    "Name the general technique or data structure family that applies, without saying how to apply it.",
    "Outline the approach step by step in words. No code, no exact indices or formulas.",
    "Explain the key insight completely, with pseudocode if it helps. Hold back only the literal final code.",
];

/// Short names for the rungs, used in the per-turn context block.
pub const LEVEL_NAMES: [&str; 5] =
    ["encouragement", "orientation", "concept", "approach", "bottom-out"];

/// Prefix when a repeat request arrives before the previous hint was used.
pub const ABUSE_COACHING: &str =
    "The student asked again without editing their code. Ask them to apply the previous hint first, then restate that hint in different words.";

/// The self-explanation question asked before a bottom-out hint.
pub const GATE_QUESTION: &str =
    "Before I give away the key idea: walk me through your current understanding. What have you tried, and where exactly does it break down?";

/// One-shot offer when the student keeps failing without asking for help.
pub const AVOIDANCE_OFFER: &str =
    "The student has hit several errors in a row without asking for help. Gently offer a hint and ask what part feels stuck.";

/// What a hint request should turn into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HintOutcome {
    /// Run a tutor turn constrained to this rung, with an optional
    /// coaching preamble.
    Deliver { level: u8, coaching: Option<&'static str> },
    /// Ask the self-explanation question instead; the next student
    /// message satisfies the gate.
    Gate,
}

/// Observable hint signals for one session.
#[derive(Debug, Clone)]
pub struct HintState {
    /// Highest rung delivered so far; 0 before any hint.
    pub level: u8,
    pub total_given: u32,
    pub self_explanation_pending: bool,
    pub edits_since_last_hint: u32,
    pub errors_since_last_hint: u32,
    pub errors_without_hint: u32,
    pub ever_requested: bool,
    request_times: Vec<Instant>,
    started_at: Instant,
}

impl HintState {
    pub fn new(now: Instant) -> Self {
        Self {
            level: 0,
            total_given: 0,
            self_explanation_pending: false,
            edits_since_last_hint: 0,
            errors_since_last_hint: 0,
            errors_without_hint: 0,
            ever_requested: false,
            request_times: Vec::new(),
            started_at: now,
        }
    }

    /// Decide the outcome of an explicit hint request.
    pub fn on_request(&mut self, now: Instant, wants_direct_answer: bool) -> HintOutcome {
        let repeat_in_window = self
            .request_times
            .iter()
            .any(|t| now.duration_since(*t) <= ABUSE_WINDOW);
        self.request_times.retain(|t| now.duration_since(*t) <= ABUSE_WINDOW);
        self.request_times.push(now);
        let was_pending = self.self_explanation_pending;
        self.ever_requested = true;

        if repeat_in_window && self.edits_since_last_hint == 0 && self.total_given > 0 {
            return HintOutcome::Deliver { level: self.level, coaching: Some(ABUSE_COACHING) };
        }

        let target = (self.level + 1).min(MAX_LEVEL);
        if target == MAX_LEVEL {
            let elapsed = now.duration_since(self.started_at);
            // A second request while the gate is open counts as an
            // explicit ask for the answer.
            if was_pending || wants_direct_answer || elapsed > GATE_BYPASS_AFTER {
                self.self_explanation_pending = false;
                return HintOutcome::Deliver { level: MAX_LEVEL, coaching: None };
            }
            self.self_explanation_pending = true;
            return HintOutcome::Gate;
        }

        HintOutcome::Deliver { level: target, coaching: None }
    }

    /// Flailing escalates one rung without a request. Bottom-out stays
    /// behind the self-explanation gate, so this caps at rung 3.
    pub fn on_flailing(&mut self) -> u8 {
        (self.level + 1).min(MAX_LEVEL - 1)
    }

    /// Record editor activity since the last hint.
    pub fn note_edit(&mut self) {
        self.edits_since_last_hint += 1;
    }

    /// Record a failed submission. Returns true exactly when the
    /// avoidance streak is newly crossed (one-shot per streak).
    pub fn note_error(&mut self) -> bool {
        self.errors_since_last_hint += 1;
        self.errors_without_hint += 1;
        self.errors_without_hint == AVOIDANCE_STREAK
    }

    /// Record a successfully delivered hint. `total_given` only moves
    /// here, so failed turns never consume a rung.
    pub fn note_hint_delivered(&mut self, level: u8) {
        self.level = self.level.max(level);
        self.total_given += 1;
        self.edits_since_last_hint = 0;
        self.errors_since_last_hint = 0;
        self.errors_without_hint = 0;
        self.self_explanation_pending = false;
    }

    /// Consume the self-explanation gate if it was armed. Returns true
    /// when the caller should now deliver the bottom-out hint.
    pub fn consume_self_explanation(&mut self) -> bool {
        std::mem::take(&mut self.self_explanation_pending)
    }

    /// Reset on new problem, full pass, or session end. Time on the
    /// problem keeps accumulating for the gate bypass.
    pub fn reset(&mut self) {
        let started_at = self.started_at;
        *self = Self::new(started_at);
    }

    pub fn level_name(&self) -> &'static str {
        LEVEL_NAMES[usize::from(self.level.min(MAX_LEVEL))]
    }
}

#[cfg(test)]
#[path = "hints_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Unsolicited-nudge detection.
//!
//! Client activity and test-result signals feed a per-session detector;
//! the session controller asks it on a timer whether an idle nudge is
//! due, and on every failed submission whether the student is flailing.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::session_log::Mode;

/// Cooldown between idle nudges.
pub const IDLE_COOLDOWN: Duration = Duration::from_secs(120);

/// Max idle nudges without intervening real activity.
pub const IDLE_MAX_CONSECUTIVE: u32 = 3;

/// No nudges at all once the student has been gone this long.
pub const IDLE_HARD_STOP: Duration = Duration::from_secs(30 * 60);

/// Window for the flailing signal.
pub const FLAIL_WINDOW: Duration = Duration::from_secs(5 * 60);

/// Consecutive same-kind errors that count as flailing.
pub const FLAIL_COUNT: usize = 3;

/// Post-question silence in which no nudge may be emitted.
pub const WAIT_TIME: Duration = Duration::from_secs(5);

static ERROR_KIND: std::sync::OnceLock<Option<regex::Regex>> = std::sync::OnceLock::new();

/// Normalize an error string to its kind: the leading `FooError` token,
/// or the first 60 chars.
pub fn normalize_error_kind(raw: &str) -> String {
    let trimmed = raw.trim();
    let re = ERROR_KIND.get_or_init(|| regex::Regex::new(r"^(\w+Error)").ok());
    if let Some(kind) = re.as_ref().and_then(|re| re.captures(trimmed)).map(|c| c[1].to_owned()) {
        return kind;
    }
    trimmed.chars().take(60).collect()
}

/// Per-session nudge state machine.
#[derive(Debug)]
pub struct NudgeDetector {
    mode: Mode,
    idle_threshold: Option<Duration>,
    last_activity: Instant,
    last_nudge: Option<Instant>,
    consecutive_nudges: u32,
    solved: bool,
    in_review: bool,
    quiet_until: Option<Instant>,
    errors: VecDeque<(Instant, String)>,
}

impl NudgeDetector {
    pub fn new(mode: Mode, idle_threshold: Option<Duration>, now: Instant) -> Self {
        Self {
            mode,
            idle_threshold,
            last_activity: now,
            last_nudge: None,
            consecutive_nudges: 0,
            solved: false,
            in_review: false,
            quiet_until: None,
            errors: VecDeque::new(),
        }
    }

    /// Real student activity: message, edit, or submission. Clears the
    /// consecutive-nudge counter and any wait-time window.
    pub fn record_activity(&mut self, now: Instant) {
        self.last_activity = now;
        self.consecutive_nudges = 0;
        self.quiet_until = None;
    }

    /// Record a failed submission. Returns true when the last
    /// [`FLAIL_COUNT`] errors fall inside [`FLAIL_WINDOW`] and share a
    /// normalized kind.
    pub fn record_error(&mut self, raw_error: &str, now: Instant) -> bool {
        let kind = normalize_error_kind(raw_error);
        self.errors.push_back((now, kind));
        while self.errors.len() > FLAIL_COUNT {
            self.errors.pop_front();
        }

        if self.errors.len() < FLAIL_COUNT {
            return false;
        }
        let all_recent =
            self.errors.iter().all(|(t, _)| now.duration_since(*t) <= FLAIL_WINDOW);
        let first_kind = &self.errors[0].1;
        let same_kind = self.errors.iter().all(|(_, k)| k == first_kind);
        if all_recent && same_kind {
            // One signal per streak; a fourth identical error starts
            // counting fresh.
            self.errors.clear();
            return true;
        }
        false
    }

    pub fn record_solved(&mut self, solved: bool) {
        self.solved = solved;
        if solved {
            self.errors.clear();
        }
    }

    pub fn enter_review(&mut self) {
        self.in_review = true;
    }

    /// Arm the wait-time window when the tutor just asked a question.
    pub fn note_assistant_message(&mut self, content: &str, now: Instant) {
        if content.trim_end().ends_with('?') {
            self.quiet_until = Some(now + WAIT_TIME);
        }
    }

    /// Should an idle nudge fire now? Advances the nudge bookkeeping
    /// when it returns true.
    pub fn check_idle(&mut self, now: Instant) -> bool {
        if self.mode != Mode::Learning || self.solved || self.in_review {
            return false;
        }
        let Some(threshold) = self.idle_threshold else {
            return false;
        };
        if self.quiet_until.is_some_and(|q| now < q) {
            return false;
        }

        let idle_for = now.duration_since(self.last_activity);
        if idle_for < threshold || idle_for >= IDLE_HARD_STOP {
            return false;
        }
        if self.consecutive_nudges >= IDLE_MAX_CONSECUTIVE {
            return false;
        }
        if self.last_nudge.is_some_and(|t| now.duration_since(t) < IDLE_COOLDOWN) {
            return false;
        }

        self.last_nudge = Some(now);
        self.consecutive_nudges += 1;
        true
    }

    /// True when the detector itself considers the student flailing,
    /// used to re-validate client-pushed `nudge_request` triggers.
    pub fn is_flail_candidate(&self, now: Instant) -> bool {
        self.errors.len() >= FLAIL_COUNT - 1
            && self
                .errors
                .iter()
                .all(|(t, _)| now.duration_since(*t) <= FLAIL_WINDOW)
    }
}

#[cfg(test)]
#[path = "nudge_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tutor agent subprocess lifecycle and streaming turns.
//!
//! One `TutorAgent` owns one external agent subprocess, bound to one
//! problem, mode, and workspace. Turns are strictly serialized by the
//! session controller; this module enforces the timeout and retry
//! policy: 15 s to connect, 60 s per turn, 15 s between fragments, and
//! at most one retry, only when zero fragments have been yielded.

pub mod prompt;
pub mod stream;

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use sandbox::RunReport;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::catalog::Problem;
use crate::error::ErrorCode;
use crate::hints::{HintOutcome, HintState, GATE_QUESTION};
use crate::session_log::{ChatMessage, InterviewPhase, Mode};

use prompt::{NudgeReason, TurnContext};
use stream::{classify_event, user_message_record, AgentEvent, JsonlParser};

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
pub const TURN_TIMEOUT: Duration = Duration::from_secs(60);
pub const FRAGMENT_IDLE_TIMEOUT: Duration = Duration::from_secs(15);
pub const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Maximum accepted user message size.
pub const MAX_MESSAGE_BYTES: usize = 10 * 1024;

/// Grace between SIGTERM and SIGKILL in `force_kill`.
const KILL_GRACE: Duration = Duration::from_millis(250);

/// Set in the subprocess environment at spawn; lets tests verify whether
/// a reclaimed session kept the same subprocess.
pub const SESSION_ENV_VAR: &str = "LEETTUTOR_AGENT_SESSION";

/// Spawn-time settings for one agent.
#[derive(Debug, Clone)]
pub struct AgentSettings {
    /// Agent command; extra words become leading arguments.
    pub command: String,
    /// Working directory the agent may read (`solution.py`, ...).
    pub workspace_dir: PathBuf,
    pub session_id: String,
}

/// Volatile per-turn state owned by the session controller.
#[derive(Debug, Default, Clone, Copy)]
pub struct TurnInput<'a> {
    pub code: Option<&'a str>,
    pub results: Option<&'a RunReport>,
    pub time_remaining_s: Option<u32>,
    pub phase: Option<InterviewPhase>,
}

/// Outcome of a hint request.
#[derive(Debug)]
pub enum HintReply {
    /// The self-explanation gate fired; send this question, no turn ran.
    Gated(&'static str),
    /// A hint turn streamed; the full text.
    Streamed(String),
}

/// Why an unsolicited tutor turn is being taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NudgeKind {
    Idle,
    Flailing,
    Avoidance,
}

struct TurnFailure {
    code: ErrorCode,
    fragments_seen: bool,
}

/// One live tutor subprocess.
pub struct TutorAgent {
    settings: AgentSettings,
    problem: Arc<Problem>,
    mode: Mode,
    pub hint_state: HintState,
    review: bool,
    resume_history: Option<Vec<ChatMessage>>,
    child: Option<Child>,
    child_pid: Option<u32>,
    stdin: Option<ChildStdin>,
    events: Option<mpsc::Receiver<AgentEvent>>,
    reader: Option<JoinHandle<()>>,
    closed: Arc<AtomicBool>,
    connect_timeout: Duration,
    turn_timeout: Duration,
    idle_timeout: Duration,
}

impl TutorAgent {
    pub fn new(settings: AgentSettings, problem: Arc<Problem>, mode: Mode) -> Self {
        Self {
            settings,
            problem,
            mode,
            hint_state: HintState::new(Instant::now()),
            review: false,
            resume_history: None,
            child: None,
            child_pid: None,
            stdin: None,
            events: None,
            reader: None,
            closed: Arc::new(AtomicBool::new(false)),
            connect_timeout: CONNECT_TIMEOUT,
            turn_timeout: TURN_TIMEOUT,
            idle_timeout: FRAGMENT_IDLE_TIMEOUT,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.settings.session_id
    }

    pub fn problem_id(&self) -> &str {
        &self.problem.id
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn in_review(&self) -> bool {
        self.review
    }

    pub fn pid(&self) -> Option<u32> {
        self.child_pid
    }

    /// Start the subprocess and wait for its init event. Retries once on
    /// a connect failure before surfacing `AgentUnavailable`.
    pub async fn open(&mut self) -> Result<(), ErrorCode> {
        for attempt in 0..2u8 {
            match self.spawn_and_init().await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!(
                        session = %self.settings.session_id,
                        attempt,
                        err = %e,
                        "agent connect failed"
                    );
                    self.teardown_child().await;
                }
            }
        }
        Err(ErrorCode::AgentUnavailable)
    }

    /// Replay-style initialization when the parked subprocess is gone:
    /// a fresh process whose system prompt carries the prior history.
    pub async fn resume(&mut self, history: Vec<ChatMessage>) -> Result<(), ErrorCode> {
        self.resume_history = Some(history);
        self.open().await
    }

    async fn spawn_and_init(&mut self) -> anyhow::Result<()> {
        let mut words = self.settings.command.split_whitespace();
        let program = words.next().ok_or_else(|| anyhow::anyhow!("empty agent command"))?;
        let system_prompt =
            prompt::system_prompt(&self.problem, self.mode, self.resume_history.as_deref());

        let mut child = Command::new(program)
            .args(words)
            .args([
                "--print",
                "--verbose",
                "--input-format",
                "stream-json",
                "--output-format",
                "stream-json",
                "--system-prompt",
            ])
            .arg(&system_prompt)
            .current_dir(&self.settings.workspace_dir)
            .env(SESSION_ENV_VAR, &self.settings.session_id)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        self.child_pid = child.id();
        self.stdin = child.stdin.take();
        let mut stdout =
            child.stdout.take().ok_or_else(|| anyhow::anyhow!("agent stdout missing"))?;

        let (event_tx, event_rx) = mpsc::channel::<AgentEvent>(64);
        let reader = tokio::spawn(async move {
            let mut parser = JsonlParser::new();
            let mut buf = vec![0u8; 8192];
            loop {
                match stdout.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        for json in parser.feed(&buf[..n]) {
                            if let Some(event) = classify_event(&json) {
                                if event_tx.send(event).await.is_err() {
                                    return;
                                }
                            }
                        }
                    }
                }
            }
        });

        self.child = Some(child);
        self.events = Some(event_rx);
        self.reader = Some(reader);

        self.await_ready().await?;
        debug!(session = %self.settings.session_id, pid = ?self.child_pid, "agent ready");
        Ok(())
    }

    async fn await_ready(&mut self) -> anyhow::Result<()> {
        let events =
            self.events.as_mut().ok_or_else(|| anyhow::anyhow!("agent event stream missing"))?;
        let deadline = tokio::time::Instant::now() + self.connect_timeout;
        loop {
            let event = tokio::time::timeout_at(deadline, events.recv())
                .await
                .map_err(|_| anyhow::anyhow!("agent init timed out"))?;
            match event {
                Some(AgentEvent::Ready) => return Ok(()),
                Some(AgentEvent::Error(detail)) => {
                    anyhow::bail!("agent init failed: {detail}");
                }
                Some(_) => continue,
                None => anyhow::bail!("agent exited during init"),
            }
        }
    }

    /// One chat turn. Fragments stream through `on_fragment` as they
    /// arrive; the full concatenated reply is returned at completion.
    ///
    /// When the self-explanation gate was armed, this message satisfies
    /// it and the turn becomes the gated bottom-out hint.
    pub async fn chat(
        &mut self,
        content: &str,
        input: TurnInput<'_>,
        on_fragment: &mut (dyn FnMut(&str) + Send),
    ) -> Result<String, ErrorCode> {
        if content.len() > MAX_MESSAGE_BYTES {
            return Err(ErrorCode::InputTooLarge);
        }

        if self.hint_state.consume_self_explanation() {
            let payload = format!(
                "{}{}",
                self.context_block(&input),
                prompt::hint_instruction(4, None, Some(content)),
            );
            let reply = self.run_turn_with_retry(&payload, on_fragment).await?;
            self.hint_state.note_hint_delivered(4);
            return Ok(reply);
        }

        let payload = format!("{}{content}", self.context_block(&input));
        self.run_turn_with_retry(&payload, on_fragment).await
    }

    /// One hint request, mediated by the hint policy.
    pub async fn request_hint(
        &mut self,
        input: TurnInput<'_>,
        on_fragment: &mut (dyn FnMut(&str) + Send),
    ) -> Result<HintReply, ErrorCode> {
        match self.hint_state.on_request(Instant::now(), false) {
            HintOutcome::Gate => Ok(HintReply::Gated(GATE_QUESTION)),
            HintOutcome::Deliver { level, coaching } => {
                let payload = format!(
                    "{}{}",
                    self.context_block(&input),
                    prompt::hint_instruction(level, coaching, None),
                );
                let reply = self.run_turn_with_retry(&payload, on_fragment).await?;
                // An abuse re-statement holds the ladder in place.
                if coaching.is_none() {
                    self.hint_state.note_hint_delivered(level);
                }
                Ok(HintReply::Streamed(reply))
            }
        }
    }

    /// An unsolicited tutor turn (idle check-in, flailing escalation, or
    /// avoidance offer).
    pub async fn nudge(
        &mut self,
        kind: NudgeKind,
        input: TurnInput<'_>,
        on_fragment: &mut (dyn FnMut(&str) + Send),
    ) -> Result<String, ErrorCode> {
        let reason = match kind {
            NudgeKind::Idle => NudgeReason::Idle,
            NudgeKind::Avoidance => NudgeReason::Avoidance,
            NudgeKind::Flailing => {
                NudgeReason::Flailing { level: self.hint_state.on_flailing() }
            }
        };
        let payload =
            format!("{}{}", self.context_block(&input), prompt::nudge_instruction(reason));
        let reply = self.run_turn_with_retry(&payload, on_fragment).await?;
        if let NudgeReason::Flailing { level } = reason {
            self.hint_state.note_hint_delivered(level);
        }
        Ok(reply)
    }

    /// The session-opening greeting turn.
    pub async fn greet(
        &mut self,
        input: TurnInput<'_>,
        on_fragment: &mut (dyn FnMut(&str) + Send),
    ) -> Result<String, ErrorCode> {
        let payload =
            format!("{}{}", self.context_block(&input), prompt::GREETING_INSTRUCTION);
        self.run_turn_with_retry(&payload, on_fragment).await
    }

    /// Interview review transition. Idempotent: the second call streams
    /// nothing and returns `None`.
    pub async fn enter_review_phase(
        &mut self,
        input: TurnInput<'_>,
        on_fragment: &mut (dyn FnMut(&str) + Send),
    ) -> Result<Option<String>, ErrorCode> {
        if self.review {
            return Ok(None);
        }
        self.review = true;
        let mut input = input;
        input.phase = Some(InterviewPhase::Review);
        let payload =
            format!("{}{}", self.context_block(&input), prompt::REVIEW_INSTRUCTION);
        let reply = self.run_turn_with_retry(&payload, on_fragment).await?;
        Ok(Some(reply))
    }

    /// Graceful shutdown: EOF on stdin, bounded wait, then the kill
    /// ladder. Idempotent.
    pub async fn close(&mut self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.teardown_child().await;
    }

    /// Aggressive shutdown on the pid recorded at spawn: SIGTERM, short
    /// grace, SIGKILL, then reap.
    pub async fn force_kill(&mut self) {
        if let Some(pid) = self.child_pid {
            if let Ok(raw) = i32::try_from(pid) {
                let target = Pid::from_raw(raw);
                let _ = kill(target, Signal::SIGTERM);
                tokio::time::sleep(KILL_GRACE).await;
                let _ = kill(target, Signal::SIGKILL);
            }
        }
        if let Some(mut child) = self.child.take() {
            let _ = child.wait().await;
        }
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn teardown_child(&mut self) {
        self.events = None;
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        drop(self.stdin.take());
        if let Some(mut child) = self.child.take() {
            match tokio::time::timeout(CLOSE_TIMEOUT, child.wait()).await {
                Ok(_) => {}
                Err(_) => {
                    self.child = Some(child);
                    self.force_kill().await;
                }
            }
        }
    }

    fn context_block(&self, input: &TurnInput<'_>) -> String {
        TurnContext {
            problem_title: &self.problem.title,
            mode: self.mode,
            hint_level: self.hint_state.level,
            hints_given: self.hint_state.total_given,
            time_remaining_s: input.time_remaining_s,
            interview_phase: input.phase.or_else(|| {
                (self.mode == Mode::Interview).then(|| {
                    if self.review {
                        InterviewPhase::Review
                    } else {
                        InterviewPhase::Coding
                    }
                })
            }),
            last_results: input.results,
            code: input.code,
        }
        .render()
    }

    /// At most one retry, and only when the failed attempt yielded zero
    /// fragments. A partially streamed turn must never be reissued.
    async fn run_turn_with_retry(
        &mut self,
        payload: &str,
        on_fragment: &mut (dyn FnMut(&str) + Send),
    ) -> Result<String, ErrorCode> {
        match self.run_turn(payload, on_fragment).await {
            Ok(reply) => Ok(reply),
            Err(failure) if !failure.fragments_seen => {
                warn!(
                    session = %self.settings.session_id,
                    code = %failure.code,
                    "turn failed before first fragment; respawning and retrying once"
                );
                // Never resend on the old stream: a hung process could
                // still answer the first send later, and that late reply
                // would desync every subsequent turn.
                self.teardown_child().await;
                if self.spawn_and_init().await.is_err() {
                    return Err(ErrorCode::AgentUnavailable);
                }
                self.run_turn(payload, on_fragment).await.map_err(|f| f.code)
            }
            Err(failure) => Err(failure.code),
        }
    }

    async fn run_turn(
        &mut self,
        payload: &str,
        on_fragment: &mut (dyn FnMut(&str) + Send),
    ) -> Result<String, TurnFailure> {
        let record = user_message_record(payload);

        {
            let Some(stdin) = self.stdin.as_mut() else {
                return Err(TurnFailure {
                    code: ErrorCode::AgentUnavailable,
                    fragments_seen: false,
                });
            };
            if stdin.write_all(record.as_bytes()).await.is_err()
                || stdin.flush().await.is_err()
            {
                return Err(TurnFailure {
                    code: ErrorCode::AgentUnavailable,
                    fragments_seen: false,
                });
            }
        }

        let events = match self.events.as_mut() {
            Some(events) => events,
            None => {
                return Err(TurnFailure {
                    code: ErrorCode::AgentUnavailable,
                    fragments_seen: false,
                })
            }
        };

        let deadline = tokio::time::Instant::now() + self.turn_timeout;
        let mut full = String::new();
        let mut fragments_seen = false;

        loop {
            let idle_deadline = tokio::time::Instant::now() + self.idle_timeout;
            let event =
                match tokio::time::timeout_at(idle_deadline.min(deadline), events.recv()).await {
                    Ok(event) => event,
                    Err(_) => {
                        return Err(TurnFailure { code: ErrorCode::AgentTimeout, fragments_seen })
                    }
                };

            match event {
                Some(AgentEvent::Fragment(text)) => {
                    let chunk =
                        if full.is_empty() { text } else { format!("\n{text}") };
                    on_fragment(&chunk);
                    full.push_str(&chunk);
                    fragments_seen = true;
                }
                Some(AgentEvent::TurnComplete) => return Ok(full),
                Some(AgentEvent::Error(detail)) => {
                    warn!(session = %self.settings.session_id, detail, "agent turn error");
                    return Err(TurnFailure {
                        code: ErrorCode::AgentStreamFailed,
                        fragments_seen,
                    });
                }
                Some(AgentEvent::Ready) => continue,
                None => {
                    let code = if fragments_seen {
                        ErrorCode::AgentStreamFailed
                    } else {
                        ErrorCode::AgentUnavailable
                    };
                    return Err(TurnFailure { code, fragments_seen });
                }
            }
        }
    }

}

impl std::fmt::Debug for TutorAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TutorAgent")
            .field("session_id", &self.settings.session_id)
            .field("problem_id", &self.problem.id)
            .field("mode", &self.mode)
            .field("pid", &self.child_pid)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
impl TutorAgent {
    /// Childless agent for registry and controller tests.
    pub(crate) fn stub(session_id: &str, problem: Arc<Problem>, mode: Mode) -> Self {
        Self::new(
            AgentSettings {
                command: "true".to_owned(),
                workspace_dir: std::env::temp_dir(),
                session_id: session_id.to_owned(),
            },
            problem,
            mode,
        )
    }

    pub(crate) fn closed_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.closed)
    }

    pub(crate) fn set_timeouts(&mut self, connect: Duration, turn: Duration, idle: Duration) {
        self.connect_timeout = connect;
        self.turn_timeout = turn;
        self.idle_timeout = idle;
    }
}

#[cfg(test)]
#[path = "agent_tests.rs"]
mod tests;

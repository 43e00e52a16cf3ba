// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-connection session controller.
//!
//! One `Connection` per WebSocket. Streaming turns are enqueued on a
//! per-connection job queue consumed by a single worker task, so turns
//! run strictly in arrival order and a long tutor reply never blocks
//! heartbeats; `time_update`, `save_state`, and `test_results_update`
//! touch only the shared session state and interleave freely. On
//! disconnect the in-flight turn finishes (the worker holds the agent
//! lock), then the agent is parked or closed.

use std::sync::Arc;
use std::time::{Duration, Instant};

use sandbox::RunReport;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use crate::agent::{
    AgentSettings, HintReply, NudgeKind, TurnInput, TutorAgent, MAX_MESSAGE_BYTES,
};
use crate::catalog::Problem;
use crate::error::ErrorCode;
use crate::nudge::NudgeDetector;
use crate::session_log::{epoch_ms, InterviewPhase, Mode, Role, SessionLog};
use crate::state::AppState;
use crate::transport::auth;
use crate::transport::ws_msg::{ws_error, ServerMessage};
use crate::workspace::Workspace;

/// Poll interval for the nudge detector and interview backstop.
pub const TICK_INTERVAL: Duration = Duration::from_secs(15);

/// Interview wall-clock cap.
pub const INTERVIEW_CAP: Duration = Duration::from_secs(45 * 60);

/// Grace past the cap before the server forces the review transition
/// itself (the client clock stays authoritative until then).
pub const INTERVIEW_GRACE: Duration = Duration::from_secs(120);

/// What the connection loop should do after a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Continue,
    /// Authentication failed: close with code 4001.
    CloseUnauthorized,
}

/// Streaming work for the connection's turn worker.
enum AgentJob {
    Greet,
    Chat { content: String },
    Hint,
    Nudge { kind: NudgeKind },
    Review,
    /// Fold submission outcomes into the hint state; may run an
    /// avoidance offer, or reset the ladder after a full pass.
    Accounting { solved: bool },
    /// Test-only: acked once every earlier job has completed.
    #[cfg(test)]
    Barrier(tokio::sync::oneshot::Sender<()>),
}

/// Session state shared between the connection loop and turn jobs.
/// Critical sections are short; never held across an agent turn.
struct SessionShared {
    log: SessionLog,
    nudge: NudgeDetector,
    workspace: Workspace,
    last_results: Option<RunReport>,
    last_code: Option<String>,
    time_remaining_s: Option<u32>,
    time_up_seen: bool,
    /// Editor activity not yet folded into the hint state.
    pending_edits: u32,
    /// Failed submissions not yet folded into the hint state.
    pending_errors: u32,
}

struct ActiveSession {
    session_id: String,
    problem: Arc<Problem>,
    mode: Mode,
    /// Agent ownership slot. `None` means the agent moved out (parked
    /// or closed); queued jobs give up. The turn worker is the only
    /// task that locks this for turns; the controller locks it to take
    /// the agent over, which waits out any in-flight turn.
    agent: Arc<Mutex<Option<TutorAgent>>>,
    shared: Arc<Mutex<SessionShared>>,
    /// Ordered turn queue feeding this session's worker task.
    jobs: mpsc::UnboundedSender<AgentJob>,
    started: Instant,
}

/// Per-connection controller.
pub struct Connection {
    state: Arc<AppState>,
    outbound: mpsc::UnboundedSender<ServerMessage>,
    authed: bool,
    active: Option<ActiveSession>,
}

impl Connection {
    pub fn new(state: Arc<AppState>, outbound: mpsc::UnboundedSender<ServerMessage>) -> Self {
        let authed = !state.auth_required();
        Self { state, outbound, authed, active: None }
    }

    fn send(&self, msg: ServerMessage) {
        let _ = self.outbound.send(msg);
    }

    fn send_error(&self, code: ErrorCode, content: impl Into<String>) {
        self.send(ws_error(code, content));
    }

    /// Dispatch one inbound frame.
    pub async fn handle(&mut self, msg: crate::transport::ws_msg::ClientMessage) -> Disposition {
        use crate::transport::ws_msg::ClientMessage as C;

        if let C::Auth { ref token } = msg {
            return self.handle_auth(token);
        }
        if !self.authed {
            self.send_error(ErrorCode::AuthRequired, "authenticate first");
            return Disposition::Continue;
        }

        match msg {
            C::Auth { .. } => {}
            C::StartSession { problem_id, mode } => {
                self.handle_start_session(problem_id, mode).await;
            }
            C::Message { content, code } => self.handle_message(content, code).await,
            C::RequestHint { code } => self.handle_request_hint(code).await,
            C::ResumeSession { session_id } => self.handle_resume_session(session_id).await,
            C::EndSession {} => self.end_active().await,
            C::TimeUpdate { time_remaining } => self.handle_time_update(time_remaining).await,
            C::TimeUp { code } => self.handle_time_up(code).await,
            C::NudgeRequest { trigger, context: _ } => self.handle_nudge_request(&trigger).await,
            C::TestResultsUpdate { test_results, code, is_submit, saved_solution_id } => {
                if let Some(id) = saved_solution_id {
                    debug!(solution = %id, "saved-solution reference noted");
                }
                self.handle_test_results_update(test_results, code, is_submit).await;
            }
            C::SaveState { code, whiteboard_state } => {
                self.handle_save_state(code, whiteboard_state).await;
            }
        }
        Disposition::Continue
    }

    fn handle_auth(&mut self, token: &str) -> Disposition {
        match auth::validate_ws_auth(token, self.state.auth_token.as_deref()) {
            Ok(()) => {
                self.authed = true;
                Disposition::Continue
            }
            Err(_) => Disposition::CloseUnauthorized,
        }
    }

    async fn handle_start_session(&mut self, problem_id: String, mode: Mode) {
        // A connection drives one session at a time.
        self.end_active().await;

        let Some(problem) = self.state.catalog.get(&problem_id) else {
            self.send_error(ErrorCode::InvalidMessage, "unknown problem");
            return;
        };

        let mut log = match self.state.sessions.start(&problem_id, mode) {
            Ok(log) => log,
            Err(e) => {
                warn!(err = %e, "session start failed");
                self.send_error(ErrorCode::Internal, "could not create session");
                return;
            }
        };
        let session_id = log.session_id().to_owned();

        let workspace =
            match Workspace::for_session(&self.state.config.workspace_dir, &session_id) {
                Ok(ws) => ws,
                Err(e) => {
                    warn!(err = %e, "workspace create failed");
                    self.send_error(ErrorCode::Internal, "could not create workspace");
                    return;
                }
            };
        if let Err(e) = workspace.write_solution(&problem.starter_code) {
            warn!(session = %session_id, err = %e, "starter code write failed");
        }

        let settings = AgentSettings {
            command: self.state.config.agent_cmd.clone(),
            workspace_dir: workspace.dir().to_path_buf(),
            session_id: session_id.clone(),
        };
        let mut agent = TutorAgent::new(settings, Arc::clone(&problem), mode);
        if let Err(code) = agent.open().await {
            self.send_error(code, error_content(code));
            let _ = log.end(None, Some("tutor agent failed to start".to_owned()));
            return;
        }

        info!(session = %session_id, problem = %problem_id, %mode, "session started");
        let time_remaining = log.document().time_remaining_s;
        let shared = SessionShared {
            log,
            nudge: NudgeDetector::new(mode, self.state.config.idle_nudge(), Instant::now()),
            workspace,
            last_results: None,
            last_code: Some(problem.starter_code.clone()),
            time_remaining_s: time_remaining,
            time_up_seen: false,
            pending_edits: 0,
            pending_errors: 0,
        };
        let agent = Arc::new(Mutex::new(Some(agent)));
        let shared = Arc::new(Mutex::new(shared));
        let jobs = spawn_turn_worker(
            Arc::clone(&agent),
            Arc::clone(&shared),
            self.outbound.clone(),
        );
        self.active = Some(ActiveSession {
            session_id: session_id.clone(),
            problem: Arc::clone(&problem),
            mode,
            agent,
            shared,
            jobs,
            started: Instant::now(),
        });

        self.send(ServerMessage::SessionStarted {
            session_id,
            problem_id,
            mode,
            time_remaining,
        });
        self.enqueue_job(AgentJob::Greet);
    }

    async fn handle_message(&mut self, content: String, code: Option<String>) {
        if content.len() > MAX_MESSAGE_BYTES {
            self.send_error(ErrorCode::InputTooLarge, "message exceeds 10 KB");
            return;
        }
        let Some(active) = &self.active else {
            self.send_error(ErrorCode::SessionNotFound, "no active session");
            return;
        };

        {
            let mut shared = active.shared.lock().await;
            let now = Instant::now();
            shared.nudge.record_activity(now);
            apply_code_update(&mut shared, code.as_deref());
            if let Err(e) = shared.log.log_message(Role::User, &content) {
                warn!(session = %active.session_id, err = %e, "user message log failed");
            }
        }
        self.enqueue_job(AgentJob::Chat { content });
        self.check_interview_backstop().await;
    }

    async fn handle_request_hint(&mut self, code: Option<String>) {
        let Some(active) = &self.active else {
            self.send_error(ErrorCode::SessionNotFound, "no active session");
            return;
        };
        {
            let mut shared = active.shared.lock().await;
            shared.nudge.record_activity(Instant::now());
            apply_code_update(&mut shared, code.as_deref());
            if let Err(e) = shared.log.log_hint_requested() {
                warn!(session = %active.session_id, err = %e, "hint log failed");
            }
        }
        self.enqueue_job(AgentJob::Hint);
    }

    async fn handle_resume_session(&mut self, session_id: String) {
        self.end_active().await;

        let doc = match self.state.sessions.get(&session_id) {
            Ok(Some(doc)) => doc,
            Ok(None) => {
                self.send_error(ErrorCode::SessionNotFound, "unknown session");
                return;
            }
            Err(e) => {
                warn!(session = %session_id, err = %e, "session read failed");
                self.send_error(ErrorCode::Internal, "could not read session");
                return;
            }
        };
        let Some(problem) = self.state.catalog.get(&doc.problem_id) else {
            self.send_error(ErrorCode::SessionNotFound, "problem no longer in catalog");
            return;
        };

        let workspace =
            match Workspace::for_session(&self.state.config.workspace_dir, &session_id) {
                Ok(ws) => ws,
                Err(e) => {
                    warn!(err = %e, "workspace open failed");
                    self.send_error(ErrorCode::Internal, "could not open workspace");
                    return;
                }
            };

        // Transparent reclaim keeps the live subprocess; otherwise a
        // fresh agent replays the on-disk history.
        let agent = match self.state.registry.reclaim(&session_id).await {
            Some(agent) => {
                info!(session = %session_id, "agent reclaimed from registry");
                agent
            }
            None => {
                let settings = AgentSettings {
                    command: self.state.config.agent_cmd.clone(),
                    workspace_dir: workspace.dir().to_path_buf(),
                    session_id: session_id.clone(),
                };
                let mut agent = TutorAgent::new(settings, Arc::clone(&problem), doc.mode);
                if let Err(code) = agent.resume(doc.chat_history.clone()).await {
                    self.send_error(code, error_content(code));
                    return;
                }
                info!(session = %session_id, "agent rebuilt from session log");
                agent
            }
        };

        let elapsed_ms = epoch_ms().saturating_sub(doc.started_at_ms);
        let started =
            Instant::now().checked_sub(Duration::from_millis(elapsed_ms)).unwrap_or_else(Instant::now);

        self.send(ServerMessage::SessionResumed {
            session_id: session_id.clone(),
            mode: doc.mode,
            problem_id: doc.problem_id.clone(),
            chat_history: doc.chat_history.clone(),
            time_remaining: doc.time_remaining_s,
            interview_phase: (doc.mode == Mode::Interview).then_some(doc.interview_phase),
            last_editor_code: doc.last_editor_code.clone(),
        });

        let mut nudge =
            NudgeDetector::new(doc.mode, self.state.config.idle_nudge(), Instant::now());
        if doc.interview_phase == InterviewPhase::Review {
            nudge.enter_review();
        }
        let shared = SessionShared {
            last_code: doc.last_editor_code.clone(),
            time_remaining_s: doc.time_remaining_s,
            time_up_seen: doc.interview_phase == InterviewPhase::Review,
            nudge,
            workspace,
            last_results: None,
            pending_edits: 0,
            pending_errors: 0,
            log: self.state.sessions.resume(doc),
        };
        let mode = shared.log.document().mode;
        let agent = Arc::new(Mutex::new(Some(agent)));
        let shared = Arc::new(Mutex::new(shared));
        let jobs = spawn_turn_worker(
            Arc::clone(&agent),
            Arc::clone(&shared),
            self.outbound.clone(),
        );
        self.active = Some(ActiveSession { session_id, problem, mode, agent, shared, jobs, started });
    }

    async fn handle_time_update(&mut self, time_remaining: u32) {
        let Some(active) = &self.active else {
            return;
        };
        let clamped = time_remaining.min(45 * 60);
        {
            let mut shared = active.shared.lock().await;
            shared.time_remaining_s = Some(clamped);
            if let Err(e) = shared.log.update_time_remaining(clamped) {
                warn!(session = %active.session_id, err = %e, "time update log failed");
            }
        }
        self.check_interview_backstop().await;
    }

    async fn handle_time_up(&mut self, code: Option<String>) {
        let Some(active) = &self.active else {
            self.send_error(ErrorCode::SessionNotFound, "no active session");
            return;
        };
        if active.mode != Mode::Interview {
            debug!(session = %active.session_id, "time_up outside interview mode ignored");
            return;
        }
        {
            let mut shared = active.shared.lock().await;
            shared.time_up_seen = true;
            shared.time_remaining_s = Some(0);
            apply_code_update(&mut shared, code.as_deref());
            let _ = shared.log.update_time_remaining(0);
        }
        self.enqueue_job(AgentJob::Review);
    }

    async fn handle_nudge_request(&mut self, trigger: &str) {
        let Some(active) = &self.active else {
            self.send_error(ErrorCode::SessionNotFound, "no active session");
            return;
        };
        // The client only suggests; the server's own detector decides.
        match trigger {
            "idle" => {
                let due = { active.shared.lock().await.nudge.check_idle(Instant::now()) };
                if due {
                    self.enqueue_job(AgentJob::Nudge { kind: NudgeKind::Idle });
                }
            }
            "flailing" => {
                let due =
                    { active.shared.lock().await.nudge.is_flail_candidate(Instant::now()) };
                if due {
                    self.enqueue_job(AgentJob::Nudge { kind: NudgeKind::Flailing });
                }
            }
            other => {
                self.send_error(
                    ErrorCode::InvalidMessage,
                    format!("unknown nudge trigger: {other}"),
                );
            }
        }
    }

    async fn handle_test_results_update(
        &mut self,
        report: RunReport,
        code: String,
        is_submit: bool,
    ) {
        let Some(active) = &self.active else {
            self.send_error(ErrorCode::SessionNotFound, "no active session");
            return;
        };

        let mut solved = false;
        let mut flailing = false;
        let mut had_error = false;
        {
            let mut shared = active.shared.lock().await;
            let now = Instant::now();
            shared.nudge.record_activity(now);
            apply_code_update(&mut shared, Some(&code));
            if let Err(e) = shared.workspace.write_test_results(&report) {
                warn!(session = %active.session_id, err = %e, "test results write failed");
            }
            if is_submit {
                if let Err(e) = shared.log.log_submission(&code, &report) {
                    warn!(session = %active.session_id, err = %e, "submission log failed");
                }
            }

            if report.all_passed() {
                solved = true;
                shared.nudge.record_solved(true);
            } else if let Some(error) =
                report.results.iter().find(|r| !r.passed).and_then(|r| r.error.clone())
            {
                had_error = true;
                shared.pending_errors += 1;
                flailing = shared.nudge.record_error(&error, now);
            }
            shared.last_results = Some(report);
        }

        if solved {
            self.enqueue_job(AgentJob::Accounting { solved: true });
        } else if flailing {
            self.enqueue_job(AgentJob::Nudge { kind: NudgeKind::Flailing });
        } else if had_error {
            self.enqueue_job(AgentJob::Accounting { solved: false });
        }
    }

    async fn handle_save_state(
        &mut self,
        code: String,
        whiteboard_state: Option<serde_json::Value>,
    ) {
        let Some(active) = &self.active else {
            return;
        };
        let mut shared = active.shared.lock().await;
        shared.nudge.record_activity(Instant::now());
        apply_code_update(&mut shared, Some(&code));
        if let Some(state) = whiteboard_state {
            if let Err(e) = shared.log.update_whiteboard(state) {
                warn!(session = %active.session_id, err = %e, "whiteboard log failed");
            }
        }
    }

    /// Explicitly end the active session: close the agent, finalize the
    /// log, discard the workspace.
    pub async fn end_active(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };
        // Waits for any in-flight turn to complete.
        let agent = active.agent.lock().await.take();
        if let Some(mut agent) = agent {
            agent.close().await;
        }
        let mut shared = active.shared.lock().await;
        if let Err(e) = shared.log.end(None, None) {
            warn!(session = %active.session_id, err = %e, "session end write failed");
        }
        shared.workspace.remove();
        info!(session = %active.session_id, "session ended");
    }

    /// Socket closed. The in-flight turn (if any) finishes first, then
    /// the agent is parked for transparent resume, or closed when the
    /// registry refuses.
    pub async fn on_disconnect(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };
        let agent = active.agent.lock().await.take();
        let Some(agent) = agent else {
            return;
        };

        match self.state.registry.park(agent).await {
            Ok(()) => {
                info!(session = %active.session_id, "disconnected; agent parked");
            }
            Err(mut agent) => {
                agent.close().await;
                let mut shared = active.shared.lock().await;
                if let Err(e) = shared.log.end(None, None) {
                    warn!(session = %active.session_id, err = %e, "session end write failed");
                }
                info!(session = %active.session_id, "disconnected; park refused, session closed");
            }
        }
    }

    /// Periodic work: idle nudges and the interview backstop.
    pub async fn tick(&mut self) {
        let Some(active) = &self.active else {
            return;
        };
        let due = { active.shared.lock().await.nudge.check_idle(Instant::now()) };
        if due {
            self.enqueue_job(AgentJob::Nudge { kind: NudgeKind::Idle });
        }
        self.check_interview_backstop().await;
    }

    /// Lazy server-side cap: if the client never reported `time_up`,
    /// force the review transition once the cap plus grace has elapsed.
    async fn check_interview_backstop(&self) {
        let Some(active) = &self.active else {
            return;
        };
        if active.mode != Mode::Interview
            || active.started.elapsed() < INTERVIEW_CAP + INTERVIEW_GRACE
        {
            return;
        }
        let already = {
            let mut shared = active.shared.lock().await;
            std::mem::replace(&mut shared.time_up_seen, true)
        };
        if !already {
            info!(session = %active.session_id, "interview cap reached; forcing review");
            self.enqueue_job(AgentJob::Review);
        }
    }

    fn enqueue_job(&self, job: AgentJob) {
        let Some(active) = &self.active else {
            return;
        };
        let _ = active.jobs.send(job);
    }

    #[cfg(test)]
    pub(crate) fn is_authed(&self) -> bool {
        self.authed
    }

    #[cfg(test)]
    pub(crate) fn active_session_id(&self) -> Option<String> {
        self.active.as_ref().map(|a| a.session_id.clone())
    }

    /// Wait until every job enqueued so far has completed.
    #[cfg(test)]
    pub(crate) async fn settle(&self) {
        if let Some(active) = &self.active {
            let (ack_tx, ack_rx) = tokio::sync::oneshot::channel();
            if active.jobs.send(AgentJob::Barrier(ack_tx)).is_ok() {
                let _ = ack_rx.await;
            }
        }
    }
}

/// Record a code snapshot: workspace, log, edit accounting, and the
/// clarification → coding transition on the first real edit.
fn apply_code_update(shared: &mut SessionShared, code: Option<&str>) {
    let Some(code) = code else {
        return;
    };
    if shared.last_code.as_deref() != Some(code) {
        shared.pending_edits += 1;
        let doc = shared.log.document();
        if doc.mode == Mode::Interview && doc.interview_phase == InterviewPhase::Clarification {
            if let Err(e) = shared.log.update_interview_phase(InterviewPhase::Coding) {
                warn!(err = %e, "coding phase log failed");
            }
        }
    }
    shared.last_code = Some(code.to_owned());
    if let Err(e) = shared.workspace.write_solution(code) {
        warn!(err = %e, "solution write failed");
    }
    if let Err(e) = shared.log.update_editor_code(code) {
        warn!(err = %e, "editor code log failed");
    }
}

/// Human-readable in-chat text for an agent failure.
fn error_content(code: ErrorCode) -> &'static str {
    match code {
        ErrorCode::AgentUnavailable => "Failed to connect to tutor; please try again.",
        ErrorCode::AgentTimeout => "The tutor took too long to reply; please try again.",
        ErrorCode::AgentStreamFailed => "The tutor's reply was interrupted; please try again.",
        ErrorCode::InputTooLarge => "That message is too large.",
        _ => "Something went wrong; please try again.",
    }
}

/// Owned snapshot of the volatile turn inputs.
struct TurnSnapshot {
    code: Option<String>,
    results: Option<RunReport>,
    time_remaining_s: Option<u32>,
    phase: Option<InterviewPhase>,
}

/// Start the single consumer of a session's turn queue. Jobs run one at
/// a time in channel order, so turn N's frames always complete before
/// any frame of turn N+1.
fn spawn_turn_worker(
    agent_mx: Arc<Mutex<Option<TutorAgent>>>,
    shared_mx: Arc<Mutex<SessionShared>>,
    outbound: mpsc::UnboundedSender<ServerMessage>,
) -> mpsc::UnboundedSender<AgentJob> {
    let (jobs_tx, mut jobs_rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Some(job) = jobs_rx.recv().await {
            run_agent_job(&agent_mx, &shared_mx, &outbound, job).await;
        }
    });
    jobs_tx
}

/// Run one streaming job under the agent lock.
async fn run_agent_job(
    agent_mx: &Mutex<Option<TutorAgent>>,
    shared_mx: &Mutex<SessionShared>,
    outbound: &mpsc::UnboundedSender<ServerMessage>,
    job: AgentJob,
) {
    // The worker is sequential, so reaching a barrier means every
    // earlier job has completed.
    #[cfg(test)]
    let job = match job {
        AgentJob::Barrier(ack) => {
            let _ = ack.send(());
            return;
        }
        other => other,
    };

    let mut guard = agent_mx.lock().await;
    let Some(agent) = guard.as_mut() else {
        // The session ended or parked while this job was queued.
        return;
    };

    // Fold pending activity into the hint state before any decision.
    let (snapshot, edits, errors) = {
        let mut shared = shared_mx.lock().await;
        let edits = std::mem::take(&mut shared.pending_edits);
        let errors = std::mem::take(&mut shared.pending_errors);
        let phase = (agent.mode() == Mode::Interview)
            .then(|| shared.log.document().interview_phase);
        let snapshot = TurnSnapshot {
            code: shared.last_code.clone(),
            results: shared.last_results.clone(),
            time_remaining_s: shared.time_remaining_s,
            phase,
        };
        (snapshot, edits, errors)
    };
    for _ in 0..edits {
        agent.hint_state.note_edit();
    }
    let mut avoidance_due = false;
    for _ in 0..errors {
        avoidance_due |= agent.hint_state.note_error();
    }

    let input = TurnInput {
        code: snapshot.code.as_deref(),
        results: snapshot.results.as_ref(),
        time_remaining_s: snapshot.time_remaining_s,
        phase: snapshot.phase,
    };
    let mut on_fragment = |chunk: &str| {
        let _ = outbound.send(ServerMessage::AssistantChunk { content: chunk.to_owned() });
    };

    let turn = match job {
        AgentJob::Accounting { solved } => {
            if solved {
                agent.hint_state.reset();
                return;
            }
            if !avoidance_due {
                return;
            }
            agent.nudge(NudgeKind::Avoidance, input, &mut on_fragment).await.map(|t| (t, true))
        }
        AgentJob::Greet => agent.greet(input, &mut on_fragment).await.map(|t| (t, false)),
        AgentJob::Chat { ref content } => {
            agent.chat(content, input, &mut on_fragment).await.map(|t| (t, false))
        }
        AgentJob::Hint => match agent.request_hint(input, &mut on_fragment).await {
            Ok(HintReply::Gated(question)) => {
                // The gate question is synthesized, not streamed; emit a
                // single chunk so the frame sequence stays uniform.
                on_fragment(question);
                Ok((question.to_owned(), false))
            }
            Ok(HintReply::Streamed(text)) => Ok((text, false)),
            Err(code) => Err(code),
        },
        AgentJob::Nudge { kind } => {
            agent.nudge(kind, input, &mut on_fragment).await.map(|t| (t, true))
        }
        AgentJob::Review => {
            if agent.in_review() {
                return;
            }
            let _ = outbound.send(ServerMessage::ReviewPhaseStarted {});
            {
                let mut shared = shared_mx.lock().await;
                shared.nudge.enter_review();
                if let Err(e) = shared.log.update_interview_phase(InterviewPhase::Review) {
                    warn!(err = %e, "review phase log failed");
                }
            }
            match agent.enter_review_phase(input, &mut on_fragment).await {
                Ok(Some(text)) => Ok((text, false)),
                Ok(None) => return,
                Err(code) => Err(code),
            }
        }
        #[cfg(test)]
        AgentJob::Barrier(_) => unreachable!("Barrier is handled above before this match"),
    };

    match turn {
        Ok((full, nudge)) => {
            let _ =
                outbound.send(ServerMessage::AssistantMessage { content: full.clone(), nudge });
            let mut shared = shared_mx.lock().await;
            if let Err(e) = shared.log.log_message(Role::Assistant, &full) {
                warn!(err = %e, "assistant message log failed");
            }
            shared.nudge.note_assistant_message(&full, Instant::now());
        }
        Err(code) => {
            let _ = outbound.send(ws_error(code, error_content(code)));
        }
    }
}

#[cfg(test)]
#[path = "handler_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use sandbox::RunReport;

use super::{valid_session_id, InterviewPhase, Mode, Role, SessionStore};

fn store() -> (tempfile::TempDir, SessionStore) {
    let tmp = tempfile::tempdir().unwrap_or_else(|e| panic!("{e}"));
    let store = SessionStore::new(tmp.path()).unwrap_or_else(|e| panic!("{e}"));
    (tmp, store)
}

#[yare::parameterized(
    short_hex = { "a1b2c3d4", true },
    twelve_hex = { "0123456789ab", true },
    too_short = { "a1b2c3d", false },
    uppercase = { "A1B2C3D4", false },
    traversal = { "../../etc/passwd", false },
    dotted = { "a1b2c3d4.json", false },
    empty = { "", false },
)]
fn session_id_pattern(id: &str, ok: bool) {
    assert_eq!(valid_session_id(id), ok);
}

#[test]
fn start_writes_initial_document() -> anyhow::Result<()> {
    let (_tmp, store) = store();
    let log = store.start("two-sum", Mode::Learning)?;

    assert!(valid_session_id(log.session_id()));
    let doc = store.get(log.session_id())?.ok_or_else(|| anyhow::anyhow!("missing doc"))?;
    assert_eq!(doc.problem_id, "two-sum");
    assert_eq!(doc.mode, Mode::Learning);
    assert_eq!(doc.interview_phase, InterviewPhase::Clarification);
    assert!(doc.ended_at_ms.is_none());
    assert!(doc.time_remaining_s.is_none());
    Ok(())
}

#[test]
fn interview_sessions_start_with_full_clock() -> anyhow::Result<()> {
    let (_tmp, store) = store();
    let log = store.start("two-sum", Mode::Interview)?;
    assert_eq!(log.document().time_remaining_s, Some(2700));
    Ok(())
}

#[test]
fn every_mutation_is_readable_from_disk() -> anyhow::Result<()> {
    let (_tmp, store) = store();
    let mut log = store.start("two-sum", Mode::Learning)?;

    log.log_message(Role::User, "how do I start?")?;
    log.log_message(Role::Assistant, "What does the problem ask for?")?;
    log.log_hint_requested()?;
    log.update_editor_code("def twoSum(nums, target): pass")?;

    let doc = store.get(log.session_id())?.ok_or_else(|| anyhow::anyhow!("missing doc"))?;
    assert_eq!(doc.chat_history.len(), 2);
    assert_eq!(doc.chat_history[0].role, Role::User);
    assert_eq!(doc.hints_requested, 1);
    assert_eq!(doc.last_editor_code.as_deref(), Some("def twoSum(nums, target): pass"));
    Ok(())
}

#[test]
fn submissions_are_recorded() -> anyhow::Result<()> {
    let (_tmp, store) = store();
    let mut log = store.start("two-sum", Mode::Learning)?;

    let report = RunReport { passed: 1, failed: 1, results: vec![] };
    log.log_submission("def twoSum(n, t): return []", &report)?;

    let doc = store.get(log.session_id())?.ok_or_else(|| anyhow::anyhow!("missing doc"))?;
    assert_eq!(doc.code_submissions.len(), 1);
    assert_eq!(doc.code_submissions[0].passed, 1);
    assert_eq!(doc.code_submissions[0].failed, 1);
    Ok(())
}

#[test]
fn phase_is_monotone() -> anyhow::Result<()> {
    let (_tmp, store) = store();
    let mut log = store.start("two-sum", Mode::Interview)?;

    log.update_interview_phase(InterviewPhase::Coding)?;
    log.update_interview_phase(InterviewPhase::Review)?;
    // Backwards transition is a no-op.
    log.update_interview_phase(InterviewPhase::Clarification)?;

    assert_eq!(log.document().interview_phase, InterviewPhase::Review);
    Ok(())
}

#[test]
fn time_remaining_is_clamped() -> anyhow::Result<()> {
    let (_tmp, store) = store();
    let mut log = store.start("two-sum", Mode::Interview)?;
    log.update_time_remaining(99_999)?;
    assert_eq!(log.document().time_remaining_s, Some(2700));
    Ok(())
}

#[test]
fn end_sets_duration_once() -> anyhow::Result<()> {
    let (_tmp, store) = store();
    let mut log = store.start("two-sum", Mode::Learning)?;

    log.end(Some("passed".to_owned()), None)?;
    let first_end = log.document().ended_at_ms;
    assert!(first_end.is_some());
    assert!(log.document().duration_s.is_some());

    log.end(None, Some("follow-up".to_owned()))?;
    assert_eq!(log.document().ended_at_ms, first_end);
    assert_eq!(log.document().notes.as_deref(), Some("follow-up"));
    Ok(())
}

#[test]
fn list_is_newest_first_and_skips_junk() -> anyhow::Result<()> {
    let (tmp, store) = store();
    let a = store.start("two-sum", Mode::Learning)?;
    std::thread::sleep(std::time::Duration::from_millis(5));
    let b = store.start("two-sum", Mode::Interview)?;

    // Junk files must not break or pollute the listing.
    std::fs::write(tmp.path().join("not-a-session.json"), "{}")?;
    std::fs::write(tmp.path().join("deadbeef00.txt"), "nope")?;

    let list = store.list()?;
    assert_eq!(list.len(), 2);
    assert_eq!(list[0].session_id, b.session_id());
    assert_eq!(list[1].session_id, a.session_id());
    Ok(())
}

#[test]
fn latest_resumable_ignores_ended_sessions() -> anyhow::Result<()> {
    let (_tmp, store) = store();
    let mut a = store.start("two-sum", Mode::Learning)?;
    a.end(None, None)?;
    std::thread::sleep(std::time::Duration::from_millis(5));
    let b = store.start("two-sum", Mode::Learning)?;
    let _other = store.start("add-two-numbers", Mode::Learning)?;

    let hit = store.latest_resumable("two-sum")?;
    assert_eq!(hit.map(|s| s.session_id), Some(b.session_id().to_owned()));
    Ok(())
}

#[test]
fn delete_removes_document() -> anyhow::Result<()> {
    let (_tmp, store) = store();
    let log = store.start("two-sum", Mode::Learning)?;
    let id = log.session_id().to_owned();

    assert!(store.delete(&id)?);
    assert!(store.get(&id)?.is_none());
    assert!(!store.delete(&id)?);
    Ok(())
}

#[test]
fn get_rejects_traversal_ids() -> anyhow::Result<()> {
    let (_tmp, store) = store();
    assert!(store.get("../outside")?.is_none());
    assert!(!store.delete("../outside")?);
    Ok(())
}

#[test]
fn document_on_disk_is_always_parseable() -> anyhow::Result<()> {
    let (tmp, store) = store();
    let mut log = store.start("two-sum", Mode::Learning)?;
    for i in 0..20 {
        log.log_message(Role::User, &format!("message {i}"))?;
        // Direct read of the file between writes parses cleanly.
        let path = tmp.path().join(format!("{}.json", log.session_id()));
        let raw = std::fs::read_to_string(&path)?;
        let _: super::SessionDocument = serde_json::from_str(&raw)?;
    }
    Ok(())
}

use super::*;
use shared::protocol::NoticeLevel;
use shared::domain::{AgentCapability, AgentStatus, ChatRole};

#[test]
fn valid_registrations_grow_the_registry() {
    let mut state = SessionState::new();
    for n in 0..5 {
        state
            .agents_mut()
            .register(&format!("agent-{n}"), "https://agents.test", AgentCapability::General)
            .expect("register");
    }
    assert_eq!(state.agents().len(), 5);

    state.agents_mut().delete(1).expect("delete");
    assert_eq!(state.agents().len(), 4);
    assert_eq!(state.agents().list()[1].name, "agent-2");
}

#[test]
fn registration_with_missing_field_is_rejected() {
    let mut registry = AgentRegistry::default();
    let (index, agent) = registry
        .register("Doc-Proc", "https://x.test/v1", AgentCapability::DocumentProcessing)
        .expect("register");
    assert_eq!(index, 0);
    assert_eq!(agent.status, AgentStatus::Active);

    let err = registry
        .register("", "https://y.test", AgentCapability::General)
        .expect_err("empty name");
    assert_eq!(err, RegistryError::MissingField);
    let err = registry
        .register("Other", "   ", AgentCapability::General)
        .expect_err("blank url");
    assert_eq!(err, RegistryError::MissingField);
    assert_eq!(registry.len(), 1);
}

#[test]
fn duplicate_agent_names_are_allowed() {
    let mut registry = AgentRegistry::default();
    registry
        .register("twin", "https://a.test", AgentCapability::General)
        .expect("first");
    registry
        .register("twin", "https://b.test", AgentCapability::General)
        .expect("second");
    assert_eq!(registry.len(), 2);
}

#[test]
fn deleting_past_the_end_leaves_registry_unchanged() {
    let mut registry = AgentRegistry::default();
    registry
        .register("only", "https://a.test", AgentCapability::General)
        .expect("register");
    let err = registry.delete(3).expect_err("out of range");
    assert_eq!(err, RegistryError::IndexOutOfRange { index: 3, len: 1 });
    assert_eq!(registry.len(), 1);
}

#[test]
fn uploads_are_recorded_in_order_with_one_notice_each() {
    let mut state = SessionState::new();
    let report = state.record_uploads(["a.pdf", "b.txt"], &UploadPolicy::default());

    let names: Vec<_> = state.files().iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, ["a.pdf", "b.txt"]);
    assert_eq!(report.accepted.len(), 2);
    assert_eq!(report.notices.len(), 2);
    assert_eq!(report.notices[0].message, "✅ a.pdf");
    assert!(report.rejected.is_empty());
}

#[test]
fn disallowed_extensions_are_not_recorded() {
    let mut state = SessionState::new();
    let report = state.record_uploads(["tool.exe", "notes", "Report.PDF"], &UploadPolicy::default());

    assert_eq!(state.files().len(), 1);
    assert_eq!(state.files()[0].name, "Report.PDF");
    assert_eq!(report.rejected.len(), 2);
    assert!(report
        .rejected
        .iter()
        .all(|r| r.reason == UploadRejection::ExtensionNotAllowed));

    let levels: Vec<_> = report.notices.iter().map(|n| n.level).collect();
    assert_eq!(
        levels,
        [NoticeLevel::Warning, NoticeLevel::Warning, NoticeLevel::Success]
    );
    assert_eq!(report.notices[0].message, "⚠️ tool.exe: file type not allowed");
}

#[test]
fn duplicate_policy_decides_whether_repeats_are_kept() {
    let keep = UploadPolicy::default();
    let mut state = SessionState::new();
    state.record_uploads(["a.pdf", "a.pdf"], &keep);
    assert_eq!(state.files().len(), 2);

    let skip = UploadPolicy::new(["pdf"], DuplicateUploads::Skip);
    let mut state = SessionState::new();
    let report = state.record_uploads(["a.pdf", "a.pdf"], &skip);
    assert_eq!(state.files().len(), 1);
    assert_eq!(report.rejected[0].reason, UploadRejection::AlreadyRecorded);
}

#[test]
fn policy_normalizes_configured_extensions() {
    let policy = UploadPolicy::new([".CSV", "csv", " md "], DuplicateUploads::Keep);
    assert_eq!(policy.allowed_extensions(), ["csv", "md"]);
    assert!(policy.allows("table.csv"));
    assert!(!policy.allows("table.pdf"));
}

#[test]
fn clear_keeps_agents_and_reset_drops_everything() {
    let mut state = SessionState::new();
    state.push_message(ChatMessage::user("hi"));
    state.push_message(ChatMessage::assistant("hello"));
    state.record_uploads(["a.pdf"], &UploadPolicy::default());
    state
        .agents_mut()
        .register("Doc-Proc", "https://x.test/v1", AgentCapability::General)
        .expect("register");

    state.clear();
    assert!(state.messages().is_empty());
    assert!(state.files().is_empty());
    assert_eq!(state.agents().len(), 1);

    state.reset();
    assert!(state.agents().is_empty());
}

#[test]
fn transcript_preserves_order() {
    let mut state = SessionState::new();
    state.push_message(ChatMessage::user("first"));
    state.push_message(ChatMessage::assistant("second"));
    let roles: Vec<_> = state.messages().iter().map(|m| m.role).collect();
    assert_eq!(roles, [ChatRole::User, ChatRole::Assistant]);
}

#[tokio::test]
async fn store_opens_and_closes_sessions() {
    let store = SessionStore::new();
    let id = store.open().await;
    assert_eq!(store.len().await, 1);

    let session = store.get(id).await.expect("session");
    session.lock().await.push_message(ChatMessage::user("hi"));
    assert_eq!(
        store.get(id).await.expect("session").lock().await.messages().len(),
        1
    );

    store.close(id).await.expect("close");
    assert_eq!(store.get(id).await.expect_err("closed"), SessionError::NotFound(id));
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn sessions_are_isolated() {
    let store = SessionStore::new();
    let a = store.open().await;
    let b = store.open().await;
    store
        .get(a)
        .await
        .expect("a")
        .lock()
        .await
        .record_uploads(["a.pdf"], &UploadPolicy::default());

    let summary = store.get(b).await.expect("b").lock().await.summary(b);
    assert_eq!(summary.files, 0);
}

#[tokio::test]
async fn idle_sessions_are_evicted() {
    let store = SessionStore::with_idle_ttl(Duration::from_millis(200));
    let idle = store.open().await;
    let busy = store.open().await;

    for _ in 0..3 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        store.get(busy).await.expect("busy session stays open");
    }

    assert_eq!(store.get(idle).await.expect_err("idle"), SessionError::NotFound(idle));
    assert_eq!(store.len().await, 1);
}

#[tokio::test]
async fn store_without_ttl_keeps_sessions() {
    let store = SessionStore::new();
    let id = store.open().await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    store.open().await;
    store.get(id).await.expect("still open");
}

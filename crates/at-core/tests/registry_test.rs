use at_core::registry::{RegistryError, TeamRegistry};
use at_core::state_store::StateStore;
use at_core::types::{AgentRole, Member, MemberStatus, Task, TaskStatus, TeamStatus};
use serde_json::json;

fn registry_in(dir: &tempfile::TempDir) -> TeamRegistry {
    TeamRegistry::new(StateStore::new(dir.path().to_path_buf()))
}

#[tokio::test]
async fn get_or_create_materializes_directory() {
    let dir = tempfile::tempdir().unwrap();
    let registry = registry_in(&dir);

    let team = registry.get_or_create("demo").await.unwrap();
    let guard = team.lock().await;
    assert_eq!(guard.name, "demo");
    assert_eq!(guard.status, TeamStatus::Active);
    assert!(guard.members.is_empty());
    assert!(guard.tasks.is_empty());
    assert!(guard.config_dir.is_dir());
    assert_eq!(guard.config_dir, dir.path().join("demo"));
}

#[tokio::test]
async fn new_team_is_on_disk_before_anything_else_happens() {
    let dir = tempfile::tempdir().unwrap();
    registry_in(&dir).get_or_create("fresh").await.unwrap();

    assert!(dir.path().join("fresh/state.json").is_file());
    let reloaded = registry_in(&dir);
    assert_eq!(reloaded.load_all().await.unwrap(), 1);
    let team = reloaded.require("fresh").unwrap();
    let guard = team.lock().await;
    assert_eq!(guard.status, TeamStatus::Active);
    assert!(guard.members.is_empty());
}

#[cfg(unix)]
#[tokio::test]
async fn load_all_survives_dangling_entries() {
    let dir = tempfile::tempdir().unwrap();
    registry_in(&dir).get_or_create("alive").await.unwrap();
    std::os::unix::fs::symlink(dir.path().join("gone"), dir.path().join("dangling")).unwrap();

    let registry = registry_in(&dir);
    assert_eq!(registry.load_all().await.unwrap(), 1);
    assert!(registry.get("alive").is_some());
}

#[tokio::test]
async fn team_saved_mid_shutdown_reloads_as_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    {
        let registry = registry_in(&dir);
        let team = registry.get_or_create("demo").await.unwrap();
        let mut guard = team.lock().await;
        guard.status = TeamStatus::ShuttingDown;
        registry.persist(&guard).await.unwrap();
    }

    let raw = std::fs::read_to_string(dir.path().join("demo/state.json")).unwrap();
    let state: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(state["status"], "shutdown");

    let reloaded = registry_in(&dir);
    reloaded.load_all().await.unwrap();
    let team = reloaded.require("demo").unwrap();
    assert_eq!(team.lock().await.status, TeamStatus::Shutdown);
}

#[tokio::test]
async fn get_or_create_returns_existing_record() {
    let dir = tempfile::tempdir().unwrap();
    let registry = registry_in(&dir);

    let first = registry.get_or_create("demo").await.unwrap();
    first
        .lock()
        .await
        .members
        .push(Member::new("s1", "alice", AgentRole::Lead));

    let second = registry.get_or_create("demo").await.unwrap();
    assert_eq!(second.lock().await.members.len(), 1);
    assert_eq!(registry.len(), 1);
}

#[tokio::test]
async fn concurrent_creation_yields_one_record() {
    let dir = tempfile::tempdir().unwrap();
    let registry = std::sync::Arc::new(registry_in(&dir));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let registry = registry.clone();
        handles.push(tokio::spawn(async move {
            registry.get_or_create("race").await.unwrap()
        }));
    }
    let mut teams = Vec::new();
    for h in handles {
        teams.push(h.await.unwrap());
    }

    assert_eq!(registry.len(), 1);
    assert!(teams
        .windows(2)
        .all(|pair| std::sync::Arc::ptr_eq(&pair[0], &pair[1])));
}

#[tokio::test]
async fn require_unknown_team_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let registry = registry_in(&dir);

    assert!(registry.get("ghost").is_none());
    assert!(matches!(
        registry.require("ghost"),
        Err(RegistryError::NotFound(name)) if name == "ghost"
    ));
}

#[tokio::test]
async fn invalid_names_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let registry = registry_in(&dir);

    let err = registry.get_or_create("../escape").await.unwrap_err();
    assert!(matches!(err, RegistryError::InvalidName(_)));
    assert!(registry.is_empty());
}

#[tokio::test]
async fn persist_then_reload_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    {
        let registry = registry_in(&dir);
        let team = registry.get_or_create("demo").await.unwrap();
        let mut guard = team.lock().await;

        let mut alice = Member::new("demo-alice-1", "alice", AgentRole::Implementer);
        alice.record_exit(true);
        guard.members.push(alice);
        guard
            .members
            .push(Member::new("demo-bob-1", "bob", AgentRole::Reviewer));
        let mut task = Task::new("task-1", "demo-alice-1", "write the codec");
        task.record_exit(true);
        guard.tasks.push(task);
        guard
            .tasks
            .push(Task::new("task-2", "demo-bob-1", "review the codec"));
        guard.set_result("summary", json!({"ok": true}));
        guard.status = TeamStatus::Shutdown;

        registry.persist(&guard).await.unwrap();
    }

    let reloaded = registry_in(&dir);
    assert_eq!(reloaded.load_all().await.unwrap(), 1);
    let team = reloaded.require("demo").unwrap();
    let guard = team.lock().await;

    assert_eq!(guard.status, TeamStatus::Shutdown);
    let roster: Vec<_> = guard
        .members
        .iter()
        .map(|m| (m.name.as_str(), m.role, m.status))
        .collect();
    assert_eq!(
        roster,
        vec![
            ("alice", AgentRole::Implementer, MemberStatus::Done),
            ("bob", AgentRole::Reviewer, MemberStatus::Idle),
        ]
    );
    assert!(guard.members.iter().all(|m| m.process.is_none()));
    assert_eq!(guard.tasks.len(), 2);
    assert_eq!(guard.tasks[0].status, TaskStatus::Completed);
    assert_eq!(guard.tasks[1].status, TaskStatus::Pending);
    assert_eq!(guard.result("summary"), Some(&json!({"ok": true})));
    assert_eq!(guard.config_dir, dir.path().join("demo"));
}

#[tokio::test]
async fn load_all_skips_corrupt_and_empty_teams() {
    let dir = tempfile::tempdir().unwrap();
    {
        let registry = registry_in(&dir);
        for name in ["good-1", "good-2"] {
            let team = registry.get_or_create(name).await.unwrap();
            let guard = team.lock().await;
            registry.persist(&guard).await.unwrap();
        }
    }
    std::fs::create_dir_all(dir.path().join("broken")).unwrap();
    std::fs::write(dir.path().join("broken/state.json"), "{\"name\": 42").unwrap();
    std::fs::create_dir_all(dir.path().join("empty")).unwrap();
    std::fs::write(dir.path().join("not-a-team.txt"), "hello").unwrap();

    let registry = registry_in(&dir);
    assert_eq!(registry.load_all().await.unwrap(), 2);

    let mut names = registry.names();
    names.sort();
    assert_eq!(names, vec!["good-1", "good-2"]);
}

#[tokio::test]
async fn load_all_creates_missing_root() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("nested/teams");
    let registry = TeamRegistry::new(StateStore::new(root.clone()));

    assert_eq!(registry.load_all().await.unwrap(), 0);
    assert!(root.is_dir());
}

#[tokio::test]
async fn remove_drops_in_memory_record_only() {
    let dir = tempfile::tempdir().unwrap();
    let registry = registry_in(&dir);
    registry.get_or_create("demo").await.unwrap();

    assert!(registry.remove("demo").is_some());
    assert!(registry.remove("demo").is_none());
    assert!(dir.path().join("demo").is_dir());
}

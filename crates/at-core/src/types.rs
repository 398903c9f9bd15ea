use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::process::ProcessHandle;

// ---------------------------------------------------------------------------
// AgentRole
// ---------------------------------------------------------------------------

/// Capability tag of a team member. Only prompt content and external tool
/// policy depend on it; the core treats every role the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgentRole {
    #[serde(rename = "team-lead")]
    Lead,
    #[serde(rename = "team-reviewer")]
    Reviewer,
    #[serde(rename = "team-debugger")]
    Debugger,
    #[serde(rename = "team-implementer")]
    Implementer,
}

impl AgentRole {
    pub const ALL: [AgentRole; 4] = [
        AgentRole::Lead,
        AgentRole::Reviewer,
        AgentRole::Debugger,
        AgentRole::Implementer,
    ];

    /// Wire name, as sent to children and written to `state.json`.
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::Lead => "team-lead",
            AgentRole::Reviewer => "team-reviewer",
            AgentRole::Debugger => "team-debugger",
            AgentRole::Implementer => "team-implementer",
        }
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role '{0}' (expected lead, reviewer, debugger or implementer)")]
pub struct ParseRoleError(String);

impl FromStr for AgentRole {
    type Err = ParseRoleError;

    /// Accepts both the wire name (`team-reviewer`) and the short form
    /// (`reviewer`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let short = s.trim().strip_prefix("team-").unwrap_or(s.trim());
        match short {
            "lead" => Ok(AgentRole::Lead),
            "reviewer" => Ok(AgentRole::Reviewer),
            "debugger" => Ok(AgentRole::Debugger),
            "implementer" => Ok(AgentRole::Implementer),
            _ => Err(ParseRoleError(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Status enums
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TeamStatus {
    Active,
    Idle,
    /// Cooperative shutdown requested, forced termination still pending.
    ShuttingDown,
    Shutdown,
}

impl TeamStatus {
    /// Returns `true` when a transition from `self` to `target` is valid.
    ///
    /// `Shutdown -> Shutdown` is allowed so that repeated shutdowns stay
    /// harmless; `Shutdown -> Active` covers a spawn into a stopped team.
    pub fn can_transition_to(&self, target: &TeamStatus) -> bool {
        matches!(
            (self, target),
            (TeamStatus::Active, TeamStatus::Idle)
                | (TeamStatus::Idle, TeamStatus::Active)
                | (TeamStatus::Active, TeamStatus::ShuttingDown)
                | (TeamStatus::Idle, TeamStatus::ShuttingDown)
                | (TeamStatus::Shutdown, TeamStatus::ShuttingDown)
                | (TeamStatus::ShuttingDown, TeamStatus::Shutdown)
                | (TeamStatus::Shutdown, TeamStatus::Active)
        )
    }

    /// The status as recorded on disk. `ShuttingDown` only holds while this
    /// process drives the shutdown, so a snapshot taken mid-shutdown is
    /// stored as `Shutdown`.
    pub fn durable(self) -> TeamStatus {
        match self {
            TeamStatus::ShuttingDown => TeamStatus::Shutdown,
            other => other,
        }
    }
}

fn serialize_durable_status<S>(status: &TeamStatus, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    status.durable().serialize(serializer)
}

impl fmt::Display for TeamStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TeamStatus::Active => "active",
            TeamStatus::Idle => "idle",
            TeamStatus::ShuttingDown => "shutting-down",
            TeamStatus::Shutdown => "shutdown",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MemberStatus {
    Idle,
    Working,
    Done,
    Error,
}

impl fmt::Display for MemberStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MemberStatus::Idle => "idle",
            MemberStatus::Working => "working",
            MemberStatus::Done => "done",
            MemberStatus::Error => "error",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in-progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Member
// ---------------------------------------------------------------------------

/// One spawned worker process and its identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub id: String,
    pub name: String,
    pub role: AgentRole,
    pub session_id: String,
    pub status: MemberStatus,
    /// Live process; `None` once the process has reported exit, and always
    /// `None` after a reload from disk.
    #[serde(skip)]
    pub process: Option<ProcessHandle>,
    #[serde(default)]
    pub owned_files: Vec<String>,
    #[serde(default)]
    pub last_update: Option<DateTime<Utc>>,
}

impl Member {
    pub fn new(session_id: impl Into<String>, name: impl Into<String>, role: AgentRole) -> Self {
        let session_id = session_id.into();
        Self {
            id: session_id.clone(),
            name: name.into(),
            role,
            session_id,
            status: MemberStatus::Idle,
            process: None,
            owned_files: Vec::new(),
            last_update: Some(Utc::now()),
        }
    }

    pub fn is_alive(&self) -> bool {
        self.process.is_some()
    }

    /// Record the outcome of the member's process.
    pub fn record_exit(&mut self, success: bool) {
        self.status = if success {
            MemberStatus::Done
        } else {
            MemberStatus::Error
        };
        self.process = None;
        self.last_update = Some(Utc::now());
    }
}

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub member_id: String,
    pub description: String,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked_by: Option<Vec<String>>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(
        id: impl Into<String>,
        member_id: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            member_id: member_id.into(),
            description: description.into(),
            status: TaskStatus::Pending,
            blocked_by: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// `completed_at` is only stamped on success.
    pub fn record_exit(&mut self, success: bool) {
        if success {
            self.status = TaskStatus::Completed;
            self.completed_at = Some(Utc::now());
        } else {
            self.status = TaskStatus::Failed;
        }
    }
}

// ---------------------------------------------------------------------------
// Team
// ---------------------------------------------------------------------------

/// A named collection of cooperating agents working one objective.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Team {
    pub name: String,
    pub members: Vec<Member>,
    pub tasks: Vec<Task>,
    #[serde(serialize_with = "serialize_durable_status")]
    pub status: TeamStatus,
    pub created_at: DateTime<Utc>,
    /// Ordered association list; serialized as `[[key, value], ...]`.
    #[serde(default)]
    pub results: Vec<(String, serde_json::Value)>,
    /// Derived from the directory the state was loaded from.
    #[serde(skip)]
    pub config_dir: PathBuf,
}

impl Team {
    pub fn new(name: impl Into<String>, config_dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            members: Vec::new(),
            tasks: Vec::new(),
            status: TeamStatus::Active,
            created_at: Utc::now(),
            results: Vec::new(),
            config_dir: config_dir.into(),
        }
    }

    /// Members matching `name`, or every member when `name` is `None`.
    pub fn recipients<'a>(&'a self, name: Option<&'a str>) -> impl Iterator<Item = &'a Member> {
        self.members
            .iter()
            .filter(move |m| name.map_or(true, |n| m.name == n))
    }

    pub fn member_by_session_mut(&mut self, session_id: &str) -> Option<&mut Member> {
        self.members.iter_mut().find(|m| m.session_id == session_id)
    }

    pub fn task_by_id_mut(&mut self, task_id: &str) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.id == task_id)
    }

    /// Handles of every member whose process is still running.
    pub fn live_processes(&self) -> Vec<ProcessHandle> {
        self.members
            .iter()
            .filter_map(|m| m.process.clone())
            .collect()
    }

    pub fn result(&self, key: &str) -> Option<&serde_json::Value> {
        self.results.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Insert or replace a result. A new key is appended; an existing key
    /// keeps its position.
    pub fn set_result(&mut self, key: impl Into<String>, value: serde_json::Value) {
        let key = key.into();
        match self.results.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.results.push((key, value)),
        }
    }
}

// ---------------------------------------------------------------------------
// TeamSummary
// ---------------------------------------------------------------------------

/// Point-in-time status report of a team, safe to hand to external callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamSummary {
    pub name: String,
    pub status: TeamStatus,
    pub created_at: DateTime<Utc>,
    pub members: Vec<MemberSummary>,
    pub tasks: Vec<TaskSummary>,
    pub results_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberSummary {
    pub name: String,
    pub role: AgentRole,
    pub status: MemberStatus,
    pub owned_files: usize,
    pub alive: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSummary {
    pub id: String,
    pub status: TaskStatus,
    pub description: String,
}

impl From<&Team> for TeamSummary {
    fn from(team: &Team) -> Self {
        Self {
            name: team.name.clone(),
            status: team.status,
            created_at: team.created_at,
            members: team
                .members
                .iter()
                .map(|m| MemberSummary {
                    name: m.name.clone(),
                    role: m.role,
                    status: m.status,
                    owned_files: m.owned_files.len(),
                    alive: m.is_alive(),
                })
                .collect(),
            tasks: team
                .tasks
                .iter()
                .map(|t| TaskSummary {
                    id: t.id.clone(),
                    status: t.status,
                    description: t.description.clone(),
                })
                .collect(),
            results_count: team.results.len(),
        }
    }
}

impl TeamSummary {
    /// One-line overview: `name: status (N members, M tasks)`.
    pub fn one_line(&self) -> String {
        format!(
            "{}: {} ({} members, {} tasks)",
            self.name,
            self.status,
            self.members.len(),
            self.tasks.len()
        )
    }
}

impl fmt::Display for TeamSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Team: {}", self.name)?;
        writeln!(f, "Status: {}", self.status)?;
        writeln!(f, "Created: {}", self.created_at.to_rfc3339())?;
        writeln!(f)?;
        writeln!(f, "Members ({}):", self.members.len())?;
        for m in &self.members {
            let live = if m.alive { " [live]" } else { "" };
            writeln!(f, "  {} ({}): {}{}", m.name, m.role, m.status, live)?;
        }
        writeln!(f)?;
        writeln!(f, "Tasks ({}):", self.tasks.len())?;
        for t in &self.tasks {
            writeln!(f, "  {}: {}", t.id, t.status)?;
        }
        writeln!(f)?;
        write!(f, "Results: {}", self.results_count)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn role_parses_short_and_wire_names() {
        assert_eq!("reviewer".parse::<AgentRole>().unwrap(), AgentRole::Reviewer);
        assert_eq!(
            "team-implementer".parse::<AgentRole>().unwrap(),
            AgentRole::Implementer
        );
        assert!("wizard".parse::<AgentRole>().is_err());
    }

    #[test]
    fn role_serializes_to_wire_name() {
        let json = serde_json::to_string(&AgentRole::Debugger).unwrap();
        assert_eq!(json, "\"team-debugger\"");
        for role in AgentRole::ALL {
            assert_eq!(role.to_string(), role.as_str());
        }
    }

    #[test]
    fn task_status_uses_kebab_case() {
        let json = serde_json::to_string(&TaskStatus::InProgress).unwrap();
        assert_eq!(json, "\"in-progress\"");
        let status: TeamStatus = serde_json::from_str("\"shutting-down\"").unwrap();
        assert_eq!(status, TeamStatus::ShuttingDown);
    }

    #[test]
    fn team_status_transitions() {
        assert!(TeamStatus::Active.can_transition_to(&TeamStatus::ShuttingDown));
        assert!(TeamStatus::ShuttingDown.can_transition_to(&TeamStatus::Shutdown));
        assert!(TeamStatus::Shutdown.can_transition_to(&TeamStatus::ShuttingDown));
        assert!(!TeamStatus::Active.can_transition_to(&TeamStatus::Shutdown));
        assert!(!TeamStatus::ShuttingDown.can_transition_to(&TeamStatus::Active));
    }

    #[test]
    fn member_exit_success_and_failure() {
        let mut m = Member::new("demo-alice-1", "alice", AgentRole::Implementer);
        assert_eq!(m.status, MemberStatus::Idle);
        m.record_exit(true);
        assert_eq!(m.status, MemberStatus::Done);

        let mut m = Member::new("demo-bob-1", "bob", AgentRole::Reviewer);
        m.record_exit(false);
        assert_eq!(m.status, MemberStatus::Error);
        assert!(!m.is_alive());
    }

    #[test]
    fn task_completed_at_only_on_success() {
        let mut ok = Task::new("t1", "m1", "build it");
        ok.record_exit(true);
        assert_eq!(ok.status, TaskStatus::Completed);
        assert!(ok.completed_at.is_some());

        let mut bad = Task::new("t2", "m2", "break it");
        bad.record_exit(false);
        assert_eq!(bad.status, TaskStatus::Failed);
        assert!(bad.completed_at.is_none());
    }

    #[test]
    fn set_result_replaces_in_place() {
        let mut team = Team::new("demo", "/tmp/demo");
        team.set_result("a", json!(1));
        team.set_result("b", json!(2));
        team.set_result("a", json!("updated"));

        assert_eq!(team.results.len(), 2);
        assert_eq!(team.results[0].0, "a");
        assert_eq!(team.result("a"), Some(&json!("updated")));
        assert_eq!(team.result("missing"), None);
    }

    #[test]
    fn results_serialize_as_pairs() {
        let mut team = Team::new("demo", "/tmp/demo");
        team.set_result("score", json!(42));
        let value = serde_json::to_value(&team).unwrap();
        assert_eq!(value["results"], json!([["score", 42]]));
        assert!(value.get("configDir").is_none());
    }

    #[test]
    fn mid_shutdown_team_is_stored_as_shutdown() {
        let mut team = Team::new("demo", "/tmp/demo");
        team.status = TeamStatus::ShuttingDown;
        let value = serde_json::to_value(&team).unwrap();
        assert_eq!(value["status"], "shutdown");
        // In memory the transient status is untouched.
        assert_eq!(team.status, TeamStatus::ShuttingDown);
        assert_eq!(TeamStatus::Idle.durable(), TeamStatus::Idle);
    }

    #[test]
    fn recipients_filter_by_name() {
        let mut team = Team::new("demo", "/tmp/demo");
        team.members.push(Member::new("s1", "alice", AgentRole::Lead));
        team.members.push(Member::new("s2", "bob", AgentRole::Reviewer));
        team.members.push(Member::new("s3", "alice", AgentRole::Debugger));

        assert_eq!(team.recipients(None).count(), 3);
        assert_eq!(team.recipients(Some("alice")).count(), 2);
        assert_eq!(team.recipients(Some("carol")).count(), 0);
    }

    #[test]
    fn summary_reports_counts() {
        let mut team = Team::new("demo", "/tmp/demo");
        let mut m = Member::new("s1", "alice", AgentRole::Implementer);
        m.owned_files = vec!["src/lib.rs".into(), "src/main.rs".into()];
        team.members.push(m);
        team.tasks.push(Task::new("t1", "s1", "do the thing"));
        team.set_result("k", json!(true));

        let summary = TeamSummary::from(&team);
        assert_eq!(summary.members[0].owned_files, 2);
        assert!(!summary.members[0].alive);
        assert_eq!(summary.results_count, 1);
        assert_eq!(summary.one_line(), "demo: active (1 members, 1 tasks)");

        let report = summary.to_string();
        assert!(report.contains("alice (team-implementer): idle"));
        assert!(report.contains("t1: pending"));
    }
}

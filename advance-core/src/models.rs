use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use uuid::Uuid;

use crate::numbering;

/// Maturity of a scout's work on a single requirement
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    #[default]
    NotStarted,
    InProgress,
    Completed,
    Approved,
    Awarded,
}

impl ProgressStatus {
    /// The only completion predicate used by aggregate statistics
    pub fn is_complete(&self) -> bool {
        matches!(
            self,
            ProgressStatus::Completed | ProgressStatus::Approved | ProgressStatus::Awarded
        )
    }

    /// Ranking used to pick between duplicate records for one requirement.
    /// `approved` and `awarded` both dominate `completed`.
    pub fn maturity(&self) -> u8 {
        match self {
            ProgressStatus::NotStarted => 0,
            ProgressStatus::InProgress => 1,
            ProgressStatus::Completed => 2,
            ProgressStatus::Approved => 3,
            ProgressStatus::Awarded => 4,
        }
    }
}

impl fmt::Display for ProgressStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgressStatus::NotStarted => write!(f, "Not Started"),
            ProgressStatus::InProgress => write!(f, "In Progress"),
            ProgressStatus::Completed => write!(f, "Completed"),
            ProgressStatus::Approved => write!(f, "Approved"),
            ProgressStatus::Awarded => write!(f, "Awarded"),
        }
    }
}

/// Leader sign-off state, only meaningful while the status is not terminal
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    #[default]
    None,
    PendingApproval,
    Denied,
}

/// The two kinds of checklists that are tracked
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChecklistKind {
    #[default]
    Rank,
    MeritBadge,
}

impl fmt::Display for ChecklistKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChecklistKind::Rank => write!(f, "Rank"),
            ChecklistKind::MeritBadge => write!(f, "Merit Badge"),
        }
    }
}

/// How the requirements of a checklist version express their nesting
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum HierarchyMode {
    /// Requirements carry explicit parent ids
    ParentLinked,
    /// Nesting is inferred from requirement numbers
    #[default]
    Legacy,
}

/// A single checklist item
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Requirement {
    /// Stable identifier within one requirement version
    pub id: Uuid,

    /// Raw requirement number as printed in the handbook (e.g. "7b8", "6A(a)(1)")
    pub requirement_number: String,

    /// Requirement text
    pub description: String,

    /// Owning requirement, if the version uses explicit parent links
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_requirement_id: Option<Uuid>,

    #[serde(default)]
    pub is_alternative: bool,

    /// Siblings sharing a group key are alternatives of each other
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alternatives_group: Option<String>,

    /// How many children must be completed; only meaningful on a parent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_count: Option<u32>,

    #[serde(default)]
    pub nesting_depth: u32,

    #[serde(default)]
    pub display_order: u32,

    /// Externally assigned key that survives renumbering between versions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_key: Option<String>,
}

impl Requirement {
    /// Creates a requirement with a fresh id and the nesting depth derived
    /// from its number
    pub fn new(requirement_number: impl Into<String>, description: impl Into<String>) -> Self {
        let requirement_number = requirement_number.into();
        let nesting_depth = numbering::parse(&requirement_number).depth();
        Self {
            id: Uuid::new_v4(),
            requirement_number,
            description: description.into(),
            parent_requirement_id: None,
            is_alternative: false,
            alternatives_group: None,
            required_count: None,
            nesting_depth,
            display_order: 0,
            external_key: None,
        }
    }

    pub fn with_parent(mut self, parent: Uuid) -> Self {
        self.parent_requirement_id = Some(parent);
        self
    }

    pub fn with_display_order(mut self, display_order: u32) -> Self {
        self.display_order = display_order;
        self
    }
}

/// A scout's progress on one requirement
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressRecord {
    pub requirement_id: Uuid,

    #[serde(default)]
    pub status: ProgressStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<NaiveDate>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_by: Option<String>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub notes: String,

    #[serde(default)]
    pub approval_status: ApprovalStatus,
}

impl ProgressRecord {
    pub fn new(requirement_id: Uuid, status: ProgressStatus) -> Self {
        Self {
            requirement_id,
            status,
            completed_at: None,
            completed_by: None,
            notes: String::new(),
            approval_status: ApprovalStatus::None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.status.is_complete()
    }
}

/// One dated edition of a rank or merit badge checklist
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChecklistVersion {
    pub name: String,

    #[serde(default)]
    pub kind: ChecklistKind,

    /// Edition label, usually the year it took effect
    pub version: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effective_date: Option<NaiveDate>,

    #[serde(default)]
    pub hierarchy: HierarchyMode,

    #[serde(default)]
    pub requirements: Vec<Requirement>,
}

/// Identity block of a scout, as found at the top of a history export
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScoutInfo {
    pub name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub unit: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub member_id: String,
}

/// Persisted progress of one scout
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProgressFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scout: Option<ScoutInfo>,

    #[serde(default)]
    pub records: Vec<ProgressRecord>,
}

/// Raw numbers of the requirements whose progress counts as complete
pub fn completed_numbers(
    requirements: &[Requirement],
    progress: &[ProgressRecord],
) -> BTreeSet<String> {
    let by_id: HashMap<Uuid, &Requirement> = requirements.iter().map(|r| (r.id, r)).collect();

    progress
        .iter()
        .filter(|p| p.is_complete())
        .filter_map(|p| by_id.get(&p.requirement_id))
        .map(|r| r.requirement_number.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completion_predicate() {
        assert!(!ProgressStatus::NotStarted.is_complete());
        assert!(!ProgressStatus::InProgress.is_complete());
        assert!(ProgressStatus::Completed.is_complete());
        assert!(ProgressStatus::Approved.is_complete());
        assert!(ProgressStatus::Awarded.is_complete());
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let yaml = serde_yaml::to_string(&ProgressStatus::NotStarted).unwrap();
        assert_eq!(yaml.trim(), "not_started");

        let status: ProgressStatus = serde_yaml::from_str("in_progress").unwrap();
        assert_eq!(status, ProgressStatus::InProgress);

        let approval: ApprovalStatus = serde_yaml::from_str("pending_approval").unwrap();
        assert_eq!(approval, ApprovalStatus::PendingApproval);
    }

    #[test]
    fn test_new_requirement_caches_depth() {
        assert_eq!(Requirement::new("1", "Top").nesting_depth, 1);
        assert_eq!(Requirement::new("7b8", "Deep").nesting_depth, 3);
        assert_eq!(Requirement::new("6A(a)(1)", "Paren").nesting_depth, 4);
    }

    #[test]
    fn test_checklist_defaults_when_fields_missing() {
        let yaml = r#"
name: Camping
version: "2024"
requirements:
  - id: 6f1c1a52-3f5e-4b7a-9d55-8d1b2c7b6a10
    requirement_number: "1a"
    description: Explain hazards
"#;
        let checklist: ChecklistVersion = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(checklist.kind, ChecklistKind::Rank);
        assert_eq!(checklist.hierarchy, HierarchyMode::Legacy);
        assert_eq!(checklist.requirements.len(), 1);
        assert!(checklist.requirements[0].parent_requirement_id.is_none());
        assert!(!checklist.requirements[0].is_alternative);
    }

    #[test]
    fn test_completed_numbers_uses_status_only() {
        let r1 = Requirement::new("1", "One");
        let r2 = Requirement::new("2", "Two");
        let r3 = Requirement::new("3", "Three");

        let mut in_progress = ProgressRecord::new(r2.id, ProgressStatus::InProgress);
        // A completion date alone does not make a record complete
        in_progress.completed_at = NaiveDate::from_ymd_opt(2024, 1, 1);

        let progress = vec![
            ProgressRecord::new(r1.id, ProgressStatus::Approved),
            in_progress,
            ProgressRecord::new(r3.id, ProgressStatus::Awarded),
            ProgressRecord::new(Uuid::new_v4(), ProgressStatus::Completed),
        ];

        let done = completed_numbers(&[r1, r2, r3], &progress);
        assert_eq!(done.len(), 2);
        assert!(done.contains("1"));
        assert!(done.contains("3"));
    }
}

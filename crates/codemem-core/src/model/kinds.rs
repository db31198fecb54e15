//! String-backed domain enums.
//!
//! Every enum round-trips through its `as_str` form because the
//! database stores the snake_case string, not a discriminant.

use serde::{Deserialize, Serialize};

// ============================================================================
// CONTEXT TYPES
// ============================================================================

/// The kind of recorded memory
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ContextType {
    Code,
    #[default]
    Conversation,
    Error,
    Solution,
    Documentation,
    Test,
    Configuration,
    Commit,
    CodeCreate,
    CodeModify,
    CodeDelete,
    CodeRefactor,
    CodeOptimize,
    BugFix,
    BugReport,
    FeatureAdd,
    FeatureUpdate,
    FeatureRemove,
    Design,
    Learning,
}

impl ContextType {
    /// All known context types, in storage order.
    pub const ALL: &'static [ContextType] = &[
        ContextType::Code,
        ContextType::Conversation,
        ContextType::Error,
        ContextType::Solution,
        ContextType::Documentation,
        ContextType::Test,
        ContextType::Configuration,
        ContextType::Commit,
        ContextType::CodeCreate,
        ContextType::CodeModify,
        ContextType::CodeDelete,
        ContextType::CodeRefactor,
        ContextType::CodeOptimize,
        ContextType::BugFix,
        ContextType::BugReport,
        ContextType::FeatureAdd,
        ContextType::FeatureUpdate,
        ContextType::FeatureRemove,
        ContextType::Design,
        ContextType::Learning,
    ];

    /// Convert to the stored string form
    pub fn as_str(&self) -> &'static str {
        match self {
            ContextType::Code => "code",
            ContextType::Conversation => "conversation",
            ContextType::Error => "error",
            ContextType::Solution => "solution",
            ContextType::Documentation => "documentation",
            ContextType::Test => "test",
            ContextType::Configuration => "configuration",
            ContextType::Commit => "commit",
            ContextType::CodeCreate => "code_create",
            ContextType::CodeModify => "code_modify",
            ContextType::CodeDelete => "code_delete",
            ContextType::CodeRefactor => "code_refactor",
            ContextType::CodeOptimize => "code_optimize",
            ContextType::BugFix => "bug_fix",
            ContextType::BugReport => "bug_report",
            ContextType::FeatureAdd => "feature_add",
            ContextType::FeatureUpdate => "feature_update",
            ContextType::FeatureRemove => "feature_remove",
            ContextType::Design => "design",
            ContextType::Learning => "learning",
        }
    }

    /// Parse from a stored string; unknown strings fall back to `Conversation`.
    pub fn parse_name(s: &str) -> Self {
        Self::try_parse(s).unwrap_or_default()
    }

    /// Strict parse
    pub fn try_parse(s: &str) -> Option<Self> {
        ContextType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s.to_lowercase())
    }

    /// True for `code` and the `code_*` change family.
    pub fn is_code_family(&self) -> bool {
        matches!(
            self,
            ContextType::Code
                | ContextType::CodeCreate
                | ContextType::CodeModify
                | ContextType::CodeDelete
                | ContextType::CodeRefactor
                | ContextType::CodeOptimize
        )
    }
}

impl std::fmt::Display for ContextType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// SESSION STATUS
// ============================================================================

/// Session lifecycle state: `active ──end──▸ ended ──reactivate──▸ active`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    #[default]
    Active,
    Ended,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Ended => "ended",
        }
    }

    pub fn parse_name(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "ended" => SessionStatus::Ended,
            _ => SessionStatus::Active,
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// FILE CHANGE TYPES
// ============================================================================

/// Per-file change kind inside a multi-file context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Add,
    Modify,
    Delete,
    Refactor,
    Rename,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Add => "add",
            ChangeType::Modify => "modify",
            ChangeType::Delete => "delete",
            ChangeType::Refactor => "refactor",
            ChangeType::Rename => "rename",
        }
    }

    pub fn try_parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "add" | "added" | "create" => Some(ChangeType::Add),
            "modify" | "modified" | "update" => Some(ChangeType::Modify),
            "delete" | "deleted" | "remove" => Some(ChangeType::Delete),
            "refactor" => Some(ChangeType::Refactor),
            "rename" | "renamed" => Some(ChangeType::Rename),
            _ => None,
        }
    }
}

impl std::fmt::Display for ChangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// RELATIONSHIP TYPES
// ============================================================================

/// Directed edge kind between two contexts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationType {
    DependsOn,
    RelatedTo,
    Fixes,
    Implements,
    Tests,
    Documents,
}

impl RelationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationType::DependsOn => "depends_on",
            RelationType::RelatedTo => "related_to",
            RelationType::Fixes => "fixes",
            RelationType::Implements => "implements",
            RelationType::Tests => "tests",
            RelationType::Documents => "documents",
        }
    }

    pub fn try_parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "depends_on" => Some(RelationType::DependsOn),
            "related_to" => Some(RelationType::RelatedTo),
            "fixes" => Some(RelationType::Fixes),
            "implements" => Some(RelationType::Implements),
            "tests" => Some(RelationType::Tests),
            "documents" => Some(RelationType::Documents),
            _ => None,
        }
    }
}

impl std::fmt::Display for RelationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// IMPACT LEVEL
// ============================================================================

/// Estimated blast radius of a recorded change
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ImpactLevel {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

impl ImpactLevel {
    pub fn try_parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "low" => Some(ImpactLevel::Low),
            "medium" => Some(ImpactLevel::Medium),
            "high" => Some(ImpactLevel::High),
            "critical" => Some(ImpactLevel::Critical),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ImpactLevel::Low => "low",
            ImpactLevel::Medium => "medium",
            ImpactLevel::High => "high",
            ImpactLevel::Critical => "critical",
        }
    }
}

impl std::fmt::Display for ImpactLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// TESTS
// ============================================================================

//! Automatic context classification.
//!
//! Keyword-rule classifier applied when the caller omits a type or
//! sends the generic `code`/`conversation`. The returned confidence
//! gates substitution: below 0.5 the caller's type stands.

use crate::model::{ChangeType, ContextType, ImpactLevel};

/// Classifier verdict
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub context_type: ContextType,
    pub change_type: Option<ChangeType>,
    pub impact_level: Option<ImpactLevel>,
    pub confidence: f64,
}

impl Default for Classification {
    fn default() -> Self {
        Self {
            context_type: ContextType::Conversation,
            change_type: None,
            impact_level: None,
            confidence: 0.0,
        }
    }
}

/// One keyword rule: any needle hit votes for the type with the rule's
/// weight; strong rules also carry a change type.
struct Rule {
    needles: &'static [&'static str],
    context_type: ContextType,
    change_type: Option<ChangeType>,
    weight: f64,
}

const RULES: &[Rule] = &[
    Rule {
        needles: &["fixed", "fixes", "fix ", "bugfix", "hotfix", "resolved", "修复"],
        context_type: ContextType::BugFix,
        change_type: Some(ChangeType::Modify),
        weight: 0.8,
    },
    Rule {
        needles: &["bug report", "reproduce", "steps to reproduce", "expected behavior"],
        context_type: ContextType::BugReport,
        change_type: None,
        weight: 0.75,
    },
    Rule {
        needles: &["refactor", "refactored", "restructure", "extracted", "重构"],
        context_type: ContextType::CodeRefactor,
        change_type: Some(ChangeType::Refactor),
        weight: 0.8,
    },
    Rule {
        needles: &["optimize", "optimized", "speed up", "performance improvement", "faster"],
        context_type: ContextType::CodeOptimize,
        change_type: Some(ChangeType::Modify),
        weight: 0.7,
    },
    Rule {
        needles: &["added feature", "new feature", "implemented", "implement ", "feature:", "新功能"],
        context_type: ContextType::FeatureAdd,
        change_type: Some(ChangeType::Add),
        weight: 0.7,
    },
    Rule {
        needles: &["removed feature", "deprecated", "dropped support"],
        context_type: ContextType::FeatureRemove,
        change_type: Some(ChangeType::Delete),
        weight: 0.7,
    },
    Rule {
        needles: &["created file", "new file", "scaffold", "initial implementation"],
        context_type: ContextType::CodeCreate,
        change_type: Some(ChangeType::Add),
        weight: 0.65,
    },
    Rule {
        needles: &["deleted file", "removed file", "cleanup dead code"],
        context_type: ContextType::CodeDelete,
        change_type: Some(ChangeType::Delete),
        weight: 0.65,
    },
    Rule {
        needles: &["test", "assert", "expect(", "#[test]", "unit test", "测试"],
        context_type: ContextType::Test,
        change_type: None,
        weight: 0.6,
    },
    Rule {
        needles: &["commit", "merged", "pull request", "cherry-pick"],
        context_type: ContextType::Commit,
        change_type: None,
        weight: 0.6,
    },
    Rule {
        needles: &["config", "configuration", "environment variable", ".env", "settings"],
        context_type: ContextType::Configuration,
        change_type: None,
        weight: 0.55,
    },
    Rule {
        needles: &["architecture", "design decision", "trade-off", "tradeoff", "we chose", "设计"],
        context_type: ContextType::Design,
        change_type: None,
        weight: 0.65,
    },
    Rule {
        needles: &["solution", "workaround", "solved by", "the answer was", "解决"],
        context_type: ContextType::Solution,
        change_type: None,
        weight: 0.65,
    },
    Rule {
        needles: &["documented", "readme", "docstring", "documentation", "文档"],
        context_type: ContextType::Documentation,
        change_type: None,
        weight: 0.6,
    },
    Rule {
        needles: &["learned", "til ", "today i learned", "turns out", "lesson"],
        context_type: ContextType::Learning,
        change_type: None,
        weight: 0.6,
    },
    Rule {
        needles: &["error:", "exception", "stack trace", "panicked at", "traceback"],
        context_type: ContextType::Error,
        change_type: None,
        weight: 0.7,
    },
];

/// Classify content (and any declared file set) into a context type.
pub fn classify(content: &str, changed_file_count: usize) -> Classification {
    let lower = content.to_lowercase();

    let mut best: Option<(&Rule, usize)> = None;
    for rule in RULES {
        let hits = rule.needles.iter().filter(|n| lower.contains(*n)).count();
        if hits == 0 {
            continue;
        }
        let better = match best {
            Some((current, current_hits)) => {
                let score = rule.weight + hits as f64 * 0.05;
                let current_score = current.weight + current_hits as f64 * 0.05;
                score > current_score
            }
            None => true,
        };
        if better {
            best = Some((rule, hits));
        }
    }

    let Some((rule, hits)) = best else {
        // No rule fired: code-looking content is code, else conversation
        let looks_like_code =
            lower.contains("```") || lower.contains("fn ") || lower.contains("function ");
        return Classification {
            context_type: if looks_like_code {
                ContextType::Code
            } else {
                ContextType::Conversation
            },
            change_type: None,
            impact_level: None,
            confidence: 0.3,
        };
    };

    // Extra matching needles raise confidence, capped below certainty
    let confidence = (rule.weight + (hits.saturating_sub(1)) as f64 * 0.05).min(0.95);

    Classification {
        context_type: rule.context_type,
        change_type: rule.change_type,
        impact_level: Some(impact_level(&lower, changed_file_count)),
        confidence,
    }
}

fn impact_level(lower: &str, changed_file_count: usize) -> ImpactLevel {
    if lower.contains("breaking") || lower.contains("critical") || lower.contains("security") {
        return ImpactLevel::Critical;
    }
    if changed_file_count >= 5 || lower.contains("major") {
        return ImpactLevel::High;
    }
    if changed_file_count >= 2 {
        return ImpactLevel::Medium;
    }
    ImpactLevel::Low
}

// ============================================================================
// TESTS
// ============================================================================

use smarts_core::{AgentKind, Subtask};

/// Splits a task description into typed subtasks.
pub trait TaskDecomposer: Send + Sync {
    /// Subtasks for `description`, in dispatch order.
    fn decompose(&self, description: &str) -> Vec<Subtask>;
}

struct Rule {
    keywords: &'static [&'static str],
    kind: AgentKind,
    description: &'static str,
    priority: u8,
}

const RULES: &[Rule] = &[
    Rule {
        keywords: &["search", "find", "look"],
        kind: AgentKind::Vision,
        description: "Identify search elements on screen",
        priority: 1,
    },
    Rule {
        keywords: &["click", "press", "button"],
        kind: AgentKind::Action,
        description: "Execute click action",
        priority: 2,
    },
    Rule {
        keywords: &["type", "enter", "write"],
        kind: AgentKind::Action,
        description: "Execute typing action",
        priority: 2,
    },
    Rule {
        keywords: &["read", "extract", "process"],
        kind: AgentKind::Vision,
        description: "Process and extract information",
        priority: 1,
    },
    Rule {
        keywords: &["plan", "organize", "structure"],
        kind: AgentKind::Planning,
        description: "Create execution plan",
        priority: 0,
    },
];

/// Deterministic keyword classifier.
///
/// Rules are checked in a fixed order against the lower-cased description
/// using substring matching; each matching rule contributes one subtask.
/// A description that matches nothing becomes a single planning subtask.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordDecomposer;

impl KeywordDecomposer {
    /// Create the decomposer.
    pub fn new() -> Self {
        Self
    }
}

impl TaskDecomposer for KeywordDecomposer {
    fn decompose(&self, description: &str) -> Vec<Subtask> {
        let lowered = description.to_lowercase();
        let mut subtasks: Vec<Subtask> = RULES
            .iter()
            .filter(|rule| rule.keywords.iter().any(|kw| lowered.contains(kw)))
            .map(|rule| (rule.kind, rule.description, rule.priority))
            .enumerate()
            .map(|(i, (kind, text, priority))| {
                Subtask::new(format!("{kind}-{}", i + 1), kind, text, priority)
            })
            .collect();

        if subtasks.is_empty() {
            subtasks.push(Subtask::new(
                format!("{}-1", AgentKind::Planning),
                AgentKind::Planning,
                "Analyze and plan task execution",
                0,
            ));
        }
        subtasks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(subtasks: &[Subtask]) -> Vec<(AgentKind, u8)> {
        subtasks.iter().map(|s| (s.kind, s.priority)).collect()
    }

    #[test]
    fn test_search_and_click() {
        let subtasks =
            KeywordDecomposer.decompose("search for information and click the first result");
        assert_eq!(
            kinds(&subtasks),
            vec![(AgentKind::Vision, 1), (AgentKind::Action, 2)]
        );
        assert_eq!(subtasks[0].id, "vision-1");
        assert_eq!(subtasks[1].id, "action-2");
        assert_eq!(subtasks[1].description, "Execute click action");
    }

    #[test]
    fn test_unmatched_becomes_planning() {
        let subtasks = KeywordDecomposer.decompose("hello there");
        assert_eq!(subtasks.len(), 1);
        assert_eq!(subtasks[0].kind, AgentKind::Planning);
        assert_eq!(subtasks[0].description, "Analyze and plan task execution");
        assert_eq!(subtasks[0].priority, 0);
    }

    #[test]
    fn test_rule_order_not_sentence_order() {
        let subtasks = KeywordDecomposer.decompose("Plan the trip, then TYPE the address");
        assert_eq!(
            kinds(&subtasks),
            vec![(AgentKind::Action, 2), (AgentKind::Planning, 0)]
        );
    }

    #[test]
    fn test_substring_matching() {
        // "lookup" contains "look", "processing" contains "process"
        let subtasks = KeywordDecomposer.decompose("lookup processing");
        assert_eq!(subtasks.len(), 2);
        assert_eq!(subtasks[1].description, "Process and extract information");
    }

    #[test]
    fn test_every_rule_fires_at_most_once() {
        let subtasks = KeywordDecomposer
            .decompose("find, search, look, click, press, type, write, read, plan, organize");
        assert_eq!(subtasks.len(), 5);
    }

    #[test]
    fn test_deterministic() {
        let text = "read the report and write a summary";
        assert_eq!(
            KeywordDecomposer.decompose(text),
            KeywordDecomposer.decompose(text)
        );
    }
}

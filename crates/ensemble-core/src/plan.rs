//! Task plans: the coordinator's planning reply and a lenient reader for it
//!
//! The plan text is free-form model output. `parse_plan` picks out blocks of
//! the form
//!
//! ```text
//! SUBTASK 1: description
//! AGENT: Researcher
//! REASON: why
//! ```
//!
//! and ignores everything else. Nothing here is called implicitly; callers
//! decide whether to trust the extracted structure.

use serde::{Deserialize, Serialize};

use crate::orchestrator::DelegationMap;

/// Planning reply paired with the task it was produced for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPlan {
    pub plan: String,
    pub task: String,
}

impl TaskPlan {
    pub fn subtasks(&self) -> Vec<PlannedSubtask> {
        parse_plan(&self.plan)
    }

    /// Group the parsed subtasks by agent, in first-appearance order
    pub fn delegation(&self) -> DelegationMap {
        let mut map = DelegationMap::new();
        for subtask in self.subtasks() {
            map.push(subtask.agent, subtask.description);
        }
        map
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedSubtask {
    pub description: String,
    pub agent: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Default)]
struct Block {
    description: String,
    agent: Option<String>,
    reason: Option<String>,
}

impl Block {
    fn finish(self) -> Option<PlannedSubtask> {
        let agent = self.agent.filter(|a| !a.is_empty())?;
        if self.description.is_empty() {
            return None;
        }
        Some(PlannedSubtask {
            description: self.description,
            agent,
            reason: self.reason.filter(|r| !r.is_empty()),
        })
    }
}

enum Field {
    Subtask,
    Agent,
    Reason,
}

/// Extract `SUBTASK`/`AGENT`/`REASON` blocks. Keys are case-insensitive and
/// may be wrapped in markdown bold or bullets. Blocks without an agent are
/// dropped.
pub fn parse_plan(text: &str) -> Vec<PlannedSubtask> {
    let mut subtasks = Vec::new();
    let mut current: Option<Block> = None;

    for line in text.lines() {
        let Some((field, value)) = classify(line) else {
            continue;
        };
        match field {
            Field::Subtask => {
                if let Some(done) = current.take().and_then(Block::finish) {
                    subtasks.push(done);
                }
                current = Some(Block {
                    description: value,
                    ..Block::default()
                });
            }
            Field::Agent => {
                if let Some(block) = current.as_mut() {
                    block.agent = Some(clean_agent_name(&value));
                }
            }
            Field::Reason => {
                if let Some(block) = current.as_mut() {
                    block.reason = Some(value);
                }
            }
        }
    }
    if let Some(done) = current.and_then(Block::finish) {
        subtasks.push(done);
    }
    subtasks
}

fn classify(line: &str) -> Option<(Field, String)> {
    let normalized = line
        .trim()
        .trim_start_matches(['-', '*', '#', '>', ' '])
        .replace("**", "");
    let (key, value) = normalized.split_once(':')?;
    let key = key.trim().to_uppercase();
    let value = value.trim().to_string();

    let field = match key.as_str() {
        "AGENT" => Field::Agent,
        "REASON" => Field::Reason,
        "SUBTASK" => Field::Subtask,
        other => {
            let number = other.strip_prefix("SUBTASK")?.trim();
            if number.is_empty() || !number.chars().all(|c| c.is_ascii_digit()) {
                return None;
            }
            Field::Subtask
        }
    };
    Some((field, value))
}

fn clean_agent_name(raw: &str) -> String {
    raw.trim_matches(|c: char| matches!(c, '[' | ']' | '`' | '*' | '.') || c.is_whitespace())
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAN: &str = "Here is the plan.

SUBTASK 1: Research scraping libraries
AGENT: Researcher
REASON: Needs comparison of options

SUBTASK 2: Write the scraper
AGENT: Coder
REASON: Implementation work

SUBTASK 3: Write tests for the scraper
AGENT: Coder

Integration: merge everything at the end.";

    #[test]
    fn test_parse_basic_plan() {
        let subtasks = parse_plan(PLAN);
        assert_eq!(subtasks.len(), 3);
        assert_eq!(subtasks[0].description, "Research scraping libraries");
        assert_eq!(subtasks[0].agent, "Researcher");
        assert_eq!(subtasks[0].reason.as_deref(), Some("Needs comparison of options"));
        assert_eq!(subtasks[2].agent, "Coder");
        assert!(subtasks[2].reason.is_none());
    }

    #[test]
    fn test_parse_markdown_and_case() {
        let text = "- **Subtask 1:** Gather data\n  **Agent:** [Researcher]\n* reason: fast\n\
                    ### subtask 2: Build it\nagent: `Coder`.";
        let subtasks = parse_plan(text);
        assert_eq!(subtasks.len(), 2);
        assert_eq!(subtasks[0].description, "Gather data");
        assert_eq!(subtasks[0].agent, "Researcher");
        assert_eq!(subtasks[0].reason.as_deref(), Some("fast"));
        assert_eq!(subtasks[1].agent, "Coder");
    }

    #[test]
    fn test_block_without_agent_dropped() {
        let text = "SUBTASK 1: orphan\nREASON: none\nSUBTASK 2: kept\nAGENT: Coder";
        let subtasks = parse_plan(text);
        assert_eq!(subtasks.len(), 1);
        assert_eq!(subtasks[0].description, "kept");
    }

    #[test]
    fn test_non_plan_text() {
        assert!(parse_plan("I could not produce a plan.").is_empty());
        assert!(parse_plan("").is_empty());
        assert!(parse_plan("AGENT: Coder\nSUBTASKS: many").is_empty());
    }

    #[test]
    fn test_delegation_groups_by_agent() {
        let plan = TaskPlan {
            plan: PLAN.to_string(),
            task: "Build a scraper".to_string(),
        };
        let map = plan.delegation();
        let names: Vec<&str> = map.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["Researcher", "Coder"]);
        assert_eq!(
            map.get("Coder").unwrap(),
            ["Write the scraper".to_string(), "Write tests for the scraper".to_string()]
        );
    }
}

//! Checklist parsing for task plans
//!
//! A task line is a markdown list item with a bracketed status marker:
//! `- [ ] open`, `- [x] done`, `- [!] failed`. Every task line maps to a
//! canonical key so that the same task keeps its identity across model
//! rewrites of the plan. Key extraction is a pure function of the line.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use sha2::{Digest, Sha256};
use taskflow_core::{Plan, Task, TaskStatus};

use crate::error::{OrchestratorError, Result};

/// Marker the planner puts first when it answers directly instead of planning.
pub const DIRECT_REPLY_MARKER: &str = "[DIRECT_REPLY]";

/// Maximum length of a text-derived key
pub const KEY_PREFIX_LEN: usize = 48;

static TASK_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*[-*+]\s*\[([ xX!])\]\s*(\S.*?)\s*$").expect("Invalid task line regex")
});

static NUMERIC_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([0-9]+)\s*[.):：、\-]").expect("Invalid numeric prefix regex")
});

static TASK_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\btask\s*#?\s*([0-9]+)").expect("Invalid task reference regex")
});

static ANY_INTEGER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[0-9]+").expect("Invalid integer regex"));

static MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[[ xX!]\]").expect("Invalid marker regex"));

static LEADING_BULLET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:[-*+]\s*)+").expect("Invalid bullet regex"));

/// A single task line broken into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTaskLine {
    pub key: String,
    pub status: TaskStatus,
    /// Text after the status marker
    pub description: String,
}

/// What the planner produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlannerOutput {
    Plan(Plan),
    DirectReply(String),
}

/// Whether the line is a well-formed task line.
pub fn is_task_line(line: &str) -> bool {
    TASK_LINE.is_match(line)
}

/// Parse one line; `None` when it is not a task line.
pub fn parse_task_line(line: &str) -> Option<ParsedTaskLine> {
    let caps = TASK_LINE.captures(line)?;
    let marker = caps.get(1)?.as_str().chars().next()?;
    let status = TaskStatus::from_marker(marker)?;
    let description = caps.get(2)?.as_str().to_string();
    let key = derive_key(&description);

    Some(ParsedTaskLine {
        key,
        status,
        description,
    })
}

/// Canonical key for a line; `None` when it is not a task line.
pub fn extract_task_key(line: &str) -> Option<String> {
    parse_task_line(line).map(|parsed| parsed.key)
}

fn derive_key(text: &str) -> String {
    if let Some(caps) = NUMERIC_PREFIX.captures(text) {
        return normalize_integer(&caps[1]);
    }
    if let Some(caps) = TASK_REFERENCE.captures(text) {
        return normalize_integer(&caps[1]);
    }
    if let Some(m) = ANY_INTEGER.find(text) {
        return normalize_integer(m.as_str());
    }
    text_key(text)
}

fn normalize_integer(digits: &str) -> String {
    let trimmed = digits.trim_start_matches('0');
    if trimmed.is_empty() {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Key from the task text, which excludes the status marker.
fn text_key(text: &str) -> String {
    let without_markers = MARKER.replace_all(text, " ");
    let without_bullets = LEADING_BULLET.replace(&without_markers, "");
    let normalized: String = without_bullets
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
        .chars()
        .take(KEY_PREFIX_LEN)
        .collect();

    if normalized.is_empty() {
        short_hash(text)
    } else {
        normalized
    }
}

fn short_hash(text: &str) -> String {
    let digest = Sha256::digest(text.trim().as_bytes());
    format!("h{}", hex::encode(&digest[..4]))
}

/// Parse every task line of `text` into tasks ordered by first appearance.
///
/// Later lines with an already-seen key are ignored.
pub fn parse_tasks(text: &str) -> Vec<Task> {
    let mut seen = HashSet::new();
    let mut tasks = Vec::new();

    for parsed in text.lines().filter_map(parse_task_line) {
        if !seen.insert(parsed.key.clone()) {
            continue;
        }
        let order = tasks.len() as u32 + 1;
        tasks.push(Task::new(parsed.key, parsed.description, order).with_status(parsed.status));
    }

    tasks
}

/// Whether `text` contains at least one well-formed task line.
pub fn has_task_lines(text: &str) -> bool {
    text.lines().any(is_task_line)
}

/// Parse `text` into a plan, rejecting text without task lines.
pub fn parse_plan(text: &str) -> Result<Plan> {
    let tasks = parse_tasks(text);
    if tasks.is_empty() {
        return Err(OrchestratorError::InvalidPlanFormat(preview(text)));
    }
    Ok(Plan::new(tasks))
}

/// Keep only the task lines of `text`, rendered canonically.
pub fn clean_plan(text: &str) -> Result<String> {
    parse_plan(text).map(|plan| plan.to_markdown())
}

/// Decide whether planner output is a plan or a direct answer.
///
/// The reply marker wins over any checklist lines; output with neither
/// is treated as a direct answer.
pub fn classify_planner_output(text: &str) -> PlannerOutput {
    let trimmed = text.trim_start();
    if let Some(head) = trimmed.get(..DIRECT_REPLY_MARKER.len()) {
        if head.eq_ignore_ascii_case(DIRECT_REPLY_MARKER) {
            let answer = trimmed[DIRECT_REPLY_MARKER.len()..].trim();
            return PlannerOutput::DirectReply(answer.to_string());
        }
    }

    match parse_plan(text) {
        Ok(plan) => PlannerOutput::Plan(plan),
        Err(_) => PlannerOutput::DirectReply(text.trim().to_string()),
    }
}

fn preview(text: &str) -> String {
    let preview: String = text.trim().chars().take(80).collect();
    if preview.is_empty() {
        "<empty>".to_string()
    } else {
        preview
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_line_detection() {
        assert!(is_task_line("- [ ] 1. Search tickets"));
        assert!(is_task_line("  * [x] done thing"));
        assert!(is_task_line("+ [!] failed thing"));
        assert!(is_task_line("-[X] no space"));

        assert!(!is_task_line("1. Search tickets"));
        assert!(!is_task_line("- [ ]"));
        assert!(!is_task_line("- [?] unknown marker"));
        assert!(!is_task_line("[ ] missing bullet"));
        assert!(!is_task_line("## Plan"));
    }

    #[test]
    fn test_status_markers() {
        let open = parse_task_line("- [ ] 1. a").unwrap();
        let done = parse_task_line("- [x] 1. a").unwrap();
        let failed = parse_task_line("- [!] 1. a").unwrap();

        assert_eq!(open.status, TaskStatus::Pending);
        assert_eq!(done.status, TaskStatus::Completed);
        assert_eq!(failed.status, TaskStatus::Failed);
        assert_eq!(open.description, "1. a");
    }

    #[test]
    fn test_key_numeric_prefix() {
        assert_eq!(extract_task_key("- [ ] 1. Search tickets").as_deref(), Some("1"));
        assert_eq!(extract_task_key("- [x] 12) Reply").as_deref(), Some("12"));
        assert_eq!(extract_task_key("- [ ] 3: Check map").as_deref(), Some("3"));
        assert_eq!(extract_task_key("- [ ] 4、查询").as_deref(), Some("4"));
        assert_eq!(extract_task_key("- [ ] 05 - Padded").as_deref(), Some("5"));
    }

    #[test]
    fn test_key_task_reference() {
        assert_eq!(
            extract_task_key("- [ ] Task 7: look up route 66").as_deref(),
            Some("7")
        );
        assert_eq!(
            extract_task_key("- [x] finish task #3 for 2 users").as_deref(),
            Some("3")
        );
    }

    #[test]
    fn test_key_first_integer() {
        assert_eq!(
            extract_task_key("- [ ] Fetch the 20 most recent tickets").as_deref(),
            Some("20")
        );
    }

    #[test]
    fn test_key_text_fallback() {
        let key = extract_task_key("- [ ] Summarize   the FINDINGS").unwrap();
        assert_eq!(key, "summarize the findings");

        // Status marker does not change the key
        assert_eq!(
            extract_task_key("- [x] Summarize the findings").unwrap(),
            key
        );
    }

    #[test]
    fn test_key_text_fallback_truncates() {
        let long = format!("- [ ] {}", "word ".repeat(40));
        let key = extract_task_key(&long).unwrap();
        assert_eq!(key.chars().count(), KEY_PREFIX_LEN);
    }

    #[test]
    fn test_key_hash_fallback() {
        let key = extract_task_key("- [ ] [x]").unwrap();
        assert!(key.starts_with('h'));
        assert_eq!(key.len(), 9);
        assert_eq!(extract_task_key("- [ ] [x]").unwrap(), key);
        assert_ne!(extract_task_key("- [ ] [!]").unwrap(), key);

        // Status changes keep the key
        assert_eq!(extract_task_key("- [x] [x]").unwrap(), key);
        assert_eq!(extract_task_key("- [!] [x]").unwrap(), key);
    }

    #[test]
    fn test_marker_only_task_updates_in_place() {
        let existing = Plan::new(parse_tasks("- [ ] [x]"));
        let merged = crate::plan_merge::merge_plan(&existing, &parse_tasks("- [x] [x]"));

        assert_eq!(merged.plan.len(), 1);
        assert!(merged.added.is_empty());
        assert_eq!(merged.plan.tasks()[0].status, TaskStatus::Completed);
    }

    #[test]
    fn test_key_determinism() {
        let lines = [
            "- [ ] 1. Search tickets",
            "- [x] Task 2 draft reply",
            "- [!] call api 3 times",
            "- [ ] write summary",
        ];
        for line in lines {
            assert_eq!(extract_task_key(line), extract_task_key(line));
        }
    }

    #[test]
    fn test_not_a_task_line_has_no_key() {
        assert_eq!(extract_task_key("Just some prose"), None);
    }

    #[test]
    fn test_parse_tasks_order_and_dedupe() {
        let text = r#"
# Plan

Some intro text.

- [ ] 1. Search tickets
- [ ] 2. Draft reply
- [x] 1. Search tickets again
- [ ] 3. Send reply
"#;
        let tasks = parse_tasks(text);
        assert_eq!(tasks.len(), 3);
        assert_eq!(tasks[0].key, "1");
        assert_eq!(tasks[0].status, TaskStatus::Pending);
        assert_eq!(tasks[0].order, 1);
        assert_eq!(tasks[2].key, "3");
        assert_eq!(tasks[2].order, 3);
    }

    #[test]
    fn test_clean_plan_drops_prose() {
        let text = "Here is the plan:\n\n- [ ] 1. Search\n\nThen:\n* [x] 2. Reply\n";
        assert_eq!(clean_plan(text).unwrap(), "- [ ] 1. Search\n- [x] 2. Reply");
    }

    #[test]
    fn test_parse_plan_rejects_empty() {
        assert!(matches!(
            parse_plan(""),
            Err(OrchestratorError::InvalidPlanFormat(_))
        ));
        assert!(matches!(
            parse_plan("No tasks here.\n1. numbered but no marker"),
            Err(OrchestratorError::InvalidPlanFormat(_))
        ));
        assert!(!has_task_lines("plain text"));
        assert!(has_task_lines("text\n- [ ] 1. task"));
    }

    #[test]
    fn test_classify_plan() {
        match classify_planner_output("- [ ] 1. Look up\n- [ ] 2. Answer") {
            PlannerOutput::Plan(plan) => assert_eq!(plan.len(), 2),
            other => panic!("Expected plan, got {:?}", other),
        }
    }

    #[test]
    fn test_classify_direct_reply_marker() {
        let out = classify_planner_output("  [direct_reply] Hello there!\n- [ ] 1. ignored");
        assert_eq!(
            out,
            PlannerOutput::DirectReply("Hello there!\n- [ ] 1. ignored".to_string())
        );
    }

    #[test]
    fn test_classify_no_checklist_is_direct_reply() {
        assert_eq!(
            classify_planner_output("Paris is the capital of France.\n"),
            PlannerOutput::DirectReply("Paris is the capital of France.".to_string())
        );
    }
}

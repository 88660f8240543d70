use taskflow_core::{ChatMessage, Plan, Role, Task};

use crate::plan_parser::DIRECT_REPLY_MARKER;

pub struct PhasePrompts;

impl PhasePrompts {
    pub fn planner_system() -> String {
        format!(
            r#"You are the planner of a task-driven assistant. Decide how to handle the user's request.

## Option 1: Plan
If the request needs several steps, tools or lookups, answer with a checklist only:

- [ ] 1. First step
- [ ] 2. Second step

Rules:
1. One task per line, each starting with `- [ ]`
2. Number the tasks in execution order
3. Keep each task small enough for a single focused step
4. Do not add prose around the checklist

## Option 2: Direct reply
If the request can be answered right away (greetings, simple questions), start your
answer with `{marker}` followed by the reply itself. Do not write a checklist."#,
            marker = DIRECT_REPLY_MARKER
        )
    }

    pub fn planner(query: &str, history: &[ChatMessage]) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(Self::planner_system()));
        messages.extend(history.iter().cloned());
        messages.push(ChatMessage::user(query));
        messages
    }

    /// `history` carries earlier conversation and the results of finished steps.
    pub fn executor(
        query: &str,
        task: &Task,
        plan: &Plan,
        history: &[ChatMessage],
    ) -> Vec<ChatMessage> {
        let system = r#"You are the executor of a task-driven assistant. Work on exactly one task of the plan.

## Instructions
1. Use the available tools when the task needs external data or actions
2. Build on the results of earlier tasks instead of repeating them
3. Report what you did and what you found
4. If something failed, say so plainly and include the error"#;

        let user = format!(
            r#"## User Request
{query}

## Plan
{plan}

## Current Task
{task}

Complete the current task now."#,
            query = query,
            plan = plan.to_markdown(),
            task = task.description
        );

        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(system));
        messages.extend(history.iter().cloned());
        messages.push(ChatMessage::user(user));
        messages
    }

    pub fn updater(plan: &Plan, task: &Task, step: &[ChatMessage]) -> Vec<ChatMessage> {
        let system = r#"You maintain the checklist of a task-driven assistant. Update it after each executed step.

## Rules
1. Return the full checklist and nothing else
2. Mark the current task `[x]` when the step achieved it, `[!]` when it cannot be done
3. Never reopen or change finished tasks
4. Add new tasks at the end only when the step revealed missing work
5. Keep the wording and numbering of existing tasks"#;

        let user = format!(
            r#"## Current Plan
{plan}

## Current Task
{task}

## Step Transcript
{transcript}

Return the updated checklist."#,
            plan = plan.to_markdown(),
            task = task.to_checklist_line(),
            transcript = Self::transcript(step)
        );

        vec![ChatMessage::system(system), ChatMessage::user(user)]
    }

    pub fn summarizer(query: &str, plan: &Plan, history: &[ChatMessage]) -> Vec<ChatMessage> {
        let system = r#"You write the final answer of a task-driven assistant. Summarize the outcome for the user.

## Instructions
1. Answer the user's request directly
2. Mention tasks that failed and what that means for the user
3. Do not show the checklist itself"#;

        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(system));
        messages.extend(history.iter().cloned());
        messages.push(ChatMessage::user(format!(
            r#"## User Request
{query}

## Final Plan
{plan}

Write the answer now."#,
            query = query,
            plan = plan.to_markdown()
        )));
        messages
    }

    /// Render a step's messages as plain text for the updater.
    fn transcript(step: &[ChatMessage]) -> String {
        if step.is_empty() {
            return "(no output)".to_string();
        }

        step.iter()
            .map(|m| match m.role {
                Role::Tool => {
                    let name = m.name.as_deref().unwrap_or("tool");
                    if m.is_error {
                        format!("[tool {} error] {}", name, m.content)
                    } else {
                        format!("[tool {}] {}", name, m.content)
                    }
                }
                _ if m.has_tool_calls() => {
                    let names: Vec<_> = m.tool_calls.iter().map(|c| c.name.as_str()).collect();
                    format!("[{}] calls {}", m.role.as_str(), names.join(", "))
                }
                _ => format!("[{}] {}", m.role.as_str(), m.content),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

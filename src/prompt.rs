//! Lesson context and the trainer persona prompt.

use serde::{Deserialize, Serialize};

/// The lesson the learner is currently working on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptContext {
    pub title: String,
    pub objective: String,
}

impl PromptContext {
    pub fn new(title: impl Into<String>, objective: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            objective: objective.into(),
        }
    }

    pub fn task_type(&self) -> TaskType {
        TaskType::classify(&self.title, &self.objective)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskType {
    Reading,
    Writing,
    Speaking,
    Listening,
    General,
}

impl TaskType {
    /// First keyword hit in title or objective wins, checked in this order.
    pub fn classify(title: &str, objective: &str) -> Self {
        let title = title.to_lowercase();
        let objective = objective.to_lowercase();
        let hit = |kw: &str| title.contains(kw) || objective.contains(kw);

        if hit("reading") {
            TaskType::Reading
        } else if hit("writing") {
            TaskType::Writing
        } else if hit("speaking") {
            TaskType::Speaking
        } else if hit("listening") {
            TaskType::Listening
        } else {
            TaskType::General
        }
    }

    /// Voice practice only makes sense outside the reading/writing workspaces.
    pub fn supports_voice(self) -> bool {
        !matches!(self, TaskType::Reading | TaskType::Writing)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskType::Reading => "reading",
            TaskType::Writing => "writing",
            TaskType::Speaking => "speaking",
            TaskType::Listening => "listening",
            TaskType::General => "general",
        }
    }
}

pub fn system_prompt(ctx: &PromptContext) -> String {
    format!(
        r#"
You are the "Premium TOEFL iBT 2026 Senior Trainer".
Current Week Focus: {title}
Objective: {objective}

Philosophy:
1. Internal clarity -> linguistic clarity -> reliable performance.
2. It's about thinking in English, not just templates.
3. Use the "Point -> Reason -> Example" framework.
4. Encourage psychological safety.
5. Focus on organization and clarity over complexity.

CRITICAL FORMATTING RULE:
- ALWAYS respond in PLAIN TEXT only.
- DO NOT use Markdown symbols like asterisks (**), hashtags (#), underscores (_), or backticks (`).
- If you need to emphasize something, use CAPITAL LETTERS sparingly or simply use clear, direct language.
- Use simple line breaks (one or two enters) to separate ideas.
- NO BULLET POINT SYMBOLS unless they are simple dashes (-).
- The goal is a clean, conversational look.

If you are in Voice mode, keep your responses extra concise and natural.
"#,
        title = ctx.title,
        objective = ctx.objective,
    )
}

/// First coach message shown when a lesson session opens.
pub fn welcome_message(phase_id: u32, week_id: u32, ctx: &PromptContext) -> String {
    format!(
        "Welcome to Phase {}, Week {}: {}. Let's focus on {}. I'm ready to begin the training whenever you are.",
        phase_id, week_id, ctx.title, ctx.objective
    )
}

/// Strip the markdown the model sometimes emits despite the prompt.
pub fn clean_text(text: &str) -> String {
    let mut out = text.replace("**", "").replace('*', "");

    // "##" and longer runs of '#'; a lone '#' stays
    let mut stripped = String::with_capacity(out.len());
    let mut chars = out.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '#' {
            let mut run = 1;
            while chars.peek() == Some(&'#') {
                chars.next();
                run += 1;
            }
            if run == 1 {
                stripped.push('#');
            }
        } else {
            stripped.push(c);
        }
    }
    out = stripped;

    out.replace("__", "").replace('`', "").trim().to_string()
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

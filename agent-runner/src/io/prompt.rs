//! Task brief rendered for the agent.

use anyhow::{Context, Result};
use minijinja::{Environment, context};

use crate::core::types::Mode;

const BRIEF_TEMPLATE: &str = include_str!("prompts/brief.md");

/// Inputs for one brief.
#[derive(Debug, Clone, Default)]
pub struct PromptInputs {
    pub task: String,
    pub mode: Mode,
    pub notes: Option<String>,
    /// `git diff` payload, embedded only in review mode.
    pub review_diff: Option<String>,
}

/// Renders briefs from the embedded template.
pub struct PromptBuilder {
    env: Environment<'static>,
    test_command: String,
}

impl PromptBuilder {
    pub fn new(test_command: impl Into<String>) -> Result<Self> {
        let mut env = Environment::new();
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        env.add_template("brief", BRIEF_TEMPLATE)
            .context("load brief template")?;
        Ok(Self {
            env,
            test_command: test_command.into(),
        })
    }

    /// Deterministic brief for `input`; the text always ends with a newline.
    pub fn build(&self, input: &PromptInputs) -> Result<String> {
        let review = input.mode == Mode::Review;
        let diff = if review {
            non_empty(input.review_diff.as_deref()).map(str::trim_end)
        } else {
            None
        };
        let template = self.env.get_template("brief")?;
        let mut rendered = template
            .render(context! {
                task => input.task.trim(),
                test_command => self.test_command.trim(),
                review => review,
                diff => diff,
                notes => non_empty(input.notes.as_deref()).map(str::trim),
            })
            .context("render brief")?;
        if !rendered.ends_with('\n') {
            rendered.push('\n');
        }
        Ok(rendered)
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|s| !s.trim().is_empty())
}

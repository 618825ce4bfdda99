//! The closed set of agent CLIs the runner knows how to drive.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::naming::shell_escape;
use crate::core::types::Mode;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Codex,
    Claude,
    Gemini,
}

impl Provider {
    /// Default fallback order.
    pub const ALL: [Provider; 3] = [Provider::Codex, Provider::Claude, Provider::Gemini];

    pub fn name(self) -> &'static str {
        match self {
            Provider::Codex => "codex",
            Provider::Claude => "claude",
            Provider::Gemini => "gemini",
        }
    }

    /// Executable looked up on the search path.
    pub fn binary(self) -> &'static str {
        self.name()
    }

    /// Build the argv for one run. The prompt is always the final argument.
    pub fn invocation(self, prompt: &str, mode: Mode) -> Invocation {
        let args: Vec<&str> = match (self, mode) {
            // Worktrees write into the main repo's .git/worktrees/, which the
            // workspace-write sandbox blocks.
            (Provider::Codex, Mode::Implement) => vec![
                "--ask-for-approval",
                "never",
                "--sandbox",
                "danger-full-access",
                "exec",
            ],
            (Provider::Codex, Mode::Review) => {
                vec!["--ask-for-approval", "never", "--sandbox", "read-only", "exec"]
            }
            (Provider::Claude, Mode::Implement) => Vec::new(),
            (Provider::Claude, Mode::Review) => vec!["--permission-mode", "plan"],
            (Provider::Gemini, _) => vec!["-p"],
        };
        let mut args: Vec<String> = args.into_iter().map(str::to_string).collect();
        args.push(prompt.to_string());
        Invocation {
            program: self.binary().to_string(),
            args,
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A provider command ready to hand to the shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
}

impl Invocation {
    /// Single shell command line with every argument escaped.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .map(shell_escape)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

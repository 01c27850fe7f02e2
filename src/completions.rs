//! Shell completion generation.

use clap::{CommandFactory, ValueEnum};
use clap_complete::{generate, Shell};
use std::io::Write;

/// Supported shells for completion generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

impl From<CompletionShell> for Shell {
    fn from(shell: CompletionShell) -> Self {
        match shell {
            CompletionShell::Bash => Shell::Bash,
            CompletionShell::Zsh => Shell::Zsh,
            CompletionShell::Fish => Shell::Fish,
            CompletionShell::PowerShell => Shell::PowerShell,
            CompletionShell::Elvish => Shell::Elvish,
        }
    }
}

/// Write the completion script for `C` to `out`.
pub fn write_completions<C: CommandFactory>(
    shell: CompletionShell,
    bin_name: &str,
    out: &mut dyn Write,
) {
    let mut cmd = C::command();
    generate(Shell::from(shell), &mut cmd, bin_name, out);
}

/// Generate shell completions on stdout.
pub fn generate_completions<C: CommandFactory>(shell: CompletionShell, bin_name: &str) {
    write_completions::<C>(shell, bin_name, &mut std::io::stdout());
}

//! Per-agent command composition (§4.4 step 6): resolves the agent's
//! capability record, its model, an optional persona file, and the
//! `NTM_SPAWN_*` environment the spawned process can read back, into the
//! single shell command line written to the pane.

use std::path::Path;

use ntm_core::agent_type::capability_for;
use ntm_core::types::FlatAgent;

/// Single-quote `s` for POSIX shell, escaping embedded single quotes the
/// usual `'\''` way.
fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

/// Build the full shell command line for one pane: `cd` into its working
/// directory (a worktree path or the project root), set the spawn-tracking
/// env vars, then exec the agent binary with its default interactive-REPL
/// args. The user's prompt is never part of this command — it's delivered
/// once the pane is up via `sendKeys` (§4.4 step 8.4), not baked into argv.
pub fn build_command(
    agent: &FlatAgent,
    batch_id: &str,
    order: u32,
    stagger_delay_ms: u64,
    working_dir: &Path,
    persona_file: Option<&Path>,
) -> String {
    let capability = capability_for(&agent.agent_type);
    let model = agent.model_alias.as_deref().unwrap_or_else(|| capability.default_model());

    let mut args: Vec<String> = Vec::new();
    args.push(format!("cd {} &&", shell_quote(&working_dir.display().to_string())));
    args.push(format!("NTM_SPAWN_BATCH={}", shell_quote(batch_id)));
    args.push(format!("NTM_SPAWN_ORDER={order}"));
    args.push(format!("NTM_SPAWN_STAGGER_DELAY_MS={stagger_delay_ms}"));
    if let Some(persona) = persona_file {
        args.push(format!("NTM_SPAWN_PERSONA_FILE={}", shell_quote(&persona.display().to_string())));
    }
    args.push(shell_quote(capability.binary_name()));
    args.push("--model".to_string());
    args.push(shell_quote(model));
    for a in capability.default_args() {
        args.push(shell_quote(&a));
    }

    args.join(" ")
}

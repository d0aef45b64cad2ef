//! Log replay into a collection.
//!
//! Commands are applied in log order through the same in-memory paths live
//! mutations use, without logging them again. Afterwards the row-id counter
//! sits above every id the log mentions and the auto-increment counter above
//! every `auto()` value seen.

use crate::collection::State;
use crate::defaults::{Defaults, AUTO_TOKEN};
use serde_json::Value;
use std::path::Path;
use stratadoc_core::{merge_patch, Command, CommandOp, Error, PatchChange, Result};
use stratadoc_durability::{replay, LogConfig, ReplaySummary};
use tracing::{debug, warn};

/// Replay the log at `path` into `state`.
///
/// # Errors
///
/// [`Error::Corruption`] when the log is damaged or a well-formed command
/// cannot be applied. In the latter case the offset is unknown and reported
/// as 0.
pub(crate) fn replay_into(state: &mut State, path: &Path, config: &LogConfig) -> Result<ReplaySummary> {
    let mut commands = replay(path, config)?;
    let mut record = 0u64;
    for command in &mut commands {
        let command = command?;
        apply(state, command).map_err(|e| Error::Corruption {
            record,
            offset: 0,
            reason: format!("command cannot be applied: {}", e),
        })?;
        record += 1;
    }
    let summary = commands.finish()?;
    debug!(target: "stratadoc::recovery", path = %path.display(), records = summary.records,
        next_row = %state.next_row, auto_counter = state.auto_counter, "Log replayed");
    Ok(summary)
}

/// Apply one replayed command to `state`.
pub(crate) fn apply(state: &mut State, command: Command) -> Result<()> {
    match command.op {
        CommandOp::Insert { row, document } => {
            let mut auto = state.auto_counter;
            observe_auto(&state.defaults, &document, &mut auto);
            state.auto_counter = auto;
            state.insert_row(row, document)?;
        }
        CommandOp::Remove { row } => {
            state.remove_row(row)?;
        }
        CommandOp::Patch { row, change } => {
            let target = state.row(row)?;
            let old = target.document()?;
            let new = match change {
                PatchChange::Diff(diff) => {
                    let mut new = (*old).clone();
                    merge_patch(&mut new, &diff);
                    new
                }
                PatchChange::Replace(document) => document,
            };
            state.replace_document(&target, &old, new)?;
        }
        CommandOp::CreateIndex { name, options } => {
            state.add_index(&name, options)?;
        }
        CommandOp::DropIndex { name } => {
            state.remove_index(&name)?;
        }
        CommandOp::SetDefaults { defaults } => {
            state.defaults = Defaults::new(defaults);
        }
        CommandOp::Counters {
            next_row,
            auto_counter,
        } => {
            // Written after the rows it covers: the recorded auto value is
            // exact even if a patched row holds a larger one
            state.next_row = state.next_row.max(next_row);
            state.auto_counter = auto_counter;
        }
    }
    Ok(())
}

fn observe_auto(defaults: &Defaults, document: &Value, auto: &mut u64) {
    defaults.observe(document, auto);
    for (name, token) in defaults.spec() {
        if token.as_str() != Some(AUTO_TOKEN) {
            continue;
        }
        if let Some(value) = document.get(name).filter(|v| v.as_u64().is_none()) {
            warn!(target: "stratadoc::recovery", field = %name, value = %value,
                "Replayed auto() field does not hold a counter value");
        }
    }
}

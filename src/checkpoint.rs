//! JSON snapshots of the full evaluation state.
//!
//! A checkpoint is a flat object with four nullable keys: `cells` (one sigil
//! character per cell), `words` (payload table entries), `apply_stack` (work
//! stack with `-1` standing for the apply marker) and `result_stack`. Native
//! handles are stored by registered name so a snapshot survives process
//! restarts where handles are assigned in a different order.
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::{EngineState, WorkItem};
use crate::error::EvalError;
use crate::store::Tag;
use crate::term::{self, Shape};

pub const APPLY_SENTINEL: i64 = -1;

#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown sigil `{0}` in cells string")]
    BadSigil(char),
    #[error("word entry targets unwritten cell {0}")]
    BadWordIndex(usize),
    #[error("invalid stack entry {0}")]
    BadStackEntry(i64),
    #[error(transparent)]
    Eval(#[from] EvalError),
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    #[serde(default)]
    cells: Option<String>,
    #[serde(default)]
    words: Option<Vec<WordEntry>>,
    #[serde(default)]
    apply_stack: Option<Vec<i64>>,
    #[serde(default)]
    result_stack: Option<Vec<i64>>,
}

#[derive(Serialize, Deserialize)]
struct WordEntry {
    index: usize,
    payload: WordValue,
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum WordValue {
    Offset(i64),
    Native(String),
}

/// Serialize the engine state. Native payloads require their handles to be
/// registered, so they can be written by name.
pub fn dump(state: &EngineState) -> Result<String, CheckpointError> {
    let cells = match state.cells.max_written() {
        Some(max) => (0..=max)
            .map(|i| state.cells.get(i).unwrap_or(Tag::Nil).sigil())
            .collect(),
        None => String::new(),
    };

    let mut words = Vec::new();
    let mut entries: Vec<(usize, i64)> = state.cells.payload_entries().collect();
    entries.sort_unstable_by_key(|&(index, _)| index);
    for (index, value) in entries {
        let payload = match term::shape_of(&state.cells, index)? {
            Shape::Native(handle) => {
                let name = state
                    .native_name(handle)
                    .ok_or_else(|| EvalError::UnknownNative(format!("handle {handle}")))?;
                WordValue::Native(name.to_string())
            }
            _ => WordValue::Offset(value),
        };
        words.push(WordEntry { index, payload });
    }

    let apply_stack = state
        .work_stack()
        .iter()
        .map(|item| match item {
            WorkItem::Apply => APPLY_SENTINEL,
            WorkItem::Term(i) => *i as i64,
        })
        .collect();
    let result_stack = state.result_stack().iter().map(|&i| i as i64).collect();

    let snapshot = Snapshot {
        cells: Some(cells),
        words: Some(words),
        apply_stack: Some(apply_stack),
        result_stack: Some(result_stack),
    };
    Ok(serde_json::to_string_pretty(&snapshot)?)
}

/// Load a snapshot into `state`. Natives referenced by name must already be
/// registered. Missing (null) keys leave the corresponding component
/// untouched.
pub fn load(state: &mut EngineState, json: &str) -> Result<(), CheckpointError> {
    let snapshot: Snapshot = serde_json::from_str(json)?;

    if let Some(cells) = &snapshot.cells {
        for (i, c) in cells.chars().enumerate() {
            let tag = Tag::from_sigil(c).ok_or(CheckpointError::BadSigil(c))?;
            state.cells.set(i, tag)?;
        }
    }

    if let Some(words) = snapshot.words {
        for entry in words {
            if !state.cells.is_written(entry.index) {
                return Err(CheckpointError::BadWordIndex(entry.index));
            }
            let value = match entry.payload {
                WordValue::Offset(offset) => offset,
                WordValue::Native(name) => state
                    .native_handle(&name)
                    .ok_or(EvalError::UnknownNative(name))?,
            };
            state.cells.set_payload(entry.index, value)?;
        }
        // references may point forward, so chains are only checkable once
        // every payload is in place
        let mut refs: Vec<usize> = state
            .cells
            .payload_entries()
            .map(|(index, _)| index)
            .collect();
        refs.sort_unstable();
        for index in refs {
            if matches!(term::shape_of(&state.cells, index)?, Shape::Reference(_)) {
                term::resolve(&state.cells, index)?;
            }
        }
    }

    if let Some(apply_stack) = snapshot.apply_stack {
        state.work.clear();
        for entry in apply_stack {
            if entry == APPLY_SENTINEL {
                state.work.push(WorkItem::Apply);
            } else if entry >= 0 {
                state.work.push(WorkItem::Term(entry as usize));
            } else {
                return Err(CheckpointError::BadStackEntry(entry));
            }
        }
    }

    if let Some(result_stack) = snapshot.result_stack {
        state.results.clear();
        for entry in result_stack {
            if entry < 0 {
                return Err(CheckpointError::BadStackEntry(entry));
            }
            state.results.push(entry as usize);
        }
    }

    Ok(())
}

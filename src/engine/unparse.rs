//! Debug rendering of terms and whole engine states.
use std::fmt::Write;

use crate::engine::{EngineState, WorkItem};
use crate::error::Result;
use crate::store::CellStore;
use crate::term::{self, Shape};

const RENDER_MAX_DEPTH: usize = 64;

/// Compact sigil rendering of the tree rooted at `index`, references
/// followed. Falls back to a placeholder on malformed input; this is a
/// diagnostic aid, not an encoder.
pub fn render_term(store: &CellStore, index: usize) -> String {
    match render(store, index, 0) {
        Ok(text) => text,
        Err(_) => format!("<invalid @{index}>"),
    }
}

fn render(store: &CellStore, index: usize, depth: usize) -> Result<String> {
    if depth > RENDER_MAX_DEPTH {
        return Ok("...".to_string());
    }
    let index = term::resolve(store, index)?;
    Ok(match term::shape_of(store, index)? {
        Shape::Empty => "*".to_string(),
        Shape::Leaf => "^**".to_string(),
        Shape::Native(handle) => format!("<native:{handle}>"),
        Shape::Reference(_) => "...".to_string(),
        Shape::Composite => {
            let left = render(store, term::left_child(store, index)?, depth + 1)?;
            let right = render(store, term::right_child(store, index)?, depth + 1)?;
            format!("^{left}{right}")
        }
    })
}

/// Columnar dump of the written cell window plus both stacks: one row of
/// indices, one of sigils, one of payload offsets.
pub fn render_state(state: &EngineState) -> String {
    let mut out = String::new();
    if let Some(max) = state.cells.max_written() {
        let mut idx_line = String::from("  idx:");
        let mut cell_line = String::from(" cell:");
        let mut word_line = String::from(" word:");
        for i in 0..=max {
            let _ = write!(idx_line, " {i:>5}");
            let sigil = state.cells.get(i).map(|t| t.sigil()).unwrap_or('.');
            let _ = write!(cell_line, " {sigil:>5}");
            match state.cells.payload(i) {
                Some(p) => {
                    let _ = write!(word_line, " {p:>+5}");
                }
                None => word_line.push_str("      "),
            }
        }
        out.push_str(&idx_line);
        out.push('\n');
        out.push_str(&cell_line);
        out.push('\n');
        out.push_str(&word_line);
        out.push('\n');
    }
    let work: Vec<i64> = state
        .work
        .iter()
        .map(|item| match item {
            WorkItem::Apply => -1,
            WorkItem::Term(i) => *i as i64,
        })
        .collect();
    let _ = writeln!(out, "apply_stack: {work:?}");
    let _ = writeln!(out, "result_stack: {:?}", state.results);
    out
}

//! Whitespace-token text encoding of cell programs.
use thiserror::Error;

use crate::error::EvalError;
use crate::store::{CellStore, Tag};

#[derive(Error, Debug, PartialEq)]
pub enum ParseError {
    #[error("unexpected character `{0}` in token `{1}`")]
    UnexpectedChar(char, String),
    #[error("bad payload token `{0}`")]
    BadPayload(String),
    #[error("payload token `{0}` does not follow a reference cell")]
    DanglingPayload(String),
    #[error(transparent)]
    Eval(#[from] EvalError),
}

/// Parse whitespace-separated sigil tokens into cells starting at `base`.
/// Returns the number of cells written.
///
/// Each `*`, `^` or `#` character writes one cell. A token ending in `#` may
/// be followed by a payload token: a signed integer stored as a relative
/// offset, or `!n` naming an absolute cell index (stored relative to the
/// reference cell).
pub fn parse_text(store: &mut CellStore, base: usize, text: &str) -> Result<usize, ParseError> {
    let mut next = base;
    // reference cell awaiting a payload token
    let mut pending_ref: Option<usize> = None;
    for token in text.split_whitespace() {
        let first = token.chars().next().unwrap_or(' ');
        if first == '!' || first == '-' || first.is_ascii_digit() {
            let at = pending_ref
                .take()
                .ok_or_else(|| ParseError::DanglingPayload(token.to_string()))?;
            let value = if let Some(abs) = token.strip_prefix('!') {
                let target: i64 = abs
                    .parse()
                    .map_err(|_| ParseError::BadPayload(token.to_string()))?;
                target - at as i64
            } else {
                token
                    .parse()
                    .map_err(|_| ParseError::BadPayload(token.to_string()))?
            };
            store.set_payload(at, value)?;
            continue;
        }
        pending_ref = None;
        for c in token.chars() {
            let tag = Tag::from_sigil(c)
                .ok_or_else(|| ParseError::UnexpectedChar(c, token.to_string()))?;
            store.set(next, tag)?;
            if tag == Tag::Ref {
                pending_ref = Some(next);
            }
            next += 1;
        }
        // only a trailing `#` can take a payload token
        if !token.ends_with('#') {
            pending_ref = None;
        }
    }
    Ok(next - base)
}

/// Encode the written cells of `range` back to text, one token per cell plus
/// a payload token after each reference cell that carries one.
pub fn encode_text(store: &CellStore, range: std::ops::Range<usize>) -> Result<String, EvalError> {
    let mut out = String::new();
    for i in range {
        let tag = store.get(i).ok_or(EvalError::InvalidCell(i))?;
        if !out.is_empty() {
            out.push(' ');
        }
        out.push(tag.sigil());
        if tag == Tag::Ref {
            if let Some(payload) = store.payload(i) {
                out.push(' ');
                out.push_str(&payload.to_string());
            }
        }
    }
    Ok(out)
}

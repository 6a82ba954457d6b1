//! Term navigation over the packed store.
//!
//! A term is a preorder run of cells. Navigation never builds a boxed tree;
//! children are located by scanning tags. Reference cells come in three
//! layouts: a standalone 3-cell group `# * *`, a native handle `# # *`, and a
//! bare payload-carrying `#` written inline inside a larger term.
use smallvec::SmallVec;

use crate::error::{EvalError, Result};
use crate::store::{CellStore, Tag};

/// What a cell index denotes, derived from its tag and the two tags after it.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Shape {
    /// Written `*` cell: the empty slot.
    Empty,
    /// `^ * *` - the bare tree constructor.
    Leaf,
    /// `#` with a signed relative offset payload.
    Reference(i64),
    /// `# # *` with a native-function handle payload.
    Native(i64),
    /// `^` followed by at least one non-empty child.
    Composite,
}

/// Tags past the root of a term may lie beyond the written region; they read
/// as empty there.
fn tag_or_nil(store: &CellStore, index: usize) -> Tag {
    store.get(index).unwrap_or(Tag::Nil)
}

pub fn shape_of(store: &CellStore, index: usize) -> Result<Shape> {
    let root = store.get(index).ok_or(EvalError::InvalidCell(index))?;
    let left = tag_or_nil(store, index + 1);
    let right = tag_or_nil(store, index + 2);
    match root {
        Tag::Nil => Ok(Shape::Empty),
        Tag::Tree => {
            if left == Tag::Nil && right == Tag::Nil {
                Ok(Shape::Leaf)
            } else {
                Ok(Shape::Composite)
            }
        }
        Tag::Ref => {
            let payload = store.payload(index).ok_or(EvalError::InvalidCell(index))?;
            if left == Tag::Ref && right == Tag::Nil {
                Ok(Shape::Native(payload))
            } else {
                Ok(Shape::Reference(payload))
            }
        }
    }
}

/// Resolve a reference cell to its target, at most one level deep.
///
/// Non-reference cells resolve to themselves. A reference whose target is
/// itself a reference is rejected: references are second-class and never
/// chain.
pub fn resolve(store: &CellStore, index: usize) -> Result<usize> {
    match shape_of(store, index)? {
        Shape::Reference(offset) => {
            let target = index as i64 + offset;
            if target < 0 {
                return Err(EvalError::InvalidCell(index));
            }
            let target = target as usize;
            if matches!(shape_of(store, target)?, Shape::Reference(_)) {
                return Err(EvalError::RefToRef { from: index, to: target });
            }
            Ok(target)
        }
        _ => Ok(index),
    }
}

/// Index of the left child of the composite at `index`, references resolved.
/// Non-composite roots are their own left child.
pub fn left_child(store: &CellStore, index: usize) -> Result<usize> {
    if store.get(index) != Some(Tag::Tree) {
        return Ok(index);
    }
    resolve(store, index + 1)
}

/// Index of the right child of the composite at `index`, references resolved.
///
/// The right child starts where the left subtree ends, so this scans the left
/// subtree bottom-up: tags are shifted onto a scratch stack and any completed
/// group (two closing tags under an opener) reduces to a single empty marker.
/// The scan is done when the whole left subtree has reduced to one marker.
pub fn right_child(store: &CellStore, index: usize) -> Result<usize> {
    if store.get(index) != Some(Tag::Tree) {
        return Ok(index);
    }
    let mut cur = index + 1;
    let first = store.get(cur).ok_or(EvalError::InvalidCell(cur))?;
    if first == Tag::Ref {
        // A leading reference is a complete subtree on its own: three cells
        // for the standalone and native layouts, one cell inline otherwise.
        let group = (tag_or_nil(store, cur + 1), tag_or_nil(store, cur + 2));
        let boundary = match group {
            (Tag::Nil, Tag::Nil) | (Tag::Ref, Tag::Nil) => cur + 3,
            _ => cur + 1,
        };
        return resolve(store, boundary);
    }

    let mut scratch: SmallVec<[Tag; 32]> = SmallVec::new();
    loop {
        if scratch.len() == 1 && scratch[0] == Tag::Nil {
            break;
        }
        if scratch.len() >= 3 {
            let rhs = scratch[scratch.len() - 1];
            let lhs = scratch[scratch.len() - 2];
            let closes = matches!(
                (lhs, rhs),
                (Tag::Nil, Tag::Nil) | (Tag::Ref, Tag::Nil) | (Tag::Ref, Tag::Ref)
            );
            if closes {
                scratch.truncate(scratch.len() - 3);
                scratch.push(Tag::Nil);
                continue;
            }
        }
        let cell = store.get(cur).ok_or(EvalError::InvalidCell(cur))?;
        scratch.push(cell);
        cur += 1;
    }
    resolve(store, cur)
}

/// Terminals never decompose further during application.
pub fn is_terminal(store: &CellStore, index: usize) -> bool {
    matches!(
        shape_of(store, index),
        Ok(Shape::Leaf | Shape::Reference(_) | Shape::Native(_))
    )
}

/// Structural equality of two trees, following references on both sides.
pub fn trees_equal(a: &CellStore, ia: usize, b: &CellStore, ib: usize) -> Result<bool> {
    let ia = resolve(a, ia)?;
    let ib = resolve(b, ib)?;
    match (shape_of(a, ia)?, shape_of(b, ib)?) {
        (Shape::Empty, Shape::Empty) | (Shape::Leaf, Shape::Leaf) => Ok(true),
        (Shape::Native(m), Shape::Native(n)) => Ok(m == n),
        (Shape::Composite, Shape::Composite) => {
            if !trees_equal(a, left_child(a, ia)?, b, left_child(b, ib)?)? {
                return Ok(false);
            }
            trees_equal(a, right_child(a, ia)?, b, right_child(b, ib)?)
        }
        _ => Ok(false),
    }
}

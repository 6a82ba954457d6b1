//! tricell - graph reduction for the tree calculus over a packed cell store.
//!
//! Terms are preorder runs of 2-bit tagged cells; evaluation is two explicit
//! stacks and five rewrite rules plus native-function dispatch. State can be
//! round-tripped through a whitespace text encoding ([`program`]) or a JSON
//! checkpoint ([`checkpoint`]).
pub mod checkpoint;
pub mod engine;
pub mod error;
pub mod program;
pub mod store;
pub mod term;

pub use engine::native::{load_standard_natives, NativeFn};
pub use engine::{EngineState, Rule, Step, WorkItem};
pub use error::EvalError;
pub use store::{CellStore, Tag};
pub use term::Shape;

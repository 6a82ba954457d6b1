use crate::engine::{EngineState, Rule, Step, WorkItem};
use crate::error::EvalError;
use crate::program::parse_text;
use crate::store::Tag;
use crate::term::{self, Shape};

fn engine_of(text: &str) -> EngineState {
    let mut state = EngineState::new();
    parse_text(&mut state.cells, 0, text).unwrap();
    state
}

#[test]
fn test_step_on_empty_work_stack_is_done() {
    let mut state = engine_of("^**");
    assert_eq!(state.step().unwrap(), Step::Done);
    assert_eq!(state.step().unwrap(), Step::Done, "done must be idempotent");
}

#[test]
fn test_flatten_without_marker_is_done() {
    let mut state = engine_of("^** ^**");
    state.push_term(0);
    state.push_term(3);
    assert_eq!(state.step().unwrap(), Step::Done);
    assert_eq!(state.result_stack(), &[3, 0]);
}

#[test]
fn test_leaf_applied_materializes_stem() {
    // ^** applied to ^** builds the 5-cell one-argument partial
    let mut state = engine_of("^** ^**");
    let occupied = state.cells.occupied();
    state.push_application(0, &[3]);
    assert_eq!(state.step().unwrap(), Step::Stepped);
    assert_eq!(state.last_rule(), Some(Rule::AppStem));
    assert_eq!(state.cells.occupied() - occupied, 5, "one region of 5 cells");
    let base = match state.work_stack() {
        [WorkItem::Term(base)] => *base,
        other => panic!("unexpected work stack {other:?}"),
    };
    assert_eq!(state.cells.get(base), Some(Tag::Tree));
    assert_eq!(state.cells.get(base + 1), Some(Tag::Ref));
    // the stored reference leads back to the argument
    assert_eq!(term::left_child(&state.cells, base).unwrap(), 3);
    assert_eq!(
        term::shape_of(&state.cells, base).unwrap(),
        Shape::Composite
    );
}

#[test]
fn test_stem_applied_materializes_fork() {
    // ^^*** (stem of leaf) applied to ^** builds the 7-cell partial
    let mut state = engine_of("^^*** ^**");
    let occupied = state.cells.occupied();
    state.push_application(0, &[5]);
    assert_eq!(state.step().unwrap(), Step::Stepped);
    assert_eq!(state.last_rule(), Some(Rule::AppFork));
    assert_eq!(state.cells.occupied() - occupied, 7);
    let base = match state.work_stack() {
        [WorkItem::Term(base)] => *base,
        other => panic!("unexpected work stack {other:?}"),
    };
    // both reference cells carry their own offsets
    assert_eq!(term::left_child(&state.cells, base).unwrap(), 1);
    let second_ref = base + 4;
    assert_eq!(state.cells.get(second_ref), Some(Tag::Ref));
    assert_eq!(term::resolve(&state.cells, second_ref).unwrap(), 5);
}

#[test]
fn test_selection_rule_returns_second_branch() {
    // fork-of-leaves applied to a leaf selects the right branch in one step
    let mut state = engine_of("^^**^** ^**");
    let occupied = state.cells.occupied();
    state.push_application(0, &[7]);
    assert_eq!(state.step().unwrap(), Step::Stepped);
    assert_eq!(state.last_rule(), Some(Rule::K));
    assert_eq!(state.cells.occupied(), occupied, "selection allocates nothing");
    let picked = match state.work_stack() {
        [WorkItem::Term(i)] => *i,
        other => panic!("unexpected work stack {other:?}"),
    };
    assert_eq!(term::shape_of(&state.cells, picked).unwrap(), Shape::Leaf);
    assert!(term::trees_equal(&state.cells, picked, &state.cells, 7).unwrap());
}

#[test]
fn test_duplication_rule_shares_argument() {
    // function and argument addressed through references, argument duplicated
    let mut state = engine_of("^ ^ # 4 * # 5 # 9 ^** ^^*** ^^**^**");
    state.push_apply();
    state.push_term(0);
    state.push_term(5);
    assert_eq!(state.step().unwrap(), Step::Stepped);
    assert_eq!(state.last_rule(), Some(Rule::S));
    assert_eq!(
        state.work_stack(),
        &[
            WorkItem::Apply,
            WorkItem::Apply,
            WorkItem::Term(6),
            WorkItem::Term(14),
            WorkItem::Apply,
            WorkItem::Term(9),
            WorkItem::Term(14),
        ]
    );
}

#[test]
fn test_triage_on_leaf_argument() {
    // F = ^ (^ ^** ^**) ^**, z = ^**
    let mut state = engine_of("^^^**^**^** ^**");
    state.push_application(0, &[11]);
    assert_eq!(state.step().unwrap(), Step::Stepped);
    assert_eq!(state.last_rule(), Some(Rule::TriageLeaf));
    // the first branch (w) is picked
    assert_eq!(state.work_stack(), &[WorkItem::Term(2)]);
}

#[test]
fn test_triage_on_stem_argument() {
    // z = ^ ^** *
    let mut state = engine_of("^^^**^**^** ^^***");
    state.push_application(0, &[11]);
    assert_eq!(state.step().unwrap(), Step::Stepped);
    assert_eq!(state.last_rule(), Some(Rule::TriageStem));
    // (x u) with x the middle branch and u the stem's payload
    assert_eq!(
        state.work_stack(),
        &[WorkItem::Apply, WorkItem::Term(5), WorkItem::Term(12)]
    );
}

#[test]
fn test_triage_on_fork_argument() {
    // z = ^ ^** ^**
    let mut state = engine_of("^^^**^**^** ^^**^**");
    state.push_application(0, &[11]);
    assert_eq!(state.step().unwrap(), Step::Stepped);
    assert_eq!(state.last_rule(), Some(Rule::TriageFork));
    // ((y u) v) with y the outer right branch
    assert_eq!(
        state.work_stack(),
        &[
            WorkItem::Apply,
            WorkItem::Apply,
            WorkItem::Term(8),
            WorkItem::Term(12),
            WorkItem::Term(15),
        ]
    );
}

#[test]
fn test_unrepresentable_tree_is_rejected() {
    // A = ^ * ^**: empty left branch under a non-empty right branch
    let mut state = engine_of("^^*^**^** ^**");
    state.push_application(0, &[9]);
    let err = state.step().unwrap_err();
    assert!(matches!(err, EvalError::InvalidTree(_)));
    // the error is sticky
    assert_eq!(state.step().unwrap_err(), err);
    assert_eq!(state.error(), Some(&err));
}

#[test]
fn test_apply_to_empty_cell_fails() {
    let mut state = engine_of("* ^**");
    state.push_application(0, &[1]);
    assert_eq!(state.step().unwrap_err(), EvalError::ApplyToNonFunction(0));
}

#[test]
fn test_marker_without_operands_underflows() {
    let mut state = engine_of("^**");
    state.push_apply();
    state.push_term(0);
    assert_eq!(state.step().unwrap_err(), EvalError::StackUnderflow);
}

#[test]
fn test_native_dispatch_pushes_result() {
    fn pick_stem(_state: &mut EngineState, _arg: usize) -> crate::error::Result<usize> {
        Ok(3)
    }
    let mut state = engine_of("^** ^^***");
    state.add_native("pick_stem", pick_stem);
    let native = state.new_native_term("pick_stem").unwrap();
    state.push_application(native, &[0]);
    assert_eq!(state.step().unwrap(), Step::Stepped);
    assert_eq!(state.last_rule(), Some(Rule::Native));
    assert_eq!(state.work_stack(), &[WorkItem::Term(3)]);
    assert!(state.error().is_none());
}

#[test]
fn test_unregistered_native_term_fails() {
    let mut state = engine_of("^**");
    assert_eq!(
        state.new_native_term("nope").unwrap_err(),
        EvalError::UnknownNative("nope".to_string())
    );
}

#[test]
fn test_run_reduces_k_combinator() {
    // ((K a) b) with K = ^^***, a = ^**, b = ^^**^**
    let mut state = engine_of("^^*** ^** ^^**^**");
    state.push_application(0, &[5, 8]);
    let steps = state.run().unwrap();
    assert_eq!(steps, 2, "fork build then selection");
    let result = *state.result_stack().last().unwrap();
    assert!(term::trees_equal(&state.cells, result, &state.cells, 5).unwrap());
    assert_eq!(term::shape_of(&state.cells, result).unwrap(), Shape::Leaf);
}

#[test]
fn test_reset_clears_everything() {
    let mut state = engine_of("^** ^**");
    state.add_native("identity", |_, arg| Ok(arg));
    state.push_application(0, &[3]);
    state.step().unwrap();
    state.reset();
    assert_eq!(state.cells.occupied(), 0);
    assert!(state.work_stack().is_empty());
    assert!(state.result_stack().is_empty());
    assert!(state.native_handle("identity").is_none());
    assert_eq!(state.steps(), 0);
}

//! Stack-driven graph reduction.
//!
//! Evaluation state is two explicit stacks over the packed store. The work
//! stack holds pending term indices separated by apply markers; one step
//! flattens indices down to the first marker and then fires exactly one
//! rewrite rule on the function and argument it finds on the result stack.
pub mod native;
pub mod unparse;

#[cfg(test)]
mod tests;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

use crate::error::{EvalError, Result};
use crate::store::{CellStore, Tag};
use crate::term::{self, Shape};

use self::native::{NativeFn, NativeRegistry};

pub static STEP_DEBUG_LEVEL_OVERRIDE: AtomicU64 = AtomicU64::new(u64::MAX);

fn step_debug_level() -> u64 {
    static LEVEL: OnceLock<u64> = OnceLock::new();
    let override_level = STEP_DEBUG_LEVEL_OVERRIDE.load(Ordering::Relaxed);
    if override_level != u64::MAX {
        return override_level;
    }
    *LEVEL.get_or_init(|| {
        std::env::var("TRICELL_STEP_DEBUG")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0)
    })
}

pub fn set_step_debug_level_override(level: Option<u64>) {
    let val = level.unwrap_or(u64::MAX);
    STEP_DEBUG_LEVEL_OVERRIDE.store(val, Ordering::Relaxed);
}

fn step_debug(level: u64) -> bool {
    step_debug_level() >= level
}

/// One entry of the work stack.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum WorkItem {
    Term(usize),
    Apply,
}

/// Which rewrite fired on the last step.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Rule {
    /// Leaf applied to an argument: materialize the one-argument partial.
    AppStem,
    /// Stem applied to an argument: materialize the two-argument partial.
    AppFork,
    /// Selection: the second branch of the function replaces the whole
    /// application.
    K,
    /// Duplication: the argument is shared by two new applications.
    S,
    TriageLeaf,
    TriageStem,
    TriageFork,
    Native,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Step {
    Stepped,
    Done,
}

/// Full evaluation state: the packed store plus both stacks and the native
/// registry.
pub struct EngineState {
    pub cells: CellStore,
    pub(crate) work: Vec<WorkItem>,
    pub(crate) results: Vec<usize>,
    pub(crate) natives: NativeRegistry,
    error: Option<EvalError>,
    last_rule: Option<Rule>,
    steps: u64,
}

impl Default for EngineState {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineState {
    pub fn new() -> Self {
        Self::with_store(CellStore::new())
    }

    pub fn with_store(cells: CellStore) -> Self {
        Self {
            cells,
            work: Vec::new(),
            results: Vec::new(),
            natives: NativeRegistry::new(),
            error: None,
            last_rule: None,
            steps: 0,
        }
    }

    pub fn work_stack(&self) -> &[WorkItem] {
        &self.work
    }

    pub fn result_stack(&self) -> &[usize] {
        &self.results
    }

    pub fn error(&self) -> Option<&EvalError> {
        self.error.as_ref()
    }

    pub fn last_rule(&self) -> Option<Rule> {
        self.last_rule
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn push_term(&mut self, index: usize) {
        self.work.push(WorkItem::Term(index));
    }

    pub fn push_apply(&mut self) {
        self.work.push(WorkItem::Apply);
    }

    /// Seed the work stack with a left-nested application
    /// `((func a1) a2) ...`: one marker per argument, then the spine.
    pub fn push_application(&mut self, func: usize, args: &[usize]) {
        for _ in args {
            self.work.push(WorkItem::Apply);
        }
        self.work.push(WorkItem::Term(func));
        for &arg in args {
            self.work.push(WorkItem::Term(arg));
        }
    }

    pub fn add_native(&mut self, name: &str, func: NativeFn) -> i64 {
        self.natives.add(name, func)
    }

    pub fn native_handle(&self, name: &str) -> Option<i64> {
        self.natives.handle(name)
    }

    pub fn native_name(&self, handle: i64) -> Option<&str> {
        self.natives.name(handle)
    }

    /// Write a fresh native-handle term and return its index.
    pub fn new_native_term(&mut self, name: &str) -> Result<usize> {
        let handle = self
            .natives
            .handle(name)
            .ok_or_else(|| EvalError::UnknownNative(name.to_string()))?;
        let base = self.cells.reserve_region(3)?;
        self.cells.set(base, Tag::Ref)?;
        self.cells.set(base + 1, Tag::Ref)?;
        self.cells.set_payload(base, handle)?;
        Ok(base)
    }

    /// Drop all cells, stacks, natives and the recorded error, keeping
    /// allocated capacity.
    pub fn reset(&mut self) {
        self.cells.reset();
        self.work.clear();
        self.results.clear();
        self.natives.clear();
        self.error = None;
        self.last_rule = None;
        self.steps = 0;
    }

    /// Perform at most one rewrite. A failed state keeps returning the same
    /// error without further rewriting.
    pub fn step(&mut self) -> Result<Step> {
        if let Some(err) = &self.error {
            return Err(err.clone());
        }
        match self.step_inner() {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                self.error = Some(err.clone());
                Err(err)
            }
        }
    }

    fn step_inner(&mut self) -> Result<Step> {
        if self.work.is_empty() {
            return Ok(Step::Done);
        }

        let mut was_apply = false;
        while let Some(item) = self.work.pop() {
            match item {
                WorkItem::Apply => {
                    was_apply = true;
                    break;
                }
                WorkItem::Term(index) => {
                    let resolved = term::resolve(&self.cells, index)?;
                    self.results.push(resolved);
                }
            }
        }
        if !was_apply {
            return Ok(Step::Done);
        }

        let func = self.results.pop().ok_or(EvalError::StackUnderflow)?;
        let arg = self.results.pop().ok_or(EvalError::StackUnderflow)?;
        let rule = self.apply(func, arg)?;
        self.last_rule = Some(rule);
        self.steps += 1;
        if step_debug(1) {
            eprintln!(
                "STEP step={} rule={:?} func={} arg={} work={} results={}",
                self.steps,
                rule,
                func,
                arg,
                self.work.len(),
                self.results.len()
            );
        }
        Ok(Step::Stepped)
    }

    /// Drive `step` to completion, returning the number of rewrites taken.
    pub fn run(&mut self) -> Result<u64> {
        let start = self.steps;
        if step_debug(1) {
            eprintln!(
                "RUN_BEGIN work={} results={}",
                self.work.len(),
                self.results.len()
            );
        }
        loop {
            if self.step()? == Step::Done {
                if step_debug(1) {
                    eprintln!(
                        "RUN_DONE steps={} results={}",
                        self.steps - start,
                        self.results.len()
                    );
                }
                return Ok(self.steps - start);
            }
        }
    }

    fn apply(&mut self, func: usize, arg: usize) -> Result<Rule> {
        match term::shape_of(&self.cells, func)? {
            Shape::Native(handle) => {
                let f = self
                    .natives
                    .function(handle)
                    .ok_or_else(|| EvalError::UnknownNative(format!("handle {handle}")))?;
                let result = f(self, arg)?;
                self.work.push(WorkItem::Term(result));
                return Ok(Rule::Native);
            }
            Shape::Empty => return Err(EvalError::ApplyToNonFunction(func)),
            Shape::Reference(_) => return Err(EvalError::InvalidTree(func)),
            Shape::Leaf | Shape::Composite => {}
        }

        let a = term::left_child(&self.cells, func)?;
        if a == func {
            return Err(EvalError::InvalidTree(func));
        }
        let y = term::right_child(&self.cells, func)?;
        if y == func {
            return Err(EvalError::InvalidTree(func));
        }
        let a_tag = self.cells.get(a).ok_or(EvalError::InvalidCell(a))?;
        let y_tag = self.cells.get(y).ok_or(EvalError::InvalidCell(y))?;

        if a_tag == Tag::Nil && y_tag == Tag::Nil {
            let base = self.materialize_stem(arg)?;
            self.work.push(WorkItem::Term(base));
            return Ok(Rule::AppStem);
        }

        let w = term::left_child(&self.cells, a)?;
        let x = term::right_child(&self.cells, a)?;
        if w == a || x == a {
            return Err(EvalError::InvalidTree(a));
        }
        let w_tag = self.cells.get(w).ok_or(EvalError::InvalidCell(w))?;
        let x_tag = self.cells.get(x).ok_or(EvalError::InvalidCell(x))?;

        if w_tag == Tag::Nil && x_tag == Tag::Nil && y_tag == Tag::Nil {
            let base = self.materialize_fork(a, arg)?;
            self.work.push(WorkItem::Term(base));
            return Ok(Rule::AppFork);
        }

        if w_tag == Tag::Nil && x_tag == Tag::Nil {
            self.work.push(WorkItem::Term(y));
            return Ok(Rule::K);
        }
        if w_tag == Tag::Nil {
            // no tree of this shape exists in the calculus
            return Err(EvalError::InvalidTree(a));
        }
        if x_tag == Tag::Nil {
            // (w z) and (y z), innermost application on top
            self.work.push(WorkItem::Apply);
            self.work.push(WorkItem::Apply);
            self.work.push(WorkItem::Term(w));
            self.work.push(WorkItem::Term(arg));
            self.work.push(WorkItem::Apply);
            self.work.push(WorkItem::Term(y));
            self.work.push(WorkItem::Term(arg));
            return Ok(Rule::S);
        }

        // triage on the argument's own shape
        let u = term::left_child(&self.cells, arg)?;
        if u == arg {
            return Err(EvalError::InvalidTree(arg));
        }
        let v = term::right_child(&self.cells, arg)?;
        if v == arg {
            return Err(EvalError::InvalidTree(arg));
        }
        let u_tag = self.cells.get(u).ok_or(EvalError::InvalidCell(u))?;
        let v_tag = self.cells.get(v).ok_or(EvalError::InvalidCell(v))?;

        match (u_tag == Tag::Nil, v_tag == Tag::Nil) {
            (true, true) => {
                self.work.push(WorkItem::Term(w));
                Ok(Rule::TriageLeaf)
            }
            (true, false) => Err(EvalError::InvalidTree(arg)),
            (false, true) => {
                self.work.push(WorkItem::Apply);
                self.work.push(WorkItem::Term(x));
                self.work.push(WorkItem::Term(u));
                Ok(Rule::TriageStem)
            }
            (false, false) => {
                self.work.push(WorkItem::Apply);
                self.work.push(WorkItem::Apply);
                self.work.push(WorkItem::Term(y));
                self.work.push(WorkItem::Term(u));
                self.work.push(WorkItem::Term(v));
                Ok(Rule::TriageFork)
            }
        }
    }

    /// Write `^ # * * *`: the one-argument partial holding a reference to
    /// `arg`.
    fn materialize_stem(&mut self, arg: usize) -> Result<usize> {
        let base = self.cells.reserve_region(5)?;
        self.cells.set(base, Tag::Tree)?;
        self.cells.set(base + 1, Tag::Ref)?;
        self.set_reference(base + 1, arg)?;
        Ok(base)
    }

    /// Write `^ # * * # * *`: the two-argument partial referencing the
    /// earlier partial `a` and the new argument.
    fn materialize_fork(&mut self, a: usize, arg: usize) -> Result<usize> {
        let base = self.cells.reserve_region(7)?;
        self.cells.set(base, Tag::Tree)?;
        self.cells.set(base + 1, Tag::Ref)?;
        self.cells.set(base + 4, Tag::Ref)?;
        self.set_reference(base + 1, a)?;
        self.set_reference(base + 4, arg)?;
        Ok(base)
    }

    /// References are second-class: refusing to point one at another keeps
    /// every chain at length one.
    fn set_reference(&mut self, at: usize, target: usize) -> Result<()> {
        if matches!(term::shape_of(&self.cells, target)?, Shape::Reference(_)) {
            return Err(EvalError::RefToRef { from: at, to: target });
        }
        self.cells.set_payload(at, target as i64 - at as i64)
    }
}

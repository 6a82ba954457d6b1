//! Native function registry.
//!
//! Native terms carry a small integer handle; the registry maps handles to
//! plain function pointers and back to the names used by checkpoints.
use rustc_hash::FxHashMap;

use crate::engine::EngineState;
use crate::error::Result;

/// Calling contract for natives: full access to the engine plus the resolved
/// argument index; the returned index is pushed back onto the work stack.
pub type NativeFn = fn(&mut EngineState, usize) -> Result<usize>;

#[derive(Default)]
pub struct NativeRegistry {
    by_name: FxHashMap<String, i64>,
    entries: Vec<(String, NativeFn)>,
}

impl NativeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a function under `name`. Re-registering a name rebinds it to
    /// a fresh handle.
    pub fn add(&mut self, name: &str, func: NativeFn) -> i64 {
        let handle = self.entries.len() as i64;
        self.entries.push((name.to_string(), func));
        self.by_name.insert(name.to_string(), handle);
        handle
    }

    pub fn handle(&self, name: &str) -> Option<i64> {
        self.by_name.get(name).copied()
    }

    pub fn name(&self, handle: i64) -> Option<&str> {
        usize::try_from(handle)
            .ok()
            .and_then(|i| self.entries.get(i))
            .map(|(name, _)| name.as_str())
    }

    pub fn function(&self, handle: i64) -> Option<NativeFn> {
        usize::try_from(handle)
            .ok()
            .and_then(|i| self.entries.get(i))
            .map(|(_, func)| *func)
    }

    pub fn clear(&mut self) {
        self.by_name.clear();
        self.entries.clear();
    }
}

/// Register the stock natives.
pub fn load_standard_natives(state: &mut EngineState) {
    state.add_native("identity", native_identity);
    state.add_native("io_println", native_io_println);
}

fn native_identity(_state: &mut EngineState, arg: usize) -> Result<usize> {
    Ok(arg)
}

fn native_io_println(state: &mut EngineState, arg: usize) -> Result<usize> {
    println!("{}", super::unparse::render_term(&state.cells, arg));
    Ok(arg)
}

//! Binding environment for evaluation.
//!
//! A stack of insertion-ordered frames. The outermost frame is the input
//! context; loops, quantifiers, and function invocations push fresh frames.
//! Lookup walks innermost to outermost applying the loose name-match rule.

use crate::value::Value;
use indexmap::IndexMap;
use verdict_core::names;

#[derive(Debug, Default)]
pub struct Env {
    frames: Vec<IndexMap<String, Value>>,
}

impl Env {
    pub fn new(root: IndexMap<String, Value>) -> Self {
        Self { frames: vec![root] }
    }

    pub fn empty() -> Self {
        Self {
            frames: vec![IndexMap::new()],
        }
    }

    pub fn push_frame(&mut self) {
        self.frames.push(IndexMap::new());
    }

    pub fn pop_frame(&mut self) {
        // the root frame stays
        if self.frames.len() > 1 {
            self.frames.pop();
        }
    }

    /// Bind into the innermost frame.
    pub fn bind(&mut self, name: impl Into<String>, value: Value) {
        if let Some(frame) = self.frames.last_mut() {
            frame.insert(name.into(), value);
        }
    }

    pub fn lookup(&self, name: &str) -> Option<&Value> {
        self.frames
            .iter()
            .rev()
            .find_map(|frame| names::lookup(frame, name))
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }
}

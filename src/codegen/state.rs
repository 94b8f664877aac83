//! # Code Generator State
//!
//! The long-lived object carried through every statement/expression emitter
//! (spec.md §3): data/text buffers, the variable table, the string-length
//! table, the label counter, the emitted-label set, and the current frame
//! size. Generalizes the teacher's single flat `HashMap<String, String>`
//! variable map into a scope stack so nested blocks get real `%rbp`-relative
//! shadowing (SPEC_FULL §3).

use crate::ast::types::Type;
use crate::compiler::resolver::ImportContext;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy)]
pub struct VarSlot {
    pub offset: i64,
    pub ty: Type,
}

pub struct Generator {
    pub data: String,
    pub text: String,
    pub emitted_labels: HashSet<String>,
    pub imports: ImportContext,

    string_pool: HashMap<String, String>,
    string_len_table: HashMap<String, u64>,
    label_counter: u64,
    scopes: Vec<HashMap<String, VarSlot>>,
    next_offset: i64,
    frame_size: u64,
}

impl Generator {
    pub fn new(imports: ImportContext) -> Self {
        Self {
            data: String::new(),
            text: String::new(),
            emitted_labels: HashSet::new(),
            imports,
            string_pool: HashMap::new(),
            string_len_table: HashMap::new(),
            label_counter: 0,
            scopes: vec![HashMap::new()],
            next_offset: 0,
            frame_size: 0,
        }
    }

    // -- labels --------------------------------------------------------

    /// Generates a unique label of the form `<tag>_<n>` (spec.md §3).
    pub fn fresh_label(&mut self, tag: &str) -> String {
        let n = self.label_counter;
        self.label_counter += 1;
        format!("{}_{}", tag, n)
    }

    /// Returns `true` the first time a given global label is requested,
    /// guaranteeing one-time emission of per-intrinsic constant tables
    /// (CRC32, SHA-256 K, MD5 T/S).
    pub fn mark_emitted_once(&mut self, label: &str) -> bool {
        self.emitted_labels.insert(label.to_string())
    }

    // -- strings ---------------------------------------------------------

    /// Interns a string literal's bytes, returning its data-section label.
    /// Each distinct byte sequence is emitted exactly once (spec.md §9.4).
    pub fn intern_string(&mut self, value: &str) -> String {
        if let Some(label) = self.string_pool.get(value) {
            return label.clone();
        }
        let label = format!("str_{}", self.string_pool.len());
        self.string_pool.insert(value.to_string(), label.clone());
        self.data.push_str(&format!(
            "{}:\n    .asciz \"{}\"\n",
            label,
            escape_asciz(value)
        ));
        label
    }

    pub fn record_string_length(&mut self, identifier: &str, len: u64) {
        self.string_len_table.insert(identifier.to_string(), len);
    }

    pub fn known_string_length(&self, identifier: &str) -> Option<u64> {
        self.string_len_table.get(identifier).copied()
    }

    // -- scopes and variables --------------------------------------------

    /// Enters a fresh function frame: clears the scope stack and the
    /// offset allocator. Each `FunctionDefinition` gets its own frame.
    pub fn enter_function_frame(&mut self) {
        self.scopes = vec![HashMap::new()];
        self.next_offset = 0;
        self.frame_size = 0;
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    pub fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    /// Allocates a new negative-offset slot for `name` in the *current*
    /// (innermost) scope, sized per the declared type, and returns the
    /// offset magnitude to use in `-N(%rbp)`.
    pub fn declare_variable(&mut self, name: &str, ty: Type) -> i64 {
        self.next_offset += ty.slot_size() as i64;
        if self.next_offset as u64 > self.frame_size {
            self.frame_size = self.next_offset as u64;
        }
        let slot = VarSlot {
            offset: self.next_offset,
            ty,
        };
        self.scopes
            .last_mut()
            .expect("at least one scope is always active")
            .insert(name.to_string(), slot);
        self.next_offset
    }

    /// Looks up a variable from the innermost scope outward (shadowing).
    pub fn lookup_variable(&self, name: &str) -> Option<VarSlot> {
        for scope in self.scopes.iter().rev() {
            if let Some(slot) = scope.get(name) {
                return Some(*slot);
            }
        }
        None
    }

    /// The frame size rounded up to keep `%rsp` 16-byte aligned at `call`
    /// sites (spec.md §4.5.1): `%rbp` push costs 8, so the frame plus that
    /// push must be a multiple of 16.
    pub fn aligned_frame_size(&self) -> u64 {
        let size = self.frame_size;
        let remainder = (size + 8) % 16;
        if remainder == 0 {
            size
        } else {
            size + (16 - remainder)
        }
    }

    // -- emission ----------------------------------------------------------

    pub fn emit(&mut self, line: impl AsRef<str>) {
        self.text.push_str(line.as_ref());
        self.text.push('\n');
    }

    pub fn emit_label(&mut self, label: &str) {
        self.text.push_str(label);
        self.text.push_str(":\n");
    }

    pub fn emit_data(&mut self, line: impl AsRef<str>) {
        self.data.push_str(line.as_ref());
        self.data.push('\n');
    }
}

fn escape_asciz(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interns_each_distinct_string_once() {
        let mut gen = Generator::new(ImportContext::default());
        let a = gen.intern_string("hi");
        let b = gen.intern_string("hi");
        let c = gen.intern_string("bye");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(gen.data.matches("str_0:").count(), 1);
    }

    #[test]
    fn variable_offsets_grow_downward_and_shadow() {
        let mut gen = Generator::new(ImportContext::default());
        let a = gen.declare_variable("x", Type::Int64);
        gen.push_scope();
        let b = gen.declare_variable("x", Type::Int64);
        assert!(b > a);
        assert_eq!(gen.lookup_variable("x").unwrap().offset, b);
        gen.pop_scope();
        assert_eq!(gen.lookup_variable("x").unwrap().offset, a);
    }
}

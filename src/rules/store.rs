//! Variable stores.
//!
//! One [`VarTable`] per rule for `$locals` and one engine-wide table for
//! `#globals`.  A slot remembers which program node produced it (`owner`) and,
//! for globals, which rule wrote it last.
//!
//! Owners are [`NodeId`] handles into the arena rather than byte offsets, so
//! inserting, overwriting or deleting slots never invalidates another
//! slot's back-reference; compaction is a plain `Vec::remove`.
//!
//! ```text
//!   set(#b) on [#a, #b, #c]  →  [#a, #c, #b']     (old slot dropped, new appended)
//!   delete(owner of #a)      →  [#c, #b']
//! ```

use core::fmt::Write as _;

use log::warn;

use crate::error::{Error, Result};
use crate::rules::ast::{Arena, NodeId, SymbolId};
use crate::rules::value::{PackedValue, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Local,
    Global,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub symbol: SymbolId,
    /// Variable node whose assignment produced this slot.
    pub owner: NodeId,
    /// Rule that last wrote the slot.
    pub rule: u16,
    pub packed: PackedValue,
}

impl Slot {
    /// `None` when the stored tag is corrupt.
    pub fn value(&self) -> Option<Value> {
        self.packed.unpack()
    }
}

#[derive(Debug, Clone)]
pub struct VarTable {
    scope: Scope,
    slots: Vec<Slot>,
    capacity: usize,
}

impl VarTable {
    pub fn new(scope: Scope, capacity: usize) -> Self {
        Self {
            scope,
            slots: Vec::new(),
            capacity,
        }
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn find(&self, symbol: SymbolId) -> Option<&Slot> {
        self.slots.iter().find(|s| s.symbol == symbol)
    }

    /// Current value of `symbol`; `Null` if never written or corrupt.
    pub fn get(&self, symbol: SymbolId) -> Value {
        self.find(symbol).and_then(Slot::value).unwrap_or_default()
    }

    /// Insert or overwrite `symbol`.
    ///
    /// Running out of slots or heap is reported as
    /// [`Error::AllocationFailure`]; the caller treats it as fatal.
    pub fn set(&mut self, symbol: SymbolId, owner: NodeId, rule: u16, value: Value) -> Result<()> {
        if let Some(pos) = self.slots.iter().position(|s| s.symbol == symbol) {
            self.slots.remove(pos);
        }
        if self.slots.len() >= self.capacity {
            return Err(Error::AllocationFailure(match self.scope {
                Scope::Local => "local variable table full",
                Scope::Global => "global variable table full",
            }));
        }
        self.slots
            .try_reserve(1)
            .map_err(|_| Error::AllocationFailure("variable table allocation"))?;
        self.slots.push(Slot {
            symbol,
            owner,
            rule,
            packed: value.pack(),
        });
        Ok(())
    }

    /// Remove the slot produced by `owner`.  Returns whether one existed.
    pub fn delete(&mut self, owner: NodeId) -> bool {
        match self.slots.iter().position(|s| s.owner == owner) {
            Some(pos) => {
                self.slots.remove(pos);
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    #[cfg(test)]
    pub(crate) fn slots_mut(&mut self) -> &mut [Slot] {
        &mut self.slots
    }

    /// `name = value` lines in write order, at most `budget` bytes.
    ///
    /// A corrupt slot stops the dump; what was formatted so far is kept.
    pub fn format(&self, arena: &Arena, budget: usize) -> String {
        let mut out = String::new();
        let mut line = String::new();
        for slot in &self.slots {
            let Some(value) = slot.value() else {
                warn!(
                    "VarTable: corrupt {:?} slot '{}' (tag {}), dump truncated",
                    self.scope,
                    arena.name(slot.symbol),
                    slot.packed.tag
                );
                break;
            };
            line.clear();
            let _ = writeln!(line, "{} = {}", arena.name(slot.symbol), value);
            if out.len() + line.len() > budget {
                break;
            }
            out.push_str(&line);
        }
        out
    }
}

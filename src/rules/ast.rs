//! Compiled program representation.
//!
//! Every rule in a load shares one [`Arena`].  Nodes refer to each other by
//! [`NodeId`] (an index into the arena), never by address, so the arena can
//! grow without invalidating references held by variable slots.
//!
//! ```text
//!   Arena.nodes  [ Lit 1 | Var #count | Assign(1←0) | … ]
//!   Arena.lists  [ 2, 7, 9 | 12 | … ]        ← statement / argument lists
//!   Arena.names  [ "#count", "System#Boot", … ]  ← case-insensitive interning
//! ```

use crate::error::ParseReason;
use crate::rules::functions::Builtin;
use crate::rules::token::Binding;
use crate::rules::value::{Arith, Compare, Value};

/// Maximum identifier length in bytes.
pub const MAX_NAME_LEN: usize = 48;

pub type Name = heapless::String<MAX_NAME_LEN>;

/// Handle of a node within the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        u32::try_from(index).ok().map(Self)
    }
}

/// Handle of an interned identifier.  Equal names (ignoring ASCII case)
/// share one id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SymbolId(u16);

/// Contiguous run of node ids in [`Arena::lists`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NodeList {
    start: u32,
    len: u16,
}

impl NodeList {
    pub fn len(self) -> usize {
        self.len as usize
    }

    pub fn is_empty(self) -> bool {
        self.len == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Arith(Arith),
    Compare(Compare),
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Node {
    Literal(Value),
    Var {
        symbol: SymbolId,
        binding: Binding,
    },
    Unary {
        op: UnaryOp,
        operand: NodeId,
    },
    Binary {
        op: BinaryOp,
        lhs: NodeId,
        rhs: NodeId,
    },
    Call {
        function: Builtin,
        args: NodeList,
    },
    /// `target` is always a `Var` node.
    Assign {
        target: NodeId,
        value: NodeId,
    },
    /// `elseif` chains nest as another `If` in `otherwise`.
    If {
        condition: NodeId,
        then: NodeList,
        otherwise: Option<NodeId>,
    },
    Block(NodeList),
    /// Call of another rule block by name.  `rule` is filled in once every
    /// block of the load has been seen.
    Go {
        name: SymbolId,
        rule: Option<u16>,
    },
}

/// One compiled rule block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Program {
    pub name: SymbolId,
    /// Position in the load; stable until the next reload.
    pub index: u16,
    pub body: NodeList,
    pub line: u32,
}

/// Node storage shared by every program of one load.
#[derive(Debug, Clone, Default)]
pub struct Arena {
    nodes: Vec<Node>,
    lists: Vec<NodeId>,
    names: Vec<Name>,
    capacity: usize,
}

impl Arena {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            nodes: Vec::new(),
            lists: Vec::new(),
            names: Vec::new(),
            capacity,
        }
    }

    pub fn push(&mut self, node: Node) -> Result<NodeId, ParseReason> {
        if self.used() >= self.capacity || self.nodes.try_reserve(1).is_err() {
            return Err(ParseReason::ArenaExhausted);
        }
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        Ok(id)
    }

    pub fn push_list(&mut self, ids: &[NodeId]) -> Result<NodeList, ParseReason> {
        let len = u16::try_from(ids.len()).map_err(|_| ParseReason::ArenaExhausted)?;
        if self.used() + ids.len() > self.capacity || self.lists.try_reserve(ids.len()).is_err() {
            return Err(ParseReason::ArenaExhausted);
        }
        let start = self.lists.len() as u32;
        self.lists.extend_from_slice(ids);
        Ok(NodeList { start, len })
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.index())
    }

    pub fn list(&self, list: NodeList) -> &[NodeId] {
        let start = list.start as usize;
        self.lists.get(start..start + list.len()).unwrap_or(&[])
    }

    pub fn intern(&mut self, name: &str) -> Result<SymbolId, ParseReason> {
        if let Some(id) = self.lookup(name) {
            return Ok(id);
        }
        let id = u16::try_from(self.names.len()).map_err(|_| ParseReason::ArenaExhausted)?;
        let mut stored = Name::new();
        stored
            .push_str(name)
            .map_err(|()| ParseReason::NameTooLong)?;
        self.names.push(stored);
        Ok(SymbolId(id))
    }

    pub fn lookup(&self, name: &str) -> Option<SymbolId> {
        self.names
            .iter()
            .position(|n| n.eq_ignore_ascii_case(name))
            .map(|i| SymbolId(i as u16))
    }

    pub fn name(&self, symbol: SymbolId) -> &str {
        self.names.get(symbol.0 as usize).map_or("?", Name::as_str)
    }

    /// Number of nodes.  Valid `NodeId`s are `0..len()`.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Nodes plus list entries, the figure `capacity` bounds.
    pub fn used(&self) -> usize {
        self.nodes.len() + self.lists.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

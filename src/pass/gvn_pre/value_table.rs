// Copyright (c) 2017-2021 Fabian Schuiki

//! Value numbering.
//!
//! Assigns a canonical value to every node. Two expressions receive the same
//! value if they have the same opcode, mode, arity, and attribute payload,
//! and their inputs are pairwise value-identical. Phis and memory operations
//! never join an equivalence class: each is a fresh value. Breaking phis out
//! this way keeps value computation well-founded in the presence of
//! data-flow cycles, which always pass through a phi.

use crate::{impl_table_key, ir::prelude::*, table::TableKey};
use num::BigInt;
use std::collections::HashMap;

impl_table_key! {
    /// A value, representing an equivalence class of expressions.
    struct Val(u32) as "val";
}

/// The structural identity of an expression, with inputs normalized to their
/// values.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ExprKey {
    opcode: Opcode,
    mode: Mode,
    attr: AttrKey,
    args: Vec<Val>,
}

/// The attribute payload part of an expression identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum AttrKey {
    None,
    Imm(BigInt),
    Index(u32),
}

/// A table assigning canonical values to nodes.
#[derive(Debug, Clone, Default)]
pub struct ValueTable {
    /// The value remembered for each node.
    node_values: HashMap<Node, Val>,
    /// The identity set: structurally normalized expressions and their
    /// values.
    exprs: HashMap<ExprKey, Val>,
    next: usize,
}

impl ValueTable {
    /// Create a new empty value table.
    pub fn new() -> Self {
        Default::default()
    }

    fn fresh(&mut self) -> Val {
        let value = Val::new(self.next);
        self.next += 1;
        value
    }

    /// Get the value remembered for a node, if any.
    pub fn lookup(&self, node: Node) -> Option<Val> {
        self.node_values.get(&node).cloned()
    }

    /// Get the value of a node, remembering it first if necessary.
    ///
    /// Inputs are normalized to their values before the expression is matched
    /// against the identity set, so textually different expressions that
    /// compute the same value collapse onto one entry. Phis and memory
    /// operations bypass the identity set and receive a fresh value.
    pub fn value(&mut self, graph: &Graph, node: Node) -> Val {
        if let Some(&value) = self.node_values.get(&node) {
            return value;
        }
        self.remember(graph, node)
    }

    /// Compute and record the value of a node.
    pub fn remember(&mut self, graph: &Graph, node: Node) -> Val {
        let data = &graph[node];
        let opcode = data.opcode();
        if opcode.is_phi() || opcode.is_memop() {
            let value = self.fresh();
            self.node_values.insert(node, value);
            trace!("{} is fresh {}", node, value);
            return value;
        }
        let args = data
            .args()
            .iter()
            .map(|&arg| self.value(graph, arg))
            .collect();
        let attr = match data {
            NodeData::ConstInt { imm, .. } => AttrKey::Imm(imm.clone()),
            NodeData::Arg { index, .. } => AttrKey::Index(*index),
            NodeData::Proj { index, .. } => AttrKey::Index(*index),
            _ => AttrKey::None,
        };
        let key = ExprKey {
            opcode,
            mode: data.mode(),
            attr,
            args,
        };
        let next = &mut self.next;
        let value = *self.exprs.entry(key).or_insert_with(|| {
            let value = Val::new(*next);
            *next += 1;
            value
        });
        self.node_values.insert(node, value);
        trace!("{} has {}", node, value);
        value
    }

    /// Forget everything the table knows.
    pub fn clear(&mut self) {
        self.node_values.clear();
        self.exprs.clear();
        self.next = 0;
    }
}

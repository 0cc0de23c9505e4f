// Copyright (c) 2017-2021 Fabian Schuiki

//! Value sets and per-block state.

use crate::ir::prelude::*;
use crate::pass::gvn_pre::Val;
use std::collections::HashMap;

/// An insertion-ordered mapping from value to representative expression.
#[derive(Debug, Clone, Default)]
pub struct ValueSet {
    order: Vec<Val>,
    map: HashMap<Val, Node>,
}

impl ValueSet {
    /// Create a new empty set.
    pub fn new() -> Self {
        Default::default()
    }

    /// Get the number of values in the set.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Check if the set is empty.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Look up the representative expression of a value.
    pub fn lookup(&self, value: Val) -> Option<Node> {
        self.map.get(&value).cloned()
    }

    /// Insert a value with its representative. No-op if the value is already
    /// present.
    pub fn insert(&mut self, value: Val, expr: Node) {
        if !self.map.contains_key(&value) {
            self.order.push(value);
            self.map.insert(value, expr);
        }
    }

    /// Insert a value, overwriting the representative of an already present
    /// value while keeping its position.
    pub fn replace(&mut self, value: Val, expr: Node) {
        if !self.map.contains_key(&value) {
            self.order.push(value);
        }
        self.map.insert(value, expr);
    }

    /// Remove a value from the set.
    pub fn remove(&mut self, value: Val) -> Option<Node> {
        let expr = self.map.remove(&value);
        if expr.is_some() {
            self.order.retain(|&v| v != value);
        }
        expr
    }

    /// Iterate over the values and representatives in insertion order.
    pub fn iter<'a>(&'a self) -> impl Iterator<Item = (Val, Node)> + 'a {
        let map = &self.map;
        self.order.iter().map(move |&v| (v, map[&v]))
    }

    /// Snapshot the entries in insertion order.
    pub fn entries(&self) -> Vec<(Val, Node)> {
        self.iter().collect()
    }

    /// Remove all values from the set.
    pub fn clear(&mut self) {
        self.order.clear();
        self.map.clear();
    }
}

/// The per-block state of the pass.
#[derive(Debug, Clone, Default)]
pub struct BlockInfo {
    /// Expressions generated in this block whose operands are all clean.
    pub exp_gen: ValueSet,
    /// Values available at the bottom of this block, mapped to the leader
    /// reachable on the dominator path.
    pub avail_out: ValueSet,
    /// Values anticipated at the top of this block.
    pub antic_in: ValueSet,
    /// Values already handled by the insertion engine.
    pub antic_done: ValueSet,
    /// Values newly introduced into `avail_out` by hoisting.
    pub new_set: ValueSet,
    /// Phi-translation cache for expressions crossing from this block's
    /// single successor into this block. Holds the chosen representative,
    /// which is the untranslated expression when translation left its value
    /// unchanged.
    pub trans: HashMap<Node, Node>,
    /// Scratch for one insertion decision: the candidate expression to use
    /// for the value on this predecessor.
    pub avail: Option<Node>,
    /// Scratch for one insertion decision: whether the value is already
    /// available on this predecessor.
    pub found: bool,
}

impl BlockInfo {
    /// Create a new empty block info.
    pub fn new() -> Self {
        Default::default()
    }
}

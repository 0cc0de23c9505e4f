// Copyright (c) 2017-2021 Fabian Schuiki

//! Loop nesting forest of a graph.
//!
//! Back edges are CFG edges whose target dominates their source. Each back
//! edge target is a loop header; the natural loop body is everything that
//! reaches the back edge source without passing through the header. Loops
//! nest by body containment.

use crate::{impl_table_key, ir::prelude::*, table::TableKey};
use hibitset::BitSet;
use std::collections::{HashMap, HashSet};

impl_table_key! {
    /// A loop in the loop forest.
    struct LoopId(u32) as "loop";
}

/// The data associated with a single loop.
#[derive(Debug, Clone)]
pub struct LoopData {
    /// The header block, target of the loop's back edges.
    pub header: Block,
    /// The enclosing loop, if any.
    pub parent: Option<LoopId>,
    /// The blocks in the loop body, header included.
    pub blocks: Vec<Block>,
    /// Nesting depth; outermost real loops have depth 1.
    pub depth: u32,
    /// Whether the loop has been classified as endless.
    pub endless: bool,
}

/// A loop nesting forest.
#[derive(Debug, Clone, Default)]
pub struct LoopForest {
    loops: Vec<LoopData>,
    /// Innermost loop of each block, indexed by block.
    inner: Vec<Option<LoopId>>,
}

impl LoopForest {
    /// Compute the loop forest of a graph.
    pub fn new(graph: &Graph, domtree: &crate::analysis::DominatorTree) -> Self {
        // Collect back edges, grouped by header.
        let mut back_edges = HashMap::<Block, Vec<Block>>::new();
        for bb in graph.blocks() {
            for &succ in graph.succs(bb) {
                if domtree.dominates(succ, bb) {
                    back_edges.entry(succ).or_insert_with(Vec::new).push(bb);
                }
            }
        }

        // Collect the natural loop body of each header.
        let mut headers: Vec<Block> = back_edges.keys().cloned().collect();
        headers.sort();
        let mut bodies = Vec::with_capacity(headers.len());
        for &header in &headers {
            let mut body = BitSet::with_capacity(graph.blocks.id_bound() as u32);
            body.add(header.index() as u32);
            let mut todo: Vec<Block> = back_edges[&header].clone();
            while let Some(bb) = todo.pop() {
                if body.add(bb.index() as u32) {
                    continue;
                }
                for &pred in graph.preds(bb) {
                    if !body.contains(pred.index() as u32) {
                        todo.push(pred);
                    }
                }
            }
            let set: HashSet<Block> = graph
                .blocks()
                .filter(|bb| body.contains(bb.index() as u32))
                .collect();
            bodies.push(set);
        }

        // Nest by body containment: the parent is the smallest strict
        // superset.
        let mut loops: Vec<LoopData> = headers
            .iter()
            .enumerate()
            .map(|(i, &header)| {
                let parent = bodies
                    .iter()
                    .enumerate()
                    .filter(|&(j, other)| {
                        j != i && other.len() > bodies[i].len() && bodies[i].is_subset(other)
                    })
                    .min_by_key(|&(_, other)| other.len())
                    .map(|(j, _)| LoopId::new(j));
                let mut blocks: Vec<Block> = bodies[i].iter().cloned().collect();
                blocks.sort();
                LoopData {
                    header,
                    parent,
                    blocks,
                    depth: 0,
                    endless: false,
                }
            })
            .collect();

        // Fill in depths along the parent chains.
        for i in 0..loops.len() {
            let mut depth = 1;
            let mut cursor = loops[i].parent;
            while let Some(p) = cursor {
                depth += 1;
                cursor = loops[p.index()].parent;
            }
            loops[i].depth = depth;
        }

        // The innermost loop of each block is the smallest body containing
        // it.
        let mut inner = vec![None; graph.blocks.id_bound()];
        for bb in graph.blocks() {
            inner[bb.index()] = bodies
                .iter()
                .enumerate()
                .filter(|&(_, body)| body.contains(&bb))
                .min_by_key(|&(_, body)| body.len())
                .map(|(j, _)| LoopId::new(j));
        }

        trace!("Loop forest: {} loops", loops.len());
        Self { loops, inner }
    }

    /// Get the number of loops in the forest.
    pub fn num_loops(&self) -> usize {
        self.loops.len()
    }

    /// Iterate over the loops in the forest.
    pub fn loops<'a>(&'a self) -> impl Iterator<Item = LoopId> + 'a {
        (0..self.loops.len()).map(LoopId::new)
    }

    /// Get the data of a loop.
    pub fn loop_data(&self, id: LoopId) -> &LoopData {
        &self.loops[id.index()]
    }

    /// Get the innermost loop containing a block, if any.
    pub fn loop_of(&self, bb: Block) -> Option<LoopId> {
        self.inner.get(bb.index()).cloned().flatten()
    }

    /// Get the nesting depth of a block; blocks outside any loop have depth 0.
    pub fn depth(&self, bb: Block) -> u32 {
        self.loop_of(bb)
            .map(|id| self.loops[id.index()].depth)
            .unwrap_or(0)
    }

    /// Get the outermost real loop enclosing a loop.
    pub fn outermost(&self, mut id: LoopId) -> LoopId {
        while let Some(parent) = self.loops[id.index()].parent {
            id = parent;
        }
        id
    }

    /// Flag a loop as endless.
    pub fn set_endless(&mut self, id: LoopId) {
        self.loops[id.index()].endless = true;
    }

    /// Check if a loop has been flagged as endless.
    pub fn is_endless(&self, id: LoopId) -> bool {
        self.loops[id.index()].endless
    }

    /// Check if a block sits inside a loop whose outermost enclosing real
    /// loop has been flagged as endless.
    pub fn in_endless_loop(&self, bb: Block) -> bool {
        match self.loop_of(bb) {
            Some(id) => self.loops[self.outermost(id).index()].endless,
            None => false,
        }
    }
}

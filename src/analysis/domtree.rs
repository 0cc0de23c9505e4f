// Copyright (c) 2017-2021 Fabian Schuiki

use crate::{ir::prelude::*, table::TableKey};
use hibitset::BitSet;
use std::sync::atomic::{AtomicU64, Ordering};

/// A block dominator tree.
///
/// Records for every block which other blocks in the CFG *have* to be
/// traversed to reach it, in the form of immediate dominators plus the CFG
/// post-order and dominator-tree pre-order arrays the optimization passes
/// walk.
#[derive(Debug, Clone)]
pub struct DominatorTree {
    /// Vector of immediate dominators, indexed by block.
    doms: Vec<Block>,
    /// Blocks in CFG post-order.
    post_order: Vec<Block>,
    /// Post-order index for each block.
    inv_post_order: Vec<u32>,
    /// Blocks in dominator-tree pre-order.
    pre_order: Vec<Block>,
}

impl DominatorTree {
    /// Compute the dominator tree of a graph.
    ///
    /// This implementation is based on [1].
    ///
    /// [1]: https://www.cs.rice.edu/~keith/Embed/dom.pdf "Cooper, Keith D., Timothy J. Harvey, and Ken Kennedy. 'A simple, fast dominance algorithm.' Software Practice & Experience 4.1-10 (2001): 1-8."
    pub fn new(graph: &Graph) -> Self {
        let t0 = time::precise_time_ns();
        let post_order = Self::compute_blocks_post_order(graph);
        let length = post_order.len();

        let undef = std::u32::MAX;
        let mut doms = vec![undef; length];
        let mut inv_post_order = vec![undef; graph.blocks.id_bound()];
        for (i, &bb) in post_order.iter().enumerate() {
            inv_post_order[bb.index()] = i as u32;
        }

        for root in Some(graph.entry())
            .into_iter()
            .chain(graph.blocks().filter(|&bb| graph.preds(bb).is_empty()))
        {
            let poidx = inv_post_order[root.index()];
            doms[poidx as usize] = poidx; // root nodes
        }

        let mut changed = true;
        while changed {
            changed = false;

            for idx in (0..length).rev() {
                if doms[idx] == idx as u32 {
                    continue; // skip root nodes
                }
                let bb = post_order[idx];

                let mut preds = graph
                    .preds(bb)
                    .iter()
                    .map(|bb| inv_post_order[bb.index()])
                    .filter(|&p| doms[p as usize] != undef);
                let new_idom = preds.next().expect("block has no processed predecessor");
                let new_idom = preds.fold(new_idom, |mut i1, mut i2| {
                    let i1_init = i1;
                    while i1 != i2 {
                        if i1 < i2 {
                            if i1 == doms[i1 as usize] {
                                return i1;
                            }
                            i1 = doms[i1 as usize];
                        } else if i2 < i1 {
                            if i2 == doms[i2 as usize] {
                                return i1_init;
                            }
                            i2 = doms[i2 as usize];
                        }
                    }
                    i1
                });
                debug_assert!(new_idom < length as u32);
                if doms[idx] != new_idom {
                    doms[idx] = new_idom;
                    changed = true;
                }
            }
        }

        let mut doms_final = vec![Block::new(0); graph.blocks.id_bound()];
        for bb in &post_order {
            doms_final[bb.index()] = post_order[doms[inv_post_order[bb.index()] as usize] as usize];
        }

        let pre_order = Self::compute_tree_pre_order(graph, &doms_final);

        let t1 = time::precise_time_ns();
        DOMINATOR_TREE_TIME.fetch_add(t1 - t0, Ordering::Relaxed);

        Self {
            doms: doms_final,
            post_order,
            inv_post_order,
            pre_order,
        }
    }

    fn compute_blocks_post_order(graph: &Graph) -> Vec<Block> {
        let mut order = Vec::with_capacity(graph.layout.len());

        let mut stack = Vec::with_capacity(8);
        let mut discovered = BitSet::with_capacity(graph.blocks.id_bound() as u32);
        let mut finished = BitSet::with_capacity(graph.blocks.id_bound() as u32);

        stack.push(graph.entry());
        stack.extend(
            graph
                .blocks()
                .filter(|&bb| bb != graph.entry() && graph.preds(bb).is_empty()),
        );

        while let Some(&next) = stack.last() {
            if !discovered.add(next.index() as u32) {
                for &succ in graph.succs(next) {
                    if !discovered.contains(succ.index() as u32) {
                        stack.push(succ);
                    }
                }
            } else {
                stack.pop();
                if !finished.add(next.index() as u32) {
                    order.push(next);
                }
            }
        }

        order
    }

    fn compute_tree_pre_order(graph: &Graph, doms: &[Block]) -> Vec<Block> {
        let mut children = vec![vec![]; graph.blocks.id_bound()];
        let mut roots = vec![];
        for bb in graph.blocks() {
            let idom = doms[bb.index()];
            if idom == bb {
                roots.push(bb);
            } else {
                children[idom.index()].push(bb);
            }
        }

        let mut order = Vec::with_capacity(graph.layout.len());
        let mut stack: Vec<Block> = roots.into_iter().rev().collect();
        while let Some(bb) = stack.pop() {
            order.push(bb);
            stack.extend(children[bb.index()].iter().rev().cloned());
        }
        order
    }

    /// Get the blocks in the original CFG in post-order.
    pub fn blocks_post_order(&self) -> &[Block] {
        &self.post_order
    }

    /// Get the blocks in dominator-tree pre-order.
    ///
    /// Every block appears after its immediate dominator. Passes that inherit
    /// per-block state from the dominator walk this array front to back.
    pub fn blocks_pre_order(&self) -> &[Block] {
        &self.pre_order
    }

    /// Get the post-order index of a block.
    pub fn block_order(&self, block: Block) -> usize {
        self.inv_post_order[block.index()] as usize
    }

    /// Get the immediate dominator of a block.
    ///
    /// The entry block is its own dominator.
    pub fn dominator(&self, block: Block) -> Block {
        self.doms[block.index()]
    }

    /// Check if a block dominates another block.
    pub fn dominates(&self, parent: Block, mut child: Block) -> bool {
        while parent != child {
            let next = self.dominator(child);
            if next == child {
                // Arrived at the root of the tree. Did not encounter the
                // suspected parent, so no domination.
                return false;
            }
            child = next;
        }
        true
    }

    /// Check if a node dominates a block.
    pub fn node_dominates_block(&self, graph: &Graph, node: Node, block: Block) -> bool {
        self.dominates(graph.node_block(node), block)
    }
}

/// Total time spent constructing dominator trees.
pub static DOMINATOR_TREE_TIME: AtomicU64 = AtomicU64::new(0);

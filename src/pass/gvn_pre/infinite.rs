// Copyright (c) 2017-2021 Fabian Schuiki

//! Endless loop classification.
//!
//! A loop with no path to the exit never constrains the values computed
//! inside it, so the anticipability fixed point would keep translating its
//! expressions around the back edge and grow without bound. This walk marks
//! the outermost real loop around every such region; the solver consults the
//! marks to keep those blocks out of the sets.

use crate::analysis::{DominatorTree, LoopForest};
use crate::{ir::prelude::*, table::TableKey};
use hibitset::BitSet;

/// Flag the outermost real loop of every endless region in the graph.
///
/// Blocks are visited bottom-up, successors first, with the exit pre-marked
/// reachable. A block is reachable if one of its successors is, or if it sits
/// outside any loop. An unreachable block inside a loop flags its outermost
/// real loop as endless; its predecessors inside the same outermost loop
/// stay unreachable, while predecessors outside it become reachable.
pub fn flag_endless_loops(graph: &Graph, domtree: &DominatorTree, forest: &mut LoopForest) {
    let mut reachable = BitSet::with_capacity(graph.blocks.id_bound() as u32);
    reachable.add(graph.exit().index() as u32);

    for &bb in domtree.blocks_post_order() {
        if bb == graph.exit() || reachable.contains(bb.index() as u32) {
            continue;
        }
        let exits = graph
            .succs(bb)
            .iter()
            .any(|&succ| reachable.contains(succ.index() as u32));
        if exits {
            reachable.add(bb.index() as u32);
            continue;
        }
        let id = match forest.loop_of(bb) {
            Some(id) => id,
            None => {
                reachable.add(bb.index() as u32);
                continue;
            }
        };
        let outermost = forest.outermost(id);
        debug!("{} cannot reach the exit, {} is endless", bb, outermost);
        forest.set_endless(outermost);
        for &pred in graph.preds(bb) {
            let same = forest
                .loop_of(pred)
                .map(|p| forest.outermost(p) == outermost)
                .unwrap_or(false);
            if !same {
                reachable.add(pred.index() as u32);
            }
        }
    }
}

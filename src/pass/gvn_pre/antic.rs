// Copyright (c) 2017-2021 Fabian Schuiki

//! Availability and anticipability.
//!
//! Three phases feed the insertion engine: a topological walk that numbers
//! every node and seeds the per-block generated and available sets, a
//! dominator-tree walk that completes availability by inheritance, and the
//! backward fixed point that computes which values are anticipated at the
//! top of every block, translating expressions through phis at merges.

use super::{GvnPreFlags, PreEnv, MAX_ANTIC_ITER};
use crate::ir::prelude::*;
use itertools::Itertools;

impl<'a> PreEnv<'a> {
    /// Number every node and seed `exp_gen` and `avail_out` of its block.
    ///
    /// Blocks are visited in reverse post-order and nodes in their in-block
    /// topological order, so operands are always numbered before their users.
    pub(super) fn compute_block_local(&mut self) {
        let mut order: Vec<Block> = self.domtree.blocks_post_order().to_vec();
        order.reverse();
        for bb in order {
            for node in self.graph.nodes(bb).to_vec() {
                let value = self.value_of(node);
                if !self.is_nice_value(node) {
                    continue;
                }
                // Constants reproduce anywhere and stay out of the sets.
                if self.graph[node].opcode().is_const() {
                    continue;
                }
                self.infos[bb].avail_out.insert(value, node);
                let clean = self.is_clean_in_block(node, bb, &self.infos[bb].exp_gen);
                if clean {
                    self.infos[bb].exp_gen.insert(value, node);
                }
            }
            trace!(
                "exp_gen[{}]: {{{}}}",
                bb,
                self.infos[bb]
                    .exp_gen
                    .iter()
                    .map(|(value, expr)| format!("{}:{}", value, expr))
                    .join(", ")
            );
        }
    }

    /// Complete `avail_out` by dominator inheritance.
    ///
    /// Each block overwrites its own entries with the leaders of its
    /// immediate dominator, so the leader used anywhere in the block is the
    /// one from the dominating context rather than a local recomputation.
    pub(super) fn compute_avail_top_down(&mut self) {
        let entry = self.graph.entry();
        let exit = self.graph.exit();
        for bb in self.domtree.blocks_pre_order().to_vec() {
            if bb == entry || bb == exit {
                continue;
            }
            let idom = self.domtree.dominator(bb);
            if idom == bb {
                continue;
            }
            for (value, expr) in self.infos[idom].avail_out.entries() {
                self.infos[bb].avail_out.replace(value, expr);
            }
        }
    }

    /// Translate an expression from the top of `succ` to the bottom of the
    /// predecessor at phi-input position `pos`.
    ///
    /// A phi placed in `succ` becomes its input at `pos`; phis of other
    /// blocks pass through unchanged. For any other expression the inputs
    /// are rewritten through the leaders anticipated in `succ` and the
    /// predecessor's translation cache. If no input changes its value the
    /// expression itself is returned; otherwise a twin node is materialized
    /// in the predecessor as a value representative.
    pub(super) fn phi_translate(&mut self, node: Node, succ: Block, pos: usize) -> Node {
        let pred_block = self.graph.preds(succ)[pos];
        let data = self.graph[node].clone();
        if data.opcode().is_phi() {
            if self.graph.node_block(node) == succ {
                return data.args()[pos];
            }
            return node;
        }
        let mut needed = false;
        let mut new_args = data.args().to_vec();
        for (i, &arg) in data.args().iter().enumerate() {
            let arg_value = self.value_of(arg);
            let leader = self.infos[succ]
                .antic_in
                .lookup(arg_value)
                .unwrap_or(arg);
            let trans = self.infos[pred_block]
                .trans
                .get(&leader)
                .cloned()
                .unwrap_or(arg);
            let trans_value = self.value_of(trans);
            if trans_value != arg_value {
                needed = true;
            }
            new_args[i] = trans;
        }
        if !needed {
            return node;
        }
        let twin = self.graph.add_node(pred_block, data.with_args(&new_args));
        let value = self.value_of(twin);
        trace!(
            "Translated {} across {}[{}] into {} ({})",
            node,
            succ,
            pos,
            twin,
            value
        );
        self.created.push(twin);
        twin
    }

    /// Run the anticipability fixed point.
    pub(super) fn compute_antic(&mut self) {
        let order = self.domtree.blocks_post_order().to_vec();
        let exit = self.graph.exit();
        loop {
            self.antic_iteration += 1;
            let mut changed = false;
            for &bb in &order {
                if bb == exit {
                    continue;
                }
                changed |= self.compute_antic_in(bb);
            }
            trace!(
                "Antic iteration {} done, changed: {}",
                self.antic_iteration,
                changed
            );
            if !changed || self.antic_iteration >= MAX_ANTIC_ITER {
                break;
            }
        }
    }

    /// Recompute `antic_in` of one block. Returns true if the set grew.
    fn compute_antic_in(&mut self, bb: Block) -> bool {
        let size_before = self.infos[bb].antic_in.len();

        // Values generated here are anticipated here. Blocks of endless
        // loops are left unseeded: nothing downstream ever constrains their
        // values, and seeding them would let the sets grow with every
        // translation around the loop.
        if self.antic_iteration == 1 {
            let seed = !(self.flags.contains(GvnPreFlags::NO_INF_LOOPS)
                && self.forest.in_endless_loop(bb));
            if seed {
                for (value, expr) in self.infos[bb].exp_gen.entries() {
                    self.infos[bb].antic_in.insert(value, expr);
                }
            }
        }

        let succs = self.graph.succs(bb).to_vec();
        match succs.len() {
            0 => {}
            1 => self.antic_via_translation(bb, succs[0]),
            _ => self.antic_via_intersection(bb, &succs),
        }

        self.infos[bb].antic_in.len() > size_before
    }

    /// Pull the successor's anticipated values across the merge, translating
    /// each expression into this block.
    fn antic_via_translation(&mut self, bb: Block, succ: Block) {
        if self.flags.contains(GvnPreFlags::NO_INF_LOOPS2)
            && self.antic_iteration <= 2
            && self.is_endless_back_edge(bb, succ)
        {
            trace!("Skipping endless back edge {} -> {}", bb, succ);
            return;
        }

        let pos = self
            .graph
            .preds(succ)
            .iter()
            .position(|&p| p == bb)
            .expect("block missing from successor's predecessors");

        for (value, expr) in self.infos[succ].antic_in.entries() {
            let cached = self.infos[bb].trans.get(&expr).cloned();
            let trans = match cached {
                Some(trans) => trans,
                None => self.phi_translate(expr, succ, pos),
            };
            let trans_value = self.value_of(trans);
            // When a phi rewrote part of the expression, carry the translated
            // node so later iterations keep translating from the right spot.
            let repr = if trans_value != value { trans } else { expr };
            let clean = self.is_clean_in_block(expr, bb, &self.infos[bb].antic_in);
            if clean {
                self.infos[bb].antic_in.replace(trans_value, repr);
            }
            self.infos[bb].trans.insert(expr, repr);
        }
    }

    /// Keep only the values anticipated by every successor.
    fn antic_via_intersection(&mut self, bb: Block, succs: &[Block]) {
        for (value, expr) in self.infos[succs[0]].antic_in.entries() {
            let everywhere = succs[1..]
                .iter()
                .all(|&succ| self.infos[succ].antic_in.lookup(value).is_some());
            if !everywhere {
                continue;
            }
            let clean = self.is_clean_in_block(expr, bb, &self.infos[bb].antic_in);
            if clean {
                self.infos[bb].antic_in.replace(value, expr);
            }
        }
    }

    /// Check if the edge `bb -> succ` is a back edge into an endless loop.
    fn is_endless_back_edge(&self, bb: Block, succ: Block) -> bool {
        if !self.domtree.dominates(succ, bb) {
            return false;
        }
        match self.forest.loop_of(succ) {
            Some(id) => {
                self.forest.loop_data(id).header == succ
                    && self.forest.is_endless(self.forest.outermost(id))
            }
            None => false,
        }
    }
}

// Copyright (c) 2017-2021 Fabian Schuiki

//! The insertion engine.
//!
//! Walks the dominator tree in pre-order and, for every join block, decides
//! which anticipated values are partially redundant: available on some but
//! not all predecessors. Such a value gets a copy synthesized into every
//! predecessor that misses it and a phi merging the per-predecessor
//! expressions, which turns later occurrences into full redundancies for the
//! eliminator.

use super::{PreEnv, Val};
use crate::ir::prelude::*;
use itertools::Itertools;

impl<'a> PreEnv<'a> {
    /// Run one insertion iteration over the dominator tree in pre-order.
    ///
    /// Pre-order matters: a block inherits the values its immediate
    /// dominator hoisted in the same iteration.
    pub(super) fn insert_nodes_walk(&mut self) {
        let entry = self.graph.entry();
        for bb in self.domtree.blocks_pre_order().to_vec() {
            self.insert_nodes_in_block(bb, entry);
        }
    }

    fn insert_nodes_in_block(&mut self, bb: Block, entry: Block) {
        self.infos[bb].new_set.clear();
        if bb == entry || self.graph.preds(bb).len() < 2 {
            return;
        }

        // The dominator's freshly hoisted values become the leaders here.
        let idom = self.domtree.dominator(bb);
        for (value, expr) in self.infos[idom].new_set.entries() {
            self.infos[bb].new_set.insert(value, expr);
            self.infos[bb].avail_out.replace(value, expr);
        }

        for (value, expr) in self.infos[bb].antic_in.entries() {
            if self.infos[bb].antic_done.lookup(value).is_some() {
                continue;
            }
            if self.graph[expr].opcode().is_phi() {
                continue;
            }

            // Available in the dominator: fully redundant here, nothing to
            // hoist. The eliminator takes care of the exchange.
            if self.infos[idom].avail_out.lookup(value).is_some() {
                self.infos[bb].antic_done.insert(value, expr);
                continue;
            }

            if self.is_hoisting_greedy(expr, bb) {
                trace!("Skipping greedy {} in {}", expr, bb);
                continue;
            }

            let mode = match self.is_partially_redundant(bb, expr, value) {
                Some(mode) => mode,
                None => continue,
            };

            let preds = self.graph.preds(bb).to_vec();
            let mut phi_ins = Vec::with_capacity(preds.len());
            for &pred in &preds {
                if !self.infos[pred].found {
                    let trans = self.infos[pred].avail.expect("translation missing");
                    let copy = self.construct_copy(trans, pred);
                    self.infos[pred].avail = Some(copy);
                }
                phi_ins.push(self.infos[pred].avail.expect("no available expression"));
            }

            // Tuple-mode operations get no phi of their own; their users phi
            // the individual projections.
            if mode == Mode::Tuple {
                self.infos[bb].antic_done.insert(value, expr);
                self.changes = true;
                continue;
            }

            let phi = self.graph.new_phi(bb, phi_ins, mode);
            self.value_of(phi);
            debug!(
                "Created {} in {} for partially redundant {} ({})",
                phi, bb, expr, value
            );
            self.stats.phis += 1;
            self.infos[bb].avail_out.replace(value, phi);
            self.infos[bb].new_set.insert(value, phi);
            self.infos[bb].antic_done.insert(value, expr);
            self.changes = true;
        }
    }

    /// Check if hoisting an expression into the predecessors of `bb` would
    /// drag non-redundant operands along.
    ///
    /// An operand other than a phi of `bb` must be a small constant or
    /// already be available on every predecessor; otherwise the hoisted copy
    /// would have to recompute the operand there, increasing the dynamic
    /// instruction count.
    fn is_hoisting_greedy(&self, expr: Node, bb: Block) -> bool {
        for &pred in self.graph.preds(bb) {
            for &arg in self.graph[expr].args() {
                let arg_op = self.graph[arg].opcode();
                if arg_op.is_phi() && self.graph.node_block(arg) == bb {
                    continue;
                }
                if self.is_small_const(arg) {
                    continue;
                }
                let value = match self.values.lookup(arg) {
                    Some(value) => value,
                    None => return true,
                };
                if self.infos[pred].avail_out.lookup(value).is_none() {
                    return true;
                }
            }
        }
        false
    }

    /// Decide whether a value is partially redundant at `bb`.
    ///
    /// Translates the expression into every predecessor and looks the
    /// translated value up in the predecessor's `avail_out`. Translations
    /// that collapse to a small constant count as available even without an
    /// availability entry. Records the per-predecessor outcome in the
    /// predecessors' scratch fields and returns the mode to phi with, or
    /// `None` when the value is fully redundant, fully absent, or mixed in a
    /// way hoisting cannot improve.
    fn is_partially_redundant(&mut self, bb: Block, expr: Node, value: Val) -> Option<Mode> {
        let preds = self.graph.preds(bb).to_vec();
        let mut partially_redundant = false;
        let mut fully_redundant = true;
        let mut hits = vec![];

        for (pos, &pred) in preds.iter().enumerate() {
            let cached = self.infos[pred].trans.get(&expr).cloned();
            let trans = match cached {
                Some(trans) => trans,
                None => {
                    let trans = self.phi_translate(expr, bb, pos);
                    self.infos[pred].trans.insert(expr, trans);
                    trans
                }
            };
            let trans_value = self.value_of(trans);
            let mut avail = self.infos[pred].avail_out.lookup(trans_value);
            if avail.is_none() && self.is_small_const(trans) {
                avail = Some(trans);
            }
            match avail {
                Some(found) => {
                    self.infos[pred].found = true;
                    self.infos[pred].avail = Some(found);
                    partially_redundant = true;
                    hits.push(found);
                    trace!("{} is available on {} as {}", expr, pred, found);
                }
                None => {
                    self.infos[pred].found = false;
                    self.infos[pred].avail = Some(trans);
                    fully_redundant = false;
                }
            }
        }

        // All predecessors agreeing on one expression is the fully redundant
        // case already handled through the dominator, and hoisting into
        // every predecessor of a fully absent value would only lengthen the
        // paths.
        let fully_redundant = fully_redundant && hits.iter().all_equal();
        if partially_redundant && !fully_redundant {
            Some(self.graph[hits[0]].mode())
        } else {
            None
        }
    }

    /// Materialize a copy of a translated expression in a predecessor,
    /// rewriting each operand to the predecessor's available leader.
    fn construct_copy(&mut self, trans: Node, pred: Block) -> Node {
        let data = self.graph[trans].clone();
        let mut new_args = data.args().to_vec();
        for (i, &arg) in data.args().iter().enumerate() {
            let value = self.value_of(arg);
            new_args[i] = self.infos[pred].avail_out.lookup(value).unwrap_or(arg);
        }
        let copy = self.graph.add_node(pred, data.with_args(&new_args));
        let value = self.value_of(copy);
        self.infos[pred].avail_out.insert(value, copy);
        self.inserted.push(copy);
        self.stats.copies += 1;
        debug!("Inserted {} in {}", self.graph.dump(copy), pred);
        copy
    }

    /// Migrate this iteration's copies up the dominator tree.
    ///
    /// A copy whose operands have no user other than the copy itself can
    /// move to the deepest operand-defining block without lengthening any
    /// operand's live range, which frees up registers on the paths in
    /// between.
    pub(super) fn hoist_high(&mut self) {
        let inserted = std::mem::replace(&mut self.inserted, vec![]);
        for node in inserted {
            if !self.graph.contains_node(node) {
                continue;
            }
            let bb = self.graph.node_block(node);
            let args = self.graph[node].args().to_vec();
            if args.is_empty() {
                continue;
            }
            let dying = args
                .iter()
                .all(|&arg| self.graph.uses(arg).all(|(user, _)| user == node));
            if !dying {
                continue;
            }

            // The deepest operand block; bail out when the operand blocks
            // are not totally ordered by dominance.
            let mut target: Option<Block> = None;
            let mut ordered = true;
            for &arg in &args {
                let arg_bb = self.graph.node_block(arg);
                target = match target {
                    None => Some(arg_bb),
                    Some(t) if self.domtree.dominates(t, arg_bb) => Some(arg_bb),
                    Some(t) if self.domtree.dominates(arg_bb, t) => Some(t),
                    Some(_) => {
                        ordered = false;
                        break;
                    }
                };
            }
            let target = match (ordered, target) {
                (true, Some(t)) => t,
                _ => continue,
            };
            if target == bb || !self.domtree.dominates(target, bb) {
                continue;
            }

            debug!("Hoisting {} high from {} into {}", node, bb, target);
            self.graph.set_node_block(node, target);
            if let Some(value) = self.values.lookup(node) {
                self.infos[target].avail_out.insert(value, node);
            }
            self.stats.hoisted_high += 1;
        }
    }
}

// Copyright (c) 2017-2021 Fabian Schuiki

//! The eliminator.
//!
//! Walks every node and queues an exchange against the leader of its value
//! in the surrounding block, if one exists. Exchanges are deferred: swapping
//! nodes while the walk still inspects them would change the identities the
//! value sets are keyed on. The drain collapses degenerate phis before
//! redirecting uses.

use super::PreEnv;
use crate::{ir::prelude::*, table::TableKey};
use std::collections::HashMap;

/// Why a node is being exchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum ElimReason {
    /// The leader predates this run of the pass.
    FullyRedundant,
    /// The leader was created by this run.
    PartiallyRedundant,
}

/// A deferred replacement of one node by another.
#[derive(Debug, Clone, Copy)]
pub(super) struct ElimPair {
    pub old: Node,
    pub new: Node,
    pub reason: ElimReason,
}

impl<'a> PreEnv<'a> {
    /// Queue an exchange for every node whose block has a distinct leader
    /// for the node's value.
    pub(super) fn eliminate(&mut self) {
        for bb in self.graph.blocks().collect::<Vec<_>>() {
            for node in self.graph.nodes(bb).to_vec() {
                let value = match self.values.lookup(node) {
                    Some(value) => value,
                    None => continue,
                };
                let leader = match self.infos[bb].avail_out.lookup(value) {
                    Some(leader) => leader,
                    None => continue,
                };
                if leader == node {
                    continue;
                }
                let reason = if leader.index() < self.last_idx {
                    ElimReason::FullyRedundant
                } else {
                    ElimReason::PartiallyRedundant
                };
                trace!("Queueing {} -> {} ({:?})", node, leader, reason);
                self.pairs.push(ElimPair {
                    old: node,
                    new: leader,
                    reason,
                });
            }
        }
    }

    /// Perform the queued exchanges.
    pub(super) fn drain_pairs(&mut self) {
        let pairs = std::mem::replace(&mut self.pairs, vec![]);
        let mut forwarded = HashMap::<Node, Node>::new();
        for pair in pairs {
            if !self.graph.contains_node(pair.old) {
                continue;
            }
            let mut new = pair.new;
            while let Some(&next) = forwarded.get(&new) {
                new = next;
            }
            if new == pair.old || !self.graph.contains_node(new) {
                continue;
            }

            // A phi whose inputs are all the replaced node or one single
            // other expression merges nothing; the replacement collapses to
            // that expression.
            if self.graph[new].opcode().is_phi() {
                if let Some(collapsed) = self.degenerate_phi(new, pair.old) {
                    debug!("Collapsing degenerate {} to {}", new, collapsed);
                    self.graph.exchange(new, collapsed);
                    forwarded.insert(new, collapsed);
                    new = collapsed;
                    if new == pair.old {
                        continue;
                    }
                }
            }

            debug!(
                "Exchanging {} for {} ({:?})",
                self.graph.dump(pair.old),
                new,
                pair.reason
            );
            self.graph.exchange(pair.old, new);
            forwarded.insert(pair.old, new);
            self.stats.exchanged += 1;
        }
    }

    /// Check if a phi merges nothing but `old` and one other expression.
    fn degenerate_phi(&self, phi: Node, old: Node) -> Option<Node> {
        let mut other = None;
        for &input in self.graph[phi].args() {
            if input == old || input == phi {
                continue;
            }
            match other {
                None => other = Some(input),
                Some(o) if o == input => {}
                Some(_) => return None,
            }
        }
        other
    }
}

// Copyright (c) 2017-2021 Fabian Schuiki

//! Global Value Numbering with Partial Redundancy Elimination
//!
//! This pass implements the VanDrunen and Hosking (2004) formulation of
//! GVN-PRE. Expressions are numbered into equivalence classes over the whole
//! graph; a backward fixed point computes which values are anticipated at the
//! top of every block, translating expressions through phis at control-flow
//! merges; expressions that are available on some but not all predecessors of
//! a join are copied into the predecessors that miss them and merged by a new
//! phi; finally every node whose value has a leader is exchanged for that
//! leader.

use crate::{
    analysis::{DominatorTree, LoopForest},
    ir::prelude::*,
    opt::prelude::*,
    table::SecondaryTable,
};
use bitflags::bitflags;

mod antic;
mod elim;
mod infinite;
mod insert;
mod sets;
mod value_table;

pub use self::sets::{BlockInfo, ValueSet};
pub use self::value_table::{Val, ValueTable};

use self::elim::ElimPair;

/// Maximum number of anticipability fixed-point iterations.
const MAX_ANTIC_ITER: usize = 10;
/// Maximum number of insertion iterations.
const MAX_INSERT_ITER: usize = 3;
/// Constants within `[-CONST_RANGE, CONST_RANGE]` are treated as freely
/// available on any path, even when no node computes them there.
const CONST_RANGE: i64 = 127;

bitflags! {
    /// Configuration of the GVN-PRE pass. All bits default to off.
    pub struct GvnPreFlags: u32 {
        /// Treat load results as candidate values. Requires the IR to support
        /// phi translation of memory operations.
        const LOADS = 1 << 0;
        /// Treat division and remainder as candidate values. Requires
        /// extended availability for pinned nodes.
        const DIVMODS = 1 << 1;
        /// Legacy division handling.
        const OLD_DIVMODS = 1 << 2;
        /// After hoisting, migrate copies further up the dominator tree to
        /// where their operands die.
        const HOIST_HIGH = 1 << 3;
        /// Hoist-placement variant of `HOIST_HIGH`.
        const COMMON_DOM = 1 << 4;
        /// Hoist-placement variant of `HOIST_HIGH`.
        const MIN_CUT = 1 << 5;
        /// Unfinished relaxation of the hoisting greediness check.
        const BETTER_GREED = 1 << 6;
        /// Keep values of endless loops out of the anticipability sets.
        const NO_INF_LOOPS = 1 << 7;
        /// Skip early anticipability propagation across back edges of
        /// endless loops.
        const NO_INF_LOOPS2 = 1 << 8;
    }
}

impl Default for GvnPreFlags {
    fn default() -> Self {
        GvnPreFlags::empty()
    }
}

/// Global Value Numbering with Partial Redundancy Elimination
pub struct GvnPre {
    /// The configuration of the pass.
    pub flags: GvnPreFlags,
}

impl GvnPre {
    /// Create the pass with default configuration.
    pub fn new() -> Self {
        Self {
            flags: GvnPreFlags::empty(),
        }
    }

    /// Create the pass with an explicit configuration.
    pub fn with_flags(flags: GvnPreFlags) -> Self {
        Self { flags }
    }
}

impl Default for GvnPre {
    fn default() -> Self {
        Self::new()
    }
}

impl Pass for GvnPre {
    fn run_on_graph(&self, _ctx: &PassContext, graph: &mut Graph) -> bool {
        info!("GVN-PRE [{}]", graph.name());

        let unsupported = GvnPreFlags::LOADS
            | GvnPreFlags::DIVMODS
            | GvnPreFlags::OLD_DIVMODS
            | GvnPreFlags::COMMON_DOM
            | GvnPreFlags::MIN_CUT
            | GvnPreFlags::BETTER_GREED;
        assert!(
            !self.flags.intersects(unsupported),
            "GVN-PRE configuration {:?} requires collaborator support this IR does not provide",
            self.flags & unsupported
        );

        // The pass requires split critical edges: a join block's predecessors
        // must each have the join as their sole successor, otherwise hoisted
        // copies would execute on unrelated paths.
        for bb in graph.blocks() {
            if graph.succs(bb).len() > 1 {
                for &succ in graph.succs(bb) {
                    assert!(
                        graph.preds(succ).len() <= 1,
                        "critical edge {} -> {}",
                        bb,
                        succ
                    );
                }
            }
        }

        let domtree = DominatorTree::new(graph);
        let mut forest = LoopForest::new(graph, &domtree);
        if self
            .flags
            .intersects(GvnPreFlags::NO_INF_LOOPS | GvnPreFlags::NO_INF_LOOPS2)
        {
            infinite::flag_endless_loops(graph, &domtree, &mut forest);
        }

        let last_idx = graph.node_id_bound();
        let mut env = PreEnv {
            graph,
            flags: self.flags,
            domtree,
            forest,
            values: ValueTable::new(),
            infos: SecondaryTable::new(),
            last_idx,
            pairs: vec![],
            created: vec![],
            inserted: vec![],
            changes: false,
            antic_iteration: 0,
            stats: Stats::default(),
        };
        env.run()
    }
}

/// Counters reported at the end of a run.
#[derive(Debug, Default)]
struct Stats {
    /// Copies synthesized into predecessors.
    copies: u32,
    /// Phis created in join blocks.
    phis: u32,
    /// Copies migrated further up the dominator tree.
    hoisted_high: u32,
    /// Nodes exchanged for their leaders.
    exchanged: u32,
}

/// The state of one GVN-PRE run over a graph.
struct PreEnv<'a> {
    graph: &'a mut Graph,
    flags: GvnPreFlags,
    domtree: DominatorTree,
    forest: LoopForest,
    values: ValueTable,
    infos: SecondaryTable<Block, BlockInfo>,
    /// Node index watermark taken before the pass created anything; nodes at
    /// or above this index were created by this run.
    last_idx: usize,
    /// Deferred exchanges, drained once at the end.
    pairs: Vec<ElimPair>,
    /// Nodes materialized by phi translation as value representatives.
    /// Whatever remains unused at the end is pruned again.
    created: Vec<Node>,
    /// Copies synthesized during the current insertion iteration.
    inserted: Vec<Node>,
    /// Whether the current insertion iteration changed anything.
    changes: bool,
    /// The 1-based index of the current anticipability iteration.
    antic_iteration: usize,
    stats: Stats,
}

impl<'a> PreEnv<'a> {
    fn run(&mut self) -> bool {
        for bb in self.graph.blocks().collect::<Vec<_>>() {
            self.infos.add(bb, BlockInfo::new());
        }

        self.compute_block_local();
        self.compute_avail_top_down();
        self.compute_antic();

        let mut modified = false;
        let mut iteration = 0;
        loop {
            iteration += 1;
            self.changes = false;
            self.insert_nodes_walk();
            if self.flags.contains(GvnPreFlags::HOIST_HIGH) {
                self.hoist_high();
            } else {
                self.inserted.clear();
            }
            modified |= self.changes;
            trace!(
                "Insertion iteration {} done, changes: {}",
                iteration,
                self.changes
            );
            if !self.changes || iteration >= MAX_INSERT_ITER {
                break;
            }
        }

        self.eliminate();
        modified |= !self.pairs.is_empty();
        self.drain_pairs();
        self.cleanup();

        debug!(
            "GVN-PRE [{}] done: {} copies, {} phis, {} hoisted high, {} exchanged",
            self.graph.name(),
            self.stats.copies,
            self.stats.phis,
            self.stats.hoisted_high,
            self.stats.exchanged
        );
        modified
    }

    /// Get the value of a node, remembering it if necessary.
    fn value_of(&mut self, node: Node) -> Val {
        self.values.value(&*self.graph, node)
    }

    /// Check if a node is a constant within the freely available range.
    fn is_small_const(&self, node: Node) -> bool {
        use num::ToPrimitive;
        match self.graph.get_const_int(node) {
            Some(imm) => imm
                .to_i64()
                .map(|v| v >= -CONST_RANGE && v <= CONST_RANGE)
                .unwrap_or(false),
            None => false,
        }
    }

    /// Check if a node is a candidate for redundancy elimination.
    ///
    /// Phis qualify. Projections do not, as long as the memory-aware
    /// configurations are off. Pinned operations are tied to their block and
    /// never move. Of the non-data operations only division and remainder
    /// may qualify, and only when unpinned by the corresponding
    /// configuration.
    fn is_nice_value(&self, node: Node) -> bool {
        let data = &self.graph[node];
        let opcode = data.opcode();
        if opcode.is_phi() {
            return true;
        }
        if opcode.is_proj() {
            return false;
        }
        if opcode.is_pinned() {
            return false;
        }
        if !data.mode().is_data() && !opcode.is_div_or_mod() {
            return false;
        }
        true
    }

    /// Check if an expression can participate in phi translation at the top
    /// of `bb`: every non-phi operand defined in `bb` must itself be nice and
    /// already be present as a value in `set`.
    fn is_clean_in_block(&self, node: Node, bb: Block, set: &ValueSet) -> bool {
        let data = &self.graph[node];
        if data.opcode().is_phi() {
            return true;
        }
        if !self.is_nice_value(node) {
            return false;
        }
        for &arg in data.args() {
            let arg_op = self.graph[arg].opcode();
            if arg_op.is_phi() || arg_op.is_const() {
                continue;
            }
            if self.graph.node_block(arg) != bb {
                continue;
            }
            if !self.is_nice_value(arg) {
                return false;
            }
            let value = match self.values.lookup(arg) {
                Some(value) => value,
                None => return false,
            };
            if set.lookup(value).is_none() {
                return false;
            }
        }
        true
    }

    /// Drop the translation artifacts that nothing ended up using.
    fn cleanup(&mut self) {
        let created = std::mem::replace(&mut self.created, vec![]);
        loop {
            let mut any = false;
            for &node in created.iter().rev() {
                any |= self.graph.prune_if_unused(node);
            }
            if !any {
                break;
            }
        }
    }
}

// Copyright (c) 2017-2021 Fabian Schuiki

//! The per-procedure graph container.
//!
//! A `Graph` owns the nodes and blocks of one procedure. Blocks record their
//! control-flow predecessors and successors directly; phi inputs align with
//! the predecessor list of their block. Node lists within a block are kept
//! topologically sorted: definitions precede their in-block uses, with phis
//! at the front.

use crate::{
    impl_table_indexing,
    ir::{Block, Mode, Node, NodeData, Opcode},
    table::{PrimaryTable, SecondaryTable},
};
use num::BigInt;

/// The control-flow data of a single block.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlockData {
    /// The predecessor blocks, in phi-input order.
    pub(crate) preds: Vec<Block>,
    /// The successor blocks.
    pub(crate) succs: Vec<Block>,
    /// The nodes placed in this block, in topological order.
    pub(crate) nodes: Vec<Node>,
}

/// A procedure graph.
#[derive(Serialize, Deserialize)]
pub struct Graph {
    pub(crate) name: String,
    pub(crate) nodes: PrimaryTable<Node, NodeData>,
    pub(crate) blocks: PrimaryTable<Block, BlockData>,
    /// Blocks in creation order, entry first.
    pub(crate) layout: Vec<Block>,
    /// The block each node is placed in.
    pub(crate) node_blocks: SecondaryTable<Node, Block>,
    entry: Block,
    exit: Block,
}

impl_table_indexing!(Graph, nodes, Node, NodeData);
impl_table_indexing!(Graph, blocks, Block, BlockData);

impl Graph {
    /// Create a new graph with an entry and an exit block.
    pub fn new(name: impl Into<String>) -> Self {
        let mut blocks = PrimaryTable::new();
        let entry = blocks.add(BlockData::default());
        let exit = blocks.add(BlockData::default());
        Self {
            name: name.into(),
            nodes: PrimaryTable::new(),
            blocks,
            layout: vec![entry, exit],
            node_blocks: SecondaryTable::new(),
            entry,
            exit,
        }
    }

    /// Get the name of the graph.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the entry block.
    pub fn entry(&self) -> Block {
        self.entry
    }

    /// Get the exit block.
    pub fn exit(&self) -> Block {
        self.exit
    }

    /// Create a new block.
    pub fn add_block(&mut self) -> Block {
        let bb = self.blocks.add(BlockData::default());
        self.layout.push(bb);
        bb
    }

    /// Add a control-flow edge between two blocks.
    ///
    /// The edge is appended to `to`'s predecessor list; phis in `to` must
    /// align their inputs with that list.
    pub fn add_edge(&mut self, from: Block, to: Block) {
        self.blocks[from].succs.push(to);
        self.blocks[to].preds.push(from);
    }

    /// Iterate over the blocks in layout order.
    pub fn blocks<'a>(&'a self) -> impl Iterator<Item = Block> + 'a {
        self.layout.iter().cloned()
    }

    /// Get the predecessors of a block.
    pub fn preds(&self, bb: Block) -> &[Block] {
        &self.blocks[bb].preds
    }

    /// Get the successors of a block.
    pub fn succs(&self, bb: Block) -> &[Block] {
        &self.blocks[bb].succs
    }

    /// Get the nodes placed in a block, in topological order.
    pub fn nodes(&self, bb: Block) -> &[Node] {
        &self.blocks[bb].nodes
    }

    /// Get the block a node is placed in.
    pub fn node_block(&self, node: Node) -> Block {
        self.node_blocks[node]
    }

    /// Move a node to another block, appending it there.
    pub fn set_node_block(&mut self, node: Node, bb: Block) {
        let old = self.node_blocks[node];
        if old == bb {
            return;
        }
        let list = &mut self.blocks[old].nodes;
        let pos = list.iter().position(|&n| n == node).expect("node not in block");
        list.remove(pos);
        self.blocks[bb].nodes.push(node);
        self.node_blocks[node] = bb;
    }

    /// Return the upper bound on node indices handed out so far.
    ///
    /// Nodes created later receive indices at or above this bound, which lets
    /// passes distinguish pre-existing nodes from ones they created.
    pub fn node_id_bound(&self) -> usize {
        self.nodes.id_bound()
    }

    /// Check whether a node still exists in the graph.
    pub fn contains_node(&self, node: Node) -> bool {
        self.nodes.contains(node)
    }

    /// Add a node to a block.
    pub fn add_node(&mut self, bb: Block, data: NodeData) -> Node {
        let node = self.nodes.add(data);
        self.node_blocks.add(node, bb);
        self.blocks[bb].nodes.push(node);
        trace!("Created {} in {}", node, bb);
        node
    }

    /// Create a phi in a block.
    ///
    /// The number of inputs must match the block's predecessor count. The phi
    /// is prepended to the block's node list, before any non-phi node.
    pub fn new_phi(&mut self, bb: Block, args: Vec<Node>, mode: Mode) -> Node {
        assert_eq!(
            args.len(),
            self.blocks[bb].preds.len(),
            "phi arity must match predecessor count of {}",
            bb
        );
        let node = self.nodes.add(NodeData::Phi {
            opcode: Opcode::Phi,
            mode,
            args,
        });
        self.node_blocks.add(node, bb);
        self.blocks[bb].nodes.insert(0, node);
        trace!("Created {} in {}", node, bb);
        node
    }

    /// Create a constant in the entry block.
    pub fn const_int(&mut self, mode: Mode, imm: impl Into<BigInt>) -> Node {
        let entry = self.entry;
        self.add_node(
            entry,
            NodeData::ConstInt {
                opcode: Opcode::Const,
                mode,
                imm: imm.into(),
            },
        )
    }

    /// Create a formal parameter in the entry block.
    pub fn arg(&mut self, index: u32, mode: Mode) -> Node {
        let entry = self.entry;
        self.add_node(
            entry,
            NodeData::Arg {
                opcode: Opcode::Arg,
                mode,
                index,
            },
        )
    }

    /// Create a unary operation.
    pub fn unary(&mut self, bb: Block, opcode: Opcode, mode: Mode, arg: Node) -> Node {
        self.add_node(
            bb,
            NodeData::Unary {
                opcode,
                mode,
                args: [arg],
            },
        )
    }

    /// Create a binary operation.
    pub fn binary(&mut self, bb: Block, opcode: Opcode, mode: Mode, lhs: Node, rhs: Node) -> Node {
        self.add_node(
            bb,
            NodeData::Binary {
                opcode,
                mode,
                args: [lhs, rhs],
            },
        )
    }

    /// Create a projection out of a tuple-mode node.
    pub fn proj(&mut self, bb: Block, arg: Node, index: u32, mode: Mode) -> Node {
        self.add_node(
            bb,
            NodeData::Proj {
                opcode: Opcode::Proj,
                mode,
                args: [arg],
                index,
            },
        )
    }

    /// Create a load.
    pub fn load(&mut self, bb: Block, mem: Node, addr: Node) -> Node {
        self.add_node(
            bb,
            NodeData::Load {
                opcode: Opcode::Load,
                mode: Mode::Tuple,
                args: [mem, addr],
            },
        )
    }

    /// Create a store.
    pub fn store(&mut self, bb: Block, mem: Node, addr: Node, value: Node) -> Node {
        self.add_node(
            bb,
            NodeData::Store {
                opcode: Opcode::Store,
                mode: Mode::Mem,
                args: [mem, addr, value],
            },
        )
    }

    /// Resolve a constant integer value.
    pub fn get_const_int(&self, node: Node) -> Option<&BigInt> {
        self.nodes[node].get_const_int()
    }

    /// Replace all uses of a node with another.
    ///
    /// Returns how many uses were replaced.
    pub fn replace_use(&mut self, from: Node, to: Node) -> usize {
        let mut count = 0;
        for data in self.nodes.values_mut() {
            for arg in data.args_mut() {
                if *arg == from {
                    *arg = to;
                    count += 1;
                }
            }
        }
        count
    }

    /// Iterate over all uses of a node.
    pub fn uses(&self, node: Node) -> impl Iterator<Item = (Node, usize)> {
        let mut uses = vec![];
        for user in self.nodes.keys() {
            for (i, &arg) in self.nodes[user].args().iter().enumerate() {
                if arg == node {
                    uses.push((user, i));
                }
            }
        }
        uses.into_iter()
    }

    /// Check if a node is used.
    pub fn has_uses(&self, node: Node) -> bool {
        self.uses(node).count() > 0
    }

    /// Check if a node has exactly one use.
    pub fn has_one_use(&self, node: Node) -> bool {
        self.uses(node).count() == 1
    }

    /// Remove a node from the graph.
    ///
    /// The node must be unused.
    pub fn remove_node(&mut self, node: Node) {
        assert!(!self.has_uses(node), "removing a used node {}", node);
        let bb = self.node_blocks[node];
        let list = &mut self.blocks[bb].nodes;
        let pos = list.iter().position(|&n| n == node).expect("node not in block");
        list.remove(pos);
        self.node_blocks.remove(node);
        self.nodes.remove(node);
    }

    /// Redirect all uses of `from` to `to` and remove `from` from the graph.
    pub fn exchange(&mut self, from: Node, to: Node) {
        assert!(from != to, "exchanging {} with itself", from);
        let count = self.replace_use(from, to);
        debug!("Exchange {} for {} ({} uses)", from, to, count);
        self.remove_node(from);
    }

    /// Remove a node if it is unused.
    ///
    /// Pinned nodes are left alone. Returns true if the node was removed.
    pub fn prune_if_unused(&mut self, node: Node) -> bool {
        if !self.nodes.contains(node) {
            return false;
        }
        if self.nodes[node].opcode().is_pinned() || self.has_uses(node) {
            return false;
        }
        debug!("Prune unused {}", node);
        self.remove_node(node);
        true
    }

    /// Render a node for diagnostics.
    pub fn dump(&self, node: Node) -> String {
        let data = &self.nodes[node];
        let args = data
            .args()
            .iter()
            .map(|a| a.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        match data {
            NodeData::ConstInt { imm, .. } => format!("{} = const {} {}", node, data.mode(), imm),
            NodeData::Arg { index, .. } => format!("{} = arg {} #{}", node, data.mode(), index),
            NodeData::Proj { index, .. } => {
                format!("{} = proj {} ({}) #{}", node, data.mode(), args, index)
            }
            _ => format!("{} = {} {} ({})", node, data.opcode(), data.mode(), args),
        }
    }
}

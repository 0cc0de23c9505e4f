// Copyright (c) 2017-2021 Fabian Schuiki

//! Verification of IR integrity.
//!
//! This module implements verification of the intermediate representation. It
//! checks that graphs are well-formed: table cross-references resolve, node
//! lists and block assignments agree, phis match their block's predecessors,
//! definitions dominate their uses, and no critical edges exist.

use crate::analysis::DominatorTree;
use crate::ir::prelude::*;
use std::{
    fmt::Display,
    ops::{Deref, DerefMut},
};

/// An IR verifier.
///
/// The `Verifier` acts as a context to call the various IR checking functions
/// on. It keeps track of errors.
#[derive(Default)]
pub struct Verifier {
    errors: VerifierErrors,
    unit: Option<String>,
}

impl Verifier {
    /// Create a new verifier.
    pub fn new() -> Self {
        Default::default()
    }

    /// Verify the integrity of a `Module`.
    pub fn verify_module(&mut self, module: &Module) {
        for (_, graph) in module.graphs() {
            self.verify_graph(graph);
        }
    }

    /// Verify the integrity of a `Graph`.
    pub fn verify_graph(&mut self, graph: &Graph) {
        self.unit = Some(format!("graph {}", graph.name()));
        self.verify_structure(graph);
        self.verify_dominance(graph);
        self.unit = None;
    }

    /// Verify table cross-references, block assignments, phi arities, and
    /// edge consistency.
    fn verify_structure(&mut self, graph: &Graph) {
        for bb in graph.blocks() {
            for &node in graph.nodes(bb) {
                if graph.node_block(node) != bb {
                    self.errors.push(VerifierError {
                        unit: self.unit.clone(),
                        object: Some(node.to_string()),
                        message: format!(
                            "node listed in {} but assigned to {}",
                            bb,
                            graph.node_block(node)
                        ),
                    });
                }
                for &arg in graph[node].args() {
                    if !graph.contains_node(arg) {
                        self.errors.push(VerifierError {
                            unit: self.unit.clone(),
                            object: Some(node.to_string()),
                            message: format!("argument {} does not exist", arg),
                        });
                    }
                }
                if graph[node].opcode().is_phi()
                    && graph[node].args().len() != graph.preds(bb).len()
                {
                    self.errors.push(VerifierError {
                        unit: self.unit.clone(),
                        object: Some(node.to_string()),
                        message: format!(
                            "phi has {} inputs for {} predecessors of {}",
                            graph[node].args().len(),
                            graph.preds(bb).len(),
                            bb
                        ),
                    });
                }
            }

            // Predecessor and successor lists must mirror each other.
            for &succ in graph.succs(bb) {
                if !graph.preds(succ).contains(&bb) {
                    self.errors.push(VerifierError {
                        unit: self.unit.clone(),
                        object: Some(bb.to_string()),
                        message: format!("successor {} does not list {} as predecessor", succ, bb),
                    });
                }
            }

            // An edge from a multi-successor block must not target a
            // multi-predecessor block.
            if graph.succs(bb).len() > 1 {
                for &succ in graph.succs(bb) {
                    if graph.preds(succ).len() > 1 {
                        self.errors.push(VerifierError {
                            unit: self.unit.clone(),
                            object: Some(bb.to_string()),
                            message: format!("critical edge {} -> {}", bb, succ),
                        });
                    }
                }
            }
        }

        if !graph.preds(graph.entry()).is_empty() {
            self.errors.push(VerifierError {
                unit: self.unit.clone(),
                object: Some(graph.entry().to_string()),
                message: format!("entry block has predecessors"),
            });
        }
        if !graph.succs(graph.exit()).is_empty() {
            self.errors.push(VerifierError {
                unit: self.unit.clone(),
                object: Some(graph.exit().to_string()),
                message: format!("exit block has successors"),
            });
        }
    }

    /// Verify that every definition dominates its uses.
    fn verify_dominance(&mut self, graph: &Graph) {
        let domtree = DominatorTree::new(graph);
        for bb in graph.blocks() {
            let nodes = graph.nodes(bb);
            for (pos, &node) in nodes.iter().enumerate() {
                let is_phi = graph[node].opcode().is_phi();
                for (i, &arg) in graph[node].args().iter().enumerate() {
                    if !graph.contains_node(arg) {
                        continue;
                    }
                    let arg_bb = graph.node_block(arg);
                    if is_phi {
                        // A phi input must be available at the bottom of the
                        // corresponding predecessor. Arity mismatches are
                        // reported by the structural checks.
                        let pred = match graph.preds(bb).get(i) {
                            Some(&pred) => pred,
                            None => continue,
                        };
                        if !domtree.dominates(arg_bb, pred) {
                            self.errors.push(VerifierError {
                                unit: self.unit.clone(),
                                object: Some(node.to_string()),
                                message: format!(
                                    "phi input {} in {} does not dominate predecessor {}",
                                    arg, arg_bb, pred
                                ),
                            });
                        }
                    } else if arg_bb == bb {
                        // Same-block operands must be defined earlier in the
                        // list.
                        let arg_pos = nodes.iter().position(|&n| n == arg).unwrap();
                        if arg_pos > pos {
                            self.errors.push(VerifierError {
                                unit: self.unit.clone(),
                                object: Some(node.to_string()),
                                message: format!("argument {} defined after its use", arg),
                            });
                        }
                    } else if !domtree.dominates(arg_bb, bb) {
                        self.errors.push(VerifierError {
                            unit: self.unit.clone(),
                            object: Some(node.to_string()),
                            message: format!(
                                "argument {} in {} does not dominate use in {}",
                                arg, arg_bb, bb
                            ),
                        });
                    }
                }
            }
        }
    }

    /// Consume the verifier and return the result of the verification.
    pub fn finish(self) -> anyhow::Result<()> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(anyhow::anyhow!("verification failed:\n{}", self.errors))
        }
    }
}

/// A list of errors accumulated by the verifier.
#[derive(Debug, Default)]
pub struct VerifierErrors(pub Vec<VerifierError>);

impl Deref for VerifierErrors {
    type Target = Vec<VerifierError>;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for VerifierErrors {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl Display for VerifierErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        for err in &self.0 {
            writeln!(f, "- {}", err)?;
        }
        Ok(())
    }
}

/// A single verification error.
#[derive(Debug)]
pub struct VerifierError {
    /// The graph the error occurred in.
    pub unit: Option<String>,
    /// The object the error relates to.
    pub object: Option<String>,
    /// The error message.
    pub message: String,
}

impl Display for VerifierError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        if let Some(ref unit) = self.unit {
            write!(f, "{}: ", unit)?;
        }
        if let Some(ref object) = self.object {
            write!(f, "{}: ", object)?;
        }
        write!(f, "{}", self.message)
    }
}

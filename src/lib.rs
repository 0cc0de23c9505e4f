// Copyright (c) 2017-2021 Fabian Schuiki

//! A sea-of-nodes style intermediate representation and the optimization
//! passes that operate on it. The centerpiece is a GVN-PRE pass following
//! VanDrunen and Hosking, "Value-Based Partial Redundancy Elimination" (2004).

#[macro_use]
extern crate log;
#[macro_use]
extern crate serde;

#[macro_use]
pub mod table;
pub mod analysis;
pub mod ir;
pub mod opt;
pub mod pass;
pub mod verifier;

pub use crate::ir::{Block, Graph, Mode, Module, Node, NodeData, Opcode};
pub use crate::verifier::Verifier;

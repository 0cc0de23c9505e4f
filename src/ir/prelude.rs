// Copyright (c) 2017-2021 Fabian Schuiki

//! Re-exports of commonly used IR items.

pub use crate::ir::{Block, Graph, Mode, Module, Node, NodeData, Opcode, UnitId};

// Copyright (c) 2017-2021 Fabian Schuiki

//! Optimization passes on the IR.
//!
//! This module implements the passes that mutate an IR graph.

pub mod gvn_pre;

pub use self::gvn_pre::{GvnPre, GvnPreFlags};

// Copyright (c) 2017-2021 Fabian Schuiki

//! Re-exports of commonly used optimization items.

pub use crate::opt::pass::{Pass, PassContext};

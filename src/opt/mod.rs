// Copyright (c) 2017-2021 Fabian Schuiki

//! Optimization infrastructure.
//!
//! This module implements the infrastructure used by the passes that analyze
//! or mutate an IR module.

pub mod pass;
pub mod prelude;

pub use self::pass::*;

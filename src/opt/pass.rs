// Copyright (c) 2017-2021 Fabian Schuiki

use crate::ir::prelude::*;
use rayon::prelude::*;

/// An optimization pass.
///
/// The optimization infrastructure will always call `run_on_module()`, which
/// fans out over the graphs in the module in parallel. Implementors provide
/// `run_on_graph()` at minimum. Passes are values so they can carry their
/// configuration.
pub trait Pass: Sync {
    /// Run this pass on an entire module.
    fn run_on_module(&self, ctx: &PassContext, module: &mut Module) -> bool {
        module
            .units
            .storage
            .par_iter_mut()
            .map(|(_, graph)| self.run_on_graph(ctx, graph))
            .reduce(|| false, |a, b| a || b)
    }

    /// Run this pass on a graph.
    fn run_on_graph(&self, ctx: &PassContext, graph: &mut Graph) -> bool;
}

/// Additional context and configuration for optimizations.
#[derive(Default)]
pub struct PassContext;

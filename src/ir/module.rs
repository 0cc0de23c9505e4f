// Copyright (c) 2017-2021 Fabian Schuiki

//! Representation of a collection of procedure graphs.

use crate::{
    impl_table_indexing,
    ir::{Graph, UnitId},
    table::PrimaryTable,
};

/// A module of procedure graphs.
#[derive(Default, Serialize, Deserialize)]
pub struct Module {
    /// The graphs in the module.
    pub(crate) units: PrimaryTable<UnitId, Graph>,
}

impl_table_indexing!(Module, units, UnitId, Graph);

impl Module {
    /// Create a new empty module.
    pub fn new() -> Self {
        Default::default()
    }

    /// Add a graph to the module.
    pub fn add_graph(&mut self, graph: Graph) -> UnitId {
        self.units.add(graph)
    }

    /// Iterate over the graphs in the module.
    pub fn graphs<'a>(&'a self) -> impl Iterator<Item = (UnitId, &'a Graph)> + 'a {
        self.units.iter()
    }

    /// Iterate over the graphs in the module mutably.
    pub fn graphs_mut<'a>(&'a mut self) -> impl Iterator<Item = &'a mut Graph> + 'a {
        self.units.values_mut()
    }
}

// Copyright (c) 2017-2021 Fabian Schuiki

//! End-to-end tests of the GVN-PRE pass on hand-built graphs.

use sonir::ir::prelude::*;
use sonir::opt::prelude::*;
use sonir::pass::{GvnPre, GvnPreFlags};
use sonir::Verifier;

fn run(graph: &mut Graph) -> bool {
    GvnPre::new().run_on_graph(&PassContext, graph)
}

fn run_with(flags: GvnPreFlags, graph: &mut Graph) -> bool {
    GvnPre::with_flags(flags).run_on_graph(&PassContext, graph)
}

fn verify(graph: &Graph) {
    let mut verifier = Verifier::new();
    verifier.verify_graph(graph);
    verifier.finish().unwrap();
    assert_no_dominating_redundancy(graph);
}

fn count_nodes(graph: &Graph) -> usize {
    graph.blocks().map(|bb| graph.nodes(bb).len()).sum()
}

/// After the pass, no two surviving computations of the same value may sit on
/// one dominator path; the lower one should have been exchanged.
fn assert_no_dominating_redundancy(graph: &Graph) {
    use sonir::analysis::DominatorTree;
    use sonir::pass::gvn_pre::ValueTable;

    let domtree = DominatorTree::new(graph);
    let mut table = ValueTable::new();
    let mut seen = vec![];
    for bb in graph.blocks() {
        for &node in graph.nodes(bb) {
            let opcode = graph[node].opcode();
            if opcode.is_phi() || opcode.is_memop() || opcode.is_proj() || opcode.is_const() {
                continue;
            }
            seen.push((table.value(graph, node), node));
        }
    }
    for (i, &(v1, n1)) in seen.iter().enumerate() {
        for &(v2, n2) in &seen[i + 1..] {
            if v1 != v2 {
                continue;
            }
            let b1 = graph.node_block(n1);
            let b2 = graph.node_block(n2);
            assert!(
                !domtree.dominates(b1, b2) && !domtree.dominates(b2, b1),
                "{} and {} compute the same value on one dominator path",
                n1,
                n2
            );
        }
    }
}

/// A diamond: entry branches to two blocks which join and fall through to
/// the exit.
fn diamond(graph: &mut Graph) -> (Block, Block, Block) {
    let l1 = graph.add_block();
    let l2 = graph.add_block();
    let l3 = graph.add_block();
    graph.add_edge(graph.entry(), l1);
    graph.add_edge(graph.entry(), l2);
    graph.add_edge(l1, l3);
    graph.add_edge(l2, l3);
    graph.add_edge(l3, graph.exit());
    (l1, l2, l3)
}

#[test]
fn fully_redundant_in_join() {
    let mut g = Graph::new("full");
    let (l1, l2, l3) = diamond(&mut g);
    let x = g.arg(0, Mode::I32);
    let y = g.arg(1, Mode::I32);
    let t1 = g.binary(l1, Opcode::Add, Mode::I32, x, y);
    let t2 = g.binary(l2, Opcode::Add, Mode::I32, x, y);
    let t3 = g.binary(l3, Opcode::Add, Mode::I32, x, y);
    let u = g.unary(l3, Opcode::Neg, Mode::I32, t3);

    assert!(run(&mut g));
    verify(&g);

    // The join computation is gone, replaced by a phi over the two arms.
    assert!(!g.contains_node(t3));
    let phi = g[u].args()[0];
    assert!(g[phi].opcode().is_phi());
    assert_eq!(g.node_block(phi), l3);
    assert_eq!(g[phi].args(), &[t1, t2]);

    // No copies were hoisted into the arms.
    assert_eq!(g.nodes(l1), &[t1]);
    assert_eq!(g.nodes(l2), &[t2]);
}

#[test]
fn partially_redundant_hoists_a_copy() {
    let mut g = Graph::new("partial");
    let (l1, l2, l3) = diamond(&mut g);
    let x = g.arg(0, Mode::I32);
    let y = g.arg(1, Mode::I32);
    let t1 = g.binary(l1, Opcode::Add, Mode::I32, x, y);
    let t3 = g.binary(l3, Opcode::Add, Mode::I32, x, y);
    let u = g.unary(l3, Opcode::Neg, Mode::I32, t3);

    assert!(run(&mut g));
    verify(&g);

    // A copy appeared in the empty arm.
    assert_eq!(g.nodes(l2).len(), 1);
    let copy = g.nodes(l2)[0];
    assert_eq!(g[copy].opcode(), Opcode::Add);
    assert_eq!(g[copy].args(), &[x, y]);

    // The join computation became a phi over the original and the copy.
    assert!(!g.contains_node(t3));
    let phi = g[u].args()[0];
    assert!(g[phi].opcode().is_phi());
    assert_eq!(g[phi].args(), &[t1, copy]);
}

#[test]
fn hoisting_blocked_by_greedy_operands() {
    // The anticipated sum uses a product computed only below the join.
    // Hoisting the sum would force hoisting the product as well, so neither
    // moves.
    let mut g = Graph::new("greedy");
    let l1 = g.add_block();
    let l2 = g.add_block();
    let l3 = g.add_block();
    let l4 = g.add_block();
    g.add_edge(g.entry(), l1);
    g.add_edge(g.entry(), l2);
    g.add_edge(l1, l3);
    g.add_edge(l2, l3);
    g.add_edge(l3, l4);
    g.add_edge(l4, g.exit());
    let x = g.arg(0, Mode::I32);
    let y = g.arg(1, Mode::I32);
    let s = g.binary(l4, Opcode::Mul, Mode::I32, x, y);
    let t4 = g.binary(l4, Opcode::Add, Mode::I32, s, x);

    assert!(!run(&mut g));
    verify(&g);

    assert!(g.nodes(l1).is_empty());
    assert!(g.nodes(l2).is_empty());
    assert!(g.nodes(l3).is_empty());
    assert_eq!(g.nodes(l4), &[s, t4]);
}

#[test]
fn translation_traces_through_phis() {
    let mut g = Graph::new("phi-through");
    let l1 = g.add_block();
    let l2 = g.add_block();
    let l3 = g.add_block();
    let l4 = g.add_block();
    g.add_edge(g.entry(), l1);
    g.add_edge(g.entry(), l2);
    g.add_edge(l1, l3);
    g.add_edge(l2, l3);
    g.add_edge(l3, l4);
    g.add_edge(l4, g.exit());
    let x = g.arg(0, Mode::I32);
    let y = g.arg(1, Mode::I32);
    let c1 = g.const_int(Mode::I32, 1);
    let a = g.binary(l1, Opcode::Mul, Mode::I32, x, y);
    let b = g.binary(l2, Opcode::Sub, Mode::I32, x, y);
    let p = g.new_phi(l3, vec![a, b], Mode::I32);
    let t = g.binary(l3, Opcode::Add, Mode::I32, p, c1);
    let u = g.binary(l4, Opcode::Add, Mode::I32, p, c1);
    let w = g.unary(l4, Opcode::Neg, Mode::I32, u);

    assert!(run(&mut g));
    verify(&g);

    // `u` recomputes `p + 1`, which the translation recognizes as the value
    // of `t`; the recomputation is exchanged for `t`.
    assert!(!g.contains_node(u));
    assert_eq!(g[w].args(), &[t]);
    assert!(g.contains_node(t));

    // The translation twins materialized in the arms left no residue.
    assert_eq!(g.nodes(l1), &[a]);
    assert_eq!(g.nodes(l2), &[b]);
}

#[test]
fn endless_loop_values_stay_contained() {
    // A self-loop with no path to the exit. With NO_INF_LOOPS the loop's
    // values never enter the anticipability sets and nothing is hoisted.
    let mut g = Graph::new("spin");
    let lb = g.add_block();
    g.add_edge(g.entry(), lb);
    g.add_edge(lb, lb);
    let x = g.arg(0, Mode::I32);
    let y = g.arg(1, Mode::I32);
    let v = g.binary(lb, Opcode::Mul, Mode::I32, x, y);

    assert!(!run_with(GvnPreFlags::NO_INF_LOOPS, &mut g));
    verify(&g);
    assert_eq!(g.nodes(lb), &[v]);
    assert_eq!(g.nodes(g.entry()), &[x, y]);
}

#[test]
fn loop_invariant_moves_without_containment() {
    // The same self-loop without NO_INF_LOOPS: the multiplication is
    // available around the back edge, so a copy lands in the entry and the
    // in-loop node collapses onto it.
    let mut g = Graph::new("spin");
    let lb = g.add_block();
    g.add_edge(g.entry(), lb);
    g.add_edge(lb, lb);
    let x = g.arg(0, Mode::I32);
    let y = g.arg(1, Mode::I32);
    let v = g.binary(lb, Opcode::Mul, Mode::I32, x, y);

    assert!(run(&mut g));
    verify(&g);

    assert!(!g.contains_node(v));
    assert!(g.nodes(lb).is_empty());
    let copy = *g
        .nodes(g.entry())
        .iter()
        .find(|&&n| g[n].opcode() == Opcode::Mul)
        .unwrap();
    assert_eq!(g[copy].args(), &[x, y]);
}

#[test]
fn small_constant_operands_allow_hoisting() {
    let mut g = Graph::new("small-const");
    let (l1, l2, l3) = diamond(&mut g);
    let x = g.arg(0, Mode::I32);
    let k = g.const_int(Mode::I32, 7);
    let t1 = g.binary(l1, Opcode::Add, Mode::I32, x, k);
    let t3 = g.binary(l3, Opcode::Add, Mode::I32, x, k);
    let u = g.unary(l3, Opcode::Neg, Mode::I32, t3);

    assert!(run(&mut g));
    verify(&g);

    // The immediate reproduces freely, so the copy lands in the empty arm.
    assert_eq!(g.nodes(l2).len(), 1);
    let copy = g.nodes(l2)[0];
    assert_eq!(g[copy].args(), &[x, k]);
    let phi = g[u].args()[0];
    assert!(g[phi].opcode().is_phi());
    assert_eq!(g[phi].args(), &[t1, copy]);
}

#[test]
fn large_constant_operands_decline_hoisting() {
    // 10000 sits outside the freely available range, so the partially
    // redundant sum stays where it is.
    let mut g = Graph::new("large-const");
    let (l1, l2, l3) = diamond(&mut g);
    let x = g.arg(0, Mode::I32);
    let k = g.const_int(Mode::I32, 10000);
    let t1 = g.binary(l1, Opcode::Add, Mode::I32, x, k);
    let t3 = g.binary(l3, Opcode::Add, Mode::I32, x, k);
    let u = g.unary(l3, Opcode::Neg, Mode::I32, t3);

    assert!(!run(&mut g));
    verify(&g);

    assert!(g.nodes(l2).is_empty());
    assert_eq!(g.nodes(l3), &[t3, u]);
    assert_eq!(g.nodes(l1), &[t1]);
}

#[test]
fn second_run_is_a_noop() {
    let mut g = Graph::new("idempotent");
    let (l1, _l2, l3) = diamond(&mut g);
    let x = g.arg(0, Mode::I32);
    let y = g.arg(1, Mode::I32);
    g.binary(l1, Opcode::Add, Mode::I32, x, y);
    let t3 = g.binary(l3, Opcode::Add, Mode::I32, x, y);
    g.unary(l3, Opcode::Neg, Mode::I32, t3);

    assert!(run(&mut g));
    verify(&g);
    let nodes_after_first = count_nodes(&g);

    assert!(!run(&mut g));
    verify(&g);
    assert_eq!(count_nodes(&g), nodes_after_first);
}

#[test]
fn module_level_run_covers_all_graphs() {
    let mut module = Module::new();
    for i in 0..4 {
        let mut g = Graph::new(format!("unit{}", i));
        let (l1, _l2, l3) = diamond(&mut g);
        let x = g.arg(0, Mode::I32);
        let y = g.arg(1, Mode::I32);
        g.binary(l1, Opcode::Add, Mode::I32, x, y);
        let t3 = g.binary(l3, Opcode::Add, Mode::I32, x, y);
        g.unary(l3, Opcode::Neg, Mode::I32, t3);
        module.add_graph(g);
    }

    assert!(GvnPre::new().run_on_module(&PassContext, &mut module));
    let mut verifier = Verifier::new();
    verifier.verify_module(&module);
    verifier.finish().unwrap();

    for (_, g) in module.graphs() {
        // Every unit got its phi.
        let join_phis = g
            .blocks()
            .flat_map(|bb| g.nodes(bb).iter())
            .filter(|&&n| g[n].opcode().is_phi())
            .count();
        assert_eq!(join_phis, 1);
    }
}

#[test]
#[should_panic(expected = "critical edge")]
fn critical_edges_are_rejected() {
    let mut g = Graph::new("critical");
    let l1 = g.add_block();
    let l2 = g.add_block();
    // entry -> l1, entry -> l2, l1 -> l2: the edge entry -> l2 leaves a
    // multi-successor block and enters a multi-predecessor block.
    g.add_edge(g.entry(), l1);
    g.add_edge(g.entry(), l2);
    g.add_edge(l1, l2);
    g.add_edge(l2, g.exit());

    run(&mut g);
}

#[test]
#[should_panic(expected = "collaborator support")]
fn memory_flags_are_rejected() {
    let mut g = Graph::new("loads");
    g.add_edge(g.entry(), g.exit());
    run_with(GvnPreFlags::LOADS, &mut g);
}

#[test]
fn hoist_high_migrates_lone_copies() {
    // Same shape as the partial redundancy test, but with HOIST_HIGH the
    // synthesized copy may climb to where its operands live when nothing
    // else uses them. Both operands are defined in the entry block.
    let mut g = Graph::new("hoist-high");
    let (l1, l2, l3) = diamond(&mut g);
    let x = g.arg(0, Mode::I32);
    let y = g.arg(1, Mode::I32);
    let t1 = g.binary(l1, Opcode::Add, Mode::I32, x, y);
    let t3 = g.binary(l3, Opcode::Add, Mode::I32, x, y);
    let u = g.unary(l3, Opcode::Neg, Mode::I32, t3);

    assert!(run_with(GvnPreFlags::HOIST_HIGH, &mut g));
    verify(&g);

    // x and y are used by t1 as well, so the copy must stay put in l2.
    assert_eq!(g.nodes(l2).len(), 1);
    let copy = g.nodes(l2)[0];
    assert_eq!(g[copy].opcode(), Opcode::Add);
    let phi = g[u].args()[0];
    assert_eq!(g[phi].args(), &[t1, copy]);
}

#[test]
fn memory_operations_are_left_alone() {
    // Two identical loads on both arms of a diamond must not be merged or
    // hoisted: memory operations never share a value.
    let mut g = Graph::new("memops");
    let (l1, l2, l3) = diamond(&mut g);
    let mem = g.arg(0, Mode::Mem);
    let addr = g.arg(1, Mode::I64);
    let ld1 = g.load(l1, mem, addr);
    let r1 = g.proj(l1, ld1, 1, Mode::I32);
    let ld2 = g.load(l2, mem, addr);
    let r2 = g.proj(l2, ld2, 1, Mode::I32);
    let p = g.new_phi(l3, vec![r1, r2], Mode::I32);
    let t = g.binary(l3, Opcode::Add, Mode::I32, p, p);

    assert!(!run(&mut g));
    verify(&g);

    assert_eq!(g.nodes(l1), &[ld1, r1]);
    assert_eq!(g.nodes(l2), &[ld2, r2]);
    assert_eq!(g.nodes(l3), &[p, t]);
}

use crate::blocks::registry::BlockRole;
use crate::compile::diagnostics::{Diagnostic, DiagnosticCode, Diagnostics};
use crate::compile::typecheck::{InputBindings, InputSource};
use crate::foundation::ids::{BlockIdx, IndexOverflow, idx_u32};
use crate::ir::program::TimeModel;
use crate::normalize::ir::PatchIR;
use petgraph::algo::{is_cyclic_directed, tarjan_scc};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use std::collections::{BTreeSet, HashSet};

/// Dependency edge between blocks. `memory` edges enter an input that is read next frame.
#[derive(Debug, Clone, Copy)]
struct DepEdge {
    memory: bool,
}

/// A feedback loop that crossed at least one memory boundary.
#[derive(Debug, Clone)]
pub(crate) struct Cycle {
    pub(crate) blocks: Vec<BlockIdx>,
    pub(crate) memory_edges: usize,
}

#[derive(Debug, Clone)]
pub(crate) struct Topology {
    pub(crate) time_root: BlockIdx,
    pub(crate) time_model: TimeModel,
    /// Blocks in dependency order with memory edges removed; ties break by stable id.
    pub(crate) order: Vec<BlockIdx>,
    pub(crate) cycles: Vec<Cycle>,
}

fn build_graph(
    ir: &PatchIR<'_>,
    bindings: &InputBindings,
) -> Result<DiGraph<BlockIdx, DepEdge>, IndexOverflow> {
    let mut g = DiGraph::with_capacity(ir.blocks.len(), ir.wires.len());
    for i in 0..ir.blocks.len() {
        g.add_node(BlockIdx(idx_u32(i)?));
    }
    for (bi, b) in ir.blocks.iter().enumerate() {
        for (pi, src) in bindings.of(BlockIdx(idx_u32(bi)?)).iter().enumerate() {
            let memory = b.sig.inputs[pi].memory;
            let to = NodeIndex::new(bi);
            match src {
                Some(InputSource::Wire { from, .. }) => {
                    g.add_edge(NodeIndex::new(from.block.0 as usize), to, DepEdge { memory });
                }
                Some(InputSource::Bus { bus, .. }) => {
                    for p in ir.publishers.iter().filter(|p| p.bus == *bus) {
                        g.add_edge(NodeIndex::new(p.from.block.0 as usize), to, DepEdge { memory });
                    }
                }
                Some(InputSource::Default(_)) | None => {}
            }
        }
    }
    Ok(g)
}

/// Locate the time authority, check feedback loops against memory boundaries, and order blocks.
pub(crate) fn analyze(
    ir: &PatchIR<'_>,
    bindings: &InputBindings,
) -> Result<Topology, Diagnostics> {
    let mut errors = Diagnostics::default();
    let g = build_graph(ir, bindings)?;

    let roots: Vec<BlockIdx> = ir
        .blocks
        .iter()
        .enumerate()
        .filter(|(_, b)| b.sig.role == BlockRole::TimeRoot)
        .map(|(i, _)| idx_u32(i).map(BlockIdx))
        .collect::<Result<_, _>>()?;
    match roots.len() {
        0 => errors.push(Diagnostic::error(
            DiagnosticCode::TimeRootMissing,
            "patch has no time root block",
        )),
        1 => {}
        n => {
            let mut d = Diagnostic::error(
                DiagnosticCode::TimeTopologyConflict,
                format!("patch has {n} time root blocks; exactly one is allowed"),
            );
            for r in &roots {
                d = d.at_block(&ir.block(*r).id);
            }
            errors.push(d);
        }
    }
    for &r in &roots {
        let upstream: BTreeSet<&str> = g
            .edges_directed(NodeIndex::new(r.0 as usize), petgraph::Direction::Incoming)
            .map(|e| ir.block(g[e.source()]).id.as_str())
            .collect();
        if !upstream.is_empty() {
            let mut d = Diagnostic::error(
                DiagnosticCode::TimeRootUpstream,
                format!(
                    "time root '{}' is driven by other blocks",
                    ir.block(r).id
                ),
            )
            .at_block(&ir.block(r).id);
            for u in upstream {
                d = d.at_block(u);
            }
            errors.push(d);
        }
    }

    let mut cycles = Vec::new();
    for scc in tarjan_scc(&g) {
        let members: HashSet<NodeIndex> = scc.iter().copied().collect();
        let internal: Vec<_> = g
            .edge_references()
            .filter(|e| members.contains(&e.source()) && members.contains(&e.target()))
            .collect();
        let is_loop = scc.len() > 1 || !internal.is_empty();
        if !is_loop {
            continue;
        }
        let mut blocks: Vec<BlockIdx> = scc.iter().map(|n| g[*n]).collect();
        blocks.sort();
        let memory_edges = internal.iter().filter(|e| e.weight().memory).count();

        let describe = |code, msg: String| {
            let mut d = Diagnostic::error(code, msg);
            for b in &blocks {
                d = d.at_block(&ir.block(*b).id);
            }
            d
        };
        let names = blocks
            .iter()
            .map(|b| ir.block(*b).id.as_str())
            .collect::<Vec<_>>()
            .join(", ");

        if memory_edges == 0 {
            errors.push(describe(
                DiagnosticCode::IllegalFeedback,
                format!("feedback loop without a memory boundary through [{names}]"),
            ));
            continue;
        }

        // Every path around the loop must cross a memory edge.
        let mut sub: DiGraph<(), ()> = DiGraph::new();
        let local: Vec<NodeIndex> = scc.iter().map(|_| sub.add_node(())).collect();
        let pos = |n: NodeIndex| scc.iter().position(|m| *m == n);
        for e in internal.iter().filter(|e| !e.weight().memory) {
            if let (Some(a), Some(b)) = (pos(e.source()), pos(e.target())) {
                sub.add_edge(local[a], local[b], ());
            }
        }
        if is_cyclic_directed(&sub) {
            errors.push(describe(
                DiagnosticCode::PartialBuffering,
                format!("feedback loop through [{names}] has a path that bypasses its memory boundary"),
            ));
            continue;
        }
        cycles.push(Cycle {
            blocks,
            memory_edges,
        });
    }

    if !errors.is_empty() {
        return Err(errors);
    }
    let time_root = roots[0];
    let Some(time_model) = ir.block(time_root).sig.time_model else {
        errors.push(
            Diagnostic::error(
                DiagnosticCode::BadParam,
                "time root does not declare a time model",
            )
            .at_block(&ir.block(time_root).id),
        );
        return Err(errors);
    };

    let order = dependency_order(&g);
    cycles.sort_by(|a, b| a.blocks.cmp(&b.blocks));
    tracing::debug!(
        time_root = %ir.block(time_root).id,
        cycles = cycles.len(),
        "time topology ok"
    );
    Ok(Topology {
        time_root,
        time_model,
        order,
        cycles,
    })
}

/// Kahn's algorithm over non-memory edges, with the smallest ready block first.
fn dependency_order(g: &DiGraph<BlockIdx, DepEdge>) -> Vec<BlockIdx> {
    let n = g.node_count();
    let mut indegree = vec![0usize; n];
    for e in g.edge_references().filter(|e| !e.weight().memory) {
        indegree[e.target().index()] += 1;
    }
    let mut ready: BTreeSet<usize> = (0..n).filter(|&i| indegree[i] == 0).collect();
    let mut out = Vec::with_capacity(n);
    while let Some(i) = ready.pop_first() {
        out.push(g[NodeIndex::new(i)]);
        for e in g
            .edges_directed(NodeIndex::new(i), petgraph::Direction::Outgoing)
            .filter(|e| !e.weight().memory)
        {
            let t = e.target().index();
            indegree[t] -= 1;
            if indegree[t] == 0 {
                ready.insert(t);
            }
        }
    }
    out
}

#[cfg(test)]
#[path = "../../tests/unit/compile/topology.rs"]
mod tests;

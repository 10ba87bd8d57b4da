//! Backward liveness and branch-redirect analysis
//!
//! A single backward fixpoint pass over the graph computing, per operation,
//! a liveness classification, and, per branch, an optional redirect target.
//! Two finite lattices drive it:
//!
//! - `Liveness`: `Dead < WeakLive < Live`, joined by max.
//! - `ControlState`: `Unreachable < Block(b) < NotEliminatable`; joining two
//!   different concrete blocks gives `NotEliminatable`.
//!
//! Blocks are visited in reverse index order. Loop bodies are re-enqueued as
//! explicit contiguous ranges when a loop header's entry state changes or a
//! header phi's back-edge operand is about to become live; every update is
//! monotone on a finite-height lattice, so the pass terminates.

use rustc_hash::FxHashMap;

use crate::ir::graph::{BlockIndex, BlockKind, Graph, Opcode, OpIndex};

/// Liveness classification of one operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Liveness {
    /// No live use; must not appear in the output graph
    Dead,
    /// Kept as control structure but eligible for rewriting (gotos,
    /// redirectable branches)
    WeakLive,
    /// Observable; kept verbatim
    Live,
}

impl Liveness {
    /// Least upper bound (max)
    pub fn lub(self, other: Liveness) -> Liveness {
        self.max(other)
    }
}

/// What is known about control entering a block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlState {
    /// Nothing live below (bottom)
    Unreachable,
    /// Entering here is equivalent to entering the named block directly
    Block(BlockIndex),
    /// Control must flow as written (top)
    NotEliminatable,
}

impl ControlState {
    /// Least upper bound; two different concrete blocks join to top
    pub fn lub(self, other: ControlState) -> ControlState {
        match (self, other) {
            (ControlState::Unreachable, s) | (s, ControlState::Unreachable) => s,
            (ControlState::NotEliminatable, _) | (_, ControlState::NotEliminatable) => {
                ControlState::NotEliminatable
            }
            (ControlState::Block(a), ControlState::Block(b)) => {
                if a == b {
                    ControlState::Block(a)
                } else {
                    ControlState::NotEliminatable
                }
            }
        }
    }
}

/// Result of one analysis run, discarded after the copy consumes it
#[derive(Debug)]
pub struct DeadCodeResult {
    /// Liveness per operation, indexed by `OpIndex`
    pub liveness: Vec<Liveness>,
    /// Control state at each block's entry, indexed by `BlockIndex`
    pub entry_control: Vec<ControlState>,
    /// Branches that should be rewritten into an unconditional jump
    pub branch_targets: FxHashMap<OpIndex, BlockIndex>,
    /// Number of loop-range revisits the fixpoint needed
    pub revisits: usize,
}

impl DeadCodeResult {
    /// Whether an operation was classified dead
    pub fn is_dead(&self, index: OpIndex) -> bool {
        self.liveness[index.0 as usize] == Liveness::Dead
    }

    /// The goto-forwarding target of a block, if entering it is equivalent
    /// to entering another block directly.
    pub fn forward_target(&self, block: BlockIndex) -> Option<BlockIndex> {
        match self.entry_control[block.0 as usize] {
            ControlState::Block(target) if target != block => Some(target),
            _ => None,
        }
    }
}

/// Backward fixpoint dead-code analysis over one input graph
pub struct DeadCodeAnalysis<'g> {
    graph: &'g Graph,
    liveness: Vec<Liveness>,
    entry_control: Vec<ControlState>,
    branch_targets: FxHashMap<OpIndex, BlockIndex>,
    revisits: usize,
}

impl<'g> DeadCodeAnalysis<'g> {
    /// Prepare an analysis over the given graph
    pub fn new(graph: &'g Graph) -> Self {
        DeadCodeAnalysis {
            graph,
            liveness: vec![Liveness::Dead; graph.op_count()],
            entry_control: vec![ControlState::Unreachable; graph.block_count()],
            branch_targets: FxHashMap::default(),
            revisits: 0,
        }
    }

    /// Run to fixpoint and return the final tables
    pub fn run(mut self) -> DeadCodeResult {
        let block_count = self.graph.block_count() as u32;
        let mut pending: Vec<(u32, u32)> = Vec::new();

        for index in (0..block_count).rev() {
            if let Some(back_edge) = self.process_block(BlockIndex(index)) {
                pending.push((index, back_edge));
            }
            // Converge everything at or above this block before descending,
            // so lower blocks only ever read settled entry states.
            while let Some((header, back_edge)) = pending.pop() {
                self.revisits += 1;
                for revisit in (header..=back_edge).rev() {
                    if let Some(inner) = self.process_block(BlockIndex(revisit)) {
                        pending.push((revisit, inner));
                    }
                }
            }
        }

        DeadCodeResult {
            liveness: self.liveness,
            entry_control: self.entry_control,
            branch_targets: self.branch_targets,
            revisits: self.revisits,
        }
    }

    /// Process one block backward; returns the back-edge block index when
    /// the enclosing loop must be revisited.
    fn process_block(&mut self, index: BlockIndex) -> Option<u32> {
        let block = self.graph.block(index);

        // Entry-to-exit control state starts as the join of what is already
        // known about the successors.
        let mut control = ControlState::Unreachable;
        for succ in self.graph.successors(index) {
            control = control.lub(self.entry_control[succ.0 as usize]);
        }

        let mut back_edge_raised = false;
        for &op_index in block.ops.iter().rev() {
            let op = self.graph.get(op_index);
            let recorded = self.liveness[op_index.0 as usize];
            let mut state = recorded;

            match &op.opcode {
                Opcode::Branch { .. } => {
                    if control == ControlState::NotEliminatable {
                        // The branch must execute as written.
                        state = Liveness::Live;
                        self.branch_targets.remove(&op_index);
                    } else {
                        // Never eliminated as an instruction, but may be
                        // rewritten into a jump.
                        state = state.lub(Liveness::WeakLive);
                        if let ControlState::Block(target) = control {
                            self.branch_targets.insert(op_index, target);
                        }
                    }
                }
                Opcode::Goto { .. } | Opcode::Unreachable => {
                    state = state.lub(Liveness::WeakLive);
                }
                _ => {
                    if op.required_when_unused {
                        state = Liveness::Live;
                    }
                }
            }

            if state == Liveness::Live {
                // The block can no longer be skipped above this point.
                control = ControlState::NotEliminatable;
            }

            // Loop-carried liveness is only discovered on a second pass: if
            // a header phi is about to raise its back-edge operand, the
            // whole body must be re-walked.
            if block.kind == BlockKind::Loop
                && matches!(op.opcode, Opcode::Phi)
                && state > Liveness::Dead
            {
                if let Some(&back) = op.inputs.last() {
                    if self.liveness[back.0 as usize] < state {
                        back_edge_raised = true;
                    }
                }
            }

            self.liveness[op_index.0 as usize] = state;
            if state == Liveness::Live {
                for &input in &op.inputs {
                    let slot = &mut self.liveness[input.0 as usize];
                    *slot = slot.lub(Liveness::Live);
                }
            }
        }

        // A merge or loop header with no live phis is a valid redirect
        // target; an already-resolved farther target is kept.
        if matches!(block.kind, BlockKind::Merge | BlockKind::Loop) {
            let has_live_phi = block.ops.iter().any(|&op_index| {
                matches!(self.graph.get(op_index).opcode, Opcode::Phi)
                    && self.liveness[op_index.0 as usize] == Liveness::Live
            });
            if !has_live_phi && !matches!(control, ControlState::Block(_)) {
                control = ControlState::Block(index);
            }
        }

        let changed = self.entry_control[index.0 as usize] != control;
        self.entry_control[index.0 as usize] = control;

        if block.kind == BlockKind::Loop && (changed || back_edge_raised) {
            // Re-enqueue the contiguous loop body: header through the
            // back-edge block (the last predecessor of a loop header).
            if let Some(&back) = block.predecessors.last() {
                if back.0 >= index.0 {
                    return Some(back.0);
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::GraphBuilder;
    use crate::ir::types::ValueRep;

    #[test]
    fn test_liveness_lattice() {
        assert_eq!(Liveness::Dead.lub(Liveness::WeakLive), Liveness::WeakLive);
        assert_eq!(Liveness::WeakLive.lub(Liveness::Live), Liveness::Live);
        assert_eq!(Liveness::Live.lub(Liveness::Dead), Liveness::Live);
    }

    #[test]
    fn test_control_lattice() {
        let a = ControlState::Block(BlockIndex(1));
        let b = ControlState::Block(BlockIndex(2));
        assert_eq!(ControlState::Unreachable.lub(a), a);
        assert_eq!(a.lub(a), a);
        assert_eq!(a.lub(b), ControlState::NotEliminatable);
        assert_eq!(a.lub(ControlState::NotEliminatable), ControlState::NotEliminatable);
        assert_eq!(
            ControlState::Unreachable.lub(ControlState::Unreachable),
            ControlState::Unreachable
        );
    }

    #[test]
    fn test_unused_pure_op_is_dead() {
        let mut b = GraphBuilder::new();
        let x = b.word32_constant(1);
        let y = b.word32_constant(2);
        let unused = b.word32_add(x, y);
        b.return_value(x);
        let graph = b.finish();

        let result = DeadCodeAnalysis::new(&graph).run();
        assert!(result.is_dead(unused));
        assert!(result.is_dead(y));
        assert_eq!(result.liveness[x.0 as usize], Liveness::Live);
    }

    #[test]
    fn test_required_op_stays_live_with_zero_uses() {
        let mut b = GraphBuilder::new();
        let base = b.parameter(0);
        let value = b.word32_constant(5);
        let store = b.store(base, value, 8);
        b.return_void();
        let graph = b.finish();

        let result = DeadCodeAnalysis::new(&graph).run();
        assert_eq!(result.liveness[store.0 as usize], Liveness::Live);
        // Inputs of a live operation are live.
        assert_eq!(result.liveness[base.0 as usize], Liveness::Live);
        assert_eq!(result.liveness[value.0 as usize], Liveness::Live);
    }

    /// Branch over two empty arms into a merge with no live phis must be
    /// recorded as rewritable into a jump to the merge.
    #[test]
    fn test_branch_over_empty_diamond_redirects() {
        let mut b = GraphBuilder::new();
        let left = b.create_block(BlockKind::Plain);
        let right = b.create_block(BlockKind::Plain);
        let merge = b.create_block(BlockKind::Merge);

        let cond = b.parameter(0);
        let branch = b.branch(cond, left, right);
        b.switch_to_block(left);
        b.goto(merge);
        b.switch_to_block(right);
        b.goto(merge);
        b.switch_to_block(merge);
        let ret = b.word32_constant(0);
        b.return_value(ret);
        let graph = b.finish();

        let result = DeadCodeAnalysis::new(&graph).run();
        assert_eq!(result.branch_targets.get(&branch), Some(&merge));
        assert_eq!(result.liveness[branch.0 as usize], Liveness::WeakLive);
        // The rewrite removes the use of the condition.
        assert!(result.is_dead(cond));
        assert_eq!(result.entry_control[merge.0 as usize], ControlState::Block(merge));
    }

    /// A merge with a live phi cannot be skipped; the branch stays.
    #[test]
    fn test_live_phi_blocks_redirect() {
        let mut b = GraphBuilder::new();
        let left = b.create_block(BlockKind::Plain);
        let right = b.create_block(BlockKind::Plain);
        let merge = b.create_block(BlockKind::Merge);

        let cond = b.parameter(0);
        let branch = b.branch(cond, left, right);
        b.switch_to_block(left);
        let one = b.word32_constant(1);
        b.goto(merge);
        b.switch_to_block(right);
        let two = b.word32_constant(2);
        b.goto(merge);
        b.switch_to_block(merge);
        let phi = b.phi(vec![one, two], ValueRep::Word32);
        b.return_value(phi);
        let graph = b.finish();

        let result = DeadCodeAnalysis::new(&graph).run();
        assert!(result.branch_targets.is_empty());
        assert_eq!(result.liveness[branch.0 as usize], Liveness::Live);
        assert_eq!(result.liveness[cond.0 as usize], Liveness::Live);
        assert_eq!(
            result.entry_control[merge.0 as usize],
            ControlState::NotEliminatable
        );
    }

    /// A loop whose body carries nothing live converges to a skippable
    /// header: entering the loop is as good as entering its header.
    #[test]
    fn test_dead_loop_is_skip_target() {
        let mut b = GraphBuilder::new();
        let header = b.create_block(BlockKind::Loop);
        b.goto(header);
        b.switch_to_block(header);
        b.goto(header);
        let graph = b.finish();

        let result = DeadCodeAnalysis::new(&graph).run();
        assert_eq!(
            result.entry_control[header.0 as usize],
            ControlState::Block(header)
        );
        // The entry-state change re-enqueues the body exactly once more.
        assert!(result.revisits >= 1);
        assert!(result.revisits <= 3);
    }

    /// Loop-carried liveness is only found on the second pass over the
    /// body: the add feeding the back edge starts dead and is raised when
    /// the header phi is processed.
    #[test]
    fn test_loop_carried_liveness_revisit() {
        let mut b = GraphBuilder::new();
        let header = b.create_block(BlockKind::Loop);
        let body = b.create_block(BlockKind::Plain);
        let exit = b.create_block(BlockKind::Plain);

        let init = b.word32_constant(0);
        b.goto(header);

        b.switch_to_block(header);
        // The back-edge input (the body add) does not exist yet; loop phis
        // forward-reference it. phi=+0, cmp=+1, branch=+2, one=+3, add=+4
        // relative to the next emitted index.
        let limit = b.parameter(0);
        let phi_index = {
            let body_add = OpIndex(b.graph().op_count() as u32 + 4);
            b.phi(vec![init, body_add], ValueRep::Word32)
        };
        let cmp = b.word32_less_than(phi_index, limit);
        b.branch(cmp, body, exit);

        b.switch_to_block(body);
        let one = b.word32_constant(1);
        let body_add = b.word32_add(phi_index, one);
        b.goto(header);

        b.switch_to_block(exit);
        b.return_value(phi_index);
        let graph = b.finish();
        // The forward reference must line up with the actual body add.
        assert_eq!(graph.get(phi_index).inputs[1], body_add);

        let result = DeadCodeAnalysis::new(&graph).run();
        assert_eq!(result.liveness[phi_index.0 as usize], Liveness::Live);
        assert_eq!(result.liveness[body_add.0 as usize], Liveness::Live);
        assert_eq!(result.liveness[one.0 as usize], Liveness::Live);
        assert_eq!(result.liveness[init.0 as usize], Liveness::Live);
        // Discovering the back-edge liveness costs at least one revisit,
        // and convergence stays within the lattice-height bound.
        assert!(result.revisits >= 1);
        assert!(result.revisits <= 3);
    }

    /// A deopt is required even with zero uses, and it pins its whole
    /// frame-state tree live.
    #[test]
    fn test_deopt_keeps_frame_state_alive() {
        let mut b = GraphBuilder::new();
        let slot_a = b.word32_constant(1);
        let slot_b = b.word32_constant(2);
        let parent = b.frame_state(None, vec![slot_a]);
        let fs = b.frame_state(Some(parent), vec![slot_b]);
        let deopt = b.deoptimize(fs);
        b.unreachable();
        let graph = b.finish();

        let result = DeadCodeAnalysis::new(&graph).run();
        assert_eq!(result.liveness[deopt.0 as usize], Liveness::Live);
        assert_eq!(result.liveness[fs.0 as usize], Liveness::Live);
        assert_eq!(result.liveness[parent.0 as usize], Liveness::Live);
        assert_eq!(result.liveness[slot_a.0 as usize], Liveness::Live);
        assert_eq!(result.liveness[slot_b.0 as usize], Liveness::Live);
    }

    /// Liveness flows through composite values: a used projection keeps the
    /// tuple, the select, and their operands alive; unused ones die.
    #[test]
    fn test_liveness_through_tuple_and_select() {
        let mut b = GraphBuilder::new();
        let cond = b.parameter(0);
        let x = b.word32_constant(1);
        let y = b.word32_constant(2);
        let picked = b.select(cond, x, y);
        let tuple = b.tuple(vec![picked, x]);
        let used = b.projection(tuple, 0);
        let dead_tuple = b.tuple(vec![y]);
        b.return_value(used);
        let graph = b.finish();

        let result = DeadCodeAnalysis::new(&graph).run();
        assert_eq!(result.liveness[used.0 as usize], Liveness::Live);
        assert_eq!(result.liveness[tuple.0 as usize], Liveness::Live);
        assert_eq!(result.liveness[picked.0 as usize], Liveness::Live);
        assert_eq!(result.liveness[cond.0 as usize], Liveness::Live);
        assert!(result.is_dead(dead_tuple));
    }

    /// Nested dead loops converge within the (nesting depth) x (lattice
    /// height) revisit bound, and recorded liveness only ever increases.
    #[test]
    fn test_nested_loops_terminate() {
        let mut b = GraphBuilder::new();
        let outer = b.create_block(BlockKind::Loop);
        let inner = b.create_block(BlockKind::Loop);
        let latch = b.create_block(BlockKind::Plain);

        b.goto(outer);
        b.switch_to_block(outer);
        b.goto(inner);
        b.switch_to_block(inner);
        let cond = b.parameter(0);
        b.branch(cond, inner, latch);
        b.switch_to_block(latch);
        b.goto(outer);
        let graph = b.finish();

        let result = DeadCodeAnalysis::new(&graph).run();
        assert!(result.revisits <= 6, "revisits {} exceed 2 loops x 3", result.revisits);
        // Farthest skip target: entering the outer header is equivalent to
        // entering the inner header directly.
        assert_eq!(
            result.entry_control[outer.0 as usize],
            ControlState::Block(inner)
        );
    }
}

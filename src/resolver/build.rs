//! Build-time decision tree, grown while a document is preprocessed.
//!
//! Every `if` descends into the tree: live leaves whose outcome is uncertain get split into a
//! true and a false child. Splits stay pending until `commit`, so conditional blocks without
//! any content leave no trace in the final tree.

use smallvec::SmallVec;

use crate::condition::evaluator::ConditionEvaluator;
use crate::condition::logic3::Logic3;
use crate::condition::variables::Variables;
use crate::foundation::ids::{ConditionId, NodeIdx};
use crate::resolver::runtime::{ConditionResolver, ResolverNode};

const TRUE: usize = 0;
const FALSE: usize = 1;

#[derive(Debug, Clone)]
struct TreeNode {
    parent: Option<NodeIdx>,
    /// Branch of the parent this node hangs off, set even while the split is pending.
    parent_branch: usize,
    /// `None` while the node is a leaf.
    condition: Option<ConditionId>,
    branches: [Option<NodeIdx>; 2],
    values: Variables,
}

type Frontier = SmallVec<[NodeIdx; 4]>;

#[derive(Debug, Clone, Default)]
struct StackEntry {
    branches: [Frontier; 2],
}

#[derive(Debug, Clone)]
struct PendingSplit {
    owner: NodeIdx,
    branch: usize,
    new_node: NodeIdx,
}

#[derive(Debug, Clone)]
pub(crate) struct ConditionTree {
    nodes: Vec<TreeNode>,
    current_branch: usize,
    node_stack: Vec<StackEntry>,
    branch_stack: Vec<usize>,
    pending: Vec<Vec<PendingSplit>>,
}

impl Default for ConditionTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ConditionTree {
    const ROOT: NodeIdx = NodeIdx(0);

    pub(crate) fn new() -> Self {
        let mut root_entry = StackEntry::default();
        root_entry.branches[TRUE].push(Self::ROOT);
        Self {
            nodes: vec![TreeNode {
                parent: None,
                parent_branch: TRUE,
                condition: None,
                branches: [None, None],
                values: Variables::new(),
            }],
            current_branch: TRUE,
            node_stack: vec![root_entry],
            branch_stack: Vec::new(),
            pending: Vec::new(),
        }
    }

    fn node(&self, idx: NodeIdx) -> &TreeNode {
        &self.nodes[idx.index()]
    }

    fn node_mut(&mut self, idx: NodeIdx) -> &mut TreeNode {
        &mut self.nodes[idx.index()]
    }

    /// Narrows the root assumptions with conditions whose results are known up front.
    pub(crate) fn preset_conditions(
        &mut self,
        eval: &ConditionEvaluator,
        known: impl IntoIterator<Item = (ConditionId, bool)>,
    ) {
        debug_assert!(self.node(Self::ROOT).condition.is_none());
        for (cond, value) in known {
            let r = eval.check_condition_results(cond, &self.node(Self::ROOT).values);
            self.node_mut(Self::ROOT).values = if value { r.true_vars } else { r.false_vars };
        }
    }

    pub(crate) fn branch(&self) -> usize {
        self.current_branch
    }

    pub(crate) fn descend(&mut self, eval: &ConditionEvaluator, condition: ConditionId) -> Logic3 {
        let current = self
            .node_stack
            .last()
            .map(|e| e.branches[self.current_branch].clone())
            .unwrap_or_default();
        let mut next = StackEntry::default();
        let mut splits = Vec::new();

        match condition {
            ConditionId::ALWAYS_TRUE => next.branches[TRUE] = current,
            ConditionId::ALWAYS_FALSE => next.branches[FALSE] = current,
            _ => {
                for node in current {
                    self.recursive_add(eval, condition, node, &mut next, &mut splits);
                }
            }
        }

        let result = match (next.branches[TRUE].is_empty(), next.branches[FALSE].is_empty()) {
            (true, false) => Logic3::Lie,
            (false, true) => Logic3::Truth,
            _ => Logic3::Uncertain,
        };

        self.pending.push(splits);
        self.node_stack.push(next);
        self.branch_stack.push(self.current_branch);
        self.current_branch = TRUE;
        result
    }

    fn recursive_add(
        &mut self,
        eval: &ConditionEvaluator,
        condition: ConditionId,
        idx: NodeIdx,
        next: &mut StackEntry,
        splits: &mut Vec<PendingSplit>,
    ) {
        let node = self.node(idx);
        if node.condition == Some(condition)
            && let [Some(t), Some(f)] = node.branches
        {
            next.branches[TRUE].push(t);
            next.branches[FALSE].push(f);
            return;
        }

        let r = eval.check_condition_results(condition, &node.values);
        match (r.result, node.condition) {
            (Logic3::Truth, _) => next.branches[TRUE].push(idx),
            (Logic3::Lie, _) => next.branches[FALSE].push(idx),
            (Logic3::Uncertain, Some(_)) => {
                let children = self.node(idx).branches;
                for child in children.into_iter().flatten() {
                    self.recursive_add(eval, condition, child, next, splits);
                }
            }
            (Logic3::Uncertain, None) => {
                let container = self.containing_condition(eval, idx, condition);
                self.node_mut(idx).condition = Some(condition);
                for (b, vals) in [(TRUE, &r.true_vars), (FALSE, &r.false_vars)] {
                    let values = match container {
                        Some((outer, outer_branch)) => {
                            // Re-run the enclosing composite condition on the narrowed values so
                            // its other terms get narrowed as well.
                            let c = eval.check_condition_results(outer, vals);
                            if outer_branch == TRUE {
                                c.true_vars
                            } else {
                                c.false_vars
                            }
                        }
                        None => vals.clone(),
                    };
                    let new_node = NodeIdx::from_index(self.nodes.len());
                    self.nodes.push(TreeNode {
                        parent: Some(idx),
                        parent_branch: b,
                        condition: None,
                        branches: [None, None],
                        values,
                    });
                    splits.push(PendingSplit {
                        owner: idx,
                        branch: b,
                        new_node,
                    });
                    next.branches[b].push(new_node);
                }
            }
        }
    }

    /// Nearest ancestor whose condition contains `contained`, with the branch `idx` is under.
    fn containing_condition(
        &self,
        eval: &ConditionEvaluator,
        idx: NodeIdx,
        contained: ConditionId,
    ) -> Option<(ConditionId, usize)> {
        let mut child = idx;
        while let Some(parent) = self.node(child).parent {
            let p = self.node(parent);
            if let Some(cond) = p.condition
                && cond != contained
                && eval.is_condition_part_of(contained, cond)
            {
                return Some((cond, self.node(child).parent_branch));
            }
            child = parent;
        }
        None
    }

    pub(crate) fn switch_branch(&mut self) {
        debug_assert_eq!(self.current_branch, TRUE);
        self.current_branch = FALSE;
    }

    /// Leaves `num` levels, dropping splits that were never committed.
    pub(crate) fn ascend(&mut self, num: usize) {
        assert!(
            self.node_stack.len() > num,
            "condition tree ascended past its root"
        );
        for _ in 0..num {
            self.node_stack.pop();
            self.current_branch = self.branch_stack.pop().unwrap_or(TRUE);
            if let Some(splits) = self.pending.pop() {
                for s in splits {
                    self.nodes[s.owner.index()].condition = None;
                }
            }
        }
    }

    /// Makes every pending split permanent.
    pub(crate) fn commit(&mut self) {
        for splits in self.pending.drain(..) {
            for s in splits {
                self.nodes[s.owner.index()].branches[s.branch] = Some(s.new_node);
            }
        }
    }

    /// Replays the committed internal nodes into `resolver`, depth first.
    pub(crate) fn to_resolver(&self, resolver: &mut ConditionResolver) {
        if self.node(Self::ROOT).branches[TRUE].is_none() {
            return;
        }
        self.emit(resolver, Self::ROOT, None);
        resolver.finish_adding();
    }

    fn emit(&self, resolver: &mut ConditionResolver, idx: NodeIdx, parent: Option<ResolverNode>) {
        let node = self.node(idx);
        let Some(condition) = node.condition else {
            return;
        };
        let (t, f) = resolver.add_node(parent, condition);
        if let Some(child) = node.branches[TRUE] {
            self.emit(resolver, child, Some(t));
        }
        if let Some(child) = node.branches[FALSE] {
            self.emit(resolver, child, Some(f));
        }
    }

    pub(crate) fn dump(&self, eval: &ConditionEvaluator) -> String {
        let mut out = String::new();
        self.dump_node(eval, &mut out, Some(Self::ROOT), 0);
        out
    }

    fn dump_node(&self, eval: &ConditionEvaluator, out: &mut String, idx: Option<NodeIdx>, level: usize) {
        let Some(idx) = idx else {
            return;
        };
        let node = self.node(idx);
        let indent = " |".repeat(level);
        out.push_str(&indent);
        out.push_str(&node.values.dump(eval.names()));
        out.push('\n');
        out.push_str(&indent);
        out.push(' ');
        match node.condition {
            Some(c) => out.push_str(&format!("condition {c}")),
            None => out.push_str("leaf"),
        }
        out.push('\n');
        self.dump_node(eval, out, node.branches[TRUE], level + 1);
        self.dump_node(eval, out, node.branches[FALSE], level + 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::constants::ConstantTable;
    use crate::state::modes::RenderMeshModes;
    use crate::state::shadervar::{ShaderVarStack, ShaderVariable};

    fn eval() -> ConditionEvaluator {
        ConditionEvaluator::new(ConstantTable::new())
    }

    #[test]
    fn repeated_condition_is_decided_by_the_tree() {
        let mut e = eval();
        let a = e.parse_condition("vars.a.int == 1").unwrap();
        let mut t = ConditionTree::new();
        assert_eq!(t.descend(&e, a), Logic3::Uncertain);
        t.commit();
        assert_eq!(t.descend(&e, a), Logic3::Truth);
        t.ascend(1);
        t.switch_branch();
        assert_eq!(t.descend(&e, a), Logic3::Lie);
        t.ascend(2);
    }

    #[test]
    fn uncommitted_splits_roll_back() {
        let mut e = eval();
        let a = e.parse_condition("vars.a").unwrap();
        let mut t = ConditionTree::new();
        t.descend(&e, a);
        t.ascend(1);
        let mut r = ConditionResolver::new(e);
        t.to_resolver(&mut r);
        assert_eq!(r.variant_count(), 1);
    }

    #[test]
    fn committed_splits_reach_the_resolver() {
        let mut e = eval();
        let a = e.parse_condition("vars.a.int == 1").unwrap();
        let b = e.parse_condition("vars.b").unwrap();
        let mut t = ConditionTree::new();
        t.descend(&e, a);
        t.commit();
        t.descend(&e, b);
        t.commit();
        t.ascend(2);

        let mut r = ConditionResolver::new(e);
        t.to_resolver(&mut r);
        assert_eq!(r.variant_count(), 3);

        let modes = RenderMeshModes::new();
        let mut s = ShaderVarStack::new();
        let none = r.get_variant(&modes, &s);
        s.set("a", ShaderVariable::Int(1));
        let only_a = r.get_variant(&modes, &s);
        s.set("b", ShaderVariable::Int(0));
        let both = r.get_variant(&modes, &s);
        assert_ne!(none, only_a);
        assert_ne!(only_a, both);
        assert_ne!(none, both);
    }

    #[test]
    fn composite_conditions_refine_nested_terms() {
        let mut e = eval();
        let either = e.parse_condition("vars.a || vars.b").unwrap();
        let a = e.parse_condition("vars.a").unwrap();
        let b = e.parse_condition("vars.b").unwrap();
        let mut t = ConditionTree::new();
        t.descend(&e, either);
        t.commit();
        // Under the true branch, a false `a` forces `b`.
        t.descend(&e, a);
        t.commit();
        t.switch_branch();
        assert_eq!(t.descend(&e, b), Logic3::Truth);
        t.ascend(2);
        t.ascend(1);
    }

    #[test]
    fn pending_container_still_refines() {
        let mut e = eval();
        let either = e.parse_condition("vars.a || vars.b").unwrap();
        let a = e.parse_condition("vars.a").unwrap();
        let b = e.parse_condition("vars.b").unwrap();
        let mut t = ConditionTree::new();
        t.descend(&e, either);
        t.descend(&e, a);
        t.switch_branch();
        assert_eq!(t.descend(&e, b), Logic3::Truth);
        t.ascend(3);
    }

    #[test]
    fn sentinels_route_wholesale() {
        let mut t = ConditionTree::new();
        let e = eval();
        assert_eq!(t.descend(&e, ConditionId::ALWAYS_TRUE), Logic3::Truth);
        assert_eq!(t.descend(&e, ConditionId::ALWAYS_FALSE), Logic3::Lie);
        t.ascend(2);
        assert!(t.dump(&e).contains("leaf"));
    }

    #[test]
    fn preset_conditions_narrow_the_root() {
        let mut e = eval();
        let a = e.parse_condition("vars.a").unwrap();
        let mut t = ConditionTree::new();
        t.preset_conditions(&e, [(a, true)]);
        assert_eq!(t.descend(&e, a), Logic3::Truth);
    }

    #[test]
    #[should_panic(expected = "ascended past its root")]
    fn ascending_past_root_panics() {
        let mut t = ConditionTree::new();
        t.ascend(1);
    }
}

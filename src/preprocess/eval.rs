//! Condition bookkeeping strategies used while preprocessing.

use crate::condition::evaluator::{ConditionEvaluator, EvalCache};
use crate::condition::logic3::Logic3;
use crate::foundation::ids::ConditionId;
use crate::resolver::build::ConditionTree;
use crate::state::modes::RenderMeshModes;
use crate::state::shadervar::ShaderVarStack;

pub(crate) trait BranchEval {
    fn evaluator(&self) -> &ConditionEvaluator;
    fn parse_condition(&mut self, text: &str) -> Result<ConditionId, String>;
    fn descend(&mut self, condition: ConditionId) -> Logic3;
    fn switch_branch(&mut self);
    fn ascend(&mut self, num: usize);
    fn branch(&self) -> usize;
    fn commit(&mut self);

    /// Opens a condition scope of its own for a technique; `None` when scopes aren't tracked.
    fn enter_scope(&mut self) -> Option<usize> {
        None
    }

    fn leave_scope(&mut self) {}

    /// Innermost open technique scope.
    fn current_scope(&self) -> Option<usize> {
        None
    }
}

/// Grows condition trees; outcomes stay open unless a tree can decide them.
///
/// Conditions outside techniques go to the top tree, which decides the technique choice. Each
/// technique scope grows a tree of its own over the same evaluator.
pub(crate) struct TreeEval<'a> {
    tree: ConditionTree,
    open: Vec<(usize, ConditionTree)>,
    scopes: Vec<ConditionTree>,
    evaluator: &'a mut ConditionEvaluator,
}

impl<'a> TreeEval<'a> {
    pub(crate) fn new(evaluator: &'a mut ConditionEvaluator) -> Self {
        Self {
            tree: ConditionTree::new(),
            open: Vec::new(),
            scopes: Vec::new(),
            evaluator,
        }
    }

    fn current(&self) -> &ConditionTree {
        self.open.last().map_or(&self.tree, |(_, t)| t)
    }

    fn current_mut(&mut self) -> &mut ConditionTree {
        match self.open.last_mut() {
            Some((_, t)) => t,
            None => &mut self.tree,
        }
    }

    pub(crate) fn preset(&mut self, known: &[(ConditionId, bool)]) {
        self.tree
            .preset_conditions(self.evaluator, known.iter().copied());
    }

    /// The top tree, and one tree per technique scope in the order the scopes were opened.
    pub(crate) fn into_trees(mut self) -> (ConditionTree, Vec<ConditionTree>) {
        while !self.open.is_empty() {
            self.leave_scope();
        }
        (self.tree, self.scopes)
    }
}

impl BranchEval for TreeEval<'_> {
    fn evaluator(&self) -> &ConditionEvaluator {
        self.evaluator
    }

    fn parse_condition(&mut self, text: &str) -> Result<ConditionId, String> {
        self.evaluator.parse_condition(text)
    }

    fn descend(&mut self, condition: ConditionId) -> Logic3 {
        let tree = match self.open.last_mut() {
            Some((_, t)) => t,
            None => &mut self.tree,
        };
        tree.descend(self.evaluator, condition)
    }

    fn switch_branch(&mut self) {
        self.current_mut().switch_branch();
    }

    fn ascend(&mut self, num: usize) {
        self.current_mut().ascend(num);
    }

    fn branch(&self) -> usize {
        self.current().branch()
    }

    fn commit(&mut self) {
        self.current_mut().commit();
    }

    fn enter_scope(&mut self) -> Option<usize> {
        let id = self.scopes.len();
        self.scopes.push(ConditionTree::new());
        self.open.push((id, ConditionTree::new()));
        Some(id)
    }

    fn leave_scope(&mut self) {
        if let Some((id, tree)) = self.open.pop() {
            self.scopes[id] = tree;
        }
    }

    fn current_scope(&self) -> Option<usize> {
        self.open.last().map(|(id, _)| *id)
    }
}

/// Decides every condition immediately against one concrete render state.
pub(crate) struct StaticEval<'a> {
    evaluator: &'a mut ConditionEvaluator,
    modes: &'a RenderMeshModes,
    stack: &'a ShaderVarStack,
    cache: EvalCache,
    branch: usize,
    branch_stack: Vec<usize>,
}

impl<'a> StaticEval<'a> {
    pub(crate) fn new(
        evaluator: &'a mut ConditionEvaluator,
        modes: &'a RenderMeshModes,
        stack: &'a ShaderVarStack,
    ) -> Self {
        Self {
            evaluator,
            modes,
            stack,
            cache: EvalCache::new(),
            branch: 0,
            branch_stack: Vec::new(),
        }
    }
}

impl BranchEval for StaticEval<'_> {
    fn evaluator(&self) -> &ConditionEvaluator {
        self.evaluator
    }

    fn parse_condition(&mut self, text: &str) -> Result<ConditionId, String> {
        self.evaluator.parse_condition(text)
    }

    fn descend(&mut self, condition: ConditionId) -> Logic3 {
        self.branch_stack.push(self.branch);
        self.branch = 0;
        Logic3::from_bool(
            self.evaluator
                .evaluate(condition, &mut self.cache, self.modes, self.stack),
        )
    }

    fn switch_branch(&mut self) {
        debug_assert_eq!(self.branch, 0);
        self.branch = 1;
    }

    fn ascend(&mut self, num: usize) {
        for _ in 0..num {
            if let Some(b) = self.branch_stack.pop() {
                self.branch = b;
            }
        }
    }

    fn branch(&self) -> usize {
        self.branch
    }

    fn commit(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::constants::ConstantTable;
    use crate::state::shadervar::ShaderVariable;

    #[test]
    fn static_eval_decides_and_tracks_branches() {
        let mut e = ConditionEvaluator::new(ConstantTable::new());
        let modes = RenderMeshModes::new();
        let mut stack = ShaderVarStack::new();
        stack.set("q", ShaderVariable::Int(3));
        let mut s = StaticEval::new(&mut e, &modes, &stack);

        let c = s.parse_condition("vars.q.int > 2").unwrap();
        assert_eq!(s.descend(c), Logic3::Truth);
        s.switch_branch();
        assert_eq!(s.branch(), 1);
        let d = s.parse_condition("vars.q.int > 5").unwrap();
        assert_eq!(s.descend(d), Logic3::Lie);
        assert_eq!(s.branch(), 0);
        s.ascend(2);
        assert_eq!(s.branch(), 0);
    }

    #[test]
    fn tree_eval_leaves_unknowns_open() {
        let mut e = ConditionEvaluator::new(ConstantTable::new());
        let mut t = TreeEval::new(&mut e);
        let c = t.parse_condition("vars.q.int > 2").unwrap();
        assert_eq!(t.descend(c), Logic3::Uncertain);
        assert_eq!(t.descend(c), Logic3::Truth);
        t.ascend(2);
    }

    #[test]
    fn technique_scopes_grow_separate_trees() {
        let mut e = ConditionEvaluator::new(ConstantTable::new());
        let mut t = TreeEval::new(&mut e);
        let c = t.parse_condition("vars.q.int > 2").unwrap();
        assert_eq!(t.descend(c), Logic3::Uncertain);
        t.commit();

        assert_eq!(t.enter_scope(), Some(0));
        assert_eq!(t.current_scope(), Some(0));
        // The scope starts without the outer assumptions.
        assert_eq!(t.descend(c), Logic3::Uncertain);
        t.commit();
        t.ascend(1);
        t.leave_scope();
        assert_eq!(t.current_scope(), None);
        assert_eq!(t.descend(c), Logic3::Truth);
        t.ascend(2);

        assert_eq!(t.enter_scope(), Some(1));
        let (_, scopes) = t.into_trees();
        assert_eq!(scopes.len(), 2);
    }
}

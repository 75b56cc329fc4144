use std::collections::HashMap;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::condition::evaluator::{ConditionEvaluator, EvalCache};
use crate::foundation::bits::BitArray;
use crate::foundation::ids::ConditionId;
use crate::state::modes::RenderMeshModes;
use crate::state::shadervar::ShaderVarStack;

/// Handle of a node in the runtime decision tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResolverNode(pub(crate) u32);

impl ResolverNode {
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// A leaf carries a variant; an internal node carries a condition and both children.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct ConditionNode {
    pub(crate) condition: Option<ConditionId>,
    pub(crate) variant: Option<usize>,
    pub(crate) parent: Option<ResolverNode>,
    pub(crate) true_child: Option<ResolverNode>,
    pub(crate) false_child: Option<ResolverNode>,
}

impl ConditionNode {
    fn new(parent: Option<ResolverNode>) -> Self {
        Self {
            condition: None,
            variant: None,
            parent,
            true_child: None,
            false_child: None,
        }
    }
}

/// Truth assignment along a root-to-leaf path: which conditions are decided, and how.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PathBits {
    decided: BitArray,
    values: BitArray,
}

/// Maps a render state to a variant index by walking a decision tree of conditions.
#[derive(Debug, Clone)]
pub struct ConditionResolver {
    pub(crate) evaluator: ConditionEvaluator,
    pub(crate) nodes: Vec<ConditionNode>,
    pub(crate) root: Option<ResolverNode>,
    pub(crate) next_variant: usize,
    pub(crate) variant_conditions: Vec<Vec<(ConditionId, bool)>>,
    variant_ids: HashMap<PathBits, usize>,
}

impl ConditionResolver {
    pub fn new(evaluator: ConditionEvaluator) -> Self {
        Self {
            evaluator,
            nodes: Vec::new(),
            root: None,
            next_variant: 0,
            variant_conditions: Vec::new(),
            variant_ids: HashMap::new(),
        }
    }

    pub(crate) fn from_parts(
        evaluator: ConditionEvaluator,
        nodes: Vec<ConditionNode>,
        root: Option<ResolverNode>,
        next_variant: usize,
        variant_conditions: Vec<Vec<(ConditionId, bool)>>,
    ) -> Self {
        Self {
            evaluator,
            nodes,
            root,
            next_variant,
            variant_conditions,
            variant_ids: HashMap::new(),
        }
    }

    pub fn evaluator(&self) -> &ConditionEvaluator {
        &self.evaluator
    }

    pub fn evaluator_mut(&mut self) -> &mut ConditionEvaluator {
        &mut self.evaluator
    }

    fn new_node(&mut self, parent: Option<ResolverNode>) -> ResolverNode {
        let idx = ResolverNode(u32::try_from(self.nodes.len()).unwrap_or(u32::MAX));
        self.nodes.push(ConditionNode::new(parent));
        idx
    }

    fn node(&self, n: ResolverNode) -> &ConditionNode {
        &self.nodes[n.index()]
    }

    fn node_mut(&mut self, n: ResolverNode) -> &mut ConditionNode {
        &mut self.nodes[n.index()]
    }

    fn path(&self, leaf: ResolverNode) -> Vec<(ConditionId, bool)> {
        let mut out = Vec::new();
        let mut child = leaf;
        while let Some(parent) = self.node(child).parent {
            let p = self.node(parent);
            if let Some(cond) = p.condition {
                out.push((cond, p.true_child == Some(child)));
            }
            child = parent;
        }
        out.reverse();
        out
    }

    fn path_bits(path: &[(ConditionId, bool)]) -> PathBits {
        let mut bits = PathBits {
            decided: BitArray::new(),
            values: BitArray::new(),
        };
        for &(cond, value) in path {
            if cond.is_sentinel() {
                continue;
            }
            bits.decided.set(cond.index(), true);
            bits.values.set(cond.index(), value);
        }
        bits
    }

    fn variant_for(&mut self, leaf: ResolverNode) -> usize {
        let path = self.path(leaf);
        let bits = Self::path_bits(&path);
        if let Some(&v) = self.variant_ids.get(&bits) {
            return v;
        }
        let v = self.next_variant;
        self.next_variant += 1;
        self.variant_ids.insert(bits, v);
        self.variant_conditions.push(path);
        v
    }

    /// Splits `parent` (the root when `None`) on `condition`.
    ///
    /// The true child gets the variant for its path assignment; the false child takes over the
    /// parent's variant.
    pub fn add_node(
        &mut self,
        parent: Option<ResolverNode>,
        condition: ConditionId,
    ) -> (ResolverNode, ResolverNode) {
        let parent = match (self.root, parent) {
            (None, _) => {
                debug_assert!(parent.is_none(), "parent given before a root exists");
                let root = self.new_node(None);
                self.root = Some(root);
                root
            }
            (Some(_), Some(p)) => p,
            (Some(root), None) => root,
        };

        let inherited = self.node_mut(parent).variant.take();
        let t = self.new_node(Some(parent));
        let f = self.new_node(Some(parent));
        {
            let p = self.node_mut(parent);
            p.condition = Some(condition);
            p.true_child = Some(t);
            p.false_child = Some(f);
        }

        let tv = self.variant_for(t);
        self.node_mut(t).variant = Some(tv);

        let fv = match inherited {
            Some(v) => {
                let path = self.path(f);
                self.variant_ids.insert(Self::path_bits(&path), v);
                if let Some(slot) = self.variant_conditions.get_mut(v) {
                    *slot = path;
                }
                v
            }
            None => self.variant_for(f),
        };
        self.node_mut(f).variant = Some(fv);
        (t, f)
    }

    /// Drops the build-time variant dedup table.
    pub fn finish_adding(&mut self) {
        self.variant_ids.clear();
    }

    pub fn evaluate(
        &self,
        condition: ConditionId,
        cache: &mut EvalCache,
        modes: &RenderMeshModes,
        stack: &ShaderVarStack,
    ) -> bool {
        self.evaluator.evaluate(condition, cache, modes, stack)
    }

    /// Variant selected by the given render state; 0 for a tree without conditions.
    #[tracing::instrument(level = "trace", skip_all)]
    pub fn get_variant(&self, modes: &RenderMeshModes, stack: &ShaderVarStack) -> usize {
        let mut cache = EvalCache::new();
        self.get_variant_cached(&mut cache, modes, stack)
    }

    pub(crate) fn get_variant_cached(
        &self,
        cache: &mut EvalCache,
        modes: &RenderMeshModes,
        stack: &ShaderVarStack,
    ) -> usize {
        let Some(mut current) = self.root else {
            return 0;
        };
        loop {
            let node = self.node(current);
            if let Some(v) = node.variant {
                return v;
            }
            let Some(cond) = node.condition else {
                return 0;
            };
            let next = if self.evaluator.evaluate(cond, cache, modes, stack) {
                node.true_child
            } else {
                node.false_child
            };
            match next {
                Some(n) => current = n,
                None => return 0,
            }
        }
    }

    /// True when no condition was ever added; every state then maps to variant 0.
    pub fn is_unconditional(&self) -> bool {
        self.root.is_none()
    }

    pub fn variant_count(&self) -> usize {
        if self.root.is_none() {
            1
        } else {
            self.next_variant
        }
    }

    /// Condition assignment that selects variant `v`.
    pub fn variant_conditions(&self, v: usize) -> &[(ConditionId, bool)] {
        self.variant_conditions
            .get(v)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn dump_condition_tree(&self) -> String {
        let mut out = String::new();
        if let Some(root) = self.root {
            out.push('\n');
            self.dump_node(&mut out, Some(root), 0);
        }
        out
    }

    fn dump_node(&self, out: &mut String, node: Option<ResolverNode>, level: usize) {
        let indent = "| ".repeat(level);
        let Some(n) = node else {
            out.push_str(&indent);
            out.push_str("<none>\n");
            return;
        };
        let node = self.node(n);
        if let Some(v) = node.variant {
            let _ = write!(out, "variant: {v}");
            return;
        }
        let cond = node.condition.unwrap_or(ConditionId::ALWAYS_FALSE);
        let _ = write!(out, "\n{indent}condition {cond} = true: ");
        self.dump_node(out, node.true_child, level + 1);
        let _ = write!(out, "\n{indent}condition {cond} = false: ");
        self.dump_node(out, node.false_child, level + 1);
    }
}

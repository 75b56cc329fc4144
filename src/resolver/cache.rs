use serde::{Deserialize, Serialize};

use crate::condition::evaluator::ConditionEvaluator;
use crate::foundation::error::{ShaderError, ShaderResult};
use crate::foundation::ids::ConditionId;
use crate::resolver::runtime::{ConditionNode, ConditionResolver, ResolverNode};

const CACHE_VERSION: u32 = 1;

/// Serializable snapshot of a finished resolver tree.
///
/// Condition ids refer to the evaluator the tree was built with; restoring against a different
/// evaluator is only valid if it interned the same conditions in the same order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolverCache {
    pub version: u32,
    pub(crate) nodes: Vec<ConditionNode>,
    pub(crate) root: Option<ResolverNode>,
    pub next_variant: usize,
    pub(crate) variant_conditions: Vec<Vec<(ConditionId, bool)>>,
}

impl ResolverCache {
    pub fn to_json(&self) -> ShaderResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(text: &str) -> ShaderResult<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

impl ConditionResolver {
    pub fn to_cache(&self) -> ResolverCache {
        ResolverCache {
            version: CACHE_VERSION,
            nodes: self.nodes.clone(),
            root: self.root,
            next_variant: self.next_variant,
            variant_conditions: self.variant_conditions.clone(),
        }
    }

    /// Rebuilds a resolver from `cache`, rejecting trees that don't fit `evaluator`.
    pub fn from_cache(evaluator: ConditionEvaluator, cache: ResolverCache) -> ShaderResult<Self> {
        if cache.version != CACHE_VERSION {
            return Err(ShaderError::serde(format!(
                "unsupported resolver cache version {}",
                cache.version
            )));
        }
        let known = evaluator.num_conditions();
        let check_cond = |c: ConditionId| -> ShaderResult<()> {
            if c.is_sentinel() || c.index() < known {
                Ok(())
            } else {
                Err(ShaderError::serde(format!("unknown condition {c} in cache")))
            }
        };
        let check_node = |n: Option<ResolverNode>| -> ShaderResult<()> {
            match n {
                Some(ResolverNode(i)) if i as usize >= cache.nodes.len() => Err(
                    ShaderError::serde(format!("node index {i} out of range in cache")),
                ),
                _ => Ok(()),
            }
        };

        check_node(cache.root)?;
        for node in &cache.nodes {
            check_node(node.parent)?;
            check_node(node.true_child)?;
            check_node(node.false_child)?;
            match (node.variant, node.condition) {
                (Some(v), _) if v >= cache.next_variant => {
                    return Err(ShaderError::serde(format!(
                        "variant {v} out of range in cache"
                    )));
                }
                (Some(_), _) => {}
                (None, Some(c)) => {
                    check_cond(c)?;
                    if node.true_child.is_none() || node.false_child.is_none() {
                        return Err(ShaderError::serde("internal node without both children"));
                    }
                }
                (None, None) => return Err(ShaderError::serde("node without condition or variant")),
            }
        }
        for assignment in &cache.variant_conditions {
            for &(c, _) in assignment {
                check_cond(c)?;
            }
        }

        Ok(Self::from_parts(
            evaluator,
            cache.nodes,
            cache.root,
            cache.next_variant,
            cache.variant_conditions,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::constants::ConstantTable;
    use crate::state::modes::RenderMeshModes;
    use crate::state::shadervar::{ShaderVarStack, ShaderVariable};

    fn evaluator() -> (ConditionEvaluator, ConditionId) {
        let mut e = ConditionEvaluator::new(ConstantTable::new());
        let id = e.parse_condition("vars.n.int == 2").unwrap();
        (e, id)
    }

    #[test]
    fn restored_tree_selects_same_variants() {
        let (e, id) = evaluator();
        let mut r = ConditionResolver::new(e.clone());
        r.add_node(None, id);
        r.finish_adding();

        let json = r.to_cache().to_json().unwrap();
        let restored =
            ConditionResolver::from_cache(e, ResolverCache::from_json(&json).unwrap()).unwrap();

        let modes = RenderMeshModes::new();
        let mut s = ShaderVarStack::new();
        for n in [1, 2, 3] {
            s.set("n", ShaderVariable::Int(n));
            assert_eq!(restored.get_variant(&modes, &s), r.get_variant(&modes, &s));
        }
        assert_eq!(restored.variant_count(), 2);
        assert_eq!(restored.dump_condition_tree(), r.dump_condition_tree());
    }

    #[test]
    fn unknown_conditions_are_rejected() {
        let (e, id) = evaluator();
        let mut r = ConditionResolver::new(e);
        r.add_node(None, id);
        let cache = r.to_cache();

        let fresh = ConditionEvaluator::new(ConstantTable::new());
        let err = ConditionResolver::from_cache(fresh, cache).unwrap_err();
        assert!(err.to_string().contains("unknown condition"));
    }

    #[test]
    fn version_mismatch_is_rejected() {
        let (e, _) = evaluator();
        let mut cache = ConditionResolver::new(e.clone()).to_cache();
        cache.version = 99;
        assert!(ConditionResolver::from_cache(e, cache).is_err());
    }
}

//! Preprocessed documents.
//!
//! Every element owns a tree of wrappers. A wrapper either holds a node, or gates a list of
//! nested wrappers behind a `(condition, value)` pair that is checked when the document is read.

use crate::condition::evaluator::EvalCache;
use crate::document::node::{NodeKind, SourceNode};
use crate::foundation::ids::ConditionId;
use crate::resolver::runtime::ConditionResolver;
use crate::state::modes::RenderMeshModes;
use crate::state::shadervar::ShaderVarStack;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct WNodeIdx(u32);

impl WNodeIdx {
    fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct WrapperIdx(u32);

impl WrapperIdx {
    fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone)]
struct WrappedNode {
    kind: NodeKind,
    value: String,
    attributes: Vec<(String, String)>,
    /// Gate-free wrapper holding the node's children; `None` for text.
    top: Option<WrapperIdx>,
    scope: Option<usize>,
}

#[derive(Debug, Clone)]
struct WrappedChild {
    node: Option<WNodeIdx>,
    condition: ConditionId,
    value: bool,
    children: Vec<WrapperIdx>,
}

#[derive(Debug, Clone)]
pub struct WrappedDocument {
    nodes: Vec<WrappedNode>,
    wrappers: Vec<WrappedChild>,
    root: WNodeIdx,
}

impl Default for WrappedDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl WrappedDocument {
    pub(crate) fn new() -> Self {
        Self {
            nodes: Vec::new(),
            wrappers: Vec::new(),
            root: WNodeIdx(0),
        }
    }

    pub(crate) fn set_root(&mut self, root: WNodeIdx) {
        self.root = root;
    }

    pub(crate) fn new_wrapper(&mut self, condition: ConditionId, value: bool) -> WrapperIdx {
        let idx = WrapperIdx(u32::try_from(self.wrappers.len()).unwrap_or(u32::MAX));
        self.wrappers.push(WrappedChild {
            node: None,
            condition,
            value,
            children: Vec::new(),
        });
        idx
    }

    pub(crate) fn new_node(&mut self, source: &SourceNode, top: Option<WrapperIdx>) -> WNodeIdx {
        let idx = WNodeIdx(u32::try_from(self.nodes.len()).unwrap_or(u32::MAX));
        self.nodes.push(WrappedNode {
            kind: source.kind,
            value: source.value.clone(),
            attributes: source.attributes.clone(),
            top,
            scope: None,
        });
        idx
    }

    pub(crate) fn set_scope(&mut self, node: WNodeIdx, scope: usize) {
        self.nodes[node.index()].scope = Some(scope);
    }

    /// Appends a wrapper holding `node` to `parent`.
    pub(crate) fn push_node(&mut self, parent: WrapperIdx, node: WNodeIdx) {
        let w = self.new_wrapper(ConditionId::ALWAYS_TRUE, true);
        self.wrappers[w.index()].node = Some(node);
        self.attach(parent, w);
    }

    pub(crate) fn attach(&mut self, parent: WrapperIdx, child: WrapperIdx) {
        self.wrappers[parent.index()].children.push(child);
    }

    pub(crate) fn detach(&mut self, parent: WrapperIdx, child: WrapperIdx) {
        self.wrappers[parent.index()].children.retain(|&c| c != child);
    }

    pub(crate) fn condition(&self, w: WrapperIdx) -> (ConditionId, bool) {
        let w = &self.wrappers[w.index()];
        (w.condition, w.value)
    }

    /// A wrapper whose gate can never open.
    pub(crate) fn is_unreachable(&self, w: WrapperIdx) -> bool {
        match self.condition(w) {
            (ConditionId::ALWAYS_FALSE, true) | (ConditionId::ALWAYS_TRUE, false) => true,
            _ => false,
        }
    }

    pub(crate) fn is_empty(&self, w: WrapperIdx) -> bool {
        let w = &self.wrappers[w.index()];
        w.node.is_none() && w.children.is_empty()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// View of the document root under the given render state.
    pub fn view<'a>(&'a self, ctx: ReadContext<'a>) -> NodeView<'a> {
        NodeView {
            doc: self,
            idx: self.root,
            ctx,
        }
    }
}

/// Render state the gates of a wrapped document are evaluated against.
#[derive(Debug, Clone, Copy)]
pub struct ReadContext<'a> {
    pub resolver: &'a ConditionResolver,
    pub modes: &'a RenderMeshModes,
    pub stack: &'a ShaderVarStack,
}

impl<'a> ReadContext<'a> {
    pub fn new(
        resolver: &'a ConditionResolver,
        modes: &'a RenderMeshModes,
        stack: &'a ShaderVarStack,
    ) -> Self {
        Self {
            resolver,
            modes,
            stack,
        }
    }
}

/// Depth-first walk over the nodes visible under a render state.
pub(crate) struct WrapperWalker<'a> {
    doc: &'a WrappedDocument,
    ctx: ReadContext<'a>,
    cache: EvalCache,
    positions: Vec<(&'a [WrapperIdx], usize)>,
}

impl<'a> WrapperWalker<'a> {
    fn new(doc: &'a WrappedDocument, top: Option<WrapperIdx>, ctx: ReadContext<'a>) -> Self {
        let positions = match top {
            Some(t) => vec![(doc.wrappers[t.index()].children.as_slice(), 0)],
            None => Vec::new(),
        };
        Self {
            doc,
            ctx,
            cache: EvalCache::new(),
            positions,
        }
    }
}

impl Iterator for WrapperWalker<'_> {
    type Item = WNodeIdx;

    fn next(&mut self) -> Option<WNodeIdx> {
        let doc = self.doc;
        loop {
            let (list, pos) = self.positions.last_mut()?;
            let Some(w) = list.get(*pos).copied() else {
                self.positions.pop();
                continue;
            };
            *pos += 1;
            let wrapper = &doc.wrappers[w.index()];
            if let Some(n) = wrapper.node {
                return Some(n);
            }
            let open = self.ctx.resolver.evaluate(
                wrapper.condition,
                &mut self.cache,
                self.ctx.modes,
                self.ctx.stack,
            ) == wrapper.value;
            if open {
                self.positions.push((wrapper.children.as_slice(), 0));
            }
        }
    }
}

/// A child as seen through a [`NodeView`]: consecutive text runs arrive merged.
#[derive(Debug, Clone)]
pub enum Child<'a> {
    Node(NodeView<'a>),
    Text(String),
}

/// Read access to one wrapped node under a fixed render state.
#[derive(Debug, Clone, Copy)]
pub struct NodeView<'a> {
    doc: &'a WrappedDocument,
    idx: WNodeIdx,
    ctx: ReadContext<'a>,
}

impl<'a> NodeView<'a> {
    fn node(&self) -> &'a WrappedNode {
        &self.doc.nodes[self.idx.index()]
    }

    fn at(&self, idx: WNodeIdx) -> NodeView<'a> {
        NodeView { idx, ..*self }
    }

    fn walker(&self) -> WrapperWalker<'a> {
        WrapperWalker::new(self.doc, self.node().top, self.ctx)
    }

    pub fn kind(&self) -> NodeKind {
        self.node().kind
    }

    pub fn is_element(&self) -> bool {
        self.kind() == NodeKind::Element
    }

    /// Element name, or the text of a text node.
    pub fn value(&self) -> &'a str {
        &self.node().value
    }

    pub fn context(&self) -> ReadContext<'a> {
        self.ctx
    }

    /// Condition scope a technique element was wrapped in.
    pub fn scope(&self) -> Option<usize> {
        self.node().scope
    }

    pub fn children(&self) -> Vec<Child<'a>> {
        let mut out = Vec::new();
        for idx in self.walker() {
            let child = self.at(idx);
            if child.kind() == NodeKind::Text {
                if let Some(Child::Text(t)) = out.last_mut() {
                    t.push_str(child.value());
                } else {
                    out.push(Child::Text(child.value().to_owned()));
                }
            } else {
                out.push(Child::Node(child));
            }
        }
        out
    }

    /// Visible element children, in document order.
    pub fn elements(&self) -> impl Iterator<Item = NodeView<'a>> + use<'a> {
        let this = *self;
        self.walker()
            .map(move |idx| this.at(idx))
            .filter(NodeView::is_element)
    }

    pub fn children_named(&self, name: &'a str) -> impl Iterator<Item = NodeView<'a>> + use<'a> {
        self.elements().filter(move |c| c.value() == name)
    }

    pub fn first_child(&self, name: &str) -> Option<NodeView<'a>> {
        self.elements().find(|c| c.value() == name)
    }

    /// First visible run of text, or an empty string.
    pub fn contents_value(&self) -> String {
        let mut out = String::new();
        let mut started = false;
        for idx in self.walker() {
            let child = self.at(idx);
            if child.kind() == NodeKind::Text {
                out.push_str(child.value());
                started = true;
            } else if started {
                break;
            }
        }
        out
    }

    pub fn attribute(&self, name: &str) -> Option<&'a str> {
        self.node()
            .attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Leading integer of the attribute value, 0 when absent or unparsable.
    pub fn attribute_as_int(&self, name: &str) -> i32 {
        self.attribute(name).map(leading_int).unwrap_or(0)
    }

    pub fn attribute_as_float(&self, name: &str) -> f32 {
        self.attribute(name)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0.0)
    }

    pub fn attribute_as_bool(&self, name: &str, default: bool) -> bool {
        match self.attribute(name) {
            Some(v) => parse_bool(v).unwrap_or(default),
            None => default,
        }
    }

    /// Snapshot of this subtree as plain nodes, with every gate decided by the current state.
    pub fn materialize(&self) -> SourceNode {
        let node = self.node();
        let mut out = SourceNode {
            kind: node.kind,
            value: node.value.clone(),
            attributes: node.attributes.clone(),
            children: Vec::new(),
        };
        for child in self.children() {
            out.children.push(match child {
                Child::Node(n) => n.materialize(),
                Child::Text(t) => SourceNode::text(t),
            });
        }
        out
    }
}

pub(crate) fn parse_bool(v: &str) -> Option<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

fn leading_int(v: &str) -> i32 {
    let v = v.trim_start();
    let end = v
        .char_indices()
        .find(|&(i, c)| !(c.is_ascii_digit() || (i == 0 && (c == '-' || c == '+'))))
        .map(|(i, _)| i)
        .unwrap_or(v.len());
    v[..end].parse().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::constants::ConstantTable;
    use crate::condition::evaluator::ConditionEvaluator;
    use crate::state::shadervar::ShaderVariable;

    #[test]
    fn gates_are_checked_at_read_time() {
        let mut e = ConditionEvaluator::new(ConstantTable::new());
        let cond = e.parse_condition("vars.a.int == 1").unwrap();
        let resolver = ConditionResolver::new(e);

        let mut doc = WrappedDocument::new();
        let top = doc.new_wrapper(ConditionId::ALWAYS_TRUE, true);
        let root = doc.new_node(&SourceNode::element("r"), Some(top));
        doc.set_root(root);
        let yes = doc.new_wrapper(cond, true);
        let no = doc.new_wrapper(cond, false);
        doc.attach(top, yes);
        doc.attach(top, no);
        let x = doc.new_node(&SourceNode::text("X"), None);
        let y = doc.new_node(&SourceNode::text("Y"), None);
        doc.push_node(yes, x);
        doc.push_node(no, y);
        let tail = doc.new_node(&SourceNode::text("!"), None);
        doc.push_node(top, tail);

        let modes = RenderMeshModes::new();
        let mut stack = ShaderVarStack::new();
        stack.set("a", ShaderVariable::Int(1));
        let v = doc.view(ReadContext::new(&resolver, &modes, &stack));
        assert_eq!(v.contents_value(), "X!");
        assert_eq!(v.children().len(), 1);

        stack.set("a", ShaderVariable::Int(2));
        let v = doc.view(ReadContext::new(&resolver, &modes, &stack));
        assert_eq!(v.contents_value(), "Y!");
        assert_eq!(v.materialize().children, vec![SourceNode::text("Y!")]);
    }

    #[test]
    fn attribute_accessors_default_quietly() {
        let resolver = ConditionResolver::new(ConditionEvaluator::default());
        let modes = RenderMeshModes::new();
        let stack = ShaderVarStack::new();
        let mut doc = WrappedDocument::new();
        let top = doc.new_wrapper(ConditionId::ALWAYS_TRUE, true);
        let src = SourceNode::element("t")
            .with_attr("priority", "200abc")
            .with_attr("flag", "Yes")
            .with_attr("f", "0.5");
        let root = doc.new_node(&src, Some(top));
        doc.set_root(root);
        let v = doc.view(ReadContext::new(&resolver, &modes, &stack));
        assert_eq!(v.attribute_as_int("priority"), 200);
        assert_eq!(v.attribute_as_int("missing"), 0);
        assert!(v.attribute_as_bool("flag", false));
        assert!(v.attribute_as_bool("missing", true));
        assert_eq!(v.attribute_as_float("f"), 0.5);
        assert_eq!(v.contents_value(), "");
        assert!(v.first_child("x").is_none());
    }
}

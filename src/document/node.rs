use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Root,
    #[default]
    Element,
    Text,
    ProcessingInstruction,
}

/// Plain document node, either parsed from XML or assembled in code.
///
/// `value` is the element name, the text content, or the instruction body without its
/// `<?`/`?>` delimiters (for example `if vars.x.int == 1`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceNode {
    pub kind: NodeKind,
    pub value: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<(String, String)>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<SourceNode>,
}

impl SourceNode {
    pub fn root() -> Self {
        Self {
            kind: NodeKind::Root,
            ..Self::default()
        }
    }

    pub fn element(name: impl Into<String>) -> Self {
        Self {
            kind: NodeKind::Element,
            value: name.into(),
            ..Self::default()
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: NodeKind::Text,
            value: text.into(),
            ..Self::default()
        }
    }

    pub fn instruction(body: impl Into<String>) -> Self {
        Self {
            kind: NodeKind::ProcessingInstruction,
            value: body.into(),
            ..Self::default()
        }
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attr(name, value);
        self
    }

    pub fn with_child(mut self, child: SourceNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_children(mut self, children: impl IntoIterator<Item = SourceNode>) -> Self {
        self.children.extend(children);
        self
    }

    pub fn set_attr(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((name, value)),
        }
    }

    pub fn is_element(&self) -> bool {
        self.kind == NodeKind::Element
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn children_named<'a, 'b>(&'a self, name: &'b str) -> impl Iterator<Item = &'a SourceNode> {
        self.children
            .iter()
            .filter(move |c| c.is_element() && c.value == name)
    }

    pub fn first_child(&self, name: &str) -> Option<&SourceNode> {
        self.children_named(name).next()
    }

    /// First run of consecutive text children, concatenated.
    pub fn contents_value(&self) -> String {
        let mut out = String::new();
        let mut started = false;
        for c in &self.children {
            match c.kind {
                NodeKind::Text => {
                    out.push_str(&c.value);
                    started = true;
                }
                _ if started => break,
                _ => {}
            }
        }
        out
    }

    /// XML text for this node and its subtree.
    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        self.write_xml(&mut out, 0);
        out
    }

    fn write_xml(&self, out: &mut String, depth: usize) {
        let indent = "  ".repeat(depth);
        match self.kind {
            NodeKind::Root => {
                for c in &self.children {
                    c.write_xml(out, depth);
                }
            }
            NodeKind::Text => {
                let _ = writeln!(out, "{indent}{}", escape(&self.value, false));
            }
            NodeKind::ProcessingInstruction => {
                let _ = writeln!(out, "{indent}<?{}?>", self.value);
            }
            NodeKind::Element => {
                let _ = write!(out, "{indent}<{}", self.value);
                for (n, v) in &self.attributes {
                    let _ = write!(out, " {n}=\"{}\"", escape(v, true));
                }
                if self.children.is_empty() {
                    out.push_str("/>\n");
                    return;
                }
                if let [only] = self.children.as_slice()
                    && only.kind == NodeKind::Text
                {
                    let _ = writeln!(out, ">{}</{}>", escape(&only.value, false), self.value);
                    return;
                }
                out.push_str(">\n");
                for c in &self.children {
                    c.write_xml(out, depth + 1);
                }
                let _ = writeln!(out, "{indent}</{}>", self.value);
            }
        }
    }
}

fn escape(s: &str, attr: bool) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attr => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contents_value_takes_first_text_run() {
        let n = SourceNode::element("tag")
            .with_child(SourceNode::element("x"))
            .with_child(SourceNode::text("a"))
            .with_child(SourceNode::text("b"))
            .with_child(SourceNode::element("y"))
            .with_child(SourceNode::text("c"));
        assert_eq!(n.contents_value(), "ab");
        assert_eq!(SourceNode::element("empty").contents_value(), "");
    }

    #[test]
    fn attributes_replace_in_place() {
        let mut n = SourceNode::element("pass").with_attr("a", "1").with_attr("b", "2");
        n.set_attr("a", "3");
        assert_eq!(n.attribute("a"), Some("3"));
        assert_eq!(n.attributes.len(), 2);
        assert_eq!(n.attribute("zz"), None);
    }

    #[test]
    fn xml_output_escapes() {
        let n = SourceNode::element("v")
            .with_attr("q", "a\"b")
            .with_child(SourceNode::text("x < y"));
        assert_eq!(n.to_xml(), "<v q=\"a&quot;b\">x &lt; y</v>\n");
    }
}

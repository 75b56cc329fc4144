use std::collections::HashMap;

use crate::document::node::SourceNode;

/// Captured template body plus its parameter names.
#[derive(Debug, Clone, Default)]
pub(crate) struct Template {
    pub(crate) params: Vec<String>,
    pub(crate) nodes: Vec<SourceNode>,
}

impl Template {
    /// Copies the body with `?param?` placeholders replaced by the matching arguments.
    ///
    /// Extra arguments are ignored; parameters without an argument keep their placeholder.
    pub(crate) fn instantiate(&self, args: &[String]) -> Vec<SourceNode> {
        let map: HashMap<&str, &str> = self
            .params
            .iter()
            .zip(args)
            .map(|(p, a)| (p.as_str(), a.as_str()))
            .collect();
        self.nodes.iter().map(|n| substitute_node(n, &map)).collect()
    }
}

pub(crate) fn substitute_node(node: &SourceNode, map: &HashMap<&str, &str>) -> SourceNode {
    SourceNode {
        kind: node.kind,
        value: substitute(&node.value, map),
        attributes: node
            .attributes
            .iter()
            .map(|(n, v)| (substitute(n, map), substitute(v, map)))
            .collect(),
        children: node
            .children
            .iter()
            .map(|c| substitute_node(c, map))
            .collect(),
    }
}

pub(crate) fn substitute(s: &str, map: &HashMap<&str, &str>) -> String {
    if map.is_empty() || !s.contains('?') {
        return s.to_owned();
    }
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(open) = rest.find('?') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('?') {
            Some(close) => match map.get(&after[..close]) {
                Some(value) => {
                    out.push_str(value);
                    rest = &after[close + 1..];
                }
                None => {
                    out.push('?');
                    rest = after;
                }
            },
            None => {
                out.push('?');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map<'a>(pairs: &[(&'a str, &'a str)]) -> HashMap<&'a str, &'a str> {
        pairs.iter().copied().collect()
    }

    #[test]
    fn placeholders_are_replaced() {
        let m = map(&[("n", "3"), ("name", "diffuse")]);
        assert_eq!(substitute("tex?n?", &m), "tex3");
        assert_eq!(substitute("?name?_?n?", &m), "diffuse_3");
        assert_eq!(substitute("a ? b", &m), "a ? b");
        assert_eq!(substitute("?other? ?n?", &m), "?other? 3");
    }

    #[test]
    fn missing_arguments_leave_placeholder() {
        let t = Template {
            params: vec!["a".into(), "b".into()],
            nodes: vec![
                SourceNode::element("v")
                    .with_attr("x", "?a?")
                    .with_child(SourceNode::text("?b?")),
            ],
        };
        let out = t.instantiate(&["1".to_owned()]);
        assert_eq!(out[0].attribute("x"), Some("1"));
        assert_eq!(out[0].children[0].value, "?b?");
    }
}

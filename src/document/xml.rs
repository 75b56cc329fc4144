use std::borrow::Cow;

use crate::document::node::{NodeKind, SourceNode};

/// Parses XML text into a [`SourceNode`] tree rooted at a `Root` node.
///
/// Comments are dropped, whitespace-only text is skipped and other text is trimmed.
/// Instructions starting with `!` or `#` are comments for the preprocessor; they are removed
/// before parsing since they are not valid XML instruction targets.
pub fn parse_document(text: &str) -> Result<SourceNode, roxmltree::Error> {
    let cleaned = strip_comment_instructions(text);
    let doc = roxmltree::Document::parse(&cleaned)?;
    Ok(convert(doc.root()).unwrap_or_else(SourceNode::root))
}

fn convert(node: roxmltree::Node<'_, '_>) -> Option<SourceNode> {
    let out = match node.node_type() {
        roxmltree::NodeType::Root => {
            SourceNode::root().with_children(node.children().filter_map(convert))
        }
        roxmltree::NodeType::Element => {
            let mut el = SourceNode::element(node.tag_name().name());
            for a in node.attributes() {
                el.attributes.push((a.name().to_owned(), a.value().to_owned()));
            }
            el.with_children(node.children().filter_map(convert))
        }
        roxmltree::NodeType::Text => {
            let t = node.text().unwrap_or("").trim();
            if t.is_empty() {
                return None;
            }
            SourceNode::text(t)
        }
        roxmltree::NodeType::PI => {
            let pi = node.pi()?;
            let body = match pi.value.map(str::trim) {
                Some(v) if !v.is_empty() => format!("{} {v}", pi.target),
                _ => pi.target.to_owned(),
            };
            SourceNode {
                kind: NodeKind::ProcessingInstruction,
                value: body,
                ..SourceNode::default()
            }
        }
        roxmltree::NodeType::Comment => return None,
    };
    Some(out)
}

fn strip_comment_instructions(text: &str) -> Cow<'_, str> {
    if !text.contains("<?!") && !text.contains("<?#") {
        return Cow::Borrowed(text);
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("<?") {
        let after = &rest[start + 2..];
        let is_comment = after.starts_with('!') || after.starts_with('#');
        let Some(end) = after.find("?>") else {
            break;
        };
        out.push_str(&rest[..start]);
        if !is_comment {
            out.push_str(&rest[start..start + 2 + end + 2]);
        }
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    Cow::Owned(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instructions_keep_target_and_body() {
        let doc = parse_document(
            "<shader name=\"s\"><?if vars.a.int == 1?>x<?endif?>\n  <tag>  y </tag></shader>",
        )
        .unwrap();
        let shader = &doc.children[0];
        assert_eq!(shader.value, "shader");
        assert_eq!(shader.attribute("name"), Some("s"));
        assert_eq!(shader.children[0].kind, NodeKind::ProcessingInstruction);
        assert_eq!(shader.children[0].value, "if vars.a.int == 1");
        assert_eq!(shader.children[1], SourceNode::text("x"));
        assert_eq!(shader.children[2].value, "endif");
        assert_eq!(shader.children[3].contents_value(), "y");
        assert_eq!(shader.children.len(), 4);
    }

    #[test]
    fn comment_instructions_are_removed() {
        let doc = parse_document("<a><?! note ?><?# other?><b/><!-- c --></a>").unwrap();
        let a = &doc.children[0];
        assert_eq!(a.children.len(), 1);
        assert_eq!(a.children[0].value, "b");
    }

    #[test]
    fn malformed_input_is_an_error() {
        assert!(parse_document("<a><b></a>").is_err());
    }
}

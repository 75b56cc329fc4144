//! Instruction splitting and argument tokenizing.

/// Splits an instruction body into its command and the (left-trimmed) rest.
pub(crate) fn split_instruction(body: &str) -> Option<(&str, &str)> {
    let body = body.trim_matches(' ');
    if body.is_empty() {
        return None;
    }
    Some(match body.find(' ') {
        Some(i) => (&body[..i], body[i + 1..].trim_start()),
        None => (body, ""),
    })
}

/// Reads one argument: either a run of non-space characters or a double-quoted string in which
/// `\"` and `\\` are escapes.
fn next_arg(s: &str) -> (String, &str) {
    let s = s.trim_start();
    let mut out = String::new();
    let mut chars = s.char_indices();
    if s.starts_with('"') {
        chars.next();
        while let Some((i, c)) = chars.next() {
            match c {
                '"' => return (out, &s[i + 1..]),
                '\\' => match chars.next() {
                    Some((_, e)) => out.push(e),
                    None => break,
                },
                _ => out.push(c),
            }
        }
        return (out, "");
    }
    for (i, c) in chars {
        if c.is_whitespace() {
            return (out, &s[i..]);
        }
        out.push(c);
    }
    (out, "")
}

pub(crate) fn parse_arguments(mut s: &str, omit_empty: bool) -> Vec<String> {
    let mut args = Vec::new();
    loop {
        s = s.trim_start();
        if s.is_empty() {
            break;
        }
        let (arg, rest) = next_arg(s);
        if !omit_empty || !arg.is_empty() {
            args.push(arg);
        }
        s = rest;
    }
    args
}

/// Parses exactly one argument with nothing after it.
pub(crate) fn single_argument(s: &str) -> Option<String> {
    let (arg, rest) = next_arg(s);
    (!arg.is_empty() && rest.trim().is_empty()).then_some(arg)
}

pub(crate) fn decode_entities(s: &str) -> std::borrow::Cow<'_, str> {
    if s.contains("&lt;") || s.contains("&gt;") {
        std::borrow::Cow::Owned(s.replace("&lt;", "<").replace("&gt;", ">"))
    } else {
        std::borrow::Cow::Borrowed(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_command_and_arguments() {
        assert_eq!(split_instruction("  if vars.a  "), Some(("if", "vars.a")));
        assert_eq!(split_instruction("endif"), Some(("endif", "")));
        assert_eq!(split_instruction("   "), None);
    }

    #[test]
    fn quoted_arguments_keep_spaces() {
        assert_eq!(
            parse_arguments(r#"a "b c" "d \"e\"" f"#, false),
            vec!["a", "b c", "d \"e\"", "f"]
        );
        assert_eq!(parse_arguments(r#"a "" b"#, false), vec!["a", "", "b"]);
        assert_eq!(parse_arguments(r#"a "" b"#, true), vec!["a", "b"]);
        assert!(parse_arguments("   ", false).is_empty());
    }

    #[test]
    fn single_argument_rejects_extras() {
        assert_eq!(single_argument(" FOO "), Some("FOO".to_owned()));
        assert_eq!(single_argument("FOO BAR"), None);
        assert_eq!(single_argument(""), None);
    }

    #[test]
    fn entities_decode() {
        assert_eq!(decode_entities("a &lt; b &gt; c"), "a < b > c");
    }
}

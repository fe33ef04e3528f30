//! Source clean-up applied before lexing.
//!
//! Generated snippets arrive with Windows line endings, wrapped in a
//! markdown fence, or indented as a whole. None of that is meaningful to the
//! program, so it is stripped here and the cleaned text is what every later
//! stage (and every diagnostic) refers to.

const FENCE: &str = "```";

/// Normalise raw snippet text.
///
/// 1. `\r\n` and lone `\r` become `\n`.
/// 2. If a markdown code fence is present, only its body is kept.
/// 3. Indentation shared by every non-blank line is removed.
/// 4. Trailing blank lines and trailing whitespace on the last line go.
pub fn normalize(source: &str) -> String {
    let unified = source.replace("\r\n", "\n").replace('\r', "\n");
    let body = extract_fenced(&unified).unwrap_or(&unified);
    let dedented = dedent(body);
    dedented.trim_end().to_string()
}

/// Body of the first fenced block, if the text contains one.
///
/// The opening fence may carry an info string (`python`, `py`, ...). A
/// missing closing fence keeps everything after the opening one.
fn extract_fenced(text: &str) -> Option<&str> {
    let mut offset = 0;
    let mut body_start = None;
    for line in text.split_inclusive('\n') {
        let line_start = offset;
        offset += line.len();
        if !line.trim_start().starts_with(FENCE) {
            continue;
        }
        match body_start {
            None => body_start = Some(offset),
            Some(start) => return Some(&text[start..line_start]),
        }
    }
    body_start.map(|start| &text[start..])
}

fn dedent(text: &str) -> String {
    let margin = text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.len() - line.trim_start_matches([' ', '\t']).len())
        .min()
        .unwrap_or(0);
    if margin == 0 {
        return text.to_string();
    }
    text.lines()
        .map(|line| {
            if line.trim().is_empty() {
                ""
            } else {
                &line[margin..]
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crlf_becomes_lf() {
        assert_eq!(normalize("a = 1\r\nb = 2\r\n"), "a = 1\nb = 2");
    }

    #[test]
    fn test_fenced_block_body_is_extracted() {
        let text = "Here you go:\n```python\nx = 1\nx + 1\n```\nHope it helps.";
        assert_eq!(normalize(text), "x = 1\nx + 1");
    }

    #[test]
    fn test_unclosed_fence_keeps_rest() {
        assert_eq!(normalize("```\nx = 1\n"), "x = 1");
    }

    #[test]
    fn test_common_indentation_removed() {
        let text = "    if x:\n        y = 1\n\n    z = 2\n";
        assert_eq!(normalize(text), "if x:\n    y = 1\n\nz = 2");
    }

    #[test]
    fn test_unindented_text_unchanged() {
        assert_eq!(normalize("a = 1\n  # note\nb = 2"), "a = 1\n  # note\nb = 2");
    }

    #[test]
    fn test_trailing_blank_lines_trimmed() {
        assert_eq!(normalize("a = 1\n\n   \n"), "a = 1");
    }

    #[test]
    fn test_blank_input() {
        assert_eq!(normalize("  \n\n"), "");
    }
}

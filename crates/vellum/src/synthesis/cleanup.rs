//! Output cleanup: strip fenced-code markers wrapped around the document.

/// The literal fence delimiter models wrap code in.
pub const FENCE: &str = "```";

/// Strip leading and trailing fenced-code markers from raw model output.
///
/// Per pass, in order: a leading fence with a language tag (`` ```html ``),
/// then a bare leading fence, then a trailing fence. Passes repeat until the
/// text stops changing, so the function is idempotent.
pub fn strip_code_fences(raw: &str) -> String {
    let mut text = raw.trim();
    loop {
        let before = text;
        text = strip_tagged_leading(text).trim_start();
        text = text.strip_prefix(FENCE).unwrap_or(text).trim_start();
        text = text.strip_suffix(FENCE).unwrap_or(text).trim_end();
        if text == before {
            return text.to_string();
        }
    }
}

fn strip_tagged_leading(text: &str) -> &str {
    let Some(rest) = text.strip_prefix(FENCE) else {
        return text;
    };
    let tag_len = rest
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-' || c == '_'))
        .unwrap_or(rest.len());
    if tag_len == 0 {
        return text;
    }
    match rest.get(tag_len..) {
        Some(after) if after.is_empty() || after.starts_with(['\n', '\r', ' ']) => after,
        _ => text,
    }
}

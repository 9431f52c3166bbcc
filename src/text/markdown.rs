use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref IMAGE_REGEX: Regex = Regex::new(r"!\[([^\]]*)\]\([^)]*\)").unwrap();
    static ref LINK_REGEX: Regex = Regex::new(r"\[([^\]]+)\]\([^)]*\)").unwrap();
    static ref FENCE_REGEX: Regex = Regex::new(r"(?m)^\s*(```|~~~)[^\n]*$").unwrap();
    static ref HEADING_REGEX: Regex = Regex::new(r"(?m)^\s{0,3}#{1,6}\s+").unwrap();
    static ref BULLET_REGEX: Regex = Regex::new(r"(?m)^\s*[-*+]\s+").unwrap();
    static ref QUOTE_REGEX: Regex = Regex::new(r"(?m)^\s*>\s?").unwrap();
    static ref RULE_REGEX: Regex = Regex::new(r"(?m)^\s*([-*_]\s*){3,}$").unwrap();
    static ref EMPHASIS_REGEX: Regex = Regex::new(
        r"(?x)
        \*{1,3}([^*\n]+?)\*{1,3}|   # *italic* **bold** ***both***
        __([^_\n]+?)__|             # __bold__
        ~~([^~\n]+?)~~|             # ~~strike~~
        `([^`\n]+)`                 # `inline code`
        "
    )
    .unwrap();
}

/// Strip markdown syntax from model output, keeping the readable words.
///
/// Line structure is preserved so sentence splitting can still see where
/// headings and list items end.
pub fn strip(input: &str) -> String {
    let text = FENCE_REGEX.replace_all(input, "");
    let text = RULE_REGEX.replace_all(&text, "");
    let text = IMAGE_REGEX.replace_all(&text, "$1");
    let text = LINK_REGEX.replace_all(&text, "$1");
    let text = HEADING_REGEX.replace_all(&text, "");
    let text = BULLET_REGEX.replace_all(&text, "");
    let text = QUOTE_REGEX.replace_all(&text, "");

    EMPHASIS_REGEX
        .replace_all(&text, |cap: &regex::Captures| {
            (1..=4)
                .find_map(|i| cap.get(i))
                .map(|m| m.as_str().to_string())
                .unwrap_or_default()
        })
        .into_owned()
}

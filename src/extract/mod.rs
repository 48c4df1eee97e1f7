//! Fenced code block extraction for chat-style command text.

use std::sync::OnceLock;

use regex::Regex;

/// Opening fence, optional language tag, lazily matched body, closing fence.
/// A tag is either `python` or any identifier followed by a line break, so a
/// one-line block such as ```` ```x = 1``` ```` keeps its first token.
static FENCE_RE: OnceLock<Regex> = OnceLock::new();

fn fence_re() -> &'static Regex {
    FENCE_RE.get_or_init(|| {
        Regex::new(r"```(?:[\w+.\-]+[ \t]*\r?\n|python)?\s*([\s\S]*?)```").expect("fence regex")
    })
}

/// Return the body of the first fenced code block in `text`, trimmed.
///
/// Text without a complete fence is returned trimmed, so the extractor can be
/// applied to every command unconditionally.
pub fn extract_code(text: &str) -> String {
    match fence_re().captures(text).and_then(|c| c.get(1)) {
        Some(body) => body.as_str().trim().to_string(),
        None => text.trim().to_string(),
    }
}

/// True when `text` contains an opening fence that has not been closed yet.
/// The interactive session uses this to keep reading continuation lines.
pub fn has_open_fence(text: &str) -> bool {
    text.matches("```").count() % 2 == 1
}

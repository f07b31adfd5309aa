//! Normalization applied to generation output before JSON parsing.
//!
//! Each pass is a function `&str -> String` applied in sequence.
//! The result is lossy on purpose: intentional line breaks inside string
//! values are removed along with the stray ones that break strict parsing.

use std::sync::LazyLock;

use regex::Regex;

/// Run every normalization pass on raw generation output.
pub fn normalize(raw: &str) -> String {
    let mut result = raw.to_string();

    result = trim(&result);
    result = strip_code_fence(&result);
    result = collapse_line_breaks(&result);

    result
}

// ---------------------------------------------------------------------------
// Pass 1: Trim
// ---------------------------------------------------------------------------

fn trim(text: &str) -> String {
    text.trim().to_string()
}

// ---------------------------------------------------------------------------
// Pass 2: Unwrap a surrounding code fence
// ---------------------------------------------------------------------------

/// Unwrap ```` ```json ... ``` ```` when it encloses the whole payload.
///
/// Fences that only appear somewhere inside the text are left alone.
fn strip_code_fence(text: &str) -> String {
    static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?s)\A```[A-Za-z0-9_-]*[ \t]*\r?\n(.*?)\r?\n?```\z").expect("valid regex")
    });

    match FENCE_RE.captures(text) {
        Some(caps) => caps[1].trim().to_string(),
        None => text.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Pass 3: Collapse line breaks
// ---------------------------------------------------------------------------

/// Remove every `\r` and `\n`, concatenating lines directly.
fn collapse_line_breaks(text: &str) -> String {
    text.chars().filter(|c| *c != '\n' && *c != '\r').collect()
}

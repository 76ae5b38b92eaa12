//! Filter chain that cleans raw backend output before it reaches the history.
//!
//! The local model process writes through a terminal driver, so its stdout
//! carries ANSI escapes, braille spinner glyphs and leftover control-token
//! noise. The filters run in a fixed order; each is independently testable
//! and the whole chain is idempotent.

use regex::Regex;
use std::sync::LazyLock;

/// CSI and two-byte escape sequences.
static ANSI_SEQUENCES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:\x1B[@-Z\\-_]|(?:\x1B\[|\x9B)[0-?]*[ -/]*[@-~])").unwrap()
});

/// Private-mode fragments like `?25l` left behind once the escape byte is gone.
static PRIVATE_MODE_FRAGMENTS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\?\d+[lh]").unwrap());

/// Braille-range glyphs some CLI tools use as progress spinners.
static SPINNER_GLYPHS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\u{2800}-\u{28FF}]").unwrap());

/// Repeated erase-line/column-reset token noise from the spawned process.
static TERMINAL_ARTIFACTS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"2K1G ?(?:2K1G)*!?").unwrap());

/// A truncated sequence can leave a bare escape byte at the end of a line.
static STRAY_ESCAPES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\x1B\x9B]").unwrap());

/// Strips terminal control noise from one raw output fragment.
///
/// Removing one pattern can splice the surrounding text into another (a
/// spinner glyph inside `?25l`, an escape byte inside `2K1G`), so the
/// chain runs until a pass removes nothing. Every filter only deletes,
/// which bounds the loop by the input length.
pub fn sanitize(raw: &str) -> String {
    let mut cleaned = raw.to_string();
    loop {
        let pass = sanitize_pass(&cleaned);
        if pass == cleaned {
            return pass;
        }
        cleaned = pass;
    }
}

fn sanitize_pass(raw: &str) -> String {
    let cleaned = ANSI_SEQUENCES.replace_all(raw, "");
    let cleaned = PRIVATE_MODE_FRAGMENTS.replace_all(&cleaned, "");
    let cleaned = SPINNER_GLYPHS.replace_all(&cleaned, "");
    let cleaned = cleaned.replace('\r', "");
    let cleaned = TERMINAL_ARTIFACTS.replace_all(&cleaned, "");
    STRAY_ESCAPES.replace_all(&cleaned, "").into_owned()
}

static WHITESPACE_RUNS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
static WRAP_POINTS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(.{80,}?)(\s+|$)").unwrap());
static CODE_BLOCKS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)```(.*?)```").unwrap());

/// Wraps text in a fenced markdown code block.
pub fn format_as_codeblock(text: &str) -> String {
    format!("```\n{}\n```", text.trim())
}

/// Re-flows accumulated process output for display: collapses whitespace
/// runs, re-wraps long lines near 80 columns and re-fences code blocks.
pub fn format_output(text: &str) -> String {
    let flat = WHITESPACE_RUNS.replace_all(text, " ");
    let wrapped = WRAP_POINTS.replace_all(&flat, "$1\n").into_owned();

    let mut out = wrapped.clone();
    for cap in CODE_BLOCKS.captures_iter(&wrapped) {
        let block = &cap[1];
        out = out.replace(&format!("```{block}```"), &format_as_codeblock(block));
    }
    out
}

//! Post-processing: deterministic cleanup of LLM-generated markup.
//!
//! The cleanup prompt asks for bare LaTeX body text, but models still wrap
//! replies in ```` ```latex ```` fences, prepend "以下是处理后的文本：", or emit
//! a whole `\documentclass … \begin{document}` skeleton. These rules undo
//! that without touching content.
//!
//! ## Rule Order
//!
//! Fences come off before the document wrapper is looked for, and line
//! endings are normalised before any line-based rule runs.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all post-processing rules to a cleanup reply.
///
/// Rules (applied in order):
/// 1. Strip outer code fences
/// 2. Normalise line endings (CRLF → LF)
/// 3. Unwrap a stray `\begin{document}` … `\end{document}` skeleton
/// 4. Drop a leading "here is the result" line
/// 5. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens, etc.)
/// 6. Trim trailing whitespace per line
/// 7. Collapse runs of blank lines down to one
///
/// The result has no leading or trailing blank lines.
pub fn clean_markup(input: &str) -> String {
    let s = strip_code_fences(input);
    let s = normalise_line_endings(&s);
    let s = strip_document_wrapper(&s);
    let s = drop_preamble_chatter(&s);
    let s = remove_invisible_chars(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    s.trim_matches('\n').to_string()
}

// ── Rule 1: Strip outer code fences ──────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^```(?:latex|tex|LaTeX)?[ \t]*\r?\n(.*?)\r?\n```\s*$").unwrap()
});

fn strip_code_fences(input: &str) -> String {
    if let Some(caps) = RE_OUTER_FENCES.captures(input.trim()) {
        caps[1].to_string()
    } else {
        input.to_string()
    }
}

// ── Rule 2: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 3: Unwrap document skeleton ─────────────────────────────────────────

static RE_PREAMBLE_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*\\(?:documentclass|usepackage|maketitle|title|author|date)\b").unwrap()
});

fn strip_document_wrapper(input: &str) -> String {
    let body = match input.find("\\begin{document}") {
        Some(start) => {
            let rest = &input[start + "\\begin{document}".len()..];
            match rest.find("\\end{document}") {
                Some(end) => &rest[..end],
                None => rest,
            }
        }
        None if input.contains("\\documentclass") => input,
        None => return input.to_string(),
    };

    body.lines()
        .filter(|l| !RE_PREAMBLE_LINE.is_match(l))
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 4: Drop leading chatter ─────────────────────────────────────────────

static RE_CHATTER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:以下是|下面是|处理后的|修正后的|Here is|Here's)[^\n]{0,40}[:：]\s*$").unwrap()
});

fn drop_preamble_chatter(input: &str) -> String {
    let trimmed = input.trim_start_matches('\n');
    match trimmed.split_once('\n') {
        Some((first, rest)) if RE_CHATTER.is_match(first.trim()) => rest.to_string(),
        None if RE_CHATTER.is_match(trimmed.trim()) => String::new(),
        _ => input.to_string(),
    }
}

// ── Rule 5: Remove invisible Unicode characters ─────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Rule 6: Trim trailing whitespace per line ────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 7: Collapse blank lines ─────────────────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n").to_string()
}

// ── Tests ────────────────────────────────────────────────────────────────────

//! Typed representation of the intermediate markup.
//!
//! Enrichment hands pages over as LaTeX-like text: cleanup-service output for
//! text regions and figure environments for visual regions. This module
//! parses that text exactly once into [`Block`]s so every exporter renders
//! from the same structure instead of re-deriving it with its own patterns.
//!
//! Block markers recognised at the top level:
//!
//! | Marker | Block |
//! |--------|-------|
//! | `\begin{figure}…\end{figure}` | [`Block::Figure`] |
//! | `\begin{table}…\end{table}`, `\begin{tabular}…\end{tabular}` | [`Block::Table`] (or a figure if it only wraps a picture) |
//! | `\section{}` / `\subsection{}` / `\subsubsection{}` | [`Block::Heading`] level 1/2/3 |
//! | anything else | one [`Block::Paragraph`] per non-blank text line |

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path};
use tracing::warn;

/// Characters the cleanup service escapes with a single backslash.
pub const ESCAPED_CHARS: [char; 7] = ['&', '%', '$', '#', '_', '{', '}'];

/// One structural element of a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Block {
    /// Heading; level 1 = `\section`, 2 = `\subsection`, 3 = `\subsubsection`.
    Heading { level: u8, text: String },
    Paragraph(Vec<Inline>),
    /// Embedded region image. `path` is relative to the region-image directory.
    Figure {
        path: Option<String>,
        caption: Option<String>,
    },
    Table {
        rows: Vec<Vec<String>>,
        caption: Option<String>,
    },
}

/// Styled run inside a paragraph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Inline {
    Text(String),
    Bold(String),
    Italic(String),
}

impl Inline {
    pub fn text(&self) -> &str {
        match self {
            Inline::Text(s) | Inline::Bold(s) | Inline::Italic(s) => s,
        }
    }
}

/// Concatenated plain text of a run list.
pub fn plain_text(inlines: &[Inline]) -> String {
    inlines.iter().map(Inline::text).collect()
}

// ── Block splitting ──────────────────────────────────────────────────────

static RE_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?s)\\begin\{figure\*?\}.*?\\end\{figure\*?\}|\\begin\{table\*?\}.*?\\end\{table\*?\}|\\begin\{tabular\}.*?\\end\{tabular\}|\\(?:sub){0,2}section\*?\{[^}]*\}",
    )
    .unwrap()
});

static RE_HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\\((?:sub){0,2})section\*?\{([^}]*)\}$").unwrap());

static RE_INCLUDEGRAPHICS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\\includegraphics(?:\[[^\]]*\])?\{([^}]+)\}").unwrap());

static RE_CAPTION: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\caption\{([^}]+)\}").unwrap());

static RE_TABULAR_BODY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)\\begin\{tabular\}(?:\{(?:[^{}]|\{[^{}]*\})*\})?(.*?)\\end\{tabular\}")
        .unwrap()
});

static RE_STYLED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\\(textbf|textit|emph)\{([^{}]*)\}").unwrap());

/// A whole line that is markup rather than content, e.g. `\centering`.
static RE_COMMAND_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\\([a-zA-Z]+)").unwrap());

/// Table rules that carry no cell content.
static RE_RULE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\\(?:hline|toprule|midrule|bottomrule|cline\{[^}]*\})").unwrap());

/// Parse one fragment (or a whole page body) into blocks.
pub fn parse_fragment(markup: &str) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut last = 0;

    for m in RE_BLOCK.find_iter(markup) {
        parse_text(&markup[last..m.start()], &mut blocks);
        parse_marker(m.as_str(), &mut blocks);
        last = m.end();
    }
    parse_text(&markup[last..], &mut blocks);

    blocks
}

fn parse_marker(block: &str, out: &mut Vec<Block>) {
    if let Some(caps) = RE_HEADING.captures(block) {
        let level = (caps[1].len() / 3) as u8 + 1;
        let text = clean_inline(&caps[2]);
        let text = text.trim();
        if !text.is_empty() {
            out.push(Block::Heading {
                level,
                text: text.to_string(),
            });
        }
        return;
    }

    let caption = RE_CAPTION
        .captures(block)
        .map(|c| clean_inline(&c[1]).trim().to_string())
        .filter(|c| !c.is_empty());

    if let Some(caps) = RE_TABULAR_BODY.captures(block) {
        let rows = parse_rows(&caps[1]);
        if !rows.is_empty() {
            out.push(Block::Table { rows, caption });
            return;
        }
    }

    // Figure environments, and table environments that only wrap a picture.
    let path = RE_INCLUDEGRAPHICS
        .captures(block)
        .map(|c| c[1].trim().to_string())
        .filter(|p| {
            let ok = is_region_path(p);
            if !ok {
                warn!("Ignoring figure path outside the regions directory: {}", p);
            }
            ok
        });
    if path.is_some() || caption.is_some() {
        out.push(Block::Figure { path, caption });
    }
}

/// A figure path may only name a file below the region-image directory:
/// relative, `/`-separated, with no `.`, `..` or root components.
pub fn is_region_path(p: &str) -> bool {
    !p.is_empty()
        && !p.contains('\\')
        && Path::new(p)
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
}

fn parse_rows(body: &str) -> Vec<Vec<String>> {
    let body = RE_RULE.replace_all(body, "");
    split_unescaped(&body, "\\\\")
        .into_iter()
        .map(|row| {
            split_unescaped(row, "&")
                .into_iter()
                .map(|cell| clean_inline(cell).trim().to_string())
                .collect::<Vec<_>>()
        })
        .filter(|cells| cells.iter().any(|c| !c.is_empty()))
        .collect()
}

/// Split on `sep` wherever it is not itself backslash-escaped.
///
/// For `sep == "\\\\"` a run of backslashes is consumed pairwise, so `\\\&`
/// splits before the escaped ampersand.
fn split_unescaped<'a>(s: &'a str, sep: &str) -> Vec<&'a str> {
    let bytes = s.as_bytes();
    let sep_b = sep.as_bytes();
    let mut parts = Vec::new();
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i..].starts_with(sep_b) && (sep_b[0] == b'\\' || i == 0 || bytes[i - 1] != b'\\')
        {
            parts.push(&s[start..i]);
            i += sep_b.len();
            start = i;
        } else if bytes[i] == b'\\' {
            i += 2;
        } else {
            i += 1;
        }
    }
    parts.push(&s[start.min(s.len())..]);
    parts
}

fn parse_text(text: &str, out: &mut Vec<Block>) {
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || is_command_line(line) {
            continue;
        }
        let inlines = parse_inlines(line);
        if !plain_text(&inlines).trim().is_empty() {
            out.push(Block::Paragraph(inlines));
        }
    }
}

fn is_command_line(line: &str) -> bool {
    match RE_COMMAND_LINE.captures(line) {
        Some(caps) => {
            let name = &caps[1];
            !(name.starts_with("text") || name == "emph")
        }
        None => false,
    }
}

fn parse_inlines(line: &str) -> Vec<Inline> {
    let mut inlines = Vec::new();
    let mut last = 0;
    for caps in RE_STYLED.captures_iter(line) {
        let Some(m) = caps.get(0) else { continue };
        push_text(&mut inlines, &line[last..m.start()]);
        let inner = clean_inline(&caps[2]);
        if !inner.is_empty() {
            inlines.push(match &caps[1] {
                "textbf" => Inline::Bold(inner),
                _ => Inline::Italic(inner),
            });
        }
        last = m.end();
    }
    push_text(&mut inlines, &line[last..]);

    // Trim the paragraph edges.
    if let Some(Inline::Text(first)) = inlines.first_mut() {
        *first = first.trim_start().to_string();
    }
    if let Some(Inline::Text(last)) = inlines.last_mut() {
        *last = last.trim_end().to_string();
    }
    inlines.retain(|i| !i.text().is_empty());
    inlines
}

fn push_text(inlines: &mut Vec<Inline>, raw: &str) {
    let cleaned = clean_inline(raw);
    if cleaned.is_empty() {
        return;
    }
    match inlines.last_mut() {
        Some(Inline::Text(prev)) => prev.push_str(&cleaned),
        _ => inlines.push(Inline::Text(cleaned)),
    }
}

// ── Inline cleaning ──────────────────────────────────────────────────────

/// Turn a run of markup into plain text.
///
/// - `\&`, `\%`, `\$`, `\#`, `\_`, `\{`, `\}` become the literal character;
/// - `\^{}` becomes `^`, `\textbackslash` (with optional `{}`) becomes `\`;
/// - `\cmd{arg}` keeps `arg` (cleaned recursively), bare `\cmd` is dropped;
/// - `\\` (forced line break) becomes a space;
/// - everything else, including `~` and braces that do not delimit a
///   command argument, is kept as written.
pub fn clean_inline(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut out = String::with_capacity(s.len());
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '\\' => {
                let Some(&next) = chars.get(i + 1) else {
                    i += 1;
                    continue;
                };
                if ESCAPED_CHARS.contains(&next) {
                    out.push(next);
                    i += 2;
                } else if next == '^' {
                    out.push('^');
                    i = skip_empty_group(&chars, i + 2);
                } else if next == '\\' {
                    out.push(' ');
                    i += 2;
                } else if next.is_ascii_alphabetic() {
                    let start = i + 1;
                    let mut end = start;
                    while end < chars.len() && chars[end].is_ascii_alphabetic() {
                        end += 1;
                    }
                    let name: String = chars[start..end].iter().collect();
                    if name == "textbackslash" {
                        out.push('\\');
                        i = skip_empty_group(&chars, end);
                    } else {
                        // Every brace group directly after the name is an
                        // argument: `\textcolor{red}{警告}` keeps both.
                        i = end;
                        while chars.get(i) == Some(&'{') {
                            let Some(close) = matching_brace(&chars, i) else {
                                break;
                            };
                            let arg: String = chars[i + 1..close].iter().collect();
                            out.push_str(&clean_inline(&arg));
                            i = close + 1;
                        }
                    }
                } else {
                    // `\,` `\ ` and friends are spacing commands.
                    out.push(' ');
                    i += 2;
                }
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }
    out
}

fn skip_empty_group(chars: &[char], i: usize) -> usize {
    if chars.get(i) == Some(&'{') && chars.get(i + 1) == Some(&'}') {
        i + 2
    } else {
        i
    }
}

/// Index of the `}` closing the `{` at `open`, honouring nesting and escapes.
fn matching_brace(chars: &[char], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut i = open;
    while i < chars.len() {
        match chars[i] {
            '\\' => {
                i += 2;
                continue;
            }
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Escape plain text for inclusion in the intermediate markup.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\textbackslash{}"),
            '^' => out.push_str("\\^{}"),
            c if ESCAPED_CHARS.contains(&c) => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out
}

/// Markup of a figure environment referencing a saved region image.
pub fn figure_markup(rel_path: &str, caption: &str) -> String {
    format!(
        "\\begin{{figure}}[h]\n\\centering\n\\includegraphics[width=0.8\\textwidth]{{{}}}\n\\caption{{{}}}\n\\end{{figure}}",
        rel_path, caption
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn para(s: &str) -> Block {
        Block::Paragraph(vec![Inline::Text(s.to_string())])
    }

    #[test]
    fn headings_at_three_levels() {
        let blocks = parse_fragment("\\section{一、总则}\n\\subsection{（一）目的}\n\\subsubsection{1. 范围}");
        assert_eq!(
            blocks,
            vec![
                Block::Heading { level: 1, text: "一、总则".into() },
                Block::Heading { level: 2, text: "（一）目的".into() },
                Block::Heading { level: 3, text: "1. 范围".into() },
            ]
        );
    }

    #[test]
    fn paragraph_per_line_and_command_lines_dropped() {
        let blocks = parse_fragment("第一行\n\n\\centering\n第二行\n");
        assert_eq!(blocks, vec![para("第一行"), para("第二行")]);
    }

    #[test]
    fn escaped_specials_are_unescaped() {
        let blocks = parse_fragment("R\\&D 占 50\\% 预算 \\$3 \\#1 a\\_b \\{x\\}");
        assert_eq!(blocks, vec![para("R&D 占 50% 预算 $3 #1 a_b {x}")]);
    }

    #[test]
    fn line_starting_with_escape_is_kept() {
        let blocks = parse_fragment("\\%5 的增长");
        assert_eq!(blocks, vec![para("%5 的增长")]);
    }

    #[test]
    fn unknown_commands_keep_argument() {
        assert_eq!(clean_inline("见\\underline{附录}说明\\quad 完"), "见附录说明 完");
        assert_eq!(clean_inline("a\\textbackslash{}b"), "a\\b");
        assert_eq!(clean_inline("x\\^{}2"), "x^2");
        assert_eq!(clean_inline("\\textcolor{red}{警告}"), "red警告");
    }

    #[test]
    fn plain_tildes_and_braces_are_literal() {
        assert_eq!(clean_inline("有效期 3~5 年"), "有效期 3~5 年");
        assert_eq!(clean_inline("集合 {a, b} 与 }"), "集合 {a, b} 与 }");
        assert_eq!(clean_inline("\\emph{重点} {注}"), "重点 {注}");
        assert_eq!(clean_inline("未闭合\\mbox{参数"), "未闭合{参数");
        assert_eq!(
            parse_fragment("有效期 3~5 年\n集合 {a, b}"),
            vec![para("有效期 3~5 年"), para("集合 {a, b}")]
        );
    }

    #[test]
    fn styled_runs() {
        let blocks = parse_fragment("注意：\\textbf{必须} 按时 \\textit{提交}");
        assert_eq!(
            blocks,
            vec![Block::Paragraph(vec![
                Inline::Text("注意：".into()),
                Inline::Bold("必须".into()),
                Inline::Text(" 按时 ".into()),
                Inline::Italic("提交".into()),
            ])]
        );
    }

    #[test]
    fn figure_with_caption() {
        let blocks = parse_fragment(&figure_markup("figure/page_1_region_2.jpg", "图"));
        assert_eq!(
            blocks,
            vec![Block::Figure {
                path: Some("figure/page_1_region_2.jpg".into()),
                caption: Some("图".into()),
            }]
        );
    }

    #[test]
    fn figure_paths_escaping_regions_dir_are_dropped() {
        for bad in ["/etc/passwd", "../../secret.jpg", "table/../../x.jpg", "C:\\x.jpg", "./a.jpg"] {
            let blocks = parse_fragment(&figure_markup(bad, "表格"));
            assert_eq!(
                blocks,
                vec![Block::Figure {
                    path: None,
                    caption: Some("表格".into()),
                }],
                "{bad}"
            );
        }
        assert!(is_region_path("table/page_1_region_0.jpg"));
    }

    #[test]
    fn tabular_becomes_table() {
        let src = "\\begin{table}[h]\n\\centering\n\\begin{tabular}{cc}\n\\hline\n项目名称 & 技术领域 \\\\\n\\hline\n馈能式智能悬架 & 先进制造 \\\\\n\\hline\n\\end{tabular}\n\\caption{表格标题}\n\\end{table}";
        let blocks = parse_fragment(src);
        assert_eq!(
            blocks,
            vec![Block::Table {
                rows: vec![
                    vec!["项目名称".into(), "技术领域".into()],
                    vec!["馈能式智能悬架".into(), "先进制造".into()],
                ],
                caption: Some("表格标题".into()),
            }]
        );
    }

    #[test]
    fn escaped_ampersand_inside_cell() {
        let rows = parse_rows("A\\&B & C \\\\ D & E");
        assert_eq!(
            rows,
            vec![
                vec!["A&B".to_string(), "C".to_string()],
                vec!["D".to_string(), "E".to_string()],
            ]
        );
    }

    #[test]
    fn mixed_fragment_order_is_preserved() {
        let src = format!(
            "\\section{{概述}}\n正文一\n\n{}\n\n正文二",
            figure_markup("image/page_1_region_0.jpg", "图片")
        );
        let blocks = parse_fragment(&src);
        assert_eq!(blocks.len(), 4);
        assert!(matches!(blocks[0], Block::Heading { level: 1, .. }));
        assert_eq!(blocks[1], para("正文一"));
        assert!(matches!(blocks[2], Block::Figure { .. }));
        assert_eq!(blocks[3], para("正文二"));
    }

    #[test]
    fn escape_then_clean_is_identity() {
        let s = r"a&b%c$d#e_f{g}h\i^j";
        assert_eq!(clean_inline(&escape(s)), s);
    }
}

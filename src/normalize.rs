//! Dialect Normalizer
//!
//! Generators emit the same component in slightly different dialects:
//! ES-module headers, TypeScript annotations, markdown fences pasted from a
//! chat UI. This module strips those constructs line-by-line, but only
//! outside markup-literal spans, so a markup body that happens to contain a
//! word like "import" is left alone.
//!
//! Removal order is fixed: module declarations, then interface/type-alias
//! blocks, then inline annotations, then tool artifacts. Each pass is a pure
//! string transform and must reach a fixpoint: normalizing already-normalized
//! text yields the same text with no diagnostics.
//!
//! A final tag-count comparison between input and output guards the
//! markup-balance invariant. Divergence is reported as a diagnostic, never
//! as a failure; downstream stages surface any real damage.

use lazy_static::lazy_static;
use regex::Regex;
use tracing::warn;

use crate::error::{NormalizationDiagnostic, RemovedConstruct};

lazy_static! {
    static ref IMPORT_RE: Regex = Regex::new(r"^\s*import\b").unwrap();
    static ref IMPORT_TERMINATOR_RE: Regex = Regex::new(r#"(?:from\s*["'][^"']*["']\s*;?|["'][^"']*["']\s*;|;)\s*$"#).unwrap();
    static ref EXPORT_DEFAULT_DECL_RE: Regex =
        Regex::new(r"^(\s*)export\s+default\s+(function|class|async\s+function)\b").unwrap();
    static ref EXPORT_DEFAULT_NAME_RE: Regex =
        Regex::new(r"^\s*export\s+default\s+[A-Za-z_$][\w$]*\s*;?\s*$").unwrap();
    static ref EXPORT_DECL_RE: Regex =
        Regex::new(r"^(\s*)export\s+(const|let|var|function|class|async\s+function)\b").unwrap();
    static ref CJS_EXPORT_RE: Regex =
        Regex::new(r"^\s*(?:module\.exports|exports\.[\w$]+)\s*=").unwrap();

    static ref INTERFACE_HEAD_RE: Regex =
        Regex::new(r"(?m)^\s*(?:declare\s+)?interface\s+[A-Za-z_$][\w$]*(?:\s+extends\s+[^{\n]+)?\s*\{").unwrap();
    static ref TYPE_ALIAS_HEAD_RE: Regex =
        Regex::new(r"(?m)^\s*type\s+[A-Za-z_$][\w$]*(?:<[^>\n]*>)?\s*=").unwrap();

    static ref RETURN_TYPE_RE: Regex =
        Regex::new(r"\)\s*:\s*[A-Za-z_$][\w$.\[\]<>| ]*?\s*(=>|\{)").unwrap();
    static ref FC_TYPE_RE: Regex =
        Regex::new(r":\s*(?:React\.)?(?:FC|FunctionComponent|VFC)(?:<[^=\n]*?>)?\s*=").unwrap();
    static ref DESTRUCTURE_TYPE_RE: Regex =
        Regex::new(r"(\{[^{}:]*\})\s*:\s*[A-Za-z_$][\w$.]*(?:<[^()\n]*?>)?").unwrap();
    static ref PARAM_PRIMITIVE_RE: Regex = Regex::new(
        r"([(,]\s*[A-Za-z_$][\w$]*)\s*:\s*(?:string|number|boolean|any|unknown|object|never|Date)(?:\[\])?\b"
    )
    .unwrap();

    static ref FENCE_RE: Regex = Regex::new(r"^\s*```").unwrap();
    static ref BARE_STYLE_RE: Regex =
        Regex::new(r#"^\s*style\s*=\s*(?:"[^"]*"|'[^']*')\s*;?\s*$"#).unwrap();

    static ref OPEN_TAG_RE: Regex = Regex::new(r"<([A-Za-z][A-Za-z0-9.]*)").unwrap();
    static ref CLOSE_TAG_RE: Regex = Regex::new(r"</([A-Za-z][A-Za-z0-9.]*)").unwrap();
}

/// Tags that never take a closing counterpart in markup.
const VOID_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

/// Result of the normalization pass: the cleaned text plus advisory records
/// of everything that was removed.
#[derive(Debug, Clone)]
pub struct NormalizedText {
    pub text: String,
    pub diagnostics: Vec<NormalizationDiagnostic>,
}

/// Run all four removal passes over `raw` and verify the markup-balance
/// invariant at the end.
pub fn normalize(raw: &str) -> NormalizedText {
    let mut diagnostics = Vec::new();

    let text = strip_module_declarations(raw, &mut diagnostics);
    let text = strip_type_blocks(&text, &mut diagnostics);
    let text = strip_inline_annotations(&text, &mut diagnostics);
    let text = strip_tool_artifacts(&text, &mut diagnostics);

    let before = count_markup_tags(raw);
    let after = count_markup_tags(&text);
    if before != after {
        warn!(
            before_open = before.0,
            before_close = before.1,
            after_open = after.0,
            after_close = after.1,
            "markup tag counts diverged during normalization"
        );
        diagnostics.push(NormalizationDiagnostic {
            construct: RemovedConstruct::MarkupImbalance,
            line: 1,
            detail: format!(
                "tag counts changed from {}/{} to {}/{}",
                before.0, before.1, after.0, after.1
            ),
        });
    }

    NormalizedText { text, diagnostics }
}

// ═══════════════════════════════════════════════════════════════════════════════
// MARKUP SPAN DETECTION
// ═══════════════════════════════════════════════════════════════════════════════

/// Count opening tags on a line that are neither void nor self-closed.
fn open_tag_delta(line: &str) -> i32 {
    let mut opens = 0i32;
    for caps in OPEN_TAG_RE.captures_iter(line) {
        let tag = caps.get(1).unwrap().as_str().to_ascii_lowercase();
        if VOID_TAGS.contains(&tag.as_str()) {
            continue;
        }
        // Self-closing if the tag's own '>' is preceded by '/'.
        let rest = &line[caps.get(0).unwrap().end()..];
        let self_closed = match rest.find('>') {
            Some(pos) => rest[..pos].trim_end().ends_with('/'),
            None => false,
        };
        if !self_closed {
            opens += 1;
        }
    }
    opens
}

/// For each line, whether the line *starts* inside an unclosed markup
/// literal. Lines inside markup are exempt from every removal pass.
fn markup_line_mask(text: &str) -> Vec<bool> {
    let mut mask = Vec::new();
    let mut depth: i32 = 0;
    for line in text.lines() {
        mask.push(depth > 0);
        depth += open_tag_delta(line) - CLOSE_TAG_RE.find_iter(line).count() as i32;
        if depth < 0 {
            depth = 0;
        }
    }
    mask
}

/// Opening/closing tag counts for the balance invariant.
pub(crate) fn count_markup_tags(text: &str) -> (usize, usize) {
    let opens = OPEN_TAG_RE
        .captures_iter(text)
        .filter(|caps| {
            let tag = caps.get(1).unwrap().as_str().to_ascii_lowercase();
            !VOID_TAGS.contains(&tag.as_str())
        })
        .count();
    let closes = CLOSE_TAG_RE.find_iter(text).count();
    (opens, closes)
}

/// Find the index just past the brace that balances the one at
/// `start_index`, skipping strings and template literals. Adapted for the
/// hybrid dialect: markup inside braces still brace-balances.
pub(crate) fn find_balanced_brace_end(text: &str, start_index: usize) -> Option<usize> {
    let chars: Vec<char> = text.chars().collect();
    let mut depth = 0;
    let mut i = start_index;
    let mut in_string: Option<char> = None;
    let mut in_template = false;

    while i < chars.len() {
        let c = chars[i];

        if c == '\\' && i + 1 < chars.len() {
            i += 2;
            continue;
        }

        if let Some(quote) = in_string {
            if c == quote {
                in_string = None;
            }
            i += 1;
            continue;
        }

        if in_template {
            if c == '`' {
                in_template = false;
            }
            i += 1;
            continue;
        }

        match c {
            '"' | '\'' => in_string = Some(c),
            '`' => in_template = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return char_index_to_byte(text, i + 1);
                }
            }
            _ => {}
        }
        i += 1;
    }

    None
}

fn char_index_to_byte(text: &str, char_idx: usize) -> Option<usize> {
    if char_idx == 0 {
        return Some(0);
    }
    text.char_indices()
        .nth(char_idx - 1)
        .map(|(b, c)| b + c.len_utf8())
}

// ═══════════════════════════════════════════════════════════════════════════════
// PASS (a): MODULE DECLARATIONS
// ═══════════════════════════════════════════════════════════════════════════════

fn strip_module_declarations(text: &str, diagnostics: &mut Vec<NormalizationDiagnostic>) -> String {
    let mask = markup_line_mask(text);
    let lines: Vec<&str> = text.lines().collect();
    let mut out: Vec<String> = Vec::with_capacity(lines.len());
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];
        let masked = mask.get(i).copied().unwrap_or(false);

        if !masked {
            if IMPORT_RE.is_match(line) {
                let start = i;
                // Multi-line import lists: consume until the terminator.
                while i < lines.len() && !IMPORT_TERMINATOR_RE.is_match(lines[i]) {
                    i += 1;
                }
                i += 1; // past the terminating line (or EOF)
                diagnostics.push(NormalizationDiagnostic {
                    construct: RemovedConstruct::ModuleDeclaration,
                    line: (start + 1) as u32,
                    detail: first_fragment(line),
                });
                continue;
            }

            if EXPORT_DEFAULT_NAME_RE.is_match(line) || CJS_EXPORT_RE.is_match(line) {
                diagnostics.push(NormalizationDiagnostic {
                    construct: RemovedConstruct::ModuleDeclaration,
                    line: (i + 1) as u32,
                    detail: first_fragment(line),
                });
                i += 1;
                continue;
            }

            if EXPORT_DEFAULT_DECL_RE.is_match(line) {
                // Keep the declaration, drop only the module modifier.
                out.push(EXPORT_DEFAULT_DECL_RE.replace(line, "$1$2").into_owned());
                diagnostics.push(NormalizationDiagnostic {
                    construct: RemovedConstruct::ModuleDeclaration,
                    line: (i + 1) as u32,
                    detail: "export default modifier".to_string(),
                });
                i += 1;
                continue;
            }

            if EXPORT_DECL_RE.is_match(line) {
                out.push(EXPORT_DECL_RE.replace(line, "$1$2").into_owned());
                diagnostics.push(NormalizationDiagnostic {
                    construct: RemovedConstruct::ModuleDeclaration,
                    line: (i + 1) as u32,
                    detail: "export modifier".to_string(),
                });
                i += 1;
                continue;
            }
        }

        out.push(line.to_string());
        i += 1;
    }

    out.join("\n")
}

// ═══════════════════════════════════════════════════════════════════════════════
// PASS (b): INTERFACE / TYPE-ALIAS BLOCKS
// ═══════════════════════════════════════════════════════════════════════════════

fn strip_type_blocks(text: &str, diagnostics: &mut Vec<NormalizationDiagnostic>) -> String {
    let mut result = text.to_string();

    loop {
        let mask = markup_line_mask(&result);
        let next = INTERFACE_HEAD_RE
            .find(&result)
            .map(|m| (m.start(), m.end(), true))
            .into_iter()
            .chain(
                TYPE_ALIAS_HEAD_RE
                    .find(&result)
                    .map(|m| (m.start(), m.end(), false)),
            )
            .filter(|(start, _, _)| !mask.get(line_of(&result, *start)).copied().unwrap_or(false))
            .min_by_key(|(start, _, _)| *start);

        let Some((head_start, head_end, is_interface)) = next else {
            break;
        };

        let line = line_of(&result, head_start);
        let end = if is_interface {
            let brace = result[head_start..].find('{').map(|p| head_start + p);
            brace.and_then(|b| find_balanced_brace_end(&result, char_count_to(&result, b)))
        } else {
            type_alias_end(&result, head_end)
        };

        let Some(end) = end else {
            // Unbalanced block; leave the text alone and let the compiler
            // adapter surface the failure.
            break;
        };

        let end = consume_trailing(&result, end);
        diagnostics.push(NormalizationDiagnostic {
            construct: RemovedConstruct::TypeBlock,
            line: (line + 1) as u32,
            detail: first_fragment(&result[head_start..end.min(head_start + 60)]),
        });
        result.replace_range(head_start..end, "");
    }

    result
}

/// End offset of a `type X = …` alias: brace-matched when the right-hand
/// side opens a brace before any semicolon, otherwise the first semicolon or
/// end of line.
fn type_alias_end(text: &str, after_eq: usize) -> Option<usize> {
    let rest = &text[after_eq..];
    let semi = rest.find(';');
    let brace = rest.find('{');
    match (brace, semi) {
        (Some(b), s) if s.map_or(true, |s| b < s) => {
            let end = find_balanced_brace_end(text, char_count_to(text, after_eq + b))?;
            // Optional trailing semicolon after the closing brace.
            let tail = &text[end..];
            let extra = tail.find(|c: char| !c.is_whitespace() && c != ';').unwrap_or(tail.len());
            let consumed = &tail[..extra];
            Some(end + consumed.find(';').map(|p| p + 1).unwrap_or(0))
        }
        (_, Some(s)) => Some(after_eq + s + 1),
        _ => rest.find('\n').map(|p| after_eq + p),
    }
}

fn consume_trailing(text: &str, end: usize) -> usize {
    let tail = &text[end..];
    match tail.find('\n') {
        Some(p) if tail[..p].trim().is_empty() => end + p + 1,
        _ => end,
    }
}

fn line_of(text: &str, byte: usize) -> usize {
    text[..byte].matches('\n').count()
}

fn char_count_to(text: &str, byte: usize) -> usize {
    text[..byte].chars().count()
}

// ═══════════════════════════════════════════════════════════════════════════════
// PASS (c): INLINE ANNOTATIONS
// ═══════════════════════════════════════════════════════════════════════════════

fn strip_inline_annotations(text: &str, diagnostics: &mut Vec<NormalizationDiagnostic>) -> String {
    let mask = markup_line_mask(text);
    let mut out: Vec<String> = Vec::new();

    for (i, line) in text.lines().enumerate() {
        if mask.get(i).copied().unwrap_or(false) {
            out.push(line.to_string());
            continue;
        }

        let mut stripped = FC_TYPE_RE.replace_all(line, " =").into_owned();
        stripped = RETURN_TYPE_RE.replace_all(&stripped, ") $1").into_owned();
        stripped = DESTRUCTURE_TYPE_RE.replace_all(&stripped, "$1").into_owned();
        stripped = PARAM_PRIMITIVE_RE.replace_all(&stripped, "$1").into_owned();

        if stripped != line {
            diagnostics.push(NormalizationDiagnostic {
                construct: RemovedConstruct::TypeAnnotation,
                line: (i + 1) as u32,
                detail: first_fragment(line),
            });
        }
        out.push(stripped);
    }

    out.join("\n")
}

// ═══════════════════════════════════════════════════════════════════════════════
// PASS (d): TOOL ARTIFACTS
// ═══════════════════════════════════════════════════════════════════════════════

fn strip_tool_artifacts(text: &str, diagnostics: &mut Vec<NormalizationDiagnostic>) -> String {
    let mask = markup_line_mask(text);
    let mut out: Vec<&str> = Vec::new();

    for (i, line) in text.lines().enumerate() {
        let masked = mask.get(i).copied().unwrap_or(false);
        if !masked && (FENCE_RE.is_match(line) || BARE_STYLE_RE.is_match(line)) {
            diagnostics.push(NormalizationDiagnostic {
                construct: RemovedConstruct::ToolArtifact,
                line: (i + 1) as u32,
                detail: first_fragment(line),
            });
            continue;
        }
        out.push(line);
    }

    out.join("\n")
}

fn first_fragment(line: &str) -> String {
    let trimmed = line.trim();
    let mut end = trimmed.len().min(48);
    while end > 0 && !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    trimmed[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_imports_and_preserves_declaration() {
        let src = "import React from 'react';\nexport default function Card() { return <div>hi</div>; }\n";
        let result = normalize(src);
        assert!(!result.text.contains("import"));
        assert!(result.text.contains("function Card()"));
        assert!(result.text.contains("<div>hi</div>"));
    }

    #[test]
    fn strips_multiline_import() {
        let src = "import {\n  useState,\n  useEffect,\n} from 'react';\nfunction A() { return <p>x</p>; }";
        let result = normalize(src);
        assert!(!result.text.contains("useState"));
        assert!(result.text.contains("function A()"));
    }

    #[test]
    fn strips_interface_block() {
        let src = "interface Props {\n  title: string;\n  onClick: () => void;\n}\nfunction B({ title }) { return <h1>{title}</h1>; }";
        let result = normalize(src);
        assert!(!result.text.contains("interface"));
        assert!(!result.text.contains("onClick"));
        assert!(result.text.contains("function B("));
    }

    #[test]
    fn strips_type_alias_with_braces() {
        let src = "type CardProps = {\n  label: string;\n};\nconst C = () => <span>ok</span>;";
        let result = normalize(src);
        assert!(!result.text.contains("CardProps"));
        assert!(result.text.contains("const C"));
    }

    #[test]
    fn strips_inline_annotations() {
        let src = "function D(count: number): JSX.Element {\n  return <b>{count}</b>;\n}";
        let result = normalize(src);
        assert!(result.text.contains("function D(count)"));
        assert!(result.text.contains(") {"));
        assert!(!result.text.contains("JSX.Element"));
    }

    #[test]
    fn strips_fc_annotation() {
        let src = "const E: React.FC<Props> = () => <i>e</i>;";
        let result = normalize(src);
        assert_eq!(result.text, "const E = () => <i>e</i>;");
    }

    #[test]
    fn strips_markdown_fences() {
        let src = "```tsx\nfunction F() { return <u>f</u>; }\n```";
        let result = normalize(src);
        assert!(!result.text.contains("```"));
        assert!(result.text.contains("function F()"));
    }

    #[test]
    fn markup_bodies_are_untouched() {
        let src = "function G() {\n  return (\n    <div>\n      import duties apply\n    </div>\n  );\n}";
        let result = normalize(src);
        assert!(result.text.contains("import duties apply"));
    }

    #[test]
    fn idempotent_on_second_pass() {
        let src = "import x from 'y';\ninterface P { a: string; }\nexport default function H(v: number) {\n  return <div className=\"p-2\">{v}</div>;\n}";
        let first = normalize(src);
        let second = normalize(&first.text);
        assert_eq!(first.text, second.text);
        assert!(second.diagnostics.is_empty(), "{:?}", second.diagnostics);
    }

    #[test]
    fn balance_invariant_holds_for_clean_input() {
        let src = "import a from 'b';\nfunction K() { return <div><span>x</span></div>; }";
        let result = normalize(src);
        assert_eq!(count_markup_tags(src), count_markup_tags(&result.text));
        assert!(!result
            .diagnostics
            .iter()
            .any(|d| d.construct == RemovedConstruct::MarkupImbalance));
    }

    #[test]
    fn bare_style_artifact_removed() {
        let src = "style=\"color: red\"\nfunction L() { return <p style={{color: 'red'}}>l</p>; }";
        let result = normalize(src);
        assert!(!result.text.starts_with("style="));
        assert!(result.text.contains("style={{color: 'red'}}"));
    }
}

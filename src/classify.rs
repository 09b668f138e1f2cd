//! Fragment Classifier & Wrapper
//!
//! Some generators hand back a whole component, others only the markup body.
//! A bare fragment has no declaration keyword anywhere and leads with either
//! a return statement or a markup head; everything else is treated as a
//! complete callable, including structurally broken text, which is passed
//! through for the compiler adapter to reject.

use lazy_static::lazy_static;
use regex::Regex;
use tracing::debug;

lazy_static! {
    static ref FUNCTION_DECL_RE: Regex = Regex::new(r"\bfunction\s+[A-Za-z_$][\w$]*\s*\(").unwrap();
    static ref VAR_ASSIGN_RE: Regex = Regex::new(r"\b(?:const|let|var)\s+[A-Za-z_$][\w$]*\s*=").unwrap();
    static ref CLASS_DECL_RE: Regex = Regex::new(r"\bclass\s+[A-Za-z_$][\w$]*").unwrap();
    static ref CAPITALIZED_ASSIGN_RE: Regex = Regex::new(r"(?m)^\s*[A-Z][\w$]*\s*=").unwrap();
    static ref IDENT_SANITIZE_RE: Regex = Regex::new(r"[^A-Za-z0-9_$]").unwrap();
}

/// Outcome of classification. A `BareFragment` carries the name the wrapper
/// function was synthesized under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassificationDecision {
    CompleteCallable,
    BareFragment { wrapper_name: String },
}

/// Classify normalized text and, for bare fragments, synthesize the wrapper.
/// Returns the (possibly wrapped) code alongside the decision.
pub fn classify_and_wrap(normalized: &str, component_name: &str) -> (String, ClassificationDecision) {
    if !is_bare_fragment(normalized) {
        return (normalized.to_string(), ClassificationDecision::CompleteCallable);
    }

    let wrapper_name = sanitize_identifier(component_name);
    let wrapped = wrap_fragment(normalized, &wrapper_name);
    debug!(wrapper = %wrapper_name, "classified input as bare markup fragment");
    (
        wrapped,
        ClassificationDecision::BareFragment { wrapper_name },
    )
}

fn is_bare_fragment(text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return false;
    }

    let has_declaration = FUNCTION_DECL_RE.is_match(trimmed)
        || VAR_ASSIGN_RE.is_match(trimmed)
        || CLASS_DECL_RE.is_match(trimmed)
        || CAPITALIZED_ASSIGN_RE.is_match(trimmed);
    if has_declaration {
        return false;
    }

    trimmed.starts_with('<') || leads_with_return(trimmed)
}

/// `return` as a statement keyword, not a prefix of an identifier like
/// `returnValue`.
fn leads_with_return(text: &str) -> bool {
    match text.strip_prefix("return") {
        Some(rest) => rest
            .chars()
            .next()
            .map_or(true, |c| c.is_whitespace() || matches!(c, '(' | '<' | ';')),
        None => false,
    }
}

/// Synthesize `function <name>() { return ( <text> ); }`. Text that already
/// leads with a return statement is wrapped without a second return.
pub fn wrap_fragment(text: &str, name: &str) -> String {
    let trimmed = text.trim();
    if leads_with_return(trimmed) {
        format!("function {}() {{\n{}\n}}", name, trimmed)
    } else {
        format!("function {}() {{\n  return (\n{}\n  );\n}}", name, trimmed)
    }
}

/// Coerce a declared component name into a usable identifier. Empty or
/// fully invalid names fall back to a fixed wrapper name.
pub fn sanitize_identifier(name: &str) -> String {
    let cleaned = IDENT_SANITIZE_RE.replace_all(name.trim(), "");
    let cleaned = cleaned.trim_start_matches(|c: char| c.is_ascii_digit());
    if cleaned.is_empty() {
        return "PreviewComponent".to_string();
    }
    let mut chars = cleaned.chars();
    let first = chars.next().unwrap().to_ascii_uppercase();
    format!("{}{}", first, chars.as_str())
}

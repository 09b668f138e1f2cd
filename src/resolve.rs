//! Candidate resolution.
//!
//! Scans the compiled text for plausible component names, orders them by
//! declaration-form priority, and validates each by a guarded zero-argument
//! invocation. A name only wins if its invocation yields a renderable value,
//! so a high-priority declaration that returns a string loses to a
//! lower-priority one that returns an element tree.

use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, trace};

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::EngineError;
use crate::interp::{Interpreter, Value};

lazy_static! {
    static ref FN_DECL_RE: Regex =
        Regex::new(r"\bfunction\s+([A-Z][\w$]*)\s*\(").unwrap();
    static ref ARROW_ASSIGN_RE: Regex =
        Regex::new(r"\b(?:const|let|var)\s+([A-Z][\w$]*)\s*=\s*(?:async\s+)?(?:\([^)]*\)|[\w$]+)\s*=>").unwrap();
    static ref FN_EXPR_ASSIGN_RE: Regex =
        Regex::new(r"\b(?:const|let|var)\s+([A-Z][\w$]*)\s*=\s*function\b").unwrap();
    static ref BARE_ASSIGN_RE: Regex =
        Regex::new(r"(?m)^\s*([A-Z][\w$]*)\s*=").unwrap();
}

/// Which textual shape produced the candidate. Order is the validation
/// priority; the declared request name is consulted last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SourcePattern {
    FunctionDeclaration,
    ArrowAssignment,
    FunctionExpressionAssignment,
    BareAssignment,
    DeclaredName,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateName {
    pub name: String,
    pub pattern: SourcePattern,
    /// Byte offset of the match; later declarations shadow earlier ones
    /// within the same pattern tier.
    pub position: usize,
}

/// Scan compiled text for candidate component names, highest priority
/// first. Duplicate names keep their best tier; within a tier the latest
/// declaration is tried first since it shadows the earlier one at runtime.
pub fn scan_candidates(compiled: &str, declared_name: &str) -> Vec<CandidateName> {
    let mut found: Vec<CandidateName> = Vec::new();

    let mut collect = |re: &Regex, pattern: SourcePattern| {
        for caps in re.captures_iter(compiled) {
            let m = caps.get(1).unwrap();
            found.push(CandidateName {
                name: m.as_str().to_string(),
                pattern,
                position: m.start(),
            });
        }
    };

    collect(&FN_DECL_RE, SourcePattern::FunctionDeclaration);
    collect(&ARROW_ASSIGN_RE, SourcePattern::ArrowAssignment);
    collect(&FN_EXPR_ASSIGN_RE, SourcePattern::FunctionExpressionAssignment);
    collect(&BARE_ASSIGN_RE, SourcePattern::BareAssignment);

    if !declared_name.trim().is_empty() {
        found.push(CandidateName {
            name: declared_name.trim().to_string(),
            pattern: SourcePattern::DeclaredName,
            position: compiled.len(),
        });
    }

    // Keep the best tier per name.
    let mut deduped: Vec<CandidateName> = Vec::new();
    for candidate in found {
        match deduped.iter_mut().find(|c| c.name == candidate.name) {
            Some(existing) => {
                if candidate.pattern < existing.pattern
                    || (candidate.pattern == existing.pattern
                        && candidate.position > existing.position)
                {
                    *existing = candidate;
                }
            }
            None => deduped.push(candidate),
        }
    }

    // Priority tier ascending, then latest declaration first within a tier.
    deduped.sort_by(|a, b| {
        a.pattern
            .cmp(&b.pattern)
            .then(b.position.cmp(&a.position))
    });
    deduped
}

/// A value counts as renderable if it is an element tree node, or an object
/// carrying the structural keys one would have.
pub fn is_renderable(value: &Value) -> bool {
    match value {
        Value::Element(_) => true,
        Value::Object(entries) => entries
            .borrow()
            .iter()
            .any(|(k, _)| k == "type" || k == "tag" || k == "props"),
        _ => false,
    }
}

/// Walk the candidate list and return the first name whose guarded
/// invocation produces a renderable value, together with that value.
/// Candidates are invoked with an empty props object, the same shape a
/// mounting host would hand a propless instantiation.
pub fn resolve_component<'a>(
    interp: &Interpreter<'a>,
    candidates: &[CandidateName],
) -> Result<(String, Value<'a>), EngineError> {
    let mut attempted = Vec::new();

    for candidate in candidates {
        attempted.push(candidate.name.clone());
        let Some(value) = interp.lookup(&candidate.name) else {
            trace!(name = %candidate.name, "candidate has no runtime binding");
            continue;
        };
        if !value.is_callable() {
            trace!(name = %candidate.name, "candidate binding is not callable");
            continue;
        }
        match interp.call_value(&value, vec![empty_props()]) {
            Ok(result) if is_renderable(&result) => {
                debug!(name = %candidate.name, pattern = ?candidate.pattern, "candidate validated");
                return Ok((candidate.name.clone(), result));
            }
            Ok(_) => {
                trace!(name = %candidate.name, "candidate returned non-renderable value");
            }
            Err(err) => {
                trace!(name = %candidate.name, error = %err, "candidate invocation failed");
            }
        }
    }

    Err(EngineError::Resolution { attempted })
}

/// Fresh `{}` for validation invocations.
pub fn empty_props<'a>() -> Value<'a> {
    Value::Object(Rc::new(RefCell::new(Vec::new())))
}

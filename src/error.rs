//! Shared types and error taxonomy for the preview engine.
//!
//! Normalization diagnostics are advisory and never halt the pipeline.
//! Every other error kind halts the current tier and is handed to the
//! fallback controller.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ═══════════════════════════════════════════════════════════════════════════════
// SOURCE UNIT
// ═══════════════════════════════════════════════════════════════════════════════

/// Styling dialect the generator claims to have used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StylingMode {
    UtilityClasses,
    ScopedStylesheet,
    CssInCode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuxiliaryFile {
    pub name: String,
    pub content: String,
}

/// Immutable input to one preview request. Owned by the caller; the engine
/// never mutates it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceUnit {
    pub raw_text: String,
    pub component_name: String,
    pub styling_mode: StylingMode,
    #[serde(default)]
    pub auxiliary_style_text: Option<String>,
    #[serde(default)]
    pub auxiliary_files: Vec<AuxiliaryFile>,
}

impl SourceUnit {
    pub fn new(raw_text: &str, component_name: &str, styling_mode: StylingMode) -> Self {
        Self {
            raw_text: raw_text.to_string(),
            component_name: component_name.to_string(),
            styling_mode,
            auxiliary_style_text: None,
            auxiliary_files: Vec::new(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// NORMALIZATION DIAGNOSTICS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RemovedConstruct {
    ModuleDeclaration,
    TypeBlock,
    TypeAnnotation,
    ToolArtifact,
    /// Not a removal: the post-pass tag-count check diverged. Advisory only.
    MarkupImbalance,
}

/// One advisory record emitted by the normalizer. Never fatal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizationDiagnostic {
    pub construct: RemovedConstruct,
    /// 1-based line in the text the pass ran against.
    pub line: u32,
    pub detail: String,
}

// ═══════════════════════════════════════════════════════════════════════════════
// ENGINE ERRORS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TimeoutKind {
    /// The whole-attempt ceiling fired.
    Global,
    /// The render-specific timer (armed at resolution) fired.
    Render,
}

/// Fatal-for-this-tier failures. The fallback controller guarantees none of
/// these escape a preview request.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum EngineError {
    /// The markup-to-constructor-call transform rejected the text, even
    /// after the single repair pass.
    #[error("compile error: {message}")]
    Compile {
        message: String,
        line: Option<u32>,
    },

    /// No candidate passed invocation validation.
    #[error("no renderable component found among candidates {attempted:?}")]
    Resolution { attempted: Vec<String> },

    /// A host timer fired before a success signal arrived.
    #[error("timed out after {elapsed_ms}ms ({which:?} timer)")]
    Timeout {
        which: TimeoutKind,
        elapsed_ms: u64,
    },

    /// The resolved callable or the mount call failed after resolution
    /// succeeded. Caught by the crash-isolating boundary.
    #[error("render failure: {message}")]
    RuntimeRender { message: String },

    /// The isolated execution surface could not be set up or died without
    /// reporting. Treated like any other host failure.
    #[error("execution surface unavailable: {message}")]
    Surface { message: String },
}

impl EngineError {
    pub fn runtime(message: impl Into<String>) -> Self {
        EngineError::RuntimeRender {
            message: message.into(),
        }
    }

    pub fn surface(message: impl Into<String>) -> Self {
        EngineError::Surface {
            message: message.into(),
        }
    }

    /// Stable label shown in diagnostic panels.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Compile { .. } => "CompileError",
            EngineError::Resolution { .. } => "ResolutionError",
            EngineError::Timeout { .. } => "TimeoutError",
            EngineError::RuntimeRender { .. } => "RuntimeRenderError",
            EngineError::Surface { .. } => "SurfaceError",
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RENDER ATTEMPTS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RenderTier {
    Full,
    Simplified,
    Static,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum AttemptOutcome {
    Success,
    Error { kind: String, message: String },
}

impl AttemptOutcome {
    pub fn from_error(err: &EngineError) -> Self {
        AttemptOutcome::Error {
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, AttemptOutcome::Success)
    }
}

/// One tiered attempt at rendering a SourceUnit. The controller may record
/// up to three of these per request, one per tier it touched.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderAttempt {
    pub tier: RenderTier,
    pub outcome: AttemptOutcome,
    pub elapsed_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn styling_mode_wire_names() {
        let json = serde_json::to_string(&StylingMode::UtilityClasses).unwrap();
        assert_eq!(json, "\"utility-classes\"");
        let back: StylingMode = serde_json::from_str("\"css-in-code\"").unwrap();
        assert_eq!(back, StylingMode::CssInCode);
    }

    #[test]
    fn error_kinds_are_stable() {
        let err = EngineError::Timeout {
            which: TimeoutKind::Global,
            elapsed_ms: 10_000,
        };
        assert_eq!(err.kind(), "TimeoutError");
        assert!(err.to_string().contains("10000ms"));
    }
}

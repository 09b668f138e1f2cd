//! Fallback tier controller.
//!
//! Drives one preview request through up to three tiers: the full pipeline,
//! a heuristic simplified rendition, and a static placeholder that cannot
//! fail. Tier movement is strictly downward within a request; the static
//! tier is the floor that guarantees every request produces a document.

use std::time::Instant;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::classify::{classify_and_wrap, sanitize_identifier};
use crate::error::{
    AttemptOutcome, EngineError, NormalizationDiagnostic, RenderAttempt, RenderTier, SourceUnit,
};
use crate::host::{self, HostConfig};
use crate::lower::compile_markup;
use crate::normalize::normalize;
use crate::render::{build_preview_document, diagnostic_panel, escape_html};

lazy_static! {
    static ref HEADING_RE: Regex =
        Regex::new(r"(?i)<h[1-6]\b|heading|title|welcome|hello").unwrap();
    static ref ACTION_RE: Regex =
        Regex::new(r"(?i)<button\b|submit|sign\s*(?:in|up)|log\s*in|click").unwrap();
    static ref MEDIA_RE: Regex =
        Regex::new(r"(?i)<img\b|image|photo|avatar|thumbnail|video").unwrap();
}

/// How much of a pipeline stage's text survives into the diagnostic panel.
const STAGE_TRACE_LIMIT: usize = 400;

/// How much raw text the static placeholder shows.
const STATIC_EXCERPT_LIMIT: usize = 600;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Raw texts larger than this skip the full tier outright.
    pub size_threshold: usize,
    pub host: HostConfig,
    /// When set, downgraded previews carry a diagnostics panel.
    pub dev_diagnostics: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            size_threshold: 10_000,
            host: HostConfig::default(),
            dev_diagnostics: false,
        }
    }
}

/// Intermediate texts captured for the diagnostics panel, truncated at
/// capture time.
#[derive(Debug, Clone, Default)]
struct StageTrace {
    normalized: Option<String>,
    compiled: Option<String>,
}

impl StageTrace {
    fn capture(slot: &mut Option<String>, text: &str) {
        *slot = Some(truncate_chars(text, STAGE_TRACE_LIMIT));
    }

    fn stages(&self) -> Vec<(&'static str, String)> {
        let mut out = Vec::new();
        if let Some(t) = &self.normalized {
            out.push(("normalized", t.clone()));
        }
        if let Some(t) = &self.compiled {
            out.push(("compiled", t.clone()));
        }
        out
    }
}

/// Outcome of one preview request. `document` is always a complete HTML
/// document, whatever tier produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewResponse {
    pub document: String,
    pub tier: RenderTier,
    pub attempts: Vec<RenderAttempt>,
    pub resolved_name: Option<String>,
    pub diagnostics: Vec<NormalizationDiagnostic>,
}

pub struct PreviewEngine {
    config: EngineConfig,
}

impl Default for PreviewEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl PreviewEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// Render one source unit. Never returns an error: the static floor
    /// absorbs every failure mode above it.
    pub fn render_preview(&self, unit: &SourceUnit) -> PreviewResponse {
        let mut attempts = Vec::new();
        let mut diagnostics = Vec::new();
        let mut last_error: Option<EngineError> = None;
        let mut trace = StageTrace::default();

        let oversized = unit.raw_text.len() > self.config.size_threshold;
        if oversized {
            info!(
                size = unit.raw_text.len(),
                threshold = self.config.size_threshold,
                "raw text oversized, entering at simplified tier"
            );
        }

        if !oversized {
            let started = Instant::now();
            match self.full_tier(unit, &mut diagnostics, &mut trace) {
                Ok((document, name)) => {
                    attempts.push(RenderAttempt {
                        tier: RenderTier::Full,
                        outcome: AttemptOutcome::Success,
                        elapsed_ms: started.elapsed().as_millis() as u64,
                    });
                    return PreviewResponse {
                        document,
                        tier: RenderTier::Full,
                        attempts,
                        resolved_name: Some(name),
                        diagnostics,
                    };
                }
                Err(err) => {
                    warn!(kind = err.kind(), error = %err, "full tier failed, downgrading");
                    attempts.push(RenderAttempt {
                        tier: RenderTier::Full,
                        outcome: AttemptOutcome::from_error(&err),
                        elapsed_ms: started.elapsed().as_millis() as u64,
                    });
                    last_error = Some(err);
                }
            }
        }

        let started = Instant::now();
        match self.simplified_tier(unit, last_error.as_ref(), &trace) {
            Ok(document) => {
                attempts.push(RenderAttempt {
                    tier: RenderTier::Simplified,
                    outcome: AttemptOutcome::Success,
                    elapsed_ms: started.elapsed().as_millis() as u64,
                });
                return PreviewResponse {
                    document,
                    tier: RenderTier::Simplified,
                    attempts,
                    resolved_name: None,
                    diagnostics,
                };
            }
            Err(err) => {
                warn!(error = %err, "simplified tier failed, using static floor");
                attempts.push(RenderAttempt {
                    tier: RenderTier::Simplified,
                    outcome: AttemptOutcome::from_error(&err),
                    elapsed_ms: started.elapsed().as_millis() as u64,
                });
            }
        }

        let started = Instant::now();
        let document = self.static_tier(unit);
        attempts.push(RenderAttempt {
            tier: RenderTier::Static,
            outcome: AttemptOutcome::Success,
            elapsed_ms: started.elapsed().as_millis() as u64,
        });
        PreviewResponse {
            document,
            tier: RenderTier::Static,
            attempts,
            resolved_name: None,
            diagnostics,
        }
    }

    fn full_tier(
        &self,
        unit: &SourceUnit,
        diagnostics: &mut Vec<NormalizationDiagnostic>,
        trace: &mut StageTrace,
    ) -> Result<(String, String), EngineError> {
        let normalized = normalize(&unit.raw_text);
        diagnostics.extend(normalized.diagnostics.clone());
        StageTrace::capture(&mut trace.normalized, &normalized.text);

        let (classified, decision) = classify_and_wrap(&normalized.text, &unit.component_name);
        debug!(?decision, "classification complete");

        let compiled = compile_markup(&classified)?;
        StageTrace::capture(&mut trace.compiled, &compiled.code);
        if compiled.repaired {
            debug!("markup compile succeeded after repair pass");
        }

        let preview = host::execute(&compiled.code, &unit.component_name, &self.config.host)?;
        let document = build_preview_document(
            &preview.body_html,
            unit.styling_mode,
            stylesheet_text(unit),
            None,
        );
        Ok((document, preview.resolved_name))
    }

    /// Heuristic rendition built from textual cues in the raw input. Only
    /// genuinely empty input is beyond it.
    fn simplified_tier(
        &self,
        unit: &SourceUnit,
        prior_error: Option<&EngineError>,
        trace: &StageTrace,
    ) -> Result<String, EngineError> {
        let raw = unit.raw_text.trim();
        if raw.is_empty() {
            return Err(EngineError::runtime(
                "no source text to approximate".to_string(),
            ));
        }

        let title = escape_html(&sanitize_identifier(&unit.component_name));
        let mut body = String::new();
        body.push_str("<div style=\"font-family: system-ui, sans-serif; max-width: 480px; margin: 40px auto; padding: 24px; border: 1px solid #e0e0e0; border-radius: 8px;\">\n");
        body.push_str(&format!("<h2 style=\"margin-top: 0;\">{title}</h2>\n"));

        if HEADING_RE.is_match(raw) {
            body.push_str(
                "<div style=\"height: 20px; width: 60%; background: #e8e8e8; border-radius: 4px; margin-bottom: 12px;\"></div>\n",
            );
        }
        if MEDIA_RE.is_match(raw) {
            body.push_str(
                "<div style=\"height: 120px; background: #f0f0f0; border-radius: 4px; margin-bottom: 12px;\"></div>\n",
            );
        }
        body.push_str(
            "<div style=\"height: 12px; width: 90%; background: #f4f4f4; border-radius: 4px; margin-bottom: 8px;\"></div>\n<div style=\"height: 12px; width: 75%; background: #f4f4f4; border-radius: 4px; margin-bottom: 16px;\"></div>\n",
        );
        if ACTION_RE.is_match(raw) {
            body.push_str(
                "<div style=\"display: inline-block; padding: 8px 20px; background: #d8d8d8; border-radius: 4px;\">&nbsp;</div>\n",
            );
        }
        body.push_str("<p style=\"color: #999; font-size: 12px;\">Simplified preview</p>\n");
        body.push_str("</div>");

        let panel = match (prior_error, self.config.dev_diagnostics) {
            (Some(err), true) => Some(diagnostic_panel(
                err.kind(),
                &err.to_string(),
                &trace.stages(),
            )),
            _ => None,
        };
        Ok(build_preview_document(
            &body,
            unit.styling_mode,
            None,
            panel.as_deref(),
        ))
    }

    /// The floor. Pure string assembly over already-validated pieces, so it
    /// cannot fail.
    fn static_tier(&self, unit: &SourceUnit) -> String {
        let name = escape_html(unit.component_name.trim());
        let shown = if name.is_empty() { "component" } else { name.as_str() };
        let excerpt = escape_html(&truncate_chars(&unit.raw_text, STATIC_EXCERPT_LIMIT));
        let body = format!(
            "<div style=\"font-family: system-ui, sans-serif; max-width: 560px; margin: 40px auto;\">\n<p>Preview unavailable for <strong>{}</strong> ({} characters of source).</p>\n<pre style=\"background: #f6f6f6; padding: 12px; border-radius: 4px; overflow-x: auto; font-size: 12px;\">{}</pre>\n</div>",
            shown,
            unit.raw_text.chars().count(),
            excerpt
        );
        build_preview_document(&body, unit.styling_mode, None, None)
    }
}

/// The dedicated style text wins; otherwise the first stylesheet among the
/// auxiliary files stands in for it.
fn stylesheet_text(unit: &SourceUnit) -> Option<&str> {
    unit.auxiliary_style_text.as_deref().or_else(|| {
        unit.auxiliary_files
            .iter()
            .find(|f| f.name.ends_with(".css"))
            .map(|f| f.content.as_str())
    })
}

fn truncate_chars(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let truncated: String = text.chars().take(limit).collect();
    format!("{truncated}…")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StylingMode;

    fn unit(raw: &str, name: &str) -> SourceUnit {
        SourceUnit::new(raw, name, StylingMode::CssInCode)
    }

    #[test]
    fn oversized_input_skips_full_tier() {
        let big = "<div>x</div>\n".repeat(2_000);
        let engine = PreviewEngine::default();
        let response = engine.render_preview(&unit(&big, "Big"));
        assert_eq!(response.tier, RenderTier::Simplified);
        assert!(response
            .attempts
            .iter()
            .all(|a| a.tier != RenderTier::Full));
    }

    #[test]
    fn compile_failure_downgrades_to_simplified() {
        let engine = PreviewEngine::default();
        let response = engine.render_preview(&unit("function Broken( { return <div>", "Broken"));
        assert_eq!(response.tier, RenderTier::Simplified);
        assert_eq!(response.attempts.len(), 2);
        assert!(!response.attempts[0].outcome.is_success());
        assert!(response.attempts[1].outcome.is_success());
    }

    #[test]
    fn empty_input_falls_through_to_static() {
        let engine = PreviewEngine::default();
        let response = engine.render_preview(&unit("", "Empty"));
        assert_eq!(response.tier, RenderTier::Static);
        let tiers: Vec<_> = response.attempts.iter().map(|a| a.tier).collect();
        assert_eq!(
            tiers,
            vec![RenderTier::Full, RenderTier::Simplified, RenderTier::Static]
        );
        assert!(response.document.contains("Preview unavailable"));
    }

    #[test]
    fn diagnostics_panel_requires_dev_mode() {
        let broken = "function Broken( { return <div>";
        let quiet = PreviewEngine::default().render_preview(&unit(broken, "B"));
        assert!(!quiet.document.contains("<details"));

        let engine = PreviewEngine::new(EngineConfig {
            dev_diagnostics: true,
            ..EngineConfig::default()
        });
        let verbose = engine.render_preview(&unit(broken, "B"));
        assert!(verbose.document.contains("<details"));
        assert!(verbose.document.contains("CompileError"));
    }

    #[test]
    fn action_cue_adds_button_block() {
        let engine = PreviewEngine::default();
        let response =
            engine.render_preview(&unit("totally not compilable <<< Submit button", "Form"));
        assert_eq!(response.tier, RenderTier::Simplified);
        assert!(response.document.contains("display: inline-block"));
    }

    #[test]
    fn truncation_is_char_safe() {
        let text = "é".repeat(700);
        let out = truncate_chars(&text, 600);
        assert!(out.ends_with('…'));
        assert_eq!(out.chars().count(), 601);
    }
}

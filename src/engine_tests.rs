//! End-to-end scenarios: whole requests through normalization, markup
//! compilation, hosted execution, and the fallback controller.

use std::time::Duration;

use crate::error::{RenderTier, SourceUnit, StylingMode};
use crate::fallback::{EngineConfig, PreviewEngine};
use crate::host::HostConfig;

fn init_logs() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn unit(raw: &str, name: &str) -> SourceUnit {
    init_logs();
    SourceUnit::new(raw, name, StylingMode::CssInCode)
}

#[test]
fn typical_generator_output_renders_at_full_tier() {
    let raw = r#"
import React from "react";

interface CardProps {
  title?: string;
}

export default function Card({ title = "Welcome" }: CardProps) {
  return (
    <div className="card">
      <h1>{title}</h1>
      <p>Generated preview</p>
    </div>
  );
}
"#;
    let engine = PreviewEngine::default();
    let response = engine.render_preview(&unit(raw, "Card"));

    assert_eq!(response.tier, RenderTier::Full);
    assert_eq!(response.resolved_name.as_deref(), Some("Card"));
    assert!(response.document.contains("<h1>Welcome</h1>"));
    assert!(response.document.contains("class=\"card\""));
    assert!(response.document.contains("<p>Generated preview</p>"));
    // Stripped constructs leave no residue in the document.
    assert!(!response.document.contains("import React"));
    assert!(!response.document.contains("CardProps"));
}

#[test]
fn bare_markup_fragment_is_wrapped_and_rendered() {
    init_logs();
    let engine = PreviewEngine::default();
    let source = SourceUnit::new(
        "<div className=\"p-4\">Hello there</div>",
        "greeting card",
        StylingMode::UtilityClasses,
    );
    let response = engine.render_preview(&source);

    assert_eq!(response.tier, RenderTier::Full);
    assert_eq!(response.resolved_name.as_deref(), Some("Greetingcard"));
    assert!(response.document.contains("<div class=\"p-4\">Hello there</div>"));
    assert!(response.document.contains("cdn.tailwindcss.com"));
}

#[test]
fn fenced_snippet_survives_normalization() {
    let raw = "```tsx\n<button className=\"btn\">Click me</button>\n```\n";
    let engine = PreviewEngine::default();
    let response = engine.render_preview(&unit(raw, "SubmitButton"));

    assert_eq!(response.tier, RenderTier::Full);
    assert!(response
        .document
        .contains("<button class=\"btn\">Click me</button>"));
}

#[test]
fn validation_beats_declaration_priority() {
    // Foo outranks Bar by declaration form but returns plain text, so the
    // resolver settles on Bar.
    let raw = "function Foo() {\n  return \"not markup\";\n}\nconst Bar = () => <span>bar</span>;\n";
    let engine = PreviewEngine::default();
    let response = engine.render_preview(&unit(raw, "Bar"));

    assert_eq!(response.tier, RenderTier::Full);
    assert_eq!(response.resolved_name.as_deref(), Some("Bar"));
    assert!(response.document.contains("<span>bar</span>"));
}

#[test]
fn priority_decides_when_both_validate() {
    let raw = "const Bar = () => <span>bar</span>;\nfunction Foo() {\n  return <div>foo</div>;\n}\n";
    let engine = PreviewEngine::default();
    let response = engine.render_preview(&unit(raw, "Bar"));

    assert_eq!(response.resolved_name.as_deref(), Some("Foo"));
    assert!(response.document.contains("<div>foo</div>"));
}

#[test]
fn runaway_top_level_code_times_out_and_downgrades() {
    let engine = PreviewEngine::new(EngineConfig {
        host: HostConfig {
            global_timeout: Duration::from_millis(400),
            render_timeout: Duration::from_millis(200),
            bootstrap_timeout: Duration::from_millis(500),
        },
        ..EngineConfig::default()
    });
    let raw = "const Card = () => <div>hi</div>;\nwhile (true) {}\n";
    let response = engine.render_preview(&unit(raw, "Card"));

    assert_eq!(response.tier, RenderTier::Simplified);
    assert_eq!(response.attempts.len(), 2);
    match &response.attempts[0].outcome {
        crate::error::AttemptOutcome::Error { kind, .. } => assert_eq!(kind, "TimeoutError"),
        other => panic!("expected timeout outcome, got {other:?}"),
    }
}

#[test]
fn over_deep_element_tree_downgrades() {
    let raw = "function Card() {\n  let x = h(\"div\", null, null);\n  let i = 0;\n  while (i < 200000) {\n    x = h(\"div\", null, [x]);\n    i = i + 1;\n  }\n  return x;\n}\n";
    let engine = PreviewEngine::default();
    let response = engine.render_preview(&unit(raw, "Card"));

    // The over-deep tree is rejected during validation, so the request
    // settles on a simplified preview instead of taking the process down.
    assert_eq!(response.tier, RenderTier::Simplified);
    match &response.attempts[0].outcome {
        crate::error::AttemptOutcome::Error { kind, .. } => assert_eq!(kind, "ResolutionError"),
        other => panic!("expected resolution outcome, got {other:?}"),
    }
}

#[test]
fn type_alias_only_input_compiles_to_nothing() {
    let raw = "type Greeting = {\n  message: string;\n};\n";
    let engine = PreviewEngine::default();
    let response = engine.render_preview(&unit(raw, "Greeting"));

    assert_eq!(response.tier, RenderTier::Simplified);
    match &response.attempts[0].outcome {
        crate::error::AttemptOutcome::Error { kind, .. } => assert_eq!(kind, "CompileError"),
        other => panic!("expected compile outcome, got {other:?}"),
    }
    assert!(response.attempts[1].outcome.is_success());
}

#[test]
fn scoped_stylesheet_mode_inlines_auxiliary_css() {
    init_logs();
    let mut source = SourceUnit::new(
        "<div className=\"hero\">styled</div>",
        "Hero",
        StylingMode::ScopedStylesheet,
    );
    source.auxiliary_style_text = Some(".hero { color: teal; }".to_string());
    let engine = PreviewEngine::default();
    let response = engine.render_preview(&source);

    assert_eq!(response.tier, RenderTier::Full);
    assert!(response.document.contains(".hero { color: teal; }"));
}

#[test]
fn auxiliary_css_file_backs_scoped_mode() {
    init_logs();
    let mut source = SourceUnit::new(
        "<div className=\"hero\">styled</div>",
        "Hero",
        StylingMode::ScopedStylesheet,
    );
    source.auxiliary_files.push(crate::error::AuxiliaryFile {
        name: "hero.css".to_string(),
        content: ".hero { font-weight: bold; }".to_string(),
    });
    let engine = PreviewEngine::default();
    let response = engine.render_preview(&source);

    assert_eq!(response.tier, RenderTier::Full);
    assert!(response.document.contains(".hero { font-weight: bold; }"));
}

#[test]
fn tiers_only_move_downward() {
    let engine = PreviewEngine::default();
    let response = engine.render_preview(&unit("", "Nothing"));

    let tiers: Vec<RenderTier> = response.attempts.iter().map(|a| a.tier).collect();
    assert_eq!(
        tiers,
        vec![RenderTier::Full, RenderTier::Simplified, RenderTier::Static]
    );
    assert_eq!(response.tier, RenderTier::Static);
    assert!(!response.document.is_empty());
}

#[test]
fn response_serializes_with_wire_field_names() {
    let engine = PreviewEngine::default();
    let response = engine.render_preview(&unit("<p>hi</p>", "Note"));
    let json = serde_json::to_string(&response).unwrap();

    assert!(json.contains("\"resolvedName\""));
    assert!(json.contains("\"elapsedMs\""));
    assert!(json.contains("\"tier\":\"full\""));
}

#[test]
fn nested_components_resolve_through_the_root() {
    let raw = r#"
function Badge({ label = "new" }) {
  return <em>{label}</em>;
}

function Card() {
  return (
    <div>
      <Badge label="hot" />
    </div>
  );
}
"#;
    let engine = PreviewEngine::default();
    let response = engine.render_preview(&unit(raw, "Card"));

    assert_eq!(response.tier, RenderTier::Full);
    // Either declaration validates; the later one is tried first.
    assert!(response.document.contains("<em>hot</em>") || response.document.contains("<em>new</em>"));
}

#[test]
fn list_rendering_via_map() {
    let raw = r#"
const items = ["alpha", "beta", "gamma"];

const List = () => (
  <ul>
    {items.map((item) => <li key={item}>{item}</li>)}
  </ul>
);
"#;
    let engine = PreviewEngine::default();
    let response = engine.render_preview(&unit(raw, "List"));

    assert_eq!(response.tier, RenderTier::Full);
    assert!(response.document.contains("<li>alpha</li>"));
    assert!(response.document.contains("<li>gamma</li>"));
}

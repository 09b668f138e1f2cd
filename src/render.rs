//! HTML serialization of evaluated element trees and preview document
//! assembly.
//!
//! Event handler props are dropped outright: the produced document is a
//! static preview, never an interactive app. Everything user-derived is
//! escaped before it reaches markup.

use crate::error::StylingMode;
use crate::interp::{format_number, ElementValue, Value};

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta",
    "source", "track", "wbr",
];

/// CSS properties whose numeric values take no unit.
const UNITLESS_PROPERTIES: &[&str] = &[
    "opacity", "z-index", "font-weight", "line-height", "flex", "flex-grow",
    "flex-shrink", "order", "zoom",
];

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Serialize an evaluated value into HTML. Arrays flatten in order, nullish
/// and boolean values render as nothing, matching how markup containers
/// treat them.
pub fn render_value(value: &Value) -> String {
    match value {
        Value::Element(el) => render_element(el),
        Value::Str(s) => escape_html(s),
        Value::Number(n) => escape_html(&format_number(*n)),
        Value::Array(items) => items.borrow().iter().map(render_value).collect(),
        Value::Bool(_) | Value::Null | Value::Undefined => String::new(),
        other => escape_html(&other.display()),
    }
}

pub fn render_element(el: &ElementValue) -> String {
    // Fragments carry an empty tag and contribute only their children.
    if el.tag.is_empty() {
        return el.children.iter().map(render_value).collect();
    }

    let tag = el.tag.to_ascii_lowercase();
    let mut out = String::new();
    out.push('<');
    out.push_str(&tag);
    out.push_str(&render_attributes(&el.props));

    if VOID_ELEMENTS.contains(&tag.as_str()) {
        out.push_str(" />");
        return out;
    }

    out.push('>');
    for child in &el.children {
        out.push_str(&render_value(child));
    }
    out.push_str("</");
    out.push_str(&tag);
    out.push('>');
    out
}

fn render_attributes(props: &Value) -> String {
    let Value::Object(entries) = props else {
        return String::new();
    };

    let mut out = String::new();
    for (key, value) in entries.borrow().iter() {
        // Handlers and framework-internal props never reach the document.
        if key == "children" || key == "key" || key == "ref" || is_event_handler(key) {
            continue;
        }
        let attr = match key.as_str() {
            "className" => "class",
            "htmlFor" => "for",
            other => other,
        };

        match value {
            Value::Bool(true) => {
                out.push(' ');
                out.push_str(&escape_html(attr));
            }
            Value::Bool(false) | Value::Null | Value::Undefined => {}
            Value::Object(style) if key == "style" => {
                out.push_str(&format!(
                    " style=\"{}\"",
                    escape_html(&style_entries_to_css(&style.borrow()))
                ));
            }
            other => {
                out.push_str(&format!(
                    " {}=\"{}\"",
                    escape_html(attr),
                    escape_html(&other.display())
                ));
            }
        }
    }
    out
}

fn is_event_handler(key: &str) -> bool {
    key.len() > 2
        && key.starts_with("on")
        && key.as_bytes()[2].is_ascii_uppercase()
}

/// Convert a camelCase style object into inline CSS text. Bare numbers get
/// a `px` unit unless the property is unitless.
fn style_entries_to_css(entries: &[(String, Value)]) -> String {
    let mut rules = Vec::new();
    for (key, value) in entries {
        let property = camel_to_kebab(key);
        let text = match value {
            Value::Number(n) => {
                if UNITLESS_PROPERTIES.contains(&property.as_str()) {
                    format_number(*n)
                } else {
                    format!("{}px", format_number(*n))
                }
            }
            Value::Null | Value::Undefined => continue,
            other => other.display(),
        };
        rules.push(format!("{}: {}", property, text));
    }
    rules.join("; ")
}

fn camel_to_kebab(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for c in name.chars() {
        if c.is_ascii_uppercase() {
            out.push('-');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

// ═══════════════════════════════════════════════════════════════════════════════
// DOCUMENT ASSEMBLY
// ═══════════════════════════════════════════════════════════════════════════════

/// Wrap rendered body markup in a complete standalone HTML document with
/// the styling environment the source unit declared.
pub fn build_preview_document(
    body_html: &str,
    styling_mode: StylingMode,
    auxiliary_style_text: Option<&str>,
    panel_html: Option<&str>,
) -> String {
    let mut head = String::new();
    head.push_str("<meta charset=\"utf-8\" />\n");
    head.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\" />\n");
    match styling_mode {
        StylingMode::UtilityClasses => {
            head.push_str("<script src=\"https://cdn.tailwindcss.com\"></script>\n");
        }
        StylingMode::ScopedStylesheet => {
            if let Some(css) = auxiliary_style_text {
                head.push_str("<style>\n");
                head.push_str(css);
                head.push_str("\n</style>\n");
            }
        }
        // Styles live inline in the markup itself.
        StylingMode::CssInCode => {}
    }

    let panel = panel_html.unwrap_or("");
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n{head}</head>\n<body>\n<div id=\"preview-root\">{body_html}</div>\n{panel}</body>\n</html>\n"
    )
}

/// Collapsible diagnostics block appended to downgraded previews when
/// developer diagnostics are enabled. Stage texts are pre-truncated by the
/// caller; this only escapes and lays them out.
pub fn diagnostic_panel(error_kind: &str, error_message: &str, stages: &[(&str, String)]) -> String {
    let mut out = String::new();
    out.push_str(
        "<details style=\"margin-top: 16px; padding: 8px; border: 1px solid #f0b4b4; border-radius: 4px; font-family: monospace; font-size: 12px; background: #fff7f7;\">\n",
    );
    out.push_str(&format!(
        "<summary>{}: {}</summary>\n",
        escape_html(error_kind),
        escape_html(error_message)
    ));
    for (label, text) in stages {
        out.push_str(&format!(
            "<p><strong>{}</strong></p>\n<pre>{}</pre>\n",
            escape_html(label),
            escape_html(text)
        ));
    }
    out.push_str("</details>\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn object(entries: Vec<(&str, Value<'static>)>) -> Value<'static> {
        Value::Object(Rc::new(RefCell::new(
            entries.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
        )))
    }

    fn element(tag: &str, props: Value<'static>, children: Vec<Value<'static>>) -> Value<'static> {
        Value::Element(Rc::new(ElementValue::new(tag.to_string(), props, children)))
    }

    #[test]
    fn text_children_are_escaped() {
        let el = element("div", Value::Null, vec![Value::string("<b>&\"x\"</b>")]);
        assert_eq!(
            render_value(&el),
            "<div>&lt;b&gt;&amp;&quot;x&quot;&lt;/b&gt;</div>"
        );
    }

    #[test]
    fn class_name_becomes_class() {
        let el = element(
            "div",
            object(vec![("className", Value::string("p-4 rounded"))]),
            vec![],
        );
        assert_eq!(render_value(&el), "<div class=\"p-4 rounded\"></div>");
    }

    #[test]
    fn event_handlers_are_dropped() {
        let el = element(
            "button",
            object(vec![
                ("onClick", Value::string("ignored")),
                ("disabled", Value::Bool(true)),
            ]),
            vec![Value::string("Go")],
        );
        assert_eq!(render_value(&el), "<button disabled>Go</button>");
    }

    #[test]
    fn style_objects_become_inline_css() {
        let el = element(
            "div",
            object(vec![(
                "style",
                object(vec![
                    ("backgroundColor", Value::string("red")),
                    ("marginTop", Value::Number(8.0)),
                    ("opacity", Value::Number(0.5)),
                ]),
            )]),
            vec![],
        );
        assert_eq!(
            render_value(&el),
            "<div style=\"background-color: red; margin-top: 8px; opacity: 0.5\"></div>"
        );
    }

    #[test]
    fn void_elements_self_close() {
        let el = element("img", object(vec![("src", Value::string("x.png"))]), vec![]);
        assert_eq!(render_value(&el), "<img src=\"x.png\" />");
    }

    #[test]
    fn fragments_render_children_only() {
        let el = element(
            "",
            Value::Null,
            vec![
                element("p", Value::Null, vec![Value::string("a")]),
                element("p", Value::Null, vec![Value::string("b")]),
            ],
        );
        assert_eq!(render_value(&el), "<p>a</p><p>b</p>");
    }

    #[test]
    fn nullish_and_boolean_children_render_empty() {
        let el = element(
            "div",
            Value::Null,
            vec![Value::Bool(false), Value::Null, Value::Undefined, Value::Number(0.0)],
        );
        assert_eq!(render_value(&el), "<div>0</div>");
    }

    #[test]
    fn utility_mode_injects_utility_runtime() {
        let doc = build_preview_document("<div></div>", StylingMode::UtilityClasses, None, None);
        assert!(doc.contains("cdn.tailwindcss.com"));
        assert!(doc.contains("<div id=\"preview-root\"><div></div></div>"));
    }

    #[test]
    fn scoped_mode_inlines_stylesheet() {
        let doc = build_preview_document(
            "<div></div>",
            StylingMode::ScopedStylesheet,
            Some(".card { color: red; }"),
            None,
        );
        assert!(doc.contains("<style>"));
        assert!(doc.contains(".card { color: red; }"));
        assert!(!doc.contains("tailwind"));
    }

    #[test]
    fn panel_escapes_stage_text() {
        let panel = diagnostic_panel(
            "CompileError",
            "unexpected token",
            &[("compiled", "<script>alert(1)</script>".to_string())],
        );
        assert!(panel.contains("&lt;script&gt;"));
        assert!(!panel.contains("<script>alert"));
    }
}

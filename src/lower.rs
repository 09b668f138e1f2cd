//! Markup Compiler Adapter
//!
//! Delegates to the oxc parser for the hybrid markup+function dialect and
//! lowers every markup literal into `h(tag, props, children)` /
//! `fragment(children)` constructor calls. The adapter's own job is only to
//! classify transform failures and, on a syntax failure, run one aggressive
//! repair pass before re-invoking the transform exactly once.

use lazy_static::lazy_static;
use oxc_allocator::{Allocator, Box as oxc_box, CloneIn};
use oxc_ast::ast::*;
use oxc_ast::AstBuilder;
use oxc_ast_visit::walk_mut::walk_expression;
use oxc_ast_visit::VisitMut;
use oxc_codegen::Codegen;
use oxc_parser::Parser;
use oxc_span::{SourceType, SPAN};
use regex::Regex;
use tracing::{debug, warn};

use crate::error::EngineError;
use crate::normalize::find_balanced_brace_end;

lazy_static! {
    static ref LINE_HINT_RE: Regex = Regex::new(r"(?i)line[:\s]+(\d+)").unwrap();
    static ref RESIDUAL_TYPE_RE: Regex = Regex::new(
        r":\s*(?:string|number|boolean|any|unknown|void|never|object|JSX\.Element|React\.ReactNode|ReactNode|ReactElement)(?:\[\])?\b"
    )
    .unwrap();
    static ref AS_CAST_RE: Regex = Regex::new(r"\bas\s+[A-Za-z_$][\w$.]*(?:<[^>]*>)?").unwrap();
    static ref FENCE_LINE_RE: Regex = Regex::new(r"(?m)^\s*```.*$").unwrap();
}

/// Executable constructor-call code produced from normalized source.
#[derive(Debug, Clone)]
pub struct CompiledCode {
    pub code: String,
    /// True when the repair pass was needed to get a parse.
    pub repaired: bool,
}

/// Compile markup literals down to constructor calls, with one repair retry.
pub fn compile_markup(source: &str) -> Result<CompiledCode, EngineError> {
    match try_lower(source) {
        Ok(code) => Ok(CompiledCode {
            code,
            repaired: false,
        }),
        Err(first_error) => {
            let repaired_source = aggressive_repair(source);
            if repaired_source == source {
                return Err(first_error);
            }
            warn!("markup transform rejected input, retrying after repair pass");
            match try_lower(&repaired_source) {
                Ok(code) => Ok(CompiledCode {
                    code,
                    repaired: true,
                }),
                // Report the original failure, not the repaired one.
                Err(_) => Err(first_error),
            }
        }
    }
}

fn try_lower(source: &str) -> Result<String, EngineError> {
    let allocator = Allocator::default();
    let source_type = SourceType::default().with_typescript(true).with_jsx(true);

    let ret = Parser::new(&allocator, source, source_type).parse();
    if !ret.errors.is_empty() {
        let message = ret
            .errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        return Err(EngineError::Compile {
            line: LINE_HINT_RE
                .captures(&message)
                .and_then(|c| c.get(1))
                .and_then(|m| m.as_str().parse().ok()),
            message,
        });
    }

    if ret.program.body.is_empty() {
        return Err(EngineError::Compile {
            message: "no executable statements after normalization".to_string(),
            line: None,
        });
    }

    let mut program = ret.program;
    let mut lowerer = MarkupLowerer::new(&allocator);
    lowerer.visit_program(&mut program);

    let code = Codegen::new().build(&program).code;
    debug!(bytes = code.len(), "lowered markup literals to constructor calls");
    Ok(code)
}

/// One-shot repair for near-miss syntax: residual inline style-object
/// literals, leftover type remnants, and fence lines that survived
/// normalization inside odd nesting.
fn aggressive_repair(source: &str) -> String {
    let mut result = strip_style_objects(source);
    result = RESIDUAL_TYPE_RE.replace_all(&result, "").into_owned();
    result = AS_CAST_RE.replace_all(&result, "").into_owned();
    result = FENCE_LINE_RE.replace_all(&result, "").into_owned();
    result
}

/// Remove `style={{…}}` attributes wholesale, brace-matched.
fn strip_style_objects(source: &str) -> String {
    let mut result = String::with_capacity(source.len());
    let mut rest = source;

    while let Some(pos) = rest.find("style={{") {
        result.push_str(&rest[..pos]);
        let brace_start = pos + "style=".len();
        let char_start = rest[..brace_start].chars().count();
        match find_balanced_brace_end(rest, char_start) {
            Some(end) => {
                rest = &rest[end..];
            }
            None => {
                // Unbalanced; give up on this occurrence.
                result.push_str(&rest[pos..pos + "style={{".len()]);
                rest = &rest[pos + "style={{".len()..];
            }
        }
    }
    result.push_str(rest);
    result
}

// ═══════════════════════════════════════════════════════════════════════════════
// MARKUP LOWERER
// Rewrites markup literals into h() / fragment() calls
// ═══════════════════════════════════════════════════════════════════════════════

pub struct MarkupLowerer<'a> {
    ast: AstBuilder<'a>,
}

impl<'a> MarkupLowerer<'a> {
    pub fn new(allocator: &'a Allocator) -> Self {
        Self {
            ast: AstBuilder::new(allocator),
        }
    }

    fn lower_element(&mut self, element: &JSXElement<'a>) -> Expression<'a> {
        let tag_name = self.tag_name(&element.opening_element.name);
        let tag_atom = self.ast.allocator.alloc_str(&tag_name);

        let mut props = self.ast.vec();
        for item in &element.opening_element.attributes {
            match item {
                JSXAttributeItem::Attribute(attr) => {
                    let key = match &attr.name {
                        JSXAttributeName::Identifier(id) => PropertyKey::StaticIdentifier(
                            self.ast
                                .alloc(self.ast.identifier_name(SPAN, id.name.clone())),
                        ),
                        JSXAttributeName::NamespacedName(ns) => {
                            let joined = format!("{}:{}", ns.namespace.name, ns.name.name);
                            let atom = self.ast.allocator.alloc_str(&joined);
                            PropertyKey::StaticIdentifier(
                                self.ast.alloc(self.ast.identifier_name(SPAN, atom)),
                            )
                        }
                    };

                    let value = match &attr.value {
                        Some(JSXAttributeValue::StringLiteral(s)) => {
                            Expression::StringLiteral(self.ast.alloc((**s).clone()))
                        }
                        Some(JSXAttributeValue::Element(el)) => self.lower_element(el),
                        Some(JSXAttributeValue::Fragment(frag)) => self.lower_fragment(frag),
                        Some(JSXAttributeValue::ExpressionContainer(container)) => {
                            self.lower_container_expression(&container.expression)
                        }
                        None => self.ast.expression_boolean_literal(SPAN, true),
                    };

                    props.push(self.ast.object_property_kind_object_property(
                        SPAN,
                        PropertyKind::Init,
                        key,
                        value,
                        false,
                        false,
                        false,
                    ));
                }
                JSXAttributeItem::SpreadAttribute(spread) => {
                    let mut arg = spread.argument.clone_in(self.ast.allocator);
                    self.visit_expression(&mut arg);
                    props.push(self.ast.object_property_kind_spread_property(SPAN, arg));
                }
            }
        }

        let props_expr = if props.is_empty() {
            self.ast.expression_identifier(SPAN, "null")
        } else {
            self.ast.expression_object(SPAN, props)
        };

        let children_expr = self.lower_children(&element.children);

        let mut args = self.ast.vec();
        // Component tags resolve through scope so nested components render;
        // intrinsic tags stay strings.
        if is_component_tag(&tag_name) && !tag_name.contains('.') {
            args.push(Argument::from(self.ast.expression_identifier(SPAN, tag_atom)));
        } else {
            args.push(Argument::from(
                self.ast.expression_string_literal(SPAN, tag_atom, None),
            ));
        }
        args.push(Argument::from(props_expr));
        args.push(Argument::from(children_expr));

        self.ast.expression_call(
            SPAN,
            self.ast.expression_identifier(SPAN, "h"),
            None::<oxc_box<TSTypeParameterInstantiation>>,
            args,
            false,
        )
    }

    fn lower_fragment(&mut self, fragment: &JSXFragment<'a>) -> Expression<'a> {
        let children_expr = self.lower_children(&fragment.children);
        let mut args = self.ast.vec();
        args.push(Argument::from(children_expr));

        self.ast.expression_call(
            SPAN,
            self.ast.expression_identifier(SPAN, "fragment"),
            None::<oxc_box<TSTypeParameterInstantiation>>,
            args,
            false,
        )
    }

    fn lower_children(&mut self, children: &oxc_allocator::Vec<'a, JSXChild<'a>>) -> Expression<'a> {
        let mut out = self.ast.vec();
        for child in children {
            match child {
                JSXChild::Text(t) => {
                    let text = t.value.trim();
                    if !text.is_empty() {
                        let atom = self.ast.allocator.alloc_str(text);
                        out.push(ArrayExpressionElement::from(
                            self.ast.expression_string_literal(SPAN, atom, None),
                        ));
                    }
                }
                JSXChild::Element(el) => {
                    out.push(ArrayExpressionElement::from(self.lower_element(el)));
                }
                JSXChild::Fragment(frag) => {
                    out.push(ArrayExpressionElement::from(self.lower_fragment(frag)));
                }
                JSXChild::ExpressionContainer(container) => {
                    out.push(ArrayExpressionElement::from(
                        self.lower_container_expression(&container.expression),
                    ));
                }
                JSXChild::Spread(spread) => {
                    let mut arg = spread.expression.clone_in(self.ast.allocator);
                    self.visit_expression(&mut arg);
                    out.push(ArrayExpressionElement::from(arg));
                }
            }
        }

        if out.is_empty() {
            self.ast.expression_identifier(SPAN, "null")
        } else {
            self.ast.expression_array(SPAN, out)
        }
    }

    fn lower_container_expression(&mut self, jsx_expr: &JSXExpression<'a>) -> Expression<'a> {
        if let Some(mut e) = jsx_expr
            .as_expression()
            .map(|e| e.clone_in(self.ast.allocator))
        {
            self.visit_expression(&mut e);
            e
        } else {
            self.ast.expression_identifier(SPAN, "undefined")
        }
    }

    fn tag_name(&self, name: &JSXElementName<'a>) -> String {
        match name {
            JSXElementName::Identifier(id) => id.name.to_string(),
            JSXElementName::IdentifierReference(id) => id.name.to_string(),
            JSXElementName::NamespacedName(ns) => format!("{}:{}", ns.namespace.name, ns.name.name),
            JSXElementName::MemberExpression(me) => self.member_name(me),
            JSXElementName::ThisExpression(_) => "this".to_string(),
        }
    }

    fn member_name(&self, me: &JSXMemberExpression<'a>) -> String {
        let object = match &me.object {
            JSXMemberExpressionObject::IdentifierReference(id) => id.name.to_string(),
            JSXMemberExpressionObject::MemberExpression(inner) => self.member_name(inner),
            _ => "unknown".to_string(),
        };
        format!("{}.{}", object, me.property.name)
    }
}

impl<'a> VisitMut<'a> for MarkupLowerer<'a> {
    fn visit_expression(&mut self, expr: &mut Expression<'a>) {
        match expr {
            Expression::JSXElement(element) => {
                let lowered = self.lower_element(element);
                *expr = lowered;
            }
            Expression::JSXFragment(fragment) => {
                let lowered = self.lower_fragment(fragment);
                *expr = lowered;
            }
            _ => walk_expression(self, expr),
        }
    }
}

/// Capitalized tags name components rather than intrinsic elements.
pub fn is_component_tag(tag_name: &str) -> bool {
    tag_name
        .chars()
        .next()
        .map(|c| c.is_uppercase())
        .unwrap_or(false)
}

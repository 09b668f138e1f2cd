//! Constructor-call interpreter.
//!
//! Executes the compiled output of the markup lowerer: plain statements plus
//! `h()` / `fragment()` constructor calls. This is not a general JavaScript
//! engine. It covers the subset generative providers are observed to emit
//! (declarations, closures, literals, the usual operators, `map`/`join`
//! style array helpers). Anything outside that subset fails the evaluation,
//! which in turn fails the candidate under validation; the fallback
//! controller absorbs the damage.
//!
//! Loops execute for real. A runaway `while (true)` is expected to spin
//! until the execution host's timers cut the surface loose, so no fuel
//! counter is kept here. Call depth is bounded to keep recursion from
//! overflowing the host stack, since a stack overflow cannot be caught.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use oxc_ast::ast::*;
use oxc_syntax::operator::{
    AssignmentOperator, BinaryOperator, LogicalOperator, UnaryOperator, UpdateOperator,
};
use thiserror::Error;

const MAX_CALL_DEPTH: usize = 64;

// Element trees deeper than this are rejected at construction; serialization
// and teardown walk the tree once per level on the worker stack.
const MAX_ELEMENT_DEPTH: usize = 256;

// ═══════════════════════════════════════════════════════════════════════════════
// VALUES
// ═══════════════════════════════════════════════════════════════════════════════

/// A rendered element tree node produced by the `h` / `fragment` builtins.
/// Fragments carry an empty tag.
#[derive(Debug)]
pub struct ElementValue<'a> {
    pub tag: String,
    pub props: Value<'a>,
    pub children: Vec<Value<'a>>,
    /// Nesting levels under and including this node.
    pub depth: usize,
}

impl<'a> ElementValue<'a> {
    pub fn new(tag: String, props: Value<'a>, children: Vec<Value<'a>>) -> Self {
        let depth = 1 + children.iter().map(value_depth).max().unwrap_or(0);
        ElementValue {
            tag,
            props,
            children,
            depth,
        }
    }
}

fn value_depth(value: &Value) -> usize {
    match value {
        Value::Element(el) => el.depth,
        Value::Array(items) => items.borrow().iter().map(value_depth).max().unwrap_or(0),
        _ => 0,
    }
}

pub enum Callable<'a> {
    Declared(&'a Function<'a>),
    Arrow(&'a ArrowFunctionExpression<'a>),
}

pub struct FunctionValue<'a> {
    pub name: Option<String>,
    pub callable: Callable<'a>,
    pub env: EnvRef<'a>,
}

// The captured environment holds the function itself, so a derived Debug
// would recurse forever.
impl fmt::Debug for FunctionValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionValue")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    H,
    Fragment,
}

#[derive(Debug, Clone)]
pub enum Value<'a> {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    Str(Rc<String>),
    Array(Rc<RefCell<Vec<Value<'a>>>>),
    Object(Rc<RefCell<Vec<(String, Value<'a>)>>>),
    Element(Rc<ElementValue<'a>>),
    Function(Rc<FunctionValue<'a>>),
    Builtin(Builtin),
}

impl<'a> Value<'a> {
    pub fn string(s: impl Into<String>) -> Self {
        Value::Str(Rc::new(s.into()))
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Value::Function(_) | Value::Builtin(_))
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Str(s) => !s.is_empty(),
            _ => true,
        }
    }

    /// Stringification for text positions and template literals.
    pub fn display(&self) -> String {
        match self {
            Value::Undefined => "undefined".to_string(),
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::Str(s) => s.as_ref().clone(),
            Value::Array(items) => items
                .borrow()
                .iter()
                .map(|v| v.display())
                .collect::<Vec<_>>()
                .join(","),
            Value::Object(_) | Value::Element(_) => "[object Object]".to_string(),
            Value::Function(_) | Value::Builtin(_) => "function".to_string(),
        }
    }

    fn as_number(&self) -> f64 {
        match self {
            Value::Number(n) => *n,
            Value::Bool(true) => 1.0,
            Value::Bool(false) | Value::Null => 0.0,
            Value::Str(s) => s.trim().parse().unwrap_or(f64::NAN),
            _ => f64::NAN,
        }
    }
}

pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

fn loose_equals(l: &Value, r: &Value) -> bool {
    match (l, r) {
        (Value::Undefined | Value::Null, Value::Undefined | Value::Null) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Number(a), Value::Number(b)) => a == b,
        (Value::Str(a), Value::Str(b)) => a == b,
        (Value::Number(_), Value::Str(_)) | (Value::Str(_), Value::Number(_)) => {
            l.as_number() == r.as_number()
        }
        _ => false,
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ENVIRONMENT
// ═══════════════════════════════════════════════════════════════════════════════

pub type EnvRef<'a> = Rc<Env<'a>>;

/// One lexical scope. The root scope doubles as the attempt's private
/// namespace: candidates are written here by execution and read back by the
/// resolver, never shared across attempts.
#[derive(Debug)]
pub struct Env<'a> {
    vars: RefCell<HashMap<String, Value<'a>>>,
    parent: Option<EnvRef<'a>>,
}

impl<'a> Env<'a> {
    fn root() -> EnvRef<'a> {
        let env = Env {
            vars: RefCell::new(HashMap::new()),
            parent: None,
        };
        env.define("h", Value::Builtin(Builtin::H));
        env.define("fragment", Value::Builtin(Builtin::Fragment));
        Rc::new(env)
    }

    fn child(parent: &EnvRef<'a>) -> EnvRef<'a> {
        Rc::new(Env {
            vars: RefCell::new(HashMap::new()),
            parent: Some(Rc::clone(parent)),
        })
    }

    pub fn get(&self, name: &str) -> Option<Value<'a>> {
        if let Some(v) = self.vars.borrow().get(name) {
            return Some(v.clone());
        }
        self.parent.as_ref().and_then(|p| p.get(name))
    }

    fn define(&self, name: &str, value: Value<'a>) {
        self.vars.borrow_mut().insert(name.to_string(), value);
    }

    /// Assign through the scope chain; an unbound name binds in the scope
    /// the assignment executed in.
    fn assign(&self, name: &str, value: Value<'a>) {
        if self.vars.borrow().contains_key(name) {
            self.vars.borrow_mut().insert(name.to_string(), value);
            return;
        }
        match &self.parent {
            Some(p) => p.assign(name, value),
            None => self.define(name, value),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ERRORS AND CONTROL FLOW
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Error)]
pub enum EvalError {
    #[error("unsupported construct: {0}")]
    Unsupported(&'static str),
    #[error("{0} is not defined")]
    UndefinedIdentifier(String),
    #[error("value is not callable")]
    NotCallable,
    #[error("{0}")]
    Thrown(String),
    #[error("call depth exceeded")]
    DepthExceeded,
}

enum Flow<'a> {
    Normal,
    Return(Value<'a>),
    Break,
    Continue,
}

// ═══════════════════════════════════════════════════════════════════════════════
// INTERPRETER
// ═══════════════════════════════════════════════════════════════════════════════

pub struct Interpreter<'a> {
    globals: EnvRef<'a>,
    depth: Cell<usize>,
}

impl<'a> Default for Interpreter<'a> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> Interpreter<'a> {
    pub fn new() -> Self {
        Self {
            globals: Env::root(),
            depth: Cell::new(0),
        }
    }

    /// Execute all top-level statements. Function declarations are hoisted
    /// first so order of definition does not matter.
    pub fn run_program(&self, program: &'a Program<'a>) -> Result<(), EvalError> {
        self.exec_statements(&program.body, &self.globals)
            .map(|_| ())
    }

    /// Look a name up in the attempt's root namespace.
    pub fn lookup(&self, name: &str) -> Option<Value<'a>> {
        self.globals.get(name)
    }

    /// Guarded invocation used by candidate validation and by `h()` for
    /// component tags.
    pub fn call_value(
        &self,
        callee: &Value<'a>,
        args: Vec<Value<'a>>,
    ) -> Result<Value<'a>, EvalError> {
        match callee {
            Value::Builtin(Builtin::H) => self.construct_element(args),
            Value::Builtin(Builtin::Fragment) => {
                let children = match args.into_iter().next() {
                    Some(Value::Array(items)) => items.borrow().clone(),
                    Some(Value::Null) | Some(Value::Undefined) | None => Vec::new(),
                    Some(other) => vec![other],
                };
                let el = ElementValue::new(String::new(), Value::Null, children);
                if el.depth > MAX_ELEMENT_DEPTH {
                    return Err(EvalError::Thrown(format!(
                        "element tree exceeds {MAX_ELEMENT_DEPTH} nesting levels"
                    )));
                }
                Ok(Value::Element(Rc::new(el)))
            }
            Value::Function(func) => {
                if self.depth.get() >= MAX_CALL_DEPTH {
                    return Err(EvalError::DepthExceeded);
                }
                self.depth.set(self.depth.get() + 1);
                let result = self.call_function(func, args);
                self.depth.set(self.depth.get() - 1);
                result
            }
            _ => Err(EvalError::NotCallable),
        }
    }

    fn call_function(
        &self,
        func: &FunctionValue<'a>,
        args: Vec<Value<'a>>,
    ) -> Result<Value<'a>, EvalError> {
        let env = Env::child(&func.env);
        match &func.callable {
            Callable::Declared(f) => {
                self.bind_params(&f.params, args, &env)?;
                let Some(body) = &f.body else {
                    return Ok(Value::Undefined);
                };
                match self.exec_statements(&body.statements, &env)? {
                    Flow::Return(v) => Ok(v),
                    _ => Ok(Value::Undefined),
                }
            }
            Callable::Arrow(arrow) => {
                self.bind_params(&arrow.params, args, &env)?;
                if arrow.expression {
                    // Single-expression body: the sole statement carries the
                    // implicit return value.
                    if let Some(Statement::ExpressionStatement(stmt)) =
                        arrow.body.statements.first()
                    {
                        return self.eval_expression(&stmt.expression, &env);
                    }
                    return Ok(Value::Undefined);
                }
                match self.exec_statements(&arrow.body.statements, &env)? {
                    Flow::Return(v) => Ok(v),
                    _ => Ok(Value::Undefined),
                }
            }
        }
    }

    fn bind_params(
        &self,
        params: &'a FormalParameters<'a>,
        args: Vec<Value<'a>>,
        env: &EnvRef<'a>,
    ) -> Result<(), EvalError> {
        let mut iter = args.into_iter();
        for param in &params.items {
            let value = iter.next().unwrap_or(Value::Undefined);
            self.bind_pattern(&param.pattern, value, env)?;
        }
        if let Some(rest) = &params.rest {
            let remaining: Vec<Value<'a>> = iter.collect();
            self.bind_pattern(
                &rest.rest.argument,
                Value::Array(Rc::new(RefCell::new(remaining))),
                env,
            )?;
        }
        Ok(())
    }

    fn bind_pattern(
        &self,
        pattern: &'a BindingPattern<'a>,
        value: Value<'a>,
        env: &EnvRef<'a>,
    ) -> Result<(), EvalError> {
        match pattern {
            BindingPattern::BindingIdentifier(id) => {
                env.define(id.name.as_str(), value);
                Ok(())
            }
            BindingPattern::ObjectPattern(obj) => {
                if matches!(value, Value::Undefined | Value::Null) {
                    return Err(EvalError::Thrown(
                        "cannot destructure undefined".to_string(),
                    ));
                }
                let mut taken: Vec<String> = Vec::new();
                for prop in &obj.properties {
                    let Some(key) = property_key_name(&prop.key) else {
                        return Err(EvalError::Unsupported("computed destructuring key"));
                    };
                    let member = self.member_value(&value, &key)?;
                    taken.push(key);
                    self.bind_pattern(&prop.value, member, env)?;
                }
                if let Some(rest) = &obj.rest {
                    let remaining = match &value {
                        Value::Object(entries) => entries
                            .borrow()
                            .iter()
                            .filter(|(k, _)| !taken.contains(k))
                            .cloned()
                            .collect(),
                        _ => Vec::new(),
                    };
                    self.bind_pattern(
                        &rest.argument,
                        Value::Object(Rc::new(RefCell::new(remaining))),
                        env,
                    )?;
                }
                Ok(())
            }
            BindingPattern::ArrayPattern(arr) => {
                let items: Vec<Value<'a>> = match &value {
                    Value::Array(items) => items.borrow().clone(),
                    _ => {
                        return Err(EvalError::Thrown(
                            "cannot destructure non-array".to_string(),
                        ))
                    }
                };
                for (i, elem) in arr.elements.iter().enumerate() {
                    if let Some(p) = elem {
                        self.bind_pattern(p, items.get(i).cloned().unwrap_or(Value::Undefined), env)?;
                    }
                }
                if let Some(rest) = &arr.rest {
                    let remaining: Vec<Value<'a>> =
                        items.iter().skip(arr.elements.len()).cloned().collect();
                    self.bind_pattern(
                        &rest.argument,
                        Value::Array(Rc::new(RefCell::new(remaining))),
                        env,
                    )?;
                }
                Ok(())
            }
            BindingPattern::AssignmentPattern(assign) => {
                if matches!(value, Value::Undefined) {
                    let default = self.eval_expression(&assign.right, env)?;
                    self.bind_pattern(&assign.left, default, env)
                } else {
                    self.bind_pattern(&assign.left, value, env)
                }
            }
        }
    }

    // ───────────────────────────────────────────────────────────────────────────
    // STATEMENTS
    // ───────────────────────────────────────────────────────────────────────────

    fn exec_statements(
        &self,
        stmts: &'a [Statement<'a>],
        env: &EnvRef<'a>,
    ) -> Result<Flow<'a>, EvalError> {
        // Hoist function declarations so mutual references resolve.
        for stmt in stmts {
            if let Statement::FunctionDeclaration(func) = stmt {
                self.define_function(func, env);
            }
        }

        for stmt in stmts {
            match self.exec_statement(stmt, env)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn define_function(&self, func: &'a Function<'a>, env: &EnvRef<'a>) {
        if let Some(id) = &func.id {
            env.define(
                id.name.as_str(),
                Value::Function(Rc::new(FunctionValue {
                    name: Some(id.name.to_string()),
                    callable: Callable::Declared(func),
                    env: Rc::clone(env),
                })),
            );
        }
    }

    fn exec_statement(
        &self,
        stmt: &'a Statement<'a>,
        env: &EnvRef<'a>,
    ) -> Result<Flow<'a>, EvalError> {
        match stmt {
            Statement::FunctionDeclaration(_) => Ok(Flow::Normal), // hoisted
            Statement::VariableDeclaration(decl) => {
                for declarator in &decl.declarations {
                    let value = match &declarator.init {
                        Some(init) => self.eval_expression(init, env)?,
                        None => Value::Undefined,
                    };
                    self.bind_pattern(&declarator.id, value, env)?;
                }
                Ok(Flow::Normal)
            }
            Statement::ExpressionStatement(expr_stmt) => {
                self.eval_expression(&expr_stmt.expression, env)?;
                Ok(Flow::Normal)
            }
            Statement::ReturnStatement(ret) => {
                let value = match &ret.argument {
                    Some(arg) => self.eval_expression(arg, env)?,
                    None => Value::Undefined,
                };
                Ok(Flow::Return(value))
            }
            Statement::BlockStatement(block) => {
                let scope = Env::child(env);
                self.exec_statements(&block.body, &scope)
            }
            Statement::IfStatement(if_stmt) => {
                if self.eval_expression(&if_stmt.test, env)?.truthy() {
                    self.exec_statement(&if_stmt.consequent, env)
                } else if let Some(alt) = &if_stmt.alternate {
                    self.exec_statement(alt, env)
                } else {
                    Ok(Flow::Normal)
                }
            }
            Statement::WhileStatement(while_stmt) => {
                while self.eval_expression(&while_stmt.test, env)?.truthy() {
                    match self.exec_statement(&while_stmt.body, env)? {
                        Flow::Break => break,
                        Flow::Continue | Flow::Normal => {}
                        flow @ Flow::Return(_) => return Ok(flow),
                    }
                }
                Ok(Flow::Normal)
            }
            Statement::ForStatement(for_stmt) => {
                let scope = Env::child(env);
                if let Some(init) = &for_stmt.init {
                    match init {
                        ForStatementInit::VariableDeclaration(decl) => {
                            for declarator in &decl.declarations {
                                let value = match &declarator.init {
                                    Some(e) => self.eval_expression(e, &scope)?,
                                    None => Value::Undefined,
                                };
                                self.bind_pattern(&declarator.id, value, &scope)?;
                            }
                        }
                        other => {
                            if let Some(e) = other.as_expression() {
                                self.eval_expression(e, &scope)?;
                            }
                        }
                    }
                }
                loop {
                    if let Some(test) = &for_stmt.test {
                        if !self.eval_expression(test, &scope)?.truthy() {
                            break;
                        }
                    }
                    match self.exec_statement(&for_stmt.body, &scope)? {
                        Flow::Break => break,
                        Flow::Continue | Flow::Normal => {}
                        flow @ Flow::Return(_) => return Ok(flow),
                    }
                    if let Some(update) = &for_stmt.update {
                        self.eval_expression(update, &scope)?;
                    }
                }
                Ok(Flow::Normal)
            }
            Statement::BreakStatement(_) => Ok(Flow::Break),
            Statement::ContinueStatement(_) => Ok(Flow::Continue),
            Statement::ThrowStatement(throw) => {
                let value = self.eval_expression(&throw.argument, env)?;
                Err(EvalError::Thrown(value.display()))
            }
            Statement::EmptyStatement(_) => Ok(Flow::Normal),
            _ => Err(EvalError::Unsupported("statement")),
        }
    }

    // ───────────────────────────────────────────────────────────────────────────
    // EXPRESSIONS
    // ───────────────────────────────────────────────────────────────────────────

    fn eval_expression(
        &self,
        expr: &'a Expression<'a>,
        env: &EnvRef<'a>,
    ) -> Result<Value<'a>, EvalError> {
        match expr {
            Expression::NumericLiteral(n) => Ok(Value::Number(n.value)),
            Expression::StringLiteral(s) => Ok(Value::string(s.value.as_str())),
            Expression::BooleanLiteral(b) => Ok(Value::Bool(b.value)),
            Expression::NullLiteral(_) => Ok(Value::Null),
            Expression::Identifier(id) => self.resolve_identifier(id.name.as_str(), env),
            Expression::TemplateLiteral(tpl) => self.eval_template(tpl, env),
            Expression::ParenthesizedExpression(paren) => {
                self.eval_expression(&paren.expression, env)
            }
            Expression::ArrayExpression(arr) => {
                let mut items = Vec::new();
                for elem in &arr.elements {
                    match elem {
                        ArrayExpressionElement::SpreadElement(spread) => {
                            match self.eval_expression(&spread.argument, env)? {
                                Value::Array(inner) => items.extend(inner.borrow().iter().cloned()),
                                other => items.push(other),
                            }
                        }
                        ArrayExpressionElement::Elision(_) => items.push(Value::Undefined),
                        other => {
                            if let Some(e) = other.as_expression() {
                                items.push(self.eval_expression(e, env)?);
                            }
                        }
                    }
                }
                Ok(Value::Array(Rc::new(RefCell::new(items))))
            }
            Expression::ObjectExpression(obj) => {
                let mut entries: Vec<(String, Value<'a>)> = Vec::new();
                for prop in &obj.properties {
                    match prop {
                        ObjectPropertyKind::ObjectProperty(p) => {
                            let key = match property_key_name(&p.key) {
                                Some(k) => k,
                                None => match p.key.as_expression() {
                                    Some(e) => self.eval_expression(e, env)?.display(),
                                    None => {
                                        return Err(EvalError::Unsupported("object key"));
                                    }
                                },
                            };
                            let value = self.eval_expression(&p.value, env)?;
                            entries.retain(|(k, _)| k != &key);
                            entries.push((key, value));
                        }
                        ObjectPropertyKind::SpreadProperty(spread) => {
                            if let Value::Object(inner) =
                                self.eval_expression(&spread.argument, env)?
                            {
                                for (k, v) in inner.borrow().iter() {
                                    entries.retain(|(key, _)| key != k);
                                    entries.push((k.clone(), v.clone()));
                                }
                            }
                        }
                    }
                }
                Ok(Value::Object(Rc::new(RefCell::new(entries))))
            }
            Expression::FunctionExpression(func) => Ok(Value::Function(Rc::new(FunctionValue {
                name: func.id.as_ref().map(|id| id.name.to_string()),
                callable: Callable::Declared(func),
                env: Rc::clone(env),
            }))),
            Expression::ArrowFunctionExpression(arrow) => {
                Ok(Value::Function(Rc::new(FunctionValue {
                    name: None,
                    callable: Callable::Arrow(arrow),
                    env: Rc::clone(env),
                })))
            }
            Expression::CallExpression(call) => self.eval_call(call, env),
            Expression::StaticMemberExpression(member) => {
                let object = self.eval_expression(&member.object, env)?;
                self.member_value(&object, member.property.name.as_str())
            }
            Expression::ComputedMemberExpression(member) => {
                let object = self.eval_expression(&member.object, env)?;
                let key = self.eval_expression(&member.expression, env)?;
                match (&object, &key) {
                    (Value::Array(items), Value::Number(n)) => {
                        let idx = *n as usize;
                        Ok(items.borrow().get(idx).cloned().unwrap_or(Value::Undefined))
                    }
                    _ => self.member_value(&object, &key.display()),
                }
            }
            Expression::ConditionalExpression(cond) => {
                if self.eval_expression(&cond.test, env)?.truthy() {
                    self.eval_expression(&cond.consequent, env)
                } else {
                    self.eval_expression(&cond.alternate, env)
                }
            }
            Expression::LogicalExpression(logical) => {
                let left = self.eval_expression(&logical.left, env)?;
                match logical.operator {
                    LogicalOperator::And => {
                        if left.truthy() {
                            self.eval_expression(&logical.right, env)
                        } else {
                            Ok(left)
                        }
                    }
                    LogicalOperator::Or => {
                        if left.truthy() {
                            Ok(left)
                        } else {
                            self.eval_expression(&logical.right, env)
                        }
                    }
                    LogicalOperator::Coalesce => {
                        if matches!(left, Value::Undefined | Value::Null) {
                            self.eval_expression(&logical.right, env)
                        } else {
                            Ok(left)
                        }
                    }
                }
            }
            Expression::BinaryExpression(bin) => {
                let left = self.eval_expression(&bin.left, env)?;
                let right = self.eval_expression(&bin.right, env)?;
                eval_binary(bin.operator, &left, &right)
            }
            Expression::UnaryExpression(unary) => {
                let value = self.eval_expression(&unary.argument, env)?;
                match unary.operator {
                    UnaryOperator::LogicalNot => Ok(Value::Bool(!value.truthy())),
                    UnaryOperator::UnaryNegation => Ok(Value::Number(-value.as_number())),
                    UnaryOperator::UnaryPlus => Ok(Value::Number(value.as_number())),
                    UnaryOperator::Typeof => Ok(Value::string(type_of(&value))),
                    UnaryOperator::Void => Ok(Value::Undefined),
                    _ => Err(EvalError::Unsupported("unary operator")),
                }
            }
            Expression::AssignmentExpression(assign) => {
                let value = self.eval_expression(&assign.right, env)?;
                match &assign.left {
                    AssignmentTarget::AssignmentTargetIdentifier(id) => {
                        let name = id.name.as_str();
                        let next = match assign.operator {
                            AssignmentOperator::Assign => value,
                            AssignmentOperator::Addition => {
                                let current =
                                    env.get(name).unwrap_or(Value::Undefined);
                                eval_binary(BinaryOperator::Addition, &current, &value)?
                            }
                            AssignmentOperator::Subtraction => {
                                let current =
                                    env.get(name).unwrap_or(Value::Undefined);
                                eval_binary(BinaryOperator::Subtraction, &current, &value)?
                            }
                            _ => return Err(EvalError::Unsupported("assignment operator")),
                        };
                        env.assign(name, next.clone());
                        Ok(next)
                    }
                    _ => Err(EvalError::Unsupported("assignment target")),
                }
            }
            Expression::UpdateExpression(update) => match &update.argument {
                SimpleAssignmentTarget::AssignmentTargetIdentifier(id) => {
                    let name = id.name.as_str();
                    let current = env
                        .get(name)
                        .ok_or_else(|| EvalError::UndefinedIdentifier(name.to_string()))?
                        .as_number();
                    let next = match update.operator {
                        UpdateOperator::Increment => current + 1.0,
                        UpdateOperator::Decrement => current - 1.0,
                    };
                    env.assign(name, Value::Number(next));
                    Ok(Value::Number(if update.prefix { next } else { current }))
                }
                _ => Err(EvalError::Unsupported("update target")),
            },
            Expression::SequenceExpression(seq) => {
                let mut last = Value::Undefined;
                for e in &seq.expressions {
                    last = self.eval_expression(e, env)?;
                }
                Ok(last)
            }
            Expression::ChainExpression(chain) => match &chain.expression {
                ChainElement::StaticMemberExpression(member) => {
                    let object = self.eval_expression(&member.object, env)?;
                    if matches!(object, Value::Undefined | Value::Null) {
                        return Ok(Value::Undefined);
                    }
                    self.member_value(&object, member.property.name.as_str())
                }
                _ => Err(EvalError::Unsupported("optional chain")),
            },
            Expression::TSAsExpression(cast) => self.eval_expression(&cast.expression, env),
            Expression::TSNonNullExpression(nn) => self.eval_expression(&nn.expression, env),
            _ => Err(EvalError::Unsupported("expression")),
        }
    }

    fn resolve_identifier(&self, name: &str, env: &EnvRef<'a>) -> Result<Value<'a>, EvalError> {
        if let Some(v) = env.get(name) {
            return Ok(v);
        }
        match name {
            "undefined" => Ok(Value::Undefined),
            "NaN" => Ok(Value::Number(f64::NAN)),
            "Infinity" => Ok(Value::Number(f64::INFINITY)),
            _ => Err(EvalError::UndefinedIdentifier(name.to_string())),
        }
    }

    fn eval_template(
        &self,
        tpl: &'a TemplateLiteral<'a>,
        env: &EnvRef<'a>,
    ) -> Result<Value<'a>, EvalError> {
        let mut out = String::new();
        for (i, quasi) in tpl.quasis.iter().enumerate() {
            match &quasi.value.cooked {
                Some(cooked) => out.push_str(cooked.as_str()),
                None => out.push_str(quasi.value.raw.as_str()),
            }
            if let Some(expr) = tpl.expressions.get(i) {
                out.push_str(&self.eval_expression(expr, env)?.display());
            }
        }
        Ok(Value::string(out))
    }

    fn eval_call(
        &self,
        call: &'a CallExpression<'a>,
        env: &EnvRef<'a>,
    ) -> Result<Value<'a>, EvalError> {
        let mut args = Vec::new();
        for arg in &call.arguments {
            match arg.as_expression() {
                Some(e) => args.push(self.eval_expression(e, env)?),
                None => return Err(EvalError::Unsupported("spread argument")),
            }
        }

        if let Expression::StaticMemberExpression(member) = &call.callee {
            let object = self.eval_expression(&member.object, env)?;
            return self.method_call(&object, member.property.name.as_str(), args);
        }

        let callee = self.eval_expression(&call.callee, env)?;
        self.call_value(&callee, args)
    }

    /// Dispatch the handful of prototype methods generated components rely
    /// on; anything else falls back to a callable property lookup.
    fn method_call(
        &self,
        object: &Value<'a>,
        method: &str,
        args: Vec<Value<'a>>,
    ) -> Result<Value<'a>, EvalError> {
        match (object, method) {
            (Value::Array(items), "map") => {
                let f = args.first().ok_or(EvalError::NotCallable)?;
                let mut out = Vec::new();
                for (i, item) in items.borrow().iter().enumerate() {
                    out.push(self.call_value(f, vec![item.clone(), Value::Number(i as f64)])?);
                }
                Ok(Value::Array(Rc::new(RefCell::new(out))))
            }
            (Value::Array(items), "filter") => {
                let f = args.first().ok_or(EvalError::NotCallable)?;
                let mut out = Vec::new();
                for (i, item) in items.borrow().iter().enumerate() {
                    if self
                        .call_value(f, vec![item.clone(), Value::Number(i as f64)])?
                        .truthy()
                    {
                        out.push(item.clone());
                    }
                }
                Ok(Value::Array(Rc::new(RefCell::new(out))))
            }
            (Value::Array(items), "join") => {
                let sep = args.first().map(|v| v.display()).unwrap_or(",".to_string());
                Ok(Value::string(
                    items
                        .borrow()
                        .iter()
                        .map(|v| v.display())
                        .collect::<Vec<_>>()
                        .join(&sep),
                ))
            }
            (Value::Str(s), "toUpperCase") => Ok(Value::string(s.to_uppercase())),
            (Value::Str(s), "toLowerCase") => Ok(Value::string(s.to_lowercase())),
            (Value::Str(s), "trim") => Ok(Value::string(s.trim())),
            (Value::Str(s), "split") => {
                let sep = args.first().map(|v| v.display()).unwrap_or_default();
                let parts: Vec<Value<'a>> = if sep.is_empty() {
                    s.chars().map(|c| Value::string(c.to_string())).collect()
                } else {
                    s.split(&sep).map(Value::string).collect()
                };
                Ok(Value::Array(Rc::new(RefCell::new(parts))))
            }
            (Value::Number(n), "toFixed") => {
                let digits = args.first().map(|v| v.as_number() as usize).unwrap_or(0);
                Ok(Value::string(format!("{:.*}", digits, n)))
            }
            _ => {
                let prop = self.member_value(object, method)?;
                if prop.is_callable() {
                    self.call_value(&prop, args)
                } else {
                    Err(EvalError::Unsupported("method"))
                }
            }
        }
    }

    fn member_value(&self, object: &Value<'a>, key: &str) -> Result<Value<'a>, EvalError> {
        match object {
            Value::Object(entries) => Ok(entries
                .borrow()
                .iter()
                .rev()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
                .unwrap_or(Value::Undefined)),
            Value::Array(items) => match key {
                "length" => Ok(Value::Number(items.borrow().len() as f64)),
                _ => Ok(Value::Undefined),
            },
            Value::Str(s) => match key {
                "length" => Ok(Value::Number(s.chars().count() as f64)),
                _ => Ok(Value::Undefined),
            },
            Value::Element(el) => match key {
                "tag" | "type" => Ok(Value::string(el.tag.clone())),
                "props" => Ok(el.props.clone()),
                _ => Ok(Value::Undefined),
            },
            Value::Undefined | Value::Null => Err(EvalError::Thrown(format!(
                "cannot read properties of {} (reading '{}')",
                object.display(),
                key
            ))),
            _ => Ok(Value::Undefined),
        }
    }

    /// The `h()` builtin: string tags build element nodes directly,
    /// callable tags are nested components invoked with their props.
    fn construct_element(&self, args: Vec<Value<'a>>) -> Result<Value<'a>, EvalError> {
        let mut iter = args.into_iter();
        let tag = iter.next().unwrap_or(Value::Undefined);
        let props = iter.next().unwrap_or(Value::Null);
        let children = match iter.next() {
            Some(Value::Array(items)) => items.borrow().clone(),
            Some(Value::Null) | Some(Value::Undefined) | None => Vec::new(),
            Some(other) => vec![other],
        };

        match tag {
            Value::Str(name) => {
                let el = ElementValue::new(name.as_ref().clone(), props, children);
                if el.depth > MAX_ELEMENT_DEPTH {
                    return Err(EvalError::Thrown(format!(
                        "element tree exceeds {MAX_ELEMENT_DEPTH} nesting levels"
                    )));
                }
                Ok(Value::Element(Rc::new(el)))
            }
            callable @ (Value::Function(_) | Value::Builtin(_)) => {
                let entries: Vec<(String, Value<'a>)> = match &props {
                    Value::Object(entries) => entries.borrow().clone(),
                    _ => Vec::new(),
                };
                let mut merged = entries;
                merged.push((
                    "children".to_string(),
                    Value::Array(Rc::new(RefCell::new(children))),
                ));
                self.call_value(
                    &callable,
                    vec![Value::Object(Rc::new(RefCell::new(merged)))],
                )
            }
            other => Err(EvalError::Thrown(format!(
                "invalid element tag: {}",
                other.display()
            ))),
        }
    }
}

fn property_key_name(key: &PropertyKey) -> Option<String> {
    match key {
        PropertyKey::StaticIdentifier(id) => Some(id.name.to_string()),
        PropertyKey::StringLiteral(s) => Some(s.value.to_string()),
        _ => None,
    }
}

fn type_of(value: &Value) -> &'static str {
    match value {
        Value::Undefined => "undefined",
        Value::Null => "object",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::Str(_) => "string",
        Value::Function(_) | Value::Builtin(_) => "function",
        _ => "object",
    }
}

fn eval_binary<'a>(
    op: BinaryOperator,
    left: &Value<'a>,
    right: &Value<'a>,
) -> Result<Value<'a>, EvalError> {
    match op {
        BinaryOperator::Addition => {
            if matches!(left, Value::Str(_)) || matches!(right, Value::Str(_)) {
                Ok(Value::string(format!("{}{}", left.display(), right.display())))
            } else {
                Ok(Value::Number(left.as_number() + right.as_number()))
            }
        }
        BinaryOperator::Subtraction => Ok(Value::Number(left.as_number() - right.as_number())),
        BinaryOperator::Multiplication => Ok(Value::Number(left.as_number() * right.as_number())),
        BinaryOperator::Division => Ok(Value::Number(left.as_number() / right.as_number())),
        BinaryOperator::Remainder => Ok(Value::Number(left.as_number() % right.as_number())),
        BinaryOperator::Exponential => {
            Ok(Value::Number(left.as_number().powf(right.as_number())))
        }
        BinaryOperator::Equality | BinaryOperator::StrictEquality => {
            Ok(Value::Bool(loose_equals(left, right)))
        }
        BinaryOperator::Inequality | BinaryOperator::StrictInequality => {
            Ok(Value::Bool(!loose_equals(left, right)))
        }
        BinaryOperator::LessThan => compare(left, right, |o| o == std::cmp::Ordering::Less),
        BinaryOperator::GreaterThan => compare(left, right, |o| o == std::cmp::Ordering::Greater),
        BinaryOperator::LessEqualThan => compare(left, right, |o| o != std::cmp::Ordering::Greater),
        BinaryOperator::GreaterEqualThan => compare(left, right, |o| o != std::cmp::Ordering::Less),
        _ => Err(EvalError::Unsupported("binary operator")),
    }
}

fn compare<'a>(
    left: &Value<'a>,
    right: &Value<'a>,
    check: impl Fn(std::cmp::Ordering) -> bool,
) -> Result<Value<'a>, EvalError> {
    if let (Value::Str(a), Value::Str(b)) = (left, right) {
        return Ok(Value::Bool(check(a.cmp(b))));
    }
    let (a, b) = (left.as_number(), right.as_number());
    match a.partial_cmp(&b) {
        Some(ordering) => Ok(Value::Bool(check(ordering))),
        None => Ok(Value::Bool(false)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxc_allocator::Allocator;
    use oxc_parser::Parser;
    use oxc_span::SourceType;

    fn run<'a>(allocator: &'a Allocator, source: &'a str) -> Interpreter<'a> {
        let source_type = SourceType::default().with_jsx(true);
        let ret = Parser::new(allocator, source, source_type).parse();
        assert!(ret.errors.is_empty(), "parse failed: {:?}", ret.errors);
        let program = allocator.alloc(ret.program);
        let interp = Interpreter::new();
        interp.run_program(program).unwrap();
        interp
    }

    #[test]
    fn binds_and_calls_function_declaration() {
        let allocator = Allocator::default();
        let interp = run(&allocator, "function Card() { return h(\"div\", null, [\"hi\"]); }");
        let card = interp.lookup("Card").unwrap();
        let result = interp.call_value(&card, vec![]).unwrap();
        match result {
            Value::Element(el) => {
                assert_eq!(el.tag, "div");
                assert_eq!(el.children.len(), 1);
            }
            other => panic!("expected element, got {}", other.display()),
        }
    }

    #[test]
    fn arrow_expression_body_returns_value() {
        let allocator = Allocator::default();
        let interp = run(&allocator, "const Add = (a, b) => a + b;");
        let add = interp.lookup("Add").unwrap();
        let result = interp
            .call_value(&add, vec![Value::Number(2.0), Value::Number(3.0)])
            .unwrap();
        assert!(matches!(result, Value::Number(n) if n == 5.0));
    }

    #[test]
    fn template_literals_interpolate() {
        let allocator = Allocator::default();
        let interp = run(&allocator, "const greet = (name) => `Hello, ${name}!`;");
        let greet = interp.lookup("greet").unwrap();
        let result = interp
            .call_value(&greet, vec![Value::string("World")])
            .unwrap();
        assert_eq!(result.display(), "Hello, World!");
    }

    #[test]
    fn rest_params_collect_into_array() {
        let allocator = Allocator::default();
        let interp = run(
            &allocator,
            "function J(first, ...rest) { return rest.join(\"-\"); }",
        );
        let j = interp.lookup("J").unwrap();
        let result = interp
            .call_value(
                &j,
                vec![Value::string("a"), Value::string("b"), Value::string("c")],
            )
            .unwrap();
        assert_eq!(result.display(), "b-c");
    }

    #[test]
    fn element_nesting_is_bounded() {
        let allocator = Allocator::default();
        let interp = run(
            &allocator,
            "function Deep() { let x = h(\"div\", null, null); let i = 0; while (i < 100000) { x = h(\"div\", null, [x]); i = i + 1; } return x; }",
        );
        let deep = interp.lookup("Deep").unwrap();
        let err = interp.call_value(&deep, vec![]).unwrap_err();
        assert!(matches!(err, EvalError::Thrown(m) if m.contains("nesting")));
    }

    #[test]
    fn destructured_params_with_defaults() {
        let allocator = Allocator::default();
        let interp = run(
            &allocator,
            "function T({ label = \"none\" }) { return label; }",
        );
        let t = interp.lookup("T").unwrap();
        // Zero-arg invocation destructures undefined and must fail.
        assert!(interp.call_value(&t, vec![]).is_err());
        // With an empty props object the default applies.
        let props = Value::Object(Rc::new(RefCell::new(vec![])));
        let result = interp.call_value(&t, vec![props]).unwrap();
        assert_eq!(result.display(), "none");
    }

    #[test]
    fn array_map_builds_children() {
        let allocator = Allocator::default();
        let interp = run(
            &allocator,
            "const items = [1, 2, 3];\nconst L = () => h(\"ul\", null, items.map((i) => h(\"li\", null, [i])));",
        );
        let l = interp.lookup("L").unwrap();
        let result = interp.call_value(&l, vec![]).unwrap();
        match result {
            Value::Element(el) => assert_eq!(el.children.len(), 3),
            other => panic!("expected element, got {}", other.display()),
        }
    }

    #[test]
    fn nested_component_tags_invoke() {
        let allocator = Allocator::default();
        let interp = run(
            &allocator,
            "function Badge(props) { return h(\"b\", null, [\"new\"]); }\nfunction Card() { return h(\"div\", null, [h(Badge, null, null)]); }",
        );
        let card = interp.lookup("Card").unwrap();
        let result = interp.call_value(&card, vec![]).unwrap();
        match result {
            Value::Element(el) => match &el.children[0] {
                Value::Element(inner) => assert_eq!(inner.tag, "b"),
                other => panic!("expected inner element, got {}", other.display()),
            },
            other => panic!("expected element, got {}", other.display()),
        }
    }

    #[test]
    fn throw_surfaces_as_error() {
        let allocator = Allocator::default();
        let interp = run(&allocator, "function Boom() { throw \"nope\"; }");
        let boom = interp.lookup("Boom").unwrap();
        let err = interp.call_value(&boom, vec![]).unwrap_err();
        assert!(matches!(err, EvalError::Thrown(m) if m == "nope"));
    }

    #[test]
    fn recursion_depth_is_bounded() {
        let allocator = Allocator::default();
        let interp = run(&allocator, "function R() { return R(); }");
        let r = interp.lookup("R").unwrap();
        let err = interp.call_value(&r, vec![]).unwrap_err();
        assert!(matches!(err, EvalError::DepthExceeded));
    }

    #[test]
    fn unknown_identifiers_are_rejected() {
        let allocator = Allocator::default();
        let interp = run(&allocator, "function U() { return SomethingGlobal(); }");
        let u = interp.lookup("U").unwrap();
        assert!(interp.call_value(&u, vec![]).is_err());
    }

    #[test]
    fn conditional_and_logical_operators() {
        let allocator = Allocator::default();
        let interp = run(
            &allocator,
            "const pick = (flag) => flag ? \"yes\" : (null ?? \"no\");",
        );
        let pick = interp.lookup("pick").unwrap();
        assert_eq!(
            interp.call_value(&pick, vec![Value::Bool(true)]).unwrap().display(),
            "yes"
        );
        assert_eq!(
            interp.call_value(&pick, vec![Value::Bool(false)]).unwrap().display(),
            "no"
        );
    }
}

//! Tree-walking evaluation of parsed templates.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value, json};

use crate::ast::{
    BinaryOp, Expr, MacroCall, MacroDef, Node, Position, Reference, Segment, SetTarget, Template,
    UnaryOp,
};
use crate::context::Context;
use crate::engine::Engine;
use crate::error::{Frame, Location, RenderError, RenderErrorKind};
use crate::loader::FileResourceLoader;
use crate::value;

const FOREACH_VARIABLE: &str = "foreach";
const BODY_CONTENT_VARIABLE: &str = "bodyContent";

/// How rendering of a node sequence ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Normal,
    Break,
    Stop,
}

pub(crate) struct Renderer<'e> {
    engine: &'e Engine,
    scope: Context,
    macros: HashMap<String, Arc<MacroDef>>,
    template: String,
    pos: Position,
    parse_depth: usize,
    macro_depth: usize,
}

impl<'e> Renderer<'e> {
    pub(crate) fn new(engine: &'e Engine, scope: Context) -> Self {
        Self {
            engine,
            scope,
            macros: engine.library_macros().clone(),
            template: String::new(),
            pos: Position { line: 1, column: 1 },
            parse_depth: 0,
            macro_depth: 0,
        }
    }

    pub(crate) fn render(mut self, template: &Template) -> Result<String, RenderError> {
        self.template.clone_from(&template.name);
        self.register_macros(&template.macros);
        let mut out = String::new();
        self.render_nodes(&template.nodes, &mut out)?;
        Ok(out)
    }

    const fn strict(&self) -> bool {
        self.engine.options().strict
    }

    fn here(&self, pos: Position) -> Location {
        pos.locate(&self.template)
    }

    fn fail(&self, kind: RenderErrorKind, pos: Position) -> RenderError {
        RenderError::new(kind, self.here(pos))
    }

    fn invalid(&self, message: impl Into<String>, pos: Position) -> RenderError {
        self.fail(
            RenderErrorKind::InvalidOperation {
                message: message.into(),
            },
            pos,
        )
    }

    fn register_macros(&mut self, definitions: &[Arc<MacroDef>]) {
        for definition in definitions {
            self.macros
                .insert(definition.name.clone(), Arc::clone(definition));
        }
    }

    fn render_nodes(&mut self, nodes: &[Node], out: &mut String) -> Result<Flow, RenderError> {
        for node in nodes {
            let flow = self.render_node(node, out)?;
            if flow != Flow::Normal {
                return Ok(flow);
            }
        }
        Ok(Flow::Normal)
    }

    fn render_node(&mut self, node: &Node, out: &mut String) -> Result<Flow, RenderError> {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Reference(reference) => self.render_reference(reference, out)?,
            Node::Set { target, value, pos } => {
                self.pos = *pos;
                let assigned = self.eval(value)?;
                self.assign(target, assigned, *pos)?;
            }
            Node::If {
                branches,
                otherwise,
            } => {
                for (condition, body) in branches {
                    if self.condition(condition)? {
                        return self.render_nodes(body, out);
                    }
                }
                if let Some(body) = otherwise {
                    return self.render_nodes(body, out);
                }
            }
            Node::Foreach {
                variable,
                iterable,
                body,
                otherwise,
                pos,
            } => {
                self.pos = *pos;
                return self.render_foreach(variable, iterable, body, otherwise.as_deref(), out);
            }
            Node::MacroCall(call) => return self.call_macro(call, out),
            Node::Parse { target, pos } => return self.render_parse(target, *pos, out),
            Node::Include { target, pos } => {
                self.pos = *pos;
                let name = self.resource_name(target, "#include")?;
                let loader = self.loader(&name, *pos)?;
                out.push_str(&loader.load_source(&name, &self.here(*pos))?);
            }
            Node::Break => return Ok(Flow::Break),
            Node::Stop => return Ok(Flow::Stop),
        }
        Ok(Flow::Normal)
    }

    fn render_reference(
        &mut self,
        reference: &Reference,
        out: &mut String,
    ) -> Result<(), RenderError> {
        self.pos = reference.pos;
        match self.resolve(reference)? {
            Some(Value::Null) | None if reference.quiet => {}
            Some(Value::Null) if self.strict() => {
                return Err(self.fail(
                    RenderErrorKind::NullReference {
                        reference: reference.source.clone(),
                    },
                    reference.pos,
                ));
            }
            None if self.strict() => {
                return Err(self.fail(
                    RenderErrorKind::UndefinedReference {
                        reference: format!("${}", reference.name),
                    },
                    reference.pos,
                ));
            }
            Some(Value::Null) | None => out.push_str(&reference.source),
            Some(resolved) => out.push_str(&value::display(&resolved)),
        }
        Ok(())
    }

    /// Resolves a reference. `None` means undefined; in strict mode that only
    /// happens when the base variable is unset.
    fn resolve(&mut self, reference: &Reference) -> Result<Option<Value>, RenderError> {
        let Some(mut current) = self.scope.get(&reference.name).cloned() else {
            return Ok(None);
        };
        let strict = self.strict();
        for (position, segment) in reference.segments.iter().enumerate() {
            if current.is_null() {
                if strict {
                    return Err(self.fail(
                        RenderErrorKind::NullReference {
                            reference: reference.prefix(position),
                        },
                        reference.pos,
                    ));
                }
                return Ok(None);
            }
            let next = match segment {
                Segment::Property(name) => value::property(&current, name).ok_or_else(|| {
                    RenderErrorKind::UnknownProperty {
                        target: reference.prefix(position),
                        property: name.clone(),
                    }
                }),
                Segment::Method { name, args } => {
                    let values = args
                        .iter()
                        .map(|arg| self.eval(arg))
                        .collect::<Result<Vec<_>, _>>()?;
                    value::invoke(&current, name, &values).map_err(|reason| {
                        RenderErrorKind::MethodInvocation {
                            target: reference.prefix(position),
                            method: name.clone(),
                            reason,
                        }
                    })
                }
                Segment::Index(expr) => {
                    let key = self.eval(expr)?;
                    match value::index(&current, &key) {
                        Ok(Some(found)) => Ok(found),
                        Ok(None) => Err(RenderErrorKind::InvalidOperation {
                            message: format!(
                                "{}[{}] does not exist",
                                reference.prefix(position),
                                value::display(&key)
                            ),
                        }),
                        Err(message) => Err(RenderErrorKind::InvalidOperation { message }),
                    }
                }
            };
            current = match next {
                Ok(found) => found,
                Err(kind) if strict => return Err(self.fail(kind, reference.pos)),
                Err(_) => return Ok(None),
            };
        }
        Ok(Some(current))
    }

    fn eval(&mut self, expr: &Expr) -> Result<Value, RenderError> {
        match expr {
            Expr::Literal(literal) => Ok(literal.clone()),
            Expr::Interpolated(nodes) => {
                let mut text = String::new();
                self.render_nodes(nodes, &mut text)?;
                Ok(Value::String(text))
            }
            Expr::Reference(reference) => match self.resolve(reference)? {
                Some(found) => Ok(found),
                None if self.strict() => Err(self.fail(
                    RenderErrorKind::UndefinedReference {
                        reference: format!("${}", reference.name),
                    },
                    reference.pos,
                )),
                None => Ok(Value::Null),
            },
            Expr::List(items) => items
                .iter()
                .map(|item| self.eval(item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Expr::Range(start, end) => {
                let first = self.eval(start)?;
                let last = self.eval(end)?;
                value::range(&first, &last).map_err(|message| self.invalid(message, self.pos))
            }
            Expr::Map(entries) => {
                let mut map = Map::new();
                for (key_expr, item_expr) in entries {
                    let key = match self.eval(key_expr)? {
                        Value::String(text) => text,
                        other => value::display(&other),
                    };
                    let item = self.eval(item_expr)?;
                    map.insert(key, item);
                }
                Ok(Value::Object(map))
            }
            Expr::Unary { op, operand, pos } => match op {
                UnaryOp::Not => Ok(Value::Bool(!self.condition(operand)?)),
                UnaryOp::Negate => {
                    let evaluated = self.eval(operand)?;
                    value::negate(&evaluated).map_err(|message| self.invalid(message, *pos))
                }
            },
            Expr::Binary { op, lhs, rhs, pos } => self.eval_binary(*op, lhs, rhs, *pos),
        }
    }

    fn eval_binary(
        &mut self,
        op: BinaryOp,
        lhs: &Expr,
        rhs: &Expr,
        pos: Position,
    ) -> Result<Value, RenderError> {
        match op {
            BinaryOp::And => Ok(Value::Bool(self.condition(lhs)? && self.condition(rhs)?)),
            BinaryOp::Or => Ok(Value::Bool(self.condition(lhs)? || self.condition(rhs)?)),
            BinaryOp::Eq | BinaryOp::Ne => {
                let equal = value::equals(&self.eval(lhs)?, &self.eval(rhs)?);
                Ok(Value::Bool(equal == (op == BinaryOp::Eq)))
            }
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                let left = self.eval(lhs)?;
                let right = self.eval(rhs)?;
                let ordering =
                    value::compare(&left, &right).map_err(|message| self.invalid(message, pos))?;
                Ok(Value::Bool(match op {
                    BinaryOp::Lt => ordering.is_lt(),
                    BinaryOp::Le => ordering.is_le(),
                    BinaryOp::Gt => ordering.is_gt(),
                    _ => ordering.is_ge(),
                }))
            }
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => {
                let left = self.eval(lhs)?;
                let right = self.eval(rhs)?;
                value::arithmetic(op, &left, &right).map_err(|message| self.invalid(message, pos))
            }
        }
    }

    /// Truth test for `#if` and logical operators. A bare reference to an
    /// unset variable is false rather than an error, even in strict mode.
    fn condition(&mut self, expr: &Expr) -> Result<bool, RenderError> {
        match expr {
            Expr::Reference(reference)
                if reference.segments.is_empty() && !self.scope.contains(&reference.name) =>
            {
                Ok(false)
            }
            Expr::Unary {
                op: UnaryOp::Not,
                operand,
                ..
            } => Ok(!self.condition(operand)?),
            Expr::Binary {
                op: BinaryOp::And,
                lhs,
                rhs,
                ..
            } => Ok(self.condition(lhs)? && self.condition(rhs)?),
            Expr::Binary {
                op: BinaryOp::Or,
                lhs,
                rhs,
                ..
            } => Ok(self.condition(lhs)? || self.condition(rhs)?),
            _ => Ok(value::is_truthy(&self.eval(expr)?)),
        }
    }

    fn assign(
        &mut self,
        target: &SetTarget,
        assigned: Value,
        pos: Position,
    ) -> Result<(), RenderError> {
        let Some((last, parents)) = target.path.split_last() else {
            self.scope.insert(target.name.clone(), assigned);
            return Ok(());
        };
        let strict = self.strict();
        let Some(root) = self.scope.get_mut(&target.name) else {
            if strict {
                return Err(self.fail(
                    RenderErrorKind::UndefinedReference {
                        reference: format!("${}", target.name),
                    },
                    pos,
                ));
            }
            return Ok(());
        };
        let mut current = root;
        for parent in parents {
            match current {
                Value::Object(entries) => {
                    current = entries
                        .entry(parent.clone())
                        .or_insert_with(|| Value::Object(Map::new()));
                }
                _ => {
                    let message = format!("cannot set '{parent}' on a non-map value");
                    return Err(self.invalid(message, pos));
                }
            }
        }
        match current {
            Value::Object(entries) => {
                entries.insert(last.clone(), assigned);
                Ok(())
            }
            other => {
                let message = format!("cannot set '{last}' on a {}", value::kind(other));
                Err(self.invalid(message, pos))
            }
        }
    }

    fn render_foreach(
        &mut self,
        variable: &str,
        iterable: &Expr,
        body: &[Node],
        otherwise: Option<&[Node]>,
        out: &mut String,
    ) -> Result<Flow, RenderError> {
        let pos = self.pos;
        let items = match self.eval(iterable)? {
            Value::Array(items) => items,
            Value::Object(entries) => entries.into_iter().map(|(_, item)| item).collect(),
            Value::Null => Vec::new(),
            other => {
                let message = format!("#foreach cannot iterate over a {}", value::kind(&other));
                return Err(self.invalid(message, pos));
            }
        };
        if items.is_empty() {
            return otherwise
                .map_or_else(|| Ok(Flow::Normal), |nodes| self.render_nodes(nodes, out));
        }

        let saved_item = self.scope.get(variable).cloned();
        let saved_loop = self.scope.get(FOREACH_VARIABLE).cloned();
        let total = items.len();
        let mut flow = Flow::Normal;
        for (index, item) in items.into_iter().enumerate() {
            self.scope.insert(variable, item);
            self.scope.insert(
                FOREACH_VARIABLE,
                json!({
                    "index": index,
                    "count": index + 1,
                    "hasNext": index + 1 < total,
                    "first": index == 0,
                    "last": index + 1 == total,
                }),
            );
            match self.render_nodes(body, out)? {
                Flow::Normal => {}
                Flow::Break => break,
                Flow::Stop => {
                    flow = Flow::Stop;
                    break;
                }
            }
        }
        self.scope.restore(variable, saved_item);
        self.scope.restore(FOREACH_VARIABLE, saved_loop);
        Ok(flow)
    }

    /// Evaluates a macro argument. An unset variable leaves the parameter
    /// unset instead of failing at the call site.
    fn eval_argument(&mut self, expr: &Expr) -> Result<Option<Value>, RenderError> {
        if let Expr::Reference(reference) = expr
            && reference.segments.is_empty()
            && !self.scope.contains(&reference.name)
        {
            return Ok(None);
        }
        self.eval(expr).map(Some)
    }

    fn call_macro(&mut self, call: &MacroCall, out: &mut String) -> Result<Flow, RenderError> {
        self.pos = call.pos;
        let Some(definition) = self.macros.get(&call.name).cloned() else {
            if self.strict() {
                return Err(self.fail(
                    RenderErrorKind::UndefinedMacro {
                        name: call.name.clone(),
                    },
                    call.pos,
                ));
            }
            out.push_str(&call.source);
            return Ok(Flow::Normal);
        };
        if self.strict() && call.args.len() != definition.params.len() {
            return Err(self.fail(
                RenderErrorKind::MacroArity {
                    name: call.name.clone(),
                    expected: definition.params.len(),
                    actual: call.args.len(),
                },
                call.pos,
            ));
        }
        let limit = self.engine.options().max_macro_depth;
        if self.macro_depth >= limit {
            return Err(self.fail(
                RenderErrorKind::RecursionLimit {
                    what: "macro",
                    limit,
                },
                call.pos,
            ));
        }

        let mut bindings = Vec::with_capacity(definition.params.len() + 1);
        for (param, arg) in definition.params.iter().zip(&call.args) {
            bindings.push((param.clone(), self.eval_argument(arg)?));
        }
        if let Some(body) = &call.body {
            let mut content = String::new();
            self.render_nodes(body, &mut content)?;
            bindings.push((BODY_CONTENT_VARIABLE.to_owned(), Some(Value::String(content))));
        }

        let mut saved = Vec::with_capacity(definition.params.len() + 1);
        for param in &definition.params {
            saved.push((param.clone(), self.scope.remove(param)));
        }
        for (name, bound) in bindings {
            if !saved.iter().any(|(saved_name, _)| *saved_name == name) {
                saved.push((name.clone(), self.scope.remove(&name)));
            }
            if let Some(argument) = bound {
                self.scope.insert(name, argument);
            }
        }

        let called_at = self.here(call.pos);
        let caller = std::mem::replace(&mut self.template, definition.template.clone());
        self.macro_depth += 1;
        let result = self.render_nodes(&definition.body, out);
        self.macro_depth -= 1;
        self.template = caller;
        for (name, previous) in saved {
            self.scope.restore(&name, previous);
        }

        let flow = result.map_err(|error| {
            error.with_frame(Frame::Macro {
                name: call.name.clone(),
                called_at,
            })
        })?;
        Ok(if flow == Flow::Stop {
            Flow::Stop
        } else {
            Flow::Normal
        })
    }

    fn render_parse(
        &mut self,
        target: &Expr,
        pos: Position,
        out: &mut String,
    ) -> Result<Flow, RenderError> {
        self.pos = pos;
        let name = self.resource_name(target, "#parse")?;
        let limit = self.engine.options().max_parse_depth;
        if self.parse_depth >= limit {
            return Err(self.fail(
                RenderErrorKind::RecursionLimit {
                    what: "#parse",
                    limit,
                },
                pos,
            ));
        }
        let called_at = self.here(pos);
        let template = self.loader(&name, pos)?.load_template(&name, &called_at)?;
        self.register_macros(&template.macros);

        let caller = std::mem::replace(&mut self.template, template.name.clone());
        self.parse_depth += 1;
        let result = self.render_nodes(&template.nodes, out);
        self.parse_depth -= 1;
        self.template = caller;

        let flow = result.map_err(|error| {
            error.with_frame(Frame::Parse {
                resource: name,
                called_at,
            })
        })?;
        Ok(if flow == Flow::Stop {
            Flow::Stop
        } else {
            Flow::Normal
        })
    }

    fn resource_name(&mut self, target: &Expr, directive: &str) -> Result<String, RenderError> {
        match self.eval(target)? {
            Value::String(name) => Ok(name),
            Value::Null => {
                Err(self.invalid(format!("{directive} target evaluated to null"), self.pos))
            }
            other => Ok(value::display(&other)),
        }
    }

    fn loader(&self, name: &str, pos: Position) -> Result<&'e FileResourceLoader, RenderError> {
        self.engine.loader().ok_or_else(|| {
            self.fail(
                RenderErrorKind::ResourceNotFound {
                    name: name.to_owned(),
                },
                pos,
            )
        })
    }
}

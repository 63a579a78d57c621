//! Parsed template representation.

use std::sync::Arc;

use serde_json::Value;

use crate::error::Location;

/// Template source split into renderable nodes.
#[derive(Debug, Clone)]
pub(crate) struct Template {
    pub(crate) name: String,
    pub(crate) nodes: Vec<Node>,
    pub(crate) macros: Vec<Arc<MacroDef>>,
}

/// Source position, one-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Position {
    pub(crate) line: u32,
    pub(crate) column: u32,
}

impl Position {
    pub(crate) fn locate(self, template: &str) -> Location {
        Location::new(template, self.line, self.column)
    }
}

#[derive(Debug, Clone)]
pub(crate) enum Node {
    Text(String),
    Reference(Reference),
    Set {
        target: SetTarget,
        value: Expr,
        pos: Position,
    },
    If {
        branches: Vec<(Expr, Vec<Node>)>,
        otherwise: Option<Vec<Node>>,
    },
    Foreach {
        variable: String,
        iterable: Expr,
        body: Vec<Node>,
        otherwise: Option<Vec<Node>>,
        pos: Position,
    },
    MacroCall(MacroCall),
    Parse {
        target: Expr,
        pos: Position,
    },
    Include {
        target: Expr,
        pos: Position,
    },
    Break,
    Stop,
}

/// `$name.segment[index]` style reference.
#[derive(Debug, Clone)]
pub(crate) struct Reference {
    pub(crate) quiet: bool,
    pub(crate) name: String,
    pub(crate) segments: Vec<Segment>,
    /// Reference exactly as written, used for diagnostics and lenient output.
    pub(crate) source: String,
    pub(crate) pos: Position,
}

impl Reference {
    /// Rendering of the reference up to (excluding) segment `upto`.
    pub(crate) fn prefix(&self, upto: usize) -> String {
        let mut text = format!("${}", self.name);
        for segment in self.segments.iter().take(upto) {
            match segment {
                Segment::Property(name) => {
                    text.push('.');
                    text.push_str(name);
                }
                Segment::Method { name, .. } => {
                    text.push('.');
                    text.push_str(name);
                    text.push_str("()");
                }
                Segment::Index(_) => text.push_str("[]"),
            }
        }
        text
    }
}

#[derive(Debug, Clone)]
pub(crate) enum Segment {
    Property(String),
    Method { name: String, args: Vec<Expr> },
    Index(Expr),
}

/// Left-hand side of `#set`: a variable and an optional property path.
#[derive(Debug, Clone)]
pub(crate) struct SetTarget {
    pub(crate) name: String,
    pub(crate) path: Vec<String>,
}

#[derive(Debug, Clone)]
pub(crate) struct MacroCall {
    pub(crate) name: String,
    pub(crate) args: Vec<Expr>,
    pub(crate) body: Option<Vec<Node>>,
    pub(crate) source: String,
    pub(crate) pos: Position,
}

#[derive(Debug, Clone)]
pub(crate) struct MacroDef {
    pub(crate) name: String,
    pub(crate) params: Vec<String>,
    pub(crate) body: Vec<Node>,
    /// Template the macro was defined in, for error locations.
    pub(crate) template: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UnaryOp {
    Not,
    Negate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl BinaryOp {
    pub(crate) const fn symbol(self) -> &'static str {
        match self {
            Self::Or => "||",
            Self::And => "&&",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Rem => "%",
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) enum Expr {
    Literal(Value),
    /// Double-quoted string containing references or directives.
    Interpolated(Vec<Node>),
    Reference(Reference),
    List(Vec<Expr>),
    Range(Box<Expr>, Box<Expr>),
    Map(Vec<(Expr, Expr)>),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
        pos: Position,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        pos: Position,
    },
}

// File: src/ast.rs
//
// Abstract Syntax Tree (AST) definitions for the Refl language.
// Defines the structure of parsed Refl programs.
//
// The concrete-syntax parser lives outside this crate; anything that can
// produce these node shapes can drive the interpreter. Every node carries
// its source position so runtime panics can point back at the code.
//
// Blocks are reference-counted because function values keep their body
// alive long after the program that defined them has been evaluated
// (closures registered with the event loop, for example).

use crate::errors::SourceLocation;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Shared handle to a block of statements
pub type BlockRef = Arc<Block>;

/// A complete program: an ordered list of statements
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Program {
    pub statements: Vec<Stmt>,
    #[serde(default)]
    pub pos: SourceLocation,
}

/// A braced block of statements; evaluating it opens a new scope
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Block {
    pub statements: Vec<Stmt>,
    #[serde(default)]
    pub pos: SourceLocation,
}

/// An `elif` arm of an if statement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElifBranch {
    pub condition: Expr,
    pub body: BlockRef,
    #[serde(default)]
    pub pos: SourceLocation,
}

/// One entry of an object literal.
///
/// Entries without a key are array-style: they receive sequential numeric
/// keys starting at 0, counting only the keyless entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Property {
    #[serde(default)]
    pub key: Option<String>,
    pub value: Expr,
}

/// Represents a statement in Refl - an action or declaration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Stmt {
    /// `var name [= value]`
    Var {
        name: String,
        #[serde(default)]
        value: Option<Expr>,
        #[serde(default)]
        pos: SourceLocation,
    },
    #[serde(rename = "expression")]
    Expression {
        expr: Expr,
        #[serde(default)]
        pos: SourceLocation,
    },
    If {
        condition: Expr,
        then_branch: BlockRef,
        #[serde(default)]
        elif_branches: Vec<ElifBranch>,
        #[serde(default)]
        else_branch: Option<BlockRef>,
        #[serde(default)]
        pos: SourceLocation,
    },
    While {
        condition: Expr,
        body: BlockRef,
        #[serde(default)]
        pos: SourceLocation,
    },
    /// `for key[, value] in iterable { ... }`
    For {
        key: String,
        #[serde(default)]
        value: Option<String>,
        iterable: Expr,
        body: BlockRef,
        #[serde(default)]
        pos: SourceLocation,
    },
    Block {
        block: BlockRef,
    },
    Break {
        #[serde(default)]
        pos: SourceLocation,
    },
    Continue {
        #[serde(default)]
        pos: SourceLocation,
    },
    Return {
        #[serde(default)]
        value: Option<Expr>,
        #[serde(default)]
        pos: SourceLocation,
    },
}

impl Stmt {
    pub fn position(&self) -> SourceLocation {
        match self {
            Stmt::Var { pos, .. }
            | Stmt::Expression { pos, .. }
            | Stmt::If { pos, .. }
            | Stmt::While { pos, .. }
            | Stmt::For { pos, .. }
            | Stmt::Break { pos }
            | Stmt::Continue { pos }
            | Stmt::Return { pos, .. } => *pos,
            Stmt::Block { block } => block.pos,
        }
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    #[serde(rename = "!")]
    Not,
    #[serde(rename = "-")]
    Negate,
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnaryOp::Not => write!(f, "!"),
            UnaryOp::Negate => write!(f, "-"),
        }
    }
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    #[serde(rename = "+")]
    Add,
    #[serde(rename = "-")]
    Sub,
    #[serde(rename = "*")]
    Mul,
    #[serde(rename = "/")]
    Div,
    #[serde(rename = "%")]
    Mod,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    NotEq,
    #[serde(rename = "&&")]
    And,
    #[serde(rename = "||")]
    Or,
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Lt => "<",
            BinaryOp::Gt => ">",
            BinaryOp::Le => "<=",
            BinaryOp::Ge => ">=",
            BinaryOp::Eq => "==",
            BinaryOp::NotEq => "!=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        };
        write!(f, "{}", symbol)
    }
}

/// Represents an expression in Refl - something that evaluates to a value
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Expr {
    Identifier {
        name: String,
        #[serde(default)]
        pos: SourceLocation,
    },
    Number {
        value: f64,
        #[serde(default)]
        pos: SourceLocation,
    },
    String {
        value: String,
        #[serde(default)]
        pos: SourceLocation,
    },
    RawString {
        value: String,
        #[serde(default)]
        pos: SourceLocation,
    },
    Nil {
        #[serde(default)]
        pos: SourceLocation,
    },
    Object {
        properties: Vec<Property>,
        #[serde(default)]
        pos: SourceLocation,
    },
    Function {
        params: Vec<String>,
        body: BlockRef,
        #[serde(default)]
        pos: SourceLocation,
    },
    /// `object.member`
    MemberDot {
        object: Box<Expr>,
        member: String,
        #[serde(default)]
        pos: SourceLocation,
    },
    /// `object[key]`
    MemberBracket {
        object: Box<Expr>,
        key: Box<Expr>,
        #[serde(default)]
        pos: SourceLocation,
    },
    Call {
        function: Box<Expr>,
        args: Vec<Expr>,
        #[serde(default)]
        pos: SourceLocation,
    },
    /// `object:method(args)` - the receiver is passed as the first argument
    MethodCall {
        object: Box<Expr>,
        method: String,
        args: Vec<Expr>,
        #[serde(default)]
        pos: SourceLocation,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
        #[serde(default)]
        pos: SourceLocation,
    },
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
        #[serde(default)]
        pos: SourceLocation,
    },
    Assign {
        target: Box<Expr>,
        value: Box<Expr>,
        #[serde(default)]
        pos: SourceLocation,
    },
}

impl Expr {
    pub fn position(&self) -> SourceLocation {
        match self {
            Expr::Identifier { pos, .. }
            | Expr::Number { pos, .. }
            | Expr::String { pos, .. }
            | Expr::RawString { pos, .. }
            | Expr::Nil { pos }
            | Expr::Object { pos, .. }
            | Expr::Function { pos, .. }
            | Expr::MemberDot { pos, .. }
            | Expr::MemberBracket { pos, .. }
            | Expr::Call { pos, .. }
            | Expr::MethodCall { pos, .. }
            | Expr::Unary { pos, .. }
            | Expr::Binary { pos, .. }
            | Expr::Assign { pos, .. } => *pos,
        }
    }
}

/// Turns source text into a program.
///
/// The interpreter only needs this for the `eval` and `refl` builtins; the
/// host attaches an implementation through `Options::with_parser`.
pub trait SourceParser: Send + Sync {
    fn parse(&self, source: &str) -> Result<Program, String>;
}

/// Reads programs serialized as JSON (the serde form of [`Program`])
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonParser;

impl SourceParser for JsonParser {
    fn parse(&self, source: &str) -> Result<Program, String> {
        serde_json::from_str(source).map_err(|e| format!("invalid program: {}", e))
    }
}

/// Shorthand constructors for building ASTs by hand.
///
/// Embedders that generate programs (and the test suites) use these instead
/// of spelling out every struct variant. All nodes get an unknown position.
pub mod build {
    use super::*;

    fn at() -> SourceLocation {
        SourceLocation::unknown()
    }

    pub fn program(statements: Vec<Stmt>) -> Program {
        Program { statements, pos: at() }
    }

    pub fn block(statements: Vec<Stmt>) -> BlockRef {
        Arc::new(Block { statements, pos: at() })
    }

    pub fn var(name: &str, value: Expr) -> Stmt {
        Stmt::Var { name: name.to_string(), value: Some(value), pos: at() }
    }

    pub fn declare(name: &str) -> Stmt {
        Stmt::Var { name: name.to_string(), value: None, pos: at() }
    }

    pub fn expr(expr: Expr) -> Stmt {
        Stmt::Expression { expr, pos: at() }
    }

    pub fn if_else(condition: Expr, then_branch: Vec<Stmt>, else_branch: Option<Vec<Stmt>>) -> Stmt {
        Stmt::If {
            condition,
            then_branch: block(then_branch),
            elif_branches: Vec::new(),
            else_branch: else_branch.map(block),
            pos: at(),
        }
    }

    pub fn if_elif(
        condition: Expr,
        then_branch: Vec<Stmt>,
        elifs: Vec<(Expr, Vec<Stmt>)>,
        else_branch: Option<Vec<Stmt>>,
    ) -> Stmt {
        let elif_branches = elifs
            .into_iter()
            .map(|(condition, body)| ElifBranch { condition, body: block(body), pos: at() })
            .collect();
        Stmt::If {
            condition,
            then_branch: block(then_branch),
            elif_branches,
            else_branch: else_branch.map(block),
            pos: at(),
        }
    }

    pub fn while_loop(condition: Expr, body: Vec<Stmt>) -> Stmt {
        Stmt::While { condition, body: block(body), pos: at() }
    }

    pub fn for_in(key: &str, value: Option<&str>, iterable: Expr, body: Vec<Stmt>) -> Stmt {
        Stmt::For {
            key: key.to_string(),
            value: value.map(str::to_string),
            iterable,
            body: block(body),
            pos: at(),
        }
    }

    pub fn scope(statements: Vec<Stmt>) -> Stmt {
        Stmt::Block { block: block(statements) }
    }

    pub fn brk() -> Stmt {
        Stmt::Break { pos: at() }
    }

    pub fn cont() -> Stmt {
        Stmt::Continue { pos: at() }
    }

    pub fn ret(value: Option<Expr>) -> Stmt {
        Stmt::Return { value, pos: at() }
    }

    pub fn ident(name: &str) -> Expr {
        Expr::Identifier { name: name.to_string(), pos: at() }
    }

    pub fn num(value: f64) -> Expr {
        Expr::Number { value, pos: at() }
    }

    pub fn string(value: &str) -> Expr {
        Expr::String { value: value.to_string(), pos: at() }
    }

    pub fn nil() -> Expr {
        Expr::Nil { pos: at() }
    }

    /// Object literal with named keys
    pub fn object(entries: Vec<(&str, Expr)>) -> Expr {
        let properties = entries
            .into_iter()
            .map(|(key, value)| Property { key: Some(key.to_string()), value })
            .collect();
        Expr::Object { properties, pos: at() }
    }

    /// Array-style object literal: `{a, b, c}`
    pub fn array(values: Vec<Expr>) -> Expr {
        let properties = values.into_iter().map(|value| Property { key: None, value }).collect();
        Expr::Object { properties, pos: at() }
    }

    pub fn func(params: &[&str], body: Vec<Stmt>) -> Expr {
        Expr::Function {
            params: params.iter().map(|p| p.to_string()).collect(),
            body: block(body),
            pos: at(),
        }
    }

    pub fn dot(object: Expr, member: &str) -> Expr {
        Expr::MemberDot { object: Box::new(object), member: member.to_string(), pos: at() }
    }

    pub fn index(object: Expr, key: Expr) -> Expr {
        Expr::MemberBracket { object: Box::new(object), key: Box::new(key), pos: at() }
    }

    pub fn call(function: Expr, args: Vec<Expr>) -> Expr {
        Expr::Call { function: Box::new(function), args, pos: at() }
    }

    pub fn method(object: Expr, method: &str, args: Vec<Expr>) -> Expr {
        Expr::MethodCall { object: Box::new(object), method: method.to_string(), args, pos: at() }
    }

    pub fn unary(op: UnaryOp, operand: Expr) -> Expr {
        Expr::Unary { op, operand: Box::new(operand), pos: at() }
    }

    pub fn binary(left: Expr, op: BinaryOp, right: Expr) -> Expr {
        Expr::Binary { left: Box::new(left), op, right: Box::new(right), pos: at() }
    }

    pub fn assign(target: Expr, value: Expr) -> Expr {
        Expr::Assign { target: Box::new(target), value: Box::new(value), pos: at() }
    }
}

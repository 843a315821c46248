//! Utility term expressions.
//!
//! # Syntax
//!
//! | Form                         | Meaning                                         |
//! |------------------------------|-------------------------------------------------|
//! | `1.5`, `-2`                  | number                                          |
//! | `chooser.age`                | chooser column                                  |
//! | `alt.size_term`              | alternative column                              |
//! | `skim.DIST`                  | skim between the row's origin and destination   |
//! | `name`                       | constant, else alternative column, else chooser column |
//! | `+ - * /`                    | arithmetic                                      |
//! | `< <= > >= == !=`            | comparison, `1.0` if true else `0.0`            |
//! | `chooser.tour_type == 'work'`| string equality against a text column           |
//! | `ln(x) exp(x) abs(x) sqrt(x)`| functions                                       |
//! | `min(a, b) max(a, b)`        |                                                 |
//! | `where(c, a, b)`             | `a` if `c != 0` else `b`                        |
//!
//! Expressions are parsed once into an [`Ast`], then compiled against a
//! [`Resolver`] that knows which names exist.  The compiled [`Expr`]
//! evaluates against any [`Env`].

use crate::{ChoiceError, ChoiceResult};

// ── Tokens ────────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Num(f64),
    Ident(String),
    Str(String),
    Op(&'static str),
}

const OPS: &[&str] = &["<=", ">=", "==", "!=", "<", ">", "+", "-", "*", "/", "(", ")", ","];

fn tokenize(src: &str) -> Result<Vec<Token>, String> {
    let bytes = src.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i] as char;
        if c.is_ascii_whitespace() {
            i += 1;
        } else if c.is_ascii_digit() || (c == '.' && bytes.get(i + 1).is_some_and(u8::is_ascii_digit)) {
            let start = i;
            while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
                i += 1;
            }
            if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
                i += 1;
                if i < bytes.len() && (bytes[i] == b'-' || bytes[i] == b'+') {
                    i += 1;
                }
                while i < bytes.len() && bytes[i].is_ascii_digit() {
                    i += 1;
                }
            }
            let text = &src[start..i];
            out.push(Token::Num(text.parse().map_err(|_| format!("bad number '{text}'"))?));
        } else if c.is_ascii_alphabetic() || c == '_' {
            let start = i;
            while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_' || bytes[i] == b'.') {
                i += 1;
            }
            out.push(Token::Ident(src[start..i].to_owned()));
        } else if c == '\'' || c == '"' {
            let end = src[i + 1..].find(c).ok_or("unterminated string")?;
            out.push(Token::Str(src[i + 1..i + 1 + end].to_owned()));
            i += end + 2;
        } else {
            let op = OPS
                .iter()
                .find(|op| src[i..].starts_with(**op))
                .ok_or_else(|| format!("unexpected character '{c}'"))?;
            out.push(Token::Op(op));
            i += op.len();
        }
    }
    Ok(out)
}

// ── AST ───────────────────────────────────────────────────────────────────────

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl BinOp {
    fn from_token(op: &str) -> Option<BinOp> {
        Some(match op {
            "+" => BinOp::Add,
            "-" => BinOp::Sub,
            "*" => BinOp::Mul,
            "/" => BinOp::Div,
            "<" => BinOp::Lt,
            "<=" => BinOp::Le,
            ">" => BinOp::Gt,
            ">=" => BinOp::Ge,
            "==" => BinOp::Eq,
            "!=" => BinOp::Ne,
            _ => return None,
        })
    }

    fn precedence(self) -> u8 {
        match self {
            BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge | BinOp::Eq | BinOp::Ne => 1,
            BinOp::Add | BinOp::Sub => 2,
            BinOp::Mul | BinOp::Div => 3,
        }
    }

    fn apply(self, a: f64, b: f64) -> f64 {
        let truth = |t: bool| if t { 1.0 } else { 0.0 };
        match self {
            BinOp::Add => a + b,
            BinOp::Sub => a - b,
            BinOp::Mul => a * b,
            BinOp::Div => a / b,
            BinOp::Lt => truth(a < b),
            BinOp::Le => truth(a <= b),
            BinOp::Gt => truth(a > b),
            BinOp::Ge => truth(a >= b),
            BinOp::Eq => truth(a == b),
            BinOp::Ne => truth(a != b),
        }
    }
}

/// Parsed, unresolved expression.
#[derive(Clone, Debug, PartialEq)]
pub enum Ast {
    Num(f64),
    Str(String),
    Name(String),
    Neg(Box<Ast>),
    Bin(BinOp, Box<Ast>, Box<Ast>),
    Call(String, Vec<Ast>),
}

struct Parser {
    tokens: Vec<Token>,
    pos:    usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        t
    }

    fn expect(&mut self, op: &str) -> Result<(), String> {
        match self.next() {
            Some(Token::Op(o)) if o == op => Ok(()),
            other => Err(format!("expected '{op}', found {other:?}")),
        }
    }

    fn expr(&mut self, min_prec: u8) -> Result<Ast, String> {
        let mut lhs = self.unary()?;
        while let Some(Token::Op(op)) = self.peek() {
            let Some(bin) = BinOp::from_token(op) else { break };
            if bin.precedence() < min_prec {
                break;
            }
            self.pos += 1;
            let rhs = self.expr(bin.precedence() + 1)?;
            lhs = Ast::Bin(bin, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Ast, String> {
        if self.peek() == Some(&Token::Op("-")) {
            self.pos += 1;
            return Ok(Ast::Neg(Box::new(self.unary()?)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Ast, String> {
        match self.next() {
            Some(Token::Num(n)) => Ok(Ast::Num(n)),
            Some(Token::Str(s)) => Ok(Ast::Str(s)),
            Some(Token::Op("(")) => {
                let inner = self.expr(0)?;
                self.expect(")")?;
                Ok(inner)
            }
            Some(Token::Ident(name)) => {
                if self.peek() != Some(&Token::Op("(")) {
                    return Ok(Ast::Name(name));
                }
                self.pos += 1;
                let mut args = Vec::new();
                if self.peek() != Some(&Token::Op(")")) {
                    loop {
                        args.push(self.expr(0)?);
                        if self.peek() == Some(&Token::Op(",")) {
                            self.pos += 1;
                        } else {
                            break;
                        }
                    }
                }
                self.expect(")")?;
                Ok(Ast::Call(name, args))
            }
            other => Err(format!("unexpected {other:?}")),
        }
    }
}

impl Ast {
    pub fn parse(src: &str) -> ChoiceResult<Ast> {
        let parse_err = |reason: String| ChoiceError::Parse { expr: src.to_owned(), reason };
        let mut p = Parser { tokens: tokenize(src).map_err(parse_err)?, pos: 0 };
        let ast = p.expr(0).map_err(parse_err)?;
        if p.pos < p.tokens.len() {
            return Err(parse_err(format!("trailing input at {:?}", p.tokens[p.pos])));
        }
        Ok(ast)
    }

    /// Every name referenced, in order of appearance.
    pub fn names(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_names(&mut out);
        out
    }

    fn collect_names<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Ast::Name(n) => out.push(n),
            Ast::Neg(a) => a.collect_names(out),
            Ast::Bin(_, a, b) => {
                a.collect_names(out);
                b.collect_names(out);
            }
            Ast::Call(_, args) => args.iter().for_each(|a| a.collect_names(out)),
            Ast::Num(_) | Ast::Str(_) => {}
        }
    }
}

// ── Compiled form ─────────────────────────────────────────────────────────────

/// What a name resolves to.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Slot {
    Const(f64),
    /// Numeric variable slot.
    Num(usize),
    /// Text variable slot; only usable in `==` / `!=` against a literal.
    Text(usize),
    Skim(usize),
}

/// Maps names to slots while compiling.
pub trait Resolver {
    fn resolve(&mut self, name: &str) -> Option<Slot>;
}

/// Supplies slot values while evaluating.
pub trait Env {
    fn num(&self, slot: usize) -> f64;
    fn text(&self, slot: usize) -> &str;
    fn skim(&self, slot: usize) -> ChoiceResult<f64>;
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Func {
    Ln,
    Exp,
    Abs,
    Sqrt,
    Min,
    Max,
    Where,
}

impl Func {
    fn lookup(name: &str) -> Option<(Func, usize)> {
        Some(match name {
            "ln" | "log" => (Func::Ln, 1),
            "exp" => (Func::Exp, 1),
            "abs" => (Func::Abs, 1),
            "sqrt" => (Func::Sqrt, 1),
            "min" => (Func::Min, 2),
            "max" => (Func::Max, 2),
            "where" => (Func::Where, 3),
            _ => return None,
        })
    }
}

#[derive(Clone, Debug)]
enum Node {
    Const(f64),
    Num(usize),
    Skim(usize),
    TextEq { slot: usize, lit: String, eq: bool },
    Neg(Box<Node>),
    Bin(BinOp, Box<Node>, Box<Node>),
    Call(Func, Vec<Node>),
}

/// A compiled expression.
#[derive(Clone, Debug)]
pub struct Expr {
    src:  String,
    root: Node,
}

impl Expr {
    /// Parse and compile `src` in one go.
    pub fn compile(src: &str, resolver: &mut impl Resolver) -> ChoiceResult<Expr> {
        Self::compile_ast(src, &Ast::parse(src)?, resolver)
    }

    pub fn compile_ast(src: &str, ast: &Ast, resolver: &mut impl Resolver) -> ChoiceResult<Expr> {
        let root = lower(src, ast, resolver)?;
        Ok(Expr { src: src.to_owned(), root: fold(root) })
    }

    pub fn source(&self) -> &str {
        &self.src
    }

    /// The constant value, if the expression folded to one.
    pub fn as_const(&self) -> Option<f64> {
        match self.root {
            Node::Const(v) => Some(v),
            _ => None,
        }
    }

    pub fn eval(&self, env: &impl Env) -> ChoiceResult<f64> {
        eval(&self.root, env)
    }
}

fn lower(src: &str, ast: &Ast, r: &mut impl Resolver) -> ChoiceResult<Node> {
    let parse_err = |reason: String| ChoiceError::Parse { expr: src.to_owned(), reason };
    Ok(match ast {
        Ast::Num(v) => Node::Const(*v),
        Ast::Str(s) => return Err(parse_err(format!("string '{s}' outside a comparison"))),
        Ast::Name(name) => match resolve(src, r, name)? {
            Slot::Const(v) => Node::Const(v),
            Slot::Num(i) => Node::Num(i),
            Slot::Skim(i) => Node::Skim(i),
            Slot::Text(_) => return Err(parse_err(format!("text column '{name}' used as a number"))),
        },
        Ast::Neg(a) => Node::Neg(Box::new(lower(src, a, r)?)),
        Ast::Bin(op @ (BinOp::Eq | BinOp::Ne), a, b) if matches!(**b, Ast::Str(_)) || matches!(**a, Ast::Str(_)) => {
            let (name, lit) = match (&**a, &**b) {
                (Ast::Name(n), Ast::Str(s)) | (Ast::Str(s), Ast::Name(n)) => (n, s),
                _ => return Err(parse_err("string comparison needs a column and a literal".into())),
            };
            match resolve(src, r, name)? {
                Slot::Text(slot) => Node::TextEq { slot, lit: lit.clone(), eq: *op == BinOp::Eq },
                _ => return Err(parse_err(format!("'{name}' is not a text column"))),
            }
        }
        Ast::Bin(op, a, b) => Node::Bin(*op, Box::new(lower(src, a, r)?), Box::new(lower(src, b, r)?)),
        Ast::Call(name, args) => {
            let (func, arity) = Func::lookup(name).ok_or_else(|| parse_err(format!("unknown function '{name}'")))?;
            if args.len() != arity {
                return Err(parse_err(format!("{name} takes {arity} argument(s), got {}", args.len())));
            }
            Node::Call(func, args.iter().map(|a| lower(src, a, r)).collect::<ChoiceResult<_>>()?)
        }
    })
}

fn resolve(src: &str, r: &mut impl Resolver, name: &str) -> ChoiceResult<Slot> {
    r.resolve(name)
        .ok_or_else(|| ChoiceError::UnknownName { expr: src.to_owned(), name: name.to_owned() })
}

/// Fold constant subtrees.
fn fold(node: Node) -> Node {
    match node {
        Node::Neg(a) => match fold(*a) {
            Node::Const(v) => Node::Const(-v),
            a => Node::Neg(Box::new(a)),
        },
        Node::Bin(op, a, b) => match (fold(*a), fold(*b)) {
            (Node::Const(x), Node::Const(y)) => Node::Const(op.apply(x, y)),
            (a, b) => Node::Bin(op, Box::new(a), Box::new(b)),
        },
        Node::Call(f, args) => Node::Call(f, args.into_iter().map(fold).collect()),
        other => other,
    }
}

fn eval(node: &Node, env: &impl Env) -> ChoiceResult<f64> {
    Ok(match node {
        Node::Const(v) => *v,
        Node::Num(i) => env.num(*i),
        Node::Skim(i) => env.skim(*i)?,
        Node::TextEq { slot, lit, eq } => {
            if (env.text(*slot) == lit) == *eq {
                1.0
            } else {
                0.0
            }
        }
        Node::Neg(a) => -eval(a, env)?,
        Node::Bin(op, a, b) => op.apply(eval(a, env)?, eval(b, env)?),
        Node::Call(f, args) => {
            let arg = |i: usize| eval(&args[i], env);
            match f {
                Func::Ln => arg(0)?.ln(),
                Func::Exp => arg(0)?.exp(),
                Func::Abs => arg(0)?.abs(),
                Func::Sqrt => arg(0)?.sqrt(),
                Func::Min => arg(0)?.min(arg(1)?),
                Func::Max => arg(0)?.max(arg(1)?),
                Func::Where => {
                    if arg(0)? != 0.0 {
                        arg(1)?
                    } else {
                        arg(2)?
                    }
                }
            }
        }
    })
}

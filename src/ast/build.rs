//! Expression builder for writing kernel bodies in Rust.
//!
//! Kernel bodies are assembled once, when the kernel is defined, from `Ex`
//! values whose operators build AST nodes instead of computing anything:
//!
//! ```
//! use kernelforge::ast::build::*;
//!
//! let body = block(vec![
//!     local("f32", "x", ident("input").index(thread_id("X"))),
//!     expr(ident("output").index(thread_id("X")).assign(ident("x") * 2.0f32 + ident("bias"))),
//! ]);
//! assert_eq!(body.stmts.len(), 2);
//! ```

use std::ops;

use super::*;
use crate::span::{Span, Spanned};

/// An expression under construction.
#[derive(Clone, Debug, PartialEq)]
pub struct Ex(pub Spanned<Expr>);

/// A statement under construction.
#[derive(Clone, Debug, PartialEq)]
pub struct St(pub Spanned<Stmt>);

fn boxed(e: Ex) -> Box<Spanned<Expr>> {
    Box::new(e.0)
}

fn name(s: &str) -> Spanned<String> {
    Spanned::dummy(s.to_string())
}

impl Ex {
    pub fn new(node: Expr) -> Self {
        Ex(Spanned::dummy(node))
    }

    /// Attach the host span this expression was written at.
    pub fn at(mut self, span: Span) -> Self {
        self.0.span = span;
        self
    }

    pub fn into_inner(self) -> Spanned<Expr> {
        self.0
    }

    pub fn member(self, member: &str) -> Ex {
        let span = self.0.span;
        Ex(Spanned::new(
            Expr::Member {
                target: boxed(self),
                member: name(member),
            },
            span,
        ))
    }

    pub fn index(self, index: impl Into<Ex>) -> Ex {
        let index = index.into();
        let span = self.0.span.merge(index.0.span);
        Ex(Spanned::new(
            Expr::Index {
                target: boxed(self),
                index: boxed(index),
            },
            span,
        ))
    }

    /// Invoke this expression with by-value arguments.
    pub fn call(self, args: Vec<Ex>) -> Ex {
        self.call_with(args.into_iter().map(Arg::from).collect())
    }

    /// Invoke this expression with explicit argument modes.
    pub fn call_with(self, args: Vec<Arg>) -> Ex {
        let span = self.0.span;
        Ex(Spanned::new(
            Expr::Call {
                callee: boxed(self),
                args,
            },
            span,
        ))
    }

    fn binary(self, op: BinOp, rhs: impl Into<Ex>) -> Ex {
        let rhs = rhs.into();
        let span = self.0.span.merge(rhs.0.span);
        Ex(Spanned::new(
            Expr::Binary {
                op,
                lhs: boxed(self),
                rhs: boxed(rhs),
            },
            span,
        ))
    }

    fn unary(self, op: UnaryOp) -> Ex {
        let span = self.0.span;
        Ex(Spanned::new(
            Expr::Unary {
                op,
                operand: boxed(self),
            },
            span,
        ))
    }

    fn assign_op(self, op: AssignOp, value: impl Into<Ex>) -> Ex {
        let value = value.into();
        let span = self.0.span.merge(value.0.span);
        Ex(Spanned::new(
            Expr::Assign {
                op,
                target: boxed(self),
                value: boxed(value),
            },
            span,
        ))
    }

    pub fn equals(self, rhs: impl Into<Ex>) -> Ex {
        self.binary(BinOp::Eq, rhs)
    }
    pub fn not_equals(self, rhs: impl Into<Ex>) -> Ex {
        self.binary(BinOp::Ne, rhs)
    }
    pub fn lt(self, rhs: impl Into<Ex>) -> Ex {
        self.binary(BinOp::Lt, rhs)
    }
    pub fn le(self, rhs: impl Into<Ex>) -> Ex {
        self.binary(BinOp::Le, rhs)
    }
    pub fn gt(self, rhs: impl Into<Ex>) -> Ex {
        self.binary(BinOp::Gt, rhs)
    }
    pub fn ge(self, rhs: impl Into<Ex>) -> Ex {
        self.binary(BinOp::Ge, rhs)
    }
    pub fn and(self, rhs: impl Into<Ex>) -> Ex {
        self.binary(BinOp::And, rhs)
    }
    pub fn or(self, rhs: impl Into<Ex>) -> Ex {
        self.binary(BinOp::Or, rhs)
    }

    pub fn assign(self, value: impl Into<Ex>) -> Ex {
        self.assign_op(AssignOp::Assign, value)
    }
    pub fn add_assign(self, value: impl Into<Ex>) -> Ex {
        self.assign_op(AssignOp::Compound(BinOp::Add), value)
    }
    pub fn sub_assign(self, value: impl Into<Ex>) -> Ex {
        self.assign_op(AssignOp::Compound(BinOp::Sub), value)
    }
    pub fn mul_assign(self, value: impl Into<Ex>) -> Ex {
        self.assign_op(AssignOp::Compound(BinOp::Mul), value)
    }
    pub fn div_assign(self, value: impl Into<Ex>) -> Ex {
        self.assign_op(AssignOp::Compound(BinOp::Div), value)
    }

    pub fn post_inc(self) -> Ex {
        self.unary(UnaryOp::PostInc)
    }
    pub fn post_dec(self) -> Ex {
        self.unary(UnaryOp::PostDec)
    }
    pub fn pre_inc(self) -> Ex {
        self.unary(UnaryOp::PreInc)
    }

    /// `cond ? then : otherwise`
    pub fn select(self, then: impl Into<Ex>, otherwise: impl Into<Ex>) -> Ex {
        let span = self.0.span;
        Ex(Spanned::new(
            Expr::Conditional {
                cond: boxed(self),
                then: boxed(then.into()),
                otherwise: boxed(otherwise.into()),
            },
            span,
        ))
    }

    pub fn paren(self) -> Ex {
        let span = self.0.span;
        Ex(Spanned::new(Expr::Paren(boxed(self)), span))
    }
}

macro_rules! binary_operators {
    ($($trait:ident :: $method:ident => $op:ident),* $(,)?) => {
        $(
            impl<R: Into<Ex>> ops::$trait<R> for Ex {
                type Output = Ex;
                fn $method(self, rhs: R) -> Ex {
                    self.binary(BinOp::$op, rhs)
                }
            }
        )*
    };
}

binary_operators! {
    Add::add => Add,
    Sub::sub => Sub,
    Mul::mul => Mul,
    Div::div => Div,
    Rem::rem => Rem,
    BitAnd::bitand => BitAnd,
    BitOr::bitor => BitOr,
    BitXor::bitxor => BitXor,
    Shl::shl => Shl,
    Shr::shr => Shr,
}

/// `2.0f32 * x` as well as `x * 2.0f32`.
macro_rules! scalar_lhs_operators {
    (@each $scalar:ty; $($trait:ident :: $method:ident => $op:ident),*) => {
        $(
            impl ops::$trait<Ex> for $scalar {
                type Output = Ex;
                fn $method(self, rhs: Ex) -> Ex {
                    Ex::from(self).binary(BinOp::$op, rhs)
                }
            }
        )*
    };
    ($($scalar:ty),*) => {
        $(
            scalar_lhs_operators!(@each $scalar;
                Add::add => Add, Sub::sub => Sub, Mul::mul => Mul, Div::div => Div, Rem::rem => Rem);
        )*
    };
}

scalar_lhs_operators!(f32, f64, i32, u32);

impl ops::Neg for Ex {
    type Output = Ex;
    fn neg(self) -> Ex {
        self.unary(UnaryOp::Neg)
    }
}

impl ops::Not for Ex {
    type Output = Ex;
    fn not(self) -> Ex {
        self.unary(UnaryOp::Not)
    }
}

impl From<f32> for Ex {
    fn from(v: f32) -> Self {
        lit(&format!("{:?}f", v))
    }
}

impl From<f64> for Ex {
    fn from(v: f64) -> Self {
        lit(&format!("{:?}d", v))
    }
}

impl From<i32> for Ex {
    fn from(v: i32) -> Self {
        lit(&v.to_string())
    }
}

impl From<u32> for Ex {
    fn from(v: u32) -> Self {
        lit(&format!("{}u", v))
    }
}

impl From<bool> for Ex {
    fn from(v: bool) -> Self {
        Ex::new(Expr::Literal(Literal::Bool(v)))
    }
}

impl From<Ex> for Arg {
    fn from(e: Ex) -> Self {
        Arg {
            mode: PassMode::Value,
            value: e.0,
        }
    }
}

impl From<St> for Spanned<Stmt> {
    fn from(s: St) -> Self {
        s.0
    }
}

// ─── Expressions ───────────────────────────────────────────────────

/// A numeric literal exactly as it would be written in host source.
pub fn lit(raw: &str) -> Ex {
    Ex::new(Expr::Literal(Literal::Number(raw.to_string())))
}

pub fn string(v: &str) -> Ex {
    Ex::new(Expr::Literal(Literal::Str(v.to_string())))
}

pub fn ident(name: &str) -> Ex {
    Ex::new(Expr::Ident(name.to_string()))
}

pub fn this() -> Ex {
    Ex::new(Expr::This)
}

/// `ThreadIds.<axis>` where axis is `X`, `Y` or `Z`.
pub fn thread_id(axis: &str) -> Ex {
    ident("ThreadIds").member(axis)
}

/// Member chain from a dotted path: `path("env.scale")`.
pub fn path(dotted: &str) -> Ex {
    let mut parts = dotted.split('.');
    let root = match parts.next() {
        Some("this") => this(),
        Some(first) => ident(first),
        None => ident(""),
    };
    parts.fold(root, |acc, part| acc.member(part))
}

/// Call a named function (local, static helper or captured function).
pub fn call(callee: &str, args: Vec<Ex>) -> Ex {
    path(callee).call(args)
}

/// Call an intrinsic on the `Hlsl` intrinsic class.
pub fn hlsl(intrinsic: &str, args: Vec<Ex>) -> Ex {
    ident("Hlsl").member(intrinsic).call(args)
}

pub fn new(ty: &str, args: Vec<Ex>) -> Ex {
    Ex::new(Expr::New {
        ty: name(ty),
        args: args.into_iter().map(|a| a.0).collect(),
    })
}

pub fn default(ty: &str) -> Ex {
    Ex::new(Expr::Default(name(ty)))
}

pub fn cast(ty: &str, e: impl Into<Ex>) -> Ex {
    Ex::new(Expr::Cast {
        ty: name(ty),
        expr: boxed(e.into()),
    })
}

pub fn opaque(what: &str) -> Ex {
    Ex::new(Expr::Opaque(what.to_string()))
}

// ─── Arguments ─────────────────────────────────────────────────────

pub fn by_ref(e: Ex) -> Arg {
    Arg {
        mode: PassMode::Ref,
        value: e.0,
    }
}

pub fn by_in(e: Ex) -> Arg {
    Arg {
        mode: PassMode::In,
        value: e.0,
    }
}

pub fn out(e: Ex) -> Arg {
    Arg {
        mode: PassMode::Out,
        value: e.0,
    }
}

/// `out T name` declared inline at the call site.
pub fn out_var(ty: &str, var: &str) -> Arg {
    Arg {
        mode: PassMode::Out,
        value: Spanned::dummy(Expr::OutDecl {
            ty: name(ty),
            name: name(var),
        }),
    }
}

// ─── Statements ────────────────────────────────────────────────────

fn stmt(s: Stmt) -> St {
    St(Spanned::dummy(s))
}

fn stmts(items: Vec<St>) -> Block {
    Block {
        stmts: items.into_iter().map(|s| s.0).collect(),
    }
}

pub fn block(items: Vec<St>) -> Block {
    stmts(items)
}

pub fn local(ty: &str, var: &str, init: impl Into<Ex>) -> St {
    let init = init.into();
    let span = init.0.span;
    St(Spanned::new(
        Stmt::Local {
            ty: name(ty),
            name: name(var),
            init: Some(init.0),
        },
        span,
    ))
}

pub fn declare(ty: &str, var: &str) -> St {
    stmt(Stmt::Local {
        ty: name(ty),
        name: name(var),
        init: None,
    })
}

pub fn expr(e: Ex) -> St {
    let span = e.0.span;
    St(Spanned::new(Stmt::Expr(e.0), span))
}

pub fn if_then(cond: Ex, then: Vec<St>) -> St {
    stmt(Stmt::If {
        cond: cond.0,
        then: stmts(then),
        otherwise: None,
    })
}

pub fn if_else(cond: Ex, then: Vec<St>, otherwise: Vec<St>) -> St {
    stmt(Stmt::If {
        cond: cond.0,
        then: stmts(then),
        otherwise: Some(stmts(otherwise)),
    })
}

pub fn for_loop(init: St, cond: Ex, step: Ex, body: Vec<St>) -> St {
    stmt(Stmt::For {
        init: vec![init.0],
        cond: Some(cond.0),
        step: vec![step.0],
        body: stmts(body),
    })
}

pub fn while_loop(cond: Ex, body: Vec<St>) -> St {
    stmt(Stmt::While {
        cond: cond.0,
        body: stmts(body),
    })
}

pub fn do_while(body: Vec<St>, cond: Ex) -> St {
    stmt(Stmt::DoWhile {
        body: stmts(body),
        cond: cond.0,
    })
}

pub fn ret(value: impl Into<Ex>) -> St {
    stmt(Stmt::Return(Some(value.into().0)))
}

pub fn ret_void() -> St {
    stmt(Stmt::Return(None))
}

pub fn brk() -> St {
    stmt(Stmt::Break)
}

pub fn cont() -> St {
    stmt(Stmt::Continue)
}

pub fn nested(items: Vec<St>) -> St {
    stmt(Stmt::Block(stmts(items)))
}

pub fn local_fn(def: FnDef) -> St {
    stmt(Stmt::LocalFunction(def))
}

pub fn opaque_stmt(what: &str) -> St {
    stmt(Stmt::Opaque(what.to_string()))
}

// ─── Functions ─────────────────────────────────────────────────────

pub fn param(ty: &str, var: &str) -> Param {
    Param {
        mode: PassMode::Value,
        ty: name(ty),
        name: name(var),
    }
}

pub fn param_ref(ty: &str, var: &str) -> Param {
    Param {
        mode: PassMode::Ref,
        ..param(ty, var)
    }
}

pub fn param_in(ty: &str, var: &str) -> Param {
    Param {
        mode: PassMode::In,
        ..param(ty, var)
    }
}

pub fn param_out(ty: &str, var: &str) -> Param {
    Param {
        mode: PassMode::Out,
        ..param(ty, var)
    }
}

/// A function with a return type (`None` for void).
pub fn func(fn_name: &str, params: Vec<Param>, return_ty: Option<&str>, body: Vec<St>) -> FnDef {
    FnDef {
        name: name(fn_name),
        params,
        return_ty: return_ty.map(name),
        body: stmts(body),
    }
}

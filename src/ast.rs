//! Restricted kernel-body AST.
//!
//! This is the boundary a `SourceExtractor` hands to the rewriter: a small,
//! static, allocation-free subset of expressions and statements. Host type
//! names are kept as written (`Float3`, `f32`, `ReadWriteBuffer`); mapping
//! them to dialect names is the rewriter's job.

use crate::span::Spanned;

pub mod build;

/// A host type name as written in the kernel body.
pub type TypeName = Spanned<String>;

/// Literal tokens. Numbers keep their raw text, suffix included.
#[derive(Clone, Debug, PartialEq)]
pub enum Literal {
    Number(String),
    Bool(bool),
    /// Strings have no dialect form; kept so they can be rejected with a span.
    Str(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
    BitNot,
    PreInc,
    PreDec,
    PostInc,
    PostDec,
}

impl UnaryOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::Not => "!",
            UnaryOp::BitNot => "~",
            UnaryOp::PreInc | UnaryOp::PostInc => "++",
            UnaryOp::PreDec | UnaryOp::PostDec => "--",
        }
    }

    pub fn is_postfix(&self) -> bool {
        matches!(self, UnaryOp::PostInc | UnaryOp::PostDec)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Shl,
    Shr,
    BitAnd,
    BitOr,
    BitXor,
    And,
    Or,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Rem => "%",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
            BinOp::BitAnd => "&",
            BinOp::BitOr => "|",
            BinOp::BitXor => "^",
            BinOp::And => "&&",
            BinOp::Or => "||",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
        }
    }

    /// C-family precedence; higher binds tighter.
    pub fn precedence(&self) -> u8 {
        match self {
            BinOp::Or => 3,
            BinOp::And => 4,
            BinOp::BitOr => 5,
            BinOp::BitXor => 6,
            BinOp::BitAnd => 7,
            BinOp::Eq | BinOp::Ne => 8,
            BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => 9,
            BinOp::Shl | BinOp::Shr => 10,
            BinOp::Add | BinOp::Sub => 11,
            BinOp::Mul | BinOp::Div | BinOp::Rem => 12,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssignOp {
    Assign,
    Compound(BinOp),
}

impl AssignOp {
    pub fn as_string(&self) -> String {
        match self {
            AssignOp::Assign => "=".to_string(),
            AssignOp::Compound(op) => format!("{}=", op.as_str()),
        }
    }
}

/// How a value is passed: by value or through one of the reference modes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum PassMode {
    #[default]
    Value,
    Ref,
    In,
    Out,
}

/// A call-site argument.
#[derive(Clone, Debug, PartialEq)]
pub struct Arg {
    pub mode: PassMode,
    pub value: Spanned<Expr>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Literal(Literal),
    Ident(String),
    /// The kernel instance itself (`this` / `self`).
    This,
    Member {
        target: Box<Spanned<Expr>>,
        member: Spanned<String>,
    },
    Index {
        target: Box<Spanned<Expr>>,
        index: Box<Spanned<Expr>>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Spanned<Expr>>,
    },
    Binary {
        op: BinOp,
        lhs: Box<Spanned<Expr>>,
        rhs: Box<Spanned<Expr>>,
    },
    Assign {
        op: AssignOp,
        target: Box<Spanned<Expr>>,
        value: Box<Spanned<Expr>>,
    },
    Conditional {
        cond: Box<Spanned<Expr>>,
        then: Box<Spanned<Expr>>,
        otherwise: Box<Spanned<Expr>>,
    },
    Call {
        callee: Box<Spanned<Expr>>,
        args: Vec<Arg>,
    },
    /// Constructor-style invocation: `new Float3(1, 2, 3)`.
    New {
        ty: TypeName,
        args: Vec<Spanned<Expr>>,
    },
    /// `default(T)`.
    Default(TypeName),
    Cast {
        ty: TypeName,
        expr: Box<Spanned<Expr>>,
    },
    /// Inline output declaration in argument position: `out float x`.
    OutDecl {
        ty: TypeName,
        name: Spanned<String>,
    },
    Paren(Box<Spanned<Expr>>),
    /// A construct the extractor saw but the dialect subset does not cover.
    Opaque(String),
}

#[derive(Clone, Debug, PartialEq, Default)]
pub struct Block {
    pub stmts: Vec<Spanned<Stmt>>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Stmt {
    Local {
        ty: TypeName,
        name: Spanned<String>,
        init: Option<Spanned<Expr>>,
    },
    Expr(Spanned<Expr>),
    If {
        cond: Spanned<Expr>,
        then: Block,
        otherwise: Option<Block>,
    },
    For {
        init: Vec<Spanned<Stmt>>,
        cond: Option<Spanned<Expr>>,
        step: Vec<Spanned<Expr>>,
        body: Block,
    },
    While {
        cond: Spanned<Expr>,
        body: Block,
    },
    DoWhile {
        body: Block,
        cond: Spanned<Expr>,
    },
    Break,
    Continue,
    Return(Option<Spanned<Expr>>),
    Block(Block),
    LocalFunction(FnDef),
    Opaque(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Param {
    pub mode: PassMode,
    pub ty: TypeName,
    pub name: Spanned<String>,
}

/// A function: entry body, static helper, local function or the target of
/// a stateless function reference.
#[derive(Clone, Debug, PartialEq)]
pub struct FnDef {
    pub name: Spanned<String>,
    pub params: Vec<Param>,
    pub return_ty: Option<TypeName>,
    pub body: Block,
}

impl Expr {
    /// Identifier chain of a member access (`a.b.c` → `["a", "b", "c"]`,
    /// `this.a` → `["this", "a"]`), or `None` if the root is not a name.
    pub fn access_path(&self) -> Option<Vec<String>> {
        match self {
            Expr::Ident(name) => Some(vec![name.clone()]),
            Expr::This => Some(vec!["this".to_string()]),
            Expr::Member { target, member } => {
                let mut path = target.node.access_path()?;
                path.push(member.node.clone());
                Some(path)
            }
            _ => None,
        }
    }
}

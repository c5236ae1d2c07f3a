use crate::ast::*;
use crate::span::Spanned;

use super::HASH_VERSION;

// ─── Serialization Format Tags ─────────────────────────────────────

pub(super) const TAG_FN_DEF: u8 = 0x01;
pub(super) const TAG_BLOCK: u8 = 0x02;
pub(super) const TAG_LOCAL: u8 = 0x03;
pub(super) const TAG_EXPR_STMT: u8 = 0x04;
pub(super) const TAG_IF: u8 = 0x05;
pub(super) const TAG_FOR: u8 = 0x06;
pub(super) const TAG_WHILE: u8 = 0x07;
pub(super) const TAG_DO_WHILE: u8 = 0x08;
pub(super) const TAG_BREAK: u8 = 0x09;
pub(super) const TAG_CONTINUE: u8 = 0x0A;
pub(super) const TAG_RETURN: u8 = 0x0B;
pub(super) const TAG_LOCAL_FN: u8 = 0x0C;
pub(super) const TAG_OPAQUE_STMT: u8 = 0x0D;

pub(super) const TAG_NUMBER: u8 = 0x20;
pub(super) const TAG_BOOL: u8 = 0x21;
pub(super) const TAG_STR: u8 = 0x22;
pub(super) const TAG_VAR: u8 = 0x23;
pub(super) const TAG_NAME: u8 = 0x24;
pub(super) const TAG_THIS: u8 = 0x25;
pub(super) const TAG_MEMBER: u8 = 0x26;
pub(super) const TAG_INDEX: u8 = 0x27;
pub(super) const TAG_UNARY: u8 = 0x28;
pub(super) const TAG_BINARY: u8 = 0x29;
pub(super) const TAG_ASSIGN: u8 = 0x2A;
pub(super) const TAG_CONDITIONAL: u8 = 0x2B;
pub(super) const TAG_CALL: u8 = 0x2C;
pub(super) const TAG_NEW: u8 = 0x2D;
pub(super) const TAG_DEFAULT: u8 = 0x2E;
pub(super) const TAG_CAST: u8 = 0x2F;
pub(super) const TAG_OUT_DECL: u8 = 0x30;
pub(super) const TAG_PAREN: u8 = 0x31;
pub(super) const TAG_OPAQUE_EXPR: u8 = 0x32;

// ─── De Bruijn Environment ─────────────────────────────────────────

/// Maps bound names (parameters, locals, local functions) to indices.
pub(super) struct DeBruijnEnv {
    /// Stack of bindings (most recent at end).
    bindings: Vec<String>,
}

impl DeBruijnEnv {
    pub(super) fn new() -> Self {
        Self {
            bindings: Vec::new(),
        }
    }

    /// Push a new binding, returning its index.
    pub(super) fn push(&mut self, name: &str) -> u16 {
        let idx = self.bindings.len() as u16;
        self.bindings.push(name.to_string());
        idx
    }

    /// Most recent binding of `name`.
    pub(super) fn lookup(&self, name: &str) -> Option<u16> {
        self.bindings.iter().rposition(|b| b == name).map(|i| i as u16)
    }

    pub(super) fn save(&self) -> usize {
        self.bindings.len()
    }

    pub(super) fn restore(&mut self, len: usize) {
        self.bindings.truncate(len);
    }
}

// ─── Normalizer ────────────────────────────────────────────────────

/// Normalize and serialize a function definition to bytes.
///
/// Same computation → same bytes: bound names are replaced with indices
/// and the function's own name is left out, so renaming a parameter, a
/// local or the function itself does not change the output.
pub struct Normalizer {
    pub(super) buf: Vec<u8>,
    pub(super) env: DeBruijnEnv,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Normalizer {
    pub fn new() -> Self {
        Self {
            buf: Vec::new(),
            env: DeBruijnEnv::new(),
        }
    }

    pub fn normalize_fn(&mut self, func: &FnDef) -> Vec<u8> {
        self.buf.clear();
        self.env = DeBruijnEnv::new();
        self.buf.push(HASH_VERSION);
        self.serialize_fn(func);
        self.buf.clone()
    }

    fn serialize_fn(&mut self, func: &FnDef) {
        let saved = self.env.save();
        self.write_u8(TAG_FN_DEF);
        self.write_u16(func.params.len() as u16);
        for param in &func.params {
            self.write_u8(param.mode as u8);
            self.write_str(&param.ty.node);
            self.env.push(&param.name.node);
        }
        match &func.return_ty {
            Some(ty) => {
                self.write_u8(1);
                self.write_str(&ty.node);
            }
            None => self.write_u8(0),
        }
        self.serialize_block(&func.body);
        self.env.restore(saved);
    }

    fn serialize_block(&mut self, block: &Block) {
        let saved = self.env.save();
        self.write_u8(TAG_BLOCK);
        self.write_u32(block.stmts.len() as u32);
        // Local functions are in scope for the whole block.
        for stmt in &block.stmts {
            if let Stmt::LocalFunction(def) = &stmt.node {
                self.env.push(&def.name.node);
            }
        }
        for stmt in &block.stmts {
            self.serialize_stmt(&stmt.node);
        }
        self.env.restore(saved);
    }

    fn serialize_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Local { ty, name, init } => {
                self.write_u8(TAG_LOCAL);
                self.write_str(&ty.node);
                self.serialize_opt_expr(init.as_ref());
                self.env.push(&name.node);
            }
            Stmt::Expr(e) => {
                self.write_u8(TAG_EXPR_STMT);
                self.serialize_expr(&e.node);
            }
            Stmt::If {
                cond,
                then,
                otherwise,
            } => {
                self.write_u8(TAG_IF);
                self.serialize_expr(&cond.node);
                self.serialize_block(then);
                match otherwise {
                    Some(block) => {
                        self.write_u8(1);
                        self.serialize_block(block);
                    }
                    None => self.write_u8(0),
                }
            }
            Stmt::For {
                init,
                cond,
                step,
                body,
            } => {
                let saved = self.env.save();
                self.write_u8(TAG_FOR);
                self.write_u16(init.len() as u16);
                for s in init {
                    self.serialize_stmt(&s.node);
                }
                self.serialize_opt_expr(cond.as_ref());
                self.write_u16(step.len() as u16);
                for e in step {
                    self.serialize_expr(&e.node);
                }
                self.serialize_block(body);
                self.env.restore(saved);
            }
            Stmt::While { cond, body } => {
                self.write_u8(TAG_WHILE);
                self.serialize_expr(&cond.node);
                self.serialize_block(body);
            }
            Stmt::DoWhile { body, cond } => {
                self.write_u8(TAG_DO_WHILE);
                self.serialize_block(body);
                self.serialize_expr(&cond.node);
            }
            Stmt::Break => self.write_u8(TAG_BREAK),
            Stmt::Continue => self.write_u8(TAG_CONTINUE),
            Stmt::Return(value) => {
                self.write_u8(TAG_RETURN);
                self.serialize_opt_expr(value.as_ref());
            }
            Stmt::Block(block) => self.serialize_block(block),
            Stmt::LocalFunction(def) => {
                self.write_u8(TAG_LOCAL_FN);
                self.serialize_fn(def);
            }
            Stmt::Opaque(what) => {
                self.write_u8(TAG_OPAQUE_STMT);
                self.write_str(what);
            }
        }
    }

    fn serialize_opt_expr(&mut self, e: Option<&Spanned<Expr>>) {
        match e {
            Some(e) => {
                self.write_u8(1);
                self.serialize_expr(&e.node);
            }
            None => self.write_u8(0),
        }
    }

    fn serialize_expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Literal(Literal::Number(raw)) => {
                self.write_u8(TAG_NUMBER);
                self.write_str(raw);
            }
            Expr::Literal(Literal::Bool(b)) => {
                self.write_u8(TAG_BOOL);
                self.write_u8(*b as u8);
            }
            Expr::Literal(Literal::Str(s)) => {
                self.write_u8(TAG_STR);
                self.write_str(s);
            }
            Expr::Ident(name) => match self.env.lookup(name) {
                Some(idx) => {
                    self.write_u8(TAG_VAR);
                    self.write_u16(idx);
                }
                None => {
                    self.write_u8(TAG_NAME);
                    self.write_str(name);
                }
            },
            Expr::This => self.write_u8(TAG_THIS),
            Expr::Member { target, member } => {
                self.write_u8(TAG_MEMBER);
                self.serialize_expr(&target.node);
                self.write_str(&member.node);
            }
            Expr::Index { target, index } => {
                self.write_u8(TAG_INDEX);
                self.serialize_expr(&target.node);
                self.serialize_expr(&index.node);
            }
            Expr::Unary { op, operand } => {
                self.write_u8(TAG_UNARY);
                self.write_u8(*op as u8);
                self.serialize_expr(&operand.node);
            }
            Expr::Binary { op, lhs, rhs } => {
                self.write_u8(TAG_BINARY);
                self.write_u8(*op as u8);
                self.serialize_expr(&lhs.node);
                self.serialize_expr(&rhs.node);
            }
            Expr::Assign { op, target, value } => {
                self.write_u8(TAG_ASSIGN);
                match op {
                    AssignOp::Assign => self.write_u8(0),
                    AssignOp::Compound(bin) => self.write_u8(1 + *bin as u8),
                }
                self.serialize_expr(&target.node);
                self.serialize_expr(&value.node);
            }
            Expr::Conditional {
                cond,
                then,
                otherwise,
            } => {
                self.write_u8(TAG_CONDITIONAL);
                self.serialize_expr(&cond.node);
                self.serialize_expr(&then.node);
                self.serialize_expr(&otherwise.node);
            }
            Expr::Call { callee, args } => {
                self.write_u8(TAG_CALL);
                self.serialize_expr(&callee.node);
                self.write_u16(args.len() as u16);
                for arg in args {
                    self.write_u8(arg.mode as u8);
                    self.serialize_expr(&arg.value.node);
                }
            }
            Expr::New { ty, args } => {
                self.write_u8(TAG_NEW);
                self.write_str(&ty.node);
                self.write_u16(args.len() as u16);
                for arg in args {
                    self.serialize_expr(&arg.node);
                }
            }
            Expr::Default(ty) => {
                self.write_u8(TAG_DEFAULT);
                self.write_str(&ty.node);
            }
            Expr::Cast { ty, expr } => {
                self.write_u8(TAG_CAST);
                self.write_str(&ty.node);
                self.serialize_expr(&expr.node);
            }
            Expr::OutDecl { ty, name } => {
                self.write_u8(TAG_OUT_DECL);
                self.write_str(&ty.node);
                self.env.push(&name.node);
            }
            Expr::Paren(inner) => {
                self.write_u8(TAG_PAREN);
                self.serialize_expr(&inner.node);
            }
            Expr::Opaque(what) => {
                self.write_u8(TAG_OPAQUE_EXPR);
                self.write_str(what);
            }
        }
    }

    // ─── Serialization Helpers ─────────────────────────────────

    pub(super) fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub(super) fn write_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub(super) fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub(super) fn write_str(&mut self, s: &str) {
        self.write_u32(s.len() as u32);
        self.buf.extend_from_slice(s.as_bytes());
    }
}

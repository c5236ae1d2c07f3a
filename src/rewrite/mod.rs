//! Kernel-body rewriting into HLSL.
//!
//! The rewriter walks the restricted AST of an entry body (or of a helper
//! function) and produces dialect text. Everything it reaches on the way
//! (static helpers, static constants, hoisted local functions) is collected
//! into the returned [`Translation`] instead of global state.
//!
//! Name resolution is scoped. Which names a function may see depends on
//! what it is:
//!
//! | function            | members | `ThreadIds` | statics | local fns |
//! |---------------------|---------|-------------|---------|-----------|
//! | entry body          | yes     | yes         | yes     | yes       |
//! | its local functions | yes     | no          | yes     | yes       |
//! | static helper       | no      | no          | yes     | yes       |
//! | function reference  | no      | no          | no      | yes       |
//!
//! An identifier nothing resolves is a translation error; nothing is ever
//! passed through unchecked.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::ast::*;
use crate::diagnostic::Diagnostic;
use crate::error::{Error, Result};
use crate::kernel::classify::{CapturedMember, Category};
use crate::kernel::{SourceExtractor, StaticConstant};
use crate::span::{Span, Spanned};
use crate::types::dialect_type_name;

pub mod intrinsics;
pub mod keywords;

use intrinsics::INTRINSIC_CLASS;

/// Name of the generated entry point.
pub const ENTRY_POINT: &str = "Execute";

/// Host name of the dispatch thread id, also the entry parameter name.
pub const THREAD_IDS: &str = "ThreadIds";

const INDENT: &str = "    ";

const ASSIGN: u8 = 1;
const CONDITIONAL: u8 = 2;
const UNARY: u8 = 13;
const PRIMARY: u8 = 14;

// ─── Output ────────────────────────────────────────────────────────

/// A top-level dialect function produced by the rewriter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HelperFunction {
    pub name: String,
    /// Signature without a trailing `;`, used for forward declarations.
    pub prototype: String,
    /// Full definition, no trailing newline.
    pub text: String,
}

/// `static const T Owner__Name = value;`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConstantDecl {
    pub name: String,
    pub text: String,
}

/// Result of rewriting one entry body or one function reference target.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Translation {
    /// Entry body lines, indented relative to the body itself.
    pub body: Vec<String>,
    /// Helpers in emission order.
    pub helpers: Vec<HelperFunction>,
    /// Static constants, dependencies first.
    pub constants: Vec<ConstantDecl>,
    /// Host paths of every static function and constant reached, in
    /// discovery order.
    pub references: Vec<String>,
    /// Every top-level name the translation occupies.
    pub names: BTreeSet<String>,
}

// ─── Public API ────────────────────────────────────────────────────

/// Rewrite a kernel's entry body and everything it transitively references.
pub fn rewrite_entry(source: &dyn SourceExtractor, members: &[CapturedMember]) -> Result<Translation> {
    let mut cx = Collector::new(Some(source), members, BTreeSet::new());
    let mut body = Vec::new();
    Rewriter::new(&mut cx, Access::ENTRY, ENTRY_POINT.to_string(), Vec::new()).entry(
        source.entry(),
        &mut body,
    )?;
    cx.check_recursion()?;
    Ok(cx.finish(body, Vec::new()))
}

/// Rewrite the target of a stateless function reference as the helper
/// `name`. `reserved` holds the top-level names already taken by the rest
/// of the program; hoisted local functions are renamed around them.
pub fn rewrite_function(def: &FnDef, name: &str, reserved: &BTreeSet<String>) -> Result<Translation> {
    let mut cx = Collector::new(None, &[], reserved.clone());
    cx.names.insert(name.to_string());
    let helper = Rewriter::new(&mut cx, Access::ISOLATED, name.to_string(), Vec::new()).function(def)?;
    cx.check_recursion()?;
    Ok(cx.finish(Vec::new(), vec![helper]))
}

/// Drop a host numeric-literal type suffix (`1.5f`, `10u`, `3L`, `2.0d`).
/// Hex literals only lose integer suffixes, since `d` and `f` are digits.
pub fn strip_literal_suffix(raw: &str) -> &str {
    let digits = raw.trim_start_matches('-');
    if digits.starts_with("0x") || digits.starts_with("0X") {
        raw.trim_end_matches(|c: char| matches!(c, 'u' | 'U' | 'l' | 'L'))
    } else {
        raw.trim_end_matches(|c: char| {
            matches!(c, 'f' | 'F' | 'd' | 'D' | 'm' | 'M' | 'u' | 'U' | 'l' | 'L')
        })
    }
}

/// Dialect spelling of a vector swizzle (`XY` → `xy`), if `name` is one.
/// Either case is accepted, but not mixed within one swizzle.
pub fn swizzle(name: &str) -> Option<String> {
    let within = |set: &str| name.chars().all(|c| set.contains(c));
    let valid = (1..=4).contains(&name.len()) && ["XYZW", "xyzw", "RGBA", "rgba"].into_iter().any(within);
    valid.then(|| name.to_ascii_lowercase())
}

// ─── Collector ─────────────────────────────────────────────────────

/// What a function being rewritten is allowed to see.
#[derive(Clone, Copy, Debug)]
struct Access {
    members: bool,
    thread_ids: bool,
    statics: bool,
}

impl Access {
    const ENTRY: Access = Access {
        members: true,
        thread_ids: true,
        statics: true,
    };
    const STATIC: Access = Access {
        members: false,
        thread_ids: false,
        statics: true,
    };
    const ISOLATED: Access = Access {
        members: false,
        thread_ids: false,
        statics: false,
    };

    /// Access of a local function declared inside this one.
    fn nested(self) -> Access {
        Access {
            thread_ids: false,
            ..self
        }
    }

    fn describe(self) -> &'static str {
        if self.thread_ids {
            "the kernel body"
        } else if self.members {
            "a local function"
        } else if self.statics {
            "a static helper"
        } else {
            "a function reference"
        }
    }
}

struct CallEdge {
    from: String,
    to: String,
    span: Span,
}

/// State shared by every function rewritten for one translation.
struct Collector<'a> {
    source: Option<&'a dyn SourceExtractor>,
    members: HashMap<Vec<String>, &'a CapturedMember>,
    /// Strict prefixes of nested member paths (`env`, `env.inner`).
    closure_scopes: HashSet<Vec<String>>,
    names: BTreeSet<String>,
    /// Host path → emitted name, for statics already rewritten or underway.
    statics: HashMap<String, String>,
    references: Vec<String>,
    static_helpers: Vec<HelperFunction>,
    local_helpers: Vec<HelperFunction>,
    constants: Vec<ConstantDecl>,
    calls: Vec<CallEdge>,
}

impl<'a> Collector<'a> {
    fn new(
        source: Option<&'a dyn SourceExtractor>,
        members: &'a [CapturedMember],
        mut names: BTreeSet<String>,
    ) -> Self {
        let mut by_path = HashMap::new();
        let mut closure_scopes = HashSet::new();
        for member in members {
            let path = member.access_path();
            for len in 1..path.len() {
                closure_scopes.insert(path[..len].to_vec());
            }
            names.insert(member.dialect_name.clone());
            by_path.insert(path, member);
        }
        names.insert(ENTRY_POINT.to_string());
        Self {
            source,
            members: by_path,
            closure_scopes,
            names,
            statics: HashMap::new(),
            references: Vec::new(),
            static_helpers: Vec::new(),
            local_helpers: Vec::new(),
            constants: Vec::new(),
            calls: Vec::new(),
        }
    }

    /// Claim a top-level name derived from `base`.
    fn fresh_name(&mut self, base: &str) -> String {
        let base = keywords::escape(base);
        let mut name = base.clone();
        let mut n = 1;
        while self.names.contains(&name) {
            name = format!("{}_{}", base, n);
            n += 1;
        }
        self.names.insert(name.clone());
        name
    }

    fn call(&mut self, from: &str, to: &str, span: Span) {
        self.calls.push(CallEdge {
            from: from.to_string(),
            to: to.to_string(),
            span,
        });
    }

    /// Reject recursion anywhere in the collected call graph.
    fn check_recursion(&self) -> Result<()> {
        let mut graph: HashMap<&str, Vec<(&str, Span)>> = HashMap::new();
        let mut order: Vec<&str> = Vec::new();
        for edge in &self.calls {
            if !graph.contains_key(edge.from.as_str()) {
                order.push(&edge.from);
            }
            graph
                .entry(edge.from.as_str())
                .or_default()
                .push((edge.to.as_str(), edge.span));
        }

        // 0 = unvisited, 1 = on the stack, 2 = done
        let mut state: HashMap<&str, u8> = HashMap::new();
        for start in order {
            if state.get(start).copied().unwrap_or(0) != 0 {
                continue;
            }
            let mut path = Vec::new();
            if let Some(span) = dfs_cycle(start, &graph, &mut state, &mut path) {
                // Drop the acyclic lead-in: the path ends where the cycle closes.
                let closing = path.last().copied().unwrap_or(start);
                let from = path.iter().position(|n| *n == closing).unwrap_or(0);
                return Err(Error::Translation(
                    Diagnostic::error(
                        format!("recursive call cycle detected: {}", path[from..].join(" -> ")),
                        span,
                    )
                    .with_help("the dialect has no recursion; rewrite the helper as a loop"),
                ));
            }
        }
        Ok(())
    }

    fn finish(self, body: Vec<String>, primary: Vec<HelperFunction>) -> Translation {
        let mut helpers = primary;
        helpers.extend(self.static_helpers);
        helpers.extend(self.local_helpers);
        Translation {
            body,
            helpers,
            constants: self.constants,
            references: self.references,
            names: self.names,
        }
    }
}

/// Depth-first search for a back edge; returns the span of the call that
/// closes the cycle, leaving the cycle in `path`.
fn dfs_cycle<'g>(
    node: &'g str,
    graph: &HashMap<&'g str, Vec<(&'g str, Span)>>,
    state: &mut HashMap<&'g str, u8>,
    path: &mut Vec<&'g str>,
) -> Option<Span> {
    state.insert(node, 1);
    path.push(node);
    if let Some(callees) = graph.get(node) {
        for &(callee, span) in callees {
            match state.get(callee).copied().unwrap_or(0) {
                1 => {
                    path.push(callee);
                    return Some(span);
                }
                0 => {
                    if let Some(span) = dfs_cycle(callee, graph, state, path) {
                        return Some(span);
                    }
                }
                _ => {}
            }
        }
    }
    path.pop();
    state.insert(node, 2);
    None
}

// ─── Rewriter ──────────────────────────────────────────────────────

#[derive(Clone, Debug)]
enum Binding {
    Var(String),
    LocalFn(String),
}

struct Rewriter<'c, 'a> {
    cx: &'c mut Collector<'a>,
    access: Access,
    /// Emitted name of the function being rewritten.
    current: String,
    scopes: Vec<HashMap<String, Binding>>,
    /// `out` declarations hoisted out of the statement being rewritten.
    pending: Vec<String>,
}

fn fail<T>(message: impl Into<String>, span: Span) -> Result<T> {
    Err(Error::translation(message, span))
}

fn line(out: &mut Vec<String>, depth: usize, text: impl AsRef<str>) {
    out.push(format!("{}{}", INDENT.repeat(depth), text.as_ref()));
}

fn precedence(e: &Expr) -> u8 {
    match e {
        Expr::Assign { .. } => ASSIGN,
        Expr::Conditional { .. } => CONDITIONAL,
        Expr::Binary { op, .. } => op.precedence(),
        Expr::Unary { .. } | Expr::Cast { .. } | Expr::Default(_) => UNARY,
        Expr::Literal(Literal::Number(raw)) if raw.starts_with('-') => UNARY,
        _ => PRIMARY,
    }
}

fn param_prefix(mode: PassMode) -> &'static str {
    match mode {
        PassMode::Value => "",
        PassMode::Ref => "inout ",
        PassMode::In => "in ",
        PassMode::Out => "out ",
    }
}

impl<'c, 'a> Rewriter<'c, 'a> {
    fn new(
        cx: &'c mut Collector<'a>,
        access: Access,
        current: String,
        scopes: Vec<HashMap<String, Binding>>,
    ) -> Self {
        Self {
            cx,
            access,
            current,
            scopes,
            pending: Vec::new(),
        }
    }

    fn lookup(&self, name: &str) -> Option<&Binding> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }

    fn declare_var(&mut self, host: &str) -> String {
        let emitted = keywords::escape(host);
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(host.to_string(), Binding::Var(emitted.clone()));
        }
        emitted
    }

    /// Local functions visible from here, for a nested function's scope.
    fn visible_functions(&self) -> Vec<HashMap<String, Binding>> {
        let mut visible = HashMap::new();
        for scope in &self.scopes {
            for (name, binding) in scope {
                if let Binding::LocalFn(_) = binding {
                    visible.insert(name.clone(), binding.clone());
                }
            }
        }
        vec![visible]
    }

    fn map_type(&self, ty: &TypeName) -> Result<String> {
        dialect_type_name(&ty.node).ok_or_else(|| Error::UnsupportedType {
            name: ty.node.clone(),
            span: ty.span,
        })
    }

    fn flush(&mut self, out: &mut Vec<String>, depth: usize) {
        for decl in self.pending.drain(..) {
            line(out, depth, decl);
        }
    }

    // ─── Functions ─────────────────────────────────────────────

    fn entry(mut self, body: &Block, out: &mut Vec<String>) -> Result<()> {
        self.block_stmts(body, out, 0)
    }

    fn function(mut self, def: &FnDef) -> Result<HelperFunction> {
        let ret = match &def.return_ty {
            Some(ty) => self.map_type(ty)?,
            None => "void".to_string(),
        };
        self.scopes.push(HashMap::new());
        let mut params = Vec::with_capacity(def.params.len());
        for param in &def.params {
            let ty = self.map_type(&param.ty)?;
            let name = self.declare_var(&param.name.node);
            params.push(format!("{}{} {}", param_prefix(param.mode), ty, name));
        }
        let mut body = Vec::new();
        self.block_stmts(&def.body, &mut body, 1)?;
        self.scopes.pop();

        let prototype = format!("{} {}({})", ret, self.current, params.join(", "));
        let mut text = format!("{}\n{{\n", prototype);
        for l in &body {
            text.push_str(l);
            text.push('\n');
        }
        text.push('}');
        Ok(HelperFunction {
            name: self.current,
            prototype,
            text,
        })
    }

    /// Local functions are visible throughout their block, so they are
    /// named before anything else in the block is rewritten.
    fn hoist_local_functions(&mut self, block: &Block) -> Result<()> {
        let defs: Vec<&FnDef> = block
            .stmts
            .iter()
            .filter_map(|s| match &s.node {
                Stmt::LocalFunction(def) => Some(def),
                _ => None,
            })
            .collect();
        if defs.is_empty() {
            return Ok(());
        }

        let mut emitted = Vec::with_capacity(defs.len());
        for def in &defs {
            let name = self.cx.fresh_name(&def.name.node);
            if let Some(scope) = self.scopes.last_mut() {
                scope.insert(def.name.node.clone(), Binding::LocalFn(name.clone()));
            }
            emitted.push(name);
        }
        for (def, name) in defs.into_iter().zip(emitted) {
            let visible = self.visible_functions();
            let helper = Rewriter::new(&mut *self.cx, self.access.nested(), name, visible).function(def)?;
            self.cx.local_helpers.push(helper);
        }
        Ok(())
    }

    // ─── Statements ────────────────────────────────────────────

    fn block_stmts(&mut self, block: &Block, out: &mut Vec<String>, depth: usize) -> Result<()> {
        self.scopes.push(HashMap::new());
        self.hoist_local_functions(block)?;
        for stmt in &block.stmts {
            self.stmt(stmt, out, depth)?;
        }
        self.scopes.pop();
        Ok(())
    }

    fn braced(&mut self, block: &Block, out: &mut Vec<String>, depth: usize) -> Result<()> {
        line(out, depth, "{");
        self.block_stmts(block, out, depth + 1)?;
        line(out, depth, "}");
        Ok(())
    }

    fn stmt(&mut self, stmt: &Spanned<Stmt>, out: &mut Vec<String>, depth: usize) -> Result<()> {
        match &stmt.node {
            Stmt::Local { ty, name, init } => {
                let decl = self.local(ty, name, init.as_ref())?;
                self.flush(out, depth);
                line(out, depth, format!("{};", decl));
            }
            Stmt::Expr(e) => {
                let text = self.expr(e)?;
                self.flush(out, depth);
                line(out, depth, format!("{};", text));
            }
            Stmt::If {
                cond,
                then,
                otherwise,
            } => {
                let cond = self.expr(cond)?;
                self.flush(out, depth);
                line(out, depth, format!("if ({})", cond));
                self.braced(then, out, depth)?;
                if let Some(otherwise) = otherwise {
                    line(out, depth, "else");
                    self.braced(otherwise, out, depth)?;
                }
            }
            Stmt::For {
                init,
                cond,
                step,
                body,
            } => {
                self.scopes.push(HashMap::new());
                let init = self.for_init(init, stmt.span)?;
                let cond = match cond {
                    Some(c) => format!(" {}", self.expr(c)?),
                    None => String::new(),
                };
                let mut steps = Vec::with_capacity(step.len());
                for s in step {
                    steps.push(self.expr(s)?);
                }
                let step = if steps.is_empty() {
                    String::new()
                } else {
                    format!(" {}", steps.join(", "))
                };
                self.flush(out, depth);
                line(out, depth, format!("for ({};{};{})", init, cond, step));
                self.braced(body, out, depth)?;
                self.scopes.pop();
            }
            Stmt::While { cond, body } => {
                let cond = self.expr(cond)?;
                self.flush(out, depth);
                line(out, depth, format!("while ({})", cond));
                self.braced(body, out, depth)?;
            }
            Stmt::DoWhile { body, cond } => {
                let cond = self.expr(cond)?;
                self.flush(out, depth);
                line(out, depth, "do");
                self.braced(body, out, depth)?;
                line(out, depth, format!("while ({});", cond));
            }
            Stmt::Break => line(out, depth, "break;"),
            Stmt::Continue => line(out, depth, "continue;"),
            Stmt::Return(value) => match value {
                Some(v) => {
                    let text = self.expr(v)?;
                    self.flush(out, depth);
                    line(out, depth, format!("return {};", text));
                }
                None => line(out, depth, "return;"),
            },
            Stmt::Block(block) => self.braced(block, out, depth)?,
            // Emitted as a top-level helper by `hoist_local_functions`.
            Stmt::LocalFunction(_) => {}
            Stmt::Opaque(what) => return fail(format!("unsupported statement: {}", what), stmt.span),
        }
        Ok(())
    }

    fn local(&mut self, ty: &TypeName, name: &Spanned<String>, init: Option<&Spanned<Expr>>) -> Result<String> {
        let ty = self.map_type(ty)?;
        let init = match init {
            Some(e) => Some(self.expr(e)?),
            None => None,
        };
        let name = self.declare_var(&name.node);
        Ok(match init {
            Some(value) => format!("{} {} = {}", ty, name, value),
            None => format!("{} {}", ty, name),
        })
    }

    fn for_init(&mut self, init: &[Spanned<Stmt>], span: Span) -> Result<String> {
        match init {
            [] => Ok(String::new()),
            [Spanned {
                node: Stmt::Local { ty, name, init },
                ..
            }] => self.local(ty, name, init.as_ref()),
            items => {
                let mut parts = Vec::with_capacity(items.len());
                for item in items {
                    match &item.node {
                        Stmt::Expr(e) => parts.push(self.expr(e)?),
                        _ => {
                            return fail(
                                "a for-loop initializer is one declaration or a list of expressions",
                                span,
                            )
                        }
                    }
                }
                Ok(parts.join(", "))
            }
        }
    }

    // ─── Expressions ───────────────────────────────────────────

    /// Rewrite `e`, parenthesized if it binds looser than `min`.
    fn operand(&mut self, e: &Spanned<Expr>, min: u8) -> Result<String> {
        let text = self.expr(e)?;
        if precedence(&e.node) < min {
            Ok(format!("({})", text))
        } else {
            Ok(text)
        }
    }

    fn expr(&mut self, e: &Spanned<Expr>) -> Result<String> {
        match &e.node {
            Expr::Literal(lit) => literal(lit, e.span),
            Expr::Ident(name) => self.ident(name, e.span),
            Expr::This => fail(format!("`this` cannot be used as a value in {}", self.access.describe()), e.span),
            Expr::Member { target, member } => self.member(e, target, member),
            Expr::Index { target, index } => {
                let target = self.operand(target, PRIMARY)?;
                let index = self.expr(index)?;
                Ok(format!("{}[{}]", target, index))
            }
            Expr::Unary { op, operand } => {
                let inner = self.operand(operand, PRIMARY)?;
                if op.is_postfix() {
                    Ok(format!("{}{}", inner, op.as_str()))
                } else {
                    Ok(format!("{}{}", op.as_str(), inner))
                }
            }
            Expr::Binary { op, lhs, rhs } => {
                let prec = op.precedence();
                let lhs = self.operand(lhs, prec)?;
                let rhs = self.operand(rhs, prec + 1)?;
                Ok(format!("{} {} {}", lhs, op.as_str(), rhs))
            }
            Expr::Assign { op, target, value } => {
                let target = self.expr(target)?;
                let value = self.operand(value, ASSIGN)?;
                Ok(format!("{} {} {}", target, op.as_string(), value))
            }
            Expr::Conditional {
                cond,
                then,
                otherwise,
            } => {
                let cond = self.operand(cond, CONDITIONAL + 1)?;
                let then = self.operand(then, CONDITIONAL)?;
                let otherwise = self.operand(otherwise, CONDITIONAL)?;
                Ok(format!("{} ? {} : {}", cond, then, otherwise))
            }
            Expr::Call { callee, args } => self.call(callee, args),
            Expr::New { ty, args } => {
                let ty = self.map_type(ty)?;
                let mut parts = Vec::with_capacity(args.len());
                for arg in args {
                    parts.push(self.operand(arg, ASSIGN)?);
                }
                Ok(format!("{}({})", ty, parts.join(", ")))
            }
            Expr::Default(ty) => Ok(format!("({})0", self.map_type(ty)?)),
            Expr::Cast { ty, expr } => {
                let ty = self.map_type(ty)?;
                let inner = self.operand(expr, UNARY)?;
                Ok(format!("({}){}", ty, inner))
            }
            Expr::OutDecl { .. } => fail("an inline `out` declaration is only valid as a call argument", e.span),
            Expr::Paren(inner) => Ok(format!("({})", self.expr(inner)?)),
            Expr::Opaque(what) => fail(format!("unsupported expression: {}", what), e.span),
        }
    }

    fn ident(&mut self, name: &str, span: Span) -> Result<String> {
        match self.lookup(name) {
            Some(Binding::Var(emitted)) => return Ok(emitted.clone()),
            Some(Binding::LocalFn(_)) => {
                return fail(format!("local function `{}` can only be called", name), span)
            }
            None => {}
        }
        if let Some(text) = self.resolve_global(&[name.to_string()], false, span)? {
            return Ok(text);
        }
        if name == THREAD_IDS {
            if self.access.thread_ids {
                return Ok(THREAD_IDS.to_string());
            }
            return fail(
                format!("`{}` is only available in the kernel body, not in {}", THREAD_IDS, self.access.describe()),
                span,
            );
        }
        if name == INTRINSIC_CLASS {
            return fail(format!("`{}` intrinsics can only be called", INTRINSIC_CLASS), span);
        }
        fail(format!("unresolved identifier `{}`", name), span)
    }

    /// Resolve a whole access path to a kernel member or static constant.
    /// `Ok(None)` means the path is not global as a whole and the caller
    /// should rewrite it piecewise.
    fn resolve_global(&mut self, path: &[String], explicit_this: bool, span: Span) -> Result<Option<String>> {
        let dotted = path.join(".");
        let is_member = self.cx.members.contains_key(path);
        let is_scope = self.cx.closure_scopes.contains(path);
        if self.access.members {
            if let Some(member) = self.cx.members.get(path) {
                if member.category == Category::StatelessFunctionRef {
                    return fail(format!("function member `{}` can only be called", dotted), span);
                }
                return Ok(Some(member.dialect_name.clone()));
            }
            if is_scope {
                return fail(
                    format!("closure scope `{}` cannot be used as a value; access one of its captured fields", dotted),
                    span,
                );
            }
        } else if is_member || is_scope || explicit_this {
            return fail(
                format!("kernel member `{}` is not accessible from {}", dotted, self.access.describe()),
                span,
            );
        }
        if explicit_this || !self.access.statics {
            return Ok(None);
        }
        let Some(source) = self.cx.source else {
            return Ok(None);
        };
        if let Some(constant) = source.lookup_static_constant(&dotted) {
            return self.static_constant(&dotted, constant, span).map(Some);
        }
        if source.lookup_static_function(&dotted).is_some() {
            return fail(format!("static function `{}` can only be called", dotted), span);
        }
        Ok(None)
    }

    fn member(&mut self, e: &Spanned<Expr>, target: &Spanned<Expr>, member: &Spanned<String>) -> Result<String> {
        if let Some(path) = e.node.access_path() {
            let explicit = path[0] == "this";
            if explicit && !self.access.members {
                return fail(format!("`this` is not available in {}", self.access.describe()), e.span);
            }
            if explicit || self.lookup(&path[0]).is_none() {
                let rest = if explicit { &path[1..] } else { &path[..] };
                if let Some(text) = self.resolve_global(rest, explicit, e.span)? {
                    return Ok(text);
                }
                if explicit && rest.len() == 1 {
                    return fail(format!("kernel has no member `{}`", rest[0]), e.span);
                }
                if !explicit && rest.len() == 2 && rest[0] == INTRINSIC_CLASS {
                    return fail(format!("intrinsic `{}` can only be called", rest.join(".")), e.span);
                }
            }
        }
        let target = self.operand(target, PRIMARY)?;
        match swizzle(&member.node) {
            Some(s) => Ok(format!("{}.{}", target, s)),
            None => fail(
                format!("member `{}` has no dialect equivalent", member.node),
                if member.span.is_dummy() { e.span } else { member.span },
            ),
        }
    }

    fn call(&mut self, callee: &Spanned<Expr>, args: &[Arg]) -> Result<String> {
        let name = self.callee(callee)?;
        let mut parts = Vec::with_capacity(args.len());
        for arg in args {
            parts.push(self.argument(arg)?);
        }
        Ok(format!("{}({})", name, parts.join(", ")))
    }

    /// Call-site modes are dropped: the callee's parameter declares them.
    fn argument(&mut self, arg: &Arg) -> Result<String> {
        match &arg.value.node {
            Expr::OutDecl { ty, name } => {
                if arg.mode != PassMode::Out {
                    return fail("an inline declaration must be passed as `out`", arg.value.span);
                }
                let ty = self.map_type(ty)?;
                let var = self.declare_var(&name.node);
                self.pending.push(format!("{} {} = ({})0;", ty, var, ty));
                Ok(var)
            }
            _ => self.operand(&arg.value, ASSIGN),
        }
    }

    fn callee(&mut self, callee: &Spanned<Expr>) -> Result<String> {
        let span = callee.span;
        let Some(path) = callee.node.access_path() else {
            return fail("only named functions can be called", span);
        };
        let explicit = path[0] == "this";
        if explicit && !self.access.members {
            return fail(format!("`this` is not available in {}", self.access.describe()), span);
        }
        let rest: &[String] = if explicit { &path[1..] } else { &path[..] };
        let dotted = rest.join(".");

        if !explicit {
            match self.lookup(&rest[0]) {
                Some(Binding::LocalFn(name)) if rest.len() == 1 => {
                    let name = name.clone();
                    self.cx.call(&self.current, &name, span);
                    return Ok(name);
                }
                Some(_) => return fail(format!("`{}` is not a function", dotted), span),
                None => {}
            }
            if rest.len() == 2 && rest[0] == INTRINSIC_CLASS {
                return match intrinsics::lookup(&rest[1]) {
                    Some(name) => Ok(name.to_string()),
                    None => fail(format!("unknown intrinsic `{}`", dotted), span),
                };
            }
        }

        if let Some(member) = self.cx.members.get(rest) {
            if !self.access.members {
                return fail(
                    format!("kernel member `{}` is not accessible from {}", dotted, self.access.describe()),
                    span,
                );
            }
            if member.category != Category::StatelessFunctionRef {
                return fail(format!("member `{}` is not a function", dotted), span);
            }
            return Ok(member.dialect_name.clone());
        }
        if explicit {
            return fail(format!("kernel has no member `{}`", dotted), span);
        }
        if self.access.statics {
            if let Some(def) = self.cx.source.and_then(|s| s.lookup_static_function(&dotted)) {
                return self.static_function(&dotted, def, span);
            }
        }
        fail(format!("call to unknown function `{}`", dotted), span)
    }

    // ─── Statics ───────────────────────────────────────────────

    fn static_function(&mut self, dotted: &str, def: &FnDef, span: Span) -> Result<String> {
        if let Some(name) = self.cx.statics.get(dotted).cloned() {
            self.cx.call(&self.current, &name, span);
            return Ok(name);
        }
        let name = self.cx.fresh_name(&dotted.replace('.', "__"));
        self.cx.statics.insert(dotted.to_string(), name.clone());
        self.cx.references.push(dotted.to_string());
        self.cx.call(&self.current, &name, span);
        let helper = Rewriter::new(&mut *self.cx, Access::STATIC, name.clone(), Vec::new()).function(def)?;
        self.cx.static_helpers.push(helper);
        Ok(name)
    }

    fn static_constant(&mut self, dotted: &str, constant: &StaticConstant, span: Span) -> Result<String> {
        if let Some(name) = self.cx.statics.get(dotted).cloned() {
            self.cx.call(&self.current, &name, span);
            return Ok(name);
        }
        let name = self.cx.fresh_name(&dotted.replace('.', "__"));
        self.cx.statics.insert(dotted.to_string(), name.clone());
        self.cx.references.push(dotted.to_string());
        self.cx.call(&self.current, &name, span);

        let mut inner = Rewriter::new(&mut *self.cx, Access::STATIC, name.clone(), Vec::new());
        let ty = inner.map_type(&constant.ty)?;
        let value = inner.expr(&constant.value)?;
        if !inner.pending.is_empty() {
            return fail(
                format!("static constant `{}` cannot declare `out` variables", dotted),
                constant.value.span,
            );
        }
        let text = format!("static const {} {} = {};", ty, name, value);
        self.cx.constants.push(ConstantDecl {
            name: name.clone(),
            text,
        });
        Ok(name)
    }
}

fn literal(lit: &Literal, span: Span) -> Result<String> {
    match lit {
        Literal::Bool(b) => Ok(b.to_string()),
        Literal::Str(_) => fail("string literals have no dialect form", span),
        Literal::Number(raw) => {
            let digits = strip_literal_suffix(raw);
            let well_formed = digits
                .trim_start_matches('-')
                .starts_with(|c: char| c.is_ascii_digit() || c == '.');
            if !well_formed {
                return fail(format!("malformed numeric literal `{}`", raw), span);
            }
            Ok(digits.to_string())
        }
    }
}

//! Kernel definition.
//!
//! A kernel is an ordinary Rust value. Its captured parameters and its body
//! are described once per kernel type by [`Kernel::define`], which fills a
//! [`KernelDef`]: an ordered list of (name, host type, accessor) triples plus
//! the entry body built with [`crate::ast::build`]. Nothing is reflected or
//! decompiled at dispatch time.
//!
//! ```
//! use kernelforge::ast::build::*;
//! use kernelforge::kernel::{Kernel, KernelDef, ReadOnlyBuffer, ReadWriteBuffer};
//!
//! struct Saxpy {
//!     a: f32,
//!     x: ReadOnlyBuffer<f32>,
//!     y: ReadWriteBuffer<f32>,
//! }
//!
//! impl Kernel for Saxpy {
//!     fn define(def: &mut KernelDef<Self>) {
//!         def.scalar("a", |k| k.a);
//!         def.read_only_buffer("x", |k| &k.x);
//!         def.read_write_buffer("y", |k| &k.y);
//!         let i = thread_id("X");
//!         def.body(block(vec![expr(
//!             ident("y").index(i.clone()).assign(ident("a") * ident("x").index(i.clone()) + ident("y").index(i)),
//!         )]));
//!     }
//! }
//! ```

pub mod classify;
pub mod shape;

use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::ast::build::Ex;
use crate::ast::{Block, Expr, FnDef, TypeName};
use crate::identity;
use crate::span::Spanned;
use crate::types::{FnSignature, HostType, ShaderValue};

pub use classify::{CapturedMember, Category};
pub use shape::KernelShape;

// ─── Resources ─────────────────────────────────────────────────────

/// GPU-visible handle of a bound resource, as the execution engine sees it.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ResourceHandle(pub u64);

impl ResourceHandle {
    pub const NULL: ResourceHandle = ResourceHandle(0);

    pub fn is_null(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

macro_rules! buffer_type {
    ($($(#[$doc:meta])* $name:ident => $variant:ident;)*) => {
        $(
            $(#[$doc])*
            pub struct $name<T> {
                handle: ResourceHandle,
                len: usize,
                _elem: PhantomData<fn() -> T>,
            }

            impl<T: ShaderValue> $name<T> {
                pub fn new(handle: ResourceHandle, len: usize) -> Self {
                    Self {
                        handle,
                        len,
                        _elem: PhantomData,
                    }
                }

                pub fn handle(&self) -> ResourceHandle {
                    self.handle
                }

                /// Number of elements.
                pub fn len(&self) -> usize {
                    self.len
                }

                pub fn is_empty(&self) -> bool {
                    self.len == 0
                }

                fn host_type() -> HostType {
                    HostType::$variant(Box::new(T::HOST_TYPE))
                }
            }

            impl<T> Clone for $name<T> {
                fn clone(&self) -> Self {
                    *self
                }
            }

            impl<T> Copy for $name<T> {}

            impl<T> fmt::Debug for $name<T> {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.debug_struct(stringify!($name))
                        .field("handle", &self.handle)
                        .field("len", &self.len)
                        .finish()
                }
            }
        )*
    };
}

buffer_type! {
    /// Read-only array bound as a constant buffer.
    ConstantBuffer => ConstantBuffer;
    /// Read-only structured buffer.
    ReadOnlyBuffer => ReadOnlyBuffer;
    /// Read-write structured buffer.
    ReadWriteBuffer => ReadWriteBuffer;
}

// ─── Function references ───────────────────────────────────────────

/// A stateless helper function a kernel can capture and call. Its body is
/// emitted as a dialect helper; it never becomes dispatch data.
#[derive(Clone, Debug)]
pub struct ShaderFn {
    def: Arc<FnDef>,
    id: u64,
    signature: FnSignature,
}

impl ShaderFn {
    pub fn new(def: FnDef) -> Self {
        let id = identity::function_id(&def);
        let params = def.params.iter().map(|p| host_type(&p.ty)).collect();
        let ret = def.return_ty.as_ref().map(host_type);
        Self {
            signature: FnSignature::new(params, ret),
            def: Arc::new(def),
            id,
        }
    }

    pub fn def(&self) -> &FnDef {
        &self.def
    }

    /// Content identity: equal for functions that compute the same thing.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn signature(&self) -> &FnSignature {
        &self.signature
    }
}

fn host_type(ty: &TypeName) -> HostType {
    HostType::parse(&ty.node).unwrap_or_else(|| HostType::Opaque(ty.node.clone()))
}

// ─── Kernel definition ─────────────────────────────────────────────

/// A type whose values are dispatchable kernels.
pub trait Kernel: Send + Sync + Sized + 'static {
    /// Register members and body. Called once per process per type.
    fn define(def: &mut KernelDef<Self>);
}

/// Reads one member out of a live kernel instance.
pub enum Accessor<K> {
    /// Writes the GPU representation into a slice of the constant blob.
    Value(Arc<dyn Fn(&K, &mut [u8]) + Send + Sync>),
    Resource(Arc<dyn Fn(&K) -> ResourceHandle + Send + Sync>),
    Function(Arc<dyn Fn(&K) -> &ShaderFn + Send + Sync>),
    /// Registered only so classification can reject it.
    None,
}

impl<K> Clone for Accessor<K> {
    fn clone(&self) -> Self {
        match self {
            Accessor::Value(f) => Accessor::Value(Arc::clone(f)),
            Accessor::Resource(f) => Accessor::Resource(Arc::clone(f)),
            Accessor::Function(f) => Accessor::Function(Arc::clone(f)),
            Accessor::None => Accessor::None,
        }
    }
}

impl<K> fmt::Debug for Accessor<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Accessor::Value(_) => "Value",
            Accessor::Resource(_) => "Resource",
            Accessor::Function(_) => "Function",
            Accessor::None => "None",
        };
        f.write_str(kind)
    }
}

/// The static half of a registered member.
#[derive(Clone, Debug, PartialEq)]
pub struct MemberSpec {
    pub name: String,
    pub ty: HostType,
    /// Host access path for members reached through enclosing scopes,
    /// leaf name included (`env.inner.scale`).
    pub path: Option<Vec<String>>,
}

#[derive(Clone, Debug)]
pub struct MemberDecl<K> {
    pub spec: MemberSpec,
    pub accessor: Accessor<K>,
}

/// A static constant referenced from kernel code.
#[derive(Clone, Debug, PartialEq)]
pub struct StaticConstant {
    pub ty: TypeName,
    pub value: Spanned<Expr>,
}

/// Handle to the member just registered.
pub struct Registered<'d> {
    spec: &'d mut MemberSpec,
}

impl Registered<'_> {
    /// Mark the member as captured through a chain of enclosing scopes:
    /// `.via("env.inner")` makes the body reach it as `env.inner.<name>`.
    pub fn via(self, scope: &str) {
        let mut path: Vec<String> = scope.split('.').filter(|s| !s.is_empty()).map(str::to_string).collect();
        path.push(self.spec.name.clone());
        self.spec.path = Some(path);
    }
}

/// Registration target for one kernel shape.
pub struct KernelDef<K> {
    name: String,
    members: Vec<MemberDecl<K>>,
    body: Block,
    statics: HashMap<String, FnDef>,
    constants: HashMap<String, StaticConstant>,
    thread_group: Option<[u32; 3]>,
}

/// Default `[numthreads]` of a kernel that does not set one.
pub const DEFAULT_THREAD_GROUP: [u32; 3] = [64, 1, 1];

/// Upper bound on threads per group for compute shaders.
pub const MAX_THREADS_PER_GROUP: u32 = 1024;

/// Every axis at least one, at most [`MAX_THREADS_PER_GROUP`] in total.
pub fn check_thread_group(size: [u32; 3]) -> std::result::Result<(), String> {
    let total = size.iter().try_fold(1u32, |acc, &n| acc.checked_mul(n));
    if size.contains(&0) || total.map_or(true, |t| t > MAX_THREADS_PER_GROUP) {
        return Err(format!(
            "thread_group {:?} must be non-zero with at most {} threads",
            size, MAX_THREADS_PER_GROUP
        ));
    }
    Ok(())
}

impl<K: 'static> KernelDef<K> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            members: Vec::new(),
            body: Block::default(),
            statics: HashMap::new(),
            constants: HashMap::new(),
            thread_group: None,
        }
    }

    fn push(&mut self, name: &str, ty: HostType, accessor: Accessor<K>) -> Registered<'_> {
        self.members.push(MemberDecl {
            spec: MemberSpec {
                name: name.to_string(),
                ty,
                path: None,
            },
            accessor,
        });
        let last = self.members.len() - 1;
        Registered {
            spec: &mut self.members[last].spec,
        }
    }

    /// Capture a scalar value (`f32`, `i32`, `u32`, `f64`, `bool`).
    pub fn scalar<T: ShaderValue>(
        &mut self,
        name: &str,
        get: impl Fn(&K) -> T + Send + Sync + 'static,
    ) -> Registered<'_> {
        self.value(name, get)
    }

    /// Capture a vector value (`Float3`, `UInt2`, ...).
    pub fn vector<T: ShaderValue>(
        &mut self,
        name: &str,
        get: impl Fn(&K) -> T + Send + Sync + 'static,
    ) -> Registered<'_> {
        self.value(name, get)
    }

    fn value<T: ShaderValue>(
        &mut self,
        name: &str,
        get: impl Fn(&K) -> T + Send + Sync + 'static,
    ) -> Registered<'_> {
        let write = move |k: &K, out: &mut [u8]| get(k).write_bytes(out);
        self.push(name, T::HOST_TYPE, Accessor::Value(Arc::new(write)))
    }

    pub fn constant_buffer<T: ShaderValue>(
        &mut self,
        name: &str,
        get: impl Fn(&K) -> &ConstantBuffer<T> + Send + Sync + 'static,
    ) -> Registered<'_> {
        let read = move |k: &K| get(k).handle();
        self.push(name, ConstantBuffer::<T>::host_type(), Accessor::Resource(Arc::new(read)))
    }

    pub fn read_only_buffer<T: ShaderValue>(
        &mut self,
        name: &str,
        get: impl Fn(&K) -> &ReadOnlyBuffer<T> + Send + Sync + 'static,
    ) -> Registered<'_> {
        let read = move |k: &K| get(k).handle();
        self.push(name, ReadOnlyBuffer::<T>::host_type(), Accessor::Resource(Arc::new(read)))
    }

    pub fn read_write_buffer<T: ShaderValue>(
        &mut self,
        name: &str,
        get: impl Fn(&K) -> &ReadWriteBuffer<T> + Send + Sync + 'static,
    ) -> Registered<'_> {
        let read = move |k: &K| get(k).handle();
        self.push(name, ReadWriteBuffer::<T>::host_type(), Accessor::Resource(Arc::new(read)))
    }

    /// Capture a function reference. `signature` is what every bound
    /// function must match; a stateful signature is rejected.
    pub fn function(
        &mut self,
        name: &str,
        signature: FnSignature,
        get: impl Fn(&K) -> &ShaderFn + Send + Sync + 'static,
    ) -> Registered<'_> {
        self.push(name, HostType::Function(signature), Accessor::Function(Arc::new(get)))
    }

    /// Record a field whose host type has no dialect form.
    pub fn capture_opaque(&mut self, name: &str, type_name: &str) -> Registered<'_> {
        self.push(name, HostType::Opaque(type_name.to_string()), Accessor::None)
    }

    pub fn body(&mut self, body: Block) {
        self.body = body;
    }

    /// Register a static helper callable from the body as `path(...)`,
    /// e.g. `"MathUtil.Square"`.
    pub fn static_function(&mut self, path: &str, def: FnDef) {
        self.statics.insert(path.to_string(), def);
    }

    /// Register a static constant readable from the body as `path`.
    pub fn static_constant(&mut self, path: &str, ty: &str, value: impl Into<Ex>) {
        self.constants.insert(
            path.to_string(),
            StaticConstant {
                ty: Spanned::dummy(ty.to_string()),
                value: value.into().into_inner(),
            },
        );
    }

    /// Checked by [`KernelShape::build`] against [`check_thread_group`].
    pub fn thread_group(&mut self, x: u32, y: u32, z: u32) {
        self.thread_group = Some([x, y, z]);
    }

    /// Use `size` unless the definition chose its own thread group.
    pub fn default_thread_group(&mut self, size: [u32; 3]) {
        self.thread_group.get_or_insert(size);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn members(&self) -> &[MemberDecl<K>] {
        &self.members
    }

    pub fn thread_group_size(&self) -> [u32; 3] {
        self.thread_group.unwrap_or(DEFAULT_THREAD_GROUP)
    }
}

impl<K: Kernel> KernelDef<K> {
    /// Run `K::define` on a fresh definition named after the type.
    pub fn of() -> Self {
        let mut def = KernelDef::new(short_type_name::<K>());
        K::define(&mut def);
        def
    }
}

/// `my_crate::kernels::Saxpy<f32>` → `Saxpy`.
pub fn short_type_name<T>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

// ─── Source extraction boundary ────────────────────────────────────

/// Supplies the restricted AST of a kernel: its entry body and the static
/// helpers and constants the body may reach.
pub trait SourceExtractor {
    fn kernel_name(&self) -> &str;

    fn entry(&self) -> &Block;

    /// Static function registered under a dotted host path.
    fn lookup_static_function(&self, path: &str) -> Option<&FnDef>;

    /// Static constant registered under a dotted host path.
    fn lookup_static_constant(&self, path: &str) -> Option<&StaticConstant>;
}

impl<K> SourceExtractor for KernelDef<K> {
    fn kernel_name(&self) -> &str {
        &self.name
    }

    fn entry(&self) -> &Block {
        &self.body
    }

    fn lookup_static_function(&self, path: &str) -> Option<&FnDef> {
        self.statics.get(path)
    }

    fn lookup_static_constant(&self, path: &str) -> Option<&StaticConstant> {
        self.constants.get(path)
    }
}

// ─── Ad-hoc kernels ────────────────────────────────────────────────

/// A closure-shaped kernel: state plus a definition function, keyed by a
/// caller-chosen name rather than by a Rust type.
pub struct AdHocKernel<S> {
    name: String,
    state: S,
    define: fn(&mut KernelDef<S>),
}

impl<S: Send + Sync + 'static> AdHocKernel<S> {
    pub fn new(name: impl Into<String>, state: S, define: fn(&mut KernelDef<S>)) -> Self {
        Self {
            name: name.into(),
            state,
            define,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> &S {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut S {
        &mut self.state
    }

    pub fn definition(&self) -> KernelDef<S> {
        let mut def = KernelDef::new(self.name.clone());
        (self.define)(&mut def);
        def
    }
}

#[cfg(test)]
mod tests;

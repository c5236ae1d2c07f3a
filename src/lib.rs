//! Runtime translation of Rust-described compute kernels into HLSL.
//!
//! A kernel registers its captured members and its body once per type
//! ([`kernel`]). The body is rewritten into dialect text ([`rewrite`]),
//! members are laid out into slots and a packed constant blob ([`layout`]),
//! and the full source is rendered ([`codegen`]) and compiled on first use
//! ([`compiler`], [`cache`]). Every later dispatch only copies live member
//! values into pooled dispatch data ([`dispatch`]). [`runtime::Runtime`]
//! ties the stages together.

pub mod ast;
pub mod cache;
pub mod codegen;
pub mod compiler;
pub mod config;
pub mod diagnostic;
pub mod dispatch;
pub mod error;
pub mod identity;
pub mod kernel;
pub mod layout;
pub mod rewrite;
pub mod runtime;
pub mod span;
pub mod types;

pub use cache::ShaderCache;
pub use compiler::{CompiledProgram, DxcCompiler, ShaderCompiler};
pub use config::CompilerConfig;
pub use dispatch::DispatchData;
pub use error::{Error, Result};
pub use identity::KernelIdentity;
pub use kernel::{AdHocKernel, ConstantBuffer, Kernel, KernelDef, ReadOnlyBuffer, ReadWriteBuffer, ResourceHandle, ShaderFn};
pub use layout::BindingPlan;
pub use runtime::{DispatchRequest, ExecutionEngine, Runtime};

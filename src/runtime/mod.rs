//! Dispatch orchestration.
//!
//! [`Runtime`] owns the three per-process caches (kernel shapes, binding
//! layouts, compiled programs), the native compiler and the dispatch-data
//! pool. It turns a live kernel plus extents into a [`DispatchRequest`];
//! running that request on a device is an [`ExecutionEngine`]'s job, and
//! engines live outside this crate.
//!
//! ```no_run
//! use kernelforge::config::CompilerConfig;
//! use kernelforge::runtime::Runtime;
//! # use kernelforge::ast::build::*;
//! # use kernelforge::kernel::{Kernel, KernelDef, ReadWriteBuffer, ResourceHandle};
//! # struct Fill { value: f32, out: ReadWriteBuffer<f32> }
//! # impl Kernel for Fill {
//! #     fn define(def: &mut KernelDef<Self>) {
//! #         def.scalar("value", |k| k.value);
//! #         def.read_write_buffer("dest", |k| &k.out);
//! #         def.body(block(vec![expr(ident("dest").index(thread_id("X")).assign(ident("value")))]));
//! #     }
//! # }
//!
//! let runtime = Runtime::with_dxc(CompilerConfig::default());
//! let kernel = Fill { value: 1.0, out: ReadWriteBuffer::new(ResourceHandle(1), 256) };
//! let request = runtime.dispatch(&kernel, [256, 1, 1])?;
//! assert_eq!(request.group_counts(), [4, 1, 1]);
//! # Ok::<(), kernelforge::Error>(())
//! ```

use std::any::{Any, TypeId};
use std::sync::Arc;

use tracing::trace;

use crate::cache::{ShaderCache, SingleFlight};
use crate::compiler::{CompiledProgram, DxcCompiler, ShaderCompiler};
use crate::config::CompilerConfig;
use crate::dispatch::{DispatchDataPool, DispatchExtractor, PooledDispatchData};
use crate::error::{Error, Result};
use crate::identity::KernelIdentity;
use crate::kernel::{AdHocKernel, Kernel, KernelDef, KernelShape, ResourceHandle};
use crate::layout::{BindingPlan, DescriptorRange};
use crate::rewrite::ENTRY_POINT;

// ─── Requests ──────────────────────────────────────────────────────

/// One ready-to-run dispatch.
#[derive(Debug)]
pub struct DispatchRequest {
    pub kernel: String,
    pub identity: KernelIdentity,
    pub program: Arc<CompiledProgram>,
    /// The i-th resource handle in `data` binds the i-th range.
    pub ranges: Vec<DescriptorRange>,
    pub extents: [u32; 3],
    pub thread_group: [u32; 3],
    pub data: PooledDispatchData,
}

impl DispatchRequest {
    /// Thread groups to launch per axis.
    pub fn group_counts(&self) -> [u32; 3] {
        let mut counts = [0; 3];
        for (count, (extent, group)) in counts.iter_mut().zip(self.extents.iter().zip(self.thread_group)) {
            *count = extent.div_ceil(group.max(1));
        }
        counts
    }

    /// Reject null handles. Engines call this before binding.
    pub fn check_resources(&self) -> Result<()> {
        match self.data.resources().iter().position(ResourceHandle::is_null) {
            Some(slot) => Err(Error::InvalidResource {
                slot,
                reason: format!("null handle bound to {}", self.ranges[slot]),
            }),
            None => Ok(()),
        }
    }
}

/// Runs dispatch requests on a device.
pub trait ExecutionEngine {
    /// Submit one dispatch. A handle the engine cannot bind is
    /// [`Error::InvalidResource`].
    fn submit(&self, request: &DispatchRequest) -> Result<()>;
}

// ─── Cached per-shape state ────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
enum ShapeKey {
    Type(TypeId, &'static str),
    AdHoc(TypeId, String),
}

/// Binding plan and extractor of one shape.
pub struct Layout<K> {
    plan: BindingPlan,
    extractor: DispatchExtractor<K>,
}

impl<K> Layout<K> {
    pub fn plan(&self) -> &BindingPlan {
        &self.plan
    }

    pub fn extractor(&self) -> &DispatchExtractor<K> {
        &self.extractor
    }
}

/// Everything cached for one live kernel.
pub struct Prepared<K> {
    pub shape: Arc<KernelShape<K>>,
    pub layout: Arc<Layout<K>>,
    pub identity: KernelIdentity,
    pub program: Arc<CompiledProgram>,
}

fn downcast<T: Send + Sync + 'static>(value: Arc<dyn Any + Send + Sync>, key: &ShapeKey) -> Result<Arc<T>> {
    value.downcast::<T>().map_err(|_| Error::Poisoned {
        what: format!("{:?} (cached under a different type)", key),
    })
}

// ─── Runtime ───────────────────────────────────────────────────────

pub struct Runtime {
    config: CompilerConfig,
    shapes: SingleFlight<ShapeKey, dyn Any + Send + Sync>,
    layouts: SingleFlight<ShapeKey, dyn Any + Send + Sync>,
    programs: ShaderCache,
    pool: Arc<DispatchDataPool>,
}

impl Runtime {
    pub fn new(config: CompilerConfig, compiler: Arc<dyn ShaderCompiler>) -> Self {
        let pool = DispatchDataPool::new(config.pool_capacity);
        Self {
            config,
            shapes: SingleFlight::new("kernel shape"),
            layouts: SingleFlight::new("binding layout"),
            programs: ShaderCache::new(compiler),
            pool,
        }
    }

    /// A runtime compiling with `dxc` as configured.
    pub fn with_dxc(config: CompilerConfig) -> Self {
        let compiler = Arc::new(DxcCompiler::new(&config));
        Self::new(config, compiler)
    }

    /// A `dxc` runtime configured from the nearest `kernelforge.toml`.
    pub fn discover(dir: &std::path::Path) -> Result<Self> {
        Ok(Self::with_dxc(CompilerConfig::discover(dir)?))
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    pub fn programs(&self) -> &ShaderCache {
        &self.programs
    }

    pub fn pool(&self) -> &Arc<DispatchDataPool> {
        &self.pool
    }

    /// Shapes built so far, failed ones excluded.
    pub fn shape_count(&self) -> usize {
        self.shapes.len()
    }

    // ─── Typed kernels ─────────────────────────────────────────

    fn type_key<K: Kernel>() -> ShapeKey {
        ShapeKey::Type(TypeId::of::<K>(), std::any::type_name::<K>())
    }

    /// The shape of kernel type `K`, built on first use.
    pub fn shape<K: Kernel>(&self) -> Result<Arc<KernelShape<K>>> {
        self.shape_with(&Self::type_key::<K>(), KernelDef::<K>::of)
    }

    pub fn prepare<K: Kernel>(&self, kernel: &K) -> Result<Prepared<K>> {
        self.prepare_with(&Self::type_key::<K>(), KernelDef::<K>::of, kernel)
    }

    /// Complete dialect source `kernel` compiles from.
    pub fn source_text<K: Kernel>(&self, kernel: &K) -> Result<String> {
        let key = Self::type_key::<K>();
        let shape = self.shape_with(&key, KernelDef::<K>::of)?;
        let layout = self.layout(&key, &shape)?;
        shape.source_text(kernel, &layout.plan)
    }

    /// Validate extents, prepare `kernel` and extract its dispatch data.
    pub fn dispatch<K: Kernel>(&self, kernel: &K, extents: [u32; 3]) -> Result<DispatchRequest> {
        check_extents(extents)?;
        let prepared = self.prepare(kernel)?;
        Ok(self.request(prepared, kernel, extents))
    }

    /// [`Self::dispatch`] and hand the request to `engine`.
    pub fn submit<K: Kernel>(&self, engine: &dyn ExecutionEngine, kernel: &K, extents: [u32; 3]) -> Result<()> {
        let request = self.dispatch(kernel, extents)?;
        engine.submit(&request)
    }

    // ─── Ad-hoc kernels ────────────────────────────────────────

    fn adhoc_key<S: Send + Sync + 'static>(kernel: &AdHocKernel<S>) -> ShapeKey {
        ShapeKey::AdHoc(TypeId::of::<S>(), kernel.name().to_string())
    }

    pub fn adhoc_shape<S: Send + Sync + 'static>(&self, kernel: &AdHocKernel<S>) -> Result<Arc<KernelShape<S>>> {
        self.shape_with(&Self::adhoc_key(kernel), || kernel.definition())
    }

    pub fn prepare_adhoc<S: Send + Sync + 'static>(&self, kernel: &AdHocKernel<S>) -> Result<Prepared<S>> {
        self.prepare_with(&Self::adhoc_key(kernel), || kernel.definition(), kernel.state())
    }

    pub fn dispatch_adhoc<S: Send + Sync + 'static>(
        &self,
        kernel: &AdHocKernel<S>,
        extents: [u32; 3],
    ) -> Result<DispatchRequest> {
        check_extents(extents)?;
        let prepared = self.prepare_adhoc(kernel)?;
        Ok(self.request(prepared, kernel.state(), extents))
    }

    pub fn submit_adhoc<S: Send + Sync + 'static>(
        &self,
        engine: &dyn ExecutionEngine,
        kernel: &AdHocKernel<S>,
        extents: [u32; 3],
    ) -> Result<()> {
        let request = self.dispatch_adhoc(kernel, extents)?;
        engine.submit(&request)
    }

    // ─── Shared plumbing ───────────────────────────────────────

    fn shape_with<K: Send + Sync + 'static>(
        &self,
        key: &ShapeKey,
        define: impl FnOnce() -> KernelDef<K>,
    ) -> Result<Arc<KernelShape<K>>> {
        let shape = self.shapes.get_or_create(key, || {
            let mut def = define();
            def.default_thread_group(self.config.thread_group);
            let shape: Arc<dyn Any + Send + Sync> = Arc::new(KernelShape::build(def)?);
            Ok(shape)
        })?;
        downcast(shape, key)
    }

    fn layout<K: Send + Sync + 'static>(&self, key: &ShapeKey, shape: &KernelShape<K>) -> Result<Arc<Layout<K>>> {
        let layout = self.layouts.get_or_create(key, || {
            let plan = shape.plan();
            let extractor = DispatchExtractor::build(&plan, shape.accessors())?;
            let layout: Arc<dyn Any + Send + Sync> = Arc::new(Layout { plan, extractor });
            Ok(layout)
        })?;
        downcast(layout, key)
    }

    fn prepare_with<K: Send + Sync + 'static>(
        &self,
        key: &ShapeKey,
        define: impl FnOnce() -> KernelDef<K>,
        kernel: &K,
    ) -> Result<Prepared<K>> {
        let shape = self.shape_with(key, define)?;
        let layout = self.layout(key, &shape)?;
        let identity = shape.identity(kernel);
        let program = self
            .programs
            .get_or_compile_with(identity, ENTRY_POINT, || shape.source_text(kernel, &layout.plan))?;
        Ok(Prepared {
            shape,
            layout,
            identity,
            program,
        })
    }

    fn request<K>(&self, prepared: Prepared<K>, kernel: &K, extents: [u32; 3]) -> DispatchRequest {
        let mut data = self.pool.acquire();
        prepared.layout.extractor.extract(kernel, extents, &mut data);
        trace!(
            kernel = prepared.shape.name(),
            identity = %prepared.identity,
            x = extents[0],
            y = extents[1],
            z = extents[2],
            "dispatch prepared"
        );
        DispatchRequest {
            kernel: prepared.shape.name().to_string(),
            identity: prepared.identity,
            program: prepared.program,
            ranges: prepared.layout.plan.descriptor_ranges().to_vec(),
            extents,
            thread_group: prepared.shape.thread_group(),
            data,
        }
    }
}

fn check_extents(extents: [u32; 3]) -> Result<()> {
    let [x, y, z] = extents;
    if extents.contains(&0) {
        return Err(Error::InvalidExtents { x, y, z });
    }
    Ok(())
}

#[cfg(test)]
mod tests;

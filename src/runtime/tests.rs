use super::*;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use rayon::prelude::*;

use crate::ast::build::*;
use crate::kernel::{ReadOnlyBuffer, ReadWriteBuffer, ShaderFn};
use crate::types::{FnSignature, HostType};

/// Compiles by echoing the source back as bytecode.
#[derive(Default)]
struct Echo {
    calls: AtomicUsize,
}

impl Echo {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ShaderCompiler for Echo {
    fn name(&self) -> &str {
        "echo"
    }

    fn compile(&self, source: &str, entry_point: &str) -> Result<CompiledProgram> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(CompiledProgram::new(source.as_bytes().to_vec(), entry_point))
    }
}

/// Records what it was asked to run.
#[derive(Default)]
struct Recorder {
    submitted: Mutex<Vec<(String, [u32; 3], Vec<ResourceHandle>)>>,
}

impl ExecutionEngine for Recorder {
    fn submit(&self, request: &DispatchRequest) -> Result<()> {
        request.check_resources()?;
        self.submitted.lock().unwrap().push((
            request.kernel.clone(),
            request.group_counts(),
            request.data.resources().to_vec(),
        ));
        Ok(())
    }
}

struct Scale {
    factor: f32,
    input: ReadOnlyBuffer<f32>,
    output: ReadWriteBuffer<f32>,
}

impl Kernel for Scale {
    fn define(def: &mut KernelDef<Self>) {
        def.scalar("factor", |k| k.factor);
        def.read_only_buffer("input", |k| &k.input);
        def.read_write_buffer("output", |k| &k.output);
        let i = thread_id("X");
        def.body(block(vec![expr(
            ident("output").index(i.clone()).assign(ident("input").index(i) * ident("factor")),
        )]));
    }
}

fn scale(factor: f32) -> Scale {
    Scale {
        factor,
        input: ReadOnlyBuffer::new(ResourceHandle(1), 100),
        output: ReadWriteBuffer::new(ResourceHandle(2), 100),
    }
}

struct Mapped {
    op: ShaderFn,
    data: ReadWriteBuffer<f32>,
}

impl Kernel for Mapped {
    fn define(def: &mut KernelDef<Self>) {
        def.function("op", FnSignature::new(vec![HostType::FLOAT], Some(HostType::FLOAT)), |k| &k.op);
        def.read_write_buffer("data", |k| &k.data);
        let i = thread_id("X");
        def.body(block(vec![expr(
            ident("data").index(i.clone()).assign(call("op", vec![ident("data").index(i)])),
        )]));
    }
}

fn mapped(body: Ex) -> Mapped {
    Mapped {
        op: ShaderFn::new(func("Op", vec![param("f32", "x")], Some("f32"), vec![ret(body)])),
        data: ReadWriteBuffer::new(ResourceHandle(5), 64),
    }
}

struct Empty;

impl Kernel for Empty {
    fn define(def: &mut KernelDef<Self>) {
        def.body(block(vec![]));
    }
}

fn runtime() -> (Runtime, Arc<Echo>) {
    let compiler = Arc::new(Echo::default());
    (Runtime::new(CompilerConfig::default(), compiler.clone()), compiler)
}

// ─── Dispatch ──────────────────────────────────────────────────────

#[test]
fn test_dispatch_builds_request() {
    let (runtime, _) = runtime();
    let request = runtime.dispatch(&scale(2.0), [100, 1, 1]).unwrap();

    assert_eq!(request.kernel, "Scale");
    assert_eq!(request.extents, [100, 1, 1]);
    assert_eq!(request.thread_group, [64, 1, 1]);
    assert_eq!(request.group_counts(), [2, 1, 1]);
    assert_eq!(request.program.entry_point(), ENTRY_POINT);

    let ranges: Vec<String> = request.ranges.iter().map(|r| r.to_string()).collect();
    assert_eq!(ranges, vec!["t0", "u0"]);
    assert_eq!(request.data.resources(), &[ResourceHandle(1), ResourceHandle(2)]);
    assert_eq!(request.data.extents(), Some([100, 1, 1]));
    assert_eq!(request.data.read_u32(12), Some(2.0f32.to_bits()));
    assert_eq!(request.data.constants().len(), 16);
}

#[test]
fn test_program_is_compiled_once_per_identity() {
    let (runtime, compiler) = runtime();
    for factor in [1.0, 2.0, 3.0] {
        runtime.dispatch(&scale(factor), [8, 1, 1]).unwrap();
    }
    assert_eq!(compiler.calls(), 1);
    assert_eq!(runtime.shape_count(), 1);
    assert_eq!(runtime.programs().len(), 1);
}

#[test]
fn test_concurrent_dispatches_share_one_compilation() {
    let (runtime, compiler) = runtime();
    let identities: Vec<KernelIdentity> = (0..64)
        .into_par_iter()
        .map(|n| runtime.dispatch(&scale(n as f32), [32, 1, 1]).unwrap().identity)
        .collect();
    assert_eq!(compiler.calls(), 1);
    assert!(identities.iter().all(|id| *id == identities[0]));
}

#[test]
fn test_bound_function_changes_program() {
    let (runtime, compiler) = runtime();
    let square = runtime.dispatch(&mapped(ident("x") * ident("x")), [64, 1, 1]).unwrap();
    let negate = runtime.dispatch(&mapped(-ident("x")), [64, 1, 1]).unwrap();
    let again = runtime.dispatch(&mapped(ident("x") * ident("x")), [64, 1, 1]).unwrap();

    assert_ne!(square.identity, negate.identity);
    assert_eq!(square.identity, again.identity);
    assert!(Arc::ptr_eq(&square.program, &again.program));
    assert_eq!(compiler.calls(), 2);
    assert_eq!(runtime.shape_count(), 1);
}

#[test]
fn test_source_text_matches_compiled_program() {
    let (runtime, _) = runtime();
    let kernel = scale(1.0);
    let source = runtime.source_text(&kernel).unwrap();
    assert!(source.contains("[numthreads(64, 1, 1)]"), "{}", source);
    let request = runtime.dispatch(&kernel, [1, 1, 1]).unwrap();
    assert_eq!(request.program.bytecode(), source.as_bytes());
}

#[test]
fn test_configured_thread_group_applies() {
    let config = CompilerConfig {
        thread_group: [8, 8, 1],
        ..CompilerConfig::default()
    };
    let runtime = Runtime::new(config, Arc::new(Echo::default()));
    let request = runtime.dispatch(&scale(1.0), [20, 9, 1]).unwrap();
    assert_eq!(request.thread_group, [8, 8, 1]);
    assert_eq!(request.group_counts(), [3, 2, 1]);
    assert_eq!(runtime.shape::<Scale>().unwrap().thread_group(), [8, 8, 1]);
}

#[test]
fn test_zero_extent_is_rejected() {
    let (runtime, compiler) = runtime();
    let err = runtime.dispatch(&scale(1.0), [16, 0, 1]).unwrap_err();
    assert_eq!(err, Error::InvalidExtents { x: 16, y: 0, z: 1 });
    assert_eq!(compiler.calls(), 0);
    assert_eq!(runtime.shape_count(), 0);
}

#[test]
fn test_shape_failure_is_retried() {
    let (runtime, compiler) = runtime();
    for _ in 0..2 {
        let err = runtime.dispatch(&Empty, [1, 1, 1]).unwrap_err();
        assert_eq!(err, Error::EmptyKernel { kernel: "Empty".into() });
    }
    assert_eq!(runtime.shape_count(), 0);
    assert_eq!(compiler.calls(), 0);
}

#[test]
fn test_dispatch_data_returns_to_pool() {
    let (runtime, _) = runtime();
    let request = runtime.dispatch(&scale(1.0), [4, 1, 1]).unwrap();
    assert_eq!(runtime.pool().idle(), 0);
    drop(request);
    assert_eq!(runtime.pool().idle(), 1);
    let _request = runtime.dispatch(&scale(1.0), [4, 1, 1]).unwrap();
    assert_eq!(runtime.pool().idle(), 0);
}

// ─── Submission ────────────────────────────────────────────────────

#[test]
fn test_submit_hands_request_to_engine() {
    let (runtime, _) = runtime();
    let engine = Recorder::default();
    runtime.submit(&engine, &scale(1.0), [130, 1, 1]).unwrap();
    let submitted = engine.submitted.lock().unwrap();
    assert_eq!(
        *submitted,
        vec![("Scale".to_string(), [3, 1, 1], vec![ResourceHandle(1), ResourceHandle(2)])]
    );
}

#[test]
fn test_null_handle_fails_at_submission() {
    let (runtime, _) = runtime();
    let engine = Recorder::default();
    let mut kernel = scale(1.0);
    kernel.output = ReadWriteBuffer::new(ResourceHandle::NULL, 100);

    // Extraction does not validate handles.
    let request = runtime.dispatch(&kernel, [1, 1, 1]).unwrap();
    assert_eq!(request.data.resources()[1], ResourceHandle::NULL);

    match runtime.submit(&engine, &kernel, [1, 1, 1]) {
        Err(Error::InvalidResource { slot, reason }) => {
            assert_eq!(slot, 1);
            assert!(reason.contains("u0"), "{}", reason);
        }
        other => panic!("expected an invalid resource, got {:?}", other),
    }
    assert!(engine.submitted.lock().unwrap().is_empty());
}

// ─── Ad-hoc kernels ────────────────────────────────────────────────

type FillState = (f32, ReadWriteBuffer<f32>);

fn define_fill(def: &mut KernelDef<FillState>) {
    def.scalar("value", |s| s.0);
    def.read_write_buffer("dest", |s| &s.1);
    def.body(block(vec![expr(ident("dest").index(thread_id("X")).assign(ident("value")))]));
}

fn define_clear(def: &mut KernelDef<FillState>) {
    def.scalar("value", |s| s.0);
    def.read_write_buffer("dest", |s| &s.1);
    def.body(block(vec![expr(ident("dest").index(thread_id("X")).assign(0.0f32))]));
}

#[test]
fn test_adhoc_kernels_are_keyed_by_name() {
    let (runtime, compiler) = runtime();
    let buffer = || ReadWriteBuffer::new(ResourceHandle(4), 16);
    let fill = AdHocKernel::new("fill", (1.5f32, buffer()), define_fill);
    let clear = AdHocKernel::new("clear", (0.0f32, buffer()), define_clear);

    let request = runtime.dispatch_adhoc(&fill, [16, 1, 1]).unwrap();
    assert_eq!(request.kernel, "fill");
    assert_eq!(request.data.read_u32(12), Some(1.5f32.to_bits()));
    runtime.dispatch_adhoc(&clear, [16, 1, 1]).unwrap();
    runtime
        .dispatch_adhoc(&AdHocKernel::new("fill", (2.5f32, buffer()), define_fill), [16, 1, 1])
        .unwrap();

    assert_eq!(runtime.shape_count(), 2);
    assert_eq!(compiler.calls(), 2);
    assert_eq!(runtime.adhoc_shape(&clear).unwrap().name(), "clear");
}

#[test]
fn test_submit_adhoc() {
    let (runtime, _) = runtime();
    let engine = Recorder::default();
    let fill = AdHocKernel::new("fill", (1.0f32, ReadWriteBuffer::new(ResourceHandle(4), 16)), define_fill);
    runtime.submit_adhoc(&engine, &fill, [16, 1, 1]).unwrap();
    assert_eq!(engine.submitted.lock().unwrap()[0].0, "fill");
}

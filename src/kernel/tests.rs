use super::*;
use crate::ast::build::*;
use crate::error::Error;
use crate::types::{Float3, ScalarKind};

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

fn unary(name: &str, ty: &str, body: Ex) -> ShaderFn {
    ShaderFn::new(func(name, vec![param(ty, "x")], Some(ty), vec![ret(body)]))
}

fn square() -> ShaderFn {
    unary("Square", "f32", ident("x") * ident("x"))
}

fn negate() -> ShaderFn {
    unary("Negate", "f32", -ident("x"))
}

fn mapped(op: ShaderFn) -> Mapped {
    Mapped {
        op,
        data: ReadWriteBuffer::new(ResourceHandle(3), 256),
    }
}

// ─── Registration ──────────────────────────────────────────────────

#[test]
fn test_short_type_name() {
    assert_eq!(short_type_name::<Scale>(), "Scale");
    assert_eq!(short_type_name::<Vec<u8>>(), "Vec");
    assert_eq!(short_type_name::<f32>(), "f32");
}

#[test]
fn test_registration_keeps_declaration_order() {
    let def = KernelDef::<Scale>::of();
    assert_eq!(def.name(), "Scale");
    let names: Vec<&str> = def.members().iter().map(|m| m.spec.name.as_str()).collect();
    assert_eq!(names, vec!["factor", "input", "output"]);
    assert_eq!(def.members()[0].spec.ty, HostType::FLOAT);
    assert_eq!(def.members()[1].spec.ty, HostType::ReadOnlyBuffer(Box::new(HostType::FLOAT)));
    assert_eq!(def.thread_group_size(), DEFAULT_THREAD_GROUP);
}

#[test]
fn test_via_records_access_path() {
    let mut def = KernelDef::<(f32, Float3)>::new("Nested");
    def.scalar("scale", |k| k.0).via("env.inner");
    def.vector("origin", |k| k.1);
    assert_eq!(
        def.members()[0].spec.path,
        Some(vec!["env".to_string(), "inner".to_string(), "scale".to_string()])
    );
    assert_eq!(def.members()[1].spec.path, None);
    assert_eq!(def.members()[1].spec.ty, HostType::Vector(ScalarKind::Float, 3));
}

#[test]
fn test_shader_fn_signature_and_identity() {
    let f = square();
    assert_eq!(f.signature(), &FnSignature::new(vec![HostType::FLOAT], Some(HostType::FLOAT)));
    // Same computation under another name.
    let g = unary("Sq", "f32", ident("x") * ident("x"));
    assert_eq!(f.id(), g.id());
    assert_ne!(f.id(), negate().id());
}

type FillState = (f32, ReadWriteBuffer<f32>);

#[test]
fn test_adhoc_kernel_definition() {
    let mut kernel = AdHocKernel::new(
        "fill",
        (1.5f32, ReadWriteBuffer::<f32>::new(ResourceHandle(9), 8)),
        |def: &mut KernelDef<FillState>| {
            def.scalar("value", |s| s.0);
            def.read_write_buffer("dest", |s| &s.1);
            def.body(block(vec![expr(ident("dest").index(thread_id("X")).assign(ident("value")))]));
        },
    );
    assert_eq!(kernel.name(), "fill");
    kernel.state_mut().0 = 2.5;
    assert_eq!(kernel.state().0, 2.5);
    let def = kernel.definition();
    assert_eq!(def.name(), "fill");
    assert_eq!(def.members().len(), 2);
}

// ─── Classification ────────────────────────────────────────────────

#[test]
fn test_statics_register_and_resolve_with_extractor_in_scope() {
    let mut def = KernelDef::<Scale>::of();
    def.static_function(
        "Math.Half",
        func("Half", vec![param("f32", "v")], Some("f32"), vec![ret(ident("v") * 0.5f32)]),
    );
    def.static_constant("Math.Two", "f32", 2.0f32);

    let source: &dyn SourceExtractor = &def;
    assert_eq!(source.kernel_name(), "Scale");
    assert_eq!(def.lookup_static_function("Math.Half").map(|f| f.name.node.as_str()), Some("Half"));
    assert_eq!(def.lookup_static_constant("Math.Two").map(|c| c.ty.node.as_str()), Some("f32"));
    assert!(def.lookup_static_function("Math.Two").is_none());
    assert!(def.lookup_static_constant("Math.Missing").is_none());
}

fn spec(name: &str, ty: HostType) -> MemberSpec {
    MemberSpec {
        name: name.to_string(),
        ty,
        path: None,
    }
}

#[test]
fn test_category_first_match() {
    use classify::category_of;
    let f = || Box::new(HostType::FLOAT);
    assert_eq!(category_of(&HostType::ConstantBuffer(f())), Some(Category::ConstantBufferRef));
    assert_eq!(category_of(&HostType::ReadOnlyBuffer(f())), Some(Category::ReadOnlyBufferRef));
    assert_eq!(category_of(&HostType::ReadWriteBuffer(f())), Some(Category::ReadWriteBufferRef));
    assert_eq!(category_of(&HostType::UINT), Some(Category::Scalar));
    assert_eq!(category_of(&HostType::Vector(ScalarKind::Int, 2)), Some(Category::Vector));
    let sig = FnSignature::new(vec![HostType::FLOAT], None);
    assert_eq!(category_of(&HostType::Function(sig)), Some(Category::StatelessFunctionRef));
}

#[test]
fn test_classify_rejects_unsupported_capture() {
    let specs = vec![spec("scale", HostType::FLOAT), spec("label", HostType::Opaque("String".into()))];
    assert_eq!(
        classify::classify("Labelled", &specs),
        Err(Error::UnsupportedCapture {
            kernel: "Labelled".to_string(),
            member: "label".to_string(),
            type_name: "String".to_string(),
        })
    );
}

#[test]
fn test_classify_rejects_stateful_and_non_numeric_functions() {
    let stateful = FnSignature::stateful(vec![HostType::FLOAT], Some(HostType::FLOAT));
    let err = classify::classify("K", &[spec("f", HostType::Function(stateful))]).unwrap_err();
    assert!(matches!(err, Error::UnsupportedCapture { ref type_name, .. } if type_name == "closure(f32) -> f32"));

    let buffers = FnSignature::new(vec![HostType::ReadOnlyBuffer(Box::new(HostType::FLOAT))], None);
    assert!(classify::classify("K", &[spec("g", HostType::Function(buffers))]).is_err());
}

#[test]
fn test_classify_rejects_buffer_of_opaque_elements() {
    let ty = HostType::ReadWriteBuffer(Box::new(HostType::Opaque("Particle".into())));
    let err = classify::classify("Sim", &[spec("particles", ty)]).unwrap_err();
    assert!(matches!(err, Error::UnsupportedCapture { ref member, .. } if member == "particles"));
}

#[test]
fn test_classify_names_nested_member_by_path() {
    let mut nested = spec("label", HostType::Opaque("String".into()));
    nested.path = Some(vec!["env".into(), "label".into()]);
    let err = classify::classify("K", &[nested]).unwrap_err();
    assert!(matches!(err, Error::UnsupportedCapture { ref member, .. } if member == "env.label"));
}

#[test]
fn test_classify_rejects_flattened_collision() {
    let mut a = spec("scale", HostType::FLOAT);
    a.path = Some(vec!["a".into(), "scale".into()]);
    let mut b = spec("scale", HostType::FLOAT);
    b.path = Some(vec!["b".into(), "scale".into()]);
    let err = classify::classify("K", &[a, b]).unwrap_err();
    let message = &err.diagnostic().unwrap().message;
    assert!(message.contains("`a.scale` and `b.scale`"), "{}", message);
}

#[test]
fn test_classify_escapes_reserved_names() {
    let members = classify::classify("K", &[spec("float", HostType::FLOAT)]).unwrap();
    assert_eq!(members[0].name, "float");
    assert_ne!(members[0].dialect_name, "float");
    assert_eq!(members[0].index, 0);
}

// ─── Shapes ────────────────────────────────────────────────────────

#[test]
fn test_empty_kernel_is_rejected_before_translation() {
    let mut def = KernelDef::<()>::new("Nothing");
    // A body that would itself fail to translate.
    def.body(block(vec![opaque_stmt("goto")]));
    assert!(matches!(
        KernelShape::build(def),
        Err(Error::EmptyKernel { ref kernel }) if kernel == "Nothing"
    ));
}

#[test]
fn test_unsupported_capture_is_rejected_before_translation() {
    let mut def = KernelDef::<()>::new("Bad");
    def.capture_opaque("name", "String");
    def.body(block(vec![opaque_stmt("goto")]));
    assert!(matches!(KernelShape::build(def), Err(Error::UnsupportedCapture { .. })));
}

#[test]
fn test_check_thread_group() {
    assert_eq!(check_thread_group([64, 1, 1]), Ok(()));
    assert_eq!(check_thread_group([32, 32, 1]), Ok(()));
    assert!(check_thread_group([0, 1, 1]).unwrap_err().contains("must be non-zero"));
    assert!(check_thread_group([64, 64, 1]).unwrap_err().contains("at most 1024 threads"));
    assert!(check_thread_group([u32::MAX, 2, 1]).is_err());
}

#[test]
fn test_invalid_kernel_thread_group_is_rejected() {
    for size in [[0, 1, 1], [2048, 1, 1], [16, 16, 16]] {
        let mut def = KernelDef::<Scale>::of();
        def.thread_group(size[0], size[1], size[2]);
        let err = KernelShape::build(def).err().expect("thread group accepted");
        let message = &err.diagnostic().expect("not a translation error").message;
        assert!(message.starts_with("kernel `Scale`: thread_group"), "{}", message);
    }

    let mut def = KernelDef::<Scale>::of();
    def.thread_group(32, 32, 1);
    assert_eq!(KernelShape::build(def).unwrap().thread_group(), [32, 32, 1]);
}

#[test]
fn test_shape_build() {
    let shape = KernelShape::build(KernelDef::<Scale>::of()).unwrap();
    assert_eq!(shape.name(), "Scale");
    assert_eq!(shape.members().len(), 3);
    assert_eq!(shape.accessors().len(), 3);
    assert_eq!(
        shape.translation().body,
        vec!["output[ThreadIds.x] = input[ThreadIds.x] * factor;".to_string()]
    );
    assert!(shape.references().is_empty());
}

#[test]
fn test_shape_is_deterministic() {
    let a = KernelShape::build(KernelDef::<Scale>::of()).unwrap();
    let b = KernelShape::build(KernelDef::<Scale>::of()).unwrap();
    assert_eq!(a.translation(), b.translation());
    assert_eq!(a.structural_id(), b.structural_id());
    assert_eq!(a.plan(), b.plan());

    let kernel = Scale {
        factor: 2.0,
        input: ReadOnlyBuffer::new(ResourceHandle(1), 4),
        output: ReadWriteBuffer::new(ResourceHandle(2), 4),
    };
    let plan = a.plan();
    assert_eq!(a.source_text(&kernel, &plan).unwrap(), b.source_text(&kernel, &plan).unwrap());
}

#[test]
fn test_nested_member_is_flattened() {
    let mut def = KernelDef::<(f32, ReadWriteBuffer<f32>)>::new("Closure");
    def.scalar("scale", |k| k.0).via("env.inner");
    def.read_write_buffer("dest", |k| &k.1);
    def.body(block(vec![expr(ident("dest").index(thread_id("X")).assign(path("env.inner.scale")))]));
    let shape = KernelShape::build(def).unwrap();
    assert_eq!(shape.translation().body, vec!["dest[ThreadIds.x] = scale;".to_string()]);
}

#[test]
fn test_function_reference_becomes_helper() {
    let shape = KernelShape::build(KernelDef::<Mapped>::of()).unwrap();
    let kernel = mapped(square());
    let text = shape.source_text(&kernel, &shape.plan()).unwrap();
    assert!(text.contains("float op(float x);"), "{}", text);
    assert!(text.contains("float op(float x)\n{\n    return x * x;\n}"), "{}", text);
    assert!(text.contains("data[ThreadIds.x] = op(data[ThreadIds.x]);"), "{}", text);
    assert!(text.contains("RWStructuredBuffer<float> data : register(u0);"), "{}", text);
}

#[test]
fn test_identity_depends_on_bound_function() {
    let shape = KernelShape::build(KernelDef::<Mapped>::of()).unwrap();
    let a = shape.identity(&mapped(square()));
    let b = shape.identity(&mapped(negate()));
    assert_ne!(a, b);
    // Another name for the same computation compiles to the same program.
    let c = shape.identity(&mapped(unary("Sq", "f32", ident("x") * ident("x"))));
    assert_eq!(a, c);
}

#[test]
fn test_identity_ignores_dispatch_data() {
    let shape = KernelShape::build(KernelDef::<Scale>::of()).unwrap();
    let a = Scale {
        factor: 1.0,
        input: ReadOnlyBuffer::new(ResourceHandle(1), 4),
        output: ReadWriteBuffer::new(ResourceHandle(2), 4),
    };
    let b = Scale {
        factor: 9.0,
        input: ReadOnlyBuffer::new(ResourceHandle(5), 8),
        output: ReadWriteBuffer::new(ResourceHandle(6), 8),
    };
    assert_eq!(shape.identity(&a), shape.identity(&b));
}

#[test]
fn test_bound_function_signature_mismatch() {
    let shape = KernelShape::build(KernelDef::<Mapped>::of()).unwrap();
    let kernel = mapped(unary("Widen", "f64", ident("x")));
    let err = shape.source_text(&kernel, &shape.plan()).unwrap_err();
    let message = &err.diagnostic().unwrap().message;
    assert!(message.contains("declares `op`"), "{}", message);
}

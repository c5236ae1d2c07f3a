use super::*;
use crate::ast::build::*;
use crate::kernel::{ConstantBuffer, KernelDef, KernelShape, ReadOnlyBuffer, ReadWriteBuffer};
use crate::types::{Float3, Float4};

fn extractor<K: 'static>(def: KernelDef<K>) -> (KernelShape<K>, DispatchExtractor<K>) {
    let shape = KernelShape::build(def).unwrap();
    let extractor = DispatchExtractor::build(&shape.plan(), shape.accessors()).unwrap();
    (shape, extractor)
}

fn offset_of<K>(shape: &KernelShape<K>, name: &str) -> usize {
    match shape.plan().member(name).unwrap().placement {
        Placement::Constant { offset, .. } => offset as usize,
        other => panic!("`{}` is not in the blob: {:?}", name, other),
    }
}

struct Single {
    value: u32,
}

fn single() -> KernelDef<Single> {
    let mut def = KernelDef::<Single>::new("Single");
    def.scalar("value", |k| k.value);
    def
}

#[test]
fn test_round_trip_header_and_scalar() {
    let (shape, extractor) = extractor(single());
    let mut data = DispatchData::new();
    extractor.extract(&Single { value: 42 }, [8, 1, 1], &mut data);

    assert_eq!(data.extents(), Some([8, 1, 1]));
    assert_eq!(data.read_u32(0), Some(8));
    assert_eq!(data.read_u32(4), Some(1));
    assert_eq!(data.read_u32(8), Some(1));
    let offset = offset_of(&shape, "value");
    assert_eq!(offset, 12);
    assert_eq!(data.read_u32(offset), Some(42));
    assert_eq!(data.constants().len(), 16);
    assert!(data.resources().is_empty());
}

#[test]
fn test_extractor_is_reused_across_instances() {
    let (shape, extractor) = extractor(single());
    let offset = offset_of(&shape, "value");
    let mut data = DispatchData::new();
    extractor.extract(&Single { value: 1 }, [4, 4, 1], &mut data);
    extractor.extract(&Single { value: 7 }, [2, 1, 1], &mut data);
    assert_eq!(data.extents(), Some([2, 1, 1]));
    assert_eq!(data.read_u32(offset), Some(7));
    assert_eq!(data.constants().len(), extractor.blob_size());
}

struct Mixed {
    a: ReadOnlyBuffer<f32>,
    b: f32,
    c: ReadWriteBuffer<f32>,
    d: f32,
    e: ReadOnlyBuffer<f32>,
    table: ConstantBuffer<u32>,
}

fn mixed() -> (Mixed, KernelDef<Mixed>) {
    let kernel = Mixed {
        a: ReadOnlyBuffer::new(ResourceHandle(0xa), 16),
        b: 1.5,
        c: ReadWriteBuffer::new(ResourceHandle(0xc), 16),
        d: -2.0,
        e: ReadOnlyBuffer::new(ResourceHandle(0xe), 16),
        table: ConstantBuffer::new(ResourceHandle(0x7), 4),
    };
    let mut def = KernelDef::<Mixed>::new("Mixed");
    def.read_only_buffer("a", |k| &k.a);
    def.scalar("b", |k| k.b);
    def.read_write_buffer("c", |k| &k.c);
    def.scalar("d", |k| k.d);
    def.read_only_buffer("e", |k| &k.e);
    def.constant_buffer("table", |k| &k.table);
    (kernel, def)
}

#[test]
fn test_handles_follow_descriptor_ranges() {
    let (kernel, def) = mixed();
    let (shape, extractor) = extractor(def);
    let mut data = DispatchData::new();
    extractor.extract(&kernel, [16, 1, 1], &mut data);

    // Constant (table), then read-only (a, e), then read-write (c).
    assert_eq!(
        data.resources(),
        &[ResourceHandle(0x7), ResourceHandle(0xa), ResourceHandle(0xe), ResourceHandle(0xc)]
    );
    assert_eq!(data.resources().len(), shape.plan().descriptor_ranges().len());
    assert_eq!(data.resource_bytes().len(), 4 * 8);
    assert_eq!(&data.resource_bytes()[..8], &0x7u64.to_ne_bytes());

    assert_eq!(data.read_u32(offset_of(&shape, "b")), Some(1.5f32.to_bits()));
    assert_eq!(data.read_u32(offset_of(&shape, "d")), Some((-2.0f32).to_bits()));
    assert_eq!(offset_of(&shape, "b"), 12);
    assert_eq!(offset_of(&shape, "d"), 16);
    assert_eq!(data.constants().len(), 32);
}

struct Vectors {
    origin: Float3,
    weight: f32,
    color: Float4,
    enabled: bool,
}

#[test]
fn test_vectors_are_packed_without_straddling() {
    let mut def = KernelDef::<Vectors>::new("Vectors");
    def.vector("origin", |k| k.origin);
    def.scalar("weight", |k| k.weight);
    def.vector("color", |k| k.color);
    def.scalar("enabled", |k| k.enabled);
    let (shape, extractor) = extractor(def);

    assert_eq!(offset_of(&shape, "origin"), 16);
    assert_eq!(offset_of(&shape, "weight"), 28);
    assert_eq!(offset_of(&shape, "color"), 32);
    assert_eq!(offset_of(&shape, "enabled"), 48);

    let kernel = Vectors {
        origin: Float3::new(1.0, 2.0, 3.0),
        weight: 0.5,
        color: Float4::splat(0.25),
        enabled: true,
    };
    let mut data = DispatchData::new();
    extractor.extract(&kernel, [1, 1, 1], &mut data);
    assert_eq!(data.read_u32(16), Some(1.0f32.to_bits()));
    assert_eq!(data.read_u32(20), Some(2.0f32.to_bits()));
    assert_eq!(data.read_u32(24), Some(3.0f32.to_bits()));
    assert_eq!(data.read_u32(28), Some(0.5f32.to_bits()));
    assert_eq!(data.read_u32(44), Some(0.25f32.to_bits()));
    assert_eq!(data.read_u32(48), Some(1));
    // The gap between the header and `origin` stays zeroed.
    assert_eq!(data.read_u32(12), Some(0));
    assert_eq!(data.constants().len(), 64);
}

#[test]
fn test_function_members_carry_no_data() {
    struct WithFn {
        op: crate::kernel::ShaderFn,
        data: ReadWriteBuffer<f32>,
    }
    let mut def = KernelDef::<WithFn>::new("WithFn");
    def.function(
        "op",
        crate::types::FnSignature::new(vec![crate::types::HostType::FLOAT], Some(crate::types::HostType::FLOAT)),
        |k| &k.op,
    );
    def.read_write_buffer("data", |k| &k.data);
    def.body(block(vec![expr(
        ident("data").index(thread_id("X")).assign(call("op", vec![ident("data").index(thread_id("X"))])),
    )]));
    let (_, extractor) = extractor(def);
    let kernel = WithFn {
        op: crate::kernel::ShaderFn::new(func("Id", vec![param("f32", "v")], Some("f32"), vec![ret(ident("v"))])),
        data: ReadWriteBuffer::new(ResourceHandle(9), 1),
    };
    let mut data = DispatchData::new();
    extractor.extract(&kernel, [1, 1, 1], &mut data);
    assert_eq!(data.resources(), &[ResourceHandle(9)]);
    assert_eq!(data.constants().len(), 16);
}

#[test]
fn test_mismatched_accessors_are_rejected() {
    let shape = KernelShape::build(single()).unwrap();
    let err = DispatchExtractor::<Single>::build(&shape.plan(), &[]).unwrap_err();
    assert!(matches!(err, Error::Layout { ref message } if message.contains("0 accessors")), "{}", err);

    let wrong = vec![Accessor::<Single>::None];
    let err = DispatchExtractor::build(&shape.plan(), &wrong).unwrap_err();
    assert!(matches!(err, Error::Layout { .. }));
    assert!(err.to_string().starts_with("binding layout error: member 0 `value`"), "{}", err);
}

#[test]
fn test_clear_keeps_nothing() {
    let (_, extractor) = extractor(single());
    let mut data = DispatchData::new();
    extractor.extract(&Single { value: 3 }, [1, 1, 1], &mut data);
    data.clear();
    assert!(data.constants().is_empty());
    assert_eq!(data.extents(), None);
}

// ─── Pool ──────────────────────────────────────────────────────────

#[test]
fn test_pool_returns_buffers_on_drop() {
    let pool = DispatchDataPool::new(4);
    let (_, extractor) = extractor(single());
    {
        let mut data = pool.acquire();
        extractor.extract(&Single { value: 5 }, [1, 1, 1], &mut data);
        assert_eq!(data.read_u32(12), Some(5));
        assert_eq!(pool.idle(), 0);
    }
    assert_eq!(pool.idle(), 1);

    let reused = pool.acquire();
    assert_eq!(pool.idle(), 0);
    assert!(reused.constants().is_empty());
}

#[test]
fn test_pool_retention_is_bounded() {
    let pool = DispatchDataPool::new(1);
    let first = pool.acquire();
    let second = pool.acquire();
    drop(first);
    drop(second);
    assert_eq!(pool.idle(), 1);
    assert_eq!(pool.capacity(), 1);
}

#[test]
fn test_pooled_data_is_usable_across_threads() {
    let pool = DispatchDataPool::new(8);
    let (_, extractor) = extractor(single());
    std::thread::scope(|scope| {
        for value in 0..4u32 {
            let pool = &pool;
            let extractor = &extractor;
            scope.spawn(move || {
                let mut data = pool.acquire();
                extractor.extract(&Single { value }, [1, 1, 1], &mut data);
                assert_eq!(data.read_u32(12), Some(value));
            });
        }
    });
    assert!(pool.idle() >= 1 && pool.idle() <= 4);
}

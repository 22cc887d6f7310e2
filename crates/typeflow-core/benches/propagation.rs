use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use typeflow_core::ir::{Address, SpaceKind, SpaceManager};
use typeflow_core::{Funcdata, InferTypes, Metatype, OpCode, RoundOutcome, TypeFactory};

/// A locked float input copied down a chain of `len` values, with a merge
/// every eighth link
fn chain(len: u64) -> (TypeFactory, Funcdata) {
    let mut spaces = SpaceManager::new();
    let reg = spaces.add_space("register", SpaceKind::Processor, 8, 1).unwrap();
    let stack = spaces.add_space("stack", SpaceKind::Stack, 8, 1).unwrap();
    let mut types = TypeFactory::new(8);
    let mut fd = Funcdata::new("chain", spaces, stack);
    fd.set_heritage_pass(stack, 1);

    let float8 = types.base(8, Metatype::Float);
    let first = fd.new_input(&mut types, 8, Address::new(reg, 0));
    fd.lock_type(first, float8);
    let mut prev = first;
    for i in 1..=len {
        let next = fd.new_varnode(&mut types, 8, Address::new(reg, i * 8));
        let code = Address::new(reg, 0x10_0000 + i * 4);
        if i % 8 == 0 {
            fd.new_op(OpCode::Multiequal, code, &[prev, first], Some(next)).unwrap();
        } else {
            fd.new_op(OpCode::Copy, code, &[prev], Some(next)).unwrap();
        }
        prev = next;
    }
    (types, fd)
}

fn bench_rounds(c: &mut Criterion) {
    let mut group = c.benchmark_group("settle_chain");
    for len in [64u64, 512, 4096] {
        group.bench_with_input(BenchmarkId::from_parameter(len), &len, |b, &len| {
            let infer = InferTypes::default();
            b.iter_batched(
                || chain(len),
                |(mut types, mut fd)| {
                    while let RoundOutcome::Changed { .. } = infer.apply(&mut types, &mut fd) {}
                    black_box(fd.type_recovery().rounds())
                },
                criterion::BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

criterion_group!(benches, bench_rounds);
criterion_main!(benches);

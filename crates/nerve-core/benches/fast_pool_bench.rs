use criterion::{criterion_group, criterion_main, Criterion};
use nerve_core::event::Event;
use nerve_core::pool::FastPool;
use std::hint::black_box;

fn bench_events(c: &mut Criterion) {
    let pool = FastPool::new(1, 1_024, 3, &[16, 20, 20], 128).unwrap();

    let mut group = c.benchmark_group("Event building");

    group.bench_function("Fast node (alloc, 3 slots, body, release)", |b| {
        b.iter(|| {
            let mut node = pool.alloc().unwrap();
            node.set_strheader(0, "kind", "tick").unwrap();
            node.set_intheader(1, "delta", -7).unwrap();
            node.set_uintheader(2, "seq", 123_456).unwrap();
            node.set_body("payload").unwrap();
            black_box(node.header("seq"));
            pool.release(node).unwrap();
        });
    });

    group.bench_function("Fast event (wrap and drop)", |b| {
        b.iter(|| {
            let node = pool.alloc().unwrap();
            let event = Event::from_fast(21, 5, node);
            black_box(event.is_fast());
        });
    });

    group.bench_function("Plain event (3 headers, body)", |b| {
        b.iter(|| {
            let mut event = Event::new(21, 5);
            event.add_header("kind", "tick");
            event.add_header("delta", (-7i64).to_string());
            event.add_header("seq", 123_456u64.to_string());
            event.set_body("payload");
            black_box(event.header("seq"));
        });
    });

    group.finish();
}

criterion_group!(benches, bench_events);
criterion_main!(benches);

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use syncdock_core::{CallbackLayer, Severity};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Layer;

fn counting_dispatch() -> (Arc<AtomicUsize>, tracing::Dispatch) {
    let bytes = Arc::new(AtomicUsize::new(0));
    let sink = {
        let bytes = Arc::clone(&bytes);
        move |_: Severity, msg: &[u8]| {
            bytes.fetch_add(black_box(msg).len(), Ordering::Relaxed);
        }
    };
    let subscriber = tracing_subscriber::registry()
        .with(CallbackLayer::new(sink).with_filter(LevelFilter::TRACE));
    (bytes, tracing::Dispatch::new(subscriber))
}

fn bench_plain_message(c: &mut Criterion) {
    let (_bytes, dispatch) = counting_dispatch();
    tracing::dispatcher::with_default(&dispatch, || {
        c.bench_function("logbridge_plain_message", |b| {
            b.iter(|| tracing::info!("folder scan complete"));
        });
    });
}

fn bench_message_with_fields(c: &mut Criterion) {
    let (_bytes, dispatch) = counting_dispatch();
    tracing::dispatcher::with_default(&dispatch, || {
        c.bench_function("logbridge_message_with_fields", |b| {
            b.iter(|| {
                tracing::debug!(
                    folder = "documents",
                    files = black_box(1024),
                    "pulled {} bytes",
                    black_box(65536)
                );
            });
        });
    });
}

criterion_group!(benches, bench_plain_message, bench_message_with_fields);
criterion_main!(benches);

//! Benchmarks for the hot paths of the bridge.
//!
//! - Wrapping: identity-cache hits and fresh wrappers
//! - Properties: uncached and cached reads
//! - Signals: native emission into script listeners
//! - Conversion: composite values in both directions
//!
//! ## Profiling with Puffin
//!
//! ```bash
//! cargo bench --features profile-with-puffin -- --profile-time 5
//! ```

use std::cell::{Cell, RefCell};
use std::hint::black_box;
use std::rc::Rc;

use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use scriptbridge::prelude::*;

#[cfg(feature = "profile-with-puffin")]
static FRAME_VIEW: std::sync::OnceLock<puffin::GlobalFrameView> = std::sync::OnceLock::new();

#[cfg(feature = "profile-with-puffin")]
fn setup_profiler() {
    puffin::set_scopes_on(true);
    FRAME_VIEW.get_or_init(puffin::GlobalFrameView::default);
}

#[cfg(not(feature = "profile-with-puffin"))]
fn setup_profiler() {}

#[cfg(feature = "profile-with-puffin")]
fn end_profiling_frame() {
    puffin::GlobalProfiler::lock().new_frame();
}

#[cfg(not(feature = "profile-with-puffin"))]
fn end_profiling_frame() {}

struct Sprite {
    name: RefCell<String>,
    frame: Cell<RectF>,
    on_moved: Signal<(f64, f64)>,
}

impl Sprite {
    fn new() -> Self {
        Sprite {
            name: RefCell::new("sprite".into()),
            frame: Cell::new(RectF::new(0.0, 0.0, 32.0, 32.0)),
            on_moved: Signal::new(),
        }
    }
}

impl NativeClass for Sprite {
    const NAME: &'static str = "Sprite";

    fn build(class: &mut ClassBuilder<'_, Self>) -> Result<(), BridgeError> {
        class
            .property(
                "name",
                CacheMode::NoCache,
                |s: &Sprite| s.name.borrow().clone(),
                |s: &Sprite, name: String| *s.name.borrow_mut() = name,
            )?
            .readonly("frame", CacheMode::CacheFirstGet, |s: &Sprite| s.frame.get())?
            .signal("onMoved", |s: &Sprite| &s.on_moved)?;
        Ok(())
    }
}

fn bench_wrap(c: &mut Criterion) {
    setup_profiler();
    let mut group = c.benchmark_group("wrap");
    let ctx = Context::new();

    let cached = Rc::new(Sprite::new());
    let object = ctx.wrap(NativeHandle::strong(cached.clone())).unwrap();
    let _root = ctx.runtime().persist(object.as_object().unwrap());
    group.bench_function("identity_hit", |b| {
        b.iter(|| {
            black_box(ctx.wrap(NativeHandle::strong(cached.clone())).unwrap());
            end_profiling_frame();
        })
    });

    group.bench_function("fresh", |b| {
        b.iter_batched(
            || Rc::new(Sprite::new()),
            |sprite| {
                black_box(ctx.wrap(NativeHandle::strong(sprite)).unwrap());
                end_profiling_frame();
            },
            BatchSize::SmallInput,
        )
    });
    group.finish();
    ctx.runtime().collect_garbage();
}

fn bench_properties(c: &mut Criterion) {
    setup_profiler();
    let mut group = c.benchmark_group("property");
    let ctx = Context::new();
    let sprite = Rc::new(Sprite::new());
    let object = ctx
        .wrap(NativeHandle::strong(sprite))
        .unwrap()
        .as_object()
        .unwrap();
    let _root = ctx.runtime().persist(object);

    group.bench_function("get_uncached", |b| {
        b.iter(|| black_box(ctx.runtime().get(object, "name").unwrap()))
    });
    group.bench_function("get_cached", |b| {
        b.iter(|| black_box(ctx.runtime().get(object, "frame").unwrap()))
    });
    group.bench_function("set", |b| {
        let value = Value::string("renamed");
        b.iter(|| ctx.runtime().set(object, "name", value.clone()).unwrap())
    });
    group.finish();
}

fn bench_signal_emit(c: &mut Criterion) {
    setup_profiler();
    let mut group = c.benchmark_group("signal");
    let ctx = Context::new();
    let sprite = Rc::new(Sprite::new());
    let object = ctx
        .wrap(NativeHandle::strong(sprite.clone()))
        .unwrap()
        .as_object()
        .unwrap();
    let _root = ctx.runtime().persist(object);

    for _ in 0..8 {
        let listener = ctx
            .runtime()
            .new_function("listener", |_, _, args| Ok(Value::Number(args.len() as f64)));
        ctx.runtime()
            .set(object, "onMoved", Value::Object(listener))
            .unwrap();
    }

    group.bench_function("emit_8_listeners", |b| {
        b.iter(|| {
            sprite.on_moved.emit(&(1.0, 2.0));
            end_profiling_frame();
        })
    });
    group.finish();
}

fn bench_conversion(c: &mut Criterion) {
    let mut group = c.benchmark_group("conversion");
    let ctx = Context::new();
    let rect = RectF::new(1.0, 2.0, 3.0, 4.0);
    let value = ctx.to_script(rect).unwrap();
    let _root = ctx.runtime().persist(value.as_object().unwrap());

    group.bench_function("rect_to_script", |b| {
        b.iter(|| black_box(ctx.to_script(black_box(rect)).unwrap()))
    });
    group.bench_function("rect_from_script", |b| {
        b.iter(|| black_box(ctx.from_script::<RectF>(&value).unwrap()))
    });
    group.bench_function("string_from_script", |b| {
        let text = Value::string("a moderately sized string value");
        b.iter(|| black_box(ctx.from_script::<String>(&text).unwrap()))
    });
    group.finish();
}

criterion_group!(benches, bench_wrap, bench_properties, bench_signal_emit, bench_conversion);
criterion_main!(benches);

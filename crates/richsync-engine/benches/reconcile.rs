use criterion::{Criterion, criterion_group, criterion_main};
use richsync_engine::{
    BlockKey, BlockRenderer, ContentState, DomPoint, DomSelection, DomTree, EditorState,
    EditorSurface, Event, InputType, MemoryDom, OffsetKey, Renderer, SelectionState,
    SurfaceOptions,
};

fn document(blocks: usize) -> ContentState {
    let text: Vec<String> = (0..blocks)
        .map(|i| format!("Paragraph {i} with a few words of ordinary text in it."))
        .collect();
    ContentState::create_from_text(&text.join("\n"))
}

fn bench_render(c: &mut Criterion) {
    let mut group = c.benchmark_group("render");
    group.sample_size(10);

    let state = EditorState::create_with_content(document(200));
    group.bench_function("full_render_200_blocks", |b| {
        b.iter(|| {
            let mut dom = MemoryDom::new();
            BlockRenderer::new().render(std::hint::black_box(&state), &mut dom).unwrap();
            std::hint::black_box(dom);
        });
    });

    let mut dom = MemoryDom::new();
    let mut renderer = BlockRenderer::new();
    renderer.render(&state, &mut dom).unwrap();
    group.bench_function("rerender_unchanged", |b| {
        b.iter(|| renderer.render(std::hint::black_box(&state), &mut dom).unwrap());
    });

    group.finish();
}

fn bench_typing(c: &mut Criterion) {
    let mut group = c.benchmark_group("typing");
    group.sample_size(10);

    let content = document(200);
    let key: BlockKey = content.blocks()[100].key().clone();
    let state = EditorState::create_with_content(content)
        .accept_selection(SelectionState::collapsed(key.clone(), 9));

    group.bench_function("native_keystroke", |b| {
        b.iter(|| {
            let mut dom = MemoryDom::new();
            let mut renderer = BlockRenderer::new();
            renderer.render(&state, &mut dom).unwrap();
            let mut surface = EditorSurface::new(state.clone(), dom.root(), SurfaceOptions::default());

            surface.handle_event(
                Event::BeforeInput {
                    input_type: InputType::InsertText,
                    data: Some("!".into()),
                },
                &mut dom,
            );
            let text = dom
                .set_leaf_text(&OffsetKey::for_block(key.clone()), "Paragraph! 100 with a few words of ordinary text in it.")
                .unwrap();
            dom.set_selection(Some(DomSelection::collapsed(DomPoint::new(text, 10))));
            let effects = surface.handle_event(
                Event::Input {
                    input_type: Some(InputType::InsertText),
                },
                &mut dom,
            );
            std::hint::black_box(effects);
        });
    });

    group.finish();
}

criterion_group!(benches, bench_render, bench_typing);
criterion_main!(benches);

use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use scriptoria_core::{
    AnnotationId, Engine, Mutation, MutationOutcome, NewAnnotation, Span, StatsReport, ThemeId,
};

fn large_text(sentence_count: usize) -> String {
    let mut out = String::with_capacity(sentence_count * 64);
    for i in 0..sentence_count {
        out.push_str(&format!(
            "{i:06} we drove out to the lake house every summer until it sold. "
        ));
    }
    out
}

/// An engine with `count` overlapping annotations spread over a large document.
fn populated_engine(count: usize) -> (Engine, ThemeId, Vec<AnnotationId>) {
    let text = large_text(count);
    let mut engine = Engine::new(&text);
    let MutationOutcome::ThemeCreated(theme) = engine
        .execute(Mutation::CreateTheme {
            name: "Key Point".into(),
            color: "#ffd54f".into(),
            hotkey: None,
        })
        .unwrap()
    else {
        unreachable!()
    };

    let len = engine.project().document().len_chars();
    let step = len / count;
    let outcomes = engine
        .execute_batch((0..count).map(|i| {
            let start = i * step;
            let end = (start + step * 2).min(len);
            Mutation::CreateAnnotation(NewAnnotation::new(Span::new(start, end), theme))
        }))
        .unwrap();
    let ids = outcomes
        .into_iter()
        .filter_map(|o| match o {
            MutationOutcome::Created(id) => Some(id),
            _ => None,
        })
        .collect();
    (engine, theme, ids)
}

fn bench_overlap_query(c: &mut Criterion) {
    let (engine, _, _) = populated_engine(10_000);
    let len = engine.project().document().len_chars();
    let window = Span::new(len / 2, len / 2 + 2_000);

    c.bench_function("overlap_query/10k_annotations", |b| {
        b.iter(|| {
            let hits = engine.project().index().query(black_box(window));
            black_box(hits.len());
        })
    });
}

fn bench_split_in_middle(c: &mut Criterion) {
    c.bench_function("remove_range_split/10k_annotations", |b| {
        b.iter_batched(
            || populated_engine(10_000),
            |(mut engine, _, ids)| {
                let id = ids[ids.len() / 2];
                let bounds = engine.project().annotation(id).unwrap().bounds();
                let middle = bounds.start + bounds.len() / 2;
                engine
                    .execute(Mutation::RemoveRange {
                        id,
                        range: Span::new(middle, middle + 4),
                    })
                    .unwrap();
                black_box(engine.version());
            },
            BatchSize::LargeInput,
        )
    });
}

fn bench_undo_redo_cycle(c: &mut Criterion) {
    let (mut engine, _, ids) = populated_engine(5_000);
    c.bench_function("undo_redo/set_favorite", |b| {
        b.iter(|| {
            engine
                .execute(Mutation::SetFavorite {
                    id: ids[0],
                    favorite: true,
                })
                .unwrap();
            engine.undo().unwrap();
            engine.redo().unwrap();
            engine.undo().unwrap();
        })
    });
}

fn bench_stats_report(c: &mut Criterion) {
    let (mut engine, _, ids) = populated_engine(5_000);
    engine
        .execute_batch(
            ids.iter()
                .step_by(3)
                .map(|id| Mutation::StoryboardAppend { id: *id }),
        )
        .unwrap();
    let snapshot = engine.snapshot();

    c.bench_function("stats_report/5k_annotations", |b| {
        b.iter(|| {
            let report = StatsReport::compute(black_box(&snapshot), 200);
            black_box(report.storyboard.words);
        })
    });
}

criterion_group!(
    benches,
    bench_overlap_query,
    bench_split_in_middle,
    bench_undo_redo_cycle,
    bench_stats_report
);
criterion_main!(benches);

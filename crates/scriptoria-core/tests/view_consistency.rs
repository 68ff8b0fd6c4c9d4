//! Randomized check that incrementally maintained views equal views rebuilt from scratch.
//!
//! A mixed stream of mutations (including rejected ones, undo and redo) is applied to an engine
//! with three active views. After every step each view is compared with a fresh model built from
//! the same project.

use pretty_assertions::assert_eq;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use scriptoria_core::{
    AnnotationId, DocumentHighlightModel, Engine, FilterState, IndexEntry, Mutation,
    MutationOutcome, NewAnnotation, Project, RemovalPolicy, Span, StoryboardViewModel,
    ThemeBrowserModel, ThemeId, ThemeRemoval, UsedFilter, ViewSubscriber,
};
use std::sync::{Arc, Mutex};

const WORDS: &[&str] = &[
    "we", "moved", "north", "when", "the", "mill", "closed", "and", "nobody", "talked", "about",
    "it", "again", "until", "my", "father", "found", "letters",
];

fn document(rng: &mut StdRng, words: usize) -> String {
    (0..words)
        .map(|_| WORDS[rng.gen_range(0..WORDS.len())])
        .collect::<Vec<_>>()
        .join(" ")
}

fn random_span(rng: &mut StdRng, len: usize) -> Span {
    let start = rng.gen_range(0..len - 1);
    let end = (start + rng.gen_range(1..60)).min(len);
    Span::new(start, end)
}

fn pick<T: Copy>(rng: &mut StdRng, items: &[T]) -> Option<T> {
    (!items.is_empty()).then(|| items[rng.gen_range(0..items.len())])
}

fn random_mutation(rng: &mut StdRng, project: &Project, themes: &[ThemeId]) -> Option<Mutation> {
    let len = project.document().len_chars();
    let ids: Vec<AnnotationId> = project.annotations().ids().collect();
    let board = project.storyboard().list();
    let theme = pick(rng, themes)?;

    let mutation = match rng.gen_range(0..16) {
        0..=3 => Mutation::CreateAnnotation(
            NewAnnotation::new(random_span(rng, len), theme).favorite(rng.gen_bool(0.5)),
        ),
        4 => {
            let id = pick(rng, &ids)?;
            let end = project.annotation(id)?.bounds().end;
            if end + 2 > len {
                return None;
            }
            let span = Span::new(end, (end + rng.gen_range(1..20)).min(len));
            let theme = project.annotation(id)?.meta.theme;
            Mutation::CreateAnnotation(NewAnnotation::new(span, theme))
        }
        5 => Mutation::RemoveRange {
            id: pick(rng, &ids)?,
            range: random_span(rng, len),
        },
        6 => Mutation::Merge {
            survivor: pick(rng, &ids)?,
            absorbed: pick(rng, &ids)?,
        },
        7 => Mutation::SetFavorite {
            id: pick(rng, &ids)?,
            favorite: rng.gen_bool(0.5),
        },
        8 => Mutation::SetTheme {
            id: pick(rng, &ids)?,
            theme,
        },
        9 => Mutation::StoryboardInsert {
            index: rng.gen_range(0..=project.storyboard().len()),
            id: pick(rng, &ids)?,
        },
        10 => Mutation::StoryboardRemove {
            id: pick(rng, &board)?,
        },
        11 => Mutation::SetStrikethrough {
            id: pick(rng, &ids)?,
            range: random_span(rng, len),
        },
        12 => Mutation::DeleteAnnotation {
            id: pick(rng, &ids)?,
            storyboard: RemovalPolicy::Cascade,
        },
        13 => Mutation::RecolorTheme {
            id: theme,
            color: format!("#{:06x}", rng.gen_range(0..0xff_ffffu32)),
        },
        14 => Mutation::SetStoryboardHeader {
            id: pick(rng, &board)?,
            header: rng.gen_bool(0.7).then(|| format!("Part {}", rng.gen_range(0..9))),
        },
        _ => Mutation::ExtendAnnotation {
            id: pick(rng, &ids)?,
            range: random_span(rng, len),
        },
    };
    Some(mutation)
}

fn sorted_entries(entries: &[IndexEntry]) -> Vec<IndexEntry> {
    let mut entries = entries.to_vec();
    entries.sort();
    entries
}

struct Views {
    browser: Arc<Mutex<ThemeBrowserModel>>,
    storyboard: Arc<Mutex<StoryboardViewModel>>,
    highlights: Arc<Mutex<DocumentHighlightModel>>,
}

impl Views {
    fn browser_filter() -> FilterState {
        FilterState {
            used: UsedFilter::HideUsed,
            ..FilterState::default()
        }
    }

    fn highlight_filter() -> FilterState {
        FilterState {
            favorites_only: true,
            ..FilterState::default()
        }
    }

    fn attach(engine: &mut Engine) -> Self {
        let views = Self {
            browser: Arc::new(Mutex::new(ThemeBrowserModel::with_filter(
                Self::browser_filter(),
            ))),
            storyboard: Arc::new(Mutex::new(StoryboardViewModel::new())),
            highlights: Arc::new(Mutex::new(DocumentHighlightModel::with_filter(
                Self::highlight_filter(),
            ))),
        };
        for id in [
            engine.register_view("browser", views.browser.clone()),
            engine.register_view("storyboard", views.storyboard.clone()),
            engine.register_view("document", views.highlights.clone()),
        ] {
            assert!(engine.activate_view(id));
        }
        views
    }

    fn assert_match_rebuild(&self, project: &Project, step: usize) {
        let mut fresh = ThemeBrowserModel::with_filter(Self::browser_filter());
        fresh.on_snapshot(project);
        let browser = self.browser.lock().unwrap();
        assert_eq!(browser.groups(), fresh.groups(), "browser diverged at step {step}");
        assert_eq!(browser.visible_len(), fresh.visible_len());

        let mut fresh = StoryboardViewModel::new();
        fresh.on_snapshot(project);
        let storyboard = self.storyboard.lock().unwrap();
        assert_eq!(storyboard.rows(), fresh.rows(), "storyboard diverged at step {step}");

        let mut fresh = DocumentHighlightModel::with_filter(Self::highlight_filter());
        fresh.on_snapshot(project);
        let highlights = self.highlights.lock().unwrap();
        assert_eq!(
            highlights.highlights(),
            fresh.highlights(),
            "highlights diverged at step {step}"
        );
        assert_eq!(
            sorted_entries(highlights.index().entries()),
            sorted_entries(fresh.index().entries())
        );
    }
}

fn run(seed: u64, steps: usize) {
    let mut rng = StdRng::seed_from_u64(seed);
    let text = document(&mut rng, 200);
    let mut engine = Engine::new(&text);

    let mut themes = Vec::new();
    for (name, color) in [("Key Point", "#ffd54f"), ("Humor", "#a5d6a7"), ("Conflict", "#ef9a9a")] {
        match engine
            .execute(Mutation::CreateTheme {
                name: name.into(),
                color: color.into(),
                hotkey: None,
            })
            .unwrap()
        {
            MutationOutcome::ThemeCreated(id) => themes.push(id),
            other => panic!("unexpected outcome {other:?}"),
        }
    }
    let views = Views::attach(&mut engine);

    for step in 0..steps {
        match rng.gen_range(0..20) {
            0 => {
                let _ = engine.undo();
            }
            1 => {
                let _ = engine.redo();
            }
            2 => {
                // Temporary theme: create, use, then delete with a reassignment.
                let name = format!("Temp {step}");
                let batch = engine.execute_batch([Mutation::CreateTheme {
                    name,
                    color: "#cccccc".into(),
                    hotkey: None,
                }]);
                if let Ok(outcomes) = batch
                    && let [MutationOutcome::ThemeCreated(temp)] = outcomes.as_slice()
                {
                    let temp = *temp;
                    let ids: Vec<AnnotationId> = engine.project().annotations().ids().collect();
                    if let Some(id) = pick(&mut rng, &ids) {
                        let _ = engine.execute(Mutation::SetTheme { id, theme: temp });
                    }
                    let _ = engine.execute(Mutation::DeleteTheme {
                        id: temp,
                        policy: ThemeRemoval::Reassign(themes[0]),
                    });
                }
            }
            3 => {
                let _ = engine.execute(Mutation::StoryboardSortChronologically);
            }
            _ => {
                if let Some(mutation) = random_mutation(&mut rng, engine.project(), &themes) {
                    let _ = engine.execute(mutation);
                }
            }
        }
        views.assert_match_rebuild(engine.project(), step);
        assert_eq!(engine.project().integrity_issues(), vec![], "step {step}");
    }
}

#[test]
fn test_views_match_rebuild_seed_1() {
    run(1, 400);
}

#[test]
fn test_views_match_rebuild_seed_7() {
    run(7, 400);
}

#[test]
fn test_views_match_rebuild_seed_42() {
    run(42, 400);
}

#[test]
fn test_reactivated_view_catches_up() {
    let mut engine = Engine::new("alpha beta gamma delta epsilon");
    let MutationOutcome::ThemeCreated(theme) = engine
        .execute(Mutation::CreateTheme {
            name: "Greek".into(),
            color: "#111111".into(),
            hotkey: None,
        })
        .unwrap()
    else {
        panic!("theme not created");
    };
    let browser = Arc::new(Mutex::new(ThemeBrowserModel::new()));
    let view = engine.register_view("browser", browser.clone());
    engine.activate_view(view);
    engine.deactivate_view(view);

    engine
        .execute(Mutation::CreateAnnotation(NewAnnotation::new(
            Span::new(0, 5),
            theme,
        )))
        .unwrap();
    assert_eq!(browser.lock().unwrap().visible_len(), 0);

    engine.activate_view(view);
    assert_eq!(browser.lock().unwrap().visible_len(), 1);
}

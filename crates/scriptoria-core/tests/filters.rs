use pretty_assertions::assert_eq;
use regex::Regex;
use scriptoria_core::{
    AnnotationId, Engine, FilterState, Mutation, MutationOutcome, NewAnnotation, Predicate, Span,
    ThemeId, TitleMatch, UsedFilter, apply_filter,
};
use std::collections::BTreeSet;

fn setup() -> (Engine, ThemeId, ThemeId, Vec<AnnotationId>) {
    let mut engine = Engine::new(&"one two three four five six seven eight nine ten ".repeat(4));
    let mut themes = Vec::new();
    for name in ["Setup", "Payoff"] {
        match engine
            .execute(Mutation::CreateTheme {
                name: name.into(),
                color: "#ffffff".into(),
                hotkey: None,
            })
            .unwrap()
        {
            MutationOutcome::ThemeCreated(id) => themes.push(id),
            other => panic!("unexpected outcome {other:?}"),
        }
    }
    let (setup, payoff) = (themes[0], themes[1]);

    let outcomes = engine
        .execute_batch([
            Mutation::CreateAnnotation(
                NewAnnotation::new(Span::new(0, 13), setup)
                    .with_tag("intro")
                    .with_scene_title("Kitchen 1"),
            ),
            Mutation::CreateAnnotation(
                NewAnnotation::new(Span::new(20, 40), payoff)
                    .with_secondary(setup)
                    .favorite(true)
                    .with_scene_title("Kitchen 2"),
            ),
            Mutation::CreateAnnotation(
                NewAnnotation::new(Span::new(60, 80), payoff).with_notes("the ending"),
            ),
        ])
        .unwrap();
    let ids = outcomes
        .into_iter()
        .map(|o| match o {
            MutationOutcome::Created(id) => id,
            other => panic!("unexpected outcome {other:?}"),
        })
        .collect();
    (engine, setup, payoff, ids)
}

fn visible(engine: &Engine, predicate: &Predicate) -> Vec<AnnotationId> {
    let project = engine.project();
    apply_filter(&project.document_order(), predicate, &project.filter_context())
}

#[test]
fn test_browser_filter_states_compose() {
    let (mut engine, setup, _, ids) = setup();
    engine
        .execute(Mutation::StoryboardAppend { id: ids[2] })
        .unwrap();

    let by_theme = FilterState {
        themes: BTreeSet::from([setup]),
        ..FilterState::default()
    };
    assert_eq!(visible(&engine, &by_theme.to_predicate()), vec![ids[0], ids[1]]);

    let narrowed = FilterState {
        favorites_only: true,
        ..by_theme.clone()
    };
    assert_eq!(visible(&engine, &narrowed.to_predicate()), vec![ids[1]]);

    let only_used = FilterState {
        used: UsedFilter::OnlyUsed,
        ..FilterState::default()
    };
    assert_eq!(visible(&engine, &only_used.to_predicate()), vec![ids[2]]);

    let search = FilterState {
        search: "ENDING".into(),
        ..FilterState::default()
    };
    assert_eq!(visible(&engine, &search.to_predicate()), vec![ids[2]]);

    let mut cleared = narrowed;
    cleared.clear();
    assert!(!cleared.is_active());
    assert_eq!(visible(&engine, &cleared.to_predicate()), ids);
}

#[test]
fn test_predicate_tree_with_regex_titles() {
    let (engine, setup, payoff, ids) = setup();
    let kitchen = Predicate::SceneTitle(TitleMatch::Regex(Regex::new(r"^Kitchen \d$").unwrap()));
    assert_eq!(visible(&engine, &kitchen), vec![ids[0], ids[1]]);

    let predicate = Predicate::All(vec![
        kitchen,
        Predicate::Not(Box::new(Predicate::PrimaryThemeIn(BTreeSet::from([setup])))),
    ]);
    assert_eq!(visible(&engine, &predicate), vec![ids[1]]);

    let either = Predicate::Any(vec![
        Predicate::TagIn(BTreeSet::from(["intro".to_string()])),
        Predicate::PrimaryThemeIn(BTreeSet::from([payoff])),
    ]);
    let once = visible(&engine, &either);
    let twice = apply_filter(&once, &either, &engine.project().filter_context());
    assert_eq!(once, twice);
    assert_eq!(once, ids);
}

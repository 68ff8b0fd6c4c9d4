use pretty_assertions::assert_eq;
use scriptoria_core::{
    AnnotationId, Engine, EngineError, Hotkey, Mutation, MutationEvent, MutationOutcome,
    NewAnnotation, RemovalPolicy, Span, ThemeId, ThemeRemoval,
};
use std::sync::{Arc, Mutex};

fn theme(engine: &mut Engine, name: &str, hotkey: Option<Hotkey>) -> ThemeId {
    match engine
        .execute(Mutation::CreateTheme {
            name: name.to_string(),
            color: "#ffd54f".to_string(),
            hotkey,
        })
        .unwrap()
    {
        MutationOutcome::ThemeCreated(id) => id,
        other => panic!("unexpected outcome {other:?}"),
    }
}

fn annotate(engine: &mut Engine, new: NewAnnotation) -> AnnotationId {
    match engine.execute(Mutation::CreateAnnotation(new)).unwrap() {
        MutationOutcome::Created(id) => id,
        other => panic!("unexpected outcome {other:?}"),
    }
}

fn spans_of(engine: &Engine, id: AnnotationId) -> Vec<Span> {
    engine.project().annotation(id).unwrap().spans.clone()
}

#[test]
fn test_remove_middle_range_splits_and_follows_storyboard() {
    let mut engine = Engine::new(&"lorem ipsum ".repeat(30));
    let key = theme(&mut engine, "Key Point", Some(Hotkey::Key1));
    let other = annotate(&mut engine, NewAnnotation::new(Span::new(0, 50), key));
    let id = annotate(
        &mut engine,
        NewAnnotation::new(Span::new(100, 200), key)
            .with_tag("opening")
            .with_notes("strong quote"),
    );
    engine
        .execute_batch([
            Mutation::StoryboardAppend { id },
            Mutation::StoryboardAppend { id: other },
        ])
        .unwrap();

    let outcome = engine
        .execute(Mutation::RemoveRange {
            id,
            range: Span::new(140, 160),
        })
        .unwrap();
    let MutationOutcome::Split { kept, created } = outcome else {
        panic!("expected a split, got {outcome:?}");
    };

    assert_eq!(kept, id);
    assert_eq!(spans_of(&engine, kept), vec![Span::new(100, 140)]);
    assert_eq!(spans_of(&engine, created), vec![Span::new(160, 200)]);

    let right = engine.project().annotation(created).unwrap();
    assert_eq!(right.meta.theme, key);
    assert_eq!(right.meta.notes, "strong quote");
    assert!(right.meta.tags.contains("opening"));
    assert!(right.meta.used);

    assert_eq!(engine.project().storyboard().list(), vec![id, created, other]);
    assert!(engine.project().index().query(Span::new(140, 160)).is_empty());
    assert_eq!(engine.project().integrity_issues(), vec![]);
}

#[test]
fn test_remove_whole_annotation_deletes_it() {
    let mut engine = Engine::new(&"x".repeat(100));
    let key = theme(&mut engine, "Key Point", None);
    let id = annotate(&mut engine, NewAnnotation::new(Span::new(10, 20), key));
    engine.execute(Mutation::StoryboardAppend { id }).unwrap();

    let outcome = engine
        .execute(Mutation::RemoveRange {
            id,
            range: Span::new(0, 50),
        })
        .unwrap();
    assert_eq!(outcome, MutationOutcome::Deleted(id));
    assert!(engine.project().annotations().is_empty());
    assert!(engine.project().storyboard().is_empty());
    assert!(engine.project().index().is_empty());
}

#[test]
fn test_split_of_multi_span_annotation_partitions_at_the_cut() {
    let mut engine = Engine::new(&"x".repeat(200));
    let key = theme(&mut engine, "Key Point", None);
    let id = annotate(
        &mut engine,
        NewAnnotation::new(Span::new(0, 10), key)
            .with_span(Span::new(20, 60))
            .with_span(Span::new(80, 90)),
    );

    let outcome = engine
        .execute(Mutation::RemoveRange {
            id,
            range: Span::new(30, 40),
        })
        .unwrap();
    let MutationOutcome::Split { created, .. } = outcome else {
        panic!("expected a split, got {outcome:?}");
    };
    assert_eq!(spans_of(&engine, id), vec![Span::new(0, 10), Span::new(20, 30)]);
    assert_eq!(
        spans_of(&engine, created),
        vec![Span::new(40, 60), Span::new(80, 90)]
    );
}

#[test]
fn test_delete_storyboard_member_requires_cascade() {
    let mut engine = Engine::new(&"x".repeat(100));
    let key = theme(&mut engine, "Key Point", None);
    let first = annotate(&mut engine, NewAnnotation::new(Span::new(0, 10), key));
    let second = annotate(&mut engine, NewAnnotation::new(Span::new(20, 30), key));
    engine
        .execute_batch([
            Mutation::StoryboardAppend { id: first },
            Mutation::StoryboardAppend { id: second },
            Mutation::SetStoryboardHeader {
                id: second,
                header: Some("Aftermath".into()),
            },
        ])
        .unwrap();

    let err = engine
        .execute(Mutation::DeleteAnnotation {
            id: second,
            storyboard: RemovalPolicy::Abort,
        })
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::ConflictingRemoval { id, position: 1 } if id == second
    ));
    assert!(engine.project().annotation(second).is_some());

    engine
        .execute(Mutation::DeleteAnnotation {
            id: second,
            storyboard: RemovalPolicy::Cascade,
        })
        .unwrap();
    assert_eq!(engine.project().storyboard().list(), vec![first]);
    assert!(engine.project().storyboard().headers().is_empty());
}

#[test]
fn test_merge_touching_annotations() {
    let mut engine = Engine::new(&"x".repeat(100));
    let key = theme(&mut engine, "Key Point", None);
    let extra = theme(&mut engine, "Humor", None);
    let left = annotate(
        &mut engine,
        NewAnnotation::new(Span::new(0, 10), key).with_notes("first"),
    );
    let right = annotate(
        &mut engine,
        NewAnnotation::new(Span::new(10, 25), key)
            .with_notes("second")
            .with_secondary(extra)
            .favorite(true),
    );
    engine.execute(Mutation::StoryboardAppend { id: right }).unwrap();

    let outcome = engine
        .execute(Mutation::Merge {
            survivor: left,
            absorbed: right,
        })
        .unwrap();
    assert_eq!(
        outcome,
        MutationOutcome::Merged {
            survivor: left,
            absorbed: right
        }
    );

    let merged = engine.project().annotation(left).unwrap();
    assert_eq!(merged.spans, vec![Span::new(0, 25)]);
    assert_eq!(merged.meta.notes, "first\n\nsecond");
    assert!(merged.meta.secondary_themes.contains(&extra));
    assert!(merged.meta.favorite);
    assert!(!merged.meta.used);
    assert!(engine.project().annotation(right).is_none());
    assert!(engine.project().storyboard().is_empty());
    assert!(
        engine
            .project()
            .annotations()
            .iter()
            .all(|a| !a.meta.used)
    );
}

#[test]
fn test_merge_keeps_survivor_membership_and_used_flag() {
    let mut engine = Engine::new(&"x".repeat(100));
    let key = theme(&mut engine, "Key Point", None);
    let left = annotate(&mut engine, NewAnnotation::new(Span::new(0, 10), key));
    let right = annotate(&mut engine, NewAnnotation::new(Span::new(10, 25), key));
    engine
        .execute_batch([
            Mutation::StoryboardAppend { id: left },
            Mutation::StoryboardAppend { id: right },
        ])
        .unwrap();

    engine
        .execute(Mutation::Merge {
            survivor: left,
            absorbed: right,
        })
        .unwrap();
    assert!(engine.project().annotation(left).unwrap().meta.used);
    assert_eq!(engine.project().storyboard().list(), vec![left]);

    engine.undo().unwrap();
    assert!(engine.project().annotation(right).unwrap().meta.used);
    assert_eq!(
        engine.project().storyboard().list(),
        vec![left, right]
    );
}

fn merged_three_ways(merges: [(usize, usize); 2]) -> (Vec<Span>, Vec<String>) {
    let mut engine = Engine::new(&"x".repeat(60));
    let key = theme(&mut engine, "Key Point", None);
    let ids = [
        annotate(
            &mut engine,
            NewAnnotation::new(Span::new(0, 10), key).with_tag("opening"),
        ),
        annotate(
            &mut engine,
            NewAnnotation::new(Span::new(10, 20), key)
                .with_tag("family")
                .with_tag("opening"),
        ),
        annotate(
            &mut engine,
            NewAnnotation::new(Span::new(15, 30), key).with_tag("ending"),
        ),
    ];
    for (survivor, absorbed) in merges {
        engine
            .execute(Mutation::Merge {
                survivor: ids[survivor],
                absorbed: ids[absorbed],
            })
            .unwrap();
    }
    assert_eq!(engine.project().annotations().len(), 1);
    let merged = engine.project().annotations().iter().next().unwrap();
    (
        merged.spans.clone(),
        merged.meta.tags.iter().cloned().collect(),
    )
}

#[test]
fn test_merge_result_is_independent_of_order_and_survivor() {
    let expected = (
        vec![Span::new(0, 30)],
        vec![
            "ending".to_string(),
            "family".to_string(),
            "opening".to_string(),
        ],
    );
    for merges in [
        [(0, 1), (0, 2)],
        [(1, 0), (1, 2)],
        [(2, 1), (2, 0)],
        [(1, 2), (0, 1)],
        [(2, 1), (0, 2)],
    ] {
        assert_eq!(merged_three_ways(merges), expected, "merge order {merges:?}");
    }
}

#[test]
fn test_merge_requires_same_theme_and_contact() {
    let mut engine = Engine::new(&"x".repeat(100));
    let key = theme(&mut engine, "Key Point", None);
    let humor = theme(&mut engine, "Humor", None);
    let a = annotate(&mut engine, NewAnnotation::new(Span::new(0, 10), key));
    let b = annotate(&mut engine, NewAnnotation::new(Span::new(10, 20), humor));
    let c = annotate(&mut engine, NewAnnotation::new(Span::new(40, 50), key));

    assert!(matches!(
        engine.execute(Mutation::Merge {
            survivor: a,
            absorbed: b
        }),
        Err(EngineError::DifferentThemes { .. })
    ));
    assert!(matches!(
        engine.execute(Mutation::Merge {
            survivor: a,
            absorbed: c
        }),
        Err(EngineError::NotAdjacent { .. })
    ));
    assert_eq!(engine.project().annotations().len(), 3);
}

#[test]
fn test_move_shared_boundary_reassigns_text() {
    let mut engine = Engine::new(&"x".repeat(100));
    let key = theme(&mut engine, "Key Point", None);
    let humor = theme(&mut engine, "Humor", None);
    let left = annotate(&mut engine, NewAnnotation::new(Span::new(0, 30), key));
    let right = annotate(&mut engine, NewAnnotation::new(Span::new(30, 60), humor));

    engine
        .execute(Mutation::MoveSharedBoundary {
            left,
            right,
            offset: 45,
        })
        .unwrap();
    assert_eq!(spans_of(&engine, left), vec![Span::new(0, 45)]);
    assert_eq!(spans_of(&engine, right), vec![Span::new(45, 60)]);

    let err = engine
        .execute(Mutation::MoveSharedBoundary {
            left,
            right,
            offset: 60,
        })
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidRange { .. }));
    assert_eq!(spans_of(&engine, right), vec![Span::new(45, 60)]);
}

#[test]
fn test_rename_theme_keeps_annotations_and_notifies_once() {
    let mut engine = Engine::new(&"x".repeat(100));
    let key = theme(&mut engine, "Key Point", None);
    let humor = theme(&mut engine, "Humor", None);
    let id = annotate(&mut engine, NewAnnotation::new(Span::new(0, 10), key));

    let batches = Arc::new(Mutex::new(Vec::new()));
    let sink = batches.clone();
    engine.subscribe(move |batch| sink.lock().unwrap().push(batch.clone()));

    engine
        .execute(Mutation::RenameTheme {
            id: key,
            name: "Turning Point".into(),
        })
        .unwrap();
    assert_eq!(engine.project().themes().get(key).unwrap().name, "Turning Point");
    assert_eq!(engine.project().annotation(id).unwrap().meta.theme, key);

    let batches = batches.lock().unwrap();
    assert_eq!(batches.len(), 1);
    assert_eq!(
        batches[0].events,
        vec![MutationEvent::ThemesChanged { themes: vec![key] }]
    );
    drop(batches);

    let err = engine
        .execute(Mutation::RenameTheme {
            id: humor,
            name: "turning point".into(),
        })
        .unwrap_err();
    assert!(matches!(err, EngineError::DuplicateThemeName(_)));
}

#[test]
fn test_theme_capacity_and_hotkeys_are_enforced() {
    let mut engine = Engine::new("text");
    let first = theme(&mut engine, "One", Some(Hotkey::Key1));
    let err = engine
        .execute(Mutation::CreateTheme {
            name: "Two".into(),
            color: "#000".into(),
            hotkey: Some(Hotkey::Key1),
        })
        .unwrap_err();
    assert!(matches!(err, EngineError::HotkeyInUse { .. }));

    for i in 1..engine.config().theme_capacity {
        theme(&mut engine, &format!("Theme {i}"), None);
    }
    let err = engine
        .execute(Mutation::CreateTheme {
            name: "Overflow".into(),
            color: "#000".into(),
            hotkey: None,
        })
        .unwrap_err();
    assert!(matches!(err, EngineError::ThemeCapacity { .. }));
    assert!(engine.project().themes().contains(first));
}

#[test]
fn test_delete_theme_cascades_to_secondary_references() {
    let mut engine = Engine::new(&"x".repeat(100));
    let key = theme(&mut engine, "Key Point", None);
    let humor = theme(&mut engine, "Humor", None);
    let primary = annotate(&mut engine, NewAnnotation::new(Span::new(0, 10), humor));
    let secondary = annotate(
        &mut engine,
        NewAnnotation::new(Span::new(20, 30), key).with_secondary(humor),
    );
    engine.execute(Mutation::StoryboardAppend { id: primary }).unwrap();

    engine
        .execute(Mutation::DeleteTheme {
            id: humor,
            policy: ThemeRemoval::DeleteAnnotations,
        })
        .unwrap();

    assert!(engine.project().annotation(primary).is_none());
    assert!(engine.project().storyboard().is_empty());
    let kept = engine.project().annotation(secondary).unwrap();
    assert!(kept.meta.secondary_themes.is_empty());
    assert!(!engine.themes_in_use().contains(&humor));
}

#[test]
fn test_storyboard_sort_keeps_dividers_with_their_section() {
    let mut engine = Engine::new(&"x".repeat(100));
    let key = theme(&mut engine, "Key Point", None);
    let late = annotate(&mut engine, NewAnnotation::new(Span::new(60, 70), key));
    let early = annotate(&mut engine, NewAnnotation::new(Span::new(0, 10), key));
    let outcomes = engine
        .execute_batch([
            Mutation::AddDivider {
                index: None,
                title: "Act One".into(),
                color: "#e0e0e0".into(),
            },
            Mutation::StoryboardAppend { id: late },
            Mutation::StoryboardAppend { id: early },
        ])
        .unwrap();
    assert!(matches!(outcomes[0], MutationOutcome::DividerAdded(_)));

    engine
        .execute(Mutation::StoryboardSortChronologically)
        .unwrap();
    let entries = engine.project().storyboard().entries();
    assert_eq!(entries[0].annotation(), Some(early));
    assert!(entries[1].divider().is_some());
    assert_eq!(entries[2].annotation(), Some(late));
}

#[test]
fn test_strikethrough_is_clipped_and_excluded_from_words() {
    let mut engine = Engine::new("one two three four five six seven");
    let key = theme(&mut engine, "Key Point", None);
    let id = annotate(&mut engine, NewAnnotation::new(Span::new(0, 18), key));

    engine
        .execute(Mutation::SetStrikethrough {
            id,
            range: Span::new(8, 30),
        })
        .unwrap();
    let annotation = engine.project().annotation(id).unwrap();
    assert_eq!(annotation.strikethrough, vec![Span::new(8, 18)]);
    assert_eq!(scriptoria_core::stats::annotation_words(engine.project().document(), annotation), 2);

    engine
        .execute(Mutation::ClearStrikethrough { id, range: None })
        .unwrap();
    assert!(engine.project().annotation(id).unwrap().strikethrough.is_empty());
}

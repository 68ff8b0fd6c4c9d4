//! Storyboard workflow example
//!
//! Highlights an interview, builds a storyboard, splits an annotation by removing its middle
//! and watches the script panel follow every change.

use scriptoria_core::{
    AnnotationId, Engine, Mutation, MutationOutcome, NewAnnotation, Span, StoryboardEntry,
    StoryboardViewModel, ThemeId, format_duration, render_script,
};
use std::sync::{Arc, Mutex};

const INTERVIEW: &str = "I grew up above the bakery on Elm Street. Every morning the whole \
building smelled of bread. My father worked nights and slept through our breakfasts. \
When the bakery closed we moved to the coast, and I never smelled bread like that again.";

fn theme(engine: &mut Engine, name: &str, color: &str) -> ThemeId {
    match engine.execute(Mutation::CreateTheme {
        name: name.into(),
        color: color.into(),
        hotkey: None,
    }) {
        Ok(MutationOutcome::ThemeCreated(id)) => id,
        other => panic!("cannot create theme {name}: {other:?}"),
    }
}

fn annotate(engine: &mut Engine, text: &str, theme: ThemeId) -> AnnotationId {
    let span = engine
        .project()
        .document()
        .find(text, 0)
        .expect("text is part of the interview");
    match engine.execute(Mutation::CreateAnnotation(NewAnnotation::new(span, theme))) {
        Ok(MutationOutcome::Created(id)) => id,
        other => panic!("cannot annotate: {other:?}"),
    }
}

fn print_script_panel(panel: &Mutex<StoryboardViewModel>) {
    let panel = panel.lock().unwrap();
    for row in panel.rows() {
        match &row.entry {
            StoryboardEntry::Divider(divider) => println!("  -- {} --", divider.title),
            StoryboardEntry::Annotation { id } => println!(
                "  #{id} {}({} words)",
                row.header
                    .as_deref()
                    .map(|h| format!("[{h}] "))
                    .unwrap_or_default(),
                row.words
            ),
        }
    }
    println!("  total: {} words", panel.total_words());
}

fn main() {
    println!("=== Storyboard workflow ===\n");

    let mut engine = Engine::new(INTERVIEW);
    let place = theme(&mut engine, "Place", "#90caf9");
    let family = theme(&mut engine, "Family", "#ffcc80");

    engine.subscribe(|batch| {
        println!(
            "  change: {} events (version {} -> {})",
            batch.events.len(),
            batch.old_version,
            batch.new_version
        );
    });

    let panel = Arc::new(Mutex::new(StoryboardViewModel::new()));
    let view = engine.register_view("script", panel.clone());
    engine.activate_view(view);

    println!("1. Highlight:");
    let bakery = annotate(
        &mut engine,
        "I grew up above the bakery on Elm Street. Every morning the whole building smelled of bread.",
        place,
    );
    let father = annotate(
        &mut engine,
        "My father worked nights and slept through our breakfasts.",
        family,
    );

    println!("\n2. Build the storyboard:");
    engine
        .execute_batch([
            Mutation::AddDivider {
                index: None,
                title: "Childhood".into(),
                color: "#e0e0e0".into(),
            },
            Mutation::StoryboardAppend { id: bakery },
            Mutation::StoryboardAppend { id: father },
            Mutation::SetStoryboardHeader {
                id: father,
                header: Some("Dad".into()),
            },
        ])
        .expect("storyboard batch");
    print_script_panel(&panel);

    println!("\n3. Remove a phrase from the middle of the first highlight:");
    let cut = engine
        .project()
        .document()
        .find("Every morning", 0)
        .expect("text is part of the interview");
    let outcome = engine
        .execute(Mutation::RemoveRange {
            id: bakery,
            range: Span::new(cut.start - 1, cut.end),
        })
        .expect("remove range");
    println!("  outcome: {outcome:?}");
    print_script_panel(&panel);

    println!("\n4. Undo:");
    let label = engine.undo().expect("undo");
    println!("  undone: {label}");
    print_script_panel(&panel);

    println!("\n5. Script ({}):", {
        let report = engine.spawn_stats().join().expect("stats worker");
        format_duration(report.duration())
    });
    print!("{}", render_script(engine.project()));
}

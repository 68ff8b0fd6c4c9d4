//! Subcommand implementations.
//!
//! Every command loads a session file, drives the engine and, for mutating commands, writes the
//! session back. Human-readable output goes to the supplied writer; diagnostics go to the log.

use anyhow::{Context, Result, bail};
use clap::ValueEnum;
use scriptoria_core::{
    Document, Engine, EngineConfig, Hotkey, HtmlOptions, Mutation, Predicate, SessionLoad,
    StatsReport, StructuralMarker, export_json, format_annotation_context, format_duration,
    parse_annotation_response, parse_notes_response, parse_storyboard_response, render_html,
    render_script, resolve_suggestions,
};
use std::fs;
use std::io::Write;
use std::path::Path;

/// Output format of `export`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    /// Standalone HTML with nested highlights.
    Html,
    /// Structured JSON.
    Json,
    /// Plain-text script of the storyboard.
    Script,
}

fn read(path: &Path, what: &str) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("failed to read {what} {}", path.display()))
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).with_context(|| format!("failed to write {}", path.display()))
}

fn open(path: &Path, config: &EngineConfig) -> Result<SessionLoad> {
    let json = read(path, "session")?;
    Engine::load_session(&json, config.clone())
        .with_context(|| format!("failed to load session {}", path.display()))
}

fn save(engine: &Engine, path: &Path) -> Result<()> {
    let json = engine.save_session().context("failed to serialize session")?;
    write_file(path, &json)
}

/// Hotkey argument parser for clap.
pub fn parse_hotkey(value: &str) -> std::result::Result<Hotkey, String> {
    let mut chars = value.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => {
            Hotkey::from_char(c).ok_or_else(|| format!("`{c}` is not one of 1-9, 0, -, ="))
        }
        _ => Err("a hotkey is a single key".to_string()),
    }
}

/// `import`: create a fresh session from a text file and optional markers.
pub fn import(
    config: &EngineConfig,
    text_path: &Path,
    markers_path: Option<&Path>,
    output: &Path,
    out: &mut dyn Write,
) -> Result<()> {
    let text = read(text_path, "text")?;
    let markers: Vec<StructuralMarker> = match markers_path {
        Some(path) => serde_json::from_str(&read(path, "markers")?)
            .with_context(|| format!("invalid markers {}", path.display()))?,
        None => Vec::new(),
    };
    let marker_count = markers.len();
    let document = Document::with_markers(&text, markers).context("markers do not fit the text")?;
    let chars = document.len_chars();
    let engine = Engine::with_document(document, config.clone());
    save(&engine, output)?;

    log::info!(
        "event=import module=cli status=ok chars={} markers={}",
        chars,
        marker_count
    );
    writeln!(
        out,
        "imported {chars} characters and {marker_count} markers into {}",
        output.display()
    )?;
    Ok(())
}

/// `theme add`: define a new theme.
pub fn theme_add(
    config: &EngineConfig,
    session: &Path,
    name: &str,
    color: &str,
    hotkey: Option<Hotkey>,
    out: &mut dyn Write,
) -> Result<()> {
    let mut engine = open(session, config)?.engine;
    engine
        .execute(Mutation::CreateTheme {
            name: name.to_string(),
            color: color.to_string(),
            hotkey,
        })
        .with_context(|| format!("cannot add theme `{name}`"))?;
    save(&engine, session)?;
    writeln!(out, "added theme {name}")?;
    Ok(())
}

/// `theme list`: print the theme table with usage counts.
pub fn theme_list(config: &EngineConfig, session: &Path, out: &mut dyn Write) -> Result<()> {
    let engine = open(session, config)?.engine;
    let project = engine.project();
    for theme in project.themes().iter() {
        let hotkey = theme.hotkey.map(|h| h.to_string()).unwrap_or_else(|| " ".into());
        writeln!(
            out,
            "{:>4}  [{hotkey}]  {:<8}  {}  ({})",
            theme.id.to_string(),
            theme.color,
            theme.name,
            project.annotations().with_theme(theme.id).len()
        )?;
    }
    Ok(())
}

/// `suggest`: apply an assistant's annotation suggestions as one undoable action.
pub fn suggest(
    config: &EngineConfig,
    session: &Path,
    response: &Path,
    dry_run: bool,
    out: &mut dyn Write,
) -> Result<()> {
    let mut engine = open(session, config)?.engine;
    let raw = parse_annotation_response(&read(response, "response")?);
    let parsed = raw.len();
    let report = resolve_suggestions(&engine, raw);

    for (suggestion, reason) in &report.rejected {
        writeln!(out, "skipped \"{}\": {reason}", suggestion.text)?;
    }
    if dry_run {
        writeln!(
            out,
            "{} of {parsed} suggestions would be applied",
            report.accepted.len()
        )?;
        return Ok(());
    }

    let ids = engine
        .apply_suggestions(&report.accepted)
        .context("failed to apply suggestions")?;
    save(&engine, session)?;
    writeln!(out, "applied {} of {parsed} suggestions", ids.len())?;
    Ok(())
}

/// `order`: apply an assistant's storyboard plan.
pub fn order(
    config: &EngineConfig,
    session: &Path,
    response: &Path,
    replace: bool,
    out: &mut dyn Write,
) -> Result<()> {
    let mut engine = open(session, config)?.engine;
    let plan = parse_storyboard_response(&read(response, "response")?);
    for line in &plan.unparsed {
        log::warn!("event=plan_line module=cli status=rejected reason=unparsed");
        writeln!(out, "ignored line: {line}")?;
    }

    let outcome = engine
        .apply_storyboard_plan(&plan, replace)
        .context("failed to apply storyboard plan")?;
    for id in &outcome.skipped {
        writeln!(out, "unknown annotation {id}")?;
    }
    save(&engine, session)?;
    writeln!(
        out,
        "placed {} annotations and {} dividers",
        outcome.placed, outcome.dividers
    )?;
    Ok(())
}

/// `notes`: fill in missing notes and footnotes from an assistant response.
pub fn notes(
    config: &EngineConfig,
    session: &Path,
    response: &Path,
    out: &mut dyn Write,
) -> Result<()> {
    let mut engine = open(session, config)?.engine;
    let suggestions = parse_notes_response(&read(response, "response")?);
    let outcome = engine
        .apply_notes(&suggestions)
        .context("failed to apply notes")?;
    for id in &outcome.skipped {
        writeln!(out, "unknown annotation {id}")?;
    }
    save(&engine, session)?;
    writeln!(
        out,
        "filled {} notes and {} footnotes",
        outcome.notes, outcome.footnotes
    )?;
    Ok(())
}

/// `stats`: storyboard aggregates and estimated speaking time.
pub fn stats(config: &EngineConfig, session: &Path, json: bool, out: &mut dyn Write) -> Result<()> {
    let engine = open(session, config)?.engine;
    let report = StatsReport::compute(&engine.snapshot(), config.words_per_minute);
    if json {
        writeln!(out, "{}", serde_json::to_string_pretty(&report)?)?;
        return Ok(());
    }

    let project = engine.project();
    writeln!(out, "annotations: {}", report.total_annotations)?;
    writeln!(
        out,
        "storyboard:  {} entries, {} dividers",
        report.storyboard.entries, report.storyboard.dividers
    )?;
    writeln!(out, "words:       {}", report.storyboard.words)?;
    writeln!(out, "duration:    {}", format_duration(report.duration()))?;
    for (theme, count) in &report.storyboard.per_theme {
        let name = project
            .themes()
            .get(*theme)
            .map(|t| t.name.as_str())
            .unwrap_or("?");
        writeln!(out, "  {name}: {count}")?;
    }
    Ok(())
}

/// `export`: write an export to a file or to `out`.
pub fn export(
    config: &EngineConfig,
    session: &Path,
    format: ExportFormat,
    title: Option<&str>,
    output: Option<&Path>,
    out: &mut dyn Write,
) -> Result<()> {
    let engine = open(session, config)?.engine;
    let snapshot = engine.snapshot();
    let rendered = match format {
        ExportFormat::Html => {
            let mut options = HtmlOptions::default();
            if let Some(title) = title {
                options.title = title.to_string();
            }
            render_html(&snapshot, &options)
        }
        ExportFormat::Json => export_json(&snapshot).context("failed to serialize export")?,
        ExportFormat::Script => render_script(&snapshot),
    };

    match output {
        Some(path) => {
            write_file(path, &rendered)?;
            log::info!(
                "event=export module=cli status=ok format={:?} bytes={}",
                format,
                rendered.len()
            );
        }
        None => out.write_all(rendered.as_bytes())?,
    }
    Ok(())
}

/// `context`: the annotation listing sent to the assistant.
pub fn context(config: &EngineConfig, session: &Path, out: &mut dyn Write) -> Result<()> {
    let engine = open(session, config)?.engine;
    let listing =
        format_annotation_context(engine.project(), &Predicate::always(), config.max_context_chars);
    out.write_all(listing.as_bytes())?;
    Ok(())
}

/// `check`: load a session, report repairs and fail on remaining integrity issues.
pub fn check(config: &EngineConfig, session: &Path, write: bool, out: &mut dyn Write) -> Result<()> {
    let SessionLoad { engine, repairs } = open(session, config)?;
    for repair in &repairs {
        writeln!(out, "repaired: {repair}")?;
    }
    let issues = engine.project().integrity_issues();
    if !issues.is_empty() {
        for issue in &issues {
            writeln!(out, "issue: {issue:?}")?;
        }
        bail!("{} integrity issues in {}", issues.len(), session.display());
    }

    if write && !repairs.is_empty() {
        save(&engine, session)?;
        writeln!(out, "wrote {} repairs to {}", repairs.len(), session.display())?;
    } else if repairs.is_empty() {
        writeln!(out, "ok")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    const TEXT: &str = "My grandmother kept bees. She said the hive knew when someone died.";

    struct Workspace {
        dir: TempDir,
        config: EngineConfig,
    }

    impl Workspace {
        fn new() -> Self {
            Self {
                dir: tempfile::tempdir().unwrap(),
                config: EngineConfig::default(),
            }
        }

        fn file(&self, name: &str, contents: &str) -> PathBuf {
            let path = self.dir.path().join(name);
            fs::write(&path, contents).unwrap();
            path
        }

        fn session(&self) -> PathBuf {
            let text = self.file("interview.txt", TEXT);
            let session = self.dir.path().join("interview.json");
            import(&self.config, &text, None, &session, &mut Vec::new()).unwrap();
            for (name, hotkey) in [("Family History", Some(Hotkey::Key1)), ("Humor", None)] {
                theme_add(&self.config, &session, name, "#ffd54f", hotkey, &mut Vec::new())
                    .unwrap();
            }
            session
        }
    }

    fn output(f: impl FnOnce(&mut dyn Write) -> Result<()>) -> String {
        let mut buf = Vec::new();
        f(&mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_parse_hotkey() {
        assert_eq!(parse_hotkey("="), Ok(Hotkey::Equals));
        assert!(parse_hotkey("q").is_err());
        assert!(parse_hotkey("12").is_err());
    }

    #[test]
    fn test_import_with_markers() {
        let ws = Workspace::new();
        let text = ws.file("t.txt", TEXT);
        let markers = ws.file(
            "m.json",
            r#"[{ "offset": 26, "kind": "speaker_break", "speaker": "Ann" }]"#,
        );
        let session = ws.dir.path().join("s.json");
        let printed = output(|out| import(&ws.config, &text, Some(&markers), &session, out));
        assert!(printed.starts_with("imported 67 characters and 1 markers"));

        let loaded = open(&session, &ws.config).unwrap();
        assert_eq!(loaded.engine.project().document().markers().len(), 1);
    }

    #[test]
    fn test_import_rejects_out_of_range_markers() {
        let ws = Workspace::new();
        let text = ws.file("t.txt", "short");
        let markers = ws.file("m.json", r#"[{ "offset": 99, "kind": "divider" }]"#);
        let session = ws.dir.path().join("s.json");
        assert!(import(&ws.config, &text, Some(&markers), &session, &mut Vec::new()).is_err());
        assert!(!session.exists());
    }

    #[test]
    fn test_duplicate_theme_is_reported() {
        let ws = Workspace::new();
        let session = ws.session();
        let err = theme_add(&ws.config, &session, "humor", "#000", None, &mut Vec::new())
            .unwrap_err();
        assert!(format!("{err:#}").contains("cannot add theme `humor`"));

        let listing = output(|out| theme_list(&ws.config, &session, out));
        assert_eq!(listing.lines().count(), 2);
        assert!(listing.contains("[1]"));
    }

    #[test]
    fn test_suggest_then_order_then_export() {
        let ws = Workspace::new();
        let session = ws.session();
        let response = ws.file(
            "suggestions.txt",
            "[[ANNOTATION :: Family History :: Humor :: She said the hive knew when someone died. \
             :: Folklore :: :: tags: bees]]\n\
             [[ANNOTATION :: Astronomy :: none :: My grandmother :: x :: y]]\n",
        );

        let dry = output(|out| suggest(&ws.config, &session, &response, true, out));
        assert!(dry.contains("1 of 2 suggestions would be applied"));
        assert_eq!(open(&session, &ws.config).unwrap().engine.project().annotations().len(), 0);

        let printed = output(|out| suggest(&ws.config, &session, &response, false, out));
        assert!(printed.contains("skipped \"My grandmother\": unknown theme `Astronomy`"));
        assert!(printed.contains("applied 1 of 2 suggestions"));

        let plan = ws.file("plan.txt", "DIVIDER :: \"Bees\" :: Order#1\n0 :: Order#2\nnonsense :: here\n");
        let printed = output(|out| order(&ws.config, &session, &plan, true, out));
        assert!(printed.contains("ignored line: nonsense :: here"));
        assert!(printed.contains("placed 1 annotations and 1 dividers"));

        let script = output(|out| {
            export(&ws.config, &session, ExportFormat::Script, None, None, out)
        });
        assert_eq!(
            script,
            "== BEES ==\n\nShe said the hive knew when someone died.\n\n"
        );

        let html_path = ws.dir.path().join("out.html");
        export(
            &ws.config,
            &session,
            ExportFormat::Html,
            Some("Interview"),
            Some(&html_path),
            &mut Vec::new(),
        )
        .unwrap();
        let html = fs::read_to_string(&html_path).unwrap();
        assert!(html.contains("<title>Interview</title>"));
        assert!(html.contains("data-tags=\"bees\""));

        let summary = output(|out| stats(&ws.config, &session, false, out));
        assert!(summary.contains("storyboard:  1 entries, 1 dividers"));
        assert!(summary.contains("words:       8"));
        assert!(summary.contains("Family History: 1"));

        let listing = output(|out| context(&ws.config, &session, out));
        assert!(listing.starts_with("0: \"She said the hive"));
    }

    #[test]
    fn test_notes_keep_existing_text() {
        let ws = Workspace::new();
        let session = ws.session();
        let response = ws.file(
            "suggestions.txt",
            "[[ANNOTATION :: Family History :: none :: She said the hive knew when someone died. \
             :: Folklore :: ]]\n",
        );
        output(|out| suggest(&ws.config, &session, &response, false, out));

        let response = ws.file(
            "notes.txt",
            "[[NOTES :: 0 :: Omens :: Bees were told of every death]]\n[[NOTES :: 5 :: SKIP :: x]]\n",
        );
        let printed = output(|out| notes(&ws.config, &session, &response, out));
        assert!(printed.contains("unknown annotation 5"));
        assert!(printed.contains("filled 0 notes and 1 footnotes"));

        let engine = open(&session, &ws.config).unwrap().engine;
        let annotation = engine.project().annotations().iter().next().unwrap();
        assert_eq!(annotation.meta.notes, "Folklore");
        assert_eq!(annotation.meta.footnote, "Bees were told of every death");
    }

    #[test]
    fn test_check_repairs_and_writes_back() {
        let ws = Workspace::new();
        let session = ws.file(
            "broken.json",
            r##"{
                "format_version": 1,
                "document": { "text": "hello world" },
                "themes": [{ "id": 0, "name": "Plot", "color": "#fff" }],
                "annotations": [
                    { "id": 0, "spans": [{ "start": 0, "end": 5 }], "theme": 0 },
                    { "id": 1, "spans": [{ "start": 6, "end": 11 }], "theme": 7 }
                ],
                "storyboard": { "entries": [{ "kind": "annotation", "id": 1 }] }
            }"##,
        );

        let printed = output(|out| check(&ws.config, &session, true, out));
        assert!(printed.contains("repaired: dropped annotation 1 with missing theme t7"));
        assert!(printed.contains("repaired: dropped storyboard entry of missing annotation 1"));
        assert!(printed.contains("wrote 2 repairs"));

        let printed = output(|out| check(&ws.config, &session, false, out));
        assert_eq!(printed, "ok\n");
    }
}

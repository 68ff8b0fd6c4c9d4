//! View Synchronizer: turns committed change sets into targeted view updates.
//!
//! After every committed action the engine derives a [`ChangeBatch`] from the ops it applied and
//! hands it to the [`SyncHub`]. The number of events in a batch is proportional to the number of
//! annotations the action touched, never to the size of the project.
//!
//! Views are registered dormant. A view that is never opened costs nothing; the first
//! [`activate`](SyncHub::activate) materializes it from the current project with one
//! [`on_snapshot`](ViewSubscriber::on_snapshot) call, after which it only receives increments.

use crate::annotation::AnnotationId;
use crate::engine::Project;
use crate::history::Op;
use crate::span::Span;
use crate::theme::ThemeId;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, PoisonError};

/// Identifier of a registered view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ViewId(u64);

impl ViewId {
    /// Get the underlying numeric id.
    pub fn get(self) -> u64 {
        self.0
    }
}

/// Before/after state of an annotation that survived an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateDelta {
    /// Updated annotation.
    pub id: AnnotationId,
    /// Spans before the action.
    pub old_spans: Vec<Span>,
    /// Spans after the action.
    pub new_spans: Vec<Span>,
    /// Primary theme before the action.
    pub old_theme: ThemeId,
    /// Primary theme after the action.
    pub new_theme: ThemeId,
}

impl UpdateDelta {
    /// Check if the covered ranges changed.
    pub fn spans_changed(&self) -> bool {
        self.old_spans != self.new_spans
    }
}

/// One targeted update instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationEvent {
    /// An annotation appeared.
    Created {
        /// New annotation.
        id: AnnotationId,
        /// Its spans.
        spans: Vec<Span>,
        /// Its primary theme.
        theme: ThemeId,
    },
    /// An annotation changed spans and/or metadata.
    Updated(UpdateDelta),
    /// An annotation disappeared.
    Deleted {
        /// Removed annotation.
        id: AnnotationId,
        /// Its last spans.
        spans: Vec<Span>,
        /// Its last primary theme.
        theme: ThemeId,
    },
    /// The storyboard changed (order, membership, dividers or headers).
    Reordered {
        /// Annotation ids in their new storyboard order.
        order: Vec<AnnotationId>,
    },
    /// Theme rows were created, renamed, recolored, rebound or deleted.
    ThemesChanged {
        /// Affected theme ids.
        themes: Vec<ThemeId>,
    },
}

/// All events produced by one committed action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeBatch {
    /// Engine version before the action.
    pub old_version: u64,
    /// Engine version after the action.
    pub new_version: u64,
    /// Events in delivery order: themes first, then annotations, then the storyboard.
    pub events: Vec<MutationEvent>,
}

/// A materialized view of the project.
///
/// Every callback receives the engine-owned [`Project`] for lookups, already in its post-action
/// state. Only [`on_snapshot`](Self::on_snapshot) is mandatory.
pub trait ViewSubscriber: Send {
    /// Build the view from scratch.
    fn on_snapshot(&mut self, project: &Project);

    /// An annotation was created.
    fn on_created(&mut self, id: AnnotationId, spans: &[Span], theme: ThemeId, project: &Project) {
        let _ = (id, spans, theme, project);
    }

    /// An annotation was updated.
    fn on_updated(&mut self, delta: &UpdateDelta, project: &Project) {
        let _ = (delta, project);
    }

    /// An annotation was deleted.
    fn on_deleted(&mut self, id: AnnotationId, spans: &[Span], theme: ThemeId, project: &Project) {
        let _ = (id, spans, theme, project);
    }

    /// The storyboard changed.
    fn on_reordered(&mut self, order: &[AnnotationId], project: &Project) {
        let _ = (order, project);
    }

    /// Theme rows changed.
    fn on_themes_changed(&mut self, themes: &[ThemeId], project: &Project) {
        let _ = (themes, project);
    }
}

impl<T: ViewSubscriber> ViewSubscriber for Arc<Mutex<T>> {
    fn on_snapshot(&mut self, project: &Project) {
        self.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .on_snapshot(project);
    }

    fn on_created(&mut self, id: AnnotationId, spans: &[Span], theme: ThemeId, project: &Project) {
        self.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .on_created(id, spans, theme, project);
    }

    fn on_updated(&mut self, delta: &UpdateDelta, project: &Project) {
        self.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .on_updated(delta, project);
    }

    fn on_deleted(&mut self, id: AnnotationId, spans: &[Span], theme: ThemeId, project: &Project) {
        self.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .on_deleted(id, spans, theme, project);
    }

    fn on_reordered(&mut self, order: &[AnnotationId], project: &Project) {
        self.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .on_reordered(order, project);
    }

    fn on_themes_changed(&mut self, themes: &[ThemeId], project: &Project) {
        self.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .on_themes_changed(themes, project);
    }
}

/// Raw batch callback type.
pub type BatchCallback = Box<dyn FnMut(&ChangeBatch) + Send>;

struct RegisteredView {
    name: String,
    subscriber: Box<dyn ViewSubscriber>,
    active: bool,
}

/// Registry of views and batch callbacks.
#[derive(Default)]
pub struct SyncHub {
    views: BTreeMap<ViewId, RegisteredView>,
    next_view_id: u64,
    callbacks: Vec<BatchCallback>,
}

impl std::fmt::Debug for SyncHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncHub")
            .field("views", &self.views.len())
            .field("callbacks", &self.callbacks.len())
            .finish()
    }
}

impl SyncHub {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a dormant view.
    pub fn register(&mut self, name: impl Into<String>, subscriber: Box<dyn ViewSubscriber>) -> ViewId {
        let id = ViewId(self.next_view_id);
        self.next_view_id += 1;
        self.views.insert(
            id,
            RegisteredView {
                name: name.into(),
                subscriber,
                active: false,
            },
        );
        id
    }

    /// Remove a view.
    pub fn unregister(&mut self, view: ViewId) -> bool {
        self.views.remove(&view).is_some()
    }

    /// Materialize a view from `project` and start delivering events to it.
    ///
    /// Activating an already active view is a no-op. Returns `false` for unknown views.
    pub fn activate(&mut self, view: ViewId, project: &Project) -> bool {
        let Some(registered) = self.views.get_mut(&view) else {
            return false;
        };
        if !registered.active {
            registered.subscriber.on_snapshot(project);
            registered.active = true;
            log::debug!(
                "event=view_activate module=sync status=ok view={} name={}",
                view.0,
                registered.name
            );
        }
        true
    }

    /// Stop delivering events to a view. It is rebuilt on the next activation.
    pub fn deactivate(&mut self, view: ViewId) -> bool {
        match self.views.get_mut(&view) {
            Some(registered) => {
                registered.active = false;
                true
            }
            None => false,
        }
    }

    /// Check if a view is receiving events.
    pub fn is_active(&self, view: ViewId) -> bool {
        self.views.get(&view).is_some_and(|v| v.active)
    }

    /// Subscribe to raw change batches.
    pub fn subscribe<F>(&mut self, callback: F)
    where
        F: FnMut(&ChangeBatch) + Send + 'static,
    {
        self.callbacks.push(Box::new(callback));
    }

    /// Rebuild every active view from scratch (after out-of-band repairs).
    pub fn resnapshot(&mut self, project: &Project) {
        for registered in self.views.values_mut().filter(|v| v.active) {
            registered.subscriber.on_snapshot(project);
        }
    }

    /// Deliver a batch to callbacks and active views.
    pub fn dispatch(&mut self, batch: &ChangeBatch, project: &Project) {
        for callback in &mut self.callbacks {
            callback(batch);
        }

        for registered in self.views.values_mut().filter(|v| v.active) {
            let subscriber = &mut registered.subscriber;
            for event in &batch.events {
                match event {
                    MutationEvent::Created { id, spans, theme } => {
                        subscriber.on_created(*id, spans, *theme, project)
                    }
                    MutationEvent::Updated(delta) => subscriber.on_updated(delta, project),
                    MutationEvent::Deleted { id, spans, theme } => {
                        subscriber.on_deleted(*id, spans, *theme, project)
                    }
                    MutationEvent::Reordered { order } => subscriber.on_reordered(order, project),
                    MutationEvent::ThemesChanged { themes } => {
                        subscriber.on_themes_changed(themes, project)
                    }
                }
            }
        }
    }
}

#[derive(Default)]
struct Track {
    before: Option<(Vec<Span>, ThemeId)>,
    after: Option<(Vec<Span>, ThemeId)>,
}

/// Coalesce the ops of one change set into view events.
///
/// Per annotation only the state before the first op and after the last op matter, so an
/// annotation created and removed within the same set produces no event at all.
pub fn events_for(ops: &[Op], project: &Project) -> Vec<MutationEvent> {
    let mut order: Vec<AnnotationId> = Vec::new();
    let mut tracks: HashMap<AnnotationId, Track> = HashMap::new();
    let mut themes: BTreeSet<ThemeId> = BTreeSet::new();
    let mut storyboard_touched = false;

    for op in ops {
        let (id, before, after) = match op {
            Op::InsertAnnotation(a) => (a.id, None, Some((a.spans.clone(), a.meta.theme))),
            Op::RemoveAnnotation(a) => (a.id, Some((a.spans.clone(), a.meta.theme)), None),
            Op::ReplaceAnnotation { before, after } => (
                after.id,
                Some((before.spans.clone(), before.meta.theme)),
                Some((after.spans.clone(), after.meta.theme)),
            ),
            Op::InsertTheme(t) | Op::RemoveTheme(t) => {
                themes.insert(t.id);
                continue;
            }
            Op::ReplaceTheme { after, .. } => {
                themes.insert(after.id);
                continue;
            }
            Op::StoryboardInsert { .. }
            | Op::StoryboardRemove { .. }
            | Op::StoryboardReorder { .. }
            | Op::SetHeader { .. } => {
                storyboard_touched = true;
                continue;
            }
        };

        let track = tracks.entry(id).or_insert_with(|| {
            order.push(id);
            Track {
                before,
                after: None,
            }
        });
        track.after = after;
    }

    let mut events = Vec::with_capacity(order.len() + 2);
    if !themes.is_empty() {
        events.push(MutationEvent::ThemesChanged {
            themes: themes.into_iter().collect(),
        });
    }

    for id in order {
        let Some(track) = tracks.remove(&id) else {
            continue;
        };
        match (track.before, track.after) {
            (None, Some((spans, theme))) => events.push(MutationEvent::Created { id, spans, theme }),
            (Some((spans, theme)), None) => events.push(MutationEvent::Deleted { id, spans, theme }),
            (Some((old_spans, old_theme)), Some((new_spans, new_theme))) => {
                events.push(MutationEvent::Updated(UpdateDelta {
                    id,
                    old_spans,
                    new_spans,
                    old_theme,
                    new_theme,
                }))
            }
            (None, None) => {}
        }
    }

    if storyboard_touched {
        events.push(MutationEvent::Reordered {
            order: project.storyboard().list(),
        });
    }
    events
}

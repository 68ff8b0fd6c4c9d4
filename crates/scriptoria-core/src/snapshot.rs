//! Immutable project snapshots.
//!
//! A [`ProjectSnapshot`] is a versioned copy of the [`Project`] taken between two mutations. It
//! is `Send + Sync`, so it can be handed to a background thread for saving or statistics while
//! the engine keeps accepting mutations.

use crate::engine::{Engine, Project};
use std::ops::Deref;
use std::sync::Arc;

/// A versioned, read-only copy of the project.
#[derive(Debug, Clone)]
pub struct ProjectSnapshot {
    version: u64,
    project: Project,
}

impl ProjectSnapshot {
    /// Engine version the snapshot was taken at.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// The captured project.
    pub fn project(&self) -> &Project {
        &self.project
    }

    /// Wrap in an `Arc` for sharing with workers.
    pub fn shared(self) -> Arc<ProjectSnapshot> {
        Arc::new(self)
    }
}

impl Deref for ProjectSnapshot {
    type Target = Project;

    fn deref(&self) -> &Project {
        &self.project
    }
}

impl Engine {
    /// Capture the current state.
    pub fn snapshot(&self) -> ProjectSnapshot {
        ProjectSnapshot {
            version: self.version(),
            project: self.project.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{Engine, Mutation, MutationOutcome, NewAnnotation, Span};

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn test_snapshot_is_isolated_from_later_mutations() {
        assert_send_sync::<super::ProjectSnapshot>();

        let mut engine = Engine::new("one two three four");
        let MutationOutcome::ThemeCreated(theme) = engine
            .execute(Mutation::CreateTheme {
                name: "Plot".into(),
                color: "#123456".into(),
                hotkey: None,
            })
            .unwrap()
        else {
            panic!("theme not created");
        };
        let snapshot = engine.snapshot();

        engine
            .execute(Mutation::CreateAnnotation(NewAnnotation::new(Span::new(0, 3), theme)))
            .unwrap();

        assert_eq!(snapshot.version(), 1);
        assert!(snapshot.annotations().is_empty());
        assert_eq!(engine.project().annotations().len(), 1);
    }
}

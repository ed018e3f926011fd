//! Undo/redo for the active artifact.
//!
//! Stacks hold prior body snapshots as plain text and are scoped to one
//! artifact: activating another artifact clears both. Recording a change
//! clears the redo stack, so history is linear with no branching redo.

use tracing::debug;

/// Linear undo/redo history over the active artifact's body.
#[derive(Debug, Default)]
pub struct VersionController {
    artifact_id: Option<String>,
    undo_stack: Vec<String>,
    redo_stack: Vec<String>,
}

impl VersionController {
    pub fn new() -> Self {
        Self::default()
    }

    /// The artifact the stacks currently belong to.
    pub fn artifact_id(&self) -> Option<&str> {
        self.artifact_id.as_deref()
    }

    /// Scope the stacks to a newly activated artifact, discarding both.
    pub fn on_activate(&mut self, artifact_id: Option<&str>) {
        debug!(
            "Version history reset for {:?} (dropping {} undo, {} redo)",
            artifact_id,
            self.undo_stack.len(),
            self.redo_stack.len()
        );
        self.artifact_id = artifact_id.map(str::to_string);
        self.undo_stack.clear();
        self.redo_stack.clear();
    }

    /// Record the body that a refinement is about to replace.
    pub fn record_change(&mut self, previous_body: impl Into<String>) {
        self.undo_stack.push(previous_body.into());
        self.redo_stack.clear();
    }

    /// Step back. `current_body` moves onto the redo stack; the returned
    /// body must be written back to the store. `None` if there is nothing
    /// to undo.
    pub fn undo(&mut self, current_body: &str) -> Option<String> {
        let previous = self.undo_stack.pop()?;
        self.redo_stack.push(current_body.to_string());
        Some(previous)
    }

    /// Step forward again. Symmetric to [`undo`](Self::undo).
    pub fn redo(&mut self, current_body: &str) -> Option<String> {
        let next = self.redo_stack.pop()?;
        self.undo_stack.push(current_body.to_string());
        Some(next)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_depth(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_depth(&self) -> usize {
        self.redo_stack.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Apply `n` refinements B0 -> B1 -> ... -> Bn the way the studio does.
    fn refine_chain(n: usize) -> (VersionController, String) {
        let mut versions = VersionController::new();
        versions.on_activate(Some("a"));
        let mut body = "B0".to_string();
        for i in 1..=n {
            versions.record_change(body.clone());
            body = format!("B{i}");
        }
        (versions, body)
    }

    #[test]
    fn undo_n_times_returns_to_origin_and_redo_returns_to_latest() {
        let (mut versions, mut body) = refine_chain(4);
        assert_eq!(body, "B4");

        for _ in 0..4 {
            body = versions.undo(&body).unwrap();
        }
        assert_eq!(body, "B0");
        assert!(versions.undo(&body).is_none());

        for _ in 0..4 {
            body = versions.redo(&body).unwrap();
        }
        assert_eq!(body, "B4");
        assert!(versions.redo(&body).is_none());
    }

    #[test]
    fn change_after_undo_clears_redo() {
        let (mut versions, body) = refine_chain(2);
        let body = versions.undo(&body).unwrap();
        assert!(versions.can_redo());

        versions.record_change(body);
        assert!(!versions.can_redo());
        assert!(versions.redo("B-new").is_none());
    }

    #[test]
    fn activation_clears_both_stacks() {
        let (mut versions, body) = refine_chain(3);
        versions.undo(&body).unwrap();
        assert!(versions.can_undo() && versions.can_redo());

        versions.on_activate(Some("b"));
        assert_eq!(versions.undo_depth(), 0);
        assert_eq!(versions.redo_depth(), 0);
        assert_eq!(versions.artifact_id(), Some("b"));
    }

    #[test]
    fn empty_stacks_are_noops() {
        let mut versions = VersionController::new();
        assert!(versions.undo("x").is_none());
        assert!(versions.redo("x").is_none());
        assert_eq!(versions.redo_depth(), 0);
    }
}

//! The session context: one active artifact, its undo/redo history, the
//! rendered preview, and the overlay over it.
//!
//! [`Studio`] is an explicit value rather than ambient state, so several
//! independent sessions can coexist and each is testable on its own.
//!
//! Remote requests are split in two phases so that a front end holding the
//! studio behind a lock never holds it across the network call:
//!
//! ```ignore
//! let ticket = studio.lock().begin_refine("make it dark")?;   // sets busy
//! let result = ticket.run(&gateway).await;                    // no lock held
//! studio.lock().finish_refinement(ticket, result)?;           // clears busy
//! ```
//!
//! [`Studio::generate`] and [`Studio::refine`] do all three steps for
//! callers that own the studio outright.

use tracing::{info, warn};

use crate::error::{Notice, NoticeCategory, ServiceError, StoreError, StudioError};
use crate::overlay::{
    EditAction, EditPrompt, EditResponse, InteractionOverlay, MarkupDocument, OverlayMode,
    OverlayOutcome, PointerEvent, PreviewView, RenderedDocument,
};
use crate::store::{Artifact, ArtifactStore, KvSlot, PersistReport};
use crate::synthesis::{GenerateRequest, ImagePayload, SynthesisGateway};
use crate::transfer::{self, ExportFormat};
use crate::versions::VersionController;

/// An in-flight generation. Obtained from [`Studio::begin_generate`], must be
/// handed back to [`Studio::finish_generation`].
#[derive(Debug)]
#[must_use = "a ticket must be finished or the studio stays busy"]
pub struct GenerationTicket {
    request: GenerateRequest,
}

impl GenerationTicket {
    pub fn request(&self) -> &GenerateRequest {
        &self.request
    }

    pub async fn run(&self, gateway: &SynthesisGateway) -> Result<String, ServiceError> {
        gateway.generate(&self.request).await
    }
}

/// An in-flight refinement of the active artifact.
#[derive(Debug)]
#[must_use = "a ticket must be finished or the studio stays busy"]
pub struct RefinementTicket {
    artifact_id: String,
    previous_body: String,
    instruction: String,
    image: Option<ImagePayload>,
}

impl RefinementTicket {
    pub fn artifact_id(&self) -> &str {
        &self.artifact_id
    }

    pub fn instruction(&self) -> &str {
        &self.instruction
    }

    pub async fn run(&self, gateway: &SynthesisGateway) -> Result<String, ServiceError> {
        gateway
            .refine(&self.previous_body, &self.instruction, self.image.as_ref())
            .await
    }
}

pub struct Studio {
    store: ArtifactStore,
    versions: VersionController,
    overlay: InteractionOverlay,
    preview: Option<MarkupDocument>,
    busy: bool,
    notices: Vec<Notice>,
}

impl Studio {
    /// Open a session over the history persisted in `slot`. No artifact is
    /// active until one is generated, imported, or activated.
    pub fn open(slot: Box<dyn KvSlot>) -> Self {
        let store = ArtifactStore::load(slot);
        info!("Studio opened with {} artifact(s)", store.history().len());
        Self {
            store,
            versions: VersionController::new(),
            overlay: InteractionOverlay::new(),
            preview: None,
            busy: false,
            notices: Vec::new(),
        }
    }

    // ── Accessors ──────────────────────────────────────────────────

    pub fn history(&self) -> &[Artifact] {
        self.store.history()
    }

    pub fn active(&self) -> Option<&Artifact> {
        self.store.active()
    }

    pub fn get(&self, id: &str) -> Option<&Artifact> {
        self.store.get(id)
    }

    pub fn versions(&self) -> &VersionController {
        &self.versions
    }

    pub fn can_undo(&self) -> bool {
        self.versions.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.versions.can_redo()
    }

    /// Whether a generation or refinement is in flight.
    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn overlay(&self) -> &InteractionOverlay {
        &self.overlay
    }

    /// The rendered form of the active artifact.
    pub fn preview(&self) -> Option<&MarkupDocument> {
        self.preview.as_ref()
    }

    /// Drain queued notices about non-fatal failures.
    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    // ── Generation ─────────────────────────────────────────────────

    pub fn begin_generate(
        &mut self,
        request: GenerateRequest,
    ) -> Result<GenerationTicket, StudioError> {
        self.claim()?;
        Ok(GenerationTicket { request })
    }

    /// Complete a generation: on success the new artifact is added to the
    /// front of history, activated, and rendered, with empty undo/redo.
    pub fn finish_generation(
        &mut self,
        ticket: GenerationTicket,
        result: Result<String, ServiceError>,
    ) -> Result<Artifact, StudioError> {
        self.busy = false;
        let body = result?;
        let GenerationTicket { request } = ticket;
        let artifact = Artifact::new(request.artifact_name(), body, request.image);
        let persisted = self.store.add(artifact.clone());
        self.note_persist(persisted);
        self.after_activation();
        Ok(artifact)
    }

    /// Generate a new artifact in one call.
    pub async fn generate(
        &mut self,
        gateway: &SynthesisGateway,
        request: GenerateRequest,
    ) -> Result<Artifact, StudioError> {
        let ticket = self.begin_generate(request)?;
        let result = ticket.run(gateway).await;
        self.finish_generation(ticket, result)
    }

    // ── Refinement ─────────────────────────────────────────────────

    /// Start refining the active artifact with a free-text instruction.
    pub fn begin_refine(
        &mut self,
        instruction: impl Into<String>,
    ) -> Result<RefinementTicket, StudioError> {
        let active = self.store.active().ok_or(StudioError::NoActiveArtifact)?;
        let ticket = RefinementTicket {
            artifact_id: active.id.clone(),
            previous_body: active.body.clone(),
            instruction: instruction.into(),
            image: active.source_image.clone(),
        };
        self.claim()?;
        Ok(ticket)
    }

    /// Complete a refinement: the previous body goes onto the undo stack and
    /// the new one replaces it in the store.
    ///
    /// A result for an artifact that is no longer active, or whose body
    /// changed meanwhile, is discarded with [`StudioError::ActiveChanged`].
    pub fn finish_refinement(
        &mut self,
        ticket: RefinementTicket,
        result: Result<String, ServiceError>,
    ) -> Result<Artifact, StudioError> {
        self.busy = false;
        let body = result?;
        let unchanged = self
            .store
            .active()
            .is_some_and(|a| a.id == ticket.artifact_id && a.body == ticket.previous_body);
        if !unchanged {
            warn!(
                "Discarding refinement of {}: active artifact changed",
                ticket.artifact_id
            );
            return Err(StudioError::ActiveChanged);
        }

        self.versions.record_change(ticket.previous_body);
        self.apply_body(&ticket.artifact_id, &body);
        info!(
            "Refined {} (undo depth {})",
            ticket.artifact_id,
            self.versions.undo_depth()
        );
        self.store
            .active()
            .cloned()
            .ok_or(StudioError::NoActiveArtifact)
    }

    /// Refine the active artifact in one call.
    pub async fn refine(
        &mut self,
        gateway: &SynthesisGateway,
        instruction: &str,
    ) -> Result<Artifact, StudioError> {
        let ticket = self.begin_refine(instruction)?;
        let result = ticket.run(gateway).await;
        self.finish_refinement(ticket, result)
    }

    // ── Undo / redo ────────────────────────────────────────────────

    /// Step the active artifact back one version. Returns `false` when there
    /// is nothing to undo.
    pub fn undo(&mut self) -> Result<bool, StudioError> {
        self.step(VersionController::undo)
    }

    pub fn redo(&mut self) -> Result<bool, StudioError> {
        self.step(VersionController::redo)
    }

    fn step(
        &mut self,
        op: fn(&mut VersionController, &str) -> Option<String>,
    ) -> Result<bool, StudioError> {
        if self.busy {
            return Err(StudioError::Busy);
        }
        let active = self.store.active().ok_or(StudioError::NoActiveArtifact)?;
        let id = active.id.clone();
        let Some(body) = op(&mut self.versions, &active.body) else {
            return Ok(false);
        };
        self.apply_body(&id, &body);
        Ok(true)
    }

    // ── History management ─────────────────────────────────────────

    /// Make a history entry the active artifact. Undo/redo always restart
    /// empty, even when re-activating the current artifact.
    pub fn activate(&mut self, id: &str) -> Result<&Artifact, StudioError> {
        if self.store.set_active(id).is_none() {
            return Err(StudioError::UnknownArtifact(id.to_string()));
        }
        info!("Activated {id}");
        self.after_activation();
        self.store.active().ok_or(StudioError::NoActiveArtifact)
    }

    pub fn rename(&mut self, id: &str, name: &str) -> Result<(), StudioError> {
        match self.store.rename(id, name) {
            Ok(true) => Ok(()),
            Ok(false) => Err(StudioError::UnknownArtifact(id.to_string())),
            Err(e) => {
                self.note_store_error(e);
                Ok(())
            }
        }
    }

    /// Delete a history entry. Removing the active artifact leaves nothing
    /// active.
    pub fn remove(&mut self, id: &str) -> Result<Artifact, StudioError> {
        let Some(removed) = self.store.get(id).cloned() else {
            return Err(StudioError::UnknownArtifact(id.to_string()));
        };
        let was_active = self.store.active().is_some_and(|a| a.id == id);
        if let Err(e) = self.store.remove(id) {
            self.note_store_error(e);
        }
        info!("Removed {id}");
        if was_active {
            self.after_activation();
        }
        Ok(removed)
    }

    pub fn clear(&mut self) {
        if let Err(e) = self.store.clear() {
            self.note_store_error(e);
        }
        info!("History cleared");
        self.after_activation();
    }

    // ── Export / import ────────────────────────────────────────────

    /// Export artifact `id`, or the active one when `id` is `None`.
    pub fn export(&self, id: Option<&str>, format: ExportFormat) -> Result<String, StudioError> {
        let artifact = match id {
            Some(id) => self
                .store
                .get(id)
                .ok_or_else(|| StudioError::UnknownArtifact(id.to_string()))?,
            None => self.store.active().ok_or(StudioError::NoActiveArtifact)?,
        };
        transfer::export(artifact, format).map_err(StudioError::Export)
    }

    /// Import a snapshot and make it the active artifact. A rejected import
    /// leaves the session untouched.
    pub fn import(&mut self, text: &str) -> Result<Artifact, StudioError> {
        let artifact = transfer::import_snapshot(text)?;
        let persisted = self.store.add(artifact.clone());
        self.note_persist(persisted);
        self.after_activation();
        Ok(artifact)
    }

    // ── Overlay ────────────────────────────────────────────────────

    pub fn set_mode(&mut self, mode: OverlayMode) {
        let doc = self.preview.as_mut().map(|d| d as &mut dyn RenderedDocument);
        self.overlay.set_mode(mode, doc);
    }

    pub fn set_view(&mut self, view: PreviewView) {
        let doc = self.preview.as_mut().map(|d| d as &mut dyn RenderedDocument);
        self.overlay.set_view(view, doc);
    }

    /// Feed a pointer event from the rendered preview to the overlay.
    pub fn pointer(&mut self, event: PointerEvent) -> OverlayOutcome {
        match self.preview.as_mut() {
            Some(doc) => self.overlay.handle(doc, event),
            None => OverlayOutcome::PassThrough,
        }
    }

    pub fn choose_action(&mut self, action: EditAction) -> Result<EditPrompt, StudioError> {
        Ok(self.overlay.choose_action(action)?)
    }

    /// Answer the pending edit prompt. Returns the refinement instruction to
    /// dispatch through [`begin_refine`](Self::begin_refine) or
    /// [`refine`](Self::refine), or `None` if the edit was cancelled.
    pub fn submit_edit(&mut self, response: EditResponse) -> Result<Option<String>, StudioError> {
        Ok(self.overlay.submit_edit(response)?)
    }

    pub fn dismiss_panel(&mut self) {
        self.overlay.dismiss();
    }

    // ── Internals ──────────────────────────────────────────────────

    fn claim(&mut self) -> Result<(), StudioError> {
        if self.busy {
            return Err(StudioError::Busy);
        }
        self.busy = true;
        Ok(())
    }

    /// Write a new body for `id` and re-render the preview.
    fn apply_body(&mut self, id: &str, body: &str) {
        if let Err(e) = self.store.update_body(id, body) {
            self.note_store_error(e);
        }
        self.render_preview();
    }

    /// The active artifact changed identity (or went away).
    fn after_activation(&mut self) {
        let id = self.store.active().map(|a| a.id.clone());
        self.versions.on_activate(id.as_deref());
        self.render_preview();
    }

    fn render_preview(&mut self) {
        self.overlay.document_replaced();
        self.preview = self.store.active().map(|a| MarkupDocument::parse(&a.body));
        match &self.preview {
            Some(doc) => self.overlay.attach(doc),
            None => self.overlay.detach(),
        }
    }

    fn note_persist(&mut self, result: Result<PersistReport, StoreError>) {
        match result {
            Ok(report) if !report.evicted.is_empty() => {
                self.notices.push(Notice::new(
                    NoticeCategory::Storage,
                    format!(
                        "Storage is nearly full: removed {} oldest artifact(s) from history.",
                        report.evicted.len()
                    ),
                ));
            }
            Ok(_) => {}
            Err(e) => self.note_store_error(e),
        }
    }

    fn note_store_error(&mut self, e: StoreError) {
        warn!("Persisting history failed: {e}");
        self.notices.push(StudioError::Store(e).notice());
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::error::{ServiceErrorKind, SlotError};
    use crate::overlay::ElementPath;
    use crate::store::MemorySlot;
    use crate::synthesis::gateway::tests::{ScriptedService, fast_config};

    fn studio() -> (Studio, MemorySlot) {
        let slot = MemorySlot::new(None);
        (Studio::open(Box::new(slot.clone())), slot)
    }

    fn gateway(responses: Vec<Result<String, ServiceError>>) -> SynthesisGateway {
        SynthesisGateway::new(Arc::new(ScriptedService::new(responses)), &fast_config())
    }

    const DASHBOARD: &str = "<html><body><h1 id=\"t\">Dashboard</h1></body></html>";
    const DARK: &str =
        "<html><body style=\"background-color: #000\"><h1 id=\"t\">Dashboard</h1></body></html>";

    #[tokio::test]
    async fn generate_refine_undo_switch_scenario() {
        let (mut studio, _slot) = studio();
        let gw = gateway(vec![
            Ok(DASHBOARD.into()),
            Ok("<p>other</p>".into()),
            Ok(DARK.into()),
        ]);

        let dashboard = studio
            .generate(&gw, GenerateRequest::prompt("dashboard"))
            .await
            .unwrap();
        assert_eq!(studio.history()[0].id, dashboard.id);
        assert_eq!(dashboard.name, "dashboard");
        assert!(!studio.can_undo() && !studio.can_redo());

        let other = studio
            .generate(&gw, GenerateRequest::prompt("other"))
            .await
            .unwrap();
        studio.activate(&dashboard.id).unwrap();

        let refined = studio.refine(&gw, "make it dark").await.unwrap();
        assert_eq!(refined.body, DARK);
        assert_ne!(refined.body, dashboard.body);
        assert_eq!(studio.versions().undo_depth(), 1);
        assert_eq!(studio.versions().redo_depth(), 0);

        assert!(studio.undo().unwrap());
        assert_eq!(studio.active().unwrap().body, DASHBOARD);
        assert_eq!(studio.get(&dashboard.id).unwrap().body, DASHBOARD);
        assert_eq!(studio.versions().redo_depth(), 1);

        studio.activate(&other.id).unwrap();
        studio.activate(&dashboard.id).unwrap();
        assert!(!studio.can_undo());
        assert!(!studio.can_redo());
    }

    #[tokio::test]
    async fn redo_after_undo_restores_latest() {
        let (mut studio, slot) = studio();
        let gw = gateway(vec![Ok("<p>v0</p>".into()), Ok("<p>v1</p>".into())]);
        studio.generate(&gw, GenerateRequest::prompt("x")).await.unwrap();
        studio.refine(&gw, "v1").await.unwrap();

        studio.undo().unwrap();
        assert!(studio.redo().unwrap());
        assert_eq!(studio.active().unwrap().body, "<p>v1</p>");
        assert!(!studio.redo().unwrap());
        assert!(slot.contents().unwrap().contains("<p>v1</p>"));
    }

    #[test]
    fn second_request_while_busy_is_rejected() {
        let (mut studio, _slot) = studio();
        let ticket = studio.begin_generate(GenerateRequest::prompt("a")).unwrap();
        assert!(matches!(
            studio.begin_generate(GenerateRequest::prompt("b")),
            Err(StudioError::Busy)
        ));

        let err = studio
            .finish_generation(
                ticket,
                Err(ServiceError::new(ServiceErrorKind::Client, "bad")),
            )
            .unwrap_err();
        assert!(matches!(err, StudioError::Service(_)));
        assert!(!studio.is_busy());
        assert!(studio.history().is_empty());
    }

    #[test]
    fn refinement_for_a_switched_artifact_is_discarded() {
        let (mut studio, _slot) = studio();
        let a = studio.import(r#"{"name":"a","body":"<p>a</p>"}"#).unwrap();
        let b = studio.import(r#"{"name":"b","body":"<p>b</p>"}"#).unwrap();

        let ticket = studio.begin_refine("change").unwrap();
        assert_eq!(ticket.artifact_id(), b.id);
        studio.activate(&a.id).unwrap();

        let err = studio
            .finish_refinement(ticket, Ok("<p>changed</p>".into()))
            .unwrap_err();
        assert!(matches!(err, StudioError::ActiveChanged));
        assert_eq!(studio.get(&b.id).unwrap().body, "<p>b</p>");
        assert!(!studio.is_busy());
        assert!(!studio.can_undo());
    }

    #[test]
    fn refine_without_active_artifact() {
        let (mut studio, _slot) = studio();
        assert!(matches!(
            studio.begin_refine("x"),
            Err(StudioError::NoActiveArtifact)
        ));
        assert!(!studio.is_busy());
        assert!(matches!(studio.undo(), Err(StudioError::NoActiveArtifact)));
    }

    #[test]
    fn rejected_import_leaves_state_untouched() {
        let (mut studio, _slot) = studio();
        let kept = studio.import(r#"{"name":"kept","body":"<p/>"}"#).unwrap();

        let err = studio.import(r#"{"body": 1}"#).unwrap_err();
        assert_eq!(err.notice().category, NoticeCategory::Import);
        assert_eq!(studio.history().len(), 1);
        assert_eq!(studio.active().unwrap().id, kept.id);
    }

    #[test]
    fn export_active_and_by_id() {
        let (mut studio, _slot) = studio();
        assert!(matches!(
            studio.export(None, ExportFormat::Document),
            Err(StudioError::NoActiveArtifact)
        ));
        let a = studio.import(r#"{"id":"fixed","name":"a","body":"<p>a</p>"}"#).unwrap();
        assert_eq!(a.id, "fixed");
        assert_eq!(studio.export(None, ExportFormat::Document).unwrap(), "<p>a</p>");
        let snapshot = studio.export(Some("fixed"), ExportFormat::Snapshot).unwrap();
        assert!(snapshot.contains("\"id\": \"fixed\""));
        assert!(matches!(
            studio.export(Some("nope"), ExportFormat::Snapshot),
            Err(StudioError::UnknownArtifact(_))
        ));
    }

    #[test]
    fn storage_overflow_queues_notice() {
        let slot = MemorySlot::new(Some(32));
        let mut studio = Studio::open(Box::new(slot));
        let big = format!(r#"{{"name":"big","body":"{}"}}"#, "x".repeat(100));
        studio.import(&big).unwrap();

        let notices = studio.take_notices();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].category, NoticeCategory::Storage);
        assert!(studio.take_notices().is_empty());
        assert_eq!(studio.active().unwrap().name, "big");
    }

    #[test]
    fn eviction_is_reported() {
        let entry = |n: &str| {
            format!(
                r#"{{"id":"{n}","name":"{n}","body":"{}","createdAt":"2025-01-01T00:00:00Z"}}"#,
                "x".repeat(50)
            )
        };
        let mut sizing = Studio::open(Box::new(MemorySlot::new(None)));
        sizing.import(&entry("a")).unwrap();
        let one = serde_json::to_string(sizing.history()).unwrap().len();

        let mut studio = Studio::open(Box::new(MemorySlot::new(Some(one))));
        studio.import(&entry("a")).unwrap();
        studio.import(&entry("b")).unwrap();

        assert_eq!(studio.history().len(), 1);
        assert_eq!(studio.history()[0].id, "b");
        let notices = studio.take_notices();
        assert_eq!(notices[0].category, NoticeCategory::Storage);
        assert!(notices[0].message.contains("removed 1"));
    }

    #[test]
    fn remove_active_clears_preview_and_versions() {
        let (mut studio, _slot) = studio();
        let a = studio.import(r#"{"name":"a","body":"<p>a</p>"}"#).unwrap();
        assert!(studio.preview().is_some());

        studio.remove(&a.id).unwrap();
        assert!(studio.active().is_none());
        assert!(studio.preview().is_none());
        assert!(matches!(
            studio.remove(&a.id),
            Err(StudioError::UnknownArtifact(_))
        ));
    }

    #[test]
    fn rename_and_clear() {
        let (mut studio, _slot) = studio();
        let a = studio.import(r#"{"name":"a","body":"<p>a</p>"}"#).unwrap();
        studio.rename(&a.id, "Landing page").unwrap();
        assert_eq!(studio.active().unwrap().name, "Landing page");

        studio.clear();
        assert!(studio.history().is_empty());
        assert!(studio.active().is_none());
    }

    #[tokio::test]
    async fn overlay_edit_dispatches_refinement() {
        let (mut studio, _slot) = studio();
        let gw = gateway(vec![Ok("<h1>Revenue</h1>".into())]);
        studio
            .import(&serde_json::json!({"name": "d", "body": DASHBOARD}).to_string())
            .unwrap();

        studio.set_mode(OverlayMode::Edit);
        let path: ElementPath = "/1/0".parse().unwrap();
        let out = studio.pointer(PointerEvent::Click { path, x: 1.0, y: 2.0 });
        assert!(matches!(out, OverlayOutcome::MenuOpened { .. }));

        studio.choose_action(EditAction::EditText).unwrap();
        let instruction = studio
            .submit_edit(EditResponse::Value("Revenue".into()))
            .unwrap()
            .unwrap();
        assert!(instruction.contains("[h1#t \"Dashboard\"]"));

        studio.refine(&gw, &instruction).await.unwrap();
        assert_eq!(studio.active().unwrap().body, "<h1>Revenue</h1>");
        assert!(studio.can_undo());
        assert_eq!(studio.overlay().mode(), OverlayMode::Edit);
        assert!(studio.overlay().panel().is_none());
    }

    #[test]
    fn store_error_notice_is_storage() {
        let notice = StudioError::Store(StoreError::CapacityExhausted(
            SlotError::QuotaExceeded { needed: 2, quota: 1 },
        ))
        .notice();
        assert_eq!(notice.category, NoticeCategory::Storage);
    }
}

//! Interaction-mode overlay over a rendered artifact.
//!
//! The overlay is a state machine with three modes. In [`OverlayMode::Interact`]
//! every pointer event passes through untouched. In `Inspect` and `Edit` the
//! overlay highlights the hovered element (one at a time) and intercepts
//! clicks: Inspect produces an [`InspectedElementReport`], Edit opens a
//! [`ContextMenu`] whose actions turn into refinement instructions.
//!
//! The overlay only acts while it is wired to a loaded document shown in the
//! [`PreviewView::Preview`] sub-view. Wiring to a document that is still
//! loading is deferred until [`InteractionOverlay::document_loaded`]; a
//! replaced document must be re-attached.

pub mod document;
pub mod edit;
pub mod markup;

use serde::Serialize;
use tracing::debug;

pub use document::{
    ComputedStyle, ElementInfo, ElementPath, HighlightKind, RenderedDocument, STYLE_PROPERTIES,
};
pub use edit::{ContextMenu, EditAction, EditPrompt, EditResponse, EditTargetDescriptor};
pub use markup::MarkupDocument;

use crate::error::OverlayError;
use edit::truncate_chars;

const REPORT_TEXT_CHARS: usize = 100;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlayMode {
    #[default]
    Interact,
    Inspect,
    Edit,
}

impl OverlayMode {
    fn highlight(self) -> Option<HighlightKind> {
        match self {
            OverlayMode::Interact => None,
            OverlayMode::Inspect => Some(HighlightKind::Inspect),
            OverlayMode::Edit => Some(HighlightKind::Edit),
        }
    }
}

impl std::str::FromStr for OverlayMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "interact" => Ok(OverlayMode::Interact),
            "inspect" => Ok(OverlayMode::Inspect),
            "edit" => Ok(OverlayMode::Edit),
            other => Err(format!("unknown mode '{other}' (interact, inspect, edit)")),
        }
    }
}

/// Which sub-view of the active artifact is displayed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreviewView {
    #[default]
    Preview,
    Source,
}

/// Overlay wiring state relative to the displayed document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Wiring {
    #[default]
    Detached,
    /// A document is displayed but has not finished loading.
    Deferred,
    Attached,
}

/// Pointer events raised inside the rendered document.
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PointerEvent {
    Hover { path: ElementPath },
    Leave { path: ElementPath },
    Click { path: ElementPath, x: f64, y: f64 },
}

/// Inspect-mode result for a clicked element.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InspectedElementReport {
    pub path: ElementPath,
    pub tag: String,
    pub id: Option<String>,
    pub classes: Vec<String>,
    /// Text content truncated to 100 characters.
    pub text: String,
    pub style: ComputedStyle,
}

/// What the overlay did with a pointer event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum OverlayOutcome {
    /// Not intercepted; the document handles the event natively.
    PassThrough,
    Highlighted { path: ElementPath },
    Unhighlighted { path: ElementPath },
    Report { report: InspectedElementReport },
    MenuOpened { menu: ContextMenu },
    /// Intercepted but produced nothing (e.g. a click on `<body>`).
    Ignored,
}

impl OverlayOutcome {
    /// Whether the document's native handling of the event is suppressed.
    pub fn prevents_default(&self) -> bool {
        !matches!(self, OverlayOutcome::PassThrough)
    }
}

/// The single visible panel.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Panel {
    Report(InspectedElementReport),
    Menu(ContextMenu),
}

#[derive(Debug, Clone)]
struct PendingEdit {
    action: EditAction,
    target: EditTargetDescriptor,
}

#[derive(Debug, Default)]
pub struct InteractionOverlay {
    mode: OverlayMode,
    view: PreviewView,
    wiring: Wiring,
    hovered: Option<ElementPath>,
    panel: Option<Panel>,
    pending: Option<PendingEdit>,
}

impl InteractionOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> OverlayMode {
        self.mode
    }

    pub fn view(&self) -> PreviewView {
        self.view
    }

    pub fn wiring(&self) -> Wiring {
        self.wiring
    }

    pub fn hovered(&self) -> Option<&ElementPath> {
        self.hovered.as_ref()
    }

    /// The open report or context menu, if any.
    pub fn panel(&self) -> Option<&Panel> {
        self.panel.as_ref()
    }

    /// Whether pointer events are currently intercepted.
    pub fn is_active(&self) -> bool {
        self.wiring == Wiring::Attached
            && self.view == PreviewView::Preview
            && self.mode != OverlayMode::Interact
    }

    // ── Mode and view ──────────────────────────────────────────────

    /// Explicit mode switch. Clears the highlight and any open panel.
    pub fn set_mode(&mut self, mode: OverlayMode, doc: Option<&mut dyn RenderedDocument>) {
        if mode == self.mode {
            return;
        }
        debug!("Overlay mode {:?} -> {:?}", self.mode, mode);
        self.reset(doc);
        self.mode = mode;
    }

    pub fn set_view(&mut self, view: PreviewView, doc: Option<&mut dyn RenderedDocument>) {
        if view == self.view {
            return;
        }
        debug!("Preview view {:?} -> {:?}", self.view, view);
        self.reset(doc);
        self.view = view;
    }

    // ── Wiring ─────────────────────────────────────────────────────

    /// Wire the overlay to a displayed document. If it has not finished
    /// loading, wiring is deferred.
    pub fn attach(&mut self, doc: &dyn RenderedDocument) {
        self.wiring = if doc.is_loaded() {
            Wiring::Attached
        } else {
            Wiring::Deferred
        };
        debug!("Overlay wiring: {:?}", self.wiring);
    }

    /// Completes a deferred attach.
    pub fn document_loaded(&mut self) {
        if self.wiring == Wiring::Deferred {
            self.wiring = Wiring::Attached;
            debug!("Overlay wiring: Attached (after load)");
        }
    }

    /// The document body was replaced; old listeners and panels are gone
    /// and the overlay waits for the new document to load.
    pub fn document_replaced(&mut self) {
        self.hovered = None;
        self.close_panel();
        if self.wiring != Wiring::Detached {
            self.wiring = Wiring::Deferred;
        }
    }

    pub fn detach(&mut self) {
        self.hovered = None;
        self.close_panel();
        self.wiring = Wiring::Detached;
    }

    // ── Pointer events ─────────────────────────────────────────────

    pub fn handle(&mut self, doc: &mut dyn RenderedDocument, event: PointerEvent) -> OverlayOutcome {
        if !self.is_active() {
            return OverlayOutcome::PassThrough;
        }
        match event {
            PointerEvent::Hover { path } => self.on_hover(doc, path),
            PointerEvent::Leave { path } => self.on_leave(doc, path),
            PointerEvent::Click { path, x, y } => self.on_click(doc, path, x, y),
        }
    }

    fn on_hover(&mut self, doc: &mut dyn RenderedDocument, path: ElementPath) -> OverlayOutcome {
        let Some(info) = doc.element(&path) else {
            return OverlayOutcome::Ignored;
        };
        if self.hovered.as_ref() == Some(&path) {
            return OverlayOutcome::Highlighted { path };
        }
        if let Some(previous) = self.hovered.take() {
            doc.set_highlight(&previous, None);
        }
        if info.is_document_root() {
            return OverlayOutcome::Ignored;
        }
        doc.set_highlight(&path, self.mode.highlight());
        self.hovered = Some(path.clone());
        OverlayOutcome::Highlighted { path }
    }

    fn on_leave(&mut self, doc: &mut dyn RenderedDocument, path: ElementPath) -> OverlayOutcome {
        if self.hovered.as_ref() != Some(&path) {
            return OverlayOutcome::Ignored;
        }
        doc.set_highlight(&path, None);
        self.hovered = None;
        OverlayOutcome::Unhighlighted { path }
    }

    fn on_click(
        &mut self,
        doc: &mut dyn RenderedDocument,
        path: ElementPath,
        x: f64,
        y: f64,
    ) -> OverlayOutcome {
        let Some(info) = doc.element(&path).filter(|info| !info.is_document_root()) else {
            return OverlayOutcome::Ignored;
        };
        match self.mode {
            OverlayMode::Inspect => {
                let Some(style) = doc.computed_style(&path) else {
                    return OverlayOutcome::Ignored;
                };
                let report = InspectedElementReport {
                    path,
                    text: truncate_chars(&info.text, REPORT_TEXT_CHARS),
                    tag: info.tag,
                    id: info.id,
                    classes: info.classes,
                    style,
                };
                debug!("Inspected <{}> at {}", report.tag, report.path);
                self.open_panel(Panel::Report(report.clone()));
                OverlayOutcome::Report { report }
            }
            OverlayMode::Edit => {
                let menu =
                    ContextMenu::new(path, EditTargetDescriptor::from_element(&info), x, y);
                debug!("Context menu for [{}]", menu.target.locator());
                self.open_panel(Panel::Menu(menu.clone()));
                OverlayOutcome::MenuOpened { menu }
            }
            OverlayMode::Interact => OverlayOutcome::PassThrough,
        }
    }

    // ── Edit flow ──────────────────────────────────────────────────

    /// Pick an action from the open context menu. The menu closes and the
    /// returned prompt must be answered with [`submit_edit`](Self::submit_edit).
    pub fn choose_action(&mut self, action: EditAction) -> Result<EditPrompt, OverlayError> {
        if !matches!(self.panel, Some(Panel::Menu(_))) {
            return Err(OverlayError::NoMenu);
        }
        let Some(Panel::Menu(menu)) = self.panel.take() else {
            return Err(OverlayError::NoMenu);
        };
        let prompt = EditPrompt {
            action,
            question: action.prompt(),
            needs_value: action.needs_value(),
            target: menu.target.clone(),
        };
        self.pending = Some(PendingEdit {
            action,
            target: menu.target,
        });
        Ok(prompt)
    }

    /// Answer the pending prompt. Returns the refinement instruction to
    /// dispatch, or `None` if the user cancelled.
    pub fn submit_edit(&mut self, response: EditResponse) -> Result<Option<String>, OverlayError> {
        let Some(pending) = self.pending.take() else {
            return Err(OverlayError::NoPendingEdit);
        };
        let value = match (&response, pending.action.needs_value()) {
            (EditResponse::Cancel, _) => return Ok(None),
            (EditResponse::Value(v), true) if !v.trim().is_empty() => v.trim().to_string(),
            (EditResponse::Confirm, false) => String::new(),
            (_, true) => {
                self.pending = Some(pending);
                return Err(OverlayError::EmptyValue);
            }
            (_, false) => {
                self.pending = Some(pending);
                return Err(OverlayError::NotConfirmed);
            }
        };
        Ok(Some(pending.action.instruction(&pending.target, &value)))
    }

    pub fn has_pending_edit(&self) -> bool {
        self.pending.is_some()
    }

    /// Close whatever panel is open and drop any pending edit.
    pub fn dismiss(&mut self) {
        self.close_panel();
    }

    fn open_panel(&mut self, panel: Panel) {
        self.pending = None;
        self.panel = Some(panel);
    }

    fn close_panel(&mut self) {
        self.panel = None;
        self.pending = None;
    }

    fn reset(&mut self, doc: Option<&mut dyn RenderedDocument>) {
        if let (Some(path), Some(doc)) = (self.hovered.take(), doc) {
            doc.set_highlight(&path, None);
        }
        self.close_panel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"<html><head><style>.cta { color: white; background-color: blue }</style></head>
<body><main><h1 id="title">Sales</h1><button class="cta">Buy now</button></main></body></html>"#;

    fn p(s: &str) -> ElementPath {
        s.parse().unwrap()
    }

    fn attached(mode: OverlayMode) -> (InteractionOverlay, MarkupDocument) {
        let mut doc = MarkupDocument::parse(DOC);
        let mut overlay = InteractionOverlay::new();
        overlay.attach(&doc);
        overlay.set_mode(mode, Some(&mut doc));
        (overlay, doc)
    }

    fn click(path: &str) -> PointerEvent {
        PointerEvent::Click {
            path: p(path),
            x: 10.0,
            y: 20.0,
        }
    }

    #[test]
    fn interact_mode_passes_everything_through() {
        let (mut overlay, mut doc) = attached(OverlayMode::Interact);
        let out = overlay.handle(&mut doc, click("/1/0/1"));
        assert_eq!(out, OverlayOutcome::PassThrough);
        assert!(!out.prevents_default());
        assert!(overlay.panel().is_none());
    }

    #[test]
    fn hover_keeps_a_single_highlight() {
        let (mut overlay, mut doc) = attached(OverlayMode::Inspect);
        overlay.handle(&mut doc, PointerEvent::Hover { path: p("/1/0/0") });
        overlay.handle(&mut doc, PointerEvent::Hover { path: p("/1/0/1") });

        let lit: Vec<_> = doc.highlights().collect();
        assert_eq!(lit, vec![(&p("/1/0/1"), HighlightKind::Inspect)]);

        let out = overlay.handle(&mut doc, PointerEvent::Leave { path: p("/1/0/1") });
        assert_eq!(out, OverlayOutcome::Unhighlighted { path: p("/1/0/1") });
        assert_eq!(doc.highlights().count(), 0);
    }

    #[test]
    fn edit_mode_uses_distinct_highlight() {
        let (mut overlay, mut doc) = attached(OverlayMode::Edit);
        overlay.handle(&mut doc, PointerEvent::Hover { path: p("/1/0") });
        assert_eq!(
            doc.highlights().next(),
            Some((&p("/1/0"), HighlightKind::Edit))
        );
    }

    #[test]
    fn inspect_click_reports_computed_style() {
        let (mut overlay, mut doc) = attached(OverlayMode::Inspect);
        let out = overlay.handle(&mut doc, click("/1/0/1"));
        assert!(out.prevents_default());

        let OverlayOutcome::Report { report } = out else {
            panic!("expected report, got {out:?}");
        };
        assert_eq!(report.tag, "button");
        assert_eq!(report.classes, vec!["cta"]);
        assert_eq!(report.text, "Buy now");
        assert_eq!(report.style.color, "white");
        assert_eq!(report.style.background_color, "blue");
        assert!(matches!(overlay.panel(), Some(Panel::Report(_))));
    }

    #[test]
    fn clicks_on_body_or_root_are_ignored() {
        let (mut overlay, mut doc) = attached(OverlayMode::Inspect);
        assert_eq!(overlay.handle(&mut doc, click("/1")), OverlayOutcome::Ignored);
        assert_eq!(overlay.handle(&mut doc, click("/")), OverlayOutcome::Ignored);
        assert!(overlay.panel().is_none());
    }

    #[test]
    fn only_one_panel_at_a_time() {
        let (mut overlay, mut doc) = attached(OverlayMode::Inspect);
        overlay.handle(&mut doc, click("/1/0/0"));
        overlay.handle(&mut doc, click("/1/0/1"));
        let Some(Panel::Report(report)) = overlay.panel() else {
            panic!("expected report panel");
        };
        assert_eq!(report.tag, "button");
    }

    #[test]
    fn mode_switch_clears_panel_and_highlight() {
        let (mut overlay, mut doc) = attached(OverlayMode::Edit);
        overlay.handle(&mut doc, PointerEvent::Hover { path: p("/1/0/1") });
        overlay.handle(&mut doc, click("/1/0/1"));
        assert!(overlay.panel().is_some());

        overlay.set_mode(OverlayMode::Interact, Some(&mut doc));
        assert!(overlay.panel().is_none());
        assert!(overlay.hovered().is_none());
        assert_eq!(doc.highlights().count(), 0);
    }

    #[test]
    fn source_view_disables_overlay() {
        let (mut overlay, mut doc) = attached(OverlayMode::Inspect);
        overlay.set_view(PreviewView::Source, Some(&mut doc));
        assert_eq!(overlay.handle(&mut doc, click("/1/0/1")), OverlayOutcome::PassThrough);
    }

    #[test]
    fn wiring_is_deferred_until_load() {
        struct Loading(MarkupDocument, bool);
        impl RenderedDocument for Loading {
            fn is_loaded(&self) -> bool {
                self.1
            }
            fn element(&self, path: &ElementPath) -> Option<ElementInfo> {
                self.0.element(path)
            }
            fn computed_style(&self, path: &ElementPath) -> Option<ComputedStyle> {
                self.0.computed_style(path)
            }
            fn set_highlight(&mut self, path: &ElementPath, kind: Option<HighlightKind>) {
                self.0.set_highlight(path, kind)
            }
        }

        let mut doc = Loading(MarkupDocument::parse(DOC), false);
        let mut overlay = InteractionOverlay::new();
        overlay.set_mode(OverlayMode::Inspect, None);
        overlay.attach(&doc);
        assert_eq!(overlay.wiring(), Wiring::Deferred);
        assert_eq!(overlay.handle(&mut doc, click("/1/0/1")), OverlayOutcome::PassThrough);

        doc.1 = true;
        overlay.document_loaded();
        assert!(matches!(
            overlay.handle(&mut doc, click("/1/0/1")),
            OverlayOutcome::Report { .. }
        ));

        overlay.document_replaced();
        assert_eq!(overlay.wiring(), Wiring::Deferred);
        assert!(overlay.panel().is_none());
        overlay.attach(&doc);
        assert!(overlay.is_active());
    }

    #[test]
    fn edit_flow_builds_instruction() {
        let (mut overlay, mut doc) = attached(OverlayMode::Edit);
        let out = overlay.handle(&mut doc, click("/1/0/0"));
        let OverlayOutcome::MenuOpened { menu } = out else {
            panic!("expected menu, got {out:?}");
        };
        assert_eq!((menu.x, menu.y), (10.0, 20.0));
        assert_eq!(menu.actions.len(), 4);

        let prompt = overlay.choose_action(EditAction::EditText).unwrap();
        assert!(prompt.needs_value);
        assert!(overlay.panel().is_none());

        assert_eq!(
            overlay.submit_edit(EditResponse::Value("  ".into())),
            Err(OverlayError::EmptyValue)
        );
        let instruction = overlay
            .submit_edit(EditResponse::Value("Revenue".into()))
            .unwrap()
            .unwrap();
        assert_eq!(
            instruction,
            "Change the text content of the element [h1#title \"Sales\"] to \"Revenue\"."
        );
        assert!(!overlay.has_pending_edit());
    }

    #[test]
    fn remove_requires_confirmation() {
        let (mut overlay, mut doc) = attached(OverlayMode::Edit);
        overlay.handle(&mut doc, click("/1/0/1"));
        overlay.choose_action(EditAction::Remove).unwrap();

        assert_eq!(
            overlay.submit_edit(EditResponse::Value("yes".into())),
            Err(OverlayError::NotConfirmed)
        );
        let instruction = overlay.submit_edit(EditResponse::Confirm).unwrap().unwrap();
        assert!(instruction.starts_with("Remove the element [button.cta"));
    }

    #[test]
    fn cancel_and_missing_menu() {
        let (mut overlay, mut doc) = attached(OverlayMode::Edit);
        assert_eq!(
            overlay.choose_action(EditAction::ChangeStyle),
            Err(OverlayError::NoMenu)
        );
        assert_eq!(
            overlay.submit_edit(EditResponse::Confirm),
            Err(OverlayError::NoPendingEdit)
        );

        overlay.handle(&mut doc, click("/1/0/1"));
        overlay.choose_action(EditAction::ChangeStyle).unwrap();
        assert_eq!(overlay.submit_edit(EditResponse::Cancel), Ok(None));
    }
}

//! Edit-mode context menu and refinement instruction synthesis.

use serde::Serialize;

use super::document::{ElementInfo, ElementPath};

const LOCATOR_TEXT_CHARS: usize = 50;

/// Fixed actions offered by the edit context menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EditAction {
    EditText,
    ChangeStyle,
    AdjustDimensions,
    Remove,
}

impl EditAction {
    pub const ALL: [EditAction; 4] = [
        EditAction::EditText,
        EditAction::ChangeStyle,
        EditAction::AdjustDimensions,
        EditAction::Remove,
    ];

    pub fn label(self) -> &'static str {
        match self {
            EditAction::EditText => "Edit text",
            EditAction::ChangeStyle => "Change style",
            EditAction::AdjustDimensions => "Adjust dimensions",
            EditAction::Remove => "Remove element",
        }
    }

    /// Question put to the user before the instruction can be built.
    pub fn prompt(self) -> &'static str {
        match self {
            EditAction::EditText => "New text content:",
            EditAction::ChangeStyle => "Describe the style change (e.g. \"red background, bold\"):",
            EditAction::AdjustDimensions => "New dimensions (e.g. \"width 300px, height 200px\"):",
            EditAction::Remove => "Remove this element?",
        }
    }

    /// Whether the action takes a free-text value (otherwise it takes a
    /// confirmation).
    pub fn needs_value(self) -> bool {
        !matches!(self, EditAction::Remove)
    }

    /// Compose the refinement instruction for this action on `target`.
    pub fn instruction(self, target: &EditTargetDescriptor, value: &str) -> String {
        let loc = target.locator();
        match self {
            EditAction::EditText => {
                format!("Change the text content of the element [{loc}] to \"{value}\".")
            }
            EditAction::ChangeStyle => {
                format!("Update the style of the element [{loc}] with: {value}.")
            }
            EditAction::AdjustDimensions => {
                format!("Adjust the dimensions of the element [{loc}] to {value}.")
            }
            EditAction::Remove => format!("Remove the element [{loc}] from the document."),
        }
    }
}

impl std::str::FromStr for EditAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "edit_text" | "text" => Ok(EditAction::EditText),
            "change_style" | "style" => Ok(EditAction::ChangeStyle),
            "adjust_dimensions" | "dimensions" | "size" => Ok(EditAction::AdjustDimensions),
            "remove" | "remove_element" | "delete" => Ok(EditAction::Remove),
            other => Err(format!("unknown edit action '{other}'")),
        }
    }
}

/// Human-readable handle on the element an edit targets. Built from the
/// element's identity, used only to phrase an instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EditTargetDescriptor {
    pub tag: String,
    pub id: Option<String>,
    pub classes: Vec<String>,
    pub text: String,
}

impl EditTargetDescriptor {
    pub fn from_element(info: &ElementInfo) -> Self {
        Self {
            tag: info.tag.clone(),
            id: info.id.clone().filter(|id| !id.is_empty()),
            classes: info.classes.clone(),
            text: truncate_chars(&info.text, LOCATOR_TEXT_CHARS),
        }
    }

    /// `tag#id.class1.class2 "text…"`; absent parts are omitted.
    pub fn locator(&self) -> String {
        let mut loc = self.tag.clone();
        if let Some(id) = &self.id {
            loc.push('#');
            loc.push_str(id);
        }
        for class in &self.classes {
            loc.push('.');
            loc.push_str(class);
        }
        if !self.text.is_empty() {
            loc.push_str(&format!(" \"{}\"", self.text));
        }
        loc
    }
}

/// An open edit context menu.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextMenu {
    pub path: ElementPath,
    pub target: EditTargetDescriptor,
    pub x: f64,
    pub y: f64,
    pub actions: Vec<EditAction>,
}

impl ContextMenu {
    pub fn new(path: ElementPath, target: EditTargetDescriptor, x: f64, y: f64) -> Self {
        Self {
            path,
            target,
            x,
            y,
            actions: EditAction::ALL.to_vec(),
        }
    }
}

/// What the user is asked once an action has been chosen.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EditPrompt {
    pub action: EditAction,
    pub question: &'static str,
    pub needs_value: bool,
    pub target: EditTargetDescriptor,
}

/// The user's answer to an [`EditPrompt`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditResponse {
    Value(String),
    Confirm,
    Cancel,
}

/// Truncate to `max` characters, marking the cut with an ellipsis.
pub(crate) fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max).collect();
    out.push('…');
    out
}

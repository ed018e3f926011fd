//! The rendered-document seam the overlay operates on.
//!
//! A [`RenderedDocument`] is the isolated, displayed form of an artifact
//! body. The overlay only ever asks it four things: whether it has finished
//! loading, what element sits at a path, the element's resolved style for the
//! fixed [`STYLE_PROPERTIES`] schema, and to show or hide a highlight.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The fixed set of style properties read for an inspection report.
pub const STYLE_PROPERTIES: [&str; 11] = [
    "color",
    "background-color",
    "font-size",
    "font-weight",
    "font-family",
    "padding",
    "margin",
    "border-radius",
    "border",
    "display",
    "position",
];

/// Address of an element: child-element indices walking down from `<html>`.
///
/// Displayed as `/1/0/2`; the `<html>` element itself is `/`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementPath(Vec<usize>);

impl ElementPath {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn new(indices: Vec<usize>) -> Self {
        Self(indices)
    }

    pub fn child(&self, index: usize) -> Self {
        let mut indices = self.0.clone();
        indices.push(index);
        Self(indices)
    }

    pub fn indices(&self) -> &[usize] {
        &self.0
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }
}

impl fmt::Display for ElementPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("/");
        }
        for i in &self.0 {
            write!(f, "/{i}")?;
        }
        Ok(())
    }
}

impl FromStr for ElementPath {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .split('/')
            .filter(|part| !part.is_empty())
            .map(|part| {
                part.parse::<usize>()
                    .map_err(|_| format!("invalid element path segment '{part}' in '{s}'"))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }
}

impl Serialize for ElementPath {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ElementPath {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Identity and content of one element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ElementInfo {
    /// Lowercase tag name.
    pub tag: String,
    pub id: Option<String>,
    pub classes: Vec<String>,
    /// Text content, whitespace-collapsed, untruncated.
    pub text: String,
}

impl ElementInfo {
    /// Whether this is the document body or root element, which the overlay
    /// never targets.
    pub fn is_document_root(&self) -> bool {
        matches!(self.tag.as_str(), "html" | "body")
    }
}

/// Resolved values for [`STYLE_PROPERTIES`], in schema order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ComputedStyle {
    pub color: String,
    pub background_color: String,
    pub font_size: String,
    pub font_weight: String,
    pub font_family: String,
    pub padding: String,
    pub margin: String,
    pub border_radius: String,
    pub border: String,
    pub display: String,
    pub position: String,
}

impl ComputedStyle {
    /// Look a property up by its CSS name.
    pub fn get(&self, property: &str) -> Option<&str> {
        let value = match property {
            "color" => &self.color,
            "background-color" => &self.background_color,
            "font-size" => &self.font_size,
            "font-weight" => &self.font_weight,
            "font-family" => &self.font_family,
            "padding" => &self.padding,
            "margin" => &self.margin,
            "border-radius" => &self.border_radius,
            "border" => &self.border,
            "display" => &self.display,
            "position" => &self.position,
            _ => return None,
        };
        Some(value)
    }

    /// Set a property by its CSS name. Unknown names are ignored.
    pub fn set(&mut self, property: &str, value: impl Into<String>) {
        let slot = match property {
            "color" => &mut self.color,
            "background-color" => &mut self.background_color,
            "font-size" => &mut self.font_size,
            "font-weight" => &mut self.font_weight,
            "font-family" => &mut self.font_family,
            "padding" => &mut self.padding,
            "margin" => &mut self.margin,
            "border-radius" => &mut self.border_radius,
            "border" => &mut self.border,
            "display" => &mut self.display,
            "position" => &mut self.position,
            _ => return,
        };
        *slot = value.into();
    }

    /// `(property, value)` pairs in schema order.
    pub fn entries(&self) -> impl Iterator<Item = (&'static str, &str)> + '_ {
        STYLE_PROPERTIES
            .iter()
            .map(move |p| (*p, self.get(p).unwrap_or_default()))
    }
}

/// Highlight styles; Inspect and Edit modes use visibly distinct ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HighlightKind {
    Inspect,
    Edit,
}

/// A displayed, isolated document the overlay can query and decorate.
pub trait RenderedDocument: Send {
    /// Whether the document finished loading. Overlay wiring is deferred
    /// until it has.
    fn is_loaded(&self) -> bool;

    fn element(&self, path: &ElementPath) -> Option<ElementInfo>;

    fn computed_style(&self, path: &ElementPath) -> Option<ComputedStyle>;

    /// Show (`Some`) or remove (`None`) the overlay highlight on `path`.
    fn set_highlight(&mut self, path: &ElementPath, kind: Option<HighlightKind>);
}

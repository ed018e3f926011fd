//! Headless rendered document built from an artifact body.
//!
//! [`MarkupDocument`] parses the markup once (via `scraper`) into an owned
//! element arena, so it is `Send` and has no borrowed lifetimes. The arena is
//! built and walked without recursion, so nesting depth is bounded by memory
//! only. Style resolution covers the fixed inspection schema only:
//!
//! 1. inline `style` attribute declarations;
//! 2. `<style>` rules matched with [`scraper::Selector`], ordered by
//!    specificity and then source order;
//! 3. the parent's value for inherited properties;
//! 4. per-tag defaults.

use std::collections::HashMap;

use scraper::{ElementRef, Html, Node as HtmlNode, Selector};
use tracing::debug;

use super::document::{
    ComputedStyle, ElementInfo, ElementPath, HighlightKind, RenderedDocument, STYLE_PROPERTIES,
};

const INHERITED: [&str; 4] = ["color", "font-size", "font-weight", "font-family"];

#[derive(Debug)]
enum Content {
    Text(String),
    Child(usize),
}

#[derive(Debug)]
struct Element {
    tag: String,
    id: Option<String>,
    classes: Vec<String>,
    /// Winning declarations for the schema properties, inline included.
    declared: Vec<(String, String)>,
    content: Vec<Content>,
    parent: Option<usize>,
    children: Vec<usize>,
}

/// One selector of a rule's selector list, with the rule's declarations.
#[derive(Debug)]
struct StyleRule {
    selector: Selector,
    specificity: u32,
    declarations: Vec<(String, String)>,
}

/// An artifact body parsed for overlay queries.
#[derive(Debug)]
pub struct MarkupDocument {
    elements: Vec<Element>,
    highlights: HashMap<ElementPath, HighlightKind>,
}

impl MarkupDocument {
    pub fn parse(body: &str) -> Self {
        let html = Html::parse_document(body);
        let mut elements: Vec<Element> = Vec::new();
        let mut refs: Vec<ElementRef<'_>> = Vec::new();
        let mut index_of = HashMap::new();
        let mut css = String::new();

        for node in html.root_element().descendants() {
            let parent = node.parent().and_then(|p| index_of.get(&p.id()).copied());
            match node.value() {
                HtmlNode::Element(value) => {
                    let Some(el) = ElementRef::wrap(node) else {
                        continue;
                    };
                    let tag = value.name().to_ascii_lowercase();
                    if tag == "style" {
                        css.extend(el.text());
                        css.push('\n');
                    }
                    let index = elements.len();
                    if let Some(p) = parent {
                        let parent_el: &mut Element = &mut elements[p];
                        parent_el.children.push(index);
                        parent_el.content.push(Content::Child(index));
                    }
                    index_of.insert(node.id(), index);
                    elements.push(Element {
                        tag,
                        id: value.id().map(str::to_string),
                        classes: value.classes().map(str::to_string).collect(),
                        declared: value.attr("style").map(parse_declarations).unwrap_or_default(),
                        content: Vec::new(),
                        parent,
                        children: Vec::new(),
                    });
                    refs.push(el);
                }
                HtmlNode::Text(text) => {
                    if let Some(p) = parent {
                        let text: &str = text;
                        elements[p].content.push(Content::Text(text.to_string()));
                    }
                }
                _ => {}
            }
        }

        let rules = parse_stylesheet(&css);
        for (el, element_ref) in elements.iter_mut().zip(&refs) {
            let inline = std::mem::take(&mut el.declared);
            el.declared = cascade(&rules, element_ref, inline);
        }
        debug!(
            "Parsed document: {} element(s), {} style rule(s)",
            elements.len(),
            rules.len()
        );
        Self {
            elements,
            highlights: HashMap::new(),
        }
    }

    /// Currently highlighted elements.
    pub fn highlights(&self) -> impl Iterator<Item = (&ElementPath, HighlightKind)> {
        self.highlights.iter().map(|(p, k)| (p, *k))
    }

    /// Paths and short labels for every element under `<body>`, in document
    /// order. Lets a text front end offer something to point at.
    pub fn outline(&self) -> Vec<(ElementPath, String)> {
        let mut out = Vec::new();
        let Some((body, body_path)) = self.elements.first().and_then(|root| {
            root.children
                .iter()
                .position(|&c| self.elements[c].tag == "body")
                .map(|pos| (root.children[pos], ElementPath::root().child(pos)))
        }) else {
            return out;
        };

        let mut stack = self.children_of(body, &body_path);
        while let Some((index, path)) = stack.pop() {
            let el = &self.elements[index];
            if matches!(el.tag.as_str(), "script" | "style") {
                continue;
            }
            let mut label = el.tag.clone();
            if let Some(id) = &el.id {
                label.push('#');
                label.push_str(id);
            }
            for class in &el.classes {
                label.push('.');
                label.push_str(class);
            }
            stack.extend(self.children_of(index, &path));
            out.push((path, label));
        }
        out
    }

    /// Children with their paths, last child first (ready for a stack).
    fn children_of(&self, index: usize, path: &ElementPath) -> Vec<(usize, ElementPath)> {
        self.elements[index]
            .children
            .iter()
            .enumerate()
            .rev()
            .map(|(i, &child)| (child, path.child(i)))
            .collect()
    }

    fn resolve(&self, path: &ElementPath) -> Option<usize> {
        let mut index = 0;
        self.elements.first()?;
        for &i in path.indices() {
            index = *self.elements[index].children.get(i)?;
        }
        Some(index)
    }

    /// Text content, skipping `<script>` and `<style>` bodies.
    fn text_of(&self, index: usize) -> String {
        let mut text = String::new();
        let mut stack = vec![(index, 0)];
        while let Some((current, pos)) = stack.pop() {
            let el = &self.elements[current];
            if matches!(el.tag.as_str(), "script" | "style") {
                continue;
            }
            let Some(content) = el.content.get(pos) else {
                continue;
            };
            stack.push((current, pos + 1));
            match content {
                Content::Text(t) => {
                    text.push_str(t);
                    text.push(' ');
                }
                Content::Child(child) => stack.push((*child, 0)),
            }
        }
        collapse_whitespace(&text)
    }

    fn style_of(&self, index: usize) -> ComputedStyle {
        let mut chain = vec![index];
        while let Some(parent) = chain.last().and_then(|&i| self.elements[i].parent) {
            chain.push(parent);
        }
        let mut style: Option<ComputedStyle> = None;
        for &i in chain.iter().rev() {
            style = Some(self.own_style(i, style.as_ref()));
        }
        style.unwrap_or_default()
    }

    fn own_style(&self, index: usize, parent: Option<&ComputedStyle>) -> ComputedStyle {
        let el = &self.elements[index];
        let mut style = ComputedStyle::default();
        let inherited = |prop: &str| {
            parent
                .and_then(|p| p.get(prop).map(str::to_string))
                .unwrap_or_else(|| default_for(&el.tag, prop))
        };

        for prop in STYLE_PROPERTIES {
            let declared = el
                .declared
                .iter()
                .find(|(name, _)| name == prop)
                .map(|(_, v)| v.as_str());
            let value = match declared {
                Some("inherit") => inherited(prop),
                Some(v) => v.to_string(),
                None if INHERITED.contains(&prop) => inherited(prop),
                None => default_for(&el.tag, prop),
            };
            style.set(prop, value);
        }

        // Tag-level emphasis beats inheritance when nothing was declared.
        if let Some(weight) = tag_font_weight(&el.tag)
            && !self.declares(index, "font-weight")
        {
            style.font_weight = weight.to_string();
        }
        if let Some(size) = tag_font_size(&el.tag)
            && !self.declares(index, "font-size")
        {
            style.font_size = size.to_string();
        }
        style
    }

    fn declares(&self, index: usize, prop: &str) -> bool {
        self.elements[index].declared.iter().any(|(n, _)| n == prop)
    }
}

impl RenderedDocument for MarkupDocument {
    fn is_loaded(&self) -> bool {
        true
    }

    fn element(&self, path: &ElementPath) -> Option<ElementInfo> {
        let index = self.resolve(path)?;
        let el = &self.elements[index];
        Some(ElementInfo {
            tag: el.tag.clone(),
            id: el.id.clone(),
            classes: el.classes.clone(),
            text: self.text_of(index),
        })
    }

    fn computed_style(&self, path: &ElementPath) -> Option<ComputedStyle> {
        self.resolve(path).map(|index| self.style_of(index))
    }

    fn set_highlight(&mut self, path: &ElementPath, kind: Option<HighlightKind>) {
        match kind {
            Some(kind) => {
                self.highlights.insert(path.clone(), kind);
            }
            None => {
                self.highlights.remove(path);
            }
        }
    }
}

// ── Parsing ────────────────────────────────────────────────────────

/// Winning schema declarations for one element: matching rules by ascending
/// specificity (stable, so source order breaks ties), then inline ones.
fn cascade(
    rules: &[StyleRule],
    element: &ElementRef<'_>,
    inline: Vec<(String, String)>,
) -> Vec<(String, String)> {
    let mut hits: Vec<&StyleRule> = rules
        .iter()
        .filter(|rule| rule.selector.matches(element))
        .collect();
    hits.sort_by_key(|rule| rule.specificity);

    let mut declared: Vec<(String, String)> = Vec::new();
    let ordered = hits
        .iter()
        .flat_map(|rule| rule.declarations.iter().cloned())
        .chain(inline);
    for (name, value) in ordered {
        if !STYLE_PROPERTIES.contains(&name.as_str()) {
            continue;
        }
        match declared.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => declared.push((name, value)),
        }
    }
    declared
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parse `name: value; name: value` declarations. Names are lowercased and
/// `background` is read as `background-color`.
fn parse_declarations(block: &str) -> Vec<(String, String)> {
    block
        .split(';')
        .filter_map(|decl| {
            let (name, value) = decl.split_once(':')?;
            let name = name.trim().to_ascii_lowercase();
            let value = value.trim().trim_end_matches("!important").trim();
            if name.is_empty() || value.is_empty() {
                return None;
            }
            let name = if name == "background" {
                "background-color".to_string()
            } else {
                name
            };
            Some((name, value.to_string()))
        })
        .collect()
}

fn strip_comments(css: &str) -> String {
    let mut out = String::with_capacity(css.len());
    let mut rest = css;
    while let Some(start) = rest.find("/*") {
        out.push_str(rest.get(..start).unwrap_or_default());
        rest = match rest.get(start + 2..).and_then(|r| r.find("*/").map(|e| (r, e))) {
            Some((r, end)) => r.get(end + 2..).unwrap_or_default(),
            None => "",
        };
    }
    out.push_str(rest);
    out
}

/// Split a stylesheet into rules, one per selector of each selector list.
/// At-rule blocks (`@media`, `@keyframes`, ...) are skipped whole; a
/// selector `scraper` cannot parse (e.g. `a:hover`) drops only itself.
fn parse_stylesheet(css: &str) -> Vec<StyleRule> {
    let css = strip_comments(css);
    let mut rules = Vec::new();
    let mut prelude = String::new();
    let mut chars = css.chars();

    while let Some(c) = chars.next() {
        match c {
            '{' => {
                let mut depth = 1;
                let mut block = String::new();
                for c in chars.by_ref() {
                    match c {
                        '{' => depth += 1,
                        '}' => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                        }
                        _ => {}
                    }
                    block.push(c);
                }
                let selector_text = std::mem::take(&mut prelude);
                let selector_text = selector_text.trim();
                if selector_text.starts_with('@') {
                    continue;
                }
                let declarations = parse_declarations(&block);
                for text in split_selector_list(selector_text) {
                    match Selector::parse(&text) {
                        Ok(selector) => rules.push(StyleRule {
                            specificity: specificity(&text),
                            selector,
                            declarations: declarations.clone(),
                        }),
                        Err(e) => debug!("Skipping selector '{text}': {e}"),
                    }
                }
            }
            ';' if prelude.trim_start().starts_with('@') => prelude.clear(),
            _ => prelude.push(c),
        }
    }
    rules
}

/// Split on top-level commas; commas inside `:is(a, b)` stay put.
fn split_selector_list(text: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    for c in text.chars() {
        match c {
            '(' | '[' => depth += 1,
            ')' | ']' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(std::mem::take(&mut current));
                continue;
            }
            _ => {}
        }
        current.push(c);
    }
    parts.push(current);
    parts
        .into_iter()
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect()
}

/// Selector specificity packed as `ids << 20 | classes << 10 | types`, the
/// layout the `selectors` crate uses. Classes count attribute selectors and
/// pseudo-classes; types count pseudo-elements. `:where()` adds nothing and
/// `:not()`/`:is()`/`:has()` count their arguments.
fn specificity(selector: &str) -> u32 {
    let chars: Vec<char> = selector.chars().collect();
    let (mut ids, mut classes, mut types) = (0u32, 0u32, 0u32);
    let mut i = 0;
    while let Some(&c) = chars.get(i) {
        match c {
            '#' => {
                ids += 1;
                i = skip_ident(&chars, i + 1);
            }
            '.' => {
                classes += 1;
                i = skip_ident(&chars, i + 1);
            }
            '[' => {
                classes += 1;
                i = skip_group(&chars, i, '[', ']');
            }
            ':' if chars.get(i + 1) == Some(&':') => {
                types += 1;
                i = skip_ident(&chars, i + 2);
                if chars.get(i) == Some(&'(') {
                    i = skip_group(&chars, i, '(', ')');
                }
            }
            ':' => {
                let end = skip_ident(&chars, i + 1);
                let name: String = chars.get(i + 1..end).unwrap_or_default().iter().collect();
                let name = name.to_ascii_lowercase();
                i = end;
                match name.as_str() {
                    "not" | "is" | "has" => {}
                    "where" => {
                        if chars.get(i) == Some(&'(') {
                            i = skip_group(&chars, i, '(', ')');
                        }
                    }
                    _ => {
                        classes += 1;
                        if chars.get(i) == Some(&'(') {
                            i = skip_group(&chars, i, '(', ')');
                        }
                    }
                }
            }
            c if is_ident_char(c) => {
                types += 1;
                i = skip_ident(&chars, i);
            }
            _ => i += 1,
        }
    }
    (ids.min(0x3ff) << 20) | (classes.min(0x3ff) << 10) | types.min(0x3ff)
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_' || c == '\\' || !c.is_ascii()
}

fn skip_ident(chars: &[char], mut i: usize) -> usize {
    while let Some(&c) = chars.get(i) {
        if c == '\\' {
            i += 2;
        } else if is_ident_char(c) {
            i += 1;
        } else {
            break;
        }
    }
    i.min(chars.len())
}

/// Index just past the bracket group opening at `start`.
fn skip_group(chars: &[char], start: usize, open: char, close: char) -> usize {
    let mut depth = 0usize;
    let mut i = start;
    while let Some(&c) = chars.get(i) {
        i += 1;
        if c == open {
            depth += 1;
        } else if c == close {
            depth = depth.saturating_sub(1);
            if depth == 0 {
                break;
            }
        }
    }
    i
}

// ── Defaults ───────────────────────────────────────────────────────

fn default_for(tag: &str, prop: &str) -> String {
    match prop {
        "color" => "rgb(0, 0, 0)".into(),
        "background-color" => "rgba(0, 0, 0, 0)".into(),
        "font-size" => "16px".into(),
        "font-weight" => "400".into(),
        "font-family" => "serif".into(),
        "padding" => match tag {
            "ul" | "ol" => "0px 0px 0px 40px".into(),
            "td" | "th" => "1px".into(),
            _ => "0px".into(),
        },
        "margin" => match tag {
            "body" => "8px".into(),
            "p" | "ul" | "ol" | "dl" | "pre" => "16px 0px".into(),
            "blockquote" | "figure" => "16px 40px".into(),
            "h1" => "21.44px 0px".into(),
            "h2" => "19.92px 0px".into(),
            "h3" => "18.72px 0px".into(),
            _ => "0px".into(),
        },
        "border-radius" => "0px".into(),
        "border" => "0px none rgb(0, 0, 0)".into(),
        "display" => default_display(tag).into(),
        "position" => "static".into(),
        _ => String::new(),
    }
}

fn default_display(tag: &str) -> &'static str {
    match tag {
        "html" | "body" | "div" | "p" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6" | "ul" | "ol"
        | "section" | "header" | "footer" | "main" | "nav" | "article" | "aside" | "form"
        | "pre" | "blockquote" | "hr" | "figure" | "figcaption" | "fieldset" | "dl" | "dd"
        | "dt" | "address" | "details" | "summary" => "block",
        "li" => "list-item",
        "table" => "table",
        "tr" => "table-row",
        "td" | "th" => "table-cell",
        "thead" => "table-header-group",
        "tbody" => "table-row-group",
        "head" | "style" | "script" | "title" | "meta" | "link" | "template" => "none",
        "button" | "input" | "select" | "textarea" | "img" | "canvas" | "svg" | "video" => {
            "inline-block"
        }
        _ => "inline",
    }
}

fn tag_font_weight(tag: &str) -> Option<&'static str> {
    match tag {
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" | "b" | "strong" | "th" => Some("700"),
        _ => None,
    }
}

fn tag_font_size(tag: &str) -> Option<&'static str> {
    match tag {
        "h1" => Some("32px"),
        "h2" => Some("24px"),
        "h3" => Some("18.72px"),
        "h5" => Some("13.28px"),
        "h6" => Some("10.72px"),
        "small" => Some("13.33px"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"<!DOCTYPE html>
<html>
<head>
  <title>Demo</title>
  <style>
    /* theme */
    body { color: #eee; background: #111; font-family: Inter, sans-serif; }
    .card { padding: 12px; border-radius: 8px; }
    #hero.card { background-color: navy; }
    div p, a:hover { color: red; }
    @media (max-width: 600px) { .card { padding: 4px; } }
  </style>
</head>
<body>
  <div id="hero" class="card wide">
    <h1>Welcome</h1>
    <p style="color: lime; margin: 2px">Hello <b>there</b></p>
  </div>
  <button class="cta">Go</button>
  <script>console.log("not text");</script>
</body>
</html>"#;

    fn path(s: &str) -> ElementPath {
        s.parse().unwrap()
    }

    #[test]
    fn resolves_paths_to_elements() {
        let doc = MarkupDocument::parse(DOC);
        assert_eq!(doc.element(&path("/")).unwrap().tag, "html");
        assert_eq!(doc.element(&path("/1")).unwrap().tag, "body");

        let hero = doc.element(&path("/1/0")).unwrap();
        assert_eq!(hero.tag, "div");
        assert_eq!(hero.id.as_deref(), Some("hero"));
        assert_eq!(hero.classes, vec!["card", "wide"]);
        assert_eq!(hero.text, "Welcome Hello there");

        assert!(doc.element(&path("/1/9")).is_none());
    }

    #[test]
    fn script_text_is_not_content() {
        let doc = MarkupDocument::parse(DOC);
        let body = doc.element(&path("/1")).unwrap();
        assert!(!body.text.contains("not text"));
    }

    #[test]
    fn cascade_inline_over_rules_over_inheritance() {
        let doc = MarkupDocument::parse(DOC);

        let hero = doc.computed_style(&path("/1/0")).unwrap();
        assert_eq!(hero.background_color, "navy");
        assert_eq!(hero.padding, "12px");
        assert_eq!(hero.border_radius, "8px");
        assert_eq!(hero.color, "#eee", "inherited from body");
        assert_eq!(hero.font_family, "Inter, sans-serif");
        assert_eq!(hero.display, "block");

        let p = doc.computed_style(&path("/1/0/1")).unwrap();
        assert_eq!(p.color, "lime");
        assert_eq!(p.margin, "2px");
        assert_eq!(p.background_color, "rgba(0, 0, 0, 0)", "not inherited");

        let h1 = doc.computed_style(&path("/1/0/0")).unwrap();
        assert_eq!(h1.font_size, "32px");
        assert_eq!(h1.font_weight, "700");

        let button = doc.computed_style(&path("/1/1")).unwrap();
        assert_eq!(button.display, "inline-block");
        assert_eq!(button.position, "static");
    }

    #[test]
    fn at_rules_and_unparseable_selectors_are_skipped() {
        let rules = parse_stylesheet(
            "a:hover, div p { color: red } @media x { .a { b: c } } .ok { margin: 1px }",
        );
        assert_eq!(rules.len(), 2, "div p and .ok");
        assert_eq!(
            rules[1].declarations,
            vec![("margin".to_string(), "1px".to_string())]
        );
    }

    #[test]
    fn selector_lists_split_at_top_level_only() {
        assert_eq!(
            split_selector_list("h1, :is(p, li) > a ,"),
            vec!["h1", ":is(p, li) > a"]
        );
    }

    #[test]
    fn specificity_orders_ids_classes_types() {
        assert!(specificity("#t") > specificity(".a.b.c"));
        assert!(specificity(".c") > specificity("main h1"));
        assert_eq!(specificity("main h1"), 2);
        assert_eq!(specificity("nav > a.x[href]"), (2 << 10) | 2);
        assert_eq!(specificity("li:nth-child(2n+1)"), (1 << 10) | 1);
        assert_eq!(specificity(":not(#x) p::before"), (1 << 20) | 2);
        assert_eq!(specificity(":where(#x) p"), 1);
        assert_eq!(specificity("*"), 0);
    }

    #[test]
    fn specificity_beats_source_order() {
        let doc = MarkupDocument::parse(
            "<html><head><style>#t{color:red} .c{color:blue} \
             main h1{background-color:green}</style></head>\
             <body><main><h1 id=t class=c>Hi</h1></main></body></html>",
        );
        let h1 = doc.computed_style(&path("/1/0/0")).unwrap();
        assert_eq!(h1.color, "red");
        assert_eq!(h1.background_color, "green");
    }

    #[test]
    fn combinators_match_through_scraper() {
        let doc = MarkupDocument::parse(
            "<html><head><style>nav > a { color: teal } nav a { padding: 3px } \
             section + p { margin: 9px }</style></head><body>\
             <nav><a>top</a><span><a>nested</a></span></nav>\
             <section></section><p>after</p></body></html>",
        );
        let top = doc.computed_style(&path("/1/0/0")).unwrap();
        assert_eq!(top.color, "teal");
        assert_eq!(top.padding, "3px");

        let nested = doc.computed_style(&path("/1/0/1/0")).unwrap();
        assert_eq!(nested.color, "rgb(0, 0, 0)", "not a direct child");
        assert_eq!(nested.padding, "3px");

        assert_eq!(doc.computed_style(&path("/1/2")).unwrap().margin, "9px");
    }

    #[test]
    fn deeply_nested_markup_does_not_recurse() {
        let depth = 10_000;
        let body = format!("{}deep{}", "<div>".repeat(depth), "</div>".repeat(depth));
        let doc = MarkupDocument::parse(&body);

        let deepest: String = "/1".to_string() + &"/0".repeat(depth);
        let deepest = path(&deepest);
        let info = doc.element(&deepest).unwrap();
        assert_eq!(info.tag, "div");
        assert_eq!(info.text, "deep");
        assert_eq!(doc.computed_style(&deepest).unwrap().display, "block");
        assert_eq!(doc.element(&path("/1")).unwrap().text, "deep");
    }

    #[test]
    fn highlights_are_tracked() {
        let mut doc = MarkupDocument::parse(DOC);
        doc.set_highlight(&path("/1/0"), Some(HighlightKind::Inspect));
        assert_eq!(doc.highlights().count(), 1);
        doc.set_highlight(&path("/1/0"), None);
        assert_eq!(doc.highlights().count(), 0);
    }

    #[test]
    fn outline_lists_body_elements() {
        let doc = MarkupDocument::parse(DOC);
        let outline = doc.outline();
        let labels: Vec<&str> = outline.iter().map(|(_, l)| l.as_str()).collect();
        assert_eq!(labels, vec!["div#hero.card.wide", "h1", "p", "b", "button.cta"]);
        assert_eq!(outline[3].0, path("/1/0/1/0"));
    }
}

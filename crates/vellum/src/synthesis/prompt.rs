//! Fixed directives for generation and refinement requests.

/// System directive for every generation request.
pub const GENERATION_SYSTEM_PROMPT: &str = "\
You are an expert front-end engineer who turns ideas, sketches, screenshots and \
documents into polished, working web experiences.

Rules:
- Output a single, complete HTML document with inline <style> and <script> blocks
- The document must be fully self-contained: no external stylesheets, scripts, fonts or images
- Draw any imagery with inline SVG, CSS, or canvas
- Make the result interactive and responsive
- Output ONLY the HTML document, with no commentary before or after it";

/// Instruction used whenever an image or document payload is attached. It
/// replaces any free-text prompt.
pub const IMAGE_ANALYSIS_DIRECTIVE: &str = "\
Analyze the attached image or document carefully. Identify what it depicts or \
describes, then build a fully functional, interactive web application that \
brings it to life. If it is a sketch or wireframe, implement the interface it \
shows. If it is a photo or diagram, create an engaging interactive experience \
inspired by its content.";

/// Instruction used when neither a prompt nor a payload is provided.
pub const DEMO_DIRECTIVE: &str = "\
Create a delightful interactive demo that showcases what a single self-contained \
web page can do: animation, user input, and a small playful game or tool.";

/// System directive for every refinement request.
pub const REFINEMENT_SYSTEM_PROMPT: &str = "\
You are an expert front-end engineer editing an existing self-contained HTML document.

Rules:
- Modify the document so that it satisfies the user's instruction
- Preserve all other existing behavior, content and styling
- Keep the document fully self-contained; never reference external images or assets
- Output ONLY the complete updated HTML document, with no commentary";

/// Sentinel name for "no style preset".
pub const DEFAULT_PRESET: &str = "Default";

/// A named visual style applied as a design constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StylePreset(String);

impl StylePreset {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    /// Whether this is the sentinel that adds no constraint.
    pub fn is_default(&self) -> bool {
        let name = self.0.trim();
        name.is_empty() || name == DEFAULT_PRESET
    }
}

impl Default for StylePreset {
    fn default() -> Self {
        Self(DEFAULT_PRESET.to_string())
    }
}

/// Build the instruction text for a generation request.
pub fn generation_instruction(
    prompt: &str,
    has_image: bool,
    style: &StylePreset,
    custom_css: Option<&str>,
) -> String {
    let mut text = if has_image {
        IMAGE_ANALYSIS_DIRECTIVE.to_string()
    } else if prompt.trim().is_empty() {
        DEMO_DIRECTIVE.to_string()
    } else {
        prompt.to_string()
    };

    if !style.is_default() {
        text.push_str(&format!(
            "\n\nDesign constraint: apply a \"{}\" visual style consistently across the whole document.",
            style.name().trim()
        ));
    }

    if let Some(css) = custom_css.map(str::trim).filter(|c| !c.is_empty()) {
        text.push_str(&format!(
            "\n\nTechnical constraint: the document's <style> block must include the following CSS rules exactly as written:\n{css}"
        ));
    }

    text
}

/// Build the instruction text for a refinement request.
pub fn refinement_instruction(current_body: &str, instruction: &str) -> String {
    format!(
        "Here is the current HTML document:\n\n{current_body}\n\n\
         Instruction: {instruction}\n\n\
         Return the complete updated document."
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn free_text_is_used_verbatim() {
        let text = generation_instruction("a pomodoro timer", false, &StylePreset::default(), None);
        assert_eq!(text, "a pomodoro timer");
    }

    #[test]
    fn image_directive_overrides_prompt() {
        let text = generation_instruction("ignored", true, &StylePreset::default(), None);
        assert_eq!(text, IMAGE_ANALYSIS_DIRECTIVE);
    }

    #[test]
    fn empty_prompt_falls_back_to_demo() {
        let text = generation_instruction("   ", false, &StylePreset::default(), None);
        assert_eq!(text, DEMO_DIRECTIVE);
    }

    #[test]
    fn style_and_css_constraints_are_appended() {
        let text = generation_instruction(
            "landing page",
            false,
            &StylePreset::new("Brutalist"),
            Some("body { margin: 0; }"),
        );
        assert!(text.starts_with("landing page"));
        assert!(text.contains("\"Brutalist\" visual style"));
        assert!(text.ends_with("body { margin: 0; }"));
    }

    #[test]
    fn default_preset_and_blank_css_add_nothing() {
        let text = generation_instruction("x", false, &StylePreset::new("Default"), Some("  "));
        assert_eq!(text, "x");
        assert!(StylePreset::new("").is_default());
    }

    #[test]
    fn refinement_carries_body_and_instruction() {
        let text = refinement_instruction("<p>hi</p>", "make it dark");
        assert!(text.contains("<p>hi</p>"));
        assert!(text.contains("Instruction: make it dark"));
    }
}

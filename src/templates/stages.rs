//! The seven analysis stages, the context they share and their prompts
//!
//! A stage only sees the outputs it declares in [`Stage::reads`]; the
//! [`StageView`] handed to prompt building enforces that.

use super::models::*;
use crate::llm::ImageInput;
use crate::types::TemplateEntry;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Visual,
    Slots,
    Irony,
    Metadata,
    Examples,
    Prompt,
    Code,
}

impl Stage {
    pub const ALL: [Stage; 7] = [
        Stage::Visual,
        Stage::Slots,
        Stage::Irony,
        Stage::Metadata,
        Stage::Examples,
        Stage::Prompt,
        Stage::Code,
    ];

    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Visual => "visual",
            Stage::Slots => "slots",
            Stage::Irony => "irony",
            Stage::Metadata => "metadata",
            Stage::Examples => "examples",
            Stage::Prompt => "prompt",
            Stage::Code => "code",
        }
    }

    /// Stages whose outputs this stage consumes
    pub fn reads(&self) -> &'static [Stage] {
        match self {
            Stage::Visual => &[],
            Stage::Slots => &[Stage::Visual],
            Stage::Irony => &[Stage::Visual],
            Stage::Metadata => &[Stage::Visual, Stage::Slots, Stage::Irony],
            Stage::Examples => &[Stage::Slots, Stage::Irony, Stage::Metadata],
            Stage::Prompt => &[Stage::Visual, Stage::Slots, Stage::Irony, Stage::Metadata, Stage::Examples],
            Stage::Code => &[Stage::Slots, Stage::Irony, Stage::Metadata],
        }
    }

    pub fn agent_name(&self) -> &'static str {
        match self {
            Stage::Visual => "Visual Analysis Agent",
            Stage::Slots => "Slot Detection Agent",
            Stage::Irony => "Irony Analysis Agent",
            Stage::Metadata => "Metadata Generation Agent",
            Stage::Examples => "Example Generation Agent",
            Stage::Prompt => "Prompt Writing Agent",
            Stage::Code => "Registry Fragment Agent",
        }
    }

    pub fn agent_description(&self) -> &'static str {
        match self {
            Stage::Visual => {
                "An expert at analyzing meme template images. Describe what is in the image panel by \
                 panel, objectively, without interpreting the humor."
            }
            Stage::Slots => {
                "An expert at finding where text goes in meme templates. Name each text area, size \
                 its character limit from the space available and give its pixel box."
            }
            Stage::Irony => {
                "A meme culture expert and humor analyst who understands exactly how a format creates \
                 humor through irony, contrast and subversion."
            }
            Stage::Metadata => {
                "An expert at clean, consistent template metadata. Follow the naming conventions \
                 exactly and keep descriptions short."
            }
            Stage::Examples => {
                "A meme writer who knows internet humor and the Oscar race. Write punchy examples that \
                 demonstrate the format within the character limits."
            }
            Stage::Prompt => {
                "An expert at writing instructions that guide a model to produce funny, \
                 format-appropriate meme text."
            }
            Stage::Code => {
                "A careful engineer who writes registry entries as strict JSON documents matching the \
                 shapes you are given."
            }
        }
    }

    pub fn schema(&self) -> Value {
        match self {
            Stage::Visual => VisualAnalysis::schema(),
            Stage::Slots => SlotDetection::schema(),
            Stage::Irony => IronyAnalysis::schema(),
            Stage::Metadata => TemplateMetadata::schema(),
            Stage::Examples => ExampleContent::schema(),
            Stage::Prompt => PromptContent::schema(),
            Stage::Code => CodeFragments::schema(),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq)]
#[error("{stage} stage needs {needed} output, which it does not read or is not available yet")]
pub struct MissingContext {
    pub stage: Stage,
    pub needed: Stage,
}

/// Inputs and accumulated stage outputs. Every `with_*` returns a new context.
#[derive(Debug, Clone)]
pub struct TemplateContext {
    pub image_path: PathBuf,
    pub filename: String,
    pub image: ImageInput,
    pub dimensions: ImageDimensions,
    /// Templates already in the registry, for naming and similarity hints
    pub existing: Arc<Vec<TemplateEntry>>,
    visual: Option<Arc<VisualAnalysis>>,
    slots: Option<Arc<SlotDetection>>,
    irony: Option<Arc<IronyAnalysis>>,
    metadata: Option<Arc<TemplateMetadata>>,
    examples: Option<Arc<ExampleContent>>,
    prompt: Option<Arc<PromptContent>>,
}

impl TemplateContext {
    pub fn new(image_path: PathBuf, image: ImageInput, dimensions: ImageDimensions, existing: Vec<TemplateEntry>) -> Self {
        let filename = image_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("template.png")
            .to_string();
        Self {
            image_path,
            filename,
            image,
            dimensions,
            existing: Arc::new(existing),
            visual: None,
            slots: None,
            irony: None,
            metadata: None,
            examples: None,
            prompt: None,
        }
    }

    pub fn with_visual(&self, v: VisualAnalysis) -> Self {
        Self { visual: Some(Arc::new(v)), ..self.clone() }
    }

    pub fn with_slots(&self, v: SlotDetection) -> Self {
        Self { slots: Some(Arc::new(v)), ..self.clone() }
    }

    pub fn with_irony(&self, v: IronyAnalysis) -> Self {
        Self { irony: Some(Arc::new(v)), ..self.clone() }
    }

    pub fn with_metadata(&self, v: TemplateMetadata) -> Self {
        Self { metadata: Some(Arc::new(v)), ..self.clone() }
    }

    pub fn with_examples(&self, v: ExampleContent) -> Self {
        Self { examples: Some(Arc::new(v)), ..self.clone() }
    }

    pub fn with_prompt(&self, v: PromptContent) -> Self {
        Self { prompt: Some(Arc::new(v)), ..self.clone() }
    }

    /// Restricted view for building `stage`'s prompt
    pub fn view(&self, stage: Stage) -> StageView<'_> {
        StageView { ctx: self, stage }
    }

    /// Assemble the final result once every stage has run
    pub fn finish(&self, code: CodeFragments) -> Result<ProcessingResult, MissingContext> {
        let missing = |needed| MissingContext { stage: Stage::Code, needed };
        Ok(ProcessingResult {
            visual_analysis: self.visual.as_deref().cloned().ok_or(missing(Stage::Visual))?,
            slot_detection: self.slots.as_deref().cloned().ok_or(missing(Stage::Slots))?,
            irony_analysis: self.irony.as_deref().cloned().ok_or(missing(Stage::Irony))?,
            metadata: self.metadata.as_deref().cloned().ok_or(missing(Stage::Metadata))?,
            examples: self.examples.as_deref().cloned().ok_or(missing(Stage::Examples))?,
            prompt: self.prompt.as_deref().cloned().ok_or(missing(Stage::Prompt))?,
            code,
        })
    }
}

/// Read access limited to the stages a stage declares
pub struct StageView<'a> {
    ctx: &'a TemplateContext,
    stage: Stage,
}

impl<'a> StageView<'a> {
    fn check<T>(&self, needed: Stage, value: &'a Option<Arc<T>>) -> Result<&'a T, MissingContext> {
        if !self.stage.reads().contains(&needed) {
            return Err(MissingContext { stage: self.stage, needed });
        }
        value.as_deref().ok_or(MissingContext { stage: self.stage, needed })
    }

    pub fn visual(&self) -> Result<&'a VisualAnalysis, MissingContext> {
        self.check(Stage::Visual, &self.ctx.visual)
    }

    pub fn slots(&self) -> Result<&'a SlotDetection, MissingContext> {
        self.check(Stage::Slots, &self.ctx.slots)
    }

    pub fn irony(&self) -> Result<&'a IronyAnalysis, MissingContext> {
        self.check(Stage::Irony, &self.ctx.irony)
    }

    pub fn metadata(&self) -> Result<&'a TemplateMetadata, MissingContext> {
        self.check(Stage::Metadata, &self.ctx.metadata)
    }

    pub fn examples(&self) -> Result<&'a ExampleContent, MissingContext> {
        self.check(Stage::Examples, &self.ctx.examples)
    }

    pub fn context(&self) -> &'a TemplateContext {
        self.ctx
    }
}

fn existing_ids(ctx: &TemplateContext) -> String {
    if ctx.existing.is_empty() {
        return "(none yet)".to_string();
    }
    ctx.existing.iter().map(|t| t.id.as_str()).collect::<Vec<_>>().join(", ")
}

fn examples_line(examples: &[SlotExample]) -> String {
    examples
        .iter()
        .map(|e| format!("{} = \"{}\"", e.slot_name, e.text))
        .collect::<Vec<_>>()
        .join("; ")
}

/// User prompt text for `stage`, built only from what it reads
pub fn build_prompt(stage: Stage, view: &StageView<'_>) -> Result<String, MissingContext> {
    let ctx = view.context();
    let prompt = match stage {
        Stage::Visual => {
            let ImageDimensions { width, height } = ctx.dimensions;
            format!(
                "Analyze this meme template image and describe its visual structure.\n\n\
                 IMAGE DIMENSIONS: {width}x{height} pixels\n\n\
                 1. Count the distinct panels or sections.\n\
                 2. Pick the layout: \"vertical\" (stacked top to bottom), \"horizontal\" (left to right), \
                 \"grid\" (2x2 or similar) or \"single\".\n\
                 3. List the characters or visual elements in each panel, specifically.\n\
                 4. Describe what changes from one panel to the next.\n\
                 5. Describe each panel in detail, including the space available for text.\n\n\
                 Only describe what you see, not what the meme means. Report the dimensions as {width}x{height}."
            )
        }
        Stage::Slots => {
            let visual = view.visual()?;
            format!(
                "Identify the text placement areas (slots) in this meme template.\n\n\
                 VISUAL ANALYSIS:\n\
                 - Panels: {} ({:?} layout)\n\
                 - Image: {}x{}\n\
                 - Elements: {}\n\
                 - Panels: {}\n\n\
                 1. Count the text areas this format usually has (1-4).\n\
                 2. Give each a snake_case name that says what it holds, e.g. reject_text/approve_text, \
                 strong_text/weak_text, top_text/bottom_text, caption.\n\
                 3. Describe what each slot represents.\n\
                 4. Estimate a character limit for the slots (20-80) from the space available.\n\
                 5. For each slot give x, y, width, height in pixels and an alignment (left, center, right).\n\
                 6. Recommend a font size, usually 24-40.",
                visual.panel_count,
                visual.layout_type,
                visual.image_dimensions.width,
                visual.image_dimensions.height,
                visual.characters_or_elements.join(", "),
                visual.panel_descriptions.join("; "),
            )
        }
        Stage::Irony => {
            let visual = view.visual()?;
            let known = KNOWN_IRONY_TYPES
                .iter()
                .map(|(tag, desc)| format!("  - {}: {}", tag, desc))
                .collect::<Vec<_>>()
                .join("\n");
            format!(
                "Analyze how this meme template creates humor.\n\n\
                 VISUAL ANALYSIS:\n\
                 - Panels: {} ({:?} layout)\n\
                 - Elements: {}\n\
                 - Contrast: {}\n\
                 - Panels: {}\n\n\
                 KNOWN IRONY TYPES (use one if it fits, otherwise coin a snake_case tag):\n{}\n\n\
                 Explain the irony in detail, break down the humor step by step, map the viewer's \
                 emotional journey, give the format's meme culture context, name its tone \
                 (e.g. \"Dismissive comparison\"), list similar template ids from: {}, and list the \
                 key contrast elements.",
                visual.panel_count,
                visual.layout_type,
                visual.characters_or_elements.join(", "),
                visual.visual_contrast,
                visual.panel_descriptions.join("; "),
                known,
                existing_ids(ctx),
            )
        }
        Stage::Metadata => {
            let visual = view.visual()?;
            let slots = view.slots()?;
            let irony = view.irony()?;
            let culture: String = irony.meme_culture_context.chars().take(200).collect();
            format!(
                "Generate clean metadata for this meme template.\n\n\
                 FILENAME: {}\n\
                 - {} panels, {:?} layout; elements: {}\n\
                 - {} text slots: {}\n\
                 - Irony type: {}; tone: {}; context: {}\n\n\
                 1. id: short snake_case, unique, not one of: {}\n\
                 2. name: Title Case, descriptive\n\
                 3. description: 1-2 sentences on the visual format\n\
                 4. generator_function: create_{{id}}_meme\n\
                 5. filename: exactly {}",
                ctx.filename,
                visual.panel_count,
                visual.layout_type,
                visual.characters_or_elements.join(", "),
                slots.text_slots,
                slots.slot_names.join(", "),
                irony.irony_type,
                irony.tone,
                culture,
                existing_ids(ctx),
                ctx.filename,
            )
        }
        Stage::Examples => {
            let slots = view.slots()?;
            let irony = view.irony()?;
            let metadata = view.metadata()?;
            format!(
                "Write example text for the \"{}\" meme template.\n\n\
                 SLOTS: {} ({}), max {} characters each; {}\n\
                 IRONY: {}; mechanics: {}; tone: {}; contrasts: {}\n\n\
                 CAMPAIGN CONTEXT:\n\
                 - pro_obaa: boost \"One Battle After Another\" (OBAA), the critically acclaimed film\n\
                 - anti_sinners: mock \"Sinners\", the overhyped vampire movie with 16 nominations\n\n\
                 Return three lists of {{slot_name, text}} objects: example (generic), pro_obaa_example \
                 and anti_sinners_example. Use every slot name exactly once per list and stay under the \
                 character limit.",
                metadata.name,
                slots.text_slots,
                slots.slot_names.join(", "),
                slots.max_chars_per_slot,
                slots.slot_descriptions.join("; "),
                irony.irony_type,
                irony.humor_mechanics,
                irony.tone,
                irony.key_contrast_elements.join(", "),
            )
        }
        Stage::Prompt => {
            let visual = view.visual()?;
            let slots = view.slots()?;
            let irony = view.irony()?;
            let metadata = view.metadata()?;
            let examples = view.examples()?;
            format!(
                "Write the generation instructions for the \"{}\" template ({}).\n\
                 Description: {}\n\
                 Panels: {} ({:?})\n\
                 Slots: {} ({}), max {} characters; {}\n\
                 Irony: {}; mechanics: {}; journey: {}; tone: {}\n\
                 Examples: generic [{}]; pro_obaa [{}]; anti_sinners [{}]\n\n\
                 Format:\n\
                 For <Template Name> memes:\n\
                 - 3-5 bullets, each explaining one aspect of the format\n\n\
                 STRUCTURE:\n\
                 - slot_name = \"what this slot holds\"\n\n\
                 Return only the instruction text.",
                metadata.name,
                metadata.id,
                metadata.description,
                visual.panel_count,
                visual.layout_type,
                slots.text_slots,
                slots.slot_names.join(", "),
                slots.max_chars_per_slot,
                slots.slot_descriptions.join("; "),
                irony.irony_type,
                irony.humor_mechanics,
                irony.emotional_journey,
                irony.tone,
                examples_line(&examples.example),
                examples_line(&examples.pro_obaa_example),
                examples_line(&examples.anti_sinners_example),
            )
        }
        Stage::Code => {
            let slots = view.slots()?;
            let irony = view.irony()?;
            let metadata = view.metadata()?;
            let canonical = canonical_fragments(slots, metadata);
            format!(
                "Write the registry entries for template \"{}\" (irony type {}).\n\
                 Slots: {:?}, max {} characters, font size {}.\n\n\
                 Return four JSON documents, each as a string field:\n\
                 - output_schema: JSON Schema of an object with one string property per slot \
                 (maxLength {}) plus an optional \"reasoning\"; only the slots are required. Shape:\n{}\n\
                 - renderer: the layout. Shape:\n{}\n\
                 - generator_entry: Shape:\n{}\n\
                 - output_model_entry: Shape:\n{}",
                metadata.id,
                irony.irony_type,
                slots.slot_names,
                slots.max_chars_per_slot,
                slots.font_size_recommendation,
                slots.max_chars_per_slot,
                canonical.output_schema,
                canonical.renderer,
                canonical.generator_entry,
                canonical.output_model_entry,
            )
        }
    };
    Ok(prompt)
}

/// Registry fragments derived directly from slot detection and metadata
pub fn canonical_fragments(slots: &SlotDetection, metadata: &TemplateMetadata) -> CodeFragments {
    let mut properties = serde_json::Map::new();
    for name in &slots.slot_names {
        properties.insert(
            name.clone(),
            json!({"type": "string", "maxLength": slots.max_chars_per_slot}),
        );
    }
    properties.insert("reasoning".into(), json!({"type": "string"}));

    let layout: serde_json::Map<String, Value> = slots
        .slot_names
        .iter()
        .zip(&slots.text_positions)
        .map(|(name, pos)| (name.clone(), json!(pos)))
        .collect();

    CodeFragments {
        output_schema: json!({
            "type": "object",
            "properties": properties,
            "required": slots.slot_names,
            "additionalProperties": false
        })
        .to_string(),
        renderer: json!({"font_size": slots.font_size_recommendation, "slots": layout}).to_string(),
        generator_entry: json!({"function": metadata.generator_function, "slots": slots.slot_names}).to_string(),
        output_model_entry: json!({"output_model": format!("{}_output", metadata.id)}).to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templates::models::tests::sample_result;

    fn base_context() -> TemplateContext {
        TemplateContext::new(
            PathBuf::from("uploads/galaxy.png"),
            ImageInput { data_url: "data:image/png;base64,AA==".into() },
            ImageDimensions { width: 500, height: 400 },
            vec![],
        )
    }

    #[test]
    fn test_stages_only_read_earlier_stages() {
        for stage in Stage::ALL {
            for read in stage.reads() {
                assert!(read.index() < stage.index(), "{} reads later stage {}", stage, read);
            }
        }
        assert_eq!(Stage::ALL.iter().map(|s| s.index()).collect::<Vec<_>>(), (0..7).collect::<Vec<_>>());
    }

    #[test]
    fn test_view_rejects_undeclared_reads() {
        let sample = sample_result("galaxy", &["top_text", "bottom_text"]);
        let ctx = base_context()
            .with_visual(sample.visual_analysis.clone())
            .with_slots(sample.slot_detection.clone());

        // Irony reads visual only, even though slots is already present
        let view = ctx.view(Stage::Irony);
        assert!(view.visual().is_ok());
        assert_eq!(
            view.slots().unwrap_err(),
            MissingContext { stage: Stage::Irony, needed: Stage::Slots }
        );
    }

    #[test]
    fn test_prompt_needs_prior_output() {
        let ctx = base_context();
        assert!(build_prompt(Stage::Visual, &ctx.view(Stage::Visual)).unwrap().contains("500x400"));
        assert!(build_prompt(Stage::Slots, &ctx.view(Stage::Slots)).is_err());
    }

    #[test]
    fn test_context_is_not_mutated() {
        let sample = sample_result("galaxy", &["caption"]);
        let ctx = base_context();
        let next = ctx.with_visual(sample.visual_analysis);
        assert!(ctx.view(Stage::Slots).visual().is_err());
        assert!(next.view(Stage::Slots).visual().is_ok());
        assert_eq!(ctx.filename, "galaxy.png");
    }

    #[test]
    fn test_canonical_fragments_parse() {
        let sample = sample_result("galaxy", &["top_text", "bottom_text"]);
        let code = canonical_fragments(&sample.slot_detection, &sample.metadata);
        let schema: Value = serde_json::from_str(&code.output_schema).unwrap();
        assert_eq!(schema["required"], json!(["top_text", "bottom_text"]));
        let renderer: Value = serde_json::from_str(&code.renderer).unwrap();
        assert_eq!(renderer["slots"]["bottom_text"]["y"], 110);
        assert_eq!(renderer["font_size"], 32);
    }
}

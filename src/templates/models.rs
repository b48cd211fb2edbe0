//! Structured outputs of the template analysis stages

use crate::types::{TemplateEntry, TextPosition};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Irony tags already used by registry templates
pub const KNOWN_IRONY_TYPES: [(&str, &str); 12] = [
    ("preference_contrast", "Drake - rejection vs approval of two options"),
    ("superiority_comparison", "Strong Doge - one thing clearly superior to another"),
    ("escalating_quality", "Spongebob - progression from weak to powerful"),
    ("fan_comparison", "Chad Wojak - cringe fans vs based fans"),
    ("sarcastic_logic", "Roll Safe - galaxy brain logic that is actually flawed"),
    ("expectation_subversion", "Happy Concerned - good news that turns out to have a catch"),
    ("awkward_situation", "Monkey Puppet - an uncomfortable truth you look away from"),
    ("desire_blocked", "Want/Holding - something stopping you from what you want"),
    ("impossible_choice", "Two Buttons - a hard decision between options"),
    ("shocked_disappointment", "Disbelief - shock at an outrageous fact"),
    ("emotional_aftermath", "MJ Crying - what caused the emotional reaction"),
    ("hidden_pain", "Wojak Mask - pretending to be fine while suffering"),
];

/// A stage's parsed output: its JSON Schema and post-parse checks
pub trait StageOutput: Serialize + DeserializeOwned + Clone + Send + Sync {
    fn schema() -> Value;

    /// Repair what can be repaired, reject what cannot
    fn validate(&mut self) -> Result<(), String> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageDimensions {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutType {
    Vertical,
    Horizontal,
    Grid,
    Single,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualAnalysis {
    pub panel_count: u32,
    pub layout_type: LayoutType,
    pub characters_or_elements: Vec<String>,
    pub visual_contrast: String,
    pub panel_descriptions: Vec<String>,
    pub image_dimensions: ImageDimensions,
}

impl StageOutput for VisualAnalysis {
    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "panel_count": {"type": "integer", "minimum": 1, "maximum": 4},
                "layout_type": {"type": "string", "enum": ["vertical", "horizontal", "grid", "single"]},
                "characters_or_elements": {"type": "array", "items": {"type": "string"}},
                "visual_contrast": {"type": "string"},
                "panel_descriptions": {"type": "array", "items": {"type": "string"}},
                "image_dimensions": {
                    "type": "object",
                    "properties": {
                        "width": {"type": "integer"},
                        "height": {"type": "integer"}
                    },
                    "required": ["width", "height"],
                    "additionalProperties": false
                }
            },
            "required": ["panel_count", "layout_type", "characters_or_elements", "visual_contrast",
                         "panel_descriptions", "image_dimensions"],
            "additionalProperties": false
        })
    }

    fn validate(&mut self) -> Result<(), String> {
        if !(1..=4).contains(&self.panel_count) {
            return Err(format!("panel_count {} outside 1-4", self.panel_count));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotDetection {
    pub text_slots: usize,
    pub slot_names: Vec<String>,
    pub slot_descriptions: Vec<String>,
    pub max_chars_per_slot: usize,
    pub text_positions: Vec<TextPosition>,
    #[serde(default = "default_font_size")]
    pub font_size_recommendation: u32,
}

fn default_font_size() -> u32 {
    32
}

impl StageOutput for SlotDetection {
    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "text_slots": {"type": "integer", "minimum": 1, "maximum": 4},
                "slot_names": {"type": "array", "items": {"type": "string"}},
                "slot_descriptions": {"type": "array", "items": {"type": "string"}},
                "max_chars_per_slot": {"type": "integer", "minimum": 20, "maximum": 80},
                "text_positions": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "x": {"type": "integer"},
                            "y": {"type": "integer"},
                            "width": {"type": "integer"},
                            "height": {"type": "integer"},
                            "alignment": {"type": "string", "enum": ["left", "center", "right"]}
                        },
                        "required": ["x", "y", "width", "height", "alignment"],
                        "additionalProperties": false
                    }
                },
                "font_size_recommendation": {"type": "integer"}
            },
            "required": ["text_slots", "slot_names", "slot_descriptions", "max_chars_per_slot",
                         "text_positions", "font_size_recommendation"],
            "additionalProperties": false
        })
    }

    fn validate(&mut self) -> Result<(), String> {
        if !(1..=4).contains(&self.text_slots) {
            return Err(format!("text_slots {} outside 1-4", self.text_slots));
        }
        if self.slot_names.len() != self.text_slots {
            return Err(format!(
                "{} slot names for {} slots",
                self.slot_names.len(),
                self.text_slots
            ));
        }
        if self.text_positions.len() != self.text_slots {
            return Err(format!(
                "{} text positions for {} slots",
                self.text_positions.len(),
                self.text_slots
            ));
        }
        for name in &mut self.slot_names {
            *name = to_snake_case(name);
        }
        let unique: BTreeSet<&String> = self.slot_names.iter().collect();
        if unique.len() != self.slot_names.len() || self.slot_names.iter().any(String::is_empty) {
            return Err(format!("slot names must be distinct and non-empty: {:?}", self.slot_names));
        }
        self.max_chars_per_slot = self.max_chars_per_slot.clamp(20, 80);
        if self.font_size_recommendation == 0 {
            self.font_size_recommendation = default_font_size();
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IronyAnalysis {
    pub irony_type: String,
    pub irony_explanation: String,
    pub humor_mechanics: String,
    pub emotional_journey: String,
    pub meme_culture_context: String,
    pub tone: String,
    pub similar_templates: Vec<String>,
    pub key_contrast_elements: Vec<String>,
}

impl IronyAnalysis {
    pub fn is_known_type(&self) -> bool {
        KNOWN_IRONY_TYPES.iter().any(|(tag, _)| *tag == self.irony_type)
    }
}

impl StageOutput for IronyAnalysis {
    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "irony_type": {"type": "string"},
                "irony_explanation": {"type": "string"},
                "humor_mechanics": {"type": "string"},
                "emotional_journey": {"type": "string"},
                "meme_culture_context": {"type": "string"},
                "tone": {"type": "string"},
                "similar_templates": {"type": "array", "items": {"type": "string"}},
                "key_contrast_elements": {"type": "array", "items": {"type": "string"}}
            },
            "required": ["irony_type", "irony_explanation", "humor_mechanics", "emotional_journey",
                         "meme_culture_context", "tone", "similar_templates", "key_contrast_elements"],
            "additionalProperties": false
        })
    }

    fn validate(&mut self) -> Result<(), String> {
        let tag = to_snake_case(&self.irony_type);
        if tag.is_empty() {
            return Err("empty irony_type".to_string());
        }
        self.irony_type = tag;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateMetadata {
    pub id: String,
    pub name: String,
    pub description: String,
    pub generator_function: String,
    pub filename: String,
}

impl StageOutput for TemplateMetadata {
    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "id": {"type": "string"},
                "name": {"type": "string"},
                "description": {"type": "string"},
                "generator_function": {"type": "string"},
                "filename": {"type": "string"}
            },
            "required": ["id", "name", "description", "generator_function", "filename"],
            "additionalProperties": false
        })
    }

    fn validate(&mut self) -> Result<(), String> {
        let id = to_snake_case(&self.id);
        if id.is_empty() {
            return Err("empty template id".to_string());
        }
        self.id = id;
        self.generator_function = format!("create_{}_meme", self.id);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotExample {
    pub slot_name: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExampleContent {
    pub example: Vec<SlotExample>,
    pub pro_obaa_example: Vec<SlotExample>,
    pub anti_sinners_example: Vec<SlotExample>,
}

impl ExampleContent {
    pub fn as_map(examples: &[SlotExample]) -> BTreeMap<String, String> {
        examples.iter().map(|e| (e.slot_name.clone(), e.text.clone())).collect()
    }
}

impl StageOutput for ExampleContent {
    fn schema() -> Value {
        let list = json!({
            "type": "array",
            "items": {
                "type": "object",
                "properties": {
                    "slot_name": {"type": "string"},
                    "text": {"type": "string"}
                },
                "required": ["slot_name", "text"],
                "additionalProperties": false
            }
        });
        json!({
            "type": "object",
            "properties": {
                "example": list.clone(),
                "pro_obaa_example": list.clone(),
                "anti_sinners_example": list
            },
            "required": ["example", "pro_obaa_example", "anti_sinners_example"],
            "additionalProperties": false
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptContent {
    pub template_prompt: String,
}

impl StageOutput for PromptContent {
    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {"template_prompt": {"type": "string"}},
            "required": ["template_prompt"],
            "additionalProperties": false
        })
    }

    fn validate(&mut self) -> Result<(), String> {
        if self.template_prompt.trim().is_empty() {
            return Err("empty template prompt".to_string());
        }
        Ok(())
    }
}

/// Registry fragments, each a JSON document in text form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeFragments {
    /// JSON Schema for the per-meme structured output
    pub output_schema: String,
    /// Renderer layout: `{"font_size": n, "slots": {name: {x, y, width, height, alignment}}}`
    pub renderer: String,
    /// `{"function": name, "slots": [..]}`
    pub generator_entry: String,
    /// `{"output_model": name}`
    pub output_model_entry: String,
}

impl StageOutput for CodeFragments {
    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "output_schema": {"type": "string"},
                "renderer": {"type": "string"},
                "generator_entry": {"type": "string"},
                "output_model_entry": {"type": "string"}
            },
            "required": ["output_schema", "renderer", "generator_entry", "output_model_entry"],
            "additionalProperties": false
        })
    }
}

/// Everything the seven stages produced for one image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingResult {
    pub visual_analysis: VisualAnalysis,
    pub slot_detection: SlotDetection,
    pub irony_analysis: IronyAnalysis,
    pub metadata: TemplateMetadata,
    pub examples: ExampleContent,
    pub prompt: PromptContent,
    pub code: CodeFragments,
}

impl ProcessingResult {
    /// The permanent registry entry assembled from all stages
    pub fn registry_entry(&self) -> TemplateEntry {
        TemplateEntry {
            id: self.metadata.id.clone(),
            name: self.metadata.name.clone(),
            filename: self.metadata.filename.clone(),
            text_slots: self.slot_detection.text_slots,
            slot_names: self.slot_detection.slot_names.clone(),
            irony_type: self.irony_analysis.irony_type.clone(),
            description: self.metadata.description.clone(),
            tone: self.irony_analysis.tone.clone(),
            max_chars_per_slot: self.slot_detection.max_chars_per_slot,
            example: ExampleContent::as_map(&self.examples.example),
            generator_function: self.metadata.generator_function.clone(),
        }
    }

    /// Name the image is stored under in the template directory: `{id}.{ext}`
    pub fn image_filename(&self) -> String {
        let ext = Path::new(&self.metadata.filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_else(|| "png".to_string());
        format!("{}.{}", self.metadata.id, ext)
    }

    /// Copy with user overrides applied to the metadata (`id`, `name`, `description`)
    pub fn with_overrides(&self, overrides: &BTreeMap<String, String>) -> Self {
        let mut out = self.clone();
        if let Some(id) = overrides.get("id").map(|v| to_snake_case(v)).filter(|v| !v.is_empty()) {
            out.metadata.generator_function = format!("create_{}_meme", id);
            out.code.generator_entry = rewrite_field(&out.code.generator_entry, "function", &out.metadata.generator_function);
            out.code.output_model_entry = rewrite_field(&out.code.output_model_entry, "output_model", &format!("{}_output", id));
            out.metadata.id = id;
        }
        if let Some(name) = overrides.get("name") {
            out.metadata.name = name.clone();
        }
        if let Some(description) = overrides.get("description") {
            out.metadata.description = description.clone();
        }
        out
    }
}

/// Set `key` in a JSON object fragment; anything else is returned unchanged
fn rewrite_field(fragment: &str, key: &str, value: &str) -> String {
    match serde_json::from_str::<Value>(fragment) {
        Ok(Value::Object(mut map)) => {
            map.insert(key.to_string(), Value::String(value.to_string()));
            Value::Object(map).to_string()
        }
        _ => fragment.to_string(),
    }
}

/// Lowercase, non-alphanumerics collapsed to single underscores
pub fn to_snake_case(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut pending_sep = false;
    for ch in value.trim().chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.push(ch.to_ascii_lowercase());
        } else {
            pending_sep = true;
        }
    }
    out
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::types::Alignment;

    pub(crate) fn sample_result(id: &str, slots: &[&str]) -> ProcessingResult {
        let positions = slots
            .iter()
            .enumerate()
            .map(|(i, _)| TextPosition {
                x: 10,
                y: 10 + 100 * i as u32,
                width: 300,
                height: 80,
                alignment: Alignment::Center,
            })
            .collect();
        let example: Vec<SlotExample> = slots
            .iter()
            .map(|s| SlotExample { slot_name: s.to_string(), text: format!("{} example", s) })
            .collect();
        let layout_slots: serde_json::Map<String, Value> = slots
            .iter()
            .enumerate()
            .map(|(i, s)| (s.to_string(), json!({"x": 10, "y": 10 + 100 * i, "width": 300, "height": 80})))
            .collect();

        ProcessingResult {
            visual_analysis: VisualAnalysis {
                panel_count: slots.len() as u32,
                layout_type: LayoutType::Vertical,
                characters_or_elements: vec!["man pointing".into()],
                visual_contrast: "disgust then approval".into(),
                panel_descriptions: vec!["top".into(), "bottom".into()],
                image_dimensions: ImageDimensions { width: 600, height: 600 },
            },
            slot_detection: SlotDetection {
                text_slots: slots.len(),
                slot_names: slots.iter().map(|s| s.to_string()).collect(),
                slot_descriptions: slots.iter().map(|s| format!("{} text", s)).collect(),
                max_chars_per_slot: 40,
                text_positions: positions,
                font_size_recommendation: 32,
            },
            irony_analysis: IronyAnalysis {
                irony_type: "preference_contrast".into(),
                irony_explanation: "rejects one, approves the other".into(),
                humor_mechanics: "setup then payoff".into(),
                emotional_journey: "recognition".into(),
                meme_culture_context: "classic".into(),
                tone: "Dismissive comparison".into(),
                similar_templates: vec!["drake".into()],
                key_contrast_elements: vec!["old".into(), "new".into()],
            },
            metadata: TemplateMetadata {
                id: id.into(),
                name: "Sample Template".into(),
                description: "Two stacked panels".into(),
                generator_function: format!("create_{}_meme", id),
                filename: format!("{}.png", id),
            },
            examples: ExampleContent {
                example: example.clone(),
                pro_obaa_example: example.clone(),
                anti_sinners_example: example,
            },
            prompt: PromptContent { template_prompt: "For Sample memes:\n- contrast".into() },
            code: CodeFragments {
                output_schema: json!({
                    "type": "object",
                    "properties": slots.iter().map(|s| (s.to_string(), json!({"type": "string"}))).collect::<serde_json::Map<_, _>>(),
                    "required": slots
                })
                .to_string(),
                renderer: json!({"font_size": 32, "slots": layout_slots}).to_string(),
                generator_entry: json!({"function": format!("create_{}_meme", id), "slots": slots}).to_string(),
                output_model_entry: json!({"output_model": format!("{}_output", id)}).to_string(),
            },
        }
    }

    #[test]
    fn test_to_snake_case() {
        assert_eq!(to_snake_case("Distracted Boyfriend!"), "distracted_boyfriend");
        assert_eq!(to_snake_case("  two--buttons "), "two_buttons");
        assert_eq!(to_snake_case("???"), "");
    }

    #[test]
    fn test_slot_validation() {
        let mut slots = sample_result("x", &["a", "b"]).slot_detection;
        slots.max_chars_per_slot = 200;
        slots.validate().unwrap();
        assert_eq!(slots.max_chars_per_slot, 80);

        slots.slot_names = vec!["Top Text".into(), "bottom".into()];
        slots.validate().unwrap();
        assert_eq!(slots.slot_names, vec!["top_text", "bottom"]);

        slots.slot_names = vec!["same".into(), "Same".into()];
        assert!(slots.validate().is_err());

        slots.slot_names.pop();
        assert!(slots.validate().is_err());
    }

    #[test]
    fn test_metadata_normalized() {
        let mut meta = TemplateMetadata {
            id: "Galaxy Brain".into(),
            name: "Galaxy Brain".into(),
            description: "d".into(),
            generator_function: "whatever".into(),
            filename: "galaxy.png".into(),
        };
        meta.validate().unwrap();
        assert_eq!(meta.id, "galaxy_brain");
        assert_eq!(meta.generator_function, "create_galaxy_brain_meme");
    }

    #[test]
    fn test_registry_entry_consistent() {
        let result = sample_result("drake_two", &["reject_text", "approve_text"]);
        let entry = result.registry_entry();
        assert!(entry.is_consistent());
        assert_eq!(entry.example["reject_text"], "reject_text example");
        assert_eq!(entry.tone, "Dismissive comparison");

        let mut overrides = BTreeMap::new();
        overrides.insert("id".to_string(), "New Id".to_string());
        let renamed = result.with_overrides(&overrides);
        assert_eq!(renamed.metadata.id, "new_id");
        assert_eq!(renamed.metadata.generator_function, "create_new_id_meme");
        let generator: Value = serde_json::from_str(&renamed.code.generator_entry).unwrap();
        assert_eq!(generator["function"], "create_new_id_meme");
        assert_eq!(generator["slots"], json!(["reject_text", "approve_text"]));
        let binding: Value = serde_json::from_str(&renamed.code.output_model_entry).unwrap();
        assert_eq!(binding["output_model"], "new_id_output");
    }

    #[test]
    fn test_image_filename_follows_id() {
        let mut result = sample_result("galaxy_brain", &["caption"]);
        result.metadata.filename = "Meme.PNG".into();
        assert_eq!(result.image_filename(), "galaxy_brain.png");

        let overrides = BTreeMap::from([("id".to_string(), "Big Brain".to_string())]);
        assert_eq!(result.with_overrides(&overrides).image_filename(), "big_brain.png");

        result.metadata.filename = "upload".into();
        assert_eq!(result.image_filename(), "galaxy_brain.png");
    }

    #[test]
    fn test_mock_fill_parses_into_every_stage() {
        use crate::llm::mock::fill_from_schema;
        let visual: VisualAnalysis = serde_json::from_value(fill_from_schema(&VisualAnalysis::schema(), "v")).unwrap();
        assert_eq!(visual.panel_count, 1);
        let _: IronyAnalysis = serde_json::from_value(fill_from_schema(&IronyAnalysis::schema(), "i")).unwrap();
        let _: ExampleContent = serde_json::from_value(fill_from_schema(&ExampleContent::schema(), "e")).unwrap();
        let _: CodeFragments = serde_json::from_value(fill_from_schema(&CodeFragments::schema(), "c")).unwrap();
    }
}

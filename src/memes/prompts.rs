//! Prompt text for per-template meme generation

use super::pipeline::MemeContext;
use super::GenerationRequest;
use crate::types::{MemeCategory, TemplateEntry};
use std::fmt::Write;

/// Comments quoted per side in the user prompt
const QUOTED_COMMENTS: usize = 5;

pub const SYSTEM_PROMPT: &str = "You are a meme content generator specializing in film criticism humor for the Oscar season.

Your task is to generate meme text that:
1. Fits the specific meme template's format and irony style
2. Uses internet meme language and slang appropriately
3. Is punchy, concise, and immediately funny
4. References real sentiment from actual movie reviews/comments
5. Stays within character limits for each text slot

IMPORTANT RULES:
- Never be offensive about race, gender, or protected groups
- Focus humor on the MOVIE, not the people who made it or watched it
- Keep text short, memes work best with minimal text
- Match the emotional tone of the template
- Make references that film Twitter/Reddit would understand

CAMPAIGN CONTEXT:
- PRO_OBAA: Boost \"One Battle After Another\" (OBAA), highlight its strengths and celebrate it
- ANTI_SINNERS: Undermine \"Sinners\", mock the hype and question the nominations

Stay within character limits. This is critical for readability.";

/// System prompt plus the template's own guidance
pub fn system_prompt(entry: &TemplateEntry, template_prompt: Option<&str>) -> String {
    match template_prompt {
        Some(p) if !p.trim().is_empty() => format!("{}\n\n{}", SYSTEM_PROMPT, p),
        _ => format!(
            "{}\n\nFor {} memes:\n- {}\n- Slots: {}",
            SYSTEM_PROMPT,
            entry.name,
            entry.description,
            entry.slot_names.join(", ")
        ),
    }
}

fn bullet_list(out: &mut String, heading: &str, comments: &[String]) {
    let _ = writeln!(out, "{}", heading);
    for c in comments.iter().take(QUOTED_COMMENTS) {
        let _ = writeln!(out, "- {}", c);
    }
    out.push('\n');
}

pub fn user_prompt(entry: &TemplateEntry, request: &GenerationRequest, ctx: &MemeContext) -> String {
    let target = &request.target_movie;
    let competitor = &request.competitor_movie;

    let example = entry
        .example
        .iter()
        .map(|(slot, text)| format!("{}: {}", slot, text))
        .collect::<Vec<_>>()
        .join(" | ");

    let mut out = String::new();
    let _ = writeln!(out, "Generate meme text for the \"{}\" template.\n", entry.name);
    let _ = writeln!(out, "TEMPLATE INFO:");
    let _ = writeln!(out, "- Description: {}", entry.description);
    let _ = writeln!(out, "- Irony Type: {}", entry.irony_type);
    let _ = writeln!(out, "- Tone: {}", entry.tone);
    let _ = writeln!(out, "- Text Slots: {}", entry.slot_names.join(", "));
    let _ = writeln!(out, "- Max Characters Per Slot: {}", entry.max_chars_per_slot);
    let _ = writeln!(out, "- Example: {}\n", example);

    let _ = writeln!(out, "CAMPAIGN: {}", request.category.as_str().to_uppercase());
    let _ = writeln!(out, "GOAL: {}", ctx.campaign_goal);
    let _ = writeln!(out, "VOICE: {}\n", request.tone.as_str());

    let _ = writeln!(out, "MOVIES:");
    let _ = writeln!(out, "- Target (to boost): {}", target);
    let _ = writeln!(out, "- Competitor (to contrast): {}\n", competitor);

    match request.category {
        MemeCategory::ProObaa => {
            bullet_list(&mut out, &format!("POSITIVE COMMENTS about {} to draw from:", target), &ctx.target_positive);
            bullet_list(&mut out, &format!("NEGATIVE COMMENTS about {} for contrast:", competitor), &ctx.competitor_negative);
        }
        MemeCategory::AntiSinners => {
            bullet_list(&mut out, &format!("NEGATIVE COMMENTS about {} to draw from:", competitor), &ctx.competitor_negative);
            bullet_list(&mut out, &format!("POSITIVE COMMENTS about {} for contrast:", target), &ctx.target_positive);
        }
    }

    let themes = if ctx.key_themes.is_empty() {
        "Oscar race, predictions, critical reception".to_string()
    } else {
        ctx.key_themes.join(", ")
    };
    let _ = writeln!(out, "KEY THEMES DETECTED: {}\n", themes);
    let _ = write!(
        out,
        "Generate text that captures the meme's irony while referencing these real opinions.\n\
         IMPORTANT: Stay within the {} character limit per slot.",
        entry.max_chars_per_slot
    );
    out
}

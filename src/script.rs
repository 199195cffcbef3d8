//! Ad script templates, prompt composition and LLM reply parsing.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Separator between the visual directive and the narration in LLM replies.
pub const SCRIPT_DELIMITER: &str = "|||";

/// Marketing style of the generated ad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ScriptStyle {
    #[default]
    PainPoint,
    Cinematic,
    HardSell,
}

/// Visual directive plus the four-beat narration outline for a style.
#[derive(Debug, Clone, Copy)]
pub struct ScriptTemplate {
    pub visual_prompt: &'static str,
    pub script_structure: &'static str,
}

impl ScriptStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScriptStyle::PainPoint => "pain-point",
            ScriptStyle::Cinematic => "cinematic",
            ScriptStyle::HardSell => "hard-sell",
        }
    }

    pub fn template(&self) -> ScriptTemplate {
        match self {
            ScriptStyle::PainPoint => ScriptTemplate {
                visual_prompt: "Split screen comparison or Before/After sequence. Start with a chaotic/problematic scene (black and white), then transition to the product solving the problem (bright colors). Fast paced cuts.",
                script_structure: "1. Name the pain (Still putting up with...?)\n2. Introduce the product (Try this instead...)\n3. Show the result (Look, solved in seconds...)\n4. Call to action (Limited offer, tap the link!)",
            },
            ScriptStyle::Cinematic => ScriptTemplate {
                visual_prompt: "Extreme close-up, macro photography, slow motion. Focus on texture, material, and light reflection. Soft background music mood. Elegant camera movements.",
                script_structure: "1. Texture close-up (Look at this detail...)\n2. How it feels (Soft as a cloud...)\n3. Set the mood (A quiet upgrade to your day...)\n4. Closing line (You deserve it.)",
            },
            ScriptStyle::HardSell => ScriptTemplate {
                visual_prompt: "Dynamic text overlays, bright flashing colors, rapid transitions. Product shown in use with happy people. High energy commercial style.",
                script_structure: "1. Price hook (Only 9.99 today!)\n2. Key selling points (Buy one get one, does it all...)\n3. Urgency (First 100 orders only!)\n4. Hard close (Gone in minutes, grab it now!)",
            },
        }
    }
}

impl FromStr for ScriptStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "pain-point" | "painpoint" | "pain" => Ok(ScriptStyle::PainPoint),
            "cinematic" | "asmr" => Ok(ScriptStyle::Cinematic),
            "hard-sell" | "hardsell" | "promo" => Ok(ScriptStyle::HardSell),
            other => Err(format!("unknown script style: {other}")),
        }
    }
}

impl std::fmt::Display for ScriptStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Target market language for the prompt and the narration voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    #[default]
    English,
    Indonesian,
    Malay,
    Vietnamese,
    Thai,
    Chinese,
    Japanese,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::English => "English",
            Language::Indonesian => "Indonesian",
            Language::Malay => "Malay",
            Language::Vietnamese => "Vietnamese",
            Language::Thai => "Thai",
            Language::Chinese => "Chinese",
            Language::Japanese => "Japanese",
        }
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "english" | "en" => Ok(Language::English),
            "indonesian" | "id" => Ok(Language::Indonesian),
            "malay" | "ms" => Ok(Language::Malay),
            "vietnamese" | "vi" => Ok(Language::Vietnamese),
            "thai" | "th" => Ok(Language::Thai),
            "chinese" | "zh" => Ok(Language::Chinese),
            "japanese" | "ja" => Ok(Language::Japanese),
            other => Err(format!("unsupported language: {other}")),
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A generated script: what the video shows and what the voice says.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdScript {
    pub directive: String,
    pub narration: Option<String>,
}

impl AdScript {
    /// Split an LLM completion on [`SCRIPT_DELIMITER`].
    ///
    /// Without the delimiter the whole reply is the directive and the
    /// narration is reported missing.
    pub fn parse(content: &str) -> Self {
        match content.split_once(SCRIPT_DELIMITER) {
            Some((directive, narration)) => {
                let narration = narration.trim();
                Self {
                    directive: directive.trim().to_string(),
                    narration: (!narration.is_empty()).then(|| narration.to_string()),
                }
            }
            None => Self {
                directive: content.trim().to_string(),
                narration: None,
            },
        }
    }

    /// Template-only script used when no LLM is available.
    pub fn from_template(style: ScriptStyle) -> Self {
        Self {
            directive: style.template().visual_prompt.to_string(),
            narration: None,
        }
    }

    /// Text stored in the history log.
    pub fn display_text(&self) -> String {
        match &self.narration {
            Some(narration) => format!("{}\n\n{}", self.directive, narration),
            None => self.directive.clone(),
        }
    }
}

/// Build the generation prompt from the product, targeting and directive.
pub fn compose_prompt(
    product: &str,
    language: Language,
    directive: &str,
    detail: &str,
    image_count: usize,
) -> String {
    let mut prompt = format!(
        "Commercial product video for {}. Language: {}.",
        product.trim(),
        language
    );
    if !directive.trim().is_empty() {
        prompt.push_str(&format!(" [Visual Style]: {}.", directive.trim().trim_end_matches('.')));
    }
    if !detail.trim().is_empty() {
        prompt.push(' ');
        prompt.push_str(detail.trim());
    }
    if image_count > 0 {
        prompt.push_str(&format!(" [Ref: {} images]", image_count));
    }
    prompt
}

/// Instruction sent to the LLM asking for `directive ||| narration`.
pub fn script_request_text(
    product: &str,
    style: ScriptStyle,
    language: Language,
    detail: &str,
    duration_secs: u32,
) -> String {
    let template = style.template();
    format!(
        "You write short video ads for e-commerce products.\nProduct: {}\nTarget language for narration: {}\nVideo length: {} seconds\nVisual style reference: {}\nNarration structure:\n{}\nExtra notes: {}\n\nReturn exactly two parts separated by \"{}\":\n1. A single English paragraph describing the visuals for a text-to-video model.\n2. The voice-over narration in {}, short enough to be spoken within {} seconds.\nNo headings, no markdown.",
        product.trim(),
        language,
        duration_secs,
        template.visual_prompt,
        template.script_structure,
        if detail.trim().is_empty() { "none" } else { detail.trim() },
        SCRIPT_DELIMITER,
        language,
        duration_secs
    )
}

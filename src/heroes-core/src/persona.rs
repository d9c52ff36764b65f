//! Historical-figure persona definitions.
//!
//! A persona is a named character profile (display name, era, TTS voice,
//! prompt template) that drives a model's responses on the show.

use serde::{Deserialize, Serialize};

/// A historical figure voiced by the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Persona {
    /// Short identifier used on the command line and in speaker tokens.
    pub id: String,
    /// Display name (e.g., "Napoleon Bonaparte").
    pub name: String,
    /// Era or one-line description used in prompts (e.g., "Emperor of the French, 1804-1814").
    pub era: String,
    /// The LLM model to use (e.g., "gpt-4o-mini", "llama3:8b").
    pub model: String,
    /// Voice ID for TTS.
    pub voice: String,
    /// Optional custom system prompt override.
    pub custom_system_prompt: Option<String>,
}

impl Persona {
    /// Create a new persona with the given identity and model.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        era: impl Into<String>,
        model: impl Into<String>,
        voice: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            era: era.into(),
            model: model.into(),
            voice: voice.into(),
            custom_system_prompt: None,
        }
    }

    /// Set a custom system prompt.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.custom_system_prompt = Some(prompt.into());
        self
    }

    /// Full display name with era, as used in prompts and announcements.
    pub fn display_name_with_era(&self) -> String {
        format!("{} ({})", self.name, self.era)
    }
}

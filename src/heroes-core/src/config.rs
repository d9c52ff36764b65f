//! Configuration module for loading TOML config files.

use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::error::PodcastError;
use crate::persona::Persona;
use crate::show_format::{ConfiguredFormat, HistoricalDebateFormat, ShowFormat, ShowSection};

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub show: ShowsConfig,
    #[serde(default)]
    pub voices: VoicesConfig,
    pub prompts: PromptsConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub personas: Vec<PersonaConfig>,
}

/// Configuration for all show formats.
#[derive(Debug, Clone, Deserialize)]
pub struct ShowsConfig {
    pub debate: DebateShowConfig,
}

/// Configuration for the debate show format.
#[derive(Debug, Clone, Deserialize)]
pub struct DebateShowConfig {
    pub name: String,
    pub display_name: String,
    pub min_participants: usize,
    pub max_participants: usize,
    #[serde(default)]
    pub sections: Vec<ShowSection>,
}

/// Voice configuration for TTS.
#[derive(Debug, Clone, Deserialize)]
pub struct VoicesConfig {
    pub narrator_voice: String,
    /// Used for personas that do not name a voice of their own.
    pub default_voice: String,
}

impl Default for VoicesConfig {
    fn default() -> Self {
        Self {
            narrator_voice: "af_sky".to_string(),
            default_voice: "af_bella".to_string(),
        }
    }
}

/// System prompts configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PromptsConfig {
    pub debate_prompt: String,
    pub chat_prompt: String,
    #[serde(default)]
    pub narrator_template: String,
}

/// Model defaults for the OpenAI-compatible API.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Model for personas that do not name one of their own.
    pub model: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
        }
    }
}

/// A persona as written in the config file. Voice and model fall back to
/// the global defaults when omitted.
#[derive(Debug, Clone, Deserialize)]
pub struct PersonaConfig {
    pub id: String,
    pub name: String,
    pub era: String,
    #[serde(default)]
    pub voice: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub system_prompt: Option<String>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, PodcastError> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| PodcastError::ConfigError(format!("Failed to read config: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| PodcastError::ConfigError(format!("Failed to parse config: {}", e)))
    }

    /// Load configuration from string content.
    pub fn from_str(content: &str) -> Result<Self, PodcastError> {
        toml::from_str(content)
            .map_err(|e| PodcastError::ConfigError(format!("Failed to parse config: {}", e)))
    }

    /// Resolve a persona by id, applying voice/model defaults.
    pub fn persona(&self, id: &str) -> Result<Persona, PodcastError> {
        let entry = self
            .personas
            .iter()
            .find(|p| p.id.eq_ignore_ascii_case(id))
            .ok_or_else(|| {
                PodcastError::UnknownPersona(format!(
                    "'{}'. Available personas: {}",
                    id,
                    self.persona_ids().join(", ")
                ))
            })?;

        let mut persona = Persona::new(
            entry.id.clone(),
            entry.name.clone(),
            entry.era.clone(),
            entry.model.clone().unwrap_or_else(|| self.api.model.clone()),
            entry
                .voice
                .clone()
                .unwrap_or_else(|| self.voices.default_voice.clone()),
        );
        if let Some(prompt) = &entry.system_prompt {
            persona = persona.with_system_prompt(prompt.clone());
        }
        Ok(persona)
    }

    /// All persona ids in the config, in order.
    pub fn persona_ids(&self) -> Vec<String> {
        self.personas.iter().map(|p| p.id.clone()).collect()
    }

    /// The debate system prompt for a persona, with placeholders replaced.
    pub fn debate_prompt(&self, name: &str, topic: &str, opponent_name: &str) -> String {
        self.prompts
            .debate_prompt
            .replace("{name}", name)
            .replace("{topic}", topic)
            .replace("{opponent_name}", opponent_name)
    }

    /// The chat system prompt for a persona, with placeholders replaced.
    pub fn chat_prompt(&self, name: &str, era: &str) -> String {
        self.prompts
            .chat_prompt
            .replace("{name}", name)
            .replace("{era}", era)
    }

    /// The debate format: the configured sections when the file provides
    /// them, the built-in section plan otherwise.
    pub fn debate_format(&self, rounds: u32) -> Box<dyn ShowFormat> {
        if self.show.debate.sections.is_empty() {
            Box::new(HistoricalDebateFormat::new(rounds))
        } else {
            Box::new(ConfiguredFormat::new(
                self.show.debate.clone(),
                self.prompts.debate_prompt.clone(),
            ))
        }
    }
}

/// Default configuration embedded in the binary.
pub fn default_config() -> Config {
    Config {
        show: ShowsConfig {
            debate: DebateShowConfig {
                name: "debate".to_string(),
                display_name: "Debate Across the Ages".to_string(),
                min_participants: 2,
                max_participants: 2,
                // Empty: the built-in round plan applies unless a config
                // file spells out its own sections.
                sections: vec![],
            },
        },
        voices: VoicesConfig::default(),
        api: ApiConfig::default(),
        prompts: PromptsConfig {
            debate_prompt: DEFAULT_DEBATE_PROMPT.to_string(),
            chat_prompt: DEFAULT_CHAT_PROMPT.to_string(),
            narrator_template: "{section_name}. {section_description}".to_string(),
        },
        personas: vec![
            PersonaConfig {
                id: "napoleon".into(),
                name: "Napoleon Bonaparte".into(),
                era: "Emperor of the French, 1804-1814".into(),
                voice: Some("bm_george".into()),
                model: None,
                system_prompt: None,
            },
            PersonaConfig {
                id: "cleopatra".into(),
                name: "Cleopatra".into(),
                era: "Queen of Egypt, 51-30 BC".into(),
                voice: Some("bf_emma".into()),
                model: None,
                system_prompt: None,
            },
            PersonaConfig {
                id: "einstein".into(),
                name: "Albert Einstein".into(),
                era: "physicist, 1879-1955".into(),
                voice: Some("am_michael".into()),
                model: None,
                system_prompt: None,
            },
            PersonaConfig {
                id: "curie".into(),
                name: "Marie Curie".into(),
                era: "physicist and chemist, 1867-1934".into(),
                voice: Some("bf_isabella".into()),
                model: None,
                system_prompt: None,
            },
            PersonaConfig {
                id: "aurelius".into(),
                name: "Marcus Aurelius".into(),
                era: "Roman emperor and Stoic, 161-180 AD".into(),
                voice: Some("am_adam".into()),
                model: None,
                system_prompt: None,
            },
            PersonaConfig {
                id: "lincoln".into(),
                name: "Abraham Lincoln".into(),
                era: "16th President of the United States".into(),
                voice: Some("bm_lewis".into()),
                model: None,
                system_prompt: None,
            },
        ],
    }
}

const DEFAULT_DEBATE_PROMPT: &str = r#"You are {name}, appearing on the "Heroes of History" podcast to debate a modern question.

DEBATE TOPIC: {topic}

YOUR OPPONENT: {opponent_name}

DEBATE RULES:
- Argue from your own lifetime of experience, convictions, and manner of speech
- Address the specific question or topic directly
- Acknowledge and counter your opponent's arguments respectfully
- Use rhetorical techniques: ethos (credibility), pathos (emotion), logos (logic)
- Stay fully in character - do NOT acknowledge being an AI

SPEAKING STYLE:
- Speak directly to the listening audience
- Use the vocabulary and cadence your historical self would use
- Structure your responses with a clear opening, supporting points, and conclusion

CRITICAL OUTPUT RULES:
- Output ONLY your spoken words - no scene directions or stage actions
- Do NOT include any text in parentheses like "(Gestures broadly)" or "(Pauses)"
- Do NOT include narration, descriptions of gestures, movements, or tone
- Do NOT include asterisks for emphasis or any markdown formatting
- The narrator provides context - just deliver your argument directly
"#;

const DEFAULT_CHAT_PROMPT: &str = r#"You are {name} ({era}), in a relaxed one-on-one conversation with a curious listener on the "Heroes of History" podcast.

CONVERSATION RULES:
- Answer from your own lifetime of experience, convictions, and manner of speech
- Be candid, warm, and occasionally surprising; this is a conversation, not a lecture
- Keep answers short enough to be spoken aloud comfortably
- Stay fully in character - do NOT acknowledge being an AI

CRITICAL OUTPUT RULES:
- Output ONLY your spoken words - no scene directions or stage actions
- Do NOT include any text in parentheses, asterisks, or markdown formatting
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_personas_resolve() {
        let config = default_config();
        let napoleon = config.persona("napoleon").unwrap();
        assert_eq!(napoleon.name, "Napoleon Bonaparte");
        assert_eq!(napoleon.voice, "bm_george");
        // Model falls back to the API default
        assert_eq!(napoleon.model, config.api.model);
    }

    #[test]
    fn test_persona_lookup_is_case_insensitive() {
        let config = default_config();
        assert!(config.persona("Cleopatra").is_ok());
    }

    #[test]
    fn test_unknown_persona_lists_available() {
        let config = default_config();
        let err = config.persona("caesar").unwrap_err();
        let text = err.to_string();
        assert!(text.contains("caesar"));
        assert!(text.contains("napoleon"));
    }

    #[test]
    fn test_prompt_placeholders() {
        let config = default_config();
        let prompt = config.debate_prompt("Napoleon Bonaparte", "Is ambition a virtue?", "Cleopatra");
        assert!(prompt.contains("Napoleon Bonaparte"));
        assert!(prompt.contains("Is ambition a virtue?"));
        assert!(prompt.contains("Cleopatra"));
        assert!(!prompt.contains("{name}"));
        assert!(!prompt.contains("{opponent_name}"));
    }

    #[test]
    fn test_parse_config_with_sections_and_defaults() {
        let toml = r#"
            [show.debate]
            name = "debate"
            display_name = "Quick Debate"
            min_participants = 2
            max_participants = 2

            [[show.debate.sections]]
            name = "Openers"
            description = "Say hello."
            speaker_order = [0, 1]
            max_tokens = 100

            [prompts]
            debate_prompt = "You are {name}. Topic: {topic}. Opponent: {opponent_name}."
            chat_prompt = "You are {name} ({era})."

            [[personas]]
            id = "ada"
            name = "Ada Lovelace"
            era = "mathematician, 1815-1852"
        "#;
        let config = Config::from_str(toml).unwrap();

        // Omitted voice/model fall back to defaults
        let ada = config.persona("ada").unwrap();
        assert_eq!(ada.voice, config.voices.default_voice);

        // Configured sections drive the format
        let format = config.debate_format(6);
        assert_eq!(format.display_name(), "Quick Debate");
        assert_eq!(format.sections().len(), 1);
        assert_eq!(format.sections()[0].name, "Openers");
    }

    #[test]
    fn test_empty_sections_fall_back_to_builtin_plan() {
        let config = default_config();
        let format = config.debate_format(6);
        assert_eq!(format.sections().len(), 6);
    }
}

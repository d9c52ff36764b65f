//! Show format definitions and trait.
//!
//! A show format decides the sections of an episode and who speaks when,
//! allowing different episode styles (formal debate, roundtable, etc.).

use serde::{Deserialize, Serialize};

/// A section within a show (e.g., opening statements, rebuttals).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShowSection {
    /// Name of the section (announced on air).
    pub name: String,
    /// Description/instructions for this section.
    pub description: String,
    /// Which cast member indices speak in this section (in order).
    /// For example, [0, 1] means persona 0 speaks, then persona 1.
    pub speaker_order: Vec<usize>,
    /// Maximum response length hint for each speaker in this section.
    pub max_tokens: u32,
}

/// Trait for defining show formats.
///
/// Implement this trait to create custom episode styles like panel
/// discussions or interviews.
pub trait ShowFormat: Send + Sync {
    /// Returns the name of this show format.
    fn name(&self) -> &str;

    /// Returns the display name for the format.
    fn display_name(&self) -> &str;

    /// Returns all sections of the show in order.
    fn sections(&self) -> Vec<ShowSection>;

    /// Maximum number of cast members allowed.
    fn max_participants(&self) -> usize;

    /// Minimum number of cast members required.
    fn min_participants(&self) -> usize;

    /// System prompt for a cast member.
    fn system_prompt(&self, topic: &str, persona_name: &str, opponent_name: &str) -> String;
}

/// Historical debate format.
///
/// Two figures from history argue a topic over configurable rounds:
/// - Opening statements (1 round)
/// - Main argument rounds (configurable, at least 2)
/// - Rebuttals (1 round)
/// - Closing statements (1 round)
#[derive(Debug, Clone)]
pub struct HistoricalDebateFormat {
    rounds: u32,
}

impl HistoricalDebateFormat {
    pub fn new(rounds: u32) -> Self {
        Self {
            rounds: rounds.max(4),
        }
    }
}

impl Default for HistoricalDebateFormat {
    fn default() -> Self {
        Self::new(6)
    }
}

impl ShowFormat for HistoricalDebateFormat {
    fn name(&self) -> &str {
        "debate"
    }

    fn display_name(&self) -> &str {
        "Debate Across the Ages"
    }

    fn sections(&self) -> Vec<ShowSection> {
        let mut sections = Vec::new();

        sections.push(ShowSection {
            name: "Opening Statements".to_string(),
            description: "Each figure presents their initial position on the topic.".to_string(),
            speaker_order: vec![0, 1],
            max_tokens: 300,
        });

        // Main argument rounds (rounds - 3 to account for opening, rebuttal, closing)
        let main_rounds = (self.rounds as i32 - 3).max(1) as usize;
        for i in 0..main_rounds {
            let alternate = i % 2 == 1;
            sections.push(ShowSection {
                name: format!("Main Arguments - Round {}", i + 1),
                description: "The figures elaborate on their positions with supporting arguments."
                    .to_string(),
                speaker_order: if alternate { vec![1, 0] } else { vec![0, 1] },
                max_tokens: 400,
            });
        }

        sections.push(ShowSection {
            name: "Rebuttals".to_string(),
            description: "The figures respond to their opponent's arguments.".to_string(),
            speaker_order: vec![1, 0], // Reversed order for rebuttals
            max_tokens: 400,
        });

        sections.push(ShowSection {
            name: "Closing Statements".to_string(),
            description: "Final remarks and summation of positions.".to_string(),
            speaker_order: vec![0, 1],
            max_tokens: 250,
        });

        sections
    }

    fn max_participants(&self) -> usize {
        2
    }

    fn min_participants(&self) -> usize {
        2
    }

    fn system_prompt(&self, topic: &str, persona_name: &str, opponent_name: &str) -> String {
        format!(
            r#"You are {} speaking on a podcast debate about a modern question.

TOPIC: {}

Your opponent is {}. Argue the topic from your own lifetime of experience,
values, and manner of speech. Stay fully in character.

Guidelines:
- Be persuasive, articulate, and true to your historical voice
- Use evidence and reasoning drawn from your own era where it fits
- Address your opponent's points when appropriate
- Maintain a respectful but firm debating stance
- Keep responses focused; this is spoken audio, not an essay
- Do not break character or acknowledge being an AI

Speak directly as if addressing the listening audience."#,
            persona_name, topic, opponent_name
        )
    }
}

/// A show format read from the config file.
///
/// Sections come straight from `[show.debate]`; the system prompt is the
/// configured debate template with its placeholders filled in.
#[derive(Debug, Clone)]
pub struct ConfiguredFormat {
    config: crate::config::DebateShowConfig,
    prompt_template: String,
}

impl ConfiguredFormat {
    pub fn new(config: crate::config::DebateShowConfig, prompt_template: String) -> Self {
        Self {
            config,
            prompt_template,
        }
    }
}

impl ShowFormat for ConfiguredFormat {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn display_name(&self) -> &str {
        &self.config.display_name
    }

    fn sections(&self) -> Vec<ShowSection> {
        self.config.sections.clone()
    }

    fn max_participants(&self) -> usize {
        self.config.max_participants
    }

    fn min_participants(&self) -> usize {
        self.config.min_participants
    }

    fn system_prompt(&self, topic: &str, persona_name: &str, opponent_name: &str) -> String {
        self.prompt_template
            .replace("{name}", persona_name)
            .replace("{topic}", topic)
            .replace("{opponent_name}", opponent_name)
    }
}

/// Get a show format by name with specified rounds.
pub fn get_format(name: &str, rounds: u32) -> Option<Box<dyn ShowFormat>> {
    match name.to_lowercase().as_str() {
        "debate" => Some(Box::new(HistoricalDebateFormat::new(rounds))),
        _ => None,
    }
}

/// List all available show format names.
pub fn available_formats() -> Vec<&'static str> {
    vec!["debate"]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debate_format_minimum_rounds() {
        let format = HistoricalDebateFormat::new(4);
        let sections = format.sections();

        // Minimum 4 rounds: opening, 1 main, rebuttal, closing
        assert_eq!(sections.len(), 4);
        assert_eq!(sections[0].name, "Opening Statements");
        assert_eq!(sections[1].name, "Main Arguments - Round 1");
        assert_eq!(sections[2].name, "Rebuttals");
        assert_eq!(sections[3].name, "Closing Statements");
    }

    #[test]
    fn test_debate_format_six_rounds() {
        let format = HistoricalDebateFormat::new(6);
        let sections = format.sections();

        // 6 rounds: opening, 3 main, rebuttal, closing
        assert_eq!(sections.len(), 6);
        assert_eq!(sections[1].name, "Main Arguments - Round 1");
        assert_eq!(sections[4].name, "Rebuttals");
        assert_eq!(sections[5].name, "Closing Statements");
    }

    #[test]
    fn test_debate_format_alternating_speakers() {
        let format = HistoricalDebateFormat::new(6);
        let sections = format.sections();

        // Main rounds should alternate speaker order
        assert_eq!(sections[1].speaker_order, vec![0, 1]);
        assert_eq!(sections[2].speaker_order, vec![1, 0]);
        assert_eq!(sections[3].speaker_order, vec![0, 1]);
    }

    #[test]
    fn test_rounds_below_minimum_are_clamped() {
        let format = HistoricalDebateFormat::new(1);
        assert_eq!(format.sections().len(), 4);
    }

    #[test]
    fn test_get_format_debate() {
        let format = get_format("debate", 6);
        assert!(format.is_some());
        assert_eq!(format.unwrap().name(), "debate");
    }

    #[test]
    fn test_get_format_unknown() {
        assert!(get_format("town_hall", 6).is_none());
    }

    #[test]
    fn test_participant_limits() {
        let format = HistoricalDebateFormat::new(6);
        assert_eq!(format.min_participants(), 2);
        assert_eq!(format.max_participants(), 2);
    }
}

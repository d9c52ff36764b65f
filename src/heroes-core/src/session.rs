//! Session orchestration logic.
//!
//! Drives a show (or a one-on-one chat) turn by turn: builds prompts,
//! calls the model, and appends the results to the message log. The turn
//! cycle is split into `begin_turn` / [`fetch_completion`] / `commit_turn`
//! so the caller can multiplex the model await with audio events.

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::types::chat::{
    ChatCompletionRequestAssistantMessage, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessage, ChatCompletionRequestUserMessage,
    CreateChatCompletionRequestArgs,
};
use tracing::warn;

use crate::error::PodcastError;
use crate::message::{MessageLog, SequenceIndex, Speaker};
use crate::persona::Persona;
use crate::show_format::{ShowFormat, ShowSection};

/// Default response length for chat replies, outside any show section.
const CHAT_MAX_TOKENS: u32 = 350;

/// Configuration for running a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// The topic of the episode (empty for open-ended chat).
    pub topic: String,
    /// OpenAI-compatible API base URL.
    pub api_base: String,
    /// API key for authentication.
    pub api_key: String,
}

impl SessionConfig {
    pub fn new(
        topic: impl Into<String>,
        api_base: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            topic: topic.into(),
            api_base: api_base.into(),
            api_key: api_key.into(),
        }
    }
}

/// Callback for session events.
pub type SessionCallback = Box<dyn Fn(SessionEvent) + Send + Sync>;

/// Events emitted while a session runs.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A new section is starting.
    SectionStart { name: String, description: String },
    /// A figure is about to speak.
    SpeakerStart { name: String, era: String },
    /// A figure has finished speaking.
    SpeakerMessage {
        name: String,
        sequence: SequenceIndex,
        content: String,
    },
    /// The show has concluded.
    ShowEnd,
}

/// What the session wants to happen next.
#[derive(Debug)]
pub enum TurnStep {
    /// A narrator line was appended to the log; voice it, no model call needed.
    Narration(SequenceIndex),
    /// A figure's turn; fetch a completion for the plan.
    Speech(TurnPlan),
}

/// A planned model call for one speaking turn.
///
/// Owns everything the completion request needs, so the await does not
/// borrow the session.
#[derive(Debug, Clone)]
pub struct TurnPlan {
    pub speaker_index: usize,
    pub persona_id: String,
    pub persona_name: String,
    pub voice: String,
    pub model: String,
    pub section: Option<String>,
    pub max_tokens: u32,
    pub messages: Vec<ChatCompletionRequestMessage>,
}

/// Orchestrates a conversation or debate between the listener and the cast.
pub struct Session {
    config: SessionConfig,
    cast: Vec<Persona>,
    sections: Vec<ShowSection>,
    narrator_template: String,
    /// Message history per cast member (for context).
    histories: Vec<Vec<ChatCompletionRequestMessage>>,
    log: MessageLog,
    section_index: usize,
    speaker_position: usize,
    announced_section: Option<usize>,
    finished: bool,
    callback: Option<SessionCallback>,
}

impl Session {
    /// Create a session that runs a formatted show with the given cast.
    pub fn show(
        config: SessionConfig,
        cast: Vec<Persona>,
        format: &dyn ShowFormat,
        narrator_template: impl Into<String>,
    ) -> Result<Self, PodcastError> {
        let cast_size = cast.len();
        let min = format.min_participants();
        let max = format.max_participants();

        if cast_size < min || cast_size > max {
            return Err(PodcastError::InvalidCastSize {
                min,
                max,
                actual: cast_size,
            });
        }

        let histories = cast
            .iter()
            .enumerate()
            .map(|(i, persona)| {
                let opponent_index = if i == 0 { 1 } else { 0 };
                let opponent_name = cast
                    .get(opponent_index)
                    .map(|op| op.name.as_str())
                    .unwrap_or("your opponent");

                let system_prompt = persona.custom_system_prompt.clone().unwrap_or_else(|| {
                    format.system_prompt(
                        &config.topic,
                        &persona.display_name_with_era(),
                        opponent_name,
                    )
                });

                vec![ChatCompletionRequestMessage::System(
                    ChatCompletionRequestSystemMessage {
                        content: system_prompt.into(),
                        name: None,
                    },
                )]
            })
            .collect();

        Ok(Self {
            config,
            cast,
            sections: format.sections(),
            narrator_template: narrator_template.into(),
            histories,
            log: MessageLog::new(),
            section_index: 0,
            speaker_position: 0,
            announced_section: None,
            finished: false,
            callback: None,
        })
    }

    /// Create a free-form chat session with a single figure.
    pub fn chat(
        config: SessionConfig,
        persona: Persona,
        system_prompt: impl Into<String>,
    ) -> Self {
        let system_prompt: String = system_prompt.into();
        let histories = vec![vec![ChatCompletionRequestMessage::System(
            ChatCompletionRequestSystemMessage {
                content: system_prompt.into(),
                name: None,
            },
        )]];

        Self {
            config,
            cast: vec![persona],
            sections: Vec::new(),
            narrator_template: String::new(),
            histories,
            log: MessageLog::new(),
            section_index: 0,
            speaker_position: 0,
            announced_section: None,
            finished: false,
            callback: None,
        }
    }

    /// Set a callback for session events.
    pub fn with_callback(mut self, callback: SessionCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Advance the show cursor and produce the next step.
    ///
    /// Returns `None` once every section has run. Entering a section first
    /// yields a [`TurnStep::Narration`] announcing it, then one
    /// [`TurnStep::Speech`] per scheduled speaker.
    pub fn begin_turn(&mut self) -> Option<TurnStep> {
        loop {
            let Some(section) = self.sections.get(self.section_index) else {
                if !self.finished {
                    self.finished = true;
                    self.emit_event(SessionEvent::ShowEnd);
                }
                return None;
            };
            let section = section.clone();

            if self.announced_section != Some(self.section_index) {
                self.announced_section = Some(self.section_index);
                self.emit_event(SessionEvent::SectionStart {
                    name: section.name.clone(),
                    description: section.description.clone(),
                });
                let narration = self
                    .narrator_template
                    .replace("{section_name}", &section.name)
                    .replace("{section_description}", &section.description);
                let sequence = self.log.append(
                    Speaker::Narrator,
                    "Narrator",
                    Some(section.name.clone()),
                    narration,
                );
                return Some(TurnStep::Narration(sequence));
            }

            if self.speaker_position >= section.speaker_order.len() {
                self.section_index += 1;
                self.speaker_position = 0;
                continue;
            }

            let speaker_index = section.speaker_order[self.speaker_position];
            self.speaker_position += 1;
            if speaker_index >= self.cast.len() {
                continue;
            }

            let persona = &self.cast[speaker_index];
            self.emit_event(SessionEvent::SpeakerStart {
                name: persona.name.clone(),
                era: persona.era.clone(),
            });

            // Build the prompt for this turn
            let section_prompt = format!(
                "[{} - {}]\nPlease deliver your {}.",
                section.name,
                section.description,
                section.name.to_lowercase()
            );
            self.histories[speaker_index].push(ChatCompletionRequestMessage::User(
                ChatCompletionRequestUserMessage {
                    content: section_prompt.into(),
                    name: None,
                },
            ));

            let persona = &self.cast[speaker_index];
            return Some(TurnStep::Speech(TurnPlan {
                speaker_index,
                persona_id: persona.id.clone(),
                persona_name: persona.name.clone(),
                voice: persona.voice.clone(),
                model: persona.model.clone(),
                section: Some(section.name.clone()),
                max_tokens: section.max_tokens,
                messages: self.histories[speaker_index].clone(),
            }));
        }
    }

    /// Record a listener message (chat mode). Never voiced.
    pub fn note_user(&mut self, text: impl Into<String>) -> SequenceIndex {
        let text = text.into();
        self.histories[0].push(ChatCompletionRequestMessage::User(
            ChatCompletionRequestUserMessage {
                content: text.clone().into(),
                name: None,
            },
        ));
        self.log.append(Speaker::User, "You", None, text)
    }

    /// Plan the figure's reply to the listener (chat mode).
    pub fn begin_reply(&mut self) -> TurnPlan {
        let persona = &self.cast[0];
        self.emit_event(SessionEvent::SpeakerStart {
            name: persona.name.clone(),
            era: persona.era.clone(),
        });
        TurnPlan {
            speaker_index: 0,
            persona_id: persona.id.clone(),
            persona_name: persona.name.clone(),
            voice: persona.voice.clone(),
            model: persona.model.clone(),
            section: None,
            max_tokens: CHAT_MAX_TOKENS,
            messages: self.histories[0].clone(),
        }
    }

    /// Append a completed turn to the log and the cast histories.
    pub fn commit_turn(&mut self, plan: &TurnPlan, content: String) -> SequenceIndex {
        let sequence = self.log.append(
            Speaker::Figure(plan.persona_id.clone()),
            plan.persona_name.clone(),
            plan.section.clone(),
            content.clone(),
        );

        self.emit_event(SessionEvent::SpeakerMessage {
            name: plan.persona_name.clone(),
            sequence,
            content: content.clone(),
        });

        // Add the response to the speaker's own history
        self.histories[plan.speaker_index].push(ChatCompletionRequestMessage::Assistant(
            ChatCompletionRequestAssistantMessage {
                content: Some(content.clone().into()),
                name: None,
                tool_calls: None,
                refusal: None,
                audio: None,
                function_call: None,
            },
        ));

        // Let the rest of the cast hear what was said
        for (i, history) in self.histories.iter_mut().enumerate() {
            if i != plan.speaker_index {
                let heard = format!("[{} said]: {}", plan.persona_name, content);
                history.push(ChatCompletionRequestMessage::User(
                    ChatCompletionRequestUserMessage {
                        content: heard.into(),
                        name: None,
                    },
                ));
            }
        }

        sequence
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn cast(&self) -> &[Persona] {
        &self.cast
    }

    pub fn log(&self) -> &MessageLog {
        &self.log
    }

    pub fn log_mut(&mut self) -> &mut MessageLog {
        &mut self.log
    }

    /// Serialize the transcript as pretty JSON.
    pub fn transcript_json(&self) -> Result<String, PodcastError> {
        serde_json::to_string_pretty(self.log.messages())
            .map_err(|e| PodcastError::ConfigError(format!("Failed to serialize transcript: {}", e)))
    }

    /// Emit an event if a callback is registered.
    fn emit_event(&self, event: SessionEvent) {
        if let Some(ref callback) = self.callback {
            callback(event);
        }
    }
}

/// Fetch a completion for a planned turn.
///
/// Owns its inputs so the future can be polled alongside audio events.
/// Retries transient API errors with exponential backoff, and re-asks when
/// the sanitized response comes back empty. Returns the plan together with
/// the sanitized text.
pub async fn fetch_completion(
    config: SessionConfig,
    plan: TurnPlan,
) -> Result<(TurnPlan, String), PodcastError> {
    // Custom HTTP client: generous timeouts, and tolerate the self-signed
    // certificates local OpenAI-compatible servers tend to present.
    let http_client = reqwest::Client::builder()
        .danger_accept_invalid_certs(true)
        .timeout(std::time::Duration::from_secs(120))
        .connect_timeout(std::time::Duration::from_secs(30))
        .build()
        .map_err(|e| PodcastError::ConfigError(format!("Failed to create HTTP client: {}", e)))?;

    let openai_config = OpenAIConfig::new()
        .with_api_key(&config.api_key)
        .with_api_base(&config.api_base);

    let client = Client::with_config(openai_config).with_http_client(http_client);

    let request = CreateChatCompletionRequestArgs::default()
        .model(&plan.model)
        .max_completion_tokens(plan.max_tokens)
        .messages(plan.messages.clone())
        .build()?;

    let max_empty_retries = 3;
    for attempt in 0..max_empty_retries {
        let raw = completion_with_backoff(&client, request.clone()).await?;
        let sanitized = sanitize_response(&raw);

        if !sanitized.trim().is_empty() && sanitized.trim().len() > 10 {
            return Ok((plan, sanitized));
        }

        if attempt < max_empty_retries - 1 {
            warn!(
                persona = %plan.persona_name,
                attempt = attempt + 1,
                "empty response, re-asking"
            );
            tokio::time::sleep(std::time::Duration::from_secs(2)).await;
        }
    }

    Err(PodcastError::EmptyResponse(plan.persona_name.clone()))
}

/// One completion call with retry and exponential backoff.
async fn completion_with_backoff(
    client: &Client<OpenAIConfig>,
    request: async_openai::types::chat::CreateChatCompletionRequest,
) -> Result<String, PodcastError> {
    let max_retries = 3;
    let mut last_error = None;

    for attempt in 0..max_retries {
        if attempt > 0 {
            // Exponential backoff: 1s, 2s, 4s
            let delay = std::time::Duration::from_secs(1 << attempt);
            tokio::time::sleep(delay).await;
        }

        match client.chat().create(request.clone()).await {
            Ok(response) => {
                let content = response
                    .choices
                    .first()
                    .and_then(|c| c.message.content.clone())
                    .unwrap_or_default();
                return Ok(content);
            }
            Err(e) => {
                last_error = Some(e);
                if attempt < max_retries - 1 {
                    continue;
                }
            }
        }
    }

    Err(last_error.map(PodcastError::from).unwrap_or_else(|| {
        PodcastError::ConfigError("Unknown API error after retries".to_string())
    }))
}

/// Sanitize a model response by stripping reasoning tokens and XML-like tags.
///
/// Removes patterns like <thinking>...</thinking>, <reflection>...</reflection>, etc.
pub fn sanitize_response(response: &str) -> String {
    // List of known reasoning/internal tags to strip with their content
    let tags_to_strip = [
        "thinking",
        "think",
        "reflection",
        "reflect",
        "internal",
        "reasoning",
        "thought",
        "scratch",
        "scratchpad",
        "plan",
        "analysis",
        "analyze",
        "consider",
        "pondering",
        "deliberation",
    ];

    let mut result = response.to_string();

    // Strip each known tag and its content
    for tag in &tags_to_strip {
        // Match <tag>...</tag> including with attributes and newlines
        let pattern = format!(r"(?is)<{tag}[^>]*>.*?</{tag}>", tag = tag);
        if let Ok(re) = regex::Regex::new(&pattern) {
            result = re.replace_all(&result, "").to_string();
        }
    }

    // Also remove any remaining orphaned opening/closing tags
    if let Ok(orphan_re) = regex::Regex::new(r"</?[\w]+[^>]*>") {
        result = orphan_re.replace_all(&result, "").to_string();
    }

    // Remove markdown emphasis markers; they read badly and the TTS would speak them
    result = result.replace("*", "");

    // Collapse whitespace runs
    if let Ok(ws_re) = regex::Regex::new(r"\s+") {
        result = ws_re.replace_all(&result, " ").to_string();
    }

    result.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::show_format::HistoricalDebateFormat;

    fn cast() -> Vec<Persona> {
        vec![
            Persona::new(
                "napoleon",
                "Napoleon Bonaparte",
                "Emperor of the French",
                "gpt-4o-mini",
                "bm_george",
            ),
            Persona::new(
                "cleopatra",
                "Cleopatra",
                "Queen of Egypt",
                "gpt-4o-mini",
                "bf_emma",
            ),
        ]
    }

    fn show_session() -> Session {
        Session::show(
            SessionConfig::new("Is ambition a virtue?", "http://localhost:1234/v1", "key"),
            cast(),
            &HistoricalDebateFormat::new(4),
            "[SECTION: {section_name}]\n{section_description}",
        )
        .unwrap()
    }

    #[test]
    fn test_show_rejects_wrong_cast_size() {
        let err = Session::show(
            SessionConfig::new("topic", "base", "key"),
            cast()[..1].to_vec(),
            &HistoricalDebateFormat::new(4),
            "",
        )
        .unwrap_err();
        assert!(matches!(
            err,
            PodcastError::InvalidCastSize {
                min: 2,
                max: 2,
                actual: 1
            }
        ));
    }

    #[test]
    fn test_section_opens_with_narration() {
        let mut session = show_session();
        let step = session.begin_turn().unwrap();
        let TurnStep::Narration(sequence) = step else {
            panic!("expected narration first");
        };
        let message = session.log().get(sequence).unwrap();
        assert_eq!(message.speaker, Speaker::Narrator);
        assert!(message.text.contains("Opening Statements"));
    }

    #[test]
    fn test_speech_plan_targets_scheduled_speaker() {
        let mut session = show_session();
        session.begin_turn(); // narration
        let TurnStep::Speech(plan) = session.begin_turn().unwrap() else {
            panic!("expected a speech plan");
        };
        assert_eq!(plan.speaker_index, 0);
        assert_eq!(plan.persona_id, "napoleon");
        assert_eq!(plan.voice, "bm_george");
        assert_eq!(plan.section.as_deref(), Some("Opening Statements"));
        // System prompt plus the section instruction
        assert_eq!(plan.messages.len(), 2);
        assert!(matches!(
            plan.messages.last().unwrap(),
            ChatCompletionRequestMessage::User(_)
        ));
    }

    #[test]
    fn test_commit_turn_crossposts_to_opponent() {
        let mut session = show_session();
        session.begin_turn();
        let TurnStep::Speech(plan) = session.begin_turn().unwrap() else {
            panic!("expected a speech plan");
        };
        let sequence = session.commit_turn(&plan, "Ambition built empires.".into());

        let message = session.log().get(sequence).unwrap();
        assert_eq!(message.speaker, Speaker::Figure("napoleon".into()));

        // Speaker history: system + section prompt + own answer
        assert_eq!(session.histories[0].len(), 3);
        // Opponent history: system + overheard line
        assert_eq!(session.histories[1].len(), 2);
        assert!(matches!(
            session.histories[1].last().unwrap(),
            ChatCompletionRequestMessage::User(_)
        ));
    }

    #[test]
    fn test_show_walks_every_section_then_ends() {
        let mut session = show_session();
        let mut narrations = 0;
        let mut speeches = 0;
        while let Some(step) = session.begin_turn() {
            match step {
                TurnStep::Narration(_) => narrations += 1,
                TurnStep::Speech(plan) => {
                    speeches += 1;
                    session.commit_turn(&plan, format!("speech {speeches}"));
                }
            }
        }
        // 4 sections, 2 speakers each
        assert_eq!(narrations, 4);
        assert_eq!(speeches, 8);
        assert!(session.begin_turn().is_none());
    }

    #[test]
    fn test_chat_user_turns_are_logged_unvoiced() {
        let mut session = Session::chat(
            SessionConfig::new("", "base", "key"),
            cast().remove(0),
            "You are Napoleon.",
        );
        let sequence = session.note_user("What was Austerlitz like?");
        assert_eq!(session.log().get(sequence).unwrap().speaker, Speaker::User);

        let plan = session.begin_reply();
        assert_eq!(plan.max_tokens, CHAT_MAX_TOKENS);
        // System prompt + user question
        assert_eq!(plan.messages.len(), 2);
        session.commit_turn(&plan, "A fog, then the sun.".into());
        assert_eq!(session.log().len(), 2);
    }

    #[test]
    fn test_sanitize_response_thinking_tags() {
        let input = "<thinking>Let me think about this...</thinking>The answer is 42.";
        assert_eq!(sanitize_response(input), "The answer is 42.");
    }

    #[test]
    fn test_sanitize_response_reflection_tags() {
        let input = "Hello <reflection>internal thought</reflection> world!";
        assert_eq!(sanitize_response(input), "Hello world!");
    }

    #[test]
    fn test_sanitize_response_no_tags() {
        let input = "No tags here, just text.";
        assert_eq!(sanitize_response(input), "No tags here, just text.");
    }

    #[test]
    fn test_sanitize_response_multiline_tags() {
        let input = "<thinking>\nMultiple\nlines\nof\nthought\n</thinking>Final answer here.";
        assert_eq!(sanitize_response(input), "Final answer here.");
    }

    #[test]
    fn test_sanitize_response_strips_orphan_tags() {
        let input = "Start <think>nested <inner>tags</inner> content</think> end";
        let output = sanitize_response(input);
        assert!(!output.contains("<"));
        assert!(!output.contains(">"));
    }

    #[test]
    fn test_sanitize_response_multiple_tag_types() {
        let input = "<plan>First plan</plan>Then <reasoning>reason</reasoning> finally the answer.";
        assert_eq!(sanitize_response(input), "Then finally the answer.");
    }
}

//! Heroes of History - AI Podcast CLI
//!
//! Debate between, or talk with, AI-voiced historical figures. Speech is
//! generated per message and played through the sequenced playback queue.

use std::future::Future;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::{env, process};

use clap::{ArgAction, Parser, Subcommand};
use colored::Colorize;
use heroes_core::tts::{self, SAMPLE_RATE};
use heroes_core::{
    AudioEvent, AudioSink, ClipRequest, Config, DeviceSink, Persona, PlaybackEvent, PlaybackQueue,
    PodcastError, PodcastTts, Session, SessionConfig, SessionEvent, TtsClipStore, TurnPlan,
    TurnStep, WavWriterSink, default_config, fetch_completion,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "heroes",
    version,
    about = "Heroes of History - an AI podcast with historical figures",
    long_about = "Run debates between AI-voiced historical figures, or talk to one yourself, \
                  using OpenAI-compatible APIs for the words and kokoro for the voices."
)]
struct Cli {
    /// Path to a TOML config file (embedded defaults otherwise)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a debate between two historical figures
    Debate {
        /// The topic to debate
        #[arg(value_name = "TOPIC")]
        topic: String,

        /// Figures taking part (specify exactly twice: -p napoleon -p cleopatra)
        #[arg(short, long, action = ArgAction::Append, value_name = "PERSONA")]
        persona: Vec<String>,

        /// Number of debate rounds (minimum 4)
        #[arg(short, long, default_value = "6", value_name = "ROUNDS")]
        rounds: u32,

        /// Start muted: clips are generated and queued but not played
        #[arg(long)]
        mute: bool,

        /// Write clips to this directory instead of playing them
        #[arg(long, value_name = "DIR")]
        clips_dir: Option<PathBuf>,

        /// Save the whole episode as a single WAV file
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Save the episode under an auto-generated filename based on the topic
        #[arg(long, conflicts_with = "output")]
        save: bool,

        /// Episode speed for --output (0.75 = slower, 1.25 = faster)
        #[arg(long, default_value = "1.0", value_name = "RATE")]
        rate: f32,

        /// Write the transcript as JSON
        #[arg(long, value_name = "FILE")]
        transcript: Option<PathBuf>,
    },

    /// Talk one-on-one with a historical figure
    Chat {
        /// Figure to talk to
        #[arg(value_name = "PERSONA")]
        persona: String,

        /// Start muted
        #[arg(long)]
        mute: bool,

        /// Write clips to this directory instead of playing them
        #[arg(long, value_name = "DIR")]
        clips_dir: Option<PathBuf>,
    },

    /// List available TTS voices
    Voices,
}

type CompletionFuture = Pin<Box<dyn Future<Output = Result<(TurnPlan, String), PodcastError>>>>;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file if present
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => default_config(),
    };

    let api_base = env::var("OPENAI_API_BASE")
        .or_else(|_| env::var("OPENAI_BASE_URL"))
        .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());

    let api_key = env::var("OPENAI_API_KEY").unwrap_or_else(|_| {
        eprintln!(
            "{}",
            "Warning: OPENAI_API_KEY not set. API calls may fail.".yellow()
        );
        String::new()
    });

    match cli.command {
        Command::Debate {
            topic,
            persona,
            rounds,
            mute,
            clips_dir,
            output,
            save,
            rate,
            transcript,
        } => {
            let session_config = SessionConfig::new(&topic, api_base, api_key);
            let output = output
                .or_else(|| save.then(|| PathBuf::from(tts::generate_output_filename(&topic))));
            run_debate(
                &config,
                session_config,
                &topic,
                &persona,
                rounds,
                mute,
                clips_dir.as_deref(),
                output,
                rate,
                transcript,
            )
            .await?;
        }
        Command::Chat {
            persona,
            mute,
            clips_dir,
        } => {
            let session_config = SessionConfig::new("", api_base, api_key);
            run_chat(&config, session_config, &persona, mute, clips_dir.as_deref()).await?;
        }
        Command::Voices => {
            let tts = PodcastTts::new(config.voices.clone()).await?;
            println!("{}", "Available voices:".bold());
            for voice in tts.available_voices() {
                println!("  - {}", voice);
            }
        }
    }

    Ok(())
}

/// The playback queue plus everything the driver loop needs around it.
struct Audio {
    queue: PlaybackQueue,
    events: mpsc::UnboundedReceiver<AudioEvent>,
    tts: std::sync::Arc<std::sync::Mutex<PodcastTts>>,
    narrator_voice: String,
}

/// Build the audio pipeline: synthesizer, clip store, playback medium.
///
/// Falls back to writing clips into `./clips` when no output device exists.
async fn open_audio(
    config: &Config,
    cast: &[Persona],
    clips_dir: Option<&Path>,
) -> Result<Audio, PodcastError> {
    let (events_tx, events_rx) = mpsc::unbounded_channel();

    let tts = PodcastTts::new(config.voices.clone()).await?;
    tts.validate_cast(cast)?;
    let narrator_voice = tts.narrator_voice().to_string();

    let store = TtsClipStore::new(tts, events_tx.clone());
    let shared_tts = store.shared();

    let sink: Box<dyn AudioSink> = match clips_dir {
        Some(dir) => Box::new(WavWriterSink::new(dir, events_tx.clone())?),
        None => match DeviceSink::open(events_tx.clone()) {
            Ok(device) => Box::new(device),
            Err(err) => {
                eprintln!(
                    "{}",
                    format!("No audio device ({}); writing clips to ./clips instead.", err)
                        .yellow()
                );
                Box::new(WavWriterSink::new("clips", events_tx.clone())?)
            }
        },
    };

    let queue =
        PlaybackQueue::new(Box::new(store), sink).with_callback(create_playback_callback());

    Ok(Audio {
        queue,
        events: events_rx,
        tts: shared_tts,
        narrator_voice,
    })
}

#[allow(clippy::too_many_arguments)]
async fn run_debate(
    config: &Config,
    session_config: SessionConfig,
    topic: &str,
    persona_ids: &[String],
    rounds: u32,
    mute: bool,
    clips_dir: Option<&Path>,
    output: Option<PathBuf>,
    rate: f32,
    transcript: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let rounds = rounds.max(4);

    let format = config.debate_format(rounds);
    let min = format.min_participants();
    let max = format.max_participants();
    if persona_ids.len() < min || persona_ids.len() > max {
        eprintln!(
            "{} The '{}' format requires {} to {} figures, but {} were given.",
            "Error:".red().bold(),
            format.name(),
            min,
            max,
            persona_ids.len()
        );
        eprintln!(
            "Usage: heroes debate \"{}\" {}",
            topic,
            (0..min)
                .map(|i| format!("-p persona{}", i + 1))
                .collect::<Vec<_>>()
                .join(" ")
        );
        process::exit(1);
    }

    let cast: Vec<Persona> = persona_ids
        .iter()
        .map(|id| config.persona(id))
        .collect::<Result<_, _>>()?;

    // Print header
    println!();
    println!("{}", "═".repeat(70).bright_blue());
    println!(
        "{}",
        format!("  {} - {}", "Heroes of History".bold(), format.display_name())
            .bright_blue()
            .bold()
    );
    println!("{}", "═".repeat(70).bright_blue());
    println!();
    println!("{} {}", "Topic:".bold(), topic.bright_white());
    println!();
    println!("{}", "On stage:".bold());
    for (i, p) in cast.iter().enumerate() {
        println!(
            "  {}. {} ({}) - voiced by {}",
            i + 1,
            p.name.bright_cyan(),
            p.era.yellow(),
            p.voice.dimmed()
        );
    }
    println!();
    println!("{}", "─".repeat(70).dimmed());

    let mut audio = open_audio(config, &cast, clips_dir).await?;

    let narrator_template = if config.prompts.narrator_template.is_empty() {
        "{section_name}. {section_description}".to_string()
    } else {
        config.prompts.narrator_template.clone()
    };

    let mut session = Session::show(
        session_config.clone(),
        cast,
        format.as_ref(),
        narrator_template,
    )?
    .with_callback(create_console_callback());

    if mute {
        audio.queue.set_muted(session.log_mut(), true);
    }

    let mut pending_completion: Option<CompletionFuture> = None;
    let mut show_done = false;

    loop {
        // Advance the show until a model call is in flight or it is over.
        while pending_completion.is_none() && !show_done {
            match session.begin_turn() {
                Some(TurnStep::Narration(sequence)) => {
                    let text = session
                        .log()
                        .get(sequence)
                        .map(|m| m.text.clone())
                        .unwrap_or_default();
                    audio.queue.request_audio(
                        session.log_mut(),
                        ClipRequest {
                            sequence,
                            text,
                            voice: audio.narrator_voice.clone(),
                        },
                    );
                }
                Some(TurnStep::Speech(plan)) => {
                    pending_completion =
                        Some(Box::pin(fetch_completion(session_config.clone(), plan)));
                }
                None => show_done = true,
            }
        }

        if show_done
            && !session.log().any_generating()
            && (audio.queue.is_idle() || audio.queue.is_muted())
        {
            break;
        }

        tokio::select! {
            result = async { pending_completion.as_mut().unwrap().await }, if pending_completion.is_some() => {
                pending_completion = None;
                let (plan, text) = result?;
                let sequence = session.commit_turn(&plan, text);
                let spoken = session
                    .log()
                    .get(sequence)
                    .map(|m| m.text.clone())
                    .unwrap_or_default();
                audio.queue.request_audio(
                    session.log_mut(),
                    ClipRequest {
                        sequence,
                        text: spoken,
                        voice: plan.voice.clone(),
                    },
                );
            }
            Some(event) = audio.events.recv() => {
                audio.queue.handle_event(session.log_mut(), event);
            }
        }
    }

    println!();
    println!("{}", "═".repeat(70).bright_blue());
    println!("{}", "  Episode concluded.".bright_green().bold());
    println!("{}", "═".repeat(70).bright_blue());
    println!();

    if let Some(path) = transcript {
        std::fs::write(&path, session.transcript_json()?)?;
        println!("Transcript written to {}", path.display());
    }

    if let Some(path) = output {
        save_episode(&audio, &session, &path, rate)?;
        println!("Episode written to {}", path.display());
    }

    Ok(())
}

/// Assemble every ready clip, in transcript order, into one WAV.
fn save_episode(
    audio: &Audio,
    session: &Session,
    path: &Path,
    rate: f32,
) -> Result<(), PodcastError> {
    let segments: Vec<Vec<f32>> = session
        .log()
        .iter()
        .filter_map(|m| m.clip())
        .map(|clip| clip.samples.as_slice().to_vec())
        .collect();
    if segments.is_empty() {
        eprintln!("{}", "No audio clips to save.".yellow());
        return Ok(());
    }

    let combined = tts::combine_audio_segments(segments, 0.8, SAMPLE_RATE);
    let adjusted = tts::adjust_audio_speed(combined, rate);

    let synth = audio
        .tts
        .lock()
        .map_err(|_| PodcastError::TtsError("synthesizer lock poisoned".into()))?;
    synth.save_wav(path, &adjusted)
}

async fn run_chat(
    config: &Config,
    session_config: SessionConfig,
    persona_id: &str,
    mute: bool,
    clips_dir: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let persona = config.persona(persona_id)?;
    let system_prompt = config.chat_prompt(&persona.name, &persona.era);

    println!();
    println!("{}", "═".repeat(70).bright_blue());
    println!(
        "{}",
        format!("  Talking with {} ({})", persona.name, persona.era)
            .bright_blue()
            .bold()
    );
    println!("{}", "═".repeat(70).bright_blue());
    println!(
        "{}",
        "  Commands: /mute  /unmute  /replay <n>  /quit".dimmed()
    );
    println!();

    let mut audio = open_audio(config, std::slice::from_ref(&persona), clips_dir).await?;
    let mut session = Session::chat(session_config.clone(), persona, system_prompt)
        .with_callback(create_console_callback());

    if mute {
        audio.queue.set_muted(session.log_mut(), true);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("{} ", "You>".bold());
        std::io::stdout().flush()?;

        // Wait for input while keeping the audio pipeline moving.
        let line = loop {
            tokio::select! {
                line = lines.next_line() => break line?,
                Some(event) = audio.events.recv() => {
                    audio.queue.handle_event(session.log_mut(), event);
                }
            }
        };
        let Some(line) = line else { break }; // EOF
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        match input {
            "/quit" | "/exit" => break,
            "/mute" => audio.queue.set_muted(session.log_mut(), true),
            "/unmute" => audio.queue.set_muted(session.log_mut(), false),
            _ if input.starts_with("/replay") => {
                let argument = input.trim_start_matches("/replay").trim();
                match argument.parse::<usize>() {
                    Ok(sequence) => {
                        if let Err(err) = audio.queue.play_specific(session.log(), sequence) {
                            eprintln!("{}", format!("Cannot replay: {}", err).yellow());
                        }
                    }
                    Err(_) => eprintln!("{}", "Usage: /replay <message number>".yellow()),
                }
            }
            _ => {
                session.note_user(input);
                let plan = session.begin_reply();
                let mut completion = Box::pin(fetch_completion(session_config.clone(), plan));

                let result = loop {
                    tokio::select! {
                        result = &mut completion => break result,
                        Some(event) = audio.events.recv() => {
                            audio.queue.handle_event(session.log_mut(), event);
                        }
                    }
                };

                match result {
                    Ok((plan, text)) => {
                        let sequence = session.commit_turn(&plan, text);
                        let spoken = session
                            .log()
                            .get(sequence)
                            .map(|m| m.text.clone())
                            .unwrap_or_default();
                        audio.queue.request_audio(
                            session.log_mut(),
                            ClipRequest {
                                sequence,
                                text: spoken,
                                voice: plan.voice.clone(),
                            },
                        );
                    }
                    Err(err) => {
                        eprintln!("{}", format!("Error: {}", err).red());
                    }
                }
            }
        }
    }

    println!();
    println!("{}", "  Farewell.".bright_green());
    Ok(())
}

/// Create a callback that prints session events to the console.
fn create_console_callback() -> Box<dyn Fn(SessionEvent) + Send + Sync> {
    Box::new(move |event| match event {
        SessionEvent::SectionStart { name, description } => {
            println!();
            println!("{}", "═".repeat(70).bright_magenta());
            println!(
                "{}",
                format!("  📢 NARRATOR: {}", name).bright_magenta().bold()
            );
            println!("  {}", description.dimmed());
            println!("{}", "═".repeat(70).bright_magenta());
            println!();
        }
        SessionEvent::SpeakerStart { name, era } => {
            println!(
                "{} {} {}",
                "▶".bright_cyan(),
                name.bright_cyan().bold(),
                format!("({})", era).yellow()
            );
        }
        SessionEvent::SpeakerMessage {
            name: _,
            sequence,
            content,
        } => {
            // Word wrap and indent the content
            let wrapped = textwrap(&content, 66);
            for line in wrapped.lines() {
                println!("  {}", line);
            }
            println!("  {}", format!("[#{}]", sequence).dimmed());
            println!();
        }
        SessionEvent::ShowEnd => {
            // Handled in run_debate
        }
    })
}

/// Create a callback that prints playback status lines.
fn create_playback_callback() -> Box<dyn Fn(PlaybackEvent)> {
    Box::new(move |event| match event {
        PlaybackEvent::Started { sequence } => {
            println!("{}", format!("  ♪ playing #{}", sequence).dimmed());
        }
        PlaybackEvent::Failed { sequence } => {
            eprintln!(
                "{}",
                format!("  ♪ clip #{} could not be played, skipping", sequence).yellow()
            );
        }
        PlaybackEvent::MuteChanged { muted } => {
            let status = if muted { "muted" } else { "unmuted" };
            println!("{}", format!("  ♪ {}", status).dimmed());
        }
        PlaybackEvent::Finished { .. } | PlaybackEvent::Stopped { .. } => {}
    })
}

/// Simple text wrapping function.
fn textwrap(text: &str, width: usize) -> String {
    let mut result = String::new();
    let mut current_line_len = 0;

    for word in text.split_whitespace() {
        if current_line_len + word.len() + 1 > width && current_line_len > 0 {
            result.push('\n');
            current_line_len = 0;
        }
        if current_line_len > 0 {
            result.push(' ');
            current_line_len += 1;
        }
        result.push_str(word);
        current_line_len += word.len();
    }

    result
}

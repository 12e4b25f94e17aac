//! keyglot debug CLI — replay a scripted keystroke transcript against
//! the in-memory stub platform, inspect or clear the learned user
//! dictionary. A strict subset of the teacher's CLI surface: no web
//! server, no dictionary-building tools, no benchmark binary.

use std::path::PathBuf;
use std::sync::Once;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use keyglot_pipeline::pipeline::{CorrectionPipeline, PipelineAction};
use keyglot_pipeline::platform::stub::StubPlatform;
use keyglot_pipeline::platform::{KeyDirection, KeyModifiers, RawKeyEvent, TextHost};
use keyglot_pipeline::Configuration;

#[derive(Parser, Debug)]
#[command(name = "keyglot")]
#[command(about = "keyglot debug CLI — replay keystrokes, inspect learned rules")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replay a scripted transcript of keystrokes against the stub
    /// platform and print the resulting pipeline decisions.
    Replay {
        /// Transcript file: one instruction per line.
        /// `type <text>`, `alt`, `wait <ms>`, `boundary <focus|click|arrow>`.
        script: PathBuf,
    },
    /// Inspect or clear the persisted user dictionary.
    Dict {
        #[command(subcommand)]
        action: DictAction,
    },
}

#[derive(Subcommand, Debug)]
enum DictAction {
    /// Print every learned/manual rule.
    List,
    /// Clear all learned rules (the only externally reachable mutator
    /// beyond learning itself).
    Clear,
}

static INIT_LOGGING: Once = Once::new();

fn init_logging() {
    INIT_LOGGING.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .or_else(|_| tracing_subscriber::EnvFilter::try_from_env("KEYGLOT_LOG"))
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    });
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Replay { script } => run_replay(&script),
        Commands::Dict { action } => run_dict(action),
    }
}

fn run_replay(script: &PathBuf) -> Result<()> {
    let contents = std::fs::read_to_string(script).with_context(|| format!("reading transcript {script:?}"))?;
    let mut pipeline = CorrectionPipeline::new(Configuration::default());
    let mut platform = StubPlatform::new();
    let mut now = Instant::now();

    for (lineno, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut parts = line.splitn(2, char::is_whitespace);
        let directive = parts.next().unwrap_or_default();
        let rest = parts.next().unwrap_or_default().trim();

        match directive {
            "type" => {
                for c in rest.chars() {
                    platform.send_type(&c.to_string());
                    let actions = pipeline.handle_key_event(&mut platform, &char_event(c), now);
                    print_actions(&actions);
                }
            }
            "alt" => {
                let event = RawKeyEvent {
                    key_code: 0,
                    modifiers: KeyModifiers { alt: true, ..Default::default() },
                    direction: KeyDirection::Down,
                    produced_char: None,
                };
                let actions = pipeline.handle_key_event(&mut platform, &event, now);
                print_actions(&actions);
            }
            "wait" => {
                let ms: u64 = rest.parse().with_context(|| format!("line {}: invalid wait duration", lineno + 1))?;
                now += Duration::from_millis(ms);
                let actions = pipeline.tick(&mut platform, now);
                print_actions(&actions);
            }
            "boundary" => {
                let reason = match rest {
                    "focus" => keyglot_pipeline::buffer::BoundaryReason::FocusChange,
                    "click" => keyglot_pipeline::buffer::BoundaryReason::MouseClick,
                    "arrow" => keyglot_pipeline::buffer::BoundaryReason::ArrowKey,
                    other => anyhow::bail!("line {}: unknown boundary kind {other:?}", lineno + 1),
                };
                let actions = pipeline.handle_external_boundary(&mut platform, reason, now);
                print_actions(&actions);
            }
            other => anyhow::bail!("line {}: unknown directive {other:?}", lineno + 1),
        }
    }

    println!("--- final document ---\n{}", platform.document);
    pipeline.save_learning();
    Ok(())
}

fn char_event(c: char) -> RawKeyEvent {
    RawKeyEvent { key_code: 0, modifiers: KeyModifiers::default(), direction: KeyDirection::Down, produced_char: Some(c) }
}

fn print_actions(actions: &[PipelineAction]) {
    for action in actions {
        match action {
            PipelineAction::Committed { original, rewritten, hypothesis, automatic } => {
                println!(
                    "{} {original:?} -> {rewritten:?} ({hypothesis:?})",
                    if *automatic { "AUTO_CORRECT" } else { "MANUAL_CORRECT" }
                );
            }
            PipelineAction::Deferred { token } => println!("DEFER {token:?}"),
            PipelineAction::CycleAdvanced { text } => println!("CYCLE -> {text:?}"),
            PipelineAction::NoOp => {}
        }
    }
}

fn run_dict(action: DictAction) -> Result<()> {
    let path = Configuration::user_dictionary_file().context("could not determine user dictionary path")?;
    match action {
        DictAction::List => {
            let dict = keyglot_core::UserDictionary::load(&path);
            println!("{} rule(s) in {path:?}", dict.len());
        }
        DictAction::Clear => {
            let mut dict = keyglot_core::UserDictionary::load(&path);
            dict.clear();
            dict.save_to(&path)?;
            println!("cleared all learned rules in {path:?}");
        }
    }
    Ok(())
}

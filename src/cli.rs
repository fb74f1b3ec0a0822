//! Interactive operator console
//!
//! A rustyline REPL on its own OS thread parses lines into
//! [`ConsoleCommand`]s and hands them to the async side, where
//! [`Console::apply`] runs them against the engine.

use crate::detector::AggregateDetector;
use crate::engine::{EngineHandle, EngineSnapshot, PlaybackSignal};
use crate::player::ConsolePlayer;
use anyhow::{Context, Result};
use colored::*;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

const PROMPT: &str = "still> ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Status,
    /// Force the "other app playing" bit of the signal
    Other(bool),
    /// Force the "managed player is now-playing target" bit
    Target(bool),
    /// Report one application's activity to the manual detector
    App { id: String, active: bool },
    PauseMonitoring,
    ResumeMonitoring,
    /// Simulate the user pressing play on the managed player
    UserPlay,
    /// Simulate the user pausing the managed player
    UserPause,
    Help,
    Quit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("unknown command '{0}' (type 'help')")]
    Unknown(String),
    #[error("usage: {0}")]
    Usage(&'static str),
}

/// Parse one console line. Blank lines yield `Ok(None)`.
pub fn parse_command(line: &str) -> Result<Option<ConsoleCommand>, ParseError> {
    let mut words = line.split_whitespace();
    let Some(head) = words.next() else {
        return Ok(None);
    };
    let rest: Vec<&str> = words.collect();

    let command = match (head.to_lowercase().as_str(), rest.as_slice()) {
        ("status" | "s", []) => ConsoleCommand::Status,
        ("other", [state]) => ConsoleCommand::Other(parse_switch(state, "other on|off")?),
        ("other", _) => return Err(ParseError::Usage("other on|off")),
        ("target", [state]) => ConsoleCommand::Target(parse_switch(state, "target on|off")?),
        ("target", _) => return Err(ParseError::Usage("target on|off")),
        ("app", [id, state]) => ConsoleCommand::App {
            id: id.to_string(),
            active: parse_switch(state, "app <id> on|off")?,
        },
        ("app", _) => return Err(ParseError::Usage("app <id> on|off")),
        ("pause", []) => ConsoleCommand::PauseMonitoring,
        ("resume", []) => ConsoleCommand::ResumeMonitoring,
        ("play", []) => ConsoleCommand::UserPlay,
        ("stop-player", []) => ConsoleCommand::UserPause,
        ("help" | "?", _) => ConsoleCommand::Help,
        ("quit" | "exit" | "q", _) => ConsoleCommand::Quit,
        (other, _) => return Err(ParseError::Unknown(other.to_string())),
    };
    Ok(Some(command))
}

fn parse_switch(word: &str, usage: &'static str) -> Result<bool, ParseError> {
    match word.to_lowercase().as_str() {
        "on" | "1" | "true" | "yes" => Ok(true),
        "off" | "0" | "false" | "no" => Ok(false),
        _ => Err(ParseError::Usage(usage)),
    }
}

pub fn print_help() {
    println!("\n{}", "Commands:".bold());
    let rows = [
        ("status", "show engine state"),
        ("other on|off", "simulate another app playing / stopping"),
        ("target on|off", "simulate the player being the now-playing target"),
        ("app <id> on|off", "report one app to the manual detector"),
        ("pause", "pause monitoring"),
        ("resume", "resume monitoring"),
        ("play", "simulate the user pressing play (dry run)"),
        ("stop-player", "simulate the user pausing the player (dry run)"),
        ("help", "this list"),
        ("quit", "exit"),
    ];
    for (command, description) in rows {
        println!("  {:<18} {}", command.yellow(), description);
    }
    println!();
}

/// Multi-line colored status block
pub fn render_status(snapshot: &EngineSnapshot, detector_summary: Option<&str>) -> String {
    let state = match snapshot.state {
        s if s.is_pending() => s.label().yellow().bold(),
        s if s.is_monitoring() => s.label().green().bold(),
        s => s.label().red().bold(),
    };
    let flag = if snapshot.paused_by_engine {
        "yes".cyan()
    } else {
        "no".normal()
    };
    let observation = match snapshot.last_observation {
        Some(o) if !o.running => "not running".dimmed().to_string(),
        Some(o) if o.playing => "playing".green().to_string(),
        Some(_) => "paused".to_string(),
        None => "unknown".dimmed().to_string(),
    };

    let mut out = String::new();
    out.push_str(&format!("  State:            {}\n", state));
    out.push_str(&format!("  Paused by engine: {}\n", flag));
    out.push_str(&format!("  Player:           {}\n", observation));
    out.push_str(&format!(
        "  Other audio:      {}{}\n",
        if snapshot.latest_signal.other_app_playing {
            "yes".yellow()
        } else {
            "no".normal()
        },
        if snapshot.latest_signal.managed_is_now_playing_target {
            " (player is now-playing target)"
        } else {
            ""
        }
    ));
    if let Some(situation) = snapshot.situation {
        out.push_str(&format!("  Situation:        {:?}\n", situation));
    }
    if let Some(summary) = detector_summary {
        out.push_str(&format!("  Detector:         {}\n", summary));
    }
    out.push_str(&format!(
        "  Since:            {} ({} transitions)",
        snapshot.changed_at.format("%H:%M:%S"),
        snapshot.transition_count
    ));
    out
}

/// Start the REPL thread
///
/// Runs on a plain thread so a pending `readline` never holds up runtime
/// shutdown. The thread ends after sending `Quit` or when the receiver is gone.
pub fn spawn_console(tx: mpsc::UnboundedSender<ConsoleCommand>) -> Result<()> {
    std::thread::Builder::new()
        .name("console".to_string())
        .spawn(move || {
            if let Err(e) = run_repl(&tx) {
                eprintln!("{} {:#}", "Console error:".red(), e);
                let _ = tx.send(ConsoleCommand::Quit);
            }
        })
        .context("Failed to spawn console thread")?;
    Ok(())
}

fn run_repl(tx: &mpsc::UnboundedSender<ConsoleCommand>) -> Result<()> {
    let mut rl = DefaultEditor::new()?;
    println!("Type {} for commands.", "help".yellow());

    loop {
        match rl.readline(PROMPT) {
            Ok(line) => {
                if !line.trim().is_empty() {
                    let _ = rl.add_history_entry(line.as_str());
                }
                match parse_command(&line) {
                    Ok(None) => {}
                    Ok(Some(ConsoleCommand::Help)) => print_help(),
                    Ok(Some(command)) => {
                        let quit = command == ConsoleCommand::Quit;
                        if tx.send(command).is_err() || quit {
                            break;
                        }
                    }
                    Err(e) => println!("{}", e.to_string().red()),
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                let _ = tx.send(ConsoleCommand::Quit);
                break;
            }
            Err(e) => return Err(e.into()),
        }
    }

    Ok(())
}

/// Async side of the console: applies commands to the engine
pub struct Console {
    engine: EngineHandle,
    /// Present when the manual detector is active
    aggregate: Option<Arc<AggregateDetector>>,
    /// Present in dry-run mode
    player: Option<Arc<ConsolePlayer>>,
    /// Signal composed from `other`/`target` commands
    signal: PlaybackSignal,
}

impl Console {
    pub fn new(
        engine: EngineHandle,
        aggregate: Option<Arc<AggregateDetector>>,
        player: Option<Arc<ConsolePlayer>>,
    ) -> Self {
        Self {
            engine,
            aggregate,
            player,
            signal: PlaybackSignal::IDLE,
        }
    }

    /// Run one command. Returns false when the application should exit.
    pub async fn apply(&mut self, command: ConsoleCommand) -> bool {
        debug!(?command, "Console command");

        match command {
            ConsoleCommand::Status => {
                let snapshot = match self.engine.query_snapshot().await {
                    Some(snapshot) => snapshot,
                    None => self.engine.snapshot(),
                };
                let summary = self.aggregate.as_ref().map(|a| a.summary());
                println!("{}", render_status(&snapshot, summary.as_deref()));
            }
            ConsoleCommand::Other(playing) => {
                self.signal.other_app_playing = playing;
                self.engine.on_signal(self.signal);
            }
            ConsoleCommand::Target(target) => {
                self.signal.managed_is_now_playing_target = target;
                self.engine.on_signal(self.signal);
            }
            ConsoleCommand::App { id, active } => match &self.aggregate {
                Some(aggregate) => aggregate.report(&id, active),
                None => println!(
                    "{}",
                    "'app' needs detector.kind: manual; use 'other on|off' instead".yellow()
                ),
            },
            ConsoleCommand::PauseMonitoring => self.engine.pause_monitoring().await,
            ConsoleCommand::ResumeMonitoring => self.engine.resume_monitoring().await,
            ConsoleCommand::UserPlay | ConsoleCommand::UserPause => match &self.player {
                Some(player) => player.set_playing(command == ConsoleCommand::UserPlay),
                None => println!(
                    "{}",
                    "Simulated user actions need --dry-run or player.kind: console".yellow()
                ),
            },
            ConsoleCommand::Help => print_help(),
            ConsoleCommand::Quit => return false,
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::{Detector, ManagedIdentity};
    use crate::engine::{EngineSettings, EngineState};
    use std::time::Duration;

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse_command("   "), Ok(None));
        assert_eq!(parse_command("status"), Ok(Some(ConsoleCommand::Status)));
        assert_eq!(parse_command("Other ON"), Ok(Some(ConsoleCommand::Other(true))));
        assert_eq!(parse_command("target off"), Ok(Some(ConsoleCommand::Target(false))));
        assert_eq!(
            parse_command("app us.zoom.xos on"),
            Ok(Some(ConsoleCommand::App {
                id: "us.zoom.xos".to_string(),
                active: true
            }))
        );
        assert_eq!(parse_command("pause"), Ok(Some(ConsoleCommand::PauseMonitoring)));
        assert_eq!(parse_command("resume"), Ok(Some(ConsoleCommand::ResumeMonitoring)));
        assert_eq!(parse_command("play"), Ok(Some(ConsoleCommand::UserPlay)));
        assert_eq!(parse_command("stop-player"), Ok(Some(ConsoleCommand::UserPause)));
        assert_eq!(parse_command("exit"), Ok(Some(ConsoleCommand::Quit)));
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            parse_command("other maybe"),
            Err(ParseError::Usage("other on|off"))
        );
        assert_eq!(parse_command("app vlc"), Err(ParseError::Usage("app <id> on|off")));
        assert_eq!(
            parse_command("launch"),
            Err(ParseError::Unknown("launch".to_string()))
        );
    }

    #[test]
    fn test_render_status_mentions_state() {
        colored::control::set_override(false);
        let snapshot = EngineSnapshot {
            state: EngineState::Suppressed,
            paused_by_engine: true,
            latest_signal: PlaybackSignal::other(true),
            last_observation: None,
            situation: None,
            transition_count: 3,
            changed_at: chrono::Local::now(),
        };
        let text = render_status(&snapshot, Some("1 app playing: vlc"));
        assert!(text.contains("player paused"));
        assert!(text.contains("Paused by engine: yes"));
        assert!(text.contains("1 app playing: vlc"));
        assert!(text.contains("3 transitions"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_console_drives_engine() {
        let player = Arc::new(ConsolePlayer::new("Music"));
        let aggregate = Arc::new(AggregateDetector::new("console", ManagedIdentity::new(["music"])));
        let engine = EngineHandle::spawn(EngineSettings::default(), player.clone());
        engine.start().await;
        aggregate.start_monitoring(engine.signal_sink()).unwrap();

        let mut console = Console::new(engine.clone(), Some(aggregate.clone()), Some(player.clone()));
        assert!(console.apply(ConsoleCommand::UserPlay).await);
        assert!(
            console
                .apply(ConsoleCommand::App {
                    id: "vlc".to_string(),
                    active: true
                })
                .await
        );

        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(player.pause_count(), 1);
        assert_eq!(engine.current_state(), EngineState::Suppressed);

        assert!(console.apply(ConsoleCommand::PauseMonitoring).await);
        assert_eq!(engine.current_state(), EngineState::MonitoringPaused);
        assert!(!console.apply(ConsoleCommand::Quit).await);
    }
}

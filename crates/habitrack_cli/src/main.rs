//! Command-line front end for the habitrack record store.
//!
//! Each invocation signs in, applies one action through a client session and
//! flushes queued writes before exiting. Results are printed as JSON.

use anyhow::{bail, Context};
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use habitrack_core::client::{LocalRecordStore, Session};
use habitrack_core::db::open_db;
use habitrack_core::service::suggestion_service::{PayloadProvider, SuggestionError};
use habitrack_core::{AppConfig, ItemKind, Mood, SystemClock};
use log::{info, warn};
use serde_json::json;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command as Process, Stdio};

#[derive(Debug, Parser)]
#[command(name = "habitrack", version, about = "Track goals, habits, moods and badges")]
struct Cli {
    /// Optional TOML config file.
    #[arg(long, env = "HABITRACK_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long, short, env = "HABITRACK_USER")]
    user: Option<String>,

    #[arg(long, short, env = "HABITRACK_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Program that reads a suggestion prompt on stdin and prints a JSON
    /// array of suggestions.
    #[arg(long, env = "HABITRACK_SUGGEST_CMD")]
    suggest_cmd: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Kind {
    Goal,
    Habit,
}

impl From<Kind> for ItemKind {
    fn from(value: Kind) -> Self {
        match value {
            Kind::Goal => ItemKind::Goal,
            Kind::Habit => ItemKind::Habit,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create an account with the default document.
    Register,
    /// Print the signed-in user's document.
    Show,
    Add { kind: Kind, text: String },
    /// Complete an item; the completion is final once this command exits.
    Complete { kind: Kind, text: String },
    /// Remove an item without counting it.
    Delete { kind: Kind, text: String },
    Clear { kind: Kind },
    /// Record today's mood with a journal entry.
    Mood { mood: Mood, entry: String },
    Journal,
    /// Show (or save, when TEXT is given) the reflection of a date.
    Reflection {
        #[arg(long)]
        date: Option<NaiveDate>,
        text: Option<String>,
    },
    /// Add a daily reminder (`HH:MM`, UTC) for a goal.
    Remind { goal: String, time: String },
    Suggest,
    Badges,
    Leaderboard,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref()).context("failed to load config")?;
    if let Err(err) = habitrack_core::init_from_config(&config) {
        eprintln!("warning: file logging disabled: {err}");
    }

    let conn = open_db(&config.database_path).with_context(|| {
        format!("failed to open database {}", config.database_path.display())
    })?;
    let store = LocalRecordStore::new(conn, SystemClock)
        .with_leaderboard_limit(config.leaderboard_limit);
    let mut session = Session::new(store, SystemClock, config.session_options());
    if let Some(program) = cli.suggest_cmd.clone() {
        session = session.with_suggestion_provider(Box::new(PayloadProvider::new(
            move |prompt: &str| run_suggest_cmd(&program, prompt),
        )));
    }

    let output = run(&cli, &mut session)?;
    let report = session.run_until_idle();
    if report.failed > 0 {
        warn!("event=cli_flush module=cli status=error failed={}", report.failed);
        bail!("{} write(s) could not be saved", report.failed);
    }
    info!(
        "event=cli_command module=cli status=ok persisted={}",
        report.persisted
    );

    for event in session.take_events() {
        if let habitrack_core::SessionEvent::Achievement(notification) = event {
            eprintln!(
                "{} Badge unlocked: {}",
                notification.badge.emoji, notification.badge.label
            );
        }
    }
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

type CliSession = Session<LocalRecordStore<SystemClock>, SystemClock>;

fn run(cli: &Cli, session: &mut CliSession) -> anyhow::Result<serde_json::Value> {
    match &cli.command {
        Command::Register => {
            let (user, password) = credentials(cli)?;
            Ok(serde_json::to_value(session.register(user, password)?)?)
        }
        Command::Leaderboard => Ok(serde_json::to_value(session.leaderboard()?)?),
        command => {
            let (user, password) = credentials(cli)?;
            session.login(user, password)?;
            signed_in(session, command)
        }
    }
}

fn signed_in(session: &mut CliSession, command: &Command) -> anyhow::Result<serde_json::Value> {
    let value = match command {
        Command::Register | Command::Leaderboard => bail!("command does not need a session"),
        Command::Show => serde_json::to_value(session.current_user())?,
        Command::Add { kind, text } => {
            let id = session.add_item((*kind).into(), text)?;
            json!({ "id": id })
        }
        Command::Complete { kind, text } => {
            session.complete((*kind).into(), text)?;
            serde_json::to_value(session.current_user().map(|u| u.stats))?
        }
        Command::Delete { kind, text } => {
            json!({ "removed": session.delete_item((*kind).into(), text)? })
        }
        Command::Clear { kind } => {
            session.clear_items((*kind).into())?;
            json!({ "cleared": ItemKind::from(*kind).label() })
        }
        Command::Mood { mood, entry } => {
            let suggestions = session.submit_mood_and_journal(*mood, entry)?;
            json!({ "mood": mood, "suggestions": suggestions })
        }
        Command::Journal => serde_json::to_value(session.journal())?,
        Command::Reflection { date, text: Some(text) } => {
            serde_json::to_value(session.save_reflection(*date, text)?)?
        }
        Command::Reflection { date, text: None } => {
            let date = date.unwrap_or_else(|| chrono::Utc::now().date_naive());
            json!({ "date": date, "text": session.reflection_for(date)? })
        }
        Command::Remind { goal, time } => {
            let goal_id = session
                .current_user()
                .and_then(|u| u.goals.iter().find(|g| &g.text == goal))
                .map(|g| g.id)
                .with_context(|| format!("goal not found: {goal}"))?;
            session.set_reminder(goal_id, time)?;
            json!({ "goalId": goal_id, "time": time })
        }
        Command::Suggest => serde_json::to_value(session.local_suggestions()?)?,
        Command::Badges => serde_json::to_value(session.badges()?)?,
    };
    Ok(value)
}

fn credentials(cli: &Cli) -> anyhow::Result<(&str, &str)> {
    match (cli.user.as_deref(), cli.password.as_deref()) {
        (Some(user), Some(password)) => Ok((user, password)),
        _ => bail!("--user and --password (or HABITRACK_USER/HABITRACK_PASSWORD) are required"),
    }
}

fn run_suggest_cmd(program: &str, prompt: &str) -> Result<String, SuggestionError> {
    let failed = |err: std::io::Error| SuggestionError(format!("{program}: {err}"));
    let mut child = Process::new(program)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .map_err(failed)?;
    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(prompt.as_bytes()).map_err(failed)?;
    }
    let output = child.wait_with_output().map_err(failed)?;
    if !output.status.success() {
        return Err(SuggestionError(format!("{program} exited with {}", output.status)));
    }
    String::from_utf8(output.stdout)
        .map_err(|err| SuggestionError(format!("{program} printed invalid UTF-8: {err}")))
}

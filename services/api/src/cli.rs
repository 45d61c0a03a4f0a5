use crate::demo::{run_demo, DemoArgs};
use crate::infra::{parse_timestamp, render_json};
use crate::server;
use chrono::{DateTime, Duration, Utc};
use clap::{Args, Parser, Subcommand};
use rollcall::attendance::{score_arrival, AttendanceError, SessionWindow, SubmissionWindow};
use rollcall::config::PolicyConfig;
use rollcall::error::AppError;
use serde_json::json;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "Rollcall",
    about = "Score, aggregate, and serve rehearsal attendance from the command line",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Score one arrival against a session's start and end times
    Score(ScoreArgs),
    /// Evaluate the self-service submission window for a session
    Window(WindowArgs),
    /// Run a seeded walkthrough covering submissions, conflicts, and exemptions
    Demo(DemoArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// JSON file with the user roster to load at startup
    #[arg(long)]
    pub(crate) roster: Option<PathBuf>,
    /// Also load the demo roster
    #[arg(long)]
    pub(crate) demo_roster: bool,
}

#[derive(Args, Debug)]
pub(crate) struct ScoreArgs {
    /// Session start (RFC 3339)
    #[arg(long, value_parser = parse_timestamp)]
    pub(crate) start: DateTime<Utc>,
    /// Session end (RFC 3339)
    #[arg(long, value_parser = parse_timestamp)]
    pub(crate) end: DateTime<Utc>,
    /// Arrival time (RFC 3339)
    #[arg(long, value_parser = parse_timestamp)]
    pub(crate) arrival: DateTime<Utc>,
}

#[derive(Args, Debug)]
pub(crate) struct WindowArgs {
    /// Session start (RFC 3339)
    #[arg(long, value_parser = parse_timestamp)]
    pub(crate) session_start: DateTime<Utc>,
    /// Evaluation time (RFC 3339). Defaults to now.
    #[arg(long, value_parser = parse_timestamp)]
    pub(crate) now: Option<DateTime<Utc>>,
    /// Window length in hours. Defaults to ATTENDANCE_WINDOW_HOURS or 72.
    #[arg(long)]
    pub(crate) hours: Option<u32>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Score(args) => run_score(args),
        Command::Window(args) => run_window(args),
        Command::Demo(args) => run_demo(args),
    }
}

fn run_score(args: ScoreArgs) -> Result<(), AppError> {
    let window = SessionWindow::new(args.start, args.end).map_err(AttendanceError::from)?;
    let breakdown = score_arrival(args.arrival, &window);
    println!("{}", render_json(&breakdown)?);
    Ok(())
}

fn run_window(args: WindowArgs) -> Result<(), AppError> {
    let length = match args.hours {
        Some(hours) => Duration::hours(i64::from(hours)),
        None => policy_from_env().window_length(),
    };
    let window = SubmissionWindow::new(length);
    let now = args.now.unwrap_or_else(Utc::now);
    let status = window.status(args.session_start, now);

    let payload = json!({
        "session_start": args.session_start,
        "closes_at": window.closes_at(args.session_start),
        "now": now,
        "status": status,
        "is_open": status.is_open(),
        "minutes_remaining": status.minutes_remaining(),
    });
    println!("{}", render_json(&payload)?);
    Ok(())
}

/// Policy from the environment, falling back to defaults when the environment does not parse.
fn policy_from_env() -> PolicyConfig {
    rollcall::config::AppConfig::load()
        .map(|config| config.policy)
        .unwrap_or_default()
}

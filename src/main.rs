// src/main.rs

use std::io::stdout;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use color_eyre::eyre::Result;
use crossterm::{
    ExecutableCommand,
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::prelude::*;
use tracing::{error, info};

use stackguard_rs::config::Settings;
use stackguard_rs::core::jobs::ScanEngine;
use stackguard_rs::logging::{initialize_logging, read_log_tail};

mod app;
mod cli;
mod ui;

use app::{App, AppState};

const TICK_RATE: Duration = Duration::from_millis(100);
const POLL_RATE: Duration = Duration::from_millis(750);
const LOG_TAIL_LINES: usize = 200;

#[derive(Parser)]
#[command(name = "stackguard-rs", version, about = "Security scan orchestration for web targets")]
struct Cli {
    /// Path to a TOML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive terminal UI (default)
    Tui,
    /// Run a single scan, gate it on severity and print JSON
    Scan(cli::ScanArgs),
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    color_eyre::install()?;
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;

    match cli.command {
        Some(Commands::Scan(args)) => {
            initialize_logging(&settings.logging, true)?;
            cli::scan_command(args, &settings).await
        }
        Some(Commands::Tui) | None => {
            initialize_logging(&settings.logging, false)?;
            run_tui(&settings).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn run_tui(settings: &Settings) -> Result<()> {
    // --- Setup ---
    stdout().execute(EnterAlternateScreen)?;
    stdout().execute(EnableMouseCapture)?;
    enable_raw_mode()?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;
    terminal.clear()?;

    let result = event_loop(&mut terminal, settings).await;

    // --- Restore Terminal ---
    stdout().execute(LeaveAlternateScreen)?;
    stdout().execute(DisableMouseCapture)?;
    disable_raw_mode()?;
    result
}

async fn event_loop<B: Backend>(terminal: &mut Terminal<B>, settings: &Settings) -> Result<()> {
    let engine = ScanEngine::local(settings);
    let mut app = App::new();
    let mut last_poll = Instant::now();
    info!("Interactive session started.");

    while !app.should_quit {
        terminal.draw(|frame| ui::render(&mut app, frame))?;

        if event::poll(TICK_RATE)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    handle_key(&mut app, &engine, key).await;
                }
            }
        }

        if matches!(app.state, AppState::Scanning) && last_poll.elapsed() >= POLL_RATE {
            last_poll = Instant::now();
            poll_active_job(&mut app, &engine).await;
        }

        app.on_tick();
        if app.show_logs {
            app.log_content = read_log_tail(LOG_TAIL_LINES);
        }
    }

    info!("Interactive session ended.");
    Ok(())
}

async fn poll_active_job(app: &mut App, engine: &ScanEngine) {
    let Some(job_id) = app.active_job.as_ref().map(|job| job.job_id.clone()) else {
        return;
    };
    match engine.tracker.status(&job_id).await {
        Ok(view) => app.apply_job_view(view),
        Err(err) => {
            error!(job_id = %job_id, error = %err, "Status query failed.");
            app.fail_scan(err.to_string());
        }
    }
}

async fn handle_key(app: &mut App, engine: &ScanEngine, key: KeyEvent) {
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.quit();
        return;
    }

    match app.state {
        AppState::Disclaimer => match key.code {
            KeyCode::Enter => app.state = AppState::Idle,
            KeyCode::Esc | KeyCode::Char('q') => app.quit(),
            _ => {}
        },
        AppState::Idle => handle_idle_input(app, engine, key.code).await,
        AppState::Scanning => match key.code {
            KeyCode::Esc => app.quit(),
            KeyCode::Char('l') => app.show_logs = !app.show_logs,
            _ => {}
        },
        AppState::Finished => handle_finished_input(app, key.code),
    }
}

/// Typed characters go to the input box, so quitting from here is Esc only.
async fn handle_idle_input(app: &mut App, engine: &ScanEngine, key_code: KeyCode) {
    match key_code {
        KeyCode::Esc => app.quit(),
        KeyCode::Tab => app.cycle_scan_kind(),
        KeyCode::BackTab => app.cycle_fail_on(),
        KeyCode::Char(c) => {
            app.status_message = None;
            app.input.push(c);
        }
        KeyCode::Backspace => {
            app.status_message = None;
            app.input.pop();
        }
        KeyCode::Enter => {
            let Some(submission) = app.submission() else {
                app.status_message = Some("Enter a target URL first.".to_string());
                return;
            };
            match engine.dispatcher.submit(submission.clone()).await {
                Ok(handle) => app.start_job(handle.job_id, &submission),
                Err(err) => app.status_message = Some(err.to_string()),
            }
        }
        _ => {}
    }
}

fn handle_finished_input(app: &mut App, key_code: KeyCode) {
    match key_code {
        KeyCode::Char('q') | KeyCode::Esc => app.quit(),
        KeyCode::Char('n') => app.reset(),
        KeyCode::Char('l') => app.show_logs = !app.show_logs,
        KeyCode::Up => app.select_previous(),
        KeyCode::Down => app.select_next(),
        KeyCode::Left => app.scroll_logs_left(),
        KeyCode::Right => app.scroll_logs_right(),
        _ => {}
    }
}

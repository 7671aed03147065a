use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wordchain::{
    config::Config,
    referee::{Referee, RefereeResult},
    state::AppState,
    text::Phrase,
};

/// One line of console input
enum Command<'a> {
    Start,
    Hint,
    Pause,
    Resume,
    Concede,
    Status,
    Add(&'a str),
    Remove(&'a str),
    Submit { user: &'a str, phrase: &'a str },
}

fn parse_command(line: &str) -> Option<Command<'_>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let (head, rest) = line
        .split_once(char::is_whitespace)
        .map(|(h, r)| (h, r.trim()))
        .unwrap_or((line, ""));
    match head {
        "/start" => Some(Command::Start),
        "/hint" => Some(Command::Hint),
        "/pause" => Some(Command::Pause),
        "/resume" => Some(Command::Resume),
        "/concede" => Some(Command::Concede),
        "/status" => Some(Command::Status),
        "/add" => Some(Command::Add(rest)),
        "/remove" => Some(Command::Remove(rest)),
        _ if head.starts_with('/') => None,
        user => Some(Command::Submit { user, phrase: rest }),
    }
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string(value) {
        Ok(json) => println!("{}", json),
        Err(e) => tracing::error!("Failed to serialize output: {}", e),
    }
}

async fn run_command(
    state: &AppState,
    referee: &Referee,
    command: Command<'_>,
) -> RefereeResult<()> {
    match command {
        Command::Start => print_json(&referee.start_round_random().await?),
        Command::Hint => print_json(&referee.hint().await?),
        Command::Pause => {
            referee.pause().await?;
            print_json(&referee.status().await?);
        }
        Command::Resume => {
            referee.resume().await?;
            print_json(&referee.status().await?);
        }
        Command::Concede => print_json(&referee.concede().await?),
        Command::Status => print_json(&referee.snapshot().await?),
        Command::Add(raw) => {
            let added: Option<Phrase> = state.add_phrase(raw).await?;
            print_json(&added);
        }
        Command::Remove(raw) => {
            let removed: Option<Phrase> = state.remove_phrase(raw).await?;
            print_json(&removed);
        }
        Command::Submit { user, phrase } => {
            let outcome = referee.submit(user, phrase).await?;
            print_json(&outcome);
            if outcome.ended() {
                print_json(&referee.start_round_random().await?);
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    // Load .env file if present (before any env var reads)
    if let Err(e) = dotenvy::dotenv() {
        // Not an error if .env doesn't exist, only log if it's a different issue
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    // Logs go to stderr so stdout carries only JSON results
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wordchain=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!("Starting wordchain referee...");

    let config = Config::from_env();
    let state = AppState::in_memory(config.referee.clone());

    match state
        .bootstrap_file(&config.dictionary_path, &config.bootstrap)
        .await
    {
        Ok(report) => tracing::info!(
            path = %config.dictionary_path.display(),
            loaded = report.loaded,
            "Dictionary ready"
        ),
        Err(e) => {
            tracing::error!("Failed to load dictionary: {}", e);
            std::process::exit(1);
        }
    }

    let game_id = config
        .game_id
        .clone()
        .unwrap_or_else(|| ulid::Ulid::new().to_string());
    let referee = state.referee(&game_id).await;
    tracing::info!(game_id = %game_id, "Game ready, reading `<user> <phrase>` lines from stdin");

    if let Err(e) = run_command(&state, &referee, Command::Start).await {
        tracing::error!("Failed to start round: {}", e);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::error!("Failed to read stdin: {}", e);
                break;
            }
        };
        let Some(command) = parse_command(&line) else {
            tracing::warn!(line = %line.trim(), "Unrecognized input");
            continue;
        };
        if let Err(e) = run_command(&state, &referee, command).await {
            tracing::error!(retryable = e.is_retryable(), "Command failed: {}", e);
        }
    }

    tracing::info!("Input closed, shutting down");
}

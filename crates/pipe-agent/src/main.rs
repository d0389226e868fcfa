//! A terminal chat client built on `pipe-agent`.
//!
//! Everything is configured through environment variables, see
//! [`pipe_agent::config`]. Press Ctrl-C to cancel a running turn, or at the
//! prompt to quit.

#[macro_use]
extern crate tracing;

use std::io::Write as _;
use std::pin::pin;
use std::process::ExitCode;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use pipe_agent::config::Config;
use pipe_agent::core::AgentEvent;
use pipe_agent::{Session, SessionBuilder};
use pipe_agent_openai_model::OpenAIProvider;
use tokio::io::{self, AsyncBufReadExt, BufReader, Stdin};
use tokio::select;
use tokio::signal::ctrl_c;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::interval;

const BAR_CHAR: &str = "▎";

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };
    debug!("starting with {config:?}");
    println!(
        "{}Chatting with {}. Ctrl-C cancels a turn, Ctrl-D quits.",
        BAR_CHAR.bright_cyan(),
        config.openai.model().bold()
    );

    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let session = build_session(config, event_tx);

    let mut stdin = BufReader::new(io::stdin());
    loop {
        print!("> ");
        std::io::stdout().flush().ok();

        let line = select! {
            line = read_line(&mut stdin) => line,
            _ = ctrl_c() => None,
        };
        let Some(line) = line else {
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        run_turn(&session, input, &mut event_rx).await;
    }
    ExitCode::SUCCESS
}

fn build_session(config: Config, event_tx: UnboundedSender<AgentEvent>) -> Session {
    let Config {
        openai,
        service,
        max_turns,
        tool_timeout,
        eval,
    } = config;

    let mut builder = SessionBuilder::with_model_provider(OpenAIProvider::new(openai))
        .with_eval_capability(eval)
        .on_event(move |event| {
            event_tx.send(event).ok();
        });
    if let Some(service) = service {
        builder = builder.with_service(service);
    }
    if let Some(max_turns) = max_turns {
        builder = builder.with_max_turns(max_turns);
    }
    if let Some(tool_timeout) = tool_timeout {
        builder = builder.with_tool_timeout(tool_timeout);
    }
    builder.build()
}

/// Runs one turn, printing its events as they arrive. The input stays
/// blocked until the turn is over.
async fn run_turn(
    session: &Session,
    input: &str,
    event_rx: &mut UnboundedReceiver<AgentEvent>,
) {
    let mut turn = pin!(session.send_message(input));
    let mut ticker = interval(Duration::from_millis(100));
    let mut progress_bar: Option<ProgressBar> = None;

    let result = loop {
        select! {
            result = &mut turn => break result,
            Some(event) = event_rx.recv() => {
                // Finish the progress bar before printing anything else.
                if let Some(progress_bar) = progress_bar.take() {
                    progress_bar.finish_and_clear();
                }
                print_event(event);
            }
            _ = ctrl_c() => session.cancel_turn(),
            _ = ticker.tick() => {
                progress_bar.get_or_insert_with(new_progress_bar).inc(1);
            }
        }
    };

    if let Some(progress_bar) = progress_bar.take() {
        progress_bar.finish_and_clear();
    }
    while let Ok(event) = event_rx.try_recv() {
        print_event(event);
    }
    if let Ok(outcome) = result {
        debug!("turn finished after {} requests", outcome.requests);
    }
    println!();
}

fn print_event(event: AgentEvent) {
    match event {
        AgentEvent::UserMessageAdded { .. } => {}
        AgentEvent::AssistantMessageAdded { content } => {
            println!("{}🤖 {}", BAR_CHAR.bright_cyan(), content.bright_white());
        }
        AgentEvent::ToolCallStarted {
            name, arguments, ..
        } => {
            println!(
                "{}▶️  Calling {}({arguments})",
                BAR_CHAR.bright_yellow(),
                name.bold()
            );
        }
        AgentEvent::ToolCallCompleted { name, result, .. } => match result {
            Ok(output) => {
                let bar = BAR_CHAR.bright_green();
                println!("{bar}✅ Result from {}:", name.bold());
                for line in output.lines() {
                    println!("{bar}{}", line.dimmed());
                }
            }
            Err(err) => {
                println!("{}❌ {} failed: {err}", BAR_CHAR.bright_red(), name.bold());
            }
        },
        AgentEvent::TurnAborted { reason } => {
            println!("{}⚠️  {}", BAR_CHAR.bright_red(), reason.red());
        }
    }
}

fn new_progress_bar() -> ProgressBar {
    let style = ProgressStyle::with_template("{spinner} {wide_msg}")
        .map(|style| style.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"))
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    let progress_bar = ProgressBar::new_spinner();
    progress_bar.set_style(style);
    progress_bar.set_message("🤔 Thinking...");
    progress_bar
}

async fn read_line(stdin: &mut BufReader<Stdin>) -> Option<String> {
    let mut line = String::new();
    match stdin.read_line(&mut line).await {
        Ok(0) => None,
        Ok(_) => Some(line),
        Err(err) => {
            error!("error reading input: {err}");
            None
        }
    }
}

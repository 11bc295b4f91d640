//! Chat command - interactive session on stdin/stdout.

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use dwight_engine::{ChatEngine, EngineConfig, Role, StateKind, Update};
use indicatif::{ProgressBar, ProgressStyle};
use miette::{miette, IntoDiagnostic};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

use super::profile_index;

const HELP: &str = "\
Commands:
  /save             save the conversation
  /new              start a new conversation
  /trim             drop old messages that no longer fit the context window
  /attach PATH      inject a file into the system prompt
  /detach PATH      stop injecting a file
  /profile [next|prev|N]
                    show or switch the model profile
  /retry            retry after an error
  /usage            show context window usage
  /quit             save and leave";

/// A line typed at the prompt.
#[derive(Debug, PartialEq, Eq)]
enum Input<'a> {
    Empty,
    Message(&'a str),
    Command(Command<'a>),
}

#[derive(Debug, PartialEq, Eq)]
enum Command<'a> {
    Save,
    New,
    Trim,
    Attach(&'a str),
    Detach(&'a str),
    Profile(ProfileArg),
    Retry,
    Usage,
    Help,
    Quit,
    Unknown(&'a str),
}

#[derive(Debug, PartialEq, Eq)]
enum ProfileArg {
    Show,
    Next,
    Previous,
    Number(usize),
}

fn parse_input(line: &str) -> Input<'_> {
    let line = line.trim();
    if line.is_empty() {
        return Input::Empty;
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Input::Message(line);
    };

    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };

    let command = match (name, arg) {
        ("save", _) => Command::Save,
        ("new", _) => Command::New,
        ("trim", _) => Command::Trim,
        ("attach", path) if !path.is_empty() => Command::Attach(path),
        ("detach", path) if !path.is_empty() => Command::Detach(path),
        ("profile", "") => Command::Profile(ProfileArg::Show),
        ("profile", "next") => Command::Profile(ProfileArg::Next),
        ("profile", "prev") => Command::Profile(ProfileArg::Previous),
        ("profile", n) => match n.parse() {
            Ok(number) => Command::Profile(ProfileArg::Number(number)),
            Err(_) => Command::Unknown(line),
        },
        ("retry", _) => Command::Retry,
        ("usage", _) => Command::Usage,
        ("help", _) => Command::Help,
        ("quit" | "exit", _) => Command::Quit,
        _ => Command::Unknown(line),
    };
    Input::Command(command)
}

enum Flow {
    Continue,
    Quit,
}

pub(crate) async fn run(config: &EngineConfig, profile: Option<usize>, resume: Option<&str>) -> miette::Result<()> {
    let mut engine =
        ChatEngine::from_config(config).map_err(|e| miette!("Failed to start chat engine: {}", e))?;

    if let Some(number) = profile {
        engine
            .select_profile(profile_index(number)?)
            .map_err(|e| miette!("Cannot select profile {}: {}", number, e))?;
    }
    if let Some(id) = resume {
        engine
            .load(id)
            .map_err(|e| miette!("Cannot resume '{}': {}", id, e))?;
        println!(
            "Resumed conversation {} ({} messages)",
            id,
            engine.session().messages().len()
        );
    }

    let profile = engine.session().profile();
    println!("Profile: {} ({})", profile.name, profile.model);
    println!("Type /help for commands.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    engine.open().map_err(|e| miette!("{}", e))?;
    wait(&mut engine).await;

    loop {
        match engine.session().kind() {
            StateKind::ModelNotAvailable => {
                if !offer_pull(&mut engine, &mut lines).await? {
                    println!("Chat closed.");
                    return Ok(());
                }
                continue;
            }
            StateKind::Error => {
                let message = engine.session().last_error().unwrap_or("unknown error");
                println!("Error: {}", message);
                println!("Type /retry to try again or /quit to leave.");
            }
            _ => {}
        }

        print!("{}> ", engine.settings().user_name);
        std::io::stdout().flush().into_diagnostic()?;

        let Some(line) = lines.next_line().await.into_diagnostic()? else {
            println!();
            break;
        };

        let flow = match parse_input(&line) {
            Input::Empty => Flow::Continue,
            Input::Message(text) => {
                send(&mut engine, text).await;
                Flow::Continue
            }
            Input::Command(command) => handle_command(&mut engine, command).await,
        };

        if let Flow::Quit = flow {
            break;
        }
    }

    if !engine.session().messages().is_empty() {
        match engine.save() {
            Ok(id) => println!("Saved conversation {}", id),
            Err(e) => eprintln!("Failed to save conversation: {}", e),
        }
    }
    Ok(())
}

/// Ask whether to pull the missing model. Returns false if the user declined.
async fn offer_pull(engine: &mut ChatEngine, lines: &mut Lines<BufReader<Stdin>>) -> miette::Result<bool> {
    let model = engine.session().pending_model().unwrap_or_default().to_string();
    print!("Model '{}' is not installed. Pull it now? [y/N] ", model);
    std::io::stdout().flush().into_diagnostic()?;

    let answer = lines.next_line().await.into_diagnostic()?.unwrap_or_default();
    if matches!(answer.trim().to_lowercase().as_str(), "y" | "yes") {
        engine.confirm_pull().map_err(|e| miette!("{}", e))?;
        wait(engine).await;
        Ok(true)
    } else {
        engine.decline_pull().map_err(|e| miette!("{}", e))?;
        Ok(false)
    }
}

fn spinner(message: String) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

/// Drain engine events until nothing is in flight, echoing streamed text.
async fn wait(engine: &mut ChatEngine) {
    let pb = match engine.session().kind() {
        StateKind::CheckingModel => Some(spinner(format!(
            "Checking {}...",
            engine.session().pending_model().unwrap_or_default()
        ))),
        StateKind::PullingModel => Some(spinner(format!(
            "Pulling {} (this can take several minutes)...",
            engine.session().pending_model().unwrap_or_default()
        ))),
        StateKind::Sending => Some(spinner("Thinking...".to_string())),
        _ => None,
    };

    let mut streamed = false;
    engine
        .run_until_idle(|update| {
            if let Update::Delta(text) = update {
                if !streamed {
                    streamed = true;
                    print!("assistant> ");
                }
                print!("{}", text);
                let _ = std::io::stdout().flush();
            }
        })
        .await;

    if let Some(pb) = pb {
        pb.finish_and_clear();
    }
    if streamed {
        println!();
    }
}

async fn send(engine: &mut ChatEngine, text: &str) {
    if let Err(e) = engine.submit(text) {
        println!("{}", e);
        return;
    }
    let streaming = engine.is_streaming();
    wait(engine).await;

    if engine.session().kind() != StateKind::Ready {
        return;
    }
    if let Some(reply) = engine.session().messages().last().filter(|m| m.role == Role::Assistant) {
        if !streaming {
            println!("assistant> {}", reply.content);
        }
        println!(
            "({:.1}s, {} tokens)",
            reply.duration.as_secs_f64(),
            reply.response_tokens()
        );
        println!();
    }
}

async fn handle_command(engine: &mut ChatEngine, command: Command<'_>) -> Flow {
    match command {
        Command::Save => match engine.save() {
            Ok(id) => println!("Saved conversation {}", id),
            Err(e) => println!("Save failed: {}", e),
        },
        Command::New => match engine.new_conversation() {
            Ok(()) => println!("Started a new conversation."),
            Err(e) => println!("{}", e),
        },
        Command::Trim => match engine.trim_history() {
            Ok(0) => println!("History already fits the context window."),
            Ok(dropped) => println!("Dropped {} old messages.", dropped),
            Err(e) => println!("{}", e),
        },
        Command::Attach(path) => {
            let path = Path::new(path);
            if !path.is_file() {
                println!("Not a file: {}", path.display());
            } else if engine.attach(path) {
                println!("Attached {}", path.display());
            } else {
                println!("Already attached: {}", path.display());
            }
        }
        Command::Detach(path) => {
            if engine.detach(Path::new(path)) {
                println!("Detached {}", path);
            } else {
                println!("Not attached: {}", path);
            }
        }
        Command::Profile(arg) => {
            let result = match arg {
                ProfileArg::Show => {
                    let profiles = engine.session().profiles();
                    for (i, p) in profiles.profiles().iter().enumerate() {
                        let marker = if i == profiles.current_index() { '*' } else { ' ' };
                        println!("{} {}. {} ({})", marker, i + 1, p.name, p.model);
                    }
                    return Flow::Continue;
                }
                ProfileArg::Next => engine.next_profile().cloned(),
                ProfileArg::Previous => engine.previous_profile().cloned(),
                ProfileArg::Number(n) => match profile_index(n) {
                    Ok(index) => engine.switch_profile(index).cloned(),
                    Err(e) => {
                        println!("{}", e);
                        return Flow::Continue;
                    }
                },
            };
            match result {
                Ok(profile) => println!("Now using {} ({})", profile.name, profile.model),
                Err(e) => println!("{}", e),
            }
        }
        Command::Retry => match engine.retry() {
            Ok(()) => wait(engine).await,
            Err(e) => println!("{}", e),
        },
        Command::Usage => {
            let usage = engine.context_usage();
            println!(
                "Context: ~{} of {} tokens ({}%), {} messages",
                usage.used,
                usage.window,
                usage.percent,
                engine.session().messages().len()
            );
            let attachments = engine.session().attachments();
            if !attachments.is_empty() {
                println!("Attached:");
                for path in attachments {
                    println!("  {}", path.display());
                }
            }
        }
        Command::Help => println!("{}", HELP),
        Command::Quit => return Flow::Quit,
        Command::Unknown(line) => println!("Unknown command: {} (try /help)", line),
    }
    Flow::Continue
}

// Interactive terminal interview. Same controller as the web UI, one session,
// driven from stdin.

use anyhow::{Context, Result};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use tracing::info;

use crate::controller::{InterviewController, Phase};
use crate::session::Session;

const HELP: &str = "Commands: /image <path>  /status  /reset  /quit";

/// A line typed at the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    Message(String),
    Image(Option<PathBuf>),
    Status,
    Reset,
    Help,
    Quit,
    Empty,
}

pub fn parse_command(line: &str) -> ChatCommand {
    let line = line.trim();
    if line.is_empty() {
        return ChatCommand::Empty;
    }
    let Some(rest) = line.strip_prefix('/') else {
        return ChatCommand::Message(line.to_string());
    };
    let (name, arg) = rest
        .split_once(char::is_whitespace)
        .map(|(n, a)| (n, a.trim()))
        .unwrap_or((rest, ""));
    match name {
        "image" if arg.is_empty() => ChatCommand::Image(None),
        "image" => ChatCommand::Image(Some(PathBuf::from(arg))),
        "status" => ChatCommand::Status,
        "reset" => ChatCommand::Reset,
        "quit" | "exit" => ChatCommand::Quit,
        "help" => ChatCommand::Help,
        _ => ChatCommand::Message(line.to_string()),
    }
}

/// Runs the interview on stdin/stdout until `/quit` or end of input.
/// Returns the session as it stood at exit.
pub async fn run_interview_chat(
    controller: &InterviewController,
    image: Option<PathBuf>,
) -> Result<Session> {
    info!("Starting interview chat...");
    let mut session = Session::new();
    session.set_image(image);

    println!("JHONNY: Senior Creative Director. Say hi to start. {}", HELP);

    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("you> ");
        std::io::stdout().flush().context("Failed to flush stdout")?;

        let Some(line) = lines.next() else {
            break;
        };
        let line = line.context("Failed to read from stdin")?;

        match parse_command(&line) {
            ChatCommand::Empty => continue,
            ChatCommand::Quit => break,
            ChatCommand::Help => println!("{}", HELP),
            ChatCommand::Reset => {
                session.reset();
                println!("(conversation reset)");
            }
            ChatCommand::Image(path) => {
                match &path {
                    Some(p) => println!("(reference image set to {})", p.display()),
                    None => println!("(reference image cleared)"),
                }
                session.set_image(path);
            }
            ChatCommand::Status => {
                let snapshot = session.snapshot();
                println!("Phase: {} ({})", snapshot.current, snapshot.status);
                println!(
                    "{}",
                    serde_json::to_string_pretty(&snapshot.selections)
                        .context("Failed to render selections")?
                );
            }
            ChatCommand::Message(text) => {
                let outcome = session.submit(controller, &text).await;
                println!("\njhonny> {}\n", outcome.reply);
                if outcome.phase == Phase::Deliver {
                    println!("(brief complete; /reset to start a new one)");
                }
            }
        }
    }

    info!("Chat session finished.");
    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_message() {
        assert_eq!(
            parse_command("  A 30s ad for sneakers "),
            ChatCommand::Message("A 30s ad for sneakers".to_string())
        );
        assert_eq!(parse_command("   "), ChatCommand::Empty);
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse_command("/status"), ChatCommand::Status);
        assert_eq!(parse_command("/reset"), ChatCommand::Reset);
        assert_eq!(parse_command("/exit"), ChatCommand::Quit);
        assert_eq!(
            parse_command("/image  refs/car.jpg"),
            ChatCommand::Image(Some(PathBuf::from("refs/car.jpg")))
        );
        assert_eq!(parse_command("/image"), ChatCommand::Image(None));
    }

    #[test]
    fn test_unknown_slash_is_a_message() {
        assert_eq!(
            parse_command("/shrug whatever"),
            ChatCommand::Message("/shrug whatever".to_string())
        );
    }
}

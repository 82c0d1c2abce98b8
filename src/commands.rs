//! Chat command parsing.
//!
//! Turns a line of user text into a [`Command`]. Anything that is not a
//! recognised slash command becomes a chat request, which the scheduler
//! treats as a lightweight job.

use crate::queue::Lane;

/// A parsed user command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run a generation workflow.
    Generate {
        workflow: String,
        prompt: String,
        /// Caller asked to skip the queue (`!` prefix).
        urgent: bool,
    },
    /// Conversational text.
    Chat { content: String, urgent: bool },
    /// Show both lanes.
    Status,
    /// Clear one lane, or both when `lane` is `None`.
    Clear { lane: Option<Lane> },
    /// Stop tracking in-flight jobs.
    Forget,
    Help,
    Quit,
    /// A recognised command with bad arguments.
    Invalid { reason: String },
}

/// Parses user input into commands.
pub struct CommandParser;

impl CommandParser {
    pub fn parse(content: &str) -> Command {
        let trimmed = content.trim();
        let (urgent, body) = match trimmed.strip_prefix('!') {
            Some(rest) => (true, rest.trim_start()),
            None => (false, trimmed),
        };
        let lower = body.to_lowercase();

        match lower.as_str() {
            "/status" | "/queue" => Command::Status,
            "/forget" => Command::Forget,
            "/help" | "/?" => Command::Help,
            "/quit" | "/exit" => Command::Quit,
            _ => parse_clear(&lower)
                .or_else(|| parse_generate(body, &lower, urgent))
                .unwrap_or_else(|| Command::Chat {
                    content: body.to_string(),
                    urgent,
                }),
        }
    }
}

/// `/clear [high|low|all]`
fn parse_clear(lower: &str) -> Option<Command> {
    let rest = lower.strip_prefix("/clear")?;
    if !rest.is_empty() && !rest.starts_with(' ') {
        return None;
    }
    let arg = rest.trim();
    let command = match arg {
        "" | "all" => Command::Clear { lane: None },
        other => match other.parse::<Lane>() {
            Ok(lane) => Command::Clear { lane: Some(lane) },
            Err(reason) => Command::Invalid { reason },
        },
    };
    Some(command)
}

/// `/gen <workflow> [prompt...]`
fn parse_generate(body: &str, lower: &str, urgent: bool) -> Option<Command> {
    if !(lower == "/gen" || lower.starts_with("/gen ")) {
        return None;
    }
    let mut parts = body["/gen".len()..].trim().splitn(2, char::is_whitespace);
    let workflow = parts.next().unwrap_or_default().trim();
    if workflow.is_empty() {
        return Some(Command::Invalid {
            reason: "usage: /gen <workflow> [prompt]".to_string(),
        });
    }
    let prompt = parts.next().unwrap_or_default().trim();
    Some(Command::Generate {
        workflow: workflow.to_string(),
        prompt: prompt.to_string(),
        urgent,
    })
}

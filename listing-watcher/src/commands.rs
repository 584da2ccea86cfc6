use crate::controller::PollController;
use crate::types::WatcherError;
use std::str::FromStr;

pub const HELP_TEXT: &str = "Welcome! Use the commands to control the parser:\n\
/status - Show parser status\n\
/start_parsing - Start the parser\n\
/stop_parsing - Stop the parser\n\
/set_interval <milliseconds> - Set parsing interval\n\
/statistics - Show parsing statistics";

/// A control request, in the chat-command syntax operators already use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Hello,
    Status,
    Start,
    Stop,
    SetInterval(u64),
    Statistics,
}

impl FromStr for Command {
    type Err = WatcherError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let mut parts = input.split_whitespace();
        let head = parts.next().unwrap_or_default();
        // Group chats address commands as `/status@some_bot`.
        let name = head.split('@').next().unwrap_or(head);

        match name {
            "/hello" | "/help" => Ok(Command::Hello),
            "/status" => Ok(Command::Status),
            "/start_parsing" => Ok(Command::Start),
            "/stop_parsing" => Ok(Command::Stop),
            "/statistics" => Ok(Command::Statistics),
            "/set_interval" => {
                let raw = parts.next().ok_or_else(|| {
                    WatcherError::InvalidCommand("Usage: /set_interval <milliseconds>".to_string())
                })?;
                let interval_ms = raw.parse::<u64>().map_err(|_| {
                    WatcherError::InvalidCommand(format!(
                        "Interval must be a positive number of milliseconds, got {}",
                        raw
                    ))
                })?;
                Ok(Command::SetInterval(interval_ms))
            }
            "" => Err(WatcherError::InvalidCommand("Empty command".to_string())),
            other => Err(WatcherError::InvalidCommand(format!("Unknown command {}", other))),
        }
    }
}

/// Executes `command` and returns the reply for the operator.
pub async fn dispatch(controller: &PollController, command: Command) -> String {
    match command {
        Command::Hello => HELP_TEXT.to_string(),
        Command::Status => format!("Parser status: {}", controller.status().await),
        Command::Start => controller.start().await,
        Command::Stop => controller.stop().await,
        Command::SetInterval(interval_ms) => match controller.set_interval(interval_ms).await {
            Ok(reply) => reply,
            Err(e) => e.to_string(),
        },
        Command::Statistics => controller.statistics().await.to_string(),
    }
}

/// Parses and executes one line of operator input.
pub async fn handle_line(controller: &PollController, line: &str) -> String {
    match line.parse::<Command>() {
        Ok(command) => dispatch(controller, command).await,
        Err(e) => format!("{}\n\n{}", e, HELP_TEXT),
    }
}

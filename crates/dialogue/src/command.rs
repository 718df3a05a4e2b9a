//! In-chat admin commands.
//!
//! A message whose first token is `{name}-cmd` (matched in any case) is a
//! command rather than conversation. Flags combine in one message and are
//! applied in a fixed order: reset, then gaslight, then history.

/// Flags extracted from a command message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandRequest {
    /// `-r` / `--reset`: persist and forget the conversation.
    pub reset: bool,
    /// `-g` / `--gaslight`: replacement text for the bot's last message.
    pub gaslight: Option<String>,
    /// `-t` / `--history`: show the full log.
    pub history: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParsedCommand {
    Run(CommandRequest),
    ShowHelp,
}

/// The token that marks a message as a command for `bot_name`.
pub fn command_prefix(bot_name: &str) -> String {
    format!("{}-cmd", bot_name.to_lowercase())
}

/// Parses `text` as a command for `bot_name`. Returns `None` when the
/// message is ordinary conversation, `ShowHelp` on a bare prefix, a flag
/// error, or an explicit `-h`.
pub fn parse_command(bot_name: &str, text: &str) -> Option<ParsedCommand> {
    let prefix = command_prefix(bot_name);
    let mut tokens = text.split_whitespace().peekable();
    match tokens.next() {
        Some(first) if first.to_lowercase() == prefix => {}
        _ => return None,
    }

    let mut request = CommandRequest::default();
    while let Some(token) = tokens.next() {
        match token {
            "-r" | "--reset" => request.reset = true,
            "-t" | "--history" => request.history = true,
            "-g" | "--gaslight" => {
                let mut words = Vec::new();
                while let Some(next) = tokens.peek() {
                    if next.starts_with('-') {
                        break;
                    }
                    words.push(*next);
                    tokens.next();
                }
                if words.is_empty() {
                    return Some(ParsedCommand::ShowHelp);
                }
                request.gaslight = Some(words.join(" "));
            }
            _ => return Some(ParsedCommand::ShowHelp),
        }
    }

    if request == CommandRequest::default() {
        return Some(ParsedCommand::ShowHelp);
    }
    Some(ParsedCommand::Run(request))
}

/// Usage text shown for `ShowHelp`.
pub fn usage(bot_name: &str) -> String {
    let prefix = command_prefix(bot_name);
    format!(
        "Usage: {prefix} [-r] [-g WORD [WORD ...]] [-t]\n\
         \n\
         -r, --reset     forget everything said so far\n\
         -g, --gaslight  rewrite the bot's last message\n\
         -t, --history   show the conversation log"
    )
}

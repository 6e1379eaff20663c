//! Parsing of bot commands and inline keyboard payloads.

/// Prefix of `/start` payloads that link a buyer chat.
pub const BUYER_START_PREFIX: &str = "buyer_";
/// Callback prefix for organizer toggles.
pub const TOGGLE_ORG_PREFIX: &str = "toggle_org_";
/// Callback prefix for buyer toggles.
pub const TOGGLE_BUYER_PREFIX: &str = "toggle_buyer_";

/// A recognised bot command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// `/start [payload]`
    Start(Option<String>),
    /// `/vincular <code>`
    Link(Option<String>),
    /// `/config`
    Config,
    /// `/preferencias`
    Preferences,
    /// `/ventas`
    Sales,
    /// `/sorteos`
    Raffles,
    /// `/desvincular`
    Unlink,
    /// `/ayuda` or `/help`
    Help,
    /// Any other slash command (name without `/`)
    Unknown(String),
}

impl Command {
    /// Metric label
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Start(_) => "start",
            Self::Link(_) => "vincular",
            Self::Config => "config",
            Self::Preferences => "preferencias",
            Self::Sales => "ventas",
            Self::Raffles => "sorteos",
            Self::Unlink => "desvincular",
            Self::Help => "ayuda",
            Self::Unknown(_) => "unknown",
        }
    }
}

/// Parse a message text. Returns `None` for text that is not a command.
///
/// A `@BotName` suffix on the command is ignored, so `/ventas@MiRifaBot`
/// parses like `/ventas`.
#[must_use]
pub fn parse_command(text: &str) -> Option<Command> {
    let text = text.trim();
    let rest = text.strip_prefix('/')?;
    let mut parts = rest.splitn(2, char::is_whitespace);
    let head = parts.next().unwrap_or_default();
    let name = head.split('@').next().unwrap_or_default().to_lowercase();
    let argument = parts
        .next()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string);

    let command = match name.as_str() {
        "start" => Command::Start(argument),
        "vincular" | "link" => Command::Link(argument),
        "config" => Command::Config,
        "preferencias" => Command::Preferences,
        "ventas" => Command::Sales,
        "sorteos" => Command::Raffles,
        "desvincular" => Command::Unlink,
        "ayuda" | "help" => Command::Help,
        "" => return None,
        _ => Command::Unknown(name),
    };
    Some(command)
}

/// Normalise a link code as typed by a user.
#[must_use]
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// A recognised inline keyboard payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CallbackAction {
    /// Flip an organizer preference
    ToggleOrg(String),
    /// Flip a buyer preference
    ToggleBuyer(String),
    /// Anything else
    Unknown,
}

/// Parse `CallbackQuery::data`.
#[must_use]
pub fn parse_callback(data: &str) -> CallbackAction {
    if let Some(field) = data.strip_prefix(TOGGLE_ORG_PREFIX) {
        CallbackAction::ToggleOrg(field.to_string())
    } else if let Some(field) = data.strip_prefix(TOGGLE_BUYER_PREFIX) {
        CallbackAction::ToggleBuyer(field.to_string())
    } else {
        CallbackAction::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands_with_arguments() {
        assert_eq!(
            parse_command("/vincular abc123"),
            Some(Command::Link(Some("abc123".into())))
        );
        assert_eq!(parse_command("/vincular"), Some(Command::Link(None)));
        assert_eq!(
            parse_command("/start buyer_XYZ"),
            Some(Command::Start(Some("buyer_XYZ".into())))
        );
        assert_eq!(parse_command("  /ventas  "), Some(Command::Sales));
    }

    #[test]
    fn strips_bot_name_suffix() {
        assert_eq!(parse_command("/sorteos@MiRifaBot"), Some(Command::Raffles));
        assert_eq!(
            parse_command("/vincular@MiRifaBot CODE"),
            Some(Command::Link(Some("CODE".into())))
        );
    }

    #[test]
    fn help_alias_and_unknown() {
        assert_eq!(parse_command("/help"), Some(Command::Help));
        assert_eq!(parse_command("/AYUDA"), Some(Command::Help));
        assert_eq!(
            parse_command("/foo bar"),
            Some(Command::Unknown("foo".into()))
        );
    }

    #[test]
    fn plain_text_is_not_a_command() {
        assert_eq!(parse_command("hola"), None);
        assert_eq!(parse_command("/"), None);
        assert_eq!(parse_command(""), None);
    }

    #[test]
    fn parses_callbacks() {
        assert_eq!(
            parse_callback("toggle_org_payment_proof"),
            CallbackAction::ToggleOrg("payment_proof".into())
        );
        assert_eq!(
            parse_callback("toggle_buyer_winner"),
            CallbackAction::ToggleBuyer("winner".into())
        );
        assert_eq!(parse_callback("noop"), CallbackAction::Unknown);
    }

    #[test]
    fn codes_are_normalized() {
        assert_eq!(normalize_code("  ab12cd "), "AB12CD");
    }
}

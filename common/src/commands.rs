use crate::types::Thresholds;

/// Closed set of commands the operator can send over the notification channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorCommand {
    Start,
    MuteCold,
    MuteHot,
    Status,
    Help,
}

impl OperatorCommand {
    pub const ALL: [Self; 5] = [
        Self::Start,
        Self::MuteCold,
        Self::MuteHot,
        Self::Status,
        Self::Help,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::MuteCold => "mute_cold_notifications",
            Self::MuteHot => "mute_hot_notifications",
            Self::Status => "status",
            Self::Help => "help",
        }
    }

    fn describe(self) -> &'static str {
        match self {
            Self::Start => "introduction",
            Self::MuteCold => "stop \"too cold\" alerts until the next cold spell",
            Self::MuteHot => "stop \"too hot\" alerts until the next heat spell",
            Self::Status => "take a reading now",
            Self::Help => "this list",
        }
    }

    /// Accepts `/status`, `status`, `/status@my_bot` and trailing arguments.
    pub fn parse(text: &str) -> Option<Self> {
        let word = text.split_whitespace().next()?;
        let word = word.strip_prefix('/').unwrap_or(word);
        let word = word.split('@').next().unwrap_or(word);

        Self::ALL
            .into_iter()
            .find(|command| command.as_str().eq_ignore_ascii_case(word))
    }
}

pub fn help_text() -> String {
    let mut text = String::from("Commands:");
    for command in OperatorCommand::ALL {
        text.push_str(&format!("\n/{} - {}", command.as_str(), command.describe()));
    }
    text
}

pub fn intro_text(thresholds: Thresholds) -> String {
    format!(
        "Hi! I watch the greenhouse and will tell you when it is colder than {}°C \
         or hotter than {}°C.\n{}",
        thresholds.min_temperature,
        thresholds.max_temperature,
        help_text()
    )
}

pub fn unknown_command_text(text: &str) -> String {
    format!("Unknown command: {}\n{}", text.trim(), help_text())
}

pub const MUTE_COLD_TEXT: &str =
    "\"Too cold\" alerts muted until the temperature recovers and drops again.";
pub const MUTE_HOT_TEXT: &str =
    "\"Too hot\" alerts muted until the temperature recovers and rises again.";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_with_and_without_slash() {
        assert_eq!(OperatorCommand::parse("/start"), Some(OperatorCommand::Start));
        assert_eq!(OperatorCommand::parse("status"), Some(OperatorCommand::Status));
        assert_eq!(
            OperatorCommand::parse("  /Mute_Cold_Notifications  "),
            Some(OperatorCommand::MuteCold)
        );
    }

    #[test]
    fn strips_bot_suffix_and_arguments() {
        assert_eq!(
            OperatorCommand::parse("/mute_hot_notifications@greenhouse_bot"),
            Some(OperatorCommand::MuteHot)
        );
        assert_eq!(
            OperatorCommand::parse("/help please"),
            Some(OperatorCommand::Help)
        );
    }

    #[test]
    fn rejects_unknown_and_empty() {
        assert_eq!(OperatorCommand::parse(""), None);
        assert_eq!(OperatorCommand::parse("   "), None);
        assert_eq!(OperatorCommand::parse("/reboot"), None);
        assert_eq!(OperatorCommand::parse("/"), None);
    }

    #[test]
    fn help_lists_every_command() {
        let help = help_text();
        for command in OperatorCommand::ALL {
            assert!(help.contains(&format!("/{}", command.as_str())));
        }
    }

    #[test]
    fn intro_mentions_thresholds() {
        let text = intro_text(Thresholds {
            min_temperature: 12,
            max_temperature: 29,
        });
        assert!(text.contains("12°C"));
        assert!(text.contains("29°C"));
    }
}

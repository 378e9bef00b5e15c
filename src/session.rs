use chrono::{DateTime, Local};

use crate::config::Config;

/// Identity and settings of the connected bot, fixed for the life of the connection
#[derive(Debug, Clone)]
pub struct BotSession {
    pub config: Config,
    pub bot_user_id: String,
    pub bot_username: String,
    /// Resolved id of the command channel
    pub channel_id: String,
    pub started_at: DateTime<Local>,
}

impl BotSession {
    pub fn new(
        config: Config,
        bot_user_id: String,
        bot_username: String,
        channel_id: String,
        started_at: DateTime<Local>,
    ) -> Self {
        Self {
            config,
            bot_user_id,
            bot_username,
            channel_id,
            started_at,
        }
    }

    pub fn uptime_message(&self) -> String {
        format!("I'm up since {}", self.started_at.format("%a %b %e %H:%M:%S %Y"))
    }

    pub fn connected_message(&self) -> String {
        format!("_{} **connected**_", self.bot_username)
    }

    pub fn disconnected_message(&self) -> String {
        format!("_{} **disconnected**_", self.bot_username)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::TimeZone;

    pub(crate) fn test_config() -> Config {
        Config::parse(
            r#"
[mattermost]
url = "http://localhost:8065"
token = "tok"
team = "ops"
channel = "commands"
"#,
        )
        .unwrap()
    }

    pub(crate) fn test_session(config: Config) -> BotSession {
        BotSession::new(
            config,
            "u-bot".to_string(),
            "runbot".to_string(),
            "c-cmd".to_string(),
            Local.with_ymd_and_hms(2024, 3, 5, 14, 7, 9).unwrap(),
        )
    }

    #[test]
    fn test_uptime_message_format() {
        let session = test_session(test_config());
        assert_eq!(session.uptime_message(), "I'm up since Tue Mar  5 14:07:09 2024");
    }

    #[test]
    fn test_presence_messages() {
        let session = test_session(test_config());
        assert_eq!(session.connected_message(), "_runbot **connected**_");
        assert_eq!(session.disconnected_message(), "_runbot **disconnected**_");
    }
}

use anyhow::{Context, Result};
use regex::Regex;

use crate::config::ArgMode;

/// Built-in command answered by the bot itself.
pub const UPTIME: &str = "uptime";

/// A command invocation found at the start of a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    pub name: String,
    /// Everything after the first whitespace run following the name, verbatim
    pub remainder: Option<String>,
}

impl ParsedCommand {
    pub fn is_uptime(&self) -> bool {
        self.name == UPTIME
    }

    /// Argument vector handed to the executable. The command name is always first.
    pub fn argv(&self, mode: ArgMode) -> Vec<String> {
        let mut argv = vec![self.name.clone()];
        if let Some(remainder) = &self.remainder {
            match mode {
                ArgMode::Split => argv.extend(remainder.split_whitespace().map(str::to_string)),
                ArgMode::Raw => argv.push(remainder.clone()),
            }
        }
        argv
    }
}

/// Recognizes `<trigger><word chars>[<whitespace><remainder>]` anchored at the start of a message.
#[derive(Debug, Clone)]
pub struct CommandParser {
    pattern: Regex,
}

impl CommandParser {
    pub fn new(trigger: &str) -> Result<Self> {
        let pattern = Regex::new(&format!(r"(?s)\A{}(\w+)(?:\s+(.*))?\z", regex::escape(trigger)))
            .with_context(|| format!("Invalid command trigger: {}", trigger))?;
        Ok(Self { pattern })
    }

    pub fn parse(&self, text: &str) -> Option<ParsedCommand> {
        let caps = self.pattern.captures(text)?;
        let name = caps.get(1)?.as_str().to_string();
        let remainder = caps
            .get(2)
            .map(|m| m.as_str())
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string);
        Some(ParsedCommand { name, remainder })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> CommandParser {
        CommandParser::new("=").unwrap()
    }

    #[test]
    fn test_plain_text_is_not_a_command() {
        let p = parser();
        assert_eq!(p.parse("deploy staging"), None);
        assert_eq!(p.parse(""), None);
        assert_eq!(p.parse("please =deploy"), None);
        assert_eq!(p.parse(" =deploy"), None);
        assert_eq!(p.parse("="), None);
        assert_eq!(p.parse("=deploy!"), None);
    }

    #[test]
    fn test_name_only() {
        let cmd = parser().parse("=deploy").unwrap();
        assert_eq!(cmd.name, "deploy");
        assert_eq!(cmd.remainder, None);
    }

    #[test]
    fn test_name_and_remainder_verbatim() {
        let cmd = parser().parse("=deploy arg1 arg2").unwrap();
        assert_eq!(cmd.name, "deploy");
        assert_eq!(cmd.remainder.as_deref(), Some("arg1 arg2"));

        let cmd = parser().parse("=build   a  b\tc").unwrap();
        assert_eq!(cmd.remainder.as_deref(), Some("a  b\tc"));
    }

    #[test]
    fn test_multiline_remainder() {
        let cmd = parser().parse("=note first line\nsecond line").unwrap();
        assert_eq!(cmd.name, "note");
        assert_eq!(cmd.remainder.as_deref(), Some("first line\nsecond line"));
    }

    #[test]
    fn test_whitespace_only_remainder_is_absent() {
        let cmd = parser().parse("=deploy   ").unwrap();
        assert_eq!(cmd.remainder, None);
    }

    #[test]
    fn test_custom_trigger_is_escaped() {
        let p = CommandParser::new(".").unwrap();
        assert_eq!(p.parse(".status").unwrap().name, "status");
        assert_eq!(p.parse("xstatus"), None);
    }

    #[test]
    fn test_argv_split() {
        let cmd = parser().parse("=deploy  staging   eu-west").unwrap();
        assert_eq!(cmd.argv(ArgMode::Split), vec!["deploy", "staging", "eu-west"]);
    }

    #[test]
    fn test_argv_raw() {
        let cmd = parser().parse("=deploy  staging   eu-west").unwrap();
        assert_eq!(cmd.argv(ArgMode::Raw), vec!["deploy", "staging   eu-west"]);
    }

    #[test]
    fn test_argv_without_remainder() {
        let cmd = parser().parse("=status").unwrap();
        assert_eq!(cmd.argv(ArgMode::Split), vec!["status"]);
        assert_eq!(cmd.argv(ArgMode::Raw), vec!["status"]);
    }

    #[test]
    fn test_uptime_detection() {
        assert!(parser().parse("=uptime").unwrap().is_uptime());
        assert!(parser().parse("=uptime please").unwrap().is_uptime());
        assert!(!parser().parse("=uptimes").unwrap().is_uptime());
    }
}

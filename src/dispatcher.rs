use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::command::{CommandParser, ParsedCommand};
use crate::issues::IssueAnnotator;
use crate::platform::{post_best_effort, ChatBackend, RawEvent};
use crate::runner::{ProcessRunner, RunOutcome};
use crate::session::BotSession;

/// A command accepted for execution
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub command: ParsedCommand,
    pub requester_id: String,
    pub channel_id: String,
    /// The triggering post; acknowledgment and status replies are threaded under it
    pub message_id: String,
}

/// Routes incoming events to the issue annotator, built-in replies and the process runner.
pub struct Dispatcher {
    session: Arc<BotSession>,
    backend: Arc<dyn ChatBackend>,
    parser: CommandParser,
    annotator: Option<IssueAnnotator>,
    runner: ProcessRunner,
}

impl Dispatcher {
    pub fn new(session: Arc<BotSession>, backend: Arc<dyn ChatBackend>) -> Result<Self> {
        let config = &session.config;
        let parser = CommandParser::new(&config.command.trigger)?;
        let annotator = IssueAnnotator::new(&config.issues.link_template)?;
        let runner = ProcessRunner::new(&config.command, &config.output, backend.clone());
        Ok(Self {
            session,
            backend,
            parser,
            annotator,
            runner,
        })
    }

    /// Filter an event and answer what can be answered right away. Returns the
    /// command to execute, if the event carries one.
    pub async fn route(&self, event: &RawEvent) -> Option<Invocation> {
        if !event.is_posted() {
            return None;
        }

        let msg = match event.decode_post() {
            Ok(msg) => msg,
            Err(e) => {
                debug!("Dropping event: {:#}", e);
                return None;
            }
        };

        if msg.sender_id == self.session.bot_user_id {
            return None;
        }

        if let Some(annotator) = &self.annotator {
            if let Some(links) = annotator.annotate(&msg.text) {
                post_best_effort(
                    self.backend.as_ref(),
                    &msg.channel_id,
                    &links,
                    Some(msg.message_id.as_str()),
                )
                .await;
            }
        }

        if msg.channel_id != self.session.channel_id {
            return None;
        }

        let command = self.parser.parse(&msg.text)?;
        info!("GOT> {}", msg.text);

        if command.is_uptime() {
            post_best_effort(
                self.backend.as_ref(),
                &msg.channel_id,
                &self.session.uptime_message(),
                Some(msg.message_id.as_str()),
            )
            .await;
            return None;
        }

        Some(Invocation {
            command,
            requester_id: msg.sender_id,
            channel_id: msg.channel_id,
            message_id: msg.message_id,
        })
    }

    /// Acknowledge, run and report one command.
    pub async fn execute(&self, invocation: Invocation) -> RunOutcome {
        let Invocation {
            command,
            requester_id,
            channel_id,
            message_id,
        } = invocation;

        let requester = match self.backend.display_name(&requester_id).await {
            Ok(name) => name,
            Err(e) => {
                warn!("Failed to look up user {}: {:#}", requester_id, e);
                requester_id.clone()
            }
        };

        post_best_effort(
            self.backend.as_ref(),
            &channel_id,
            &format!("Running command **{}** requested by @{}", command.name, requester),
            Some(message_id.as_str()),
        )
        .await;

        let outcome = self.runner.execute(&command, &channel_id, &message_id).await;

        post_best_effort(
            self.backend.as_ref(),
            &channel_id,
            &outcome.notice(&command.name),
            Some(message_id.as_str()),
        )
        .await;

        outcome
    }

    /// Route an event and, if it carries a command, run it to completion.
    #[cfg(test)]
    pub async fn handle_event(&self, event: &RawEvent) -> Option<RunOutcome> {
        let invocation = self.route(event).await?;
        Some(self.execute(invocation).await)
    }
}

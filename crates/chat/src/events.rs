use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use tally_core::domain::{ChannelId, UserId};
use tally_core::tracker::CheckInRequest;
use thiserror::Error;
use tracing::{debug, info};

use crate::commands::{
    command_definitions, parse_slash_command, parse_ticket_command, CommandDefinition,
    CommandRouter, Invocation, PROJECT_NAME_OPTION,
};
use crate::context::BotContext;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GatewayEnvelope {
    pub envelope_id: String,
    pub event: GatewayEvent,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GatewayEvent {
    MessageCreated(MessageCreatedEvent),
    CommandInvoked(CommandInvokedEvent),
    Ready(ReadyEvent),
    Unsupported { event_type: String },
}

impl GatewayEvent {
    pub fn event_type(&self) -> GatewayEventType {
        match self {
            Self::MessageCreated(_) => GatewayEventType::MessageCreated,
            Self::CommandInvoked(_) => GatewayEventType::CommandInvoked,
            Self::Ready(_) => GatewayEventType::Ready,
            Self::Unsupported { .. } => GatewayEventType::Unsupported,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GatewayEventType {
    MessageCreated,
    CommandInvoked,
    Ready,
    Unsupported,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageCreatedEvent {
    pub message_id: String,
    pub channel_id: String,
    pub author_id: String,
    pub author_name: Option<String>,
    pub content: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandInvokedEvent {
    pub interaction_id: String,
    pub command_name: String,
    pub channel_id: String,
    pub user_id: String,
    /// Option name → string value.
    pub options: HashMap<String, String>,
}

impl CommandInvokedEvent {
    pub fn option(&self, name: &str) -> Option<&str> {
        self.options.get(name).map(String::as_str)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReadyEvent {
    pub bot_user_id: String,
    pub username: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext {
    pub correlation_id: String,
}

impl Default for EventContext {
    fn default() -> Self {
        Self { correlation_id: "unknown-correlation-id".to_owned() }
    }
}

/// Calls the gateway should make on behalf of a handler.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outbound {
    SendMessage { channel_id: String, content: String },
    AddReaction { channel_id: String, message_id: String, emoji: String },
    Respond { interaction_id: String, content: String },
    RegisterCommand(CommandDefinition),
    SetPresence { status: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerResult {
    Responded(Vec<Outbound>),
    Processed,
    Ignored,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventHandlerError {
    #[error("malformed {event_type:?} event: missing {field}")]
    MalformedEvent { event_type: GatewayEventType, field: &'static str },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error(transparent)]
    Handler(#[from] EventHandlerError),
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn event_type(&self) -> GatewayEventType;
    async fn handle(
        &self,
        envelope: &GatewayEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;
}

#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<GatewayEventType, Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(&mut self, handler: H)
    where
        H: EventHandler + 'static,
    {
        self.handlers.insert(handler.event_type(), Arc::new(handler));
    }

    pub async fn dispatch(
        &self,
        envelope: &GatewayEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, DispatchError> {
        let Some(handler) = self.handlers.get(&envelope.event.event_type()) else {
            return Ok(HandlerResult::Ignored);
        };

        handler.handle(envelope, ctx).await.map_err(DispatchError::from)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

/// Dispatcher with the message, command and ready handlers bound to `context`.
pub fn bot_dispatcher(context: Arc<BotContext>) -> EventDispatcher {
    let mut dispatcher = EventDispatcher::new();
    dispatcher.register(MessageHandler::new(context.clone()));
    dispatcher.register(CommandHandler::new(context.clone()));
    dispatcher.register(ReadyHandler::new(context));
    dispatcher
}

fn require<'a>(
    value: &'a str,
    event_type: GatewayEventType,
    field: &'static str,
) -> Result<&'a str, EventHandlerError> {
    if value.trim().is_empty() {
        return Err(EventHandlerError::MalformedEvent { event_type, field });
    }
    Ok(value)
}

/// Records check-ins for messages in tracked channels and runs `!ticket`.
pub struct MessageHandler {
    context: Arc<BotContext>,
}

impl MessageHandler {
    pub fn new(context: Arc<BotContext>) -> Self {
        Self { context }
    }
}

#[async_trait]
impl EventHandler for MessageHandler {
    fn event_type(&self) -> GatewayEventType {
        GatewayEventType::MessageCreated
    }

    async fn handle(
        &self,
        envelope: &GatewayEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let GatewayEvent::MessageCreated(message) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };
        let author_id = require(&message.author_id, GatewayEventType::MessageCreated, "author_id")?;
        let channel_id =
            require(&message.channel_id, GatewayEventType::MessageCreated, "channel_id")?;

        if self.context.is_bot_user(author_id) {
            return Ok(HandlerResult::Ignored);
        }
        let Some(project_name) = self.context.channels.project_for(channel_id) else {
            return Ok(HandlerResult::Ignored);
        };

        let invocation = Invocation {
            user_id: UserId::from(author_id),
            channel_id: ChannelId::from(channel_id),
        };
        self.context.tracker.record_check_in(&CheckInRequest {
            user_id: invocation.user_id.clone(),
            channel_id: invocation.channel_id.clone(),
            project_name: project_name.clone(),
            display_name: message.author_name.clone(),
        });
        info!(
            event_name = "chat.check_in.received",
            correlation_id = %ctx.correlation_id,
            user_id = author_id,
            channel_id,
            project_name = %project_name,
            "check-in recorded"
        );

        let mut outbound = Vec::new();
        let reaction = &self.context.settings.check_in_reaction;
        if !reaction.is_empty() {
            outbound.push(Outbound::AddReaction {
                channel_id: channel_id.to_owned(),
                message_id: message.message_id.clone(),
                emoji: reaction.clone(),
            });
        }

        if let Some(command) = parse_ticket_command(&message.content) {
            let reply =
                CommandRouter::new(&self.context).route_ticket(command, &invocation, &project_name);
            outbound
                .push(Outbound::SendMessage { channel_id: channel_id.to_owned(), content: reply });
        }

        Ok(if outbound.is_empty() {
            HandlerResult::Processed
        } else {
            HandlerResult::Responded(outbound)
        })
    }
}

pub struct CommandHandler {
    context: Arc<BotContext>,
}

impl CommandHandler {
    pub fn new(context: Arc<BotContext>) -> Self {
        Self { context }
    }
}

#[async_trait]
impl EventHandler for CommandHandler {
    fn event_type(&self) -> GatewayEventType {
        GatewayEventType::CommandInvoked
    }

    async fn handle(
        &self,
        envelope: &GatewayEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let GatewayEvent::CommandInvoked(command) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };
        let user_id = require(&command.user_id, GatewayEventType::CommandInvoked, "user_id")?;
        let channel_id =
            require(&command.channel_id, GatewayEventType::CommandInvoked, "channel_id")?;

        debug!(
            event_name = "chat.command.received",
            correlation_id = %ctx.correlation_id,
            command = %command.command_name,
            user_id,
            channel_id,
            "slash command received"
        );

        let parsed =
            parse_slash_command(&command.command_name, command.option(PROJECT_NAME_OPTION));
        let invocation =
            Invocation { user_id: UserId::from(user_id), channel_id: ChannelId::from(channel_id) };
        let Some(reply) = CommandRouter::new(&self.context).route_slash(parsed, &invocation) else {
            return Ok(HandlerResult::Ignored);
        };

        Ok(HandlerResult::Responded(vec![Outbound::Respond {
            interaction_id: command.interaction_id.clone(),
            content: reply,
        }]))
    }
}

/// Learns the bot's own identity, sets presence and registers slash commands.
pub struct ReadyHandler {
    context: Arc<BotContext>,
}

impl ReadyHandler {
    pub fn new(context: Arc<BotContext>) -> Self {
        Self { context }
    }
}

#[async_trait]
impl EventHandler for ReadyHandler {
    fn event_type(&self) -> GatewayEventType {
        GatewayEventType::Ready
    }

    async fn handle(
        &self,
        envelope: &GatewayEnvelope,
        _ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let GatewayEvent::Ready(ready) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };
        let bot_user_id = require(&ready.bot_user_id, GatewayEventType::Ready, "bot_user_id")?;

        self.context.set_bot_user(bot_user_id);
        info!(
            event_name = "chat.session.ready",
            bot_user_id,
            username = %ready.username,
            "chat session ready"
        );

        let mut outbound =
            vec![Outbound::SetPresence { status: self.context.settings.presence.clone() }];
        outbound.extend(command_definitions().into_iter().map(Outbound::RegisterCommand));
        Ok(HandlerResult::Responded(outbound))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, HashMap};
    use std::sync::Arc;

    use tally_core::domain::{ChannelId, UserId};
    use tally_core::store::MemoryStore;
    use tally_core::tracker::{ActivityTracker, TrackerSettings};

    use super::{
        bot_dispatcher, CommandInvokedEvent, DispatchError, EventContext, EventDispatcher,
        EventHandlerError, GatewayEnvelope, GatewayEvent, GatewayEventType, HandlerResult,
        MessageCreatedEvent, Outbound, ReadyEvent,
    };
    use crate::context::{BotContext, BotSettings, ChannelRegistry};

    fn context(reaction: &str) -> Arc<BotContext> {
        let tracker = Arc::new(ActivityTracker::new(
            Arc::new(MemoryStore::default()),
            TrackerSettings::default(),
        ));
        let mut tracked = BTreeMap::new();
        tracked.insert("C1".to_owned(), "atlas".to_owned());
        Arc::new(BotContext::new(
            tracker,
            ChannelRegistry::new(tracked, None, None),
            BotSettings { check_in_reaction: reaction.to_owned(), presence: "Tracking".to_owned() },
        ))
    }

    fn message(author: &str, channel: &str, content: &str) -> GatewayEnvelope {
        GatewayEnvelope {
            envelope_id: "env-1".to_owned(),
            event: GatewayEvent::MessageCreated(MessageCreatedEvent {
                message_id: "M1".to_owned(),
                channel_id: channel.to_owned(),
                author_id: author.to_owned(),
                author_name: Some("Ana".to_owned()),
                content: content.to_owned(),
            }),
        }
    }

    fn ready(bot: &str) -> GatewayEnvelope {
        GatewayEnvelope {
            envelope_id: "env-0".to_owned(),
            event: GatewayEvent::Ready(ReadyEvent {
                bot_user_id: bot.to_owned(),
                username: "tally".to_owned(),
            }),
        }
    }

    #[tokio::test]
    async fn unregistered_event_types_are_ignored() {
        let dispatcher = EventDispatcher::new();
        let result = dispatcher
            .dispatch(
                &GatewayEnvelope {
                    envelope_id: "env-9".to_owned(),
                    event: GatewayEvent::Unsupported { event_type: "typing".to_owned() },
                },
                &EventContext::default(),
            )
            .await
            .expect("dispatch");

        assert_eq!(result, HandlerResult::Ignored);
        assert_eq!(bot_dispatcher(context("✅")).handler_count(), 3);
    }

    #[tokio::test]
    async fn tracked_message_records_check_in_and_reacts() {
        let context = context("✅");
        let dispatcher = bot_dispatcher(context.clone());

        let result = dispatcher
            .dispatch(&message("U1", "C1", "shipped the parser"), &EventContext::default())
            .await
            .expect("dispatch");

        assert_eq!(
            result,
            HandlerResult::Responded(vec![Outbound::AddReaction {
                channel_id: "C1".to_owned(),
                message_id: "M1".to_owned(),
                emoji: "✅".to_owned(),
            }])
        );
        let last = context.tracker.last_check_in(&UserId::from("U1"), &ChannelId::from("C1"));
        assert!(last.is_some());
        let activities = context.tracker.activities_for(&UserId::from("U1"));
        let record = activities.get(&ChannelId::from("C1")).expect("record");
        assert_eq!(record.project_name, "atlas");
        assert_eq!(record.display_name.as_deref(), Some("Ana"));
    }

    #[tokio::test]
    async fn untracked_channel_is_ignored() {
        let context = context("✅");
        let dispatcher = bot_dispatcher(context.clone());

        let result = dispatcher
            .dispatch(&message("U1", "C2", "hello"), &EventContext::default())
            .await
            .expect("dispatch");

        assert_eq!(result, HandlerResult::Ignored);
        assert_eq!(context.tracker.summary().activities, 0);
    }

    #[tokio::test]
    async fn own_messages_are_ignored_after_ready() {
        let context = context("");
        let dispatcher = bot_dispatcher(context.clone());

        let ready_result =
            dispatcher.dispatch(&ready("B1"), &EventContext::default()).await.expect("ready");
        let HandlerResult::Responded(outbound) = ready_result else {
            panic!("ready should respond");
        };
        assert_eq!(outbound[0], Outbound::SetPresence { status: "Tracking".to_owned() });
        assert_eq!(outbound.len(), 4);

        let result = dispatcher
            .dispatch(&message("B1", "C1", "!ticket list"), &EventContext::default())
            .await
            .expect("dispatch");
        assert_eq!(result, HandlerResult::Ignored);
        assert_eq!(context.tracker.summary().activities, 0);
    }

    #[tokio::test]
    async fn ticket_message_checks_in_and_replies() {
        let context = context("");
        let dispatcher = bot_dispatcher(context);

        let result = dispatcher
            .dispatch(&message("U1", "C1", "!ticket create Ship | v1"), &EventContext::default())
            .await
            .expect("dispatch");

        assert_eq!(
            result,
            HandlerResult::Responded(vec![Outbound::SendMessage {
                channel_id: "C1".to_owned(),
                content: "✅ Created ticket **#1**: Ship".to_owned(),
            }])
        );
    }

    #[tokio::test]
    async fn plain_message_without_reaction_is_processed() {
        let dispatcher = bot_dispatcher(context(""));

        let result = dispatcher
            .dispatch(&message("U1", "C1", "daily update"), &EventContext::default())
            .await
            .expect("dispatch");

        assert_eq!(result, HandlerResult::Processed);
    }

    #[tokio::test]
    async fn command_without_user_is_malformed() {
        let dispatcher = bot_dispatcher(context("✅"));
        let envelope = GatewayEnvelope {
            envelope_id: "env-2".to_owned(),
            event: GatewayEvent::CommandInvoked(CommandInvokedEvent {
                interaction_id: "I1".to_owned(),
                command_name: "stats".to_owned(),
                channel_id: "C1".to_owned(),
                user_id: String::new(),
                options: HashMap::new(),
            }),
        };

        let error = dispatcher
            .dispatch(&envelope, &EventContext::default())
            .await
            .expect_err("missing user must fail");

        assert_eq!(
            error,
            DispatchError::Handler(EventHandlerError::MalformedEvent {
                event_type: GatewayEventType::CommandInvoked,
                field: "user_id",
            })
        );
    }

    #[tokio::test]
    async fn track_command_responds_to_interaction() {
        let context = context("✅");
        let dispatcher = bot_dispatcher(context.clone());
        let mut options = HashMap::new();
        options.insert("project-name".to_owned(), "beacon".to_owned());
        let envelope = GatewayEnvelope {
            envelope_id: "env-3".to_owned(),
            event: GatewayEvent::CommandInvoked(CommandInvokedEvent {
                interaction_id: "I2".to_owned(),
                command_name: "track".to_owned(),
                channel_id: "C7".to_owned(),
                user_id: "U1".to_owned(),
                options,
            }),
        };

        let result = dispatcher.dispatch(&envelope, &EventContext::default()).await.expect("track");

        let HandlerResult::Responded(outbound) = result else {
            panic!("track should respond");
        };
        assert!(matches!(
            &outbound[0],
            Outbound::Respond { interaction_id, content }
                if interaction_id == "I2" && content.contains("**beacon**")
        ));
        assert_eq!(context.channels.project_for("C7").as_deref(), Some("beacon"));
    }
}

//! Outbound side of the chat platform.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::info;

use crate::commands::CommandDefinition;
use crate::events::Outbound;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("send message to channel `{channel_id}` failed: {reason}")]
    SendMessage { channel_id: String, reason: String },
    #[error("add reaction failed: {0}")]
    AddReaction(String),
    #[error("respond to interaction failed: {0}")]
    Respond(String),
    #[error("register command `{command}` failed: {reason}")]
    RegisterCommand { command: String, reason: String },
    #[error("set presence failed: {0}")]
    SetPresence(String),
}

#[async_trait]
pub trait ChatGateway: Send + Sync {
    async fn send_message(&self, channel_id: &str, content: &str) -> Result<(), GatewayError>;
    async fn add_reaction(
        &self,
        channel_id: &str,
        message_id: &str,
        emoji: &str,
    ) -> Result<(), GatewayError>;
    async fn respond(&self, interaction_id: &str, content: &str) -> Result<(), GatewayError>;
    async fn register_command(&self, command: &CommandDefinition) -> Result<(), GatewayError>;
    async fn set_presence(&self, status: &str) -> Result<(), GatewayError>;
}

pub async fn deliver(gateway: &dyn ChatGateway, outbound: &Outbound) -> Result<(), GatewayError> {
    match outbound {
        Outbound::SendMessage { channel_id, content } => {
            gateway.send_message(channel_id, content).await
        }
        Outbound::AddReaction { channel_id, message_id, emoji } => {
            gateway.add_reaction(channel_id, message_id, emoji).await
        }
        Outbound::Respond { interaction_id, content } => {
            gateway.respond(interaction_id, content).await
        }
        Outbound::RegisterCommand(command) => gateway.register_command(command).await,
        Outbound::SetPresence { status } => gateway.set_presence(status).await,
    }
}

/// Writes every outbound call to the log instead of a chat platform.
#[derive(Debug, Default)]
pub struct LoggingGateway;

#[async_trait]
impl ChatGateway for LoggingGateway {
    async fn send_message(&self, channel_id: &str, content: &str) -> Result<(), GatewayError> {
        info!(event_name = "egress.chat.message_sent", channel_id, content, "send message");
        Ok(())
    }

    async fn add_reaction(
        &self,
        channel_id: &str,
        message_id: &str,
        emoji: &str,
    ) -> Result<(), GatewayError> {
        info!(
            event_name = "egress.chat.reaction_added",
            channel_id,
            message_id,
            emoji,
            "add reaction"
        );
        Ok(())
    }

    async fn respond(&self, interaction_id: &str, content: &str) -> Result<(), GatewayError> {
        info!(event_name = "egress.chat.responded", interaction_id, content, "respond to command");
        Ok(())
    }

    async fn register_command(&self, command: &CommandDefinition) -> Result<(), GatewayError> {
        info!(
            event_name = "egress.chat.command_registered",
            command = %command.name,
            "register command"
        );
        Ok(())
    }

    async fn set_presence(&self, status: &str) -> Result<(), GatewayError> {
        info!(event_name = "egress.chat.presence_set", status, "set presence");
        Ok(())
    }
}

/// Keeps every outbound call in memory, in order.
#[derive(Debug, Default)]
pub struct RecordingGateway {
    sent: Mutex<Vec<Outbound>>,
    fail_sends: bool,
}

impl RecordingGateway {
    /// A gateway whose `send_message` always fails; other calls still record.
    pub fn failing_sends() -> Self {
        Self { sent: Mutex::new(Vec::new()), fail_sends: true }
    }

    pub async fn sent(&self) -> Vec<Outbound> {
        self.sent.lock().await.clone()
    }

    async fn record(&self, outbound: Outbound) -> Result<(), GatewayError> {
        self.sent.lock().await.push(outbound);
        Ok(())
    }
}

#[async_trait]
impl ChatGateway for RecordingGateway {
    async fn send_message(&self, channel_id: &str, content: &str) -> Result<(), GatewayError> {
        if self.fail_sends {
            return Err(GatewayError::SendMessage {
                channel_id: channel_id.to_owned(),
                reason: "scripted failure".to_owned(),
            });
        }
        self.record(Outbound::SendMessage {
            channel_id: channel_id.to_owned(),
            content: content.to_owned(),
        })
        .await
    }

    async fn add_reaction(
        &self,
        channel_id: &str,
        message_id: &str,
        emoji: &str,
    ) -> Result<(), GatewayError> {
        self.record(Outbound::AddReaction {
            channel_id: channel_id.to_owned(),
            message_id: message_id.to_owned(),
            emoji: emoji.to_owned(),
        })
        .await
    }

    async fn respond(&self, interaction_id: &str, content: &str) -> Result<(), GatewayError> {
        self.record(Outbound::Respond {
            interaction_id: interaction_id.to_owned(),
            content: content.to_owned(),
        })
        .await
    }

    async fn register_command(&self, command: &CommandDefinition) -> Result<(), GatewayError> {
        self.record(Outbound::RegisterCommand(command.clone())).await
    }

    async fn set_presence(&self, status: &str) -> Result<(), GatewayError> {
        self.record(Outbound::SetPresence { status: status.to_owned() }).await
    }
}

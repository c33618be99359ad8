use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::events::{
    EventContext, EventDispatcher, GatewayEnvelope, GatewayEvent, HandlerResult,
};
use crate::gateway::{deliver, ChatGateway, LoggingGateway};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport failed to connect: {0}")]
    Connect(String),
    #[error("transport read failed: {0}")]
    Receive(String),
    #[error("transport disconnect failed: {0}")]
    Disconnect(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { max_retries: 5, base_delay_ms: 250, max_delay_ms: 5_000 }
    }
}

impl ReconnectPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

/// Inbound event stream from the chat platform.
#[async_trait]
pub trait GatewayTransport: Send + Sync {
    async fn connect(&self) -> Result<(), TransportError>;
    /// `Ok(None)` means the stream closed cleanly.
    async fn next_envelope(&self) -> Result<Option<GatewayEnvelope>, TransportError>;
    async fn disconnect(&self) -> Result<(), TransportError>;
}

#[derive(Default)]
pub struct NoopTransport;

#[async_trait]
impl GatewayTransport for NoopTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn next_envelope(&self) -> Result<Option<GatewayEnvelope>, TransportError> {
        Ok(None)
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Pumps inbound envelopes through the dispatcher and delivers whatever the
/// handlers answer through the outbound gateway.
pub struct GatewayRunner {
    transport: Arc<dyn GatewayTransport>,
    gateway: Arc<dyn ChatGateway>,
    dispatcher: EventDispatcher,
    reconnect_policy: ReconnectPolicy,
    noop_transport: bool,
}

impl GatewayRunner {
    pub fn new(
        transport: Arc<dyn GatewayTransport>,
        gateway: Arc<dyn ChatGateway>,
        dispatcher: EventDispatcher,
        reconnect_policy: ReconnectPolicy,
    ) -> Self {
        Self { transport, gateway, dispatcher, reconnect_policy, noop_transport: false }
    }

    /// Runner without a live platform connection; outbound calls are logged.
    pub fn offline(dispatcher: EventDispatcher) -> Self {
        Self {
            transport: Arc::new(NoopTransport),
            gateway: Arc::new(LoggingGateway),
            dispatcher,
            reconnect_policy: ReconnectPolicy::default(),
            noop_transport: true,
        }
    }

    pub fn is_noop_transport(&self) -> bool {
        self.noop_transport
    }

    pub fn gateway(&self) -> Arc<dyn ChatGateway> {
        self.gateway.clone()
    }

    /// Runs until the stream closes or reconnect attempts are exhausted.
    /// Transport failures never propagate.
    pub async fn start(&self) {
        for attempt in 0..=self.reconnect_policy.max_retries {
            match self.connect_and_pump(attempt).await {
                Ok(()) => return,
                Err(transport_error) => {
                    warn!(
                        event_name = "ingress.chat.transport_failed",
                        attempt,
                        max_retries = self.reconnect_policy.max_retries,
                        error = %transport_error,
                        "chat transport failed"
                    );

                    if attempt >= self.reconnect_policy.max_retries {
                        warn!(
                            event_name = "ingress.chat.retries_exhausted",
                            max_retries = self.reconnect_policy.max_retries,
                            "chat transport retries exhausted; continuing process without crash"
                        );
                        return;
                    }

                    let delay = self.reconnect_policy.backoff(attempt);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
    }

    async fn connect_and_pump(&self, attempt: u32) -> Result<(), TransportError> {
        info!(attempt, "opening chat transport connection");
        self.transport.connect().await?;
        info!(event_name = "ingress.chat.connected", attempt, "chat transport connected");

        loop {
            let Some(envelope) = self.transport.next_envelope().await? else {
                info!(attempt, "chat transport stream closed");
                self.transport.disconnect().await?;
                return Ok(());
            };

            info!(
                event_name = "ingress.chat.event_received",
                envelope_id = %envelope.envelope_id,
                event_type = ?envelope.event.event_type(),
                correlation_id = %envelope.envelope_id,
                channel_id = channel_of(&envelope).unwrap_or("unknown"),
                "received chat event"
            );

            let context = EventContext { correlation_id: envelope.envelope_id.clone() };
            match self.dispatcher.dispatch(&envelope, &context).await {
                Ok(HandlerResult::Responded(outbound)) => {
                    for call in &outbound {
                        if let Err(error) = deliver(self.gateway.as_ref(), call).await {
                            warn!(
                                event_name = "egress.chat.delivery_failed",
                                correlation_id = %envelope.envelope_id,
                                error = %error,
                                "outbound call failed"
                            );
                        }
                    }
                }
                Ok(result) => {
                    debug!(
                        correlation_id = %envelope.envelope_id,
                        result = ?result,
                        "event handled without reply"
                    );
                }
                Err(error) => {
                    warn!(
                        envelope_id = %envelope.envelope_id,
                        correlation_id = %envelope.envelope_id,
                        error = %error,
                        "event dispatch failed; continuing gateway loop"
                    );
                }
            }
        }
    }
}

fn channel_of(envelope: &GatewayEnvelope) -> Option<&str> {
    match &envelope.event {
        GatewayEvent::MessageCreated(event) => Some(event.channel_id.as_str()),
        GatewayEvent::CommandInvoked(event) => Some(event.channel_id.as_str()),
        GatewayEvent::Ready(_) | GatewayEvent::Unsupported { .. } => None,
    }
}

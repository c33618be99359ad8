//! Chat integration for tally.
//!
//! - **Events** (`events`) - inbound message/command/ready events and their handlers
//! - **Commands** (`commands`) - `!ticket` text commands and `/track`, `/stats`, `/progress`
//! - **Messages** (`messages`) - reply text
//! - **Gateway** (`gateway`) - outbound calls to the chat platform
//! - **Socket** (`socket`) - the inbound event loop with reconnection logic
//!
//! ```text
//! Transport → GatewayRunner → EventDispatcher → Handlers → ActivityTracker
//!                                  ↓
//!                           ChatGateway ← Outbound
//! ```

pub mod commands;
pub mod context;
pub mod events;
pub mod gateway;
pub mod messages;
pub mod socket;

pub use context::{BotContext, BotSettings, ChannelRegistry};
pub use events::{bot_dispatcher, EventDispatcher, GatewayEnvelope, GatewayEvent, Outbound};
pub use gateway::{ChatGateway, GatewayError, LoggingGateway, RecordingGateway};
pub use socket::{GatewayRunner, GatewayTransport, NoopTransport, ReconnectPolicy, TransportError};

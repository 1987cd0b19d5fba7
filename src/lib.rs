//! # gearwire
//!
//! Worker-side network agent for job-server protocols.
//!
//! A worker keeps one [`Agent`] per job server. Each agent owns a socket,
//! reassembles the byte stream into envelopes and pushes them, tagged with
//! itself, onto the worker's bounded delivery queue. When the socket dies
//! the agent reports it, redials at a fixed interval, re-announces the
//! worker's capabilities and asks for work again.
//!
//! ## Architecture
//!
//! - **Protocol**: 12-byte big-endian header (magic, type, length) plus payload
//! - **Framer**: carries leftover bytes across reads, emits whole envelopes
//! - **Agent**: write path under one mutex, one read loop per socket generation
//! - **Worker contract**: bounded packet queue, unbounded failure sink, shutdown flag
//!
//! ## Example
//!
//! ```ignore
//! use gearwire::{connect, AgentConfig, WorkerContext};
//!
//! #[tokio::main]
//! async fn main() -> gearwire::Result<()> {
//!     let (worker, mut inbox) = WorkerContext::channel(AgentConfig::default());
//!     worker.capabilities().register("reverse", None);
//!
//!     let agent = connect("tcp", "127.0.0.1:4730", worker.clone()).await?;
//!     agent.announce().await?;
//!     agent.send_grab().await?;
//!
//!     while let Some(packet) = inbox.packets.recv().await {
//!         println!("{} from {}", packet.packet_type(), packet.agent().endpoint());
//!     }
//!     Ok(())
//! }
//! ```

pub mod agent;
pub mod capability;
pub mod config;
pub mod error;
pub mod protocol;
pub mod shutdown;
pub mod transport;
pub mod worker;
pub mod writer;

pub use agent::{connect, Agent, AgentState};
pub use capability::Capabilities;
pub use config::{AgentConfig, CorruptionPolicy, ReconnectPolicy};
pub use error::{AgentError, Result};
pub use protocol::{Envelope, OutboundPacket, PacketType};
pub use shutdown::ShutdownSignal;
pub use worker::{AgentFailure, InboundPacket, WorkerContext, WorkerInbox};

//! The worker side of the agent contract.
//!
//! A worker owns one [`WorkerInbox`] and hands clones of the matching
//! [`WorkerContext`] to every agent it creates:
//!
//! ```text
//! Agent ─┐                  ┌─► inbox.packets   (bounded, awaits when full)
//! Agent ─┼─► WorkerContext ─┤
//! Agent ─┘                  └─► inbox.failures  (unbounded, never blocks)
//! ```
//!
//! Every inbound packet and every reported failure carries the agent it came
//! from, so one inbox can serve many job servers.

use std::fmt;

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::agent::Agent;
use crate::capability::Capabilities;
use crate::config::AgentConfig;
use crate::error::{AgentError, Result};
use crate::protocol::{Envelope, PacketType};
use crate::shutdown::ShutdownSignal;

/// One decoded envelope, tagged with the agent that read it.
#[derive(Debug, Clone)]
pub struct InboundPacket {
    envelope: Envelope,
    agent: Agent,
}

impl InboundPacket {
    pub(crate) fn new(envelope: Envelope, agent: Agent) -> Self {
        Self { envelope, agent }
    }

    /// Packet type code.
    #[inline]
    pub fn packet_type(&self) -> PacketType {
        self.envelope.packet_type()
    }

    /// Payload bytes.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        self.envelope.payload()
    }

    /// NUL-separated payload arguments, see [`Envelope::args`].
    pub fn args(&self, max: usize) -> Vec<Bytes> {
        self.envelope.args(max)
    }

    /// The full envelope.
    pub fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    /// Agent that produced this packet; use it to reply on the same socket.
    pub fn agent(&self) -> &Agent {
        &self.agent
    }
}

/// An error reported by an agent, tagged with that agent.
#[derive(Debug)]
pub struct AgentFailure {
    /// What went wrong.
    pub error: AgentError,
    /// Agent that hit it.
    pub agent: Agent,
}

impl fmt::Display for AgentFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.agent.endpoint(), self.error)
    }
}

/// Receiving ends owned by the worker.
#[derive(Debug)]
pub struct WorkerInbox {
    /// Decoded packets from every agent, in per-agent wire order.
    pub packets: mpsc::Receiver<InboundPacket>,
    /// Errors reported by agents.
    pub failures: mpsc::UnboundedReceiver<AgentFailure>,
}

/// Everything an agent needs from its worker. Cheap to clone.
#[derive(Debug, Clone)]
pub struct WorkerContext {
    packets: mpsc::Sender<InboundPacket>,
    failures: mpsc::UnboundedSender<AgentFailure>,
    shutdown: ShutdownSignal,
    capabilities: Capabilities,
    config: AgentConfig,
}

impl WorkerContext {
    /// Create a context and its inbox.
    ///
    /// The delivery queue holds `config.queue_capacity` packets; read loops
    /// wait when it is full.
    pub fn channel(config: AgentConfig) -> (WorkerContext, WorkerInbox) {
        let (packets_tx, packets_rx) = mpsc::channel(config.queue_capacity.max(1));
        let (failures_tx, failures_rx) = mpsc::unbounded_channel();

        let context = WorkerContext {
            packets: packets_tx,
            failures: failures_tx,
            shutdown: ShutdownSignal::new(),
            capabilities: Capabilities::new(),
            config,
        };
        let inbox = WorkerInbox {
            packets: packets_rx,
            failures: failures_rx,
        };
        (context, inbox)
    }

    /// Configuration handed to agents built from this context.
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Functions announced by every agent.
    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// The shared shutdown flag.
    pub fn shutdown_signal(&self) -> &ShutdownSignal {
        &self.shutdown
    }

    /// Raise the shutdown flag for every agent.
    pub fn shutdown(&self) {
        tracing::info!("worker shutting down");
        self.shutdown.trigger();
    }

    /// Whether shutdown was requested.
    #[inline]
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_shutting_down()
    }

    /// Hand a packet to the worker, waiting while the queue is full.
    pub(crate) async fn deliver(&self, packet: InboundPacket) -> Result<()> {
        self.packets
            .send(packet)
            .await
            .map_err(|_| AgentError::DeliveryClosed)
    }

    /// Report an error. Never blocks.
    pub(crate) fn report(&self, error: AgentError, agent: Agent) {
        if let Err(mpsc::error::SendError(failure)) =
            self.failures.send(AgentFailure { error, agent })
        {
            tracing::debug!(failure = %failure, "failure dropped, worker inbox closed");
        }
    }
}

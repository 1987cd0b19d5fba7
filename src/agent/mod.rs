//! Connection agent: one socket to one job server.
//!
//! An [`Agent`] owns the write half of its socket behind a single async
//! mutex and runs one read loop task per socket generation:
//!
//! ```text
//!               ┌──────────── Mutex<Link> ────────────┐
//! send() ──────►│ writer (BufWriter) │ close_tx │ gen │
//! reconnect() ─►└─────────────────────────────────────┘
//!                        │ retire: drop writer, fire close_tx
//!                        ▼
//!   read loop (gen N): read ─► Framer ─► WorkerContext::deliver ─► inbox
//! ```
//!
//! The read loop never holds the mutex while blocked on the socket, so
//! `close()` can always retire it. A loop whose generation was retired
//! exits without reporting anything.

mod read_loop;
mod reconnect;

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use tokio::io::BufWriter;
use tokio::sync::{oneshot, Mutex};

use crate::config::AgentConfig;
use crate::error::{AgentError, Result};
use crate::protocol::{OutboundPacket, PacketType};
use crate::transport::{BoxedWriter, Dialer, Endpoint, NetDialer, Transport};
use crate::worker::WorkerContext;
use crate::writer::{write_batch, EncodedPacket};

use read_loop::Session;

/// Observable connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    /// No socket.
    Disconnected,
    /// Dialing, either from `connect()` or the reconnect loop.
    Connecting,
    /// A socket is open and a read loop is running.
    Connected,
    /// The worker raised the shutdown flag.
    ShuttingDown,
}

impl AgentState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => AgentState::Connecting,
            2 => AgentState::Connected,
            _ => AgentState::Disconnected,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            AgentState::Disconnected | AgentState::ShuttingDown => 0,
            AgentState::Connecting => 1,
            AgentState::Connected => 2,
        }
    }
}

/// Mutable connection state, guarded by the agent's mutex.
struct Link {
    writer: Option<BufWriter<BoxedWriter>>,
    close_tx: Option<oneshot::Sender<()>>,
    generation: u64,
}

impl Link {
    async fn write(&mut self, batch: &[EncodedPacket]) -> Result<()> {
        let writer = self.writer.as_mut().ok_or(AgentError::NotConnected)?;
        write_batch(writer, batch).await
    }
}

struct Inner {
    endpoint: Endpoint,
    worker: WorkerContext,
    dialer: Arc<dyn Dialer>,
    link: Mutex<Link>,
    state: AtomicU8,
    generation: AtomicU64,
}

/// Handle to one job-server connection. Cheap to clone.
#[derive(Clone)]
pub struct Agent {
    inner: Arc<Inner>,
}

/// Create an agent for `(network, address)` and connect it.
pub async fn connect(network: &str, address: &str, worker: WorkerContext) -> Result<Agent> {
    let agent = Agent::new(network, address, worker)?;
    agent.connect().await?;
    Ok(agent)
}

impl Agent {
    /// Create a disconnected agent that dials real sockets.
    pub fn new(network: &str, address: &str, worker: WorkerContext) -> Result<Self> {
        Self::with_dialer(network, address, worker, NetDialer)
    }

    /// Create a disconnected agent with a custom dialer.
    pub fn with_dialer<D: Dialer>(
        network: &str,
        address: &str,
        worker: WorkerContext,
        dialer: D,
    ) -> Result<Self> {
        let endpoint = Endpoint::parse(network, address)?;
        Ok(Self::from_parts(endpoint, worker, Arc::new(dialer)))
    }

    /// Create a disconnected agent from already parsed parts.
    pub fn from_parts(endpoint: Endpoint, worker: WorkerContext, dialer: Arc<dyn Dialer>) -> Self {
        Self {
            inner: Arc::new(Inner {
                endpoint,
                worker,
                dialer,
                link: Mutex::new(Link {
                    writer: None,
                    close_tx: None,
                    generation: 0,
                }),
                state: AtomicU8::new(AgentState::Disconnected.as_u8()),
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// Endpoint this agent dials.
    pub fn endpoint(&self) -> &Endpoint {
        &self.inner.endpoint
    }

    /// Worker context this agent delivers to.
    pub fn worker(&self) -> &WorkerContext {
        &self.inner.worker
    }

    /// Configuration inherited from the worker context.
    pub fn config(&self) -> &AgentConfig {
        self.inner.worker.config()
    }

    /// Current state; `ShuttingDown` once the worker raised its flag.
    pub fn state(&self) -> AgentState {
        if self.inner.worker.is_shutting_down() {
            return AgentState::ShuttingDown;
        }
        AgentState::from_u8(self.inner.state.load(Ordering::Acquire))
    }

    /// Number of sockets established so far.
    pub fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::Acquire)
    }

    /// Open the socket and start its read loop.
    ///
    /// Fails with `AlreadyConnected` on a live agent and with `Dial` when
    /// the endpoint is unreachable. Dial failures are not retried here.
    pub async fn connect(&self) -> Result<()> {
        let mut link = self.inner.link.lock().await;
        if link.writer.is_some() {
            return Err(AgentError::AlreadyConnected);
        }

        self.set_state(AgentState::Connecting);
        let transport = match self.inner.dialer.dial(&self.inner.endpoint).await {
            Ok(transport) => transport,
            Err(source) => {
                self.set_state(AgentState::Disconnected);
                tracing::warn!(endpoint = %self.inner.endpoint, error = %source, "dial failed");
                return Err(AgentError::Dial {
                    endpoint: self.inner.endpoint.to_string(),
                    source,
                });
            }
        };

        let session = self.install(&mut link, transport);
        tracing::info!(
            endpoint = %self.inner.endpoint,
            generation = session.generation,
            "connected"
        );
        read_loop::spawn(self.clone(), session);
        Ok(())
    }

    /// Encode and write one packet under the write lock.
    pub async fn send(&self, packet: &OutboundPacket) -> Result<()> {
        let encoded = EncodedPacket::encode(packet, self.config().max_payload_size)?;
        let mut link = self.inner.link.lock().await;
        link.write(&[encoded]).await
    }

    /// Ask for a job, with its unique id (`GRAB_JOB_UNIQ`).
    pub async fn send_grab(&self) -> Result<()> {
        self.send(&OutboundPacket::empty(PacketType::GRAB_JOB_UNIQ))
            .await
    }

    /// Tell the server this worker is about to sleep (`PRE_SLEEP`).
    pub async fn send_pre_sleep(&self) -> Result<()> {
        self.send(&OutboundPacket::empty(PacketType::PRE_SLEEP))
            .await
    }

    /// Announce every registered capability as one batch.
    pub async fn announce(&self) -> Result<()> {
        let batch = self.encode_all(self.inner.worker.capabilities().packets())?;
        let mut link = self.inner.link.lock().await;
        link.write(&batch).await
    }

    /// Close the socket if one is open. Idempotent.
    ///
    /// The read loop of the closed socket exits without reporting, and no
    /// reconnect follows.
    pub async fn close(&self) {
        let mut link = self.inner.link.lock().await;
        if self.retire(&mut link) {
            tracing::info!(
                endpoint = %self.inner.endpoint,
                generation = link.generation,
                "closed"
            );
        }
        self.set_state(AgentState::Disconnected);
    }

    fn encode_all(&self, packets: Vec<OutboundPacket>) -> Result<Vec<EncodedPacket>> {
        let max = self.config().max_payload_size;
        packets
            .iter()
            .map(|packet| EncodedPacket::encode(packet, max))
            .collect()
    }

    fn set_state(&self, state: AgentState) {
        self.inner.state.store(state.as_u8(), Ordering::Release);
    }

    /// Make `transport` the current socket generation.
    fn install(&self, link: &mut Link, transport: Transport) -> Session {
        let (close_tx, close_rx) = oneshot::channel();
        link.generation += 1;
        link.writer = Some(BufWriter::new(transport.writer));
        link.close_tx = Some(close_tx);

        self.inner
            .generation
            .store(link.generation, Ordering::Release);
        self.set_state(AgentState::Connected);

        Session {
            reader: transport.reader,
            close_rx,
            generation: link.generation,
        }
    }

    /// Drop the current socket and stop its read loop. Returns `true` if a
    /// socket was open.
    fn retire(&self, link: &mut Link) -> bool {
        if let Some(close_tx) = link.close_tx.take() {
            // the loop may already be gone
            let _ = close_tx.send(());
        }
        link.writer.take().is_some()
    }
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("endpoint", &self.inner.endpoint)
            .field("state", &self.state())
            .field("generation", &self.generation())
            .finish()
    }
}

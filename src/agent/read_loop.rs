//! Per-generation read loop and its supervisor.

use std::any::Any;
use std::io;

use tokio::io::AsyncReadExt;
use tokio::sync::oneshot;

use super::Agent;
use crate::config::{CorruptionPolicy, ReconnectPolicy};
use crate::error::AgentError;
use crate::protocol::Framer;
use crate::transport::{is_transient, BoxedReader};
use crate::worker::InboundPacket;

/// Read side of one socket generation.
pub(super) struct Session {
    pub(super) reader: BoxedReader,
    pub(super) close_rx: oneshot::Receiver<()>,
    pub(super) generation: u64,
}

enum Flow {
    Continue,
    Stop,
}

/// Start the read loop for `session` plus a task that contains its panics.
pub(super) fn spawn(agent: Agent, session: Session) {
    let generation = session.generation;
    let task = tokio::spawn(run(agent.clone(), session));

    tokio::spawn(async move {
        let Err(err) = task.await else {
            return;
        };
        if !err.is_panic() {
            // cancelled by runtime shutdown
            return;
        }

        let message = panic_message(err.into_panic());
        tracing::error!(
            endpoint = %agent.endpoint(),
            generation,
            panic = %message,
            "read loop panicked"
        );
        agent
            .worker()
            .report(AgentError::ReadLoopPanic(message), agent.clone());

        let reconnect = agent.config().reconnect_policy == ReconnectPolicy::Auto;
        agent
            .socket_lost(generation, io::Error::other("read loop panicked"), reconnect)
            .await;
    });
}

async fn run(agent: Agent, session: Session) {
    let Session {
        mut reader,
        mut close_rx,
        generation,
    } = session;
    let worker = agent.worker().clone();
    let config = agent.config().clone();
    let auto_reconnect = config.reconnect_policy == ReconnectPolicy::Auto;

    let mut framer = Framer::with_max_payload(config.max_payload_size);
    let mut buf = vec![0u8; config.read_buffer_size.max(1)];

    tracing::debug!(endpoint = %agent.endpoint(), generation, "read loop started");

    loop {
        if worker.is_shutting_down() {
            tracing::debug!(endpoint = %agent.endpoint(), generation, "read loop stopped by shutdown");
            return;
        }

        let read = tokio::select! {
            biased;
            _ = &mut close_rx => {
                tracing::debug!(endpoint = %agent.endpoint(), generation, "read loop retired");
                return;
            }
            _ = worker.shutdown_signal().wait() => continue,
            result = reader.read(&mut buf) => result,
        };

        let n = match read {
            Ok(0) => {
                let eof = io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed by peer");
                agent.socket_lost(generation, eof, auto_reconnect).await;
                return;
            }
            Ok(n) => n,
            Err(error) if is_transient(&error) => {
                tracing::warn!(
                    endpoint = %agent.endpoint(),
                    generation,
                    error = %AgentError::Transient(error),
                    "retrying read"
                );
                continue;
            }
            Err(error) => {
                agent.socket_lost(generation, error, auto_reconnect).await;
                return;
            }
        };

        framer.extend(&buf[..n]);
        if let Flow::Stop = drain(&agent, &mut framer, &mut close_rx, generation).await {
            return;
        }
    }
}

/// Deliver every complete envelope in the framer.
///
/// A delivery waiting on a full queue is abandoned once the generation is
/// retired, together with whatever is still buffered.
async fn drain(
    agent: &Agent,
    framer: &mut Framer,
    close_rx: &mut oneshot::Receiver<()>,
    generation: u64,
) -> Flow {
    loop {
        match framer.next_envelope() {
            Ok(Some(envelope)) => {
                tracing::trace!(
                    endpoint = %agent.endpoint(),
                    packet_type = %envelope.packet_type(),
                    wire_len = envelope.wire_len(),
                    "envelope received"
                );
                let packet = InboundPacket::new(envelope, agent.clone());
                let delivered = tokio::select! {
                    biased;
                    _ = &mut *close_rx => {
                        tracing::debug!(
                            endpoint = %agent.endpoint(),
                            generation,
                            buffered = framer.len(),
                            "read loop retired, dropping undelivered input"
                        );
                        framer.clear();
                        return Flow::Stop;
                    }
                    result = agent.worker().deliver(packet) => result,
                };
                if delivered.is_err() {
                    tracing::warn!(endpoint = %agent.endpoint(), generation, "delivery queue closed, read loop exiting");
                    return Flow::Stop;
                }
            }
            Ok(None) => return Flow::Continue,
            Err(error) => {
                tracing::warn!(
                    endpoint = %agent.endpoint(),
                    generation,
                    error = %error,
                    "discarding corrupt input"
                );
                agent.worker().report(error, agent.clone());

                if agent.config().corruption_policy == CorruptionPolicy::Reconnect {
                    let cause = io::Error::new(io::ErrorKind::InvalidData, "protocol corruption");
                    agent.socket_lost(generation, cause, true).await;
                    return Flow::Stop;
                }
                return Flow::Continue;
            }
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

//! Reconnect path.
//!
//! The whole path runs under the agent's mutex: retire the old socket, dial
//! at a fixed interval until success or shutdown, re-announce capabilities,
//! grab once, then start the next read loop.

use std::io;

use super::{read_loop, Agent, AgentState, Link};
use crate::error::AgentError;
use crate::protocol::{OutboundPacket, PacketType};

impl Agent {
    /// Replace the current socket with a fresh one.
    ///
    /// Retries forever at the configured interval and returns only once
    /// connected or once shutdown was requested. Dial failures are logged,
    /// never returned.
    pub async fn reconnect(&self) {
        let mut link = self.inner.link.lock().await;
        self.reconnect_locked(&mut link).await;
    }

    /// Called by a read loop that hit a permanent error.
    ///
    /// Does nothing if `generation` is no longer current, which is how an
    /// explicit `close()` or `reconnect()` silences the loop it replaced.
    pub(super) async fn socket_lost(&self, generation: u64, source: io::Error, reconnect: bool) {
        let mut link = self.inner.link.lock().await;
        if link.generation != generation || link.writer.is_none() {
            tracing::debug!(
                endpoint = %self.inner.endpoint,
                generation,
                "read loop of a retired socket exiting"
            );
            return;
        }

        self.retire(&mut link);
        self.set_state(AgentState::Disconnected);
        tracing::warn!(
            endpoint = %self.inner.endpoint,
            generation,
            error = %source,
            "connection lost"
        );
        self.inner.worker.report(
            AgentError::Disconnected {
                endpoint: self.inner.endpoint.to_string(),
                source,
            },
            self.clone(),
        );

        if reconnect && !self.inner.worker.is_shutting_down() {
            self.reconnect_locked(&mut link).await;
        }
    }

    async fn reconnect_locked(&self, link: &mut Link) {
        self.retire(link);
        self.set_state(AgentState::Connecting);

        let endpoint = &self.inner.endpoint;
        let shutdown = self.inner.worker.shutdown_signal();
        let delay = self.config().reconnect_delay();
        let log_every = u64::from(self.config().reconnect_log_every.max(1));

        tracing::info!(endpoint = %endpoint, "reconnecting");

        let mut attempt: u64 = 0;
        loop {
            if shutdown.is_shutting_down() {
                self.set_state(AgentState::Disconnected);
                tracing::info!(endpoint = %endpoint, attempt, "reconnect abandoned, shutting down");
                return;
            }
            attempt += 1;

            let dialed = tokio::select! {
                result = self.inner.dialer.dial(endpoint) => result,
                _ = shutdown.wait() => continue,
            };

            match dialed {
                Ok(transport) => {
                    let session = self.install(link, transport);
                    tracing::info!(
                        endpoint = %endpoint,
                        attempt,
                        generation = session.generation,
                        "reconnected"
                    );
                    self.restore_session(link).await;
                    read_loop::spawn(self.clone(), session);
                    return;
                }
                Err(error) if attempt % log_every == 0 => {
                    tracing::warn!(endpoint = %endpoint, attempt, error = %error, "still reconnecting");
                }
                Err(error) => {
                    tracing::debug!(endpoint = %endpoint, attempt, error = %error, "reconnect attempt failed");
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.wait() => {}
            }
        }
    }

    /// Re-announce capabilities and grab once on a fresh socket.
    async fn restore_session(&self, link: &mut Link) {
        let mut packets = self.inner.worker.capabilities().packets();
        packets.push(OutboundPacket::empty(PacketType::GRAB_JOB_UNIQ));

        let result = match self.encode_all(packets) {
            Ok(batch) => link.write(&batch).await,
            Err(error) => Err(error),
        };
        if let Err(error) = result {
            // the new read loop will see a dead socket and come back here
            tracing::warn!(
                endpoint = %self.inner.endpoint,
                error = %error,
                "failed to restore session on fresh socket"
            );
        }
    }
}

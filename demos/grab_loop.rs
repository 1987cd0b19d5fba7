//! Grab Loop - a minimal worker that reverses strings.
//!
//! This example demonstrates:
//! - Connecting an agent and announcing a capability
//! - The grab / pre-sleep / noop cycle
//! - Replying on the agent a job arrived on
//! - Stopping on Ctrl-C
//!
//! # Running against a local gearmand
//!
//! ```text
//! gearmand --port 4730 &
//! RUST_LOG=gearwire=debug cargo run --example grab_loop -- 127.0.0.1:4730
//! gearman -f reverse "hello"
//! ```

use gearwire::{
    connect, AgentConfig, AgentError, InboundPacket, OutboundPacket, PacketType, WorkerContext,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("gearwire=info,grab_loop=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    let address = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:4730".to_string());

    let (worker, mut inbox) = WorkerContext::channel(AgentConfig::default());
    worker.capabilities().register("reverse", None);

    let agent = connect("tcp", &address, worker.clone()).await?;
    agent.announce().await?;
    agent.send_grab().await?;

    loop {
        tokio::select! {
            Some(packet) = inbox.packets.recv() => {
                if let Err(error) = handle(packet).await {
                    tracing::warn!(error = %error, "reply failed");
                }
            }
            Some(failure) = inbox.failures.recv() => {
                if failure.error.is_fatal_for_connection() {
                    tracing::warn!(failure = %failure, "connection lost, agent is redialing");
                } else {
                    tracing::debug!(failure = %failure, "agent reported an error");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("ctrl-c received");
                break;
            }
        }
    }

    worker.shutdown();
    agent.close().await;
    Ok(())
}

async fn handle(packet: InboundPacket) -> Result<(), AgentError> {
    let agent = packet.agent();
    match packet.packet_type() {
        PacketType::NOOP => agent.send_grab().await,
        PacketType::NO_JOB => agent.send_pre_sleep().await,
        PacketType::JOB_ASSIGN_UNIQ => {
            let args = packet.args(4);
            let [handle, function, _unique, data] = args.as_slice() else {
                tracing::warn!("malformed job assignment");
                return agent.send_grab().await;
            };
            tracing::info!(
                function = %String::from_utf8_lossy(function),
                len = data.len(),
                "job assigned"
            );

            let reversed: Vec<u8> = data.iter().rev().copied().collect();
            let complete = OutboundPacket::with_args(
                PacketType::WORK_COMPLETE,
                &[&handle[..], &reversed[..]],
            );
            agent.send(&complete).await?;
            agent.send_grab().await
        }
        other => {
            tracing::debug!(packet_type = %other, "ignored");
            Ok(())
        }
    }
}

//! Row-change notifications over the realtime WebSocket
//!
//! One background task owns the socket. `RealtimeClient::subscribe` joins a
//! channel and returns a `Subscription` that yields its notices; dropping the
//! subscription leaves the channel. The task sends a heartbeat every 30s and
//! on disconnect reconnects with exponential backoff (1s, 2s, 4s, ... capped
//! at 64s), re-joining every live channel. A refreshed access token handed
//! over with `set_token` is pushed to joined channels and used for rejoins.

pub mod protocol;
pub mod socket;

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};
use std::time::{Duration, Instant};

use anyhow::Result;
use futures::Stream;
use tokio::sync::mpsc;
use tokio::time;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt;

use crate::config::Project;
pub use protocol::{Binding, ChangeEvent, ChangeKind};
use protocol::{
    access_token_frame, heartbeat_frame, join_frame, leave_frame, parse_incoming, Incoming,
};
use socket::RealtimeSocket;

/// What a subscription yields.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    Change(ChangeEvent),
    /// The channel was joined again after a reconnect; changes in between
    /// were not delivered.
    Resubscribed,
}

enum Command {
    Join {
        topic: String,
        bindings: Vec<Binding>,
        notices: mpsc::UnboundedSender<Notice>,
    },
    Leave {
        topic: String,
    },
    SetToken {
        access_token: String,
    },
}

struct Channel {
    bindings: Vec<Binding>,
    notices: mpsc::UnboundedSender<Notice>,
    joined_before: bool,
}

/// Handle to the realtime connection task.
#[derive(Clone)]
pub struct RealtimeClient {
    cmd_tx: mpsc::UnboundedSender<Command>,
    next_channel: Arc<AtomicU64>,
}

impl RealtimeClient {
    /// Start the connection task. It runs until every clone of the client
    /// and every subscription has been dropped.
    pub fn start(project: Project, access_token: String) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        tokio::spawn(connection_loop(project, access_token, cmd_rx));
        Self {
            cmd_tx,
            next_channel: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Join a channel listening for `bindings`. Channel names only need to
    /// be readable; each subscription gets its own topic.
    pub fn subscribe(&self, name: &str, bindings: Vec<Binding>) -> Subscription {
        let n = self.next_channel.fetch_add(1, Ordering::Relaxed);
        let topic = protocol::topic(&format!("{}#{}", name, n));
        let (notices_tx, notices_rx) = mpsc::unbounded_channel();

        if self
            .cmd_tx
            .send(Command::Join {
                topic: topic.clone(),
                bindings,
                notices: notices_tx,
            })
            .is_err()
        {
            tracing::error!("Realtime task gone -- subscription {} will stay silent", topic);
        }

        Subscription {
            topic,
            notices: UnboundedReceiverStream::new(notices_rx),
            cmd_tx: self.cmd_tx.clone(),
        }
    }

    /// Use `access_token` from now on. Unchanged tokens are ignored.
    pub fn set_token(&self, access_token: String) {
        if self.cmd_tx.send(Command::SetToken { access_token }).is_err() {
            tracing::debug!("Realtime task gone, token not updated");
        }
    }
}

/// A joined channel. Leaves the channel when dropped.
pub struct Subscription {
    topic: String,
    notices: UnboundedReceiverStream<Notice>,
    cmd_tx: mpsc::UnboundedSender<Command>,
}

impl Subscription {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Next notice; `None` once the connection task has stopped.
    pub async fn recv(&mut self) -> Option<Notice> {
        self.notices.next().await
    }
}

impl Stream for Subscription {
    type Item = Notice;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Option<Notice>> {
        Pin::new(&mut self.notices).poll_next(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let _ = self.cmd_tx.send(Command::Leave {
            topic: self.topic.clone(),
        });
    }
}

/// Reason a connected session ended.
enum DisconnectReason {
    /// Every handle is gone. Do not reconnect.
    Shutdown,
    /// Error or server-initiated close. Should reconnect.
    Error(anyhow::Error),
}

struct Refs(u64);

impl Refs {
    fn next(&mut self) -> String {
        self.0 += 1;
        self.0.to_string()
    }
}

async fn connection_loop(
    project: Project,
    mut access_token: String,
    mut cmd_rx: mpsc::UnboundedReceiver<Command>,
) {
    let mut channels: HashMap<String, Channel> = HashMap::new();
    let mut refs = Refs(0);
    let mut backoff = 1u64;
    let stability_threshold = Duration::from_secs(60);

    loop {
        match RealtimeSocket::connect(&project).await {
            Ok(ws) => {
                let connected_at = Instant::now();
                match run_session(ws, &mut access_token, &mut channels, &mut cmd_rx, &mut refs).await
                {
                    DisconnectReason::Shutdown => return,
                    DisconnectReason::Error(e) => {
                        if connected_at.elapsed() >= stability_threshold {
                            backoff = 1;
                        }
                        tracing::warn!("Realtime disconnected: {:#}. Reconnecting in {}s...", e, backoff);
                    }
                }
            }
            Err(e) => {
                tracing::warn!("Realtime connect failed: {:#}. Retrying in {}s...", e, backoff);
            }
        }

        // Keep tracking joins and leaves while waiting to reconnect
        let wait = time::sleep(Duration::from_secs(backoff));
        tokio::pin!(wait);
        loop {
            tokio::select! {
                _ = &mut wait => break,
                cmd = cmd_rx.recv() => match cmd {
                    Some(Command::Join { topic, bindings, notices }) => {
                        channels.insert(topic, Channel { bindings, notices, joined_before: false });
                    }
                    Some(Command::Leave { topic }) => {
                        channels.remove(&topic);
                    }
                    Some(Command::SetToken { access_token: fresh }) => {
                        access_token = fresh;
                    }
                    None => return,
                }
            }
        }
        backoff = (backoff * 2).min(64);
    }
}

async fn join(
    ws: &mut RealtimeSocket,
    topic: &str,
    channel: &mut Channel,
    access_token: &str,
    refs: &mut Refs,
) -> Result<()> {
    ws.send_frame(&join_frame(topic, &channel.bindings, access_token, refs.next()))
        .await?;
    if channel.joined_before {
        let _ = channel.notices.send(Notice::Resubscribed);
    }
    channel.joined_before = true;
    Ok(())
}

async fn run_session(
    mut ws: RealtimeSocket,
    access_token: &mut String,
    channels: &mut HashMap<String, Channel>,
    cmd_rx: &mut mpsc::UnboundedReceiver<Command>,
    refs: &mut Refs,
) -> DisconnectReason {
    for (topic, channel) in channels.iter_mut() {
        if let Err(e) = join(&mut ws, topic, channel, access_token, refs).await {
            return DisconnectReason::Error(e.context("Channel join failed"));
        }
    }

    let mut heartbeat = time::interval(Duration::from_secs(30));
    heartbeat.tick().await; // skip first immediate tick

    loop {
        tokio::select! {
            frame = ws.recv_frame() => {
                match frame {
                    Ok(Some(text)) => dispatch(&text, channels),
                    Ok(None) => {
                        return DisconnectReason::Error(anyhow::anyhow!("WebSocket closed by server"));
                    }
                    Err(e) => {
                        return DisconnectReason::Error(e.context("WebSocket recv error"));
                    }
                }
            }
            _ = heartbeat.tick() => {
                if let Err(e) = ws.send_frame(&heartbeat_frame(refs.next())).await {
                    return DisconnectReason::Error(e.context("Heartbeat send failed"));
                }
            }
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(Command::Join { topic, bindings, notices }) => {
                        let mut channel = Channel { bindings, notices, joined_before: false };
                        let joined = join(&mut ws, &topic, &mut channel, access_token, refs).await;
                        channels.insert(topic, channel);
                        if let Err(e) = joined {
                            return DisconnectReason::Error(e.context("Channel join failed"));
                        }
                    }
                    Some(Command::SetToken { access_token: fresh }) if fresh != *access_token => {
                        tracing::debug!("Realtime token updated");
                        *access_token = fresh;
                        for topic in channels.keys() {
                            let frame = access_token_frame(topic, access_token, refs.next());
                            if let Err(e) = ws.send_frame(&frame).await {
                                return DisconnectReason::Error(e.context("Token update failed"));
                            }
                        }
                    }
                    Some(Command::SetToken { .. }) => {}
                    Some(Command::Leave { topic }) => {
                        if channels.remove(&topic).is_some() {
                            tracing::debug!("Leaving {}", topic);
                            if let Err(e) = ws.send_frame(&leave_frame(&topic, refs.next())).await {
                                return DisconnectReason::Error(e.context("Channel leave failed"));
                            }
                        }
                    }
                    None => {
                        ws.close().await;
                        return DisconnectReason::Shutdown;
                    }
                }
            }
        }
    }
}

fn dispatch(text: &str, channels: &HashMap<String, Channel>) {
    match parse_incoming(text) {
        Incoming::Change { topic, change } => match channels.get(&topic) {
            Some(channel) => {
                if channel.notices.send(Notice::Change(change)).is_err() {
                    tracing::debug!("No listener left on {}", topic);
                }
            }
            None => tracing::debug!("Change for unknown channel {}", topic),
        },
        Incoming::Reply { topic, ok: false, detail, .. } => {
            tracing::warn!("Realtime request on {} rejected: {}", topic, detail);
        }
        Incoming::ChannelClosed { topic, reason } => {
            if channels.contains_key(&topic) {
                tracing::warn!("Channel {} closed by server: {}", topic, reason);
            }
        }
        Incoming::Reply { .. } | Incoming::Other => {}
    }
}

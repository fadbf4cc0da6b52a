//! Routes inbound messages to the form flow, one lane per user.
//!
//! Each user gets a worker task fed by its own queue, so a user's messages
//! are handled strictly in arrival order while different users proceed
//! concurrently. Lanes exit after sitting idle; the next message from that
//! user spawns a fresh one.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::channels::{ChannelManager, IncomingMessage, OutgoingResponse};
use crate::forms::prompts;
use crate::forms::{FieldInput, FormFlowController, UserId};

/// How often idle sessions and finished lanes are swept.
const SWEEP_INTERVAL: Duration = Duration::from_secs(600);

/// Chat commands understood by the bot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Begin staff registration.
    Start,
    /// Begin a resident intake.
    Person,
    Cancel,
    Help,
}

impl Command {
    /// Parse the leading word of `content`. Accepts the `/cmd@botname` form.
    pub fn parse(content: &str) -> Option<Self> {
        let word = content.split_whitespace().next()?;
        let word = word.split('@').next().unwrap_or(word);
        match word.to_lowercase().as_str() {
            "/start" => Some(Self::Start),
            "/person" => Some(Self::Person),
            "/cancel" => Some(Self::Cancel),
            "/help" | "/?" => Some(Self::Help),
            _ => None,
        }
    }
}

/// Work out the reply to one message, if any.
///
/// Input outside an active form gets the help text. A repeated `/start`
/// from registered staff gets no reply at all.
pub async fn handle_message(
    flow: &FormFlowController,
    msg: &IncomingMessage,
) -> Option<OutgoingResponse> {
    let user = UserId::new(msg.user_id.as_str());

    let input = match (&msg.selection, Command::parse(&msg.content)) {
        (Some(token), _) => FieldInput::Choice(token),
        (None, Some(command)) => {
            debug!(user_id = %user, ?command, "Command received");
            return match command {
                Command::Start => flow.start_staff(&user).await,
                Command::Person => Some(flow.start_person(&user).await),
                Command::Cancel => Some(flow.cancel(&user).await),
                Command::Help => Some(OutgoingResponse::text(prompts::HELP)),
            };
        }
        (None, None) => FieldInput::Text(&msg.content),
    };

    match flow.handle_input(&user, input).await {
        Some(reply) => Some(reply),
        None => Some(OutgoingResponse::text(prompts::HELP)),
    }
}

/// A running per-user worker and the queue that feeds it.
struct Lane {
    tx: mpsc::UnboundedSender<IncomingMessage>,
    handle: JoinHandle<()>,
}

/// Reads every channel and drives the form flow.
pub struct Dispatcher {
    flow: Arc<FormFlowController>,
    channels: Arc<ChannelManager>,
    lane_idle_timeout: Duration,
    session_idle_timeout: Duration,
}

impl Dispatcher {
    pub fn new(
        flow: Arc<FormFlowController>,
        channels: ChannelManager,
        lane_idle_timeout: Duration,
        session_idle_timeout: Duration,
    ) -> Self {
        Self {
            flow,
            channels: Arc::new(channels),
            lane_idle_timeout,
            session_idle_timeout,
        }
    }

    /// Run until Ctrl+C or until every channel stream ends.
    pub async fn run(self) -> crate::error::Result<()> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for Ctrl+C: {e}");
                std::future::pending::<()>().await;
            }
            info!("Ctrl+C received, shutting down...");
        })
        .await
    }

    /// Run until `shutdown` resolves or every channel stream ends.
    ///
    /// On exit, lanes finish the messages already queued before channels
    /// are shut down.
    pub async fn run_until(self, shutdown: impl Future<Output = ()>) -> crate::error::Result<()> {
        let mut message_stream = self.channels.start_all().await?;

        let sessions = Arc::clone(self.flow.sessions());
        let session_idle_timeout = self.session_idle_timeout;
        let pruning_handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(SWEEP_INTERVAL);
            interval.tick().await; // Skip immediate first tick
            loop {
                interval.tick().await;
                sessions.prune_stale(session_idle_timeout).await;
            }
        });

        let mut sweep = tokio::time::interval(SWEEP_INTERVAL);
        sweep.tick().await;

        let mut lanes: HashMap<UserId, Lane> = HashMap::new();
        tokio::pin!(shutdown);

        info!(channels = ?self.channels.names(), "Dispatcher ready and listening");

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => break,
                _ = sweep.tick() => {
                    lanes.retain(|_, lane| !lane.handle.is_finished());
                }
                msg = message_stream.next() => match msg {
                    Some(m) => self.route(&mut lanes, m),
                    None => {
                        info!("All channel streams ended, shutting down...");
                        break;
                    }
                },
            }
        }

        pruning_handle.abort();

        // Dropping the senders lets each lane drain its queue and exit.
        let handles: Vec<JoinHandle<()>> = lanes.into_values().map(|lane| lane.handle).collect();
        info!(lanes = handles.len(), "Waiting for lanes to finish");
        for handle in handles {
            if let Err(e) = handle.await {
                warn!("Lane task failed: {e}");
            }
        }

        self.channels.shutdown_all().await;
        Ok(())
    }

    /// Queue `msg` on its sender's lane, spawning the lane if needed.
    fn route(&self, lanes: &mut HashMap<UserId, Lane>, msg: IncomingMessage) {
        let user = UserId::new(msg.user_id.as_str());

        let (msg, previous) = match lanes.remove(&user) {
            Some(lane) => match lane.tx.send(msg) {
                Ok(()) => {
                    lanes.insert(user, lane);
                    return;
                }
                // Lane went idle and closed its queue; it may still be draining.
                Err(mpsc::error::SendError(msg)) => (msg, Some(lane.handle)),
            },
            None => (msg, None),
        };

        debug!(user_id = %user, "Spawning lane");
        let (tx, rx) = mpsc::unbounded_channel();
        // Receiver is still open; this cannot fail.
        let _ = tx.send(msg);
        let handle = tokio::spawn(run_lane(
            Arc::clone(&self.flow),
            Arc::clone(&self.channels),
            rx,
            previous,
            self.lane_idle_timeout,
        ));
        lanes.insert(user, Lane { tx, handle });
    }
}

async fn run_lane(
    flow: Arc<FormFlowController>,
    channels: Arc<ChannelManager>,
    mut rx: mpsc::UnboundedReceiver<IncomingMessage>,
    previous: Option<JoinHandle<()>>,
    idle_timeout: Duration,
) {
    // Keep per-user order across a lane restart.
    if let Some(previous) = previous {
        let _ = previous.await;
    }

    loop {
        match tokio::time::timeout(idle_timeout, rx.recv()).await {
            Ok(Some(msg)) => process(&flow, &channels, &msg).await,
            Ok(None) => break,
            Err(_) => {
                rx.close();
                while let Ok(msg) = rx.try_recv() {
                    process(&flow, &channels, &msg).await;
                }
                break;
            }
        }
    }
}

async fn process(flow: &FormFlowController, channels: &ChannelManager, msg: &IncomingMessage) {
    let Some(reply) = handle_message(flow, msg).await else {
        return;
    };
    if let Err(e) = channels.respond(msg, reply).await {
        warn!(channel = %msg.channel, user_id = %msg.user_id, error = %e, "Failed to send reply");
    }
}

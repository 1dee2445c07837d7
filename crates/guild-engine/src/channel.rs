//! NATS authority channel.
//!
//! The guild cache runs on one thread and never awaits, so outbound
//! requests go through [`ChannelLink`], a non-blocking [`AuthorityLink`]
//! that hands each request to a publisher task. Inbound pushes and
//! connection changes arrive on the engine's event channel.
//!
//! # Subject Convention
//!
//! - **Requests:** published on `infrastructure.request_subject`
//! - **Pushes:** subscribed on `infrastructure.push_subject`
//!
//! Both carry JSON-encoded [`AuthorityRequest`] / [`AuthorityPush`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::StreamExt as _;
use guild_cache::config::InfrastructureConfig;
use guild_cache::{AuthorityLink, LinkError};
use guild_types::{AuthorityPush, AuthorityRequest};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::EngineError;

/// Something the engine loop must react to.
#[derive(Debug)]
pub enum EngineEvent {
    /// A push from the authority.
    Push(AuthorityPush),
    /// The authority connection came back after an outage.
    Reconnected,
}

/// Shared up/down flag for the authority connection.
#[derive(Debug, Clone, Default)]
pub struct LinkStatus {
    up: Arc<AtomicBool>,
}

impl LinkStatus {
    /// A flag starting in the given state.
    pub fn new(up: bool) -> Self {
        Self {
            up: Arc::new(AtomicBool::new(up)),
        }
    }

    /// Whether the connection is up.
    pub fn is_up(&self) -> bool {
        self.up.load(Ordering::Acquire)
    }

    /// Record a state change. Returns the previous state.
    pub fn set(&self, up: bool) -> bool {
        self.up.swap(up, Ordering::AcqRel)
    }
}

/// Non-blocking [`AuthorityLink`] feeding the publisher task.
#[derive(Debug)]
pub struct ChannelLink {
    requests: mpsc::UnboundedSender<AuthorityRequest>,
    status: LinkStatus,
}

impl ChannelLink {
    /// A link over an existing request queue.
    pub const fn new(requests: mpsc::UnboundedSender<AuthorityRequest>, status: LinkStatus) -> Self {
        Self { requests, status }
    }
}

impl AuthorityLink for ChannelLink {
    fn send(&mut self, request: AuthorityRequest) -> Result<(), LinkError> {
        if !self.status.is_up() {
            return Err(LinkError::Disconnected);
        }
        self.requests.send(request).map_err(|e| LinkError::Transport {
            message: format!("publisher stopped: {e}"),
        })
    }
}

/// Decode one push payload.
pub fn decode_push(payload: &[u8]) -> Result<AuthorityPush, EngineError> {
    Ok(serde_json::from_slice(payload)?)
}

/// A connected authority channel.
pub struct AuthorityChannel {
    /// Link handed to the guild cache.
    pub link: ChannelLink,
    /// Pushes and connection changes.
    pub events: mpsc::UnboundedReceiver<EngineEvent>,
    /// Publisher task; ends once every [`ChannelLink`] is dropped and the
    /// queue is drained.
    pub publisher: JoinHandle<()>,
}

impl std::fmt::Debug for AuthorityChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorityChannel")
            .field("link", &self.link)
            .finish_non_exhaustive()
    }
}

impl AuthorityChannel {
    /// Connect to NATS, subscribe to pushes, and start the publisher.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Nats`] if the connection or subscription
    /// fails.
    pub async fn connect(infra: &InfrastructureConfig) -> Result<Self, EngineError> {
        let status = LinkStatus::new(false);
        let (event_tx, events) = mpsc::unbounded_channel();

        let callback_status = status.clone();
        let callback_tx = event_tx.clone();
        let options = async_nats::ConnectOptions::new().event_callback(move |event| {
            let status = callback_status.clone();
            let events = callback_tx.clone();
            async move { connection_event(&event, &status, &events) }
        });

        let url = infra.nats_url.as_str();
        info!(nats_url = url, "Connecting to NATS");
        let client = options.connect(url).await.map_err(|e| EngineError::Nats {
            message: format!("failed to connect to NATS at {url}: {e}"),
        })?;
        status.set(true);

        let push_subject = infra.push_subject.clone();
        let mut pushes = client
            .subscribe(push_subject.clone())
            .await
            .map_err(|e| EngineError::Nats {
                message: format!("failed to subscribe to {push_subject}: {e}"),
            })?;
        tokio::spawn(async move {
            while let Some(msg) = pushes.next().await {
                match decode_push(&msg.payload) {
                    Ok(push) => {
                        if event_tx.send(EngineEvent::Push(push)).is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!(subject = %msg.subject, error = %e, "Undecodable authority push"),
                }
            }
            debug!("Push subscription ended");
        });
        info!(subject = %infra.push_subject, "Subscribed to authority pushes");

        let (request_tx, requests) = mpsc::unbounded_channel();
        let publisher = tokio::spawn(publish_requests(
            client,
            infra.request_subject.clone(),
            requests,
        ));

        Ok(Self {
            link: ChannelLink::new(request_tx, status),
            events,
            publisher,
        })
    }
}

/// Track the link state. Coming back up after an outage tells the engine
/// loop to replay parked writes.
fn connection_event(
    event: &async_nats::Event,
    status: &LinkStatus,
    events: &mpsc::UnboundedSender<EngineEvent>,
) {
    match event {
        async_nats::Event::Connected => {
            if !status.set(true) {
                info!("Authority channel up");
                if events.send(EngineEvent::Reconnected).is_err() {
                    debug!("Engine loop gone, reconnect not delivered");
                }
            }
        }
        async_nats::Event::Disconnected => {
            status.set(false);
            warn!("Authority channel down, castle writes will be queued");
        }
        other => debug!(event = %other, "NATS event"),
    }
}

/// Publish queued requests until the queue closes, then flush.
async fn publish_requests(
    client: async_nats::Client,
    subject: String,
    mut requests: mpsc::UnboundedReceiver<AuthorityRequest>,
) {
    while let Some(request) = requests.recv().await {
        let payload = match serde_json::to_vec(&request) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "Failed to encode authority request");
                continue;
            }
        };
        if let Err(e) = client.publish(subject.clone(), payload.into()).await {
            warn!(subject = %subject, error = %e, "Failed to publish authority request");
        }
    }
    if let Err(e) = client.flush().await {
        warn!(error = %e, "Failed to flush NATS on shutdown");
    }
    debug!("Publisher stopped");
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use guild_types::GuildId;

    #[test]
    fn link_refuses_while_down() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let status = LinkStatus::new(false);
        let mut link = ChannelLink::new(tx, status.clone());
        let request = AuthorityRequest::RequestInfo {
            guild_id: GuildId::new(3),
        };

        assert_eq!(link.send(request.clone()), Err(LinkError::Disconnected));
        assert!(rx.try_recv().is_err());

        assert!(!status.set(true));
        link.send(request.clone()).unwrap();
        assert_eq!(rx.try_recv().unwrap(), request);
    }

    #[test]
    fn link_reports_stopped_publisher() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let mut link = ChannelLink::new(tx, LinkStatus::new(true));
        let sent = link.send(AuthorityRequest::Disband {
            guild_id: GuildId::new(1),
        });
        assert!(matches!(sent, Err(LinkError::Transport { .. })));
    }

    #[test]
    fn pushes_decode_from_json() {
        let push = decode_push(br#"{"type":"no_info","guild_id":42}"#).unwrap();
        assert_eq!(
            push,
            AuthorityPush::NoInfo {
                guild_id: GuildId::new(42)
            }
        );
        assert!(matches!(
            decode_push(b"{\"type\":\"no_such_push\"}"),
            Err(EngineError::Codec { .. })
        ));
    }

    #[test]
    fn reconnect_is_reported_once_per_outage() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let status = LinkStatus::new(true);

        connection_event(&async_nats::Event::Connected, &status, &tx);
        assert!(rx.try_recv().is_err());

        connection_event(&async_nats::Event::Disconnected, &status, &tx);
        assert!(!status.is_up());
        connection_event(&async_nats::Event::Connected, &status, &tx);
        assert!(status.is_up());
        assert!(matches!(rx.try_recv(), Ok(EngineEvent::Reconnected)));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn reconnect_without_engine_loop_still_marks_link_up() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let status = LinkStatus::new(false);

        connection_event(&async_nats::Event::Connected, &status, &tx);

        assert!(status.is_up());
    }

    /// Skips when no NATS server is reachable.
    #[tokio::test]
    async fn connects_to_local_nats() {
        let infra = InfrastructureConfig::default();
        let Ok(channel) = AuthorityChannel::connect(&infra).await else {
            return;
        };
        assert!(channel.link.status.is_up());
    }
}

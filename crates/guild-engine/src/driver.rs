//! The engine loop.
//!
//! [`Engine`] owns the guild cache and its collaborators and drives it
//! from one task: authority events as they arrive, plus four periodic
//! timers (exp flush, position broadcast, siege sweep, one-shot timer
//! poll). Nothing else touches the cache, so it needs no locking.

use std::future::Future;
use std::time::Duration;

use guild_cache::{Clock, GuildConfig, GuildState, MonotonicClock, Ports, SessionTable};
use guild_types::Tick;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::adapters::{LogHooks, LogPresenter};
use crate::channel::{ChannelLink, EngineEvent};

/// Guild cache plus everything it talks to.
#[derive(Debug)]
pub struct Engine {
    state: GuildState,
    link: ChannelLink,
    sessions: SessionTable,
    presenter: LogPresenter,
    hooks: LogHooks,
    clock: MonotonicClock,
}

impl Engine {
    /// An engine with an empty cache sending through `link`.
    pub fn new(config: GuildConfig, link: ChannelLink) -> Self {
        Self {
            state: GuildState::new(config),
            link,
            sessions: SessionTable::new(),
            presenter: LogPresenter,
            hooks: LogHooks,
            clock: MonotonicClock::start(),
        }
    }

    /// The guild cache.
    pub const fn state(&self) -> &GuildState {
        &self.state
    }

    fn with_ports<R>(&mut self, f: impl FnOnce(&mut GuildState, &mut Ports<'_>, Tick) -> R) -> R {
        let now = self.clock.now();
        let mut ports = Ports {
            link: &mut self.link,
            sessions: &mut self.sessions,
            presenter: &mut self.presenter,
            hooks: &mut self.hooks,
        };
        f(&mut self.state, &mut ports, now)
    }

    /// Request persisted castle state. Called once the channel is up.
    pub fn startup(&mut self) {
        self.with_ports(|s, p, _| s.request_castle_data(p));
    }

    /// Apply one authority event.
    pub fn handle(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::Push(push) => self.with_ports(|s, p, now| s.handle_push(push, now, p)),
            EngineEvent::Reconnected => {
                let replayed = self.with_ports(|s, p, _| s.authority_reconnected(p));
                info!(replayed, "Authority reconnected");
            }
        }
    }

    /// Run until `shutdown` resolves or the event channel closes, then
    /// flush.
    pub async fn run(
        &mut self,
        events: &mut mpsc::UnboundedReceiver<EngineEvent>,
        shutdown: impl Future<Output = ()>,
    ) {
        let timers = self.state.config().timers.clone();
        let mut exp_flush = every(Duration::from_millis(timers.exp_flush_ms));
        let mut positions = every(Duration::from_millis(timers.position_broadcast_ms));
        let mut siege_sweep = every(Duration::from_secs(timers.siege_sweep_secs));
        let mut timer_poll = every(Duration::from_millis(timers.timer_poll_ms));
        tokio::pin!(shutdown);

        info!(
            exp_flush_ms = timers.exp_flush_ms,
            position_broadcast_ms = timers.position_broadcast_ms,
            siege_sweep_secs = timers.siege_sweep_secs,
            "Entering engine loop"
        );

        loop {
            tokio::select! {
                () = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
                event = events.recv() => {
                    let Some(event) = event else {
                        warn!("Authority event channel closed");
                        break;
                    };
                    self.handle(event);
                }
                _ = exp_flush.tick() => {
                    let report = self.with_ports(|s, p, _| s.flush_exp(p));
                    if report.written > 0 {
                        debug!(written = report.written, dropped = report.dropped, "Exp flushed");
                    }
                }
                _ = positions.tick() => {
                    self.with_ports(|s, p, _| s.broadcast_positions(p));
                }
                _ = siege_sweep.tick() => {
                    self.with_ports(|s, p, now| s.siege_sweep(now, p));
                }
                _ = timer_poll.tick() => {
                    self.with_ports(|s, p, now| s.run_timers(now, p));
                }
            }
        }

        self.with_ports(|s, p, _| s.shutdown(p));
    }
}

/// An interval that skips missed ticks instead of bursting.
fn every(period: Duration) -> tokio::time::Interval {
    let mut interval = tokio::time::interval(period.max(Duration::from_millis(1)));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::channel::LinkStatus;
    use guild_types::{AuthorityPush, AuthorityRequest, CastleField, CastleId, Guild, GuildId};

    fn engine(config: GuildConfig) -> (Engine, mpsc::UnboundedReceiver<AuthorityRequest>, LinkStatus) {
        let (tx, rx) = mpsc::unbounded_channel();
        let status = LinkStatus::new(true);
        (Engine::new(config, ChannelLink::new(tx, status.clone())), rx, status)
    }

    #[test]
    fn startup_requests_castle_data() {
        let config = GuildConfig::parse(
            "castles:\n  - { id: 1, map: castle_01, name: Keep, event: Agit_A01 }\n",
        )
        .unwrap();
        let (mut engine, mut requests, _) = engine(config);

        engine.startup();

        assert_eq!(
            requests.try_recv().unwrap(),
            AuthorityRequest::CastleDataLoad {
                castle_ids: vec![CastleId::new(1)]
            }
        );
    }

    #[test]
    fn reconnect_replays_queued_castle_writes() {
        let config = GuildConfig::parse(
            "castles:\n  - { id: 1, map: castle_01, name: Keep, event: Agit_A01 }\n",
        )
        .unwrap();
        let (mut engine, mut requests, status) = engine(config);

        status.set(false);
        engine
            .with_ports(|s, p, now| s.set_castle_field(CastleId::new(1), CastleField::NextTime, 9, now, p))
            .unwrap();
        assert!(requests.try_recv().is_err());
        assert_eq!(engine.state().castles().pending().len(), 1);

        status.set(true);
        engine.handle(EngineEvent::Reconnected);

        assert_eq!(
            requests.try_recv().unwrap(),
            AuthorityRequest::CastleDataSave {
                castle_id: CastleId::new(1),
                field: CastleField::NextTime,
                value: 9,
            }
        );
        assert!(engine.state().castles().pending().is_empty());
    }

    #[tokio::test]
    async fn run_applies_pushes_until_channel_closes() {
        let (mut engine, _requests, _) = engine(GuildConfig::default());
        let (tx, mut events) = mpsc::unbounded_channel();
        let guild = Guild::new(GuildId::new(7), "Seventh", 76, 20, 16);
        tx.send(EngineEvent::Push(AuthorityPush::FullInfo {
            guild: Box::new(guild),
        }))
        .unwrap();
        tx.send(EngineEvent::Push(AuthorityPush::NoInfo {
            guild_id: GuildId::new(8),
        }))
        .unwrap();
        drop(tx);

        engine.run(&mut events, std::future::pending()).await;

        assert!(engine.state().guild(GuildId::new(7)).is_some());
        assert!(engine.state().guild(GuildId::new(8)).is_none());
    }

    #[tokio::test]
    async fn run_stops_on_shutdown_signal() {
        let (mut engine, _requests, _) = engine(GuildConfig::default());
        let (_tx, mut events) = mpsc::unbounded_channel::<EngineEvent>();

        engine.run(&mut events, async {}).await;

        assert!(engine.state().guilds().is_empty());
    }
}

//! In-memory guild cache for a world-simulation process.
//!
//! The authority process owns durable guild and castle data; this crate
//! mirrors it and drives live gameplay from the mirror. Everything runs
//! on one thread through [`GuildState`]:
//!
//! - [`config`] -- YAML configuration with defaults
//! - [`state`] -- the aggregate, info-event dispatch, timers, shutdown
//! - [`reconcile`] -- full-record merges, session binding and repair
//! - [`membership`] -- invitations, leaving, positions, notice, emblem, skills
//! - [`war`] -- alliance and opposition state machine, war grace lock
//! - [`disband`] -- disband requests and the disband cascade
//! - [`castle`] -- castle fields, pending-write queue, siege scoring
//! - [`exp_cache`] -- coalescing exp write-back
//! - [`dispatch`] -- routes [`guild_types::AuthorityPush`] to handlers
//! - [`registry`] -- the guild map
//! - [`info_event`] -- callbacks waiting for a guild record
//! - [`timers`] -- one-shot deadline queue
//! - [`clock`] -- monotonic tick sources
//! - [`ports`] -- collaborator traits
//! - [`memory`] -- in-memory collaborators
//! - [`error`] -- error and rejection types

pub mod castle;
pub mod clock;
pub mod config;
pub mod disband;
pub mod dispatch;
pub mod error;
pub mod exp_cache;
pub mod info_event;
pub mod membership;
pub mod memory;
pub mod ports;
pub mod reconcile;
pub mod registry;
pub mod state;
pub mod timers;
pub mod war;

pub use castle::{CastleRegistry, PendingWrite, accrue_hold, accrue_periods, held_score};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::{ConfigError, GuildConfig};
pub use error::{GuildError, LinkError, Rejection};
pub use exp_cache::{ExpCache, ExpEntry, FlushReport};
pub use info_event::InfoEventQueue;
pub use membership::{MemberStatus, Withdrawal};
pub use memory::{HookCall, QueueLink, RecordingHooks, RecordingPresenter, SessionTable};
pub use ports::{AuthorityLink, Ports, Presenter, Session, SessionDirectory, WorldHooks};
pub use reconcile::ReconcileOutcome;
pub use registry::GuildRegistry;
pub use state::{AllianceProposal, GuildState, PendingInvite};
pub use timers::{TimerKind, TimerQueue};
pub use war::AllianceAck;

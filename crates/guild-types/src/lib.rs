//! Shared type definitions for the guild cache.
//!
//! This crate holds every type that crosses a crate or process boundary:
//!
//! - [`ids`] -- strongly-typed integer IDs and the monotonic [`Tick`]
//! - [`guild`] -- the guild aggregate, member slots, positions, scores
//! - [`relation`] -- the fixed-capacity relation table
//! - [`castle`] -- castle records and semantic field indices
//! - [`protocol`] -- requests to and pushes from the authority process
//! - [`presentation`] -- payloads for the presentation layer
//! - [`error`] -- bounded-table errors

pub mod castle;
pub mod error;
pub mod guild;
pub mod ids;
pub mod presentation;
pub mod protocol;
pub mod relation;

pub use castle::{Castle, CastleField, CastleRecord};
pub use error::TableError;
pub use guild::{
    CastleScore, Guild, GuildNotice, GuildSkill, MapPosition, MemberSlot, Permissions, Position,
};
pub use ids::{AccountId, CastleId, CharId, GuildId, InstanceId, Tick, TimerId};
pub use presentation::{GuildView, InviteOutcome, Notification};
pub use protocol::{AllianceFlags, AuthorityPush, AuthorityRequest, MemberField};
pub use relation::{RelationEntry, RelationKind, RelationTable};

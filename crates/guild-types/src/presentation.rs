//! Payloads handed to the presentation layer.
//!
//! The cache decides *what* a session must be shown; encoding it for a
//! client is somebody else's job. [`GuildView`] names a view of a whole
//! guild record; [`Notification`] is a one-off event for one session.

use serde::{Deserialize, Serialize};

use crate::guild::MapPosition;
use crate::ids::{AccountId, CharId, GuildId};
use crate::relation::RelationKind;

/// A view rendered from the full guild record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuildView {
    /// Name, level, exp, member counts.
    BasicInfo,
    /// Emblem image.
    Emblem,
    /// Full roster.
    Roster,
    /// Skill tree and points.
    SkillInfo,
    /// "You belong to this guild" banner with emblem id.
    Belonging,
    /// The guild notice.
    Notice,
    /// Alliance and opposition list.
    Relations,
    /// Position titles and permissions.
    Positions,
}

/// Reason an invitation did not go through, or that it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InviteOutcome {
    /// The target is already in a guild or busy.
    Unavailable,
    /// The target declined.
    Declined,
    /// The target joined.
    Joined,
    /// The guild has no free slot.
    GuildFull,
}

/// One-off notification for a single session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// Guild creation result.
    Created {
        /// New guild, or 0 when refused.
        guild_id: GuildId,
    },
    /// An invitation to join a guild.
    Invited {
        /// Inviting guild.
        guild_id: GuildId,
        /// Its name.
        name: String,
    },
    /// Outcome of an invitation the session sent.
    InviteResult {
        /// What happened.
        outcome: InviteOutcome,
    },
    /// An alliance proposal from another guild's member.
    AllianceProposed {
        /// Proposing guild.
        guild_id: GuildId,
        /// Proposing account.
        account_id: AccountId,
        /// Its name.
        name: String,
    },
    /// The proposal this session sent was declined.
    AllianceDeclined,
    /// A relation was removed.
    RelationRemoved {
        /// The former peer.
        guild_id: GuildId,
        /// What the relation was.
        kind: RelationKind,
    },
    /// A member logged in or out.
    MemberLogin {
        /// Member account.
        account_id: AccountId,
        /// Member character.
        char_id: CharId,
        /// Now online.
        online: bool,
    },
    /// A member left or was expelled.
    MemberLeft {
        /// Member name.
        name: String,
        /// Parting message.
        message: String,
        /// Expelled rather than left.
        expelled: bool,
    },
    /// A member's position changed.
    MemberPositionChanged {
        /// Member account.
        account_id: AccountId,
        /// Member character.
        char_id: CharId,
        /// New position index.
        position: usize,
    },
    /// A position definition changed.
    PositionChanged {
        /// Position index.
        index: usize,
    },
    /// Another member's coordinates.
    MemberCoordinates {
        /// Member account.
        account_id: AccountId,
        /// Member character.
        char_id: CharId,
        /// Where they are.
        position: MapPosition,
    },
    /// The guild was disbanded.
    Disbanded {
        /// The former guild.
        guild_id: GuildId,
    },
    /// A guild chat line.
    Chat {
        /// Sending account.
        account_id: AccountId,
        /// Text.
        text: String,
    },
    /// Plain text shown only to this session.
    Text {
        /// Message.
        text: String,
    },
}

impl Notification {
    /// Shorthand for [`Notification::Text`].
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
}

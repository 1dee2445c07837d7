//! Error types for guild cache operations.

use guild_types::{AccountId, CastleId, CharId, GuildId};

/// Why a gameplay request was refused.
///
/// Rejections are synchronous and leave every cache untouched. The
/// requester receives the reason as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rejection {
    /// The guild name is empty after trimming.
    EmptyName,
    /// The requester already belongs to a guild.
    AlreadyInGuild,
    /// The requester does not belong to a guild.
    NotInGuild,
    /// The target does not belong to a guild.
    TargetNotInGuild,
    /// Only the guild master may do this.
    NotMaster,
    /// The requester's position lacks the required permission bit.
    MissingPermission,
    /// No free member slot.
    GuildFull,
    /// The target already belongs to a guild.
    TargetInGuild,
    /// The target already has a pending invitation or proposal.
    TargetBusy,
    /// The target has no pending invitation from this guild.
    NotInvited,
    /// A guild cannot relate to itself.
    SameGuild,
    /// The two guilds are already allied.
    AlreadyAllied,
    /// The requesting guild has reached its alliance cap.
    AllyLimitReached,
    /// The target guild has reached its alliance cap.
    TargetAllyLimitReached,
    /// The requesting guild already opposes the target.
    AlreadyOpposed,
    /// The requesting guild has reached its opposition cap.
    EnemyLimitReached,
    /// The guilds are allied; the alliance must be removed first.
    AlliedWithTarget,
    /// Every relation slot is taken.
    RelationTableFull,
    /// The war grace period has not elapsed.
    WarLocked,
    /// Not allowed while a siege is running.
    SiegeActive,
    /// The guild master cannot be expelled.
    MasterProtected,
    /// Members other than the master remain.
    MembersRemain,
    /// The confirmation name does not match.
    NameMismatch,
    /// The skill cannot be raised further or is not available.
    SkillUnavailable,
    /// No skill points left.
    NoSkillPoints,
}

impl core::fmt::Display for Rejection {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let text = match self {
            Self::EmptyName => "guild name is empty",
            Self::AlreadyInGuild => "already in a guild",
            Self::NotInGuild => "not in a guild",
            Self::TargetNotInGuild => "target not in a guild",
            Self::NotMaster => "only the guild master may do this",
            Self::MissingPermission => "position lacks permission",
            Self::GuildFull => "guild is full",
            Self::TargetInGuild => "target already in a guild",
            Self::TargetBusy => "target has a pending request",
            Self::NotInvited => "no pending invitation",
            Self::SameGuild => "cannot target own guild",
            Self::AlreadyAllied => "already allied",
            Self::AllyLimitReached => "alliance limit reached",
            Self::TargetAllyLimitReached => "target alliance limit reached",
            Self::AlreadyOpposed => "already opposed",
            Self::EnemyLimitReached => "opposition limit reached",
            Self::AlliedWithTarget => "allied with target",
            Self::RelationTableFull => "relation table full",
            Self::WarLocked => "war cannot be broken yet",
            Self::SiegeActive => "not allowed during siege",
            Self::MasterProtected => "guild master cannot be removed",
            Self::MembersRemain => "members remain",
            Self::NameMismatch => "name does not match",
            Self::SkillUnavailable => "skill unavailable",
            Self::NoSkillPoints => "no skill points",
        };
        f.write_str(text)
    }
}

/// Errors from guild cache operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GuildError {
    /// The guild is not cached.
    #[error("guild not cached: {0}")]
    GuildNotFound(GuildId),

    /// No member slot holds this account/character pair.
    #[error("member {account_id}:{char_id} not found in guild {guild_id}")]
    MemberNotFound {
        /// Guild searched.
        guild_id: GuildId,
        /// Member account.
        account_id: AccountId,
        /// Member character.
        char_id: CharId,
    },

    /// No live session for this character.
    #[error("session not found: {0}")]
    SessionNotFound(CharId),

    /// The castle is not configured.
    #[error("castle not found: {0}")]
    CastleNotFound(CastleId),

    /// The castle field index is not recognized.
    #[error("unknown field index {index} for castle {castle_id}")]
    UnknownField {
        /// Castle written.
        castle_id: CastleId,
        /// The raw index.
        index: u32,
    },

    /// The position index is out of range.
    #[error("position {index} out of range for guild {guild_id}")]
    PositionOutOfRange {
        /// Guild.
        guild_id: GuildId,
        /// The index.
        index: usize,
    },

    /// No relation with the peer guild exists.
    #[error("guild {guild_id} has no relation with {peer}")]
    RelationNotFound {
        /// Guild searched.
        guild_id: GuildId,
        /// Peer guild.
        peer: GuildId,
    },

    /// The request was refused.
    #[error("rejected: {0}")]
    Rejected(Rejection),
}

impl GuildError {
    /// The rejection reason, if this is a rejection.
    pub const fn rejection(&self) -> Option<Rejection> {
        match self {
            Self::Rejected(reason) => Some(*reason),
            _ => None,
        }
    }
}

impl From<Rejection> for GuildError {
    fn from(reason: Rejection) -> Self {
        Self::Rejected(reason)
    }
}

/// Failure to hand a request to the authority channel.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LinkError {
    /// The channel is down.
    #[error("authority channel unavailable")]
    Disconnected,

    /// The request could not be encoded or enqueued.
    #[error("authority channel error: {message}")]
    Transport {
        /// Description of the failure.
        message: String,
    },
}

//! Messages exchanged with the authority process.
//!
//! [`AuthorityRequest`] flows from this process to the authority;
//! [`AuthorityPush`] flows back. Requests return immediately and the
//! matching push re-enters later through the cache's reconciliation
//! entry points. Both serialize as internally tagged JSON objects.

use serde::{Deserialize, Serialize};

use crate::castle::{CastleField, CastleRecord};
use crate::guild::{CastleScore, Guild, GuildNotice, MemberSlot, Position};
use crate::ids::{AccountId, CastleId, CharId, GuildId};
use crate::relation::RelationKind;

/// Which relation change an alliance message describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllianceFlags {
    /// Ally or enemy.
    pub kind: RelationKind,
    /// The relation is being removed rather than created.
    pub remove: bool,
    /// The authority refused the change.
    pub failed: bool,
}

impl AllianceFlags {
    const ENEMY_BIT: u8 = 0x01;
    const REMOVE_BIT: u8 = 0x08;
    const FAILURE_MASK: u8 = 0x70;
    const FAILURE_BIT: u8 = 0x10;

    /// A request to create a relation.
    pub const fn new(kind: RelationKind) -> Self {
        Self {
            kind,
            remove: false,
            failed: false,
        }
    }

    /// A request to remove a relation.
    pub const fn removal(kind: RelationKind) -> Self {
        Self {
            kind,
            remove: true,
            failed: false,
        }
    }

    /// Alliances are written on both guilds; oppositions only on the
    /// declaring guild.
    pub const fn bilateral(self) -> bool {
        matches!(self.kind, RelationKind::Ally)
    }

    /// Compact bit encoding: bit 0 enemy, bit 3 remove, bits 4-6 failure.
    pub const fn to_bits(self) -> u8 {
        let mut bits = 0;
        if matches!(self.kind, RelationKind::Enemy) {
            bits |= Self::ENEMY_BIT;
        }
        if self.remove {
            bits |= Self::REMOVE_BIT;
        }
        if self.failed {
            bits |= Self::FAILURE_BIT;
        }
        bits
    }

    /// Decode the compact bit encoding.
    pub const fn from_bits(bits: u8) -> Self {
        Self {
            kind: if bits & Self::ENEMY_BIT != 0 {
                RelationKind::Enemy
            } else {
                RelationKind::Ally
            },
            remove: bits & Self::REMOVE_BIT != 0,
            failed: bits & Self::FAILURE_MASK != 0,
        }
    }
}

/// A single member field update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "field", content = "value", rename_all = "snake_case")]
pub enum MemberField {
    /// Total exp contributed.
    Exp(u64),
    /// Position index.
    Position(usize),
}

/// Requests sent to the authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthorityRequest {
    /// Create a guild founded by `founder`.
    CreateGuild {
        /// Requested name.
        name: String,
        /// Founding member, placed in position 0.
        founder: MemberSlot,
    },
    /// Fetch the full record of a guild.
    RequestInfo {
        /// Guild to fetch.
        guild_id: GuildId,
    },
    /// Add a member to a guild.
    AddMember {
        /// Target guild.
        guild_id: GuildId,
        /// The new member.
        member: MemberSlot,
    },
    /// Remove a member (leave or expulsion).
    RemoveMember {
        /// Target guild.
        guild_id: GuildId,
        /// Member account.
        account_id: AccountId,
        /// Member character.
        char_id: CharId,
        /// Expelled rather than left.
        expelled: bool,
        /// Parting message.
        message: String,
    },
    /// Overwrite one member field.
    UpdateMemberField {
        /// Target guild.
        guild_id: GuildId,
        /// Member account.
        account_id: AccountId,
        /// Member character.
        char_id: CharId,
        /// New value.
        field: MemberField,
    },
    /// Report a member's login state and display attributes.
    MemberStatus {
        /// Target guild.
        guild_id: GuildId,
        /// Member account.
        account_id: AccountId,
        /// Member character.
        char_id: CharId,
        /// Logged in or out.
        online: bool,
        /// Base level.
        level: u16,
        /// Job class.
        class: u16,
    },
    /// Replace a position definition.
    ChangePosition {
        /// Target guild.
        guild_id: GuildId,
        /// Position index.
        index: usize,
        /// New definition.
        position: Position,
    },
    /// Replace the notice.
    ChangeNotice {
        /// Target guild.
        guild_id: GuildId,
        /// New notice.
        notice: GuildNotice,
    },
    /// Replace the emblem image.
    ChangeEmblem {
        /// Target guild.
        guild_id: GuildId,
        /// Image data.
        data: Vec<u8>,
    },
    /// Hand leadership to the named character.
    ChangeMaster {
        /// Target guild.
        guild_id: GuildId,
        /// Name of the new master.
        name: String,
    },
    /// Spend a skill point.
    SkillUp {
        /// Target guild.
        guild_id: GuildId,
        /// Skill to raise.
        skill_id: u16,
        /// Requesting account.
        account_id: AccountId,
        /// Skill's maximum level.
        max_level: u8,
    },
    /// Create or remove a relation between two guilds.
    AllianceChange {
        /// Initiating guild.
        guild_a: GuildId,
        /// Peer guild.
        guild_b: GuildId,
        /// Initiating account.
        account_a: AccountId,
        /// Peer account (0 when not applicable).
        account_b: AccountId,
        /// What changes.
        flags: AllianceFlags,
    },
    /// Disband a guild.
    Disband {
        /// Target guild.
        guild_id: GuildId,
    },
    /// Relay a guild chat line.
    Message {
        /// Target guild.
        guild_id: GuildId,
        /// Sending account.
        account_id: AccountId,
        /// Text.
        text: String,
    },
    /// Persist one castle field. Best-effort.
    CastleDataSave {
        /// Castle.
        castle_id: CastleId,
        /// Field written.
        field: CastleField,
        /// New value.
        value: u32,
    },
    /// Load persisted castle state.
    CastleDataLoad {
        /// Castles to load.
        castle_ids: Vec<CastleId>,
    },
    /// Persist a guild's siege record for one castle. Best-effort.
    SaveScore {
        /// Owning guild.
        guild_id: GuildId,
        /// Castle the record is for.
        castle_id: CastleId,
        /// The record.
        score: CastleScore,
    },
}

impl AuthorityRequest {
    /// The guild this request concerns, if any.
    pub const fn guild_id(&self) -> Option<GuildId> {
        match self {
            Self::RequestInfo { guild_id }
            | Self::AddMember { guild_id, .. }
            | Self::RemoveMember { guild_id, .. }
            | Self::UpdateMemberField { guild_id, .. }
            | Self::MemberStatus { guild_id, .. }
            | Self::ChangePosition { guild_id, .. }
            | Self::ChangeNotice { guild_id, .. }
            | Self::ChangeEmblem { guild_id, .. }
            | Self::ChangeMaster { guild_id, .. }
            | Self::SkillUp { guild_id, .. }
            | Self::Disband { guild_id }
            | Self::Message { guild_id, .. }
            | Self::SaveScore { guild_id, .. } => Some(*guild_id),
            Self::AllianceChange { guild_a, .. } => Some(*guild_a),
            Self::CreateGuild { .. }
            | Self::CastleDataSave { .. }
            | Self::CastleDataLoad { .. } => None,
        }
    }
}

/// Pushes received from the authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthorityPush {
    /// Result of a creation request. `guild_id == 0` means refused.
    CreateAck {
        /// Founder account.
        account_id: AccountId,
        /// New guild id, or 0.
        guild_id: GuildId,
    },
    /// Full guild record.
    FullInfo {
        /// The record.
        guild: Box<Guild>,
    },
    /// The authority has no record of this guild.
    NoInfo {
        /// Guild requested.
        guild_id: GuildId,
    },
    /// Result of an add-member request.
    MemberAdded {
        /// Target guild.
        guild_id: GuildId,
        /// Member account.
        account_id: AccountId,
        /// Member character.
        char_id: CharId,
        /// The add failed.
        failed: bool,
    },
    /// A member left or was expelled.
    MemberWithdrawn {
        /// Target guild.
        guild_id: GuildId,
        /// Member account.
        account_id: AccountId,
        /// Member character.
        char_id: CharId,
        /// Expelled rather than left.
        expelled: bool,
        /// Member name.
        name: String,
        /// Parting message.
        message: String,
    },
    /// A member's login state and display attributes.
    MemberStatus {
        /// Target guild.
        guild_id: GuildId,
        /// Member account.
        account_id: AccountId,
        /// Member character.
        char_id: CharId,
        /// Logged in or out.
        online: bool,
        /// Base level.
        level: u16,
        /// Job class.
        class: u16,
    },
    /// A member field changed.
    MemberFieldChanged {
        /// Target guild.
        guild_id: GuildId,
        /// Member account.
        account_id: AccountId,
        /// Member character.
        char_id: CharId,
        /// New value.
        field: MemberField,
    },
    /// A position definition changed.
    PositionChanged {
        /// Target guild.
        guild_id: GuildId,
        /// Position index.
        index: usize,
        /// New definition.
        position: Position,
    },
    /// The notice changed.
    NoticeChanged {
        /// Target guild.
        guild_id: GuildId,
        /// New notice.
        notice: GuildNotice,
    },
    /// The emblem changed.
    EmblemChanged {
        /// Target guild.
        guild_id: GuildId,
        /// New emblem version.
        emblem_id: u32,
        /// Image data.
        data: Vec<u8>,
    },
    /// Leadership changed hands.
    MasterChanged {
        /// Target guild.
        guild_id: GuildId,
        /// New master account.
        account_id: AccountId,
        /// New master character.
        char_id: CharId,
    },
    /// A skill was raised.
    SkillUpAck {
        /// Target guild.
        guild_id: GuildId,
        /// Skill raised.
        skill_id: u16,
        /// Requesting account.
        account_id: AccountId,
    },
    /// A relation change was committed (or refused).
    AllianceAck {
        /// Initiating guild.
        guild_a: GuildId,
        /// Peer guild.
        guild_b: GuildId,
        /// Initiating account.
        account_a: AccountId,
        /// Peer account.
        account_b: AccountId,
        /// What changed.
        flags: AllianceFlags,
        /// Initiating guild's name.
        name_a: String,
        /// Peer guild's name.
        name_b: String,
    },
    /// The guild was disbanded.
    Disbanded {
        /// The guild.
        guild_id: GuildId,
    },
    /// A guild chat line.
    Message {
        /// Target guild.
        guild_id: GuildId,
        /// Sending account.
        account_id: AccountId,
        /// Text.
        text: String,
    },
    /// Bulk castle state.
    CastleDataLoadAck {
        /// One record per requested castle.
        castles: Vec<CastleRecord>,
    },
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn alliance_flag_bits() {
        let opposition = AllianceFlags::new(RelationKind::Enemy);
        assert_eq!(opposition.to_bits(), 0x01);
        assert!(!opposition.bilateral());

        let remove_enemy = AllianceFlags::removal(RelationKind::Enemy);
        assert_eq!(remove_enemy.to_bits(), 0x09);

        let failed = AllianceFlags::from_bits(0x40);
        assert!(failed.failed);
        assert_eq!(failed.kind, RelationKind::Ally);
        assert!(failed.bilateral());
    }

    #[test]
    fn requests_are_tagged_json() {
        let request = AuthorityRequest::CastleDataSave {
            castle_id: CastleId::new(3),
            field: CastleField::Economy,
            value: 12,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["type"], "castle_data_save");
        assert_eq!(json["field"], "economy");
        assert_eq!(json["value"], 12);
    }

    #[test]
    fn push_parses_from_json() {
        let json = r#"{"type":"no_info","guild_id":42}"#;
        let push: AuthorityPush = serde_json::from_str(json).unwrap();
        assert_eq!(push, AuthorityPush::NoInfo { guild_id: GuildId::new(42) });
    }

    #[test]
    fn request_reports_its_guild() {
        let request = AuthorityRequest::Disband { guild_id: GuildId::new(9) };
        assert_eq!(request.guild_id(), Some(GuildId::new(9)));
        let load = AuthorityRequest::CastleDataLoad { castle_ids: Vec::new() };
        assert_eq!(load.guild_id(), None);
    }
}

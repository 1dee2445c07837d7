//! Routing of authority pushes to their handlers.

use guild_types::{AuthorityPush, Tick};
use tracing::trace;

use crate::membership::{MemberStatus, Withdrawal};
use crate::ports::Ports;
use crate::state::GuildState;
use crate::war::AllianceAck;

impl GuildState {
    /// Apply one push from the authority.
    pub fn handle_push(&mut self, push: AuthorityPush, now: Tick, ports: &mut Ports<'_>) {
        trace!(push = ?push, "Authority push");
        match push {
            AuthorityPush::CreateAck {
                account_id,
                guild_id,
            } => self.guild_created(account_id, guild_id, ports),
            AuthorityPush::FullInfo { guild } => {
                self.receive_full(*guild, now, ports);
            }
            AuthorityPush::NoInfo { guild_id } => {
                self.receive_no_info(guild_id, ports);
            }
            AuthorityPush::MemberAdded {
                guild_id,
                account_id,
                char_id,
                failed,
            } => self.member_added(guild_id, account_id, char_id, failed, ports),
            AuthorityPush::MemberWithdrawn {
                guild_id,
                account_id,
                char_id,
                expelled,
                name,
                message,
            } => self.member_withdrawn(
                Withdrawal {
                    guild_id,
                    account_id,
                    char_id,
                    expelled,
                    name,
                    message,
                },
                ports,
            ),
            AuthorityPush::MemberStatus {
                guild_id,
                account_id,
                char_id,
                online,
                level,
                class,
            } => self.receive_member_status(
                MemberStatus {
                    guild_id,
                    account_id,
                    char_id,
                    online,
                    level,
                    class,
                },
                ports,
            ),
            AuthorityPush::MemberFieldChanged {
                guild_id,
                account_id,
                char_id,
                field,
            } => self.member_field_changed(guild_id, account_id, char_id, field, ports),
            AuthorityPush::PositionChanged {
                guild_id,
                index,
                position,
            } => self.position_changed(guild_id, index, position, ports),
            AuthorityPush::NoticeChanged { guild_id, notice } => {
                self.notice_changed(guild_id, notice, ports);
            }
            AuthorityPush::EmblemChanged {
                guild_id,
                emblem_id,
                data,
            } => self.emblem_changed(guild_id, emblem_id, data, ports),
            AuthorityPush::MasterChanged {
                guild_id,
                account_id,
                char_id,
            } => self.master_changed(guild_id, account_id, char_id, ports),
            AuthorityPush::SkillUpAck {
                guild_id,
                skill_id,
                account_id,
            } => self.skill_up_ack(guild_id, skill_id, account_id, ports),
            AuthorityPush::AllianceAck {
                guild_a,
                guild_b,
                account_a,
                account_b,
                flags,
                name_a,
                name_b,
            } => self.alliance_ack(
                AllianceAck {
                    guild_a,
                    guild_b,
                    account_a,
                    account_b,
                    flags,
                    name_a,
                    name_b,
                },
                now,
                ports,
            ),
            AuthorityPush::Disbanded { guild_id } => {
                self.broken(guild_id, now, ports);
            }
            AuthorityPush::Message {
                guild_id,
                account_id,
                text,
            } => self.receive_message(guild_id, account_id, &text, ports),
            AuthorityPush::CastleDataLoadAck { castles } => self.castle_data_loaded(castles, ports),
        }
    }
}

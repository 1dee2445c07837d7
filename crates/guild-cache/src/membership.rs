//! Gameplay requests on a guild and the pushes that confirm them.
//!
//! Requests validate against the cache, send one [`AuthorityRequest`],
//! and return. Nothing is applied locally until the matching push
//! arrives; the push handlers below are the only writers.

use guild_types::{
    AccountId, AuthorityRequest, CharId, Guild, GuildId, GuildNotice, GuildView, InviteOutcome,
    MapPosition, MemberField, MemberSlot, Notification, Permissions, Position, Tick,
};
use tracing::{debug, info, warn};

use crate::error::{GuildError, Rejection};
use crate::ports::Ports;
use crate::state::{GuildState, PendingInvite};
use crate::timers::TimerKind;

/// A member left or was expelled, as reported by the authority.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Withdrawal {
    /// Guild left.
    pub guild_id: GuildId,
    /// Member account.
    pub account_id: AccountId,
    /// Member character.
    pub char_id: CharId,
    /// Expelled rather than left.
    pub expelled: bool,
    /// Member name.
    pub name: String,
    /// Parting message.
    pub message: String,
}

/// A member's login state and display attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberStatus {
    /// Guild.
    pub guild_id: GuildId,
    /// Member account.
    pub account_id: AccountId,
    /// Member character.
    pub char_id: CharId,
    /// Logged in or out.
    pub online: bool,
    /// Base level.
    pub level: u16,
    /// Job class.
    pub class: u16,
}

impl GuildState {
    /// The requester's account and cached guild.
    fn acting<'s>(
        &'s self,
        char_id: CharId,
        ports: &Ports<'_>,
    ) -> Result<(AccountId, &'s Guild), GuildError> {
        let session = ports
            .sessions
            .by_char(char_id)
            .ok_or(GuildError::SessionNotFound(char_id))?;
        if session.guild_id.is_none() {
            return Err(Rejection::NotInGuild.into());
        }
        let guild = self
            .guilds
            .get(session.guild_id)
            .ok_or(GuildError::GuildNotFound(session.guild_id))?;
        Ok((session.account_id, guild))
    }

    /// Like [`Self::acting`], but only for the guild master.
    fn acting_master<'s>(
        &'s self,
        char_id: CharId,
        ports: &Ports<'_>,
    ) -> Result<(AccountId, &'s Guild), GuildError> {
        let (account_id, guild) = self.acting(char_id, ports)?;
        if guild.member_index(account_id, char_id) != Some(0) {
            return Err(Rejection::NotMaster.into());
        }
        Ok((account_id, guild))
    }

    // -----------------------------------------------------------------------
    // Creation
    // -----------------------------------------------------------------------

    /// Ask the authority to found a guild named `name`.
    ///
    /// # Errors
    ///
    /// - [`GuildError::SessionNotFound`] for an unknown character.
    /// - [`Rejection::EmptyName`] or [`Rejection::AlreadyInGuild`].
    pub fn create_guild(&mut self, char_id: CharId, name: &str, ports: &mut Ports<'_>) -> Result<(), GuildError> {
        let session = ports
            .sessions
            .by_char(char_id)
            .ok_or(GuildError::SessionNotFound(char_id))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(Rejection::EmptyName.into());
        }
        if session.guild_id.is_some() {
            return Err(Rejection::AlreadyInGuild.into());
        }
        let mut founder = MemberSlot::new(session.account_id, char_id, session.name.clone());
        founder.level = session.level;
        founder.class = session.class;
        founder.online = true;
        founder.position = 0;
        ports.send(AuthorityRequest::CreateGuild {
            name: name.to_owned(),
            founder,
        });
        Ok(())
    }

    /// The authority answered a creation request. `GuildId::NONE` means
    /// refused.
    pub fn guild_created(&mut self, account_id: AccountId, guild_id: GuildId, ports: &mut Ports<'_>) {
        let Some(char_id) = ports.sessions.by_account(account_id).map(|s| s.char_id) else {
            debug!(account_id = %account_id, "Creation ack for absent founder");
            return;
        };
        if guild_id.is_some() {
            if let Some(session) = ports.sessions.by_char_mut(char_id) {
                session.guild_id = guild_id;
                session.is_master = true;
            }
            info!(guild_id = %guild_id, account_id = %account_id, "Guild founded");
            self.request_info(guild_id, ports);
        }
        ports.presenter.notify(char_id, Notification::Created { guild_id });
    }

    // -----------------------------------------------------------------------
    // Invitations
    // -----------------------------------------------------------------------

    /// Invite `target_char` into the requester's guild.
    ///
    /// # Errors
    ///
    /// - [`GuildError::SessionNotFound`] for either character.
    /// - [`GuildError::Rejected`] if the requester lacks the invite bit,
    ///   the guild is full, or the target is unavailable.
    pub fn invite(&mut self, char_id: CharId, target_char: CharId, ports: &mut Ports<'_>) -> Result<(), GuildError> {
        let (account_id, guild) = self.acting(char_id, ports)?;
        let allowed = guild.member_index(account_id, char_id) == Some(0)
            || guild.position_of(account_id, char_id).is_some_and(Position::can_invite);
        if !allowed {
            return Err(Rejection::MissingPermission.into());
        }
        if guild.first_free_slot().is_none() {
            return Err(Rejection::GuildFull.into());
        }
        let target = ports
            .sessions
            .by_char(target_char)
            .ok_or(GuildError::SessionNotFound(target_char))?;
        if target.guild_id.is_some() {
            return Err(Rejection::TargetInGuild.into());
        }
        if self.invites.contains_key(&target_char) {
            return Err(Rejection::TargetBusy.into());
        }
        let (guild_id, name) = (guild.id, guild.name.clone());
        self.invites.insert(
            target_char,
            PendingInvite {
                guild_id,
                inviter_account: account_id,
                inviter_char: char_id,
            },
        );
        ports
            .presenter
            .notify(target_char, Notification::Invited { guild_id, name });
        Ok(())
    }

    /// Answer an invitation. Accepting sends the add request; the
    /// invitation stays pending until the authority confirms.
    ///
    /// # Errors
    ///
    /// - [`Rejection::NotInvited`] without a matching invitation.
    /// - [`Rejection::GuildFull`] or [`Rejection::TargetInGuild`] if the
    ///   situation changed since the invitation.
    pub fn reply_invite(
        &mut self,
        target_char: CharId,
        guild_id: GuildId,
        accept: bool,
        ports: &mut Ports<'_>,
    ) -> Result<(), GuildError> {
        let invite = match self.invites.get(&target_char) {
            Some(invite) if invite.guild_id == guild_id => *invite,
            _ => return Err(Rejection::NotInvited.into()),
        };
        if !accept {
            self.invites.remove(&target_char);
            invite_result(ports, invite.inviter_char, InviteOutcome::Declined);
            return Ok(());
        }

        let Some(target) = ports.sessions.by_char(target_char) else {
            self.invites.remove(&target_char);
            return Err(GuildError::SessionNotFound(target_char));
        };
        if target.guild_id.is_some() {
            self.invites.remove(&target_char);
            invite_result(ports, invite.inviter_char, InviteOutcome::Unavailable);
            return Err(Rejection::TargetInGuild.into());
        }
        let mut member = MemberSlot::new(target.account_id, target_char, target.name.clone());
        member.level = target.level;
        member.class = target.class;
        member.online = true;

        let Some(guild) = self.guilds.get(guild_id) else {
            self.invites.remove(&target_char);
            return Err(GuildError::GuildNotFound(guild_id));
        };
        if guild.first_free_slot().is_none() {
            self.invites.remove(&target_char);
            invite_result(ports, invite.inviter_char, InviteOutcome::GuildFull);
            return Err(Rejection::GuildFull.into());
        }
        member.position = guild.positions.len().saturating_sub(1);
        ports.send(AuthorityRequest::AddMember { guild_id, member });
        Ok(())
    }

    /// The authority answered an add-member request.
    ///
    /// A success for a session that is gone or was never invited is
    /// undone with a removal request.
    pub fn member_added(
        &mut self,
        guild_id: GuildId,
        account_id: AccountId,
        char_id: CharId,
        failed: bool,
        ports: &mut Ports<'_>,
    ) {
        let invited = self
            .invites
            .get(&char_id)
            .filter(|i| i.guild_id == guild_id)
            .copied();
        let present = ports
            .sessions
            .by_char(char_id)
            .is_some_and(|s| s.account_id == account_id && s.guild_id.is_none());
        let Some(invite) = invited.filter(|_| present) else {
            if !failed {
                warn!(guild_id = %guild_id, char_id = %char_id, "Unexpected member add, undoing");
                ports.send(AuthorityRequest::RemoveMember {
                    guild_id,
                    account_id,
                    char_id,
                    expelled: false,
                    message: "** Data Error **".to_owned(),
                });
            }
            return;
        };
        self.invites.remove(&char_id);

        if failed {
            ports.presenter.notify(
                invite.inviter_char,
                Notification::InviteResult {
                    outcome: InviteOutcome::GuildFull,
                },
            );
            return;
        }

        let emblem_id = self.guilds.get(guild_id).map_or(0, |g| g.emblem_id);
        if let Some(session) = ports.sessions.by_char_mut(char_id) {
            session.guild_id = guild_id;
            session.emblem_id = emblem_id;
        }
        ports.presenter.notify(
            invite.inviter_char,
            Notification::InviteResult {
                outcome: InviteOutcome::Joined,
            },
        );
        if let Some(guild) = self.guilds.get(guild_id) {
            ports.presenter.show(char_id, GuildView::Belonging, guild);
            ports.presenter.show(char_id, GuildView::Notice, guild);
        }
        info!(guild_id = %guild_id, char_id = %char_id, "Member joined");
    }

    // -----------------------------------------------------------------------
    // Leaving
    // -----------------------------------------------------------------------

    /// Leave the requester's guild.
    ///
    /// # Errors
    ///
    /// - [`Rejection::MasterProtected`] for the master (disband instead).
    /// - [`Rejection::SiegeActive`] on a castle map during a siege.
    pub fn leave(&mut self, char_id: CharId, ports: &mut Ports<'_>) -> Result<(), GuildError> {
        let (account_id, guild) = self.acting(char_id, ports)?;
        if guild.member_index(account_id, char_id) == Some(0) {
            return Err(Rejection::MasterProtected.into());
        }
        let on_castle_map = ports.sessions.by_char(char_id).is_some_and(|s| s.on_castle_map);
        if on_castle_map && self.castles.any_siege_active() {
            return Err(Rejection::SiegeActive.into());
        }
        let guild_id = guild.id;
        ports.send(AuthorityRequest::RemoveMember {
            guild_id,
            account_id,
            char_id,
            expelled: false,
            message: String::new(),
        });
        Ok(())
    }

    /// Expel a member from the requester's guild.
    ///
    /// # Errors
    ///
    /// - [`Rejection::MissingPermission`] without the expel bit.
    /// - [`GuildError::MemberNotFound`] if the target is not a member.
    /// - [`Rejection::MasterProtected`] for the master.
    pub fn expel(
        &mut self,
        char_id: CharId,
        target_account: AccountId,
        target_char: CharId,
        message: &str,
        ports: &mut Ports<'_>,
    ) -> Result<(), GuildError> {
        let (account_id, guild) = self.acting(char_id, ports)?;
        let allowed = guild.member_index(account_id, char_id) == Some(0)
            || guild.position_of(account_id, char_id).is_some_and(Position::can_expel);
        if !allowed {
            return Err(Rejection::MissingPermission.into());
        }
        let guild_id = guild.id;
        match guild.member_index(target_account, target_char) {
            None => {
                return Err(GuildError::MemberNotFound {
                    guild_id,
                    account_id: target_account,
                    char_id: target_char,
                });
            }
            Some(0) => return Err(Rejection::MasterProtected.into()),
            Some(_) => {}
        }
        ports.send(AuthorityRequest::RemoveMember {
            guild_id,
            account_id: target_account,
            char_id: target_char,
            expelled: true,
            message: message.to_owned(),
        });
        Ok(())
    }

    /// The authority removed a member.
    pub fn member_withdrawn(&mut self, withdrawal: Withdrawal, ports: &mut Ports<'_>) {
        let Withdrawal {
            guild_id,
            account_id,
            char_id,
            expelled,
            name,
            message,
        } = withdrawal;
        if let Some(guild) = self.guilds.get_mut(guild_id) {
            let left = Notification::MemberLeft {
                name,
                message,
                expelled,
            };
            ports.notify_all(guild, &left);
            match guild.member_mut(account_id, char_id) {
                Some(slot) => *slot = MemberSlot::default(),
                None => debug!(guild_id = %guild_id, char_id = %char_id, "Withdrawn member not on roster"),
            }
            guild.recompute_presence();
            ports.show_all(guild, GuildView::Roster);
        }
        self.detach_session(guild_id, char_id, ports);
        info!(guild_id = %guild_id, char_id = %char_id, expelled, "Member withdrawn");
    }

    // -----------------------------------------------------------------------
    // Presence
    // -----------------------------------------------------------------------

    /// Report a login or logout to the authority. Logging out unbinds the
    /// member slot.
    pub fn send_member_status(&mut self, char_id: CharId, online: bool, ports: &mut Ports<'_>) {
        let Some(session) = ports.sessions.by_char(char_id) else {
            return;
        };
        if session.guild_id.is_none() {
            return;
        }
        let request = AuthorityRequest::MemberStatus {
            guild_id: session.guild_id,
            account_id: session.account_id,
            char_id,
            online,
            level: session.level,
            class: session.class,
        };
        let (guild_id, account_id) = (session.guild_id, session.account_id);
        ports.send(request);
        if !online {
            if let Some(slot) = self
                .guilds
                .get_mut(guild_id)
                .and_then(|g| g.member_mut(account_id, char_id))
            {
                slot.bound = false;
            }
        }
    }

    /// Apply a member status push.
    ///
    /// A status for a member missing from the roster detaches the session
    /// that still claims the guild.
    pub fn receive_member_status(&mut self, status: MemberStatus, ports: &mut Ports<'_>) {
        let MemberStatus {
            guild_id,
            account_id,
            char_id,
            online,
            level,
            class,
        } = status;
        let Some(guild) = self.guilds.get_mut(guild_id) else {
            return;
        };
        let session_here = ports
            .sessions
            .by_char(char_id)
            .is_some_and(|s| s.account_id == account_id && s.guild_id == guild_id);
        let Some(slot) = guild.member_mut(account_id, char_id) else {
            if session_here {
                warn!(guild_id = %guild_id, char_id = %char_id, "Status for member not on roster");
                self.detach_session(guild_id, char_id, ports);
            }
            return;
        };
        let was_online = slot.online;
        slot.online = online;
        slot.level = level;
        slot.class = class;
        slot.bound = online && session_here;
        guild.recompute_presence();

        if was_online != online {
            let login = Notification::MemberLogin {
                account_id,
                char_id,
                online,
            };
            ports.notify_all(guild, &login);
        }
        if online && session_here {
            exchange_coordinates(guild, char_id, ports);
        }
    }

    /// Send the coordinates of every member who moved since the last
    /// broadcast to guildmates on the same map. Returns how many moved.
    pub fn broadcast_positions(&mut self, ports: &mut Ports<'_>) -> usize {
        let mut total: usize = 0;
        for guild in self.guilds.iter_mut() {
            let mut moved: Vec<(AccountId, CharId, MapPosition)> = Vec::new();
            for member in guild.members.iter_mut().filter(|m| m.bound && !m.is_empty()) {
                let Some(session) = ports.sessions.by_char(member.char_id) else {
                    continue;
                };
                if member.last_position.as_ref() == Some(&session.position) {
                    continue;
                }
                member.last_position = Some(session.position.clone());
                moved.push((member.account_id, member.char_id, session.position.clone()));
            }
            total = total.saturating_add(moved.len());
            for (account_id, char_id, position) in moved {
                for other in guild.bound_chars() {
                    let same_map = other != char_id
                        && ports
                            .sessions
                            .by_char(other)
                            .is_some_and(|s| s.position.map == position.map);
                    if same_map {
                        ports.presenter.notify(
                            other,
                            Notification::MemberCoordinates {
                                account_id,
                                char_id,
                                position: position.clone(),
                            },
                        );
                    }
                }
            }
        }
        total
    }

    // -----------------------------------------------------------------------
    // Positions
    // -----------------------------------------------------------------------

    /// Redefine position `index`. The exp tax is clamped to the configured
    /// cap and unknown permission bits are dropped.
    ///
    /// # Errors
    ///
    /// - [`Rejection::NotMaster`] for anyone but the master.
    /// - [`GuildError::PositionOutOfRange`] for a bad index.
    pub fn change_position(
        &mut self,
        char_id: CharId,
        index: usize,
        mut position: Position,
        ports: &mut Ports<'_>,
    ) -> Result<(), GuildError> {
        let (_, guild) = self.acting_master(char_id, ports)?;
        let guild_id = guild.id;
        if index >= guild.positions.len() {
            return Err(GuildError::PositionOutOfRange { guild_id, index });
        }
        position.exp_tax = position.exp_tax.min(self.config.limits.exp_tax_cap);
        position.permissions = Permissions::from_bits(position.permissions.bits());
        ports.send(AuthorityRequest::ChangePosition {
            guild_id,
            index,
            position,
        });
        Ok(())
    }

    /// The authority redefined a position.
    pub fn position_changed(&mut self, guild_id: GuildId, index: usize, position: Position, ports: &mut Ports<'_>) {
        let Some(guild) = self.guilds.get_mut(guild_id) else {
            return;
        };
        let Some(slot) = guild.positions.get_mut(index) else {
            warn!(guild_id = %guild_id, index, "Position index out of range");
            return;
        };
        *slot = position;
        ports.notify_all(guild, &Notification::PositionChanged { index });
        ports.show_all(guild, GuildView::Positions);
    }

    /// Move a member to another position.
    ///
    /// # Errors
    ///
    /// - [`Rejection::NotMaster`] for anyone but the master.
    /// - [`GuildError::PositionOutOfRange`] for a bad index.
    /// - [`GuildError::MemberNotFound`] if the target is not a member.
    pub fn change_member_position(
        &mut self,
        char_id: CharId,
        target_account: AccountId,
        target_char: CharId,
        index: usize,
        ports: &mut Ports<'_>,
    ) -> Result<(), GuildError> {
        let (_, guild) = self.acting_master(char_id, ports)?;
        let guild_id = guild.id;
        if index >= guild.positions.len() {
            return Err(GuildError::PositionOutOfRange { guild_id, index });
        }
        if guild.member(target_account, target_char).is_none() {
            return Err(GuildError::MemberNotFound {
                guild_id,
                account_id: target_account,
                char_id: target_char,
            });
        }
        ports.send(AuthorityRequest::UpdateMemberField {
            guild_id,
            account_id: target_account,
            char_id: target_char,
            field: MemberField::Position(index),
        });
        Ok(())
    }

    /// The authority changed a member field.
    pub fn member_field_changed(
        &mut self,
        guild_id: GuildId,
        account_id: AccountId,
        char_id: CharId,
        field: MemberField,
        ports: &mut Ports<'_>,
    ) {
        let Some(guild) = self.guilds.get_mut(guild_id) else {
            return;
        };
        let Some(slot) = guild.member_mut(account_id, char_id) else {
            debug!(guild_id = %guild_id, char_id = %char_id, "Field change for unknown member");
            return;
        };
        match field {
            MemberField::Exp(exp) => slot.exp = exp,
            MemberField::Position(position) => {
                slot.position = position;
                let changed = Notification::MemberPositionChanged {
                    account_id,
                    char_id,
                    position,
                };
                ports.notify_all(guild, &changed);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Notice, emblem, master
    // -----------------------------------------------------------------------

    /// Replace the guild notice.
    ///
    /// # Errors
    ///
    /// Returns [`Rejection::NotMaster`] for anyone but the master.
    pub fn change_notice(&mut self, char_id: CharId, notice: GuildNotice, ports: &mut Ports<'_>) -> Result<(), GuildError> {
        let (_, guild) = self.acting_master(char_id, ports)?;
        let guild_id = guild.id;
        ports.send(AuthorityRequest::ChangeNotice { guild_id, notice });
        Ok(())
    }

    /// The authority replaced the notice.
    pub fn notice_changed(&mut self, guild_id: GuildId, notice: GuildNotice, ports: &mut Ports<'_>) {
        if let Some(guild) = self.guilds.get_mut(guild_id) {
            guild.notice = notice;
            ports.show_all(guild, GuildView::Notice);
        }
    }

    /// Replace the guild emblem.
    ///
    /// # Errors
    ///
    /// - [`Rejection::NotMaster`] for anyone but the master.
    /// - [`Rejection::SkillUnavailable`] when the glory skill is required
    ///   and not learned.
    pub fn change_emblem(&mut self, char_id: CharId, data: Vec<u8>, ports: &mut Ports<'_>) -> Result<(), GuildError> {
        let (_, guild) = self.acting_master(char_id, ports)?;
        let skills = &self.config.skills;
        if skills.emblem_requires_glory && guild.skill_level(skills.glory_skill_id) == 0 {
            return Err(Rejection::SkillUnavailable.into());
        }
        let guild_id = guild.id;
        ports.send(AuthorityRequest::ChangeEmblem { guild_id, data });
        Ok(())
    }

    /// The authority replaced the emblem.
    pub fn emblem_changed(&mut self, guild_id: GuildId, emblem_id: u32, data: Vec<u8>, ports: &mut Ports<'_>) {
        let Some(guild) = self.guilds.get_mut(guild_id) else {
            return;
        };
        guild.emblem_id = emblem_id;
        guild.emblem = data;
        for char_id in guild.bound_chars() {
            if let Some(session) = ports.sessions.by_char_mut(char_id) {
                session.emblem_id = emblem_id;
            }
        }
        ports.show_all(guild, GuildView::Belonging);
        ports.show_all(guild, GuildView::Emblem);
        for castle_id in self.castles.owned_by(guild_id) {
            ports.hooks.castle_emblem_changed(castle_id, emblem_id);
        }
    }

    /// Hand leadership to the member named `name`.
    ///
    /// # Errors
    ///
    /// - [`Rejection::NotMaster`] for anyone but the master.
    /// - [`Rejection::TargetNotInGuild`] if no member has that name.
    pub fn change_master(&mut self, char_id: CharId, name: &str, ports: &mut Ports<'_>) -> Result<(), GuildError> {
        let (_, guild) = self.acting_master(char_id, ports)?;
        let guild_id = guild.id;
        match guild.member_index_by_name(name) {
            None => Err(Rejection::TargetNotInGuild.into()),
            Some(0) => Ok(()),
            Some(_) => {
                ports.send(AuthorityRequest::ChangeMaster {
                    guild_id,
                    name: name.to_owned(),
                });
                Ok(())
            }
        }
    }

    /// The authority handed leadership to another member.
    pub fn master_changed(&mut self, guild_id: GuildId, account_id: AccountId, char_id: CharId, ports: &mut Ports<'_>) {
        let Some(guild) = self.guilds.get_mut(guild_id) else {
            return;
        };
        let Some(index) = guild.member_index(account_id, char_id) else {
            warn!(guild_id = %guild_id, char_id = %char_id, "New master not on roster");
            return;
        };
        let previous = guild.members.first().map(|m| m.char_id);
        if !guild.promote_to_master(index) {
            return;
        }
        if let Some(session) = previous.and_then(|c| ports.sessions.by_char_mut(c)) {
            session.is_master = false;
        }
        if let Some(session) = ports.sessions.by_char_mut(char_id) {
            session.is_master = true;
        }
        let text = format!(
            "The Guild Master of [{}] has been changed to [{}]",
            guild.name, guild.master
        );
        ports.presenter.broadcast(&text);
        ports.show_all(guild, GuildView::Roster);
        ports.show_all(guild, GuildView::BasicInfo);
        info!(guild_id = %guild_id, master = %guild.master, "Guild master changed");
    }

    // -----------------------------------------------------------------------
    // Skills
    // -----------------------------------------------------------------------

    /// Spend a skill point on `skill_id`.
    ///
    /// # Errors
    ///
    /// - [`Rejection::NotMaster`] for anyone but the master.
    /// - [`Rejection::NoSkillPoints`] or [`Rejection::SkillUnavailable`].
    pub fn skill_up(&mut self, char_id: CharId, skill_id: u16, max_level: u8, ports: &mut Ports<'_>) -> Result<(), GuildError> {
        let (account_id, guild) = self.acting_master(char_id, ports)?;
        if guild.skill_point == 0 {
            return Err(Rejection::NoSkillPoints.into());
        }
        if guild.skill_level(skill_id) >= max_level {
            return Err(Rejection::SkillUnavailable.into());
        }
        let guild_id = guild.id;
        ports.send(AuthorityRequest::SkillUp {
            guild_id,
            skill_id,
            account_id,
            max_level,
        });
        Ok(())
    }

    /// The authority raised a skill.
    pub fn skill_up_ack(&mut self, guild_id: GuildId, skill_id: u16, account_id: AccountId, ports: &mut Ports<'_>) {
        let Some(guild) = self.guilds.get(guild_id) else {
            return;
        };
        debug!(guild_id = %guild_id, skill_id, account_id = %account_id, "Guild skill raised");
        ports.show_all(guild, GuildView::SkillInfo);
    }

    fn cooldown_slot(&self, skill_id: u16) -> usize {
        if self.config.skills.separate_cooldowns {
            usize::from(skill_id.saturating_sub(self.config.skills.first_skill_id))
        } else {
            0
        }
    }

    /// Put a guild skill on cooldown for `duration_ms`, replacing any
    /// cooldown already running in its slot.
    pub fn block_skill(&mut self, guild_id: GuildId, skill_id: u16, duration_ms: u64, now: Tick) -> bool {
        let slot = self.cooldown_slot(skill_id);
        let Some(guild) = self.guilds.get_mut(guild_id) else {
            return false;
        };
        let Some(stored) = guild.skill_timers.get_mut(slot) else {
            warn!(guild_id = %guild_id, skill_id, slot, "No cooldown slot for skill");
            return false;
        };
        if let Some(previous) = stored.take() {
            self.timers.cancel(previous);
        }
        let id = self.timers.schedule(
            now.plus_millis(duration_ms),
            TimerKind::SkillCooldown {
                guild_id,
                slot,
                skill_id,
            },
        );
        *stored = Some(id);
        true
    }

    /// Whether a guild skill is cooling down.
    pub fn is_skill_blocked(&self, guild_id: GuildId, skill_id: u16) -> bool {
        let slot = self.cooldown_slot(skill_id);
        self.guilds
            .get(guild_id)
            .and_then(|g| g.skill_timers.get(slot))
            .is_some_and(Option::is_some)
    }

    // -----------------------------------------------------------------------
    // Chat
    // -----------------------------------------------------------------------

    /// Send a guild chat line. Local members see it at once; the
    /// authority relays it to other processes.
    ///
    /// # Errors
    ///
    /// Returns [`Rejection::NotInGuild`] for a guildless requester.
    pub fn send_message(&mut self, char_id: CharId, text: &str, ports: &mut Ports<'_>) -> Result<(), GuildError> {
        let (account_id, guild) = self.acting(char_id, ports)?;
        let guild_id = guild.id;
        ports.send(AuthorityRequest::Message {
            guild_id,
            account_id,
            text: text.to_owned(),
        });
        self.receive_message(guild_id, account_id, text, ports);
        Ok(())
    }

    /// Show a guild chat line to every attached member.
    pub fn receive_message(&mut self, guild_id: GuildId, account_id: AccountId, text: &str, ports: &mut Ports<'_>) {
        if let Some(guild) = self.guilds.get(guild_id) {
            let chat = Notification::Chat {
                account_id,
                text: text.to_owned(),
            };
            ports.notify_all(guild, &chat);
        }
    }
}

fn invite_result(ports: &mut Ports<'_>, inviter: CharId, outcome: InviteOutcome) {
    ports
        .presenter
        .notify(inviter, Notification::InviteResult { outcome });
}

/// Swap coordinates between a member who just came online and every
/// guildmate on the same map.
fn exchange_coordinates(guild: &Guild, char_id: CharId, ports: &mut Ports<'_>) {
    let Some(arriving) = ports.sessions.by_char(char_id) else {
        return;
    };
    let (account_id, here) = (arriving.account_id, arriving.position.clone());
    for other in guild.bound_members().filter(|m| m.char_id != char_id) {
        let Some(there) = ports
            .sessions
            .by_char(other.char_id)
            .map(|s| s.position.clone())
            .filter(|p| p.map == here.map)
        else {
            continue;
        };
        ports.presenter.notify(
            char_id,
            Notification::MemberCoordinates {
                account_id: other.account_id,
                char_id: other.char_id,
                position: there,
            },
        );
        ports.presenter.notify(
            other.char_id,
            Notification::MemberCoordinates {
                account_id,
                char_id,
                position: here.clone(),
            },
        );
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::config::GuildConfig;
    use crate::memory::{QueueLink, RecordingHooks, RecordingPresenter, SessionTable};
    use crate::ports::{Session, SessionDirectory};

    struct Rig {
        link: QueueLink,
        sessions: SessionTable,
        presenter: RecordingPresenter,
        hooks: RecordingHooks,
    }

    impl Rig {
        fn new() -> Self {
            Self {
                link: QueueLink::new(),
                sessions: SessionTable::new(),
                presenter: RecordingPresenter::new(),
                hooks: RecordingHooks::new(),
            }
        }

        fn ports(&mut self) -> Ports<'_> {
            Ports {
                link: &mut self.link,
                sessions: &mut self.sessions,
                presenter: &mut self.presenter,
                hooks: &mut self.hooks,
            }
        }

        fn login(&mut self, id: u32, name: &str, guild: u32) {
            let mut s = Session::new(AccountId::new(id), CharId::new(id), name);
            s.guild_id = GuildId::new(guild);
            self.sessions.insert(s);
        }
    }

    fn seeded() -> GuildState {
        let mut state = GuildState::new(GuildConfig::default());
        let mut g = Guild::new(GuildId::new(1), "Valkyrie", 4, 4, 4);
        g.master = "Ayla".to_owned();
        g.skill_timers = vec![None; 15];
        g.positions[1] = Position {
            name: "Recruiter".to_owned(),
            permissions: Permissions::INVITE,
            exp_tax: 10,
        };
        let mut master = MemberSlot::new(AccountId::new(1), CharId::new(1), "Ayla");
        master.bound = true;
        g.add_member(master).unwrap();
        let mut recruiter = MemberSlot::new(AccountId::new(2), CharId::new(2), "Bren");
        recruiter.position = 1;
        recruiter.bound = true;
        g.add_member(recruiter).unwrap();
        state.guilds.insert(g);
        state
    }

    // -----------------------------------------------------------------------
    // Creation
    // -----------------------------------------------------------------------

    #[test]
    fn create_rejects_blank_names() {
        let mut state = seeded();
        let mut rig = Rig::new();
        rig.login(9, "Newbie", 0);

        let err = state.create_guild(CharId::new(9), "   ", &mut rig.ports()).unwrap_err();
        assert_eq!(err.rejection(), Some(Rejection::EmptyName));
        state.create_guild(CharId::new(9), " Dawn ", &mut rig.ports()).unwrap();
        assert!(matches!(
            rig.link.sent.as_slice(),
            [AuthorityRequest::CreateGuild { name, founder }] if name == "Dawn" && founder.position == 0
        ));
    }

    #[test]
    fn creation_ack_assigns_guild() {
        let mut state = seeded();
        let mut rig = Rig::new();
        rig.login(9, "Newbie", 0);

        state.guild_created(AccountId::new(9), GuildId::new(5), &mut rig.ports());
        let session = rig.sessions.by_char(CharId::new(9)).unwrap();
        assert_eq!(session.guild_id, GuildId::new(5));
        assert!(session.is_master);
        assert!(matches!(rig.link.sent.as_slice(), [AuthorityRequest::RequestInfo { .. }]));
    }

    // -----------------------------------------------------------------------
    // Invitations
    // -----------------------------------------------------------------------

    #[test]
    fn invite_flow_sends_add_member() {
        let mut state = seeded();
        let mut rig = Rig::new();
        rig.login(2, "Bren", 1);
        rig.login(7, "Cato", 0);

        state.invite(CharId::new(2), CharId::new(7), &mut rig.ports()).unwrap();
        let busy = state.invite(CharId::new(2), CharId::new(7), &mut rig.ports());
        assert_eq!(busy.unwrap_err().rejection(), Some(Rejection::TargetBusy));

        state
            .reply_invite(CharId::new(7), GuildId::new(1), true, &mut rig.ports())
            .unwrap();
        assert!(matches!(
            rig.link.sent.last(),
            Some(AuthorityRequest::AddMember { member, .. }) if member.char_id == CharId::new(7)
        ));

        state.member_added(GuildId::new(1), AccountId::new(7), CharId::new(7), false, &mut rig.ports());
        assert_eq!(rig.sessions.by_char(CharId::new(7)).unwrap().guild_id, GuildId::new(1));
        assert!(state.pending_invite(CharId::new(7)).is_none());
    }

    #[test]
    fn uninvited_add_is_undone() {
        let mut state = seeded();
        let mut rig = Rig::new();
        rig.login(7, "Cato", 0);

        state.member_added(GuildId::new(1), AccountId::new(7), CharId::new(7), false, &mut rig.ports());
        assert!(matches!(
            rig.link.sent.as_slice(),
            [AuthorityRequest::RemoveMember { message, .. }] if message == "** Data Error **"
        ));
        assert!(rig.sessions.by_char(CharId::new(7)).unwrap().guild_id.is_none());
    }

    // -----------------------------------------------------------------------
    // Leaving
    // -----------------------------------------------------------------------

    #[test]
    fn master_cannot_be_expelled() {
        let mut state = seeded();
        let mut rig = Rig::new();
        rig.login(1, "Ayla", 1);

        let err = state
            .expel(CharId::new(1), AccountId::new(1), CharId::new(1), "bye", &mut rig.ports())
            .unwrap_err();
        assert_eq!(err.rejection(), Some(Rejection::MasterProtected));

        state
            .expel(CharId::new(1), AccountId::new(2), CharId::new(2), "bye", &mut rig.ports())
            .unwrap();
        assert!(matches!(
            rig.link.sent.as_slice(),
            [AuthorityRequest::RemoveMember { expelled: true, .. }]
        ));
    }

    #[test]
    fn withdrawal_clears_slot_and_detaches() {
        let mut state = seeded();
        let mut rig = Rig::new();
        rig.login(2, "Bren", 1);

        let withdrawal = Withdrawal {
            guild_id: GuildId::new(1),
            account_id: AccountId::new(2),
            char_id: CharId::new(2),
            expelled: false,
            name: "Bren".to_owned(),
            message: "farewell".to_owned(),
        };
        state.member_withdrawn(withdrawal, &mut rig.ports());

        let guild = state.guild(GuildId::new(1)).unwrap();
        assert_eq!(guild.member_count(), 1);
        assert!(guild.members[1].is_empty());
        assert!(rig.sessions.by_char(CharId::new(2)).unwrap().guild_id.is_none());
    }

    // -----------------------------------------------------------------------
    // Settings
    // -----------------------------------------------------------------------

    #[test]
    fn position_tax_is_clamped() {
        let mut state = seeded();
        let mut rig = Rig::new();
        rig.login(1, "Ayla", 1);

        let position = Position {
            name: "Taxman".to_owned(),
            permissions: Permissions::from_bits(0xFF),
            exp_tax: 90,
        };
        state
            .change_position(CharId::new(1), 2, position, &mut rig.ports())
            .unwrap();
        assert!(matches!(
            rig.link.sent.as_slice(),
            [AuthorityRequest::ChangePosition { position, .. }]
                if position.exp_tax == 50 && position.permissions == Permissions::ALL
        ));
    }

    #[test]
    fn only_master_changes_notice() {
        let mut state = seeded();
        let mut rig = Rig::new();
        rig.login(2, "Bren", 1);

        let err = state
            .change_notice(CharId::new(2), GuildNotice::default(), &mut rig.ports())
            .unwrap_err();
        assert_eq!(err.rejection(), Some(Rejection::NotMaster));
    }

    #[test]
    fn master_change_swaps_into_first_slot() {
        let mut state = seeded();
        let mut rig = Rig::new();
        rig.login(1, "Ayla", 1);
        rig.login(2, "Bren", 1);

        state.master_changed(GuildId::new(1), AccountId::new(2), CharId::new(2), &mut rig.ports());
        let guild = state.guild(GuildId::new(1)).unwrap();
        assert_eq!(guild.master, "Bren");
        assert_eq!(guild.members[0].char_id, CharId::new(2));
        assert_eq!(guild.members[1].position, 1);
        assert!(rig.sessions.by_char(CharId::new(2)).unwrap().is_master);
        assert!(!rig.sessions.by_char(CharId::new(1)).unwrap().is_master);
        assert_eq!(
            rig.presenter.broadcasts,
            vec!["The Guild Master of [Valkyrie] has been changed to [Bren]".to_owned()]
        );
    }

    // -----------------------------------------------------------------------
    // Skills
    // -----------------------------------------------------------------------

    #[test]
    fn skill_cooldown_replaces_and_expires() {
        let mut state = seeded();
        let mut rig = Rig::new();
        rig.login(1, "Ayla", 1);

        assert!(state.block_skill(GuildId::new(1), 10_002, 5_000, Tick::ZERO));
        assert!(state.block_skill(GuildId::new(1), 10_002, 5_000, Tick::from_secs(3)));
        assert_eq!(state.timers().len(), 1);
        assert!(state.is_skill_blocked(GuildId::new(1), 10_002));
        assert!(!state.is_skill_blocked(GuildId::new(1), 10_001));

        assert_eq!(state.run_timers(Tick::from_secs(5), &mut rig.ports()), 0);
        assert_eq!(state.run_timers(Tick::from_secs(8), &mut rig.ports()), 1);
        assert!(!state.is_skill_blocked(GuildId::new(1), 10_002));
        assert_eq!(
            rig.presenter.texts_for(CharId::new(1)),
            vec!["[Valkyrie] Guild skill 10002 is ready."]
        );
    }

    #[test]
    fn skill_up_requires_points() {
        let mut state = seeded();
        let mut rig = Rig::new();
        rig.login(1, "Ayla", 1);

        let err = state
            .skill_up(CharId::new(1), 10_000, 1, &mut rig.ports())
            .unwrap_err();
        assert_eq!(err.rejection(), Some(Rejection::NoSkillPoints));
    }

    // -----------------------------------------------------------------------
    // Presence
    // -----------------------------------------------------------------------

    #[test]
    fn status_updates_presence_and_notifies() {
        let mut state = seeded();
        let mut rig = Rig::new();
        rig.login(1, "Ayla", 1);

        let status = MemberStatus {
            guild_id: GuildId::new(1),
            account_id: AccountId::new(1),
            char_id: CharId::new(1),
            online: true,
            level: 80,
            class: 4,
        };
        state.receive_member_status(status, &mut rig.ports());
        let guild = state.guild(GuildId::new(1)).unwrap();
        assert_eq!(guild.connect_member, 1);
        assert!(rig.presenter.notifications.iter().any(|(_, n)| matches!(
            n,
            Notification::MemberLogin { online: true, .. }
        )));
    }

    #[test]
    fn positions_broadcast_only_on_move() {
        let mut state = seeded();
        let mut rig = Rig::new();
        rig.login(1, "Ayla", 1);
        rig.login(2, "Bren", 1);
        for id in [1, 2] {
            rig.sessions.by_char_mut(CharId::new(id)).unwrap().position = MapPosition {
                map: "prontera".to_owned(),
                x: 150,
                y: 150,
            };
        }

        assert_eq!(state.broadcast_positions(&mut rig.ports()), 2);
        assert_eq!(state.broadcast_positions(&mut rig.ports()), 0);
        rig.sessions.by_char_mut(CharId::new(2)).unwrap().position.x = 151;
        assert_eq!(state.broadcast_positions(&mut rig.ports()), 1);
    }
}

//! In-memory collaborator implementations.
//!
//! [`SessionTable`] is a complete session directory. [`QueueLink`],
//! [`RecordingPresenter`], and [`RecordingHooks`] record what they are
//! given so a driver (or a test) can inspect or forward it later.

use std::collections::HashMap;

use guild_types::{
    AccountId, AuthorityRequest, CastleId, CharId, Guild, GuildId, GuildView, InstanceId,
    Notification,
};

use crate::error::LinkError;
use crate::ports::{AuthorityLink, Presenter, Session, SessionDirectory, WorldHooks};

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

/// Session directory backed by a hash map keyed by character.
#[derive(Debug, Default)]
pub struct SessionTable {
    sessions: HashMap<CharId, Session>,
}

impl SessionTable {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session, replacing any with the same character.
    pub fn insert(&mut self, session: Session) -> Option<Session> {
        self.sessions.insert(session.char_id, session)
    }

    /// Drop a session.
    pub fn remove(&mut self, char_id: CharId) -> Option<Session> {
        self.sessions.remove(&char_id)
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no session is live.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl SessionDirectory for SessionTable {
    fn by_char(&self, char_id: CharId) -> Option<&Session> {
        self.sessions.get(&char_id)
    }

    fn by_char_mut(&mut self, char_id: CharId) -> Option<&mut Session> {
        self.sessions.get_mut(&char_id)
    }

    fn by_account(&self, account_id: AccountId) -> Option<&Session> {
        self.sessions.values().find(|s| s.account_id == account_id)
    }

    fn by_name(&self, name: &str) -> Option<&Session> {
        self.sessions.values().find(|s| s.name == name)
    }

    fn characters(&self) -> Vec<CharId> {
        let mut ids: Vec<CharId> = self.sessions.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

// ---------------------------------------------------------------------------
// Authority link
// ---------------------------------------------------------------------------

/// Authority link that queues requests in memory.
///
/// While disconnected every send fails, which is what drives the castle
/// pending-write queue.
#[derive(Debug)]
pub struct QueueLink {
    /// Requests accepted so far, oldest first.
    pub sent: Vec<AuthorityRequest>,
    connected: bool,
}

impl Default for QueueLink {
    fn default() -> Self {
        Self::new()
    }
}

impl QueueLink {
    /// A connected, empty link.
    pub const fn new() -> Self {
        Self {
            sent: Vec::new(),
            connected: true,
        }
    }

    /// Mark the channel up or down.
    pub const fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }

    /// Whether the channel is up.
    pub const fn is_connected(&self) -> bool {
        self.connected
    }

    /// Take every queued request.
    pub fn drain(&mut self) -> Vec<AuthorityRequest> {
        std::mem::take(&mut self.sent)
    }
}

impl AuthorityLink for QueueLink {
    fn send(&mut self, request: AuthorityRequest) -> Result<(), LinkError> {
        if !self.connected {
            return Err(LinkError::Disconnected);
        }
        self.sent.push(request);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Presenter
// ---------------------------------------------------------------------------

/// Presenter that records every call.
#[derive(Debug, Default)]
pub struct RecordingPresenter {
    /// `(session, view, guild)` for every view shown.
    pub views: Vec<(CharId, GuildView, GuildId)>,
    /// `(session, notification)` for every notification.
    pub notifications: Vec<(CharId, Notification)>,
    /// Every server-wide announcement.
    pub broadcasts: Vec<String>,
}

impl RecordingPresenter {
    /// An empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total recorded calls.
    pub fn len(&self) -> usize {
        self.views
            .len()
            .saturating_add(self.notifications.len())
            .saturating_add(self.broadcasts.len())
    }

    /// Whether nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget everything recorded.
    pub fn clear(&mut self) {
        self.views.clear();
        self.notifications.clear();
        self.broadcasts.clear();
    }

    /// Plain-text notifications shown to one session.
    pub fn texts_for(&self, char_id: CharId) -> Vec<&str> {
        self.notifications
            .iter()
            .filter(|(to, _)| *to == char_id)
            .filter_map(|(_, n)| match n {
                Notification::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}

impl Presenter for RecordingPresenter {
    fn show(&mut self, to: CharId, view: GuildView, guild: &Guild) {
        self.views.push((to, view, guild.id));
    }

    fn notify(&mut self, to: CharId, notification: Notification) {
        self.notifications.push((to, notification));
    }

    fn broadcast(&mut self, text: &str) {
        self.broadcasts.push(text.to_owned());
    }
}

// ---------------------------------------------------------------------------
// Hooks
// ---------------------------------------------------------------------------

/// A recorded [`WorldHooks`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookCall {
    /// [`WorldHooks::run_event`].
    Event(String),
    /// [`WorldHooks::session_attached`].
    Attached(CharId, GuildId, Option<InstanceId>),
    /// [`WorldHooks::session_detached`].
    Detached(CharId, GuildId),
    /// [`WorldHooks::leave_personal_combat`].
    LeftCombat(CharId),
    /// [`WorldHooks::castle_owner_changed`].
    OwnerChanged(CastleId, GuildId),
    /// [`WorldHooks::castle_defense_changed`].
    DefenseChanged(CastleId),
    /// [`WorldHooks::castle_emblem_changed`].
    EmblemChanged(CastleId, u32),
}

/// World hooks that record every call.
#[derive(Debug, Default)]
pub struct RecordingHooks {
    /// Calls in order.
    pub calls: Vec<HookCall>,
}

impl RecordingHooks {
    /// An empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of every event run, in order.
    pub fn events(&self) -> Vec<&str> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                HookCall::Event(name) => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }
}

impl WorldHooks for RecordingHooks {
    fn run_event(&mut self, name: &str) {
        self.calls.push(HookCall::Event(name.to_owned()));
    }

    fn session_attached(&mut self, char_id: CharId, guild_id: GuildId, instance: Option<InstanceId>) {
        self.calls.push(HookCall::Attached(char_id, guild_id, instance));
    }

    fn session_detached(&mut self, char_id: CharId, guild_id: GuildId) {
        self.calls.push(HookCall::Detached(char_id, guild_id));
    }

    fn leave_personal_combat(&mut self, char_id: CharId) {
        self.calls.push(HookCall::LeftCombat(char_id));
    }

    fn castle_owner_changed(&mut self, castle_id: CastleId, owner: GuildId) {
        self.calls.push(HookCall::OwnerChanged(castle_id, owner));
    }

    fn castle_defense_changed(&mut self, castle_id: CastleId) {
        self.calls.push(HookCall::DefenseChanged(castle_id));
    }

    fn castle_emblem_changed(&mut self, castle_id: CastleId, emblem_id: u32) {
        self.calls.push(HookCall::EmblemChanged(castle_id, emblem_id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disconnected_link_refuses() {
        let mut link = QueueLink::new();
        link.set_connected(false);
        let result = link.send(AuthorityRequest::RequestInfo { guild_id: GuildId::new(1) });
        assert_eq!(result, Err(LinkError::Disconnected));
        assert!(link.sent.is_empty());

        link.set_connected(true);
        assert!(link.send(AuthorityRequest::RequestInfo { guild_id: GuildId::new(1) }).is_ok());
        assert_eq!(link.drain().len(), 1);
    }

    #[test]
    fn session_lookup_by_account_and_name() {
        let mut table = SessionTable::new();
        table.insert(Session::new(AccountId::new(1), CharId::new(10), "Alice"));
        table.insert(Session::new(AccountId::new(2), CharId::new(20), "Bob"));
        assert_eq!(table.by_account(AccountId::new(2)).map(|s| s.char_id), Some(CharId::new(20)));
        assert_eq!(table.by_name("Alice").map(|s| s.account_id), Some(AccountId::new(1)));
        assert_eq!(table.characters(), vec![CharId::new(10), CharId::new(20)]);
    }
}

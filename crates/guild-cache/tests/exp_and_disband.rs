//! Integration tests for exp write-back and the disband cascade.

// Integration tests use expect/unwrap extensively for clarity -- panicking
// on failure is the correct behavior in test code.
#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::items_after_statements,
    clippy::missing_panics_doc,
    clippy::too_many_lines,
    clippy::indexing_slicing
)]

mod common;

use common::{World, config_with_castles, record};
use guild_cache::{GuildConfig, HookCall};
use guild_types::{
    AccountId, AuthorityRequest, CastleField, CastleId, CharId, GuildId, MemberField,
    Notification, RelationEntry, RelationKind,
};

/// Alpha (10) with master Aria (1) and member Bron (2), both online.
/// Members below the master pay `tax` percent.
fn taxed_guild(tax: u8) -> World {
    let mut world = World::new(GuildConfig::default());
    world.login(1, "Aria", 10);
    world.login(2, "Bron", 10);
    let mut guild = record(10, "Alpha", &[(1, "Aria"), (2, "Bron")]);
    guild.positions[1].exp_tax = tax;
    world.push(guild);
    world.link.drain();
    world
}

// =========================================================================
// Exp cache
// =========================================================================

#[test]
fn taxed_exp_is_flushed_as_one_write() {
    let mut world = taxed_guild(20);

    let paid = world.run(|s, p, _| s.pay_exp(CharId::new(2), 1_000, p));
    assert_eq!(paid, 200);
    world.run(|s, p, _| s.pay_exp(CharId::new(2), 50, p));
    assert_eq!(world.state.exp_cache().pending(CharId::new(2)), Some(210));
    assert_eq!(world.run(|s, p, _| s.pay_exp(CharId::new(1), 1_000, p)), 0);

    let report = world.run(|s, p, _| s.flush_exp(p));

    assert_eq!(report.written, 1);
    assert_eq!(report.dropped, 0);
    assert_eq!(world.guild(10).member_by_char(CharId::new(2)).unwrap().exp, 210);
    assert_eq!(
        world.link.sent,
        vec![AuthorityRequest::UpdateMemberField {
            guild_id: GuildId::new(10),
            account_id: AccountId::new(2),
            char_id: CharId::new(2),
            field: MemberField::Exp(210),
        }]
    );
    assert!(world.state.exp_cache().is_empty());
    assert_eq!(world.state.exp_cache().pooled(), 1);
}

#[test]
fn full_tax_takes_everything() {
    let mut world = taxed_guild(100);
    assert_eq!(world.run(|s, p, _| s.pay_exp(CharId::new(2), 777, p)), 777);
}

#[test]
fn contributions_saturate() {
    let mut world = taxed_guild(0);

    world
        .run(|s, p, _| s.contribute_exp(CharId::new(1), u64::MAX.saturating_sub(5), p))
        .unwrap();
    let total = world
        .run(|s, p, _| s.contribute_exp(CharId::new(1), 10, p))
        .unwrap();

    assert_eq!(total, u64::MAX);
    assert_eq!(world.state.exp_cache().pending(CharId::new(1)), Some(u64::MAX));
}

#[test]
fn exp_for_departed_member_is_dropped() {
    let mut world = taxed_guild(0);
    world
        .run(|s, p, _| s.contribute_exp(CharId::new(2), 40, p))
        .unwrap();
    world.push(record(10, "Alpha", &[(1, "Aria")]));

    let report = world.run(|s, p, _| s.flush_exp(p));

    assert_eq!(report.written, 0);
    assert_eq!(report.dropped, 1);
    assert!(world.link.sent.is_empty());
}

#[test]
fn shutdown_flushes_pending_exp() {
    let mut world = taxed_guild(0);
    world
        .run(|s, p, _| s.contribute_exp(CharId::new(1), 15, p))
        .unwrap();

    world.run(|s, p, _| s.shutdown(p));

    assert_eq!(world.guild(10).member_by_char(CharId::new(1)).unwrap().exp, 15);
    assert!(world.state.exp_cache().is_empty());
}

// =========================================================================
// Disband cascade
// =========================================================================

#[test]
fn disband_cascades_through_relations_and_castles() {
    let mut world = World::new(config_with_castles(&[(1, "Agit_A01")]));
    world.login(1, "Aria", 10);
    world.login(2, "Bron", 20);
    world.login(3, "Cass", 30);
    world.push(record(10, "Alpha", &[(1, "Aria")]));

    let mut beta = record(20, "Beta", &[(2, "Bron")]);
    beta.relations
        .insert(RelationEntry::new(GuildId::new(10), "Alpha", RelationKind::Enemy))
        .unwrap();
    world.push(beta);
    let mut gamma = record(30, "Gamma", &[(3, "Cass")]);
    gamma
        .relations
        .insert(RelationEntry::new(GuildId::new(10), "Alpha", RelationKind::Ally))
        .unwrap();
    world.push(gamma);

    world
        .run(|s, p, now| s.set_castle_field(CastleId::new(1), CastleField::Owner, 10, now, p))
        .unwrap();
    world
        .run(|s, p, _| s.request_disband(CharId::new(1), "Alpha", p))
        .unwrap();
    assert!(world
        .link
        .sent
        .contains(&AuthorityRequest::Disband {
            guild_id: GuildId::new(10)
        }));
    assert!(world.state.guild(GuildId::new(10)).is_some());

    world.hooks.calls.clear();
    let removed = world.run(|s, p, now| s.broken(GuildId::new(10), now, p));

    assert!(removed);
    assert!(world.state.guild(GuildId::new(10)).is_none());
    assert!(world.session(1).guild_id.is_none());
    assert!(world.presenter.notifications.contains(&(
        CharId::new(1),
        Notification::Disbanded {
            guild_id: GuildId::new(10)
        }
    )));
    assert!(world.guild(20).relations.is_empty());
    assert!(world.guild(30).relations.is_empty());
    assert!(world.presenter.notifications.contains(&(
        CharId::new(2),
        Notification::RelationRemoved {
            guild_id: GuildId::new(10),
            kind: RelationKind::Enemy
        }
    )));

    assert_eq!(
        world.state.castles().get(CastleId::new(1)).unwrap().owner(),
        GuildId::NONE
    );
    assert_eq!(world.hooks.events(), vec!["Agit_A01::OnGuildBreak"]);
    assert!(world
        .hooks
        .calls
        .contains(&HookCall::OwnerChanged(CastleId::new(1), GuildId::NONE)));
    assert!(world
        .hooks
        .calls
        .contains(&HookCall::Detached(CharId::new(1), GuildId::new(10))));
}

#[test]
fn disband_forgets_pending_invitations() {
    let mut world = taxed_guild(0);
    world.login(5, "Newcomer", 0);
    world
        .run(|s, p, _| s.invite(CharId::new(1), CharId::new(5), p))
        .unwrap();
    assert!(world.state.pending_invite(CharId::new(5)).is_some());

    world.run(|s, p, now| s.broken(GuildId::new(10), now, p));

    assert!(world.state.pending_invite(CharId::new(5)).is_none());
    assert!(world.session(2).guild_id.is_none());
}

//! Users, sessions, and the privilege predicates.
//!
//! Privilege is a total order over small integers — lower tier outranks
//! higher tier, and every authorization question in the repository reduces
//! to one of the two predicates defined here.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Internal row identifier for a user.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { self.0.fmt(f) }
}

/// Privilege tier. Lower value wins; tier 0 is the unique super-tier.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Tier(pub i64);

impl Tier {
  pub const ROOT: Tier = Tier(0);

  /// Strict ordering: `self` may act on things held at `other` only if this
  /// returns true. Two users at the same tier do not outrank each other.
  pub fn outranks(self, other: Tier) -> bool { self.0 < other.0 }
}

impl fmt::Display for Tier {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { self.0.fmt(f) }
}

/// A stored user account. The credential hash is an argon2 PHC string and
/// never leaves the storage layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
  pub id:       UserId,
  pub username: String,
  pub tier:     Tier,
}

/// The authenticated identity bound to a connection.
///
/// Built only by [`GenomeStore::authenticate`](crate::store::GenomeStore::authenticate)
/// and held by the caller; nothing about it is persisted.
#[derive(Debug, Clone)]
pub struct Session {
  pub user_id:  UserId,
  pub username: String,
  pub tier:     Tier,
}

impl Session {
  /// The ownership predicate used by genome and list mutation: the requester
  /// either owns the entity or outranks its owner.
  pub fn may_administer(&self, owner_id: UserId, owner_tier: Tier) -> bool {
    self.user_id == owner_id || self.tier.outranks(owner_tier)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn session(user_id: i64, tier: i64) -> Session {
    Session {
      user_id:  UserId(user_id),
      username: "someone".into(),
      tier:     Tier(tier),
    }
  }

  #[test]
  fn outranks_is_strict() {
    assert!(Tier(0).outranks(Tier(1)));
    assert!(!Tier(1).outranks(Tier(1)));
    assert!(!Tier(2).outranks(Tier(1)));
  }

  #[test]
  fn owner_may_administer_regardless_of_tier() {
    let s = session(7, 5);
    assert!(s.may_administer(UserId(7), Tier(5)));
  }

  #[test]
  fn peer_may_not_administer() {
    let s = session(7, 5);
    assert!(!s.may_administer(UserId(8), Tier(5)));
  }

  #[test]
  fn superior_may_administer() {
    let s = session(7, 1);
    assert!(s.may_administer(UserId(8), Tier(5)));
  }
}

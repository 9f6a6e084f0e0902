//! Genome lists — named, owned, possibly-private sets of genomes.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::genome::GenomeId;

/// Internal row identifier for a genome list.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ListId(pub i64);

impl fmt::Display for ListId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { self.0.fmt(f) }
}

/// Membership delta applied by
/// [`modify_list`](crate::store::GenomeStore::modify_list). Both operations
/// are idempotent: adding a present member or removing an absent one is a
/// no-op, not an error.
#[derive(Debug, Clone)]
pub struct MemberDelta {
  pub ids: BTreeSet<GenomeId>,
  pub op:  DeltaOp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaOp {
  Add,
  Remove,
}

/// Field and membership updates for a list; all supplied parts apply within
/// one transaction.
#[derive(Debug, Clone, Default)]
pub struct ListUpdate {
  pub name:        Option<String>,
  pub description: Option<String>,
  pub make_public: Option<bool>,
  pub delta:       Option<MemberDelta>,
}

/// One row of [`visible_lists`](crate::store::GenomeStore::visible_lists).
#[derive(Debug, Clone)]
pub struct ListSummary {
  pub id:          ListId,
  pub name:        String,
  pub description: String,
  pub owner_name:  String,
  pub private:     bool,
}

/// Outcome of bulk membership reconciliation. Unresolved candidates are
/// carried as data rather than raised as a failure, so one typo does not
/// block an otherwise-valid batch. Both sides are sets: a candidate repeated
/// in the batch is resolved (or reported) once.
#[derive(Debug, Clone, Default)]
pub struct Reconciliation {
  pub resolved:   BTreeSet<GenomeId>,
  pub unresolved: BTreeSet<String>,
}

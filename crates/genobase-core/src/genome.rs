//! Genome records, tree identifiers, and source namespaces.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{
  error::{Error, Result},
  user::UserId,
};

/// Internal row identifier for a genome.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct GenomeId(pub i64);

impl fmt::Display for GenomeId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { self.0.fmt(f) }
}

/// Internal row identifier for a genome source namespace.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct SourceId(pub i64);

impl fmt::Display for SourceId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { self.0.fmt(f) }
}

// ─── Tree identifiers ────────────────────────────────────────────────────────

/// The repository's externally visible, human-stable genome identifier:
/// one uppercase prefix letter plus a zero-padded 8-digit sequence number,
/// e.g. `C00000042`. Immutable once assigned; monotonic per prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TreeId {
  prefix: u8,
  number: u32,
}

impl TreeId {
  /// The first identifier issued for a prefix.
  pub fn first(prefix: char) -> Result<TreeId> {
    if !prefix.is_ascii_uppercase() {
      return Err(Error::InvalidArgument(format!(
        "tree id prefixes must be in the range A-Z, got {prefix:?}"
      )));
    }
    Ok(TreeId { prefix: prefix as u8, number: 1 })
  }

  /// The identifier allocated after this one.
  pub fn next(self) -> TreeId {
    TreeId { prefix: self.prefix, number: self.number + 1 }
  }

  pub fn prefix(self) -> char { self.prefix as char }

  pub fn number(self) -> u32 { self.number }
}

impl fmt::Display for TreeId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}{:08}", self.prefix as char, self.number)
  }
}

impl FromStr for TreeId {
  type Err = Error;

  fn from_str(s: &str) -> Result<TreeId> {
    let bytes = s.as_bytes();
    if bytes.len() != 9
      || !bytes[0].is_ascii_uppercase()
      || !bytes[1..].iter().all(u8::is_ascii_digit)
    {
      return Err(Error::BadTreeId(s.to_owned()));
    }
    let number: u32 =
      s[1..].parse().map_err(|_| Error::BadTreeId(s.to_owned()))?;
    Ok(TreeId { prefix: bytes[0], number })
  }
}

// ─── Sources ─────────────────────────────────────────────────────────────────

/// An external namespace under which a genome's foreign identifier is
/// unique (e.g. `"user"` for direct submissions, or a public database).
/// Immutable after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenomeSource {
  pub id:   SourceId,
  pub name: String,
}

// ─── Genomes ─────────────────────────────────────────────────────────────────

/// Input for genome ingestion. The sequence payload is opaque to the
/// repository; it is stored as a detached blob and handed back verbatim on
/// export.
#[derive(Debug, Clone)]
pub struct NewGenome {
  /// Tree-identifier prefix letter (A-Z).
  pub prefix:       char,
  /// Source namespace; `None` means the reserved `"user"` source, in which
  /// case `id_at_source` must also be `None`.
  pub source:       Option<SourceId>,
  /// Foreign identifier at the source; defaults to the allocated tree id.
  pub id_at_source: Option<String>,
  pub name:         String,
  pub description:  String,
  pub sequence:     Vec<u8>,
}

/// A stored genome record (without its metadata document or sequence blob,
/// which are fetched through their own operations).
#[derive(Debug, Clone)]
pub struct Genome {
  pub id:           GenomeId,
  pub tree_id:      TreeId,
  pub name:         String,
  pub description:  String,
  pub owner_id:     UserId,
  pub source_id:    SourceId,
  pub id_at_source: String,
}

/// Exact-match lookup key. Exactly one mode per lookup; the two modes cannot
/// be mixed by construction.
#[derive(Debug, Clone)]
pub enum GenomeKey {
  Tree(TreeId),
  AtSource { source: SourceId, id_at_source: String },
}

/// Filters for [`search_genomes`](crate::store::GenomeStore::search_genomes).
/// Every supplied filter must match (logical AND); name and description are
/// case-insensitive substring matches, owner and list are exact.
#[derive(Debug, Clone, Default)]
pub struct GenomeFilter {
  pub name:        Option<String>,
  pub description: Option<String>,
  pub list:        Option<crate::list::ListId>,
  pub owner:       Option<UserId>,
}

/// One search result row. `added` is read from the genome's metadata
/// document (`internal/date_added`) and is `"unknown"` when absent.
#[derive(Debug, Clone)]
pub struct GenomeHit {
  pub tree_id:     TreeId,
  pub name:        String,
  pub owner_name:  String,
  pub added:       String,
  pub description: String,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn tree_id_round_trips() {
    let id: TreeId = "C00000042".parse().unwrap();
    assert_eq!(id.prefix(), 'C');
    assert_eq!(id.number(), 42);
    assert_eq!(id.to_string(), "C00000042");
  }

  #[test]
  fn tree_id_first_and_next() {
    let first = TreeId::first('A').unwrap();
    assert_eq!(first.to_string(), "A00000001");
    assert_eq!(first.next().to_string(), "A00000002");
  }

  #[test]
  fn tree_id_rejects_malformed_input() {
    for bad in ["", "C1", "c00000042", "C0000004Z", "C000000042"] {
      assert!(bad.parse::<TreeId>().is_err(), "accepted {bad:?}");
    }
  }

  #[test]
  fn tree_id_rejects_lowercase_prefix() {
    assert!(TreeId::first('c').is_err());
    assert!(TreeId::first('9').is_err());
  }

  #[test]
  fn tree_id_ordering_matches_lexicographic_order() {
    let a: TreeId = "C00000009".parse().unwrap();
    let b: TreeId = "C00000010".parse().unwrap();
    assert!(a < b);
    assert!(a.to_string() < b.to_string());
  }
}

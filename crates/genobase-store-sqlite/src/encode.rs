//! Decoding helpers between SQLite columns and core domain types.
//!
//! Identifiers are plain `INTEGER` rowids; tree identifiers and metadata
//! documents are stored as text and re-validated on the way out.

use genobase_core::{
  Error as CoreError,
  genome::{Genome, GenomeHit, GenomeId, SourceId, TreeId},
  metadata::Document,
  user::UserId,
};

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw columns of a `genomes` row.
pub struct RawGenome {
  pub id:           i64,
  pub tree_id:      String,
  pub name:         String,
  pub description:  String,
  pub owner_id:     i64,
  pub source_id:    i64,
  pub id_at_source: String,
}

impl RawGenome {
  pub fn into_genome(self) -> Result<Genome, CoreError> {
    Ok(Genome {
      id:           GenomeId(self.id),
      tree_id:      self.tree_id.parse::<TreeId>()?,
      name:         self.name,
      description:  self.description,
      owner_id:     UserId(self.owner_id),
      source_id:    SourceId(self.source_id),
      id_at_source: self.id_at_source,
    })
  }
}

/// Raw columns of one search result, before the metadata document has been
/// consulted for the addition timestamp.
pub struct RawHit {
  pub tree_id:     String,
  pub name:        String,
  pub owner_name:  String,
  pub metadata:    String,
  pub description: String,
}

impl RawHit {
  pub fn into_hit(self) -> Result<GenomeHit, CoreError> {
    // A document that fails to parse is treated like one with no timestamp;
    // search must not fail over one damaged row.
    let added = Document::parse(&self.metadata)
      .ok()
      .and_then(|doc| {
        doc.text_at(&["internal", "date_added"]).map(str::to_owned)
      })
      .unwrap_or_else(|| "unknown".to_owned());

    Ok(GenomeHit {
      tree_id: self.tree_id.parse::<TreeId>()?,
      name: self.name,
      owner_name: self.owner_name,
      added,
      description: self.description,
    })
  }
}

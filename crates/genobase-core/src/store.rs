//! The `GenomeStore` trait — the repository's operation surface.
//!
//! Implemented by storage backends (e.g. `genobase-store-sqlite`). Front
//! ends depend on this abstraction, not on any concrete backend.
//!
//! Every mutating operation takes the requester's [`Session`] and performs
//! its own privilege check; each operation is atomic on its own, with no
//! hidden shared transaction scope. All methods return `Send` futures so the
//! trait can be used from multi-threaded async runtimes.

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;

use crate::{
  genome::{
    Genome, GenomeFilter, GenomeHit, GenomeId, GenomeKey, GenomeSource,
    NewGenome, SourceId, TreeId,
  },
  list::{ListId, ListSummary, ListUpdate, Reconciliation},
  user::{Session, Tier, UserId},
};

pub trait GenomeStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Users & sessions ────────────────────────────────────────────────────

  /// Seed the first (tier-0) user into an empty store. Fails once any user
  /// exists; later accounts go through [`create_user`](Self::create_user).
  fn bootstrap_root<'a>(
    &'a self,
    username: &'a str,
    secret: &'a str,
  ) -> impl Future<Output = Result<UserId, Self::Error>> + Send + 'a;

  /// Verify credentials and bind a [`Session`] for the connection.
  fn authenticate<'a>(
    &'a self,
    username: &'a str,
    secret: &'a str,
  ) -> impl Future<Output = Result<Session, Self::Error>> + Send + 'a;

  /// Create a user at `tier`. The requester must outrank the new tier.
  fn create_user<'a>(
    &'a self,
    requester: &'a Session,
    username: &'a str,
    secret: &'a str,
    tier: Tier,
  ) -> impl Future<Output = Result<UserId, Self::Error>> + Send + 'a;

  /// Update a user's secret and/or tier.
  ///
  /// Self-service changes may touch only the secret; changing another user
  /// requires outranking their current tier, and a tier change additionally
  /// requires outranking the new tier. Nobody changes their own tier.
  fn modify_user<'a>(
    &'a self,
    requester: &'a Session,
    target: UserId,
    new_secret: Option<&'a str>,
    new_tier: Option<Tier>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  fn user_id_by_name<'a>(
    &'a self,
    username: &'a str,
  ) -> impl Future<Output = Result<UserId, Self::Error>> + Send + 'a;

  // ── Sources ─────────────────────────────────────────────────────────────

  fn list_sources(
    &self,
  ) -> impl Future<Output = Result<Vec<GenomeSource>, Self::Error>> + Send + '_;

  fn source_id_by_name<'a>(
    &'a self,
    name: &'a str,
  ) -> impl Future<Output = Result<SourceId, Self::Error>> + Send + 'a;

  // ── Genomes ─────────────────────────────────────────────────────────────

  /// Ingest a genome: allocate its tree identifier, insert the record with
  /// an initial metadata document, and attach the sequence blob — all in
  /// one transaction.
  fn ingest<'a>(
    &'a self,
    requester: &'a Session,
    genome: NewGenome,
  ) -> impl Future<Output = Result<(GenomeId, TreeId), Self::Error>> + Send + 'a;

  /// Delete a genome and everything derived from it: sequence blob, list
  /// memberships, aligned markers. All-or-nothing.
  fn delete_genome<'a>(
    &'a self,
    requester: &'a Session,
    genome: GenomeId,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Exact-match identifier resolution. `None` when nothing matches.
  fn lookup_genome<'a>(
    &'a self,
    key: &'a GenomeKey,
  ) -> impl Future<Output = Result<Option<GenomeId>, Self::Error>> + Send + 'a;

  fn get_genome(
    &self,
    genome: GenomeId,
  ) -> impl Future<Output = Result<Option<Genome>, Self::Error>> + Send + '_;

  /// Filtered genome search; supplied filters AND together. An empty result
  /// is not an error.
  fn search_genomes<'a>(
    &'a self,
    filter: &'a GenomeFilter,
  ) -> impl Future<Output = Result<Vec<GenomeHit>, Self::Error>> + Send + 'a;

  /// Raw sequence payload for export or the marker pipeline.
  fn export_sequence(
    &self,
    genome: GenomeId,
  ) -> impl Future<Output = Result<Vec<u8>, Self::Error>> + Send + '_;

  // ── Derived marker records ──────────────────────────────────────────────

  /// Persist the marker pipeline's output for a genome, replacing any prior
  /// marker set in the same transaction.
  fn store_markers<'a>(
    &'a self,
    requester: &'a Session,
    genome: GenomeId,
    markers: BTreeMap<String, String>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  fn markers_for(
    &self,
    genome: GenomeId,
  ) -> impl Future<Output = Result<BTreeMap<String, String>, Self::Error>> + Send + '_;

  // ── Genome lists ────────────────────────────────────────────────────────

  /// Insert the list row and its full membership set in one transaction.
  fn create_list<'a>(
    &'a self,
    requester: &'a Session,
    owner: UserId,
    name: &'a str,
    description: &'a str,
    members: &'a BTreeSet<GenomeId>,
    private: bool,
  ) -> impl Future<Output = Result<ListId, Self::Error>> + Send + 'a;

  /// Copy an existing list's membership into a new list.
  fn clone_list<'a>(
    &'a self,
    requester: &'a Session,
    source_list: ListId,
    name: &'a str,
    description: &'a str,
    owner: UserId,
    private: bool,
  ) -> impl Future<Output = Result<ListId, Self::Error>> + Send + 'a;

  /// Bulk-import resolution: blank candidates are dropped, the rest are
  /// resolved (tree-id mode without `source`, source-scoped otherwise), and
  /// unresolved strings are reported as data rather than failing the batch.
  fn reconcile_members<'a>(
    &'a self,
    candidates: &'a [String],
    source: Option<SourceId>,
  ) -> impl Future<Output = Result<Reconciliation, Self::Error>> + Send + 'a;

  /// Apply field updates and/or an idempotent membership delta in one
  /// transaction.
  fn modify_list<'a>(
    &'a self,
    requester: &'a Session,
    list: ListId,
    update: ListUpdate,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Delete a list. With `confirm = false` only the authorization and
  /// existence checks run — the dry-run interactive callers use to gate a
  /// confirmation prompt.
  fn delete_list<'a>(
    &'a self,
    requester: &'a Session,
    list: ListId,
    confirm: bool,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Lists the requester may see: public, their own, or owned by users they
  /// outrank. `owner` narrows to one owner within the same predicate.
  fn visible_lists<'a>(
    &'a self,
    requester: &'a Session,
    owner: Option<UserId>,
  ) -> impl Future<Output = Result<Vec<ListSummary>, Self::Error>> + Send + 'a;

  fn list_members(
    &self,
    list: ListId,
  ) -> impl Future<Output = Result<BTreeSet<GenomeId>, Self::Error>> + Send + '_;

  // ── Metadata documents ──────────────────────────────────────────────────

  fn metadata_get<'a>(
    &'a self,
    genome: GenomeId,
    path: &'a [&'a str],
  ) -> impl Future<Output = Result<Option<String>, Self::Error>> + Send + 'a;

  /// Whole-document read-modify-write; the backend serializes concurrent
  /// updates to the same genome.
  fn metadata_upsert<'a>(
    &'a self,
    genome: GenomeId,
    path: &'a [&'a str],
    value: &'a str,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  fn metadata_remove<'a>(
    &'a self,
    genome: GenomeId,
    path: &'a [&'a str],
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;
}

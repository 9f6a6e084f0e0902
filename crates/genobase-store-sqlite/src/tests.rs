//! Integration tests for `SqliteStore` against an in-memory database.

use std::collections::{BTreeMap, BTreeSet};

use genobase_core::{
  Error as CoreError,
  genome::{GenomeFilter, GenomeId, GenomeKey, NewGenome},
  list::{DeltaOp, ListUpdate, MemberDelta},
  store::GenomeStore,
  user::{Session, Tier},
};

use crate::{Error, SqliteStore};

async fn store_with_root() -> (SqliteStore, Session) {
  let s = SqliteStore::open_in_memory().await.expect("in-memory store");
  s.bootstrap_root("root", "rootpw").await.unwrap();
  let session = s.authenticate("root", "rootpw").await.unwrap();
  (s, session)
}

async fn make_user(
  s: &SqliteStore,
  root: &Session,
  name: &str,
  tier: i64,
) -> Session {
  s.create_user(root, name, "pw", Tier(tier)).await.unwrap();
  s.authenticate(name, "pw").await.unwrap()
}

fn fasta(name: &str) -> NewGenome {
  NewGenome {
    prefix:       'C',
    source:       None,
    id_at_source: None,
    name:         name.into(),
    description:  format!("{name} description"),
    sequence:     b">contig_1\nACGTACGT\n".to_vec(),
  }
}

fn is_privilege_error(err: &Error) -> bool {
  matches!(err.as_core(), Some(CoreError::InsufficientPrivilege(_)))
}

// ─── Authentication & bootstrap ──────────────────────────────────────────────

#[tokio::test]
async fn bootstrap_then_authenticate() {
  let (s, root) = store_with_root().await;
  assert_eq!(root.tier, Tier::ROOT);
  assert_eq!(root.username, "root");

  // The store is no longer empty; bootstrap must refuse.
  let err = s.bootstrap_root("other", "pw").await.unwrap_err();
  assert!(matches!(err.as_core(), Some(CoreError::InvalidArgument(_))));
}

#[tokio::test]
async fn authenticate_unknown_user() {
  let (s, _) = store_with_root().await;
  let err = s.authenticate("nobody", "pw").await.unwrap_err();
  assert!(matches!(err.as_core(), Some(CoreError::UserNotFound(_))));
}

#[tokio::test]
async fn authenticate_wrong_password() {
  let (s, _) = store_with_root().await;
  let err = s.authenticate("root", "wrong").await.unwrap_err();
  assert!(matches!(err.as_core(), Some(CoreError::BadCredential)));
}

// ─── User management ─────────────────────────────────────────────────────────

#[tokio::test]
async fn create_user_requires_strictly_higher_privilege() {
  let (s, root) = store_with_root().await;
  let curator = make_user(&s, &root, "curator", 2).await;

  // A curator may create below itself…
  s.create_user(&curator, "intern", "pw", Tier(3)).await.unwrap();

  // …but not at or above its own tier.
  for tier in [0, 1, 2] {
    let err = s
      .create_user(&curator, "peer", "pw", Tier(tier))
      .await
      .unwrap_err();
    assert!(is_privilege_error(&err), "tier {tier} was allowed");
  }
}

#[tokio::test]
async fn create_user_duplicate_username_conflicts() {
  let (s, root) = store_with_root().await;
  s.create_user(&root, "alice", "pw", Tier(2)).await.unwrap();
  let err = s.create_user(&root, "alice", "pw", Tier(3)).await.unwrap_err();
  assert!(matches!(err.as_core(), Some(CoreError::UsernameTaken(_))));
}

#[tokio::test]
async fn create_user_blank_password_rejected() {
  let (s, root) = store_with_root().await;
  let err = s.create_user(&root, "alice", "", Tier(2)).await.unwrap_err();
  assert!(matches!(err.as_core(), Some(CoreError::InvalidArgument(_))));
}

#[tokio::test]
async fn modify_user_self_service_changes_secret_only() {
  let (s, root) = store_with_root().await;
  let alice = make_user(&s, &root, "alice", 2).await;

  s.modify_user(&alice, alice.user_id, Some("newpw"), None)
    .await
    .unwrap();
  s.authenticate("alice", "newpw").await.unwrap();

  // Nobody changes their own tier, not even root.
  let err = s
    .modify_user(&alice, alice.user_id, None, Some(Tier(0)))
    .await
    .unwrap_err();
  assert!(is_privilege_error(&err));
  let err = s
    .modify_user(&root, root.user_id, None, Some(Tier(1)))
    .await
    .unwrap_err();
  assert!(is_privilege_error(&err));
}

#[tokio::test]
async fn modify_user_privilege_is_asymmetric() {
  let (s, root) = store_with_root().await;
  let senior = make_user(&s, &root, "senior", 1).await;
  let junior = make_user(&s, &root, "junior", 2).await;

  // Senior demotes junior: allowed.
  s.modify_user(&senior, junior.user_id, None, Some(Tier(3)))
    .await
    .unwrap();

  // Junior touching senior: refused.
  let err = s
    .modify_user(&junior, senior.user_id, Some("pwned"), None)
    .await
    .unwrap_err();
  assert!(is_privilege_error(&err));
}

#[tokio::test]
async fn modify_user_blank_password_rejected() {
  let (s, root) = store_with_root().await;
  let alice = make_user(&s, &root, "alice", 2).await;
  let err = s
    .modify_user(&alice, alice.user_id, Some(""), None)
    .await
    .unwrap_err();
  assert!(matches!(err.as_core(), Some(CoreError::InvalidArgument(_))));
}

// ─── Tree-identifier allocation & ingest ─────────────────────────────────────

#[tokio::test]
async fn tree_ids_are_monotonic_per_prefix() {
  let (s, root) = store_with_root().await;

  for n in 1..=3u32 {
    let (_, tree_id) = s.ingest(&root, fasta(&format!("g{n}"))).await.unwrap();
    assert_eq!(tree_id.to_string(), format!("C{n:08}"));
  }

  // A different prefix has its own counter.
  let mut other = fasta("archaeon");
  other.prefix = 'A';
  let (_, tree_id) = s.ingest(&root, other).await.unwrap();
  assert_eq!(tree_id.to_string(), "A00000001");
}

#[tokio::test]
async fn ingest_defaults_to_user_source() {
  let (s, root) = store_with_root().await;
  let (genome_id, tree_id) = s.ingest(&root, fasta("E. coli K-12")).await.unwrap();

  let genome = s.get_genome(genome_id).await.unwrap().unwrap();
  assert_eq!(genome.id_at_source, tree_id.to_string());
  assert_eq!(genome.owner_id, root.user_id);

  let sources = s.list_sources().await.unwrap();
  assert!(sources.iter().any(|src| src.id == genome.source_id && src.name == "user"));
}

#[tokio::test]
async fn ingest_rejects_accession_without_source() {
  let (s, root) = store_with_root().await;
  let mut genome = fasta("orphan");
  genome.id_at_source = Some("GCA_000001".into());
  let err = s.ingest(&root, genome).await.unwrap_err();
  assert!(matches!(err.as_core(), Some(CoreError::InvalidArgument(_))));
}

#[tokio::test]
async fn ingest_rejects_duplicate_accession() {
  let (s, root) = store_with_root().await;
  let source = s.source_id_by_name("user").await.unwrap();

  let mut first = fasta("first");
  first.source = Some(source);
  first.id_at_source = Some("GCA_000001".into());
  s.ingest(&root, first).await.unwrap();

  let mut second = fasta("second");
  second.source = Some(source);
  second.id_at_source = Some("GCA_000001".into());
  let err = s.ingest(&root, second).await.unwrap_err();
  assert!(matches!(err.as_core(), Some(CoreError::AccessionTaken { .. })));
}

#[tokio::test]
async fn ingest_rejects_bad_prefix() {
  let (s, root) = store_with_root().await;
  let mut genome = fasta("bad");
  genome.prefix = '7';
  let err = s.ingest(&root, genome).await.unwrap_err();
  assert!(matches!(err.as_core(), Some(CoreError::InvalidArgument(_))));
}

// ─── Lookup ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn lookup_by_tree_id_and_by_source() {
  let (s, root) = store_with_root().await;
  let source = s.source_id_by_name("user").await.unwrap();

  let mut genome = fasta("indexed");
  genome.source = Some(source);
  genome.id_at_source = Some("GCA_000042".into());
  let (genome_id, tree_id) = s.ingest(&root, genome).await.unwrap();

  let by_tree = s.lookup_genome(&GenomeKey::Tree(tree_id)).await.unwrap();
  assert_eq!(by_tree, Some(genome_id));

  let by_source = s
    .lookup_genome(&GenomeKey::AtSource {
      source,
      id_at_source: "GCA_000042".into(),
    })
    .await
    .unwrap();
  assert_eq!(by_source, Some(genome_id));

  let miss = s
    .lookup_genome(&GenomeKey::Tree("Z99999999".parse().unwrap()))
    .await
    .unwrap();
  assert_eq!(miss, None);
}

// ─── Search ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn search_filters_and_together() {
  let (s, root) = store_with_root().await;
  let alice = make_user(&s, &root, "alice", 2).await;

  s.ingest(&root, fasta("Escherichia coli")).await.unwrap();
  let (coli_id, _) = s.ingest(&alice, fasta("Escherichia coli O157")).await.unwrap();
  s.ingest(&alice, fasta("Bacillus subtilis")).await.unwrap();

  // Case-insensitive substring on name.
  let hits = s
    .search_genomes(&GenomeFilter {
      name: Some("escherichia".into()),
      ..Default::default()
    })
    .await
    .unwrap();
  assert_eq!(hits.len(), 2);

  // Name AND owner.
  let hits = s
    .search_genomes(&GenomeFilter {
      name: Some("escherichia".into()),
      owner: Some(alice.user_id),
      ..Default::default()
    })
    .await
    .unwrap();
  assert_eq!(hits.len(), 1);
  assert_eq!(hits[0].owner_name, "alice");

  // Ingest stamps a creation timestamp, so `added` is never "unknown" here.
  assert_ne!(hits[0].added, "unknown");

  // List membership filter.
  let members: BTreeSet<GenomeId> = [coli_id].into_iter().collect();
  let list = s
    .create_list(&alice, alice.user_id, "coli", "coli set", &members, true)
    .await
    .unwrap();
  let hits = s
    .search_genomes(&GenomeFilter { list: Some(list), ..Default::default() })
    .await
    .unwrap();
  assert_eq!(hits.len(), 1);

  // No match is an empty result, not an error.
  let hits = s
    .search_genomes(&GenomeFilter {
      name: Some("no such genome".into()),
      ..Default::default()
    })
    .await
    .unwrap();
  assert!(hits.is_empty());
}

#[tokio::test]
async fn search_matches_like_wildcards_literally() {
  let (s, root) = store_with_root().await;
  s.ingest(&root, fasta("strain a_b")).await.unwrap();
  s.ingest(&root, fasta("strain axb")).await.unwrap();
  s.ingest(&root, fasta("50% complete")).await.unwrap();

  // '_' must not act as a single-character wildcard.
  let hits = s
    .search_genomes(&GenomeFilter {
      name: Some("a_b".into()),
      ..Default::default()
    })
    .await
    .unwrap();
  assert_eq!(hits.len(), 1);
  assert_eq!(hits[0].name, "strain a_b");

  // A literal '%' in the filter still matches itself.
  let hits = s
    .search_genomes(&GenomeFilter {
      name: Some("50%".into()),
      ..Default::default()
    })
    .await
    .unwrap();
  assert_eq!(hits.len(), 1);
  assert_eq!(hits[0].name, "50% complete");
}

// ─── Sequence export ─────────────────────────────────────────────────────────

#[tokio::test]
async fn export_returns_ingested_payload() {
  let (s, root) = store_with_root().await;
  let (genome_id, _) = s.ingest(&root, fasta("exported")).await.unwrap();

  let payload = s.export_sequence(genome_id).await.unwrap();
  assert_eq!(payload, b">contig_1\nACGTACGT\n");

  let err = s.export_sequence(GenomeId(9999)).await.unwrap_err();
  assert!(matches!(err.as_core(), Some(CoreError::GenomeNotFound(_))));
}

// ─── Deletion cascade ────────────────────────────────────────────────────────

#[tokio::test]
async fn delete_genome_cascades_everywhere() {
  let (s, root) = store_with_root().await;
  let (genome_id, tree_id) = s.ingest(&root, fasta("doomed")).await.unwrap();
  let (kept_id, _) = s.ingest(&root, fasta("kept")).await.unwrap();

  let members: BTreeSet<GenomeId> = [genome_id, kept_id].into_iter().collect();
  let list = s
    .create_list(&root, root.user_id, "both", "", &members, true)
    .await
    .unwrap();

  let markers: BTreeMap<String, String> =
    [("PMPROK00001".to_string(), "MKV-LL".to_string())].into();
  s.store_markers(&root, genome_id, markers).await.unwrap();

  s.delete_genome(&root, genome_id).await.unwrap();

  assert_eq!(s.lookup_genome(&GenomeKey::Tree(tree_id)).await.unwrap(), None);
  assert!(s.markers_for(genome_id).await.unwrap().is_empty());
  let members = s.list_members(list).await.unwrap();
  assert_eq!(members, [kept_id].into_iter().collect());
}

#[tokio::test]
async fn delete_genome_requires_owner_or_superior() {
  let (s, root) = store_with_root().await;
  let alice = make_user(&s, &root, "alice", 2).await;
  let bob = make_user(&s, &root, "bob", 2).await;

  let (genome_id, _) = s.ingest(&alice, fasta("alices")).await.unwrap();

  // A peer cannot delete it.
  let err = s.delete_genome(&bob, genome_id).await.unwrap_err();
  assert!(is_privilege_error(&err));

  // A superior can.
  s.delete_genome(&root, genome_id).await.unwrap();
}

// ─── Markers ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn store_markers_replaces_prior_set() {
  let (s, root) = store_with_root().await;
  let (genome_id, _) = s.ingest(&root, fasta("marked")).await.unwrap();

  let first: BTreeMap<String, String> = [
    ("PMPROK00001".to_string(), "MKVL".to_string()),
    ("PMPROK00002".to_string(), "AEI-K".to_string()),
  ]
  .into();
  s.store_markers(&root, genome_id, first).await.unwrap();

  let second: BTreeMap<String, String> =
    [("PMPROK00003".to_string(), "QQRW".to_string())].into();
  s.store_markers(&root, genome_id, second.clone()).await.unwrap();

  assert_eq!(s.markers_for(genome_id).await.unwrap(), second);
}

#[tokio::test]
async fn store_markers_requires_owner_or_superior() {
  let (s, root) = store_with_root().await;
  let alice = make_user(&s, &root, "alice", 2).await;
  let bob = make_user(&s, &root, "bob", 2).await;

  let (genome_id, _) = s.ingest(&alice, fasta("alices")).await.unwrap();
  let markers: BTreeMap<String, String> =
    [("PMPROK00001".to_string(), "MKVL".to_string())].into();

  let err = s.store_markers(&bob, genome_id, markers.clone()).await.unwrap_err();
  assert!(is_privilege_error(&err));

  s.store_markers(&root, genome_id, markers).await.unwrap();
}

// ─── Lists ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn membership_delta_is_idempotent() {
  let (s, root) = store_with_root().await;
  let (g1, _) = s.ingest(&root, fasta("g1")).await.unwrap();
  let (g2, _) = s.ingest(&root, fasta("g2")).await.unwrap();

  let list = s
    .create_list(&root, root.user_id, "set", "", &BTreeSet::new(), true)
    .await
    .unwrap();

  let add = |ids: BTreeSet<GenomeId>| ListUpdate {
    delta: Some(MemberDelta { ids, op: DeltaOp::Add }),
    ..Default::default()
  };

  // Adding twice leaves membership unchanged.
  s.modify_list(&root, list, add([g1].into_iter().collect())).await.unwrap();
  s.modify_list(&root, list, add([g1].into_iter().collect())).await.unwrap();
  assert_eq!(s.list_members(list).await.unwrap().len(), 1);

  // Removing a non-member is a no-op, not an error.
  s.modify_list(
    &root,
    list,
    ListUpdate {
      delta: Some(MemberDelta {
        ids: [g2].into_iter().collect(),
        op:  DeltaOp::Remove,
      }),
      ..Default::default()
    },
  )
  .await
  .unwrap();
  assert_eq!(s.list_members(list).await.unwrap(), [g1].into_iter().collect());
}

#[tokio::test]
async fn modify_list_updates_fields_with_delta() {
  let (s, root) = store_with_root().await;
  let (g1, _) = s.ingest(&root, fasta("g1")).await.unwrap();

  let list = s
    .create_list(&root, root.user_id, "old", "old desc", &BTreeSet::new(), true)
    .await
    .unwrap();

  s.modify_list(
    &root,
    list,
    ListUpdate {
      name:        Some("new".into()),
      description: Some("new desc".into()),
      make_public: Some(true),
      delta:       Some(MemberDelta {
        ids: [g1].into_iter().collect(),
        op:  DeltaOp::Add,
      }),
    },
  )
  .await
  .unwrap();

  let lists = s.visible_lists(&root, None).await.unwrap();
  let summary = lists.iter().find(|l| l.id == list).unwrap();
  assert_eq!(summary.name, "new");
  assert_eq!(summary.description, "new desc");
  assert!(!summary.private);
  assert_eq!(s.list_members(list).await.unwrap().len(), 1);
}

#[tokio::test]
async fn modify_list_requires_owner_or_superior() {
  let (s, root) = store_with_root().await;
  let alice = make_user(&s, &root, "alice", 2).await;
  let bob = make_user(&s, &root, "bob", 2).await;

  let list = s
    .create_list(&alice, alice.user_id, "mine", "", &BTreeSet::new(), true)
    .await
    .unwrap();

  let rename = ListUpdate { name: Some("taken over".into()), ..Default::default() };
  let err = s.modify_list(&bob, list, rename.clone()).await.unwrap_err();
  assert!(is_privilege_error(&err));

  s.modify_list(&root, list, rename).await.unwrap();
}

#[tokio::test]
async fn delete_list_dry_run_then_confirm() {
  let (s, root) = store_with_root().await;
  let (g1, _) = s.ingest(&root, fasta("g1")).await.unwrap();
  let members: BTreeSet<GenomeId> = [g1].into_iter().collect();
  let list = s
    .create_list(&root, root.user_id, "doomed", "", &members, true)
    .await
    .unwrap();

  // Dry run performs the checks but deletes nothing.
  s.delete_list(&root, list, false).await.unwrap();
  assert_eq!(s.list_members(list).await.unwrap().len(), 1);

  s.delete_list(&root, list, true).await.unwrap();
  let err = s.list_members(list).await.unwrap_err();
  assert!(matches!(err.as_core(), Some(CoreError::ListNotFound(_))));

  // The genome itself is untouched.
  assert!(s.get_genome(g1).await.unwrap().is_some());
}

#[tokio::test]
async fn clone_list_copies_membership() {
  let (s, root) = store_with_root().await;
  let (g1, _) = s.ingest(&root, fasta("g1")).await.unwrap();
  let (g2, _) = s.ingest(&root, fasta("g2")).await.unwrap();
  let members: BTreeSet<GenomeId> = [g1, g2].into_iter().collect();

  let original = s
    .create_list(&root, root.user_id, "orig", "", &members, true)
    .await
    .unwrap();
  let copy = s
    .clone_list(&root, original, "copy", "copied", root.user_id, false)
    .await
    .unwrap();

  assert_ne!(original, copy);
  assert_eq!(s.list_members(copy).await.unwrap(), members);
}

#[tokio::test]
async fn clone_list_respects_visibility() {
  let (s, root) = store_with_root().await;
  let alice = make_user(&s, &root, "alice", 2).await;
  let bob = make_user(&s, &root, "bob", 2).await;

  let private = s
    .create_list(&alice, alice.user_id, "secret", "", &BTreeSet::new(), true)
    .await
    .unwrap();

  let err = s
    .clone_list(&bob, private, "stolen", "", bob.user_id, true)
    .await
    .unwrap_err();
  assert!(is_privilege_error(&err));

  // Root outranks alice, so the clone is allowed.
  s.clone_list(&root, private, "audited", "", root.user_id, true)
    .await
    .unwrap();
}

#[tokio::test]
async fn create_list_for_other_owner_requires_outranking() {
  let (s, root) = store_with_root().await;
  let alice = make_user(&s, &root, "alice", 2).await;
  let bob = make_user(&s, &root, "bob", 2).await;

  let err = s
    .create_list(&alice, bob.user_id, "gift", "", &BTreeSet::new(), true)
    .await
    .unwrap_err();
  assert!(is_privilege_error(&err));

  s.create_list(&root, bob.user_id, "assigned", "", &BTreeSet::new(), true)
    .await
    .unwrap();
}

#[tokio::test]
async fn visible_lists_predicate() {
  let (s, root) = store_with_root().await;
  let alice = make_user(&s, &root, "alice", 2).await;
  let bob = make_user(&s, &root, "bob", 2).await;

  let alice_private = s
    .create_list(&alice, alice.user_id, "alice private", "", &BTreeSet::new(), true)
    .await
    .unwrap();
  let alice_public = s
    .create_list(&alice, alice.user_id, "alice public", "", &BTreeSet::new(), false)
    .await
    .unwrap();
  let bob_private = s
    .create_list(&bob, bob.user_id, "bob private", "", &BTreeSet::new(), true)
    .await
    .unwrap();

  // Bob sees: public lists and his own — not alice's private list.
  let seen: BTreeSet<_> = s
    .visible_lists(&bob, None)
    .await
    .unwrap()
    .into_iter()
    .map(|l| l.id)
    .collect();
  assert_eq!(seen, [alice_public, bob_private].into_iter().collect());

  // Root outranks everyone and sees all three.
  let seen = s.visible_lists(&root, None).await.unwrap();
  assert_eq!(seen.len(), 3);
  assert!(seen.iter().any(|l| l.id == alice_private));

  // Owner filter narrows within the same predicate.
  let seen: Vec<_> = s.visible_lists(&bob, Some(alice.user_id)).await.unwrap();
  assert_eq!(seen.len(), 1);
  assert_eq!(seen[0].id, alice_public);
}

// ─── Membership reconciliation ───────────────────────────────────────────────

#[tokio::test]
async fn reconcile_partitions_resolved_and_unresolved() {
  let (s, root) = store_with_root().await;
  let (genome_id, tree_id) = s.ingest(&root, fasta("known")).await.unwrap();
  assert_eq!(tree_id.to_string(), "C00000001");

  let batch = vec![
    "C00000001".to_string(),
    "".to_string(),
    "ZZZZZZZZ".to_string(),
  ];
  let outcome = s.reconcile_members(&batch, None).await.unwrap();

  assert_eq!(outcome.resolved, [genome_id].into_iter().collect());
  assert_eq!(outcome.unresolved, BTreeSet::from(["ZZZZZZZZ".to_string()]));
}

#[tokio::test]
async fn reconcile_reports_duplicate_misses_once() {
  let (s, _) = store_with_root().await;
  let batch = vec![
    "ZZZZZZZZ".to_string(),
    "ZZZZZZZZ".to_string(),
    "YYYYYYYY".to_string(),
  ];
  let outcome = s.reconcile_members(&batch, None).await.unwrap();
  assert!(outcome.resolved.is_empty());
  assert_eq!(
    outcome.unresolved,
    BTreeSet::from(["YYYYYYYY".to_string(), "ZZZZZZZZ".to_string()])
  );
}

#[tokio::test]
async fn reconcile_source_scoped_mode() {
  let (s, root) = store_with_root().await;
  let source = s.source_id_by_name("user").await.unwrap();

  let mut genome = fasta("accessioned");
  genome.source = Some(source);
  genome.id_at_source = Some("GCA_000042".into());
  let (genome_id, _) = s.ingest(&root, genome).await.unwrap();

  let batch = vec!["GCA_000042".to_string(), "GCA_999999".to_string()];
  let outcome = s.reconcile_members(&batch, Some(source)).await.unwrap();

  assert_eq!(outcome.resolved, [genome_id].into_iter().collect());
  assert_eq!(outcome.unresolved, BTreeSet::from(["GCA_999999".to_string()]));
}

// ─── Metadata documents ──────────────────────────────────────────────────────

#[tokio::test]
async fn metadata_upsert_then_get_round_trips() {
  let (s, root) = store_with_root().await;
  let (genome_id, _) = s.ingest(&root, fasta("annotated")).await.unwrap();

  s.metadata_upsert(genome_id, &["internal", "taxonomy"], "d__Bacteria;p__Foo")
    .await
    .unwrap();
  let taxonomy = s
    .metadata_get(genome_id, &["internal", "taxonomy"])
    .await
    .unwrap();
  assert_eq!(taxonomy.as_deref(), Some("d__Bacteria;p__Foo"));

  // A path whose intermediates never existed is created on the fly.
  s.metadata_upsert(genome_id, &["external", "ncbi", "bioproject"], "PRJNA42")
    .await
    .unwrap();
  let bioproject = s
    .metadata_get(genome_id, &["external", "ncbi", "bioproject"])
    .await
    .unwrap();
  assert_eq!(bioproject.as_deref(), Some("PRJNA42"));
}

#[tokio::test]
async fn metadata_get_missing_path_is_none() {
  let (s, root) = store_with_root().await;
  let (genome_id, _) = s.ingest(&root, fasta("bare")).await.unwrap();
  let missing = s
    .metadata_get(genome_id, &["internal", "taxonomy"])
    .await
    .unwrap();
  assert_eq!(missing, None);
}

#[tokio::test]
async fn metadata_remove_drops_subtree() {
  let (s, root) = store_with_root().await;
  let (genome_id, _) = s.ingest(&root, fasta("pruned")).await.unwrap();

  s.metadata_upsert(genome_id, &["internal", "taxonomy"], "d__Archaea")
    .await
    .unwrap();
  s.metadata_remove(genome_id, &["internal", "taxonomy"]).await.unwrap();
  assert_eq!(
    s.metadata_get(genome_id, &["internal", "taxonomy"]).await.unwrap(),
    None
  );

  let err = s
    .metadata_remove(genome_id, &["internal", "taxonomy"])
    .await
    .unwrap_err();
  assert!(matches!(err.as_core(), Some(CoreError::MetadataPathNotFound(_))));
}

#[tokio::test]
async fn metadata_operations_on_missing_genome_error() {
  let (s, _) = store_with_root().await;
  let err = s
    .metadata_get(GenomeId(9999), &["internal", "taxonomy"])
    .await
    .unwrap_err();
  assert!(matches!(err.as_core(), Some(CoreError::GenomeNotFound(_))));
}

#[tokio::test]
async fn ingest_stamps_date_added() {
  let (s, root) = store_with_root().await;
  let (genome_id, _) = s.ingest(&root, fasta("stamped")).await.unwrap();
  let added = s
    .metadata_get(genome_id, &["internal", "date_added"])
    .await
    .unwrap();
  assert!(added.is_some());
}

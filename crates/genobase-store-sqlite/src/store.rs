//! [`SqliteStore`] — the SQLite implementation of [`GenomeStore`].
//!
//! Every multi-statement operation runs inside one transaction; a domain
//! rejection (privilege, uniqueness, lookup miss) drops the transaction and
//! rolls back everything the operation wrote. Because all access flows
//! through a single [`tokio_rusqlite::Connection`], the read-then-write
//! sequences (tree-identifier allocation, whole-document metadata updates)
//! are serialized as the repository requires.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use chrono::Utc;
use rusqlite::OptionalExtension as _;

use genobase_core::{
  Error as CoreError, auth,
  genome::{
    Genome, GenomeFilter, GenomeHit, GenomeId, GenomeKey, GenomeSource,
    NewGenome, SourceId, TreeId,
  },
  list::{DeltaOp, ListId, ListSummary, ListUpdate, Reconciliation},
  metadata::Document,
  store::GenomeStore,
  user::{Session, Tier, UserId},
};

use crate::{
  Error, Result,
  encode::{RawGenome, RawHit},
  schema::SCHEMA,
};

// ─── Transaction plumbing ────────────────────────────────────────────────────

/// Failure inside a transaction body: either the database itself failed, or
/// a domain rule rejected the operation (which must roll the transaction
/// back but surface as a typed core error, not a storage error).
enum TxError {
  Sql(rusqlite::Error),
  Core(CoreError),
}

impl From<rusqlite::Error> for TxError {
  fn from(e: rusqlite::Error) -> Self { TxError::Sql(e) }
}

impl From<CoreError> for TxError {
  fn from(e: CoreError) -> Self { TxError::Core(e) }
}

type TxResult<T> = std::result::Result<T, TxError>;

// ─── Store ───────────────────────────────────────────────────────────────────

/// A genome repository backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Run `f` inside one transaction. Commits only when `f` succeeds; any
  /// error (domain or database) rolls back every write `f` performed.
  async fn with_tx<T, F>(&self, f: F) -> Result<T>
  where
    F: FnOnce(&rusqlite::Transaction<'_>) -> TxResult<T> + Send + 'static,
    T: Send + 'static,
  {
    let out: std::result::Result<T, CoreError> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        match f(&tx) {
          Ok(value) => {
            tx.commit()?;
            Ok(Ok(value))
          }
          // Dropping the transaction rolls it back.
          Err(TxError::Core(e)) => Ok(Err(e)),
          Err(TxError::Sql(e)) => Err(e.into()),
        }
      })
      .await?;
    out.map_err(Error::Core)
  }
}

// ─── Row helpers (run inside a `call` closure) ───────────────────────────────

/// Owner id and owner tier of a genome, or `None` if the genome is absent.
fn genome_owner(
  conn: &rusqlite::Connection,
  genome: GenomeId,
) -> rusqlite::Result<Option<(UserId, Tier)>> {
  conn
    .query_row(
      "SELECT g.owner_id, u.tier
       FROM genomes g JOIN users u ON u.id = g.owner_id
       WHERE g.id = ?1",
      rusqlite::params![genome.0],
      |r| Ok((UserId(r.get(0)?), Tier(r.get(1)?))),
    )
    .optional()
}

/// Owner id, owner tier, and privacy flag of a list.
fn list_row(
  conn: &rusqlite::Connection,
  list: ListId,
) -> rusqlite::Result<Option<(UserId, Tier, bool)>> {
  conn
    .query_row(
      "SELECT l.owner_id, u.tier, l.private
       FROM genome_lists l JOIN users u ON u.id = l.owner_id
       WHERE l.id = ?1",
      rusqlite::params![list.0],
      |r| Ok((UserId(r.get(0)?), Tier(r.get(1)?), r.get(2)?)),
    )
    .optional()
}

fn resolve_key(
  conn: &rusqlite::Connection,
  key: &GenomeKey,
) -> rusqlite::Result<Option<GenomeId>> {
  let id: Option<i64> = match key {
    GenomeKey::Tree(tree_id) => conn
      .query_row(
        "SELECT id FROM genomes WHERE tree_id = ?1",
        rusqlite::params![tree_id.to_string()],
        |r| r.get(0),
      )
      .optional()?,
    GenomeKey::AtSource { source, id_at_source } => conn
      .query_row(
        "SELECT id FROM genomes WHERE source_id = ?1 AND id_at_source = ?2",
        rusqlite::params![source.0, id_at_source],
        |r| r.get(0),
      )
      .optional()?,
  };
  Ok(id.map(GenomeId))
}

/// Fetch and parse a genome's metadata document.
fn load_document(
  conn: &rusqlite::Connection,
  genome: GenomeId,
) -> TxResult<Document> {
  let xml: Option<String> = conn
    .query_row(
      "SELECT metadata FROM genomes WHERE id = ?1",
      rusqlite::params![genome.0],
      |r| r.get(0),
    )
    .optional()?;
  let xml = xml.ok_or(CoreError::GenomeNotFound(genome))?;
  Ok(Document::parse(&xml)?)
}

fn store_document(
  conn: &rusqlite::Connection,
  genome: GenomeId,
  doc: &Document,
) -> rusqlite::Result<()> {
  conn.execute(
    "UPDATE genomes SET metadata = ?1 WHERE id = ?2",
    rusqlite::params![doc.to_xml(), genome.0],
  )?;
  Ok(())
}

/// Escape `LIKE` wildcards so filter text matches literally.
fn escape_like(s: &str) -> String {
  let mut out = String::with_capacity(s.len());
  for c in s.chars() {
    if matches!(c, '%' | '_' | '\\') {
      out.push('\\');
    }
    out.push(c);
  }
  out
}

/// Privilege-checked list insertion shared by create and clone.
fn insert_list(
  tx: &rusqlite::Transaction<'_>,
  requester_id: UserId,
  requester_tier: Tier,
  owner: UserId,
  name: &str,
  description: &str,
  members: &BTreeSet<GenomeId>,
  private: bool,
) -> TxResult<ListId> {
  let owner_tier: Option<i64> = tx
    .query_row(
      "SELECT tier FROM users WHERE id = ?1",
      rusqlite::params![owner.0],
      |r| r.get(0),
    )
    .optional()?;
  let owner_tier = Tier(owner_tier.ok_or(CoreError::UserIdNotFound(owner))?);

  if requester_id != owner && !requester_tier.outranks(owner_tier) {
    return Err(
      CoreError::InsufficientPrivilege("cannot create a list for that owner")
        .into(),
    );
  }

  tx.execute(
    "INSERT INTO genome_lists (name, description, owner_id, private)
     VALUES (?1, ?2, ?3, ?4)",
    rusqlite::params![name, description, owner.0, private],
  )?;
  let list_id = ListId(tx.last_insert_rowid());

  let mut stmt = tx.prepare(
    "INSERT OR IGNORE INTO genome_list_contents (list_id, genome_id)
     VALUES (?1, ?2)",
  )?;
  for member in members {
    stmt.execute(rusqlite::params![list_id.0, member.0])?;
  }

  Ok(list_id)
}

// ─── GenomeStore impl ────────────────────────────────────────────────────────

impl GenomeStore for SqliteStore {
  type Error = Error;

  // ── Users & sessions ────────────────────────────────────────────────────

  async fn bootstrap_root(&self, username: &str, secret: &str) -> Result<UserId> {
    if secret.is_empty() {
      return Err(
        CoreError::InvalidArgument("you must specify a non-blank password".into())
          .into(),
      );
    }
    let username = username.to_owned();
    let hash = auth::hash_secret(secret).map_err(Error::Core)?;

    self
      .with_tx(move |tx| {
        let existing: i64 =
          tx.query_row("SELECT COUNT(*) FROM users", [], |r| r.get(0))?;
        if existing > 0 {
          return Err(
            CoreError::InvalidArgument(
              "store already has users; use create_user".into(),
            )
            .into(),
          );
        }
        tx.execute(
          "INSERT INTO users (username, password_hash, tier) VALUES (?1, ?2, 0)",
          rusqlite::params![username, hash],
        )?;
        Ok(UserId(tx.last_insert_rowid()))
      })
      .await
  }

  async fn authenticate(&self, username: &str, secret: &str) -> Result<Session> {
    let uname = username.to_owned();
    let row: Option<(i64, String, i64)> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT id, password_hash, tier FROM users WHERE username = ?1",
              rusqlite::params![uname],
              |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .optional()?,
        )
      })
      .await?;

    let (id, hash, tier) =
      row.ok_or_else(|| CoreError::UserNotFound(username.to_owned()))?;

    if !auth::verify_secret(secret, &hash) {
      return Err(CoreError::BadCredential.into());
    }

    tracing::debug!(username, "authenticated");
    Ok(Session {
      user_id:  UserId(id),
      username: username.to_owned(),
      tier:     Tier(tier),
    })
  }

  async fn create_user(
    &self,
    requester: &Session,
    username: &str,
    secret: &str,
    tier: Tier,
  ) -> Result<UserId> {
    if secret.is_empty() {
      return Err(
        CoreError::InvalidArgument("you must specify a non-blank password".into())
          .into(),
      );
    }
    if !requester.tier.outranks(tier) {
      return Err(
        CoreError::InsufficientPrivilege(
          "cannot create a user with the same or higher privileges",
        )
        .into(),
      );
    }

    let username = username.to_owned();
    let hash = auth::hash_secret(secret).map_err(Error::Core)?;

    self
      .with_tx(move |tx| {
        let taken: Option<i64> = tx
          .query_row(
            "SELECT id FROM users WHERE username = ?1",
            rusqlite::params![username],
            |r| r.get(0),
          )
          .optional()?;
        if taken.is_some() {
          return Err(CoreError::UsernameTaken(username).into());
        }
        tx.execute(
          "INSERT INTO users (username, password_hash, tier) VALUES (?1, ?2, ?3)",
          rusqlite::params![username, hash, tier.0],
        )?;
        Ok(UserId(tx.last_insert_rowid()))
      })
      .await
  }

  async fn modify_user(
    &self,
    requester: &Session,
    target: UserId,
    new_secret: Option<&str>,
    new_tier: Option<Tier>,
  ) -> Result<()> {
    if new_secret.is_none() && new_tier.is_none() {
      return Err(CoreError::InvalidArgument("nothing to modify".into()).into());
    }
    if let Some(secret) = new_secret
      && secret.is_empty()
    {
      return Err(
        CoreError::InvalidArgument("you must specify a non-blank password".into())
          .into(),
      );
    }

    let is_self = requester.user_id == target;
    if is_self && new_tier.is_some() {
      return Err(
        CoreError::InsufficientPrivilege("cannot change your own tier").into(),
      );
    }
    if let Some(tier) = new_tier
      && !requester.tier.outranks(tier)
    {
      return Err(
        CoreError::InsufficientPrivilege(
          "cannot grant privileges equal to or above your own",
        )
        .into(),
      );
    }

    let requester_tier = requester.tier;
    let hash = new_secret
      .map(auth::hash_secret)
      .transpose()
      .map_err(Error::Core)?;

    self
      .with_tx(move |tx| {
        let target_tier: Option<i64> = tx
          .query_row(
            "SELECT tier FROM users WHERE id = ?1",
            rusqlite::params![target.0],
            |r| r.get(0),
          )
          .optional()?;
        let target_tier =
          Tier(target_tier.ok_or(CoreError::UserIdNotFound(target))?);

        if !is_self && !requester_tier.outranks(target_tier) {
          return Err(
            CoreError::InsufficientPrivilege("cannot modify that user").into(),
          );
        }

        if let Some(hash) = hash {
          tx.execute(
            "UPDATE users SET password_hash = ?1 WHERE id = ?2",
            rusqlite::params![hash, target.0],
          )?;
        }
        if let Some(tier) = new_tier {
          tx.execute(
            "UPDATE users SET tier = ?1 WHERE id = ?2",
            rusqlite::params![tier.0, target.0],
          )?;
        }
        Ok(())
      })
      .await
  }

  async fn user_id_by_name(&self, username: &str) -> Result<UserId> {
    let uname = username.to_owned();
    let id: Option<i64> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT id FROM users WHERE username = ?1",
              rusqlite::params![uname],
              |r| r.get(0),
            )
            .optional()?,
        )
      })
      .await?;
    id.map(UserId)
      .ok_or_else(|| CoreError::UserNotFound(username.to_owned()).into())
  }

  // ── Sources ─────────────────────────────────────────────────────────────

  async fn list_sources(&self) -> Result<Vec<GenomeSource>> {
    let sources = self
      .conn
      .call(|conn| {
        let mut stmt =
          conn.prepare("SELECT id, name FROM genome_sources ORDER BY id")?;
        let rows = stmt
          .query_map([], |r| {
            Ok(GenomeSource { id: SourceId(r.get(0)?), name: r.get(1)? })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(sources)
  }

  async fn source_id_by_name(&self, name: &str) -> Result<SourceId> {
    let source_name = name.to_owned();
    let id: Option<i64> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT id FROM genome_sources WHERE name = ?1",
              rusqlite::params![source_name],
              |r| r.get(0),
            )
            .optional()?,
        )
      })
      .await?;
    id.map(SourceId)
      .ok_or_else(|| CoreError::SourceNotFound(name.to_owned()).into())
  }

  // ── Genomes ─────────────────────────────────────────────────────────────

  async fn ingest(
    &self,
    requester: &Session,
    genome: NewGenome,
  ) -> Result<(GenomeId, TreeId)> {
    if !genome.prefix.is_ascii_uppercase() {
      return Err(
        CoreError::InvalidArgument(format!(
          "tree id prefixes must be in the range A-Z, got {:?}",
          genome.prefix
        ))
        .into(),
      );
    }

    let owner = requester.user_id;
    let result = self
      .with_tx(move |tx| {
        // Allocate the next tree identifier for this prefix. Safe only
        // because the store serializes writes (see crate docs).
        let pattern = format!("{}%", genome.prefix);
        let last: Option<String> = tx
          .query_row(
            "SELECT tree_id FROM genomes WHERE tree_id LIKE ?1
             ORDER BY tree_id DESC LIMIT 1",
            rusqlite::params![pattern],
            |r| r.get(0),
          )
          .optional()?;
        let tree_id = match last {
          Some(s) => s.parse::<TreeId>()?.next(),
          None => TreeId::first(genome.prefix)?,
        };

        let (source_id, id_at_source) = match genome.source {
          None => {
            if genome.id_at_source.is_some() {
              return Err(
                CoreError::InvalidArgument(
                  "cannot specify an id at an unspecified genome source".into(),
                )
                .into(),
              );
            }
            let sid: i64 = tx.query_row(
              "SELECT id FROM genome_sources WHERE name = 'user'",
              [],
              |r| r.get(0),
            )?;
            (sid, tree_id.to_string())
          }
          Some(sid) => {
            let known: Option<i64> = tx
              .query_row(
                "SELECT id FROM genome_sources WHERE id = ?1",
                rusqlite::params![sid.0],
                |r| r.get(0),
              )
              .optional()?;
            if known.is_none() {
              return Err(
                CoreError::SourceNotFound(format!("id {}", sid.0)).into(),
              );
            }
            let at_source = genome
              .id_at_source
              .unwrap_or_else(|| tree_id.to_string());
            (sid.0, at_source)
          }
        };

        let taken: Option<i64> = tx
          .query_row(
            "SELECT id FROM genomes WHERE source_id = ?1 AND id_at_source = ?2",
            rusqlite::params![source_id, id_at_source],
            |r| r.get(0),
          )
          .optional()?;
        if taken.is_some() {
          return Err(CoreError::AccessionTaken { id_at_source }.into());
        }

        tx.execute(
          "INSERT INTO sequence_blobs (data) VALUES (?1)",
          rusqlite::params![genome.sequence],
        )?;
        let blob_id = tx.last_insert_rowid();

        let metadata = Document::initial(Utc::now()).to_xml();
        tx.execute(
          "INSERT INTO genomes
             (tree_id, name, description, metadata,
              owner_id, source_id, id_at_source, sequence_blob)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
          rusqlite::params![
            tree_id.to_string(),
            genome.name,
            genome.description,
            metadata,
            owner.0,
            source_id,
            id_at_source,
            blob_id,
          ],
        )?;

        Ok((GenomeId(tx.last_insert_rowid()), tree_id))
      })
      .await?;

    tracing::debug!(tree_id = %result.1, "ingested genome");
    Ok(result)
  }

  async fn delete_genome(&self, requester: &Session, genome: GenomeId) -> Result<()> {
    let requester_id = requester.user_id;
    let requester_tier = requester.tier;

    self
      .with_tx(move |tx| {
        let (owner_id, owner_tier) =
          genome_owner(tx, genome)?.ok_or(CoreError::GenomeNotFound(genome))?;

        if requester_id != owner_id && !requester_tier.outranks(owner_tier) {
          return Err(
            CoreError::InsufficientPrivilege("not the genome's owner").into(),
          );
        }

        let blob_id: i64 = tx.query_row(
          "SELECT sequence_blob FROM genomes WHERE id = ?1",
          rusqlite::params![genome.0],
          |r| r.get(0),
        )?;

        tx.execute(
          "DELETE FROM aligned_markers WHERE genome_id = ?1",
          rusqlite::params![genome.0],
        )?;
        tx.execute(
          "DELETE FROM genome_list_contents WHERE genome_id = ?1",
          rusqlite::params![genome.0],
        )?;
        tx.execute("DELETE FROM genomes WHERE id = ?1", rusqlite::params![genome.0])?;
        tx.execute(
          "DELETE FROM sequence_blobs WHERE id = ?1",
          rusqlite::params![blob_id],
        )?;
        Ok(())
      })
      .await?;

    tracing::debug!(genome = genome.0, "deleted genome");
    Ok(())
  }

  async fn lookup_genome(&self, key: &GenomeKey) -> Result<Option<GenomeId>> {
    let key = key.clone();
    let id = self.conn.call(move |conn| Ok(resolve_key(conn, &key)?)).await?;
    Ok(id)
  }

  async fn get_genome(&self, genome: GenomeId) -> Result<Option<Genome>> {
    let raw: Option<RawGenome> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT id, tree_id, name, description, owner_id, source_id, id_at_source
               FROM genomes WHERE id = ?1",
              rusqlite::params![genome.0],
              |r| {
                Ok(RawGenome {
                  id:           r.get(0)?,
                  tree_id:      r.get(1)?,
                  name:         r.get(2)?,
                  description:  r.get(3)?,
                  owner_id:     r.get(4)?,
                  source_id:    r.get(5)?,
                  id_at_source: r.get(6)?,
                })
              },
            )
            .optional()?,
        )
      })
      .await?;

    raw
      .map(RawGenome::into_genome)
      .transpose()
      .map_err(Error::Core)
  }

  async fn search_genomes(&self, filter: &GenomeFilter) -> Result<Vec<GenomeHit>> {
    use rusqlite::types::Value;

    // Build WHERE clause dynamically; every supplied filter ANDs in.
    let mut conds: Vec<String> = Vec::new();
    let mut values: Vec<Value> = Vec::new();

    if let Some(name) = &filter.name {
      values.push(Value::Text(format!("%{}%", escape_like(&name.to_lowercase()))));
      conds.push(format!("LOWER(g.name) LIKE ?{} ESCAPE '\\'", values.len()));
    }
    if let Some(description) = &filter.description {
      values.push(Value::Text(format!(
        "%{}%",
        escape_like(&description.to_lowercase())
      )));
      conds.push(format!(
        "LOWER(g.description) LIKE ?{} ESCAPE '\\'",
        values.len()
      ));
    }
    if let Some(owner) = filter.owner {
      values.push(Value::Integer(owner.0));
      conds.push(format!("g.owner_id = ?{}", values.len()));
    }
    if let Some(list) = filter.list {
      values.push(Value::Integer(list.0));
      conds.push(format!(
        "EXISTS (SELECT 1 FROM genome_list_contents c
                 WHERE c.list_id = ?{} AND c.genome_id = g.id)",
        values.len()
      ));
    }

    let where_clause = if conds.is_empty() {
      String::new()
    } else {
      format!("WHERE {}", conds.join(" AND "))
    };

    let raws: Vec<RawHit> = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT g.tree_id, g.name, u.username, g.metadata, g.description
           FROM genomes g JOIN users u ON u.id = g.owner_id
           {where_clause}"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(values), |r| {
            Ok(RawHit {
              tree_id:     r.get(0)?,
              name:        r.get(1)?,
              owner_name:  r.get(2)?,
              metadata:    r.get(3)?,
              description: r.get(4)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws
      .into_iter()
      .map(|raw| raw.into_hit().map_err(Error::Core))
      .collect()
  }

  async fn export_sequence(&self, genome: GenomeId) -> Result<Vec<u8>> {
    let data: Option<Vec<u8>> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT b.data FROM genomes g
               JOIN sequence_blobs b ON b.id = g.sequence_blob
               WHERE g.id = ?1",
              rusqlite::params![genome.0],
              |r| r.get(0),
            )
            .optional()?,
        )
      })
      .await?;
    data.ok_or_else(|| CoreError::GenomeNotFound(genome).into())
  }

  // ── Derived marker records ──────────────────────────────────────────────

  async fn store_markers(
    &self,
    requester: &Session,
    genome: GenomeId,
    markers: BTreeMap<String, String>,
  ) -> Result<()> {
    let requester_id = requester.user_id;
    let requester_tier = requester.tier;

    self
      .with_tx(move |tx| {
        let (owner_id, owner_tier) =
          genome_owner(tx, genome)?.ok_or(CoreError::GenomeNotFound(genome))?;

        if requester_id != owner_id && !requester_tier.outranks(owner_tier) {
          return Err(
            CoreError::InsufficientPrivilege("not the genome's owner").into(),
          );
        }

        // Recalculation replaces the genome's whole marker set.
        tx.execute(
          "DELETE FROM aligned_markers WHERE genome_id = ?1",
          rusqlite::params![genome.0],
        )?;
        let mut stmt = tx.prepare(
          "INSERT INTO aligned_markers (genome_id, marker_id, sequence)
           VALUES (?1, ?2, ?3)",
        )?;
        for (marker_id, sequence) in &markers {
          stmt.execute(rusqlite::params![genome.0, marker_id, sequence])?;
        }
        Ok(())
      })
      .await
  }

  async fn markers_for(&self, genome: GenomeId) -> Result<BTreeMap<String, String>> {
    let markers = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT marker_id, sequence FROM aligned_markers WHERE genome_id = ?1",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![genome.0], |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?))
          })?
          .collect::<rusqlite::Result<BTreeMap<_, _>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(markers)
  }

  // ── Genome lists ────────────────────────────────────────────────────────

  async fn create_list(
    &self,
    requester: &Session,
    owner: UserId,
    name: &str,
    description: &str,
    members: &BTreeSet<GenomeId>,
    private: bool,
  ) -> Result<ListId> {
    let requester_id = requester.user_id;
    let requester_tier = requester.tier;
    let name = name.to_owned();
    let description = description.to_owned();
    let members = members.clone();

    self
      .with_tx(move |tx| {
        insert_list(
          tx,
          requester_id,
          requester_tier,
          owner,
          &name,
          &description,
          &members,
          private,
        )
      })
      .await
  }

  async fn clone_list(
    &self,
    requester: &Session,
    source_list: ListId,
    name: &str,
    description: &str,
    owner: UserId,
    private: bool,
  ) -> Result<ListId> {
    let requester_id = requester.user_id;
    let requester_tier = requester.tier;
    let name = name.to_owned();
    let description = description.to_owned();

    self
      .with_tx(move |tx| {
        let (src_owner, src_owner_tier, src_private) = list_row(tx, source_list)?
          .ok_or(CoreError::ListNotFound(source_list))?;

        // Same visibility predicate as `visible_lists`.
        let visible = !src_private
          || src_owner == requester_id
          || requester_tier.outranks(src_owner_tier);
        if !visible {
          return Err(
            CoreError::InsufficientPrivilege("list is not visible to you").into(),
          );
        }

        let mut stmt = tx.prepare(
          "SELECT genome_id FROM genome_list_contents WHERE list_id = ?1",
        )?;
        let members = stmt
          .query_map(rusqlite::params![source_list.0], |r| {
            Ok(GenomeId(r.get(0)?))
          })?
          .collect::<rusqlite::Result<BTreeSet<_>>>()?;
        drop(stmt);

        insert_list(
          tx,
          requester_id,
          requester_tier,
          owner,
          &name,
          &description,
          &members,
          private,
        )
      })
      .await
  }

  async fn reconcile_members(
    &self,
    candidates: &[String],
    source: Option<SourceId>,
  ) -> Result<Reconciliation> {
    // Blank rows are dropped before resolution.
    let candidates: Vec<String> = candidates
      .iter()
      .map(|c| c.trim().to_owned())
      .filter(|c| !c.is_empty())
      .collect();

    let outcome = self
      .conn
      .call(move |conn| {
        let mut outcome = Reconciliation::default();
        let mut stmt = match source {
          Some(_) => conn.prepare(
            "SELECT id FROM genomes WHERE source_id = ?1 AND id_at_source = ?2",
          )?,
          None => conn.prepare("SELECT id FROM genomes WHERE tree_id = ?1")?,
        };

        for candidate in candidates {
          let id: Option<i64> = match source {
            Some(sid) => stmt
              .query_row(rusqlite::params![sid.0, candidate], |r| r.get(0))
              .optional()?,
            None => stmt
              .query_row(rusqlite::params![candidate], |r| r.get(0))
              .optional()?,
          };
          match id {
            Some(id) => {
              outcome.resolved.insert(GenomeId(id));
            }
            None => {
              outcome.unresolved.insert(candidate);
            }
          }
        }
        Ok(outcome)
      })
      .await?;

    if !outcome.unresolved.is_empty() {
      tracing::warn!(
        unresolved = outcome.unresolved.len(),
        "membership batch had unresolved identifiers"
      );
    }
    Ok(outcome)
  }

  async fn modify_list(
    &self,
    requester: &Session,
    list: ListId,
    update: ListUpdate,
  ) -> Result<()> {
    let requester_id = requester.user_id;
    let requester_tier = requester.tier;

    self
      .with_tx(move |tx| {
        let (owner_id, owner_tier, _) =
          list_row(tx, list)?.ok_or(CoreError::ListNotFound(list))?;

        if requester_id != owner_id && !requester_tier.outranks(owner_tier) {
          return Err(
            CoreError::InsufficientPrivilege("not the list's owner").into(),
          );
        }

        if let Some(name) = &update.name {
          tx.execute(
            "UPDATE genome_lists SET name = ?1 WHERE id = ?2",
            rusqlite::params![name, list.0],
          )?;
        }
        if let Some(description) = &update.description {
          tx.execute(
            "UPDATE genome_lists SET description = ?1 WHERE id = ?2",
            rusqlite::params![description, list.0],
          )?;
        }
        if let Some(make_public) = update.make_public {
          tx.execute(
            "UPDATE genome_lists SET private = ?1 WHERE id = ?2",
            rusqlite::params![!make_public, list.0],
          )?;
        }

        if let Some(delta) = &update.delta {
          match delta.op {
            // Set union: re-adding a member is a no-op.
            DeltaOp::Add => {
              let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO genome_list_contents (list_id, genome_id)
                 VALUES (?1, ?2)",
              )?;
              for member in &delta.ids {
                stmt.execute(rusqlite::params![list.0, member.0])?;
              }
            }
            // Set difference: removing a non-member is a no-op.
            DeltaOp::Remove => {
              let mut stmt = tx.prepare(
                "DELETE FROM genome_list_contents
                 WHERE list_id = ?1 AND genome_id = ?2",
              )?;
              for member in &delta.ids {
                stmt.execute(rusqlite::params![list.0, member.0])?;
              }
            }
          }
        }
        Ok(())
      })
      .await
  }

  async fn delete_list(
    &self,
    requester: &Session,
    list: ListId,
    confirm: bool,
  ) -> Result<()> {
    let requester_id = requester.user_id;
    let requester_tier = requester.tier;

    self
      .with_tx(move |tx| {
        let (owner_id, owner_tier, _) =
          list_row(tx, list)?.ok_or(CoreError::ListNotFound(list))?;

        if requester_id != owner_id && !requester_tier.outranks(owner_tier) {
          return Err(
            CoreError::InsufficientPrivilege("not the list's owner").into(),
          );
        }

        // Dry run: interactive callers authorize first, prompt, then confirm.
        if !confirm {
          return Ok(());
        }

        tx.execute(
          "DELETE FROM genome_list_contents WHERE list_id = ?1",
          rusqlite::params![list.0],
        )?;
        tx.execute(
          "DELETE FROM genome_lists WHERE id = ?1",
          rusqlite::params![list.0],
        )?;
        Ok(())
      })
      .await
  }

  async fn visible_lists(
    &self,
    requester: &Session,
    owner: Option<UserId>,
  ) -> Result<Vec<ListSummary>> {
    let requester_id = requester.user_id;
    let requester_tier = requester.tier;

    let lists = self
      .conn
      .call(move |conn| {
        // Visible: public, owned by the requester, or owned by someone the
        // requester outranks (owner tier numerically above requester tier).
        let base = "SELECT l.id, l.name, l.description, u.username, l.private
                    FROM genome_lists l JOIN users u ON u.id = l.owner_id
                    WHERE (l.private = 0 OR l.owner_id = ?1 OR u.tier > ?2)";

        let map = |r: &rusqlite::Row<'_>| {
          Ok(ListSummary {
            id:          ListId(r.get(0)?),
            name:        r.get(1)?,
            description: r.get(2)?,
            owner_name:  r.get(3)?,
            private:     r.get(4)?,
          })
        };

        let rows = if let Some(owner) = owner {
          let sql = format!("{base} AND l.owner_id = ?3 ORDER BY l.id");
          let mut stmt = conn.prepare(&sql)?;
          stmt
            .query_map(
              rusqlite::params![requester_id.0, requester_tier.0, owner.0],
              map,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?
        } else {
          let sql = format!("{base} ORDER BY l.id");
          let mut stmt = conn.prepare(&sql)?;
          stmt
            .query_map(rusqlite::params![requester_id.0, requester_tier.0], map)?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };
        Ok(rows)
      })
      .await?;
    Ok(lists)
  }

  async fn list_members(&self, list: ListId) -> Result<BTreeSet<GenomeId>> {
    self
      .with_tx(move |tx| {
        if list_row(tx, list)?.is_none() {
          return Err(CoreError::ListNotFound(list).into());
        }
        let mut stmt = tx.prepare(
          "SELECT genome_id FROM genome_list_contents WHERE list_id = ?1",
        )?;
        let members = stmt
          .query_map(rusqlite::params![list.0], |r| Ok(GenomeId(r.get(0)?)))?
          .collect::<rusqlite::Result<BTreeSet<_>>>()?;
        Ok(members)
      })
      .await
  }

  // ── Metadata documents ──────────────────────────────────────────────────

  async fn metadata_get(
    &self,
    genome: GenomeId,
    path: &[&str],
  ) -> Result<Option<String>> {
    let path: Vec<String> = path.iter().map(|s| s.to_string()).collect();
    self
      .with_tx(move |tx| {
        let doc = load_document(tx, genome)?;
        let path: Vec<&str> = path.iter().map(String::as_str).collect();
        Ok(doc.text_at(&path).map(str::to_owned))
      })
      .await
  }

  async fn metadata_upsert(
    &self,
    genome: GenomeId,
    path: &[&str],
    value: &str,
  ) -> Result<()> {
    let path: Vec<String> = path.iter().map(|s| s.to_string()).collect();
    let value = value.to_owned();
    self
      .with_tx(move |tx| {
        // Whole-document read-modify-write, serialized by the connection.
        let mut doc = load_document(tx, genome)?;
        let path: Vec<&str> = path.iter().map(String::as_str).collect();
        doc.upsert_path(&path, &value);
        store_document(tx, genome, &doc)?;
        Ok(())
      })
      .await
  }

  async fn metadata_remove(&self, genome: GenomeId, path: &[&str]) -> Result<()> {
    let path: Vec<String> = path.iter().map(|s| s.to_string()).collect();
    self
      .with_tx(move |tx| {
        let mut doc = load_document(tx, genome)?;
        let path_refs: Vec<&str> = path.iter().map(String::as_str).collect();
        if !doc.remove_path(&path_refs) {
          return Err(CoreError::MetadataPathNotFound(path.join("/")).into());
        }
        store_document(tx, genome, &doc)?;
        Ok(())
      })
      .await
  }
}

//! `genobase` — command-line front end for the curated genome repository.
//!
//! # Usage
//!
//! ```
//! genobase bootstrap root
//! genobase --user alice add-genome genome.fna --name "E. coli K-12"
//! genobase search-genomes --name coli
//! ```
//!
//! Credentials come from `--user` (or the config file) plus a password read
//! from `GENOBASE_PASSWORD` or prompted on stdin.

use std::{
  collections::{BTreeMap, BTreeSet},
  io::Write as _,
  path::PathBuf,
};

use anyhow::{Context as _, Result, bail};
use clap::{Args, Parser, Subcommand};
use genobase_core::{
  auth,
  genome::{GenomeFilter, GenomeId, GenomeKey, NewGenome, TreeId},
  list::{DeltaOp, ListId, ListUpdate, MemberDelta},
  store::GenomeStore,
  user::{Session, Tier, UserId},
};
use genobase_store_sqlite::SqliteStore;
use serde::Deserialize;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "genobase", version, about = "Curated genome repository")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "genobase.toml")]
  config: PathBuf,

  /// SQLite database path (overrides the config file).
  #[arg(long)]
  db: Option<PathBuf>,

  /// Username to authenticate as (overrides the config file).
  #[arg(short, long)]
  user: Option<String>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Create the first (root-tier) account in an empty repository.
  Bootstrap {
    /// Username for the root account.
    username: String,
  },

  /// Create a user account at a given privilege tier.
  CreateUser {
    username: String,
    /// Privilege tier; lower values outrank higher ones.
    #[arg(long)]
    tier:     i64,
    /// Password for the new account; generated and printed when omitted.
    #[arg(long)]
    password: Option<String>,
  },

  /// Change a user's password and/or privilege tier.
  ModifyUser {
    username: String,
    /// Prompt for a new password.
    #[arg(long)]
    password: bool,
    /// New privilege tier.
    #[arg(long)]
    tier:     Option<i64>,
  },

  /// List the known genome source namespaces.
  ShowSources,

  /// Ingest a FASTA file as a new genome record.
  AddGenome {
    /// Path to the FASTA file.
    fasta: PathBuf,
    #[arg(long)]
    name: String,
    #[arg(long, default_value = "")]
    description: String,
    /// Tree identifier prefix letter.
    #[arg(long, default_value_t = 'C')]
    prefix: char,
    /// Source namespace; defaults to the reserved 'user' source.
    #[arg(long)]
    source: Option<String>,
    /// Identifier at the external source; requires --source.
    #[arg(long, requires = "source")]
    accession: Option<String>,
  },

  /// Ingest genomes listed in a batch file (per line: path, name,
  /// description, tab-separated).
  AddGenomeBatch {
    batch:  PathBuf,
    #[arg(long, default_value_t = 'C')]
    prefix: char,
  },

  /// Write a genome's sequence to a file or stdout.
  ExportFasta {
    #[command(flatten)]
    selector: GenomeSelector,
    /// Output path; stdout when omitted.
    #[arg(long)]
    output:   Option<PathBuf>,
  },

  /// Delete a genome and everything derived from it.
  DeleteGenome {
    #[command(flatten)]
    selector: GenomeSelector,
  },

  /// Search genome records; filters AND together.
  SearchGenomes {
    /// Case-insensitive substring on the name.
    #[arg(long)]
    name:        Option<String>,
    /// Case-insensitive substring on the description.
    #[arg(long)]
    description: Option<String>,
    /// Restrict to members of a list.
    #[arg(long)]
    list:        Option<i64>,
    /// Restrict to genomes owned by a user.
    #[arg(long)]
    owner:       Option<String>,
  },

  /// Create a genome list, optionally seeded from an identifier file.
  CreateList {
    #[arg(long)]
    name: String,
    #[arg(long, default_value = "")]
    description: String,
    /// File of genome identifiers, one per line.
    #[arg(long)]
    identifiers: Option<PathBuf>,
    /// Resolve identifiers against this source instead of tree identifiers.
    #[arg(long, requires = "identifiers")]
    source: Option<String>,
    /// Create the list for another user (requires outranking them).
    #[arg(long)]
    owner: Option<String>,
    /// Make the list visible to everyone.
    #[arg(long)]
    public: bool,
    /// Proceed with the resolved subset when some identifiers are unknown.
    #[arg(long)]
    allow_partial: bool,
  },

  /// Copy an existing list's membership into a new list.
  CloneList {
    /// Numeric id of the list to copy.
    list: i64,
    #[arg(long)]
    name: String,
    #[arg(long, default_value = "")]
    description: String,
    #[arg(long)]
    owner: Option<String>,
    #[arg(long)]
    public: bool,
  },

  /// Rename a list, change its visibility, or edit its membership.
  ModifyList {
    /// Numeric id of the list.
    list: i64,
    #[arg(long)]
    rename: Option<String>,
    #[arg(long)]
    description: Option<String>,
    #[arg(long, conflicts_with = "private")]
    public: bool,
    #[arg(long)]
    private: bool,
    /// File of identifiers to add, one per line.
    #[arg(long, conflicts_with = "remove")]
    add: Option<PathBuf>,
    /// File of identifiers to remove, one per line.
    #[arg(long)]
    remove: Option<PathBuf>,
    /// Resolve identifier files against this source.
    #[arg(long)]
    source: Option<String>,
    #[arg(long)]
    allow_partial: bool,
  },

  /// Delete a list. Without --force this is a dry run.
  DeleteList {
    list:  i64,
    #[arg(long)]
    force: bool,
  },

  /// Show the lists visible to the authenticated user.
  ShowLists {
    /// Restrict to lists owned by a user.
    #[arg(long)]
    owner: Option<String>,
  },

  /// Read or edit a genome's metadata document.
  #[command(subcommand)]
  Metadata(MetadataCommand),

  /// Import aligned markers from a tab-separated file (marker id, sequence),
  /// replacing the genome's current marker set.
  ImportMarkers {
    #[command(flatten)]
    selector: GenomeSelector,
    /// Path to the marker file.
    markers:  PathBuf,
  },
}

#[derive(Subcommand)]
enum MetadataCommand {
  /// Print the text at a slash-separated path, e.g. internal/taxonomy.
  Get {
    #[command(flatten)]
    selector: GenomeSelector,
    path:     String,
  },
  /// Set the text at a path, creating intermediate nodes as needed.
  Set {
    #[command(flatten)]
    selector: GenomeSelector,
    path:     String,
    value:    String,
  },
  /// Remove the node at a path, including any children.
  Remove {
    #[command(flatten)]
    selector: GenomeSelector,
    path:     String,
  },
}

/// Identifies one genome, either by tree identifier or by an accession
/// scoped to a source. Mixing the two modes is rejected.
#[derive(Args)]
struct GenomeSelector {
  /// Tree identifier, e.g. C00000042.
  #[arg(long, conflicts_with_all = ["source", "accession"])]
  tree_id:   Option<String>,
  /// Source namespace; must be paired with --accession.
  #[arg(long, requires = "accession")]
  source:    Option<String>,
  /// Identifier at the external source.
  #[arg(long, requires = "source")]
  accession: Option<String>,
}

impl GenomeSelector {
  async fn resolve(&self, store: &SqliteStore) -> Result<GenomeId> {
    let key = match (&self.tree_id, &self.source, &self.accession) {
      (Some(tree), None, None) => GenomeKey::Tree(tree.parse::<TreeId>()?),
      (None, Some(source), Some(accession)) => {
        let source = store.source_id_by_name(source).await?;
        GenomeKey::AtSource { source, id_at_source: accession.clone() }
      }
      _ => bail!("specify either --tree-id or both --source and --accession"),
    };
    match store.lookup_genome(&key).await? {
      Some(id) => Ok(id),
      None => bail!("no genome matches the given identifier"),
    }
  }
}

// ─── Config file ──────────────────────────────────────────────────────────────

/// Shape of the optional TOML config file; every field may also come from a
/// `GENOBASE_*` environment variable.
#[derive(Deserialize)]
struct Settings {
  #[serde(default = "default_db_path")]
  db_path:  PathBuf,
  #[serde(default)]
  username: String,
}

fn default_db_path() -> PathBuf {
  PathBuf::from("genobase.sqlite")
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  // Load configuration; CLI flags override file and environment.
  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config.clone()).required(false))
    .add_source(config::Environment::with_prefix("GENOBASE"))
    .build()
    .context("failed to read config file")?;
  let settings: Settings = settings
    .try_deserialize()
    .context("failed to deserialise settings")?;

  let db_path = cli.db.clone().unwrap_or(settings.db_path);
  let username = cli
    .user
    .clone()
    .unwrap_or(settings.username);

  let store = SqliteStore::open(&db_path)
    .await
    .with_context(|| format!("failed to open store at {db_path:?}"))?;

  run(cli.command, &store, &username).await
}

async fn run(command: Command, store: &SqliteStore, username: &str) -> Result<()> {
  match command {
    Command::Bootstrap { username } => {
      let password = read_password()?;
      store.bootstrap_root(&username, &password).await?;
      println!("created root account '{username}'");
    }

    Command::CreateUser { username: new_user, tier, password } => {
      let session = login(store, username).await?;
      let (password, generated) = match password {
        Some(p) => (p, false),
        None => (auth::generate_secret(), true),
      };
      store
        .create_user(&session, &new_user, &password, Tier(tier))
        .await?;
      if generated {
        println!("created '{new_user}' at tier {tier}; password: {password}");
      } else {
        println!("created '{new_user}' at tier {tier}");
      }
    }

    Command::ModifyUser { username: target, password, tier } => {
      let session = login(store, username).await?;
      let target_id = store.user_id_by_name(&target).await?;
      let new_password = if password {
        Some(prompt_password("New password: ")?)
      } else {
        None
      };
      store
        .modify_user(&session, target_id, new_password.as_deref(), tier.map(Tier))
        .await?;
      println!("updated '{target}'");
    }

    Command::ShowSources => {
      for source in store.list_sources().await? {
        println!("{}\t{}", source.id.0, source.name);
      }
    }

    Command::AddGenome { fasta, name, description, prefix, source, accession } => {
      let session = login(store, username).await?;
      let (_, tree_id) = ingest_file(
        store, &session, &fasta, &name, &description, prefix,
        source.as_deref(), accession,
      )
      .await?;
      println!("{tree_id}\t{name}");
    }

    Command::AddGenomeBatch { batch, prefix } => {
      let session = login(store, username).await?;
      let raw = std::fs::read_to_string(&batch)
        .with_context(|| format!("reading batch file {batch:?}"))?;
      let (added, failed) = ingest_batch(store, &session, &raw, prefix).await;
      println!("added {added} genomes ({failed} failed)");
    }

    Command::ExportFasta { selector, output } => {
      let genome_id = selector.resolve(store).await?;
      let sequence = store.export_sequence(genome_id).await?;
      match output {
        Some(path) => std::fs::write(&path, &sequence)
          .with_context(|| format!("writing {path:?}"))?,
        None => std::io::stdout().write_all(&sequence)?,
      }
    }

    Command::DeleteGenome { selector } => {
      let session = login(store, username).await?;
      let genome_id = selector.resolve(store).await?;
      store.delete_genome(&session, genome_id).await?;
      println!("deleted");
    }

    Command::SearchGenomes { name, description, list, owner } => {
      let owner = match owner {
        Some(name) => Some(store.user_id_by_name(&name).await?),
        None => None,
      };
      let filter = GenomeFilter {
        name,
        description,
        list: list.map(ListId),
        owner,
      };
      let hits = store.search_genomes(&filter).await?;
      println!("tree_id\tname\towner\tadded\tdescription");
      for hit in hits {
        println!(
          "{}\t{}\t{}\t{}\t{}",
          hit.tree_id, hit.name, hit.owner_name, hit.added, hit.description
        );
      }
    }

    Command::CreateList {
      name,
      description,
      identifiers,
      source,
      owner,
      public,
      allow_partial,
    } => {
      let session = login(store, username).await?;
      let members = match identifiers {
        Some(path) => {
          resolve_identifier_file(store, &path, source.as_deref(), allow_partial)
            .await?
        }
        None => BTreeSet::new(),
      };
      let owner = resolve_owner(store, &session, owner).await?;
      let list = store
        .create_list(&session, owner, &name, &description, &members, !public)
        .await?;
      println!("created list {} with {} members", list.0, members.len());
    }

    Command::CloneList { list, name, description, owner, public } => {
      let session = login(store, username).await?;
      let owner = resolve_owner(store, &session, owner).await?;
      let copy = store
        .clone_list(&session, ListId(list), &name, &description, owner, !public)
        .await?;
      println!("created list {}", copy.0);
    }

    Command::ModifyList {
      list,
      rename,
      description,
      public,
      private,
      add,
      remove,
      source,
      allow_partial,
    } => {
      let session = login(store, username).await?;
      let delta = match (add, remove) {
        (Some(path), None) => Some(MemberDelta {
          ids: resolve_identifier_file(store, &path, source.as_deref(), allow_partial)
            .await?,
          op:  DeltaOp::Add,
        }),
        (None, Some(path)) => Some(MemberDelta {
          ids: resolve_identifier_file(store, &path, source.as_deref(), allow_partial)
            .await?,
          op:  DeltaOp::Remove,
        }),
        (None, None) => None,
        (Some(_), Some(_)) => bail!("--add and --remove are mutually exclusive"),
      };
      let make_public = match (public, private) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
      };
      let update = ListUpdate {
        name: rename,
        description,
        make_public,
        delta,
      };
      store.modify_list(&session, ListId(list), update).await?;
      println!("updated list {list}");
    }

    Command::DeleteList { list, force } => {
      let session = login(store, username).await?;
      store.delete_list(&session, ListId(list), force).await?;
      if force {
        println!("deleted list {list}");
      } else {
        println!("dry run: list {list} would be deleted; pass --force to commit");
      }
    }

    Command::ShowLists { owner } => {
      let session = login(store, username).await?;
      let owner = match owner {
        Some(name) => Some(store.user_id_by_name(&name).await?),
        None => None,
      };
      println!("id\tname\towner\tvisibility\tdescription");
      for list in store.visible_lists(&session, owner).await? {
        let visibility = if list.private { "private" } else { "public" };
        println!(
          "{}\t{}\t{}\t{}\t{}",
          list.id.0, list.name, list.owner_name, visibility, list.description
        );
      }
    }

    Command::Metadata(action) => match action {
      MetadataCommand::Get { selector, path } => {
        let genome_id = selector.resolve(store).await?;
        match store.metadata_get(genome_id, &split_path(&path)).await? {
          Some(text) => println!("{text}"),
          None => bail!("no value at '{path}'"),
        }
      }
      MetadataCommand::Set { selector, path, value } => {
        let genome_id = selector.resolve(store).await?;
        store
          .metadata_upsert(genome_id, &split_path(&path), &value)
          .await?;
      }
      MetadataCommand::Remove { selector, path } => {
        let genome_id = selector.resolve(store).await?;
        store.metadata_remove(genome_id, &split_path(&path)).await?;
      }
    },

    Command::ImportMarkers { selector, markers } => {
      let session = login(store, username).await?;
      let genome_id = selector.resolve(store).await?;
      let raw = std::fs::read_to_string(&markers)
        .with_context(|| format!("reading marker file {markers:?}"))?;
      let mut parsed = BTreeMap::new();
      for (lineno, line) in raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
          continue;
        }
        let Some((marker_id, sequence)) = line.split_once('\t') else {
          bail!("marker line {}: expected marker_id<TAB>sequence", lineno + 1);
        };
        parsed.insert(marker_id.to_owned(), sequence.to_owned());
      }
      let count = parsed.len();
      store.store_markers(&session, genome_id, parsed).await?;
      println!("imported {count} markers");
    }
  }

  Ok(())
}

// ─── Helpers ──────────────────────────────────────────────────────────────────

/// Authenticate the configured user, prompting for the password.
async fn login(store: &SqliteStore, username: &str) -> Result<Session> {
  if username.is_empty() {
    bail!("no username; pass --user or set `username` in the config file");
  }
  let password = read_password()?;
  Ok(store.authenticate(username, &password).await?)
}

/// Password from `GENOBASE_PASSWORD`, or prompted on stdin.
fn read_password() -> Result<String> {
  if let Ok(password) = std::env::var("GENOBASE_PASSWORD") {
    return Ok(password);
  }
  prompt_password("Password: ")
}

fn prompt_password(prompt: &str) -> Result<String> {
  use std::io::{self, BufRead};
  print!("{prompt}");
  io::stdout().flush().ok();
  let mut line = String::new();
  io::stdin().lock().read_line(&mut line)?;
  Ok(
    line
      .trim_end_matches('\n')
      .trim_end_matches('\r')
      .to_string(),
  )
}

/// Read a FASTA file and ingest it as a new genome record.
async fn ingest_file(
  store: &SqliteStore,
  session: &Session,
  fasta: &PathBuf,
  name: &str,
  description: &str,
  prefix: char,
  source: Option<&str>,
  accession: Option<String>,
) -> Result<(GenomeId, TreeId)> {
  let sequence = std::fs::read(fasta)
    .with_context(|| format!("reading FASTA file {fasta:?}"))?;
  let source = match source {
    Some(name) => Some(store.source_id_by_name(name).await?),
    None => None,
  };
  let genome = NewGenome {
    prefix,
    source,
    id_at_source: accession,
    name: name.to_owned(),
    description: description.to_owned(),
    sequence,
  };
  Ok(store.ingest(session, genome).await?)
}

/// Ingest every line of a batch file (per line: path, name, description,
/// tab-separated; blank lines and `#` comments skipped). A failing line is
/// reported on stderr and does not stop the rest of the batch. Returns the
/// added and failed line counts.
async fn ingest_batch(
  store: &SqliteStore,
  session: &Session,
  raw: &str,
  prefix: char,
) -> (usize, usize) {
  let mut added = 0;
  let mut failed = 0;
  for (lineno, line) in raw.lines().enumerate() {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
      continue;
    }
    let mut fields = line.splitn(3, '\t');
    let (Some(path), Some(name)) = (fields.next(), fields.next()) else {
      eprintln!(
        "batch line {}: expected path<TAB>name[<TAB>description]",
        lineno + 1
      );
      failed += 1;
      continue;
    };
    let description = fields.next().unwrap_or("");
    match ingest_file(
      store, session, &PathBuf::from(path), name, description, prefix, None,
      None,
    )
    .await
    {
      Ok((_, tree_id)) => {
        println!("{tree_id}\t{name}");
        added += 1;
      }
      Err(e) => {
        eprintln!("batch line {}: {e:#}", lineno + 1);
        failed += 1;
      }
    }
  }
  (added, failed)
}

/// Resolve a file of genome identifiers (one per line) to record ids.
///
/// Unresolved identifiers are printed to stderr; unless `allow_partial` is
/// set, any unresolved identifier aborts the command.
async fn resolve_identifier_file(
  store: &SqliteStore,
  path: &PathBuf,
  source: Option<&str>,
  allow_partial: bool,
) -> Result<BTreeSet<GenomeId>> {
  let raw = std::fs::read_to_string(path)
    .with_context(|| format!("reading identifier file {path:?}"))?;
  let candidates: Vec<String> = raw.lines().map(str::to_owned).collect();
  let source = match source {
    Some(name) => Some(store.source_id_by_name(name).await?),
    None => None,
  };
  let outcome = store.reconcile_members(&candidates, source).await?;
  if !outcome.unresolved.is_empty() {
    for candidate in &outcome.unresolved {
      eprintln!("unresolved: {candidate}");
    }
    if !allow_partial {
      bail!(
        "{} identifiers could not be resolved; pass --allow-partial to \
         continue with the rest",
        outcome.unresolved.len()
      );
    }
  }
  Ok(outcome.resolved)
}

/// Split a slash-separated metadata path into its node names.
fn split_path(path: &str) -> Vec<&str> {
  path.split('/').filter(|part| !part.is_empty()).collect()
}

/// The list owner named on the command line, defaulting to the requester.
async fn resolve_owner(
  store: &SqliteStore,
  session: &Session,
  owner: Option<String>,
) -> Result<UserId> {
  match owner {
    Some(name) => Ok(store.user_id_by_name(&name).await?),
    None => Ok(session.user_id),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn batch_ingest_continues_past_failing_lines() {
    let store = SqliteStore::open_in_memory().await.expect("in-memory store");
    store.bootstrap_root("root", "rootpw").await.unwrap();
    let session = store.authenticate("root", "rootpw").await.unwrap();

    let dir =
      std::env::temp_dir().join(format!("genobase-batch-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let good = dir.join("good.fna");
    std::fs::write(&good, b">contig_1\nACGT\n").unwrap();
    let missing = dir.join("does-not-exist.fna");

    let batch = format!(
      "{}\tfirst\n{}\tbroken\n{}\tlast\n",
      good.display(),
      missing.display(),
      good.display(),
    );
    let (added, failed) = ingest_batch(&store, &session, &batch, 'C').await;
    assert_eq!((added, failed), (2, 1));

    // The line after the failure was still ingested.
    let last = store
      .lookup_genome(&GenomeKey::Tree("C00000002".parse().unwrap()))
      .await
      .unwrap();
    assert!(last.is_some());
  }

  #[tokio::test]
  async fn batch_ingest_counts_malformed_lines_as_failures() {
    let store = SqliteStore::open_in_memory().await.expect("in-memory store");
    store.bootstrap_root("root", "rootpw").await.unwrap();
    let session = store.authenticate("root", "rootpw").await.unwrap();

    // No tab separator, plus a comment and a blank line that are skipped.
    let batch = "# header\n\nnot-a-valid-line\n";
    let (added, failed) = ingest_batch(&store, &session, batch, 'C').await;
    assert_eq!((added, failed), (0, 1));
  }
}

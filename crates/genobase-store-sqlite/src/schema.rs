//! SQL schema for the genobase SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS users (
    id            INTEGER PRIMARY KEY,
    username      TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,   -- argon2 PHC string
    tier          INTEGER NOT NULL -- lower value = more privileged; 0 = root
);

CREATE TABLE IF NOT EXISTS genome_sources (
    id   INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE
);

-- The reserved namespace for direct user submissions.
INSERT OR IGNORE INTO genome_sources (name) VALUES ('user');

-- Sequence payloads are detached from the genome row so record reads never
-- drag megabytes of FASTA along.
CREATE TABLE IF NOT EXISTS sequence_blobs (
    id   INTEGER PRIMARY KEY,
    data BLOB NOT NULL
);

CREATE TABLE IF NOT EXISTS genomes (
    id            INTEGER PRIMARY KEY,
    tree_id       TEXT NOT NULL UNIQUE,  -- e.g. 'C00000042'; immutable
    name          TEXT NOT NULL,
    description   TEXT NOT NULL,
    metadata      TEXT NOT NULL,         -- whole XML document
    owner_id      INTEGER NOT NULL REFERENCES users(id),
    source_id     INTEGER NOT NULL REFERENCES genome_sources(id),
    id_at_source  TEXT NOT NULL,
    sequence_blob INTEGER NOT NULL REFERENCES sequence_blobs(id),
    UNIQUE (source_id, id_at_source)
);

CREATE TABLE IF NOT EXISTS genome_lists (
    id          INTEGER PRIMARY KEY,
    name        TEXT NOT NULL,
    description TEXT NOT NULL,
    owner_id    INTEGER NOT NULL REFERENCES users(id),
    private     INTEGER NOT NULL DEFAULT 1
);

-- Membership is a set: the composite key forbids duplicates.
CREATE TABLE IF NOT EXISTS genome_list_contents (
    list_id   INTEGER NOT NULL REFERENCES genome_lists(id),
    genome_id INTEGER NOT NULL REFERENCES genomes(id),
    PRIMARY KEY (list_id, genome_id)
);

-- Derived records from the external marker-calling pipeline.
CREATE TABLE IF NOT EXISTS aligned_markers (
    genome_id INTEGER NOT NULL REFERENCES genomes(id),
    marker_id TEXT NOT NULL,
    sequence  TEXT NOT NULL,
    PRIMARY KEY (genome_id, marker_id)
);

CREATE INDEX IF NOT EXISTS lists_owner_idx    ON genome_lists(owner_id);
CREATE INDEX IF NOT EXISTS contents_genome_idx ON genome_list_contents(genome_id);

PRAGMA user_version = 1;
";

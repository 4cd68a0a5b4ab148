//! SQLite schema (§3 "Auxiliary tables", §6 "Persisted schema"). Created
//! once per `NodeDriver::open`; column types follow the PostgreSQL
//! conventions named in §6 but rendered as their SQLite equivalents since
//! the engine runs over `rusqlite` in WAL mode.

use rusqlite::Connection;

use openodin_core::{Error, Result};

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA foreign_keys = ON;

        CREATE TABLE IF NOT EXISTS nodes (
            id1             BLOB PRIMARY KEY,
            id2             BLOB,
            parentid        BLOB NOT NULL,
            owner           BLOB NOT NULL,
            creationtime    INTEGER NOT NULL,
            expiretime      INTEGER,
            storagetime     INTEGER NOT NULL,
            trailupdatetime INTEGER NOT NULL,
            region          BLOB,
            jurisdiction    BLOB,
            node_type       BLOB NOT NULL,
            is_public       INTEGER NOT NULL,
            is_licensed     INTEGER NOT NULL,
            bumphash        BLOB,
            uniquehash      BLOB NOT NULL UNIQUE,
            transienthash   BLOB NOT NULL,
            encoded         BLOB NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_nodes_creationtime ON nodes(creationtime);
        CREATE INDEX IF NOT EXISTS idx_nodes_storagetime ON nodes(storagetime);
        CREATE INDEX IF NOT EXISTS idx_nodes_trailupdatetime ON nodes(trailupdatetime);
        CREATE INDEX IF NOT EXISTS idx_nodes_expiretime ON nodes(expiretime);
        CREATE INDEX IF NOT EXISTS idx_nodes_id2 ON nodes(id2);
        CREATE INDEX IF NOT EXISTS idx_nodes_parentid ON nodes(parentid);
        CREATE INDEX IF NOT EXISTS idx_nodes_owner ON nodes(owner);
        CREATE INDEX IF NOT EXISTS idx_nodes_bumphash ON nodes(bumphash);

        CREATE TABLE IF NOT EXISTS achilles_hashes (
            id1  BLOB NOT NULL,
            hash BLOB NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_achilles_id1 ON achilles_hashes(id1);
        CREATE INDEX IF NOT EXISTS idx_achilles_hash ON achilles_hashes(hash);

        CREATE TABLE IF NOT EXISTS destroy_hashes (
            id1  BLOB NOT NULL,
            hash BLOB NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_destroy_id1 ON destroy_hashes(id1);
        CREATE INDEX IF NOT EXISTS idx_destroy_hash ON destroy_hashes(hash);

        CREATE TABLE IF NOT EXISTS licensing_hashes (
            license_id1           BLOB NOT NULL,
            hash                  BLOB NOT NULL,
            target_public_key     BLOB NOT NULL,
            max_distance           INTEGER NOT NULL,
            disallowretrolicensing INTEGER NOT NULL,
            parentpathhash         BLOB,
            restrictivemode_writer  INTEGER NOT NULL,
            restrictivemode_manager INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_licensing_id1 ON licensing_hashes(license_id1);
        CREATE INDEX IF NOT EXISTS idx_licensing_hash ON licensing_hashes(hash);
        CREATE INDEX IF NOT EXISTS idx_licensing_target_pk ON licensing_hashes(target_public_key);

        CREATE TABLE IF NOT EXISTS friend_certs (
            id1         BLOB NOT NULL,
            owner       BLOB NOT NULL,
            other_owner BLOB NOT NULL,
            constraints BLOB NOT NULL,
            image       BLOB NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_friend_certs_constraints ON friend_certs(constraints);
        CREATE INDEX IF NOT EXISTS idx_friend_certs_owner ON friend_certs(owner);
        CREATE INDEX IF NOT EXISTS idx_friend_certs_other_owner ON friend_certs(other_owner);
        ",
    )
    .map_err(|e| Error::storage(format!("init schema: {e}")))?;
    Ok(())
}

//! Ordered schema steps for the Jigyasa database.
//!
//! # Invariants
//! - Step versions start at 1 and increase by exactly one.
//! - Pending steps run inside one immediate transaction; a failed step
//!   leaves the previous version in place.
//! - The version is read again under the write lock, so connections racing
//!   on a fresh file apply each step once.

use crate::db::{DbError, DbResult};
use log::info;
use rusqlite::{Connection, TransactionBehavior};

struct SchemaStep {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

const STEPS: &[SchemaStep] = &[
    SchemaStep {
        version: 1,
        name: "accounts",
        sql: include_str!("0001_accounts.sql"),
    },
    SchemaStep {
        version: 2,
        name: "surveys",
        sql: include_str!("0002_surveys.sql"),
    },
    SchemaStep {
        version: 3,
        name: "analyzer",
        sql: include_str!("0003_analyzer.sql"),
    },
];

/// Schema versions before and after a migration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrationReport {
    pub from: u32,
    pub to: u32,
}

impl MigrationReport {
    pub fn applied(&self) -> u32 {
        self.to - self.from
    }
}

/// Highest schema version this build can create.
pub fn latest_version() -> u32 {
    STEPS.last().map_or(0, |step| step.version)
}

/// Brings `conn` up to [`latest_version`].
pub fn apply_migrations(conn: &mut Connection) -> DbResult<MigrationReport> {
    let latest = latest_version();
    let seen = schema_version(conn)?;
    check_supported(seen, latest)?;
    if seen == latest {
        return Ok(MigrationReport { from: seen, to: latest });
    }

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    // Another connection may have migrated while this one waited for the lock.
    let from = schema_version(&tx)?;
    check_supported(from, latest)?;
    if from == latest {
        return Ok(MigrationReport { from, to: latest });
    }

    for step in STEPS.iter().filter(|step| step.version > from) {
        tx.execute_batch(step.sql)?;
        tx.pragma_update(None, "user_version", step.version)?;
        info!(
            "event=db_migrate module=db status=ok version={} name={}",
            step.version, step.name
        );
    }
    tx.commit()?;

    Ok(MigrationReport { from, to: latest })
}

fn check_supported(version: u32, latest: u32) -> DbResult<()> {
    if version > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: version,
            latest_supported: latest,
        });
    }
    Ok(())
}

fn schema_version(conn: &Connection) -> DbResult<u32> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
}

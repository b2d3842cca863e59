use rusqlite::{params, Connection};

use crate::error::{BionetError, Result};

/// A schema migration compiled into the binary.
pub struct Migration {
    pub version: u32,
    pub name: &'static str,
    pub sql: &'static str,
}

/// Ordered by version; append only.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "001_biographical_tables",
        sql: include_str!("../../migrations/001_biographical_tables.sql"),
    },
    Migration {
        version: 2,
        name: "002_relation_indexes",
        sql: include_str!("../../migrations/002_relation_indexes.sql"),
    },
];

/// Tables the traversal engine reads from
pub const REQUIRED_TABLES: &[&str] = &[
    "association_codes",
    "associations",
    "kinship",
    "kinship_codes",
    "office_codes",
    "office_colleagues",
    "person_alt_names",
    "persons",
    "schema_migrations",
];

fn ensure_migrations_table(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;
    Ok(())
}

/// Get list of applied migration names, oldest first
pub fn get_applied_migrations(conn: &Connection) -> Result<Vec<String>> {
    ensure_migrations_table(conn)?;
    let mut stmt = conn.prepare("SELECT name FROM schema_migrations ORDER BY version")?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()
        .map_err(BionetError::Database)?;
    Ok(names)
}

/// Run all pending migrations, each inside its own transaction.
/// Returns how many were applied.
pub fn run_migrations(conn: &mut Connection) -> Result<usize> {
    let applied = get_applied_migrations(conn)?;
    let mut count = 0;

    for migration in MIGRATIONS {
        if applied.iter().any(|name| name == migration.name) {
            log::debug!("Migration {} already applied, skipping", migration.name);
            continue;
        }

        log::info!("Applying migration: {} (version {})", migration.name, migration.version);

        let tx = conn.transaction()?;
        tx.execute_batch(migration.sql).map_err(|e| {
            BionetError::Config(format!("Failed to execute migration {}: {}", migration.name, e))
        })?;
        tx.execute(
            "INSERT INTO schema_migrations (version, name) VALUES (?1, ?2)",
            params![migration.version, migration.name],
        )?;
        tx.commit()?;
        count += 1;
    }

    if count > 0 {
        log::info!("Applied {} migration(s)", count);
    }
    Ok(count)
}

/// Names of required tables absent from the database
pub fn missing_tables(conn: &Connection) -> Result<Vec<&'static str>> {
    let mut stmt = conn.prepare("SELECT name FROM sqlite_master WHERE type='table'")?;
    let tables = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;

    Ok(REQUIRED_TABLES
        .iter()
        .copied()
        .filter(|required| !tables.iter().any(|t| t == required))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_temp() -> (Connection, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let conn = Connection::open(temp_dir.path().join("test.db")).unwrap();
        (conn, temp_dir)
    }

    #[test]
    fn test_migrations_are_ordered() {
        let versions: Vec<u32> = MIGRATIONS.iter().map(|m| m.version).collect();
        let mut sorted = versions.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(versions, sorted);
    }

    #[test]
    fn test_run_migrations_creates_schema() {
        let (mut conn, _temp) = open_temp();
        let applied = run_migrations(&mut conn).unwrap();
        assert_eq!(applied, MIGRATIONS.len());
        assert!(missing_tables(&conn).unwrap().is_empty());

        let indexes: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='index' AND name LIKE 'idx_%'")
            .unwrap()
            .query_map([], |row| row.get::<_, String>(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()
            .unwrap();
        assert!(indexes.contains(&"idx_kinship_kin_person".to_string()));
        assert!(indexes.contains(&"idx_office_colleague".to_string()));
    }

    #[test]
    fn test_run_migrations_is_idempotent() {
        let (mut conn, _temp) = open_temp();
        run_migrations(&mut conn).unwrap();
        assert_eq!(run_migrations(&mut conn).unwrap(), 0);
        let applied = get_applied_migrations(&conn).unwrap();
        assert_eq!(applied, vec!["001_biographical_tables", "002_relation_indexes"]);
    }

    #[test]
    fn test_missing_tables_on_empty_db() {
        let (conn, _temp) = open_temp();
        let missing = missing_tables(&conn).unwrap();
        assert!(missing.contains(&"persons"));
        assert!(missing.contains(&"kinship"));
    }
}

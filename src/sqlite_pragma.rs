//! Connection PRAGMAs shared by every SQLite handle the crate opens

use rusqlite::Connection;

/// WAL journal, NORMAL sync, in-memory temp tables, 5s busy timeout.
///
/// Returns the journal mode SQLite actually selected ("memory" for in-memory databases).
pub fn apply_optimized_pragmas(conn: &Connection) -> rusqlite::Result<String> {
    let journal_mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "temp_store", "MEMORY")?;
    conn.busy_timeout(std::time::Duration::from_secs(5))?;

    log::debug!("SQLite pragmas applied (journal_mode={})", journal_mode);
    Ok(journal_mode)
}

use rusqlite::Connection;

pub fn migrate(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS mm_intel (
            wallet_id            TEXT PRIMARY KEY,
            threat_level         REAL NOT NULL,
            behavior_pattern     TEXT NOT NULL,
            trust_score          REAL NOT NULL,
            total_raids          INTEGER NOT NULL DEFAULT 1,
            historical_data_json TEXT NOT NULL, -- JSON
            last_seen_at         TEXT NOT NULL  -- RFC 3339, UTC, nanoseconds
        );

        CREATE TABLE IF NOT EXISTS radar_stats (
            id            INTEGER PRIMARY KEY CHECK (id = 1),
            snapshot_json TEXT NOT NULL,
            updated_at    TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_mm_intel_last_seen ON mm_intel(last_seen_at DESC);
        ",
    )?;
    Ok(())
}

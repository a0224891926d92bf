use log::warn;
use rusqlite::params;

use crate::db::DbPool;

/// Attempts allowed inside one window before a block kicks in.
pub const MAX_ATTEMPTS: i64 = 5;
/// Counting window, minutes.
pub const WINDOW_MINUTES: i64 = 15;
/// Block duration once the limit is hit, minutes.
pub const BLOCK_MINUTES: i64 = 30;

/// True while a (ip, action) pair is inside an active block.
pub fn is_blocked(pool: &DbPool, ip: &str, action: &str) -> bool {
    let conn = match pool.get() {
        Ok(c) => c,
        Err(_) => return false,
    };
    conn.query_row(
        "SELECT COUNT(*) FROM rate_limits
         WHERE ip_address = ?1 AND action = ?2
           AND blocked_until IS NOT NULL AND blocked_until > datetime('now')",
        params![ip, action],
        |row| row.get::<_, i64>(0),
    )
    .map(|n| n > 0)
    .unwrap_or(false)
}

/// Count one failed attempt. Attempts older than the window restart the
/// counter; crossing the limit starts a block and logs a security event.
/// Returns true when this attempt triggered (or extended) a block.
pub fn record_attempt(pool: &DbPool, ip: &str, action: &str) -> Result<bool, String> {
    let conn = pool.get().map_err(|e| e.to_string())?;

    // A stale window restarts the count instead of accumulating forever.
    conn.execute(
        "UPDATE rate_limits SET attempts = 0, blocked_until = NULL
         WHERE ip_address = ?1 AND action = ?2
           AND last_attempt_at < datetime('now', ?3)",
        params![ip, action, format!("-{} minutes", WINDOW_MINUTES)],
    )
    .map_err(|e| e.to_string())?;

    conn.execute(
        "INSERT INTO rate_limits (ip_address, action, attempts, last_attempt_at)
         VALUES (?1, ?2, 1, datetime('now'))
         ON CONFLICT(ip_address, action)
         DO UPDATE SET attempts = attempts + 1, last_attempt_at = datetime('now')",
        params![ip, action],
    )
    .map_err(|e| e.to_string())?;

    let attempts: i64 = conn
        .query_row(
            "SELECT attempts FROM rate_limits WHERE ip_address = ?1 AND action = ?2",
            params![ip, action],
            |row| row.get(0),
        )
        .map_err(|e| e.to_string())?;

    if attempts < MAX_ATTEMPTS {
        return Ok(false);
    }

    conn.execute(
        "UPDATE rate_limits SET blocked_until = datetime('now', ?3)
         WHERE ip_address = ?1 AND action = ?2",
        params![ip, action, format!("+{} minutes", BLOCK_MINUTES)],
    )
    .map_err(|e| e.to_string())?;
    drop(conn);

    warn!("Rate limit block for {} on '{}' after {} attempts", ip, action, attempts);
    log_security_event(
        pool,
        "rate_limit_block",
        &format!("Blocked '{}' after {} attempts", action, attempts),
        Some(ip),
    );
    Ok(true)
}

/// Clear the counter after a successful attempt.
pub fn reset(pool: &DbPool, ip: &str, action: &str) -> Result<(), String> {
    let conn = pool.get().map_err(|e| e.to_string())?;
    conn.execute(
        "DELETE FROM rate_limits WHERE ip_address = ?1 AND action = ?2",
        params![ip, action],
    )
    .map_err(|e| e.to_string())?;
    Ok(())
}

/// Best-effort security audit trail; failures are logged, never propagated.
pub fn log_security_event(pool: &DbPool, event_type: &str, details: &str, ip: Option<&str>) {
    let conn = match pool.get() {
        Ok(c) => c,
        Err(e) => {
            warn!("Could not log security event '{}': {}", event_type, e);
            return;
        }
    };
    if let Err(e) = conn.execute(
        "INSERT INTO security_logs (event_type, details, ip_address) VALUES (?1, ?2, ?3)",
        params![event_type, details, ip],
    ) {
        warn!("Could not log security event '{}': {}", event_type, e);
    }
}

use log::info;

use crate::db::DbPool;
use crate::models::user::User;
use crate::rate_limit;

pub const LOGIN_ACTION: &str = "login";

/// Authenticate by email and password, with per-IP rate limiting around
/// failures. The error string is the same for a missing account, a wrong
/// password, and a deactivated account, so probes learn nothing.
pub fn login(pool: &DbPool, email: &str, password: &str, ip: &str) -> Result<User, String> {
    if rate_limit::is_blocked(pool, ip, LOGIN_ACTION) {
        return Err("Too many attempts, try again later".to_string());
    }

    let user = User::find_by_email(pool, email)
        .filter(|u| u.is_active)
        .filter(|u| u.verify_password(password));

    let user = match user {
        Some(u) => u,
        None => {
            rate_limit::record_attempt(pool, ip, LOGIN_ACTION)?;
            rate_limit::log_security_event(
                pool,
                "login_failed",
                &format!("Failed login for {}", email),
                Some(ip),
            );
            return Err("Invalid credentials".to_string());
        }
    };

    rate_limit::reset(pool, ip, LOGIN_ACTION)?;
    User::touch_last_login(pool, user.id)?;
    info!("User {} logged in", user.username);
    Ok(user)
}

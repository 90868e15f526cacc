use chrono::Utc;
use serde_json::json;

use crate::auth::TokenAuthority;
use crate::config::Config;
use crate::error::Result;
use crate::output::{self, Format};

/// Mint a bearer token for local testing against `serve`.
pub fn run(config: &Config, user_id: &str, ttl_secs: Option<u64>, format: Format) -> Result<()> {
    let authority = TokenAuthority::new(config.require_jwt_secret()?);
    let ttl = ttl_secs.unwrap_or(config.token_ttl_secs);
    let token = authority.mint(user_id, Utc::now(), ttl)?;
    match format {
        Format::Json => output::print_json(&json!({
            "token": token,
            "sub": user_id,
            "expiresInSecs": ttl,
        }))?,
        _ => println!("{token}"),
    }
    Ok(())
}

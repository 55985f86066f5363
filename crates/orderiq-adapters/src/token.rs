//! Tenant token decoding.
//!
//! Request tokens are base64-encoded, `&`-separated claim strings of the
//! form `issued&login_id&DATABASE_NAME&expiry&org_id`.  The decoder only
//! derives the tenant context; it performs no authentication and no expiry
//! validation.  Any decode failure yields no tenant context rather than an
//! error -- the pipeline then skips the execution stage.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use tracing::debug;

use orderiq_pipeline::{TenantContext, TenantResolver};

/// Claims carried in a decoded tenant token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantClaims {
    pub login_id: String,
    pub database_name: String,
    pub org_id: String,
}

/// Decode a tenant token into its claims.
pub fn decode_token(token: &str) -> Option<TenantClaims> {
    let bytes = BASE64.decode(token.trim()).ok()?;
    let text = String::from_utf8(bytes).ok()?;

    let fields: Vec<&str> = text.split('&').collect();
    if fields.len() < 5 {
        return None;
    }

    let database_name = fields[2].trim();
    if database_name.is_empty() {
        return None;
    }

    Some(TenantClaims {
        login_id: fields[1].trim().to_owned(),
        database_name: database_name.to_owned(),
        org_id: fields[4].trim().to_owned(),
    })
}

/// [`TenantResolver`] backed by token decoding.
#[derive(Debug, Clone, Copy, Default)]
pub struct TenantTokenDecoder;

impl TenantResolver for TenantTokenDecoder {
    fn resolve(&self, token: &str) -> Option<TenantContext> {
        match decode_token(token) {
            Some(claims) => {
                debug!(database = %claims.database_name, "resolved tenant from token");
                Some(TenantContext::new(claims.database_name))
            }
            None => {
                debug!("token did not decode to a tenant context");
                None
            }
        }
    }
}

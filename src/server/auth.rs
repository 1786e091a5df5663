//! Request authentication
//!
//! Agents present a machine key; report readers present a bearer token.
//! Report access is decided on the business unit a scope resolves to.

use crate::config::AccessConfig;
use crate::error::{Error, Result};
use crate::models::BusinessUnit;
use axum::http::{header::AUTHORIZATION, HeaderMap};
use base64::{engine::general_purpose, Engine as _};

/// What an authenticated report reader may see
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Grant {
    Global,
    BusinessUnits(Vec<i64>),
}

impl Grant {
    /// `None` is the "all" scope, which only a global grant covers
    pub fn permits(&self, business_unit: Option<&BusinessUnit>) -> bool {
        match (self, business_unit) {
            (Grant::Global, _) => true,
            (Grant::BusinessUnits(_), None) => false,
            (Grant::BusinessUnits(ids), Some(bu)) => ids.contains(&bu.id),
        }
    }
}

/// Pluggable authenticator for report routes
pub trait Authenticator: Send + Sync + 'static {
    /// Identify the caller from request headers
    fn authenticate(&self, headers: &HeaderMap) -> Result<Grant>;
}

/// Grants everything. Used in tests and trusted deployments.
pub struct AllowAll;

impl Authenticator for AllowAll {
    fn authenticate(&self, _headers: &HeaderMap) -> Result<Grant> {
        Ok(Grant::Global)
    }
}

/// Bearer tokens from the `[access]` config table
pub struct TokenAuthenticator {
    access: AccessConfig,
}

impl TokenAuthenticator {
    pub fn new(access: AccessConfig) -> Self {
        Self { access }
    }
}

impl Authenticator for TokenAuthenticator {
    fn authenticate(&self, headers: &HeaderMap) -> Result<Grant> {
        let token = bearer_token(headers)
            .ok_or_else(|| Error::Unauthorized("Authentication required".to_string()))?;

        let entry = self
            .access
            .tokens
            .iter()
            .find(|t| t.token == token)
            .ok_or_else(|| Error::Unauthorized("Unknown access token".to_string()))?;

        Ok(if entry.global {
            Grant::Global
        } else {
            Grant::BusinessUnits(entry.business_units.clone())
        })
    }
}

fn authorization(headers: &HeaderMap) -> Option<&str> {
    headers.get(AUTHORIZATION)?.to_str().ok().map(str::trim)
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let token = authorization(headers)?.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then(|| token.to_string())
}

/// Machine key from `Authorization: Bearer <key>` or Basic auth (key as password)
pub fn machine_credential(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = bearer_token(headers) {
        return Some(token);
    }

    let encoded = authorization(headers)?.strip_prefix("Basic ")?;
    let decoded = general_purpose::STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (_, password) = decoded.split_once(':')?;
    (!password.is_empty()).then(|| password.to_string())
}

//! Identity claims produced by the auth gate.
//!
//! Transport-level authentication lives outside this service; the gate hands
//! every operation a verified `Claims` value. Services never reach into a
//! request object — they take the claims explicitly.

use crate::error::{AppError, AppResult};
use std::str::FromStr;
use uuid::Uuid;

/// Caller role attached by the auth gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Rider,
    Driver,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Rider => "rider",
            Role::Driver => "driver",
            Role::Admin => "admin",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "rider" => Some(Role::Rider),
            "driver" => Some(Role::Driver),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

/// Verified identity + role for one operation
#[derive(Debug, Clone, Copy)]
pub struct Claims {
    pub id: Uuid,
    pub role: Role,
}

impl Claims {
    pub fn new(id: Uuid, role: Role) -> Self {
        Self { id, role }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Elevated-privilege check; 403-equivalent on failure
    pub fn require_admin(&self) -> AppResult<()> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(AppError::Unauthorized(
                "Admin privilege required".to_string(),
            ))
        }
    }

    pub fn require_role(&self, role: Role) -> AppResult<()> {
        if self.role == role || self.is_admin() {
            Ok(())
        } else {
            Err(AppError::Unauthorized(format!(
                "{} privilege required",
                role.as_str()
            )))
        }
    }
}

/// Parse a bearer credential into claims.
///
/// The deployed gate validates a signed token upstream and forwards the
/// resolved `id:role` pair; this accepts that forwarded form.
pub fn parse_bearer(credential: &str) -> AppResult<Claims> {
    let credential = credential.trim();
    if credential.is_empty() {
        return Err(AppError::Unauthorized("Missing credential".to_string()));
    }

    let (id, role) = credential
        .split_once(':')
        .ok_or_else(|| AppError::Unauthorized("Malformed credential".to_string()))?;

    let id = Uuid::from_str(id)
        .map_err(|e| AppError::Unauthorized(format!("Invalid identity: {}", e)))?;
    let role = Role::from_str(role)
        .ok_or_else(|| AppError::Unauthorized(format!("Unknown role: {}", role)))?;

    Ok(Claims::new(id, role))
}

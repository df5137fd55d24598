// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Access token inspection.
//!
//! Reads the `exp` claim out of a JWT-shaped bearer token without checking
//! the signature. Anything that cannot be decoded counts as already expired,
//! so a bad token always pushes the caller toward a refresh.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

/// Decode the expiry instant of `token`, if it carries one.
pub fn expiry(token: &str) -> Option<SystemTime> {
    let mut segments = token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) =
        (segments.next(), segments.next(), segments.next(), segments.next())
    else {
        return None;
    };

    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
    let exp = claims.get("exp")?.as_f64()?;
    if !exp.is_finite() || exp <= 0.0 {
        return None;
    }
    UNIX_EPOCH.checked_add(Duration::try_from_secs_f64(exp).ok()?)
}

/// Remaining lifetime of `token` relative to `now`. Zero when the token is
/// malformed or already expired.
pub fn remaining_lifetime_at(token: &str, now: SystemTime) -> Duration {
    expiry(token).and_then(|exp| exp.duration_since(now).ok()).unwrap_or(Duration::ZERO)
}

pub fn remaining_lifetime(token: &str) -> Duration {
    remaining_lifetime_at(token, SystemTime::now())
}

/// True when the token is still valid but within `threshold` of expiring.
pub fn is_expiring_soon(token: &str, threshold: Duration) -> bool {
    let remaining = remaining_lifetime(token);
    !remaining.is_zero() && remaining <= threshold
}

/// True when the token is expired, undecodable, or expiring soon.
pub fn needs_refresh(token: &str, threshold: Duration) -> bool {
    remaining_lifetime(token) <= threshold
}

pub fn is_valid(token: &str) -> bool {
    !remaining_lifetime(token).is_zero()
}

/// Wall-clock instant at which a proactive refresh of `token` becomes due.
pub fn refresh_deadline(token: &str, threshold: Duration) -> Option<SystemTime> {
    let exp = expiry(token)?;
    Some(exp.checked_sub(threshold).unwrap_or(UNIX_EPOCH))
}

#[cfg(test)]
#[path = "token_tests.rs"]
mod tests;

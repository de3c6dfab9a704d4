use axum::http::{header::AUTHORIZATION, HeaderMap};
use subtle::ConstantTimeEq;

use crate::errors::AppError;

/// Token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
}

pub fn authorize(headers: &HeaderMap, secret: &str) -> Result<(), AppError> {
    match bearer_token(headers) {
        Some(token) if constant_time_compare(token, secret) => Ok(()),
        _ => Err(AppError::Unauthorized),
    }
}

/// Compares without short-circuiting on the first mismatched byte or on length.
pub fn constant_time_compare(a: &str, b: &str) -> bool {
    let max_len = a.len().max(b.len());

    // Distinct pad bytes so unequal lengths never compare equal.
    let mut a_padded = vec![0u8; max_len];
    let mut b_padded = vec![0xFFu8; max_len];
    a_padded[..a.len()].copy_from_slice(a.as_bytes());
    b_padded[..b.len()].copy_from_slice(b.as_bytes());

    let lengths_equal = a.len().ct_eq(&b.len());
    let contents_equal = a_padded.as_slice().ct_eq(b_padded.as_slice());
    (lengths_equal & contents_equal).into()
}

//! Shared API models
//!
//! Response wrapper and request bodies used by the web API.

use crate::session_driver::Keyword;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Standard API response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// POST /api/accounts
#[derive(Debug, Clone, Deserialize)]
pub struct AddAccountRequest {
    pub email: String,
    pub password: String,
}

/// POST /api/accounts/:email/clone
#[derive(Debug, Clone, Deserialize)]
pub struct CloneAccountRequest {
    pub destination: String,
}

/// PUT /api/sets/:label/keywords
#[derive(Debug, Clone, Deserialize)]
pub struct ModifyKeywordsRequest {
    pub keywords: Vec<Keyword>,
}

/// PUT /api/sets/:label/bid
#[derive(Debug, Clone, Deserialize)]
pub struct ChangeBidRequest {
    pub bid: Decimal,
}

/// GET /api/sets/:label/report
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReportQuery {
    /// Days back from today, default 7
    pub days: Option<u32>,
}

/// Capacity answer for accounts and sets
#[derive(Debug, Clone, Serialize)]
pub struct CapacityResponse<T> {
    pub capacity: T,
}

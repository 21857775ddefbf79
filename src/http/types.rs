//! Request and response DTOs for the public API.

use serde::{Deserialize, Serialize};

use crate::gate::Rejection;

/// Body of both redemption endpoints.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedeemRequest {
    pub init_data: String,
}

/// Structured outcome of either phase: `ok` plus a link or an error string,
/// never both.
#[derive(Debug, Serialize)]
pub struct RedeemResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RedeemResponse {
    pub fn resolved(link: String) -> Self {
        Self {
            ok: true,
            link: Some(link),
            error: None,
        }
    }

    pub fn rejected(rejection: Rejection) -> Self {
        Self {
            ok: false,
            link: None,
            error: Some(rejection.message().to_string()),
        }
    }
}

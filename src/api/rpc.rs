//! Shared plumbing for the `/api/rpc/<namespace>.<procedure>` handlers.

use axum::extract::{FromRequest, FromRequestParts};
use axum::Json;
use serde::{Deserialize, Serialize};

use super::error::ApiError;
use crate::engine::{EngineError, EngineResult};

/// JSON body of a mutation; malformed input becomes a `validation_error`
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct RpcJson<T>(pub T);

/// Query-string input of a query procedure
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct RpcQuery<T>(pub T);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Success {
    pub success: bool,
}

impl Success {
    pub fn ok() -> Json<Self> {
        Json(Self { success: true })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionIdInput {
    pub session_id: String,
}

/// Read-side fallback for running without a database: an unavailable store
/// yields `fallback()` instead of an error. Every other failure propagates.
pub fn degrade<T>(
    procedure: &'static str,
    result: EngineResult<T>,
    fallback: impl FnOnce() -> T,
) -> Result<T, ApiError> {
    match result {
        Ok(value) => Ok(value),
        Err(EngineError::Unavailable(_)) => {
            tracing::warn!(procedure = procedure, "Storage unavailable, serving degraded read");
            Ok(fallback())
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::error::ErrorCode;
    use crate::db::StoreUnavailable;

    #[test]
    fn test_degrade_only_swallows_unavailable() {
        let empty: Vec<u8> = degrade("test.list", Err(EngineError::Unavailable(StoreUnavailable)), Vec::new).unwrap();
        assert!(empty.is_empty());

        let value = degrade("test.list", Ok(vec![1u8]), Vec::new).unwrap();
        assert_eq!(value, vec![1]);

        let err = degrade::<Vec<u8>>("test.list", Err(EngineError::NotFound("Session")), Vec::new).unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);
    }
}

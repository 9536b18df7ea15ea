//! Response envelope shared by the HTTP server and client.
//!
//! Every body is `{ code, message, data }`; list endpoints add a
//! `pagination` block. `code` is `0` on success and the HTTP status on
//! failure.

use serde::{Deserialize, Serialize};

use crate::repository::PaginatedResult;

pub const SUCCESS_CODE: i32 = 0;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct ApiResponse<T> {
    pub code: i32,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pagination: Option<PaginationMeta>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            code: SUCCESS_CODE,
            message: "success".into(),
            data: Some(data),
            pagination: None,
        }
    }

    pub fn error(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
            pagination: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == SUCCESS_CODE
    }
}

impl<T> ApiResponse<Vec<T>> {
    pub fn paginated(result: PaginatedResult<T>) -> Self {
        let pagination = PaginationMeta::from_window(result.offset, result.limit, result.total);
        Self {
            pagination: Some(pagination),
            ..Self::ok(result.items)
        }
    }
}

/// Page-oriented pagination metadata (1-based pages).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationMeta {
    pub page: u64,
    pub page_size: u64,
    pub total: u64,
    pub total_pages: u64,
}

impl PaginationMeta {
    pub fn from_window(offset: u64, limit: u64, total: u64) -> Self {
        let page_size = limit.max(1);
        Self {
            page: offset / page_size + 1,
            page_size,
            total,
            total_pages: total.div_ceil(page_size),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_from_window() {
        let meta = PaginationMeta::from_window(40, 20, 41);
        assert_eq!(meta.page, 3);
        assert_eq!(meta.total_pages, 3);

        let empty = PaginationMeta::from_window(0, 50, 0);
        assert_eq!((empty.page, empty.total_pages), (1, 0));
    }

    #[test]
    fn error_body_has_no_data() {
        let body = serde_json::to_value(ApiResponse::<()>::error(404, "resource not found")).unwrap();
        assert_eq!(body["code"], 404);
        assert!(body["data"].is_null());
        assert!(body.get("pagination").is_none());
    }

    #[test]
    fn missing_data_deserializes() {
        let parsed: ApiResponse<Vec<u32>> =
            serde_json::from_str(r#"{"code":0,"message":"success"}"#).unwrap();
        assert!(parsed.is_success());
        assert!(parsed.data.is_none());
    }
}

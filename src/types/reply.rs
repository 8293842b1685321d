//! Caller-facing operation replies
//!
//! UI forms, kiosks, and POS terminals consume every ledger operation as a
//! `{ success, message }` pair, never a raw error. This module adapts a
//! `Result` into that shape at the outermost surface; internal code keeps
//! working with `Result<T, LedgerError>`.

use super::error::LedgerError;

/// The reply shape handed to external callers
#[derive(Debug, Clone, PartialEq)]
pub struct OperationReply {
    pub success: bool,
    pub message: String,
}

impl OperationReply {
    pub fn ok(message: impl Into<String>) -> Self {
        OperationReply {
            success: true,
            message: message.into(),
        }
    }

    pub fn failed(error: &LedgerError) -> Self {
        OperationReply {
            success: false,
            message: error.to_string(),
        }
    }

    /// Collapse an operation result into a reply
    ///
    /// `ok_message` maps the success value to the human-readable line shown
    /// at the kiosk.
    pub fn from_result<T>(
        result: Result<T, LedgerError>,
        ok_message: impl FnOnce(&T) -> String,
    ) -> Self {
        match result {
            Ok(value) => OperationReply::ok(ok_message(&value)),
            Err(error) => OperationReply::failed(&error),
        }
    }
}

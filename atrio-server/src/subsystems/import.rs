//! Contact import endpoint logic

use atrio_core::import::{contact_template_csv, parse_contacts};
use axum::http::StatusCode;

/// Parse an uploaded CSV. Bad rows never abort the batch; they come back in
/// `errors` for the operator to fix and re-upload.
pub fn contacts_inner(body: &str) -> (StatusCode, serde_json::Value) {
    if body.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            serde_json::json!({
                "status": "error",
                "error": "empty file",
            }),
        );
    }

    let report = parse_contacts(body);
    tracing::info!(
        contacts = report.contacts.len(),
        errors = report.errors.len(),
        "Contact import parsed"
    );
    (
        StatusCode::OK,
        serde_json::json!({
            "imported": report.contacts.len(),
            "contacts": report.contacts,
            "errors": report.errors,
        }),
    )
}

pub fn template_inner() -> String {
    contact_template_csv()
}

use tracing::{debug, error};

use docbind_api::{ApiError, DocumentRef};

use super::config::FirestoreConfig;
use super::models::FirestoreDocument;

const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Thin client for the Firestore REST document endpoints
pub struct FirestoreClient {
    config: FirestoreConfig,
    client: reqwest::Client,
}

impl FirestoreClient {
    pub fn new(config: FirestoreConfig) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| ApiError::InternalError {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &FirestoreConfig {
        &self.config
    }

    /// REST URL of a single document
    pub fn document_url(&self, reference: &DocumentRef) -> String {
        format!(
            "{}/projects/{}/databases/{}/documents/{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.project_id,
            self.config.database,
            reference.path()
        )
    }

    fn format_reqwest_error(e: &reqwest::Error, url: &str, operation: &str) -> String {
        if e.is_timeout() {
            format!(
                "Failed to {} for {}: timeout - request took too long",
                operation, url
            )
        } else if e.is_connect() {
            format!(
                "Failed to {} for {}: connection error - check network connectivity. Error: {}",
                operation, url, e
            )
        } else if e.is_decode() {
            format!(
                "Failed to {} for {}: decode error - unexpected response format. Error: {}",
                operation, url, e
            )
        } else {
            format!("Failed to {} for {}: {}", operation, url, e)
        }
    }

    /// Fetch one document. A 404 yields `Ok(None)`.
    #[tracing::instrument(name = "firestore.get_document", skip(self), fields(path = %reference))]
    pub async fn get_document(
        &self,
        reference: &DocumentRef,
    ) -> Result<Option<FirestoreDocument>, ApiError> {
        let url = self.document_url(reference);

        let mut request = self.client.get(&url);
        if let Some(key) = &self.config.api_key {
            request = request.query(&[("key", key)]);
        }

        let response = request.send().await.map_err(|e| {
            let message = Self::format_reqwest_error(&e, &url, "fetch document");
            error!("[FirestoreClient] {}", message);
            ApiError::NetworkError { message }
        })?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| ApiError::NetworkError {
            message: Self::format_reqwest_error(&e, &url, "read response body"),
        })?;

        if status == 404 {
            debug!("[FirestoreClient] {} does not exist", reference);
            return Ok(None);
        }
        if !(200..300).contains(&status) {
            let err = error_for_status(status, &reference.path(), &body);
            error!("[FirestoreClient] HTTP {} from {}: {}", status, url, err);
            return Err(err);
        }

        let document: FirestoreDocument =
            serde_json::from_str(&body).map_err(|e| ApiError::InternalError {
                message: format!(
                    "Failed to parse document {}: {} - Response (first 500): {}",
                    reference,
                    e,
                    body.chars().take(500).collect::<String>()
                ),
            })?;

        debug!(
            "[FirestoreClient] Fetched {} ({} fields, updateTime={:?})",
            reference,
            document.fields.len(),
            document.update_time
        );
        Ok(Some(document))
    }
}

/// Map a failed HTTP status to an `ApiError`
pub fn error_for_status(status: u16, path: &str, body: &str) -> ApiError {
    let message = error_message(body);
    match status {
        404 => ApiError::DocumentNotFound {
            path: path.to_string(),
        },
        401 | 403 => ApiError::PermissionDenied {
            path: path.to_string(),
            message,
        },
        _ => ApiError::NetworkError {
            message: format!("HTTP {} for {}: {}", status, path, message),
        },
    }
}

/// Extract `error.message` from a Google API error body, else the raw body
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| {
            if body.len() > 500 {
                format!("{}... (truncated)", body.chars().take(500).collect::<String>())
            } else {
                body.to_string()
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use docbind_api::CollectionRef;

    #[test]
    fn test_document_url() {
        let mut config = FirestoreConfig::new("robo-app");
        config.base_url = "http://localhost:8080/v1/".to_string();
        let client = FirestoreClient::new(config).unwrap();

        let reference = CollectionRef::new("robovoyage").doc("EWJQ4H3MZyt1Vkd6Xd0A");
        assert_eq!(
            client.document_url(&reference),
            "http://localhost:8080/v1/projects/robo-app/databases/(default)/documents/robovoyage/EWJQ4H3MZyt1Vkd6Xd0A"
        );
    }

    #[test]
    fn test_error_for_status() {
        assert_eq!(
            error_for_status(404, "robocon/current", ""),
            ApiError::DocumentNotFound {
                path: "robocon/current".to_string()
            }
        );

        let body = r#"{"error":{"code":403,"message":"Missing or insufficient permissions.","status":"PERMISSION_DENIED"}}"#;
        assert_eq!(
            error_for_status(403, "robocon/current", body),
            ApiError::PermissionDenied {
                path: "robocon/current".to_string(),
                message: "Missing or insufficient permissions.".to_string(),
            }
        );
        assert!(matches!(
            error_for_status(401, "robocon/current", "unauthenticated"),
            ApiError::PermissionDenied { .. }
        ));

        match error_for_status(503, "robocon/current", "backend unavailable") {
            ApiError::NetworkError { message } => {
                assert!(message.contains("503"));
                assert!(message.contains("backend unavailable"));
            }
            other => panic!("Expected NetworkError, got {:?}", other),
        }
    }
}

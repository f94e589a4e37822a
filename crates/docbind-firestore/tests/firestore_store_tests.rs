//! FirestoreDocumentStore against a minimal local HTTP server
//!
//! The server answers each request from a route table that tests can change
//! while a watch is running.

use futures::StreamExt;
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use docbind::RoboStore;
use docbind_api::{ApiError, Change, CollectionRef, DocumentRef, DocumentStore, Value};
use docbind_firestore::{FirestoreConfig, FirestoreDocumentStore};

const PROJECT: &str = "robo-test";

type Routes = Arc<Mutex<HashMap<String, (u16, String)>>>;

struct FakeFirestore {
    routes: Routes,
    base_url: String,
}

impl FakeFirestore {
    async fn start() -> Self {
        let routes: Routes = Arc::new(Mutex::new(HashMap::new()));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server_routes = routes.clone();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                let routes = server_routes.clone();
                tokio::spawn(async move {
                    let mut request = Vec::new();
                    let mut chunk = [0u8; 1024];
                    loop {
                        let n = socket.read(&mut chunk).await.unwrap_or(0);
                        if n == 0 {
                            break;
                        }
                        request.extend_from_slice(&chunk[..n]);
                        if request.windows(4).any(|w| w == b"\r\n\r\n") {
                            break;
                        }
                    }

                    let request = String::from_utf8_lossy(&request);
                    let target = request.split_whitespace().nth(1).unwrap_or("/");
                    let path = target.split('?').next().unwrap_or(target).to_string();
                    let (status, body) = routes
                        .lock()
                        .unwrap()
                        .get(&path)
                        .cloned()
                        .unwrap_or_else(|| {
                            (
                                404,
                                json!({"error": {"code": 404, "message": "not found"}})
                                    .to_string(),
                            )
                        });

                    let response = format!(
                        "HTTP/1.1 {} Status\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        status,
                        body.len(),
                        body
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        Self {
            routes,
            base_url: format!("http://{}/v1", addr),
        }
    }

    fn route(reference: &DocumentRef) -> String {
        format!(
            "/v1/projects/{}/databases/(default)/documents/{}",
            PROJECT,
            reference.path()
        )
    }

    fn put_document(&self, reference: &DocumentRef, fields: serde_json::Value, update_time: &str) {
        let body = json!({
            "name": format!("projects/{}/databases/(default)/documents/{}", PROJECT, reference.path()),
            "fields": fields,
            "createTime": "2024-05-01T09:00:00Z",
            "updateTime": update_time,
        });
        self.routes
            .lock()
            .unwrap()
            .insert(Self::route(reference), (200, body.to_string()));
    }

    fn put_status(&self, reference: &DocumentRef, status: u16, body: serde_json::Value) {
        self.routes
            .lock()
            .unwrap()
            .insert(Self::route(reference), (status, body.to_string()));
    }

    fn remove(&self, reference: &DocumentRef) {
        self.routes.lock().unwrap().remove(&Self::route(reference));
    }

    fn store(&self) -> FirestoreDocumentStore {
        let mut config = FirestoreConfig::new(PROJECT);
        config.base_url = self.base_url.clone();
        config.poll_interval_ms = 20;
        FirestoreDocumentStore::new(config).unwrap()
    }
}

fn robocon_ref() -> DocumentRef {
    CollectionRef::new("robocon").doc("current")
}

fn robovoyage_ref() -> DocumentRef {
    CollectionRef::new("robovoyage").doc("EWJQ4H3MZyt1Vkd6Xd0A")
}

#[tokio::test]
async fn test_get_document_decodes_fields() {
    let server = FakeFirestore::start().await;
    server.put_document(
        &robocon_ref(),
        json!({"status": {"stringValue": "idle"}, "round": {"integerValue": "3"}}),
        "2024-05-01T10:00:00Z",
    );

    let document = server
        .store()
        .get_document(&robocon_ref())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(
        document.fields.get("status"),
        Some(&Value::String("idle".to_string()))
    );
    assert_eq!(document.fields.get("round"), Some(&Value::Integer(3)));
    assert_eq!(document.update_time.as_deref(), Some("2024-05-01T10:00:00Z"));
}

#[tokio::test]
async fn test_get_missing_document() {
    let server = FakeFirestore::start().await;
    assert_eq!(server.store().get_document(&robocon_ref()).await.unwrap(), None);
}

#[tokio::test]
async fn test_permission_denied() {
    let server = FakeFirestore::start().await;
    server.put_status(
        &robocon_ref(),
        403,
        json!({"error": {"code": 403, "message": "Missing or insufficient permissions.", "status": "PERMISSION_DENIED"}}),
    );

    let err = server
        .store()
        .get_document(&robocon_ref())
        .await
        .unwrap_err();
    assert_eq!(
        err,
        ApiError::PermissionDenied {
            path: "robocon/current".to_string(),
            message: "Missing or insufficient permissions.".to_string(),
        }
    );
}

#[tokio::test]
async fn test_unreachable_server_is_network_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let mut config = FirestoreConfig::new(PROJECT);
    config.base_url = format!("http://{}/v1", addr);
    let store = FirestoreDocumentStore::new(config).unwrap();

    let err = store.get_document(&robocon_ref()).await.unwrap_err();
    assert!(matches!(err, ApiError::NetworkError { .. }));
}

#[tokio::test]
async fn test_watch_missing_document_fails_first() {
    let server = FakeFirestore::start().await;
    let store = server.store();
    let mut stream = store.watch_document(&robocon_ref()).await;

    let first = tokio::time::timeout(Duration::from_secs(2), stream.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        first.unwrap_err(),
        ApiError::DocumentNotFound {
            path: "robocon/current".to_string()
        }
    );
}

#[tokio::test]
async fn test_watch_emits_only_when_update_time_changes() {
    let server = FakeFirestore::start().await;
    server.put_document(
        &robocon_ref(),
        json!({"status": {"stringValue": "idle"}}),
        "2024-05-01T10:00:00Z",
    );
    let store = server.store();
    let mut stream = store.watch_document(&robocon_ref()).await;

    let first = stream.next().await.unwrap().unwrap();
    assert!(matches!(first[0], Change::Created { .. }));

    // Several polls with the same updateTime produce nothing
    let quiet = tokio::time::timeout(Duration::from_millis(150), stream.next()).await;
    assert!(quiet.is_err());

    server.put_document(
        &robocon_ref(),
        json!({"status": {"stringValue": "running"}}),
        "2024-05-01T10:05:00Z",
    );
    let next = tokio::time::timeout(Duration::from_secs(2), stream.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    match &next[0] {
        Change::Updated { data, .. } => assert_eq!(
            data.fields.get("status"),
            Some(&Value::String("running".to_string()))
        ),
        other => panic!("Expected Updated, got {:?}", other),
    }
}

#[tokio::test]
async fn test_watch_reports_deletion() {
    let server = FakeFirestore::start().await;
    server.put_document(
        &robocon_ref(),
        json!({"status": {"stringValue": "idle"}}),
        "2024-05-01T10:00:00Z",
    );
    let store = server.store();
    let mut stream = store.watch_document(&robocon_ref()).await;
    stream.next().await.unwrap().unwrap();

    server.remove(&robocon_ref());
    let next = tokio::time::timeout(Duration::from_secs(2), stream.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(matches!(next[0], Change::Deleted { .. }));
}

#[tokio::test]
async fn test_robostore_over_firestore() {
    let server = FakeFirestore::start().await;
    server.put_document(
        &robocon_ref(),
        json!({"status": {"stringValue": "idle"}}),
        "2024-05-01T10:00:00Z",
    );
    server.put_document(
        &robovoyage_ref(),
        json!({"stage": {"integerValue": "2"}}),
        "2024-05-01T10:00:00Z",
    );

    let store = RoboStore::new(Arc::new(server.store())).await.unwrap();
    store.set_robocon_ref().await.unwrap();
    store.set_robovoyage_ref().await.unwrap();

    assert_eq!(
        store.robocon().await.get("status"),
        Some(&Value::String("idle".to_string()))
    );
    assert_eq!(store.robovoyage().await.get("stage"), Some(&Value::Integer(2)));
}

#[tokio::test]
async fn test_robostore_follows_remote_updates() {
    let server = FakeFirestore::start().await;
    server.put_document(
        &robocon_ref(),
        json!({"status": {"stringValue": "idle"}}),
        "2024-05-01T10:00:00Z",
    );

    let store = RoboStore::new(Arc::new(server.store())).await.unwrap();
    store.set_robocon_ref().await.unwrap();

    server.put_document(
        &robocon_ref(),
        json!({"status": {"stringValue": "running"}}),
        "2024-05-01T10:05:00Z",
    );

    let running = Some(Value::String("running".to_string()));
    for _ in 0..200 {
        if store.robocon().await.get("status").cloned() == running {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(store.robocon().await.get("status").cloned(), running);
    assert!(store.state().is_bound("robocon").await);
}

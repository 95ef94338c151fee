// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Read-side HTTP surface.
//!
//! APT clients consume the repository over plain HTTP: `/dists/*` and
//! `/pool/*` are proxied straight from the object store, `/key.gpg` serves
//! the signing key, and `/` renders a human-readable index of the configured
//! sources with setup instructions.

use {
    crate::{
        source::SourceInfo,
        store::ObjectStore,
    },
    askama::Template,
    axum::{
        body::Body,
        extract::State,
        http::{header, StatusCode, Uri},
        response::{Html, IntoResponse, Response},
        routing::get,
        Router,
    },
    std::{sync::Arc, time::Duration},
    tower_http::timeout::TimeoutLayer,
    tracing::debug,
};

/// Response budget; sized for large `.deb` downloads.
const WRITE_TIMEOUT: Duration = Duration::from_secs(300);

/// Shared state for the read-path handlers.
#[derive(Clone)]
pub struct ServerState {
    store: Arc<dyn ObjectStore>,
    public_key: Arc<Vec<u8>>,
    sources: Arc<Vec<SourceInfo>>,
    origin: String,
}

impl ServerState {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        public_key: Vec<u8>,
        sources: Vec<SourceInfo>,
        origin: impl ToString,
    ) -> Self {
        Self {
            store,
            public_key: Arc::new(public_key),
            sources: Arc::new(sources),
            origin: origin.to_string(),
        }
    }
}

/// Build the read-path router.
pub fn router(state: ServerState) -> Router {
    Router::new()
        .route("/", get(handle_index))
        .route("/key.gpg", get(handle_key_gpg))
        .route("/dists/*path", get(handle_proxy))
        .route("/pool/*path", get(handle_proxy))
        .layer(TimeoutLayer::new(WRITE_TIMEOUT))
        .with_state(state)
}

#[derive(Template)]
#[template(path = "index.html")]
struct IndexTemplate {
    origin: String,
    sources: Vec<SourceInfo>,
}

async fn handle_index(State(state): State<ServerState>) -> Response {
    let template = IndexTemplate {
        origin: state.origin.clone(),
        sources: state.sources.as_ref().clone(),
    };

    match template.render() {
        Ok(html) => Html(html).into_response(),
        Err(err) => {
            debug!(error = %err, "rendering index page");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn handle_key_gpg(State(state): State<ServerState>) -> Response {
    (
        [(header::CONTENT_TYPE, "application/pgp-keys")],
        state.public_key.as_ref().clone(),
    )
        .into_response()
}

/// Derive the object key for a proxied request path.
///
/// Returns `None` for traversal attempts, which must be rejected before
/// any store call is made.
fn object_key(path: &str) -> Option<&str> {
    let key = path.trim_start_matches('/');
    if key.contains("..") {
        None
    } else {
        Some(key)
    }
}

async fn handle_proxy(State(state): State<ServerState>, uri: Uri) -> Response {
    let key = match object_key(uri.path()) {
        Some(key) => key,
        None => return (StatusCode::BAD_REQUEST, "Bad Request").into_response(),
    };

    let object = match state.store.fetch(key).await {
        Ok(object) => object,
        Err(err) => {
            debug!(key, error = %err, "object fetch failed");
            return (StatusCode::NOT_FOUND, "Not Found").into_response();
        }
    };

    let mut builder = Response::builder().status(StatusCode::OK);
    if let Some(content_type) = object.content_type {
        builder = builder.header(header::CONTENT_TYPE, content_type);
    }
    if let Some(content_length) = object.content_length {
        builder = builder.header(header::CONTENT_LENGTH, content_length);
    }

    match builder.body(Body::from_stream(object.body)) {
        Ok(response) => response,
        Err(err) => {
            debug!(key, error = %err, "building proxy response");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::store::MemoryStore,
        http_body_util::BodyExt,
        tower::ServiceExt,
    };

    fn test_state(store: Arc<MemoryStore>) -> ServerState {
        ServerState::new(
            store,
            b"-----BEGIN PGP PUBLIC KEY BLOCK-----\n...".to_vec(),
            vec![SourceInfo {
                name: "discord".into(),
                description: "Discord <voice> client".into(),
            }],
            "ppa.example.com",
        )
    }

    #[test]
    fn traversal_paths_rejected() {
        assert!(object_key("/pool/../secret").is_none());
        assert!(object_key("/dists/stable/../../x").is_none());
        assert_eq!(
            object_key("/pool/d/discord/discord-1.2.3.deb"),
            Some("pool/d/discord/discord-1.2.3.deb")
        );
    }

    #[tokio::test]
    async fn proxy_traversal_returns_400_without_store_call() {
        let store = Arc::new(MemoryStore::default());
        let app = router(test_state(store.clone()));

        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/pool/..%2fsecret")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(store.reads(), 0);
    }

    #[tokio::test]
    async fn proxy_miss_returns_404() {
        let store = Arc::new(MemoryStore::default());
        let app = router(test_state(store));

        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/dists/stable/Release")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn proxy_relays_object_and_metadata() {
        let store = Arc::new(MemoryStore::default());
        store
            .put(
                "dists/stable/Release",
                b"Origin: test\n".to_vec(),
                Some("text/plain"),
            )
            .await
            .unwrap();

        let app = router(test_state(store));
        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/dists/stable/Release")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/plain"
        );
        assert_eq!(
            response.headers().get(header::CONTENT_LENGTH).unwrap(),
            "13"
        );

        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body.as_ref(), b"Origin: test\n");
    }

    #[tokio::test]
    async fn key_gpg_served_with_content_type() {
        let store = Arc::new(MemoryStore::default());
        let app = router(test_state(store));

        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/key.gpg")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/pgp-keys"
        );
    }

    #[tokio::test]
    async fn index_lists_sources_escaped() {
        let store = Arc::new(MemoryStore::default());
        let app = router(test_state(store));

        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let html = String::from_utf8(body.to_vec()).unwrap();
        assert!(html.contains("<code>discord</code>"));
        assert!(html.contains("Discord &lt;voice&gt; client"));
        assert!(html.contains("ppa.example.com"));
    }
}

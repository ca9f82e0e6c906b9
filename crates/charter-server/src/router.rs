use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use super::handlers::{chat_handler, health_handler, reset_handler};
use super::server::AppState;

pub(crate) fn build_router(state: AppState, max_body_size: usize) -> Router {
    Router::new()
        .route("/api/chat", post(chat_handler))
        .route("/api/chat/reset", post(reset_handler))
        .route("/health", get(health_handler))
        .layer(RequestBodyLimitLayer::new(max_body_size))
        // any origin, method and header; the frontend is served from elsewhere
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Instant;

    use axum::body::Body;
    use axum::http::Request;
    use charter_chat::{ChatConfig, ChatService, NOT_FOUND};
    use charter_core::{Chunk, ChunkId, Error, GenerationConfig, MockLlm, VectorIndex};
    use charter_rag::{HashEmbedder, LocalVectorIndex, StoredEntry};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use super::*;
    use crate::server::DEFAULT_MAX_BODY_SIZE;

    const ARTICLE_25: &str = "Article 25. All citizens are equal before law.";
    const ANSWER: &str = "Article 25 guarantees equality before law. [Page-12]";

    fn index() -> Arc<dyn VectorIndex> {
        let entry = StoredEntry {
            chunk: Chunk {
                id: ChunkId::new("Page-12", 0),
                text: ARTICLE_25.to_string(),
                start: 0,
                end: ARTICLE_25.len(),
                overlap: 0,
                metadata: serde_json::json!({ "source": "Page-12" }),
            },
            vector: HashEmbedder::default().embed_text(ARTICLE_25),
        };
        Arc::new(LocalVectorIndex::from_entries(vec![entry], None))
    }

    fn answering_llm() -> MockLlm {
        MockLlm::with_handler(|prompt| {
            if prompt.starts_with("You are an AI language model assistant") {
                Ok(String::new())
            } else {
                Ok(ANSWER.to_string())
            }
        })
    }

    fn make_router(index: Arc<dyn VectorIndex>, llm: MockLlm) -> Router {
        let chat = ChatService::build(
            &ChatConfig::default(),
            index,
            Arc::new(HashEmbedder::default()),
            Arc::new(llm),
            GenerationConfig::default(),
        );
        let state = AppState {
            chat: Arc::new(chat),
            started_at: Instant::now(),
        };
        build_router(state, DEFAULT_MAX_BODY_SIZE)
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap()
    }

    async fn json_body(resp: axum::response::Response) -> serde_json::Value {
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn chat_returns_response() {
        let app = make_router(index(), answering_llm());
        let resp = app
            .oneshot(post_json("/api/chat", serde_json::json!({"message": "What does Article 25 say?"})))
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);

        let json = json_body(resp).await;
        assert_eq!(json["response"], ANSWER);
        assert_eq!(json["mode"], "focused_qa");
        assert_eq!(json["sources"][0]["source"], "Page-12");
    }

    #[tokio::test]
    async fn empty_index_answers_not_found() {
        let app = make_router(Arc::new(LocalVectorIndex::empty()), MockLlm::failing());
        let resp = app
            .oneshot(post_json("/api/chat", serde_json::json!({"message": "Summarize Part XII"})))
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);

        let json = json_body(resp).await;
        assert_eq!(json["response"], NOT_FOUND);
        assert_eq!(json["mode"], "summarize");
    }

    #[tokio::test]
    async fn blank_message_is_bad_request() {
        let app = make_router(index(), answering_llm());
        let resp = app
            .oneshot(post_json("/api/chat", serde_json::json!({"message": "  "})))
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);
        assert_eq!(json_body(resp).await["error"], "invalid_input");
    }

    #[tokio::test]
    async fn malformed_body_is_bad_request() {
        let app = make_router(index(), answering_llm());
        let resp = app
            .oneshot(post_json("/api/chat", serde_json::json!({"text": "hello"})))
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);
        assert_eq!(json_body(resp).await["error"], "invalid_input");
    }

    #[tokio::test]
    async fn llm_failure_is_bad_gateway() {
        let llm = MockLlm::with_handler(|_| Err(Error::Generation("quota exceeded".into())));
        let app = make_router(index(), llm);
        let resp = app
            .oneshot(post_json("/api/chat", serde_json::json!({"message": "What does Article 25 say?"})))
            .await
            .unwrap();
        assert_eq!(resp.status(), 502);

        let json = json_body(resp).await;
        assert_eq!(json["error"], "generation_failed");
        assert_ne!(json["response"], NOT_FOUND);
    }

    #[tokio::test]
    async fn reset_accepts_empty_body() {
        let app = make_router(index(), answering_llm());
        let req = Request::builder()
            .method("POST")
            .uri("/api/chat/reset")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), 200);
        assert_eq!(json_body(resp).await["status"], "cleared");
    }

    #[tokio::test]
    async fn health_reports_index_size() {
        let app = make_router(index(), answering_llm());
        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), 200);

        let json = json_body(resp).await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["indexed_chunks"], 1);
    }

    #[tokio::test]
    async fn cors_allows_any_origin() {
        let app = make_router(index(), answering_llm());
        let req = Request::builder()
            .method("OPTIONS")
            .uri("/api/chat")
            .header("origin", "http://localhost:5173")
            .header("access-control-request-method", "POST")
            .header("access-control-request-headers", "content-type")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), 200);
        assert_eq!(resp.headers()["access-control-allow-origin"], "*");
    }

    #[tokio::test]
    async fn body_size_limit() {
        let app = make_router(index(), answering_llm());
        let oversized = vec![b'a'; DEFAULT_MAX_BODY_SIZE * 2];
        let req = Request::builder()
            .method("POST")
            .uri("/api/chat")
            .header("content-type", "application/json")
            .body(Body::from(oversized))
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), 413);
    }
}

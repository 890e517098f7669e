use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use ic_rag_core::{RagPipeline, VectorIndex};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub question: String,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub answer: String,
    pub sources: Vec<SourceBody>,
}

#[derive(Debug, Serialize)]
pub struct SourceBody {
    pub content: String,
    pub source: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub detail: String,
}

pub fn router<V>(pipeline: Arc<RagPipeline<V>>) -> Router
where
    V: VectorIndex + 'static,
{
    Router::new()
        .route("/healthz", get(healthz))
        .route("/chat", post(chat_handler::<V>))
        .layer(TraceLayer::new_for_http())
        .with_state(pipeline)
}

pub async fn serve<V>(bind: &str, pipeline: Arc<RagPipeline<V>>) -> anyhow::Result<()>
where
    V: VectorIndex + 'static,
{
    let addr: SocketAddr = bind
        .parse()
        .map_err(|error| anyhow::anyhow!("invalid bind address {bind}: {error}"))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "chat api listening");

    axum::serve(listener, router(pipeline))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        error!(%error, "failed to listen for shutdown signal");
    }
    info!("shutting down chat api");
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn chat_handler<V>(
    State(pipeline): State<Arc<RagPipeline<V>>>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, (StatusCode, Json<ErrorBody>)>
where
    V: VectorIndex + 'static,
{
    info!(question = %request.question, "chat request");

    let answer = pipeline.answer(&request.question).await.map_err(|err| {
        error!(error = %err, "chat request failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorBody {
                detail: err.to_string(),
            }),
        )
    })?;

    Ok(Json(ChatResponse {
        answer: answer.text,
        sources: answer
            .sources
            .into_iter()
            .map(|hit| SourceBody {
                content: hit.chunk.text,
                source: hit.chunk.source,
            })
            .collect(),
    }))
}

#[cfg(test)]
mod tests {
    use super::router;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use ic_rag_core::{
        CharacterNgramEmbedder, CompletionModel, FileVectorStore, GenerationError, IngestError,
        PageText, PdfExtractor, RagPipeline,
    };
    use serde_json::Value;
    use std::path::Path;
    use std::sync::Arc;
    use tempfile::{tempdir, TempDir};
    use tower::ServiceExt;

    struct EchoModel;

    #[async_trait]
    impl CompletionModel for EchoModel {
        async fn complete(&self, _prompt: &str) -> Result<String, GenerationError> {
            Ok("Verilog is a hardware description language (HDL).".to_string())
        }
    }

    struct SentenceExtractor;

    impl PdfExtractor for SentenceExtractor {
        fn extract_pages(&self, _path: &Path) -> Result<Vec<PageText>, IngestError> {
            Ok(vec![PageText {
                number: 1,
                text: "Verilog is a hardware description language.".to_string(),
            }])
        }
    }

    async fn pipeline(dir: &TempDir) -> Arc<RagPipeline<FileVectorStore>> {
        let index = FileVectorStore::open(dir.path().join("index"))
            .await
            .expect("index folder should open");
        Arc::new(
            RagPipeline::new(
                Arc::new(CharacterNgramEmbedder::default()),
                Arc::new(EchoModel),
                index,
            )
            .with_extractor(Arc::new(SentenceExtractor)),
        )
    }

    fn chat_request(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/chat")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("request should build")
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body should be readable");
        serde_json::from_slice(&bytes).expect("body should be json")
    }

    #[tokio::test]
    async fn chat_returns_answer_with_sources() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let data = dir.path().join("data");
        std::fs::create_dir(&data)?;
        std::fs::write(data.join("verilog_guide.pdf"), b"%PDF-1.4")?;

        let pipeline = pipeline(&dir).await;
        pipeline.rebuild(&data).await?;

        let response = router(pipeline)
            .oneshot(chat_request(r#"{"question":"What is Verilog?"}"#))
            .await?;

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(
            body["answer"],
            "Verilog is a hardware description language (HDL)."
        );
        let sources = body["sources"].as_array().expect("sources array");
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0]["source"], "verilog_guide.pdf");
        assert_eq!(
            sources[0]["content"],
            "Verilog is a hardware description language."
        );
        Ok(())
    }

    #[tokio::test]
    async fn chat_without_index_is_a_server_error() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let response = router(pipeline(&dir).await)
            .oneshot(chat_request(r#"{"question":"What is Verilog?"}"#))
            .await?;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = json_body(response).await;
        let detail = body["detail"].as_str().unwrap_or_default();
        assert!(detail.contains("not initialized"), "detail was {detail}");
        Ok(())
    }

    #[tokio::test]
    async fn malformed_body_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let response = router(pipeline(&dir).await)
            .oneshot(chat_request(r#"{"query":"What is Verilog?"}"#))
            .await?;

        assert!(response.status().is_client_error());
        Ok(())
    }

    #[tokio::test]
    async fn healthz_is_ok() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let response = router(pipeline(&dir).await)
            .oneshot(Request::builder().uri("/healthz").body(Body::empty())?)
            .await?;

        assert_eq!(response.status(), StatusCode::OK);
        Ok(())
    }
}

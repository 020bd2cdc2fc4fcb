//! In-process tests for the HTTP API, with scripted collaborators.

use std::sync::Arc;

use data_insights::router::Router;
use data_insights::server::build_app;
use data_insights_core::models::{ColumnInfo, RetrievedDocument};
use data_insights_core::store::memory::InMemorySemanticStore;
use data_insights_core::templates::PromptTemplates;
use data_insights_core::testing::{row, ScriptedGenerator, StaticTable};
use serde_json::{json, Value};

const TABLE: &str = "csv_data_data";

async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = build_app(Arc::new(router));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn table() -> StaticTable {
    StaticTable::new(
        TABLE,
        vec![
            ColumnInfo::new("id", "INTEGER"),
            ColumnInfo::new("name", "TEXT"),
            ColumnInfo::new("label", "TEXT"),
        ],
    )
    .respond("WHERE label='PUBLIC'", vec![row(vec![("cnt", 2)])])
}

fn router(replies: Vec<&str>, semantic: Arc<InMemorySemanticStore>) -> Router {
    let generator = ScriptedGenerator::new(replies.into_iter().map(|r| Ok(r.to_string())).collect());
    Router::new(
        Arc::new(generator),
        Arc::new(table()),
        semantic,
        &PromptTemplates::builtin(),
        TABLE,
        3,
    )
}

#[tokio::test]
async fn test_chat_returns_camel_case_response() {
    let base = serve(router(
        vec![
            "ANALYTICAL",
            "SELECT COUNT(*) AS cnt FROM csv_data_data WHERE label='PUBLIC'",
            "There are 2 PUBLIC files.",
        ],
        Arc::new(InMemorySemanticStore::new()),
    ))
    .await;

    let resp = reqwest::Client::new()
        .post(format!("{}/api/chat", base))
        .json(&json!({ "question": "How many files are PUBLIC?" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(
        body,
        json!({
            "answer": "There are 2 PUBLIC files.",
            "sources": ["SQL Database: csv_data_data"],
            "documentsUsed": 1,
        })
    );
}

#[tokio::test]
async fn test_chat_greeting() {
    let base = serve(router(
        vec!["NONE", "Hello! What would you like to know?"],
        Arc::new(InMemorySemanticStore::new()),
    ))
    .await;

    let body: Value = reqwest::Client::new()
        .post(format!("{}/api/chat", base))
        .json(&json!({ "question": "Hello!" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["sources"], json!(["General Conversation"]));
    assert_eq!(body["documentsUsed"], 0);
}

#[tokio::test]
async fn test_chat_factual_sources() {
    let semantic = Arc::new(InMemorySemanticStore::with_documents(vec![
        RetrievedDocument::csv_row("name: report.pdf. label: PUBLIC.", "data.csv", 4),
    ]));
    let base = serve(router(vec!["FACTUAL", "report.pdf is PUBLIC."], semantic)).await;

    let body: Value = reqwest::Client::new()
        .post(format!("{}/api/chat", base))
        .json(&json!({ "question": "What is the label of report.pdf?" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["answer"], "report.pdf is PUBLIC.");
    assert_eq!(body["sources"], json!(["Row 4 from data.csv"]));
    assert_eq!(body["documentsUsed"], 1);
}

#[tokio::test]
async fn test_chat_rejects_bad_requests() {
    let base = serve(router(vec![], Arc::new(InMemorySemanticStore::new()))).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/api/chat", base))
        .json(&json!({ "question": "" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");
    assert_eq!(body["error"]["message"], "question must not be empty");

    let resp = client
        .post(format!("{}/api/chat", base))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn test_health_endpoints() {
    let base = serve(router(vec![], Arc::new(InMemorySemanticStore::new()))).await;
    let client = reqwest::Client::new();

    let text = client
        .get(format!("{}/api/chat/health", base))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(text, "OK");

    let body: Value = client
        .get(format!("{}/health", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

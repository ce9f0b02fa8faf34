//! In-process JSON-RPC mock used by fetcher and poller tests.

use std::net::SocketAddr;
use std::time::Duration;

use axum::{extract::Path, http::StatusCode, routing::post, Json, Router};
use num_bigint::BigUint;
use serde_json::{json, Value};

use crate::models::{Reading, RpcEndpoint};

/// Routes:
/// * `/height/:hex` answers with `result: <hex>`
/// * `/status/:code` answers with a bare HTTP status
/// * `/rpc-error` answers 200 with a JSON-RPC `error`
/// * `/malformed` answers 200 with a non-string result
/// * `/garbage` answers 200 with a non-JSON body
/// * `/slow/:ms` sleeps before answering `0x1`
/// * `/strict` answers `0x1` only for the exact `eth_blockNumber` request body
pub(crate) fn mock_router() -> Router {
    Router::new()
        .route(
            "/height/:hex",
            post(|Path(hex): Path<String>, Json(req): Json<Value>| async move {
                Json(json!({ "jsonrpc": "2.0", "id": req["id"].clone(), "result": hex }))
            }),
        )
        .route(
            "/status/:code",
            post(|Path(code): Path<u16>| async move {
                StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }),
        )
        .route(
            "/rpc-error",
            post(|| async {
                Json(json!({
                    "jsonrpc": "2.0",
                    "id": 1,
                    "error": { "code": -32000, "message": "header not found" }
                }))
            }),
        )
        .route(
            "/malformed",
            post(|| async { Json(json!({ "jsonrpc": "2.0", "id": 1, "result": 42 })) }),
        )
        .route("/garbage", post(|| async { "definitely not json" }))
        .route(
            "/slow/:ms",
            post(|Path(ms): Path<u64>| async move {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                Json(json!({ "jsonrpc": "2.0", "id": 1, "result": "0x1" }))
            }),
        )
        .route(
            "/strict",
            post(|Json(req): Json<Value>| async move {
                let expected =
                    json!({ "jsonrpc": "2.0", "method": "eth_blockNumber", "params": [], "id": 1 });
                if req == expected {
                    (StatusCode::OK, Json(json!({ "jsonrpc": "2.0", "id": 1, "result": "0x1" })))
                } else {
                    (StatusCode::BAD_REQUEST, Json(json!({})))
                }
            }),
        )
}

pub(crate) async fn spawn_rpc_mock() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::Server::from_tcp(listener)
            .unwrap()
            .serve(mock_router().into_make_service())
            .await
            .unwrap();
    });
    addr
}

/// An address nothing listens on.
pub(crate) fn closed_addr() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

pub(crate) fn endpoint(addr: SocketAddr, path: &str, nickname: &str) -> RpcEndpoint {
    RpcEndpoint { url: format!("http://{addr}{path}"), nickname: Some(nickname.to_string()) }
}

pub(crate) fn reading(provider: &str, height: u64, timestamp: i64) -> Reading {
    Reading {
        provider: provider.to_string(),
        endpoint: format!("https://{provider}.example"),
        height: BigUint::from(height),
        timestamp,
        latency_ms: Some(50),
    }
}

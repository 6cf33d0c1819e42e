//! 测试用的本地 Bangumi 假后端
//! 在随机端口起一个最小 axum 服务, 统计请求次数与并发峰值

use crate::types::{CollectionItem, Subject};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Default)]
pub struct MockUpstream {
    /// 收藏端点按 limit/offset 切片返回这些条目
    pub items: Vec<CollectionItem>,
    /// 指定 id 的详情载荷, 未指定的 id 返回一个普通 PC 条目
    pub details: HashMap<i64, serde_json::Value>,
    /// 这些 id 的详情请求返回 500
    pub fail_details: HashSet<i64>,
    /// 收藏端点整体返回 500
    pub fail_collections: bool,
    /// 详情端点的人工延迟, 用于并发峰值观测
    pub detail_delay_ms: u64,
    pub collection_requests: AtomicUsize,
    pub detail_requests: AtomicUsize,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

#[derive(Deserialize)]
struct PageQuery {
    limit: usize,
    offset: usize,
}

async fn collections_handler(
    State(state): State<Arc<MockUpstream>>,
    Query(page): Query<PageQuery>,
) -> impl IntoResponse {
    state.collection_requests.fetch_add(1, Ordering::SeqCst);
    if state.fail_collections {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    let data: Vec<CollectionItem> = state
        .items
        .iter()
        .skip(page.offset)
        .take(page.limit)
        .cloned()
        .collect();
    Json(json!({
        "total": state.items.len(),
        "limit": page.limit,
        "offset": page.offset,
        "data": data,
    }))
    .into_response()
}

async fn subject_handler(
    State(state): State<Arc<MockUpstream>>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    state.detail_requests.fetch_add(1, Ordering::SeqCst);
    let now = state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
    state.max_in_flight.fetch_max(now, Ordering::SeqCst);
    if state.detail_delay_ms > 0 {
        tokio::time::sleep(Duration::from_millis(state.detail_delay_ms)).await;
    }
    state.in_flight.fetch_sub(1, Ordering::SeqCst);

    if state.fail_details.contains(&id) {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    match state.details.get(&id) {
        Some(payload) => Json(payload.clone()).into_response(),
        None => Json(json!({"tags": [], "platform": "PC", "infobox": []})).into_response(),
    }
}

async fn user_handler(Path(username): Path<String>) -> impl IntoResponse {
    if username == "missing" {
        return StatusCode::NOT_FOUND.into_response();
    }
    Json(json!({
        "username": username,
        "nickname": "测试用户",
        "avatar": {"large": "", "medium": "", "small": ""},
    }))
    .into_response()
}

/// 起一个假后端, 返回 base url
pub async fn spawn(state: Arc<MockUpstream>) -> String {
    let app = Router::new()
        .route("/users/{username}", get(user_handler))
        .route("/users/{username}/collections", get(collections_handler))
        .route("/subjects/{id}", get(subject_handler))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{}", addr)
}

/// 构造一条 "玩过" 的测试收藏
pub fn item(subject_id: i64, rate: u8, updated: &str) -> CollectionItem {
    CollectionItem {
        subject_id,
        subject_type: 4,
        collection_type: 2,
        rate,
        comment: None,
        tags: Vec::new(),
        updated_at: updated.parse().unwrap(),
        subject: Some(Subject {
            id: subject_id,
            name: format!("游戏{}", subject_id),
            ..Default::default()
        }),
    }
}

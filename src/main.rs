mod bangumi;
mod cache;
mod core;
mod enrich;
mod http_client;
mod stats;
#[cfg(test)]
mod test_util;
mod types;

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, Method, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{Datelike, Local};
use futures::StreamExt;
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::bangumi::BangumiError;
use crate::cache::{DetailCache, FileCache};
use crate::core::{build_report, report_stream, ReportParams};
use crate::types::ExcludedEntry;

/// 默认的 Bangumi v0 API 地址
const DEFAULT_API_BASE: &str = "https://api.bgm.tv/v0";

/// 图片代理允许的来源域名
const ALLOWED_IMAGE_HOSTS: &[&str] = &["lain.bgm.tv", "bgm.tv", "bangumi.tv"];

#[derive(Clone)]
struct AppState {
    api_base: String,
    token: Option<String>,
    cache: Arc<dyn DetailCache>,
}

#[tokio::main]
async fn main() {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let api_base =
        std::env::var("BANGUMI_API_BASE").unwrap_or_else(|_| DEFAULT_API_BASE.to_string());
    let token = std::env::var("BANGUMI_TOKEN").ok().filter(|t| !t.is_empty());
    let cache_dir = std::env::var("CACHE_DIR").unwrap_or_else(|_| "cache".to_string());

    let state = AppState {
        api_base,
        token,
        cache: Arc::new(FileCache::new(&cache_dir)),
    };

    let app = build_router(state.clone());

    let port = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3000);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    info!("🚀 Bangumi 年度报告 API 启动在 http://{}", addr);
    info!("📡 上游 API: {}", state.api_base);
    info!("🗃️ 详情缓存目录: {}", cache_dir);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}

fn build_router(state: AppState) -> Router {
    // CORS 配置
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/", get(index_handler))
        .route("/api", get(api_info_handler))
        .route("/health", get(health_handler))
        .route("/users/{username}", get(user_handler))
        .route("/report", post(report_handler))
        .route("/report/stream", post(report_stream_handler))
        .route("/report/{username}/{year}", get(report_get_handler))
        .route("/proxy/image", get(image_proxy_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// GET / - 最小前端页面
async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// GET /api - API 信息
async fn api_info_handler() -> impl IntoResponse {
    Json(json!({
        "name": "Bangumi Annual API",
        "version": "0.1.0",
        "description": "Bangumi 游戏年度报告后端",
        "endpoints": {
            "GET /": "报告页面",
            "GET /health": "健康检查",
            "GET /users/{username}": "获取用户信息",
            "POST /report": "生成年度报告 (JSON: username, year, exclude)",
            "POST /report/stream": "流式生成年度报告 (NDJSON 进度)",
            "GET /report/{username}/{year}": "生成年度报告 (无排除列表)",
            "GET /proxy/image?url=": "同源图片代理 (仅 Bangumi 图源)"
        },
        "auth": {
            "note": "服务端可通过 BANGUMI_TOKEN 环境变量附带访问令牌",
            "get_token": "https://next.bgm.tv/demo/access-token"
        }
    }))
}

/// 健康检查
async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// GET /users/{username} - 获取用户信息
async fn user_handler(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> impl IntoResponse {
    match bangumi::fetch_user(&state.api_base, state.token.as_deref(), &username).await {
        Ok(user) => Json(json!(user)).into_response(),
        Err(e) => map_bangumi_error(e),
    }
}

/// 报告请求体
#[derive(Debug, Deserialize)]
pub struct ReportRequest {
    pub username: String,
    pub year: Option<i32>,
    #[serde(default)]
    pub exclude: Vec<ExcludedEntry>,
}

/// 校验请求并转换成生成参数
fn report_params(state: &AppState, req: ReportRequest) -> Result<ReportParams, Response> {
    let username = req.username.trim().to_string();
    if username.is_empty() {
        return Err(bad_request("请填写 Bangumi 用户名"));
    }

    let year = req.year.unwrap_or_else(|| Local::now().year());
    if !(2000..=2100).contains(&year) {
        return Err(bad_request("年份超出范围"));
    }

    Ok(ReportParams {
        api_base: state.api_base.clone(),
        token: state.token.clone(),
        username,
        year,
        exclude: req.exclude,
    })
}

/// POST /report - 生成年度报告
async fn report_handler(State(state): State<AppState>, Json(req): Json<ReportRequest>) -> Response {
    let params = match report_params(&state, req) {
        Ok(params) => params,
        Err(response) => return response,
    };

    info!("📊 生成报告: {} / {}", params.username, params.year);
    match build_report(&params, state.cache.as_ref()).await {
        Ok(report) => Json(report).into_response(),
        Err(e) => map_bangumi_error(e),
    }
}

/// GET /report/{username}/{year} - 无排除列表的便捷入口
async fn report_get_handler(
    State(state): State<AppState>,
    Path((username, year)): Path<(String, i32)>,
) -> Response {
    let req = ReportRequest {
        username,
        year: Some(year),
        exclude: Vec::new(),
    };
    report_handler(State(state), Json(req)).await
}

/// POST /report/stream - NDJSON 进度流
async fn report_stream_handler(
    State(state): State<AppState>,
    Json(req): Json<ReportRequest>,
) -> Response {
    let params = match report_params(&state, req) {
        Ok(params) => params,
        Err(response) => return response,
    };

    let stream = report_stream(params, state.cache.clone());
    let body = Body::from_stream(stream.map(Ok::<_, std::convert::Infallible>));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/x-ndjson; charset=utf-8")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(body)
        .unwrap()
}

#[derive(Debug, Deserialize)]
pub struct ProxyQuery {
    pub url: String,
}

/// GET /proxy/image?url= - 同源图片代理
/// 导出报告图时, 跨域封面会污染画布, 统一经由本服务中转
async fn image_proxy_handler(Query(query): Query<ProxyQuery>) -> Response {
    let parsed = match url::Url::parse(&query.url) {
        Ok(parsed) => parsed,
        Err(_) => return bad_request("无效的图片地址"),
    };

    if !matches!(parsed.scheme(), "http" | "https") {
        return bad_request("无效的图片地址");
    }

    let allowed = parsed
        .host_str()
        .map(|host| {
            ALLOWED_IMAGE_HOSTS
                .iter()
                .any(|allow| host == *allow || host.ends_with(&format!(".{}", allow)))
        })
        .unwrap_or(false);
    if !allowed {
        return bad_request("不支持的图片来源");
    }

    match http_client::get_bytes(query.url.as_str()).await {
        Ok((bytes, content_type)) => Response::builder()
            .status(StatusCode::OK)
            .header(
                header::CONTENT_TYPE,
                content_type.unwrap_or_else(|| "image/jpeg".to_string()),
            )
            .header(header::CACHE_CONTROL, "public, max-age=86400")
            .body(Body::from(bytes))
            .unwrap(),
        Err(e) => (
            StatusCode::BAD_GATEWAY,
            Json(json!({"error": e.to_string()})),
        )
            .into_response(),
    }
}

fn bad_request(message: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({"error": message}))).into_response()
}

fn map_bangumi_error(e: BangumiError) -> Response {
    let status = match e {
        BangumiError::UserNotFound => StatusCode::NOT_FOUND,
        BangumiError::Http(_) => StatusCode::BAD_GATEWAY,
    };
    (status, Json(json!({"error": e.to_string()}))).into_response()
}

/// 最小前端 HTML
const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html lang="zh-CN">
<head>
  <meta charset="UTF-8">
  <meta name="viewport" content="width=device-width, initial-scale=1.0">
  <title>Bangumi 游戏年度报告</title>
  <style>
    * { margin: 0; padding: 0; box-sizing: border-box; }
    body {
      font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
      background: linear-gradient(135deg, #1a1a2e 0%, #16213e 50%, #0f3460 100%);
      min-height: 100vh;
      color: #e8e8e8;
      padding: 20px;
    }
    .container { max-width: 960px; margin: 0 auto; }
    h1 {
      text-align: center;
      font-size: 2rem;
      margin: 30px 0 20px;
      background: linear-gradient(90deg, #ff6b9d, #c44dff);
      -webkit-background-clip: text;
      -webkit-text-fill-color: transparent;
      background-clip: text;
    }
    .search-box { display: flex; gap: 10px; margin-bottom: 16px; }
    input {
      padding: 14px 18px;
      border: none;
      border-radius: 12px;
      background: rgba(255,255,255,0.1);
      color: #fff;
      font-size: 16px;
      outline: none;
    }
    input#username { flex: 1; }
    input#year { width: 110px; }
    input::placeholder { color: rgba(255,255,255,0.5); }
    input:focus { background: rgba(255,255,255,0.15); }
    button {
      padding: 14px 28px;
      border: none;
      border-radius: 12px;
      background: linear-gradient(135deg, #ff6b9d, #c44dff);
      color: #fff;
      font-size: 16px;
      font-weight: 600;
      cursor: pointer;
      transition: transform 0.2s, opacity 0.2s;
    }
    button:hover { transform: scale(1.02); }
    button:disabled { opacity: 0.6; cursor: not-allowed; }
    .progress {
      background: rgba(255,255,255,0.1);
      border-radius: 8px;
      height: 6px;
      margin-bottom: 20px;
      overflow: hidden;
      display: none;
    }
    .progress-bar {
      height: 100%;
      background: linear-gradient(90deg, #ff6b9d, #c44dff);
      width: 0%;
      transition: width 0.3s;
    }
    .card {
      background: rgba(255,255,255,0.05);
      border-radius: 12px;
      padding: 16px;
      margin-bottom: 16px;
      backdrop-filter: blur(10px);
    }
    .card h2 { font-size: 15px; margin-bottom: 12px; color: rgba(255,255,255,0.8); }
    .user-header { display: flex; align-items: center; gap: 14px; }
    .user-header img { width: 56px; height: 56px; border-radius: 50%; object-fit: cover; }
    .user-header .nick { font-size: 18px; font-weight: 600; }
    .user-header .sub { font-size: 13px; color: rgba(255,255,255,0.6); }
    .bars { display: flex; align-items: flex-end; gap: 6px; height: 80px; }
    .bars .col { flex: 1; display: flex; flex-direction: column; justify-content: flex-end; align-items: center; gap: 4px; }
    .bars .bar { width: 100%; border-radius: 4px 4px 0 0; background: linear-gradient(180deg, #c44dff, #ff6b9d); }
    .bars .lbl { font-size: 11px; color: rgba(255,255,255,0.5); }
    .covers { display: grid; grid-template-columns: repeat(auto-fill, minmax(86px, 1fr)); gap: 8px; }
    .covers img { width: 100%; aspect-ratio: 3/4; object-fit: cover; border-radius: 8px; }
    .month-label { font-size: 13px; color: rgba(255,255,255,0.6); margin: 10px 0 8px; }
    .rank-item { display: flex; justify-content: space-between; padding: 8px 10px; border-radius: 8px; font-size: 14px; }
    .rank-item:nth-child(odd) { background: rgba(255,255,255,0.05); }
    .rank-item .score { color: #ff6b9d; font-weight: 600; }
    .axis { display: flex; align-items: center; gap: 10px; margin-bottom: 8px; font-size: 13px; }
    .axis .label { width: 72px; color: rgba(255,255,255,0.7); }
    .axis .track { flex: 1; height: 8px; background: rgba(255,255,255,0.08); border-radius: 4px; overflow: hidden; }
    .axis .fill { height: 100%; background: linear-gradient(90deg, #06b6d4, #c44dff); }
    .axis .count { width: 32px; text-align: right; color: rgba(255,255,255,0.5); }
    .error { color: #ff6b6b; font-size: 13px; margin-bottom: 16px; }
    .empty { color: rgba(255,255,255,0.4); font-size: 14px; text-align: center; padding: 40px; }
  </style>
</head>
<body>
  <div class="container">
    <h1>🎮 Bangumi 游戏年度报告</h1>
    <div class="search-box">
      <input type="text" id="username" placeholder="Bangumi 用户名..." autofocus>
      <input type="number" id="year" placeholder="年份">
      <button id="goBtn" onclick="generate()">生成</button>
    </div>
    <div class="progress" id="progress"><div class="progress-bar" id="progressBar"></div></div>
    <div id="message"></div>
    <div id="report"></div>
  </div>

  <script>
    const usernameInput = document.getElementById('username');
    const yearInput = document.getElementById('year');
    const btn = document.getElementById('goBtn');
    const progress = document.getElementById('progress');
    const progressBar = document.getElementById('progressBar');
    const message = document.getElementById('message');
    const reportEl = document.getElementById('report');

    yearInput.value = new Date().getFullYear();
    usernameInput.addEventListener('keydown', e => { if (e.key === 'Enter') generate(); });

    async function generate() {
      const username = usernameInput.value.trim();
      if (!username) { alert('请输入 Bangumi 用户名'); return; }
      const year = parseInt(yearInput.value, 10) || new Date().getFullYear();

      btn.disabled = true;
      btn.textContent = '生成中...';
      message.innerHTML = '';
      reportEl.innerHTML = '';
      progress.style.display = 'block';
      progressBar.style.width = '0%';

      try {
        const response = await fetch('/report/stream', {
          method: 'POST',
          headers: { 'Content-Type': 'application/json' },
          body: JSON.stringify({ username, year })
        });

        if (!response.ok) {
          const err = await response.json();
          throw new Error(err.error || '请求失败');
        }

        const reader = response.body.getReader();
        const decoder = new TextDecoder();
        let buffer = '';

        while (true) {
          const { done, value } = await reader.read();
          if (done) break;

          buffer += decoder.decode(value, { stream: true });
          const lines = buffer.split('\n');
          buffer = lines.pop() || '';

          for (const line of lines) {
            if (!line.trim()) continue;
            try {
              const data = JSON.parse(line);
              if (data.progress) {
                progressBar.style.width = (data.progress.completed / data.progress.total * 100) + '%';
              }
              if (data.report) renderReport(data.report);
              if (data.error) message.innerHTML = '<div class="error">' + data.error + '</div>';
              if (data.done) progress.style.display = 'none';
            } catch {}
          }
        }
      } catch (e) {
        message.innerHTML = '<div class="error">生成失败: ' + e.message + '</div>';
        progress.style.display = 'none';
      } finally {
        btn.disabled = false;
        btn.textContent = '生成';
      }
    }

    function esc(s) {
      return (s || '').replace(/[&<>"']/g, c => ({'&':'&amp;','<':'&lt;','>':'&gt;','"':'&quot;',"'":'&#39;'}[c]));
    }

    function renderReport(r) {
      if (!r.total) {
        reportEl.innerHTML = '<div class="empty">' + r.year + ' 年没有找到任何已玩过的游戏</div>';
        return;
      }

      const monthNames = ['1月','2月','3月','4月','5月','6月','7月','8月','9月','10月','11月','12月'];
      const maxCount = Math.max(...r.monthly_counts, 1);
      const avatar = r.user.avatar && r.user.avatar.large;

      let html = '<div class="card"><div class="user-header">'
        + (avatar ? '<img src="' + esc(avatar) + '" alt="">' : '')
        + '<div><div class="nick">' + esc(r.user.nickname || r.username) + '</div>'
        + '<div class="sub">' + r.year + ' 年共玩过 ' + r.total + ' 部游戏</div></div></div></div>';

      html += '<div class="card"><h2>📅 每月完成数</h2><div class="bars">'
        + r.monthly_counts.map((c, i) =>
            '<div class="col"><div class="bar" style="height:' + (c / maxCount * 64) + 'px"></div>'
            + '<div class="lbl">' + monthNames[i] + '</div></div>').join('')
        + '</div></div>';

      if (r.top_rated.length) {
        html += '<div class="card"><h2>🏆 年度高分</h2>'
          + r.top_rated.map(g => rankRow(g)).join('') + '</div>';
      }
      if (r.bottom_rated.length) {
        html += '<div class="card"><h2>💢 年度低分</h2>'
          + r.bottom_rated.map(g => rankRow(g)).join('') + '</div>';
      }

      html += radarCard('🎯 类型雷达', r.genre_radar);
      html += radarCard('💘 Gal 风格雷达', r.style_radar);

      if (r.platforms.length) {
        html += '<div class="card"><h2>🕹️ 平台分布</h2>'
          + r.platforms.map(p => '<div class="rank-item"><span>' + esc(p.platform)
            + '</span><span class="score">' + p.count + '</span></div>').join('') + '</div>';
      }
      if (r.developers.length || r.scenarists.length) {
        html += '<div class="card"><h2>👥 年度制作组</h2>'
          + r.developers.map(s => '<div class="rank-item"><span>开发 · ' + esc(s.name)
            + '</span><span class="score">' + s.count + '</span></div>').join('')
          + r.scenarists.map(s => '<div class="rank-item"><span>剧本 · ' + esc(s.name)
            + '</span><span class="score">' + s.count + '</span></div>').join('') + '</div>';
      }

      html += '<div class="card"><h2>🗓️ 时间轴</h2>'
        + r.months.map(m => '<div class="month-label">' + m.month + ' 月</div><div class="covers">'
          + m.items.map(g => '<img loading="lazy" src="' + esc(g.image) + '" title="'
            + esc(g.name_cn || g.name) + '">').join('') + '</div>').join('')
        + '</div>';

      reportEl.innerHTML = html;
    }

    function rankRow(g) {
      return '<div class="rank-item"><span>' + esc(g.name_cn || g.name)
        + '</span><span class="score">' + g.rate + ' 分</span></div>';
    }

    function radarCard(title, radar) {
      if (!radar.axes.length) return '';
      return '<div class="card"><h2>' + title + '</h2>'
        + radar.axes.map((a, i) =>
            '<div class="axis"><div class="label">' + esc(a.label) + '</div>'
            + '<div class="track"><div class="fill" style="width:' + Math.min(radar.scaled[i] / 1.5, 100) + '%"></div></div>'
            + '<div class="count">' + a.count + '</div></div>').join('')
        + '</div>';
    }
  </script>
</body>
</html>"#;

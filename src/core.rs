//! 报告组装核心
//! 收藏拉取 -> 年度过滤 -> 详情补充 -> 聚合, 以及 NDJSON 进度流

use crate::bangumi::{self, BangumiError};
use crate::cache::DetailCache;
use crate::enrich;
use crate::stats;
use crate::types::{
    AnnualReport, CollectionItem, ExcludedEntry, RadarAxis, RadarView, StreamEvent, StreamProgress,
    SubjectDetail, UserProfile,
};
use chrono::Local;
use futures::stream::Stream;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::info;

/// 报告生成参数
#[derive(Debug, Clone)]
pub struct ReportParams {
    pub api_base: String,
    pub token: Option<String>,
    pub username: String,
    pub year: i32,
    pub exclude: Vec<ExcludedEntry>,
}

/// 生成完整年度报告
pub async fn build_report(
    params: &ReportParams,
    cache: &dyn DetailCache,
) -> Result<AnnualReport, BangumiError> {
    let token = params.token.as_deref();
    let user = bangumi::fetch_user(&params.api_base, token, &params.username).await?;
    let items = bangumi::fetch_collections(&params.api_base, token, &params.username).await?;
    info!("📥 {} 的收藏共 {} 条", params.username, items.len());

    let filtered = stats::filter_year(&items, params.year, &params.exclude);
    let ids: Vec<i64> = filtered.iter().map(|i| i.subject_id).collect();
    let details = enrich::enrich_subjects(&params.api_base, token, &ids, cache).await;

    Ok(assemble(params, user, &filtered, &details))
}

/// 用过滤后的条目和补充数据拼出报告
fn assemble(
    params: &ReportParams,
    user: UserProfile,
    filtered: &[CollectionItem],
    details: &HashMap<i64, SubjectDetail>,
) -> AnnualReport {
    let (top_rated, bottom_rated) = stats::rank_by_rating(filtered);
    let (developers, scenarists) = stats::staff_ranking(filtered, details);

    let mut report = AnnualReport {
        username: params.username.clone(),
        year: params.year,
        user,
        total: filtered.len(),
        monthly_counts: stats::monthly_counts(filtered),
        months: stats::group_by_month(filtered),
        top_rated,
        bottom_rated,
        genre_radar: radar_view(stats::genre_radar(filtered, details)),
        style_radar: radar_view(stats::style_radar(filtered, details)),
        platforms: stats::platform_ranking(filtered, details),
        developers,
        scenarists,
        generated_at: Local::now().format("%Y-%m-%d %H:%M").to_string(),
    };
    rewrite_images(&mut report);
    report
}

fn radar_view(axes: Vec<RadarAxis>) -> RadarView {
    let scaled = stats::display_scale(&axes);
    RadarView { axes, scaled }
}

/// 同源改写: rewrite(url) -> /proxy/image?url=...
pub fn proxied_url(url: &str) -> String {
    if url.is_empty() {
        return String::new();
    }
    format!("/proxy/image?url={}", urlencoding::encode(url))
}

/// 封面和头像改写到同源图片代理, 导出画布时不会被跨域污染
fn rewrite_images(report: &mut AnnualReport) {
    let entries = report
        .months
        .iter_mut()
        .flat_map(|m| m.items.iter_mut())
        .chain(report.top_rated.iter_mut())
        .chain(report.bottom_rated.iter_mut());
    for entry in entries {
        entry.image = proxied_url(&entry.image);
    }

    if let Some(avatar) = report.user.avatar.as_mut() {
        avatar.large = proxied_url(&avatar.large);
        avatar.medium = proxied_url(&avatar.medium);
        avatar.small = proxied_url(&avatar.small);
    }
}

/// 流式生成报告, 进度以 NDJSON 逐行推送
pub fn report_stream(
    params: ReportParams,
    cache: Arc<dyn DetailCache>,
) -> impl Stream<Item = String> {
    let (tx, rx) = mpsc::unbounded_channel::<String>();

    tokio::spawn(async move {
        execute_report_stream(params, cache, tx).await;
    });

    UnboundedReceiverStream::new(rx)
}

async fn execute_report_stream(
    params: ReportParams,
    cache: Arc<dyn DetailCache>,
    tx: mpsc::UnboundedSender<String>,
) {
    info!("📊 开始生成报告: {} / {}", params.username, params.year);
    let token = params.token.as_deref();

    // 用户与收藏加载失败是致命的, 以单条错误事件收尾
    let user = match bangumi::fetch_user(&params.api_base, token, &params.username).await {
        Ok(user) => user,
        Err(e) => {
            let _ = tx.send(format_event(&StreamEvent::Error { error: e.to_string() }));
            return;
        }
    };
    let items = match bangumi::fetch_collections(&params.api_base, token, &params.username).await {
        Ok(items) => items,
        Err(e) => {
            let _ = tx.send(format_event(&StreamEvent::Error { error: e.to_string() }));
            return;
        }
    };

    let _ = tx.send(format_event(&StreamEvent::Init {
        total: items.len() as u64,
    }));

    let filtered = stats::filter_year(&items, params.year, &params.exclude);
    let ids: Vec<i64> = filtered.iter().map(|i| i.subject_id).collect();

    let progress_tx = tx.clone();
    let details = enrich::enrich_subjects_with_progress(
        &params.api_base,
        token,
        &ids,
        cache.as_ref(),
        move |completed, total| {
            let event = StreamEvent::Progress {
                progress: StreamProgress {
                    stage: "enrich",
                    completed,
                    total,
                },
            };
            let _ = progress_tx.send(format_event(&event));
        },
    )
    .await;

    let report = assemble(&params, user, &filtered, &details);
    info!(
        "✅ 报告完成: {} / {} 共 {} 条",
        params.username, params.year, report.total
    );

    let _ = tx.send(format_event(&StreamEvent::Report {
        report: Box::new(report),
    }));
    let _ = tx.send(format_event(&StreamEvent::Done { done: true }));
}

/// 一行一个 JSON 对象
fn format_event(event: &StreamEvent) -> String {
    format!("{}\n", serde_json::to_string(event).unwrap_or_default())
}

//! 条目详情的有界并发补充
//! 先查缓存, 未命中再请求; 单条失败降级为默认值, 从不让整批失败

use crate::bangumi;
use crate::cache::DetailCache;
use crate::types::SubjectDetail;
use futures::stream::{self, StreamExt};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// 同时在途的详情请求上限
pub const ENRICH_CONCURRENCY: usize = 10;

/// 为一组条目 id 拉取补充数据, 返回 id -> 详情映射
///
/// 结果只取决于去重后的 id 集合: 已缓存的 id 不会产生网络调用,
/// 重复调用是幂等的。
pub async fn enrich_subjects(
    api_base: &str,
    token: Option<&str>,
    ids: &[i64],
    cache: &dyn DetailCache,
) -> HashMap<i64, SubjectDetail> {
    enrich_subjects_with_progress(api_base, token, ids, cache, |_, _| {}).await
}

/// 同上, 每完成一个 id 回调一次 (completed, total)
pub async fn enrich_subjects_with_progress<F>(
    api_base: &str,
    token: Option<&str>,
    ids: &[i64],
    cache: &dyn DetailCache,
    mut on_progress: F,
) -> HashMap<i64, SubjectDetail>
where
    F: FnMut(usize, usize),
{
    // 去重, 保持先到先入队的顺序
    let mut unique = Vec::new();
    let mut seen = HashSet::new();
    for &id in ids {
        if seen.insert(id) {
            unique.push(id);
        }
    }

    let total = unique.len();
    let mut map = HashMap::with_capacity(total);
    let mut completed = 0usize;

    let mut results = stream::iter(unique)
        .map(|id| async move { (id, fetch_one(api_base, token, id, cache).await) })
        .buffer_unordered(ENRICH_CONCURRENCY);

    while let Some((id, detail)) = results.next().await {
        completed += 1;
        on_progress(completed, total);
        map.insert(id, detail);
    }

    map
}

/// 单个 id: 缓存命中短路网络, 失败降级为默认值, 成功回填缓存
async fn fetch_one(
    api_base: &str,
    token: Option<&str>,
    id: i64,
    cache: &dyn DetailCache,
) -> SubjectDetail {
    if let Some(hit) = cache.get(id).await {
        debug!("🗃️ 详情缓存命中: {}", id);
        return hit;
    }

    match bangumi::fetch_subject_detail(api_base, token, id).await {
        Ok(detail) => {
            cache.put(id, &detail).await;
            detail
        }
        Err(e) => {
            warn!("条目 {} 详情获取失败, 以默认值代替: {}", id, e);
            SubjectDetail::default()
        }
    }
}

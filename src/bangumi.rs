//! Bangumi v0 API 客户端
//! 用户资料 / 收藏分页拉取 / 条目详情解析

use crate::http_client::{get_json, HttpClientError};
use crate::types::{
    CollectionItem, CollectionPage, SubjectDetail, SubjectPayload, UserProfile, UNKNOWN_PLATFORM,
};
use thiserror::Error;
use tracing::debug;

/// 游戏条目类型
pub const SUBJECT_TYPE_GAME: i32 = 4;

/// 收藏分页大小
pub const PAGE_SIZE: u64 = 30;

/// 详情里最多保留的标签数
const MAX_DETAIL_TAGS: usize = 10;

/// 开发商的 infobox key
const DEVELOPER_KEYS: &[&str] = &["开发", "开发商", "游戏开发商", "开发公司", "Developer"];

/// 剧本的 infobox key
const SCENARIST_KEYS: &[&str] = &["剧本", "脚本", "编剧", "剧本家", "Scenario"];

#[derive(Debug, Error)]
pub enum BangumiError {
    #[error("找不到该用户，请确认 ID 是否正确")]
    UserNotFound,
    #[error(transparent)]
    Http(#[from] HttpClientError),
}

/// 获取用户资料
pub async fn fetch_user(
    api_base: &str,
    token: Option<&str>,
    username: &str,
) -> Result<UserProfile, BangumiError> {
    let url = format!("{}/users/{}", api_base, username);
    match get_json::<UserProfile>(&url, token).await {
        Ok(user) => Ok(user),
        Err(e) if e.status() == Some(404) => Err(BangumiError::UserNotFound),
        Err(e) => Err(e.into()),
    }
}

/// 分页拉取用户的全部游戏收藏
///
/// 任一页失败则整体失败, 不返回部分结果, 也不重试;
/// 条目顺序即各页到达顺序 (服务端默认按更新时间倒序), 不做跨页去重。
pub async fn fetch_collections(
    api_base: &str,
    token: Option<&str>,
    username: &str,
) -> Result<Vec<CollectionItem>, BangumiError> {
    fetch_collections_paged(api_base, token, username, PAGE_SIZE).await
}

pub async fn fetch_collections_paged(
    api_base: &str,
    token: Option<&str>,
    username: &str,
    page_size: u64,
) -> Result<Vec<CollectionItem>, BangumiError> {
    let mut items = Vec::new();
    let mut offset = 0u64;

    loop {
        let url = format!(
            "{}/users/{}/collections?subject_type={}&limit={}&offset={}",
            api_base, username, SUBJECT_TYPE_GAME, page_size, offset
        );
        let page: CollectionPage = match get_json(&url, token).await {
            Ok(page) => page,
            Err(e) if e.status() == Some(404) => return Err(BangumiError::UserNotFound),
            Err(e) => return Err(e.into()),
        };

        debug!(
            "收藏分页: offset={} 本页 {} 条 / 共 {}",
            offset,
            page.data.len(),
            page.total
        );

        let total = page.total;
        items.extend(page.data);

        offset += page_size;
        if offset >= total {
            break;
        }
    }

    Ok(items)
}

/// 获取单个条目的补充数据
pub async fn fetch_subject_detail(
    api_base: &str,
    token: Option<&str>,
    id: i64,
) -> Result<SubjectDetail, HttpClientError> {
    let url = format!("{}/subjects/{}", api_base, id);
    let payload: SubjectPayload = get_json(&url, token).await?;
    Ok(detail_from_payload(payload))
}

/// 把原始条目载荷压缩成报告需要的补充数据
fn detail_from_payload(payload: SubjectPayload) -> SubjectDetail {
    let tags: Vec<String> = payload
        .tags
        .into_iter()
        .take(MAX_DETAIL_TAGS)
        .map(|t| t.name)
        .collect();

    let platform = match payload.platform {
        Some(p) if !p.trim().is_empty() => p,
        _ => UNKNOWN_PLATFORM.to_string(),
    };

    let mut developers = Vec::new();
    let mut scenarists = Vec::new();
    for entry in payload.infobox {
        let Some(value) = entry.value else { continue };
        if DEVELOPER_KEYS.contains(&entry.key.as_str()) {
            push_unique(&mut developers, split_names(value.into_strings()));
        } else if SCENARIST_KEYS.contains(&entry.key.as_str()) {
            push_unique(&mut scenarists, split_names(value.into_strings()));
        }
    }

    SubjectDetail {
        tags,
        platform,
        developers,
        scenarists,
    }
}

/// infobox 值里常见的多人名分隔符
fn split_names(values: Vec<String>) -> Vec<String> {
    values
        .iter()
        .flat_map(|v| v.split(['、', '/', '，', ',']))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn push_unique(target: &mut Vec<String>, names: Vec<String>) {
    for name in names {
        if !target.contains(&name) {
            target.push(name);
        }
    }
}

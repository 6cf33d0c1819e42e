//! 数据模型
//! Bangumi v0 API 的收藏/条目载荷 + 年度报告的派生视图

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 封面缺失时的占位图
pub const DEFAULT_COVER: &str = "https://lain.bgm.tv/pic/cover/l/c5/c9/1_abcd1234.jpg";

/// 平台获取失败时的哨兵值
pub const UNKNOWN_PLATFORM: &str = "Unknown";

// ============================================================================
// 收藏 API 载荷
// ============================================================================

/// GET /users/{username}/collections 的分页响应
#[derive(Debug, Clone, Deserialize)]
pub struct CollectionPage {
    pub total: u64,
    pub limit: u64,
    pub offset: u64,
    #[serde(default)]
    pub data: Vec<CollectionItem>,
}

/// 用户的一条收藏记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionItem {
    pub subject_id: i64,
    pub subject_type: i32,
    /// 收藏类型: 1=想玩 2=玩过 3=在玩 4=搁置 5=抛弃
    #[serde(rename = "type")]
    pub collection_type: i32,
    /// 0 = 未评分, 1-10 = 用户评分
    #[serde(default)]
    pub rate: u8,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub subject: Option<Subject>,
}

impl CollectionItem {
    /// 排除/去重用的身份: 同一条目可能被用户反复更新
    pub fn identity(&self) -> (i64, DateTime<Utc>) {
        (self.subject_id, self.updated_at)
    }
}

/// 收藏里内嵌的条目快照
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Subject {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub name_cn: String,
    #[serde(default)]
    pub images: Option<SubjectImages>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub score: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubjectImages {
    #[serde(default)]
    pub large: String,
    #[serde(default)]
    pub common: String,
    #[serde(default)]
    pub medium: String,
    #[serde(default)]
    pub small: String,
    #[serde(default)]
    pub grid: String,
}

impl SubjectImages {
    /// 取最大可用的封面
    pub fn cover(&self) -> &str {
        if !self.large.is_empty() {
            &self.large
        } else if !self.common.is_empty() {
            &self.common
        } else {
            DEFAULT_COVER
        }
    }
}

// ============================================================================
// 条目详情载荷
// ============================================================================

/// GET /subjects/{id} 的原始载荷 (只取需要的字段)
#[derive(Debug, Clone, Deserialize)]
pub struct SubjectPayload {
    #[serde(default)]
    pub tags: Vec<SubjectTag>,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub infobox: Vec<InfoboxEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubjectTag {
    pub name: String,
}

/// infobox 条目, value 可能是字符串也可能是 {v} 对象列表
#[derive(Debug, Clone, Deserialize)]
pub struct InfoboxEntry {
    pub key: String,
    #[serde(default)]
    pub value: Option<InfoboxValue>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum InfoboxValue {
    Text(String),
    List(Vec<InfoboxItem>),
}

#[derive(Debug, Clone, Deserialize)]
pub struct InfoboxItem {
    #[serde(default)]
    pub v: String,
}

impl InfoboxValue {
    /// 归一化成统一的字符串列表
    pub fn into_strings(self) -> Vec<String> {
        match self {
            InfoboxValue::Text(text) => vec![text],
            InfoboxValue::List(items) => items.into_iter().map(|item| item.v).collect(),
        }
    }
}

/// 条目的补充数据, 按条目 id 缓存
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectDetail {
    pub tags: Vec<String>,
    pub platform: String,
    pub developers: Vec<String>,
    pub scenarists: Vec<String>,
}

impl Default for SubjectDetail {
    fn default() -> Self {
        Self {
            tags: Vec::new(),
            platform: UNKNOWN_PLATFORM.to_string(),
            developers: Vec::new(),
            scenarists: Vec::new(),
        }
    }
}

// ============================================================================
// 用户 API 载荷
// ============================================================================

/// GET /users/{username} 的用户资料
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub username: String,
    #[serde(default)]
    pub nickname: String,
    #[serde(default)]
    pub avatar: Option<UserAvatar>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserAvatar {
    #[serde(default)]
    pub large: String,
    #[serde(default)]
    pub medium: String,
    #[serde(default)]
    pub small: String,
}

// ============================================================================
// 派生视图 (纯计算结果, 不持久化)
// ============================================================================

/// 会话内 "软删除" 的收藏身份, 由调用方显式传入
#[derive(Debug, Clone, Deserialize)]
pub struct ExcludedEntry {
    pub subject_id: i64,
    pub updated_at: DateTime<Utc>,
}

/// 报告里的一条游戏记录
#[derive(Debug, Clone, Serialize)]
pub struct GameEntry {
    pub subject_id: i64,
    pub name: String,
    pub name_cn: String,
    pub image: String,
    pub rate: u8,
    pub updated_at: DateTime<Utc>,
}

/// 按月份分组的时间轴
#[derive(Debug, Clone, Serialize)]
pub struct MonthGroup {
    pub month: u32,
    pub items: Vec<GameEntry>,
}

/// 雷达图的一根轴: 原始计数 + 相对最大值的 0-100 线性值
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RadarAxis {
    pub label: String,
    pub count: u32,
    pub value: f64,
}

/// 雷达向量 + 展示侧重缩放后的数值 (与 axes 一一对应)
#[derive(Debug, Clone, Serialize)]
pub struct RadarView {
    pub axes: Vec<RadarAxis>,
    pub scaled: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlatformCount {
    pub platform: String,
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StaffCount {
    pub name: String,
    pub count: u32,
}

/// 年度报告: 展示层消费的全部派生数据
#[derive(Debug, Clone, Serialize)]
pub struct AnnualReport {
    pub username: String,
    pub year: i32,
    pub user: UserProfile,
    pub total: usize,
    /// 1-12 月零填充的计数, 保证图表连续
    pub monthly_counts: [u32; 12],
    /// 按月份倒序的时间轴分组, 空月份不出现
    pub months: Vec<MonthGroup>,
    pub top_rated: Vec<GameEntry>,
    pub bottom_rated: Vec<GameEntry>,
    pub genre_radar: RadarView,
    pub style_radar: RadarView,
    pub platforms: Vec<PlatformCount>,
    pub developers: Vec<StaffCount>,
    pub scenarists: Vec<StaffCount>,
    pub generated_at: String,
}

// ============================================================================
// NDJSON 流事件
// ============================================================================

/// 流式报告的进度事件, 一行一个 JSON 对象
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum StreamEvent {
    Init { total: u64 },
    Progress { progress: StreamProgress },
    Report { report: Box<AnnualReport> },
    Error { error: String },
    Done { done: bool },
}

#[derive(Debug, Clone, Serialize)]
pub struct StreamProgress {
    pub stage: &'static str,
    pub completed: usize,
    pub total: usize,
}

//! 聚合引擎
//! 对过滤后的收藏做纯函数统计: 年度过滤 / 月份分组 / 高低分榜 /
//! 类型与风格雷达 / 平台榜 / 制作人员榜。全部无副作用, 边界输入返回空结果。

use crate::types::{
    CollectionItem, ExcludedEntry, GameEntry, MonthGroup, PlatformCount, RadarAxis, StaffCount,
    SubjectDetail, DEFAULT_COVER, UNKNOWN_PLATFORM,
};
use chrono::{DateTime, Datelike, Local, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};

/// 收藏类型: 玩过
const COLLECTION_TYPE_COLLECTED: i32 = 2;

/// 高分榜条数
const TOP_RATED: usize = 5;

/// 低分榜条数
const BOTTOM_RATED: usize = 3;

/// 评分条目不足时不出低分榜, 避免与高分榜重叠
const BOTTOM_MIN_RATED: usize = 8;

/// 雷达图最多保留的轴数
const RADAR_AXES: usize = 6;

const PLATFORM_TOP: usize = 4;
const STAFF_TOP: usize = 3;

/// 类型向量的固定词表, 每个条目只计入第一个命中的类型
const GENRE_TAGS: &[&str] = &[
    "RPG", "AVG", "ADV", "ACT", "SLG", "STG", "SIM", "FPS", "PUZ", "RTS", "MUG", "Roguelike",
    "卡牌", "沙盒",
];

/// 判定为 galgame / 文字冒险的标记标签
const GALGAME_MARKER_TAGS: &[&str] = &[
    "GAL", "Galgame", "AVG", "ADV", "视觉小说", "美少女游戏", "乙女", "文字冒险",
];

/// galgame 风格向量的固定词表, 一个条目对每个命中词最多 +1
const STYLE_TAGS: &[&str] = &[
    "恋爱", "纯爱", "催泪", "治愈", "致郁", "悬疑", "推理", "科幻", "奇幻", "日常", "校园", "传奇",
];

fn tag_matches(tag: &str, vocab: &str) -> bool {
    tag.to_lowercase() == vocab.to_lowercase()
}

/// 目标年份内、未被排除的 "玩过" 条目
///
/// 时间戳先转换到本地时区再取年份, 与展示层一致;
/// 排除集是调用方显式传入的会话内软删除列表。
pub fn filter_year(
    items: &[CollectionItem],
    year: i32,
    excluded: &[ExcludedEntry],
) -> Vec<CollectionItem> {
    let excluded: HashSet<(i64, DateTime<Utc>)> = excluded
        .iter()
        .map(|e| (e.subject_id, e.updated_at))
        .collect();

    items
        .iter()
        .filter(|item| item.collection_type == COLLECTION_TYPE_COLLECTED)
        .filter(|item| item.updated_at.with_timezone(&Local).year() == year)
        .filter(|item| !excluded.contains(&item.identity()))
        .cloned()
        .collect()
}

fn game_entry(item: &CollectionItem) -> GameEntry {
    let subject = item.subject.clone().unwrap_or_default();
    let image = subject
        .images
        .as_ref()
        .map(|i| i.cover().to_string())
        .unwrap_or_else(|| DEFAULT_COVER.to_string());

    GameEntry {
        subject_id: item.subject_id,
        name: subject.name,
        name_cn: subject.name_cn,
        image,
        rate: item.rate,
        updated_at: item.updated_at,
    }
}

/// 1-12 月零填充的条目计数
pub fn monthly_counts(items: &[CollectionItem]) -> [u32; 12] {
    let mut counts = [0u32; 12];
    for item in items {
        let month = item.updated_at.with_timezone(&Local).month() as usize;
        counts[month - 1] += 1;
    }
    counts
}

/// 按月份倒序分组的时间轴, 空月份不出现; 组内按更新时间倒序
pub fn group_by_month(items: &[CollectionItem]) -> Vec<MonthGroup> {
    let mut sorted: Vec<&CollectionItem> = items.iter().collect();
    sorted.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));

    let mut grouped: BTreeMap<u32, Vec<GameEntry>> = BTreeMap::new();
    for item in sorted {
        let month = item.updated_at.with_timezone(&Local).month();
        grouped.entry(month).or_default().push(game_entry(item));
    }

    grouped
        .into_iter()
        .rev()
        .map(|(month, items)| MonthGroup { month, items })
        .collect()
}

/// 高分榜与低分榜
///
/// 仅统计已评分条目 (rate > 0); 高分榜固定 5 条,
/// 低分榜只在评分条目不少于 8 条时出现, 且最低分在前。
pub fn rank_by_rating(items: &[CollectionItem]) -> (Vec<GameEntry>, Vec<GameEntry>) {
    let mut rated: Vec<&CollectionItem> = items.iter().filter(|item| item.rate > 0).collect();
    rated.sort_by(|a, b| b.rate.cmp(&a.rate));

    let top = rated.iter().take(TOP_RATED).map(|i| game_entry(i)).collect();

    let bottom = if rated.len() >= BOTTOM_MIN_RATED {
        rated
            .iter()
            .rev()
            .take(BOTTOM_RATED)
            .map(|i| game_entry(i))
            .collect()
    } else {
        Vec::new()
    };

    (top, bottom)
}

fn detail_tags<'a>(
    item: &CollectionItem,
    details: &'a HashMap<i64, SubjectDetail>,
) -> &'a [String] {
    details
        .get(&item.subject_id)
        .map(|d| d.tags.as_slice())
        .unwrap_or(&[])
}

/// 把计数表整理成雷达轴: 按计数倒序取前 N, 线性归一到 0-100 并保留原始计数
fn top_radar(counts: HashMap<&'static str, u32>) -> Vec<RadarAxis> {
    let mut buckets: Vec<(&str, u32)> = counts.into_iter().collect();
    buckets.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
    buckets.truncate(RADAR_AXES);

    let max = buckets.first().map(|(_, c)| *c).unwrap_or(0);
    if max == 0 {
        return Vec::new();
    }

    buckets
        .into_iter()
        .map(|(label, count)| RadarAxis {
            label: label.to_string(),
            count,
            value: count as f64 / max as f64 * 100.0,
        })
        .collect()
}

/// 类型雷达: 每个条目按详情标签里第一个命中词表的类型计 1 次
pub fn genre_radar(
    items: &[CollectionItem],
    details: &HashMap<i64, SubjectDetail>,
) -> Vec<RadarAxis> {
    let mut counts: HashMap<&'static str, u32> = HashMap::new();

    for item in items {
        let hit = detail_tags(item, details).iter().find_map(|tag| {
            GENRE_TAGS
                .iter()
                .find(|genre| tag_matches(tag, genre))
                .copied()
        });
        if let Some(genre) = hit {
            *counts.entry(genre).or_insert(0) += 1;
        }
    }

    top_radar(counts)
}

/// 风格雷达: 仅统计带 galgame/文字冒险标记的条目,
/// 每个条目对每个命中的风格词至多计 1 次
pub fn style_radar(
    items: &[CollectionItem],
    details: &HashMap<i64, SubjectDetail>,
) -> Vec<RadarAxis> {
    let mut counts: HashMap<&'static str, u32> = HashMap::new();

    for item in items {
        let tags = detail_tags(item, details);
        let is_marked = tags
            .iter()
            .any(|tag| GALGAME_MARKER_TAGS.iter().any(|m| tag_matches(tag, m)));
        if !is_marked {
            continue;
        }

        for &style in STYLE_TAGS {
            if tags.iter().any(|tag| tag_matches(tag, style)) {
                *counts.entry(style).or_insert(0) += 1;
            }
        }
    }

    top_radar(counts)
}

/// 展示侧的雷达重缩放
///
/// 当最大桶不小于其余桶之和 (分布被单一类别支配) 时, 用平方根曲线
/// `sqrt(v)/sqrt(max) * 150` 压缩视觉偏斜, 否则用线性 `v/max * 100`。
/// 这是图表可读性策略, 不是统计学处理, 谓词与两条公式按原始行为保留。
pub fn display_scale(axes: &[RadarAxis]) -> Vec<f64> {
    let max = axes.iter().map(|a| a.count).max().unwrap_or(0);
    if max == 0 {
        return vec![0.0; axes.len()];
    }

    let total: u32 = axes.iter().map(|a| a.count).sum();
    let dominant = max >= total - max;

    axes.iter()
        .map(|a| {
            if dominant {
                (a.count as f64).sqrt() / (max as f64).sqrt() * 150.0
            } else {
                a.count as f64 / max as f64 * 100.0
            }
        })
        .collect()
}

fn top_counts(counts: HashMap<String, u32>, limit: usize) -> Vec<(String, u32)> {
    let mut ranked: Vec<(String, u32)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    ranked.truncate(limit);
    ranked
}

/// 平台榜: "PC" 归一为 "Windows", 哨兵 "Unknown" 不参与, 取前 4
pub fn platform_ranking(
    items: &[CollectionItem],
    details: &HashMap<i64, SubjectDetail>,
) -> Vec<PlatformCount> {
    let mut counts: HashMap<String, u32> = HashMap::new();

    for item in items {
        let Some(detail) = details.get(&item.subject_id) else {
            continue;
        };
        if detail.platform == UNKNOWN_PLATFORM {
            continue;
        }
        let platform = if detail.platform == "PC" {
            "Windows".to_string()
        } else {
            detail.platform.clone()
        };
        *counts.entry(platform).or_insert(0) += 1;
    }

    top_counts(counts, PLATFORM_TOP)
        .into_iter()
        .map(|(platform, count)| PlatformCount { platform, count })
        .collect()
}

/// 制作人员榜: 开发与剧本各取前 3
/// 详情里的名单已按条目去重, 同一条目不会重复计数
pub fn staff_ranking(
    items: &[CollectionItem],
    details: &HashMap<i64, SubjectDetail>,
) -> (Vec<StaffCount>, Vec<StaffCount>) {
    let mut developers: HashMap<String, u32> = HashMap::new();
    let mut scenarists: HashMap<String, u32> = HashMap::new();

    for item in items {
        let Some(detail) = details.get(&item.subject_id) else {
            continue;
        };
        for name in &detail.developers {
            *developers.entry(name.clone()).or_insert(0) += 1;
        }
        for name in &detail.scenarists {
            *scenarists.entry(name.clone()).or_insert(0) += 1;
        }
    }

    let rank = |counts: HashMap<String, u32>| {
        top_counts(counts, STAFF_TOP)
            .into_iter()
            .map(|(name, count)| StaffCount { name, count })
            .collect()
    };

    (rank(developers), rank(scenarists))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Subject;

    fn item(id: i64, rate: u8, updated: &str) -> CollectionItem {
        item_typed(id, rate, updated, COLLECTION_TYPE_COLLECTED)
    }

    fn item_typed(id: i64, rate: u8, updated: &str, collection_type: i32) -> CollectionItem {
        CollectionItem {
            subject_id: id,
            subject_type: 4,
            collection_type,
            rate,
            comment: None,
            tags: Vec::new(),
            updated_at: updated.parse().unwrap(),
            subject: Some(Subject {
                id,
                name: format!("游戏{}", id),
                ..Default::default()
            }),
        }
    }

    fn detail(tags: &[&str], platform: &str) -> SubjectDetail {
        SubjectDetail {
            tags: tags.iter().map(|t| t.to_string()).collect(),
            platform: platform.to_string(),
            developers: Vec::new(),
            scenarists: Vec::new(),
        }
    }

    #[test]
    fn year_filter_keeps_only_target_year() {
        let items = vec![
            item(1, 0, "2025-03-01T12:00:00Z"),
            item(2, 0, "2024-12-31T00:00:00Z"),
            item(3, 0, "2025-06-15T12:00:00Z"),
        ];

        let filtered = filter_year(&items, 2025, &[]);
        let ids: Vec<_> = filtered.iter().map(|i| i.subject_id).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn year_filter_honors_exclusion_set() {
        let items = vec![
            item(1, 0, "2025-03-15T12:00:00Z"),
            item(2, 0, "2025-06-15T12:00:00Z"),
        ];
        let excluded = vec![ExcludedEntry {
            subject_id: 2,
            updated_at: "2025-06-15T12:00:00Z".parse().unwrap(),
        }];

        let filtered = filter_year(&items, 2025, &excluded);
        let ids: Vec<_> = filtered.iter().map(|i| i.subject_id).collect();
        assert_eq!(ids, vec![1]);
    }

    #[test]
    fn year_filter_drops_non_collected_types() {
        let items = vec![
            item(1, 0, "2025-05-15T12:00:00Z"),
            item_typed(2, 0, "2025-05-15T12:00:00Z", 1), // 想玩
            item_typed(3, 0, "2025-05-15T12:00:00Z", 3), // 在玩
        ];

        let filtered = filter_year(&items, 2025, &[]);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].subject_id, 1);
    }

    #[test]
    fn ranking_with_ten_rated_items() {
        let items: Vec<_> = (1..=10)
            .map(|i| item(i as i64, i as u8, "2025-05-15T12:00:00Z"))
            .collect();

        let (top, bottom) = rank_by_rating(&items);

        let top_rates: Vec<_> = top.iter().map(|g| g.rate).collect();
        assert_eq!(top_rates, vec![10, 9, 8, 7, 6]);

        // 低分榜最低分在前
        let bottom_rates: Vec<_> = bottom.iter().map(|g| g.rate).collect();
        assert_eq!(bottom_rates, vec![1, 2, 3]);
    }

    #[test]
    fn ranking_with_six_rated_items_has_no_bottom() {
        let items: Vec<_> = (1..=6)
            .map(|i| item(i as i64, i as u8, "2025-05-15T12:00:00Z"))
            .collect();

        let (top, bottom) = rank_by_rating(&items);
        assert_eq!(top.len(), 5);
        assert!(bottom.is_empty());
    }

    #[test]
    fn ranking_ignores_unrated_items() {
        let items = vec![
            item(1, 0, "2025-05-15T12:00:00Z"),
            item(2, 7, "2025-05-15T12:00:00Z"),
        ];

        let (top, bottom) = rank_by_rating(&items);
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].rate, 7);
        assert!(bottom.is_empty());
    }

    #[test]
    fn monthly_counts_zero_fill_absent_months() {
        let items = vec![
            item(1, 0, "2025-03-15T12:00:00Z"),
            item(2, 0, "2025-03-20T12:00:00Z"),
            item(3, 0, "2025-07-15T12:00:00Z"),
        ];

        let counts = monthly_counts(&items);
        assert_eq!(counts.iter().sum::<u32>(), 3);
        assert_eq!(counts.iter().filter(|&&c| c > 0).count(), 2);
    }

    #[test]
    fn month_groups_are_month_descending() {
        let items = vec![
            item(1, 0, "2025-03-15T12:00:00Z"),
            item(2, 0, "2025-07-15T12:00:00Z"),
            item(3, 0, "2025-03-18T12:00:00Z"),
        ];

        let groups = group_by_month(&items);
        assert_eq!(groups.len(), 2);
        assert!(groups[0].month > groups[1].month);
        // 组内按更新时间倒序
        let march = groups.iter().find(|g| g.items.len() == 2).unwrap();
        assert!(march.items[0].updated_at > march.items[1].updated_at);
    }

    #[test]
    fn genre_radar_counts_first_matching_tag_only() {
        let items = vec![
            item(1, 0, "2025-05-15T12:00:00Z"),
            item(2, 0, "2025-05-15T12:00:00Z"),
            item(3, 0, "2025-05-15T12:00:00Z"),
            item(4, 0, "2025-05-15T12:00:00Z"),
        ];
        let details: HashMap<i64, SubjectDetail> = [
            // RPG 在前, ADV 不计
            (1, detail(&["RPG", "ADV"], "PC")),
            (2, detail(&["rpg"], "PC")), // 大小写不敏感
            (3, detail(&["剧情", "SLG"], "PC")),
            (4, detail(&["恋爱"], "PC")), // 无类型标签
        ]
        .into_iter()
        .collect();

        let axes = genre_radar(&items, &details);
        assert_eq!(axes.len(), 2);
        assert_eq!(axes[0].label, "RPG");
        assert_eq!(axes[0].count, 2);
        assert_eq!(axes[0].value, 100.0);
        assert_eq!(axes[1].label, "SLG");
        assert_eq!(axes[1].count, 1);
        assert_eq!(axes[1].value, 50.0);
    }

    #[test]
    fn genre_radar_keeps_top_six_buckets() {
        let genres = ["RPG", "AVG", "ACT", "SLG", "STG", "SIM", "FPS", "PUZ"];
        let items: Vec<_> = (0..genres.len())
            .map(|i| item(i as i64, 0, "2025-05-15T12:00:00Z"))
            .collect();
        let details: HashMap<i64, SubjectDetail> = genres
            .iter()
            .enumerate()
            .map(|(i, g)| (i as i64, detail(&[g], "PC")))
            .collect();

        let axes = genre_radar(&items, &details);
        assert_eq!(axes.len(), 6);
    }

    #[test]
    fn style_radar_restricted_to_marked_items() {
        let items = vec![
            item(1, 0, "2025-05-15T12:00:00Z"),
            item(2, 0, "2025-05-15T12:00:00Z"),
            item(3, 0, "2025-05-15T12:00:00Z"),
        ];
        let details: HashMap<i64, SubjectDetail> = [
            // 带标记, 两个风格各 +1
            (1, detail(&["GAL", "恋爱", "催泪"], "PC")),
            // 无标记, 风格词不计
            (2, detail(&["RPG", "恋爱"], "PC")),
            (3, detail(&["视觉小说", "恋爱"], "PC")),
        ]
        .into_iter()
        .collect();

        let axes = style_radar(&items, &details);
        assert_eq!(axes.len(), 2);
        assert_eq!(axes[0].label, "恋爱");
        assert_eq!(axes[0].count, 2);
        assert_eq!(axes[1].label, "催泪");
        assert_eq!(axes[1].count, 1);
    }

    #[test]
    fn display_scale_uses_sqrt_for_dominant_distribution() {
        let axes = vec![
            RadarAxis { label: "RPG".into(), count: 20, value: 100.0 },
            RadarAxis { label: "ADV".into(), count: 1, value: 5.0 },
            RadarAxis { label: "SIM".into(), count: 1, value: 5.0 },
        ];

        // 20 >= 1 + 1, 支配分布, 走平方根压缩
        let scaled = display_scale(&axes);
        assert!((scaled[0] - 150.0).abs() < 1e-9);
        let expected = 1.0f64.sqrt() / 20.0f64.sqrt() * 150.0;
        assert!((scaled[1] - expected).abs() < 1e-9);
    }

    #[test]
    fn display_scale_uses_linear_for_balanced_distribution() {
        let axes = vec![
            RadarAxis { label: "RPG".into(), count: 5, value: 100.0 },
            RadarAxis { label: "ADV".into(), count: 4, value: 80.0 },
            RadarAxis { label: "SIM".into(), count: 3, value: 60.0 },
        ];

        // 5 < 4 + 3, 均衡分布, 线性缩放
        let scaled = display_scale(&axes);
        assert_eq!(scaled, vec![100.0, 80.0, 60.0]);
    }

    #[test]
    fn display_scale_handles_empty_and_zero_max() {
        assert!(display_scale(&[]).is_empty());

        let axes = vec![RadarAxis { label: "RPG".into(), count: 0, value: 0.0 }];
        assert_eq!(display_scale(&axes), vec![0.0]);
    }

    #[test]
    fn platform_ranking_renames_pc_and_drops_unknown() {
        let items: Vec<_> = (1..=10)
            .map(|i| item(i, 0, "2025-05-15T12:00:00Z"))
            .collect();
        let mut details: HashMap<i64, SubjectDetail> = HashMap::new();
        for id in 1..=3 {
            details.insert(id, detail(&[], "PC"));
        }
        for id in 4..=5 {
            details.insert(id, detail(&[], "PS5"));
        }
        for id in 6..=10 {
            details.insert(id, detail(&[], UNKNOWN_PLATFORM));
        }

        let ranking = platform_ranking(&items, &details);
        assert_eq!(
            ranking,
            vec![
                PlatformCount { platform: "Windows".into(), count: 3 },
                PlatformCount { platform: "PS5".into(), count: 2 },
            ]
        );
    }

    #[test]
    fn staff_ranking_counts_across_items() {
        let items: Vec<_> = (1..=3)
            .map(|i| item(i, 0, "2025-05-15T12:00:00Z"))
            .collect();
        let mut details: HashMap<i64, SubjectDetail> = HashMap::new();
        details.insert(
            1,
            SubjectDetail {
                tags: Vec::new(),
                platform: "PC".into(),
                developers: vec!["Key".into()],
                scenarists: vec!["麻枝准".into()],
            },
        );
        details.insert(
            2,
            SubjectDetail {
                tags: Vec::new(),
                platform: "PC".into(),
                developers: vec!["Key".into(), "Visual Arts".into()],
                scenarists: vec!["麻枝准".into()],
            },
        );
        details.insert(
            3,
            SubjectDetail {
                tags: Vec::new(),
                platform: "PC".into(),
                developers: vec!["Nitroplus".into()],
                scenarists: vec!["虚渊玄".into()],
            },
        );

        let (developers, scenarists) = staff_ranking(&items, &details);
        assert_eq!(developers[0], StaffCount { name: "Key".into(), count: 2 });
        assert_eq!(developers.len(), 3);
        assert_eq!(scenarists[0], StaffCount { name: "麻枝准".into(), count: 2 });
    }

    #[test]
    fn empty_inputs_produce_empty_outputs() {
        let details = HashMap::new();
        assert!(filter_year(&[], 2025, &[]).is_empty());
        assert!(group_by_month(&[]).is_empty());
        assert_eq!(monthly_counts(&[]), [0u32; 12]);
        let (top, bottom) = rank_by_rating(&[]);
        assert!(top.is_empty() && bottom.is_empty());
        assert!(genre_radar(&[], &details).is_empty());
        assert!(style_radar(&[], &details).is_empty());
        assert!(platform_ranking(&[], &details).is_empty());
        let (d, s) = staff_ranking(&[], &details);
        assert!(d.is_empty() && s.is_empty());
    }
}

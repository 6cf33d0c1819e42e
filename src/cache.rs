//! 条目详情的本地持久缓存
//! 一个条目一个 JSON 文件, 以 schema 前缀隔离版本; 解析失败视为损坏, 清除后当未命中处理

use crate::types::SubjectDetail;
use async_trait::async_trait;
use std::fs;
use std::path::PathBuf;
use tracing::warn;

/// 缓存 schema 版本前缀, 结构变更时递增使旧条目整体失效
pub const SCHEMA_PREFIX: &str = "detail_v1";

/// 详情缓存
///
/// 写入是幂等的: 同一条目的并发重复写入允许且安全 (相同键, 等价值),
/// 实现不需要提供事务保证。
#[async_trait]
pub trait DetailCache: Send + Sync {
    async fn get(&self, subject_id: i64) -> Option<SubjectDetail>;
    async fn put(&self, subject_id: i64, detail: &SubjectDetail);
}

/// 文件缓存: 目录下每个条目一个 `{SCHEMA_PREFIX}_{id}.json`
pub struct FileCache {
    dir: PathBuf,
}

impl FileCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        if let Err(e) = fs::create_dir_all(&dir) {
            warn!("创建缓存目录 {} 失败: {}", dir.display(), e);
        }
        Self { dir }
    }

    fn entry_path(&self, subject_id: i64) -> PathBuf {
        self.dir.join(format!("{}_{}.json", SCHEMA_PREFIX, subject_id))
    }
}

#[async_trait]
impl DetailCache for FileCache {
    async fn get(&self, subject_id: i64) -> Option<SubjectDetail> {
        let path = self.entry_path(subject_id);
        let content = fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&content) {
            Ok(detail) => Some(detail),
            Err(e) => {
                // 损坏条目按未命中处理, 顺手清掉
                warn!("缓存条目 {} 损坏, 已清除: {}", path.display(), e);
                let _ = fs::remove_file(&path);
                None
            }
        }
    }

    async fn put(&self, subject_id: i64, detail: &SubjectDetail) {
        let path = self.entry_path(subject_id);
        match serde_json::to_string(detail) {
            Ok(json) => {
                if let Err(e) = fs::write(&path, json) {
                    warn!("写入缓存 {} 失败: {}", path.display(), e);
                }
            }
            Err(e) => warn!("序列化缓存条目 {} 失败: {}", subject_id, e),
        }
    }
}

/// 内存缓存, 测试用
#[cfg(test)]
pub struct MemoryCache {
    entries: std::sync::Mutex<std::collections::HashMap<i64, SubjectDetail>>,
}

#[cfg(test)]
impl MemoryCache {
    pub fn new() -> Self {
        Self {
            entries: std::sync::Mutex::new(std::collections::HashMap::new()),
        }
    }
}

#[cfg(test)]
#[async_trait]
impl DetailCache for MemoryCache {
    async fn get(&self, subject_id: i64) -> Option<SubjectDetail> {
        self.entries.lock().unwrap().get(&subject_id).cloned()
    }

    async fn put(&self, subject_id: i64, detail: &SubjectDetail) {
        self.entries
            .lock()
            .unwrap()
            .insert(subject_id, detail.clone());
    }
}

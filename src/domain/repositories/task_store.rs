// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::fetch_result::FetchResult;
use crate::domain::models::task::{CrawlTask, TaskStatus};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// 存储层错误类型
///
/// 存储不可用对整个爬取会话是致命的
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// 存储错误
    #[error("Storage error: {0}")]
    StorageError(String),
}

/// 任务存储特质
///
/// 持久化协作方的接口，表结构由实现方负责。核心只需要
/// 保存任务与抓取结果，并在会话启动时读回未完成的任务
/// 以支持断点续爬。
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// 保存任务（按id幂等覆盖）
    async fn save(&self, task: &CrawlTask) -> Result<(), RepositoryError>;

    /// 读取所有未到终态的任务，按发现时间排序
    async fn load_pending(&self) -> Result<Vec<CrawlTask>, RepositoryError>;

    /// 保存抓取结果
    async fn save_result(&self, result: &FetchResult) -> Result<(), RepositoryError>;
}

#[async_trait]
impl<T: TaskStore + ?Sized> TaskStore for Arc<T> {
    async fn save(&self, task: &CrawlTask) -> Result<(), RepositoryError> {
        (**self).save(task).await
    }

    async fn load_pending(&self) -> Result<Vec<CrawlTask>, RepositoryError> {
        (**self).load_pending().await
    }

    async fn save_result(&self, result: &FetchResult) -> Result<(), RepositoryError> {
        (**self).save_result(result).await
    }
}

/// 内存任务存储
///
/// 默认实现，用于测试与无外部存储的运行方式
#[derive(Default)]
pub struct MemoryTaskStore {
    tasks: DashMap<Uuid, CrawlTask>,
    results: Mutex<Vec<FetchResult>>,
}

impl MemoryTaskStore {
    /// 创建新的内存任务存储实例
    pub fn new() -> Self {
        Self::default()
    }

    /// 已保存的任务总数
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// 处于指定状态的任务数
    pub fn count_with_status(&self, status: TaskStatus) -> usize {
        self.tasks.iter().filter(|t| t.status == status).count()
    }

    /// 按URL查找任务
    pub fn find_by_url(&self, url: &str) -> Option<CrawlTask> {
        self.tasks
            .iter()
            .find(|t| t.url.as_str() == url)
            .map(|t| t.value().clone())
    }

    /// 已保存的抓取结果副本
    pub fn results(&self) -> Vec<FetchResult> {
        self.results.lock().clone()
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn save(&self, task: &CrawlTask) -> Result<(), RepositoryError> {
        self.tasks.insert(task.id, task.clone());
        Ok(())
    }

    async fn load_pending(&self) -> Result<Vec<CrawlTask>, RepositoryError> {
        let mut pending: Vec<CrawlTask> = self
            .tasks
            .iter()
            .filter(|t| !t.status.is_terminal())
            .map(|t| t.value().clone())
            .collect();
        pending.sort_by_key(|t| t.discovered_at);
        Ok(pending)
    }

    async fn save_result(&self, result: &FetchResult) -> Result<(), RepositoryError> {
        self.results.lock().push(result.clone());
        Ok(())
    }
}

// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::utils::url_utils::CanonicalUrl;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// 爬取任务实体
///
/// 表示一个已发现但尚未完成抓取的URL。URL为规范化形式，
/// 在整个会话的去重集合中唯一。除attempt_count、priority、
/// status与scheduled_at外，其余字段创建后不再变更。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlTask {
    /// 任务唯一标识符
    pub id: Uuid,
    /// 规范化后的目标URL，同时作为去重键
    pub url: CanonicalUrl,
    /// 发现深度，种子为0，每向外一跳加1
    pub depth: u32,
    /// 任务状态
    pub status: TaskStatus,
    /// 任务优先级，数值越大优先级越高
    pub priority: i32,
    /// 已重试次数，首次尝试不计入
    pub attempt_count: u32,
    /// 最大重试次数
    pub max_retries: u32,
    /// 发现时间
    pub discovered_at: DateTime<Utc>,
    /// 最早可再次尝试的时间，仅重试路径使用
    pub scheduled_at: Option<DateTime<Utc>>,
    /// 完成时间（成功或终态失败）
    pub completed_at: Option<DateTime<Utc>>,
    /// 终态失败原因
    pub failure_reason: Option<String>,
}

/// 任务状态枚举
///
/// 状态转换遵循以下流程：
/// Discovered → Queued → Fetching → Succeeded/Failed，
/// 可重试的失败从Fetching回到Queued并递增attempt_count。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// 已发现，尚未进入队列
    #[default]
    Discovered,
    /// 已入队，等待调度
    Queued,
    /// 抓取中
    Fetching,
    /// 抓取成功，终态
    Succeeded,
    /// 失败且不再重试，终态
    Failed,
}

impl TaskStatus {
    /// 判断是否为终态
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Succeeded | TaskStatus::Failed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TaskStatus::Discovered => write!(f, "discovered"),
            TaskStatus::Queued => write!(f, "queued"),
            TaskStatus::Fetching => write!(f, "fetching"),
            TaskStatus::Succeeded => write!(f, "succeeded"),
            TaskStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for TaskStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "discovered" => Ok(TaskStatus::Discovered),
            "queued" => Ok(TaskStatus::Queued),
            "fetching" => Ok(TaskStatus::Fetching),
            "succeeded" => Ok(TaskStatus::Succeeded),
            "failed" => Ok(TaskStatus::Failed),
            _ => Err(()),
        }
    }
}

/// 领域错误类型
#[derive(Error, Debug)]
pub enum DomainError {
    /// 无效的状态转换，当任务状态转换不符合生命周期规则时发生
    #[error("Invalid state transition: {0} -> {1}")]
    InvalidStateTransition(TaskStatus, TaskStatus),
}

impl CrawlTask {
    /// 创建一个新发现的任务
    ///
    /// # 参数
    ///
    /// * `url` - 规范化后的目标URL
    /// * `depth` - 发现深度
    /// * `max_retries` - 最大重试次数
    ///
    /// # 返回值
    ///
    /// 返回处于Discovered状态的新任务
    pub fn discovered(url: CanonicalUrl, depth: u32, max_retries: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            url,
            depth,
            status: TaskStatus::Discovered,
            priority: 0,
            attempt_count: 0,
            max_retries,
            discovered_at: Utc::now(),
            scheduled_at: None,
            completed_at: None,
            failure_reason: None,
        }
    }

    /// 入队
    ///
    /// 将任务状态从Discovered变更为Queued
    pub fn enqueue(&mut self) -> Result<(), DomainError> {
        match self.status {
            TaskStatus::Discovered => {
                self.status = TaskStatus::Queued;
                Ok(())
            }
            other => Err(DomainError::InvalidStateTransition(other, TaskStatus::Queued)),
        }
    }

    /// 开始抓取
    ///
    /// 将任务状态从Queued变更为Fetching
    pub fn begin_fetch(&mut self) -> Result<(), DomainError> {
        match self.status {
            TaskStatus::Queued => {
                self.status = TaskStatus::Fetching;
                Ok(())
            }
            other => Err(DomainError::InvalidStateTransition(other, TaskStatus::Fetching)),
        }
    }

    /// 标记抓取成功，终态
    pub fn succeed(&mut self) -> Result<(), DomainError> {
        match self.status {
            TaskStatus::Fetching => {
                self.status = TaskStatus::Succeeded;
                self.completed_at = Some(Utc::now());
                Ok(())
            }
            other => Err(DomainError::InvalidStateTransition(other, TaskStatus::Succeeded)),
        }
    }

    /// 标记终态失败
    ///
    /// # 参数
    ///
    /// * `reason` - 失败原因，记录到failure_reason
    pub fn fail(&mut self, reason: impl Into<String>) -> Result<(), DomainError> {
        match self.status {
            TaskStatus::Queued | TaskStatus::Fetching => {
                self.status = TaskStatus::Failed;
                self.completed_at = Some(Utc::now());
                self.failure_reason = Some(reason.into());
                Ok(())
            }
            other => Err(DomainError::InvalidStateTransition(other, TaskStatus::Failed)),
        }
    }

    /// 安排可重试失败的再次入队
    ///
    /// 递增attempt_count并回到Queued状态；调用方负责确认
    /// 重试预算未耗尽后再将任务交还Frontier。
    ///
    /// # 参数
    ///
    /// * `not_before` - 最早可再次尝试的时间
    pub fn schedule_retry(&mut self, not_before: DateTime<Utc>) -> Result<(), DomainError> {
        match self.status {
            TaskStatus::Fetching => {
                self.attempt_count += 1;
                self.scheduled_at = Some(not_before);
                self.status = TaskStatus::Queued;
                Ok(())
            }
            other => Err(DomainError::InvalidStateTransition(other, TaskStatus::Queued)),
        }
    }

    /// 判断任务是否还有重试预算
    pub fn can_retry(&self) -> bool {
        self.attempt_count < self.max_retries
    }
}

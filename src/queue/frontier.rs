// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::host_state::HostRegistry;
use crate::domain::models::task::{CrawlTask, TaskStatus};
use crate::utils::errors::FrontierError;
use crate::utils::url_utils::CanonicalUrl;
use metrics::counter;
use parking_lot::Mutex;
use std::cmp::Ordering as CmpOrdering;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::trace;

/// 队列中的任务及其调度元数据
struct QueuedTask {
    ready_at: Instant,
    priority: i32,
    seq: u64,
    task: CrawlTask,
}

// BinaryHeap为最大堆，这里反转ready_at的比较方向，
// 使堆顶始终是最早就绪的任务；同时刻按优先级降序、入队序升序
impl Ord for QueuedTask {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other
            .ready_at
            .cmp(&self.ready_at)
            .then_with(|| self.priority.cmp(&other.priority))
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for QueuedTask {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for QueuedTask {}

struct FrontierState {
    /// 每主机的就绪时间有序队列
    queues: HashMap<String, BinaryHeap<QueuedTask>>,
    /// 队列非空主机的首次入队顺序，用于同时刻的FIFO公平裁决
    host_order: VecDeque<String>,
    /// 全局去重集合，以规范化URL为键
    seen: HashSet<CanonicalUrl>,
    /// 排队中的任务总数
    pending: usize,
    seq: u64,
}

enum PopDecision {
    /// 任务已出队且主机槽位已占用
    Ready(Box<CrawlTask>),
    /// 最早可调度时间，None表示所有主机都被并发上限阻塞
    WaitUntil(Option<Instant>),
    /// 队列为空且无在途任务，爬取已结束
    Idle,
}

/// URL Frontier
///
/// 持有所有已发现待抓取的URL。内部为主机分片的队列加一个
/// 全局去重集合；出队时选择礼貌窗口最早到期的主机，并在
/// 主机锁内占用并发槽位，保证每主机在途数不超过上限。
/// 无可调度主机时以"唤醒或睡到最早到期时刻"的方式等待，
/// 不做忙轮询。
pub struct Frontier {
    state: Mutex<FrontierState>,
    hosts: Arc<HostRegistry>,
    notify: Notify,
    /// 已出队但尚未完成的任务数
    in_flight: AtomicUsize,
}

impl Frontier {
    /// 创建新的Frontier
    ///
    /// # 参数
    ///
    /// * `hosts` - 主机状态注册表，与Fetcher共享
    pub fn new(hosts: Arc<HostRegistry>) -> Self {
        Self {
            state: Mutex::new(FrontierState {
                queues: HashMap::new(),
                host_order: VecDeque::new(),
                seen: HashSet::new(),
                pending: 0,
                seq: 0,
            }),
            hosts,
            notify: Notify::new(),
            in_flight: AtomicUsize::new(0),
        }
    }

    /// 入队新任务
    ///
    /// 按规范化URL去重，重复入队是无副作用的空操作。
    ///
    /// # 参数
    ///
    /// * `task` - 待入队的任务，Discovered状态会被推进到Queued
    ///
    /// # 返回值
    ///
    /// 任务被接受返回true，因重复被丢弃返回false
    pub fn push(&self, mut task: CrawlTask) -> bool {
        {
            let mut state = self.state.lock();
            if state.seen.contains(&task.url) {
                counter!("frontier_deduped_total").increment(1);
                trace!("Duplicate URL skipped: {}", task.url);
                return false;
            }
            if task.status == TaskStatus::Discovered && task.enqueue().is_err() {
                return false;
            }
            state.seen.insert(task.url.clone());
            let now = Instant::now();
            Self::enqueue_locked(&mut state, task, now);
        }
        self.notify.notify_waiters();
        true
    }

    /// 重新入队一个可重试的失败任务
    ///
    /// 绕过去重检查：该URL必然已在去重集合中，否则说明
    /// 集合已损坏，属于会话级致命错误。
    ///
    /// # 参数
    ///
    /// * `task` - 已递增attempt_count并回到Queued状态的任务
    /// * `delay` - 退避延迟，任务在此之前不会被调度
    pub fn requeue(&self, task: CrawlTask, delay: Duration) -> Result<(), FrontierError> {
        {
            let mut state = self.state.lock();
            if !state.seen.contains(&task.url) {
                return Err(FrontierError::Corrupted(format!(
                    "requeued URL missing from dedup set: {}",
                    task.url
                )));
            }
            let ready_at = Instant::now() + delay;
            Self::enqueue_locked(&mut state, task, ready_at);
        }
        self.notify.notify_waiters();
        Ok(())
    }

    fn enqueue_locked(state: &mut FrontierState, task: CrawlTask, ready_at: Instant) {
        let host = task.url.host().to_string();
        state.seq += 1;
        let queued = QueuedTask {
            ready_at,
            priority: task.priority,
            seq: state.seq,
            task,
        };
        let queue = state.queues.entry(host.clone()).or_default();
        if queue.is_empty() && !state.host_order.contains(&host) {
            state.host_order.push_back(host);
        }
        queue.push(queued);
        state.pending += 1;
    }

    /// 出队下一个可抓取的任务
    ///
    /// 阻塞直到某个主机的礼貌窗口到期且并发槽位可用，或超时。
    /// 返回的任务已占用其主机的一个槽位，调用方完成后必须
    /// 释放槽位并调用[`Frontier::task_done`]。
    ///
    /// # 参数
    ///
    /// * `timeout` - 最长等待时间
    ///
    /// # 返回值
    ///
    /// * `Some(CrawlTask)` - 出队的任务
    /// * `None` - 等待超时，或爬取已结束（队列空且无在途任务）
    pub async fn pop(&self, timeout: Duration) -> Option<CrawlTask> {
        let deadline = Instant::now() + timeout;
        loop {
            let mut notified = Box::pin(self.notify.notified());
            let decision = {
                let mut state = self.state.lock();
                let decision = if state.pending == 0 {
                    if self.in_flight.load(Ordering::SeqCst) == 0 {
                        PopDecision::Idle
                    } else {
                        // 在途任务可能重新入队，等待其结束
                        PopDecision::WaitUntil(None)
                    }
                } else {
                    self.select_eligible(&mut state)
                };
                // Register for wakeups before releasing the lock so a
                // concurrent push cannot slip between check and wait
                notified.as_mut().enable();
                decision
            };

            match decision {
                PopDecision::Idle => return None,
                PopDecision::Ready(task) => {
                    self.in_flight.fetch_add(1, Ordering::SeqCst);
                    return Some(*task);
                }
                PopDecision::WaitUntil(at) => {
                    let wake = match at {
                        Some(at) if at < deadline => at,
                        _ => deadline,
                    };
                    tokio::select! {
                        _ = notified.as_mut() => {}
                        _ = tokio::time::sleep_until(wake) => {
                            if Instant::now() >= deadline {
                                return None;
                            }
                        }
                    }
                }
            }
        }
    }

    /// 在状态锁内挑选礼貌窗口最早到期的主机并尝试出队
    fn select_eligible(&self, state: &mut FrontierState) -> PopDecision {
        let now = Instant::now();
        let limit = self.hosts.per_host_limit();

        let mut best: Option<(Instant, String)> = None;
        for host in state.host_order.iter() {
            let Some(queue) = state.queues.get(host) else {
                continue;
            };
            let Some(head) = queue.peek() else {
                continue;
            };
            // None表示主机在途数已达上限，由task_done唤醒后重算
            let Some(host_at) = self.hosts.host(host).next_eligible(now, limit) else {
                continue;
            };
            let at = host_at.max(head.ready_at);
            if best.as_ref().map_or(true, |(b, _)| at < *b) {
                best = Some((at, host.clone()));
            }
        }

        let Some((at, host)) = best else {
            return PopDecision::WaitUntil(None);
        };
        if at > now {
            return PopDecision::WaitUntil(Some(at));
        }

        // 在主机锁内复核并占用槽位；并发完成的抓取可能刚刷新
        // 了last_fetch_time，此时按新窗口重新等待
        let host_state = self.hosts.host(&host);
        if !host_state.try_acquire(now, limit) {
            return PopDecision::WaitUntil(host_state.next_eligible(now, limit));
        }

        if let Some(queue) = state.queues.get_mut(&host) {
            if let Some(queued) = queue.pop() {
                state.pending -= 1;
                if queue.is_empty() {
                    state.queues.remove(&host);
                    state.host_order.retain(|h| h != &host);
                }
                return PopDecision::Ready(Box::new(queued.task));
            }
        }

        // host_order里出现了空队列，不应该发生；释放刚占用的槽位
        host_state.release(now, false);
        PopDecision::WaitUntil(None)
    }

    /// 通告一个已出队任务的处理结束（成功、终态失败或已重新入队）
    ///
    /// 每次成功的pop必须对应一次调用，否则会话无法判定结束。
    pub fn task_done(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// 排队中的任务数
    pub fn len(&self) -> usize {
        self.state.lock().pending
    }

    /// 队列是否为空
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 爬取是否已结束（无排队任务且无在途任务）
    pub fn is_idle(&self) -> bool {
        self.len() == 0 && self.in_flight.load(Ordering::SeqCst) == 0
    }
}

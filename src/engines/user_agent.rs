// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 轮换用的浏览器User-Agent池
static BROWSER_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15",
];

/// User-Agent提供者
///
/// robots.txt匹配始终使用爬虫身份；抓取请求可选择
/// 从浏览器UA池中随机轮换。
#[derive(Debug, Clone)]
pub struct UserAgentProvider {
    identity: String,
    rotate: bool,
}

impl UserAgentProvider {
    /// 创建新的User-Agent提供者
    ///
    /// # 参数
    ///
    /// * `identity` - 爬虫身份UA
    /// * `rotate` - 抓取请求是否轮换浏览器UA
    pub fn new(identity: String, rotate: bool) -> Self {
        Self { identity, rotate }
    }

    /// 爬虫身份UA
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// 下一次抓取请求使用的UA
    pub fn next(&self) -> String {
        if self.rotate {
            let idx = rand::random_range(0..BROWSER_USER_AGENTS.len());
            BROWSER_USER_AGENTS[idx].to_string()
        } else {
            self.identity.clone()
        }
    }
}

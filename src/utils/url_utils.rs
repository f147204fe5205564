// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::utils::errors::CrawlError;
use serde::{Deserialize, Serialize};
use std::fmt;
use url::{ParseError, Url};

/// 规范化后的URL
///
/// 作为全局去重键使用的唯一URL形式，只能通过[`normalize`]构造，
/// 因此持有它即意味着URL已通过规范化校验且含有主机名。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalUrl(Url);

impl CanonicalUrl {
    /// 获取字符串形式
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// 获取内部URL引用
    pub fn as_url(&self) -> &Url {
        &self.0
    }

    /// 获取主机名
    ///
    /// 规范化保证主机名存在
    pub fn host(&self) -> &str {
        self.0.host_str().unwrap_or_default()
    }
}

impl fmt::Display for CanonicalUrl {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 规范化URL
///
/// 等价的URL经规范化后产生相同的[`CanonicalUrl`]：
/// scheme与主机名转小写，去除默认端口（80/443）与fragment，
/// 折叠非根路径的尾部斜杠，解析点号路径段。
/// strict模式下额外对查询参数做稳定的字典序排序，否则保留原始顺序。
///
/// # 参数
///
/// * `raw` - 原始URL字符串
/// * `strict` - 是否启用严格模式（查询参数排序）
///
/// # 返回值
///
/// * `Ok(CanonicalUrl)` - 规范化后的URL
/// * `Err(CrawlError::MalformedUrl)` - URL无法解析或缺少主机名
pub fn normalize(raw: &str, strict: bool) -> Result<CanonicalUrl, CrawlError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(CrawlError::MalformedUrl("empty URL".to_string()));
    }

    // Url::parse already lowercases scheme/host, drops default ports
    // and resolves dot segments
    let mut url = Url::parse(trimmed)
        .map_err(|e| CrawlError::MalformedUrl(format!("{}: {}", trimmed, e)))?;

    if url.cannot_be_a_base() || url.host_str().is_none() {
        return Err(CrawlError::MalformedUrl(format!("{}: missing host", trimmed)));
    }

    url.set_fragment(None);

    // Collapse the trailing slash of non-root paths
    let path = url.path();
    if path.len() > 1 && path.ends_with('/') {
        let collapsed = path.trim_end_matches('/').to_string();
        if collapsed.is_empty() {
            url.set_path("/");
        } else {
            url.set_path(&collapsed);
        }
    }

    if strict {
        match url.query() {
            Some(q) if !q.is_empty() => {
                let mut pairs: Vec<(String, String)> = url
                    .query_pairs()
                    .map(|(k, v)| (k.into_owned(), v.into_owned()))
                    .collect();
                // Stable sort keeps the original order of duplicate keys
                pairs.sort_by(|a, b| a.0.cmp(&b.0));
                let mut serializer = url::form_urlencoded::Serializer::new(String::new());
                for (k, v) in &pairs {
                    serializer.append_pair(k, v);
                }
                let sorted = serializer.finish();
                url.set_query(Some(&sorted));
            }
            Some(_) => {
                url.set_query(None);
            }
            None => {}
        }
    }

    Ok(CanonicalUrl(url))
}

/// 将可能为相对路径的URL转换为绝对路径URL
pub fn resolve_url(base_url: &Url, path: &str) -> Result<Url, ParseError> {
    base_url.join(path)
}

/// 判断URL是否属于给定域名的爬取范围
///
/// 域名本身、`www.`前缀以及任意子域名均视为同域
pub fn is_same_domain(url: &Url, domain: &str) -> bool {
    let Some(host) = url.host_str() else {
        return false;
    };
    let host = host.to_ascii_lowercase();
    let domain = domain.to_ascii_lowercase();
    host == domain || host == format!("www.{}", domain) || host.ends_with(&format!(".{}", domain))
}

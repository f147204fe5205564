// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::fetch_result::{FetchResult, StatusKind};
use crate::utils::url_utils::{self, CanonicalUrl};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use std::collections::HashSet;
use tracing::trace;

/// CSS中url(...)引用的匹配模式
static CSS_URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"url\(\s*['"]?([^'")\s]+)['"]?\s*\)"#).unwrap());

/// 页面中发现的图片引用
///
/// 远程引用与data URI分开分类，二者的获取策略不同；
/// 图片字节的下载与解码不在本核心范围内。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageRef {
    /// 需要另行抓取的远程图片
    Remote(CanonicalUrl),
    /// 内联在页面中的data URI图片
    DataUri {
        /// data URI声明的媒体类型
        media_type: String,
    },
}

/// 一次提取产生的链接序列
///
/// 解析在构造时一次完成，序列只能消费一次；
/// 再次提取需要新的抓取结果。
pub struct ExtractedLinks {
    inner: std::vec::IntoIter<CanonicalUrl>,
}

impl Iterator for ExtractedLinks {
    type Item = CanonicalUrl;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for ExtractedLinks {}

/// 链接提取器
///
/// 从成功抓取的HTML中提取出站链接与图片引用。
/// 所有产出的URL都经过规范化。
pub struct LinkExtractor {
    strict_normalization: bool,
}

impl LinkExtractor {
    /// 创建新的链接提取器
    ///
    /// # 参数
    ///
    /// * `strict_normalization` - 规范化是否启用严格模式
    pub fn new(strict_normalization: bool) -> Self {
        Self {
            strict_normalization,
        }
    }

    /// 提取出站链接
    ///
    /// 仅处理Success且内容为HTML的结果，其余产出空序列。
    /// 只保留http/https的绝对链接或可解析的相对链接，
    /// 全部规范化并做页内去重，自链接被丢弃。
    pub fn extract(&self, result: &FetchResult) -> ExtractedLinks {
        let mut links = Vec::new();

        if let Some(body) = self.parsable_body(result) {
            let document = Html::parse_document(body);
            let selector = Selector::parse("a[href]").unwrap();
            let base = result.url.as_url();
            let mut seen = HashSet::new();

            for element in document.select(&selector) {
                let Some(href) = element.value().attr("href") else {
                    continue;
                };
                let Ok(absolute) = url_utils::resolve_url(base, href) else {
                    continue;
                };
                if !matches!(absolute.scheme(), "http" | "https") {
                    continue;
                }
                let Ok(canonical) = url_utils::normalize(absolute.as_str(), self.strict_normalization)
                else {
                    continue;
                };
                if canonical == result.url {
                    continue;
                }
                if seen.insert(canonical.clone()) {
                    links.push(canonical);
                }
            }
            trace!("Extracted {} links from {}", links.len(), result.url);
        }

        ExtractedLinks {
            inner: links.into_iter(),
        }
    }

    /// 提取图片引用
    ///
    /// 覆盖img[src]、行内style属性与<style>块中的url(...)，
    /// data URI按媒体类型分类，远程引用规范化后去重。
    pub fn extract_images(&self, result: &FetchResult) -> Vec<ImageRef> {
        let mut images = Vec::new();

        let Some(body) = self.parsable_body(result) else {
            return images;
        };

        let document = Html::parse_document(body);
        let base = result.url.as_url();
        let mut seen = HashSet::new();

        let img_selector = Selector::parse("img[src]").unwrap();
        for element in document.select(&img_selector) {
            if let Some(src) = element.value().attr("src") {
                self.classify_image(src, base, &mut seen, &mut images);
            }
        }

        let styled_selector = Selector::parse("[style]").unwrap();
        for element in document.select(&styled_selector) {
            if let Some(style) = element.value().attr("style") {
                for capture in CSS_URL_RE.captures_iter(style) {
                    self.classify_image(&capture[1], base, &mut seen, &mut images);
                }
            }
        }

        let style_selector = Selector::parse("style").unwrap();
        for element in document.select(&style_selector) {
            let css: String = element.text().collect();
            for capture in CSS_URL_RE.captures_iter(&css) {
                self.classify_image(&capture[1], base, &mut seen, &mut images);
            }
        }

        images
    }

    fn parsable_body<'a>(&self, result: &'a FetchResult) -> Option<&'a str> {
        if result.status_kind != StatusKind::Success || !result.is_html() {
            return None;
        }
        result.body.as_deref()
    }

    fn classify_image(
        &self,
        raw: &str,
        base: &url::Url,
        seen: &mut HashSet<String>,
        images: &mut Vec<ImageRef>,
    ) {
        if let Some(data) = raw.strip_prefix("data:") {
            // data URI媒体类型到第一个';'或','为止，缺省为text/plain
            let media_type = data
                .split([';', ','])
                .next()
                .filter(|mt| !mt.is_empty())
                .unwrap_or("text/plain")
                .to_string();
            if seen.insert(format!("data:{}", media_type)) {
                images.push(ImageRef::DataUri { media_type });
            }
            return;
        }

        let Ok(absolute) = url_utils::resolve_url(base, raw) else {
            return;
        };
        if !matches!(absolute.scheme(), "http" | "https") {
            return;
        }
        let Ok(canonical) = url_utils::normalize(absolute.as_str(), self.strict_normalization) else {
            return;
        };
        if seen.insert(canonical.as_str().to_string()) {
            images.push(ImageRef::Remote(canonical));
        }
    }
}

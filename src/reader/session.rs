use std::collections::HashMap;

use log::{debug, warn};

use super::text_index::TextIndexer;
use super::types::{placeholder_title, Book, BookMetadata, Chapter, ChapterRecord, TocEntry};
use crate::preferences::{clamp_font_size, DEFAULT_FONT_SIZE};

/// 章节记录被拒绝的原因
#[derive(Debug, Clone, PartialEq)]
pub enum ChapterRejection {
    /// 元数据尚未到达
    NoMetadata,
    /// 索引超出目录范围
    OutOfRange { index: usize, total: usize },
    /// 该索引已存在章节
    Duplicate(usize),
}

/// 滚动状态
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScrollState {
    /// 当前垂直滚动距离
    pub offset: f64,
    /// 内容总高度
    pub content_height: f64,
    /// 视口高度
    pub viewport_height: f64,
}

impl ScrollState {
    /// 书签位置：滚动距离 / 内容总高度
    pub fn bookmark_fraction(&self) -> f64 {
        if self.content_height <= 0.0 {
            return 0.0;
        }
        (self.offset / self.content_height).clamp(0.0, 1.0)
    }

    /// 阅读进度：滚动距离 / 可滚动高度
    pub fn progress(&self) -> f64 {
        if self.content_height <= 0.0 {
            return 0.0;
        }
        let scrollable = self.content_height - self.viewport_height;
        if scrollable <= 0.0 {
            return 1.0;
        }
        (self.offset / scrollable).clamp(0.0, 1.0)
    }

    /// 将书签比例换算为滚动距离
    pub fn offset_for_fraction(&self, fraction: f64) -> f64 {
        fraction.clamp(0.0, 1.0) * self.content_height
    }
}

/// 阅读会话
///
/// 持有内存中的书籍模型、当前章节、滚动位置、字号，
/// 以及逐步构建的 href→章节索引映射和每章句子索引
pub struct Session {
    book: Option<Book>,
    chapters: Vec<Option<Chapter>>,
    current: usize,
    scroll: ScrollState,
    font_size: u32,
    href_index: HashMap<String, usize>,
    sentences: HashMap<usize, Vec<String>>,
    indexer: TextIndexer,
}

impl Session {
    pub fn new(font_size: u32) -> Self {
        Self {
            book: None,
            chapters: Vec::new(),
            current: 0,
            scroll: ScrollState::default(),
            font_size: clamp_font_size(font_size as i64),
            href_index: HashMap::new(),
            sentences: HashMap::new(),
            indexer: TextIndexer::new(),
        }
    }

    /// 应用元数据：初始化目录槽位与起始位置
    ///
    /// 元数据只接受一次，重复到达时返回 false
    pub fn apply_metadata(&mut self, meta: BookMetadata) -> bool {
        if self.book.is_some() {
            warn!("忽略重复的元数据记录: {}", meta.title);
            return false;
        }

        let book = Book::from(meta);
        let total = book.table_of_contents.len();
        self.chapters = vec![None; total];
        self.current = if total == 0 {
            0
        } else {
            book.start_chapter.min(total - 1)
        };
        if book.start_chapter >= total && total > 0 {
            warn!("起始章节 {} 超出目录范围 {}，已修正", book.start_chapter, total);
        }
        debug!("元数据到达: {} ({} 章)", book.title, total);
        self.book = Some(book);
        true
    }

    /// 按索引存放章节（章节可能乱序到达）
    pub fn store_chapter(&mut self, record: ChapterRecord) -> Result<usize, ChapterRejection> {
        if self.book.is_none() {
            return Err(ChapterRejection::NoMetadata);
        }

        let index = record.index;
        let total = self.chapters.len();
        if index >= total {
            return Err(ChapterRejection::OutOfRange { index, total });
        }
        if self.chapters[index].is_some() {
            return Err(ChapterRejection::Duplicate(index));
        }

        let chapter = Chapter::from(record);
        if let Some(href) = &chapter.href {
            for key in href_keys(href) {
                self.href_index.entry(key).or_insert(index);
            }
        }
        self.chapters[index] = Some(chapter);
        self.ensure_sentences(index);

        Ok(index)
    }

    pub fn book(&self) -> Option<&Book> {
        self.book.as_ref()
    }

    pub fn has_metadata(&self) -> bool {
        self.book.is_some()
    }

    pub fn total_chapters(&self) -> usize {
        self.chapters.len()
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    /// 设置当前章节，越界时返回 false
    pub fn set_current(&mut self, index: usize) -> bool {
        if index >= self.chapters.len() {
            return false;
        }
        self.current = index;
        true
    }

    pub fn is_last(&self) -> bool {
        !self.chapters.is_empty() && self.current == self.chapters.len() - 1
    }

    pub fn chapter(&self, index: usize) -> Option<&Chapter> {
        self.chapters.get(index).and_then(|c| c.as_ref())
    }

    pub fn is_available(&self, index: usize) -> bool {
        self.chapter(index).is_some()
    }

    pub fn arrived_count(&self) -> usize {
        self.chapters.iter().filter(|c| c.is_some()).count()
    }

    pub fn is_complete(&self) -> bool {
        !self.chapters.is_empty() && self.chapters.iter().all(|c| c.is_some())
    }

    pub fn scroll(&self) -> ScrollState {
        self.scroll
    }

    pub fn update_scroll(&mut self, scroll: ScrollState) {
        self.scroll = scroll;
    }

    pub fn font_size(&self) -> u32 {
        self.font_size
    }

    pub fn set_font_size(&mut self, size: i64) -> u32 {
        self.font_size = clamp_font_size(size);
        self.font_size
    }

    /// 通过 href 查找章节索引
    pub fn resolve_href(&self, href: &str) -> Option<usize> {
        href_keys(href)
            .into_iter()
            .find_map(|key| self.href_index.get(&key).copied())
    }

    /// 目录项：已到达章节使用真实标题，其余为占位标题并标记未处理
    pub fn toc_entries(&self) -> Vec<TocEntry> {
        (0..self.chapters.len()).map(|i| self.toc_entry(i)).collect()
    }

    pub fn toc_entry(&self, index: usize) -> TocEntry {
        let chapter = self.chapter(index);
        let title = chapter
            .and_then(|c| c.title.clone())
            .unwrap_or_else(|| placeholder_title(index));

        TocEntry {
            index,
            title,
            unprocessed: chapter.is_none(),
            active: index == self.current,
        }
    }

    /// "N of TOTAL" 章节指示
    pub fn position_label(&self) -> String {
        format!("{} of {}", self.current + 1, self.chapters.len())
    }

    /// 获取章节句子列表，首次访问时计算并缓存
    pub fn sentences_for(&mut self, index: usize) -> Option<&[String]> {
        if !self.is_available(index) {
            return None;
        }
        self.ensure_sentences(index);
        self.sentences.get(&index).map(|s| s.as_slice())
    }

    /// 截至指定章节（含）的全部句子，按章节顺序展开
    pub fn context_sentences(&mut self, upto: usize) -> Vec<String> {
        let last = upto.min(self.chapters.len().saturating_sub(1));
        let mut all = Vec::new();
        for index in 0..=last {
            if let Some(sentences) = self.sentences_for(index) {
                all.extend_from_slice(sentences);
            }
        }
        all
    }

    /// 章节段落纯文本
    pub fn paragraphs(&self, index: usize) -> Vec<String> {
        self.chapter(index)
            .map(|c| self.indexer.extract_paragraphs(&c.content))
            .unwrap_or_default()
    }

    fn ensure_sentences(&mut self, index: usize) {
        if self.sentences.contains_key(&index) {
            return;
        }
        if let Some(chapter) = self.chapters.get(index).and_then(|c| c.as_ref()) {
            let sentences = self.indexer.sentences_from_html(&chapter.content);
            self.sentences.insert(index, sentences);
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(DEFAULT_FONT_SIZE)
    }
}

/// href 的查找键：去掉锚点和相对前缀的完整路径，以及文件名
fn href_keys(href: &str) -> Vec<String> {
    let path = href.split('#').next().unwrap_or("");
    let mut path = path.trim();
    while let Some(rest) = path.strip_prefix("./").or_else(|| path.strip_prefix("../")) {
        path = rest;
    }
    let path = path.trim_start_matches('/');
    if path.is_empty() {
        return Vec::new();
    }

    let mut keys = vec![path.to_string()];
    if let Some(name) = path.rsplit('/').next() {
        if name != path {
            keys.push(name.to_string());
        }
    }
    keys
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(toc: &[&str], start: usize) -> BookMetadata {
        BookMetadata {
            title: "Book".to_string(),
            author: "Author".to_string(),
            table_of_contents: toc.iter().map(|s| s.to_string()).collect(),
            start_chapter: start,
            chapter_pos: Some(0.5),
            image_count: None,
        }
    }

    fn record(index: usize, title: Option<&str>, href: Option<&str>, content: &str) -> ChapterRecord {
        ChapterRecord {
            index,
            title: title.map(String::from),
            href: href.map(String::from),
            content: content.to_string(),
        }
    }

    #[test]
    fn test_chapter_before_metadata_rejected() {
        let mut session = Session::default();
        assert_eq!(
            session.store_chapter(record(0, None, None, "")),
            Err(ChapterRejection::NoMetadata)
        );
    }

    /// 全部排列（Heap 算法）
    fn permutations(items: &mut Vec<usize>, k: usize, out: &mut Vec<Vec<usize>>) {
        if k <= 1 {
            out.push(items.clone());
            return;
        }
        permutations(items, k - 1, out);
        for i in 0..k - 1 {
            let swap = if k % 2 == 0 { i } else { 0 };
            items.swap(swap, k - 1);
            permutations(items, k - 1, out);
        }
    }

    #[test]
    fn test_any_arrival_order_keeps_toc_order() {
        let mut orders = Vec::new();
        permutations(&mut vec![0, 1, 2, 3], 4, &mut orders);
        orders.sort();
        orders.dedup();
        assert_eq!(orders.len(), 24);

        for order in orders {
            let mut session = Session::default();
            session.apply_metadata(metadata(&["a", "b", "c", "d"], 0));

            for &i in &order {
                let title = format!("Title {}", i);
                session.store_chapter(record(i, Some(&title), None, "<p>x</p>")).unwrap();
            }

            let titles: Vec<String> = session.toc_entries().into_iter().map(|e| e.title).collect();
            assert_eq!(titles, vec!["Title 0", "Title 1", "Title 2", "Title 3"], "order {:?}", order);
            assert!(session.is_complete(), "order {:?}", order);
        }
    }

    #[test]
    fn test_placeholder_until_arrival() {
        let mut session = Session::default();
        session.apply_metadata(metadata(&["a", "b"], 0));
        session.store_chapter(record(1, None, None, "")).unwrap();

        let entries = session.toc_entries();
        assert_eq!(entries[0].title, "Chapter 1");
        assert!(entries[0].unprocessed);
        assert!(entries[0].active);
        // 没有标题的章节保留占位标题，但不再标记未处理
        assert_eq!(entries[1].title, "Chapter 2");
        assert!(!entries[1].unprocessed);
    }

    #[test]
    fn test_duplicate_and_out_of_range_rejected() {
        let mut session = Session::default();
        session.apply_metadata(metadata(&["a", "b"], 0));
        session.store_chapter(record(0, Some("first"), None, "")).unwrap();

        assert_eq!(
            session.store_chapter(record(0, Some("second"), None, "")),
            Err(ChapterRejection::Duplicate(0))
        );
        assert_eq!(session.chapter(0).unwrap().title.as_deref(), Some("first"));
        assert_eq!(
            session.store_chapter(record(5, None, None, "")),
            Err(ChapterRejection::OutOfRange { index: 5, total: 2 })
        );
    }

    #[test]
    fn test_start_chapter_clamped() {
        let mut session = Session::default();
        session.apply_metadata(metadata(&["a", "b"], 9));
        assert_eq!(session.current_index(), 1);
        assert!(session.is_last());
    }

    #[test]
    fn test_second_metadata_ignored() {
        let mut session = Session::default();
        assert!(session.apply_metadata(metadata(&["a"], 0)));
        assert!(!session.apply_metadata(metadata(&["a", "b", "c"], 2)));
        assert_eq!(session.total_chapters(), 1);
    }

    #[test]
    fn test_href_resolution() {
        let mut session = Session::default();
        session.apply_metadata(metadata(&["a", "b"], 0));
        session
            .store_chapter(record(1, None, Some("OEBPS/text/ch02.xhtml"), ""))
            .unwrap();

        assert_eq!(session.resolve_href("OEBPS/text/ch02.xhtml"), Some(1));
        assert_eq!(session.resolve_href("../text/ch02.xhtml#sec"), Some(1));
        assert_eq!(session.resolve_href("ch02.xhtml"), Some(1));
        assert_eq!(session.resolve_href("ch03.xhtml"), None);
        assert_eq!(session.resolve_href("#only-anchor"), None);
    }

    #[test]
    fn test_context_sentences_up_to_current() {
        let mut session = Session::default();
        session.apply_metadata(metadata(&["a", "b", "c"], 0));
        session.store_chapter(record(2, None, None, "<p>Third.</p>")).unwrap();
        session.store_chapter(record(0, None, None, "<p>One. Two.</p>")).unwrap();

        assert_eq!(session.context_sentences(1), vec!["One.", "Two."]);
        assert_eq!(session.context_sentences(2), vec!["One.", "Two.", "Third."]);
        assert_eq!(session.sentences_for(1), None);
    }

    #[test]
    fn test_scroll_fractions() {
        let scroll = ScrollState {
            offset: 250.0,
            content_height: 1000.0,
            viewport_height: 500.0,
        };
        assert_eq!(scroll.bookmark_fraction(), 0.25);
        assert_eq!(scroll.progress(), 0.5);
        assert_eq!(scroll.offset_for_fraction(0.5), 500.0);

        let short = ScrollState {
            offset: 0.0,
            content_height: 300.0,
            viewport_height: 500.0,
        };
        assert_eq!(short.progress(), 1.0);
        assert_eq!(ScrollState::default().progress(), 0.0);
    }

    #[test]
    fn test_position_label() {
        let mut session = Session::default();
        session.apply_metadata(metadata(&["a", "b", "c"], 1));
        assert_eq!(session.position_label(), "2 of 3");
    }
}

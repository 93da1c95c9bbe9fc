use serde::{Deserialize, Serialize};

/// 书籍元数据记录
///
/// 数据流的第一条记录，包含目录和起始阅读位置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookMetadata {
    pub title: String,
    pub author: String,
    #[serde(default)]
    pub table_of_contents: Vec<String>,
    #[serde(default)]
    pub start_chapter: usize,
    #[serde(default)]
    pub chapter_pos: Option<f64>,
    #[serde(default)]
    pub image_count: Option<u32>,
}

/// 章节记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterRecord {
    pub index: usize,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub href: Option<String>,
    pub content: String,
}

/// `/load_book` 返回的单行记录，按 `type` 字段区分
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamRecord {
    Metadata(BookMetadata),
    Chapter(ChapterRecord),
    Error { message: String },
}

/// 书籍
#[derive(Debug, Clone, PartialEq)]
pub struct Book {
    pub title: String,
    pub author: String,
    pub table_of_contents: Vec<String>,
    pub start_chapter: usize,
    pub start_position: f64,
}

impl From<BookMetadata> for Book {
    fn from(meta: BookMetadata) -> Self {
        Self {
            title: meta.title,
            author: meta.author,
            table_of_contents: meta.table_of_contents,
            start_chapter: meta.start_chapter,
            start_position: meta.chapter_pos.unwrap_or(0.0).clamp(0.0, 1.0),
        }
    }
}

/// 章节
#[derive(Debug, Clone, PartialEq)]
pub struct Chapter {
    pub index: usize,
    pub title: Option<String>,
    pub content: String,
    pub href: Option<String>,
}

impl From<ChapterRecord> for Chapter {
    fn from(record: ChapterRecord) -> Self {
        Self {
            index: record.index,
            title: record.title.filter(|t| !t.trim().is_empty()),
            content: record.content,
            href: record.href,
        }
    }
}

/// 书签：章节索引 + 章节内滚动比例
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bookmark {
    pub chapter_index: usize,
    pub position: f64,
}

/// 目录项
#[derive(Debug, Clone, PartialEq)]
pub struct TocEntry {
    pub index: usize,
    pub title: String,
    /// 章节内容尚未到达
    pub unprocessed: bool,
    pub active: bool,
}

/// 目录占位标题
pub fn placeholder_title(index: usize) -> String {
    format!("Chapter {}", index + 1)
}

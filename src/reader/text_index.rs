use regex::Regex;
use scraper::{ElementRef, Html};

/// 常见缩写，句点后不视为句子结束
const ABBREVIATIONS: &[&str] = &[
    "mr", "mrs", "ms", "dr", "st", "sr", "jr", "prof", "gen", "gov", "sgt", "lt", "col",
    "capt", "rev", "hon", "vs", "etc", "approx", "dept", "vol", "fig", "inc", "corp", "ltd",
    "no", "ch", "pp",
];

/// 块级元素，前后断开段落
const BLOCK_TAGS: &[&str] = &[
    "p", "div", "section", "article", "header", "footer", "blockquote", "li", "ul", "ol",
    "h1", "h2", "h3", "h4", "h5", "h6", "pre", "table", "tr", "td", "th", "figure",
    "figcaption", "aside", "nav", "dd", "dt", "br", "hr",
];

/// 不参与文本提取的元素
const SKIPPED_TAGS: &[&str] = &["script", "style", "head", "title", "noscript", "svg"];

/// 章节文本索引器
///
/// 将章节 HTML 去标签为纯文本，并按标点边界切分句子
pub struct TextIndexer {
    boundary: Regex,
    whitespace: Regex,
}

impl TextIndexer {
    pub fn new() -> Self {
        Self {
            // 西文标点需后接空白；中文标点不需要
            boundary: Regex::new(r#"(?:[.!?…]+["'”’»)\]]*\s+)|(?:[。！？]+["'”’」』)]*\s*)"#)
                .unwrap(),
            whitespace: Regex::new(r"\s+").unwrap(),
        }
    }

    /// 提取 HTML 中的段落纯文本
    ///
    /// 块级元素之间断开，段内空白折叠为单个空格，空段落丢弃
    pub fn extract_paragraphs(&self, html: &str) -> Vec<String> {
        let fragment = Html::parse_fragment(html);
        let mut paragraphs = Vec::new();
        let mut current = String::new();

        self.collect_text(&fragment.root_element(), &mut current, &mut paragraphs);
        self.flush_paragraph(&mut current, &mut paragraphs);

        paragraphs
    }

    /// 提取纯文本，段落之间以换行分隔
    pub fn extract_text(&self, html: &str) -> String {
        self.extract_paragraphs(html).join("\n")
    }

    /// 将 HTML 切分为句子列表
    pub fn sentences_from_html(&self, html: &str) -> Vec<String> {
        self.extract_paragraphs(html)
            .iter()
            .flat_map(|p| self.split_sentences(p))
            .collect()
    }

    /// 将一段文本切分为句子
    pub fn split_sentences(&self, text: &str) -> Vec<String> {
        let mut sentences = Vec::new();
        let mut start = 0;

        for m in self.boundary.find_iter(text) {
            if m.start() < start {
                continue;
            }
            let punct_end = m.start() + m.as_str().trim_end().len();

            if self.is_abbreviation_period(&text[start..m.start()], m.as_str()) {
                continue;
            }

            let sentence = text[start..punct_end].trim();
            if !sentence.is_empty() {
                sentences.push(sentence.to_string());
            }
            start = m.end();
        }

        let rest = text[start..].trim();
        if !rest.is_empty() {
            sentences.push(rest.to_string());
        }

        sentences
    }

    /// 判断一个句点是否属于缩写或人名首字母
    fn is_abbreviation_period(&self, before: &str, punct: &str) -> bool {
        let marks: String = punct
            .chars()
            .take_while(|c| matches!(c, '.' | '!' | '?' | '…'))
            .collect();
        if marks != "." {
            return false;
        }

        let word = before
            .rsplit(char::is_whitespace)
            .next()
            .unwrap_or("")
            .trim_start_matches(|c: char| !c.is_alphanumeric());

        if word.is_empty() {
            return false;
        }
        // 单个字母：首字母缩写，如 "J. R. R."
        if word.chars().count() == 1 && word.chars().all(char::is_alphabetic) {
            return true;
        }
        // 内部带句点：如 "e.g." "U.S."
        if word.contains('.') {
            return true;
        }

        ABBREVIATIONS.contains(&word.to_lowercase().as_str())
    }

    fn collect_text(&self, element: &ElementRef, current: &mut String, paragraphs: &mut Vec<String>) {
        let tag_name = element.value().name();
        if SKIPPED_TAGS.contains(&tag_name) {
            return;
        }

        let is_block = BLOCK_TAGS.contains(&tag_name);
        if is_block {
            self.flush_paragraph(current, paragraphs);
        }

        for child in element.children() {
            if let Some(text) = child.value().as_text() {
                current.push_str(text);
            } else if let Some(child_element) = ElementRef::wrap(child) {
                self.collect_text(&child_element, current, paragraphs);
            }
        }

        if is_block {
            self.flush_paragraph(current, paragraphs);
        }
    }

    fn flush_paragraph(&self, current: &mut String, paragraphs: &mut Vec<String>) {
        let normalized = self.whitespace.replace_all(current.trim(), " ");
        if !normalized.is_empty() {
            paragraphs.push(normalized.into_owned());
        }
        current.clear();
    }
}

impl Default for TextIndexer {
    fn default() -> Self {
        Self::new()
    }
}

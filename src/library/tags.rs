/// 标签删除按钮的字符，粘贴或复制时可能混入标签文本
const REMOVE_MARK: char = '×';

/// 标签输入框中的按键
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKey {
    Enter,
    Comma,
    Backspace,
}

/// 特殊标签的样式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagStyle {
    Finished,
    InProgress,
    Unread,
    Plain,
}

impl TagStyle {
    pub fn for_tag(tag: &str) -> Self {
        match tag {
            "Finished" => Self::Finished,
            "In Progress" => Self::InProgress,
            "Unread" => Self::Unread,
            _ => Self::Plain,
        }
    }

    /// 标签元素的 class 属性
    pub fn css_class(&self) -> &'static str {
        match self {
            Self::Finished => "tag finished-tag",
            Self::InProgress => "tag started-tag",
            Self::Unread => "tag unread-tag",
            Self::Plain => "tag",
        }
    }
}

/// 清理标签文本：去掉 × 和首尾空白，空标签返回 None
pub fn clean_tag(text: &str) -> Option<String> {
    let cleaned: String = text.chars().filter(|c| *c != REMOVE_MARK).collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.to_string())
    }
}

/// 标签输入框
///
/// 回车或逗号把输入内容加为标签，输入为空时退格删除最后一个标签
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TagInput {
    tags: Vec<String>,
    input: String,
}

impl TagInput {
    pub fn new(initial: &[String]) -> Self {
        let mut input = Self::default();
        for tag in initial {
            input.add(tag);
        }
        input
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn set_input(&mut self, text: &str) {
        self.input = text.to_string();
    }

    /// 添加标签，空标签或重复标签返回 false
    pub fn add(&mut self, text: &str) -> bool {
        let Some(tag) = clean_tag(text) else {
            return false;
        };
        if self.tags.contains(&tag) {
            return false;
        }
        self.tags.push(tag);
        true
    }

    pub fn remove(&mut self, index: usize) -> Option<String> {
        if index < self.tags.len() {
            Some(self.tags.remove(index))
        } else {
            None
        }
    }

    /// 处理按键，返回标签列表是否变化
    pub fn key(&mut self, key: TagKey) -> bool {
        match key {
            TagKey::Enter | TagKey::Comma => {
                let text = std::mem::take(&mut self.input);
                self.add(&text)
            }
            TagKey::Backspace if self.input.is_empty() => self.tags.pop().is_some(),
            TagKey::Backspace => false,
        }
    }

    /// 已添加的标签加上输入框中尚未提交的文本（用于筛选）
    pub fn with_pending(&self) -> Vec<String> {
        let mut tags = self.tags.clone();
        if let Some(pending) = clean_tag(&self.input) {
            if !tags.contains(&pending) {
                tags.push(pending);
            }
        }
        tags
    }

    /// 渲染标签 HTML
    pub fn render(&self) -> String {
        self.tags
            .iter()
            .map(|tag| {
                format!(
                    "<span class=\"{}\">{}<span class=\"remove-tag\">{}</span></span>",
                    TagStyle::for_tag(tag).css_class(),
                    html_escape::encode_text(tag),
                    REMOVE_MARK
                )
            })
            .collect()
    }
}

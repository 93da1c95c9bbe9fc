use super::session::{ScrollState, Session};

/// 锚点跳转时预留的行高系数（相对字号）
const LINE_HEIGHT_FACTOR: f64 = 1.5;

/// 渲染后的章节视图
#[derive(Debug, Clone, PartialEq)]
pub struct ChapterView {
    pub index: usize,
    pub title: Option<String>,
    pub html: String,
    /// "N of TOTAL"
    pub position_label: String,
}

/// 滚动目标
#[derive(Debug, Clone, PartialEq)]
pub enum ScrollTarget {
    Top,
    Bottom,
    /// 按内容总高度的比例滚动（书签恢复）
    Fraction(f64),
    /// 滚动到章节内锚点，并向上偏移约一行
    Anchor { id: String, offset: f64 },
}

/// 导航操作
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Navigation {
    Next,
    Previous,
    Jump(usize),
}

/// 导航结果
#[derive(Debug, Clone, PartialEq)]
pub struct NavigationOutcome {
    pub index: usize,
    pub scroll: ScrollTarget,
    /// 通过 "下一章" 到达最后一章
    pub reached_end: bool,
}

/// 一次滚动事件引起的界面变化
#[derive(Debug, Clone, PartialEq)]
pub struct ScrollUpdate {
    /// 控制栏可见性变化
    pub controls_visible: Option<bool>,
    pub progress: f64,
}

/// 章节内部链接
#[derive(Debug, Clone, PartialEq)]
pub struct InternalLink {
    /// 目标章节 href，None 表示当前章节
    pub target: Option<String>,
    pub anchor: Option<String>,
}

impl InternalLink {
    /// 解析链接，外部链接返回 None
    pub fn parse(href: &str) -> Option<Self> {
        let href = href.trim();
        if href.is_empty() {
            return None;
        }
        let lower = href.to_ascii_lowercase();
        if ["http://", "https://", "mailto:", "javascript:", "data:", "//"]
            .iter()
            .any(|scheme| lower.starts_with(scheme))
        {
            return None;
        }

        let (path, anchor) = match href.split_once('#') {
            Some((path, anchor)) => (path, Some(anchor)),
            None => (href, None),
        };

        Some(Self {
            target: Some(path).filter(|p| !p.is_empty()).map(String::from),
            anchor: anchor
                .filter(|a| !a.is_empty())
                .map(|a| html_escape::decode_html_entities(a).into_owned()),
        })
    }
}

/// 单一的滚动监听状态
///
/// 始终只有一个监听器，读取会话中的当前状态，而不是每次切换章节重新注册
#[derive(Debug, Clone)]
pub struct ScrollTracker {
    last_offset: f64,
    controls_visible: bool,
    hide_after: f64,
    show_within: f64,
}

impl ScrollTracker {
    pub fn new(hide_after: f64, show_within: f64) -> Self {
        Self {
            last_offset: 0.0,
            controls_visible: true,
            hide_after,
            show_within,
        }
    }

    /// 处理一次滚动，返回控制栏可见性的变化
    pub fn on_scroll(&mut self, offset: f64) -> Option<bool> {
        let scrolling_down = offset > self.last_offset;
        self.last_offset = offset;

        let visible = if scrolling_down && offset > self.hide_after {
            false
        } else if offset < self.show_within {
            true
        } else {
            self.controls_visible
        };

        if visible != self.controls_visible {
            self.controls_visible = visible;
            Some(visible)
        } else {
            None
        }
    }

    /// 章节加载时显示控制栏
    pub fn reset(&mut self, offset: f64) {
        self.last_offset = offset;
        self.controls_visible = true;
    }

    pub fn controls_visible(&self) -> bool {
        self.controls_visible
    }
}

/// 章节渲染器
pub struct ChapterRenderer {
    tracker: ScrollTracker,
}

impl ChapterRenderer {
    pub fn new(hide_after: f64, show_within: f64) -> Self {
        Self {
            tracker: ScrollTracker::new(hide_after, show_within),
        }
    }

    /// 渲染当前章节；章节尚未到达时返回 None
    pub fn render(&mut self, session: &Session) -> Option<ChapterView> {
        let index = session.current_index();
        let chapter = session.chapter(index)?;
        self.tracker.reset(0.0);

        Some(ChapterView {
            index,
            title: chapter.title.clone(),
            html: chapter.content.clone(),
            position_label: session.position_label(),
        })
    }

    /// 执行导航，越界时为空操作
    pub fn navigate(&self, session: &mut Session, navigation: Navigation) -> Option<NavigationOutcome> {
        let current = session.current_index();
        let total = session.total_chapters();
        if total == 0 {
            return None;
        }

        let (index, scroll) = match navigation {
            Navigation::Next if current + 1 < total => (current + 1, ScrollTarget::Top),
            // 向前翻章时停在末尾，模拟连续倒读
            Navigation::Previous if current > 0 => (current - 1, ScrollTarget::Bottom),
            Navigation::Jump(target) if target < total => (target, ScrollTarget::Top),
            _ => return None,
        };

        session.set_current(index);
        Some(NavigationOutcome {
            index,
            scroll,
            reached_end: navigation == Navigation::Next && index == total - 1,
        })
    }

    /// 持久滚动监听：更新会话滚动状态、控制栏和进度条
    pub fn on_scroll(&mut self, session: &mut Session, scroll: ScrollState) -> ScrollUpdate {
        session.update_scroll(scroll);
        ScrollUpdate {
            controls_visible: self.tracker.on_scroll(scroll.offset),
            progress: scroll.progress(),
        }
    }

    pub fn controls_visible(&self) -> bool {
        self.tracker.controls_visible()
    }

    /// 锚点滚动目标，按字号向上偏移约一行，避免标题贴在控制栏下
    pub fn anchor_target(anchor: &str, font_size: u32) -> ScrollTarget {
        ScrollTarget::Anchor {
            id: anchor.to_string(),
            offset: -(font_size as f64 * LINE_HEIGHT_FACTOR),
        }
    }
}

/// 内联错误提示
pub fn error_banner(message: &str) -> String {
    format!(
        "<div class=\"alert alert-danger\">{}</div>",
        html_escape::encode_text(message)
    )
}

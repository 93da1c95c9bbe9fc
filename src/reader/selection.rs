use std::fmt;

/// 面板与选区之间的间距
const PANEL_GAP: f64 = 8.0;
/// 请求失败时面板中显示的通用提示
pub const GENERIC_ERROR: &str = "Sorry, something went wrong. Please try again.";
const THINKING_LABEL: &str = "Thinking";

/// 选区工具模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssistMode {
    /// 提问：需要输入问题后确认
    Question,
    /// 释义：立即请求
    Definition,
    /// 翻译：立即请求
    Translation,
}

impl AssistMode {
    /// 键盘快捷键
    pub fn from_shortcut(key: &str) -> Option<Self> {
        match key {
            "q" | "Q" => Some(Self::Question),
            "d" | "D" => Some(Self::Definition),
            "t" | "T" => Some(Self::Translation),
            _ => None,
        }
    }

    pub fn needs_input(&self) -> bool {
        matches!(self, Self::Question)
    }
}

impl fmt::Display for AssistMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Question => "question",
            Self::Definition => "definition",
            Self::Translation => "translation",
        };
        f.write_str(name)
    }
}

/// 视口坐标中的矩形
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// 面板放置方向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Below,
    Above,
}

/// 面板位置
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PanelLayout {
    pub top: f64,
    pub left: f64,
    pub placement: Placement,
}

/// 阅读栏与视口尺寸
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub height: f64,
    pub column_left: f64,
    pub column_width: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            height: 800.0,
            column_left: 0.0,
            column_width: 720.0,
        }
    }
}

/// 计算浮动面板位置
///
/// 下方空间足够时放在高亮下方，否则放在上方；水平方向限制在阅读栏内
pub fn place_panel(anchor: Rect, panel_width: f64, panel_height: f64, viewport: Viewport) -> PanelLayout {
    let below_top = anchor.y + anchor.height + PANEL_GAP;
    let (top, placement) = if below_top + panel_height <= viewport.height {
        (below_top, Placement::Below)
    } else {
        ((anchor.y - PANEL_GAP - panel_height).max(0.0), Placement::Above)
    };

    let max_left = viewport.column_left + (viewport.column_width - panel_width).max(0.0);
    let left = anchor.x.clamp(viewport.column_left, max_left);

    PanelLayout {
        top,
        left,
        placement,
    }
}

/// 内联节点：文本或临时高亮包裹
#[derive(Debug, Clone, PartialEq)]
pub enum InlineNode {
    Text(String),
    Highlight(Vec<InlineNode>),
}

/// 节点列表的纯文本内容
pub fn text_content(nodes: &[InlineNode]) -> String {
    let mut out = String::new();
    for node in nodes {
        match node {
            InlineNode::Text(text) => out.push_str(text),
            InlineNode::Highlight(children) => out.push_str(&text_content(children)),
        }
    }
    out
}

/// 高亮操作错误
#[derive(Debug, Clone, PartialEq)]
pub enum HighlightError {
    NoSuchParagraph(usize),
    InvalidRange { start: usize, end: usize, len: usize },
    AlreadyHighlighted,
}

/// 章节段落的可高亮文档
///
/// 包裹与解包均不改变段落文本内容
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HighlightDocument {
    paragraphs: Vec<Vec<InlineNode>>,
}

impl HighlightDocument {
    pub fn from_paragraphs(paragraphs: Vec<String>) -> Self {
        Self {
            paragraphs: paragraphs
                .into_iter()
                .map(|p| vec![InlineNode::Text(p)])
                .collect(),
        }
    }

    pub fn paragraph(&self, index: usize) -> Option<&[InlineNode]> {
        self.paragraphs.get(index).map(|p| p.as_slice())
    }

    pub fn paragraph_text(&self, index: usize) -> Option<String> {
        self.paragraph(index).map(text_content)
    }

    pub fn text(&self) -> String {
        self.paragraphs
            .iter()
            .map(|p| text_content(p))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn has_highlight(&self) -> bool {
        self.paragraphs
            .iter()
            .flatten()
            .any(|n| matches!(n, InlineNode::Highlight(_)))
    }

    /// 将段落中 [start, end) 字符范围包裹为高亮
    pub fn wrap(&mut self, paragraph: usize, start: usize, end: usize) -> Result<(), HighlightError> {
        if self.has_highlight() {
            return Err(HighlightError::AlreadyHighlighted);
        }
        let nodes = self
            .paragraphs
            .get_mut(paragraph)
            .ok_or(HighlightError::NoSuchParagraph(paragraph))?;

        let len = text_content(nodes).chars().count();
        if start >= end || end > len {
            return Err(HighlightError::InvalidRange { start, end, len });
        }

        let mut before = Vec::new();
        let mut marked = Vec::new();
        let mut after = Vec::new();
        let mut pos = 0;

        for node in nodes.drain(..) {
            let text = match node {
                InlineNode::Text(text) => text,
                other => {
                    before.push(other);
                    continue;
                }
            };
            let count = text.chars().count();
            let a = start.clamp(pos, pos + count) - pos;
            let b = end.clamp(pos, pos + count) - pos;
            pos += count;

            let head = slice_chars(&text, 0, a);
            let mid = slice_chars(&text, a, b);
            let tail = slice_chars(&text, b, count);

            if !head.is_empty() {
                before.push(InlineNode::Text(head));
            }
            if !mid.is_empty() {
                marked.push(InlineNode::Text(mid));
            }
            if !tail.is_empty() {
                after.push(InlineNode::Text(tail));
            }
        }

        nodes.extend(before);
        nodes.push(InlineNode::Highlight(marked));
        nodes.extend(after);
        Ok(())
    }

    /// 移除所有高亮：子节点放回父级，删除空包裹，并合并相邻文本
    ///
    /// # 返回
    /// 发生变化的段落索引
    pub fn unwrap_all(&mut self) -> Vec<usize> {
        let mut changed = Vec::new();
        for (index, nodes) in self.paragraphs.iter_mut().enumerate() {
            if !nodes.iter().any(|n| matches!(n, InlineNode::Highlight(_))) {
                continue;
            }
            let mut flat = Vec::with_capacity(nodes.len());
            for node in nodes.drain(..) {
                match node {
                    InlineNode::Highlight(children) => flat.extend(children),
                    text => flat.push(text),
                }
            }
            *nodes = normalize(flat);
            changed.push(index);
        }
        changed
    }
}

fn normalize(nodes: Vec<InlineNode>) -> Vec<InlineNode> {
    let mut out: Vec<InlineNode> = Vec::with_capacity(nodes.len());
    for node in nodes {
        if let InlineNode::Text(text) = &node {
            if text.is_empty() {
                continue;
            }
            if let Some(InlineNode::Text(prev)) = out.last_mut() {
                prev.push_str(text);
                continue;
            }
        }
        out.push(node);
    }
    out
}

fn slice_chars(text: &str, start: usize, end: usize) -> String {
    text.chars().skip(start).take(end.saturating_sub(start)).collect()
}

/// "思考中" 动画：按固定间隔循环追加句点
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ThinkingIndicator {
    frame: usize,
}

impl ThinkingIndicator {
    pub fn tick(&mut self) -> String {
        self.frame = (self.frame + 1) % 4;
        self.text()
    }

    pub fn text(&self) -> String {
        format!("{}{}", THINKING_LABEL, ".".repeat(self.frame))
    }
}

/// 用户选中的文本
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveSelection {
    pub text: String,
    pub paragraph: usize,
    /// 段落内字符偏移
    pub start: usize,
    pub end: usize,
    pub rect: Rect,
}

/// 面板中的结果
#[derive(Debug, Clone, PartialEq)]
pub struct PanelResult {
    pub text: String,
    pub expanded: bool,
    pub failed: bool,
}

/// 选区工具状态
#[derive(Debug, Clone, PartialEq)]
pub enum OverlayState {
    Idle,
    Selecting(ActiveSelection),
    Open {
        mode: AssistMode,
        selection: ActiveSelection,
        question: String,
    },
    Awaiting {
        mode: AssistMode,
        selection: ActiveSelection,
        thinking: ThinkingIndicator,
    },
    Shown {
        mode: AssistMode,
        selection: ActiveSelection,
        result: PanelResult,
    },
}

/// 状态转换产生的动作
#[derive(Debug, Clone, PartialEq)]
pub enum OverlayAction {
    ShowActionMenu(Rect),
    HideActionMenu,
    /// 用临时高亮包裹选区
    WrapSelection { paragraph: usize, start: usize, end: usize },
    /// 解包高亮
    RemoveHighlight,
    /// 打开面板，位置已按视口计算
    OpenPanel { mode: AssistMode, anchor: Rect, layout: PanelLayout },
    ClosePanel,
    StartThinking,
    StopThinking,
    PanelText(PanelResult),
    /// 发起后端请求
    Dispatch {
        mode: AssistMode,
        selection: ActiveSelection,
        question: Option<String>,
    },
}

/// 选区工具浮层
///
/// 显式的状态机，与具体界面解耦
pub struct SelectionOverlay {
    state: OverlayState,
    expand_threshold: usize,
    touch_capable: bool,
    viewport: Viewport,
    panel_width: f64,
    panel_height: f64,
}

impl SelectionOverlay {
    pub fn new(expand_threshold: usize, touch_capable: bool) -> Self {
        Self {
            state: OverlayState::Idle,
            expand_threshold,
            touch_capable,
            viewport: Viewport::default(),
            panel_width: 320.0,
            panel_height: 240.0,
        }
    }

    pub fn with_panel_size(mut self, width: f64, height: f64) -> Self {
        self.panel_width = width;
        self.panel_height = height;
        self
    }

    /// 视口或阅读栏尺寸变化
    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn state(&self) -> &OverlayState {
        &self.state
    }

    pub fn is_panel_open(&self) -> bool {
        matches!(
            self.state,
            OverlayState::Open { .. } | OverlayState::Awaiting { .. } | OverlayState::Shown { .. }
        )
    }

    /// 选区变化（selectionchange）
    ///
    /// 面板打开时忽略；触屏设备上为非空选区显示浮动操作菜单
    pub fn selection_changed(&mut self, selection: Option<ActiveSelection>) -> Vec<OverlayAction> {
        if self.is_panel_open() {
            return Vec::new();
        }

        match selection.filter(|s| !s.text.trim().is_empty()) {
            Some(selection) => {
                let rect = selection.rect;
                self.state = OverlayState::Selecting(selection);
                if self.touch_capable {
                    vec![OverlayAction::ShowActionMenu(rect)]
                } else {
                    Vec::new()
                }
            }
            None => {
                let was_selecting = matches!(self.state, OverlayState::Selecting(_));
                self.state = OverlayState::Idle;
                if was_selecting && self.touch_capable {
                    vec![OverlayAction::HideActionMenu]
                } else {
                    Vec::new()
                }
            }
        }
    }

    /// 通过快捷键或浮动菜单触发某个模式
    pub fn trigger(&mut self, mode: AssistMode) -> Vec<OverlayAction> {
        let selection = match &self.state {
            OverlayState::Selecting(selection) => selection.clone(),
            _ => return Vec::new(),
        };

        let mut actions = Vec::new();
        if self.touch_capable {
            actions.push(OverlayAction::HideActionMenu);
        }
        actions.push(OverlayAction::WrapSelection {
            paragraph: selection.paragraph,
            start: selection.start,
            end: selection.end,
        });
        actions.push(OverlayAction::OpenPanel {
            mode,
            anchor: selection.rect,
            layout: place_panel(selection.rect, self.panel_width, self.panel_height, self.viewport),
        });

        if mode.needs_input() {
            self.state = OverlayState::Open {
                mode,
                selection,
                question: String::new(),
            };
        } else {
            actions.extend(self.begin_request(mode, selection, None));
        }
        actions
    }

    /// 更新问题输入
    pub fn update_question(&mut self, text: &str) {
        if let OverlayState::Open { question, .. } = &mut self.state {
            *question = text.to_string();
        }
    }

    /// 确认提问，问题为空时不发送
    pub fn confirm(&mut self) -> Vec<OverlayAction> {
        let (mode, selection, question) = match &self.state {
            OverlayState::Open {
                mode,
                selection,
                question,
            } if !question.trim().is_empty() => (*mode, selection.clone(), question.trim().to_string()),
            _ => return Vec::new(),
        };
        self.begin_request(mode, selection, Some(question))
    }

    /// 动画计时器触发
    pub fn tick(&mut self) -> Vec<OverlayAction> {
        match &mut self.state {
            OverlayState::Awaiting { thinking, .. } => vec![OverlayAction::PanelText(PanelResult {
                text: thinking.tick(),
                expanded: false,
                failed: false,
            })],
            _ => Vec::new(),
        }
    }

    /// 后端响应到达
    ///
    /// 不取消旧请求：面板仍打开时，迟到的响应同样覆盖面板内容
    pub fn receive(&mut self, response: Result<String, String>) -> Vec<OverlayAction> {
        let (mode, selection) = match &self.state {
            OverlayState::Awaiting { mode, selection, .. }
            | OverlayState::Shown { mode, selection, .. } => (*mode, selection.clone()),
            _ => {
                log::debug!("浮层已关闭，丢弃响应");
                return Vec::new();
            }
        };

        let result = match response {
            Ok(text) => PanelResult {
                expanded: text.chars().count() > self.expand_threshold,
                text,
                failed: false,
            },
            Err(error) => {
                log::warn!("{} 请求失败: {}", mode, error);
                PanelResult {
                    text: GENERIC_ERROR.to_string(),
                    expanded: false,
                    failed: true,
                }
            }
        };

        self.state = OverlayState::Shown {
            mode,
            selection,
            result: result.clone(),
        };
        vec![OverlayAction::StopThinking, OverlayAction::PanelText(result)]
    }

    /// 按键：Escape 关闭浮层，快捷键触发模式
    pub fn key(&mut self, key: &str) -> Vec<OverlayAction> {
        if key == "Escape" {
            return self.close();
        }
        match AssistMode::from_shortcut(key) {
            Some(mode) if matches!(self.state, OverlayState::Selecting(_)) => self.trigger(mode),
            _ => Vec::new(),
        }
    }

    /// 关闭浮层，回到空闲状态
    pub fn close(&mut self) -> Vec<OverlayAction> {
        let previous = std::mem::replace(&mut self.state, OverlayState::Idle);
        match previous {
            OverlayState::Idle => Vec::new(),
            OverlayState::Selecting(_) => {
                if self.touch_capable {
                    vec![OverlayAction::HideActionMenu]
                } else {
                    Vec::new()
                }
            }
            OverlayState::Awaiting { .. } => vec![
                OverlayAction::StopThinking,
                OverlayAction::RemoveHighlight,
                OverlayAction::ClosePanel,
            ],
            _ => vec![OverlayAction::RemoveHighlight, OverlayAction::ClosePanel],
        }
    }

    fn begin_request(
        &mut self,
        mode: AssistMode,
        selection: ActiveSelection,
        question: Option<String>,
    ) -> Vec<OverlayAction> {
        let thinking = ThinkingIndicator::default();
        let placeholder = thinking.text();
        self.state = OverlayState::Awaiting {
            mode,
            selection: selection.clone(),
            thinking,
        };

        vec![
            OverlayAction::PanelText(PanelResult {
                text: placeholder,
                expanded: false,
                failed: false,
            }),
            OverlayAction::StartThinking,
            OverlayAction::Dispatch {
                mode,
                selection,
                question,
            },
        ]
    }
}

use std::time::Duration;

use log::{debug, info, warn};

use super::bookmark::BookmarkSync;
use super::ingestor::IngestEvent;
use super::renderer::{error_banner, ChapterRenderer, ChapterView, InternalLink, Navigation, ScrollTarget};
use super::selection::{
    ActiveSelection, AssistMode, HighlightDocument, InlineNode, OverlayAction, SelectionOverlay, Viewport,
};
use super::session::{ScrollState, Session};
use super::types::{Bookmark, StreamRecord, TocEntry};
use crate::api::{AskRequest, AssistRequest, DefineRequest, TranslateRequest};
use crate::config::ReaderConfig;

/// 数据流结束但目标章节始终没有到达时的提示
const CHAPTER_MISSING: &str = "The requested chapter could not be loaded.";

/// 阅读器输入事件
#[derive(Debug, Clone, PartialEq)]
pub enum ReaderEvent {
    /// 数据流中解析出的一条记录
    Ingest(IngestEvent),
    /// 传输失败
    StreamFailed(String),
    StreamEnded,
    Scroll(ScrollState),
    /// 视口或阅读栏尺寸变化
    Resize(Viewport),
    Next,
    Previous,
    JumpTo(usize),
    /// 点击章节内链接
    FollowLink(String),
    AdjustFont(i32),
    ToggleTocMenu,
    /// 点击目录菜单及其按钮以外的区域
    ClickOutsideToc,
    BookmarkTimerFired,
    SelectionChanged(Option<ActiveSelection>),
    TriggerTool(AssistMode),
    QuestionInput(String),
    ConfirmQuestion,
    Key(String),
    ClickOutsidePanel,
    ClosePanel,
    ThinkingTick,
    AssistResponse(Result<String, String>),
}

/// 控制器输出，由宿主（终端、界面桥接层、测试）执行
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    SetLoading(bool),
    /// 内联错误提示（已转义的 HTML）
    ShowError(String),
    SetBookInfo { title: String, author: String },
    RenderToc(Vec<TocEntry>),
    UpdateTocEntry(TocEntry),
    SetActiveTocEntry(usize),
    SetTocMenuVisible(bool),
    RenderChapter(ChapterView),
    ScrollTo(ScrollTarget),
    /// 下一次绘制完成后再滚动，保证布局已稳定
    ScrollAfterPaint(ScrollTarget),
    SetControlsVisible(bool),
    SetProgress(f64),
    ApplyFontSize(u32),
    ScheduleBookmarkSave(Duration),
    SaveBookmark(Bookmark),
    /// 通知后端本书已读完，每个会话至多一次
    MarkFinished,
    /// 段落的内联节点发生变化（高亮包裹/解包）
    UpdateParagraph { paragraph: usize, nodes: Vec<InlineNode> },
    StartThinkingTimer(Duration),
    StopThinkingTimer,
    /// 浮层界面动作：菜单、面板、面板文本
    Overlay(OverlayAction),
    /// 发起选区工具请求
    Assist(AssistRequest),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamState {
    Loading,
    Ended,
    Failed,
}

/// 阅读器控制器
///
/// 持有会话、渲染器、书签同步器和选区浮层，将输入事件转换为效果列表。
/// 本身不做任何 I/O，所有网络请求和定时器由运行时根据效果执行
pub struct ReaderController {
    filename: String,
    session: Session,
    renderer: ChapterRenderer,
    bookmarks: BookmarkSync,
    overlay: SelectionOverlay,
    document: HighlightDocument,
    stream: StreamState,
    /// 当前显示的章节
    displayed: Option<usize>,
    /// 目标章节到达后执行的滚动
    pending_scroll: Option<ScrollTarget>,
    toc_menu_open: bool,
    finished_sent: bool,
    thinking_interval: Duration,
}

impl ReaderController {
    pub fn new(filename: impl Into<String>, config: &ReaderConfig, font_size: u32, touch_capable: bool) -> Self {
        Self {
            filename: filename.into(),
            session: Session::new(font_size),
            renderer: ChapterRenderer::new(config.hide_controls_after, config.show_controls_within),
            bookmarks: BookmarkSync::new(config.bookmark_debounce),
            overlay: SelectionOverlay::new(config.expand_threshold, touch_capable)
                .with_panel_size(config.panel_width, config.panel_height),
            document: HighlightDocument::default(),
            stream: StreamState::Loading,
            displayed: None,
            pending_scroll: None,
            toc_menu_open: false,
            finished_sent: false,
            thinking_interval: config.thinking_interval,
        }
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// 已安排但尚未发送的书签保存
    pub fn has_pending_bookmark(&self) -> bool {
        self.bookmarks.is_pending()
    }

    pub fn overlay(&self) -> &SelectionOverlay {
        &self.overlay
    }

    pub fn document(&self) -> &HighlightDocument {
        &self.document
    }

    pub fn displayed(&self) -> Option<usize> {
        self.displayed
    }

    pub fn is_toc_menu_open(&self) -> bool {
        self.toc_menu_open
    }

    /// 数据流已结束或失败
    pub fn is_stream_finished(&self) -> bool {
        self.stream != StreamState::Loading
    }

    pub fn is_stream_failed(&self) -> bool {
        self.stream == StreamState::Failed
    }

    /// 页面加载时的初始效果
    pub fn start(&self) -> Vec<Effect> {
        vec![
            Effect::SetLoading(true),
            Effect::ApplyFontSize(self.session.font_size()),
        ]
    }

    /// 处理一个事件
    pub fn handle(&mut self, event: ReaderEvent) -> Vec<Effect> {
        match event {
            ReaderEvent::Ingest(event) => self.ingest(event),
            ReaderEvent::StreamFailed(message) => self.fail(&message),
            ReaderEvent::StreamEnded => self.stream_ended(),
            ReaderEvent::Scroll(scroll) => self.scroll(scroll),
            ReaderEvent::Next => self.navigate(Navigation::Next, None),
            ReaderEvent::Previous => self.navigate(Navigation::Previous, None),
            ReaderEvent::JumpTo(index) => self.navigate(Navigation::Jump(index), None),
            ReaderEvent::FollowLink(href) => self.follow_link(&href),
            ReaderEvent::AdjustFont(delta) => {
                let size = self
                    .session
                    .set_font_size(self.session.font_size() as i64 + delta as i64);
                vec![Effect::ApplyFontSize(size)]
            }
            ReaderEvent::Resize(viewport) => {
                self.overlay.set_viewport(viewport);
                Vec::new()
            }
            ReaderEvent::ToggleTocMenu => {
                self.toc_menu_open = !self.toc_menu_open;
                vec![Effect::SetTocMenuVisible(self.toc_menu_open)]
            }
            ReaderEvent::ClickOutsideToc => self.close_toc_menu(),
            ReaderEvent::BookmarkTimerFired => self
                .bookmarks
                .fire(&self.session)
                .map(Effect::SaveBookmark)
                .into_iter()
                .collect(),
            ReaderEvent::SelectionChanged(selection) => {
                let actions = self.overlay.selection_changed(selection);
                self.apply_overlay(actions)
            }
            ReaderEvent::TriggerTool(mode) => {
                let actions = self.overlay.trigger(mode);
                self.apply_overlay(actions)
            }
            ReaderEvent::QuestionInput(text) => {
                self.overlay.update_question(&text);
                Vec::new()
            }
            ReaderEvent::ConfirmQuestion => {
                let actions = self.overlay.confirm();
                self.apply_overlay(actions)
            }
            ReaderEvent::Key(key) => {
                let actions = self.overlay.key(&key);
                self.apply_overlay(actions)
            }
            ReaderEvent::ClickOutsidePanel => {
                if !self.overlay.is_panel_open() {
                    return Vec::new();
                }
                let actions = self.overlay.close();
                self.apply_overlay(actions)
            }
            ReaderEvent::ClosePanel => {
                let actions = self.overlay.close();
                self.apply_overlay(actions)
            }
            ReaderEvent::ThinkingTick => {
                let actions = self.overlay.tick();
                self.apply_overlay(actions)
            }
            ReaderEvent::AssistResponse(response) => {
                let actions = self.overlay.receive(response);
                self.apply_overlay(actions)
            }
        }
    }

    // ===== 数据流 =====

    fn ingest(&mut self, event: IngestEvent) -> Vec<Effect> {
        if self.is_stream_finished() {
            debug!("数据流已终止，忽略后续记录");
            return Vec::new();
        }

        match event {
            IngestEvent::Record(StreamRecord::Metadata(meta)) => {
                if !self.session.apply_metadata(meta) {
                    return Vec::new();
                }
                let Some(book) = self.session.book() else {
                    return Vec::new();
                };
                let effects = vec![
                    Effect::SetBookInfo {
                        title: book.title.clone(),
                        author: book.author.clone(),
                    },
                    Effect::RenderToc(self.session.toc_entries()),
                ];
                self.pending_scroll = Some(ScrollTarget::Fraction(book.start_position));
                effects
            }
            IngestEvent::Record(StreamRecord::Chapter(record)) => match self.session.store_chapter(record) {
                Ok(index) => {
                    let mut effects = vec![Effect::UpdateTocEntry(self.session.toc_entry(index))];
                    if index == self.session.current_index() && self.displayed != Some(index) {
                        let scroll = self.pending_scroll.take().unwrap_or(ScrollTarget::Top);
                        effects.extend(self.render_current());
                        effects.push(Effect::ScrollAfterPaint(scroll));
                    }
                    effects
                }
                Err(rejection) => {
                    warn!("{}: 丢弃章节记录 {:?}", self.filename, rejection);
                    Vec::new()
                }
            },
            IngestEvent::Record(StreamRecord::Error { message }) => self.fail(&message),
            IngestEvent::Malformed { line, error } => {
                debug!("{}: 无法解析的行 {:?}: {}", self.filename, line, error);
                Vec::new()
            }
        }
    }

    fn fail(&mut self, message: &str) -> Vec<Effect> {
        if self.is_stream_finished() {
            return Vec::new();
        }
        warn!("{}: 数据流失败: {}", self.filename, message);
        self.stream = StreamState::Failed;
        vec![Effect::SetLoading(false), Effect::ShowError(error_banner(message))]
    }

    fn stream_ended(&mut self) -> Vec<Effect> {
        if self.is_stream_finished() {
            return Vec::new();
        }
        self.stream = StreamState::Ended;
        info!(
            "{}: 数据流结束，收到 {}/{} 章",
            self.filename,
            self.session.arrived_count(),
            self.session.total_chapters()
        );

        if self.displayed.is_none() {
            return vec![Effect::SetLoading(false), Effect::ShowError(error_banner(CHAPTER_MISSING))];
        }
        Vec::new()
    }

    // ===== 渲染与导航 =====

    /// 渲染当前章节并重建高亮文档；章节未到达时显示加载状态
    fn render_current(&mut self) -> Vec<Effect> {
        let Some(view) = self.renderer.render(&self.session) else {
            self.displayed = None;
            return vec![Effect::SetLoading(true)];
        };

        let index = view.index;
        self.displayed = Some(index);
        self.document = HighlightDocument::from_paragraphs(self.session.paragraphs(index));
        // 首次渲染时计算句子索引
        let _ = self.session.sentences_for(index);

        vec![
            Effect::SetLoading(false),
            Effect::RenderChapter(view),
            Effect::SetActiveTocEntry(index),
            Effect::SetControlsVisible(self.renderer.controls_visible()),
        ]
    }

    fn navigate(&mut self, navigation: Navigation, anchor: Option<String>) -> Vec<Effect> {
        let Some(outcome) = self.renderer.navigate(&mut self.session, navigation) else {
            return Vec::new();
        };

        let mut effects = self.reset_overlay();
        if matches!(navigation, Navigation::Jump(_)) {
            effects.extend(self.close_toc_menu());
        }

        let scroll = match &anchor {
            Some(anchor) => ChapterRenderer::anchor_target(anchor, self.session.font_size()),
            None => outcome.scroll.clone(),
        };

        let rendered = self.render_current();
        if self.displayed == Some(outcome.index) {
            effects.extend(rendered);
            if anchor.is_some() {
                effects.push(Effect::ScrollAfterPaint(scroll));
            } else {
                effects.push(Effect::ScrollTo(scroll));
            }
        } else {
            // 章节尚未到达，等到达后再滚动
            effects.extend(rendered);
            self.pending_scroll = Some(scroll);
        }

        effects.extend(self.request_bookmark_save());
        if outcome.reached_end && !self.finished_sent {
            self.finished_sent = true;
            effects.push(Effect::MarkFinished);
        }
        effects
    }

    fn follow_link(&mut self, href: &str) -> Vec<Effect> {
        let Some(link) = InternalLink::parse(href) else {
            return Vec::new();
        };

        let index = match &link.target {
            None => self.session.current_index(),
            Some(target) => match self.session.resolve_href(target) {
                Some(index) => index,
                None => {
                    warn!("{}: 无法解析链接 {}", self.filename, href);
                    return Vec::new();
                }
            },
        };

        if index == self.session.current_index() && self.displayed == Some(index) {
            return link
                .anchor
                .map(|anchor| {
                    Effect::ScrollTo(ChapterRenderer::anchor_target(&anchor, self.session.font_size()))
                })
                .into_iter()
                .collect();
        }

        self.navigate(Navigation::Jump(index), link.anchor)
    }

    fn scroll(&mut self, scroll: ScrollState) -> Vec<Effect> {
        let update = self.renderer.on_scroll(&mut self.session, scroll);
        let mut effects = Vec::new();
        if let Some(visible) = update.controls_visible {
            effects.push(Effect::SetControlsVisible(visible));
        }
        effects.push(Effect::SetProgress(update.progress));
        effects.extend(self.request_bookmark_save());
        effects
    }

    fn request_bookmark_save(&mut self) -> Option<Effect> {
        self.bookmarks
            .request_save()
            .map(Effect::ScheduleBookmarkSave)
    }

    fn close_toc_menu(&mut self) -> Vec<Effect> {
        if !self.toc_menu_open {
            return Vec::new();
        }
        self.toc_menu_open = false;
        vec![Effect::SetTocMenuVisible(false)]
    }

    // ===== 选区浮层 =====

    /// 切换章节前关闭浮层，高亮属于旧章节
    fn reset_overlay(&mut self) -> Vec<Effect> {
        let actions = self.overlay.close();
        self.apply_overlay(actions)
    }

    fn apply_overlay(&mut self, actions: Vec<OverlayAction>) -> Vec<Effect> {
        let mut effects = Vec::new();
        for action in actions {
            match action {
                OverlayAction::WrapSelection { paragraph, start, end } => {
                    match self.document.wrap(paragraph, start, end) {
                        Ok(()) => effects.extend(self.paragraph_effect(paragraph)),
                        Err(e) => warn!("无法高亮选区: {:?}", e),
                    }
                }
                OverlayAction::RemoveHighlight => {
                    for paragraph in self.document.unwrap_all() {
                        effects.extend(self.paragraph_effect(paragraph));
                    }
                }
                OverlayAction::StartThinking => {
                    effects.push(Effect::StartThinkingTimer(self.thinking_interval))
                }
                OverlayAction::StopThinking => effects.push(Effect::StopThinkingTimer),
                OverlayAction::Dispatch {
                    mode,
                    selection,
                    question,
                } => effects.push(Effect::Assist(self.assist_request(mode, &selection, question))),
                other => effects.push(Effect::Overlay(other)),
            }
        }
        effects
    }

    fn paragraph_effect(&self, paragraph: usize) -> Option<Effect> {
        self.document
            .paragraph(paragraph)
            .map(|nodes| Effect::UpdateParagraph {
                paragraph,
                nodes: nodes.to_vec(),
            })
    }

    /// 构造后端请求：提问附带截至当前章节的全部句子，释义和翻译附带所在段落
    fn assist_request(&mut self, mode: AssistMode, selection: &ActiveSelection, question: Option<String>) -> AssistRequest {
        let paragraph = self
            .document
            .paragraph_text(selection.paragraph)
            .unwrap_or_else(|| selection.text.clone());

        match mode {
            AssistMode::Question => AssistRequest::Ask(AskRequest {
                context: selection.text.clone(),
                question: question.unwrap_or_default(),
                chapter_sentences: self
                    .session
                    .context_sentences(self.session.current_index()),
            }),
            AssistMode::Definition => AssistRequest::Define(DefineRequest {
                word: selection.text.trim().to_string(),
                context: paragraph,
            }),
            AssistMode::Translation => AssistRequest::Translate(TranslateRequest {
                text: selection.text.clone(),
                context: paragraph,
            }),
        }
    }
}

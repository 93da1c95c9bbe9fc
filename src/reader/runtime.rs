use log::{debug, error, info, warn};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::{JoinHandle, JoinSet};

use super::controller::{Effect, ReaderController, ReaderEvent};
use super::ingestor::{IngestEvent, StreamIngestor};
use crate::api::LibraryClient;
use crate::preferences::Preferences;

/// 宿主界面：执行控制器产生的效果
///
/// 网络请求和定时器由运行时处理，界面只需要负责显示
pub trait ReaderView {
    fn apply(&mut self, effect: &Effect);
}

/// 运行时的输入：界面事件或关闭请求
#[derive(Debug)]
pub enum RuntimeMessage {
    Event(ReaderEvent),
    Close,
}

/// 阅读器异步运行时
///
/// 单线程协作式地驱动控制器：读取 `/load_book` 数据流，运行书签去抖和动画定时器，
/// 在后台发起后端请求并把结果作为事件送回
pub struct ReaderRuntime<V: ReaderView> {
    client: LibraryClient,
    controller: ReaderController,
    view: V,
    preferences: Option<Preferences>,
    tx: UnboundedSender<RuntimeMessage>,
    rx: UnboundedReceiver<RuntimeMessage>,
    stream_task: Option<JoinHandle<()>>,
    bookmark_timer: Option<JoinHandle<()>>,
    thinking_task: Option<JoinHandle<()>>,
    /// 书签保存、已读标记：关闭前等待完成
    persistence: JoinSet<()>,
}

impl<V: ReaderView> ReaderRuntime<V> {
    pub fn new(client: LibraryClient, controller: ReaderController, view: V) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            client,
            controller,
            view,
            preferences: None,
            tx,
            rx,
            stream_task: None,
            bookmark_timer: None,
            thinking_task: None,
            persistence: JoinSet::new(),
        }
    }

    /// 字号变化时写入本地偏好
    pub fn with_preferences(mut self, preferences: Preferences) -> Self {
        self.preferences = Some(preferences);
        self
    }

    /// 界面事件的发送端
    pub fn sender(&self) -> UnboundedSender<RuntimeMessage> {
        self.tx.clone()
    }

    pub fn controller(&self) -> &ReaderController {
        &self.controller
    }

    pub fn view(&self) -> &V {
        &self.view
    }

    /// 打开书籍数据流
    pub fn open(&mut self) {
        if self.stream_task.is_some() {
            return;
        }
        let effects = self.controller.start();
        self.execute(effects);

        let client = self.client.clone();
        let filename = self.controller.filename().to_string();
        let tx = self.tx.clone();
        self.stream_task = Some(tokio::spawn(async move {
            stream_book(client, filename, tx).await;
        }));
    }

    /// 处理事件直到数据流结束或失败
    pub async fn load(&mut self) {
        self.open();
        while !self.controller.is_stream_finished() {
            match self.rx.recv().await {
                Some(RuntimeMessage::Event(event)) => self.dispatch(event),
                Some(RuntimeMessage::Close) | None => break,
            }
        }
    }

    /// 处理事件直到收到关闭请求，返回界面
    pub async fn run(mut self) -> V {
        self.open();
        while let Some(message) = self.rx.recv().await {
            match message {
                RuntimeMessage::Event(event) => self.dispatch(event),
                RuntimeMessage::Close => break,
            }
        }
        self.shutdown().await
    }

    /// 停止数据流和定时器，等待未完成的保存请求
    ///
    /// 去抖中的书签不等定时器到期，立即保存
    pub async fn shutdown(mut self) -> V {
        if let Some(task) = self.stream_task.take() {
            task.abort();
        }
        if let Some(task) = self.thinking_task.take() {
            task.abort();
        }
        if let Some(task) = self.bookmark_timer.take() {
            task.abort();
        }
        if self.controller.has_pending_bookmark() {
            self.dispatch(ReaderEvent::BookmarkTimerFired);
        }
        while self.persistence.join_next().await.is_some() {}
        self.view
    }

    /// 将一个事件交给控制器并执行产生的效果
    pub fn dispatch(&mut self, event: ReaderEvent) {
        let effects = self.controller.handle(event);
        self.execute(effects);
    }

    fn execute(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match &effect {
                Effect::ScheduleBookmarkSave(delay) => {
                    let delay = *delay;
                    let tx = self.tx.clone();
                    if let Some(task) = self.bookmark_timer.take() {
                        task.abort();
                    }
                    self.bookmark_timer = Some(tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        let _ = tx.send(RuntimeMessage::Event(ReaderEvent::BookmarkTimerFired));
                    }));
                }
                Effect::SaveBookmark(bookmark) => {
                    let client = self.client.clone();
                    let filename = self.controller.filename().to_string();
                    let bookmark = *bookmark;
                    self.persistence.spawn(async move {
                        match client.save_bookmark(&filename, &bookmark).await {
                            Ok(()) => debug!("书签已保存: {} {:?}", filename, bookmark),
                            Err(e) => warn!("保存书签失败: {}", e),
                        }
                    });
                }
                Effect::MarkFinished => {
                    let client = self.client.clone();
                    let filename = self.controller.filename().to_string();
                    self.persistence.spawn(async move {
                        match client.tag_finished(&filename).await {
                            Ok(()) => info!("已标记读完: {}", filename),
                            Err(e) => warn!("标记读完失败: {}", e),
                        }
                    });
                }
                Effect::StartThinkingTimer(interval) => {
                    if let Some(task) = self.thinking_task.take() {
                        task.abort();
                    }
                    let interval = *interval;
                    let tx = self.tx.clone();
                    self.thinking_task = Some(tokio::spawn(async move {
                        let mut ticker = tokio::time::interval(interval);
                        // 第一次 tick 立即完成
                        ticker.tick().await;
                        loop {
                            ticker.tick().await;
                            if tx.send(RuntimeMessage::Event(ReaderEvent::ThinkingTick)).is_err() {
                                break;
                            }
                        }
                    }));
                }
                Effect::StopThinkingTimer => {
                    if let Some(task) = self.thinking_task.take() {
                        task.abort();
                    }
                }
                Effect::Assist(request) => {
                    let client = self.client.clone();
                    let request = request.clone();
                    let tx = self.tx.clone();
                    tokio::spawn(async move {
                        let response = client.assist(&request).await.map_err(|e| e.to_string());
                        let _ = tx.send(RuntimeMessage::Event(ReaderEvent::AssistResponse(response)));
                    });
                }
                Effect::ApplyFontSize(size) => {
                    if let Some(preferences) = self.preferences.as_mut() {
                        if let Err(e) = preferences.set_font_size(*size as i64) {
                            warn!("保存字号失败: {}", e);
                        }
                    }
                }
                _ => {}
            }
            self.view.apply(&effect);
        }
    }
}

/// 读取数据流，逐块交给接收器，解析结果作为事件发送
async fn stream_book(client: LibraryClient, filename: String, tx: UnboundedSender<RuntimeMessage>) {
    let send = |event: ReaderEvent| tx.send(RuntimeMessage::Event(event)).is_ok();

    info!("开始加载: {}", filename);
    let mut response = match client.open_book_stream(&filename).await {
        Ok(response) => response,
        Err(e) => {
            error!("无法打开数据流 {}: {}", filename, e);
            send(ReaderEvent::StreamFailed(e.to_string()));
            return;
        }
    };

    let mut ingestor = StreamIngestor::new();
    loop {
        match response.chunk().await {
            Ok(Some(bytes)) => {
                for event in ingestor.feed(&bytes) {
                    if !send(ReaderEvent::Ingest(event)) {
                        return;
                    }
                }
            }
            Ok(None) => {
                let events: Vec<IngestEvent> = ingestor.finish();
                for event in events {
                    send(ReaderEvent::Ingest(event));
                }
                send(ReaderEvent::StreamEnded);
                info!("加载完成: {} ({} 行)", filename, ingestor.lines_seen());
                return;
            }
            Err(e) => {
                error!("读取数据流失败 {}: {}", filename, e);
                send(ReaderEvent::StreamFailed(e.to_string()));
                return;
            }
        }
    }
}

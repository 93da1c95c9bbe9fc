use std::time::Duration;

use log::{debug, warn};

use crate::api::{LibraryClient, LibraryEntry, LibraryFilters};
use crate::config::ReaderConfig;
use crate::error::Result;

/// 页面滚动位置
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PageScroll {
    pub scroll_top: f64,
    pub window_height: f64,
    pub document_height: f64,
}

/// 一次分页加载的结果
#[derive(Debug, Clone, PartialEq)]
pub enum PageOutcome {
    /// 追加到网格中的书籍数量
    Appended(usize),
    /// 已经没有更多书籍
    Exhausted,
    /// 筛选结果为空，显示空状态
    Empty,
}

/// 书库网格
///
/// 维护分页偏移、加载状态和当前筛选条件；筛选输入通过代数计数去抖
pub struct LibraryBrowser {
    entries: Vec<LibraryEntry>,
    offset: usize,
    page_size: usize,
    is_loading: bool,
    all_loaded: bool,
    show_empty: bool,
    filters: LibraryFilters,
    filter_generation: u64,
    filter_debounce: Duration,
    load_margin: f64,
}

impl LibraryBrowser {
    pub fn new(config: &ReaderConfig) -> Self {
        Self {
            entries: Vec::new(),
            offset: 0,
            page_size: config.page_size,
            is_loading: false,
            all_loaded: false,
            show_empty: false,
            filters: LibraryFilters::default(),
            filter_generation: 0,
            filter_debounce: config.filter_debounce,
            load_margin: config.load_more_margin,
        }
    }

    pub fn entries(&self) -> &[LibraryEntry] {
        &self.entries
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn all_loaded(&self) -> bool {
        self.all_loaded
    }

    pub fn show_empty(&self) -> bool {
        self.show_empty
    }

    pub fn filters(&self) -> &LibraryFilters {
        &self.filters
    }

    /// 滚动到距底部不足阈值、且未在加载、未加载完时需要加载下一页
    pub fn should_load_more(&self, scroll: PageScroll) -> bool {
        !self.is_loading
            && !self.all_loaded
            && scroll.scroll_top + scroll.window_height >= scroll.document_height - self.load_margin
    }

    /// 开始加载，返回请求的偏移；正在加载或已加载完时返回 None
    pub fn begin_load(&mut self) -> Option<usize> {
        if self.is_loading || self.all_loaded {
            return None;
        }
        self.is_loading = true;
        Some(self.offset)
    }

    /// 加载完成
    pub fn finish_load(&mut self, page: Vec<LibraryEntry>) -> PageOutcome {
        self.is_loading = false;
        let outcome = if page.is_empty() {
            self.all_loaded = true;
            if self.offset == 0 {
                self.show_empty = true;
                PageOutcome::Empty
            } else {
                PageOutcome::Exhausted
            }
        } else {
            self.show_empty = false;
            let count = page.len();
            self.entries.extend(page);
            PageOutcome::Appended(count)
        };
        self.offset += self.page_size;
        outcome
    }

    /// 加载失败：只恢复加载状态，下次滚动可以重试
    pub fn fail_load(&mut self) {
        self.is_loading = false;
    }

    /// 应用筛选条件：重置分页并清空网格
    pub fn apply_filters(&mut self, filters: LibraryFilters) {
        debug!("应用筛选条件: {:?}", filters.to_query());
        self.filters = filters;
        self.offset = 0;
        self.all_loaded = false;
        self.show_empty = false;
        self.entries.clear();
    }

    /// 首屏已由服务器渲染时，从指定偏移继续加载
    pub fn start_at(&mut self, offset: usize) {
        self.offset = offset;
    }

    /// 记录一次筛选输入，返回本次输入的代数和去抖时长
    pub fn filter_input(&mut self) -> (u64, Duration) {
        self.filter_generation += 1;
        (self.filter_generation, self.filter_debounce)
    }

    /// 去抖到期时，只有最后一次输入仍然有效
    pub fn is_current_input(&self, generation: u64) -> bool {
        generation == self.filter_generation
    }

    /// 加载下一页
    pub async fn load_next(&mut self, client: &LibraryClient) -> Result<Option<PageOutcome>> {
        let Some(offset) = self.begin_load() else {
            return Ok(None);
        };

        match client.load_more(offset, &self.filters).await {
            Ok(page) => Ok(Some(self.finish_load(page))),
            Err(e) => {
                warn!("加载书库失败 (offset {}): {}", offset, e);
                self.fail_load();
                Err(e)
            }
        }
    }

    /// 筛选输入去抖：等待后若没有更新的输入则应用筛选并加载第一页
    pub async fn debounced_filter(
        &mut self,
        client: &LibraryClient,
        generation: u64,
        filters: LibraryFilters,
    ) -> Result<Option<PageOutcome>> {
        tokio::time::sleep(self.filter_debounce).await;
        if !self.is_current_input(generation) {
            return Ok(None);
        }
        self.apply_filters(filters);
        self.load_next(client).await
    }
}

/// 阅读页链接
pub fn read_path(filename: &str) -> String {
    format!("/read/{}", filename)
}

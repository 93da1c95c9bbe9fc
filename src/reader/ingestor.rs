use encoding_rs::{CoderResult, Decoder, UTF_8};
use log::{debug, warn};

use super::types::StreamRecord;

/// 单行解析结果
#[derive(Debug, Clone, PartialEq)]
pub enum IngestEvent {
    Record(StreamRecord),
    /// 无法解析的行，不中断数据流
    Malformed { line: String, error: String },
}

/// 流式接收器
///
/// 增量解码 UTF-8 字节流，缓存不完整的行，每个完整行独立解析为一条 JSON 记录
pub struct StreamIngestor {
    decoder: Decoder,
    buffer: String,
    lines_seen: usize,
}

impl StreamIngestor {
    pub fn new() -> Self {
        Self {
            decoder: UTF_8.new_decoder_with_bom_removal(),
            buffer: String::new(),
            lines_seen: 0,
        }
    }

    /// 输入一个字节块，返回其中所有完整行的解析结果
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<IngestEvent> {
        self.decode(bytes, false);
        self.drain_complete_lines()
    }

    /// 数据流结束：刷新解码器并尝试解析最后一个不完整的行
    pub fn finish(&mut self) -> Vec<IngestEvent> {
        self.decode(&[], true);
        let mut events = self.drain_complete_lines();

        let rest = std::mem::take(&mut self.buffer);
        if let Some(event) = self.parse_line(&rest) {
            events.push(event);
        }

        debug!("数据流结束，共处理 {} 行", self.lines_seen);
        events
    }

    /// 已解析的非空行数
    pub fn lines_seen(&self) -> usize {
        self.lines_seen
    }

    fn decode(&mut self, bytes: &[u8], last: bool) {
        let mut total_read = 0;
        loop {
            let remaining = &bytes[total_read..];
            let needed = self
                .decoder
                .max_utf8_buffer_length(remaining.len())
                .unwrap_or(remaining.len() * 3 + 4);
            self.buffer.reserve(needed);

            let (result, read, had_errors) =
                self.decoder
                    .decode_to_string(remaining, &mut self.buffer, last);
            total_read += read;

            if had_errors {
                warn!("数据流中存在无效的 UTF-8 字节，已替换");
            }

            match result {
                CoderResult::InputEmpty => break,
                CoderResult::OutputFull => continue,
            }
        }
    }

    fn drain_complete_lines(&mut self) -> Vec<IngestEvent> {
        let mut events = Vec::new();

        while let Some(pos) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=pos).collect();
            if let Some(event) = self.parse_line(&line) {
                events.push(event);
            }
        }

        events
    }

    fn parse_line(&mut self, line: &str) -> Option<IngestEvent> {
        let line = line.trim_end_matches(['\n', '\r']);
        if line.trim().is_empty() {
            return None;
        }
        self.lines_seen += 1;

        match serde_json::from_str::<StreamRecord>(line) {
            Ok(record) => Some(IngestEvent::Record(record)),
            Err(e) => {
                warn!("跳过无法解析的第 {} 行: {}", self.lines_seen, e);
                Some(IngestEvent::Malformed {
                    line: line.to_string(),
                    error: e.to_string(),
                })
            }
        }
    }
}

impl Default for StreamIngestor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chapter_line(index: usize) -> String {
        format!(
            "{{\"type\":\"chapter\",\"index\":{},\"content\":\"<p>{}</p>\"}}\n",
            index, index
        )
    }

    fn records(events: &[IngestEvent]) -> usize {
        events
            .iter()
            .filter(|e| matches!(e, IngestEvent::Record(_)))
            .count()
    }

    #[test]
    fn test_line_split_across_chunks() {
        let mut ingestor = StreamIngestor::new();
        let line = chapter_line(0);
        let (a, b) = line.as_bytes().split_at(10);

        assert!(ingestor.feed(a).is_empty());
        let events = ingestor.feed(b);
        assert_eq!(records(&events), 1);
    }

    #[test]
    fn test_multibyte_char_split_across_chunks() {
        let mut ingestor = StreamIngestor::new();
        let line = "{\"type\":\"metadata\",\"title\":\"活着\",\"author\":\"余华\"}\n";
        let bytes = line.as_bytes();
        // 在 "活" 的 UTF-8 编码中间切开
        let cut = line.find('活').unwrap() + 1;

        assert!(ingestor.feed(&bytes[..cut]).is_empty());
        let events = ingestor.feed(&bytes[cut..]);
        match &events[..] {
            [IngestEvent::Record(StreamRecord::Metadata(meta))] => {
                assert_eq!(meta.title, "活着");
                assert_eq!(meta.author, "余华");
            }
            other => panic!("unexpected events: {:?}", other),
        }
    }

    #[test]
    fn test_malformed_line_does_not_abort() {
        let mut ingestor = StreamIngestor::new();
        let input = format!("{}{{not json}}\n{}", chapter_line(0), chapter_line(1));
        let events = ingestor.feed(input.as_bytes());

        assert_eq!(events.len(), 3);
        assert!(matches!(events[1], IngestEvent::Malformed { .. }));
        assert_eq!(records(&events), 2);
    }

    #[test]
    fn test_final_partial_line_flushed() {
        let mut ingestor = StreamIngestor::new();
        let line = chapter_line(7);
        let without_newline = line.trim_end();

        assert!(ingestor.feed(without_newline.as_bytes()).is_empty());
        let events = ingestor.finish();
        assert_eq!(records(&events), 1);
    }

    #[test]
    fn test_blank_and_crlf_lines() {
        let mut ingestor = StreamIngestor::new();
        let input = format!("\r\n\n{}", chapter_line(2).replace('\n', "\r\n"));
        let events = ingestor.feed(input.as_bytes());
        assert_eq!(records(&events), 1);
        assert_eq!(ingestor.lines_seen(), 1);
        assert!(ingestor.finish().is_empty());
    }

    #[test]
    fn test_bom_is_removed() {
        let mut ingestor = StreamIngestor::new();
        let mut bytes = vec![0xEF, 0xBB, 0xBF];
        bytes.extend_from_slice(chapter_line(0).as_bytes());
        assert_eq!(records(&ingestor.feed(&bytes)), 1);
    }
}

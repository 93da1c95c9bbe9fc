/// 探索 /load_book 数据流
///
/// 读取保存下来的 NDJSON 响应，按小块喂给接收器，观察记录如何逐步到达

use std::env;
use std::path::Path;

use library_reader_lib::reader::types::StreamRecord;
use library_reader_lib::reader::{IngestEvent, Session, StreamIngestor};

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("用法: {} <stream.ndjson> [块大小]", args[0]);
        return;
    }

    let path = Path::new(&args[1]);
    let chunk_size: usize = args
        .get(2)
        .and_then(|s| s.parse().ok())
        .filter(|n| *n > 0)
        .unwrap_or(64);

    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("错误: 无法读取 {:?}: {}", path, e);
            return;
        }
    };

    println!("正在解析数据流: {:?} ({} 字节, 每块 {} 字节)\n", path, bytes.len(), chunk_size);

    let mut ingestor = StreamIngestor::new();
    let mut session = Session::default();
    let mut events = Vec::new();
    for chunk in bytes.chunks(chunk_size) {
        events.extend(ingestor.feed(chunk));
    }
    events.extend(ingestor.finish());

    for event in events {
        match event {
            IngestEvent::Record(StreamRecord::Metadata(meta)) => {
                println!("=== 元数据 ===");
                println!("  标题: {}", meta.title);
                println!("  作者: {}", meta.author);
                println!("  目录条目: {}", meta.table_of_contents.len());
                println!("  起始章节: {} 位置: {:?}", meta.start_chapter, meta.chapter_pos);
                session.apply_metadata(meta);
            }
            IngestEvent::Record(StreamRecord::Chapter(record)) => {
                let index = record.index;
                let size = record.content.len();
                match session.store_chapter(record) {
                    Ok(_) => {
                        let sentences = session.sentences_for(index).map(|s| s.len()).unwrap_or(0);
                        println!("  ✓ 章节 [{}] {} 字节, {} 句", index, size, sentences);
                    }
                    Err(rejection) => println!("  ✗ 章节 [{}] 被拒绝: {:?}", index, rejection),
                }
            }
            IngestEvent::Record(StreamRecord::Error { message }) => {
                println!("  ✗ 服务器错误: {}", message);
            }
            IngestEvent::Malformed { line, error } => {
                let preview: String = line.chars().take(60).collect();
                println!("  ? 无法解析: {} ({})", preview, error);
            }
        }
    }

    println!("\n=== 目录 ===");
    for entry in session.toc_entries() {
        let marker = if entry.unprocessed { "…" } else { "✓" };
        println!("  {} {:>3}. {}", marker, entry.index + 1, entry.title);
    }
    println!(
        "\n共 {} 行, 收到 {}/{} 章",
        ingestor.lines_seen(),
        session.arrived_count(),
        session.total_chapters()
    );
}

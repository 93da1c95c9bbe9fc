use std::process;

use clap::Parser;
use log::info;

use library_reader_lib::api::LibraryFilters;
use library_reader_lib::library::{upload, AuthSession, LibraryBrowser, MetadataForm, PageOutcome};
use library_reader_lib::reader::text_index::TextIndexer;
use library_reader_lib::reader::{Effect, ReaderController, ReaderEvent, ReaderRuntime, ReaderView};
use library_reader_lib::{
    CliArgs, Command, LibraryClient, PreferenceStore, Preferences, ReaderConfig, ReaderError, Result,
};

/// 终端界面：打印书籍信息、目录和章节纯文本
struct TerminalView {
    indexer: TextIndexer,
}

impl TerminalView {
    fn new() -> Self {
        Self {
            indexer: TextIndexer::new(),
        }
    }
}

impl ReaderView for TerminalView {
    fn apply(&mut self, effect: &Effect) {
        match effect {
            Effect::SetBookInfo { title, author } => println!("{} - {}\n", title, author),
            Effect::RenderToc(entries) => {
                for entry in entries {
                    println!("  {:>3}. {}", entry.index + 1, entry.title);
                }
            }
            Effect::RenderChapter(view) => {
                let title = view.title.as_deref().unwrap_or("");
                println!("\n== {} [{}] ==\n", title, view.position_label);
                println!("{}", self.indexer.extract_text(&view.html));
            }
            Effect::ShowError(html) => eprintln!("{}", self.indexer.extract_text(html)),
            _ => {}
        }
    }
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = CliArgs::parse();
    if let Err(e) = run(args).await {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

async fn run(args: CliArgs) -> Result<()> {
    let config = ReaderConfig::from_args(&args)?;
    let mut preferences = Preferences::load(PreferenceStore::open(config.preferences_path())?)?;
    let client = LibraryClient::new(&config.base_url)?;

    let mut auth = AuthSession::new();
    if let (Some(username), Some(password)) = (&args.username, &args.password) {
        auth.login(&client, username, password, false).await?;
    }

    match args.command {
        Command::Read { filename, chapter } => {
            let controller = ReaderController::new(&filename, &config, preferences.font_size(), false);
            let mut runtime =
                ReaderRuntime::new(client, controller, TerminalView::new()).with_preferences(preferences);
            runtime.load().await;

            if runtime.controller().is_stream_failed() {
                runtime.shutdown().await;
                return Err(ReaderError::Stream(format!("无法加载 {}", filename)));
            }
            // 章节号与目录打印一致，从 1 开始
            if let Some(chapter) = chapter {
                runtime.dispatch(ReaderEvent::JumpTo(chapter.saturating_sub(1)));
            }
            runtime.shutdown().await;
        }
        Command::Library {
            title,
            author,
            genre,
            tags,
            offset,
        } => {
            let filters = LibraryFilters {
                title: title.unwrap_or_default(),
                author: author.unwrap_or_default(),
                genre: genre.unwrap_or_default(),
                tags: tags
                    .map(|t| t.split(',').map(String::from).collect())
                    .unwrap_or_default(),
            };

            let mut browser = LibraryBrowser::new(&config);
            browser.apply_filters(filters);
            browser.start_at(offset);
            match browser.load_next(&client).await? {
                Some(PageOutcome::Empty) => println!("No books match the current filters."),
                Some(PageOutcome::Exhausted) => println!("No more books."),
                _ => {
                    for entry in browser.entries() {
                        println!("{}  {}", entry.filename, client.download_url(&entry.filename)?);
                    }
                }
            }
        }
        Command::Bookmark { filename } => match client.get_bookmark(&filename).await? {
            // 章节号与目录打印一致，从 1 开始
            Some(bookmark) => println!(
                "Chapter {}, {:.0}%",
                bookmark.chapter_index + 1,
                bookmark.position * 100.0
            ),
            None => println!("No bookmark saved."),
        },
        Command::Metadata { filename } => {
            let form = MetadataForm::load(&client, &filename, auth.viewer()).await?;
            for field in form.fields() {
                println!("{}: {}", field.label, field.value);
            }
            println!("Tags: {}", form.tags().tags().join(", "));
            if let Some(created_at) = form.created_at() {
                println!("Added: {}", created_at);
            }
        }
        Command::Upload { path } => {
            let form = upload::upload_file(&client, &path, config.max_upload_bytes).await?;
            form.save(&client).await?;
            println!("Added {} ({} - {})", form.new_filename, form.title, form.author);
        }
        Command::Font { delta } => {
            let size = preferences.adjust_font_size(delta)?;
            println!("Font size: {}px", size);
        }
        Command::DarkMode => {
            let enabled = preferences.toggle_dark_mode()?;
            info!("夜间模式: {}", enabled);
            println!(
                "Dark mode {} ({})",
                if enabled { "enabled" } else { "disabled" },
                preferences.dark_mode_icon()
            );
        }
    }

    Ok(())
}

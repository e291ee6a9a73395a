//! 活动相册 CLI 客户端
//!
//! 非交互式 CLI：每次运行先恢复本地会话，再执行一个子命令。
//! 后端地址与 key 可以由命令行参数或环境变量（SUPABASE_URL / SUPABASE_ANON_KEY）给出。

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use event_photos_sdk::gallery::photo::PhotoUploader;
use event_photos_sdk::gallery::views::{Cover, GridTile, ADD_PHOTOS_LABEL};
use event_photos_sdk::{
    AccessForm, ClientConfig, Dashboard, Event, EventListener, EventPhotosClient, GuestGrid,
    Header, LocalImage, Photo, PhotoListener, Session,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::{error, info, warn};

/// 活动相册 CLI 客户端
#[derive(Parser, Debug)]
#[command(name = "event-photos-cli")]
#[command(about = "活动相册 CLI - 创建 / 加入活动，上传和下载照片", long_about = None)]
struct Args {
    /// 后端地址（默认读取 SUPABASE_URL）
    #[arg(long)]
    url: Option<String>,

    /// 匿名 API key（默认读取 SUPABASE_ANON_KEY）
    #[arg(long)]
    key: Option<String>,

    /// 本地会话数据库（默认读取 EVENT_PHOTOS_DB_URL）
    #[arg(long)]
    db: Option<String>,

    /// 日志级别（默认: info,event_photos_sdk=debug）
    #[arg(long, default_value = "info,event_photos_sdk=debug")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 创建活动并以组织者身份进入
    Create { name: String },
    /// 加入活动（访客用 --name，组织者用 --organizer-code）
    Join {
        code: String,
        #[arg(long, conflicts_with = "organizer_code", required_unless_present = "organizer_code")]
        name: Option<String>,
        #[arg(long)]
        organizer_code: Option<String>,
    },
    /// 显示当前活动
    Status,
    /// 上传照片（仅接受 JPEG / PNG）
    Upload {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// 更换封面（仅组织者）
    Cover { file: PathBuf },
    /// 打包下载全部照片（仅组织者）
    Download {
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },
    /// 监听实时变更
    Watch {
        /// 运行时长（秒），0 表示持续运行
        #[arg(short, long, default_value = "0")]
        duration: u64,
    },
    /// 离开当前活动
    Leave,
}

/// 初始化日志（同时输出到 stdout 和文件）
fn init_logger(log_level: &str) -> Result<()> {
    use std::fs::OpenOptions;
    use std::io;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    // 优先使用环境变量 RUST_LOG（如果设置了），否则使用命令行参数
    let filter_layer =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    // 创建日志文件（追加模式）
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open("event-photos.log")
        .context("无法创建日志文件 event-photos.log")?;

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stdout)
        .with_file(true)
        .with_line_number(true)
        .with_target(false)
        .with_ansi(true);

    // 文件不需要颜色
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_file(true)
        .with_line_number(true)
        .with_target(false)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    info!("[CLI] 📝 日志已同时输出到控制台和文件: event-photos.log");
    Ok(())
}

/// 设置监听器（输出所有推送）
fn setup_listeners(client: &EventPhotosClient) {
    struct CliPhotoListener;
    #[async_trait::async_trait]
    impl PhotoListener for CliPhotoListener {
        async fn on_photo_added(&self, photo: Photo) {
            info!("[CLI/Photo] 📥 新照片: {} (By: {})", photo.id, photo.user_name);
        }

        async fn on_photo_removed(&self, photo_id: String) {
            info!("[CLI/Photo] 🗑️ 照片删除: {}", photo_id);
        }

        async fn on_photo_list_changed(&self, photos: Vec<Photo>) {
            info!("[CLI/Photo] 📷 照片列表刷新: {} 张", photos.len());
        }
    }
    client.set_photo_listener(Arc::new(CliPhotoListener));

    struct CliEventListener;
    #[async_trait::async_trait]
    impl EventListener for CliEventListener {
        async fn on_event_updated(&self, event: Event) {
            info!(
                "[CLI/Event] 🔔 活动更新: {} | 封面: {}",
                event.name,
                event.cover_image.as_deref().unwrap_or("-")
            );
        }

        async fn on_session_changed(&self, event: Option<Event>) {
            match event {
                Some(event) => info!("[CLI/Event] ✅ 进入活动: {}", event.name),
                None => info!("[CLI/Event] 👋 已离开活动"),
            }
        }
    }
    client.set_event_listener(Arc::new(CliEventListener));
}

fn print_status(client: &EventPhotosClient) {
    let session = client.session();
    let Some(header) = Header::build(&session) else {
        info!("[CLI] 当前没有加入任何活动");
        return;
    };

    info!("[CLI] ==== {} ====", header.title);
    match &header.cover {
        Cover::Image(url) => info!("[CLI] 封面: {}", url),
        Cover::Placeholder => info!("[CLI] 封面: (未设置)"),
    }
    info!("[CLI] {}", header.greeting);

    let photos = client.photos();
    if let (true, Some(event)) = (session.is_organizer(), session.event()) {
        let dashboard = Dashboard::build(event, &photos);
        info!("[CLI] 活动码: {}", dashboard.event_code);
        info!("[CLI] 组织者口令: {}", dashboard.organizer_code);
        info!("[CLI] {}", dashboard.photo_count_label);
        for tile in &dashboard.tiles {
            info!("[CLI]   - {} | {} | {}", tile.id, tile.caption(), tile.url);
        }
        return;
    }

    let grid = GuestGrid::build(&photos);
    if let Some(message) = grid.empty_message {
        info!("[CLI] {}", message);
    }
    for tile in &grid.tiles {
        match tile {
            GridTile::AddPhotos => info!("[CLI]   [+] {}", ADD_PHOTOS_LABEL),
            GridTile::Photo(photo) => info!("[CLI]   - {} | {}", photo.alt, photo.url),
        }
    }
}

async fn upload(client: &EventPhotosClient, files: Vec<PathBuf>) -> Result<()> {
    let mut images = Vec::with_capacity(files.len());
    for path in &files {
        images.push(LocalImage::from_path(path).await?);
    }

    let mut uploader = PhotoUploader::new();
    let total = images.len();
    let accepted = uploader.select(images);
    if accepted < total {
        warn!("[CLI] ⚠️ 已忽略 {} 个非 JPEG / PNG 文件", total - accepted);
    }
    let Some(label) = uploader.upload_label() else {
        warn!("[CLI] 没有可上传的照片");
        return Ok(());
    };
    info!("[CLI] 📤 {}", label);

    let report = client.upload_photos(uploader.take()).await?;
    for path in report.orphaned_paths() {
        warn!("[CLI] ⚠️ 存储中遗留对象: {}", path);
    }
    report.ensure_success()?;
    info!("[CLI] ✅ 已上传 {} 张照片", report.uploaded().len());
    Ok(())
}

async fn run(client: &EventPhotosClient, command: Command) -> Result<()> {
    match command {
        Command::Create { name } => {
            let event = client.create_event(&name).await?;
            info!("[CLI] ✨ 活动已创建: {}", event.name);
            info!("[CLI] 活动码（分享给来宾）: {}", event.code);
            info!("[CLI] 组织者口令（请妥善保存）: {}", event.organizer_code);
        }
        Command::Join {
            code,
            name,
            organizer_code,
        } => {
            let form = match (name, organizer_code) {
                (_, Some(organizer_code)) => AccessForm::organizer(code, organizer_code),
                (Some(name), None) => AccessForm::guest(code, name),
                (None, None) => anyhow::bail!("需要 --name 或 --organizer-code"),
            };
            client.join_form(&form).await?;
            print_status(client);
        }
        Command::Status => print_status(client),
        Command::Upload { files } => upload(client, files).await?,
        Command::Cover { file } => {
            let image = LocalImage::from_path(&file).await?;
            match client.update_cover_image(image).await? {
                Some(event) => info!(
                    "[CLI] 🖼️ 封面已更新: {}",
                    event.cover_image.as_deref().unwrap_or("-")
                ),
                None => warn!("[CLI] 只有组织者可以更换封面"),
            }
        }
        Command::Download { out } => {
            let report = client.download_all(&out).await?;
            info!(
                "[CLI] 📦 已保存 {} ({} 张, 跳过 {})",
                report.path.display(),
                report.entries.len(),
                report.skipped.len()
            );
        }
        Command::Watch { duration } => {
            if !client.session().is_joined() {
                warn!("[CLI] 当前没有加入任何活动");
                return Ok(());
            }
            info!("[CLI] 📥 开始监听变更...");
            if duration > 0 {
                info!("[CLI] ⏰ {} 秒后自动退出", duration);
                sleep(Duration::from_secs(duration)).await;
            } else {
                info!("[CLI] ⏰ 持续运行中，按 Ctrl+C 退出");
                tokio::signal::ctrl_c().await.context("等待 Ctrl+C 失败")?;
            }
        }
        Command::Leave => client.leave().await?,
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logger(&args.log_level)?;
    info!("[CLI] 🚀 活动相册 CLI");

    let mut config = ClientConfig::from_env_or(args.url, args.key)?;
    if let Some(db) = args.db {
        config.db_url = db;
    }
    info!("[CLI] 后端: {}", config.api_base_url);

    let client = EventPhotosClient::open(config).await?;
    setup_listeners(&client);

    match client.resume().await? {
        Some(Session::Joined {
            event, user_name, ..
        }) => info!("[CLI] 🔄 已恢复会话: {} ({})", event.name, user_name),
        _ => info!("[CLI] 没有保存的会话"),
    }

    let result = run(&client, args.command).await;
    client.shutdown().await;

    if let Err(e) = &result {
        error!("[CLI] ❌ {}", e);
    }
    result
}

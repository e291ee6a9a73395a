//! 打包下载
//!
//! 并发拉取全部照片，失败的跳过，成功的写入一个 deflate 压缩的 zip。

use crate::gallery::backend::GalleryBackend;
use crate::gallery::event::Event;
use crate::gallery::photo::Photo;
use crate::gallery::serialization::{content_subtype, file_extension, sanitize_file_name};
use anyhow::{Context, Result};
use futures_util::future::join_all;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use zip::write::SimpleFileOptions;
use zip::CompressionMethod;

/// 打包结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveReport {
    pub path: PathBuf,
    /// 写入的条目名，顺序与照片列表一致
    pub entries: Vec<String>,
    /// 拉取失败而跳过的照片 id
    pub skipped: Vec<String>,
}

/// `<活动名>-photos.zip`
pub fn archive_file_name(event_name: &str) -> String {
    sanitize_file_name(&format!("{}-photos.zip", event_name))
}

/// 条目名：`<上传者>-<照片id>.<扩展名>`
///
/// 扩展名取 Content-Type 的子类型，缺失时取地址里的扩展名，再不行用 `bin`。
pub fn entry_name(photo: &Photo, content_type: Option<&str>) -> String {
    let ext = content_type
        .and_then(content_subtype)
        .or_else(|| url_extension(&photo.url))
        .unwrap_or_else(|| "bin".to_string());
    sanitize_file_name(&format!("{}-{}.{}", photo.user_name, photo.id, ext))
}

fn url_extension(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next()?;
    let last = path.rsplit('/').next()?;
    file_extension(last)
}

pub async fn export_archive(
    backend: &dyn GalleryBackend,
    event: &Event,
    photos: &[Photo],
    out_dir: &Path,
) -> Result<ArchiveReport> {
    info!(
        "[Archive] 📦 开始打包: {} ({} 张照片)",
        event.name,
        photos.len()
    );

    let fetches = photos.iter().map(|photo| async move {
        let result = backend.fetch_object(&photo.url).await;
        (photo, result)
    });
    let results = join_all(fetches).await;

    let mut files = Vec::with_capacity(results.len());
    let mut skipped = Vec::new();
    for (photo, result) in results {
        match result {
            Ok(object) => {
                let name = entry_name(photo, object.content_type.as_deref());
                debug!("[Archive]   {} ({} 字节)", name, object.bytes.len());
                files.push((name, object.bytes));
            }
            Err(e) => {
                warn!("[Archive] ⚠️ 跳过照片 {}: {:#}", photo.id, e);
                skipped.push(photo.id.clone());
            }
        }
    }

    tokio::fs::create_dir_all(out_dir)
        .await
        .with_context(|| format!("创建目录失败: {}", out_dir.display()))?;
    let path = out_dir.join(archive_file_name(&event.name));
    let entries: Vec<String> = files.iter().map(|(name, _)| name.clone()).collect();

    let target = path.clone();
    tokio::task::spawn_blocking(move || write_zip(&target, files))
        .await
        .context("打包任务异常退出")??;

    info!(
        "[Archive] ✅ 已写入 {} ({} 个条目, 跳过 {})",
        path.display(),
        entries.len(),
        skipped.len()
    );
    Ok(ArchiveReport {
        path,
        entries,
        skipped,
    })
}

fn write_zip(path: &Path, files: Vec<(String, Vec<u8>)>) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("创建文件失败: {}", path.display()))?;
    let mut zip = zip::ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for (name, bytes) in files {
        zip.start_file(name.as_str(), options)
            .with_context(|| format!("写入条目失败: {}", name))?;
        zip.write_all(&bytes)?;
    }
    zip.finish().context("写入 zip 失败")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gallery::testing::{sample_event, sample_photo, MemoryBackend};
    use std::io::Read;

    #[test]
    fn entry_name_prefers_content_type() {
        let photo = sample_photo("p1", "e1", "Al", 0);
        assert_eq!(entry_name(&photo, Some("image/png")), "Al-p1.png");
        assert_eq!(entry_name(&photo, None), "Al-p1.jpg");

        let mut bare = photo.clone();
        bare.url = "https://cdn/object?token=1".into();
        assert_eq!(entry_name(&bare, None), "Al-p1.bin");

        let mut odd = photo;
        odd.user_name = "a/b".into();
        assert_eq!(entry_name(&odd, Some("image/jpeg")), "a_b-p1.jpeg");
    }

    #[tokio::test]
    async fn failed_fetches_are_skipped() {
        let backend = MemoryBackend::new();
        let ok = sample_photo("p1", "e1", "Al", 0);
        let broken = sample_photo("p2", "e1", "Bo", 1);
        backend.put_object("photos", "e1/p1.jpg", b"jpeg-bytes", "image/jpeg");
        backend.fail_fetch(&broken.url);

        let dir = tempfile::tempdir().unwrap();
        let report = export_archive(
            &backend,
            &sample_event("e1", "ABC123"),
            &[ok, broken],
            dir.path(),
        )
        .await
        .unwrap();

        assert_eq!(report.path, dir.path().join("Wedding-photos.zip"));
        assert_eq!(report.entries, vec!["Al-p1.jpeg".to_string()]);
        assert_eq!(report.skipped, vec!["p2".to_string()]);

        let file = std::fs::File::open(&report.path).unwrap();
        let mut archive = zip::ZipArchive::new(file).unwrap();
        assert_eq!(archive.len(), 1);
        let mut entry = archive.by_name("Al-p1.jpeg").unwrap();
        let mut content = Vec::new();
        entry.read_to_end(&mut content).unwrap();
        assert_eq!(content, b"jpeg-bytes");
    }

    #[tokio::test]
    async fn empty_archive_is_still_written() {
        let backend = MemoryBackend::new();
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("downloads");
        let report = export_archive(&backend, &sample_event("e1", "ABC123"), &[], &out)
            .await
            .unwrap();
        assert!(report.path.exists());
        assert!(report.entries.is_empty());
    }
}

use anyhow::{Context, Result};
use colored::Colorize;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use crate::extract::{AttachmentRef, ContentEntry};
use crate::fetch::Transport;
use crate::sanitize::{extract_clean_filename, safe_filepath};

/// Outcome of a download pass.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub downloaded: usize,
    pub skipped: usize,
    pub descriptions: usize,
    /// Greatest day among the processed attachments.
    pub latest_day: Option<String>,
}

/// Writes entries into one output directory, skipping files already there.
pub struct Downloader<'a> {
    transport: &'a dyn Transport,
    dest: &'a Path,
}

impl<'a> Downloader<'a> {
    pub fn new(transport: &'a dyn Transport, dest: &'a Path) -> Self {
        Self { transport, dest }
    }

    /// Download every entry in order. `total` is only used for progress lines.
    ///
    /// The first failing request or write aborts the pass.
    pub fn download_all(&self, entries: &[ContentEntry], total: usize) -> Result<SyncReport> {
        let mut report = SyncReport::default();
        let mut index = 0;

        for entry in entries {
            if self.write_description(entry)? {
                report.descriptions += 1;
            }

            for attachment in &entry.attachments {
                index += 1;
                if report
                    .latest_day
                    .as_deref()
                    .is_none_or(|latest| entry.day.as_str() > latest)
                {
                    report.latest_day = Some(entry.day.clone());
                }

                let path = self.attachment_path(entry, attachment);
                if path.exists() {
                    tracing::debug!(path = %path.display(), "already downloaded");
                    report.skipped += 1;
                    continue;
                }

                println!(
                    "Downloading {}/{} on {}: {}",
                    index.to_string().bold(),
                    total,
                    entry.day,
                    extract_clean_filename(&attachment.name)
                );
                println!("Saving to: {}", display_name(&path).blue());

                let bytes = self.transport.get_bytes(&attachment.url)?;
                write_file(&path, &bytes)?;
                report.downloaded += 1;
            }
        }

        Ok(report)
    }

    fn attachment_path(&self, entry: &ContentEntry, attachment: &AttachmentRef) -> PathBuf {
        let raw = format!(
            "{}_{}_{}_{}",
            entry.day, entry.group, entry.base_name, attachment.name
        );
        safe_filepath(self.dest, &raw)
    }

    /// Returns whether a new description file was written.
    fn write_description(&self, entry: &ContentEntry) -> Result<bool> {
        let raw = format!(
            "{}_{}_{}_description.txt",
            entry.day, entry.group, entry.base_name
        );
        let path = safe_filepath(self.dest, &raw);
        if path.exists() {
            return Ok(false);
        }

        let body = entry.description.as_deref().unwrap_or_default();
        fs::write(&path, body)
            .with_context(|| format!("Failed to write description '{}'", path.display()))?;
        Ok(true)
    }
}

/// Write through a `.part` sibling so a crash never leaves a truncated file
/// that a later run would mistake for a finished download.
fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut part = OsString::from(path.as_os_str());
    part.push(".part");
    let part = PathBuf::from(part);

    fs::write(&part, bytes).with_context(|| format!("Failed to write '{}'", part.display()))?;
    fs::rename(&part, path)
        .with_context(|| format!("Failed to move download into '{}'", path.display()))?;
    Ok(())
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::fake::FakeTransport;

    const PHOTO_URL: &str = "https://photos.example.com/2023/post-1/2023-05-01/ab12/photo.jpg";
    const VIDEO_URL: &str = "https://photos.example.com/2023/post-2/2023-06-02/cd34/clip.mp4";

    fn entries() -> Vec<ContentEntry> {
        vec![
            ContentEntry {
                description: Some("Field trip!".into()),
                group: "Ms._Lee's_Class".into(),
                base_name: "post-1".into(),
                day: "2023-05-01".into(),
                attachments: vec![AttachmentRef {
                    name: "ab12_photo.jpg".into(),
                    url: PHOTO_URL.into(),
                }],
            },
            ContentEntry {
                description: None,
                group: "Art".into(),
                base_name: "post-2".into(),
                day: "2023-06-02".into(),
                attachments: vec![AttachmentRef {
                    name: "cd34_clip.mp4".into(),
                    url: VIDEO_URL.into(),
                }],
            },
        ]
    }

    fn transport() -> FakeTransport {
        FakeTransport::default()
            .with_file(PHOTO_URL, b"jpeg bytes")
            .with_file(VIDEO_URL, b"mp4 bytes")
    }

    #[test]
    fn writes_descriptions_and_attachments() {
        let dir = tempfile::tempdir().unwrap();
        let transport = transport();

        let report = Downloader::new(&transport, dir.path())
            .download_all(&entries(), 2)
            .unwrap();

        assert_eq!(
            report,
            SyncReport {
                downloaded: 2,
                skipped: 0,
                descriptions: 2,
                latest_day: Some("2023-06-02".into()),
            }
        );

        let photo = dir
            .path()
            .join("2023-05-01_Ms._Lee's_Class_post-1_ab12_photo.jpg");
        assert_eq!(fs::read(photo).unwrap(), b"jpeg bytes");

        let description = dir
            .path()
            .join("2023-05-01_Ms._Lee's_Class_post-1_description.txt");
        assert_eq!(fs::read_to_string(description).unwrap(), "Field trip!");

        let empty = dir.path().join("2023-06-02_Art_post-2_description.txt");
        assert_eq!(fs::read_to_string(empty).unwrap(), "");

        let leftovers = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".part"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn rerun_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let transport = transport();
        let downloader = Downloader::new(&transport, dir.path());

        downloader.download_all(&entries(), 2).unwrap();
        assert_eq!(transport.request_count(), 2);

        let photo = dir
            .path()
            .join("2023-05-01_Ms._Lee's_Class_post-1_ab12_photo.jpg");
        fs::write(&photo, b"edited locally").unwrap();

        let report = downloader.download_all(&entries(), 2).unwrap();

        assert_eq!(transport.request_count(), 2);
        assert_eq!(report.downloaded, 0);
        assert_eq!(report.skipped, 2);
        assert_eq!(report.descriptions, 0);
        assert_eq!(report.latest_day.as_deref(), Some("2023-06-02"));
        assert_eq!(fs::read(photo).unwrap(), b"edited locally");
    }

    #[test]
    fn fetch_failure_aborts_without_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let transport = FakeTransport::default().with_file(PHOTO_URL, b"jpeg bytes");

        let err = Downloader::new(&transport, dir.path())
            .download_all(&entries(), 2)
            .unwrap_err();
        assert!(err.to_string().contains(VIDEO_URL));

        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        assert!(!names.iter().any(|n| n.contains("clip.mp4")));
        assert!(names.iter().any(|n| n.ends_with("photo.jpg")));
    }

    #[test]
    fn long_names_stay_within_bounds() {
        let dir = tempfile::tempdir().unwrap();
        let transport = FakeTransport::default().with_file(PHOTO_URL, b"jpeg bytes");
        let entry = ContentEntry {
            description: None,
            group: "A_very_long_classroom_name_".repeat(8),
            base_name: "post-1".into(),
            day: "2023-05-01".into(),
            attachments: vec![AttachmentRef {
                name: "ab12_photo.jpg".into(),
                url: PHOTO_URL.into(),
            }],
        };

        Downloader::new(&transport, dir.path())
            .download_all(&[entry], 1)
            .unwrap();

        for file in fs::read_dir(dir.path()).unwrap().filter_map(|e| e.ok()) {
            assert!(file.file_name().to_string_lossy().chars().count() <= 100);
        }
    }

    #[test]
    fn nothing_to_download_has_no_latest_day() {
        let dir = tempfile::tempdir().unwrap();
        let transport = FakeTransport::default();

        let report = Downloader::new(&transport, dir.path())
            .download_all(&[], 0)
            .unwrap();

        assert_eq!(report, SyncReport::default());
    }
}

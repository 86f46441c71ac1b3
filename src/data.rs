//! Dictionary download and extraction.
//!
//! Fetches a zip archive of the WNDB distribution from a user supplied URL
//! and extracts the `index.*` and `data.*` files into the dictionary
//! directory. Other archive entries are ignored.

use crate::error::{Result, WnError};
use crate::progress::{ProgressCallback, ProgressUpdate};
use futures::StreamExt;
use log::{debug, info, warn};
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Files the importers read, in import order.
pub const WNDB_FILES: [&str; 8] = [
    "index.noun",
    "index.verb",
    "index.adj",
    "index.adv",
    "data.noun",
    "data.verb",
    "data.adj",
    "data.adv",
];

const ARCHIVE_FILENAME: &str = "wndb-download.zip";

/// WNDB files not present in `dict_dir`.
pub fn missing_dictionary_files(dict_dir: &Path) -> Vec<&'static str> {
    WNDB_FILES
        .into_iter()
        .filter(|name| !dict_dir.join(name).is_file())
        .collect()
}

fn report(reporter: &mut Option<ProgressCallback>, update: ProgressUpdate) {
    if let Some(cb) = reporter.as_mut() {
        cb(update);
    }
}

/// Downloads a file from a URL to a specified path using streaming with progress reporting.
async fn download_file(
    url: &str,
    dest_path: &Path,
    reporter: &mut Option<ProgressCallback>,
) -> Result<u64> {
    let stage_desc = "Downloading dictionary";

    info!("Downloading {} to {:?} (streaming)...", url, dest_path);
    let response = reqwest::get(url).await?.error_for_status()?;
    let total_size = response.content_length();
    report(reporter, ProgressUpdate::new_stage(stage_desc, total_size));

    let mut dest_file = BufWriter::new(File::create(dest_path)?);
    let mut stream = response.bytes_stream();
    let mut downloaded: u64 = 0;

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result?;
        dest_file.write_all(&chunk)?;
        downloaded += chunk.len() as u64;
        report(
            reporter,
            ProgressUpdate::advance(stage_desc, downloaded, total_size, None),
        );
    }
    dest_file.flush()?;

    report(
        reporter,
        ProgressUpdate::advance(
            stage_desc,
            downloaded,
            Some(total_size.unwrap_or(downloaded)),
            Some("Download complete.".to_string()),
        ),
    );
    info!("Downloaded {} bytes.", downloaded);
    Ok(downloaded)
}

/// Extracts the WNDB files of a zip archive into `dict_dir`.
///
/// Entries are matched by file name regardless of the directory they sit in
/// inside the archive. Returns the written paths; fails when the archive does
/// not provide all of [`WNDB_FILES`].
pub fn extract_dictionary_archive(archive_path: &Path, dict_dir: &Path) -> Result<Vec<PathBuf>> {
    info!("Extracting {:?} into {:?}...", archive_path, dict_dir);
    fs::create_dir_all(dict_dir)?;
    let mut archive = zip::ZipArchive::new(BufReader::new(File::open(archive_path)?))?;

    let mut written = Vec::new();
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        if entry.is_dir() {
            continue;
        }
        let Some(name) = entry
            .enclosed_name()
            .and_then(|path| path.file_name().map(|n| n.to_string_lossy().into_owned()))
        else {
            warn!("Skipping archive entry with unsafe path: {}", entry.name());
            continue;
        };
        if !WNDB_FILES.contains(&name.as_str()) {
            debug!("Ignoring archive entry {}", entry.name());
            continue;
        }
        let dest = dict_dir.join(&name);
        let mut out = BufWriter::new(File::create(&dest)?);
        io::copy(&mut entry, &mut out)?;
        out.flush()?;
        written.push(dest);
    }

    let missing = missing_dictionary_files(dict_dir);
    if !missing.is_empty() {
        return Err(WnError::DataFileNotFound(format!(
            "archive is missing {}",
            missing.join(", ")
        )));
    }
    info!("Extracted {} dictionary files.", written.len());
    Ok(written)
}

/// Downloads the archive at `url` and extracts it into `dict_dir`.
///
/// The downloaded archive is removed afterwards, also on failure.
pub async fn download_dictionary(
    url: &str,
    dict_dir: &Path,
    mut reporter: Option<ProgressCallback>,
) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dict_dir)?;
    let archive_path = dict_dir.join(ARCHIVE_FILENAME);
    let _cleanup = scopeguard::guard(archive_path.clone(), |path| {
        if path.exists() {
            if let Err(e) = fs::remove_file(&path) {
                warn!("Failed to remove {:?}: {}", path, e);
            }
        }
    });

    download_file(url, &archive_path, &mut reporter).await?;

    report(
        &mut reporter,
        ProgressUpdate::new_stage("Extracting dictionary", Some(1)),
    );
    let archive = archive_path.clone();
    let target = dict_dir.to_path_buf();
    let written =
        tokio::task::spawn_blocking(move || extract_dictionary_archive(&archive, &target)).await??;
    report(
        &mut reporter,
        ProgressUpdate::advance(
            "Extracting dictionary",
            1,
            Some(1),
            Some(format!("{} files extracted.", written.len())),
        ),
    );
    Ok(written)
}

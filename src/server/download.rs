//! Stem download for HTTP requests

use super::routes::AudioFeaturesRequest;
use crate::error::{Result, StemrhythmError};
use crate::types::Instrument;
use futures::future::try_join_all;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Download the four stems of a request into `dir`, concurrently
///
/// Files land under the standard stem names so `dir` is a complete stem set.
/// The mix is not fetched; nothing downstream reads it.
pub async fn fetch_stems(
    client: &reqwest::Client,
    request: &AudioFeaturesRequest,
    dir: &Path,
) -> Result<()> {
    let downloads = [
        (Instrument::Bass, &request.bass_path),
        (Instrument::Drums, &request.drums_path),
        (Instrument::Other, &request.music_path),
        (Instrument::Vocals, &request.vocals_path),
    ]
    .into_iter()
    .map(|(instrument, url)| download_file(client, url, dir.join(instrument.file_name())));

    try_join_all(downloads).await?;
    Ok(())
}

async fn download_file(client: &reqwest::Client, url: &str, dest: PathBuf) -> Result<()> {
    let download_error = |e: reqwest::Error| StemrhythmError::DownloadError {
        url: url.to_string(),
        reason: e.to_string(),
    };

    let response = client
        .get(url)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(download_error)?;
    let bytes = response.bytes().await.map_err(download_error)?;

    tokio::fs::write(&dest, &bytes)
        .await
        .map_err(|e| StemrhythmError::output_error(&dest, e))?;

    debug!("Downloaded {} ({} bytes) to {}", url, bytes.len(), dest.display());
    Ok(())
}

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::Serialize;

use super::ensure_session;
use crate::api::PortalClient;
use crate::config::Paths;
use crate::output::{attachment_name, attachment_url, write_news_item, WriteOutcome};
use crate::schema::NewsItem;
use crate::transport::Fetch;

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum NewsReport {
    Done(NewsSummary),
    Failed { ok: bool, error: String },
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsSummary {
    pub ok: bool,
    pub news_dir: PathBuf,
    pub written: usize,
    pub updated: usize,
    pub written_files: Vec<PathBuf>,
    pub updated_files: Vec<PathBuf>,
    pub count: usize,
    pub attachments_downloaded: usize,
}

/// Mirrors the whole news feed into the news directory, one file per item,
/// and fetches attachments that are not there yet.
pub async fn run<F: Fetch>(
    client: &mut PortalClient<F>,
    paths: &Paths,
    now: DateTime<Utc>,
) -> anyhow::Result<NewsReport> {
    ensure_session(client).await?;

    let items = match client.get_all_news().await {
        Ok(items) => items,
        Err(e) => {
            return Ok(NewsReport::Failed {
                ok: false,
                error: e.to_string(),
            })
        }
    };
    info!("Fetched {} news items", items.len());
    if let Err(e) = client.save_session() {
        warn!("Could not save the session: {e}");
    }

    fs_err::create_dir_all(&paths.attachments_dir)?;
    fs_err::create_dir_all(&paths.news_dir)?;

    let mut summary = NewsSummary {
        ok: true,
        news_dir: paths.news_dir.clone(),
        count: items.len(),
        ..Default::default()
    };
    for item in &items {
        summary.attachments_downloaded += download_attachments(client, paths, item).await;
    }
    for item in &items {
        match write_news_item(&paths.news_dir, item, now) {
            Ok((path, WriteOutcome::Written)) => {
                summary.written += 1;
                summary.written_files.push(path);
            }
            Ok((path, WriteOutcome::Updated)) => {
                summary.updated += 1;
                summary.updated_files.push(path);
            }
            Ok((_, WriteOutcome::Unchanged)) => {}
            Err(e) => warn!("Could not save a news item: {e:#}"),
        }
    }
    Ok(NewsReport::Done(summary))
}

/// Returns the number of files downloaded.  Failures only skip the file.
async fn download_attachments<F: Fetch>(
    client: &mut PortalClient<F>,
    paths: &Paths,
    item: &NewsItem,
) -> usize {
    let mut downloaded = 0;
    for file in item.attachments() {
        let base_url = &client.portal().base_url;
        let (Some(url), Some(name)) = (
            attachment_url(file, base_url),
            attachment_name(file, base_url),
        ) else {
            debug!("Skipping an attachment without a location: {file}");
            continue;
        };
        let target = paths.attachments_dir.join(&name);
        if target.exists() {
            continue;
        }
        let response = match client.download(url).await {
            Ok(response) if response.status.is_success() => response,
            Ok(response) => {
                warn!("Could not download {name}: {}", response.status);
                continue;
            }
            Err(e) => {
                warn!("Could not download {name}: {e}");
                continue;
            }
        };
        match fs_err::write(&target, response.into_bytes()) {
            Ok(()) => {
                debug!("Downloaded {target:?}");
                downloaded += 1;
            }
            Err(e) => warn!("{e}"),
        }
    }
    downloaded
}

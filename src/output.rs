use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use url::Url;
use vklass_utils::fs_json_util::{write_atomic, write_json_pretty};

use crate::schema::{scalar, NewsItem};

const NEWS_ID_KEYS: [&str; 5] = ["fileName", "id", "articleId", "guid", "uuid"];
const NEWS_DATE_KEYS: [&str; 5] = ["publishDate", "publishedAt", "createdAt", "date", "publish_date"];
const MAX_ID_LEN: usize = 64;
const SHORT_HASH_LEN: usize = 12;

/// Writes `data` to `<dir>/<YYYY-MM-DD>T<HHMM>.json`.
pub fn write_timestamped<T: Serialize>(
    dir: &Path,
    data: &T,
    now: DateTime<Utc>,
) -> anyhow::Result<PathBuf> {
    fs_err::create_dir_all(dir)?;
    let path = dir.join(format!("{}.json", now.format("%Y-%m-%dT%H%M")));
    write_json_pretty(&path, data).with_context(|| format!("While writing {path:?}"))?;
    Ok(path)
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum WriteOutcome {
    Written,
    Updated,
    Unchanged,
}

/// `<YYYY-MM-DD>-<id>.json`, dated by publication when the item says so.
pub fn news_file_name(item: &NewsItem, now: DateTime<Utc>) -> String {
    let id = NEWS_ID_KEYS
        .iter()
        .find_map(|key| item.scalar(key))
        .unwrap_or_else(|| short_hash(item));
    let date = NEWS_DATE_KEYS
        .iter()
        .find_map(|key| item.scalar(key))
        .and_then(|raw| parse_date(&raw))
        .unwrap_or_else(|| now.date_naive());
    format!("{}-{}.json", date.format("%Y-%m-%d"), safe_id(&id))
}

/// Stores `item` under [`news_file_name`] unless an identical file is already there.
pub fn write_news_item(
    dir: &Path,
    item: &NewsItem,
    now: DateTime<Utc>,
) -> anyhow::Result<(PathBuf, WriteOutcome)> {
    let path = dir.join(news_file_name(item, now));
    let content = serde_json::to_string_pretty(item)?;
    let outcome = match fs_err::read_to_string(&path) {
        Ok(existing) if existing == content => return Ok((path, WriteOutcome::Unchanged)),
        Ok(_) => WriteOutcome::Updated,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => WriteOutcome::Written,
        Err(e) => return Err(e.into()),
    };
    write_atomic(&path, &content)?;
    Ok((path, outcome))
}

/// File name to store an attachment under.
pub fn attachment_name(file: &Value, base_url: &Url) -> Option<String> {
    let name = ["fileName", "nameWithExtension", "name"]
        .iter()
        .find_map(|key| scalar(file, key))
        .or_else(|| {
            let id = scalar(file, "id")?;
            Some(match scalar(file, "extension") {
                Some(extension) => format!("{id}.{extension}"),
                None => id,
            })
        })
        .or_else(|| {
            attachment_url(file, base_url)?
                .path_segments()?
                .last()
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
        })?;
    // Never let a name escape the attachments directory
    let name = name.replace(['/', '\\'], "-");
    (name != "." && name != "..").then_some(name)
}

pub fn attachment_url(file: &Value, base_url: &Url) -> Option<Url> {
    let raw = ["url", "fileUrl", "path"]
        .iter()
        .find_map(|key| scalar(file, key))?;
    base_url.join(&raw).ok()
}

fn short_hash(item: &NewsItem) -> String {
    let digest = Sha256::digest(item.to_string().as_bytes());
    let mut hash = hex::encode(digest);
    hash.truncate(SHORT_HASH_LEN);
    hash
}

fn safe_id(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '-'
            }
        })
        .take(MAX_ID_LEN)
        .collect()
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc).date_naive());
    }
    [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M",
    ]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|dt| dt.date())
        .or_else(|| NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok())
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, TimeZone, Utc};
    use serde_json::json;
    use url::Url;

    use super::{
        attachment_name, attachment_url, news_file_name, write_news_item, write_timestamped,
        WriteOutcome,
    };
    use crate::schema::NewsItem;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 18, 16, 24, 59).unwrap()
    }

    fn base() -> Url {
        Url::parse("https://custodian.vklass.se/").unwrap()
    }

    #[test]
    fn timestamped_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("calendar");
        let path = write_timestamped(&target, &json!([{ "title": "Idrott" }]), now()).unwrap();
        assert_eq!(path, target.join("2026-02-18T1624.json"));
        let written: serde_json::Value =
            serde_json::from_str(&fs_err::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written, json!([{ "title": "Idrott" }]));
    }

    #[test]
    fn news_file_name_prefers_explicit_ids() {
        let item = NewsItem::from(json!({
            "id": 17,
            "articleId": "ignored",
            "publishDate": "2026-01-05T08:30:00+01:00",
        }));
        assert_eq!(news_file_name(&item, now()), "2026-01-05-17.json");

        let item = NewsItem::from(json!({
            "fileName": "Veckobrev v.3/åk 4",
            "createdAt": "2026-01-19T10:00:00",
        }));
        assert_eq!(news_file_name(&item, now()), "2026-01-19-Veckobrev-v.3--k-4.json");
    }

    #[test]
    fn news_file_name_fallbacks() {
        let item = NewsItem::from(json!({ "title": "Utan id", "date": "not a date" }));
        let name = news_file_name(&item, now());
        assert!(name.starts_with("2026-02-18-"), "{name}");
        let hash = name.trim_start_matches("2026-02-18-").trim_end_matches(".json");
        assert_eq!(hash.len(), 12);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(news_file_name(&item, now()), name);

        let item = NewsItem::from(json!({ "guid": "x".repeat(100), "date": "2025-12-24" }));
        assert_eq!(
            news_file_name(&item, now()),
            format!("2025-12-24-{}.json", "x".repeat(64))
        );
    }

    #[test]
    fn news_items_written_updated_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let item = NewsItem::from(json!({ "id": "a1", "title": "Första" }));

        let (path, outcome) = write_news_item(dir.path(), &item, now()).unwrap();
        assert_eq!(outcome, WriteOutcome::Written);
        assert_eq!(path, dir.path().join("2026-02-18-a1.json"));

        let (_, outcome) = write_news_item(dir.path(), &item, now()).unwrap();
        assert_eq!(outcome, WriteOutcome::Unchanged);

        let item = NewsItem::from(json!({ "id": "a1", "title": "Ändrad" }));
        let (_, outcome) = write_news_item(dir.path(), &item, now()).unwrap();
        assert_eq!(outcome, WriteOutcome::Updated);
        assert!(fs_err::read_to_string(&path).unwrap().contains("Ändrad"));
        assert_eq!(fs_err::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn attachment_names() {
        let cases = [
            (json!({ "fileName": "abc.pdf", "name": "Brev.pdf" }), Some("abc.pdf")),
            (json!({ "nameWithExtension": "Brev.pdf", "name": "Brev" }), Some("Brev.pdf")),
            (json!({ "id": 9, "extension": "docx" }), Some("9.docx")),
            (json!({ "id": 9 }), Some("9")),
            (json!({ "url": "/Files/Download/lunch.png?v=2" }), Some("lunch.png")),
            (json!({ "name": "../../etc/passwd" }), Some("..-..-etc-passwd")),
            (json!({ "url": "https://custodian.vklass.se/" }), None),
            (json!({}), None),
        ];
        for (file, expected) in cases {
            assert_eq!(attachment_name(&file, &base()).as_deref(), expected, "{file}");
        }
    }

    #[test]
    fn attachment_urls() {
        assert_eq!(
            attachment_url(&json!({ "fileUrl": "/Files/1" }), &base()).unwrap().as_str(),
            "https://custodian.vklass.se/Files/1"
        );
        assert_eq!(
            attachment_url(&json!({ "url": "https://cdn.example.com/a.pdf", "path": "/b" }), &base())
                .unwrap()
                .as_str(),
            "https://cdn.example.com/a.pdf"
        );
        assert_eq!(attachment_url(&json!({ "name": "a" }), &base()), None);
    }
}

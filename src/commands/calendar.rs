use std::path::PathBuf;

use anyhow::bail;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use log::{info, warn};
use serde::Serialize;

use super::ensure_session;
use crate::api::PortalClient;
use crate::config::{Config, Paths};
use crate::output::write_timestamped;
use crate::transport::Fetch;

const WINDOW_DAYS: i64 = 7;

#[derive(Debug, Serialize)]
pub struct CalendarReport {
    pub output: PathBuf,
    pub count: usize,
}

/// Saves the coming week of events for every known student.
pub async fn run<F: Fetch>(
    client: &mut PortalClient<F>,
    paths: &Paths,
    config: &Config,
    now: DateTime<Utc>,
) -> anyhow::Result<CalendarReport> {
    ensure_session(client).await?;

    let mut student_ids = config
        .students
        .as_ref()
        .map(|students| students.ids())
        .unwrap_or_default();
    if student_ids.is_empty() {
        info!("No students in the configuration; discovering them.");
        student_ids = client.discover_students().await?.ids().cloned().collect();
    }
    if student_ids.is_empty() {
        bail!("No student IDs available");
    }

    let start = now.to_rfc3339_opts(SecondsFormat::Millis, true);
    let end = (now + Duration::days(WINDOW_DAYS)).to_rfc3339_opts(SecondsFormat::Millis, true);
    let events = client
        .get_calendar_events(&student_ids, &start, &end)
        .await?;
    if let Err(e) = client.save_session() {
        warn!("Could not save the session: {e}");
    }

    let output = write_timestamped(&paths.calendar_dir, &events, now)?;
    info!("Saved {} events to {output:?}", events.len());
    Ok(CalendarReport {
        output,
        count: events.len(),
    })
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::run;
    use crate::commands::test_util::setup;
    use crate::config::{Config, Students};
    use crate::schema::StudentId;
    use crate::transport::fake::{html, json, FakePortal};

    fn body_pairs(body: &str) -> Vec<(String, String)> {
        url::form_urlencoded::parse(body.as_bytes())
            .into_owned()
            .collect()
    }

    #[tokio::test]
    async fn ids_from_configuration() {
        let now = Utc.with_ymd_and_hms(2026, 10, 16, 6, 5, 0).unwrap();
        let fake = FakePortal::new();
        fake.push(json(r#"[{"title":"Idrott"}]"#));
        let (mut client, paths, _dir) = setup(fake, true);
        let config = Config {
            students: Some(Students::Ids(vec![
                StudentId::from("111111"),
                StudentId::from("222222"),
            ])),
            ..Default::default()
        };

        let report = run(&mut client, &paths, &config, now).await.unwrap();
        assert_eq!(report.count, 1);
        assert_eq!(report.output, paths.calendar_dir.join("2026-10-16T0605.json"));
        assert!(report.output.is_file());

        let request = &client.fetcher().requests()[0];
        assert_eq!(
            body_pairs(request.body.as_deref().unwrap()),
            [
                ("students", "111111,222222"),
                ("start", "2026-10-16T06:05:00.000Z"),
                ("end", "2026-10-23T06:05:00.000Z"),
            ]
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
        );
    }

    #[tokio::test]
    async fn ids_from_discovery() {
        let now = Utc::now();
        let fake = FakePortal::new();
        fake.push(html(r#"<a href="/x?studentIds=333333,444444">Schema</a>"#));
        fake.push(json("[]"));
        let (mut client, paths, _dir) = setup(fake, true);

        let report = run(&mut client, &paths, &Config::default(), now).await.unwrap();
        assert_eq!(report.count, 0);
        let request = &client.fetcher().requests()[1];
        assert_eq!(
            body_pairs(request.body.as_deref().unwrap())[0],
            ("students".to_owned(), "333333,444444".to_owned())
        );
    }

    #[tokio::test]
    async fn no_students_at_all() {
        let fake = FakePortal::new();
        fake.push(html("<h1>Inga elever</h1>"));
        let (mut client, paths, _dir) = setup(fake, true);

        let err = run(&mut client, &paths, &Config::default(), Utc::now())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "No student IDs available");
    }
}

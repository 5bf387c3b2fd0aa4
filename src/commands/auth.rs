use log::{info, warn};
use reqwest::StatusCode;
use serde::Serialize;
use vklass_utils::regex;

use crate::api::PortalClient;
use crate::config::{self, Paths, Students};
use crate::schema::StudentRoster;
use crate::transport::Fetch;

#[derive(Debug, Serialize)]
pub struct AuthReport {
    pub ok: bool,
    pub students: StudentRoster,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Checks that the stored session (or a fresh login) reaches the portal,
/// and records the students it can see.
pub async fn run<F: Fetch>(
    client: &mut PortalClient<F>,
    paths: &Paths,
) -> anyhow::Result<AuthReport> {
    // Logs in by itself if the home page turns out to be the login page
    if let Err(e) = client.fetch_home().await {
        return Ok(AuthReport {
            ok: false,
            students: StudentRoster::default(),
            error: Some(e.to_string()),
        });
    }

    let students = client.discover_students().await.unwrap_or_else(|e| {
        warn!("Could not discover students: {e}");
        StudentRoster::default()
    });

    let home_ok = match client.fetch_home().await {
        Ok(check) => {
            check.status == StatusCode::OK && !regex!(r"(?i)login[^>]*form").is_match(&check.text())
        }
        Err(e) => {
            warn!("Could not verify the session: {e}");
            false
        }
    };
    let logged_in = home_ok || !students.is_empty();

    let mut config = config::load(paths)?;
    config.students = Some(Students::Roster(students.clone()));
    if let Err(e) = config::save(paths, &config) {
        warn!("Could not save the students: {e:#}");
    }

    if !logged_in {
        return Ok(AuthReport {
            ok: false,
            students,
            error: Some("Not authenticated (login failed or session invalid)".to_owned()),
        });
    }
    info!("Authenticated; {} students", students.len());
    if let Err(e) = client.save_session() {
        warn!("Could not save the session: {e}");
    }
    Ok(AuthReport {
        ok: true,
        students,
        error: None,
    })
}

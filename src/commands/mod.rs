use std::path::PathBuf;

use log::info;
use serde::Serialize;

use crate::api::{PortalClient, PortalClientInitializer};
use crate::config::{self, Config, Paths};
use crate::error::PortalError;
use crate::transport::Fetch;

pub mod auth;
pub mod calendar;
pub mod news;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitReport {
    pub ok: bool,
    pub config_file: PathBuf,
}

pub fn init(paths: &Paths) -> anyhow::Result<InitReport> {
    config::ensure(paths)?;
    Ok(InitReport {
        ok: true,
        config_file: paths.config_path.clone(),
    })
}

pub fn client(paths: &Paths, config: &Config) -> Result<PortalClient, PortalError> {
    PortalClient::new(PortalClientInitializer {
        portal: config.portal.clone(),
        credentials: config.credentials.clone(),
        session_path: paths.session_path.clone(),
    })
}

/// Logs in up front when there is no session to try first.
async fn ensure_session<F: Fetch>(client: &mut PortalClient<F>) -> Result<(), PortalError> {
    if client.session().is_empty() {
        info!("No session is stored; logging in.");
        client.authenticate().await?;
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod test_util {
    use tempfile::TempDir;
    use vklass_utils::credentials::Credentials;

    use crate::api::{PortalClient, PortalClientInitializer};
    use crate::config::{Paths, PortalConfig};
    use crate::session::Session;
    use crate::transport::fake::FakePortal;

    pub fn setup(fake: FakePortal, logged_in: bool) -> (PortalClient<FakePortal>, Paths, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::new(dir.path());
        crate::config::ensure(&paths).unwrap();
        if logged_in {
            let mut session = Session::default();
            session.insert(".auth", "stored");
            session.save(&paths.session_path).unwrap();
        }
        let client = PortalClient::with_fetch(
            fake,
            PortalClientInitializer {
                portal: PortalConfig::default(),
                credentials: Credentials::builder()
                    .username("parent")
                    .password("secret")
                    .build(),
                session_path: paths.session_path.clone(),
            },
        );
        (client, paths, dir)
    }
}

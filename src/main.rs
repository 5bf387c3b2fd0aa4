use std::path::PathBuf;

use chrono::Utc;
use clap::{Parser, Subcommand};
use serde::Serialize;
use vklass::commands;
use vklass::config::{self, Paths};

#[derive(Parser)]
#[command(about = "Fetches news and calendar events from the Vklass guardian portal")]
struct Opts {
    /// Directory holding the configuration, the session and the downloaded data.
    /// Defaults to `~/.vklass`.
    #[arg(long, env = "VKLASS_HOME")]
    base_dir: Option<PathBuf>,
    #[command(subcommand)]
    sub: Sub,
}

#[derive(Clone, Subcommand)]
enum Sub {
    /// Creates the directories and a configuration file to fill in
    Init,
    /// Logs in if needed and records the students on the account
    Auth,
    /// Saves every news item and its attachments
    News,
    /// Saves the events of the coming week
    Calendar,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    pretty_env_logger::init();
    let opts = Opts::parse();

    let base_dir = match opts.base_dir {
        Some(base_dir) => base_dir,
        None => Paths::default_base_dir()?,
    };
    let paths = Paths::new(base_dir);

    let connect = || -> anyhow::Result<_> {
        let config = config::load(&paths)?;
        let client = commands::client(&paths, &config)?;
        Ok((config, client))
    };
    match opts.sub {
        Sub::Init => print(&commands::init(&paths)?),
        Sub::Auth => {
            let (_, mut client) = connect()?;
            print(&commands::auth::run(&mut client, &paths).await?)
        }
        Sub::News => {
            let (_, mut client) = connect()?;
            print(&commands::news::run(&mut client, &paths, Utc::now()).await?)
        }
        Sub::Calendar => {
            let (config, mut client) = connect()?;
            print(&commands::calendar::run(&mut client, &paths, &config, Utc::now()).await?)
        }
    }
}

fn print(report: &impl Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}

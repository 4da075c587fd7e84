//! File-backed logger. Both processes own a terminal screen, so records go to
//! a file in the data directory instead of stderr.

use std::fs::{self, OpenOptions};
use std::io::Write;

use anyhow::{Context, Result};
use env_logger::{Builder, Env, Target};

use crate::config::{data_dir, Config};

/// Which process is logging; picks the log file name.
#[derive(Debug, Clone, Copy)]
pub enum Role {
    Controller,
    Display,
}

impl Role {
    fn file_name(self) -> &'static str {
        match self {
            Role::Controller => "controller.log",
            Role::Display => "display.log",
        }
    }
}

pub fn init_logger(config: &Config, role: Role) -> Result<()> {
    let dir = data_dir()?;
    fs::create_dir_all(&dir).context("failed to create data directory")?;
    let log_file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(dir.join(role.file_name()))
        .context("failed to open log file")?;

    let mut builder = Builder::from_env(Env::default().default_filter_or(config.log_filter.as_str()));
    builder
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}][{}] {}",
                buf.timestamp_millis(),
                record.level(),
                record.module_path().unwrap_or("<unknown>"),
                record.args()
            )
        })
        .target(Target::Pipe(Box::new(log_file)));

    // A logger may already be installed by tests.
    let _ = builder.try_init();
    Ok(())
}

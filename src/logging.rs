use simplelog::{CombinedLogger, Config, LevelFilter, WriteLogger};
use std::fs::{self, OpenOptions};
use std::io::{Error, ErrorKind};
use std::path::PathBuf;
use std::sync::OnceLock;

static INIT: OnceLock<bool> = OnceLock::new();

/// `~/.local/share/keystage/logs`
pub fn log_dir() -> Result<PathBuf, Error> {
    let home = std::env::var("HOME")
        .map_err(|_| Error::new(ErrorKind::NotFound, "HOME environment variable not set"))?;

    Ok(PathBuf::from(home)
        .join(".local")
        .join("share")
        .join("keystage")
        .join("logs"))
}

/// Installs the file logger. Only the first call does anything.
pub fn init_logger() -> Result<(), Error> {
    let log_dir = log_dir()?;
    fs::create_dir_all(&log_dir)?;

    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("app.log"))?;

    let initialized = *INIT.get_or_init(|| {
        CombinedLogger::init(vec![WriteLogger::new(
            LevelFilter::Debug,
            Config::default(),
            log_file,
        )])
        .is_ok()
    });

    if initialized {
        Ok(())
    } else {
        Err(Error::new(ErrorKind::Other, "Logger initialization failed"))
    }
}

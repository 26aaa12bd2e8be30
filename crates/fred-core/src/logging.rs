//! Log output for the library.
//!
//! Every module reports through `tracing`. [`setup_logging`] installs the global
//! subscriber once; afterwards [`redirect`] may move the console output between
//! stdout, stderr, a file or nowhere at any time without reinstalling anything.

use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use thiserror::Error;
use tracing_subscriber::{
    filter::LevelFilter,
    fmt::{self, MakeWriter},
    prelude::*,
};

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Cannot open log file '{path}': {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("A global logger has already been installed")]
    AlreadyInitialized,
}

/// Destination of the console log output.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LogSink {
    Stdout,
    #[default]
    Stderr,
    /// Discards everything.
    Null,
    /// Truncates and writes to the given file.
    File(PathBuf),
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: LevelFilter,
    pub console: LogSink,
    /// Extra detailed log file, written with thread ids and without colours.
    pub log_file: Option<PathBuf>,
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LevelFilter::WARN,
            console: LogSink::Stderr,
            log_file: None,
            ansi: false,
        }
    }
}

impl LoggingConfig {
    /// Level from a verbosity count: 0 warn, 1 info, 2 debug, 3+ trace.
    pub fn from_verbosity(verbosity: u8, quiet: bool) -> Self {
        let level = if quiet {
            LevelFilter::OFF
        } else {
            match verbosity {
                0 => LevelFilter::WARN,
                1 => LevelFilter::INFO,
                2 => LevelFilter::DEBUG,
                _ => LevelFilter::TRACE,
            }
        };
        Self {
            level,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
enum Target {
    Stdout,
    Stderr,
    Null,
    File(Arc<Mutex<File>>),
}

static CONSOLE: RwLock<Target> = RwLock::new(Target::Stderr);

impl Target {
    fn open(sink: &LogSink) -> Result<Self, LoggingError> {
        Ok(match sink {
            LogSink::Stdout => Target::Stdout,
            LogSink::Stderr => Target::Stderr,
            LogSink::Null => Target::Null,
            LogSink::File(path) => {
                let file = File::create(path).map_err(|source| LoggingError::Io {
                    path: path.clone(),
                    source,
                })?;
                Target::File(Arc::new(Mutex::new(file)))
            }
        })
    }

    fn current() -> Self {
        CONSOLE
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Sends console output to a new sink. Takes effect for the next event.
pub fn redirect(sink: LogSink) -> Result<(), LoggingError> {
    let target = Target::open(&sink)?;
    *CONSOLE.write().unwrap_or_else(PoisonError::into_inner) = target;
    Ok(())
}

/// Writer resolving the current console sink for every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleWriter;

pub struct ConsoleHandle(Target);

impl Write for ConsoleHandle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &self.0 {
            Target::Stdout => io::stdout().write(buf),
            Target::Stderr => io::stderr().write(buf),
            Target::Null => Ok(buf.len()),
            Target::File(file) => file
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .write(buf),
        }
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        match &self.0 {
            Target::Stdout => io::stdout().lock().write_all(buf),
            Target::Stderr => io::stderr().lock().write_all(buf),
            Target::Null => Ok(()),
            Target::File(file) => file
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .write_all(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match &self.0 {
            Target::Stdout => io::stdout().flush(),
            Target::Stderr => io::stderr().flush(),
            Target::Null => Ok(()),
            Target::File(file) => file.lock().unwrap_or_else(PoisonError::into_inner).flush(),
        }
    }
}

impl<'a> MakeWriter<'a> for ConsoleWriter {
    type Writer = ConsoleHandle;

    fn make_writer(&'a self) -> Self::Writer {
        ConsoleHandle(Target::current())
    }
}

/// Installs the global subscriber: a level filter, a compact console layer
/// writing to the redirectable sink and an optional file layer.
pub fn setup_logging(config: LoggingConfig) -> Result<(), LoggingError> {
    let console = Target::open(&config.console)?;

    let console_layer = fmt::layer()
        .with_writer(ConsoleWriter)
        .with_ansi(config.ansi)
        .with_target(false)
        .compact();

    let subscriber = tracing_subscriber::registry()
        .with(config.level)
        .with(console_layer);

    let result = if let Some(path) = &config.log_file {
        let file = File::create(path).map_err(|source| LoggingError::Io {
            path: path.clone(),
            source,
        })?;
        let file_layer = fmt::layer()
            .with_writer(Mutex::new(file))
            .with_ansi(false)
            .with_thread_ids(true)
            .with_target(true);
        subscriber.with(file_layer).try_init()
    } else {
        subscriber.try_init()
    };
    result.map_err(|_| LoggingError::AlreadyInitialized)?;
    *CONSOLE.write().unwrap_or_else(PoisonError::into_inner) = console;
    Ok(())
}

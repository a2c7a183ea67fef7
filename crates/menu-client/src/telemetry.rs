use crate::config::{LogFormat, LoggingSettings};
use anyhow::Result;

use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

/// Where log lines go besides the rolling file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogSink {
    StdoutAndFile,
    /// For full-screen terminal UIs: stdout belongs to the renderer.
    FileOnly,
}

/// Installs the global subscriber.
///
/// `RUST_LOG` and `LOG_FORMAT` override the configured level and format.
pub fn init_logger(settings: &LoggingSettings, sink: LogSink) -> Result<()> {
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| settings.level.clone());
    let format = match std::env::var("LOG_FORMAT").as_deref() {
        Ok("json") => LogFormat::Json,
        Ok("pretty") => LogFormat::Pretty,
        _ => settings.format,
    };

    // logs/menu-client.YYYY-MM-DD.log
    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("menu-client")
        .filename_suffix("log")
        .build(&settings.directory)?;

    let filter = EnvFilter::try_new(&log_level)?;

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();
    match format {
        LogFormat::Json => {
            if sink == LogSink::StdoutAndFile {
                layers.push(
                    fmt::layer()
                        .json()
                        .with_writer(std::io::stdout)
                        .with_target(true)
                        .with_level(true)
                        .with_thread_ids(true)
                        .boxed(),
                );
            }
            layers.push(
                fmt::layer()
                    .json()
                    .with_writer(file_appender)
                    .with_target(true)
                    .with_level(true)
                    .with_thread_ids(true)
                    .boxed(),
            );
        }
        LogFormat::Pretty => {
            if sink == LogSink::StdoutAndFile {
                layers.push(
                    fmt::layer()
                        .pretty()
                        .with_writer(std::io::stdout)
                        .with_target(true)
                        .with_level(true)
                        .with_thread_ids(false)
                        .boxed(),
                );
            }
            layers.push(
                fmt::layer()
                    .with_writer(file_appender)
                    .with_target(true)
                    .with_level(true)
                    .with_ansi(false)
                    .boxed(),
            );
        }
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()?;

    Ok(())
}

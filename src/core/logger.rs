// Structured logging setup using the tracing crate

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::sync::{Arc, Mutex, Once};
use tracing::Level;
use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// Append-mode file writer usable as a tracing MakeWriter target.
struct FileWriter(Arc<Mutex<std::fs::File>>);

impl Write for FileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.0.lock() {
            Ok(mut f) => f.write(buf),
            Err(_) => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.0.lock() {
            Ok(mut f) => f.flush(),
            Err(_) => Ok(()),
        }
    }
}

/// Initialize logging for the process. Safe to call more than once; only the
/// first call takes effect.
///
/// `log_file` empty means console output.
pub fn setup_logging(log_level: &str, log_file: &str) {
    let level = match log_level.to_uppercase().as_str() {
        "TRACE" => Level::TRACE,
        "DEBUG" => Level::DEBUG,
        "INFO" => Level::INFO,
        "WARN" | "WARNING" => Level::WARN,
        "ERROR" => Level::ERROR,
        _ => Level::INFO,
    };

    let log_level = log_level.to_string();
    let log_file = log_file.to_string();

    INIT.call_once(move || {
        // Suppress noisy transport libraries
        let filter = EnvFilter::from_default_env()
            .add_directive(level.into())
            .add_directive("tokio_tungstenite=warn".parse().expect("static directive"))
            .add_directive("tungstenite=warn".parse().expect("static directive"))
            .add_directive("hyper=warn".parse().expect("static directive"))
            .add_directive("reqwest=warn".parse().expect("static directive"));

        if log_file.is_empty() {
            tracing_subscriber::fmt()
                .with_target(true)
                .with_env_filter(filter)
                .init();
        } else {
            match OpenOptions::new().create(true).append(true).open(&log_file) {
                Ok(file) => {
                    let shared = Arc::new(Mutex::new(file));
                    tracing_subscriber::fmt()
                        .with_target(true)
                        .with_ansi(false)
                        .with_env_filter(filter)
                        .with_writer(move || FileWriter(shared.clone()))
                        .init();
                }
                Err(e) => {
                    eprintln!("failed to open log file {}: {}, logging to console", log_file, e);
                    tracing_subscriber::fmt()
                        .with_target(true)
                        .with_env_filter(filter)
                        .init();
                }
            }
        }

        tracing::info!(log_level = %log_level, log_file = %log_file, "Logging initialized");
    });
}

/*!
Modular output system for delivering log records
*/

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use guildlog_platform::GuildApi;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::core::config::{OutputConfig, OutputPlugin, TerminalFormat};
use crate::core::records::LogRecord;
use crate::error::RelayError;

/// Trait for output plugins
#[async_trait]
pub trait OutputHandler: Send + Sync {
    /// Name of the output handler
    fn name(&self) -> &'static str;

    /// Open files, connections, etc.
    async fn initialize(&mut self) -> Result<(), RelayError> {
        Ok(())
    }

    /// Deliver one record
    async fn handle_record(&self, record: &LogRecord) -> Result<(), RelayError>;

    /// Flush and release resources
    async fn finalize(&self) -> Result<(), RelayError> {
        Ok(())
    }
}

/// Fans records out to every enabled handler.
pub struct OutputManager {
    handlers: Vec<Box<dyn OutputHandler>>,
}

impl OutputManager {
    pub fn new(configs: &[OutputConfig], api: Arc<dyn GuildApi>) -> Self {
        let handlers = configs
            .iter()
            .filter(|config| config.enabled)
            .map(|config| -> Box<dyn OutputHandler> {
                match &config.plugin {
                    OutputPlugin::Channel => Box::new(ChannelOutputHandler::new(api.clone())),
                    OutputPlugin::Terminal { format } => Box::new(TerminalOutputHandler::new(*format)),
                    OutputPlugin::Json { path } => Box::new(JsonOutputHandler::new(path.clone())),
                }
            })
            .collect::<Vec<_>>();

        info!("Initialized output manager with {} handlers", handlers.len());
        Self { handlers }
    }

    pub fn with_handlers(handlers: Vec<Box<dyn OutputHandler>>) -> Self {
        Self { handlers }
    }

    pub async fn initialize(&mut self) -> Result<(), RelayError> {
        for handler in &mut self.handlers {
            handler.initialize().await?;
            info!("Initialized output handler: {}", handler.name());
        }
        Ok(())
    }

    /// Deliver to every handler. Failures are logged and never propagated.
    pub async fn handle_record(&self, record: &LogRecord) {
        for handler in &self.handlers {
            if let Err(e) = handler.handle_record(record).await {
                error!(
                    "Handler {} failed to deliver {} record for guild {}: {}",
                    handler.name(),
                    record.kind,
                    record.guild,
                    e
                );
            }
        }
    }

    pub async fn finalize(&self) -> Result<(), RelayError> {
        for handler in &self.handlers {
            handler.finalize().await?;
        }
        Ok(())
    }
}

/// Posts records to the guild's log channel.
pub struct ChannelOutputHandler {
    api: Arc<dyn GuildApi>,
}

impl ChannelOutputHandler {
    pub fn new(api: Arc<dyn GuildApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl OutputHandler for ChannelOutputHandler {
    fn name(&self) -> &'static str {
        "Channel"
    }

    async fn handle_record(&self, record: &LogRecord) -> Result<(), RelayError> {
        self.api.send_message(record.channel, &record.text).await?;
        Ok(())
    }
}

/// Appends one JSON object per record.
pub struct JsonOutputHandler {
    file_path: PathBuf,
    file: Mutex<Option<File>>,
}

impl JsonOutputHandler {
    pub fn new(file_path: PathBuf) -> Self {
        Self {
            file_path,
            file: Mutex::new(None),
        }
    }
}

#[async_trait]
impl OutputHandler for JsonOutputHandler {
    fn name(&self) -> &'static str {
        "JSON"
    }

    async fn initialize(&mut self) -> Result<(), RelayError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file_path)
            .await?;
        *self.file.get_mut() = Some(file);
        Ok(())
    }

    async fn handle_record(&self, record: &LogRecord) -> Result<(), RelayError> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let mut file = self.file.lock().await;
        if let Some(file) = file.as_mut() {
            file.write_all(line.as_bytes()).await?;
            file.flush().await?;
        }
        Ok(())
    }

    async fn finalize(&self) -> Result<(), RelayError> {
        if let Some(file) = self.file.lock().await.as_mut() {
            file.flush().await?;
        }
        Ok(())
    }
}

/// Echoes records to stdout.
pub struct TerminalOutputHandler {
    format: TerminalFormat,
}

impl TerminalOutputHandler {
    pub fn new(format: TerminalFormat) -> Self {
        Self { format }
    }

    fn format_record(&self, record: &LogRecord) -> String {
        match self.format {
            TerminalFormat::Plain => format!("{} {}", record.guild, record.text),
            TerminalFormat::Colored => format!(
                "\x1b[36m{}\x1b[0m \x1b[33m{:<18}\x1b[0m {}",
                record.guild,
                record.kind.as_str(),
                record.text
            ),
            TerminalFormat::Json => serde_json::to_string(record)
                .unwrap_or_else(|_| "JSON serialization failed".to_string()),
        }
    }
}

#[async_trait]
impl OutputHandler for TerminalOutputHandler {
    fn name(&self) -> &'static str {
        "Terminal"
    }

    async fn handle_record(&self, record: &LogRecord) -> Result<(), RelayError> {
        println!("{}", self.format_record(record));
        Ok(())
    }
}

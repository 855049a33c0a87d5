use log::{debug, error, info, trace, warn};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::LoggingConfig;
use crate::models::{ChainKind, Transaction};

/// Structured logging context
pub struct LogContext {
    pub component: String,
    pub operation: String,
    pub metadata: HashMap<String, Value>,
}

impl LogContext {
    pub fn new(component: &str, operation: &str) -> Self {
        Self {
            component: component.to_string(),
            operation: operation.to_string(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }

    pub fn with_chain(self, chain: ChainKind) -> Self {
        self.with_metadata("chain", json!(chain.as_str()))
    }

    pub fn with_address(self, address: &str) -> Self {
        self.with_metadata("address", json!(address))
    }

    pub fn with_block_number(self, block_number: u64) -> Self {
        self.with_metadata("block_number", json!(block_number))
    }

    pub fn with_transaction_hash(self, tx_hash: &str) -> Self {
        self.with_metadata("transaction_hash", json!(tx_hash))
    }

    pub fn with_duration_ms(self, duration_ms: u64) -> Self {
        self.with_metadata("duration_ms", json!(duration_ms))
    }

    pub fn with_retry_count(self, retry_count: u32) -> Self {
        self.with_metadata("retry_count", json!(retry_count))
    }

    fn format_message(&self, level: &str, message: &str) -> String {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        let mut log_entry = json!({
            "timestamp": timestamp,
            "level": level,
            "component": self.component,
            "operation": self.operation,
            "message": message,
        });

        for (key, value) in &self.metadata {
            log_entry[key] = value.clone();
        }

        log_entry.to_string()
    }

    pub fn info(&self, message: &str) {
        info!("{}", self.format_message("INFO", message));
    }

    pub fn warn(&self, message: &str) {
        warn!("{}", self.format_message("WARN", message));
    }

    pub fn error(&self, message: &str) {
        error!("{}", self.format_message("ERROR", message));
    }

    pub fn debug(&self, message: &str) {
        debug!("{}", self.format_message("DEBUG", message));
    }

    pub fn trace(&self, message: &str) {
        trace!("{}", self.format_message("TRACE", message));
    }
}

/// Operational records for poll passes, data-source calls and deliveries
pub struct MetricsLogger;

impl MetricsLogger {
    pub fn log_poll_pass(chain: ChainKind, wallets_checked: usize, failures: usize, emitted: usize, duration_ms: u64) {
        let context = LogContext::new("metrics", "poll_pass")
            .with_chain(chain)
            .with_metadata("wallets_checked", json!(wallets_checked))
            .with_metadata("failures", json!(failures))
            .with_metadata("emitted", json!(emitted))
            .with_duration_ms(duration_ms);

        if failures > 0 {
            context.warn(&format!(
                "{} poll pass finished with {} failed wallet(s) of {}",
                chain, failures, wallets_checked
            ));
        } else {
            context.debug(&format!(
                "{} poll pass checked {} wallet(s), {} new transaction(s)",
                chain, wallets_checked, emitted
            ));
        }
    }

    pub fn log_rpc_call(method: &str, duration_ms: u64, success: bool) {
        let context = LogContext::new("metrics", "rpc_call")
            .with_metadata("method", json!(method))
            .with_duration_ms(duration_ms)
            .with_metadata("success", json!(success));

        if success {
            context.trace(&format!("RPC call {} completed in {}ms", method, duration_ms));
        } else {
            context.debug(&format!("RPC call {} failed after {}ms", method, duration_ms));
        }
    }

    pub fn log_transaction_detected(wallet_name: &str, transaction: &Transaction) {
        let context = LogContext::new("metrics", "transaction_detected")
            .with_chain(transaction.chain)
            .with_transaction_hash(&transaction.hash)
            .with_block_number(transaction.block_height)
            .with_metadata("direction", json!(transaction.direction.as_str()));

        context.info(&format!(
            "[{}] {} tx: {} - {}",
            transaction.chain,
            transaction.direction.as_str(),
            transaction.value_formatted,
            wallet_name
        ));
    }

    pub fn log_notification(transaction: &Transaction, delivered: bool, detail: Option<&str>) {
        let mut context = LogContext::new("metrics", "notification")
            .with_chain(transaction.chain)
            .with_transaction_hash(&transaction.hash)
            .with_metadata("delivered", json!(delivered));

        if let Some(detail) = detail {
            context = context.with_metadata("detail", json!(detail));
        }

        if delivered {
            context.debug(&format!("Notification sent for {}", transaction.hash));
        } else {
            context.error(&format!("Failed to send notification for {}", transaction.hash));
        }
    }
}

/// Initialize the global logger from configuration.
/// `RUST_LOG`, when set, takes precedence over `logging.level`.
pub fn init_logging(config: &LoggingConfig) -> Result<(), Box<dyn std::error::Error>> {
    let mut builder = env_logger::Builder::new();
    builder.parse_filters(&config.level);
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }

    let json_output = config.format == "json";
    builder.format(move |buf, record| {
        use std::io::Write;

        let message = record.args().to_string();
        if json_output {
            writeln!(buf, "{}", render_json_line(record.level().as_str(), record.target(), &message))
        } else {
            writeln!(
                buf,
                "{} [{}] {}: {}",
                chrono::Utc::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                record.target(),
                message
            )
        }
    });

    if let Some(path) = &config.file_path {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }

    builder.try_init()?;
    info!("Logging initialized (level={}, format={})", config.level, config.format);
    Ok(())
}

/// Structured `LogContext` messages are merged into the line; plain messages are wrapped.
fn render_json_line(level: &str, target: &str, message: &str) -> String {
    match serde_json::from_str::<Value>(message) {
        Ok(Value::Object(mut fields)) => {
            fields.insert("target".to_string(), json!(target));
            Value::Object(fields).to_string()
        }
        _ => json!({
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "level": level,
            "target": target,
            "message": message,
        })
        .to_string(),
    }
}

//! Structured logging through `tracing-subscriber`.
//!
//! Production runs emit one JSON object per event; development gets the
//! pretty formatter. Provider keys and recipient addresses are masked with
//! [`mask_secret`] and [`mask_recipient`] before they reach a log field.

use serde::Deserialize;
use std::collections::HashMap;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Base directive, e.g. `info` or `bazaar_core=debug,info`.
    /// `RUST_LOG` wins when set.
    pub level: String,

    pub format: LogFormat,

    /// Extra `target=level` directives layered on top of `level`
    pub module_levels: HashMap<String, String>,

    /// Include file and line
    pub include_location: bool,

    /// Emit an event when a span closes, with its busy/idle time
    pub log_span_close: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Json,
            module_levels: HashMap::new(),
            include_location: false,
            log_span_close: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
    Compact,
}

impl LogFormat {
    /// Development always gets pretty output unless compact was asked for.
    fn for_environment(self, environment: &str) -> Self {
        match (environment, self) {
            ("development", Self::Json) => Self::Pretty,
            (_, format) => format,
        }
    }
}

/// Mask an email address for logs, keeping the first character and domain.
///
/// `jane@example.com` becomes `j***@example.com`. Values without an `@` are
/// masked entirely.
pub fn mask_recipient(address: &str) -> String {
    match address.split_once('@') {
        Some((local, domain)) if !local.is_empty() => {
            let first: String = local.chars().take(1).collect();
            format!("{}***@{}", first, domain)
        }
        _ => "***".to_string(),
    }
}

/// Mask a secret for logs, keeping only its length.
pub fn mask_secret(secret: &str) -> String {
    if secret.is_empty() {
        "<unset>".to_string()
    } else {
        format!("[REDACTED len={}]", secret.len())
    }
}

fn build_filter(config: &LoggingConfig) -> anyhow::Result<EnvFilter> {
    let mut filter = match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(directives) if !directives.is_empty() => EnvFilter::try_new(directives)?,
        _ => EnvFilter::try_new(&config.level)?,
    };

    for (target, level) in &config.module_levels {
        filter = filter.add_directive(format!("{}={}", target, level).parse()?);
    }
    Ok(filter)
}

/// Install the global subscriber.
///
/// Fails on an invalid directive or when a subscriber is already set.
pub fn init_logging(config: &LoggingConfig, environment: &str) -> anyhow::Result<()> {
    let filter = build_filter(config)?;

    let span_events = if config.log_span_close {
        FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };
    let base = fmt::layer()
        .with_span_events(span_events)
        .with_file(config.include_location)
        .with_line_number(config.include_location)
        .with_target(true);

    let layer: Box<dyn Layer<Registry> + Send + Sync> =
        match config.format.for_environment(environment) {
            LogFormat::Json => base.json().flatten_event(true).boxed(),
            LogFormat::Pretty => base.pretty().boxed(),
            LogFormat::Compact => base.compact().boxed(),
        };

    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .try_init()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_development_prefers_pretty() {
        assert_eq!(LogFormat::Json.for_environment("development"), LogFormat::Pretty);
        assert_eq!(LogFormat::Compact.for_environment("development"), LogFormat::Compact);
        assert_eq!(LogFormat::Json.for_environment("production"), LogFormat::Json);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: LoggingConfig =
            serde_json::from_str(r#"{ "format": "compact", "module_levels": { "hyper": "warn" } }"#)
                .unwrap();
        assert_eq!(config.format, LogFormat::Compact);
        assert_eq!(config.level, "info");
        assert_eq!(config.module_levels["hyper"], "warn");
    }

    #[test]
    fn test_bad_module_directive_is_rejected() {
        let config = LoggingConfig {
            module_levels: HashMap::from([("bazaar_core".to_string(), "loud".to_string())]),
            ..Default::default()
        };
        assert!(build_filter(&config).is_err());
    }

    #[test]
    fn test_mask_recipient() {
        assert_eq!(mask_recipient("jane@example.com"), "j***@example.com");
        assert_eq!(mask_recipient("@example.com"), "***");
        assert_eq!(mask_recipient("not-an-address"), "***");
    }

    #[test]
    fn test_mask_secret() {
        assert_eq!(mask_secret(""), "<unset>");
        assert_eq!(mask_secret("abcd"), "[REDACTED len=4]");
    }
}

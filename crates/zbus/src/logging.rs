use clap::ValueEnum;
use tracing::level_filters::LevelFilter;
use tracing::Span;
use zbus_gateway::GatewayConfig;

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_filter(self) -> LevelFilter {
        match self {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

/// Install the global subscriber on stderr.
///
/// Stdout is the supervisor's event stream; a single stray log line there
/// would be parsed as a directive, so this is the only place a writer is
/// chosen. JSON records carry the device span of [`device_span`] as a
/// `span` field instead of the full span list.
pub fn init_logging(format: LogFormat, level: LogLevel) {
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level.as_filter())
        .with_ansi(false)
        .with_target(false);

    match format {
        LogFormat::Text => {
            let _ = builder.try_init();
        }
        LogFormat::Json => {
            let _ = builder
                .json()
                .with_current_span(true)
                .with_span_list(false)
                .try_init();
        }
    }
}

/// Span naming the adapter and alert pin a gateway instance is bound to, so
/// logs from several gateways on one host can be told apart.
pub fn device_span(config: &GatewayConfig) -> Span {
    tracing::info_span!(
        "gateway",
        i2c = %config.i2c_path.display(),
        gpio = config.gpio_pin
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_names_parse_case_insensitively() {
        assert_eq!(LogLevel::from_str("warn", true), Ok(LogLevel::Warn));
        assert_eq!(LogLevel::from_str("TRACE", true), Ok(LogLevel::Trace));
        assert_eq!(LogFormat::from_str("json", true), Ok(LogFormat::Json));
        assert!(LogLevel::from_str("verbose", true).is_err());
    }

    #[test]
    fn levels_map_to_increasing_filters() {
        let filters: Vec<LevelFilter> = [
            LogLevel::Error,
            LogLevel::Warn,
            LogLevel::Info,
            LogLevel::Debug,
            LogLevel::Trace,
        ]
        .into_iter()
        .map(LogLevel::as_filter)
        .collect();

        assert!(filters.windows(2).all(|pair| pair[0] < pair[1]));
        assert_eq!(filters[2], LevelFilter::INFO);
    }

    #[test]
    fn device_span_is_inert_without_subscriber() {
        let span = device_span(&GatewayConfig::new(1, 17));
        let _entered = span.enter();
        tracing::info!("logged inside the device span");
    }
}

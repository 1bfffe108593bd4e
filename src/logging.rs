//! Structured logging initialisation
//!
//! The mediator only emits `tracing` events (`correos::dispatcher`,
//! `correos::registry`, `correos::instance_cache`). Hosts without a subscriber
//! of their own can install one with [`init_logging`] or
//! [`init_logging_with_config`].
//!
//! `RUST_LOG`, when set, replaces the configured level. Extra directives from
//! [`LogConfig::target_filter`] are added on top of either.

use anyhow::{Context, Result};
use std::env;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{Level, Metadata, Subscriber};
use tracing_subscriber::filter::Directive;
use tracing_subscriber::layer::{Context as LayerContext, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Output format of the fmt layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// One JSON object per event
    #[default]
    Json,
    /// Multi-line, coloured output
    Pretty,
}

impl LogFormat {
    /// Lenient parse: anything other than `pretty` means JSON.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        if s.trim().eq_ignore_ascii_case("pretty") {
            LogFormat::Pretty
        } else {
            LogFormat::Json
        }
    }
}

/// Which events below WARN get through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SamplingMode {
    #[default]
    All,
    /// Only WARN and ERROR
    ErrorOnly,
    /// Every n-th event below WARN, where n = 1 / rate
    Sampled,
}

impl SamplingMode {
    /// Lenient parse: unknown modes mean [`SamplingMode::All`].
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "error-only" => SamplingMode::ErrorOnly,
            "sampled" => SamplingMode::Sampled,
            _ => SamplingMode::All,
        }
    }
}

/// Subscriber settings, usually read with [`LogConfig::from_env`].
///
/// | Variable | Field | Default |
/// | --- | --- | --- |
/// | `CORREOS_LOG_LEVEL` | `log_level` | `info` |
/// | `CORREOS_LOG_FORMAT` | `format` | `json` |
/// | `CORREOS_LOG_SAMPLING_MODE` | `sampling_mode` | `all` |
/// | `CORREOS_LOG_SAMPLING_RATE` | `sampling_rate` | `0.1` |
/// | `CORREOS_LOG_FILTER` | `target_filter` | none |
/// | `CORREOS_LOG_LOCATION` | `include_location` | `false` |
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub log_level: String,
    pub format: LogFormat,
    pub sampling_mode: SamplingMode,
    /// Fraction of sub-WARN events kept in [`SamplingMode::Sampled`]
    pub sampling_rate: f64,
    /// Comma-separated directives, e.g. `correos::dispatcher=trace`
    pub target_filter: Option<String>,
    /// Print file and line of each event
    pub include_location: bool,
}

impl LogConfig {
    #[must_use]
    pub fn from_env() -> Self {
        let var = |key: &str| env::var(key).ok();
        Self {
            log_level: var("CORREOS_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            format: var("CORREOS_LOG_FORMAT")
                .map(|s| LogFormat::parse(&s))
                .unwrap_or_default(),
            sampling_mode: var("CORREOS_LOG_SAMPLING_MODE")
                .map(|s| SamplingMode::parse(&s))
                .unwrap_or_default(),
            sampling_rate: var("CORREOS_LOG_SAMPLING_RATE")
                .and_then(|s| s.parse().ok())
                .unwrap_or(0.1),
            target_filter: var("CORREOS_LOG_FILTER"),
            include_location: var("CORREOS_LOG_LOCATION")
                .and_then(|s| s.parse().ok())
                .unwrap_or(false),
        }
    }

    /// Debug level, pretty output with locations, nothing sampled away.
    #[must_use]
    pub fn default_dev() -> Self {
        Self {
            log_level: "debug".to_string(),
            format: LogFormat::Pretty,
            sampling_mode: SamplingMode::All,
            sampling_rate: 1.0,
            target_filter: None,
            include_location: true,
        }
    }

    /// The configured level, INFO when it does not name one.
    fn level(&self) -> Level {
        Level::from_str(self.log_level.trim()).unwrap_or(Level::INFO)
    }

    /// `RUST_LOG` or the configured level, plus the extra directives.
    fn env_filter(&self) -> Result<EnvFilter> {
        let mut filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.level().as_str()));

        let extra = self.target_filter.as_deref().unwrap_or_default();
        for part in extra.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let directive = part
                .parse::<Directive>()
                .with_context(|| format!("Invalid log filter directive: {part}"))?;
            filter = filter.add_directive(directive);
        }
        Ok(filter)
    }
}

/// Drops events below WARN according to a [`SamplingMode`]. Spans always pass.
pub struct SamplingLayer {
    mode: SamplingMode,
    sampling_rate: f64,
    seen: AtomicU64,
}

impl SamplingLayer {
    /// `sampling_rate` is clamped to `0.0..=1.0`.
    #[must_use]
    pub fn new(mode: SamplingMode, sampling_rate: f64) -> Self {
        Self {
            mode,
            sampling_rate: sampling_rate.clamp(0.0, 1.0),
            seen: AtomicU64::new(0),
        }
    }

    fn should_sample(&self, level: &Level) -> bool {
        if *level <= Level::WARN {
            // WARN and ERROR are never dropped.
            return true;
        }
        match self.mode {
            SamplingMode::All => true,
            SamplingMode::ErrorOnly => false,
            SamplingMode::Sampled if self.sampling_rate <= 0.0 => false,
            SamplingMode::Sampled => {
                let every = (1.0 / self.sampling_rate).round().max(1.0) as u64;
                self.seen.fetch_add(1, Ordering::Relaxed) % every == 0
            }
        }
    }
}

impl<S> Layer<S> for SamplingLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn enabled(&self, metadata: &Metadata<'_>, _ctx: LayerContext<'_, S>) -> bool {
        !metadata.is_event() || self.should_sample(metadata.level())
    }
}

/// Install a subscriber at `log_level`, with the rest of [`LogConfig::from_env`].
///
/// # Example
///
/// ```no_run
/// correos::logging::init_logging("info").expect("Failed to initialize logging");
/// ```
pub fn init_logging(log_level: &str) -> Result<()> {
    let config = LogConfig {
        log_level: log_level.to_string(),
        ..LogConfig::from_env()
    };
    init_logging_with_config(&config)
}

/// Install the global `tracing` subscriber described by `config`.
///
/// Fails on an invalid filter directive, or when a global subscriber is
/// already installed.
pub fn init_logging_with_config(config: &LogConfig) -> Result<()> {
    let env_filter = config.env_filter()?;
    let sampling = SamplingLayer::new(config.sampling_mode, config.sampling_rate);

    let output = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_file(config.include_location)
        .with_line_number(config.include_location);
    let output = match config.format {
        LogFormat::Json => output
            .json()
            .with_current_span(true)
            .with_thread_ids(true)
            .boxed(),
        LogFormat::Pretty => output.pretty().boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(sampling)
        .with(output)
        .try_init()
        .context("Failed to initialize logging")
}

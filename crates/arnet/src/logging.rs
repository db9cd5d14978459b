use clap::ValueEnum;

/// Environment variable carrying the numeric protocol verbosity.
pub const DEBUG_ENV: &str = "ARNET_DEBUG";

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
    pub fn as_filter(self) -> tracing::level_filters::LevelFilter {
        match self {
            LogLevel::Error => tracing::level_filters::LevelFilter::ERROR,
            LogLevel::Warn => tracing::level_filters::LevelFilter::WARN,
            LogLevel::Info => tracing::level_filters::LevelFilter::INFO,
            LogLevel::Debug => tracing::level_filters::LevelFilter::DEBUG,
            LogLevel::Trace => tracing::level_filters::LevelFilter::TRACE,
        }
    }

    /// Map a numeric verbosity: 0 errors only, 1 warnings, 3 protocol
    /// traces, 4 and up raw datagram dumps.
    pub fn from_verbosity(level: u8) -> Self {
        match level {
            0 => LogLevel::Error,
            1 => LogLevel::Warn,
            2 => LogLevel::Info,
            3 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }
}

/// `--log-level` wins; otherwise a parseable `ARNET_DEBUG`; otherwise info.
pub fn resolve_level(flag: Option<LogLevel>, debug_env: Option<&str>) -> LogLevel {
    flag.or_else(|| {
        debug_env
            .and_then(|raw| raw.trim().parse::<u8>().ok())
            .map(LogLevel::from_verbosity)
    })
    .unwrap_or(LogLevel::Info)
}

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
            let _ = builder.json().try_init();
        }
    }
}

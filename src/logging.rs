use std::{env, fmt, str::FromStr};

/// Environment variable consulted when no level is given on the command line.
pub const LOG_ENV: &str = "COOL_LOG";

/// Logging verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub const DEFAULT: Self = Self::Warn;

    pub fn parse(spec: &str) -> Option<Self> {
        match spec.trim().to_ascii_lowercase().as_str() {
            "error" | "err" => Some(Self::Error),
            "warn" | "warning" => Some(Self::Warn),
            "info" => Some(Self::Info),
            "debug" => Some(Self::Debug),
            "trace" | "verbose" => Some(Self::Trace),
            _ => None,
        }
    }

    /// CLI value first, then `COOL_LOG`, then the default.
    pub fn resolve(cli: Option<LogLevel>) -> Self {
        let env = env::var(LOG_ENV).ok();
        resolve_with(cli, env.as_deref())
    }

    pub fn as_tracing_level(self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        };
        f.write_str(text)
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("unknown log level `{s}`"))
    }
}

fn resolve_with(cli: Option<LogLevel>, env: Option<&str>) -> LogLevel {
    cli.or_else(|| env.and_then(LogLevel::parse))
        .unwrap_or(LogLevel::DEFAULT)
}

/// Installs the global compact subscriber writing to stderr. `RUST_LOG`
/// overrides `level` when set. Later calls are no-ops.
pub fn init_logging(level: LogLevel) {
    use std::io::IsTerminal;
    use std::sync::OnceLock;
    use tracing_subscriber::{fmt, EnvFilter};

    static INITIALISED: OnceLock<()> = OnceLock::new();

    INITIALISED.get_or_init(|| {
        let use_ansi = env::var_os("NO_COLOR").is_none() && std::io::stderr().is_terminal();
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(level.to_string()));
        let subscriber = fmt::fmt()
            .with_env_filter(filter)
            .with_ansi(use_ansi)
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_level(true)
            .compact()
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}

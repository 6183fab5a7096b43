use stratum::{AppConfig, LoggingConfig, init_logging};

fn main() -> anyhow::Result<()> {
    init_logging(LoggingConfig::default());
    stratum::run(AppConfig::new())
}

use stock_rl::config::LoggingConfig;
use tracing_subscriber::EnvFilter;

pub fn init_logging(config: &LoggingConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    // File logging is opt-in: STOCK_RL_LOG_DIR wins over logging.dir
    let log_dir = std::env::var("STOCK_RL_LOG_DIR")
        .ok()
        .or_else(|| config.dir.clone());

    // `tracing_appender::rolling::daily` panics if it can't create the
    // initial log file, so preflight writability.
    let file_layer = log_dir.as_deref().and_then(|log_dir| {
        let writable = std::fs::create_dir_all(log_dir).is_ok() && {
            let test_path = std::path::Path::new(log_dir).join(".stock_rl_write_test");
            let ok = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&test_path)
                .is_ok();
            let _ = std::fs::remove_file(&test_path);
            ok
        };
        if !writable {
            eprintln!(
                "Warning: Could not write to log directory {}, file logging disabled",
                log_dir
            );
            return None;
        }

        // Daily rotating file appender
        let file_appender = tracing_appender::rolling::daily(log_dir, "stock-rl.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        // Keep the guard alive for the life of the process
        Box::leak(Box::new(guard));

        Some(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true),
        )
    });

    // Console layer, JSON or human readable
    let json_layer = config
        .json
        .then(|| tracing_subscriber::fmt::layer().json().with_target(true));
    let text_layer = (!config.json).then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
    });

    let file_logging_enabled = file_layer.is_some();
    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .with(file_layer)
        .init();

    if let (true, Some(dir)) = (file_logging_enabled, log_dir) {
        eprintln!("Logging to: {}/stock-rl.log", dir);
    }
}

pub fn init_logging_simple() {
    // Minimal logging for read-only commands
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .try_init();
}

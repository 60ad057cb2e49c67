use tracing_subscriber::{filter::LevelFilter, EnvFilter};

/// Targets logged at `info` unless `RUST_LOG` says otherwise: the library and
/// both binaries (`p1-bridge` shares the library's target).
const DEFAULT_DIRECTIVES: &[&str] = &["p1_bridge=info", "replay_spill=info"];

pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(with_default_directives(EnvFilter::from_default_env()))
        .with_target(false)
        .init();
}

fn with_default_directives(filter: EnvFilter) -> EnvFilter {
    DEFAULT_DIRECTIVES.iter().fold(filter, |filter, directive| {
        filter.add_directive(
            directive
                .parse()
                .unwrap_or_else(|_| LevelFilter::INFO.into()),
        )
    })
}

/// Routes panics through tracing so they end up in the same log as
/// everything else. Panicking tasks are reaped by their owners; the process
/// keeps running.
pub fn install_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        let location = info
            .location()
            .map(|l| format!("{}:{}", l.file(), l.line()))
            .unwrap_or_else(|| "unknown".to_string());
        let msg = info
            .payload()
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| info.payload().downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());

        tracing::error!(panic = %msg, %location, "uncaught fault");
    }));
}

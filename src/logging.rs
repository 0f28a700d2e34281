//! Tracing setup, mirroring `tinyzkp_api`'s `tracing_subscriber::fmt()` init.

pub fn init() {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("LOG_LEVEL")
                .ok()
                .map(|level| format!("segmenter={level}"))
                .unwrap_or_else(|| "segmenter=info".into()),
        )
        .with_target(false)
        .compact()
        .init();
}

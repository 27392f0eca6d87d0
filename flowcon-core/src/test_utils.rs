use std::sync::Once;

static INIT: Once = Once::new();

/// Initialize a test-writer tracing subscriber once per process. Safe to
/// call from every test that wants log output under `cargo test -- --nocapture`.
pub fn init_test_logging() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("debug")
            .with_test_writer()
            .try_init();
    });
}

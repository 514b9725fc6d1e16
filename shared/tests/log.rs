use tracing::Level;

#[test]
fn rust_log_enables_debug() {
    std::env::set_var("RUST_LOG", "server=debug");
    shared::log::init_log("server=info", None).unwrap();

    assert!(tracing::enabled!(target: "server::manager", Level::DEBUG));
    assert!(!tracing::enabled!(target: "server::manager", Level::TRACE));
}

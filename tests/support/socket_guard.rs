//! Skip guard for wiremock tests in sandboxes that forbid binding localhost.

use std::net::TcpListener;
use std::panic::Location;

use wiremock::MockServer;

/// Env var that turns a skipped socket test into a failure (CI sets it).
const REQUIRE_SOCKET_TESTS_ENV: &str = "DATA_CLONER_REQUIRE_SOCKET_TESTS";

fn socket_tests_required() -> bool {
    std::env::var(REQUIRE_SOCKET_TESTS_ENV)
        .ok()
        .is_some_and(|value| matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
}

/// Starts a mock server, or returns `None` (after logging why) when the
/// environment cannot bind a localhost socket.
///
/// # Panics
///
/// Panics instead of skipping when `DATA_CLONER_REQUIRE_SOCKET_TESTS` is set.
#[track_caller]
pub fn start_mock_server_or_skip() -> impl std::future::Future<Output = Option<MockServer>> {
    let can_bind = TcpListener::bind("127.0.0.1:0").is_ok();
    let location = Location::caller();

    async move {
        if can_bind {
            return Some(MockServer::start().await);
        }
        let message = format!(
            "[socket-bound-test] {}:{} cannot bind a localhost socket",
            location.file(),
            location.line()
        );
        assert!(
            !socket_tests_required(),
            "{message}; unset {REQUIRE_SOCKET_TESTS_ENV} to allow skipping"
        );
        eprintln!("{message}; skipping. Set {REQUIRE_SOCKET_TESTS_ENV}=1 to fail instead.");
        None
    }
}

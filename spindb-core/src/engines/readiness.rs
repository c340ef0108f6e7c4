//! Bounded readiness polling for freshly started servers.

use std::future::Future;
use std::time::Duration;

use tokio::time::{Instant, sleep};
use tracing::{debug, trace};

use spindb_model::SpinError;

const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Poll `probe` until it returns true or `timeout` elapses.
///
/// The probe is a trivial query or health request; it must be cheap and
/// side-effect free, since it runs every half second until the engine
/// answers.
pub async fn wait_until_ready<F, Fut>(
    what: &str,
    timeout: Duration,
    probe: F,
) -> Result<(), SpinError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Instant::now() + timeout;
    let mut attempts: u32 = 0;
    loop {
        attempts += 1;
        if probe().await {
            debug!(what, attempts, "ready");
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(SpinError::StartFailed {
                engine: String::new(),
                container: what.to_string(),
                reason: format!(
                    "not ready after {}s",
                    timeout.as_secs()
                ),
            });
        }
        trace!(what, attempts, "not ready yet");
        sleep(POLL_INTERVAL).await;
    }
}

/// TCP connect probe against `127.0.0.1:port`.
pub async fn tcp_probe(port: u16) -> bool {
    tokio::net::TcpStream::connect(("127.0.0.1", port))
        .await
        .is_ok()
}

/// HTTP GET probe expecting any 2xx.
pub async fn http_probe(url: &str) -> bool {
    match reqwest::get(url).await {
        Ok(resp) => resp.status().is_success(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[tokio::test]
    async fn succeeds_once_the_probe_flips() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);
        wait_until_ready("test", Duration::from_secs(5), move || {
            let c = Arc::clone(&c);
            async move { c.fetch_add(1, Ordering::SeqCst) >= 2 }
        })
        .await
        .unwrap();
        assert!(calls.load(Ordering::SeqCst) >= 3);
    }

    #[tokio::test]
    async fn times_out_when_probe_never_passes() {
        let err = wait_until_ready(
            "test",
            Duration::from_millis(10),
            || async { false },
        )
        .await
        .unwrap_err();
        assert_eq!(err.code(), "PROCESS_START_FAILED");
    }

    #[tokio::test]
    async fn tcp_probe_sees_a_listener() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .unwrap();
        let port = listener.local_addr().unwrap().port();
        assert!(tcp_probe(port).await);
        drop(listener);
    }
}

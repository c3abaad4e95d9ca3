use tokio::task::JoinHandle;
use tokio::{select, signal};
use tracing::{debug, error, warn};

use s3relay::types::token::RunCancellationToken;

/// Cancels the run on the first Ctrl-C. In-flight copies are left to finish.
pub fn spawn_ctrl_c_handler(cancellation_token: RunCancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        select! {
            _ = cancellation_token.cancelled() => {
                debug!("run cancellation token cancelled.");
            }
            result = signal::ctrl_c() => {
                match result {
                    Ok(()) => {
                        warn!("ctrl-c received, no new transfers will be started.");
                        cancellation_token.cancel();
                    }
                    Err(e) => {
                        error!(error = e.to_string(), "failed to listen for ctrl-c signal.");
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use once_cell::sync::Lazy;
    use tokio::sync::Semaphore;

    use s3relay::types::token::create_run_cancellation_token;

    use super::*;

    // Signal tests must not overlap.
    static SEMAPHORE: Lazy<Arc<Semaphore>> = Lazy::new(|| Arc::new(Semaphore::new(1)));

    #[tokio::test]
    #[cfg(target_family = "unix")]
    async fn cancel_on_sigint() {
        const HANDLER_START_WAIT_MILLIS: u64 = 100;

        init_dummy_tracing_subscriber();

        let _permit = SEMAPHORE.clone().acquire_owned().await.unwrap();

        let cancellation_token = create_run_cancellation_token();
        let join_handle = spawn_ctrl_c_handler(cancellation_token.clone());
        tokio::time::sleep(std::time::Duration::from_millis(HANDLER_START_WAIT_MILLIS)).await;

        nix::sys::signal::kill(nix::unistd::Pid::this(), nix::sys::signal::Signal::SIGINT)
            .unwrap();

        join_handle.await.unwrap();
        assert!(cancellation_token.is_cancelled());
    }

    #[tokio::test]
    async fn stop_when_run_is_cancelled() {
        init_dummy_tracing_subscriber();

        let _permit = SEMAPHORE.clone().acquire_owned().await.unwrap();

        let cancellation_token = create_run_cancellation_token();
        let join_handle = spawn_ctrl_c_handler(cancellation_token.clone());
        cancellation_token.cancel();

        join_handle.await.unwrap();
        assert!(cancellation_token.is_cancelled());
    }

    fn init_dummy_tracing_subscriber() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("dummy=trace")
            .try_init();
    }
}

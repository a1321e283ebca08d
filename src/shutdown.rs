//! Process shutdown wiring.
//!
//! Every binary owns one root [`CancellationToken`]; SIGINT or SIGTERM
//! cancels it and each worker loop observes the cancellation at its next
//! suspension point.

use tokio_util::sync::CancellationToken;
use tracing::info;

/// Returns a token that is cancelled on SIGINT or SIGTERM.
pub fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();

    tokio::spawn(async move {
        let ctrl_c = async {
            tokio::signal::ctrl_c()
                .await
                .expect("install SIGINT handler");
        };

        #[cfg(unix)]
        let terminate = async {
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("install SIGTERM handler")
                .recv()
                .await;
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            () = ctrl_c => info!("received SIGINT, shutting down"),
            () = terminate => info!("received SIGTERM, shutting down"),
        }

        trigger.cancel();
    });

    token
}

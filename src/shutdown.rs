//! Process signals for the scheduler.
//!
//! The first SIGINT/SIGTERM cancels the runner's [`CancellationToken`]: the
//! run in flight drains (pages, commit, hooks) and no further run starts. The
//! webhook listener shares a child token and stops accepting at the same
//! time. A second signal abandons the drain and exits with status 130; the
//! uncommitted cursor means the next start re-reads the same changes.

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Exit status used when a second signal abandons the drain
pub const FORCE_EXIT_CODE: i32 = 130;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SignalAction {
    Drain,
    ForceExit,
}

/// What a signal means, given how many arrived before it.
fn action_for(previous_signals: u32) -> SignalAction {
    if previous_signals == 0 {
        SignalAction::Drain
    } else {
        SignalAction::ForceExit
    }
}

#[cfg(unix)]
async fn next_signal(sigterm: &mut tokio::signal::unix::Signal) -> &'static str {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => "SIGINT",
        _ = sigterm.recv() => "SIGTERM",
    }
}

/// Install signal handlers and return the token cancelled on the first
/// SIGINT / SIGTERM.
pub fn install_signal_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let handler_token = token.clone();

    tokio::spawn(async move {
        #[cfg(unix)]
        let mut sigterm = {
            use tokio::signal::unix::{signal, SignalKind};
            signal(SignalKind::terminate()).expect("failed to register SIGTERM handler")
        };

        let mut received = 0u32;
        loop {
            #[cfg(unix)]
            let name = next_signal(&mut sigterm).await;
            #[cfg(not(unix))]
            let name = {
                tokio::signal::ctrl_c()
                    .await
                    .expect("failed to listen for Ctrl+C");
                "Ctrl+C"
            };

            match action_for(received) {
                SignalAction::Drain => {
                    info!(
                        "Received {}, letting the current sync run finish before exiting \
                         (signal again to abort it)",
                        name
                    );
                    handler_token.cancel();
                }
                SignalAction::ForceExit => {
                    warn!(
                        "Received {} again, aborting; the next start resumes from the last committed cursor",
                        name
                    );
                    std::process::exit(FORCE_EXIT_CODE);
                }
            }
            received += 1;
        }
    });

    token
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_signal_drains_second_forces_exit() {
        assert_eq!(action_for(0), SignalAction::Drain);
        assert_eq!(action_for(1), SignalAction::ForceExit);
        assert_eq!(action_for(5), SignalAction::ForceExit);
    }
}

use std::sync::OnceLock;

use crossbeam_channel::Receiver;

use crate::TestRunner;

static SHUTDOWN_RECEIVER: OnceLock<Option<Receiver<()>>> = OnceLock::new();

/// Receives a message on every Ctrl+C.
///
/// The signal handler is installed on first use; `None` when it could not be
/// installed.
pub fn shutdown_receiver() -> Option<&'static Receiver<()>> {
    SHUTDOWN_RECEIVER
        .get_or_init(|| {
            let (sender, receiver) = crossbeam_channel::unbounded();
            match ctrlc::set_handler(move || {
                let _ = sender.send(());
            }) {
                Ok(()) => Some(receiver),
                Err(err) => {
                    tracing::warn!("Failed to install the Ctrl+C handler: {err}");
                    None
                }
            }
        })
        .as_ref()
}

/// Runs `run`, cancelling `runner` when a shutdown is requested meanwhile.
pub fn run_until_shutdown<T>(
    runner: &dyn TestRunner,
    shutdown: Option<&Receiver<()>>,
    run: impl FnOnce() -> T,
) -> T {
    let Some(shutdown) = shutdown else {
        return run();
    };

    let (done_sender, done_receiver) = crossbeam_channel::bounded::<()>(0);

    std::thread::scope(|scope| {
        scope.spawn(|| {
            crossbeam_channel::select! {
                recv(shutdown) -> _ => {
                    tracing::info!("Shutdown requested, cancelling the test run");
                    runner.cancel();
                }
                recv(done_receiver) -> _ => {}
            }
        });

        let result = run();
        drop(done_sender);
        result
    })
}

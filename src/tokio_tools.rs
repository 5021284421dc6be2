use std::future::Future;

use tokio::task::JoinHandle;

/// Spawns a background task under a stable name: a real task name on
/// `tokio_unstable` builds, a `task` span carrying the name otherwise.
pub fn spawn_named_task<F, S>(name: S, future: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
    S: Into<String>,
{
    let name = name.into();
    #[cfg(tokio_unstable)]
    {
        match tokio::task::Builder::new().name(&name).spawn(future) {
            Ok(handle) => handle,
            Err(err) => panic!("failed to spawn task {name}: {err}"),
        }
    }
    #[cfg(not(tokio_unstable))]
    {
        use tracing::Instrument;
        let span = tracing::info_span!("task", task_name = %name);
        tokio::spawn(future.instrument(span))
    }
}

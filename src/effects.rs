use std::future::Future;

/// Run a best-effort side effect on its own task. Failures are logged and
/// never reach the caller; required steps must not go through here.
pub fn fire_and_forget<F>(label: &'static str, effect: F)
where
    F: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(error) = effect.await {
            tracing::warn!(label, error = ?error, "side effect failed");
        }
    });
}

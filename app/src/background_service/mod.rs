/// A long-running task owned by `main`, spawned onto its own `tokio` task and aborted on
/// shutdown. This crate only ever runs one such service (the supervisor), so no registry or DI
/// container is needed around it.
#[async_trait::async_trait]
pub trait BackgroundService {
    async fn run(&self);
}

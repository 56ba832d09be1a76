#[async_trait::async_trait]
pub trait Driver: Send + Sync {
    /// Runs until the application's stop signal fires.
    async fn run(&self) -> ();

    fn name(&self) -> &'static str;
}

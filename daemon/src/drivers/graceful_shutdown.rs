use log::{debug, error, info};
use std::future::Future;
use tokio::task::JoinSet;

use super::driver::Driver;
use std::sync::Arc;
use tokio::sync::Notify;

pub struct GracefulShutdown {
    drivers: Vec<Arc<dyn Driver>>,
}

impl GracefulShutdown {
    pub fn new() -> Self {
        Self { drivers: vec![] }
    }
}

impl Default for GracefulShutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl GracefulShutdown {
    pub fn add_driver(&mut self, driver: impl Driver + 'static) {
        self.drivers.push(Arc::new(driver));
    }

    /// Runs every driver until Ctrl-C.
    pub async fn watch(self, stop_notify: Arc<Notify>) {
        self.watch_until(stop_notify, async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                error!("can't install ctrl+c signal handler: {}", err);
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Runs every driver until `signal` resolves, then notifies them and
    /// waits for all of them to return.
    pub async fn watch_until<S>(mut self, stop_notify: Arc<Notify>, signal: S)
    where
        S: Future<Output = ()> + Send + 'static,
    {
        let shutdown = async move {
            signal.await;
            info!("stop requested");
            stop_notify.notify_waiters();
        };

        let mut join_set = JoinSet::new();
        for driver in self.drivers.drain(..) {
            join_set.spawn(async move {
                driver.run().await;
                debug!("driver {} stopped", driver.name());
            });
        }

        join_set.spawn(shutdown);
        debug!("graceful shutdown start watching");
        join_set.join_all().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    struct WaitForStop {
        stop_notify: Arc<Notify>,
        stopped: Arc<AtomicBool>,
    }

    #[async_trait::async_trait]
    impl Driver for WaitForStop {
        async fn run(&self) {
            self.stop_notify.notified().await;
            self.stopped.store(true, Ordering::SeqCst);
        }

        fn name(&self) -> &'static str {
            "wait"
        }
    }

    #[tokio::test]
    async fn drivers_stop_on_signal() {
        let stop_notify = Arc::new(Notify::new());
        let stopped = Arc::new(AtomicBool::new(false));
        let mut gs = GracefulShutdown::new();
        gs.add_driver(WaitForStop {
            stop_notify: stop_notify.clone(),
            stopped: stopped.clone(),
        });

        let signal = tokio::time::sleep(Duration::from_millis(50));
        tokio::time::timeout(Duration::from_secs(5), gs.watch_until(stop_notify, signal))
            .await
            .unwrap();
        assert!(stopped.load(Ordering::SeqCst));
    }
}

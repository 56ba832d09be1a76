use crate::app::AppState;
use crate::drivers::Driver;
use crate::publish::Publisher;
use log::{debug, info, warn};
use tokio::time::MissedTickBehavior;

/// 周期性扫描实例目录, 渲染摘要并在变化时发布
pub struct FleetDriver {
    app_state: AppState,
}

impl FleetDriver {
    pub fn new(app_state: AppState) -> Self {
        Self { app_state }
    }

    async fn cycle(&self, publisher: Option<&mut Publisher>, first: bool) {
        let registry = &self.app_state.registry;
        registry.rescan().await;

        if first && self.app_state.config.fleet.autostart_on_boot {
            for (id, result) in registry.autostart_all().await {
                if let Ok(outcome) = result {
                    info!("autostart of {} finished: {:?}", id, outcome);
                }
            }
        }

        if let Some(publisher) = publisher {
            let summary = registry.render_summary().await;
            match publisher.publish(&summary).await {
                Ok(true) => debug!("summary published"),
                Ok(false) => {}
                Err(err) => warn!("{:#}", err),
            }
        }
    }
}

#[async_trait::async_trait]
impl Driver for FleetDriver {
    async fn run(&self) -> () {
        let config = &self.app_state.config;
        // 在第一次扫描之前注册, 扫描过程中到达的停止信号不会丢失
        let stop = self.app_state.stop_notify.notified();
        tokio::pin!(stop);
        stop.as_mut().enable();

        let mut publisher = config
            .publisher
            .enabled
            .then(|| Publisher::from_config(&config.publisher));
        let mut interval = tokio::time::interval(config.fleet.scan_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "watching {} every {:?}",
            config.fleet.root.display(),
            config.fleet.scan_interval()
        );
        let mut first = true;
        loop {
            tokio::select! {
                biased;
                _ = &mut stop => break,
                _ = interval.tick() => {}
            }
            self.cycle(publisher.as_mut(), first).await;
            first = false;
        }

        self.app_state.registry.shutdown().await;
    }

    fn name(&self) -> &'static str {
        "fleet"
    }
}

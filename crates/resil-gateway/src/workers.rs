//! Background workers
//!
//! Two long-running tasks beside the ingress handlers: the node-health
//! poller and the gradual-revert stepper. Both take the controller lock
//! only for point updates and sleep outside it.

use crate::forward::Forwarder;
use resil_control::Controller;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, RwLock};
use tracing::{debug, warn};

/// Poll downstream tier servers and feed readings into the controller.
///
/// Each URL's reading applies to every topology node mapped onto that
/// tier name. An unreachable tier marks its nodes down; the first
/// successful poll afterwards marks them recovered.
pub async fn run_health_poller(
    controller: Arc<RwLock<Controller>>,
    forwarder: Arc<dyn Forwarder>,
    downstream_urls: BTreeMap<String, String>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => {
                debug!("health poller stopping");
                return;
            }
        }

        for (tier_name, url) in &downstream_urls {
            let result = forwarder.poll_health(url).await;

            let mut controller = controller.write().await;
            let node_ids: Vec<u32> = controller
                .topology()
                .nodes()
                .filter(|n| &n.physical_map == tier_name)
                .map(|n| n.id)
                .collect();

            match result {
                Ok(health) => {
                    for node_id in node_ids {
                        controller.set_node_health(node_id, health);
                    }
                }
                Err(e) => {
                    warn!(tier = %tier_name, error = %e, "health poll failed");
                    for node_id in node_ids {
                        controller.mark_node_down(node_id);
                    }
                }
            }
        }
    }
}

/// Drive recovery transitions and apply gradual-revert steps at their
/// scheduled times.
pub async fn run_revert_stepper(
    controller: Arc<RwLock<Controller>>,
    tick: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(tick);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => {
                debug!("revert stepper stopping");
                return;
            }
        }

        let schedule = {
            let mut controller = controller.write().await;
            controller.recovery_tick(Instant::now())
        };
        let Some(schedule) = schedule else {
            continue;
        };

        for step in &schedule.steps {
            let deadline = tokio::time::Instant::from_std(step.at);
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => {}
                _ = shutdown.changed() => {
                    debug!("revert stepper stopping mid-schedule");
                    return;
                }
            }
            let mut controller = controller.write().await;
            if controller.apply_revert_step(step) {
                debug!(at = ?step.at, "revert step applied");
            }
        }
    }
}

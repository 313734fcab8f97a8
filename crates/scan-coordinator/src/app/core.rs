use anyhow::Result;

use crate::app::services::ApplicationServices;
use crate::app::tasks::Tasks;
use crate::config::DaemonArgs;
use crate::domain::ModelCoordinator;

/// Application core structure with explicit dependencies
pub struct Application {
    services: ApplicationServices,
    /// Taken by the task manager when the coordinator task starts
    coordinator: Option<ModelCoordinator>,
    daemon_args: DaemonArgs,
}

impl Application {
    pub fn new(
        services: ApplicationServices,
        coordinator: ModelCoordinator,
        daemon_args: DaemonArgs,
    ) -> Self {
        Self {
            services,
            coordinator: Some(coordinator),
            daemon_args,
        }
    }

    pub fn services(&self) -> &ApplicationServices {
        &self.services
    }

    pub fn daemon_args(&self) -> &DaemonArgs {
        &self.daemon_args
    }

    pub(crate) fn take_coordinator(&mut self) -> Option<ModelCoordinator> {
        self.coordinator.take()
    }

    /// Run application, start all tasks and wait for completion
    pub async fn run(&mut self) -> Result<()> {
        tracing::info!("Starting all application tasks...");

        let mut tasks = Tasks::new();

        if let Err(e) = tasks.spawn_all_tasks(self) {
            tracing::error!("Failed to spawn application tasks: {e}");
            return Err(e);
        }

        if let Err(e) = tasks.wait_for_completion().await {
            tracing::error!("Error during task execution: {e}");
            return Err(e);
        }

        tracing::info!("Application run completed");
        Ok(())
    }
}

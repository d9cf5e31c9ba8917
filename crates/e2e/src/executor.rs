//! Executes parsed action steps against a page

use std::time::Duration;
use tracing::{debug, info};

use beaconcheck_common::ActionStep;

use crate::driver::PageDriver;
use crate::error::E2eResult;

#[derive(Debug, Clone, Copy)]
pub struct ActionExecutor {
    element_timeout: Duration,
    settle: Duration,
}

impl ActionExecutor {
    pub fn new(element_timeout: Duration, settle: Duration) -> Self {
        Self {
            element_timeout,
            settle,
        }
    }

    /// Wait for the step's element, perform the step, then settle.
    ///
    /// A missing element surfaces as `ElementNotFound` and the step is not
    /// attempted.
    pub async fn execute(&self, page: &mut dyn PageDriver, step: &ActionStep) -> E2eResult<()> {
        debug!("{}: waiting for element", step.name());
        page.wait_for_visible(step.locator(), self.element_timeout).await?;

        match step {
            ActionStep::Click { locator } => {
                info!("Clicking {}", locator);
                page.click(locator).await?;
            }
            ActionStep::Type { locator, value } => {
                info!("Typing '{}' into {}", value, locator);
                page.type_text(locator, value).await?;
            }
            ActionStep::Select { locator, value } => {
                info!("Selecting '{}' in {}", value, locator);
                page.select_option(locator, value).await?;
            }
        }

        if !self.settle.is_zero() {
            tokio::time::sleep(self.settle).await;
        }
        Ok(())
    }

    /// Execute steps in order, stopping at the first failure
    pub async fn run_steps(&self, page: &mut dyn PageDriver, steps: &[ActionStep]) -> E2eResult<()> {
        for step in steps {
            self.execute(page, step).await?;
        }
        Ok(())
    }
}

//! Ordered named steps and the driver that runs them

use std::future::Future;
use std::pin::Pin;
use tracing::{error, info};

use crate::error::StepError;

pub type StepFuture<'a> = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>>;

/// One state of an orchestration; it mutates the shared context and may fail.
pub struct Step<C> {
    pub name: &'static str,
    pub run: for<'a> fn(&'a mut C) -> StepFuture<'a>,
}

impl<C> Step<C> {
    pub fn new(name: &'static str, run: for<'a> fn(&'a mut C) -> StepFuture<'a>) -> Self {
        Self { name, run }
    }
}

/// Run steps in order, stopping at the first failure.
pub async fn run_steps<C: Send>(
    orchestration: &'static str,
    steps: &[Step<C>],
    ctx: &mut C,
) -> Result<(), StepError> {
    for (index, step) in steps.iter().enumerate() {
        info!("{}: step {}/{}: {}", orchestration, index + 1, steps.len(), step.name);
        if let Err(source) = (step.run)(ctx).await {
            error!("{}: step {} failed: {:#}", orchestration, step.name, source);
            return Err(StepError {
                orchestration,
                step: step.name,
                source,
            });
        }
    }
    Ok(())
}

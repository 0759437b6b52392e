use std::convert::Infallible;
use std::fmt::{Debug, Display};
use std::future::Future;

/// The long running agent whose lifecycle the service exposes.
///
/// `start` may return as soon as the agent is up or keep running until the
/// agent ends; an error means the agent could not run and ends the service
/// run. `stop` must not return until the agent has stopped, it is called
/// exactly once per run.
///
/// `start` runs concurrently with the control loop, so `stop` can arrive
/// before `start` has begun or while it is still in progress. A `start` that
/// is overtaken by `stop` must return without leaving anything running, the
/// controller waits for it before reporting `Stopped`.
pub trait AgentWorker: Send + Sync + 'static {
    type Error: Debug + Display + Send + 'static;

    fn start(&self) -> impl Future<Output = Result<(), Self::Error>> + Send;

    fn stop(&self) -> impl Future<Output = ()> + Send;
}

/// Best effort configuration steps performed before the agent starts.
/// Failures are reported as warnings and never stop the service.
pub trait ConfigRecovery: Send + Sync {
    type Error: Display;

    fn import_legacy_config(&self) -> impl Future<Output = Result<(), Self::Error>> + Send;

    fn upgrade_config(&self) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoRecovery;

impl ConfigRecovery for NoRecovery {
    type Error = Infallible;

    async fn import_legacy_config(&self) -> Result<(), Infallible> {
        Ok(())
    }

    async fn upgrade_config(&self) -> Result<(), Infallible> {
        Ok(())
    }
}

//! Simulated cluster errors.

use thiserror::Error;

use slotmaster_core::ContainerId;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("resource manager client not started")]
    NotStarted,

    #[error("resource manager client already started")]
    AlreadyStarted,

    #[error("registration refused")]
    RegistrationRefused,

    #[error("unregistration refused")]
    UnregistrationRefused,

    #[error("unknown container: {0}")]
    UnknownContainer(ContainerId),

    #[error("container {0} already launched")]
    AlreadyLaunched(ContainerId),

    #[error("node manager on {0} refused the launch")]
    LaunchRefused(String),

    #[error("no tokio runtime to run event delivery on")]
    NoRuntime,
}

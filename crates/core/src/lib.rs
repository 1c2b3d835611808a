pub mod config;
pub mod domain;
pub mod envfile;
pub mod errors;
pub mod naming;
pub mod provision;
pub mod runtime;
pub mod store;
pub mod toggle;

pub use domain::gateway::{GatewayLink, GATEWAY_URL_KEY};
pub use domain::workspace::{Environment, Namespace, Workspace, WorkspaceId};
pub use envfile::EnvFile;
pub use errors::{
    ConfigWriteError, DomainError, RestartFailedError, RollbackOutcome, ToggleError, WritePhase,
};
pub use runtime::{ComposeRuntime, RecordingRuntime, RuntimeError, WorkspaceRuntime};
pub use store::{ConfigLock, FsConfigStore, InMemoryConfigStore, StoreError, WorkspaceConfigStore};
pub use toggle::{GatewayToggle, ToggleAction, ToggleOutcome};

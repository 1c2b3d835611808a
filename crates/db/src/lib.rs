pub mod connection;
pub mod migrations;
pub mod repositories;

pub use connection::{connect_with_settings, open_registry, DbPool, OpenError};
pub use repositories::{
    InMemoryWorkspaceRepository, RegisteredWorkspace, RepositoryError, SqlWorkspaceRepository,
    WorkspaceRepository,
};

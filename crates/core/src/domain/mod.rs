pub mod gateway;
pub mod workspace;

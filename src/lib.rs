// Library for tests to access modules

pub mod config;
pub mod docker_repo;
pub mod error;
pub mod events;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod processor;
pub mod reconciler;
pub mod routes;
pub mod sync_repo;
pub mod worker;

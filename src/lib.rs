//! TaskMate terminal client: projects, kanban boards and account flows
//! against the TaskMate REST API.

pub mod api;
pub mod app;
pub mod auth;
pub mod config;
pub mod errors;
pub mod form;
pub mod kanban_board;
pub mod logging;
pub mod member;
pub mod members;
pub mod project;
pub mod project_list;
pub mod route;
pub mod session;
pub mod task;
pub mod token_flow;
pub mod ui;
pub mod validation;

pub use api::ApiClient;
pub use config::Config;
pub use errors::{ApiError, AuthError, BoardError, ConfigError, ValidationError};
pub use session::Session;

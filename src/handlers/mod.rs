pub mod action;
pub mod api_error;
pub mod auth;
pub mod http;

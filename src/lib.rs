pub mod api;
pub mod auth;
pub mod cli;
pub mod config;
pub mod database;
pub mod dispatch;
pub mod error;
pub mod files;
pub mod filter;
pub mod handlers;
pub mod middleware;
pub mod server;
pub mod workflow;

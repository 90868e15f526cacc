//! Task lifecycle engine for a hyper-local freelance marketplace: race-safe
//! acceptance, OTP-gated start and finish, and a fixed status transition table,
//! served over HTTP/JSON and administered from the `taskmarket` CLI.

pub mod auth;
pub mod build_info;
pub mod commands;
pub mod config;
pub mod discovery;
pub mod error;
pub mod geo;
pub mod http;
pub mod lifecycle;
pub mod model;
pub mod observability;
pub mod output;
pub mod payment;
pub mod store;

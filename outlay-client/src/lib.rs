//! Outlay client library exports.

pub mod api_client;
pub mod client;
pub mod config;
pub mod error;
pub mod expenses;
pub mod notifications;
pub mod telemetry;
pub mod upload;

pub use client::ExpenseClient;
pub use error::{ClientError, ClientResult};

//! valvoja: keeps a single outage incident in a GitHub repository in sync
//! with the reachability of one HTTP endpoint.
//!
//! Each pass lists the open incident ticket, probes the endpoint and either
//! opens an incident (content file + ticket), resolves it, or does nothing.
//! Chat notifications and dead-man's-switch pings are best-effort.

pub mod config;
pub mod controller;
pub mod github;
pub mod incident;
pub mod runner;

//! Mojeeb session - token lifecycle for the Mojeeb admin dashboard
//!
//! This library provides the session subsystem for Mojeeb dashboard
//! clients: encrypted token storage, session state with rehydration,
//! proactive background token refresh, and startup/resume reconciliation.

pub mod config;
pub mod models;
pub mod services;
pub mod storage;

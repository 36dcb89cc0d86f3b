//! Heritage - Historic sites administration backend
//!
//! This library provides the core functionality for the Heritage system:
//! the admin API used by staff to curate historic sites and the public
//! portal API used by visitors.

pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
pub mod storage;
pub mod views;

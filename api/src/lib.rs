pub mod aggregate;
pub mod auth;
pub mod bucket;
pub mod config;
pub mod db;
pub mod errors;
pub mod metrics;
pub mod model;
pub mod rest;
pub mod store;
pub mod validate;

//! Marketplace Auth Library
//!
//! Sign-In-With-Ethereum login and session lifecycle for the marketplace
//! backend: nonce issuance, SIWE verification, rotating refresh tokens with
//! reuse detection, and the HTTP surface in front of them.

pub mod audit;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod handlers;
pub mod identity;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod state;
pub mod store;

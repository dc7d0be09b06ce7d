//! Tenant Limiter - per-tenant fixed-window rate limiting
//!
//! This crate decides whether a request may proceed based on the rules a
//! tenant has configured. Rules count requests tenant-wide, per source
//! address, or per target matching a glob pattern, using fixed time windows
//! kept in a shared counter store. Failures in the limiting infrastructure
//! never block traffic: the decision API fails open.

pub mod config;
pub mod error;
pub mod ratelimit;

//! Cache module - Content-addressed caption cache
//!
//! Provides:
//! - Cache storage (one JSON entry per image identity)
//! - Cache index management (index.json)
//! - Freshness policy, clear and stats

pub mod index;
pub mod store;

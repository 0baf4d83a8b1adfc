//! Link graph engine: parsing, resolution and the in-memory index.
//!
//! # Responsibility
//! - Turn note bodies into link tokens (`parser`).
//! - Map tokens onto note ids, creating missing targets (`resolver`).
//! - Keep outbound/inbound edges consistent across the corpus (`index`).
//!
//! # Invariants
//! - Nothing in this module performs store I/O except through the
//!   `TargetFactory` handed to the resolver.

pub mod catalog;
pub mod index;
pub mod parser;
pub mod resolver;

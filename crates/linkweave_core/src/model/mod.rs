//! Domain model for notes and the links between them.
//!
//! # Responsibility
//! - Define the canonical note record and its stable identity.
//! - Define link tokens (parse output) and resolved graph edges.
//! - Define note templates.
//!
//! # Invariants
//! - A note `id` never changes across renames.
//! - A daily note carries exactly one `date_key`; normal notes carry none.

pub mod link;
pub mod note;
pub mod template;

//! CLI smoke entry point.
//!
//! # Responsibility
//! - Verify `linkweave_core` linkage with deterministic output.
//! - With a database path, bootstrap the link graph and print its counters.

use linkweave_core::{EngineConfig, NoteGraph, SqliteNoteStore};
use std::process::ExitCode;
use std::sync::Arc;

fn main() -> ExitCode {
    println!("linkweave_core ping={}", linkweave_core::ping());
    println!("linkweave_core version={}", linkweave_core::core_version());

    let Some(db_path) = std::env::args().nth(1) else {
        return ExitCode::SUCCESS;
    };
    match print_stats(&db_path) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("linkweave_cli error={message}");
            ExitCode::FAILURE
        }
    }
}

fn print_stats(db_path: &str) -> Result<(), String> {
    let store = SqliteNoteStore::open(db_path).map_err(|err| err.to_string())?;
    let graph =
        NoteGraph::open(Arc::new(store), EngineConfig::default()).map_err(|err| err.to_string())?;
    let stats = graph.stats();
    println!("notes={}", stats.notes);
    println!("links={}", stats.links);
    println!("dangling_links={}", stats.dangling_links);
    println!("pending={}", graph.pending_notes().len());
    Ok(())
}

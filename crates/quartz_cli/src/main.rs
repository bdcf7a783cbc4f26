//! CLI smoke entry point.
//!
//! # Responsibility
//! - Start logging and open the store configured by `QUARTZ_*` environment
//!   variables.
//! - Print subjects with their session counts for quick local checks.

use quartz_core::{PersistenceStore, StoreConfig, TimeTrackingService};
use std::process::ExitCode;

fn main() -> ExitCode {
    println!("quartz_core version={}", quartz_core::core_version());
    if let Err(err) = quartz_core::init_logging_from_env() {
        eprintln!("quartz logging disabled: {err}");
    }

    let config = StoreConfig::from_env();
    let store = match PersistenceStore::open(config) {
        Ok(store) => store,
        Err(err) => {
            eprintln!("quartz store open failed: {err}");
            return ExitCode::FAILURE;
        }
    };
    println!(
        "quartz store container={} merge_policy={}",
        store.config().cloud_container,
        store.merge_policy().as_str()
    );

    let service = TimeTrackingService::new(&store);
    match service.list_subject_summaries(None) {
        Ok(summaries) => {
            println!("subjects={}", summaries.len());
            for summary in summaries {
                println!(
                    "  {} sessions={} id={}",
                    summary.subject.name, summary.session_count, summary.subject.id
                );
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("quartz subject listing failed: {err}");
            ExitCode::FAILURE
        }
    }
}

//! CLI smoke entry point.
//!
//! # Responsibility
//! - Verify `itemstore_core` linkage and backend wiring.
//! - Start the core file logger from `ITEMSTORE_LOG_LEVEL` / `ITEMSTORE_LOG_DIR`.
//! - Run one create-then-update round against the configured backend.

use itemstore_core::{
    init_logging, open_item_repository, ItemService, LogConfig, StoreConfig, UpsertItemSpec,
};
use std::error::Error;
use std::process::ExitCode;

fn main() -> ExitCode {
    println!("itemstore_core ping={}", itemstore_core::ping());
    println!("itemstore_core version={}", itemstore_core::core_version());

    if let Err(err) = start_logging() {
        eprintln!("itemstore smoke failed: {err}");
        return ExitCode::FAILURE;
    }

    match run_smoke() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("itemstore smoke failed: {err}");
            ExitCode::FAILURE
        }
    }
}

fn start_logging() -> Result<(), Box<dyn Error>> {
    let log = LogConfig::from_env()?;
    let dir = log.dir.to_str().ok_or("log directory is not valid UTF-8")?;
    init_logging(log.level.as_str(), dir)?;
    println!("log_level={} log_dir={dir}", log.level.as_str());
    Ok(())
}

fn run_smoke() -> Result<(), Box<dyn Error>> {
    let config = StoreConfig::from_env()?;
    println!("driver={}", config.driver.as_str());

    let service = ItemService::new(open_item_repository(&config)?);
    let created = UpsertItemSpec::new(
        "Item one",
        "Description one",
        vec!["tag1".to_string(), "tag2".to_string()],
    );
    let id = service.create_item(&created, "creator")?;
    report(&service, &id)?;

    let updated = UpsertItemSpec::new(
        "Item one v2",
        "Description one v2",
        vec!["tag2".to_string()],
    );
    service.update_item(&id, &updated, 1, "updater")?;
    report(&service, &id)?;

    println!(
        "tag1_hits={} tag2_hits={}",
        service.get_items_by_tag("tag1")?.len(),
        service.get_items_by_tag("tag2")?.len()
    );
    Ok(())
}

fn report<R: itemstore_core::ItemRepository>(
    service: &ItemService<R>,
    id: &str,
) -> Result<(), Box<dyn Error>> {
    match service.get_item_by_id(id)? {
        Some(item) => println!(
            "item id={} version={} tags={:?} modified_by={}",
            item.id, item.version, item.tags, item.modified_by
        ),
        None => println!("item id={id} missing"),
    }
    Ok(())
}

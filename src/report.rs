//! Console output for the inventory and change stream.
#![cfg_attr(not(windows), allow(dead_code))]

use storwatch_core::{Storage, StorageChange};

/// One line per storage, plain or JSON.
pub fn inventory_lines(storages: &[Storage], json: bool) -> serde_json::Result<Vec<String>> {
    if json {
        return storages.iter().map(serde_json::to_string).collect();
    }
    if storages.is_empty() {
        return Ok(vec!["No storage devices found".to_owned()]);
    }
    Ok(storages.iter().map(describe).collect())
}

pub fn change_line(change: &StorageChange, json: bool) -> serde_json::Result<String> {
    if json {
        return serde_json::to_string(change);
    }
    Ok(format!(
        "{} {:<7} {}",
        change.observed_at.format("%H:%M:%S"),
        change.kind.label(),
        describe(&change.storage)
    ))
}

fn describe(storage: &Storage) -> String {
    let controller = if storage.controller().is_empty() {
        "(probed)"
    } else {
        storage.controller()
    };
    format!("{:<10} {:<12} {}", storage.key().to_string(), controller, storage.path())
}

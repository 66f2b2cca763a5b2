//! Terminal output for the CLI.

use crate::format::format_number;
use crate::model::{Calculation, PendingSyncItem, Record};
use crate::store::{Statistics, StorageInfo};

const SEPARATOR: &str = "────────────────────────────────────────";

/// Prints records one per line, newest first as given.
pub fn print_records(records: &[Record]) {
    if records.is_empty() {
        println!("No records found.");
        return;
    }

    println!("\n{SEPARATOR}");
    for record in records {
        let phone = record.phone.as_deref().unwrap_or("-");
        println!(
            "  {}  {} <{}>  {}  [{}]",
            record.id,
            record.name,
            record.email,
            phone,
            record.category.label()
        );
        if let Some(note) = record.note.as_deref() {
            println!("      {note}");
        }
    }
    println!("{SEPARATOR}");
    println!("  {} record(s)", records.len());
    println!("{SEPARATOR}\n");
}

/// Prints calculator history, most recent last.
pub fn print_history(calculations: &[Calculation]) {
    if calculations.is_empty() {
        println!("No calculations yet.");
        return;
    }

    for calc in calculations {
        println!(
            "  {}  {} = {}",
            calc.timestamp.format("%Y-%m-%d %H:%M:%S"),
            calc.expression,
            format_number(calc.result)
        );
    }
}

pub fn print_pending(items: &[PendingSyncItem]) {
    if items.is_empty() {
        println!("Nothing pending.");
        return;
    }

    for item in items {
        println!("  {}  {}  {}", item.id, item.kind, item.timestamp.to_rfc3339());
    }
    println!("  {} item(s) waiting to sync", items.len());
}

pub fn print_storage_info(info: &StorageInfo) {
    println!("\n{SEPARATOR}");
    println!("Storage");
    println!("{SEPARATOR}");
    println!("  Records:           {}", info.total_items);
    println!("  Calculations:      {}", info.total_calculations);
    println!("  Pending sync:      {}", info.pending_sync_items);
    println!("  Size:              {}", info.storage_size());
    println!("  Last access:       {}", info.last_access.to_rfc3339());
    println!("  Version:           {}", info.version);
    println!("{SEPARATOR}\n");
}

pub fn print_statistics(stats: &Statistics) {
    println!("\n{SEPARATOR}");
    println!("Statistics");
    println!("{SEPARATOR}");
    println!("  Records:           {}", stats.users.total);
    for (category, count) in &stats.users.by_category {
        println!("    {category:<16} {count}");
    }
    println!("  Added this week:   {}", stats.users.recent_week);
    if let Some(latest) = &stats.users.latest {
        println!("  Latest record:     {} <{}>", latest.name, latest.email);
    }
    println!("  Calculations:      {}", stats.calculations.total);
    println!("  This week:         {}", stats.calculations.recent_week);
    if let Some(latest) = &stats.calculations.latest {
        println!(
            "  Latest:            {} = {}",
            latest.expression,
            format_number(latest.result)
        );
    }
    println!("  Size:              {}", stats.storage.storage_size());
    println!("{SEPARATOR}\n");
}

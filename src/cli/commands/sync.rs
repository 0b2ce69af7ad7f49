//! Sync command: run the ingest pipeline and report the outcome.

use console::style;

use crate::config::Settings;
use crate::services::IngestService;

pub async fn cmd_sync(settings: &Settings) -> anyhow::Result<()> {
    let service = IngestService::new(settings)?;
    let stats = service.run().await?;

    println!("\n{}", style("Sync complete").bold());
    println!("{}", "-".repeat(40));
    println!("{:<22} {}", "Months synced:", stats.months_synced);
    if stats.months_failed > 0 {
        println!(
            "{:<22} {}",
            "Months skipped:",
            style(stats.months_failed).yellow()
        );
    }
    println!("{:<22} {}", "Messages fetched:", stats.messages_fetched);
    println!("{:<22} {}", "Cache hits:", stats.cache_hits);
    println!("{:<22} {}", "Records inserted:", stats.inserted);
    println!("{:<22} {}", "Already imported:", stats.duplicates);
    if stats.parse_failures > 0 {
        println!(
            "{:<22} {}",
            "Parse failures:",
            style(stats.parse_failures).yellow()
        );
    }
    if stats.fetch_failures > 0 {
        println!(
            "{:<22} {}",
            "Fetch failures:",
            style(stats.fetch_failures).yellow()
        );
    }

    Ok(())
}

//! Status command for showing the output dataset state.

use console::style;

use crate::config::Settings;
use crate::repository::UploadHistoryRepository;

pub fn cmd_status(settings: &Settings) -> anyhow::Result<()> {
    if !settings.output_path.exists() {
        println!(
            "{} No output database at {}. Run 'debchanges sync' first.",
            style("!").yellow(),
            settings.output_path.display()
        );
        return Ok(());
    }

    let repo = UploadHistoryRepository::new(&settings.output_path)?;
    let counts = repo.counts()?;

    println!("\n{}", style("Upload history status").bold());
    println!("{}", "-".repeat(40));
    println!("{:<22} {}", "Database:", settings.output_path.display());
    println!("{:<22} {}", "Upload records:", counts.uploads);
    println!("{:<22} {}", "Closes references:", counts.closes);
    println!("{:<22} {}", "Logged failures:", counts.failures);

    Ok(())
}

use anyhow::Result;
use std::path::Path;

use sentinel::config::load_sources;

pub fn list(sources_path: &Path) -> Result<()> {
    let sources = load_sources(sources_path)?;

    println!("Configured sources ({})", sources.len());
    println!("==================");

    for source in &sources {
        println!(
            "{:<24} {:<14} {}",
            source.id,
            source.method,
            source.display_name()
        );
        println!("{:<24} {:<14} {}", "", "", source.data_url);
    }

    Ok(())
}

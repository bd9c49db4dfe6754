use anyhow::Result;

use sentinel::config::Settings;
use sentinel::parser::format_datetime;
use sentinel::storage::StateManager;

pub fn show_state(settings: &Settings, source: Option<&str>) -> Result<()> {
    let state = StateManager::new(&settings.state.path);

    let states = match source {
        Some(id) => match state.get_state(id) {
            Some(stored) => vec![(id.to_string(), stored)],
            None => {
                println!("No stored state for {id}");
                return Ok(());
            }
        },
        None => state.all_states().into_iter().collect(),
    };

    println!("Stored state ({})", state.path().display());
    println!("============");

    for (id, stored) in states {
        println!("\n{id}");
        println!("  Timestamp:  {}", format_datetime(&stored.timestamp, None));
        println!("  Last check: {}", format_datetime(&stored.last_check, None));
        if let Some(raw) = &stored.raw_value {
            println!("  Raw value:  {raw}");
        }
        if let Some(etag) = &stored.etag {
            println!("  ETag:       {etag}");
        }
    }

    Ok(())
}

pub fn clear(settings: &Settings, source: Option<&str>, all: bool) -> Result<()> {
    let state = StateManager::new(&settings.state.path);

    if all {
        let count = state.len();
        state.clear_all();
        println!("Cleared state for {count} sources");
        return Ok(());
    }

    if let Some(id) = source {
        if state.clear_state(id) {
            println!("Cleared state for {id}");
        } else {
            println!("No stored state for {id}");
        }
    }

    Ok(())
}

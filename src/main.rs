use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use mess_ledger::config::Config;
use mess_ledger::directory::MemoryDirectory;
use mess_ledger::inventory::MemoryInventory;
use mess_ledger::ledger::Ledger;
use mess_ledger::rollup::export_filename;
use mess_ledger::store::MemoryStore;
use std::fs::File;

fn main() -> Result<()> {
    env_logger::init();
    let config = Config::parse();
    let range = config.range()?;
    let report_date = config.report_date()?;

    let members = File::open(&config.members)
        .with_context(|| format!("Failed to open {}", config.members.display()))?;
    let directory = MemoryDirectory::from_csv(members)?;

    let records = File::open(&config.records)
        .with_context(|| format!("Failed to open {}", config.records.display()))?;
    let store = MemoryStore::with_settings(config.store_settings());
    store.load_csv(records)?;

    let inventory = MemoryInventory::new();
    let rollup = Ledger::new(&store, &inventory, &directory).rollup(range);
    let query = config.query();

    match &config.out {
        Some(dir) => {
            let path = dir.join(export_filename(report_date));
            let file = File::create(&path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            rollup.write_csv(&query, file)?;
            info!("Wrote {}", path.display());
        }
        None => rollup.write_csv(&query, std::io::stdout())?,
    }
    Ok(())
}

//! # Policy Store CLI
//!
//! Command-line tool for inspecting and editing a policy rule store.
//!
//! Usage:
//!   policy-store load [--filter JSON] [--json]
//!   policy-store add <ptype> <values>...
//!   policy-store remove <ptype> <values>...
//!   policy-store remove-filtered <ptype> <field_index> <values>...
//!   policy-store update <ptype> --old a,b,c --new d,e,f
//!   policy-store import <file>
//!   policy-store stats

use clap::{Parser, Subcommand};
use policy_store::storage::types::{DEFAULT_TABLE, ENV_DATABASE_PATH, ENV_TABLE_NAME};
use policy_store::{Filter, MemoryModel, PolicyAdapter, PolicyModel, SqlAdapter, StoreConfig};
use std::fs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "policy-store")]
#[command(about = "Inspect and edit a SQLite policy rule store", long_about = None)]
struct Cli {
    /// Path to the SQLite database
    #[arg(short, long, env = ENV_DATABASE_PATH, default_value = "./var/data/policy.db")]
    db: PathBuf,

    /// Rule table name
    #[arg(short, long, env = ENV_TABLE_NAME, default_value = DEFAULT_TABLE)]
    table: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print stored rules as policy lines
    Load {
        /// Filter as JSON, e.g. '{"p": ["", "data1"]}'
        #[arg(short, long)]
        filter: Option<String>,

        /// Print rules as a JSON array instead of policy lines
        #[arg(long)]
        json: bool,
    },

    /// Add a rule
    Add {
        ptype: String,
        #[arg(required = true)]
        values: Vec<String>,
    },

    /// Remove a rule
    Remove {
        ptype: String,
        #[arg(required = true)]
        values: Vec<String>,
    },

    /// Remove every rule matching a pattern ("" matches anything)
    RemoveFiltered {
        ptype: String,
        /// Slot the first value applies to
        field_index: usize,
        values: Vec<String>,
    },

    /// Replace one rule with another
    Update {
        ptype: String,

        /// Existing rule values, comma separated
        #[arg(long, value_delimiter = ',', required = true)]
        old: Vec<String>,

        /// Replacement rule values, comma separated
        #[arg(long, value_delimiter = ',', required = true)]
        new: Vec<String>,
    },

    /// Replace the stored rules with the policy lines in a file
    Import { file: PathBuf },

    /// Show rule counts
    Stats,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = StoreConfig {
        database_path: cli.db,
        table_name: cli.table,
        ..StoreConfig::default()
    };
    let mut adapter = SqlAdapter::new(&config)?;

    match cli.command {
        Commands::Load { filter, json } => {
            let filter = filter.map(|f| f.parse::<Filter>()).transpose()?;
            let mut model = MemoryModel::new();
            adapter.load_filtered_policy(&mut model, filter.as_ref())?;

            let rules = model.policy_rules();
            if json {
                println!("{}", serde_json::to_string_pretty(&rules)?);
            } else {
                for (ptype, values) in &rules {
                    println!("{}, {}", ptype, values.join(", "));
                }
                if adapter.is_filtered() {
                    println!("({} rules, filtered)", rules.len());
                }
            }
        }

        Commands::Add { ptype, values } => {
            adapter.add_policy(&ptype, &values)?;
            println!("✓ Added {}, {}", ptype, values.join(", "));
        }

        Commands::Remove { ptype, values } => {
            adapter.remove_policy(&ptype, &values)?;
            println!("✓ Removed {}, {}", ptype, values.join(", "));
        }

        Commands::RemoveFiltered {
            ptype,
            field_index,
            values,
        } => {
            let before = adapter.stats()?.total_rules;
            adapter.remove_filtered_policy(&ptype, field_index, &values)?;
            let after = adapter.stats()?.total_rules;
            println!("✓ Removed {} rules", before - after);
        }

        Commands::Update { ptype, old, new } => {
            adapter.update_policy(&ptype, &old, &new)?;
            println!(
                "✓ Updated {}, {} -> {}, {}",
                ptype,
                old.join(", "),
                ptype,
                new.join(", ")
            );
        }

        Commands::Import { file } => {
            let text = fs::read_to_string(&file)
                .map_err(|e| format!("Failed to read {}: {}", file.display(), e))?;
            let model = MemoryModel::from_lines(&text);
            adapter.save_policy(&model)?;
            println!("✓ Imported {} rules from {}", model.len(), file.display());
        }

        Commands::Stats => {
            let stats = adapter.stats()?;
            println!("Policy Store Statistics\n");
            println!("Table:        {}", config.table_name);
            println!("Total Rules:  {}", stats.total_rules);
            for (ptype, count) in &stats.rules_by_ptype {
                println!("  {:<10} {}", ptype, count);
            }
        }
    }

    adapter.close()?;
    Ok(())
}

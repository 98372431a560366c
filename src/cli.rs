//! CLI interface for ldict
//!
//! Provides command-line inspection of serialized containers:
//! - Computing identifiers of JSON objects
//! - Verifying the identifiers of a serialized container
//! - Reading values back from a disk cache

use crate::compression::Packer;
use crate::error::{LdictError, Result};
use crate::container::Ldict;
use crate::persistence::{Cache, DiskCache};
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "ldict")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Inspect identified lazy dictionaries")]
#[command(
    long_about = "ldict - identified lazy dictionaries\n\n\
    Every field of an ldict, and the dictionary itself, carries a 64-character\n\
    identifier. Identifiers of data fields commute, so two objects with the same\n\
    fields in any order share an identifier.\n\n\
    Examples:\n\
      ldict ids data.json\n\
      ldict verify saved.json -v\n\
      ldict cache-get --dir ~/.ldict/cache <ID>"
)]
#[command(author = "ldict Contributors")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the identifier of a JSON object and of each of its fields
    #[command(
        long_about = "Print the identifier of a JSON object and of each of its fields\n\n\
        The input must be a JSON object. Plain objects are hashed field by field;\n\
        objects already carrying \"id\" and \"ids\" are validated and echoed.\n\n\
        Example:\n\
          ldict ids data.json"
    )]
    Ids {
        /// JSON file holding one object
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Also print the serialized container
        #[arg(short, long)]
        verbose: bool,
    },

    /// Check the identifiers of a serialized container
    #[command(
        long_about = "Check the identifiers of a serialized container\n\n\
        Fails unless the object has \"id\" and \"ids\", the ids list exactly the\n\
        fields in order, and their product equals the declared id.\n\n\
        Example:\n\
          ldict verify saved.json"
    )]
    Verify {
        /// Serialized container
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Print each field identifier
        #[arg(short, long)]
        verbose: bool,
    },

    /// Print a value stored in a disk cache
    CacheGet {
        /// Cache directory
        #[arg(short, long, value_name = "DIR")]
        dir: PathBuf,

        /// Field identifier to look up
        #[arg(value_name = "ID")]
        id: String,
    },
}

fn read_json(path: &Path) -> Result<Value> {
    let file = File::open(path)?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

fn print_ids(d: &Ldict) {
    println!("id: {}", d.id());
    for (name, hosh) in d.ids() {
        println!("  {name}: {hosh}");
    }
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Ids { input, verbose } => {
            let d = Ldict::from_value(&read_json(&input)?)?;
            print_ids(&d);
            if verbose {
                println!("{}", serde_json::to_string_pretty(&d.to_value()?)?);
            }
            Ok(())
        }

        Commands::Verify { input, verbose } => {
            let value = read_json(&input)?;
            if value.get("id").is_none() {
                return Err(LdictError::InconsistentIds(format!(
                    "{} has no \"id\"",
                    input.display()
                )));
            }
            let d = Ldict::from_value(&value)?;
            if verbose {
                print_ids(&d);
            }
            println!("OK {}", d.id());
            Ok(())
        }

        Commands::CacheGet { dir, id } => {
            let cache = DiskCache::open(&dir)?;
            let bytes = cache
                .get(&id)?
                .ok_or_else(|| LdictError::KeyNotFound(id.clone()))?;
            let value = Packer::new(0).unpack(&bytes)?;
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(())
        }
    }
}

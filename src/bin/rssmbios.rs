use anyhow::Context;
use clap::Parser;
use smbios_table::{is_significant, Structure};
use tracing_subscriber::EnvFilter;

/// Print the SMBIOS structures found on this system.
#[derive(Debug, Parser)]
#[command(version)]
struct Args {
    /// Only print structures of this type.
    #[arg(short = 't', long = "type")]
    header_type: Option<u8>,

    /// Walk every structure instead of the first of each type.
    #[arg(short, long)]
    all: bool,

    /// Print each structure's string table.
    #[arg(short, long)]
    strings: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let table = smbios_table::smbios()
        .table()
        .map_err(|err| anyhow::anyhow!("{}", err))
        .context("SMBIOS data unavailable")?;

    println!(
        "SMBIOS: {} bytes, {} structure types",
        table.as_bytes().len(),
        table.index().len()
    );

    let wanted = |structure: &Structure<'_>| {
        args.header_type
            .map_or(true, |t| t == structure.header.header_type)
    };

    if args.all {
        for structure in table.structures() {
            match structure {
                Ok(structure) if wanted(&structure) => show_structure(&structure, args.strings),
                Ok(_) => {}
                Err(err) => {
                    println!("stopped: {}", err);
                    break;
                }
            }
        }
        return Ok(());
    }

    for (header_type, _) in table.index().iter() {
        if let Some(structure) = table.get(header_type).filter(|s| wanted(s)) {
            show_structure(&structure, args.strings);
        }
    }

    Ok(())
}

fn show_structure(structure: &Structure<'_>, strings: bool) {
    let header = structure.header;
    println!(
        "type {:3}  handle {:#06x}  offset {:#06x}  length {}",
        header.header_type,
        header.handle,
        structure.offset(),
        header.length
    );

    if !strings {
        return;
    }

    for (i, string) in structure.strings().enumerate() {
        let string = String::from_utf8_lossy(string);
        let marker = if is_significant(&string) { "" } else { "  (placeholder)" };
        println!("  {:2}: {:?}{}", i + 1, string, marker);
    }
}

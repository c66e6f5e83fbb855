use std::path::Path;

use battery_health::adapters::sqlite_store::{SqliteStore, schema_version};
use battery_health::app::services::ensure_schema;
use battery_health::domain::schema::BATTERY_FIELDS;

fn main() {
    if let Err(error) = run() {
        eprintln!("failed to provision store: {error}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let mut path = if cfg!(windows) {
        "C:\\ProgramData\\BatteryHealth\\battery.db".to_string()
    } else {
        "./data/battery.db".to_string()
    };
    let mut namespace = "root\\cimv2\\BatteryHealth".to_string();
    let mut class = "BatteryHealth".to_string();
    let mut force = false;

    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut index = 0;
    while index < args.len() {
        match args[index].as_str() {
            "--path" | "--namespace" | "--class" => {
                let Some(value) = args.get(index + 1) else {
                    return Err(format!("{} requires a value", args[index]));
                };
                match args[index].as_str() {
                    "--path" => path = value.clone(),
                    "--namespace" => namespace = value.clone(),
                    _ => class = value.clone(),
                }
                index += 2;
            }
            "--force" => {
                force = true;
                index += 1;
            }
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            other => {
                return Err(format!("unknown argument: {other}"));
            }
        }
    }

    let path_ref = Path::new(&path);
    if force && path_ref.exists() {
        std::fs::remove_file(path_ref)
            .map_err(|error| format!("failed to remove existing store file: {error}"))?;
    }

    let store = SqliteStore::open(&path).map_err(|error| error.to_string())?;
    let outcome = ensure_schema(&store, &namespace, &class, BATTERY_FIELDS)
        .map_err(|error| error.to_string())?;
    let version = schema_version(store.connection()).map_err(|error| error.to_string())?;

    println!("store ready at: {path}");
    println!("catalog version: {version}");
    println!("class {namespace}:{class}: {outcome:?}");
    Ok(())
}

fn print_help() {
    println!("provision_store");
    println!();
    println!("Usage:");
    println!(
        "  cargo run --bin provision_store -- [--path <file>] [--namespace <path>] [--class <name>] [--force]"
    );
    println!();
    println!("Options:");
    println!("  --path <file>         target store file (default: ./data/battery.db)");
    println!("  --namespace <path>    namespace to create (default: root\\cimv2\\BatteryHealth)");
    println!("  --class <name>        class to create (default: BatteryHealth)");
    println!("  --force               delete existing file before provisioning");
}

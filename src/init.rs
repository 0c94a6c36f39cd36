//! Project initialization for tatib
//!
//! `tatib init` creates the .tatib/ directory, the database, and a starter
//! config in the current directory.

use colored::Colorize;
use std::fs;
use std::path::Path;

const STARTER_CONFIG: &str = r#"# tatib configuration

[server]
# Port for `tatib serve`
port = 7878

# Default page size for violation listings (1-100)
page_size = 20
"#;

/// Initialize a tatib workspace in the current directory
pub fn run_init() -> Result<(), Box<dyn std::error::Error>> {
    let cwd = std::env::current_dir()?;

    println!("\n{}", "Initializing tatib...".cyan().bold());
    println!("   Directory: {}\n", cwd.display());

    let tatib_dir = cwd.join(".tatib");
    if !tatib_dir.exists() {
        fs::create_dir_all(&tatib_dir)?;
        println!("   {} .tatib/", "Creating".green());
    } else {
        println!("   {} .tatib/ (already exists)", "Skipping".yellow());
    }

    write_if_missing(&tatib_dir.join("config.toml"), STARTER_CONFIG)?;

    let db_path = tatib_dir.join("tatib.db");
    if db_path.exists() {
        println!("   {} .tatib/tatib.db (already exists)", "Skipping".yellow());
    } else {
        println!("   {} .tatib/tatib.db", "Creating".green());
        crate::db::Database::open_at(&db_path)?;
    }

    println!("\n{}", "tatib initialized!".green().bold());
    println!("\nNext steps:");
    println!(
        "  1. Run {} to define the violation taxonomy",
        "tatib category add".cyan()
    );
    println!("  2. Run {} to register students", "tatib student add".cyan());
    println!("  3. Run {} to start the admin API", "tatib serve".cyan());
    println!();

    Ok(())
}

fn write_if_missing(path: &Path, contents: &str) -> std::io::Result<()> {
    let display_name = path
        .file_name()
        .map(|n| format!(".tatib/{}", n.to_string_lossy()))
        .unwrap_or_else(|| path.display().to_string());

    if path.exists() {
        println!("   {} {} (already exists)", "Skipping".yellow(), display_name);
        return Ok(());
    }
    fs::write(path, contents)?;
    println!("   {} {}", "Creating".green(), display_name);
    Ok(())
}

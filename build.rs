//! Build script for generating the `truevirt` man page.
//!
//! The packaging pipeline expects the man page to be available from the
//! build output directory, so we generate it using clap-mangen here.

use std::env;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

use clap::CommandFactory;
use clap_mangen::Man;

#[path = "src/cli/mod.rs"]
mod cli;

use cli::Cli;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut stdout = std::io::stdout();
    writeln!(stdout, "cargo:rerun-if-changed=build.rs")?;
    writeln!(stdout, "cargo:rerun-if-changed=src/cli/mod.rs")?;

    let out_dir =
        PathBuf::from(env::var_os("OUT_DIR").ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, "OUT_DIR was not set")
        })?);

    let command = Cli::command();
    let mut buffer = Vec::new();
    Man::new(command.clone()).render(&mut buffer)?;
    File::create(out_dir.join("truevirt.1"))?.write_all(&buffer)?;

    for subcommand in command.get_subcommands() {
        let mut page = Vec::new();
        Man::new(subcommand.clone()).render(&mut page)?;
        let name = format!("truevirt-{}.1", subcommand.get_name());
        File::create(out_dir.join(name))?.write_all(&page)?;
    }

    Ok(())
}

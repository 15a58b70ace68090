//! Build script rendering man pages for the `streamwire` binary.
//!
//! Writes `streamwire.1` plus one page per subcommand (`streamwire-serve.1`,
//! `streamwire-request.1`) into `OUT_DIR`.

use std::{
    env,
    fs,
    io,
    path::{Path, PathBuf},
};

use clap::CommandFactory;
use clap_mangen::Man;

#[path = "src/cli.rs"]
mod cli;

fn render(man: &Man, path: &Path) -> io::Result<()> {
    let mut file = fs::File::create(path)?;
    man.render(&mut file)
}

fn main() -> io::Result<()> {
    println!("cargo::rerun-if-changed=src/cli.rs");

    let Ok(out_dir) = env::var("OUT_DIR").map(PathBuf::from) else {
        // Cargo does not set OUT_DIR for analysis-only runs.
        return Ok(());
    };
    let bin_name = env::var("CARGO_PKG_NAME").unwrap_or_else(|_| "streamwire".into());

    let cmd = cli::Cli::command();
    for sub in cmd.get_subcommands() {
        let page = format!("{bin_name}-{}", sub.get_name());
        let man = Man::new(sub.clone()).title(page.to_uppercase());
        render(&man, &out_dir.join(format!("{page}.1")))?;
    }
    render(&Man::new(cmd), &out_dir.join(format!("{bin_name}.1")))
}

mod term;

use lc3_core::{Cpu, Image};
use term::{RawMode, TermConsole};

use anyhow::Context;
use clap::Parser;
use log::LevelFilter;

use std::cell::RefCell;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::rc::Rc;

/// Run LC-3 object images until the guest halts.
#[derive(Parser)]
#[command(version, about)]
struct Args {
    /// Object images to load in order. Later images overlay earlier ones.
    #[arg(required = true, value_name = "IMAGE")]
    images: Vec<PathBuf>,
}

fn main() -> ExitCode {
    env_logger::Builder::new()
        .format(|f, record| writeln!(f, "{}: {}", record.level(), record.args()))
        .filter(None, LevelFilter::Warn)
        .parse_default_env()
        .init();

    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> anyhow::Result<()> {
    let console = Rc::new(RefCell::new(TermConsole::new()));
    let mut cpu = Cpu::new(console);

    for path in &args.images {
        let image = Image::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?;
        log::info!("loaded {} at {:#06x}", path.display(), image.origin());
        cpu.load_image(&image);
    }

    let raw = RawMode::acquire().context("entering raw terminal mode")?;
    let result = cpu.run();
    drop(raw);

    result.map_err(|err| anyhow::anyhow!("{err}\n{cpu}"))
}

mod dump;
mod render;

use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser as ClapParser, ValueEnum};
use log::info;

use render::Renderer;
use scm_core::{disassemble, serialize, OpcodeTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    /// Source-like listing with reconstructed control flow.
    Pretty,
    /// Re-parseable one-line-per-instruction form.
    Ir,
    /// Flat YAML instruction listing.
    Yaml,
}

#[derive(ClapParser, Debug)]
#[command(version, about = "Decompiler for compiled mission scripts", long_about = None)]
struct Args {
    /// Compiled script to decompile.
    #[arg(short, long, required = true)]
    input: PathBuf,

    /// Opcode listing describing the instruction set.
    #[arg(short, long, required = true)]
    table: PathBuf,

    /// Output file; stdout when omitted.
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[arg(short, long, default_value = "pretty")]
    format: Format,

    /// Thread jump chains to their final destinations first.
    #[arg(long)]
    optimize_jumps: bool,

    /// Hide unreachable code from the pretty listing.
    #[arg(long)]
    clean: bool,

    /// Spaces per nesting level in the pretty listing.
    #[arg(long, default_value_t = 4)]
    indent: usize,

    /// Consecutive unknown opcodes tolerated before giving up.
    #[arg(long, default_value_t = 10)]
    error_limit: usize,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut table = OpcodeTable::load_from_file(&args.table)?;
    let bytes = std::fs::read(&args.input)
        .with_context(|| format!("reading script {}", args.input.display()))?;

    info!(
        "{} bytes of script, {} known opcodes",
        bytes.len(),
        table.len()
    );

    let mut script = disassemble(&bytes, &mut table);

    if args.optimize_jumps {
        script.optimize_jumps();
    }

    let mut out: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(
            File::create(path).with_context(|| format!("creating {}", path.display()))?,
        ),
        None => Box::new(io::stdout().lock()),
    };

    match args.format {
        Format::Ir => {
            out.write_all(serialize::intermediate_form(&script).as_bytes())?;
            writeln!(out)?;
        }
        Format::Yaml => {
            serde_yaml::to_writer(&mut out, &dump::listing(&script))?;
        }
        Format::Pretty => {
            script.reconstruct(args.clean);
            let mut renderer = Renderer::new(args.indent, args.error_limit);
            renderer.render(&script, &mut out)?;
        }
    }

    Ok(())
}

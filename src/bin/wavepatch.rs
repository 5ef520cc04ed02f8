use std::io::Write as _;
use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "wavepatch", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compile a patch and print its diagnostics.
    Check(CheckArgs),
    /// Print the deterministic program dump and fingerprint.
    Dump(CheckArgs),
    /// Execute frames and print each render frame as a JSON line.
    Run(RunArgs),
}

#[derive(Parser, Debug)]
struct CheckArgs {
    /// Input patch JSON.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Fail on warnings too.
    #[arg(long, default_value_t = false)]
    deny_warnings: bool,

    /// Largest element domain any block may create.
    #[arg(long, default_value_t = wavepatch::DEFAULT_MAX_ELEMENTS)]
    max_elements: u32,
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Input patch JSON.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Number of frames to execute.
    #[arg(long, default_value_t = 1)]
    frames: u64,

    /// Seconds between frames.
    #[arg(long, default_value_t = 1.0 / 60.0)]
    dt: f64,

    /// Sample a signal output every frame, as `block.port`. Repeatable.
    #[arg(long = "probe")]
    probes: Vec<String>,

    /// Largest element domain any block may create.
    #[arg(long, default_value_t = wavepatch::DEFAULT_MAX_ELEMENTS)]
    max_elements: u32,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.cmd {
        Command::Check(args) => cmd_check(args),
        Command::Dump(args) => cmd_dump(args),
        Command::Run(args) => cmd_run(args),
    }
}

fn compile(
    path: &std::path::Path,
    opts: &wavepatch::CompileOpts,
) -> anyhow::Result<wavepatch::CompiledProgram> {
    let patch = wavepatch::Patch::from_path(path)
        .with_context(|| format!("load patch '{}'", path.display()))?;
    let registry = wavepatch::BlockRegistry::standard();
    wavepatch::compile_patch(&patch, &registry, opts)
        .map_err(wavepatch::WavepatchError::from)
        .with_context(|| format!("compile '{}'", path.display()))
}

fn cmd_check(args: CheckArgs) -> anyhow::Result<()> {
    let opts = wavepatch::CompileOpts {
        deny_warnings: args.deny_warnings,
        max_elements: args.max_elements,
        ..Default::default()
    };
    let program = compile(&args.in_path, &opts)?;
    for w in program.warnings().iter() {
        eprintln!("{w}");
    }
    eprintln!(
        "ok: {} steps, {} slots, fingerprint {}",
        program.step_count(),
        program.slot_count(),
        program.fingerprint()
    );
    Ok(())
}

fn cmd_dump(args: CheckArgs) -> anyhow::Result<()> {
    let opts = wavepatch::CompileOpts {
        deny_warnings: args.deny_warnings,
        max_elements: args.max_elements,
        ..Default::default()
    };
    let program = compile(&args.in_path, &opts)?;
    print!("{}", program.dump());
    println!("fingerprint: {}", program.fingerprint());
    Ok(())
}

fn parse_probe(s: &str) -> anyhow::Result<wavepatch::ProbeDef> {
    let (block, port) = s
        .rsplit_once('.')
        .filter(|(b, p)| !b.is_empty() && !p.is_empty())
        .with_context(|| format!("probe '{s}' must be 'block.port'"))?;
    Ok(wavepatch::ProbeDef {
        block: block.to_owned(),
        port: port.to_owned(),
    })
}

fn cmd_run(args: RunArgs) -> anyhow::Result<()> {
    let opts = wavepatch::CompileOpts {
        probes: args
            .probes
            .iter()
            .map(|p| parse_probe(p))
            .collect::<anyhow::Result<_>>()?,
        max_elements: args.max_elements,
        ..Default::default()
    };
    let program = compile(&args.in_path, &opts)?;

    let mut player = wavepatch::Player::new(wavepatch::RuntimeOpts {
        fixed_dt: Some(args.dt),
        ..Default::default()
    });
    player.load(program);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for i in 0..args.frames {
        let frame = player
            .tick(args.dt)
            .with_context(|| format!("execute frame {i}"))?;
        serde_json::to_writer(&mut out, &frame).context("serialize frame")?;
        writeln!(out).context("write frame")?;
    }
    Ok(())
}

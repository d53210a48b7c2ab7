use anyhow::Context;
use clap::{Parser, Subcommand};
use framegraph::{coordinate_system_state_machine, read_configuration, FrameGraph, SceneGraph};
use framegraph_fsm::{export_dot, export_lts};
use log::{debug, info};
use simplelog::{ColorChoice, Config, LevelFilter, TermLogger, TerminalMode};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Write to this file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Log debug messages to the terminal
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// The forest as seen through attach notifications, in dot
    Scene { config: PathBuf },
    /// The forest as stored in the graph, in dot
    Live { config: PathBuf },
    /// The coordinate system protocol, in dot
    Fsm {
        /// Leave out the self transitions
        #[arg(long)]
        skip_loops: bool,
    },
    /// The coordinate system protocol as an FSP process for LTSA
    Lts {
        #[arg(long)]
        skip_loops: bool,
    },
}

fn build(config_path: &Path) -> anyhow::Result<(FrameGraph, SceneGraph)> {
    let path = config_path
        .to_str()
        .with_context(|| format!("Invalid path {config_path:?}"))?;
    let config = read_configuration(path)?;
    let mut graph = FrameGraph::new();
    let ids = config.add_frames(&mut graph)?;
    let scene = SceneGraph::new();
    scene.observe_all(&mut graph);
    config
        .link_frames(&mut graph, &ids)
        .with_context(|| format!("Failed to build the frame graph described in {path}"))?;
    info!("Built {} frames and {} links from {path}", graph.len(), config.links.len());
    Ok((graph, scene))
}

fn render(command: &Command, output: &mut dyn Write) -> anyhow::Result<()> {
    match command {
        Command::Scene { config } => {
            let (_graph, scene) = build(config)?;
            debug!("Scene graph:\n{scene}");
            scene.export_dot(output)?;
        }
        Command::Live { config } => {
            let (graph, _) = build(config)?;
            graph.export_dot(output)?;
        }
        Command::Fsm { skip_loops } => {
            export_dot(&coordinate_system_state_machine(), output, *skip_loops)?;
        }
        Command::Lts { skip_loops } => {
            export_lts(&coordinate_system_state_machine(), output, *skip_loops)?;
        }
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };
    TermLogger::init(level, Config::default(), TerminalMode::Stderr, ColorChoice::Auto)
        .context("Failed to set up the terminal logger")?;

    match &args.output {
        Some(path) => {
            let mut file =
                File::create(path).with_context(|| format!("Failed to create {path:?}"))?;
            render(&args.command, &mut file)?;
        }
        None => {
            let stdout = std::io::stdout();
            let mut lock = stdout.lock();
            render(&args.command, &mut lock)?;
            lock.flush()?;
        }
    }
    Ok(())
}

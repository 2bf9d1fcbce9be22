// Copyright 2025 Cornell University
// released under MIT License

use std::path::PathBuf;

use anyhow::Context as _;
use clap::{ColorChoice, Parser, Subcommand};
use clap_verbosity_flag::{log::LevelFilter, Verbosity, WarnLevel};
use log::info;
use node_protocols::checker::Verdict;
use node_protocols::diagnostic::DiagnosticHandler;
use node_protocols::node::describe_node;
use node_protocols::nodes::NodeKind;
use node_protocols::registry::Registry;
use node_protocols::translation::ChannelTranslation;
use node_protocols::wrapper::{open_streams, Wrapper};

/// Runs pipeline nodes under protocol supervision
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Users can specify `-v` or `--verbose` to toggle logging
    #[command(flatten)]
    verbosity: Verbosity<WarnLevel>,

    /// Pass in `--color never` to suppress colored error messages.
    #[arg(long, value_name = "COLOR_CHOICE", default_value = "auto", global = true)]
    color: ColorChoice,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a node, reading messages from `--input` and writing to `--output`
    Run {
        #[arg(long, value_enum)]
        node: NodeKind,

        /// Defaults to standard input
        #[arg(long, value_name = "PATH")]
        input: Option<PathBuf>,

        /// Defaults to standard output
        #[arg(long, value_name = "PATH")]
        output: Option<PathBuf>,

        /// Channel renames, e.g. `in:camera:image,out:image:filtered`
        #[arg(long, value_name = "TRANSLATION")]
        translate: Option<String>,
    },

    /// Print the configuration of a node as JSON
    DescribeNode {
        #[arg(long, value_enum)]
        node: NodeKind,
    },

    /// Print a protocol as JSON (or as a graphviz graph with `--dot`)
    DescribeProtocol {
        name: String,

        /// Protocol definition file to search in addition to the built-in ones
        #[arg(long, value_name = "PROTOCOLS_FILE")]
        file: Option<PathBuf>,

        #[arg(long)]
        dot: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // For concision, we disable timestamps in the log
    env_logger::Builder::new()
        .format_timestamp(None)
        .filter_level(cli.verbosity.log_level_filter())
        .init();

    // Print warning messages only if `--verbose` is enabled
    let emit_warnings = cli.verbosity.log_level_filter() >= LevelFilter::Info;

    match cli.command {
        Command::Run {
            node,
            input,
            output,
            translate,
        } => {
            let protocol = Registry::builtin().get(node.protocol_name())?;
            let translation = match translate {
                Some(text) => ChannelTranslation::parse(&text)?,
                None => ChannelTranslation::default(),
            };
            let mut wrapper = Wrapper::bind(node.build(), protocol)?.with_translation(translation);
            let (reader, mut writer) = open_streams(input.as_deref(), output.as_deref())?;
            info!("Starting reading");
            let verdict = wrapper.run(reader, &mut writer)?;
            if let Verdict::Unexpected(reason) = verdict {
                anyhow::bail!("protocol did not finish: {}", reason);
            }
        }
        Command::DescribeNode { node } => {
            let description = describe_node(node.build().as_ref());
            println!("{}", serde_json::to_string_pretty(&description)?);
        }
        Command::DescribeProtocol { name, file, dot } => {
            let mut registry = Registry::builtin();
            if let Some(file) = file {
                let mut handler = DiagnosticHandler::new(cli.color, emit_warnings);
                registry
                    .load_file(&file, &mut handler)
                    .with_context(|| format!("failed to load {}", file.display()))?;
            }
            let protocol = registry.get(&name)?;
            if dot {
                print!("{}", protocol.automaton().to_dot());
            } else {
                println!("{}", serde_json::to_string_pretty(&protocol.describe())?);
            }
        }
    }
    Ok(())
}

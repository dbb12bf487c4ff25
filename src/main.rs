use clap::{Parser, Subcommand};
use instaframe::{config, output, process, template};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Config file used when `--config` is not given. Optional.
const DEFAULT_CONFIG: &str = "config.toml";

/// Overrides shared by commands that open the template.
#[derive(clap::Args, Clone)]
struct TemplateArgs {
    /// Template document (overrides `template` in config)
    #[arg(long)]
    template: Option<PathBuf>,
}

#[derive(clap::Args, Clone)]
struct RunArgs {
    /// Folder of source photos (not searched recursively)
    source: PathBuf,

    #[command(flatten)]
    template: TemplateArgs,

    /// Directory the timestamped output folder is created in
    #[arg(long)]
    output_base: Option<PathBuf>,

    /// JPEG quality, 0 (smallest) to 12 (best)
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=12))]
    quality: Option<u8>,

    /// Also write the batch report as JSON to this file
    #[arg(long)]
    report: Option<PathBuf>,
}

#[derive(Parser)]
#[command(name = "instaframe")]
#[command(about = "Composite a folder of photos into a social media template")]
#[command(long_about = "\
Composite a folder of photos into a social media template

Every supported photo in SOURCE is scaled to fit the photo slot, centered
in the template's photo slot, given a random caption color, and saved as
{name}_insta.jpg in a new output_YYYYMMDD_HHMMSS folder.

Template document (TOML):

  [canvas]
  width = 880
  height = 880

  [[layers]]
  name = \"FOTO\"                    # photo slot (pixel layer)
  kind = \"pixel\"
  bounds = [40, 40, 840, 840]

  [[layers]]
  name = \"TEXT\"                    # caption (text layer)
  kind = \"text\"
  bounds = [40, 850, 840, 870]
  mask = \"caption.png\"

Run 'instaframe gen-config' to generate a documented config.toml.")]
#[command(version)]
struct Cli {
    /// Config file (defaults to ./config.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// More log output on stderr (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Composite every photo in a folder
    Run(RunArgs),
    /// Validate config and template without processing anything
    Check(TemplateArgs),
    /// Print a stock config.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    match cli.command {
        Command::Run(args) => {
            let mut config = load_config(cli.config.as_deref())?;
            if let Some(template) = args.template.template {
                config.template = template;
            }
            if let Some(base) = args.output_base {
                config.output_base = base;
            }
            if let Some(quality) = args.quality {
                config.output.jpeg_quality = quality;
            }
            config.validate()?;

            let (tx, rx) = std::sync::mpsc::channel();
            let printer = std::thread::spawn(move || {
                for event in rx {
                    output::print_batch_event(&event);
                }
            });
            let result =
                process::run_batch(&args.source, &config, Some(tx), process::CancelToken::new());
            printer
                .join()
                .map_err(|_| "progress printer thread panicked")?;
            let report = result?;

            output::print_report(&report);
            if let Some(path) = args.report {
                let json = serde_json::to_string_pretty(&report)?;
                std::fs::write(&path, json)?;
                println!("Report: {}", path.display());
            }
        }
        Command::Check(args) => {
            let mut config = load_config(cli.config.as_deref())?;
            if let Some(template) = args.template {
                config.template = template;
            }
            config.validate()?;
            println!("==> Checking {}", config.template.display());

            let mut session = template::TemplateSession::open(&config.template, &config.slot_names())?;
            let (width, height) = session.dimensions();
            let slot = session.photo_bounds();
            println!("Canvas: {}x{}", width, height);
            println!(
                "Photo slot '{}': ({},{})-({},{})",
                config.layers.photo, slot.left, slot.top, slot.right, slot.bottom
            );
            let text = session.text_color();
            session.close()?;
            println!("Text slot '{}': {}", config.layers.text, text?);
            println!("==> Template is valid");
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Install the stderr log subscriber. `RUST_LOG` adds further directives.
fn init_tracing(verbose: u8) -> Result<(), Box<dyn std::error::Error>> {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(format!("instaframe={level}").parse()?),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

/// Load the explicit config file, or `./config.toml` if present, or defaults.
fn load_config(path: Option<&Path>) -> Result<config::BatchConfig, Box<dyn std::error::Error>> {
    match path {
        Some(path) if !path.exists() => {
            Err(format!("Config file not found: {}", path.display()).into())
        }
        Some(path) => Ok(config::load_config(path)?),
        None => Ok(config::load_config(Path::new(DEFAULT_CONFIG))?),
    }
}

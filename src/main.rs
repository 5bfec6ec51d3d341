//! CLI entry point for `mailarc`.

use std::path::PathBuf;
use std::time::Instant;

use clap::{CommandFactory, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use mailarc::convert;
use mailarc::fonts::cache::FontCache;
use mailarc::style::StyleConfig;

#[derive(Parser)]
#[command(
    name = "mailarc",
    version,
    about = "Convert email messages (.eml, .msg) into archival PDF documents"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Message file to convert, or a directory with --batch
    #[arg(value_name = "INPUT")]
    input: Option<PathBuf>,

    /// Output file (or output directory in batch mode)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Convert every .eml/.msg file in the input directory
    #[arg(long)]
    batch: bool,

    /// Regular TrueType font file to embed
    #[arg(long, value_name = "FILE")]
    font: Option<PathBuf>,

    /// Bold TrueType font for header labels
    #[arg(long, value_name = "FILE")]
    font_bold: Option<PathBuf>,

    /// ICC profile for the color output intent
    #[arg(long, value_name = "FILE")]
    icc: Option<PathBuf>,

    /// Body font size in points
    #[arg(long, value_name = "PT")]
    font_size: Option<f32>,

    /// Page margins in millimetres
    #[arg(long, value_name = "MM")]
    margins: Option<f32>,

    /// Do not embed inline parts as standalone attachments
    #[arg(long)]
    exclude_inline: bool,

    /// Do not embed the original message file
    #[arg(long)]
    no_embed_original: bool,

    /// Print the conversion report as JSON
    #[arg(long)]
    json: bool,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate a man page
    Manpage,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Completions { shell }) => return cmd_completions(shell),
        Some(Commands::Manpage) => return cmd_manpage(),
        None => {}
    }

    let config = mailarc::config::load_config();

    let log_level = match cli.verbose {
        0 => config.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    setup_logging(log_level);

    // CLI flags win over the config file
    let mut style = config.style();
    if cli.font.is_some() {
        style.font_regular = cli.font.clone();
    }
    if cli.font_bold.is_some() {
        style.font_bold = cli.font_bold.clone();
    }
    if cli.icc.is_some() {
        style.icc_profile = cli.icc.clone();
    }
    if let Some(size) = cli.font_size {
        style.font_size_pt = size;
    }
    if let Some(margins) = cli.margins {
        style.margins_mm = margins;
    }
    if cli.exclude_inline {
        style.embed_inline_as_attachment = false;
    }
    if cli.no_embed_original {
        style.embed_original = false;
    }

    let Some(input) = cli.input else {
        anyhow::bail!("No input given. Pass a .eml/.msg file, or a directory with --batch.");
    };

    if cli.batch {
        cmd_batch(&input, cli.output.as_deref(), &style)
    } else {
        cmd_single(&input, cli.output.as_deref(), &style, cli.json)
    }
}

/// Set up tracing with stderr output.
fn setup_logging(level: &str) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .init();
}

/// Convert one message file.
fn cmd_single(
    input: &std::path::Path,
    output: Option<&std::path::Path>,
    style: &StyleConfig,
    json: bool,
) -> anyhow::Result<()> {
    let output = match output {
        Some(path) => path.to_path_buf(),
        None => input.with_extension("pdf"),
    };

    let mut cache = FontCache::new();
    let report = convert::convert_file(input, &output, style, &mut cache)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

/// Convert every message file in a directory. Per-file failures are
/// reported and skipped; the exit status is non-zero if any file failed.
fn cmd_batch(
    input: &std::path::Path,
    output: Option<&std::path::Path>,
    style: &StyleConfig,
) -> anyhow::Result<()> {
    let out_dir = output.unwrap_or(input).to_path_buf();
    std::fs::create_dir_all(&out_dir)?;

    let inputs = convert::discover_inputs(input)?;
    if inputs.is_empty() {
        anyhow::bail!("No .eml or .msg files found in {}", input.display());
    }

    println!(
        "  Converting {} message(s) to {}",
        inputs.len(),
        out_dir.display()
    );

    let pb = ProgressBar::new(inputs.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} Converting [{bar:40.cyan/blue}] {pos}/{len}")
            .expect("valid template")
            .progress_chars("#>-"),
    );

    let start = Instant::now();
    let mut cache = FontCache::new();
    let mut converted = 0usize;
    let mut failures: Vec<(PathBuf, &'static str, String)> = Vec::new();

    for path in &inputs {
        let out_path = convert::output_path_for(path, &out_dir);
        match convert::convert_file(path, &out_path, style, &mut cache) {
            Ok(_) => converted += 1,
            Err(e) => {
                tracing::error!(input = %path.display(), error = %e, "conversion failed");
                failures.push((path.clone(), e.stage(), e.to_string()));
            }
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    let elapsed = start.elapsed();
    println!();
    println!("  {:<12} {}", "Converted", converted);
    println!("  {:<12} {}", "Failed", failures.len());
    println!("  {:<12} {:.2?}", "Elapsed", elapsed);
    if !failures.is_empty() {
        println!();
        for (path, stage, reason) in &failures {
            println!("  FAILED  [{stage}]  {}: {}", path.display(), reason);
        }
        println!();
        anyhow::bail!("{} of {} conversions failed", failures.len(), inputs.len());
    }
    println!();
    Ok(())
}

fn print_report(report: &convert::ConversionReport) {
    use humansize::{format_size, BINARY};

    println!();
    println!("  {:<16} {}", "Output", report.output.display());
    println!("  {:<16} {}", "Pages", report.pages);
    println!("  {:<16} {}", "Embedded files", report.embedded_files);
    println!(
        "  {:<16} {}",
        "Size",
        format_size(report.bytes_written, BINARY)
    );
    println!();
}

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "mailarc", &mut std::io::stdout());
    Ok(())
}

/// Generate a man page and print to stdout.
fn cmd_manpage() -> anyhow::Result<()> {
    let cmd = Cli::command();
    let man = clap_mangen::Man::new(cmd);
    let mut buf = Vec::new();
    man.render(&mut buf)?;
    std::io::Write::write_all(&mut std::io::stdout(), &buf)?;
    Ok(())
}

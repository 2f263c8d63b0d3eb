use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use log::{debug, error, info};
use pyfmt::config::{FormatConfig, Preview, TargetVersion, parse_line_range};
use pyfmt::debug::dump_tree;
use pyfmt::error::FormatError;
use pyfmt::formatter::format_file_contents;
use pyfmt::parser::parse;
use rayon::prelude::*;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use walkdir::WalkDir;

const EXIT_WOULD_CHANGE: u8 = 1;
const EXIT_INVALID_SOURCE: u8 = 123;
const EXIT_UNSAFE: u8 = 124;

#[derive(Parser, Debug)]
#[command(name = "pyfmt", version, about = "Deterministic Python formatter")]
struct Cli {
    /// Log every pipeline stage
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    Fmt {
        /// Paths (files or directories) to format, `-` for stdin (defaults to current dir)
        paths: Vec<PathBuf>,
        /// Write the formatted content back to the files
        #[arg(long)]
        write: bool,
        /// Check if files are formatted; non-zero exit if changes needed
        #[arg(long)]
        check: bool,
        /// How many characters per line to allow
        #[arg(short = 'l', long, default_value_t = pyfmt::config::DEFAULT_LINE_LENGTH)]
        line_length: usize,
        /// Python versions the output must support (repeatable); detected when absent
        #[arg(short = 't', long = "target-version")]
        target_versions: Vec<String>,
        /// Leave string prefixes and quotes alone
        #[arg(short = 'S', long)]
        skip_string_normalization: bool,
        /// Do not treat a pre-existing trailing comma as a reason to explode
        #[arg(short = 'C', long)]
        skip_magic_trailing_comma: bool,
        /// Enable every preview feature
        #[arg(long)]
        preview: bool,
        /// Enable one preview feature (repeatable)
        #[arg(long = "enable-feature")]
        enable_features: Vec<String>,
        /// Only format these lines, as START-END (repeatable)
        #[arg(long = "line-ranges")]
        line_ranges: Vec<String>,
        /// Format as a typing stub regardless of extension
        #[arg(long)]
        pyi: bool,
        /// Pass the first line through untouched
        #[arg(short = 'x', long)]
        skip_source_first_line: bool,
        /// Skip the equivalence and stability checks
        #[arg(long)]
        fast: bool,
    },
    Debug {
        /// File to debug
        file: PathBuf,
    },
}

/// What happened to one input.
#[derive(Debug)]
enum Outcome {
    /// Carries the text when it should be echoed.
    Unchanged(Option<String>),
    Changed(Option<String>),
    Failed(anyhow::Error),
}

impl Outcome {
    fn exit_code(&self, check: bool) -> u8 {
        match self {
            Outcome::Unchanged(_) => 0,
            Outcome::Changed(_) if check => EXIT_WOULD_CHANGE,
            Outcome::Changed(_) => 0,
            Outcome::Failed(err) => match err.downcast_ref::<FormatError>() {
                Some(e) if e.is_internal() => EXIT_UNSAFE,
                _ => EXIT_INVALID_SOURCE,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Stdout,
    Write,
    Check,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let default_filter = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).init();

    match cli.command {
        Commands::Fmt {
            paths,
            write,
            check,
            line_length,
            target_versions,
            skip_string_normalization,
            skip_magic_trailing_comma,
            preview,
            enable_features,
            line_ranges,
            pyi,
            skip_source_first_line,
            fast,
        } => {
            if write && check {
                bail!("--write and --check are mutually exclusive");
            }
            let mode = if write {
                Mode::Write
            } else if check {
                Mode::Check
            } else {
                Mode::Stdout
            };

            let mut config = FormatConfig::default()
                .with_line_length(line_length)
                .with_target_versions(
                    target_versions
                        .iter()
                        .map(|v| v.parse::<TargetVersion>())
                        .collect::<Result<Vec<_>, _>>()?,
                )
                .with_magic_trailing_comma(!skip_magic_trailing_comma)
                .with_string_normalization(!skip_string_normalization)
                .with_line_ranges(
                    line_ranges
                        .iter()
                        .map(|r| parse_line_range(r))
                        .collect::<Result<Vec<_>, _>>()?,
                )
                .with_pyi(pyi);
            config.skip_source_first_line = skip_source_first_line;
            if preview {
                config.preview.extend(Preview::ALL);
            }
            for name in &enable_features {
                config = config.with_preview(name.parse()?);
            }
            config.validate()?;
            debug!("configuration {}", config.cache_key());

            let targets = if paths.is_empty() {
                vec![PathBuf::from(".")]
            } else {
                paths
            };
            if !config.line_ranges.is_empty() && targets.len() > 1 {
                bail!("--line-ranges can only be used with a single file");
            }
            let mut py_files = Vec::new();
            for p in targets {
                collect_py_files(&p, &mut py_files);
            }
            info!("formatting {} file(s)", py_files.len());

            let results: Vec<_> = py_files
                .par_iter()
                .map(|path| process_file(path, &config, mode, fast))
                .collect();

            let mut code = 0;
            for (path, outcome) in py_files.iter().zip(results) {
                code = code.max(outcome.exit_code(mode == Mode::Check));
                match outcome {
                    Outcome::Unchanged(Some(text)) | Outcome::Changed(Some(text)) => {
                        if py_files.len() > 1 {
                            println!("===== {} =====", path.display());
                        }
                        print!("{}", text);
                    }
                    Outcome::Changed(None) if mode == Mode::Check => {
                        eprintln!("would reformat {}", path.display());
                    }
                    Outcome::Failed(e) => error!("{:#}", e),
                    _ => {}
                }
            }
            Ok(ExitCode::from(code))
        }
        Commands::Debug { file } => {
            debug_file(&file)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn debug_file(path: &Path) -> Result<()> {
    let content = read_source(path)?;
    let tree = parse(&content, &Default::default()).with_context(|| format!("cannot parse {}", path.display()))?;
    println!("===== {} =====", path.display());
    print!("{}", dump_tree(&tree));
    Ok(())
}

fn is_python_file(path: &Path) -> bool {
    matches!(path.extension().and_then(|s| s.to_str()), Some("py" | "pyi"))
}

fn collect_py_files(path: &Path, out: &mut Vec<PathBuf>) {
    if path == Path::new("-") || path.is_file() {
        out.push(path.to_path_buf());
        return;
    }
    for entry in WalkDir::new(path).into_iter().filter_map(|e| e.ok()) {
        let p = entry.path();
        if p.is_file() && is_python_file(p) {
            out.push(p.to_path_buf());
        }
    }
}

fn read_source(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut content = String::new();
        io::stdin().read_to_string(&mut content).context("cannot read stdin")?;
        Ok(content)
    } else {
        fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display()))
    }
}

fn process_file(path: &Path, config: &FormatConfig, mode: Mode, fast: bool) -> Outcome {
    match format_path(path, config, mode, fast) {
        Ok(outcome) => outcome,
        Err(e) => Outcome::Failed(e),
    }
}

fn format_path(path: &Path, config: &FormatConfig, mode: Mode, fast: bool) -> Result<Outcome> {
    let content = read_source(path)?;
    let pyi_config;
    let config = if path.extension().and_then(|s| s.to_str()) == Some("pyi") && !config.is_pyi {
        pyi_config = config.clone().with_pyi(true);
        &pyi_config
    } else {
        config
    };
    let formatted = format_file_contents(&content, config, fast).with_context(|| format!("cannot format {}", path.display()))?;
    let stdin = path == Path::new("-");
    if !formatted.changed {
        debug!("{} already formatted", path.display());
        let echo = (mode == Mode::Stdout || (stdin && mode == Mode::Write)).then_some(formatted.text);
        return Ok(Outcome::Unchanged(echo));
    }
    match mode {
        Mode::Write if !stdin => {
            fs::write(path, &formatted.text).with_context(|| format!("cannot write {}", path.display()))?;
            info!("reformatted {}", path.display());
            Ok(Outcome::Changed(None))
        }
        Mode::Stdout | Mode::Write => Ok(Outcome::Changed(Some(formatted.text))),
        Mode::Check => Ok(Outcome::Changed(None)),
    }
}

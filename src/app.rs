use std::path::PathBuf;
use std::time::Duration;

use clap::{error::ErrorKind, Parser};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

use crate::cli::args::CliArgs;
use crate::cli::validation;
use crate::config::{self, ConfigFile};
use crate::output::{self, OutputFormat};
use crate::runner::{Options, Runner};

fn print_banner() {
    const BANNER: &str = r#"
                                              __
   ____ ___  ___________ _____  _________  / /_  ___
  / __ `/ / / / ___/ __ `/ __ \/ ___/ __ \/ __ \/ _ \
 / /_/ / /_/ / /  / /_/ / /_/ / /  / /_/ / /_/ /  __/
 \__,_/\__,_/_/   \__,_/ .___/_/   \____/_.___/\___/
                      /_/
       v0.1.0 - @AuraEnabled endpoint reconnaissance
    "#;
    print!("{}", BANNER);
    println!();
    println!(
        "{}{}{} {}",
        "[".bold().white(),
        "WRN".bold().yellow(),
        "]".bold().white(),
        "Only probe orgs you are authorized to test.".bold().white()
    );
    println!();
}

fn format_kv_line(label: &str, value: &str) {
    println!(":: {:<10}: {}", label, value);
}

fn format_bool(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

#[derive(Clone, Debug)]
struct RunConfig {
    options: Options,
    no_color: bool,
    output: Option<String>,
    output_format: Option<OutputFormat>,
}

fn path_or(cli: Option<String>, cfg: Option<String>, default: &str) -> PathBuf {
    match cli.or(cfg) {
        Some(p) => config::expand_tilde(p.trim()),
        None => PathBuf::from(default),
    }
}

fn build_run_config(args: CliArgs, cfg: ConfigFile) -> Result<RunConfig, String> {
    validation::validate(&args)?;

    let defaults = Options::default();

    let no_color = args.no_color || cfg.no_color.unwrap_or(false);

    let classes_dir = path_or(args.classes_dir, cfg.classes_dir, "classes");
    let package_xml = path_or(args.package_xml, cfg.package_xml, "package.xml");
    let request_file = path_or(args.request_file, cfg.request_file, "req.txt");
    let output_dir = path_or(args.output_dir, cfg.output_dir, output::DEFAULT_OUTPUT_DIR);

    let message_field = args
        .message_field
        .or(cfg.message_field)
        .map(|f| f.trim().to_string())
        .unwrap_or(defaults.message_field);
    let class_extension = args
        .extension
        .or(cfg.extension)
        .map(|e| e.trim().trim_start_matches('.').to_string())
        .unwrap_or(defaults.class_extension);
    let scheme = args
        .scheme
        .or(cfg.scheme)
        .map(|s| s.trim().to_lowercase())
        .unwrap_or(defaults.scheme);

    let timeout_seconds = args.timeout.or(cfg.timeout).unwrap_or(defaults.timeout_seconds);
    if timeout_seconds == 0 {
        return Err("invalid timeout, expected positive integer".to_string());
    }
    let rate = args.rate.or(cfg.rate);
    if rate == Some(0) {
        return Err("invalid rate, expected positive integer".to_string());
    }

    let proxy = args.proxy.or(cfg.proxy).filter(|p| !p.trim().is_empty());
    let header = args.header.or(cfg.header).filter(|h| !h.trim().is_empty());
    let follow_redirects = args.follow_redirects || cfg.follow_redirects.unwrap_or(false);
    let strict_field = args.strict_field || cfg.strict_field.unwrap_or(false);
    let abort_on_error = args.abort_on_error || cfg.abort_on_error.unwrap_or(false);

    let output = args
        .output
        .or(cfg.output)
        .map(|p| config::expand_tilde(p.trim()).to_string_lossy().to_string());
    let output_format = match args.output_format.or(cfg.output_format) {
        Some(raw) => Some(
            OutputFormat::parse(&raw)
                .ok_or_else(|| format!("invalid output format '{raw}', expected text or json"))?,
        ),
        None => output.as_deref().and_then(output::infer_format_from_path),
    };

    Ok(RunConfig {
        options: Options {
            classes_dir,
            package_xml,
            request_file,
            output_dir,
            message_field,
            class_extension,
            scheme,
            timeout_seconds,
            rate,
            proxy,
            header,
            follow_redirects,
            strict_field,
            abort_on_error,
            verbose: args.verbose,
        },
        no_color,
        output,
        output_format,
    })
}

async fn write_summary(
    path: &str,
    format: OutputFormat,
    scan: &crate::runner::ScanResult,
) -> Result<(), String> {
    let rendered = output::render(format, &scan.results);
    let mut outfile = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)
        .await
        .map_err(|e| format!("failed to open output file: {e}"))?;
    outfile
        .write_all(&rendered)
        .await
        .map_err(|_| "failed to write output file".to_string())?;
    Ok(())
}

async fn run_async(run: RunConfig) -> Result<(), String> {
    if run.no_color {
        colored::control::set_override(false);
    }
    print_banner();

    let options = &run.options;
    format_kv_line("Classes", &options.classes_dir.display().to_string());
    format_kv_line("Request", &options.request_file.display().to_string());
    format_kv_line("Results", &options.output_dir.display().to_string());
    format_kv_line("Field", &options.message_field);
    if let Some(proxy) = options.proxy.as_deref() {
        format_kv_line("Proxy", proxy);
    }
    if let Some(rate) = options.rate {
        format_kv_line("Rate", &format!("{rate}/s"));
    }
    if options.verbose > 0 {
        format_kv_line("Descriptor", &options.package_xml.display().to_string());
        format_kv_line("Timeout", &format!("{}s", options.timeout_seconds));
        format_kv_line("Redirects", format_bool(options.follow_redirects));
        format_kv_line("Strict", format_bool(options.strict_field));
    }
    println!();

    let pb = ProgressBar::new(0);
    pb.set_draw_target(ProgressDrawTarget::stderr());
    pb.enable_steady_tick(Duration::from_millis(200));
    pb.set_style(
        ProgressStyle::with_template(
            ":: Progress: [{pos}/{len}] :: Duration: [{elapsed_precise}] :: {msg}",
        )
        .map_err(|e| format!("failed to build progress bar style: {e}"))?
        .progress_chars(r#"#>-"#),
    );

    let runner = Runner::new(run.options.clone())
        .map_err(|e| e.to_string())?
        .with_progress(pb.clone());
    let result = runner.run().await;
    pb.finish_and_clear();
    let scan = result.map_err(|e| e.to_string())?;

    if let Some(path) = run.output.as_deref() {
        let format = run.output_format.unwrap_or(OutputFormat::Text);
        write_summary(path, format, &scan).await?;
    }

    let flagged = scan.flagged().count();
    println!();
    if flagged > 0 {
        println!(
            "{} {} of {} methods returned sensitive-looking data",
            ":: Flagged ::".bold().red(),
            flagged,
            scan.results.len()
        );
    }
    println!(
        ":: Completed :: {} methods probed in {}s ::",
        scan.results.len(),
        scan.elapsed.as_secs()
    );

    Ok(())
}

fn load_user_config(args: &CliArgs) -> Result<ConfigFile, String> {
    match args.config.as_deref() {
        Some(path) => config::load_config(&config::expand_tilde(path), false),
        None => match config::default_config_path() {
            Some(path) => config::load_config(&path, true),
            None => Ok(ConfigFile::default()),
        },
    }
}

pub fn run_cli() -> Result<(), String> {
    let args = match CliArgs::try_parse() {
        Ok(args) => args,
        Err(e) => match e.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                print!("{e}");
                return Ok(());
            }
            _ => return Err(e.to_string()),
        },
    };

    if args.init_config {
        let path = config::default_config_path()
            .ok_or_else(|| "could not determine home directory".to_string())?;
        if config::ensure_default_config_file(&path)? {
            println!("wrote default config to {}", path.display());
        } else {
            println!("config already exists at {}", path.display());
        }
        return Ok(());
    }

    let cfg = load_user_config(&args)?;
    let run = build_run_config(args, cfg)?;

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("failed to build runtime: {e}"))?;

    rt.block_on(run_async(run))?;
    Ok(())
}

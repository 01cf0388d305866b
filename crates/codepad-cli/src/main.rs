use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use codepad_core::config::ConfigLoader;
use codepad_core::{CodePad, DependencyInstallRequest, Ecosystem, Session, ToolchainRegistry};
use log::LevelFilter;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[clap(name = "codepad", author, version, about = "Compile and run a source snippet in an isolated directory")]
struct Cli {
    #[clap(subcommand)]
    command: Commands,

    #[clap(long, short, help = "Configuration file (defaults to ./codepad.yaml or the user config dir)")]
    config: Option<PathBuf>,

    #[clap(long, short, help = "Log level; overrides logging.level from the configuration")]
    log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a source file, or stdin when FILE is `-` or omitted
    Run {
        #[clap(long, short = 'L', help = "Language id or alias; inferred from the file extension when omitted")]
        language: Option<String>,

        #[clap(long = "install", value_name = "ECOSYSTEM:PACKAGE", help = "Install a package into the session workspace first (repeatable)")]
        installs: Vec<String>,

        #[clap(long, help = "Print the structured result as JSON")]
        json: bool,

        file: Option<PathBuf>,
    },
    /// Install a package into a fresh workspace, removed on exit unless --keep
    Install {
        ecosystem: Ecosystem,
        package: String,

        #[clap(long, help = "Keep the workspace after exit and print its path")]
        keep: bool,
    },
    /// Install the browser automation bundle into a fresh workspace, removed on exit unless --keep
    InstallBundle {
        #[clap(long, help = "Keep the workspace after exit and print its path")]
        keep: bool,
    },
    /// List supported languages
    Languages,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let config_path = cli.config.unwrap_or_else(ConfigLoader::default_path);
    let config = ConfigLoader::from_file_or_default(&config_path).await?;

    // Initialize logger
    let level = cli.log_level.as_deref().unwrap_or(&config.logging.level);
    let log_level_filter = level.parse().unwrap_or(LevelFilter::Info);
    env_logger::Builder::new()
        .filter_level(log_level_filter)
        .init();

    let codepad = CodePad::from_config(&config);
    let mut session = Session::new();

    // Cancelling lets every command return normally so the session workspace is removed.
    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("Interrupted, cancelling");
            ctrl_c.cancel();
        }
    });

    match cli.command {
        Commands::Run {
            language,
            installs,
            json,
            file,
        } => {
            let language = match language {
                Some(language) => language,
                None => infer_language(codepad.registry(), file.as_deref())?,
            };
            let source = read_source(file.as_deref()).await?;

            for spec in &installs {
                let request = parse_install_spec(spec)?;
                let result = codepad
                    .install_with_cancel(&mut session, &request, &cancel)
                    .await?;
                if !result.success {
                    eprintln!("{}", result.message);
                    return Ok(ExitCode::FAILURE);
                }
                log::info!("{}", result.message);
            }

            let result = codepad
                .execute_with_cancel(&mut session, &language, &source, &cancel)
                .await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print!("{}", result.output());
            }
            Ok(exit_code(result.is_success()))
        }
        Commands::Install {
            ecosystem,
            package,
            keep,
        } => {
            let request = DependencyInstallRequest::new(ecosystem, package);
            let result = codepad
                .install_with_cancel(&mut session, &request, &cancel)
                .await?;
            println!("{}", result.message);
            if keep {
                keep_workspace(&mut session);
            }
            Ok(exit_code(result.success))
        }
        Commands::InstallBundle { keep } => {
            let result = codepad
                .install_bundle_with_cancel(&mut session, &cancel)
                .await?;
            println!("package: {}", result.package.message);
            println!("assets: {}", result.assets.message);
            if keep {
                keep_workspace(&mut session);
            }
            Ok(exit_code(result.success()))
        }
        Commands::Languages => {
            for info in codepad.languages() {
                let kind = if info.compiled { "compiled" } else { "interpreted" };
                println!(
                    "{:<12} {:<12} .{:<6} {:<12} {}",
                    info.id,
                    info.display_name,
                    info.extension,
                    kind,
                    info.aliases.join(", ")
                );
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn exit_code(success: bool) -> ExitCode {
    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn keep_workspace(session: &mut Session) {
    if let Some(workspace) = session.take_workspace() {
        println!("workspace: {}", workspace.root().display());
    }
}

fn is_stdin(file: Option<&Path>) -> bool {
    file.map_or(true, |f| f == Path::new("-"))
}

async fn read_source(file: Option<&Path>) -> Result<String> {
    if is_stdin(file) {
        let mut source = String::new();
        tokio::io::stdin()
            .read_to_string(&mut source)
            .await
            .context("Failed to read source from stdin")?;
        return Ok(source);
    }
    let path = file.ok_or_else(|| anyhow!("No source file given"))?;
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))
}

fn infer_language(registry: &ToolchainRegistry, file: Option<&Path>) -> Result<String> {
    if is_stdin(file) {
        bail!("--language is required when reading from stdin");
    }
    let extension = file
        .and_then(|f| f.extension())
        .and_then(|e| e.to_str())
        .ok_or_else(|| anyhow!("Cannot infer language without a file extension; pass --language"))?;
    registry
        .languages()
        .find(|l| l.source_extension.eq_ignore_ascii_case(extension))
        .map(|l| l.id.clone())
        .ok_or_else(|| anyhow!("No language registered for .{} files; pass --language", extension))
}

/// `pip:requests` or `npm:left-pad`
fn parse_install_spec(spec: &str) -> Result<DependencyInstallRequest> {
    let (ecosystem, package) = spec
        .split_once(':')
        .ok_or_else(|| anyhow!("Expected ECOSYSTEM:PACKAGE, got '{}'", spec))?;
    let ecosystem: Ecosystem = ecosystem.parse().map_err(|e: String| anyhow!(e))?;
    Ok(DependencyInstallRequest::new(ecosystem, package))
}

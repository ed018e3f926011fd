//! Generate, refine, and manage markup artifacts from the command line.
//!
//! Reads the API key from the `OPENROUTER_KEY` environment variable. Log
//! verbosity is controlled by `VELLUM_LOG` (default `warn`).
//!
//! # Examples
//!
//! ```sh
//! # Generate from a prompt
//! vellum generate "a pomodoro timer with a progress ring"
//!
//! # Generate from a sketch, with a style preset and required CSS
//! vellum generate --image wireframe.png --style Brutalist --css "body { margin: 0 }"
//!
//! # Refine a history entry
//! vellum refine art-1a2b-0001 "make it dark"
//!
//! # Export the bare document
//! vellum export art-1a2b-0001 --format document --out timer.html
//!
//! # Interactive session with undo/redo and the element overlay
//! vellum session art-1a2b-0001
//! ```

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use vellum::prelude::*;
use vellum::synthesis::prompt::DEFAULT_PRESET;
use vellum::transfer::suggested_file_name;

#[derive(Parser)]
#[command(name = "vellum", version)]
struct Cli {
    /// History file
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Model to use for generation and refinement
    #[arg(long, global = true, default_value = vellum::DEFAULT_MODEL)]
    model: String,

    /// Maximum tokens per response
    #[arg(long, global = true)]
    max_tokens: Option<u32>,

    /// Storage quota for the history file, in bytes
    #[arg(long, global = true)]
    quota: Option<usize>,

    /// Total attempts per request for transient failures
    #[arg(long, global = true, default_value_t = 3)]
    max_attempts: u32,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate a new artifact from a prompt and/or an image
    Generate {
        /// Free-text prompt (ignored when --image is given)
        prompt: Option<String>,

        /// Image or PDF to build from
        #[arg(long)]
        image: Option<PathBuf>,

        /// Visual style preset
        #[arg(long, default_value = DEFAULT_PRESET)]
        style: String,

        /// CSS rules the document must include verbatim
        #[arg(long)]
        css: Option<String>,
    },
    /// Refine a history entry with a natural-language instruction
    Refine { id: String, instruction: String },
    /// List history, most recent first
    List,
    /// Print an artifact's document
    Show { id: String },
    /// Rename a history entry
    Rename { id: String, name: String },
    /// Delete a history entry
    Remove { id: String },
    /// Export an artifact
    Export {
        id: String,

        /// snapshot (importable JSON) or document (HTML)
        #[arg(long, default_value = "snapshot")]
        format: ExportFormat,

        /// Output file; `-` for stdout. Defaults to a name derived from the artifact.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Import a previously exported snapshot
    Import { file: PathBuf },
    /// Interactive session with undo/redo and the element overlay
    Session {
        /// Artifact to activate at start
        id: Option<String>,
    },
}

// ── Setup ──────────────────────────────────────────────────────────

fn init_tracing() {
    let filter = EnvFilter::try_from_env("VELLUM_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

fn build_config(cli: &Cli) -> StudioConfig {
    let mut config = StudioConfig::default()
        .with_model(&cli.model)
        .with_retry(RetryConfig {
            max_attempts: cli.max_attempts,
            ..Default::default()
        });
    if let Some(path) = &cli.store {
        config = config.with_storage_path(path);
    }
    if let Some(tokens) = cli.max_tokens {
        config = config.with_max_tokens(tokens);
    }
    if let Some(quota) = cli.quota {
        config = config.with_storage_quota(quota);
    }
    config
}

fn build_gateway(config: &StudioConfig) -> Result<SynthesisGateway, String> {
    let api_key = std::env::var("OPENROUTER_KEY")
        .map_err(|_| "OPENROUTER_KEY environment variable is not set".to_string())?;
    let client = OpenRouterClient::new(api_key, config)
        .map_err(|e| format!("failed to create API client: {e}"))?;
    Ok(SynthesisGateway::new(Arc::new(client), config))
}

fn open_studio(config: &StudioConfig) -> Studio {
    let slot = FileSlot::new(&config.storage_path, Some(config.storage_quota_bytes));
    Studio::open(Box::new(slot))
}

/// Load an image or PDF from disk, sniffing the MIME type from the extension.
fn load_image(path: &Path) -> Result<ImagePayload, String> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
    let mime = ImagePayload::mime_for_extension(ext)
        .ok_or_else(|| format!("unsupported file type '{}'", path.display()))?;
    let bytes =
        std::fs::read(path).map_err(|e| format!("failed to read '{}': {e}", path.display()))?;
    Ok(ImagePayload::from_bytes(mime, &bytes))
}

/// Turn a session error into the user-facing message, keeping detail in the log.
fn describe(e: &StudioError) -> String {
    tracing::debug!("{e}");
    match e {
        StudioError::Overlay(_)
        | StudioError::NoActiveArtifact
        | StudioError::UnknownArtifact(_)
        | StudioError::ActiveChanged => e.to_string(),
        _ => e.notice().message,
    }
}

fn print_notices(studio: &mut Studio) {
    for notice in studio.take_notices() {
        eprintln!("  ! {notice}");
    }
}

fn print_history(studio: &Studio) {
    if studio.history().is_empty() {
        println!("(no artifacts)");
    }
    let active = studio.active().map(|a| a.id.as_str());
    for artifact in studio.history() {
        let marker = if Some(artifact.id.as_str()) == active {
            "*"
        } else {
            " "
        };
        println!(
            "{marker} {}  {}  {:<40}  {} bytes",
            artifact.id,
            artifact.created_at.format("%Y-%m-%d %H:%M"),
            artifact.name,
            artifact.body.len()
        );
    }
}

// ── Commands ───────────────────────────────────────────────────────

async fn run(cli: Cli) -> Result<(), String> {
    let config = build_config(&cli);
    let mut studio = open_studio(&config);

    let result = match cli.command {
        Command::Generate {
            prompt,
            image,
            style,
            css,
        } => {
            let gateway = build_gateway(&config)?;
            let mut request = match &image {
                Some(path) => GenerateRequest::image(load_image(path)?).with_source_name(
                    path.file_name()
                        .map(|n| n.to_string_lossy().to_string())
                        .unwrap_or_default(),
                ),
                None => GenerateRequest::prompt(prompt.unwrap_or_default()),
            };
            request = request.with_style(StylePreset::new(style));
            if let Some(css) = css {
                request = request.with_custom_css(css);
            }
            let artifact = studio
                .generate(&gateway, request)
                .await
                .map_err(|e| describe(&e))?;
            println!("{}  {}", artifact.id, artifact.name);
            Ok(())
        }
        Command::Refine { id, instruction } => {
            let gateway = build_gateway(&config)?;
            studio.activate(&id).map_err(|e| describe(&e))?;
            let artifact = studio
                .refine(&gateway, &instruction)
                .await
                .map_err(|e| describe(&e))?;
            println!("{}  refined ({} bytes)", artifact.id, artifact.body.len());
            Ok(())
        }
        Command::List => {
            print_history(&studio);
            Ok(())
        }
        Command::Show { id } => {
            let artifact = studio
                .get(&id)
                .ok_or_else(|| format!("no artifact with id {id}"))?;
            println!("{}", artifact.body);
            Ok(())
        }
        Command::Rename { id, name } => studio.rename(&id, &name).map_err(|e| describe(&e)),
        Command::Remove { id } => studio
            .remove(&id)
            .map(|a| println!("removed {}  {}", a.id, a.name))
            .map_err(|e| describe(&e)),
        Command::Export { id, format, out } => {
            let text = studio
                .export(Some(&id), format)
                .map_err(|e| describe(&e))?;
            let out = match out {
                Some(path) => path,
                None => {
                    let artifact = studio
                        .get(&id)
                        .ok_or_else(|| format!("no artifact with id {id}"))?;
                    PathBuf::from(suggested_file_name(artifact, format))
                }
            };
            if out.as_os_str() == "-" {
                print!("{text}");
            } else {
                std::fs::write(&out, text)
                    .map_err(|e| format!("failed to write '{}': {e}", out.display()))?;
                println!("wrote {}", out.display());
            }
            Ok(())
        }
        Command::Import { file } => {
            let text = std::fs::read_to_string(&file)
                .map_err(|e| format!("failed to read '{}': {e}", file.display()))?;
            let artifact = studio.import(&text).map_err(|e| describe(&e))?;
            println!("{}  {}", artifact.id, artifact.name);
            Ok(())
        }
        Command::Session { id } => {
            let gateway = build_gateway(&config)?;
            if let Some(id) = id {
                studio.activate(&id).map_err(|e| describe(&e))?;
            }
            session(&mut studio, &gateway).await
        }
    };
    print_notices(&mut studio);
    result
}

// ── Interactive session ────────────────────────────────────────────

const SESSION_HELP: &str = "\
commands:
  list                      history, most recent first (* = active)
  activate <id>             make a history entry active
  gen <prompt>              generate a new artifact
  refine <instruction>      refine the active artifact
  undo | redo               step through versions of the active artifact
  show                      print the active document
  mode <interact|inspect|edit>
  view <preview|source>
  outline                   element paths of the active document
  hover <path> | leave <path> | click <path> [x y]
  action <edit_text|change_style|adjust_dimensions|remove>
  answer <value> | confirm | cancel
  dismiss                   close the open report or menu
  export <snapshot|document> [file]
  import <file>
  quit";

async fn session(studio: &mut Studio, gateway: &SynthesisGateway) -> Result<(), String> {
    println!("vellum session. Type 'help' for commands.");
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("{}> ", prompt_label(studio));
        io::stdout().flush().ok();
        let Some(line) = lines.next() else {
            break;
        };
        let line = line.map_err(|e| format!("failed to read input: {e}"))?;
        let (cmd, arg) = match line.trim().split_once(' ') {
            Some((cmd, arg)) => (cmd, arg.trim()),
            None => (line.trim(), ""),
        };
        if matches!(cmd, "quit" | "exit" | "q") {
            break;
        }
        if let Err(e) = session_command(studio, gateway, cmd, arg).await {
            eprintln!("  ! {e}");
        }
        print_notices(studio);
    }
    Ok(())
}

fn prompt_label(studio: &Studio) -> String {
    let mode = format!("{:?}", studio.overlay().mode()).to_lowercase();
    match studio.active() {
        Some(a) => format!(
            "[{} {mode} u{} r{}]",
            a.name,
            studio.versions().undo_depth(),
            studio.versions().redo_depth()
        ),
        None => format!("[- {mode}]"),
    }
}

async fn session_command(
    studio: &mut Studio,
    gateway: &SynthesisGateway,
    cmd: &str,
    arg: &str,
) -> Result<(), String> {
    let err = |e: StudioError| describe(&e);
    match cmd {
        "" => {}
        "help" | "?" => println!("{SESSION_HELP}"),
        "list" => print_history(studio),
        "activate" => {
            let artifact = studio.activate(arg).map_err(err)?;
            println!("  active: {}", artifact.name);
        }
        "gen" | "generate" => {
            let artifact = studio
                .generate(gateway, GenerateRequest::prompt(arg))
                .await
                .map_err(err)?;
            println!("  generated {}  {}", artifact.id, artifact.name);
        }
        "refine" => dispatch_refine(studio, gateway, arg).await?,
        "undo" => {
            if !studio.undo().map_err(err)? {
                println!("  nothing to undo");
            }
        }
        "redo" => {
            if !studio.redo().map_err(err)? {
                println!("  nothing to redo");
            }
        }
        "show" => {
            let active = studio.active().ok_or("no artifact is active")?;
            println!("{}", active.body);
        }
        "mode" => studio.set_mode(arg.parse()?),
        "view" => studio.set_view(match arg {
            "preview" => PreviewView::Preview,
            "source" => PreviewView::Source,
            other => return Err(format!("unknown view '{other}' (preview, source)")),
        }),
        "outline" => {
            let doc = studio.preview().ok_or("no artifact is active")?;
            for (path, label) in doc.outline() {
                let indent = "  ".repeat(path.depth().saturating_sub(1));
                println!("  {indent}{path}  {label}");
            }
        }
        "hover" | "leave" | "click" => {
            let mut parts = arg.split_whitespace();
            let path: ElementPath = parts.next().unwrap_or_default().parse()?;
            let mut coord = || parts.next().and_then(|v| v.parse::<f64>().ok()).unwrap_or(0.0);
            let event = match cmd {
                "hover" => PointerEvent::Hover { path },
                "leave" => PointerEvent::Leave { path },
                _ => PointerEvent::Click {
                    path,
                    x: coord(),
                    y: coord(),
                },
            };
            print_outcome(&studio.pointer(event));
        }
        "action" => {
            let prompt = studio.choose_action(arg.parse()?).map_err(err)?;
            println!("  [{}] {}", prompt.target.locator(), prompt.question);
            if prompt.needs_value {
                println!("  reply with: answer <value> | cancel");
            } else {
                println!("  reply with: confirm | cancel");
            }
        }
        "answer" | "confirm" | "cancel" => {
            let response = match cmd {
                "answer" => EditResponse::Value(arg.to_string()),
                "confirm" => EditResponse::Confirm,
                _ => EditResponse::Cancel,
            };
            match studio.submit_edit(response).map_err(err)? {
                Some(instruction) => dispatch_refine(studio, gateway, &instruction).await?,
                None => println!("  edit cancelled"),
            }
        }
        "dismiss" => studio.dismiss_panel(),
        "export" => {
            let mut parts = arg.split_whitespace();
            let format: ExportFormat = parts.next().unwrap_or("snapshot").parse()?;
            let text = studio.export(None, format).map_err(err)?;
            match parts.next() {
                Some(file) => {
                    std::fs::write(file, text)
                        .map_err(|e| format!("failed to write '{file}': {e}"))?;
                    println!("  wrote {file}");
                }
                None => println!("{text}"),
            }
        }
        "import" => {
            let text = std::fs::read_to_string(arg)
                .map_err(|e| format!("failed to read '{arg}': {e}"))?;
            let artifact = studio.import(&text).map_err(err)?;
            println!("  imported {}  {}", artifact.id, artifact.name);
        }
        other => return Err(format!("unknown command '{other}' (try 'help')")),
    }
    Ok(())
}

async fn dispatch_refine(
    studio: &mut Studio,
    gateway: &SynthesisGateway,
    instruction: &str,
) -> Result<(), String> {
    if instruction.trim().is_empty() {
        return Err("an instruction is required".into());
    }
    println!("  refining: {instruction}");
    let artifact = studio
        .refine(gateway, instruction)
        .await
        .map_err(|e| describe(&e))?;
    println!("  refined {} ({} bytes)", artifact.name, artifact.body.len());
    Ok(())
}

fn print_outcome(outcome: &OverlayOutcome) {
    match outcome {
        OverlayOutcome::PassThrough => println!("  (passed through)"),
        OverlayOutcome::Highlighted { path } => println!("  highlighted {path}"),
        OverlayOutcome::Unhighlighted { path } => println!("  unhighlighted {path}"),
        OverlayOutcome::Ignored => println!("  (ignored)"),
        OverlayOutcome::Report { report } => {
            let mut label = report.tag.clone();
            if let Some(id) = &report.id {
                label.push('#');
                label.push_str(id);
            }
            for class in &report.classes {
                label.push('.');
                label.push_str(class);
            }
            println!("  <{label}> {:?}", report.text);
            for (prop, value) in report.style.entries() {
                println!("    {prop:<17} {value}");
            }
        }
        OverlayOutcome::MenuOpened { menu } => {
            println!(
                "  menu for [{}] at ({}, {}):",
                menu.target.locator(),
                menu.x,
                menu.y
            );
            for action in &menu.actions {
                println!("    {:?}: {}", action, action.label());
            }
        }
    }
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

use anyhow::Result;
use clap::{Parser, Subcommand};

mod envelope;
#[cfg(feature = "stdio")]
mod mcp;

use deepsearch_local::LocalExtractor;
use deepsearch_mcp::{engine_from_env, EngineOptions};
use envelope::{add_envelope_fields, error_obj, ErrorCode, SCHEMA_VERSION};

#[derive(Parser, Debug)]
#[command(name = "deepsearch")]
#[command(about = "Iterative web research (CLI + MCP stdio server)", long_about = None)]
struct Cli {
    /// Debug-level logs on stderr (RUST_LOG still wins when set).
    #[arg(long, short, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run as an MCP stdio server exposing web_deep_search and get_web_content.
    McpStdio,
    /// Research one question and print the {sub_question: summary} map (json).
    Research(ResearchCmd),
    /// Fetch one URL and print its extracted text.
    Fetch(FetchCmd),
    /// Diagnose configuration/launch issues (json; no secrets).
    Doctor(DoctorCmd),
    /// Print version info.
    Version(VersionCmd),
}

#[derive(clap::Args, Debug)]
struct ResearchCmd {
    /// The research question.
    query: String,
    /// Search provider: auto|bing|brave|tavily|searxng
    #[arg(long, env = "DEEPSEARCH_SEARCH_PROVIDER", default_value = "auto")]
    provider: String,
    /// Plan/search/judge passes before giving up (default: 3).
    #[arg(long)]
    max_iterations: Option<usize>,
    /// Model identifier for every completion call.
    #[arg(long)]
    model: Option<String>,
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
}

#[derive(clap::Args, Debug)]
struct FetchCmd {
    url: String,
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
}

#[derive(clap::Args, Debug)]
struct DoctorCmd {
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
    /// Spawn `deepsearch mcp-stdio` and call list_tools to prove MCP clients can start it.
    #[arg(long, action = clap::ArgAction::Set, default_value_t = true)]
    check_stdio: bool,
    /// Timeout for the stdio handshake (ms).
    #[arg(long, default_value_t = 3000)]
    timeout_ms: u64,
}

#[derive(clap::Args, Debug)]
struct VersionCmd {
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
}

/// `KEY=VALUE` pairs from an env file; blank lines and `#` comments are skipped and
/// matching surrounding quotes are stripped from values.
fn parse_env_file(txt: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for raw in txt.lines() {
        let s = raw.trim();
        if s.is_empty() || s.starts_with('#') {
            continue;
        }
        let s = s.strip_prefix("export ").unwrap_or(s);
        let Some((k, v)) = s.split_once('=') else {
            continue;
        };
        let k = k.trim();
        if k.is_empty() {
            continue;
        }
        let v = v.trim();
        let v = [('"', '"'), ('\'', '\'')]
            .iter()
            .find_map(|(open, close)| {
                v.strip_prefix(*open)
                    .and_then(|rest| rest.strip_suffix(*close))
            })
            .unwrap_or(v);
        out.push((k.to_string(), v.to_string()));
    }
    out
}

/// Opt-in via `DEEPSEARCH_ENV_FILE`. Never overrides the process environment and never
/// logs values.
fn load_env_file() {
    let Ok(p) = std::env::var("DEEPSEARCH_ENV_FILE") else {
        return;
    };
    let p = p.trim();
    if p.is_empty() {
        return;
    }
    let Ok(txt) = std::fs::read_to_string(p) else {
        return;
    };
    for (k, v) in parse_env_file(&txt) {
        if std::env::var_os(&k).is_none() {
            std::env::set_var(k, v);
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose { "debug" } else { "info" };
    // stdout belongs to the MCP transport and to command output.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn has_env(k: &str) -> bool {
    std::env::var(k).ok().is_some_and(|v| !v.trim().is_empty())
}

#[tokio::main]
async fn main() -> Result<()> {
    load_env_file();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::McpStdio => {
            #[cfg(feature = "stdio")]
            mcp::serve_stdio()
                .await
                .map_err(|e| anyhow::anyhow!(e.to_string()))?;
            #[cfg(not(feature = "stdio"))]
            anyhow::bail!("mcp-stdio requires feature `stdio` (rebuild with: --features stdio)");
        }
        Commands::Research(args) => {
            let opts = EngineOptions {
                provider: Some(args.provider),
                max_iterations: args.max_iterations,
                model: args.model,
            };
            let payload = match engine_from_env(&opts) {
                Ok(engine) => engine.web_deep_search(&args.query).await,
                Err(e) => serde_json::json!({ "error": e.to_string() }),
            };
            match args.output.to_ascii_lowercase().as_str() {
                "text" => {
                    if let Some(obj) = payload.as_object() {
                        for (k, v) in obj {
                            println!("## {k}\n\n{}\n", v.as_str().unwrap_or_default());
                        }
                    }
                }
                _ => println!("{payload}"),
            }
            if payload.get("error").is_some() {
                std::process::exit(2);
            }
        }
        Commands::Fetch(args) => {
            let t0 = std::time::Instant::now();
            let extractor = LocalExtractor::from_env()?;
            let url = args.url.trim();
            // One network fetch per invocation, whatever the output format.
            let fetched = if url.is_empty() {
                None
            } else {
                Some(extractor.try_extract(url).await)
            };
            match args.output.to_ascii_lowercase().as_str() {
                // Same contract as get_web_content: text, or nothing.
                "text" => {
                    let text = match &fetched {
                        Some(Ok(ex)) => ex.text.trim(),
                        _ => "",
                    };
                    println!("{text}");
                }
                _ => {
                    let mut payload = match fetched {
                        None => serde_json::json!({
                            "ok": false,
                            "url": url,
                            "error": error_obj(ErrorCode::InvalidParams, "url must be non-empty"),
                        }),
                        Some(Ok(ex)) => {
                            let text = ex.text.trim();
                            serde_json::json!({
                                "ok": true,
                                "url": url,
                                "engine": ex.engine,
                                "chars": text.chars().count(),
                                "text": text,
                            })
                        }
                        Some(Err(e)) => serde_json::json!({
                            "ok": false,
                            "url": url,
                            "error": error_obj(ErrorCode::from(&e), e.to_string()),
                        }),
                    };
                    add_envelope_fields(&mut payload, "fetch", t0.elapsed().as_millis());
                    println!("{payload}");
                }
            }
        }
        Commands::Doctor(args) => {
            let t0 = std::time::Instant::now();
            let providers = deepsearch_local::search::configured_providers();
            let llm_configured = deepsearch_local::openai_compat::configured();
            let provider_configured = providers.values().any(|v| *v);

            let mut checks: Vec<serde_json::Value> = Vec::new();
            checks.push(serde_json::json!({
                "name": "llm_configured",
                "ok": llm_configured,
                "message": if llm_configured { "language model endpoint configured" } else { "no language model endpoint configured" },
                "hint": if llm_configured { "" } else { "Set DEEPSEARCH_LLM_API_KEY (or OPENAI_API_KEY), and DEEPSEARCH_LLM_BASE_URL for non-OpenAI endpoints." },
            }));
            checks.push(serde_json::json!({
                "name": "search_provider_configured",
                "ok": provider_configured,
                "message": if provider_configured { "at least one search provider configured" } else { "no search provider configured" },
                "hint": if provider_configured { "" } else { "Set DEEPSEARCH_BING_API_KEY, DEEPSEARCH_BRAVE_API_KEY, DEEPSEARCH_TAVILY_API_KEY or DEEPSEARCH_SEARXNG_ENDPOINT." },
            }));

            let mut stdio_ok: Option<bool> = None;
            let mut stdio_tool_count: Option<usize> = None;
            let mut stdio_error: Option<serde_json::Value> = None;
            let mut stdio_elapsed_ms: Option<u128> = None;

            #[cfg(feature = "stdio")]
            if args.check_stdio {
                use rmcp::service::ServiceExt;
                use rmcp::transport::{ConfigureCommandExt, TokioChildProcess};
                use tokio::process::Command;

                let exe = std::env::current_exe()
                    .unwrap_or_else(|_| std::path::PathBuf::from("deepsearch"));
                let child = TokioChildProcess::new(Command::new(exe).configure(|cmd| {
                    cmd.args(["mcp-stdio"]);
                    // Keep the child server's stderr quiet.
                    cmd.env("RUST_LOG", "error");
                }))?;

                let service = ().serve(child).await?;
                let check_t0 = std::time::Instant::now();
                let res = tokio::time::timeout(
                    std::time::Duration::from_millis(args.timeout_ms),
                    service.list_tools(Default::default()),
                )
                .await;
                stdio_elapsed_ms = Some(check_t0.elapsed().as_millis());

                match res {
                    Ok(Ok(tools)) => {
                        stdio_ok = Some(true);
                        stdio_tool_count = Some(tools.tools.len());
                    }
                    Ok(Err(e)) => {
                        stdio_ok = Some(false);
                        stdio_error = Some(serde_json::json!({
                            "code": "handshake_failed",
                            "message": e.to_string(),
                            "hint": "The child closed the stdio transport early. Check that nothing prints to stdout in mcp-stdio mode and that the MCP client runs `deepsearch mcp-stdio`."
                        }));
                    }
                    Err(_elapsed) => {
                        stdio_ok = Some(false);
                        stdio_error = Some(serde_json::json!({
                            "code": "timeout",
                            "message": format!("stdio handshake timed out after {}ms", args.timeout_ms),
                            "hint": "The child did not answer list_tools in time."
                        }));
                    }
                }

                let _ = service.cancel().await;
            }

            #[cfg(not(feature = "stdio"))]
            if args.check_stdio {
                stdio_ok = Some(false);
            }

            checks.push(serde_json::json!({
                "name": "mcp_stdio_handshake",
                "ok": if args.check_stdio { stdio_ok.unwrap_or(false) } else { true },
                "skipped": !args.check_stdio,
                "message": if !args.check_stdio {
                    "stdio MCP handshake skipped"
                } else if stdio_ok.unwrap_or(false) {
                    "stdio MCP handshake succeeded"
                } else {
                    "stdio MCP handshake failed"
                },
                "tool_count": stdio_tool_count,
                "elapsed_ms": stdio_elapsed_ms,
                "error": stdio_error,
            }));

            let ok = checks.iter().all(|c| c["ok"].as_bool().unwrap_or(false));
            let mut payload = serde_json::json!({
                "ok": ok,
                "name": "deepsearch",
                "version": env!("CARGO_PKG_VERSION"),
                "platform": {
                    "os": std::env::consts::OS,
                    "arch": std::env::consts::ARCH,
                },
                "features": {
                    "stdio": cfg!(feature = "stdio"),
                },
                "configured": {
                    "providers": providers,
                    "llm": {
                        "api_key": has_env("DEEPSEARCH_LLM_API_KEY") || has_env("OPENAI_API_KEY") || has_env("OPEN_AI_KEY"),
                        "base_url": has_env("DEEPSEARCH_LLM_BASE_URL") || has_env("BASE_URL"),
                        "model_override": has_env("DEEPSEARCH_LLM_MODEL"),
                    },
                    "env_file": has_env("DEEPSEARCH_ENV_FILE"),
                },
                "checks": checks,
            });
            add_envelope_fields(&mut payload, "doctor", t0.elapsed().as_millis());
            match args.output.to_ascii_lowercase().as_str() {
                "text" => {
                    println!("deepsearch {} (ok={})", env!("CARGO_PKG_VERSION"), ok);
                    let flags = |k: &str| {
                        payload["configured"][k]
                            .as_object()
                            .map(|m| {
                                m.iter()
                                    .map(|(name, v)| format!("{name}={}", v.as_bool().unwrap_or(false)))
                                    .collect::<Vec<_>>()
                                    .join(" ")
                            })
                            .unwrap_or_default()
                    };
                    println!("providers: {}", flags("providers"));
                    println!("llm: {}", flags("llm"));
                    println!("checks:");
                    if let Some(arr) = payload["checks"].as_array() {
                        for c in arr {
                            let name = c["name"].as_str().unwrap_or("?");
                            let ok = c["ok"].as_bool().unwrap_or(false);
                            if c["skipped"].as_bool().unwrap_or(false) {
                                println!("- {name}: skipped");
                            } else {
                                println!("- {name}: {}", if ok { "ok" } else { "fail" });
                            }
                        }
                    }
                }
                _ => println!("{payload}"),
            }
        }
        Commands::Version(args) => {
            let v = serde_json::json!({
                "schema_version": SCHEMA_VERSION,
                "kind": "version",
                "ok": true,
                "name": "deepsearch",
                "version": env!("CARGO_PKG_VERSION"),
            });
            match args.output.to_ascii_lowercase().as_str() {
                "text" => println!("deepsearch {}", env!("CARGO_PKG_VERSION")),
                _ => println!("{v}"),
            }
        }
    }

    Ok(())
}

//! Converts a URL or an HTML file to PDF or PNG.
//!
//! Usage:
//!   cargo run --example convert -- https://example.com out.pdf
//!   cargo run --example convert -- page.html out.png --png
//!   cargo run --example convert -- page.html out.pdf --endpoint ws://127.0.0.1:9222/devtools/browser/<id>
//!   cargo run --example convert -- https://example.com out.pdf --binary /opt/chromium/chrome --debug
//!
//! The browser binary defaults to `$CHROMIUM_BIN`, then `/usr/bin/chromium`.

// ============================================================================
// Imports
// ============================================================================

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, bail};
use chromium_html_to_pdf::{
    ChromiumOptions, ConversionRequest, Converter, ImageFormat, ImageOptions, PdfOptions,
};
use tracing_subscriber::EnvFilter;

// ============================================================================
// Constants
// ============================================================================

const DEFAULT_BINARY: &str = "/usr/bin/chromium";

// ============================================================================
// Args
// ============================================================================

/// Command-line arguments.
#[derive(Debug, Clone)]
struct Args {
    input: String,
    output: PathBuf,
    binary: Option<PathBuf>,
    endpoint: Option<String>,
    png: bool,
    debug: bool,
    timeout: Option<Duration>,
}

impl Args {
    fn parse() -> anyhow::Result<Self> {
        let mut positional = Vec::new();
        let mut binary = None;
        let mut endpoint = None;
        let mut png = false;
        let mut debug = false;
        let mut timeout = None;

        let mut args = std::env::args().skip(1);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--binary" => binary = Some(args.next().context("--binary needs a path")?.into()),
                "--endpoint" => endpoint = Some(args.next().context("--endpoint needs a URL")?),
                "--timeout" => {
                    let secs: u64 = args
                        .next()
                        .context("--timeout needs seconds")?
                        .parse()
                        .context("--timeout must be a number")?;
                    timeout = Some(Duration::from_secs(secs));
                }
                "--png" => png = true,
                "--debug" => debug = true,
                _ => positional.push(arg),
            }
        }

        let [input, output] = <[String; 2]>::try_from(positional)
            .map_err(|_| anyhow::anyhow!("usage: convert <url|file.html> <output> [options]"))?;

        Ok(Self {
            input,
            output: output.into(),
            binary,
            endpoint,
            png,
            debug,
            timeout,
        })
    }
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let args = match Args::parse() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(2);
        }
    };
    init_logging(args.debug);

    if let Err(e) = run(args).await {
        eprintln!("\n[ERROR] {e:#}");
        std::process::exit(1);
    }
}

fn init_logging(debug: bool) {
    let filter = if debug {
        "chromium_html_to_pdf=debug"
    } else {
        "chromium_html_to_pdf=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();
}

async fn run(args: Args) -> anyhow::Result<()> {
    let mut builder = Converter::builder().instance_id("demo");
    builder = match (&args.endpoint, &args.binary) {
        (Some(endpoint), _) => builder.endpoint(endpoint),
        (None, Some(binary)) => builder.binary(binary),
        (None, None) => builder.binary(
            std::env::var_os("CHROMIUM_BIN")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_BINARY)),
        ),
    };
    let converter = builder
        .options(ChromiumOptions::new().with_no_sandbox())
        .build()
        .context("invalid configuration")?;

    let mut request = if args.input.contains("://") {
        ConversionRequest::url(&args.input)
    } else {
        let html = tokio::fs::read_to_string(&args.input)
            .await
            .with_context(|| format!("cannot read {}", args.input))?;
        ConversionRequest::html(html)
    };

    request = if args.png {
        request.with_image(ImageOptions::new(ImageFormat::Png).with_full_page(true))
    } else {
        request.with_pdf(PdfOptions::default().with_print_background(true))
    };
    if let Some(timeout) = args.timeout {
        request = request.with_timeout(timeout);
    }

    println!("=== convert ===\n");
    println!("[Browser] {}", converter.browser_version().await?);

    let outcome = converter.convert_to_file(request, &args.output).await;
    converter.close().await?;

    let result = match outcome {
        Ok(result) => result,
        Err(e) => bail!("conversion failed ({:?}): {e}", e.kind()),
    };

    println!(
        "[Done] {} bytes -> {} in {:?}",
        result.byte_size,
        result.output.display(),
        result.elapsed
    );
    Ok(())
}

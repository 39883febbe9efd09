mod charset;

use clap::Parser;
use hp_core::PreviewError;
use hp_core::PreviewResult;
use hp_html::HtmlParser;
use hp_rewrite::DEFAULT_HOST;
use hp_rewrite::DocumentRewriter;
use hp_rewrite::PlaceholderValues;
use hp_rewrite::RewriteContext;
use hp_rewrite::RewrittenDocument;
use hp_rewrite::ScriptDescriptor;
use hp_rewrite::substitute_placeholders;
use log::info;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;

/// Overrides the default hosting site when `--host` is not given.
const HOST_ENV_VAR: &str = "HTMLPREVIEW_HOST";

#[derive(Parser, Debug)]
#[command(name = "htmlpreview")]
#[command(about = "Rewrite a repository-hosted HTML document for embedded preview")]
#[command(version)]
struct Cli {
    /// Repository as `owner/name`
    #[arg(long)]
    repo: String,

    /// Branch the document was fetched from
    #[arg(long)]
    branch: String,

    /// Path of the document inside the repository
    #[arg(long)]
    file: String,

    /// URL of the viewer page (default: the document's browse URL)
    #[arg(long)]
    page_url: Option<String>,

    /// Hosting site (default: $HTMLPREVIEW_HOST or github.com)
    #[arg(long)]
    host: Option<String>,

    /// Page the viewer was opened from (default: the document's browse URL)
    #[arg(long)]
    original_url: Option<String>,

    /// Charset label overriding the document's own declaration
    #[arg(long)]
    charset: Option<String>,

    /// Viewer page template whose `${name}` placeholders are filled in
    #[arg(long, requires = "template_out")]
    template: Option<PathBuf>,

    /// Where the filled-in viewer template is written
    #[arg(long, requires = "template")]
    template_out: Option<PathBuf>,

    /// Local copy of the document
    input: PathBuf,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("htmlpreview error: {error}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> PreviewResult<()> {
    let context = context_from_cli(cli, std::env::var(HOST_ENV_VAR).ok());
    context.validate()?;

    if let (Some(template), Some(out)) = (&cli.template, &cli.template_out) {
        let body = read_file(template, "app.template.read")?;
        let html = fill_template(&charset::decode_document(&body, None)?, &context)?;
        fs::write(out, html).map_err(|error| {
            PreviewError::new(
                "app.template.write",
                format!("failed to write {}: {error}", out.display()),
            )
        })?;
    }

    let body = read_file(&cli.input, "app.input.read")?;
    let text = charset::decode_document(&body, cli.charset.as_deref())?;

    let rewritten = preview(&text, &context)?;
    log_summary(&rewritten);

    let mut stdout = std::io::stdout().lock();
    stdout
        .write_all(rewritten.document.to_html().as_bytes())
        .and_then(|()| stdout.flush())
        .map_err(|error| PreviewError::new("app.output.write", error.to_string()))
}

fn read_file(path: &Path, code: &'static str) -> PreviewResult<Vec<u8>> {
    fs::read(path).map_err(|error| {
        PreviewError::new(code, format!("failed to read {}: {error}", path.display()))
    })
}

fn context_from_cli(cli: &Cli, env_host: Option<String>) -> RewriteContext {
    let host = cli
        .host
        .clone()
        .or(env_host.filter(|host| !host.trim().is_empty()))
        .unwrap_or_else(|| DEFAULT_HOST.to_owned());
    let file = cli.file.trim_start_matches('/');
    let page_url = cli.page_url.clone().unwrap_or_else(|| {
        format!("https://{host}/{}/blob/{}/{file}", cli.repo, cli.branch)
    });

    let context = RewriteContext::new(&cli.repo, &cli.branch, file, page_url).with_host(host);
    match &cli.original_url {
        Some(original_url) => context.with_original_url(original_url),
        None => context,
    }
}

/// Fills the viewer's own template with the document's coordinates.
fn fill_template(text: &str, context: &RewriteContext) -> PreviewResult<String> {
    let mut template = HtmlParser.parse(text);
    let values = PlaceholderValues::from_context(context)?;
    let substituted = substitute_placeholders(&mut template, &values);
    info!("filled {substituted} template placeholders");
    Ok(template.to_html())
}

fn preview(text: &str, context: &RewriteContext) -> PreviewResult<RewrittenDocument> {
    DocumentRewriter.process(HtmlParser.parse(text), context)
}

fn log_summary(rewritten: &RewrittenDocument) {
    info!("viewport width: {}", rewritten.viewport_width);
    for (index, script) in rewritten.quarantined.iter().enumerate() {
        match &script.descriptor {
            ScriptDescriptor::External { url } => info!("script #{index}: external {url}"),
            ScriptDescriptor::Inline { source } => {
                info!("script #{index}: inline, {} bytes", source.len());
            }
        }
    }
}

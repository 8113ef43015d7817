use std::cell::Cell;
use std::fs::File;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{error, info};
use simplelog::{Config, LevelFilter, WriteLogger};

use folio::docdata::DocumentData;
use folio::document::{
    CaseSensitivity, ChangeFlags, Color, Document, DocumentObserver, ObserverId, PixmapRequest,
    SearchId, SearchType, Viewport,
};
use folio::panic_handler::initialize_panic_handler;
use folio::settings;

const CLI_OBSERVER: ObserverId = ObserverId::new(1);
const RENDER_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Parser, Debug)]
#[command(version, about = "Open a document, search it and render pages")]
struct Args {
    /// Document to open
    file: PathBuf,

    /// Mime type to use instead of guessing from the extension
    #[arg(long)]
    mime: Option<String>,

    /// Highlight every occurrence and list the matching pages
    #[arg(long)]
    search: Option<String>,

    #[arg(long)]
    case_sensitive: bool,

    /// Page to render (0-based)
    #[arg(long)]
    render: Option<usize>,

    /// Pixmap size as WIDTHxHEIGHT
    #[arg(long, default_value = "612x792", value_parser = parse_size)]
    size: (u32, u32),

    /// Write the rendered page as PNG
    #[arg(long)]
    output: Option<PathBuf>,

    /// Write the text of every page to this file
    #[arg(long)]
    export_text: Option<PathBuf>,

    /// Viewport to open at, in its string form (e.g. "3;C2:0.5:0.5:1")
    #[arg(long)]
    viewport: Option<Viewport>,

    #[arg(long, default_value = "info")]
    log_level: LevelFilter,

    #[arg(long, default_value = "folio.log")]
    log_file: PathBuf,
}

fn parse_size(value: &str) -> Result<(u32, u32), String> {
    let (w, h) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got {value:?}"))?;
    let w = w.parse().map_err(|e| format!("bad width {w:?}: {e}"))?;
    let h = h.parse().map_err(|e| format!("bad height {h:?}: {e}"))?;
    Ok((w, h))
}

/// Observer standing in for a view: remembers which pages got pixmaps
struct RenderTarget {
    rendered: Cell<Option<usize>>,
}

impl DocumentObserver for RenderTarget {
    fn observer_id(&self) -> ObserverId {
        CLI_OBSERVER
    }

    fn notify_page_changed(&self, page: usize, flags: ChangeFlags) {
        if flags.contains(ChangeFlags::PIXMAP) {
            self.rendered.set(Some(page));
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    WriteLogger::init(
        args.log_level,
        Config::default(),
        File::create(&args.log_file)
            .with_context(|| format!("cannot create {}", args.log_file.display()))?,
    )?;
    initialize_panic_handler();

    info!("Starting folio");
    settings::load_settings();

    let result = run(&args);
    if let Err(e) = &result {
        error!("Application error: {e:?}");
    }
    info!("Shutting down folio");
    result
}

fn run(args: &Args) -> Result<()> {
    let docdata = DocumentData::load_or_ephemeral(DocumentData::default_path().as_deref());
    let mut document = Document::new().with_docdata(docdata);

    let target = Rc::new(RenderTarget {
        rendered: Cell::new(None),
    });
    let observer: Rc<dyn DocumentObserver> = target.clone();
    document.add_observer(&observer);

    if let Some(viewport) = args.viewport {
        document.set_next_document_viewport(viewport);
    }
    document
        .open_document(&args.file, args.mime.as_deref())
        .with_context(|| format!("cannot open {}", args.file.display()))?;

    print_summary(&document);

    if let Some(text) = &args.search {
        let case = if args.case_sensitive {
            CaseSensitivity::Sensitive
        } else {
            CaseSensitivity::Insensitive
        };
        let found = document.search_text(
            SearchId::Part,
            text,
            true,
            case,
            SearchType::AllDoc,
            false,
            Color::YELLOW,
        );
        let pages: Vec<String> = document
            .pages()
            .iter()
            .filter(|p| p.has_highlights(SearchId::Part))
            .map(|p| p.number().to_string())
            .collect();
        if found {
            println!("{text:?} found on pages: {}", pages.join(", "));
        } else {
            println!("{text:?} not found");
        }
    }

    if let Some(path) = &args.export_text {
        document
            .export_to_text(path)
            .with_context(|| format!("cannot export text of {}", args.file.display()))?;
        println!("Wrote text to {}", path.display());
    }

    if let Some(page) = args.render {
        render_page(&mut document, &target, page, args)?;
    }

    document.close_document();
    Ok(())
}

fn print_summary(document: &Document) {
    if let Some(info) = document.document_info() {
        for entry in info.iter() {
            println!("{}: {}", entry.title, entry.value);
        }
    }
    println!("Viewport: {}", document.viewport());

    if let Some(synopsis) = document.document_synopsis() {
        println!("Contents:");
        for (level, entry) in synopsis.walk() {
            let page = entry
                .viewport
                .and_then(|v| v.page())
                .map_or_else(|| "-".to_string(), |p| p.to_string());
            println!("{}{} ({page})", "  ".repeat(level + 1), entry.title);
        }
    }
}

fn render_page(document: &mut Document, target: &RenderTarget, page: usize, args: &Args) -> Result<()> {
    if page >= document.page_count() {
        bail!(
            "page {page} out of range, document has {} pages",
            document.page_count()
        );
    }
    let (width, height) = args.size;
    document.request_pixmaps(vec![PixmapRequest::new(CLI_OBSERVER, page, width, height)]);

    let deadline = Instant::now() + RENDER_TIMEOUT;
    while target.rendered.get() != Some(page) {
        if !document.has_pending_requests() {
            bail!("rendering page {page} failed, see the log for details");
        }
        if Instant::now() >= deadline {
            bail!("rendering page {page} timed out");
        }
        document.wait_for_completions(Duration::from_millis(100));
    }

    let pixmap = document
        .page(page)
        .and_then(|p| p.pixmap(CLI_OBSERVER))
        .context("rendered pixmap was unloaded")?;
    println!("Rendered page {page} at {width}x{height}");

    if let Some(output) = &args.output {
        pixmap
            .save(output)
            .with_context(|| format!("cannot write {}", output.display()))?;
        println!("Wrote {}", output.display());
    }
    Ok(())
}

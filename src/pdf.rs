use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, dictionary};
use serde::Serialize;
use tokio::sync::Semaphore;

use crate::assets::RemoteAssetLocator;
use crate::cli::RenderArgs;
use crate::config::BookConfig;
use crate::imaging::{EmbeddableImage, cover_rect, prepare_for_pdf};
use crate::pages::{BookData, PageDescriptor, PageKind, PageListBuilder, compose_book};
use crate::preview::page_label;

const MAX_IMAGE_BYTES: usize = 25 * 1024 * 1024;
const DEDICATION_FONT_SIZE: f32 = 12.0;
const DEDICATION_MIN_FONT_SIZE: f32 = 8.0;
const DEDICATION_LEADING_RATIO: f32 = 4.0 / 3.0;
const DEDICATION_MARGIN: f32 = 36.0;
const DEDICATION_GUTTER: f32 = 18.0;

#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> anyhow::Result<Vec<u8>>;
}

/// Fetches `http(s)://` artwork with reqwest and `file://` artwork from disk.
#[derive(Debug, Clone)]
pub struct HttpImageFetcher {
    client: reqwest::Client,
}

impl HttpImageFetcher {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .context("build asset http client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, url: &str) -> anyhow::Result<Vec<u8>> {
        let parsed = url::Url::parse(url).with_context(|| format!("parse asset url: {url}"))?;
        if parsed.scheme() == "file" {
            let path = parsed
                .to_file_path()
                .map_err(|_| anyhow::anyhow!("invalid file url: {url}"))?;
            return tokio::fs::read(&path)
                .await
                .with_context(|| format!("read asset: {}", path.display()));
        }

        let mut resp = self
            .client
            .get(parsed)
            .header(reqwest::header::USER_AGENT, "namebook/0.1")
            .send()
            .await
            .with_context(|| format!("GET {url}"))?;
        if !resp.status().is_success() {
            anyhow::bail!("asset fetch failed ({}): {url}", resp.status());
        }

        let mut out: Vec<u8> = Vec::new();
        while let Some(chunk) = resp.chunk().await.context("read response chunk")? {
            if out.len() + chunk.len() > MAX_IMAGE_BYTES {
                anyhow::bail!("asset exceeds {MAX_IMAGE_BYTES} bytes: {url}");
            }
            out.extend_from_slice(&chunk);
        }
        Ok(out)
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PageOutcome {
    Embedded,
    Fallback { reason: String },
    Text,
}

#[derive(Debug, Clone, Serialize)]
pub struct PageReport {
    pub index: usize,
    pub label: String,
    pub image_path: String,
    #[serde(flatten)]
    pub outcome: PageOutcome,
}

#[derive(Debug, Clone)]
pub struct RenderedBook {
    pub pdf: Vec<u8>,
    pub pages: Vec<PageReport>,
}

impl RenderedBook {
    pub fn fallback_count(&self) -> usize {
        self.pages
            .iter()
            .filter(|p| matches!(p.outcome, PageOutcome::Fallback { .. }))
            .count()
    }
}

pub struct PrintRenderer {
    config: BookConfig,
    fetcher: Arc<dyn ImageFetcher>,
}

impl PrintRenderer {
    pub fn new(config: BookConfig, fetcher: Arc<dyn ImageFetcher>) -> Self {
        Self { config, fetcher }
    }

    pub fn pages_for(&self, book: &BookData) -> Vec<PageDescriptor> {
        let locator = RemoteAssetLocator::new(&self.config.remote_asset_base_url);
        let artwork = PageListBuilder::new(self.config.theme_orders, &locator).build(&book.spec);
        compose_book(artwork)
    }

    /// Renders the print PDF. Artwork failures degrade single pages; only a
    /// failure to serialize the document is an error.
    pub async fn render(&self, book: &BookData) -> anyhow::Result<RenderedBook> {
        let pages = self.pages_for(book);
        let images = self.fetch_all(&pages).await;

        let mut writer = PdfWriter::new(self.config.page_width_pt, self.config.page_height_pt);
        let mut reports = Vec::with_capacity(pages.len());
        for (index, (page, image)) in pages.iter().zip(images).enumerate() {
            let label = page_label(&pages, index);
            let outcome = match (page.kind, image) {
                (PageKind::Dedication, _) => {
                    writer.add_dedication_page(book)?;
                    PageOutcome::Text
                }
                (_, Some(Ok(image))) => {
                    writer.add_image_page(&image)?;
                    PageOutcome::Embedded
                }
                (_, Some(Err(err))) => {
                    tracing::warn!(page = index, label = %label, url = %page.image_path, err = %format!("{err:#}"), "artwork unavailable; drawing fallback");
                    writer.add_fallback_page(&fallback_text(page, &label), self.fallback_size(page))?;
                    PageOutcome::Fallback {
                        reason: format!("{err:#}"),
                    }
                }
                (_, None) => {
                    writer.add_fallback_page(&fallback_text(page, &label), self.fallback_size(page))?;
                    PageOutcome::Fallback {
                        reason: "not fetched".to_string(),
                    }
                }
            };
            reports.push(PageReport {
                index,
                label,
                image_path: page.image_path.clone(),
                outcome,
            });
        }

        let pdf = writer.finish().context("write pdf")?;
        let rendered = RenderedBook {
            pdf,
            pages: reports,
        };
        tracing::info!(
            pages = rendered.pages.len(),
            fallbacks = rendered.fallback_count(),
            bytes = rendered.pdf.len(),
            "rendered book pdf"
        );
        Ok(rendered)
    }

    fn fallback_size(&self, page: &PageDescriptor) -> f32 {
        if page.kind == PageKind::Letter {
            self.config.fallback_font_size
        } else {
            self.config.fallback_font_size / 4.0
        }
    }

    async fn fetch_all(
        &self,
        pages: &[PageDescriptor],
    ) -> Vec<Option<anyhow::Result<EmbeddableImage>>> {
        let deadline = tokio::time::Instant::now() + self.config.assembly_deadline();
        let asset_timeout = self.config.asset_timeout();
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_fetches.max(1)));

        let mut set = tokio::task::JoinSet::new();
        for (index, page) in pages.iter().enumerate() {
            if !page.has_artwork() {
                continue;
            }
            let fetcher = Arc::clone(&self.fetcher);
            let semaphore = Arc::clone(&semaphore);
            let url = page.image_path.clone();
            set.spawn(async move {
                let result = tokio::time::timeout_at(deadline, async {
                    let _permit = semaphore
                        .acquire_owned()
                        .await
                        .context("fetch semaphore closed")?;
                    let bytes = tokio::time::timeout(asset_timeout, fetcher.fetch(&url))
                        .await
                        .map_err(|_| anyhow::anyhow!("timed out after {asset_timeout:?}"))??;
                    tokio::task::spawn_blocking(move || prepare_for_pdf(&bytes))
                        .await
                        .context("join transcode task")?
                })
                .await
                .unwrap_or_else(|_| Err(anyhow::anyhow!("assembly deadline exceeded")));
                (index, result)
            });
        }

        let mut images: Vec<Option<anyhow::Result<EmbeddableImage>>> =
            (0..pages.len()).map(|_| None).collect();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((index, result)) => images[index] = Some(result),
                Err(err) => tracing::warn!(?err, "asset fetch task failed"),
            }
        }
        images
    }
}

fn fallback_text(page: &PageDescriptor, label: &str) -> String {
    match page.letter {
        Some(letter) => letter.to_string(),
        None => label.to_string(),
    }
}

/// Minimal page-at-a-time PDF builder on top of lopdf.
struct PdfWriter {
    document: Document,
    pages_id: ObjectId,
    bold_font_id: ObjectId,
    body_font_id: ObjectId,
    page_ids: Vec<ObjectId>,
    width: f32,
    height: f32,
}

impl PdfWriter {
    fn new(width: f32, height: f32) -> Self {
        let mut document = Document::with_version("1.7");
        let pages_id = document.new_object_id();
        let bold_font_id = document.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica-Bold",
            "Encoding" => "WinAnsiEncoding",
        });
        let body_font_id = document.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });
        Self {
            document,
            pages_id,
            bold_font_id,
            body_font_id,
            page_ids: Vec::new(),
            width,
            height,
        }
    }

    fn fonts(&self) -> Dictionary {
        dictionary! {
            "F1" => self.bold_font_id,
            "F2" => self.body_font_id,
        }
    }

    fn add_image_page(&mut self, image: &EmbeddableImage) -> anyhow::Result<()> {
        let image_stream = Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => i64::from(image.width),
                "Height" => i64::from(image.height),
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
                "Filter" => "DCTDecode",
            },
            image.jpeg.clone(),
        );
        let image_id = self.document.add_object(image_stream);

        let r = cover_rect(image.width, image.height, self.width, self.height);
        let operations = vec![
            Operation::new("q", vec![]),
            Operation::new(
                "re",
                vec![0.into(), 0.into(), self.width.into(), self.height.into()],
            ),
            Operation::new("W", vec![]),
            Operation::new("n", vec![]),
            Operation::new(
                "cm",
                vec![
                    r.width.into(),
                    0.into(),
                    0.into(),
                    r.height.into(),
                    r.x.into(),
                    r.y.into(),
                ],
            ),
            Operation::new("Do", vec![Object::Name(b"Im1".to_vec())]),
            Operation::new("Q", vec![]),
        ];
        let resources = dictionary! {
            "Font" => self.fonts(),
            "XObject" => dictionary! { "Im1" => image_id },
        };
        self.push_page(operations, resources)
    }

    fn add_fallback_page(&mut self, text: &str, font_size: f32) -> anyhow::Result<()> {
        let text_width = approx_text_width(text, font_size, 0.72);
        let x = ((self.width - text_width) / 2.0).max(0.0);
        let y = (self.height - font_size * 0.72) / 2.0;
        let operations = vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), font_size.into()]),
            Operation::new("Td", vec![x.into(), y.into()]),
            Operation::new("Tj", vec![Object::string_literal(win_ansi(text))]),
            Operation::new("ET", vec![]),
        ];
        let resources = dictionary! { "Font" => self.fonts() };
        self.push_page(operations, resources)
    }

    /// Two-column text overlay: dedication on the left, personal message and
    /// signature on the right.
    fn add_dedication_page(&mut self, book: &BookData) -> anyhow::Result<()> {
        let mut layout = layout_dedication(book, self.width, self.height);
        if !layout.fits() {
            tracing::warn!(
                max_lines = layout.max_lines,
                left = layout.left.len(),
                right = layout.right.len(),
                "dedication text truncated to fit the page"
            );
            layout.left.truncate(layout.max_lines);
            layout.right.truncate(layout.max_lines);
        }

        let leading = layout.font_size * DEDICATION_LEADING_RATIO;
        let top = self.height - DEDICATION_MARGIN - layout.font_size;
        let mut operations = Vec::new();
        for (x, lines) in [(layout.left_x, &layout.left), (layout.right_x, &layout.right)] {
            if lines.is_empty() {
                continue;
            }
            operations.push(Operation::new("BT", vec![]));
            operations.push(Operation::new(
                "Tf",
                vec!["F2".into(), layout.font_size.into()],
            ));
            operations.push(Operation::new("TL", vec![leading.into()]));
            operations.push(Operation::new("Td", vec![x.into(), top.into()]));
            for (i, line) in lines.iter().enumerate() {
                if i > 0 {
                    operations.push(Operation::new("T*", vec![]));
                }
                operations.push(Operation::new(
                    "Tj",
                    vec![Object::string_literal(win_ansi(line))],
                ));
            }
            operations.push(Operation::new("ET", vec![]));
        }

        let resources = dictionary! { "Font" => self.fonts() };
        self.push_page(operations, resources)
    }

    fn push_page(&mut self, operations: Vec<Operation>, resources: Dictionary) -> anyhow::Result<()> {
        let content = Content { operations };
        let content_id = self
            .document
            .add_object(Stream::new(dictionary! {}, content.encode().context("encode page content")?));
        let page_id = self.document.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "MediaBox" => vec![0.into(), 0.into(), self.width.into(), self.height.into()],
            "Contents" => content_id,
            "Resources" => resources,
        });
        self.page_ids.push(page_id);
        Ok(())
    }

    fn finish(mut self) -> anyhow::Result<Vec<u8>> {
        let kids: Vec<Object> = self.page_ids.iter().map(|id| Object::from(*id)).collect();
        let pages_dict = dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => self.page_ids.len() as i64,
        };
        self.document
            .objects
            .insert(self.pages_id, Object::Dictionary(pages_dict));
        let catalog_id = self.document.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        self.document.trailer.set("Root", catalog_id);

        let mut out = Vec::new();
        self.document.save_to(&mut out).context("save pdf")?;
        Ok(out)
    }
}

fn approx_text_width(text: &str, font_size: f32, em_ratio: f32) -> f32 {
    text.chars().count() as f32 * font_size * em_ratio
}

/// Helvetica advance widths for ASCII 0x20..=0x7E, in 1/1000 em.
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // ' '../
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, // 0-9
    278, 278, 584, 584, 584, 556, 1015, // :;<=>?@
    667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, // A-M
    722, 778, 667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, // N-Z
    278, 278, 278, 469, 556, 333, // [\]^_`
    556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, // a-m
    556, 556, 556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, // n-z
    334, 260, 334, 584, // {|}~
];

fn glyph_width(c: char) -> u16 {
    match c {
        ' '..='~' => HELVETICA_WIDTHS[c as usize - 0x20],
        // Widest Latin-1 glyphs are 1000.
        _ => 1000,
    }
}

fn text_width(text: &str, font_size: f32) -> f32 {
    let units: u32 = text.chars().map(|c| u32::from(glyph_width(c))).sum();
    units as f32 * font_size / 1000.0
}

/// Greedy word wrap measured with Helvetica widths. Explicit newlines in the
/// input are kept and words wider than the column are split.
fn wrap_text(text: &str, max_width: f32, font_size: f32) -> Vec<String> {
    let mut lines = Vec::new();
    for paragraph in text.trim().lines() {
        let mut line = String::new();
        for word in paragraph.split_whitespace() {
            for piece in split_wide_word(word, max_width, font_size) {
                let candidate = if line.is_empty() {
                    piece.clone()
                } else {
                    format!("{line} {piece}")
                };
                if !line.is_empty() && text_width(&candidate, font_size) > max_width {
                    lines.push(std::mem::replace(&mut line, piece));
                } else {
                    line = candidate;
                }
            }
        }
        lines.push(line);
    }
    if lines.iter().all(String::is_empty) {
        return Vec::new();
    }
    lines
}

fn split_wide_word(word: &str, max_width: f32, font_size: f32) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut piece = String::new();
    for c in word.chars() {
        piece.push(c);
        if piece.chars().count() > 1 && text_width(&piece, font_size) > max_width {
            piece.pop();
            pieces.push(std::mem::take(&mut piece));
            piece.push(c);
        }
    }
    if !piece.is_empty() {
        pieces.push(piece);
    }
    pieces
}

/// Wrapped dedication text at the largest font size that fits both columns.
#[derive(Debug, Clone, PartialEq)]
pub struct DedicationLayout {
    pub font_size: f32,
    pub column_width: f32,
    pub left_x: f32,
    pub right_x: f32,
    pub left: Vec<String>,
    pub right: Vec<String>,
    pub max_lines: usize,
}

impl DedicationLayout {
    pub fn fits(&self) -> bool {
        self.left.len().max(self.right.len()) <= self.max_lines
    }
}

pub fn layout_dedication(book: &BookData, page_width: f32, page_height: f32) -> DedicationLayout {
    let column_width = ((page_width - 2.0 * DEDICATION_MARGIN - DEDICATION_GUTTER) / 2.0).max(1.0);
    let mut font_size = DEDICATION_FONT_SIZE;
    loop {
        let layout = layout_at(book, column_width, page_height, font_size);
        if layout.fits() || font_size <= DEDICATION_MIN_FONT_SIZE {
            return layout;
        }
        font_size -= 1.0;
    }
}

fn layout_at(book: &BookData, column_width: f32, page_height: f32, font_size: f32) -> DedicationLayout {
    let left = wrap_text(&book.dedication_message, column_width, font_size);
    let mut right = wrap_text(&book.personal_message, column_width, font_size);
    let signature = book.from_signature.trim();
    if !signature.is_empty() {
        if !right.is_empty() {
            right.push(String::new());
        }
        right.extend(wrap_text(&format!("From {signature}"), column_width, font_size));
    }

    let leading = font_size * DEDICATION_LEADING_RATIO;
    let top = page_height - DEDICATION_MARGIN - font_size;
    let max_lines = if top < DEDICATION_MARGIN {
        0
    } else {
        ((top - DEDICATION_MARGIN) / leading).floor() as usize + 1
    };

    DedicationLayout {
        font_size,
        column_width,
        left_x: DEDICATION_MARGIN,
        right_x: DEDICATION_MARGIN + column_width + DEDICATION_GUTTER,
        left,
        right,
        max_lines,
    }
}

/// `namebook render`: writes a PDF for a book JSON file and reports pages
/// that fell back to text.
pub async fn run(args: RenderArgs) -> anyhow::Result<()> {
    if args.out.exists() && !args.force {
        anyhow::bail!(
            "output already exists: {} (pass --force to overwrite)",
            args.out.display()
        );
    }
    let mut config = BookConfig::load(args.config.as_deref())?;
    if let Some(base) = args.asset_base_url {
        config.remote_asset_base_url = base;
    }
    let raw = tokio::fs::read(&args.book)
        .await
        .with_context(|| format!("read book: {}", args.book.display()))?;
    let book: BookData = serde_json::from_slice(&raw)
        .with_context(|| format!("parse book json: {}", args.book.display()))?;

    let fetcher = HttpImageFetcher::new(config.asset_timeout())?;
    let renderer = PrintRenderer::new(config, Arc::new(fetcher));
    let rendered = renderer.render(&book).await?;

    if let Some(parent) = args.out.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("create output dir: {}", parent.display()))?;
    }
    tokio::fs::write(&args.out, &rendered.pdf)
        .await
        .with_context(|| format!("write pdf: {}", args.out.display()))?;

    for page in &rendered.pages {
        if let PageOutcome::Fallback { reason } = &page.outcome {
            eprintln!("fallback: {} ({reason})", page.label);
        }
    }
    println!(
        "wrote {} ({} pages, {} without artwork)",
        args.out.display(),
        rendered.pages.len(),
        rendered.fallback_count()
    );
    Ok(())
}

/// Encodes text for the WinAnsi Type1 fonts. Characters outside the encoding
/// print as `?`.
fn win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| {
            let code = c as u32;
            if (0x20..=0x7E).contains(&code) || (0xA0..=0xFF).contains(&code) {
                return code as u8;
            }
            match c {
                '\u{20AC}' => 0x80,
                '\u{201A}' => 0x82,
                '\u{0192}' => 0x83,
                '\u{201E}' => 0x84,
                '\u{2026}' => 0x85,
                '\u{2020}' => 0x86,
                '\u{2021}' => 0x87,
                '\u{02C6}' => 0x88,
                '\u{2030}' => 0x89,
                '\u{0160}' => 0x8A,
                '\u{2039}' => 0x8B,
                '\u{0152}' => 0x8C,
                '\u{017D}' => 0x8E,
                '\u{2018}' => 0x91,
                '\u{2019}' => 0x92,
                '\u{201C}' => 0x93,
                '\u{201D}' => 0x94,
                '\u{2022}' => 0x95,
                '\u{2013}' => 0x96,
                '\u{2014}' => 0x97,
                '\u{02DC}' => 0x98,
                '\u{2122}' => 0x99,
                '\u{0161}' => 0x9A,
                '\u{203A}' => 0x9B,
                '\u{0153}' => 0x9C,
                '\u{017E}' => 0x9E,
                '\u{0178}' => 0x9F,
                _ => b'?',
            }
        })
        .collect()
}

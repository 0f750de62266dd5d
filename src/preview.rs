use std::time::Duration;

use anyhow::Context as _;
use serde::Serialize;

use crate::assets::{AssetLocator, LocalAssetIndex, RemoteAssetLocator};
use crate::cli::PagesArgs;
use crate::config::BookConfig;
use crate::pages::{BookSpec, PageDescriptor, PageKind, PageListBuilder, compose_book, name_letters};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PageStatus {
    Loading,
    Loaded,
    Error,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "tile", rename_all = "snake_case")]
pub enum PreviewTile {
    Skeleton,
    Image { src: String },
    Placeholder { label: String },
    Dedication,
}

/// On-screen mock-up of a book: one status per page, updated by image load
/// events. A failed page never changes the state of any other page.
#[derive(Debug, Clone)]
pub struct PreviewBoard {
    pages: Vec<PageDescriptor>,
    statuses: Vec<PageStatus>,
}

impl PreviewBoard {
    pub fn new(pages: Vec<PageDescriptor>) -> Self {
        let statuses = pages
            .iter()
            .map(|p| {
                if p.has_artwork() {
                    PageStatus::Loading
                } else {
                    PageStatus::Loaded
                }
            })
            .collect();
        Self { pages, statuses }
    }

    pub fn pages(&self) -> &[PageDescriptor] {
        &self.pages
    }

    pub fn statuses(&self) -> &[PageStatus] {
        &self.statuses
    }

    pub fn status(&self, index: usize) -> Option<PageStatus> {
        self.statuses.get(index).copied()
    }

    pub fn mark_loaded(&mut self, index: usize) {
        self.set(index, PageStatus::Loaded);
    }

    pub fn mark_failed(&mut self, index: usize) {
        if let Some(page) = self.pages.get(index) {
            tracing::debug!(index, src = %page.image_path, "preview image failed to load");
        }
        self.set(index, PageStatus::Error);
    }

    fn set(&mut self, index: usize, status: PageStatus) {
        match self.statuses.get_mut(index) {
            Some(slot) => *slot = status,
            None => tracing::debug!(index, "ignoring status for unknown page"),
        }
    }

    pub fn is_settled(&self) -> bool {
        self.statuses.iter().all(|s| *s != PageStatus::Loading)
    }

    pub fn tile(&self, index: usize) -> Option<PreviewTile> {
        let page = self.pages.get(index)?;
        if !page.has_artwork() {
            return Some(PreviewTile::Dedication);
        }
        let tile = match self.statuses[index] {
            PageStatus::Loading => PreviewTile::Skeleton,
            PageStatus::Loaded => PreviewTile::Image {
                src: page.image_path.clone(),
            },
            PageStatus::Error => PreviewTile::Placeholder {
                label: page_label(&self.pages, index),
            },
        };
        Some(tile)
    }

    pub fn tiles(&self) -> Vec<PreviewTile> {
        (0..self.pages.len()).filter_map(|i| self.tile(i)).collect()
    }
}

/// Human label for a page, e.g. `Intro 2` or `Letter A`.
pub fn page_label(pages: &[PageDescriptor], index: usize) -> String {
    let Some(page) = pages.get(index) else {
        return String::new();
    };
    let ordinal = pages[..=index]
        .iter()
        .filter(|p| p.kind == page.kind)
        .count();
    match page.kind {
        PageKind::Cover => "Cover".to_string(),
        PageKind::Dedication => "Dedication".to_string(),
        PageKind::Intro => format!("Intro {ordinal}"),
        PageKind::Ending => format!("Ending {ordinal}"),
        PageKind::Letter => match page.letter {
            Some(letter) => format!("Letter {letter}"),
            None => "Letter".to_string(),
        },
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PreviewPage {
    pub index: usize,
    pub label: String,
    #[serde(flatten)]
    pub page: PageDescriptor,
    pub status: PageStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct PreviewResponse {
    pub child_name: String,
    pub letters: usize,
    pub physical_page_count: usize,
    pub pages: Vec<PreviewPage>,
}

impl PreviewResponse {
    pub fn from_board(child_name: &str, letters: usize, board: &PreviewBoard) -> Self {
        let pages = board
            .pages()
            .iter()
            .enumerate()
            .map(|(index, page)| PreviewPage {
                index,
                label: page_label(board.pages(), index),
                page: page.clone(),
                status: board.statuses()[index],
            })
            .collect();
        Self {
            child_name: child_name.to_string(),
            letters,
            physical_page_count: crate::pages::physical_page_count(letters),
            pages,
        }
    }
}

/// Checks every artwork URL with a HEAD request, concurrently, and records the
/// outcome on the board. Relative paths are resolved against `base`.
pub async fn probe_assets(
    client: &reqwest::Client,
    base: &url::Url,
    board: &mut PreviewBoard,
    timeout: Duration,
) {
    let mut set = tokio::task::JoinSet::new();
    for (index, page) in board.pages().iter().enumerate() {
        if !page.has_artwork() {
            continue;
        }
        let url = match base.join(&page.image_path) {
            Ok(url) => url,
            Err(err) => {
                tracing::debug!(index, path = %page.image_path, ?err, "unresolvable preview path");
                set.spawn(async move { (index, false) });
                continue;
            }
        };
        let client = client.clone();
        set.spawn(async move {
            let ok = match tokio::time::timeout(timeout, client.head(url).send()).await {
                Ok(Ok(resp)) => resp.status().is_success(),
                _ => false,
            };
            (index, ok)
        });
    }

    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((index, true)) => board.mark_loaded(index),
            Ok((index, false)) => board.mark_failed(index),
            Err(err) => tracing::warn!(?err, "preview probe task failed"),
        }
    }
}

/// `namebook pages`: prints the composed book as a `PreviewResponse`.
pub async fn run(args: PagesArgs) -> anyhow::Result<()> {
    let config = BookConfig::load(args.config.as_deref())?;
    let spec = BookSpec {
        child_name: args.name.trim().to_string(),
        gender: args.gender,
        skin_tone: args.skin_tone,
    };
    let letters = name_letters(&spec.child_name).len();

    let local = match &args.assets_dir {
        Some(dir) => Some(LocalAssetIndex::scan_dir(&config.local_asset_prefix, dir)?),
        None => None,
    };
    let base_url = args
        .asset_base_url
        .clone()
        .unwrap_or_else(|| config.remote_asset_base_url.clone());
    let remote = RemoteAssetLocator::new(&base_url);
    let locator: &dyn AssetLocator = match &local {
        Some(index) => index,
        None => &remote,
    };

    let artwork = PageListBuilder::new(config.theme_orders, locator).build(&spec);
    let mut board = PreviewBoard::new(compose_book(artwork));
    if let Some(index) = &local {
        let present: Vec<bool> = board
            .pages()
            .iter()
            .map(|p| index.contains_url(&p.image_path))
            .collect();
        for (i, ok) in present.into_iter().enumerate() {
            if !board.pages()[i].has_artwork() {
                continue;
            }
            if ok {
                board.mark_loaded(i);
            } else {
                board.mark_failed(i);
            }
        }
    } else if args.probe {
        let base = url::Url::parse(&base_url)
            .with_context(|| format!("invalid asset base url: {base_url}"))?;
        let client = reqwest::Client::new();
        probe_assets(&client, &base, &mut board, config.asset_timeout()).await;
    }

    let response = PreviewResponse::from_board(&spec.child_name, letters, &board);
    let json = serde_json::to_string_pretty(&response).context("serialize page list")?;
    println!("{json}");
    Ok(())
}

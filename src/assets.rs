use std::collections::HashSet;
use std::path::Path;

use anyhow::Context as _;

use crate::theme::{Gender, SkinTone, Theme};

/// Extensions tried by the bundled-asset table, in order.
pub const LOCAL_EXTENSIONS: [&str; 2] = ["webp", "jpg"];

pub fn character_folder(gender: Gender, skin_tone: SkinTone) -> &'static str {
    match (gender, skin_tone) {
        (Gender::Boy, SkinTone::Light) => "boy-light",
        (Gender::Boy, SkinTone::Dark) => "boy-dark",
        (Gender::Girl, SkinTone::Light) => "girl-light",
        (Gender::Girl, SkinTone::Dark) => "girl-dark",
    }
}

pub fn theme_folder(theme: Theme) -> &'static str {
    theme.as_str()
}

pub fn theme_folder_lenient(raw: &str) -> &'static str {
    theme_folder(Theme::parse_lenient(raw))
}

/// `A` → 1 … `Z` → 26, case-insensitive. `None` for anything else.
pub fn letter_to_index(letter: char) -> Option<u8> {
    let upper = letter.to_ascii_uppercase();
    if upper.is_ascii_uppercase() {
        Some(upper as u8 - b'A' + 1)
    } else {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Artwork {
    Cover,
    Intro(u8),
    Ending(u8),
    Letter { theme: Theme, index: u8 },
}

/// Canonical, extension-less address of one piece of artwork.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssetKey {
    pub character: &'static str,
    pub artwork: Artwork,
}

impl AssetKey {
    pub fn new(gender: Gender, skin_tone: SkinTone, artwork: Artwork) -> Self {
        Self {
            character: character_folder(gender, skin_tone),
            artwork,
        }
    }

    pub fn stem(&self) -> String {
        let character = self.character;
        match self.artwork {
            Artwork::Cover => format!("{character}/cover/cover"),
            Artwork::Intro(n) => format!("{character}/intro/{n}"),
            Artwork::Ending(n) => format!("{character}/ending/{n}"),
            Artwork::Letter { theme, index } => {
                format!("{character}/{}/{index}", theme_folder(theme))
            }
        }
    }
}

pub trait AssetLocator: Send + Sync {
    fn locate(&self, key: &AssetKey) -> String;
}

/// Table of bundled assets keyed by relative path (`boy-light/animal/3.webp`).
#[derive(Debug, Clone, Default)]
pub struct LocalAssetIndex {
    url_prefix: String,
    paths: HashSet<String>,
}

impl LocalAssetIndex {
    pub fn new<I, S>(url_prefix: &str, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            url_prefix: url_prefix.trim_end_matches('/').to_string(),
            paths: paths
                .into_iter()
                .map(|p| p.into().trim_start_matches('/').to_string())
                .collect(),
        }
    }

    pub fn scan_dir(url_prefix: &str, root: &Path) -> anyhow::Result<Self> {
        let mut paths = Vec::new();
        collect_relative_paths(root, root, &mut paths)
            .with_context(|| format!("scan asset dir: {}", root.display()))?;
        tracing::debug!(root = %root.display(), assets = paths.len(), "indexed bundled assets");
        Ok(Self::new(url_prefix, paths))
    }

    pub fn url_prefix(&self) -> &str {
        &self.url_prefix
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn contains(&self, relative_path: &str) -> bool {
        self.paths.contains(relative_path)
    }

    /// Whether a URL produced by `locate` points at a bundled file.
    pub fn contains_url(&self, url: &str) -> bool {
        url.strip_prefix(&self.url_prefix)
            .map(|rest| rest.trim_start_matches('/'))
            .is_some_and(|rest| self.contains(rest))
    }

    fn url_for(&self, relative_path: &str) -> String {
        format!("{}/{relative_path}", self.url_prefix)
    }
}

impl AssetLocator for LocalAssetIndex {
    fn locate(&self, key: &AssetKey) -> String {
        let stem = key.stem();
        for ext in LOCAL_EXTENSIONS {
            let candidate = format!("{stem}.{ext}");
            if self.paths.contains(&candidate) {
                return self.url_for(&candidate);
            }
        }
        tracing::debug!(asset = %stem, "bundled asset missing");
        let last = LOCAL_EXTENSIONS[LOCAL_EXTENSIONS.len() - 1];
        self.url_for(&format!("{stem}.{last}"))
    }
}

#[derive(Debug, Clone)]
pub struct RemoteAssetLocator {
    base_url: String,
}

impl RemoteAssetLocator {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

impl AssetLocator for RemoteAssetLocator {
    fn locate(&self, key: &AssetKey) -> String {
        format!("{}/{}.jpg", self.base_url, key.stem())
    }
}

fn collect_relative_paths(root: &Path, dir: &Path, out: &mut Vec<String>) -> anyhow::Result<()> {
    let mut entries = std::fs::read_dir(dir)
        .with_context(|| format!("read dir: {}", dir.display()))?
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("list dir: {}", dir.display()))?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let path = entry.path();
        let file_type = entry.file_type().context("read file type")?;
        if file_type.is_dir() {
            collect_relative_paths(root, &path, out)?;
            continue;
        }
        if !file_type.is_file() {
            continue;
        }
        let rel = path
            .strip_prefix(root)
            .with_context(|| format!("strip asset root: {}", path.display()))?;
        let rel = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");
        out.push(rel);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn character_folders_are_distinct() {
        let folders: HashSet<&str> = [
            character_folder(Gender::Boy, SkinTone::Light),
            character_folder(Gender::Boy, SkinTone::Dark),
            character_folder(Gender::Girl, SkinTone::Light),
            character_folder(Gender::Girl, SkinTone::Dark),
        ]
        .into_iter()
        .collect();
        assert_eq!(folders.len(), 4);
        assert!(folders.iter().all(|f| !f.is_empty()));
    }

    #[test]
    fn theme_folders_are_distinct_with_default() {
        let folders: HashSet<&str> = Theme::ALL.into_iter().map(theme_folder).collect();
        assert_eq!(folders.len(), 3);
        assert_eq!(theme_folder_lenient("Animal"), "animal");
        assert_eq!(theme_folder_lenient("robots"), "superhero");
    }

    #[test]
    fn letter_index_covers_alphabet() {
        assert_eq!(letter_to_index('A'), Some(1));
        assert_eq!(letter_to_index('z'), Some(26));
        assert_eq!(letter_to_index('m'), Some(13));
        assert_eq!(letter_to_index('-'), None);
        assert_eq!(letter_to_index('é'), None);
    }

    #[test]
    fn stems_share_one_naming_convention() {
        let letter = AssetKey::new(
            Gender::Girl,
            SkinTone::Dark,
            Artwork::Letter {
                theme: Theme::Animal,
                index: 2,
            },
        );
        assert_eq!(letter.stem(), "girl-dark/animal/2");
        let cover = AssetKey::new(Gender::Boy, SkinTone::Light, Artwork::Cover);
        assert_eq!(cover.stem(), "boy-light/cover/cover");
        let ending = AssetKey::new(Gender::Boy, SkinTone::Light, Artwork::Ending(2));
        assert_eq!(ending.stem(), "boy-light/ending/2");
    }

    #[test]
    fn local_index_prefers_webp_then_jpg() {
        let index = LocalAssetIndex::new(
            "/assets/",
            [
                "boy-light/superhero/1.webp",
                "boy-light/superhero/1.jpg",
                "boy-light/animal/1.jpg",
            ],
        );
        let key = |theme| {
            AssetKey::new(
                Gender::Boy,
                SkinTone::Light,
                Artwork::Letter { theme, index: 1 },
            )
        };
        assert_eq!(
            index.locate(&key(Theme::Superhero)),
            "/assets/boy-light/superhero/1.webp"
        );
        assert_eq!(
            index.locate(&key(Theme::Animal)),
            "/assets/boy-light/animal/1.jpg"
        );
        // Misses still produce an address; the preview shows a placeholder.
        assert_eq!(
            index.locate(&key(Theme::Fairytale)),
            "/assets/boy-light/fairytale/1.jpg"
        );
        assert!(index.contains_url("/assets/boy-light/animal/1.jpg"));
        assert!(!index.contains_url("/assets/boy-light/fairytale/1.jpg"));
        assert!(!index.contains_url("/elsewhere/boy-light/animal/1.jpg"));
    }

    #[test]
    fn remote_locator_uses_fixed_jpg_extension() {
        let locator = RemoteAssetLocator::new("https://cdn.example.com/books/");
        let key = AssetKey::new(Gender::Boy, SkinTone::Dark, Artwork::Intro(1));
        assert_eq!(
            locator.locate(&key),
            "https://cdn.example.com/books/boy-dark/intro/1.jpg"
        );
    }

    #[test]
    fn scan_dir_indexes_nested_files() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let nested = dir.path().join("girl-light").join("fairytale");
        std::fs::create_dir_all(&nested)?;
        std::fs::write(nested.join("7.webp"), b"x")?;
        std::fs::write(dir.path().join("readme.txt"), b"x")?;

        let index = LocalAssetIndex::scan_dir("/assets", dir.path())?;
        assert_eq!(index.len(), 2);
        assert!(index.contains("girl-light/fairytale/7.webp"));
        Ok(())
    }
}

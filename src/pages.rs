use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::assets::{Artwork, AssetKey, AssetLocator, letter_to_index};
use crate::theme::{Gender, SkinTone, Theme, ThemeOrders};

pub const INTRO_PAGES: u8 = 2;
pub const ENDING_PAGES: u8 = 2;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BookSpec {
    pub child_name: String,
    pub gender: Gender,
    pub skin_tone: SkinTone,
}

/// What gets persisted with an order: the book spec plus the free text shown
/// on the dedication page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BookData {
    #[serde(flatten)]
    pub spec: BookSpec,
    #[serde(default)]
    pub dedication_message: String,
    #[serde(default)]
    pub personal_message: String,
    #[serde(default)]
    pub from_signature: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PageKind {
    Cover,
    Intro,
    Letter,
    Ending,
    Dedication,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PageDescriptor {
    pub kind: PageKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub letter: Option<char>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub theme: Option<Theme>,
    /// Empty for the dedication page, which carries text instead of artwork.
    pub image_path: String,
}

impl PageDescriptor {
    pub fn dedication() -> Self {
        Self {
            kind: PageKind::Dedication,
            letter: None,
            theme: None,
            image_path: String::new(),
        }
    }

    pub fn has_artwork(&self) -> bool {
        self.kind != PageKind::Dedication
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LetterOccurrence {
    pub letter: char,
    pub occurrence: usize,
    pub theme: Theme,
}

/// Uppercased ASCII letters of the name, in order, duplicates kept.
pub fn name_letters(child_name: &str) -> Vec<char> {
    child_name
        .chars()
        .filter(char::is_ascii_alphabetic)
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

pub fn letter_occurrences(
    letters: &[char],
    gender: Gender,
    orders: &ThemeOrders,
) -> Vec<LetterOccurrence> {
    let mut seen: HashMap<char, usize> = HashMap::new();
    letters
        .iter()
        .map(|&letter| {
            let count = seen.entry(letter).or_insert(0);
            let occurrence = *count;
            *count += 1;
            LetterOccurrence {
                letter,
                occurrence,
                theme: orders.theme_for(occurrence, gender),
            }
        })
        .collect()
}

pub fn artwork_page_count(letters: usize) -> usize {
    1 + usize::from(INTRO_PAGES) + letters + usize::from(ENDING_PAGES)
}

pub fn spread_count(letters: usize) -> usize {
    artwork_page_count(letters) + 1
}

/// Page count quoted to customers: one spread prints as two pages.
pub fn physical_page_count(letters: usize) -> usize {
    spread_count(letters) * 2
}

pub struct PageListBuilder<'a> {
    orders: ThemeOrders,
    locator: &'a dyn AssetLocator,
}

impl<'a> PageListBuilder<'a> {
    pub fn new(orders: ThemeOrders, locator: &'a dyn AssetLocator) -> Self {
        Self { orders, locator }
    }

    pub fn build(&self, spec: &BookSpec) -> Vec<PageDescriptor> {
        let letters = name_letters(&spec.child_name);
        if letters.is_empty() {
            tracing::warn!(
                child_name = %spec.child_name,
                "name has no letters; book will only contain compulsory pages"
            );
        }

        let mut pages = Vec::with_capacity(artwork_page_count(letters.len()));
        pages.push(self.artwork_page(spec, PageKind::Cover, Artwork::Cover));
        for n in 1..=INTRO_PAGES {
            pages.push(self.artwork_page(spec, PageKind::Intro, Artwork::Intro(n)));
        }

        for occ in letter_occurrences(&letters, spec.gender, &self.orders) {
            // name_letters only yields A-Z.
            let Some(index) = letter_to_index(occ.letter) else {
                continue;
            };
            let key = AssetKey::new(
                spec.gender,
                spec.skin_tone,
                Artwork::Letter {
                    theme: occ.theme,
                    index,
                },
            );
            pages.push(PageDescriptor {
                kind: PageKind::Letter,
                letter: Some(occ.letter),
                theme: Some(occ.theme),
                image_path: self.locator.locate(&key),
            });
        }

        for n in 1..=ENDING_PAGES {
            pages.push(self.artwork_page(spec, PageKind::Ending, Artwork::Ending(n)));
        }

        pages
    }

    fn artwork_page(&self, spec: &BookSpec, kind: PageKind, artwork: Artwork) -> PageDescriptor {
        let key = AssetKey::new(spec.gender, spec.skin_tone, artwork);
        PageDescriptor {
            kind,
            letter: None,
            theme: None,
            image_path: self.locator.locate(&key),
        }
    }
}

/// Full reading order shared by the preview and the printed book: the
/// dedication page follows the cover.
pub fn compose_book(artwork_pages: Vec<PageDescriptor>) -> Vec<PageDescriptor> {
    let mut pages = Vec::with_capacity(artwork_pages.len() + 1);
    let mut artwork = artwork_pages.into_iter();
    if let Some(first) = artwork.next() {
        pages.push(first);
    }
    pages.push(PageDescriptor::dedication());
    pages.extend(artwork);
    pages
}

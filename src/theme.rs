use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Boy,
    Girl,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SkinTone {
    Light,
    Dark,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Theme {
    Superhero,
    Fairytale,
    Animal,
}

impl Theme {
    pub const ALL: [Theme; 3] = [Theme::Superhero, Theme::Fairytale, Theme::Animal];

    pub fn as_str(self) -> &'static str {
        match self {
            Theme::Superhero => "superhero",
            Theme::Fairytale => "fairytale",
            Theme::Animal => "animal",
        }
    }

    /// Parses a theme name, falling back to [`Theme::Superhero`] for anything
    /// unrecognized so that page assembly stays total over malformed data.
    pub fn parse_lenient(raw: &str) -> Theme {
        match raw.parse() {
            Ok(theme) => theme,
            Err(_) => {
                tracing::warn!(theme = raw, "unrecognized theme; using superhero");
                Theme::Superhero
            }
        }
    }
}

impl FromStr for Theme {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "superhero" => Ok(Theme::Superhero),
            "fairytale" => Ok(Theme::Fairytale),
            "animal" => Ok(Theme::Animal),
            other => anyhow::bail!("unsupported theme: {other}"),
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Gender {
    pub fn as_str(self) -> &'static str {
        match self {
            Gender::Boy => "boy",
            Gender::Girl => "girl",
        }
    }
}

impl FromStr for Gender {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "boy" => Ok(Gender::Boy),
            "girl" => Ok(Gender::Girl),
            other => anyhow::bail!("unsupported gender: {other}"),
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl SkinTone {
    pub fn as_str(self) -> &'static str {
        match self {
            SkinTone::Light => "light",
            SkinTone::Dark => "dark",
        }
    }
}

impl FromStr for SkinTone {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "light" => Ok(SkinTone::Light),
            "dark" => Ok(SkinTone::Dark),
            other => anyhow::bail!("unsupported skin tone: {other}"),
        }
    }
}

impl fmt::Display for SkinTone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-gender theme cycle, shared by the preview and the printed book.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ThemeOrders {
    pub boy: [Theme; 3],
    pub girl: [Theme; 3],
}

impl Default for ThemeOrders {
    fn default() -> Self {
        Self {
            boy: [Theme::Superhero, Theme::Animal, Theme::Fairytale],
            girl: [Theme::Fairytale, Theme::Superhero, Theme::Animal],
        }
    }
}

impl ThemeOrders {
    pub fn for_gender(&self, gender: Gender) -> &[Theme; 3] {
        match gender {
            Gender::Boy => &self.boy,
            Gender::Girl => &self.girl,
        }
    }

    pub fn theme_for(&self, occurrence_index: usize, gender: Gender) -> Theme {
        self.for_gender(gender)[occurrence_index % 3]
    }
}

pub fn assign_theme(occurrence_index: usize, gender: Gender) -> Theme {
    ThemeOrders::default().theme_for(occurrence_index, gender)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boy_cycle_repeats_with_period_three() {
        let themes: Vec<Theme> = (0..6).map(|i| assign_theme(i, Gender::Boy)).collect();
        assert_eq!(
            themes,
            vec![
                Theme::Superhero,
                Theme::Animal,
                Theme::Fairytale,
                Theme::Superhero,
                Theme::Animal,
                Theme::Fairytale,
            ]
        );
    }

    #[test]
    fn girl_cycle_repeats_with_period_three() {
        let themes: Vec<Theme> = (0..6).map(|i| assign_theme(i, Gender::Girl)).collect();
        assert_eq!(
            themes,
            vec![
                Theme::Fairytale,
                Theme::Superhero,
                Theme::Animal,
                Theme::Fairytale,
                Theme::Superhero,
                Theme::Animal,
            ]
        );
    }

    #[test]
    fn each_cycle_visits_every_theme() {
        let orders = ThemeOrders::default();
        for gender in [Gender::Boy, Gender::Girl] {
            let mut seen: Vec<Theme> = (0..3).map(|i| orders.theme_for(i, gender)).collect();
            seen.sort_by_key(|t| t.as_str());
            let mut all = Theme::ALL.to_vec();
            all.sort_by_key(|t| t.as_str());
            assert_eq!(seen, all);
        }
    }

    #[test]
    fn custom_orders_are_honored() {
        let orders = ThemeOrders {
            boy: [Theme::Animal, Theme::Animal, Theme::Fairytale],
            girl: [Theme::Superhero, Theme::Fairytale, Theme::Animal],
        };
        assert_eq!(orders.theme_for(4, Gender::Boy), Theme::Animal);
        assert_eq!(orders.theme_for(5, Gender::Girl), Theme::Animal);
    }

    #[test]
    fn lenient_theme_parse_defaults_to_superhero() {
        assert_eq!(Theme::parse_lenient("Animal"), Theme::Animal);
        assert_eq!(Theme::parse_lenient(" fairytale "), Theme::Fairytale);
        assert_eq!(Theme::parse_lenient("space"), Theme::Superhero);
        assert_eq!(Theme::parse_lenient(""), Theme::Superhero);
    }

    #[test]
    fn strict_enum_parsing_rejects_unknown_values() {
        assert_eq!("Girl".parse::<Gender>().unwrap(), Gender::Girl);
        assert_eq!(" dark".parse::<SkinTone>().unwrap(), SkinTone::Dark);
        let err = "other".parse::<Gender>().unwrap_err().to_string();
        assert!(err.contains("unsupported gender"));
        assert!("medium".parse::<SkinTone>().is_err());
    }
}

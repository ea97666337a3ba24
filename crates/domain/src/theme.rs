//! Theme value objects: mood, genre, region and the combined `Theme` tuple.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Emotional register of the current scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Mood {
    Calm,
    Tense,
    Ominous,
    Triumphant,
    #[default]
    Mysterious,
}

impl fmt::Display for Mood {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Mood::Calm => "calm",
            Mood::Tense => "tense",
            Mood::Ominous => "ominous",
            Mood::Triumphant => "triumphant",
            Mood::Mysterious => "mysterious",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for Mood {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "calm" => Ok(Mood::Calm),
            "tense" => Ok(Mood::Tense),
            "ominous" => Ok(Mood::Ominous),
            "triumphant" => Ok(Mood::Triumphant),
            "mysterious" => Ok(Mood::Mysterious),
            other => Err(format!("unknown mood: {other}")),
        }
    }
}

/// Broad narrative genre.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Genre {
    #[default]
    HighFantasy,
    LowFantasy,
    SciFi,
    Steampunk,
    Horror,
    Modern,
    Historical,
}

impl fmt::Display for Genre {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Genre::HighFantasy => "high-fantasy",
            Genre::LowFantasy => "low-fantasy",
            Genre::SciFi => "sci-fi",
            Genre::Steampunk => "steampunk",
            Genre::Horror => "horror",
            Genre::Modern => "modern",
            Genre::Historical => "historical",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for Genre {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "high-fantasy" => Ok(Genre::HighFantasy),
            "low-fantasy" => Ok(Genre::LowFantasy),
            "sci-fi" => Ok(Genre::SciFi),
            "steampunk" => Ok(Genre::Steampunk),
            "horror" => Ok(Genre::Horror),
            "modern" => Ok(Genre::Modern),
            "historical" => Ok(Genre::Historical),
            other => Err(format!("unknown genre: {other}")),
        }
    }
}

/// Kind of place the current scene is set in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Region {
    #[default]
    Forest,
    Village,
    City,
    Castle,
    Ruins,
    Mountain,
    Desert,
    Ocean,
    Underground,
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Region::Forest => "forest",
            Region::Village => "village",
            Region::City => "city",
            Region::Castle => "castle",
            Region::Ruins => "ruins",
            Region::Mountain => "mountain",
            Region::Desert => "desert",
            Region::Ocean => "ocean",
            Region::Underground => "underground",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for Region {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "forest" => Ok(Region::Forest),
            "village" => Ok(Region::Village),
            "city" => Ok(Region::City),
            "castle" => Ok(Region::Castle),
            "ruins" => Ok(Region::Ruins),
            "mountain" => Ok(Region::Mountain),
            "desert" => Ok(Region::Desert),
            "ocean" => Ok(Region::Ocean),
            "underground" => Ok(Region::Underground),
            other => Err(format!("unknown region: {other}")),
        }
    }
}

/// The adventure's current visual/narrative theme.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Theme {
    pub mood: Mood,
    pub genre: Genre,
    pub region: Region,
    pub background_url: Option<String>,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            mood: Mood::default(),
            genre: Genre::default(),
            region: Region::default(),
            background_url: None,
        }
    }
}

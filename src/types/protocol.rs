//! Protocol classification as supplied by the DPI layer
//!
//! Breeds and categories arrive as codes. Human-readable names are resolved
//! through a [`Taxonomy`] when an alert is built, never earlier.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Behavioral classification of an application protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Breed {
    Safe = 0,
    Acceptable = 1,
    Fun = 2,
    Unsafe = 3,
    PotentiallyDangerous = 4,
    Tracker = 5,
    Dangerous = 6,
    Unrated = 7,
}

impl Breed {
    /// Stable integer code used in alert payloads
    pub fn code(&self) -> i32 {
        *self as i32
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Breed::Safe),
            1 => Some(Breed::Acceptable),
            2 => Some(Breed::Fun),
            3 => Some(Breed::Unsafe),
            4 => Some(Breed::PotentiallyDangerous),
            5 => Some(Breed::Tracker),
            6 => Some(Breed::Dangerous),
            7 => Some(Breed::Unrated),
            _ => None,
        }
    }

    /// Breeds that should not be reachable from outside the network
    pub fn is_insecure(&self) -> bool {
        matches!(
            self,
            Breed::Unsafe | Breed::PotentiallyDangerous | Breed::Dangerous
        )
    }
}

/// Opaque protocol category code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProtocolCategory(pub u16);

impl ProtocolCategory {
    pub const UNSPECIFIED: ProtocolCategory = ProtocolCategory(0);

    pub fn code(&self) -> i32 {
        i32::from(self.0)
    }
}

/// Result of application protocol classification for a flow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolInfo {
    /// Application protocol id
    pub app_protocol: u16,
    pub breed: Breed,
    pub category: ProtocolCategory,
}

impl ProtocolInfo {
    pub fn new(app_protocol: u16, breed: Breed, category: ProtocolCategory) -> Self {
        Self { app_protocol, breed, category }
    }
}

/// Name lookup for breeds and categories
///
/// Implemented by the classification layer. Returning `None` means the
/// code is unknown to the classifier.
pub trait Taxonomy: Send + Sync {
    fn breed_name(&self, breed: Breed) -> Option<String>;
    fn category_name(&self, category: ProtocolCategory) -> Option<String>;
}

/// Built-in taxonomy with the default category table
#[derive(Debug, Clone)]
pub struct StaticTaxonomy {
    categories: HashMap<u16, String>,
}

const DEFAULT_CATEGORIES: &[(u16, &str)] = &[
    (0, "Unspecified"),
    (1, "Media"),
    (2, "VPN"),
    (3, "Email"),
    (4, "DataTransfer"),
    (5, "Web"),
    (6, "SocialNetwork"),
    (7, "Download"),
    (8, "Game"),
    (9, "Chat"),
    (10, "VoIP"),
    (11, "Database"),
    (12, "RemoteAccess"),
    (13, "Cloud"),
    (14, "Network"),
    (15, "Collaborative"),
    (16, "RPC"),
    (17, "Streaming"),
    (18, "System"),
    (19, "SoftwareUpdate"),
];

impl StaticTaxonomy {
    pub fn new() -> Self {
        Self {
            categories: DEFAULT_CATEGORIES
                .iter()
                .map(|(id, name)| (*id, name.to_string()))
                .collect(),
        }
    }

    /// Default table with configured names layered on top
    pub fn with_overrides(overrides: &HashMap<u16, String>) -> Self {
        let mut taxonomy = Self::new();
        for (id, name) in overrides {
            taxonomy.categories.insert(*id, name.clone());
        }
        taxonomy
    }
}

impl Default for StaticTaxonomy {
    fn default() -> Self {
        Self::new()
    }
}

impl Taxonomy for StaticTaxonomy {
    fn breed_name(&self, breed: Breed) -> Option<String> {
        let name = match breed {
            Breed::Safe => "Safe",
            Breed::Acceptable => "Acceptable",
            Breed::Fun => "Fun",
            Breed::Unsafe => "Unsafe",
            Breed::PotentiallyDangerous => "Potentially Dangerous",
            Breed::Tracker => "Tracker/Ads",
            Breed::Dangerous => "Dangerous",
            Breed::Unrated => "Unrated",
        };
        Some(name.to_string())
    }

    fn category_name(&self, category: ProtocolCategory) -> Option<String> {
        self.categories.get(&category.0).cloned()
    }
}

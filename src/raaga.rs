//! Raaga catalog
//!
//! A raaga here is a pitch preset: the engine only reads `base_frequency`,
//! the rest is display metadata for the player UI.

use thiserror::Error;

/// Errors in raaga data
#[derive(Error, Debug, PartialEq)]
pub enum RaagaError {
    #[error("Base frequency must be a positive number of Hz, got {0}")]
    InvalidFrequency(f32),

    #[error("Invalid color '{0}', expected #RRGGBB")]
    InvalidColor(String),
}

/// An RGB accent color
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse a `#RRGGBB` string
    pub fn from_hex(hex: &str) -> Result<Self, RaagaError> {
        let invalid = || RaagaError::InvalidColor(hex.to_string());
        let digits = hex.strip_prefix('#').ok_or_else(invalid)?;
        if digits.len() != 6 || !digits.is_ascii() {
            return Err(invalid());
        }
        let channel = |i: usize| u8::from_str_radix(&digits[i..i + 2], 16).map_err(|_| invalid());
        Ok(Self::new(channel(0)?, channel(2)?, channel(4)?))
    }
}

/// A selectable raaga
#[derive(Clone, Debug, PartialEq)]
pub struct RaagaDescriptor {
    /// Unique key
    pub id: String,
    /// Display name
    pub name: String,
    /// Traditional time of performance
    pub time_of_day: String,
    pub healing_properties: String,
    pub description: String,
    /// Pitch of the main voice in Hz
    pub base_frequency: f32,
    /// Accent color for the UI
    pub color: Rgb,
}

impl RaagaDescriptor {
    /// Create a descriptor with empty display text
    ///
    /// Fails unless `base_frequency` is finite and positive.
    pub fn new(id: impl Into<String>, name: impl Into<String>, base_frequency: f32) -> Result<Self, RaagaError> {
        if !base_frequency.is_finite() || base_frequency <= 0.0 {
            return Err(RaagaError::InvalidFrequency(base_frequency));
        }
        Ok(Self {
            id: id.into(),
            name: name.into(),
            time_of_day: String::new(),
            healing_properties: String::new(),
            description: String::new(),
            base_frequency,
            color: Rgb::new(255, 255, 255),
        })
    }

    /// Set the time of day
    pub fn time_of_day(mut self, text: impl Into<String>) -> Self {
        self.time_of_day = text.into();
        self
    }

    /// Set the healing properties blurb
    pub fn healing_properties(mut self, text: impl Into<String>) -> Self {
        self.healing_properties = text.into();
        self
    }

    /// Set the long description
    pub fn description(mut self, text: impl Into<String>) -> Self {
        self.description = text.into();
        self
    }

    /// Set the accent color
    pub fn color(mut self, color: Rgb) -> Self {
        self.color = color;
        self
    }
}

struct CatalogEntry {
    id: &'static str,
    name: &'static str,
    time_of_day: &'static str,
    healing_properties: &'static str,
    description: &'static str,
    frequency: f32,
    color: &'static str,
}

const CATALOG: &[CatalogEntry] = &[
    CatalogEntry {
        id: "bhairavi",
        name: "Raag Bhairavi",
        time_of_day: "Early Morning",
        healing_properties: "Alleviates anxiety and emotional turbulence. Known as the queen of raagas, it invokes deep compassion and devotion.",
        description: "Bhairavi is traditionally performed at dawn, creating a meditative atmosphere that calms the restless mind and opens the heart to inner peace.",
        frequency: 261.63, // C4
        color: "#E8902E",
    },
    CatalogEntry {
        id: "yaman",
        name: "Raag Yaman",
        time_of_day: "Early Evening",
        healing_properties: "Elevates mood and inspires creativity. Traditionally used to ease feelings of melancholy and bring a sense of romantic devotion.",
        description: "Yaman is the first raag taught to students and is associated with the serene beauty of dusk. Its ascending notes create a feeling of aspiration and upliftment.",
        frequency: 392.0, // G4
        color: "#C9A94E",
    },
    CatalogEntry {
        id: "darbari",
        name: "Raag Darbari Kanada",
        time_of_day: "Late Night",
        healing_properties: "Provides deep relaxation and relieves insomnia. Its grave, majestic movements pacify an overactive mind and promote restful sleep.",
        description: "Originally performed in the court (darbar) of Emperor Akbar by Tansen. Its slow, weighty phrases create a sense of regal calm and profound stillness.",
        frequency: 293.66, // D4
        color: "#2C2450",
    },
    CatalogEntry {
        id: "todi",
        name: "Raag Todi",
        time_of_day: "Late Morning",
        healing_properties: "Sharpens focus and mental clarity. Ancient texts describe it as a cure for scattered thoughts and cognitive fatigue.",
        description: "Todi is a powerful morning raag with a contemplative character. Its unique combination of flats creates an intensely focused, introspective mood.",
        frequency: 329.63, // E4
        color: "#6B1D2A",
    },
    CatalogEntry {
        id: "malkauns",
        name: "Raag Malkauns",
        time_of_day: "Midnight",
        healing_properties: "Grounds the spirit and combats fear. One of the most ancient raagas, it is believed to invoke courage and dispel darkness from the mind.",
        description: "Malkauns uses only five notes in a pentatonic scale, creating a hypnotic, powerful atmosphere. It is traditionally associated with meditation and inner strength.",
        frequency: 349.23, // F4
        color: "#4A3728",
    },
    CatalogEntry {
        id: "desh",
        name: "Raag Desh",
        time_of_day: "Late Evening",
        healing_properties: "Evokes joy, nostalgia, and a feeling of homecoming. Used to relieve homesickness and connect with one's roots and sense of belonging.",
        description: "Desh is the raag of the monsoon, evoking the beauty of rain-soaked landscapes. Its light, sweet character brings warmth and an unmistakable sense of joy.",
        frequency: 440.0, // A4
        color: "#2D7D46",
    },
];

impl CatalogEntry {
    fn descriptor(&self) -> Result<RaagaDescriptor, RaagaError> {
        Ok(RaagaDescriptor::new(self.id, self.name, self.frequency)?
            .time_of_day(self.time_of_day)
            .healing_properties(self.healing_properties)
            .description(self.description)
            .color(Rgb::from_hex(self.color)?))
    }
}

/// All built-in raagas, in display order
///
/// Entries that fail validation are logged and skipped.
pub fn catalog() -> Vec<RaagaDescriptor> {
    CATALOG
        .iter()
        .filter_map(|entry| match entry.descriptor() {
            Ok(raaga) => Some(raaga),
            Err(e) => {
                log::warn!("Skipping raaga '{}': {}", entry.id, e);
                None
            }
        })
        .collect()
}

/// Look up a built-in raaga by id
pub fn find(id: &str) -> Option<RaagaDescriptor> {
    catalog().into_iter().find(|r| r.id == id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_is_complete() {
        let raagas = catalog();
        let ids: Vec<&str> = raagas.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["bhairavi", "yaman", "darbari", "todi", "malkauns", "desh"]);
        assert!(raagas.iter().all(|r| r.base_frequency > 0.0));
    }

    #[test]
    fn test_find() {
        let desh = find("desh").unwrap();
        assert_eq!(desh.base_frequency, 440.0);
        assert_eq!(desh.color, Rgb::new(0x2D, 0x7D, 0x46));
        assert!(find("kafi").is_none());
    }

    #[test]
    fn test_rejects_bad_frequency() {
        assert_eq!(
            RaagaDescriptor::new("x", "X", 0.0).unwrap_err(),
            RaagaError::InvalidFrequency(0.0)
        );
        assert!(RaagaDescriptor::new("x", "X", -5.0).is_err());
        assert!(RaagaDescriptor::new("x", "X", f32::INFINITY).is_err());
    }

    #[test]
    fn test_hex_colors() {
        assert_eq!(Rgb::from_hex("#E8902E").unwrap(), Rgb::new(0xE8, 0x90, 0x2E));
        assert!(Rgb::from_hex("E8902E").is_err());
        assert!(Rgb::from_hex("#E8902").is_err());
        assert!(Rgb::from_hex("#GG0000").is_err());
    }
}

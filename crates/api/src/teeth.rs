//! FDI two-digit tooth numbering.
//!
//! The first digit is the quadrant (1–4 permanent, 5–8 primary), the second
//! the position counted from the midline. Every patient chart carries all 52
//! slots so that mixed dentition can be charted without reshaping the chart.

use serde::{Deserialize, Serialize};

/// Slots per patient chart: 32 permanent + 20 primary teeth.
pub const TEETH_PER_CHART: usize = 52;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Dentition {
    Permanent,
    Primary,
}

impl Dentition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Permanent => "permanent",
            Self::Primary => "primary",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "permanent" => Some(Self::Permanent),
            "primary" => Some(Self::Primary),
            _ => None,
        }
    }
}

impl std::fmt::Display for Dentition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

const PERMANENT_POSITIONS: [&str; 8] = [
    "central incisor",
    "lateral incisor",
    "canine",
    "first premolar",
    "second premolar",
    "first molar",
    "second molar",
    "third molar",
];

const PRIMARY_POSITIONS: [&str; 5] = [
    "central incisor",
    "lateral incisor",
    "canine",
    "first molar",
    "second molar",
];

fn quadrant_name(quadrant: u8) -> Option<&'static str> {
    match quadrant {
        1 | 5 => Some("upper right"),
        2 | 6 => Some("upper left"),
        3 | 7 => Some("lower left"),
        4 | 8 => Some("lower right"),
        _ => None,
    }
}

pub fn dentition(number: u8) -> Option<Dentition> {
    let (quadrant, position) = (number / 10, number % 10);
    match quadrant {
        1..=4 if (1..=8).contains(&position) => Some(Dentition::Permanent),
        5..=8 if (1..=5).contains(&position) => Some(Dentition::Primary),
        _ => None,
    }
}

pub fn is_valid_tooth_number(number: u8) -> bool {
    dentition(number).is_some()
}

/// Human readable name, e.g. `11` → "upper right central incisor".
pub fn tooth_name(number: u8) -> Option<String> {
    let dentition = dentition(number)?;
    let quadrant = quadrant_name(number / 10)?;
    let position = usize::from(number % 10 - 1);
    let position = match dentition {
        Dentition::Permanent => PERMANENT_POSITIONS[position],
        Dentition::Primary => PRIMARY_POSITIONS[position],
    };
    let prefix = match dentition {
        Dentition::Permanent => "",
        Dentition::Primary => "primary ",
    };
    Some(format!("{prefix}{quadrant} {position}"))
}

/// Every valid tooth number in chart order.
pub fn all_teeth() -> Vec<u8> {
    (1..=8u8)
        .flat_map(|quadrant| {
            let positions = if quadrant <= 4 { 8 } else { 5 };
            (1..=positions).map(move |position| quadrant * 10 + position)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chart_has_52_unique_slots() {
        let teeth = all_teeth();
        assert_eq!(teeth.len(), TEETH_PER_CHART);
        let permanent = teeth
            .iter()
            .filter(|n| dentition(**n) == Some(Dentition::Permanent))
            .count();
        assert_eq!(permanent, 32);
        let mut dedup = teeth.clone();
        dedup.dedup();
        assert_eq!(dedup.len(), teeth.len());
    }

    #[test]
    fn rejects_out_of_range_numbers() {
        for n in [0, 10, 19, 56, 59, 90, 99, 255] {
            assert!(!is_valid_tooth_number(n), "{n} should be invalid");
        }
        for n in [11, 18, 48, 51, 55, 85] {
            assert!(is_valid_tooth_number(n), "{n} should be valid");
        }
    }

    #[test]
    fn names_follow_quadrant_and_position() {
        assert_eq!(tooth_name(11).unwrap(), "upper right central incisor");
        assert_eq!(tooth_name(38).unwrap(), "lower left third molar");
        assert_eq!(tooth_name(65).unwrap(), "primary upper left second molar");
        assert_eq!(tooth_name(83).unwrap(), "primary lower right canine");
        assert!(tooth_name(58).is_none());
    }
}

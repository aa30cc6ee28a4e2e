//! Boat name classifier
//!
//! Club boats follow a loose naming convention, for example
//! `2X/- RACER - Swift double/pair 70 KG (Ian Krix)`:
//!
//! - leading hull token: `1X` single, `2X` double, `4X`/`4X+`/`8X`/`8X+` quad or larger
//! - optional `/-` (coxless) or `/+` (coxed) after the hull token: also rigs for sweep
//! - `RACE`/`RACER`/`RACING` anywhere: race boat; whole-word `HYBRID`: race/training hybrid
//! - `<digits> KG`: crew weight class
//! - trailing `(...)`: nickname
//!
//! Each rule is matched independently against the raw name. Classification
//! never fails; names that break the convention come back as
//! [`BoatType::Unknown`] / [`Classification::Training`].

use crate::models::{AssetAttributes, BoatType, Classification, SweepRig};
use once_cell::sync::Lazy;
use regex::Regex;

static TYPE_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(1x|2x|[48]x\+?)(?:/([-+]))?(?:\s+|$)").expect("hull token pattern")
});

static RACE_KEYWORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\brac(?:e|er|ers|ing)\b").expect("race keyword pattern"));

static HYBRID_KEYWORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bhybrid\b").expect("hybrid keyword pattern"));

static WEIGHT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(\d+)\s*kgs?\b").expect("weight pattern"));

static NICKNAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\(([^()]*)\)\s*$").expect("nickname pattern"));

static SEPARATOR_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:\s*-\s*){2,}").expect("separator pattern"));

/// Parse structured attributes out of a raw boat name
pub fn classify(raw_name: &str) -> AssetAttributes {
    let (boat_type, rig) = parse_type(raw_name);

    AssetAttributes {
        boat_type,
        classification: parse_classification(raw_name),
        weight_kg: parse_weight(raw_name),
        sweep_capable: rig.is_some(),
        rig,
        display_name: display_name(raw_name),
        nickname: parse_nickname(raw_name),
    }
}

fn parse_type(raw_name: &str) -> (BoatType, Option<SweepRig>) {
    let Some(caps) = TYPE_TOKEN.captures(raw_name) else {
        return (BoatType::Unknown, None);
    };

    let token = caps[1].to_ascii_lowercase();
    let boat_type = match token.as_str() {
        "1x" => BoatType::Single,
        "2x" => BoatType::Double,
        _ => BoatType::Quad,
    };

    let rig = caps.get(2).map(|m| match m.as_str() {
        "+" => SweepRig::Coxed,
        _ => SweepRig::Coxless,
    });

    (boat_type, rig)
}

fn parse_classification(raw_name: &str) -> Classification {
    if RACE_KEYWORD.is_match(raw_name) {
        Classification::Race
    } else if HYBRID_KEYWORD.is_match(raw_name) {
        Classification::Hybrid
    } else {
        Classification::Training
    }
}

fn parse_weight(raw_name: &str) -> Option<u32> {
    WEIGHT
        .captures(raw_name)
        .and_then(|caps| caps[1].parse::<u32>().ok())
}

fn parse_nickname(raw_name: &str) -> Option<String> {
    NICKNAME
        .captures(raw_name)
        .map(|caps| caps[1].trim().to_string())
        .filter(|nick| !nick.is_empty())
}

fn display_name(raw_name: &str) -> String {
    let stripped = TYPE_TOKEN.replace(raw_name, "");
    let stripped = NICKNAME.replace(&stripped, "");
    let stripped = WEIGHT.replace(&stripped, "");
    let stripped = RACE_KEYWORD.replace_all(&stripped, "");
    let stripped = HYBRID_KEYWORD.replace_all(&stripped, "");
    let stripped = SEPARATOR_RUN.replace_all(&stripped, " - ");

    let collapsed = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    let cleaned = collapsed
        .trim_matches(|c: char| c.is_whitespace() || matches!(c, '-' | '–' | ',' | ':'))
        .to_string();

    if cleaned.is_empty() {
        raw_name.trim().to_string()
    } else {
        cleaned
    }
}

// ☯️ Bazi Calculator - Birth chart pillars + five-element profile
// Simplified stem-branch arithmetic: no solar-term boundaries, no five-tiger
// month stems. Deterministic and pure; callers own logging and fallbacks.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BaziError {
    /// Input could not be read as a real calendar date
    #[error("invalid birth date: {0:?}")]
    InvalidDate(String),
}

// ============================================================================
// FIVE ELEMENTS
// ============================================================================

/// The five elements, declared in canonical order (金木水火土).
/// `Ord` follows declaration order, so sorted collections are canonical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Element {
    #[serde(rename = "金")]
    Metal,
    #[serde(rename = "木")]
    Wood,
    #[serde(rename = "水")]
    Water,
    #[serde(rename = "火")]
    Fire,
    #[serde(rename = "土")]
    Earth,
}

impl Element {
    pub const ALL: [Element; 5] = [
        Element::Metal,
        Element::Wood,
        Element::Water,
        Element::Fire,
        Element::Earth,
    ];

    pub fn symbol(&self) -> &'static str {
        match self {
            Element::Metal => "金",
            Element::Wood => "木",
            Element::Water => "水",
            Element::Fire => "火",
            Element::Earth => "土",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Element::Metal => "metal",
            Element::Wood => "wood",
            Element::Water => "water",
            Element::Fire => "fire",
            Element::Earth => "earth",
        }
    }

    /// Accepts either the Chinese symbol or the English name
    pub fn from_label(label: &str) -> Option<Element> {
        let label = label.trim();
        Element::ALL
            .into_iter()
            .find(|e| e.symbol() == label || e.name().eq_ignore_ascii_case(label))
    }

    /// Advice emitted when the chart has none of this element
    fn lacking_advice(&self) -> &'static str {
        match self {
            Element::Metal => "命局缺金，宜选用五行属金或带金字旁的字，以增添果敢坚毅之气。",
            Element::Wood => "命局缺木，宜选用五行属木或带木字旁、草字头的字，以助生发向上之势。",
            Element::Water => "命局缺水，宜选用五行属水或带三点水的字，以添灵动聪慧之性。",
            Element::Fire => "命局缺火，宜选用五行属火或带日字旁、火字旁的字，以增热情光明之象。",
            Element::Earth => "命局缺土，宜选用五行属土或带土字旁、山字旁的字，以固沉稳厚重之基。",
        }
    }

    /// Character sketch for the strongest element
    fn virtue(&self) -> &'static str {
        match self {
            Element::Metal => "金主义，性情刚毅果断，重情守信。",
            Element::Wood => "木主仁，性情温和宽厚，富有上进之心。",
            Element::Water => "水主智，思维敏捷灵活，聪慧通达。",
            Element::Fire => "火主礼，性格热情开朗，积极进取。",
            Element::Earth => "土主信，为人稳重踏实，诚恳可靠。",
        }
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

// ============================================================================
// STEMS & BRANCHES
// ============================================================================

const STEM_SYMBOLS: [&str; 10] = ["甲", "乙", "丙", "丁", "戊", "己", "庚", "辛", "壬", "癸"];

const STEM_ELEMENTS: [Element; 10] = [
    Element::Wood,
    Element::Wood,
    Element::Fire,
    Element::Fire,
    Element::Earth,
    Element::Earth,
    Element::Metal,
    Element::Metal,
    Element::Water,
    Element::Water,
];

const BRANCH_SYMBOLS: [&str; 12] = [
    "子", "丑", "寅", "卯", "辰", "巳", "午", "未", "申", "酉", "戌", "亥",
];

const BRANCH_ELEMENTS: [Element; 12] = [
    Element::Water, // 子
    Element::Earth, // 丑
    Element::Wood,  // 寅
    Element::Wood,  // 卯
    Element::Earth, // 辰
    Element::Fire,  // 巳
    Element::Fire,  // 午
    Element::Earth, // 未
    Element::Metal, // 申
    Element::Metal, // 酉
    Element::Earth, // 戌
    Element::Water, // 亥
];

/// Heavenly stem, index 0..10 (甲 = 0)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HeavenlyStem(u8);

impl HeavenlyStem {
    /// Reduces any integer into the 10-stem cycle
    pub fn from_cycle(n: i64) -> Self {
        HeavenlyStem(n.rem_euclid(10) as u8)
    }

    pub fn index(&self) -> u8 {
        self.0
    }

    pub fn symbol(&self) -> &'static str {
        STEM_SYMBOLS[self.0 as usize]
    }

    pub fn element(&self) -> Element {
        STEM_ELEMENTS[self.0 as usize]
    }
}

/// Earthly branch, index 0..12 (子 = 0)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EarthlyBranch(u8);

impl EarthlyBranch {
    /// Reduces any integer into the 12-branch cycle
    pub fn from_cycle(n: i64) -> Self {
        EarthlyBranch(n.rem_euclid(12) as u8)
    }

    pub fn index(&self) -> u8 {
        self.0
    }

    pub fn symbol(&self) -> &'static str {
        BRANCH_SYMBOLS[self.0 as usize]
    }

    pub fn element(&self) -> Element {
        BRANCH_ELEMENTS[self.0 as usize]
    }
}

// ============================================================================
// PILLAR
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pillar {
    pub stem: HeavenlyStem,
    pub branch: EarthlyBranch,
}

impl Pillar {
    /// 甲子, used when the birth hour is unknown
    pub const DEFAULT_HOUR: Pillar = Pillar {
        stem: HeavenlyStem(0),
        branch: EarthlyBranch(0),
    };

    pub fn new(stem: HeavenlyStem, branch: EarthlyBranch) -> Self {
        Pillar { stem, branch }
    }

    pub fn elements(&self) -> [Element; 2] {
        [self.stem.element(), self.branch.element()]
    }
}

impl fmt::Display for Pillar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.stem.symbol(), self.branch.symbol())
    }
}

impl Serialize for Pillar {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

// ============================================================================
// FIVE-ELEMENT PROFILE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FiveElementProfile {
    /// Only elements that occur; keys iterate in canonical order
    pub counts: BTreeMap<Element, u32>,
    pub lacking_elements: Vec<Element>,
    pub dominant_element: Option<Element>,
    pub summary_label: String,
    pub explanation: String,
}

impl FiveElementProfile {
    pub fn from_elements<I>(elements: I) -> Self
    where
        I: IntoIterator<Item = Element>,
    {
        let mut counts: BTreeMap<Element, u32> = BTreeMap::new();
        for element in elements {
            *counts.entry(element).or_insert(0) += 1;
        }

        let lacking_elements: Vec<Element> = Element::ALL
            .into_iter()
            .filter(|e| !counts.contains_key(e))
            .collect();

        // Strictly-greater scan over canonical order: ties go to the earlier element
        let mut dominant_element: Option<(Element, u32)> = None;
        for (&element, &count) in &counts {
            match dominant_element {
                Some((_, best)) if count <= best => {}
                _ => dominant_element = Some((element, count)),
            }
        }
        let dominant_element = dominant_element.map(|(e, _)| e);

        let (summary_label, explanation) = describe(&lacking_elements, dominant_element);

        FiveElementProfile {
            counts,
            lacking_elements,
            dominant_element,
            summary_label,
            explanation,
        }
    }

    pub fn count(&self, element: Element) -> u32 {
        self.counts.get(&element).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u32 {
        self.counts.values().sum()
    }

    pub fn is_complete(&self) -> bool {
        self.lacking_elements.is_empty()
    }
}

fn describe(lacking: &[Element], dominant: Option<Element>) -> (String, String) {
    if !lacking.is_empty() {
        let names: Vec<&str> = lacking.iter().map(|e| e.symbol()).collect();
        let label = format!("缺{}", names.join("、"));

        let mut explanation: String = lacking.iter().map(|e| e.lacking_advice()).collect();
        if let Some(dominant) = dominant {
            explanation.push_str(&format!("命局中{}最旺，{}", dominant.symbol(), dominant.virtue()));
        }
        return (label, explanation);
    }

    match dominant {
        Some(dominant) => (
            format!("{}旺", dominant.symbol()),
            format!("{}旺，{}五行俱全，整体较为平衡。", dominant.symbol(), dominant.virtue()),
        ),
        None => (String::new(), String::new()),
    }
}

// ============================================================================
// BAZI RESULT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BaziResult {
    pub year: Pillar,
    pub month: Pillar,
    pub day: Pillar,
    pub hour: Pillar,
    /// False when the hour pillar is the 甲子 placeholder
    pub hour_known: bool,
    pub profile: FiveElementProfile,
}

/// Pillar strings only - what responses and history records embed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaziSummary {
    pub year: String,
    pub month: String,
    pub day: String,
    pub hour: String,
}

impl BaziResult {
    pub fn summary(&self) -> BaziSummary {
        BaziSummary {
            year: self.year.to_string(),
            month: self.month.to_string(),
            day: self.day.to_string(),
            hour: self.hour.to_string(),
        }
    }

    /// Pillars that fed the element tally
    pub fn counted_pillars(&self) -> Vec<Pillar> {
        let mut pillars = vec![self.year, self.month, self.day];
        if self.hour_known {
            pillars.push(self.hour);
        }
        pillars
    }
}

impl fmt::Display for BaziResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} {}", self.year, self.month, self.day, self.hour)
    }
}

// ============================================================================
// CALCULATION
// ============================================================================

/// 1970-01-01 expressed as days from 0001-01-01 (CE day 1)
const UNIX_EPOCH_DAYS_FROM_CE: i64 = 719_163;

/// Whole days between 1970-01-01 and `date` (negative before the epoch)
pub fn epoch_days(date: NaiveDate) -> i64 {
    date.num_days_from_ce() as i64 - UNIX_EPOCH_DAYS_FROM_CE
}

/// Hour-of-day to the 12 double-hour branches; 23:00 starts 子
pub fn hour_branch(hour: u32) -> EarthlyBranch {
    EarthlyBranch::from_cycle(((hour as i64 + 1) % 24) / 2)
}

pub fn compute_pillars(date: NaiveDate, hour: Option<u32>) -> BaziResult {
    let year = date.year() as i64;
    let month = date.month() as i64;

    let year_pillar = Pillar::new(
        HeavenlyStem::from_cycle(year - 4),
        EarthlyBranch::from_cycle(year - 4),
    );

    let month_pillar = Pillar::new(
        HeavenlyStem::from_cycle(year * 12 + month),
        EarthlyBranch::from_cycle(month - 1),
    );

    let days = epoch_days(date);
    let day_pillar = Pillar::new(HeavenlyStem::from_cycle(days), EarthlyBranch::from_cycle(days));

    let hour_pillar = match hour {
        Some(h) => {
            let branch = hour_branch(h);
            let stem = HeavenlyStem::from_cycle(
                day_pillar.stem.index() as i64 * 2 + branch.index() as i64,
            );
            Pillar::new(stem, branch)
        }
        None => Pillar::DEFAULT_HOUR,
    };

    let mut counted = vec![year_pillar, month_pillar, day_pillar];
    if hour.is_some() {
        counted.push(hour_pillar);
    }
    let profile = FiveElementProfile::from_elements(counted.iter().flat_map(|p| p.elements()));

    BaziResult {
        year: year_pillar,
        month: month_pillar,
        day: day_pillar,
        hour: hour_pillar,
        hour_known: hour.is_some(),
        profile,
    }
}

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%Y/%m/%d", "%Y.%m.%d"];

/// Parse a user-entered birth date
pub fn parse_birth_date(input: &str) -> Result<NaiveDate, BaziError> {
    let text = input.trim();

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return Ok(date);
        }
    }

    if let Ok(datetime) = DateTime::parse_from_rfc3339(text) {
        return Ok(datetime.date_naive());
    }
    if let Ok(datetime) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S") {
        return Ok(datetime.date());
    }

    Err(BaziError::InvalidDate(input.to_string()))
}

pub fn compute_from_str(birthday: &str, hour: Option<u32>) -> Result<BaziResult, BaziError> {
    let date = parse_birth_date(birthday)?;
    Ok(compute_pillars(date, hour))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_reference_scenario_with_hour() {
        let bazi = compute_pillars(date(2025, 12, 28), Some(10));

        // 2021 mod 10 = 1, 2021 mod 12 = 5
        assert_eq!(bazi.year.stem.index(), 1);
        assert_eq!(bazi.year.branch.index(), 5);
        assert_eq!(bazi.year.to_string(), "乙巳");

        // (2025*12 + 12) mod 10 = 2, (12 - 1) mod 12 = 11
        assert_eq!(bazi.month.stem.index(), 2);
        assert_eq!(bazi.month.branch.index(), 11);

        // 20450 days since epoch
        assert_eq!(epoch_days(date(2025, 12, 28)), 20450);
        assert_eq!(bazi.day.stem.index(), 0);
        assert_eq!(bazi.day.branch.index(), 2);

        // (10 + 1) / 2 = 5, stem (0*2 + 5) mod 10 = 5
        assert_eq!(bazi.hour.branch.index(), 5);
        assert_eq!(bazi.hour.stem.index(), 5);
        assert!(bazi.hour_known);

        assert_eq!(bazi.to_string(), "乙巳 丙亥 甲寅 己巳");
    }

    #[test]
    fn test_reference_scenario_profile() {
        let bazi = compute_pillars(date(2025, 12, 28), Some(10));
        let profile = &bazi.profile;

        // 乙木 巳火 丙火 亥水 甲木 寅木 己土 巳火
        assert_eq!(profile.total(), 8);
        assert_eq!(profile.count(Element::Wood), 3);
        assert_eq!(profile.count(Element::Fire), 3);
        assert_eq!(profile.count(Element::Water), 1);
        assert_eq!(profile.count(Element::Earth), 1);
        assert_eq!(profile.count(Element::Metal), 0);
        assert!(!profile.counts.contains_key(&Element::Metal));

        assert_eq!(profile.lacking_elements, vec![Element::Metal]);
        // Wood and fire tie at 3; wood comes first in canonical order
        assert_eq!(profile.dominant_element, Some(Element::Wood));
        assert_eq!(profile.summary_label, "缺金");
        assert!(profile.explanation.starts_with("命局缺金"));
        assert!(profile.explanation.contains("命局中木最旺"));
    }

    #[test]
    fn test_missing_hour_uses_default_pillar() {
        let bazi = compute_pillars(date(2025, 12, 28), None);

        assert_eq!(bazi.hour, Pillar::DEFAULT_HOUR);
        assert_eq!(bazi.hour.stem.index(), 0);
        assert_eq!(bazi.hour.branch.index(), 0);
        assert_eq!(bazi.hour.to_string(), "甲子");
        assert!(!bazi.hour_known);

        // Only year + month + day are tallied
        assert_eq!(bazi.profile.total(), 6);
        assert_eq!(bazi.counted_pillars().len(), 3);
    }

    #[test]
    fn test_tally_conservation() {
        for (y, m, d) in [(1990, 5, 17), (2000, 1, 1), (2024, 2, 10), (1969, 12, 31)] {
            for hour in [None, Some(0), Some(13), Some(23)] {
                let bazi = compute_pillars(date(y, m, d), hour);
                let expected = if hour.is_some() { 8 } else { 6 };
                assert_eq!(bazi.profile.total(), expected, "{}-{}-{} {:?}", y, m, d, hour);
            }
        }
    }

    #[test]
    fn test_determinism() {
        let a = compute_pillars(date(1990, 5, 17), Some(7));
        let b = compute_pillars(date(1990, 5, 17), Some(7));
        assert_eq!(a, b);
    }

    #[test]
    fn test_hour_wraparound() {
        assert_eq!(hour_branch(23).index(), 0);
        assert_eq!(hour_branch(0).index(), 0);
        assert_eq!(hour_branch(1).index(), 1);
        assert_eq!(hour_branch(22).index(), 11);

        let late = compute_pillars(date(2024, 2, 10), Some(23));
        let early = compute_pillars(date(2024, 2, 10), Some(0));
        assert_eq!(late.hour, early.hour);
    }

    #[test]
    fn test_day_pillar_ten_day_offset() {
        let base = date(2000, 1, 1);
        let later = base + chrono::Duration::days(10);

        let a = compute_pillars(base, None);
        let b = compute_pillars(later, None);

        assert_eq!(a.day.stem, b.day.stem);
        assert_ne!(a.day.branch, b.day.branch);
        assert_eq!((a.day.branch.index() + 10) % 12, b.day.branch.index());
    }

    #[test]
    fn test_dates_before_epoch_stay_in_range() {
        // -1 days: stem 9 (癸), branch 11 (亥)
        let bazi = compute_pillars(date(1969, 12, 31), None);
        assert_eq!(bazi.day.stem.index(), 9);
        assert_eq!(bazi.day.branch.index(), 11);

        // year 1: (1 - 4) wraps to stem 7, branch 9
        let ancient = compute_pillars(date(1, 3, 1), None);
        assert_eq!(ancient.year.stem.index(), 7);
        assert_eq!(ancient.year.branch.index(), 9);
    }

    #[test]
    fn test_lacking_is_canonical_subsequence() {
        for offset in 0..120 {
            let d = date(1995, 1, 1) + chrono::Duration::days(offset * 37);
            let profile = compute_pillars(d, Some((offset % 24) as u32)).profile;

            let positions: Vec<usize> = profile
                .lacking_elements
                .iter()
                .map(|e| Element::ALL.iter().position(|x| x == e).unwrap())
                .collect();
            assert!(positions.windows(2).all(|w| w[0] < w[1]));

            // Lacking and dominant may coexist
            assert!(profile.dominant_element.is_some());
            for e in &profile.lacking_elements {
                assert_eq!(profile.count(*e), 0);
            }
        }
    }

    #[test]
    fn test_balanced_profile() {
        let profile = FiveElementProfile::from_elements([
            Element::Fire,
            Element::Metal,
            Element::Wood,
            Element::Water,
            Element::Earth,
            Element::Water,
        ]);

        assert!(profile.is_complete());
        assert_eq!(profile.dominant_element, Some(Element::Water));
        assert_eq!(profile.summary_label, "水旺");
        assert!(profile.explanation.ends_with("五行俱全，整体较为平衡。"));
    }

    #[test]
    fn test_multiple_lacking_label() {
        let profile = FiveElementProfile::from_elements([
            Element::Earth,
            Element::Earth,
            Element::Fire,
            Element::Earth,
        ]);

        assert_eq!(
            profile.lacking_elements,
            vec![Element::Metal, Element::Wood, Element::Water]
        );
        assert_eq!(profile.summary_label, "缺金、木、水");
        assert_eq!(profile.dominant_element, Some(Element::Earth));

        let metal = profile.explanation.find("命局缺金").unwrap();
        let wood = profile.explanation.find("命局缺木").unwrap();
        let water = profile.explanation.find("命局缺水").unwrap();
        assert!(metal < wood && wood < water);
        assert!(profile.explanation.ends_with(Element::Earth.virtue()));
    }

    #[test]
    fn test_empty_profile_has_no_dominant() {
        let profile = FiveElementProfile::from_elements(std::iter::empty());
        assert_eq!(profile.dominant_element, None);
        assert_eq!(profile.lacking_elements.len(), 5);
        assert_eq!(profile.total(), 0);
    }

    #[test]
    fn test_parse_birth_date_formats() {
        assert_eq!(parse_birth_date("2025-12-28").unwrap(), date(2025, 12, 28));
        assert_eq!(parse_birth_date(" 2025/12/28 ").unwrap(), date(2025, 12, 28));
        assert_eq!(parse_birth_date("2025.12.28").unwrap(), date(2025, 12, 28));
        assert_eq!(parse_birth_date("2025-12-28T08:30:00Z").unwrap(), date(2025, 12, 28));
        assert_eq!(parse_birth_date("2025-12-28T08:30:00").unwrap(), date(2025, 12, 28));
    }

    #[test]
    fn test_parse_birth_date_rejects_garbage() {
        for bad in ["", "yesterday", "2025-13-01", "2025-02-30", "28/12/2025"] {
            assert_eq!(
                parse_birth_date(bad),
                Err(BaziError::InvalidDate(bad.to_string())),
                "{:?} should be rejected",
                bad
            );
        }
        assert!(compute_from_str("not a date", Some(3)).is_err());
    }

    #[test]
    fn test_summary_projection_and_json() {
        let bazi = compute_from_str("2025-12-28", Some(10)).unwrap();
        let summary = bazi.summary();
        assert_eq!(summary.year, "乙巳");
        assert_eq!(summary.hour, "己巳");

        let json = serde_json::to_value(&bazi).unwrap();
        assert_eq!(json["day"], "甲寅");
        assert_eq!(json["hourKnown"], true);
        assert_eq!(json["profile"]["counts"]["木"], 3);
        assert_eq!(json["profile"]["lackingElements"][0], "金");
        assert_eq!(json["profile"]["dominantElement"], "木");
    }

    #[test]
    fn test_element_from_label() {
        assert_eq!(Element::from_label("金"), Some(Element::Metal));
        assert_eq!(Element::from_label("Water"), Some(Element::Water));
        assert_eq!(Element::from_label("wind"), None);
    }
}

//! Deterministic regex-level recognisers for times, days, section headings,
//! change indicators and special-mass/language markers.
//!
//! Everything here is a pure function over strings; no I/O, no shared state.
//! These recognisers underpin both the template builder (baseline capture)
//! and the tier-2 extractor.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::{ALL_DAYS, Day};

/// `hh[:.]mm am/pm` with optional dots in the meridiem.
static TIME_COLON_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(\d{1,2})[:.](\d{2})\s*([ap])\.?m\b\.?").expect("valid time regex")
});

/// Bare `hh am/pm` with no minutes. The leading word boundary keeps the hour
/// from being carved out of a longer digit run.
static TIME_BARE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(\d{1,2})\s*([ap])\.?m\b\.?").expect("valid time regex"));

/// 24-hour `HH:MM`. A trailing meridiem is rejected after the fact since the
/// regex crate has no lookahead.
static TIME_24H_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{1,2}):(\d{2})\b").expect("valid time regex"));

static MERIDIEM_SUFFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*[ap]\.?m\b").expect("valid meridiem regex"));

/// Individual day names: full form or a three-letter-or-longer prefix,
/// optionally dotted. Longest alternatives first.
static DAY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(monday|tuesday|wednesday|thursday|friday|saturday|sunday|mon|tues|tue|wed|thurs|thur|thu|fri|sat|sun)\b\.?",
    )
    .expect("valid day regex")
});

/// `DayA - DayB` / `DayA to DayB` ranges.
static DAY_RANGE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(monday|tuesday|wednesday|thursday|friday|saturday|sunday|mon|tues|tue|wed|thurs|thur|thu|fri|sat|sun)\b\.?\s*(?:[-\u{2013}\u{2014}]|to)\s*\b(monday|tuesday|wednesday|thursday|friday|saturday|sunday|mon|tues|tue|wed|thurs|thur|thu|fri|sat|sun)\b\.?",
    )
    .expect("valid day range regex")
});

static WEEKDAY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bweekdays?\b").expect("valid weekday regex"));

static WEEKEND_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bweekends?\b").expect("valid weekend regex"));

static HEADING_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)mass\s+times?|liturgy\s+schedule|weekend\s+mass|weekday\s+mass|service\s+times?|worship\s+times?|mass\s+schedule|holy\s+mass|eucharist",
    )
    .expect("valid heading regex")
});

/// Phrases signalling a deviation from the regular schedule.
pub const CHANGE_INDICATOR_PHRASES: [&str; 9] = [
    "no mass",
    "cancelled",
    "changed to",
    "note:",
    "please note",
    "instead",
    "will not be held",
    "moved to",
    "rescheduled",
];

/// "No ... this week" with anything reasonable in between.
static NO_THIS_WEEK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bno\b.{0,60}?\bthis week\b").expect("valid change regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Am,
    Pm,
}

impl Period {
    fn label(self) -> &'static str {
        match self {
            Period::Am => "AM",
            Period::Pm => "PM",
        }
    }
}

/// A recognised clock time, pre-normalisation.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedTime {
    /// 12-hour clock hour, 1..=12.
    pub hour: u32,
    pub minute: u32,
    pub period: Period,
    /// The exact source text that matched.
    pub original: String,
}

impl ParsedTime {
    fn new(hour: u32, minute: u32, period: Period, original: &str) -> Option<ParsedTime> {
        if !(1..=12).contains(&hour) || minute > 59 {
            return None;
        }
        Some(ParsedTime {
            hour,
            minute,
            period,
            original: original.to_string(),
        })
    }

    fn from_24h(hour: u32, minute: u32, original: &str) -> Option<ParsedTime> {
        if hour > 23 || minute > 59 {
            return None;
        }
        let (hour12, period) = match hour {
            0 => (12, Period::Am),
            1..=11 => (hour, Period::Am),
            12 => (12, Period::Pm),
            _ => (hour - 12, Period::Pm),
        };
        Some(ParsedTime {
            hour: hour12,
            minute,
            period,
            original: original.to_string(),
        })
    }

    /// Canonical `H:MM AM|PM` form: no leading zero on the hour, two-digit
    /// minutes, uppercase meridiem.
    pub fn formatted(&self) -> String {
        format!("{}:{:02} {}", self.hour, self.minute, self.period.label())
    }

    /// Minutes past midnight; orders times within a day.
    pub fn sort_key(&self) -> u32 {
        let offset = match self.period {
            Period::Am => 0,
            Period::Pm => 12,
        };
        ((self.hour % 12) + offset) * 60 + self.minute
    }
}

/// Every valid time in `text`, in encounter order, duplicates preserved.
///
/// This is the raw scan behind [`find_times`]; the day→time block parser
/// uses it directly so per-line encounter order survives.
pub fn scan_times(text: &str) -> Vec<ParsedTime> {
    // (start, end, time) for every valid match, patterns checked in order of
    // specificity so spans claimed by an earlier pattern win.
    let mut matches: Vec<(usize, usize, ParsedTime)> = Vec::new();

    for caps in TIME_COLON_RE.captures_iter(text) {
        let whole = caps.get(0).expect("match");
        let hour: u32 = caps[1].parse().unwrap_or(99);
        let minute: u32 = caps[2].parse().unwrap_or(99);
        let period = meridiem(&caps[3]);
        if let Some(t) = ParsedTime::new(hour, minute, period, whole.as_str()) {
            matches.push((whole.start(), whole.end(), t));
        }
    }

    for caps in TIME_BARE_RE.captures_iter(text) {
        let whole = caps.get(0).expect("match");
        if overlaps(&matches, whole.start(), whole.end()) {
            continue;
        }
        let hour: u32 = caps[1].parse().unwrap_or(99);
        let period = meridiem(&caps[2]);
        if let Some(t) = ParsedTime::new(hour, 0, period, whole.as_str()) {
            matches.push((whole.start(), whole.end(), t));
        }
    }

    for caps in TIME_24H_RE.captures_iter(text) {
        let whole = caps.get(0).expect("match");
        if overlaps(&matches, whole.start(), whole.end()) {
            continue;
        }
        if MERIDIEM_SUFFIX_RE.is_match(&text[whole.end()..]) {
            continue;
        }
        let hour: u32 = caps[1].parse().unwrap_or(99);
        let minute: u32 = caps[2].parse().unwrap_or(99);
        if let Some(t) = ParsedTime::from_24h(hour, minute, whole.as_str()) {
            matches.push((whole.start(), whole.end(), t));
        }
    }

    matches.sort_by_key(|(start, _, _)| *start);
    matches.into_iter().map(|(_, _, t)| t).collect()
}

fn overlaps(matches: &[(usize, usize, ParsedTime)], start: usize, end: usize) -> bool {
    matches.iter().any(|(s, e, _)| start < *e && *s < end)
}

fn meridiem(s: &str) -> Period {
    if s.eq_ignore_ascii_case("p") {
        Period::Pm
    } else {
        Period::Am
    }
}

/// First valid time in `text`, if any.
pub fn parse_time(text: &str) -> Option<ParsedTime> {
    scan_times(text).into_iter().next()
}

/// All distinct times in `text`, deduplicated by canonical form and sorted
/// ascending by time of day.
pub fn find_times(text: &str) -> Vec<ParsedTime> {
    let mut seen: Vec<String> = Vec::new();
    let mut times: Vec<ParsedTime> = Vec::new();
    for t in scan_times(text) {
        let formatted = t.formatted();
        if !seen.contains(&formatted) {
            seen.push(formatted);
            times.push(t);
        }
    }
    times.sort_by_key(ParsedTime::sort_key);
    times
}

/// Normalise a day token (full name, or a dotted/undotted prefix of at least
/// three letters) to its canonical day.
pub fn normalise_day(token: &str) -> Option<Day> {
    let cleaned = token.trim().trim_end_matches('.').to_lowercase();
    if cleaned.len() < 3 {
        return None;
    }
    ALL_DAYS
        .iter()
        .copied()
        .find(|d| d.name().to_lowercase().starts_with(&cleaned))
}

/// Expand an inclusive day range, wrapping past Sunday when the start falls
/// after the end (Fri→Mon yields Fri, Sat, Sun, Mon).
pub fn expand_day_range(start: Day, end: Day) -> Vec<Day> {
    let span = (end.index() + 7 - start.index()) % 7 + 1;
    (0..span).map(|i| Day::from_index(start.index() + i)).collect()
}

/// Canonical day names appearing in `text`, in order of first appearance.
///
/// Ranges and the Weekday/Weekend keywords are resolved before standalone
/// day names, so a day covered by a range is reported once.
pub fn find_days(text: &str) -> Vec<Day> {
    // (position, expansion) per hit; resolved spans suppress the standalone
    // day matches inside them.
    let mut hits: Vec<(usize, Vec<Day>)> = Vec::new();
    let mut resolved: Vec<(usize, usize)> = Vec::new();

    for caps in DAY_RANGE_RE.captures_iter(text) {
        let whole = caps.get(0).expect("match");
        if let (Some(start), Some(end)) = (normalise_day(&caps[1]), normalise_day(&caps[2])) {
            hits.push((whole.start(), expand_day_range(start, end)));
            resolved.push((whole.start(), whole.end()));
        }
    }

    for m in WEEKDAY_RE.find_iter(text) {
        hits.push((m.start(), expand_day_range(Day::Monday, Day::Friday)));
        resolved.push((m.start(), m.end()));
    }

    for m in WEEKEND_RE.find_iter(text) {
        hits.push((m.start(), expand_day_range(Day::Saturday, Day::Sunday)));
        resolved.push((m.start(), m.end()));
    }

    for caps in DAY_RE.captures_iter(text) {
        let whole = caps.get(0).expect("match");
        let claimed = resolved
            .iter()
            .any(|(s, e)| whole.start() < *e && *s < whole.end());
        if claimed {
            continue;
        }
        if let Some(day) = normalise_day(&caps[1]) {
            hits.push((whole.start(), vec![day]));
        }
    }

    hits.sort_by_key(|(pos, _)| *pos);

    let mut days = Vec::new();
    for (_, expansion) in hits {
        for day in expansion {
            if !days.contains(&day) {
                days.push(day);
            }
        }
    }
    days
}

/// Does this text read as a mass-times section heading?
pub fn has_mass_times_heading(text: &str) -> bool {
    HEADING_RE.is_match(text)
}

/// Every change-indicator phrase present in `text`. Non-empty output means
/// tier-1 static confirmation must escalate.
pub fn detect_change_indicators(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    let mut found: Vec<String> = CHANGE_INDICATOR_PHRASES
        .iter()
        .filter(|phrase| lower.contains(*phrase))
        .map(|phrase| phrase.to_string())
        .collect();

    if let Some(m) = NO_THIS_WEEK_RE.find(text) {
        let matched = m.as_str().to_string();
        if !found.iter().any(|f| f.eq_ignore_ascii_case(&matched)) {
            found.push(matched);
        }
    }
    found
}

/// Classify a context line into a canonical special mass type.
pub fn detect_special_type(text: &str) -> String {
    let lower = text.to_lowercase();
    if lower.contains("vigil") {
        "Vigil".to_string()
    } else if lower.contains("reconciliation") || lower.contains("confession") {
        "Reconciliation".to_string()
    } else if lower.contains("adoration") {
        "Adoration".to_string()
    } else if lower.contains("holy day") {
        "Holy Day".to_string()
    } else if lower.contains("children") {
        "Children's Liturgy".to_string()
    } else if lower.contains("latin") {
        "Latin Rite".to_string()
    } else {
        "Regular".to_string()
    }
}

const LANGUAGES: [&str; 5] = ["Italian", "Vietnamese", "Polish", "Spanish", "Latin"];

/// Detect a non-English mass language marker in a context line.
pub fn detect_language(text: &str) -> String {
    let lower = text.to_lowercase();
    for language in LANGUAGES {
        if lower.contains(&language.to_lowercase()) {
            return language.to_string();
        }
    }
    "English".to_string()
}

/// Parse a block of schedule text into day → formatted times.
///
/// Line-oriented: a line contributes only when it carries both a day (or
/// range/keyword) and at least one time. Times keep per-line encounter order
/// and are not deduplicated here. Heading-only lines and dayless time lines
/// are ignored.
pub fn parse_day_time_block(text: &str) -> BTreeMap<Day, Vec<String>> {
    let mut result: BTreeMap<Day, Vec<String>> = BTreeMap::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let days = find_days(line);
        if days.is_empty() {
            continue;
        }
        let times = scan_times(line);
        if times.is_empty() {
            continue;
        }
        let formatted: Vec<String> = times.iter().map(ParsedTime::formatted).collect();
        for day in days {
            result.entry(day).or_default().extend(formatted.iter().cloned());
        }
    }

    result
}

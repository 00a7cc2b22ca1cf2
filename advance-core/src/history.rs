//! Parser for plain-text scout history exports
//!
//! An export is a header block followed by named sections:
//!
//! ```text
//! Scout History Report
//! Name: Alex Rivera
//! Unit: Troop 42
//! BSA ID: 123456789
//!
//! Tenderfoot, 03/01/2023
//! 1a, Show how to pitch a tent, 01/15/2023
//! 4b, Identify poisonous plants, ________
//!
//! Completed Merit Badges
//! Camping*, 03/10/2023
//!
//! Partial Merit Badges
//! Cooking, 2022
//!     1a, Explain food safety, 02/01/2023
//!
//! Leadership
//! Patrol Leader, 01/01/2023, 06/30/2023
//!
//! Activities
//! Camping Nights: 25
//! ```
//!
//! Malformed lines never stop the parse. Each problem is recorded in
//! [`ParsedHistory::errors`] and parsing resumes on the next line. Inside a
//! known section a line is always handed to that section's grammar, so a
//! broken line costs only itself.

use chrono::NaiveDate;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::models::{ProgressRecord, ProgressStatus, Requirement, ScoutInfo};

lazy_static! {
    static ref DATE: Regex = Regex::new(r"^\d{1,2}/\d{1,2}/\d{4}$").unwrap();
    static ref PLACEHOLDER: Regex = Regex::new(r"^_+$").unwrap();
    static ref DATE_LIKE: Regex = Regex::new(r"^[\d/_.\-]+$").unwrap();
}

/// Rank titles recognized as section headers, in advancement order
pub const RANKS: [&str; 7] = [
    "Scout",
    "Tenderfoot",
    "Second Class",
    "First Class",
    "Star",
    "Life",
    "Eagle",
];

const DATE_FORMAT: &str = "%m/%d/%Y";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportedRequirement {
    pub number: String,
    pub description: String,
    /// `None` when the export shows the requirement as not completed
    pub completed_on: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankProgress {
    pub rank: String,
    pub awarded_on: Option<NaiveDate>,
    pub requirements: Vec<ImportedRequirement>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletedMeritBadge {
    pub name: String,
    pub completed_on: Option<NaiveDate>,
    pub eagle_required: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PartialMeritBadge {
    pub name: String,
    /// Requirement version label, when the export names one
    pub version: Option<String>,
    pub requirements: Vec<ImportedRequirement>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeadershipPosition {
    pub position: String,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl LeadershipPosition {
    pub fn is_current(&self) -> bool {
        self.end.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Activities {
    pub camping_nights: Option<u32>,
    pub hiking_miles: Option<f64>,
    pub service_hours: Option<f64>,
    /// Any other `key: value` lines, verbatim
    pub other: BTreeMap<String, String>,
}

/// Everything recovered from one export document
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParsedHistory {
    pub title: Option<String>,
    pub scout_info: ScoutInfo,
    pub rank_progress: Vec<RankProgress>,
    pub completed_merit_badges: Vec<CompletedMeritBadge>,
    pub partial_merit_badges: Vec<PartialMeritBadge>,
    pub leadership_history: Vec<LeadershipPosition>,
    pub activities: Activities,
    /// Human-readable diagnostics, one per problem found
    pub errors: Vec<String>,
}

impl ParsedHistory {
    pub fn rank(&self, name: &str) -> Option<&RankProgress> {
        self.rank_progress
            .iter()
            .find(|r| r.rank.eq_ignore_ascii_case(name.trim()))
    }

    pub fn partial_badge(&self, name: &str) -> Option<&PartialMeritBadge> {
        self.partial_merit_badges
            .iter()
            .find(|b| b.name.eq_ignore_ascii_case(name.trim()))
    }

    /// Canonical requirement and progress records for an imported rank.
    ///
    /// Requirements get fresh ids and their nesting depth from the number
    /// grammar; they are meant to be assembled with the legacy hierarchy.
    pub fn rank_records(&self, rank: &str) -> Option<(Vec<Requirement>, Vec<ProgressRecord>)> {
        self.rank(rank).map(|r| records_for(&r.requirements))
    }

    /// Same as [`ParsedHistory::rank_records`], for a partially completed
    /// merit badge
    pub fn badge_records(&self, name: &str) -> Option<(Vec<Requirement>, Vec<ProgressRecord>)> {
        self.partial_badge(name).map(|b| records_for(&b.requirements))
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Parses an export document. Never fails; see [`ParsedHistory::errors`].
pub fn parse(document: &str) -> ParsedHistory {
    let mut parser = HistoryParser::default();
    for (index, line) in document.lines().enumerate() {
        parser.line(index + 1, line);
    }
    parser.finish()
}

fn records_for(imported: &[ImportedRequirement]) -> (Vec<Requirement>, Vec<ProgressRecord>) {
    let mut requirements = Vec::with_capacity(imported.len());
    let mut progress = Vec::with_capacity(imported.len());

    for (order, item) in imported.iter().enumerate() {
        let requirement = Requirement::new(item.number.as_str(), item.description.as_str())
            .with_display_order(order as u32);

        let mut record = match item.completed_on {
            Some(_) => ProgressRecord::new(requirement.id, ProgressStatus::Completed),
            None => ProgressRecord::new(requirement.id, ProgressStatus::NotStarted),
        };
        record.completed_at = item.completed_on;
        record.notes = "Imported from history export".to_string();

        requirements.push(requirement);
        progress.push(record);
    }

    (requirements, progress)
}

enum DateField {
    Date(NaiveDate),
    /// Underscore run meaning "not completed"
    Placeholder,
    Invalid,
}

fn parse_date(field: &str) -> DateField {
    let field = field.trim();
    if PLACEHOLDER.is_match(field) {
        return DateField::Placeholder;
    }
    if !DATE.is_match(field) {
        return DateField::Invalid;
    }
    match NaiveDate::parse_from_str(field, DATE_FORMAT) {
        Ok(date) => DateField::Date(date),
        Err(_) => DateField::Invalid,
    }
}

fn split_fields(text: &str) -> Vec<&str> {
    text.split(',').map(str::trim).collect()
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Section {
    Header,
    Rank(usize),
    CompletedBadges,
    PartialBadges,
    Leadership,
    Activities,
    /// Inside an unrecognized section: lines are skipped
    Unknown {
        header_line: usize,
        skipped: usize,
    },
}

enum Header<'a> {
    Rank {
        name: &'static str,
        date: Option<&'a str>,
    },
    CompletedBadges,
    PartialBadges,
    Leadership,
    Activities,
}

fn classify_header(text: &str) -> Option<Header<'_>> {
    let (first, rest) = match text.split_once(',') {
        Some((first, rest)) => (first.trim(), Some(rest.trim())),
        None => (text.trim(), None),
    };

    if let Some(name) = RANKS.iter().find(|r| r.eq_ignore_ascii_case(first)) {
        return Some(Header::Rank { name: *name, date: rest });
    }
    if rest.is_some() {
        return None;
    }

    match first.to_lowercase().as_str() {
        "completed merit badges" => Some(Header::CompletedBadges),
        "partial merit badges" => Some(Header::PartialBadges),
        "leadership" => Some(Header::Leadership),
        "activities" => Some(Header::Activities),
        _ => None,
    }
}

struct HistoryParser {
    out: ParsedHistory,
    section: Section,
    current_badge: Option<usize>,
    seen_header_content: bool,
    /// Line that closed the header block, or the last line seen
    header_end: usize,
}

impl Default for HistoryParser {
    fn default() -> Self {
        Self {
            out: ParsedHistory::default(),
            section: Section::Header,
            current_badge: None,
            seen_header_content: false,
            header_end: 0,
        }
    }
}

impl HistoryParser {
    fn error(&mut self, line_no: usize, message: impl AsRef<str>) {
        let message = format!("line {}: {}", line_no, message.as_ref());
        log::debug!("history import: {}", message);
        self.out.errors.push(message);
    }

    fn line(&mut self, line_no: usize, raw: &str) {
        if self.section == Section::Header {
            self.header_end = line_no;
        }
        let text = raw.trim();
        if text.is_empty() {
            return;
        }
        let indented = raw.starts_with(char::is_whitespace);

        if !indented {
            if let Some(header) = classify_header(text) {
                self.enter_section(line_no, header);
                return;
            }
            if self.looks_like_unknown_header(text) {
                self.close_unknown_section();
                self.error(line_no, format!("unrecognized section header '{}'", text));
                self.section = Section::Unknown {
                    header_line: line_no,
                    skipped: 0,
                };
                return;
            }
        }

        let section = self.section;
        match section {
            Section::Header => self.header_line(line_no, text),
            Section::Rank(index) => {
                if let Some(req) = self.requirement_line(line_no, text) {
                    self.out.rank_progress[index].requirements.push(req);
                }
            }
            Section::CompletedBadges => self.completed_badge_line(line_no, text),
            Section::PartialBadges if !indented => self.partial_badge_header(text),
            Section::PartialBadges => self.partial_badge_requirement(line_no, text),
            Section::Leadership => self.leadership_line(line_no, text),
            Section::Activities => self.activity_line(line_no, text),
            Section::Unknown {
                header_line,
                skipped,
            } => {
                self.section = Section::Unknown {
                    header_line,
                    skipped: skipped + 1,
                };
            }
        }
    }

    /// A bare, unindented line where no section grammar can claim it.
    ///
    /// Only the header block and skipped sections qualify. Inside a known
    /// section the same line is a malformed entry of that section and gets
    /// its own diagnostic there.
    fn looks_like_unknown_header(&self, text: &str) -> bool {
        let starts_with_digit = text.starts_with(|c: char| c.is_ascii_digit());
        if starts_with_digit || text.contains(',') || text.contains(':') {
            return false;
        }
        match self.section {
            // The first bare line of the document is its title
            Section::Header => self.seen_header_content,
            Section::Unknown { .. } => true,
            _ => false,
        }
    }

    fn close_unknown_section(&mut self) {
        if let Section::Unknown {
            header_line,
            skipped,
        } = self.section
        {
            if skipped > 0 {
                log::debug!(
                    "skipped {} lines of unrecognized section starting at line {}",
                    skipped,
                    header_line
                );
            }
        }
    }

    fn enter_section(&mut self, line_no: usize, header: Header<'_>) {
        self.close_unknown_section();
        self.seen_header_content = true;
        self.current_badge = None;

        self.section = match header {
            Header::Rank { name, date } => {
                let awarded_on = match date.map(parse_date) {
                    None | Some(DateField::Placeholder) => None,
                    Some(DateField::Date(d)) => Some(d),
                    Some(DateField::Invalid) => {
                        self.error(
                            line_no,
                            format!(
                                "invalid award date '{}' for rank {}",
                                date.unwrap_or_default(),
                                name
                            ),
                        );
                        None
                    }
                };

                let index = match self.out.rank_progress.iter().position(|r| r.rank == name) {
                    Some(index) => {
                        if awarded_on.is_some() {
                            self.out.rank_progress[index].awarded_on = awarded_on;
                        }
                        index
                    }
                    None => {
                        self.out.rank_progress.push(RankProgress {
                            rank: name.to_string(),
                            awarded_on,
                            requirements: Vec::new(),
                        });
                        self.out.rank_progress.len() - 1
                    }
                };
                Section::Rank(index)
            }
            Header::CompletedBadges => Section::CompletedBadges,
            Header::PartialBadges => Section::PartialBadges,
            Header::Leadership => Section::Leadership,
            Header::Activities => Section::Activities,
        };
    }

    fn header_line(&mut self, line_no: usize, text: &str) {
        let Some((key, value)) = text.split_once(':') else {
            if self.seen_header_content {
                self.error(line_no, format!("expected 'key: value' in header, got '{}'", text));
            } else {
                self.out.title = Some(text.to_string());
            }
            self.seen_header_content = true;
            return;
        };
        self.seen_header_content = true;

        let value = value.trim().to_string();
        match key.trim().to_lowercase().as_str() {
            "name" | "scout" => self.out.scout_info.name = value,
            "unit" | "troop" => self.out.scout_info.unit = value,
            "bsa id" | "member id" | "id" => self.out.scout_info.member_id = value,
            other => {
                if value.is_empty() {
                    self.error(line_no, format!("header field '{}' has no value", other));
                } else {
                    log::debug!("ignoring header field '{}'", other);
                }
            }
        }
    }

    /// `number, description, date`; the description may itself hold commas
    fn requirement_line(&mut self, line_no: usize, text: &str) -> Option<ImportedRequirement> {
        let fields = split_fields(text);
        if fields.len() < 2 {
            self.error(
                line_no,
                format!("expected 'number, description, date', got '{}'", text),
            );
            return None;
        }

        let number = fields[0];
        if number.is_empty() {
            self.error(line_no, "requirement line has no requirement number");
            return None;
        }

        let last = fields[fields.len() - 1];
        if fields.len() == 2 && !DATE_LIKE.is_match(last) {
            self.error(
                line_no,
                format!("requirement {} has no completion date", number),
            );
            return Some(ImportedRequirement {
                number: number.to_string(),
                description: last.to_string(),
                completed_on: None,
            });
        }

        let description = fields[1..fields.len() - 1].join(", ");
        let completed_on = self.date_field(line_no, last, &format!("requirement {}", number));

        Some(ImportedRequirement {
            number: number.to_string(),
            description,
            completed_on,
        })
    }

    /// Resolves a date field, recording a diagnostic for anything that is
    /// neither a valid date nor the not-completed placeholder
    fn date_field(&mut self, line_no: usize, field: &str, what: &str) -> Option<NaiveDate> {
        match parse_date(field) {
            DateField::Date(date) => Some(date),
            DateField::Placeholder => None,
            DateField::Invalid if field.is_empty() => {
                self.error(line_no, format!("missing date for {}", what));
                None
            }
            DateField::Invalid => {
                self.error(line_no, format!("invalid date '{}' for {}", field, what));
                None
            }
        }
    }

    fn completed_badge_line(&mut self, line_no: usize, text: &str) {
        let fields = split_fields(text);
        let raw_name = fields[0];
        let eagle_required = raw_name.ends_with('*');
        let name = raw_name.trim_end_matches('*').trim().to_string();

        if name.is_empty() {
            self.error(line_no, "merit badge line has no badge name");
            return;
        }

        let completed_on = match fields.get(1) {
            Some(field) => self.date_field(line_no, field, &format!("merit badge {}", name)),
            None => {
                self.error(line_no, format!("missing date for merit badge {}", name));
                None
            }
        };

        self.out.completed_merit_badges.push(CompletedMeritBadge {
            name,
            completed_on,
            eagle_required,
        });
    }

    fn partial_badge_header(&mut self, text: &str) {
        let fields = split_fields(text);
        let version = fields
            .get(1)
            .filter(|v| !v.is_empty())
            .map(|v| v.to_string());

        self.out.partial_merit_badges.push(PartialMeritBadge {
            name: fields[0].to_string(),
            version,
            requirements: Vec::new(),
        });
        self.current_badge = Some(self.out.partial_merit_badges.len() - 1);
    }

    fn partial_badge_requirement(&mut self, line_no: usize, text: &str) {
        let Some(index) = self.current_badge else {
            self.error(
                line_no,
                format!("requirement line '{}' appears before any merit badge name", text),
            );
            return;
        };
        if let Some(req) = self.requirement_line(line_no, text) {
            self.out.partial_merit_badges[index].requirements.push(req);
        }
    }

    /// `position, start[, end]`
    fn leadership_line(&mut self, line_no: usize, text: &str) {
        let fields = split_fields(text);
        if fields.len() < 2 {
            self.error(
                line_no,
                format!("expected 'position, start date, end date', got '{}'", text),
            );
            return;
        }

        let (position, start, end) = if fields.len() == 2 {
            (fields[0].to_string(), fields[1], None)
        } else {
            let n = fields.len();
            (fields[..n - 2].join(", "), fields[n - 2], Some(fields[n - 1]))
        };

        if position.is_empty() {
            self.error(line_no, "leadership line has no position");
            return;
        }

        let what = format!("position {}", position);
        let start = self.date_field(line_no, start, &what);
        let end = end.and_then(|field| self.date_field(line_no, field, &what));

        self.out.leadership_history.push(LeadershipPosition {
            position,
            start,
            end,
        });
    }

    fn activity_line(&mut self, line_no: usize, text: &str) {
        let Some((key, value)) = text.split_once(':') else {
            self.error(line_no, format!("expected 'name: value', got '{}'", text));
            return;
        };
        let key = key.trim();
        let value = value.trim();
        let activities = &mut self.out.activities;

        let parsed = match key.to_lowercase().as_str() {
            "camping nights" => value.parse().map(|n| activities.camping_nights = Some(n)).is_ok(),
            "hiking miles" => value.parse().map(|n| activities.hiking_miles = Some(n)).is_ok(),
            "service hours" => value.parse().map(|n| activities.service_hours = Some(n)).is_ok(),
            _ => {
                activities.other.insert(key.to_string(), value.to_string());
                true
            }
        };

        if !parsed {
            self.error(line_no, format!("invalid number '{}' for {}", value, key));
        }
    }

    fn finish(mut self) -> ParsedHistory {
        self.close_unknown_section();
        if self.out.scout_info.name.is_empty() {
            let line_no = self.header_end.max(1);
            self.error(line_no, "header block has no scout name");
        }
        self.out
    }
}

//! Video metadata model and field parsers
//!
//! [`Video`] fixes the column set written to the data file. Helpers here turn
//! the loosely formatted values found on watch pages and in Data API
//! responses (abbreviated counts, locale tags, ISO 8601 durations) into
//! typed values.

use serde::Serialize;
use serde_json::Value;
use std::fmt;
use tracing::warn;

use crate::record::Record;

/// Placeholder for an unknown language code or name
pub const UNKNOWN: &str = "Unknown";

const LANGUAGES: [(&str, &str); 6] = [
    ("English", "en"),
    ("Spanish", "es"),
    ("French", "fr"),
    ("German", "de"),
    ("Chinese", "zh"),
    ("Japanese", "ja"),
];

/// Whole seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
#[serde(transparent)]
pub struct Seconds(pub u64);

impl Seconds {
    /// Raw seconds
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Seconds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}s", self.0)
    }
}

/// ISO 8601 duration parse errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DurationParseError {
    /// Empty input
    #[error("empty duration")]
    Empty,

    /// Not an ISO 8601 duration
    #[error("malformed duration '{0}'")]
    Malformed(String),

    /// Years or months have no fixed length in seconds
    #[error("duration '{0}' uses calendar units (years/months)")]
    CalendarUnits(String),
}

/// Video model errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VideoError {
    /// A required field is absent from the API resource
    #[error("missing required field '{0}'")]
    MissingField(&'static str),
}

/// Parse an ISO 8601 duration such as `PT1H2M3S` into whole seconds
///
/// Weeks, days, hours, minutes and seconds are accepted; fractional
/// seconds are truncated. Years and months are rejected.
pub fn parse_duration(raw: &str) -> Result<Seconds, DurationParseError> {
    let input = raw.trim();
    if input.is_empty() {
        return Err(DurationParseError::Empty);
    }
    let malformed = || DurationParseError::Malformed(raw.to_string());

    let body = input.strip_prefix('P').ok_or_else(malformed)?;
    if body.is_empty() {
        return Err(malformed());
    }

    let (date_part, time_part) = match body.split_once('T') {
        Some((date, time)) if !time.is_empty() => (date, Some(time)),
        Some(_) => return Err(malformed()),
        None => (body, None),
    };

    let mut total = 0f64;
    for (value, unit) in duration_components(date_part).ok_or_else(malformed)? {
        total += value
            * match unit {
                'W' => 604_800.0,
                'D' => 86_400.0,
                'Y' | 'M' => return Err(DurationParseError::CalendarUnits(raw.to_string())),
                _ => return Err(malformed()),
            };
    }
    if let Some(time) = time_part {
        for (value, unit) in duration_components(time).ok_or_else(malformed)? {
            total += value
                * match unit {
                    'H' => 3_600.0,
                    'M' => 60.0,
                    'S' => 1.0,
                    _ => return Err(malformed()),
                };
        }
    }

    Ok(Seconds(total.trunc() as u64))
}

fn duration_components(part: &str) -> Option<Vec<(f64, char)>> {
    let mut components = Vec::new();
    let mut number = String::new();
    for c in part.chars() {
        if c.is_ascii_digit() || c == '.' || c == ',' {
            number.push(if c == ',' { '.' } else { c });
        } else {
            if number.is_empty() {
                return None;
            }
            let value: f64 = number.parse().ok()?;
            components.push((value, c));
            number.clear();
        }
    }
    number.is_empty().then_some(components)
}

/// Parse an abbreviated count (`"1.2K"`, `"3M"`, `"1,234"`) into an integer
///
/// Unparseable input yields 0.
pub fn parse_count(raw: &str) -> u64 {
    let cleaned: String = raw
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect();
    if cleaned.is_empty() {
        return 0;
    }

    let (number, multiplier) = match cleaned.chars().last().map(|c| c.to_ascii_uppercase()) {
        Some('K') => (&cleaned[..cleaned.len() - 1], 1_000f64),
        Some('M') => (&cleaned[..cleaned.len() - 1], 1_000_000f64),
        Some('B') => (&cleaned[..cleaned.len() - 1], 1_000_000_000f64),
        _ => (cleaned.as_str(), 1f64),
    };

    match number.parse::<f64>() {
        Ok(value) if value.is_finite() && value >= 0.0 => (value * multiplier).round() as u64,
        _ => 0,
    }
}

/// Split a locale tag (`en-US`, `en_US`, `en`) into language and country
pub fn parse_locale(code: &str) -> (Option<String>, Option<String>) {
    let normalized = code.trim().replace('_', "-");
    let mut parts = normalized.split('-').filter(|p| !p.is_empty());
    let language = parts.next().map(str::to_string);
    let country = parts.next().map(str::to_string);
    (language, country)
}

/// Look up a language code by name or a name by code
pub fn map_language(name_or_code: &str) -> Option<&'static str> {
    LANGUAGES.iter().find_map(|(name, code)| {
        if *name == name_or_code {
            Some(*code)
        } else if *code == name_or_code {
            Some(*name)
        } else {
            None
        }
    })
}

/// One video's metadata and engagement counters
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Video {
    /// Video id
    pub video_id: String,
    /// Video title
    pub title: String,
    /// Publication timestamp
    pub published_at: String,
    /// Recording date, when known
    pub upload_date: String,
    /// Audio language code
    pub language_code: String,
    /// View count
    pub view_count: u64,
    /// Watch page URL
    pub url: String,
    /// Default thumbnail URL
    pub thumbnail_url: String,
    /// Channel id
    pub channel_id: String,
    /// Channel title
    pub channel_name: String,
    /// Audio language name
    pub language_name: String,
    /// Country from the audio locale
    pub country: String,
    /// Like count
    pub likes: u64,
    /// Comment count
    pub comments: u64,
    /// Share count, when exposed
    pub shares: Option<u64>,
    /// Dislike count, when exposed
    pub dislikes: Option<u64>,
    /// Subscribers gained, when exposed
    pub subscribers_gained: Option<u64>,
    /// Subscribers lost, when exposed
    pub subscribers_lost: Option<u64>,
    /// Length in seconds
    pub duration: Option<Seconds>,
}

impl Video {
    /// Data file columns, in output order
    pub fn columns() -> Vec<String> {
        [
            "video_id",
            "title",
            "published_at",
            "upload_date",
            "language_code",
            "view_count",
            "url",
            "thumbnail_url",
            "channel_id",
            "channel_name",
            "language_name",
            "country",
            "likes",
            "comments",
            "shares",
            "dislikes",
            "subscribers_gained",
            "subscribers_lost",
            "duration",
        ]
        .into_iter()
        .map(String::from)
        .collect()
    }

    /// Watch page URL for an id
    pub fn watch_url(video_id: &str) -> String {
        format!("https://www.youtube.com/watch?v={video_id}")
    }

    /// Flat record in [`Video::columns`] order
    pub fn to_record(&self) -> Record {
        Record::new()
            .with("video_id", self.video_id.as_str())
            .with("title", self.title.as_str())
            .with("published_at", self.published_at.as_str())
            .with("upload_date", self.upload_date.as_str())
            .with("language_code", self.language_code.as_str())
            .with("view_count", self.view_count)
            .with("url", self.url.as_str())
            .with("thumbnail_url", self.thumbnail_url.as_str())
            .with("channel_id", self.channel_id.as_str())
            .with("channel_name", self.channel_name.as_str())
            .with("language_name", self.language_name.as_str())
            .with("country", self.country.as_str())
            .with("likes", self.likes)
            .with("comments", self.comments)
            .with("shares", self.shares)
            .with("dislikes", self.dislikes)
            .with("subscribers_gained", self.subscribers_gained)
            .with("subscribers_lost", self.subscribers_lost)
            .with("duration", self.duration.map(Seconds::as_u64))
    }

    /// Build from a Data API v3 `videos` resource
    ///
    /// `id`, `snippet.title` and `snippet.publishedAt` are required. An
    /// unparseable `contentDetails.duration` is logged and left empty.
    pub fn from_api_item(item: &Value) -> Result<Self, VideoError> {
        let text = |pointer: &str| -> Option<String> {
            item.pointer(pointer)
                .and_then(Value::as_str)
                .map(str::to_string)
        };
        let count = |pointer: &str| -> u64 {
            match item.pointer(pointer) {
                Some(Value::String(s)) => parse_count(s),
                Some(Value::Number(n)) => n.as_u64().unwrap_or(0),
                _ => 0,
            }
        };

        let video_id = text("/id").ok_or(VideoError::MissingField("id"))?;
        let title = text("/snippet/title").ok_or(VideoError::MissingField("snippet.title"))?;
        let published_at = text("/snippet/publishedAt")
            .ok_or(VideoError::MissingField("snippet.publishedAt"))?;

        let locale = text("/snippet/defaultAudioLanguage").unwrap_or_default();
        let (language, country) = parse_locale(&locale);
        let language_name = language
            .as_deref()
            .and_then(map_language)
            .unwrap_or(UNKNOWN)
            .to_string();

        let duration = match text("/contentDetails/duration") {
            Some(raw) => match parse_duration(&raw) {
                Ok(seconds) => Some(seconds),
                Err(e) => {
                    warn!(video_id = %video_id, raw = %raw, error = %e, "Unparseable duration");
                    None
                }
            },
            None => None,
        };

        Ok(Self {
            url: Self::watch_url(&video_id),
            upload_date: text("/recordingDetails/recordingDate").unwrap_or_default(),
            thumbnail_url: text("/snippet/thumbnails/default/url").unwrap_or_default(),
            channel_id: text("/snippet/channelId").unwrap_or_default(),
            channel_name: text("/snippet/channelTitle").unwrap_or_default(),
            view_count: count("/statistics/viewCount"),
            likes: count("/statistics/likeCount"),
            comments: count("/statistics/commentCount"),
            language_code: language.unwrap_or_else(|| UNKNOWN.to_string()),
            language_name,
            country: country.unwrap_or_default(),
            duration,
            video_id,
            title,
            published_at,
            ..Self::default()
        })
    }
}

impl fmt::Display for Video {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.duration {
            Some(d) => write!(f, "{} {} ({})", self.video_id, self.title, d),
            None => write!(f, "{} {}", self.video_id, self.title),
        }
    }
}

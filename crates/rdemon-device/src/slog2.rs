//! Parsing and filtering of `slog2info -w` output
//!
//! A line looks like
//!
//! ```text
//! Jan 15 10:23:45.123  my.app.testDev_app_xyz  MyBuffer  8900  message text
//! ```
//!
//! i.e. month, `day HH:MM:SS.mmm`, buffer-set name, optional buffer name,
//! numeric buffer id, message. The buffer name is optional so a message whose
//! first word is a number can be misread; messages are trimmed for the same
//! reason.

use std::sync::LazyLock;

use chrono::NaiveTime;
use regex::Regex;

/// slog2 buffer-set names are capped at 63 characters
pub const MAX_APPLICATION_ID_LEN: usize = 63;

/// Format passed to `date` on the device to record the launch time
pub const DATE_FORMAT_ARG: &str = "+%d %H:%M:%S";

static LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[a-zA-Z]+\s+([0-9]+ [0-9]+:[0-9]+:[0-9]+.[0-9]+)\s+(\S+)(\s+(\S+))?\s+([0-9]+)\s+(.*)?$",
    )
    .expect("Invalid slog2info line regex")
});

/// Day-of-month plus wall-clock time, the only date parts slog2info prints
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct LogTimestamp {
    pub day: u32,
    pub time: NaiveTime,
}

impl LogTimestamp {
    /// Parse `"dd HH:MM:SS"` or `"dd HH:MM:SS.mmm"`
    pub fn parse(s: &str) -> Option<Self> {
        let (day, time) = s.trim().split_once(' ')?;
        let day: u32 = day.parse().ok()?;
        let time = NaiveTime::parse_from_str(time.trim(), "%H:%M:%S%.f").ok()?;
        Some(Self { day, time })
    }
}

/// One parsed slog2info line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slog2Line<'a> {
    pub timestamp: &'a str,
    pub buffer_set: &'a str,
    pub buffer_name: Option<&'a str>,
    pub buffer_id: u32,
    pub message: &'a str,
}

impl<'a> Slog2Line<'a> {
    pub fn parse(line: &'a str) -> Option<Self> {
        let caps = LINE_RE.captures(line)?;
        Some(Self {
            timestamp: caps.get(1)?.as_str(),
            buffer_set: caps.get(2)?.as_str(),
            buffer_name: caps.get(4).map(|m| m.as_str()),
            buffer_id: caps.get(5)?.as_str().parse().ok()?,
            message: caps.get(6).map_or("", |m| m.as_str()),
        })
    }

    /// Platform chatter every application emits on the `default` buffer
    fn is_platform_noise(&self) -> bool {
        self.buffer_name == Some("default") && self.buffer_id == 8900
    }
}

/// Stateful filter selecting the lines that belong to one launch of one app
#[derive(Debug, Clone)]
pub struct Slog2Filter {
    application_id: String,
    launch_time: Option<LogTimestamp>,
    /// Set once the first line at or after the launch time has been seen
    current_logs: bool,
}

impl Slog2Filter {
    pub fn new(application_id: &str, launch_time: Option<LogTimestamp>) -> Self {
        Self {
            application_id: truncate_application_id(application_id),
            launch_time,
            current_logs: launch_time.is_none(),
        }
    }

    pub fn application_id(&self) -> &str {
        &self.application_id
    }

    /// Returns the trimmed message if `line` should be relayed.
    pub fn accept(&mut self, line: &str) -> Option<String> {
        let parsed = Slog2Line::parse(line)?;

        if !self.current_logs {
            let launch_time = self.launch_time?;
            let stamp = LogTimestamp::parse(parsed.timestamp)?;
            if stamp < launch_time {
                return None;
            }
            self.current_logs = true;
        }

        if !parsed.buffer_set.starts_with(&self.application_id) {
            return None;
        }
        if parsed.is_platform_noise() {
            return None;
        }

        Some(parsed.message.trim().to_string())
    }
}

/// Truncate on a character boundary to at most [`MAX_APPLICATION_ID_LEN`] bytes
fn truncate_application_id(id: &str) -> String {
    if id.len() <= MAX_APPLICATION_ID_LEN {
        return id.to_string();
    }
    let mut end = MAX_APPLICATION_ID_LEN;
    while !id.is_char_boundary(end) {
        end -= 1;
    }
    id[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const APP_LINE: &str = "Jan 15 10:23:45.123  demo.testDev_demo_a1b2  Main  7  hello world  ";

    #[test]
    fn test_parse_line_with_buffer_name() {
        let line = Slog2Line::parse(APP_LINE).unwrap();
        assert_eq!(line.timestamp, "15 10:23:45.123");
        assert_eq!(line.buffer_set, "demo.testDev_demo_a1b2");
        assert_eq!(line.buffer_name, Some("Main"));
        assert_eq!(line.buffer_id, 7);
        assert_eq!(line.message.trim(), "hello world");
    }

    #[test]
    fn test_parse_line_without_buffer_name() {
        let line = Slog2Line::parse("Jan 15 10:23:45.123 demo 8900 boot done").unwrap();
        assert_eq!(line.buffer_set, "demo");
        assert_eq!(line.buffer_name, None);
        assert_eq!(line.buffer_id, 8900);
        assert_eq!(line.message, "boot done");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Slog2Line::parse("").is_none());
        assert!(Slog2Line::parse("not a log line").is_none());
    }

    #[test]
    fn test_filter_by_application_prefix() {
        let mut filter = Slog2Filter::new("demo", None);
        assert_eq!(filter.accept(APP_LINE).as_deref(), Some("hello world"));
        assert_eq!(
            filter.accept("Jan 15 10:23:45.123 other.app Main 7 nope"),
            None
        );
    }

    #[test]
    fn test_filter_drops_default_buffer_noise() {
        let mut filter = Slog2Filter::new("demo", None);
        assert_eq!(
            filter.accept("Jan 15 10:23:45.123 demo default 8900 noise"),
            None
        );
        assert_eq!(
            filter
                .accept("Jan 15 10:23:45.123 demo default 8901 kept")
                .as_deref(),
            Some("kept")
        );
    }

    #[test]
    fn test_filter_skips_lines_before_launch() {
        let launch = LogTimestamp::parse("15 10:23:45").unwrap();
        let mut filter = Slog2Filter::new("demo", Some(launch));

        assert_eq!(filter.accept("Jan 15 10:23:44.999 demo Main 7 old"), None);
        assert_eq!(
            filter
                .accept("Jan 15 10:23:45.000 demo Main 7 new")
                .as_deref(),
            Some("new")
        );
        // Once current, older timestamps no longer matter
        assert_eq!(
            filter
                .accept("Jan 14 23:59:59.000 demo Main 7 late")
                .as_deref(),
            Some("late")
        );
    }

    #[test]
    fn test_application_id_truncated_to_63_chars() {
        let long_id = "a".repeat(80);
        let filter = Slog2Filter::new(&long_id, None);
        assert_eq!(filter.application_id().len(), MAX_APPLICATION_ID_LEN);
    }

    #[test]
    fn test_log_timestamp_parse() {
        let stamp = LogTimestamp::parse("05 08:09:10").unwrap();
        assert_eq!(stamp.day, 5);
        assert_eq!(stamp.time, NaiveTime::from_hms_opt(8, 9, 10).unwrap());

        let with_millis = LogTimestamp::parse("05 08:09:10.250").unwrap();
        assert!(with_millis > stamp);

        assert!(LogTimestamp::parse("garbage").is_none());
    }
}

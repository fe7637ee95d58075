//! Checklist text parser.
//!
//! Recognizes lines of the form `- [ ] Title [30 min]` or `- [ ] Title [1 hora]`
//! anywhere in the pasted text. Anything that does not match is skipped.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static TASK_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)- \[ \]\s+(.+?)\s+\[(\d+)\s*(hora|horas|min|minutos|h|m)\]")
        .expect("task line pattern is valid")
});

/// One recognized checklist entry. Transient: consumed by the schedule builder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedTaskLine {
    pub title: String,
    pub duration_minutes: u32,
}

/// Unit token of a bracketed duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DurationUnit {
    Hours,
    Minutes,
}

impl DurationUnit {
    fn from_token(token: &str) -> Option<Self> {
        match token.to_lowercase().as_str() {
            "hora" | "horas" | "h" => Some(DurationUnit::Hours),
            "min" | "minutos" | "m" => Some(DurationUnit::Minutes),
            _ => None,
        }
    }

    fn to_minutes(self, value: u32) -> Option<u32> {
        match self {
            DurationUnit::Hours => value.checked_mul(60),
            DurationUnit::Minutes => Some(value),
        }
    }
}

/// Parse free-form checklist text into ordered task lines.
///
/// Returns an empty vector when nothing matches; that is a normal outcome
/// the caller turns into a prompt, not an error. Duplicate titles stay as
/// separate entries and a zero duration is passed through unchanged.
pub fn parse_task_text(text: &str) -> Vec<ParsedTaskLine> {
    TASK_LINE
        .captures_iter(text)
        .filter_map(|caps| {
            let title = caps.get(1)?.as_str().trim();
            if title.is_empty() {
                return None;
            }
            let value: u32 = caps.get(2)?.as_str().parse().ok()?;
            let unit = DurationUnit::from_token(caps.get(3)?.as_str())?;
            Some(ParsedTaskLine {
                title: title.to_string(),
                duration_minutes: unit.to_minutes(value)?,
            })
        })
        .collect()
}

/// Render a line in canonical checklist form (`- [ ] Title [N min]`).
///
/// `parse_task_text(&format_task_line(l))` yields `l` back for any title
/// that itself contains no bracketed duration.
pub fn format_task_line(line: &ParsedTaskLine) -> String {
    format!("- [ ] {} [{} min]", line.title, line.duration_minutes)
}

/// Render a whole list, one line per entry.
pub fn format_task_text(lines: &[ParsedTaskLine]) -> String {
    lines
        .iter()
        .map(format_task_line)
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn line(title: &str, minutes: u32) -> ParsedTaskLine {
        ParsedTaskLine {
            title: title.to_string(),
            duration_minutes: minutes,
        }
    }

    #[test]
    fn parses_hours_and_minutes() {
        let parsed = parse_task_text("- [ ] Reunión [1 hora]\n- [ ] Llamada [30 min]");
        assert_eq!(parsed, vec![line("Reunión", 60), line("Llamada", 30)]);
    }

    #[test]
    fn unit_tokens_are_case_insensitive() {
        let text = "- [ ] A [2 HORAS]\n- [ ] B [2H]\n- [ ] C [45 Minutos]\n- [ ] D [5M]";
        let parsed = parse_task_text(text);
        let minutes: Vec<u32> = parsed.iter().map(|l| l.duration_minutes).collect();
        assert_eq!(minutes, vec![120, 120, 45, 5]);
    }

    #[test]
    fn space_between_number_and_unit_is_optional() {
        assert_eq!(parse_task_text("- [ ] Gym [1h]"), vec![line("Gym", 60)]);
    }

    #[test]
    fn non_matching_lines_are_skipped() {
        let text = "Plan for today\n- [ ] Write report [90 min]\n- [x] Done already [10 min]\n* [ ] Bullet [5 min]\n- [ ] No duration";
        assert_eq!(parse_task_text(text), vec![line("Write report", 90)]);
    }

    #[test]
    fn duplicate_titles_are_kept() {
        let parsed = parse_task_text("- [ ] Email [10 min]\n- [ ] Email [10 min]");
        assert_eq!(parsed.len(), 2);
    }

    #[test]
    fn zero_duration_passes_through() {
        assert_eq!(parse_task_text("- [ ] Marker [0 min]"), vec![line("Marker", 0)]);
    }

    #[test]
    fn empty_text_yields_nothing() {
        assert!(parse_task_text("").is_empty());
        assert!(parse_task_text("   \n\n").is_empty());
    }

    #[test]
    fn title_is_trimmed() {
        assert_eq!(
            parse_task_text("- [ ]    Padded title    [15 m]"),
            vec![line("Padded title", 15)]
        );
    }

    #[test]
    fn oversized_hour_value_is_skipped() {
        assert!(parse_task_text("- [ ] Forever [99999999999 h]").is_empty());
        assert!(parse_task_text("- [ ] Long [4294967295 h]").is_empty());
    }

    #[test]
    fn format_uses_minutes() {
        assert_eq!(format_task_line(&line("Gym", 60)), "- [ ] Gym [60 min]");
    }

    proptest! {
        #[test]
        fn parse_of_formatted_output_is_idempotent(
            entries in proptest::collection::vec(
                ("[A-Za-zñáé][A-Za-z0-9ñáé ]{0,20}[A-Za-z0-9]", 0u32..2000),
                0..12,
            )
        ) {
            let lines: Vec<ParsedTaskLine> = entries
                .into_iter()
                .map(|(title, minutes)| line(title.trim(), minutes))
                .collect();
            let text = format_task_text(&lines);
            let reparsed = parse_task_text(&text);
            prop_assert_eq!(&reparsed, &lines);
            prop_assert_eq!(parse_task_text(&format_task_text(&reparsed)), reparsed);
        }
    }
}

//! Splits generated text into narrative and recommendation sections.
//!
//! A line whose trimmed, lower-cased form starts with `narrative` or
//! `recommendation` switches the active section; the label line itself is
//! dropped. Lines before any label are ignored, blank lines are skipped, and
//! a repeated label keeps appending to the same section.

/// Recommendation used when the generated text has none
pub const DEFAULT_RECOMMENDATION: &str = "Review and act per fraud policy.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Preamble,
    Narrative,
    Recommendation,
}

impl Section {
    fn from_label(line: &str) -> Option<Section> {
        let lower = line.to_lowercase();
        if lower.starts_with("narrative") {
            Some(Section::Narrative)
        } else if lower.starts_with("recommendation") {
            Some(Section::Recommendation)
        } else {
            None
        }
    }
}

/// Narrative and recommendation extracted from generated text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSummary {
    pub narrative: String,
    pub recommendation: String,
}

/// Parse generated text.
///
/// An empty narrative falls back to the whole raw text; an empty
/// recommendation falls back to [`DEFAULT_RECOMMENDATION`].
pub fn parse_sections(text: &str) -> ParsedSummary {
    let mut state = Section::Preamble;
    let mut narrative: Vec<&str> = Vec::new();
    let mut recommendation: Vec<&str> = Vec::new();

    for line in text.lines() {
        let line = line.trim();
        if let Some(next) = Section::from_label(line) {
            state = next;
            continue;
        }
        if line.is_empty() {
            continue;
        }
        match state {
            Section::Preamble => {}
            Section::Narrative => narrative.push(line),
            Section::Recommendation => recommendation.push(line),
        }
    }

    let narrative = narrative.join(" ");
    let recommendation = recommendation.join(" ");

    ParsedSummary {
        narrative: if narrative.is_empty() {
            text.to_string()
        } else {
            narrative
        },
        recommendation: if recommendation.is_empty() {
            DEFAULT_RECOMMENDATION.to_string()
        } else {
            recommendation
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_sections() {
        let text = "Narrative:\nCustomer C1 made two large purchases.\nBoth used one device.\n\n\
                    Recommendation:\nFreeze the card.\n";
        let parsed = parse_sections(text);

        assert_eq!(
            parsed.narrative,
            "Customer C1 made two large purchases. Both used one device."
        );
        assert_eq!(parsed.recommendation, "Freeze the card.");
    }

    #[test]
    fn test_labels_are_case_insensitive_and_label_content_dropped() {
        let text = "  NARRATIVE - summary\nA.\nrecommendations follow\nB.";
        let parsed = parse_sections(text);

        assert_eq!(parsed.narrative, "A.");
        assert_eq!(parsed.recommendation, "B.");
    }

    #[test]
    fn test_no_labels_uses_raw_text() {
        let text = "Just one paragraph\nwith no labels.";
        let parsed = parse_sections(text);

        assert_eq!(parsed.narrative, text);
        assert_eq!(parsed.recommendation, DEFAULT_RECOMMENDATION);
    }

    #[test]
    fn test_preamble_is_ignored() {
        let text = "Here is the report.\nNarrative:\nX happened.";
        let parsed = parse_sections(text);

        assert_eq!(parsed.narrative, "X happened.");
        assert_eq!(parsed.recommendation, DEFAULT_RECOMMENDATION);
    }

    #[test]
    fn test_repeated_labels_append() {
        let text = "Narrative:\nFirst.\nRecommendation:\nAct.\n\
                    Narrative:\nSecond.\nRecommendation:\nAgain.";
        let parsed = parse_sections(text);

        assert_eq!(parsed.narrative, "First. Second.");
        assert_eq!(parsed.recommendation, "Act. Again.");
    }

    #[test]
    fn test_empty_text() {
        let parsed = parse_sections("");
        assert_eq!(parsed.narrative, "");
        assert_eq!(parsed.recommendation, DEFAULT_RECOMMENDATION);
    }
}

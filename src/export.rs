//! CSV rendering of records and calculation history.
//!
//! Every field is quoted and embedded quotes are doubled. Rows are joined
//! with `\n`; an empty collection renders as an empty string.

use crate::model::{Calculation, Record};

const RECORD_HEADERS: [&str; 6] = ["name", "email", "phone", "category", "note", "timestamp"];

const CALCULATION_HEADERS: [&str; 3] = ["expression", "result", "timestamp"];

/// Quotes `field`, doubling any embedded `"`.
#[must_use]
pub fn escape_field(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}

fn row<I, S>(fields: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    fields
        .into_iter()
        .map(|f| escape_field(f.as_ref()))
        .collect::<Vec<_>>()
        .join(",")
}

fn render<T>(headers: &[&str], items: &[T], fields: impl Fn(&T) -> Vec<String>) -> String {
    if items.is_empty() {
        return String::new();
    }
    std::iter::once(row(headers))
        .chain(items.iter().map(|item| row(fields(item))))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Renders records as CSV with a header row. Categories use their
/// display label.
#[must_use]
pub fn records_to_csv(records: &[Record]) -> String {
    render(&RECORD_HEADERS, records, |r| {
        vec![
            r.name.clone(),
            r.email.clone(),
            r.phone.clone().unwrap_or_default(),
            r.category.label().to_string(),
            r.note.clone().unwrap_or_default(),
            r.timestamp.to_rfc3339(),
        ]
    })
}

/// Renders calculation history as CSV with a header row.
#[must_use]
pub fn calculations_to_csv(calculations: &[Calculation]) -> String {
    render(&CALCULATION_HEADERS, calculations, |c| {
        vec![
            c.expression.clone(),
            c.result.to_string(),
            c.timestamp.to_rfc3339(),
        ]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Category, RecordInput};
    use chrono::DateTime;

    #[test]
    fn escapes_quotes() {
        assert_eq!(escape_field("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(escape_field(""), "\"\"");
    }

    #[test]
    fn empty_input_is_empty_string() {
        assert_eq!(records_to_csv(&[]), "");
        assert_eq!(calculations_to_csv(&[]), "");
    }

    #[test]
    fn records_render_header_and_rows() {
        let now = DateTime::from_timestamp(0, 0).unwrap();
        let record = Record::from_input(
            "1".into(),
            RecordInput::new("A, \"B\"", "a@x.com").with_category(Category::Work),
            now,
        );
        let csv = records_to_csv(&[record]);
        let lines: Vec<_> = csv.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[0],
            "\"name\",\"email\",\"phone\",\"category\",\"note\",\"timestamp\""
        );
        assert_eq!(
            lines[1],
            format!(
                "\"A, \"\"B\"\"\",\"a@x.com\",\"\",\"{}\",\"\",\"1970-01-01T00:00:00+00:00\"",
                Category::Work.label()
            )
        );
        assert!(!csv.ends_with('\n'));
    }

    #[test]
    fn calculations_render_rows() {
        let calc = Calculation {
            id: "7".into(),
            expression: "1000 × 2".into(),
            result: 2000.0,
            timestamp: DateTime::from_timestamp(0, 0).unwrap(),
        };
        let csv = calculations_to_csv(&[calc]);
        assert_eq!(
            csv.lines().nth(1),
            Some("\"1000 × 2\",\"2000\",\"1970-01-01T00:00:00+00:00\"")
        );
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn escaped_field_is_quoted_with_even_quotes(s in ".*") {
                let escaped = escape_field(&s);
                prop_assert!(escaped.starts_with('"') && escaped.ends_with('"'));
                let inner = &escaped[1..escaped.len() - 1];
                prop_assert_eq!(inner.replace("\"\"", "\""), s.clone());
                prop_assert_eq!(inner.matches('"').count(), 2 * s.matches('"').count());
            }
        }
    }
}

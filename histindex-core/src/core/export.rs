//! Search result export as CSV or JSON reports.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;
use std::str::FromStr;

use crate::core::quote::Quote;

/// Version of the report layout written by [`export_quotes`].
pub const REPORT_VERSION: u32 = 1;

/// Version of the crate that wrote a report.
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Errors specific to export operations.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid export format: {0}")]
    InvalidFormat(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<crate::HistIndexError> for ExportError {
    fn from(err: crate::HistIndexError) -> Self {
        Self::Database(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Csv,
    Json,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ExportFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            other => Err(ExportError::InvalidFormat(other.to_string())),
        }
    }
}

/// The search criteria of a report, resolved to display names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchSummary {
    pub text: Option<String>,
    pub keywords: Vec<String>,
    pub authors: Vec<String>,
    pub books: Vec<String>,
    pub sources: Vec<String>,
}

impl SearchSummary {
    /// `*` when the search had no text filter.
    pub fn text_display(&self) -> &str {
        self.text.as_deref().unwrap_or("*")
    }

    /// `(label, value)` lines of the report's search information block.
    pub fn lines(&self) -> Vec<(&'static str, String)> {
        vec![
            ("Text", self.text_display().to_string()),
            ("Keywords", list_display(&self.keywords)),
            ("Authors", list_display(&self.authors)),
            ("Books", list_display(&self.books)),
            ("Sources", list_display(&self.sources)),
        ]
    }
}

fn list_display(items: &[String]) -> String {
    if items.is_empty() {
        "Any".to_string()
    } else {
        items.join("; ")
    }
}

/// Report metadata that does not come from the quotes themselves.
#[derive(Debug, Clone)]
pub struct ExportContext {
    pub database: String,
    pub summary: SearchSummary,
    pub generated_at: DateTime<Local>,
}

impl ExportContext {
    pub fn new(database: impl Into<String>, summary: SearchSummary) -> Self {
        Self {
            database: database.into(),
            summary,
            generated_at: Local::now(),
        }
    }
}

/// One quote as it appears in a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedQuote {
    pub id: i64,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub page: String,
    pub keywords: Vec<String>,
}

impl ExportedQuote {
    pub fn from_quote(quote: &Quote) -> Self {
        Self {
            id: quote.id,
            text: quote.text.clone(),
            comment: quote.comment_text().map(str::to_string),
            page: quote.page.trim().to_string(),
            keywords: quote.keywords.iter().map(|k| k.name.clone()).collect(),
        }
    }

    /// The text, followed by `[comment]` when there is one.
    pub fn text_cell(&self) -> String {
        match &self.comment {
            Some(comment) => format!("{} [{}]", self.text, comment),
            None => self.text.clone(),
        }
    }

    pub fn page_cell(&self) -> &str {
        if self.page.is_empty() {
            "Undefined"
        } else {
            &self.page
        }
    }

    pub fn keywords_cell(&self) -> String {
        if self.keywords.is_empty() {
            "None".to_string()
        } else {
            self.keywords.join(", ")
        }
    }
}

/// A run of consecutive quotes from the same book or source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteGroup {
    #[serde(rename = "where")]
    pub where_description: String,
    pub quotes: Vec<ExportedQuote>,
}

/// Splits `quotes` into runs sharing the same book and source. The input is
/// expected in display order, so each origin normally forms one group.
pub fn group_quotes(quotes: &[Quote]) -> Vec<QuoteGroup> {
    let mut groups: Vec<QuoteGroup> = Vec::new();
    let mut current: Option<(Option<i64>, Option<i64>)> = None;

    for quote in quotes {
        let origin = (quote.book_id(), quote.source_id());
        match groups.last_mut() {
            Some(group) if current == Some(origin) => {
                group.quotes.push(ExportedQuote::from_quote(quote));
            }
            _ => {
                groups.push(QuoteGroup {
                    where_description: quote.where_description(),
                    quotes: vec![ExportedQuote::from_quote(quote)],
                });
                current = Some(origin);
            }
        }
    }
    groups
}

/// Top-level structure of a JSON report.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteReport {
    pub version: u32,
    pub app_version: String,
    pub generated_at: String,
    pub database: String,
    pub search: SearchSummary,
    pub groups: Vec<QuoteGroup>,
}

impl QuoteReport {
    pub fn new(context: &ExportContext, quotes: &[Quote]) -> Self {
        Self {
            version: REPORT_VERSION,
            app_version: APP_VERSION.to_string(),
            generated_at: context.generated_at.to_rfc3339(),
            database: context.database.clone(),
            search: context.summary.clone(),
            groups: group_quotes(quotes),
        }
    }

    pub fn quote_count(&self) -> usize {
        self.groups.iter().map(|g| g.quotes.len()).sum()
    }
}

/// Writes `quotes` (already in display order) as a report in `format`.
pub fn export_quotes<W: Write>(
    mut writer: W,
    context: &ExportContext,
    quotes: &[Quote],
    format: ExportFormat,
) -> Result<(), ExportError> {
    let report = QuoteReport::new(context, quotes);
    log::debug!(
        "exporting {} quote(s) in {} group(s) as {format}",
        report.quote_count(),
        report.groups.len()
    );
    match format {
        ExportFormat::Csv => write_csv(&mut writer, &report)?,
        ExportFormat::Json => {
            serde_json::to_writer_pretty(&mut writer, &report)?;
            writeln!(writer)?;
        }
    }
    writer.flush()?;
    Ok(())
}

fn write_csv<W: Write>(writer: &mut W, report: &QuoteReport) -> std::io::Result<()> {
    write_record(writer, &["HistIndex", &report.app_version])?;
    write_record(writer, &["Generated", &report.generated_at])?;
    writeln!(writer)?;

    for (label, value) in report.search.lines() {
        write_record(writer, &[label, &value])?;
    }
    write_record(writer, &["Database", &report.database])?;

    for group in &report.groups {
        writeln!(writer)?;
        write_record(writer, &[&group.where_description])?;
        write_record(writer, &["Text", "Page(s)", "Keyword(s)"])?;
        for quote in &group.quotes {
            write_record(
                writer,
                &[&quote.text_cell(), quote.page_cell(), &quote.keywords_cell()],
            )?;
        }
    }
    Ok(())
}

fn write_record<W: Write>(writer: &mut W, fields: &[&str]) -> std::io::Result<()> {
    let line = fields
        .iter()
        .map(|field| csv_field(field))
        .collect::<Vec<_>>()
        .join(",");
    writeln!(writer, "{line}")
}

/// Quotes a field when it holds a separator, a quote or a line break.
fn csv_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Book, Keyword, Source};
    use chrono::TimeZone;

    fn context() -> ExportContext {
        ExportContext {
            database: "thesis.db".to_string(),
            summary: SearchSummary {
                keywords: vec!["Famine".to_string(), "War".to_string()],
                ..SearchSummary::default()
            },
            generated_at: Local.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap(),
        }
    }

    fn book(id: i64, title: &str) -> Book {
        let mut book = Book::new(title);
        book.id = id;
        book
    }

    fn quote(id: i64, text: &str, book: Option<&Book>, source: Option<&Source>) -> Quote {
        let mut quote = Quote::new(text);
        quote.id = id;
        quote.set_book(book.cloned());
        quote.set_source(source.cloned());
        quote
    }

    #[test]
    fn test_format_from_str() {
        assert_eq!("csv".parse::<ExportFormat>().unwrap(), ExportFormat::Csv);
        assert_eq!(" JSON ".parse::<ExportFormat>().unwrap(), ExportFormat::Json);
        assert!(matches!(
            "pdf".parse::<ExportFormat>(),
            Err(ExportError::InvalidFormat(f)) if f == "pdf"
        ));
    }

    #[test]
    fn test_csv_field_quoting() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a, b"), "\"a, b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(csv_field("two\nlines"), "\"two\nlines\"");
    }

    #[test]
    fn test_summary_lines() {
        let lines = context().summary.lines();
        assert_eq!(lines[0], ("Text", "*".to_string()));
        assert_eq!(lines[1], ("Keywords", "Famine; War".to_string()));
        assert_eq!(lines[2], ("Authors", "Any".to_string()));
    }

    #[test]
    fn test_cells() {
        let mut q = quote(1, "bread riots", None, None);
        q.keywords = vec![Keyword::new("Famine"), Keyword::new("Grain")];
        q.comment = Some("  ".to_string());
        let exported = ExportedQuote::from_quote(&q);
        assert_eq!(exported.text_cell(), "bread riots");
        assert_eq!(exported.page_cell(), "Undefined");
        assert_eq!(exported.keywords_cell(), "Famine, Grain");

        q.comment = Some("see note".to_string());
        q.page = "12".to_string();
        q.keywords.clear();
        let exported = ExportedQuote::from_quote(&q);
        assert_eq!(exported.text_cell(), "bread riots [see note]");
        assert_eq!(exported.page_cell(), "12");
        assert_eq!(exported.keywords_cell(), "None");
    }

    #[test]
    fn test_group_quotes_by_consecutive_origin() {
        let annales = book(1, "Annales");
        let mut register = Source::new("Parish register");
        register.id = 4;

        let quotes = vec![
            quote(1, "a", Some(&annales), None),
            quote(2, "b", Some(&annales), None),
            quote(3, "c", None, Some(&register)),
        ];
        let groups = group_quotes(&quotes);

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].where_description, ". Annales");
        assert_eq!(groups[0].quotes.len(), 2);
        assert_eq!(groups[1].where_description, "Parish register");
        assert!(group_quotes(&[]).is_empty());
    }

    #[test]
    fn test_export_csv() {
        let annales = book(1, "Annales");
        let mut q = quote(7, "bread, and \"salt\"", Some(&annales), None);
        q.page = "3".to_string();

        let mut out = Vec::new();
        export_quotes(&mut out, &context(), &[q], ExportFormat::Csv).unwrap();
        let csv = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(lines[0], format!("HistIndex,{APP_VERSION}"));
        assert!(lines[1].starts_with("Generated,2024-03-01T09:30:00"));
        assert_eq!(lines[2], "");
        assert_eq!(lines[3], "Text,*");
        assert_eq!(lines[4], "Keywords,Famine; War");
        assert_eq!(lines[8], "Database,thesis.db");
        assert_eq!(lines[9], "");
        assert_eq!(lines[10], ". Annales");
        assert_eq!(lines[11], "Text,Page(s),Keyword(s)");
        assert_eq!(lines[12], "\"bread, and \"\"salt\"\"\",3,None");
        assert_eq!(lines.len(), 13);
    }

    #[test]
    fn test_export_json() {
        let annales = book(1, "Annales");
        let q = quote(7, "bread riots", Some(&annales), None);

        let mut out = Vec::new();
        export_quotes(&mut out, &context(), &[q], ExportFormat::Json).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&out).unwrap();

        assert_eq!(json["version"], REPORT_VERSION);
        assert_eq!(json["database"], "thesis.db");
        assert_eq!(json["search"]["keywords"][1], "War");
        assert_eq!(json["groups"][0]["where"], ". Annales");
        assert_eq!(json["groups"][0]["quotes"][0]["id"], 7);
        assert_eq!(json["groups"][0]["quotes"][0]["text"], "bread riots");
        assert!(json["groups"][0]["quotes"][0].get("comment").is_none());
    }
}

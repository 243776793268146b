use crate::error::{AnalyticsError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

const MONTH_LABELS: [&str; 12] = [
    "Jan (01)", "Fev (02)", "Mar (03)", "Abr (04)", "Mai (05)", "Jun (06)", "Jul (07)",
    "Ago (08)", "Set (09)", "Out (10)", "Nov (11)", "Dez (12)",
];

const DATE_FORMATS: [&str; 5] = ["%Y-%m-%d", "%d/%m/%Y", "%Y-%m-%d %H:%M:%S", "%d/%m/%Y %H:%M:%S", "%d-%m-%Y"];

pub fn validate_fiscal_year_end_month(month: u32) -> Result<()> {
    if !(1..=12).contains(&month) {
        return Err(AnalyticsError::InvalidFiscalYearEndMonth(month));
    }
    Ok(())
}

/// Returns the 0-based index of the month within the fiscal year.
///
/// # Examples
/// - If FY ends in Dec (12): Jan=0, Feb=1, ..., Dec=11
/// - If FY ends in June (6): July=0, Aug=1, ..., June=11
pub fn get_fiscal_month_index(calendar_month: u32, fiscal_year_end_month: u32) -> usize {
    let fy_start_month = if fiscal_year_end_month == 12 {
        1
    } else {
        fiscal_year_end_month + 1
    };

    if calendar_month >= fy_start_month {
        (calendar_month - fy_start_month) as usize
    } else {
        (calendar_month + 12 - fy_start_month) as usize
    }
}

/// 1-based position of a calendar month in the fiscal year (July = 1 when the
/// fiscal year ends in June).
pub fn fiscal_month_order(calendar_month: u32, fiscal_year_end_month: u32) -> u32 {
    get_fiscal_month_index(calendar_month, fiscal_year_end_month) as u32 + 1
}

/// Calendar months in fiscal order.
pub fn fiscal_months(fiscal_year_end_month: u32) -> Vec<u32> {
    let mut months: Vec<u32> = (1..=12).collect();
    months.sort_by_key(|m| get_fiscal_month_index(*m, fiscal_year_end_month));
    months
}

pub fn month_label(calendar_month: u32) -> &'static str {
    match calendar_month {
        1..=12 => MONTH_LABELS[(calendar_month - 1) as usize],
        _ => "",
    }
}

pub fn season_label(season: u32) -> String {
    format!("Temporada {}", season)
}

pub fn season_short_label(season: u32) -> String {
    format!("T{}", season)
}

/// The two highest valid seasons of a selection as `(current, previous)`.
pub fn last_two_seasons(seasons: &[u32]) -> Option<(u32, u32)> {
    let mut ordered: Vec<u32> = seasons.iter().copied().filter(|s| *s > 0).collect();
    ordered.sort_unstable();
    ordered.dedup();

    match ordered.as_slice() {
        [.., previous, current] => Some((*current, *previous)),
        _ => None,
    }
}

pub fn digits_only(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Cleans a spreadsheet point value: keeps digits, commas and dots, turns
/// commas into dots and parses. Anything unparseable is worth zero.
pub fn clean_points(raw: &str) -> f64 {
    let kept: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == ',' || *c == '.')
        .map(|c| if c == ',' { '.' } else { c })
        .collect();

    kept.parse::<f64>().unwrap_or(0.0)
}

/// Coerces a season cell to a number; invalid cells become season 0.
pub fn parse_season(raw: &str) -> u32 {
    let trimmed = raw.trim();
    if let Ok(n) = trimmed.parse::<u32>() {
        return n;
    }
    match trimmed.parse::<f64>() {
        Ok(f) if f.is_finite() && f >= 0.0 && f.fract() == 0.0 => f as u32,
        _ => 0,
    }
}

pub fn parse_sale_date(raw: &str) -> Result<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AnalyticsError::DateError("Empty sale date".to_string()));
    }

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return Ok(date);
        }
        if let Ok(datetime) = chrono::NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(datetime.date());
        }
    }

    Err(AnalyticsError::DateError(format!(
        "Invalid sale date '{}'. Expected YYYY-MM-DD or DD/MM/YYYY",
        trimmed
    )))
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DocumentKind {
    Cpf,
    Cnpj,
}

/// Digit-length heuristic: 14+ digits is a company (CNPJ), 10-13 a person
/// (CPF). Shorter documents are not classified.
pub fn classify_document(raw: &str) -> Option<DocumentKind> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !matches!(c, '.' | '-' | '/' | ' '))
        .collect();

    match cleaned.chars().count() {
        n if n >= 14 => Some(DocumentKind::Cnpj),
        n if n >= 10 => Some(DocumentKind::Cpf),
        _ => None,
    }
}

/// Splits raw documents into `(cpfs, cnpjs)`, dropping blanks and documents
/// too short to classify. Original spelling is preserved.
pub fn separate_documents<'a, I>(documents: I) -> (Vec<String>, Vec<String>)
where
    I: IntoIterator<Item = &'a str>,
{
    let mut cpfs = Vec::new();
    let mut cnpjs = Vec::new();

    for doc in documents {
        if doc.trim().is_empty() || doc == "nan" {
            continue;
        }
        match classify_document(doc) {
            Some(DocumentKind::Cnpj) => cnpjs.push(doc.to_string()),
            Some(DocumentKind::Cpf) => cpfs.push(doc.to_string()),
            None => {}
        }
    }

    (cpfs, cnpjs)
}

/// Masks an 11-digit CPF or 14-digit CNPJ. Anything else is returned as is.
pub fn format_document(raw: &str) -> String {
    let doc: String = raw
        .chars()
        .filter(|c| !matches!(c, '.' | '-' | '/' | ' '))
        .collect();

    if doc.is_empty() || !doc.chars().all(|c| c.is_ascii_digit()) {
        return raw.to_string();
    }

    match doc.len() {
        11 => format!("{}.{}.{}-{}", &doc[..3], &doc[3..6], &doc[6..9], &doc[9..]),
        14 => format!(
            "{}.{}.{}/{}-{}",
            &doc[..2],
            &doc[2..5],
            &doc[5..8],
            &doc[8..12],
            &doc[12..]
        ),
        _ => doc,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fiscal_month_index() {
        assert_eq!(get_fiscal_month_index(1, 12), 0);
        assert_eq!(get_fiscal_month_index(12, 12), 11);

        // June year end (FY starts July)
        assert_eq!(get_fiscal_month_index(7, 6), 0);
        assert_eq!(get_fiscal_month_index(12, 6), 5);
        assert_eq!(get_fiscal_month_index(1, 6), 6);
        assert_eq!(get_fiscal_month_index(6, 6), 11);
    }

    #[test]
    fn test_fiscal_month_order_matches_program_calendar() {
        assert_eq!(fiscal_month_order(7, 6), 1);
        assert_eq!(fiscal_month_order(1, 6), 7);
        assert_eq!(fiscal_month_order(6, 6), 12);
        assert_eq!(fiscal_months(6), vec![7, 8, 9, 10, 11, 12, 1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_validate_fiscal_year_end_month() {
        assert!(validate_fiscal_year_end_month(6).is_ok());
        assert!(validate_fiscal_year_end_month(0).is_err());
        assert!(validate_fiscal_year_end_month(13).is_err());
    }

    #[test]
    fn test_labels() {
        assert_eq!(month_label(3), "Mar (03)");
        assert_eq!(month_label(13), "");
        assert_eq!(season_label(10), "Temporada 10");
        assert_eq!(season_short_label(10), "T10");
    }

    #[test]
    fn test_last_two_seasons() {
        assert_eq!(last_two_seasons(&[8, 10, 9]), Some((10, 9)));
        assert_eq!(last_two_seasons(&[10, 10]), None);
        assert_eq!(last_two_seasons(&[0, 3]), None);
        assert_eq!(last_two_seasons(&[]), None);
    }

    #[test]
    fn test_clean_points() {
        assert_eq!(clean_points("1500"), 1500.0);
        assert_eq!(clean_points("R$ 1500,5"), 1500.5);
        assert_eq!(clean_points("-200"), 200.0);
        assert_eq!(clean_points("abc"), 0.0);
        assert_eq!(clean_points(""), 0.0);
    }

    #[test]
    fn test_parse_season() {
        assert_eq!(parse_season("9"), 9);
        assert_eq!(parse_season(" 10.0 "), 10);
        assert_eq!(parse_season("Temporada 9"), 0);
        assert_eq!(parse_season(""), 0);
    }

    #[test]
    fn test_parse_sale_date() {
        let expected = NaiveDate::from_ymd_opt(2024, 7, 15).unwrap();
        assert_eq!(parse_sale_date("2024-07-15").unwrap(), expected);
        assert_eq!(parse_sale_date("15/07/2024").unwrap(), expected);
        assert_eq!(parse_sale_date("2024-07-15 10:30:00").unwrap(), expected);
        assert!(parse_sale_date("").is_err());
        assert!(parse_sale_date("not a date").is_err());
    }

    #[test]
    fn test_separate_documents() {
        let docs = [
            "123.456.789-01",
            "12.345.678/0001-90",
            "12345",
            "",
            "nan",
        ];
        let (cpfs, cnpjs) = separate_documents(docs.iter().copied());
        assert_eq!(cpfs, vec!["123.456.789-01".to_string()]);
        assert_eq!(cnpjs, vec!["12.345.678/0001-90".to_string()]);
    }

    #[test]
    fn test_format_document() {
        assert_eq!(format_document("12345678901"), "123.456.789-01");
        assert_eq!(format_document("12345678000190"), "12.345.678/0001-90");
        assert_eq!(format_document("12345"), "12345");
        assert_eq!(format_document("ABC"), "ABC");
    }
}

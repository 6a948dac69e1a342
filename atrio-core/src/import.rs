//! Contact import for mass messaging
//!
//! Accepts the spreadsheets brokers actually export: delimiter is sniffed
//! (`;` from pt-BR Excel, `,` otherwise), headers are matched against
//! case-insensitive synonyms, blank and empty rows are skipped, and bad rows
//! are accumulated as errors instead of aborting the batch.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub nome: String,
    pub telefone: String,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowError {
    /// 1-based line in the uploaded file (header is line 1).
    pub line: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImportReport {
    pub contacts: Vec<Contact>,
    pub errors: Vec<RowError>,
}

const NAME_HEADERS: &[&str] = &["nome", "name", "cliente"];
const PHONE_HEADERS: &[&str] = &["telefone", "phone", "celular", "fone", "whatsapp"];
const EMAIL_HEADERS: &[&str] = &["email", "e-mail", "mail"];

/// `;` wins when the header line has at least as many semicolons as commas
/// (pt-BR Excel exports use `;` and keep `,` inside values).
pub fn detect_delimiter(input: &str) -> u8 {
    let header = input.lines().next().unwrap_or("");
    let semicolons = header.matches(';').count();
    let commas = header.matches(',').count();
    if semicolons >= commas && semicolons > 0 {
        b';'
    } else {
        b','
    }
}

pub fn parse_contacts(input: &str) -> ImportReport {
    let mut report = ImportReport::default();

    let delimiter = detect_delimiter(input);
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(input.as_bytes());

    let headers = match reader.headers() {
        Ok(h) => h.clone(),
        Err(e) => {
            report.errors.push(RowError {
                line: 1,
                reason: format!("unreadable header: {}", e),
            });
            return report;
        }
    };

    let name_col = find_column(&headers, NAME_HEADERS);
    let phone_col = find_column(&headers, PHONE_HEADERS);
    let email_col = find_column(&headers, EMAIL_HEADERS);

    if name_col.is_none() && phone_col.is_none() {
        report.errors.push(RowError {
            line: 1,
            reason: "no recognizable name or phone column in header".to_string(),
        });
        return report;
    }

    for (index, record) in reader.records().enumerate() {
        let line = index + 2;
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                report.errors.push(RowError {
                    line,
                    reason: format!("unparseable row: {}", e),
                });
                continue;
            }
        };

        let nome = cell(&record, name_col);
        let telefone_raw = cell(&record, phone_col);
        let email = cell(&record, email_col);

        // A fully empty row is noise from the spreadsheet, not an error.
        if nome.is_empty() && telefone_raw.is_empty() && email.is_empty() {
            continue;
        }

        if nome.is_empty() {
            report.errors.push(RowError {
                line,
                reason: "missing nome".to_string(),
            });
            continue;
        }

        let telefone = normalize_phone(&telefone_raw);
        let Some(telefone) = telefone else {
            report.errors.push(RowError {
                line,
                reason: if telefone_raw.is_empty() {
                    "missing telefone".to_string()
                } else {
                    format!("invalid telefone: {}", telefone_raw)
                },
            });
            continue;
        };

        report.contacts.push(Contact {
            nome,
            telefone,
            email: if email.is_empty() { None } else { Some(email) },
        });
    }

    report
}

/// Header + example row for the downloadable template.
pub fn contact_template_csv() -> String {
    "Nome;Telefone;Email\nMaria Silva;+55 11 99999-0000;maria@example.com\n".to_string()
}

fn find_column(headers: &csv::StringRecord, synonyms: &[&str]) -> Option<usize> {
    headers.iter().position(|h| {
        let h = h.trim().to_lowercase();
        synonyms.contains(&h.as_str())
    })
}

fn cell(record: &csv::StringRecord, column: Option<usize>) -> String {
    column
        .and_then(|i| record.get(i))
        .unwrap_or("")
        .trim()
        .to_string()
}

/// Keep an optional leading `+` and the digits; reject anything with fewer
/// than 8 digits.
fn normalize_phone(raw: &str) -> Option<String> {
    static NON_DIGITS: OnceLock<Regex> = OnceLock::new();
    let re = NON_DIGITS.get_or_init(|| Regex::new(r"[^0-9]").expect("static regex"));

    if raw.is_empty() {
        return None;
    }
    let digits = re.replace_all(raw, "");
    if digits.len() < 8 {
        return None;
    }
    let prefix = if raw.trim_start().starts_with('+') { "+" } else { "" };
    Some(format!("{}{}", prefix, digits))
}

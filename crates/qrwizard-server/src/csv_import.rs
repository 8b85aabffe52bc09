//! CSV ingest parsing: delimiter sniffing and header inference.
//!
//! The `csv` crate has no dialect sniffer, so detection is done by scoring
//! candidate delimiters over the leading lines before handing the content to
//! `csv::ReaderBuilder`.

use std::collections::HashMap;

use qrwizard_core::tracking::valid_http_url;

/// Candidate delimiters, in preference order.
const CANDIDATE_DELIMITERS: [u8; 4] = [b';', b',', b'|', b'\t'];

/// Lines inspected when sniffing.
const SNIFF_LINES: usize = 10;

#[derive(Debug)]
pub struct CsvRows {
    pub has_header: bool,
    pub delimiter: u8,
    /// `(1-based line number, lowercased column → raw value)` per data row.
    pub rows: Vec<(usize, HashMap<String, String>)>,
}

/// Parse uploaded CSV content into per-row field maps.
///
/// Header presence is inferred, but forced true when the first line contains
/// `destination_url` or `url`. Without a header the first column is taken as
/// the destination. Blank lines are skipped.
pub fn parse_csv(content: &str) -> Result<CsvRows, String> {
    if content.trim().is_empty() {
        return Err("CSV file is empty".to_string());
    }
    // Strip a UTF-8 BOM if the upload carries one.
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);

    let delimiter = sniff_delimiter(content);
    let has_header = infer_header(content, delimiter);

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());

    let mut records = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| format!("Failed to parse CSV: {e}"))?;
        records.push(record);
    }

    let mut rows = Vec::new();
    if has_header {
        let Some(header_record) = records.first() else {
            return Err("CSV file is empty".to_string());
        };
        let headers: Vec<String> = header_record
            .iter()
            .map(|h| h.trim().to_lowercase())
            .collect();
        for (i, record) in records.iter().enumerate().skip(1) {
            if record.iter().all(|f| f.trim().is_empty()) {
                continue;
            }
            let mut map = HashMap::new();
            for (key, value) in headers.iter().zip(record.iter()) {
                if !key.is_empty() {
                    map.insert(key.clone(), value.to_string());
                }
            }
            rows.push((i + 1, map));
        }
    } else {
        for (i, record) in records.iter().enumerate() {
            let Some(first) = record.get(0) else { continue };
            if record.iter().all(|f| f.trim().is_empty()) {
                continue;
            }
            let mut map = HashMap::new();
            map.insert("destination_url".to_string(), first.to_string());
            rows.push((i + 1, map));
        }
    }

    Ok(CsvRows {
        has_header,
        delimiter,
        rows,
    })
}

/// Pick the delimiter whose per-line count is consistent and highest over
/// the leading lines. Falls back to comma for single-column content.
fn sniff_delimiter(content: &str) -> u8 {
    let lines: Vec<&str> = content
        .lines()
        .filter(|l| !l.trim().is_empty())
        .take(SNIFF_LINES)
        .collect();
    if lines.is_empty() {
        return b',';
    }

    let mut best: Option<(u8, usize)> = None;
    for &candidate in &CANDIDATE_DELIMITERS {
        let counts: Vec<usize> = lines
            .iter()
            .map(|l| l.bytes().filter(|&b| b == candidate).count())
            .collect();
        let first = counts[0];
        if first == 0 || counts.iter().any(|&c| c != first) {
            continue;
        }
        match best {
            Some((_, count)) if count >= first => {}
            _ => best = Some((candidate, first)),
        }
    }
    best.map(|(d, _)| d).unwrap_or(b',')
}

/// Header inference. The keyword rule wins outright; otherwise a first line
/// whose first field is already a URL cannot be a header.
fn infer_header(content: &str, delimiter: u8) -> bool {
    let mut lines = content.lines().filter(|l| !l.trim().is_empty());
    let Some(first_line) = lines.next() else {
        return false;
    };
    let lowered = first_line.to_lowercase();
    if lowered.contains("destination_url") || lowered.contains("url") {
        return true;
    }

    let delim_char = delimiter as char;
    let first_field = first_line.split(delim_char).next().unwrap_or("").trim();
    if valid_http_url(first_field) {
        return false;
    }
    // A non-URL first field followed by URL rows reads as a header.
    lines.any(|line| {
        let field = line.split(delim_char).next().unwrap_or("").trim();
        valid_http_url(field)
    })
}

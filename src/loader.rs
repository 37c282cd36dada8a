//! Dataset loading from delimited text or spreadsheet workbooks.
//!
//! Civic open-data exports mix `,` and `;` separators, carry stray encodings
//! and the occasional row with the wrong number of fields. The loader sniffs
//! the delimiter, decodes lossily and skips bad rows instead of failing.
//! Local `.xlsx`/`.xls`/`.ods` files are read from their first sheet.

use crate::error::DataLoadError;
use crate::models::{normalize_city_key, ColumnMapping, PropertyRecord, ServiceRecord};
use calamine::{open_workbook_auto, Data, Reader};
use csv::{ReaderBuilder, StringRecord};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DELIMITER_CANDIDATES: [u8; 4] = [b',', b';', b'\t', b'|'];
const SNIFF_LINES: usize = 10;
const SPREADSHEET_EXTENSIONS: [&str; 5] = ["xlsx", "xlsm", "xlsb", "xls", "ods"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceSpec {
    Url(String),
    Path(PathBuf),
}

impl SourceSpec {
    pub fn parse(source: &str) -> Self {
        let trimmed = source.trim();
        let lower = trimmed.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            SourceSpec::Url(trimmed.to_string())
        } else {
            SourceSpec::Path(PathBuf::from(trimmed))
        }
    }

    pub fn describe(&self) -> String {
        match self {
            SourceSpec::Url(url) => url.clone(),
            SourceSpec::Path(path) => path.display().to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelimiterMode {
    Auto,
    Fixed(u8),
}

impl DelimiterMode {
    /// `"auto"` (any case) or a single ASCII character; `"\t"` and `"tab"` mean tab.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            v if v.eq_ignore_ascii_case("auto") => Some(DelimiterMode::Auto),
            "\\t" | "tab" | "\t" => Some(DelimiterMode::Fixed(b'\t')),
            v if v.len() == 1 && v.is_ascii() => Some(DelimiterMode::Fixed(v.as_bytes()[0])),
            _ => None,
        }
    }
}

/// A row dropped during parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedRow {
    pub line: u64,
    pub reason: String,
}

/// Uniform tabular view over either dataset.
#[derive(Debug, Clone)]
pub struct Table {
    pub origin: String,
    /// `None` for spreadsheet sources
    pub delimiter: Option<u8>,
    pub headers: Vec<String>,
    pub rows: Vec<StringRecord>,
    pub skipped: Vec<MalformedRow>,
}

impl Table {
    /// Header lookup, ignoring case and surrounding whitespace.
    pub fn column(&self, name: &str) -> Option<usize> {
        let wanted = name.trim().to_lowercase();
        self.headers.iter().position(|header| header.to_lowercase() == wanted)
    }

    pub fn require_column(&self, name: &str) -> Result<usize, DataLoadError> {
        self.column(name).ok_or_else(|| DataLoadError::MissingColumn {
            column: name.to_string(),
            origin: self.origin.clone(),
        })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

fn cell(row: &StringRecord, index: Option<usize>) -> &str {
    index.and_then(|i| row.get(i)).map(str::trim).unwrap_or("")
}

fn optional_cell(row: &StringRecord, index: Option<usize>) -> Option<String> {
    Some(cell(row, index)).filter(|value| !value.is_empty()).map(str::to_string)
}

pub struct DatasetLoader {
    client: reqwest::Client,
    timeout: Duration,
}

impl Default for DatasetLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl DatasetLoader {
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(30))
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout,
        }
    }

    pub async fn load(&self, source: &SourceSpec, mode: DelimiterMode) -> Result<Table, DataLoadError> {
        match source {
            SourceSpec::Url(url) => self.load_url(url, mode).await,
            SourceSpec::Path(path) => self.load_file(path, mode),
        }
    }

    pub fn load_file(&self, path: &Path, mode: DelimiterMode) -> Result<Table, DataLoadError> {
        if is_spreadsheet(path) {
            return load_workbook(path);
        }

        let bytes = fs::read(path).map_err(|source| match source.kind() {
            ErrorKind::NotFound => DataLoadError::FileNotFound {
                path: path.to_path_buf(),
            },
            _ => DataLoadError::Io {
                path: path.to_path_buf(),
                source,
            },
        })?;

        tracing::info!(path = %path.display(), bytes = bytes.len(), "read local dataset");
        parse_table(&String::from_utf8_lossy(&bytes), mode, &path.display().to_string())
    }

    pub async fn load_url(&self, url: &str, mode: DelimiterMode) -> Result<Table, DataLoadError> {
        tracing::info!(url, "fetching remote dataset");
        let unavailable = |reason: String, source: Option<reqwest::Error>| DataLoadError::SourceUnavailable {
            url: url.to_string(),
            reason,
            source,
        };

        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| unavailable(format!("request failed: {}", e), Some(e)))?;

        // Error pages must not be parsed as data
        if !response.status().is_success() {
            return Err(unavailable(
                format!("HTTP request failed with status: {}", response.status()),
                None,
            ));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| unavailable(format!("failed to read response body: {}", e), Some(e)))?;

        tracing::info!(url, bytes = body.len(), "fetched remote dataset");
        parse_table(&String::from_utf8_lossy(&body), mode, url)
    }
}

/// Parse delimited text into a [`Table`], skipping rows that do not fit the header.
pub fn parse_table(content: &str, mode: DelimiterMode, origin: &str) -> Result<Table, DataLoadError> {
    let content = content.trim_start_matches('\u{feff}');
    let delimiter = match mode {
        DelimiterMode::Fixed(d) => d,
        DelimiterMode::Auto => sniff_delimiter(content),
    };

    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .from_reader(content.as_bytes());

    let headers: Vec<String> = match reader.headers() {
        Ok(record) => record.iter().map(|h| h.trim().to_string()).collect(),
        Err(_) => Vec::new(),
    };
    if headers.iter().all(|h| h.is_empty()) {
        return Err(DataLoadError::Empty {
            origin: origin.to_string(),
        });
    }

    let mut rows = Vec::new();
    let mut skipped = Vec::new();

    for result in reader.records() {
        match result {
            Ok(record) if record.len() == headers.len() => rows.push(record),
            Ok(record) => skipped.push(MalformedRow {
                line: record.position().map(|p| p.line()).unwrap_or(0),
                reason: format!("expected {} fields, found {}", headers.len(), record.len()),
            }),
            Err(e) => skipped.push(MalformedRow {
                line: e.position().map(|p| p.line()).unwrap_or(0),
                reason: e.to_string(),
            }),
        }
    }

    for row in &skipped {
        tracing::debug!(origin, line = row.line, reason = %row.reason, "skipped malformed row");
    }
    if !skipped.is_empty() {
        tracing::warn!(origin, skipped = skipped.len(), "skipped malformed rows");
    }

    Ok(Table {
        origin: origin.to_string(),
        delimiter: Some(delimiter),
        headers,
        rows,
        skipped,
    })
}

/// Whether the path names a workbook rather than delimited text.
pub fn is_spreadsheet(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| SPREADSHEET_EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known)))
        .unwrap_or(false)
}

/// Read the first sheet of a workbook into a [`Table`].
///
/// The first row is the header. Fully blank rows are dropped without being
/// reported; every other row is padded to the sheet width by the reader, so
/// nothing is skipped as malformed.
pub fn load_workbook(path: &Path) -> Result<Table, DataLoadError> {
    if !path.exists() {
        return Err(DataLoadError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    let workbook_error = |source: calamine::Error| DataLoadError::Workbook {
        path: path.to_path_buf(),
        source,
    };
    let origin = path.display().to_string();

    let mut workbook = open_workbook_auto(path).map_err(workbook_error)?;
    let Some(sheet_name) = workbook.sheet_names().first().cloned() else {
        return Err(DataLoadError::Empty { origin });
    };
    let range = workbook.worksheet_range(&sheet_name).map_err(workbook_error)?;

    let mut sheet_rows = range.rows();
    let headers: Vec<String> = sheet_rows
        .next()
        .map(|row| row.iter().map(|c| cell_text(c).trim().to_string()).collect())
        .unwrap_or_default();
    if headers.iter().all(|h| h.is_empty()) {
        return Err(DataLoadError::Empty { origin });
    }

    let rows: Vec<StringRecord> = sheet_rows
        .map(|row| row.iter().map(cell_text).collect::<Vec<_>>())
        .filter(|cells| cells.iter().any(|c| !c.trim().is_empty()))
        .map(StringRecord::from)
        .collect();

    tracing::info!(path = %origin, sheet = %sheet_name, rows = rows.len(), "read spreadsheet dataset");
    Ok(Table {
        origin,
        delimiter: None,
        headers,
        rows,
        skipped: Vec::new(),
    })
}

/// Whole numbers print without a fractional part so "120" stays "120".
fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{}", *n as i64),
        other => other.to_string(),
    }
}

/// Pick the candidate delimiter that splits the leading lines into a
/// consistent, non-zero number of fields. Falls back to `,`.
pub fn sniff_delimiter(sample: &str) -> u8 {
    let lines: Vec<&str> = sample
        .lines()
        .filter(|line| !line.trim().is_empty())
        .take(SNIFF_LINES)
        .collect();
    let Some(header) = lines.first() else {
        return b',';
    };

    DELIMITER_CANDIDATES
        .iter()
        .enumerate()
        .filter_map(|(rank, &delimiter)| {
            let expected = count_unquoted(header, delimiter);
            if expected == 0 {
                return None;
            }
            let consistent = lines
                .iter()
                .filter(|line| count_unquoted(line, delimiter) == expected)
                .count();
            Some((rank, delimiter, consistent, expected))
        })
        .max_by(|a, b| {
            a.2.cmp(&b.2)
                .then(a.3.cmp(&b.3))
                .then(b.0.cmp(&a.0))
        })
        .map(|(_, delimiter, _, _)| delimiter)
        .unwrap_or(b',')
}

fn count_unquoted(line: &str, delimiter: u8) -> usize {
    let mut in_quotes = false;
    let mut count = 0;
    for byte in line.bytes() {
        if byte == b'"' {
            in_quotes = !in_quotes;
        } else if byte == delimiter && !in_quotes {
            count += 1;
        }
    }
    count
}

pub fn extract_properties(table: &Table, columns: &ColumnMapping) -> Result<Vec<PropertyRecord>, DataLoadError> {
    let municipality = Some(table.require_column(&columns.property_municipality)?);
    let province = table.column(&columns.property_province);
    let address = table.column(&columns.property_address);
    let property_type = table.column(&columns.property_type);
    let cadastral = table.column(&columns.property_cadastral_category);
    let size = table.column(&columns.property_size);
    let purpose = table.column(&columns.property_purpose);
    let recipient = table.column(&columns.property_recipient);

    Ok(table
        .rows
        .iter()
        .map(|row| {
            let raw_municipality = cell(row, municipality);
            PropertyRecord {
                province: cell(row, province).to_string(),
                municipality: raw_municipality.to_string(),
                city_key: normalize_city_key(raw_municipality),
                address: cell(row, address).to_string(),
                property_type: cell(row, property_type).to_string(),
                cadastral_category: cell(row, cadastral).to_string(),
                size_raw: cell(row, size).to_string(),
                purpose: optional_cell(row, purpose),
                recipient: optional_cell(row, recipient),
            }
        })
        .collect())
}

pub fn extract_services(table: &Table, columns: &ColumnMapping) -> Result<Vec<ServiceRecord>, DataLoadError> {
    let municipality = Some(table.require_column(&columns.service_municipality)?);

    Ok(table
        .rows
        .iter()
        .map(|row| {
            let raw = cell(row, municipality);
            ServiceRecord {
                municipality: raw.to_string(),
                city_key: normalize_city_key(raw),
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    const PROPERTIES: &str = "Provincia;Comune;Indirizzo;Tipologia;Categoria catastale;Metri quadri/Consistenza;Finalità;Destinatario\n\
        Taranto;Lizzano;Via Roma 1;Appartamento;A/2;120;Sociale;Comune\n\
        TARANTO; lizzano ;Via Po 3;Box;C/6;18;;\n\
        Bari;Bari;Via Sparano 5;Negozio;C/1;60;;\n";

    #[test]
    fn sniffs_semicolon_and_comma() {
        assert_eq!(sniff_delimiter(PROPERTIES), b';');
        assert_eq!(sniff_delimiter("COMUNE,NOME\nLIZZANO,\"Centro, diurno\"\n"), b',');
        assert_eq!(sniff_delimiter("a\tb\tc\n1\t2\t3\n"), b'\t');
    }

    #[test]
    fn sniff_falls_back_to_comma() {
        assert_eq!(sniff_delimiter(""), b',');
        assert_eq!(sniff_delimiter("COMUNE\nLIZZANO\n"), b',');
    }

    #[test]
    fn parses_and_extracts_properties() {
        let table = parse_table(PROPERTIES, DelimiterMode::Auto, "beni.csv").unwrap();
        assert_eq!(table.delimiter, Some(b';'));
        assert_eq!(table.len(), 3);
        assert!(table.skipped.is_empty());

        let records = extract_properties(&table, &ColumnMapping::default()).unwrap();
        assert_eq!(records[0].city_key, "LIZZANO");
        assert_eq!(records[1].city_key, "LIZZANO");
        assert_eq!(records[0].size(), Some(120.0));
        assert_eq!(records[0].purpose.as_deref(), Some("Sociale"));
        assert_eq!(records[1].purpose, None);
    }

    #[test]
    fn skips_rows_with_wrong_field_count() {
        let content = "COMUNE,TIPO\nLIZZANO,Centro\nTARANTO,Centro,extra\nGINOSA\nMASSAFRA,RSA\n";
        let table = parse_table(content, DelimiterMode::Fixed(b','), "servizi.csv").unwrap();

        assert_eq!(table.len(), 2);
        assert_eq!(table.skipped.len(), 2);
        assert_eq!(table.skipped[0].line, 3);

        let services = extract_services(&table, &ColumnMapping::default()).unwrap();
        let keys: Vec<_> = services.iter().map(|s| s.city_key.as_str()).collect();
        assert_eq!(keys, ["LIZZANO", "MASSAFRA"]);
    }

    #[test]
    fn missing_column_is_reported() {
        let table = parse_table("CITTA,TIPO\nLIZZANO,RSA\n", DelimiterMode::Auto, "servizi.csv").unwrap();
        let err = extract_services(&table, &ColumnMapping::default()).unwrap_err();
        assert!(matches!(err, DataLoadError::MissingColumn { ref column, .. } if column == "COMUNE"));
    }

    #[test]
    fn column_lookup_ignores_case() {
        let table = parse_table("comune;Tipo\nLIZZANO;RSA\n", DelimiterMode::Auto, "x").unwrap();
        assert_eq!(table.column("COMUNE"), Some(0));
        assert_eq!(table.column(" tipo "), Some(1));
        assert_eq!(table.column("assente"), None);
    }

    #[test]
    fn empty_input_has_no_header() {
        let err = parse_table("", DelimiterMode::Auto, "vuoto.csv").unwrap_err();
        assert!(matches!(err, DataLoadError::Empty { .. }));
    }

    #[test]
    fn header_only_input_is_an_empty_table() {
        let table = parse_table("COMUNE;TIPO\n", DelimiterMode::Auto, "x").unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn invalid_utf8_is_decoded_lossily() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"COMUNE;NOME\nLIZZANO;Caf\xe8\n").unwrap();

        let table = DatasetLoader::new()
            .load_file(file.path(), DelimiterMode::Auto)
            .unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(&table.rows[0][0], "LIZZANO");
    }

    #[test]
    fn missing_file_is_distinct_from_unavailable_source() {
        let err = DatasetLoader::new()
            .load_file(Path::new("/nonexistent/beni.csv"), DelimiterMode::Auto)
            .unwrap_err();
        assert!(matches!(err, DataLoadError::FileNotFound { .. }));
    }

    #[test]
    fn source_spec_detects_urls() {
        assert!(matches!(SourceSpec::parse("https://dati.puglia.it/x.csv"), SourceSpec::Url(_)));
        assert!(matches!(SourceSpec::parse("HTTP://example.org/x.csv"), SourceSpec::Url(_)));
        assert_eq!(SourceSpec::parse("data/beni.csv"), SourceSpec::Path(PathBuf::from("data/beni.csv")));
    }

    #[test]
    fn spreadsheet_extensions_are_detected() {
        assert!(is_spreadsheet(Path::new("data/beni.xlsx")));
        assert!(is_spreadsheet(Path::new("BENI.ODS")));
        assert!(!is_spreadsheet(Path::new("beni.csv")));
        assert!(!is_spreadsheet(Path::new("xlsx")));
    }

    #[test]
    fn parses_delimiter_modes() {
        assert_eq!(DelimiterMode::parse("AUTO"), Some(DelimiterMode::Auto));
        assert_eq!(DelimiterMode::parse(";"), Some(DelimiterMode::Fixed(b';')));
        assert_eq!(DelimiterMode::parse("\\t"), Some(DelimiterMode::Fixed(b'\t')));
        assert_eq!(DelimiterMode::parse("ab"), None);
    }

    /// Serve one canned HTTP response on a local port and return the URL.
    fn serve_once(response: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                let mut request = [0u8; 1024];
                let _ = stream.read(&mut request);
                let _ = stream.write_all(response.as_bytes());
            }
        });
        format!("http://{}/servizi.csv", addr)
    }

    #[tokio::test]
    async fn error_status_is_reported_as_unavailable() {
        let url = serve_once(
            "HTTP/1.1 500 Internal Server Error\r\nContent-Length: 9\r\nConnection: close\r\n\r\nCOMUNE\nX\n",
        );
        let err = DatasetLoader::new().load_url(&url, DelimiterMode::Auto).await.unwrap_err();

        match &err {
            DataLoadError::SourceUnavailable { url: failed, reason, source } => {
                assert_eq!(failed, &url);
                assert!(reason.contains("500"), "reason: {}", reason);
                assert!(source.is_none());
            }
            other => panic!("expected SourceUnavailable, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn successful_response_is_parsed() {
        let url = serve_once(
            "HTTP/1.1 200 OK\r\nContent-Length: 23\r\nConnection: close\r\n\r\nCOMUNE;NOME\nLIZZANO;CD\n",
        );
        let table = DatasetLoader::new().load_url(&url, DelimiterMode::Auto).await.unwrap();
        assert_eq!(table.delimiter, Some(b';'));
        assert_eq!(&table.rows[0][0], "LIZZANO");
    }

    #[tokio::test]
    async fn refused_connection_keeps_the_transport_error() {
        // bind then drop so the port is very likely closed
        let addr = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap();
        let loader = DatasetLoader::with_timeout(Duration::from_secs(2));
        let err = loader
            .load_url(&format!("http://{}/servizi.csv", addr), DelimiterMode::Auto)
            .await
            .unwrap_err();

        assert!(matches!(err, DataLoadError::SourceUnavailable { .. }));
        let source = err.source().expect("transport error is kept as the source");
        assert!(source.is::<reqwest::Error>());
    }
}

use serde::{Deserialize, Serialize};

/// Options applied to the bulk-load statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CopyOptions {
    pub format: CopyFormat,
    pub encoding: Encoding,
    /// `TIMEFORMAT` value; `None` leaves the warehouse default in place.
    pub time_format: Option<String>,
    /// Truncate VARCHAR data that would overflow its column.
    pub truncate_columns: bool,
    /// Staged files are gzip-compressed.
    pub gzip: bool,
    /// Rows that may be rejected before the load fails.
    pub max_error: u32,
    /// Header lines to skip in every file (CSV only).
    pub ignore_header: u32,
}

impl Default for CopyOptions {
    fn default() -> Self {
        Self {
            format: CopyFormat::default(),
            encoding: Encoding::Utf8,
            time_format: Some("auto".to_string()),
            truncate_columns: true,
            gzip: false,
            max_error: 0,
            ignore_header: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum CopyFormat {
    Json {
        #[serde(default)]
        column_map: ColumnMapping,
    },
    Avro {
        #[serde(default)]
        column_map: ColumnMapping,
    },
    Csv {
        #[serde(default)]
        delimiter: Option<char>,
        #[serde(default)]
        quote: Option<char>,
    },
    Parquet,
    Orc,
}

impl Default for CopyFormat {
    fn default() -> Self {
        CopyFormat::Json {
            column_map: ColumnMapping::Auto,
        }
    }
}

impl CopyFormat {
    /// Columnar formats carry their own schema and reject the text options.
    pub fn is_columnar(&self) -> bool {
        matches!(self, CopyFormat::Parquet | CopyFormat::Orc)
    }
}

/// How JSON/AVRO fields map onto table columns.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnMapping {
    #[default]
    Auto,
    AutoIgnorecase,
    /// Object URL of a JSONPaths file.
    Jsonpaths(String),
}

impl ColumnMapping {
    pub fn argument(&self) -> &str {
        match self {
            ColumnMapping::Auto => "auto",
            ColumnMapping::AutoIgnorecase => "auto ignorecase",
            ColumnMapping::Jsonpaths(url) => url,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Encoding {
    #[default]
    Utf8,
    Utf16,
    Utf16le,
    Utf16be,
}

impl Encoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            Encoding::Utf8 => "UTF8",
            Encoding::Utf16 => "UTF16",
            Encoding::Utf16le => "UTF16LE",
            Encoding::Utf16be => "UTF16BE",
        }
    }
}

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SizeError;

/// NCBI Taxonomy identifier. Kept as the text it was read as; only the
/// lookup path cares whether a query looks numeric.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaxId(String);

impl TaxId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn looks_numeric(value: &str) -> bool {
        !value.is_empty() && value.chars().all(|ch| ch.is_ascii_digit())
    }
}

impl fmt::Display for TaxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for TaxId {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

impl From<&str> for TaxId {
    fn from(value: &str) -> Self {
        Self(value.trim().to_string())
    }
}

impl From<String> for TaxId {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SizeSource {
    Ncbi,
    Atb,
    User,
}

impl fmt::Display for SizeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SizeSource::Ncbi => write!(f, "ncbi"),
            SizeSource::Atb => write!(f, "atb"),
            SizeSource::User => write!(f, "user"),
        }
    }
}

impl FromStr for SizeSource {
    type Err = SizeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "ncbi" => Ok(SizeSource::Ncbi),
            "atb" => Ok(SizeSource::Atb),
            "user" => Ok(SizeSource::User),
            _ => Err(SizeError::InvalidSource(value.to_string())),
        }
    }
}

/// Column layout of a persisted sizes table. Basic builds carry no
/// category column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TableLayout {
    Basic,
    Extended,
}

const BASIC_COLUMNS: &[&str] = &["name", "tax_id", "size", "source", "method"];
const EXTENDED_COLUMNS: &[&str] = &["name", "tax_id", "category", "size", "source", "method"];

impl TableLayout {
    pub fn columns(self) -> &'static [&'static str] {
        match self {
            TableLayout::Basic => BASIC_COLUMNS,
            TableLayout::Extended => EXTENDED_COLUMNS,
        }
    }

    pub fn from_header(columns: &[String]) -> Option<Self> {
        let matches = |expected: &[&str]| {
            columns.len() == expected.len()
                && columns.iter().zip(expected).all(|(a, b)| a == b)
        };
        if matches(EXTENDED_COLUMNS) {
            Some(TableLayout::Extended)
        } else if matches(BASIC_COLUMNS) {
            Some(TableLayout::Basic)
        } else {
            None
        }
    }
}

pub const UNKNOWN_CATEGORY: &str = "unknown";

/// One row of the final sizes table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenomeSizeRecord {
    pub name: String,
    pub tax_id: TaxId,
    pub category: Option<String>,
    pub size: u64,
    pub source: SizeSource,
    pub method: String,
}

impl GenomeSizeRecord {
    pub fn category_or_unknown(&self) -> &str {
        match self.category.as_deref() {
            Some(value) if !value.is_empty() => value,
            _ => UNKNOWN_CATEGORY,
        }
    }

    /// Field values in the column order of `layout`.
    pub fn fields(&self, layout: TableLayout) -> Vec<String> {
        let mut fields = vec![self.name.clone(), self.tax_id.to_string()];
        if layout == TableLayout::Extended {
            fields.push(self.category_or_unknown().to_string());
        }
        fields.push(self.size.to_string());
        fields.push(self.source.to_string());
        fields.push(self.method.clone());
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_queries() {
        assert!(TaxId::looks_numeric("1280"));
        assert!(!TaxId::looks_numeric("Staphylococcus aureus"));
        assert!(!TaxId::looks_numeric(""));
        assert!(!TaxId::looks_numeric("12a"));
    }

    #[test]
    fn layout_from_header() {
        let basic: Vec<String> = BASIC_COLUMNS.iter().map(|c| c.to_string()).collect();
        let extended: Vec<String> = EXTENDED_COLUMNS.iter().map(|c| c.to_string()).collect();
        assert_eq!(TableLayout::from_header(&basic), Some(TableLayout::Basic));
        assert_eq!(TableLayout::from_header(&extended), Some(TableLayout::Extended));
        assert_eq!(TableLayout::from_header(&basic[..3]), None);
    }
}

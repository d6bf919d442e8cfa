//! Typed view of the spreadsheet mirror.
//!
//! Column *names* are the contract with the people editing the sheet; their
//! order is not. Headers are matched trimmed and case-insensitively, so
//! header drift shows up as a missing column at parse time instead of a
//! silently mis-mapped field.

use std::collections::HashMap;

use crate::error::SyncError;
use crate::model::{ChangeField, Page};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    Id,
    Name,
    Url,
    HtmlTitle,
    MetaDescription,
    Slug,
    BodyContent,
}

impl Column {
    /// Sheet order used when this service writes a mirror tab.
    pub const ALL: [Column; 7] = [
        Column::Id,
        Column::Name,
        Column::Url,
        Column::HtmlTitle,
        Column::MetaDescription,
        Column::Slug,
        Column::BodyContent,
    ];

    pub fn header(&self) -> &'static str {
        match self {
            Column::Id => "ID",
            Column::Name => "Name",
            Column::Url => "URL",
            Column::HtmlTitle => "HTML Title",
            Column::MetaDescription => "Meta Description",
            Column::Slug => "Slug",
            Column::BodyContent => "Body Content",
        }
    }

    pub fn from_header(header: &str) -> Option<Column> {
        let wanted = header.trim();
        Column::ALL
            .into_iter()
            .find(|c| c.header().eq_ignore_ascii_case(wanted))
    }

    /// Change-set key for this column; the identifier column has none.
    pub fn field(&self) -> Option<ChangeField> {
        match self {
            Column::Id => None,
            Column::Name => Some(ChangeField::Name),
            Column::Url => Some(ChangeField::Url),
            Column::HtmlTitle => Some(ChangeField::HtmlTitle),
            Column::MetaDescription => Some(ChangeField::MetaDescription),
            Column::Slug => Some(ChangeField::Slug),
            Column::BodyContent => Some(ChangeField::BodyContent),
        }
    }
}

/// One data row, keyed by its page identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorRow {
    pub page_id: String,
    /// 1-based row number in the sheet (the header is row 1).
    pub row_number: usize,
    cells: HashMap<Column, String>,
}

impl MirrorRow {
    pub fn get(&self, column: Column) -> Option<&str> {
        self.cells.get(&column).map(String::as_str)
    }
}

#[derive(Debug, Clone, Default)]
pub struct MirrorTable {
    /// 0-based position of each recognised header.
    columns: HashMap<Column, usize>,
    rows: HashMap<String, MirrorRow>,
}

impl MirrorTable {
    /// Parse a tab read as rows of cells. Row 1 is the header.
    ///
    /// Rows without an identifier are skipped; when two rows share an
    /// identifier the later one wins.
    pub fn parse(values: &[Vec<String>]) -> Result<Self, SyncError> {
        let Some((header, data)) = values.split_first() else {
            return Err(SyncError::MissingColumn(Column::Id.header()));
        };

        let mut columns = HashMap::new();
        for (idx, cell) in header.iter().enumerate() {
            if let Some(column) = Column::from_header(cell) {
                columns.entry(column).or_insert(idx);
            }
        }
        let Some(&id_idx) = columns.get(&Column::Id) else {
            return Err(SyncError::MissingColumn(Column::Id.header()));
        };

        let mut rows = HashMap::new();
        for (offset, cells) in data.iter().enumerate() {
            let page_id = cells.get(id_idx).map(|s| s.trim()).unwrap_or_default();
            if page_id.is_empty() {
                continue;
            }
            let cells = columns
                .iter()
                .map(|(&column, &idx)| (column, cells.get(idx).cloned().unwrap_or_default()))
                .collect();
            rows.insert(
                page_id.to_string(),
                MirrorRow {
                    page_id: page_id.to_string(),
                    row_number: offset + 2,
                    cells,
                },
            );
        }

        Ok(Self { columns, rows })
    }

    pub fn has_column(&self, column: Column) -> bool {
        self.columns.contains_key(&column)
    }

    /// 1-based column number of a recognised header.
    pub fn column_number(&self, column: Column) -> Option<usize> {
        self.columns.get(&column).map(|idx| idx + 1)
    }

    pub fn get(&self, page_id: &str) -> Option<&MirrorRow> {
        self.rows.get(page_id)
    }

    /// Rows in sheet order.
    pub fn rows(&self) -> Vec<&MirrorRow> {
        let mut rows: Vec<&MirrorRow> = self.rows.values().collect();
        rows.sort_by_key(|r| r.row_number);
        rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

pub fn header_row() -> Vec<String> {
    Column::ALL.iter().map(|c| c.header().to_string()).collect()
}

/// A live page rendered in `header_row` order.
pub fn page_row(page: &Page) -> Vec<String> {
    Column::ALL
        .iter()
        .map(|column| {
            let value = match column {
                Column::Id => Some(&page.id),
                Column::Name => page.name.as_ref(),
                Column::Url => page.url.as_ref(),
                Column::HtmlTitle => page.html_title.as_ref(),
                Column::MetaDescription => page.meta_description.as_ref(),
                Column::Slug => page.slug.as_ref(),
                Column::BodyContent => page.body.as_ref(),
            };
            value.cloned().unwrap_or_default()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sheet(rows: &[&[&str]]) -> Vec<Vec<String>> {
        rows.iter()
            .map(|r| r.iter().map(|c| c.to_string()).collect())
            .collect()
    }

    #[test]
    fn headers_match_trimmed_and_case_insensitive() {
        let values = sheet(&[
            &["Notes", " name ", "id", "html title", "BODY CONTENT"],
            &["x", "Home", "P1", "Home | Acme", "<p>hi</p>"],
        ]);
        let table = MirrorTable::parse(&values).unwrap();
        assert_eq!(table.column_number(Column::Id), Some(3));
        assert_eq!(table.column_number(Column::Name), Some(2));
        assert!(!table.has_column(Column::Slug));

        let row = table.get("P1").unwrap();
        assert_eq!(row.row_number, 2);
        assert_eq!(row.get(Column::Name), Some("Home"));
        assert_eq!(row.get(Column::HtmlTitle), Some("Home | Acme"));
        assert_eq!(row.get(Column::Slug), None);
    }

    #[test]
    fn missing_id_column_is_a_configuration_error() {
        let values = sheet(&[&["Name", "URL"], &["Home", "https://a"]]);
        let err = MirrorTable::parse(&values).unwrap_err();
        assert!(matches!(err, SyncError::MissingColumn("ID")));
        assert!(err.is_configuration());

        let err = MirrorTable::parse(&[]).unwrap_err();
        assert!(matches!(err, SyncError::MissingColumn("ID")));
    }

    #[test]
    fn blank_ids_are_skipped_and_last_row_wins() {
        let values = sheet(&[
            &["ID", "Name"],
            &["P1", "First"],
            &["", "No id"],
            &["  "],
            &["P2", "Other"],
            &["P1", "Second"],
        ]);
        let table = MirrorTable::parse(&values).unwrap();
        assert_eq!(table.len(), 2);
        let p1 = table.get("P1").unwrap();
        assert_eq!(p1.get(Column::Name), Some("Second"));
        assert_eq!(p1.row_number, 6);

        let order: Vec<&str> = table.rows().iter().map(|r| r.page_id.as_str()).collect();
        assert_eq!(order, vec!["P2", "P1"]);
    }

    #[test]
    fn short_rows_read_as_empty_cells() {
        let values = sheet(&[&["ID", "Name", "Slug"], &["P1"]]);
        let table = MirrorTable::parse(&values).unwrap();
        assert_eq!(table.get("P1").unwrap().get(Column::Slug), Some(""));
    }

    #[test]
    fn page_row_follows_header_order() {
        let page = Page {
            id: "P1".into(),
            name: Some("Home".into()),
            slug: Some("home".into()),
            ..Default::default()
        };
        assert_eq!(header_row()[0], "ID");
        assert_eq!(header_row()[6], "Body Content");
        let row = page_row(&page);
        assert_eq!(row.len(), 7);
        assert_eq!(row[0], "P1");
        assert_eq!(row[1], "Home");
        assert_eq!(row[2], "");
        assert_eq!(row[5], "home");
    }
}

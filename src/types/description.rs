use super::value::Value;

/// Column name to normalized type, as introspected from the live schema.
///
/// The column order is the physical order of the table and is what raw
/// rows are zipped against when converting them to documents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableDescription {
    columns: Vec<(String, String)>,
}

impl TableDescription {
    /// Build from `DESCRIBE`-shaped rows: field name first, type second.
    pub fn from_rows(rows: Vec<Vec<Value>>) -> Self {
        let columns = rows
            .into_iter()
            .filter_map(|row| {
                let mut cells = row.into_iter();
                let name = cells.next()?.as_text()?;
                let ty = cells.next().and_then(|v| v.as_text()).unwrap_or_default();
                Some((name, ty))
            })
            .collect();
        Self { columns }
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(n, _)| n.as_str())
    }

    pub fn type_of(&self, column: &str) -> Option<&str> {
        self.columns
            .iter()
            .find(|(n, _)| n == column)
            .map(|(_, t)| t.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.columns.iter().map(|(n, t)| (n.as_str(), t.as_str()))
    }
}

use std::collections::HashMap;
use std::sync::Arc;

use crate::types::Value;

/// Column names and their index lookup, shared by every row of one result.
#[derive(Debug, Default)]
struct Columns {
    names: Vec<String>,
    index: HashMap<String, usize>,
}

impl Columns {
    fn new(names: Vec<String>) -> Self {
        // First occurrence wins for duplicated names, matching `position`.
        let mut index = HashMap::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            index.entry(name.clone()).or_insert(i);
        }
        Self { names, index }
    }
}

/// A row copied out of a fully drained result.
///
/// Unlike a `RowHandle`, it is plain data and needs no release.
#[derive(Debug, Clone)]
pub struct ResultRow {
    columns: Arc<Columns>,
    values: Vec<Value>,
}

impl ResultRow {
    /// Index of a column by name
    ///
    /// # Arguments
    ///
    /// * `column_name` - The name of the column
    ///
    /// # Returns
    ///
    /// The first column with that name, or None if there is none
    #[must_use]
    pub fn column_index(&self, column_name: &str) -> Option<usize> {
        self.columns.index.get(column_name).copied()
    }

    /// Value of a column by name
    ///
    /// # Arguments
    ///
    /// * `column_name` - The name of the column
    ///
    /// # Returns
    ///
    /// The value at the column, or None if the column wasn't found
    #[must_use]
    pub fn get(&self, column_name: &str) -> Option<&Value> {
        self.column_index(column_name)
            .and_then(|idx| self.values.get(idx))
    }

    /// Value of a column by position
    ///
    /// # Arguments
    ///
    /// * `index` - The 0-based column index
    ///
    /// # Returns
    ///
    /// The value at the index, or None if the index is out of range
    #[must_use]
    pub fn get_by_index(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    #[must_use]
    pub fn column_names(&self) -> &[String] {
        &self.columns.names
    }

    /// The row as a JSON object keyed by column name.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let object = self
            .columns
            .names
            .iter()
            .zip(&self.values)
            .map(|(name, value)| (name.clone(), value.to_json()))
            .collect::<serde_json::Map<_, _>>();
        serde_json::Value::Object(object)
    }
}

/// The rows of a query, drained into memory by `Bridge::fetch_all`.
#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    /// The rows, in cursor order
    pub results: Vec<ResultRow>,
    columns: Arc<Columns>,
}

impl ResultSet {
    /// Empty result set for the given columns
    ///
    /// # Arguments
    ///
    /// * `column_names` - The column names, in result order
    /// * `capacity` - Number of rows to reserve room for
    ///
    /// # Returns
    ///
    /// A new `ResultSet` with no rows
    #[must_use]
    pub fn with_capacity(column_names: Vec<String>, capacity: usize) -> ResultSet {
        ResultSet {
            results: Vec::with_capacity(capacity),
            columns: Arc::new(Columns::new(column_names)),
        }
    }

    #[must_use]
    pub fn column_names(&self) -> &[String] {
        &self.columns.names
    }

    /// Append one row
    ///
    /// Values beyond the column count are kept but can only be reached by
    /// index.
    ///
    /// # Arguments
    ///
    /// * `row_values` - The row's values, in column order
    pub fn add_row_values(&mut self, row_values: Vec<Value>) {
        self.results.push(ResultRow {
            columns: Arc::clone(&self.columns),
            values: row_values,
        });
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.results.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ResultRow> {
        self.results.iter()
    }

    /// All rows as a JSON array of objects.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Array(self.results.iter().map(ResultRow::to_json).collect())
    }
}

impl<'a> IntoIterator for &'a ResultSet {
    type Item = &'a ResultRow;
    type IntoIter = std::slice::Iter<'a, ResultRow>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ResultSet {
        let mut rs = ResultSet::with_capacity(vec!["id".into(), "name".into()], 2);
        rs.add_row_values(vec![Value::Integer(1), Value::Text("a".into())]);
        rs.add_row_values(vec![Value::Integer(2), Value::Null]);
        rs
    }

    #[test]
    fn rows_resolve_columns_by_name_and_index() {
        let rs = sample();
        assert_eq!(rs.len(), 2);
        assert_eq!(rs.column_names(), ["id", "name"]);

        let first = &rs.results[0];
        assert_eq!(first.get("name"), Some(&Value::Text("a".into())));
        assert_eq!(first.get_by_index(0), Some(&Value::Integer(1)));
        assert_eq!(first.get("missing"), None);
        assert_eq!(first.get_by_index(2), None);
    }

    #[test]
    fn duplicate_column_names_resolve_to_first() {
        let mut rs = ResultSet::with_capacity(vec!["x".into(), "x".into()], 1);
        rs.add_row_values(vec![Value::Integer(1), Value::Integer(2)]);
        assert_eq!(rs.results[0].get("x"), Some(&Value::Integer(1)));
    }

    #[test]
    fn json_rendering_keys_by_column() {
        let json = sample().to_json();
        assert_eq!(
            json,
            serde_json::json!([
                {"id": 1, "name": "a"},
                {"id": 2, "name": null},
            ])
        );
    }
}

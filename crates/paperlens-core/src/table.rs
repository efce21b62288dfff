use std::sync::Arc;

use crate::record::PaperRecord;
use crate::schema::Schema;

/// Ordered rows for one analysis session, with a fixed column schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultTable {
    schema: Arc<Schema>,
    rows: Vec<PaperRecord>,
}

impl ResultTable {
    pub fn new(schema: Arc<Schema>) -> Self {
        Self {
            schema,
            rows: Vec::new(),
        }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Column names in declaration order.
    pub fn header(&self) -> Vec<&str> {
        self.schema.field_names().collect()
    }

    pub fn rows(&self) -> &[PaperRecord] {
        &self.rows
    }

    /// The first `n` rows, for previews.
    pub fn head(&self, n: usize) -> &[PaperRecord] {
        &self.rows[..n.min(self.rows.len())]
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Append-only builder for a [`ResultTable`].
///
/// Rows are kept in the order they are appended; nothing is merged or
/// deduplicated.
#[derive(Debug, Clone)]
pub struct TableAccumulator {
    table: ResultTable,
}

impl TableAccumulator {
    pub fn new(schema: Arc<Schema>) -> Self {
        Self {
            table: ResultTable::new(schema),
        }
    }

    /// Append a record as the next row.
    ///
    /// The record must have been produced against this table's schema.
    pub fn append(&mut self, record: PaperRecord) {
        debug_assert_eq!(
            record.schema().as_ref(),
            self.table.schema.as_ref(),
            "record schema does not match table schema"
        );
        self.table.rows.push(record);
    }

    pub fn snapshot(&self) -> &ResultTable {
        &self.table
    }

    pub fn into_table(self) -> ResultTable {
        self.table
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(schema: &Arc<Schema>, title: &str) -> PaperRecord {
        PaperRecord::from_pairs(Arc::clone(schema), [("Title", title)])
    }

    #[test]
    fn empty_table_still_has_header() {
        let schema = Arc::new(Schema::academic_paper());
        let acc = TableAccumulator::new(schema);
        let table = acc.snapshot();
        assert!(table.is_empty());
        assert_eq!(table.header().len(), 25);
        assert_eq!(table.header()[0], "Title");
    }

    #[test]
    fn append_keeps_order_and_duplicates() {
        let schema = Arc::new(Schema::academic_paper());
        let mut acc = TableAccumulator::new(Arc::clone(&schema));
        acc.append(record(&schema, "A"));
        acc.append(record(&schema, "B"));
        acc.append(record(&schema, "A"));

        let table = acc.into_table();
        let titles: Vec<&str> = table
            .rows()
            .iter()
            .map(|r| r.get("Title").unwrap())
            .collect();
        assert_eq!(titles, vec!["A", "B", "A"]);
    }

    #[test]
    fn head_is_clamped_to_row_count() {
        let schema = Arc::new(Schema::academic_paper());
        let mut acc = TableAccumulator::new(Arc::clone(&schema));
        acc.append(record(&schema, "only"));
        assert_eq!(acc.snapshot().head(5).len(), 1);
        assert_eq!(acc.snapshot().head(0).len(), 0);
    }
}

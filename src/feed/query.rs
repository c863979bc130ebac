/// Options for the list (rows) feed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowQuery {
    /// 1-based index of the first row returned (`start-index`).
    pub start: Option<u32>,
    /// Maximum rows returned (`max-results`).
    pub num: Option<u32>,
    /// Column to sort by, e.g. `column:name` (`orderby`).
    pub orderby: Option<String>,
    pub reverse: bool,
    /// Structured query, e.g. `age > 25` (`sq`).
    pub query: Option<String>,
}

impl RowQuery {
    pub(crate) fn to_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(start) = self.start {
            pairs.push(("start-index", start.to_string()));
        }
        if let Some(num) = self.num {
            pairs.push(("max-results", num.to_string()));
        }
        if let Some(orderby) = &self.orderby {
            pairs.push(("orderby", orderby.clone()));
        }
        if self.reverse {
            pairs.push(("reverse", "true".to_string()));
        }
        if let Some(query) = &self.query {
            pairs.push(("sq", query.clone()));
        }
        pairs
    }
}

/// Range filters for the cells feed. Rows and columns are 1-based.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CellQuery {
    pub min_row: Option<u32>,
    pub max_row: Option<u32>,
    pub min_col: Option<u32>,
    pub max_col: Option<u32>,
    /// Include cells that have no content.
    pub return_empty: Option<bool>,
}

impl CellQuery {
    /// The header row: row 1, empty cells included so positions line up.
    pub fn header_row() -> Self {
        Self {
            max_row: Some(1),
            return_empty: Some(true),
            ..Self::default()
        }
    }

    pub(crate) fn to_pairs(&self) -> Vec<(&'static str, String)> {
        let bounds = [
            ("min-row", self.min_row),
            ("max-row", self.max_row),
            ("min-col", self.min_col),
            ("max-col", self.max_col),
        ];
        let mut pairs: Vec<_> = bounds
            .into_iter()
            .filter_map(|(key, value)| value.map(|v| (key, v.to_string())))
            .collect();
        if let Some(return_empty) = self.return_empty {
            pairs.push(("return-empty", return_empty.to_string()));
        }
        pairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_row_query() {
        assert!(RowQuery::default().to_pairs().is_empty());
    }

    #[test]
    fn test_row_query_pairs() {
        let query = RowQuery {
            start: Some(5),
            num: Some(10),
            orderby: Some("column:name".to_string()),
            reverse: true,
            query: Some("age > 25".to_string()),
        };
        assert_eq!(
            query.to_pairs(),
            vec![
                ("start-index", "5".to_string()),
                ("max-results", "10".to_string()),
                ("orderby", "column:name".to_string()),
                ("reverse", "true".to_string()),
                ("sq", "age > 25".to_string()),
            ]
        );
    }

    #[test]
    fn test_header_row_query() {
        assert_eq!(
            CellQuery::header_row().to_pairs(),
            vec![
                ("max-row", "1".to_string()),
                ("return-empty", "true".to_string()),
            ]
        );
    }

    #[test]
    fn test_cell_range_pairs() {
        let query = CellQuery {
            min_row: Some(2),
            max_row: Some(4),
            min_col: Some(1),
            max_col: Some(3),
            return_empty: Some(false),
        };
        assert_eq!(
            query.to_pairs(),
            vec![
                ("min-row", "2".to_string()),
                ("max-row", "4".to_string()),
                ("min-col", "1".to_string()),
                ("max-col", "3".to_string()),
                ("return-empty", "false".to_string()),
            ]
        );
    }
}

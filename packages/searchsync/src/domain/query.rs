//! Structured queries
//!
//! Backend-neutral filters handed to the `QueryTranslator` port. The engine
//! only builds `Eq` disjunctions itself (cascade lookups); everything else
//! comes from callers.

use super::models::Value;

/// Filter tree
#[derive(Debug, Clone, PartialEq)]
pub enum QueryRule {
    /// Attribute equals value. On reference attributes the value is matched
    /// against the referenced identity.
    Eq { attribute: String, value: Value },
    /// Attribute equals any of the values
    In { attribute: String, values: Vec<Value> },
    Not(Box<QueryRule>),
    And(Vec<QueryRule>),
    Or(Vec<QueryRule>),
}

impl QueryRule {
    pub fn eq(attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        QueryRule::Eq {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    pub fn any_of(attribute: impl Into<String>, values: Vec<Value>) -> Self {
        QueryRule::In {
            attribute: attribute.into(),
            values,
        }
    }

    pub fn not(rule: QueryRule) -> Self {
        QueryRule::Not(Box::new(rule))
    }
}

/// Filter plus paging
///
/// A query with a `limit` is bounded and served from a single page; an
/// unbounded query is drained through a scroll cursor.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Query {
    pub rule: Option<QueryRule>,
    pub offset: usize,
    pub limit: Option<usize>,
}

impl Query {
    /// Match every document
    pub fn all() -> Self {
        Self::default()
    }

    pub fn filter(rule: QueryRule) -> Self {
        Self {
            rule: Some(rule),
            ..Self::default()
        }
    }

    /// Disjunction of rules, `None` when there is nothing to match
    pub fn any(rules: Vec<QueryRule>) -> Option<Self> {
        match rules.len() {
            0 => None,
            1 => rules.into_iter().next().map(Self::filter),
            _ => Some(Self::filter(QueryRule::Or(rules))),
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }
}

/// Grouping/distinct-count request
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateQuery {
    pub query: Query,
    /// Attribute whose values become the x labels
    pub attribute_x: String,
    /// Optional second grouping attribute (y labels)
    pub attribute_y: Option<String>,
    /// Count distinct values of this attribute instead of documents
    pub attribute_distinct: Option<String>,
}

impl AggregateQuery {
    pub fn new(attribute_x: impl Into<String>) -> Self {
        Self {
            query: Query::all(),
            attribute_x: attribute_x.into(),
            attribute_y: None,
            attribute_distinct: None,
        }
    }

    pub fn with_query(mut self, query: Query) -> Self {
        self.query = query;
        self
    }

    pub fn by(mut self, attribute_y: impl Into<String>) -> Self {
        self.attribute_y = Some(attribute_y.into());
        self
    }

    pub fn distinct(mut self, attribute: impl Into<String>) -> Self {
        self.attribute_distinct = Some(attribute.into());
        self
    }
}

/// Parsed aggregation: `matrix[x][y]` counts, labels sorted ascending
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AggregateResult {
    pub x_labels: Vec<String>,
    pub y_labels: Vec<String>,
    pub matrix: Vec<Vec<u64>>,
}

impl AggregateResult {
    /// Count for an (x, y) label pair; use `""` for y on one-dimensional results
    pub fn get(&self, x: &str, y: &str) -> Option<u64> {
        let xi = self.x_labels.iter().position(|l| l == x)?;
        let yi = if self.y_labels.is_empty() {
            0
        } else {
            self.y_labels.iter().position(|l| l == y)?
        };
        self.matrix.get(xi)?.get(yi).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_any_collapses_single_rule() {
        assert_eq!(Query::any(vec![]), None);

        let single = Query::any(vec![QueryRule::eq("bestFriend", "A")]).unwrap();
        assert_eq!(single.rule, Some(QueryRule::eq("bestFriend", "A")));

        let many = Query::any(vec![
            QueryRule::eq("bestFriend", "A"),
            QueryRule::eq("worstEnemy", "A"),
        ])
        .unwrap();
        assert!(matches!(many.rule, Some(QueryRule::Or(ref rules)) if rules.len() == 2));
        assert_eq!(many.limit, None);
    }

    #[test]
    fn test_aggregate_result_lookup() {
        let result = AggregateResult {
            x_labels: vec!["a".into(), "b".into()],
            y_labels: vec![],
            matrix: vec![vec![2], vec![1]],
        };
        assert_eq!(result.get("a", ""), Some(2));
        assert_eq!(result.get("b", ""), Some(1));
        assert_eq!(result.get("c", ""), None);
    }
}

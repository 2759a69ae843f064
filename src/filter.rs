//! Value-filter expressions over annotation tables.
//!
//! Filters are the string predicates accepted by [`crate::get_anndata`],
//! e.g. `cell_type == 'B cell' and disease == 'COVID-19'` or
//! `feature_id in ['ENSG00000161798', 'ENSG00000188229']`. They are parsed
//! here and evaluated lazily against a `DataFrame`, yielding the ordered
//! row positions that satisfy the predicate.

mod eval;
mod parse;

use anyhow::Result;
use polars::prelude::DataFrame;

/// A literal on the right-hand side of a comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// A parsed value-filter expression.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueFilter {
    Cmp {
        column: String,
        op: CmpOp,
        value: Literal,
    },
    In {
        column: String,
        values: Vec<Literal>,
    },
    Not(Box<ValueFilter>),
    And(Box<ValueFilter>, Box<ValueFilter>),
    Or(Box<ValueFilter>, Box<ValueFilter>),
}

impl ValueFilter {
    pub fn parse(input: &str) -> Result<Self> {
        parse::parse(input)
    }

    /// Ordered positions of the rows of `df` satisfying the filter.
    ///
    /// Referencing a column `df` does not have is an error; a filter that
    /// simply matches nothing is not.
    pub fn matches(&self, df: &DataFrame) -> Result<Vec<usize>> {
        eval::matches(self, df)
    }
}

impl std::str::FromStr for ValueFilter {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl std::fmt::Display for CmpOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
        };
        f.write_str(s)
    }
}

impl std::fmt::Display for Literal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Literal::Int(v) => write!(f, "{}", v),
            // {:?} keeps a trailing ".0" so the text re-parses as a float
            Literal::Float(v) => write!(f, "{:?}", v),
            Literal::Str(v) if v.contains('\'') => write!(f, "\"{}\"", v),
            Literal::Str(v) => write!(f, "'{}'", v),
            Literal::Bool(true) => f.write_str("True"),
            Literal::Bool(false) => f.write_str("False"),
        }
    }
}

impl std::fmt::Display for ValueFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueFilter::Cmp { column, op, value } => write!(f, "{} {} {}", column, op, value),
            ValueFilter::In { column, values } => {
                write!(f, "{} in [", column)?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                f.write_str("]")
            }
            ValueFilter::Not(x) => write!(f, "not ({})", x),
            ValueFilter::And(a, b) => write!(f, "({}) and ({})", a, b),
            ValueFilter::Or(a, b) => write!(f, "({}) or ({})", a, b),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::df;
    use proptest::prelude::*;

    fn obs() -> DataFrame {
        df!(
            "soma_joinid" => &[0i64, 1, 2, 3, 4],
            "cell_type" => &["B cell", "B cell", "neuron", "B cell", "neuron"],
            "disease" => &["COVID-19", "normal", "COVID-19", "COVID-19", "normal"],
            "n_genes" => &[100i64, 250, 40, 305, 80],
            "is_primary_data" => &[true, false, true, true, false],
        )
        .unwrap()
    }

    #[test]
    fn equality_and_conjunction() {
        let filter = ValueFilter::parse("cell_type == 'B cell' and disease == 'COVID-19'").unwrap();
        assert_eq!(filter.matches(&obs()).unwrap(), vec![0, 3]);
    }

    #[test]
    fn membership() {
        let filter = ValueFilter::parse("soma_joinid in [4, 0, 2]").unwrap();
        assert_eq!(filter.matches(&obs()).unwrap(), vec![0, 2, 4]);
    }

    #[test]
    fn ordering_and_negation() {
        let filter = ValueFilter::parse("not (n_genes < 100)").unwrap();
        assert_eq!(filter.matches(&obs()).unwrap(), vec![0, 1, 3]);
        let filter = ValueFilter::parse("n_genes >= 250 or n_genes <= 40").unwrap();
        assert_eq!(filter.matches(&obs()).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn booleans_and_precedence() {
        // `and` binds tighter than `or`
        let filter =
            ValueFilter::parse("disease == 'normal' or is_primary_data == True and n_genes > 200")
                .unwrap();
        assert_eq!(filter.matches(&obs()).unwrap(), vec![1, 3, 4]);
    }

    #[test]
    fn no_match_is_not_an_error() {
        let filter = ValueFilter::parse("cell_type == 'hepatocyte'").unwrap();
        assert_eq!(filter.matches(&obs()).unwrap(), Vec::<usize>::new());
    }

    #[test]
    fn unknown_column_is_an_error() {
        let filter = ValueFilter::parse("no_such_column == 1").unwrap();
        assert!(filter.matches(&obs()).is_err());
    }

    #[test]
    fn malformed_expressions_fail_to_parse() {
        for bad in [
            "",
            "cell_type ==",
            "== 'B cell'",
            "cell_type = 'B cell'",
            "cell_type == 'B cell' and",
            "(cell_type == 'B cell'",
            "cell_type in []",
            "cell_type in ['a',]",
            "cell_type == 'unterminated",
            "cell_type == 'a' garbage",
            "n_genes > > 2",
        ] {
            assert!(ValueFilter::parse(bad).is_err(), "accepted: {:?}", bad);
        }
    }

    fn ident() -> impl Strategy<Value = String> {
        "[a-z_][a-z0-9_]{0,8}".prop_filter("keyword", |s| {
            !matches!(
                s.as_str(),
                "and" | "or" | "not" | "in" | "true" | "false"
            )
        })
    }

    fn literal() -> impl Strategy<Value = Literal> {
        prop_oneof![
            any::<i64>().prop_map(Literal::Int),
            (-1e6f64..1e6).prop_map(Literal::Float),
            "[a-zA-Z0-9 _.-]{0,12}".prop_map(Literal::Str),
            any::<bool>().prop_map(Literal::Bool),
        ]
    }

    fn value_filter() -> impl Strategy<Value = ValueFilter> {
        let leaf = prop_oneof![
            (ident(), any::<u8>(), literal()).prop_map(|(column, op, value)| {
                let op = match op % 6 {
                    0 => CmpOp::Eq,
                    1 => CmpOp::Ne,
                    2 => CmpOp::Lt,
                    3 => CmpOp::Le,
                    4 => CmpOp::Gt,
                    _ => CmpOp::Ge,
                };
                ValueFilter::Cmp { column, op, value }
            }),
            (ident(), proptest::collection::vec(literal(), 1..4))
                .prop_map(|(column, values)| ValueFilter::In { column, values }),
        ];
        leaf.prop_recursive(4, 24, 2, |inner| {
            prop_oneof![
                inner.clone().prop_map(|x| ValueFilter::Not(Box::new(x))),
                (inner.clone(), inner.clone())
                    .prop_map(|(a, b)| ValueFilter::And(Box::new(a), Box::new(b))),
                (inner.clone(), inner)
                    .prop_map(|(a, b)| ValueFilter::Or(Box::new(a), Box::new(b))),
            ]
        })
    }

    proptest! {
        #[test]
        fn rendering_round_trips(filter in value_filter()) {
            let reparsed = ValueFilter::parse(&filter.to_string()).unwrap();
            prop_assert_eq!(reparsed, filter);
        }
    }
}

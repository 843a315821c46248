//! Linear utility specifications and their coefficients.
//!
//! # Spec CSV
//!
//! One row per term; every column after `Expression` is a coefficient
//! column (one per segment, or one per alternative for simple-simulate
//! models such as mode choice):
//!
//! ```csv
//! Label,Description,Expression,work,school
//! util_dist,Distance,skim.DIST,coef_dist_work,coef_dist_school
//! util_size,Size variable,ln(alt.size_term + 1),1,1
//! ```
//!
//! A cell is either a number or the name of a coefficient.  `Description`
//! is optional.
//!
//! # Coefficients CSV
//!
//! ```csv
//! coefficient_name,value
//! coef_dist_work,-0.12
//! ```

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use serde::Deserialize;

use crate::{ChoiceError, ChoiceResult};

/// Named scalar constants usable in expressions.
pub type Constants = BTreeMap<String, f64>;

const LABEL: &str = "Label";
const DESCRIPTION: &str = "Description";
const EXPRESSION: &str = "Expression";

/// One resolved utility term.
#[derive(Clone, Debug, PartialEq)]
pub struct Term {
    pub label:       String,
    pub expression:  String,
    pub coefficient: f64,
}

/// Coefficient values by name.
#[derive(Clone, Debug, Default)]
pub struct Coefficients {
    values: BTreeMap<String, f64>,
}

#[derive(Deserialize)]
struct CoefficientRecord {
    coefficient_name: String,
    value:            f64,
}

impl Coefficients {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: f64) {
        self.values.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Load a coefficients file.
pub fn load_coefficients_csv(path: &Path) -> ChoiceResult<Coefficients> {
    load_coefficients_reader(std::fs::File::open(path)?)
}

/// Like [`load_coefficients_csv`] but accepts any `Read` source.
pub fn load_coefficients_reader<R: Read>(reader: R) -> ChoiceResult<Coefficients> {
    let mut out = Coefficients::new();
    for record in csv::Reader::from_reader(reader).deserialize() {
        let record: CoefficientRecord = record?;
        out.set(record.coefficient_name, record.value);
    }
    Ok(out)
}

/// A spec as read from disk: expressions plus unresolved coefficient cells.
#[derive(Clone, Debug, Default)]
pub struct UtilitySpec {
    labels:      Vec<String>,
    expressions: Vec<String>,
    columns:     Vec<String>,
    /// `cells[row][column]`.
    cells:       Vec<Vec<String>>,
}

impl UtilitySpec {
    /// Coefficient column names, in file order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    pub fn len(&self) -> usize {
        self.expressions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.expressions.is_empty()
    }

    pub fn expressions(&self) -> &[String] {
        &self.expressions
    }

    /// Terms of one coefficient column.  Coefficient names are looked up in
    /// `coefficients`; plain numbers are used as is.
    pub fn terms(&self, column: &str, coefficients: Option<&Coefficients>) -> ChoiceResult<Vec<Term>> {
        let col = self
            .columns
            .iter()
            .position(|c| c == column)
            .ok_or_else(|| ChoiceError::UnknownSpecColumn(column.to_owned()))?;
        self.cells
            .iter()
            .zip(&self.labels)
            .zip(&self.expressions)
            .map(|((row, label), expression)| {
                Ok(Term {
                    label:       label.clone(),
                    expression:  expression.clone(),
                    coefficient: resolve_cell(&row[col], coefficients)?,
                })
            })
            .collect()
    }
}

fn resolve_cell(cell: &str, coefficients: Option<&Coefficients>) -> ChoiceResult<f64> {
    let cell = cell.trim();
    if cell.is_empty() {
        return Ok(0.0);
    }
    if let Ok(v) = cell.parse::<f64>() {
        return Ok(v);
    }
    coefficients
        .and_then(|c| c.get(cell))
        .ok_or_else(|| ChoiceError::UnknownCoefficient(cell.to_owned()))
}

/// Load a spec file.
pub fn load_spec_csv(path: &Path) -> ChoiceResult<UtilitySpec> {
    load_spec_reader(std::fs::File::open(path)?)
}

/// Like [`load_spec_csv`] but accepts any `Read` source.
pub fn load_spec_reader<R: Read>(reader: R) -> ChoiceResult<UtilitySpec> {
    let mut rdr = csv::Reader::from_reader(reader);
    let headers = rdr.headers()?.clone();
    let position = |name: &str| headers.iter().position(|h| h.trim() == name);
    let expr_col = position(EXPRESSION).ok_or_else(|| ChoiceError::UnknownSpecColumn(EXPRESSION.to_owned()))?;
    let label_col = position(LABEL);
    let desc_col = position(DESCRIPTION);

    let coef_cols: Vec<usize> = (0..headers.len())
        .filter(|&i| i != expr_col && Some(i) != label_col && Some(i) != desc_col)
        .collect();

    let mut spec = UtilitySpec {
        columns: coef_cols.iter().map(|&i| headers[i].trim().to_owned()).collect(),
        ..UtilitySpec::default()
    };
    for (row, record) in rdr.records().enumerate() {
        let record = record?;
        let expression = record.get(expr_col).unwrap_or_default().trim();
        if expression.is_empty() {
            continue;
        }
        let label = label_col
            .and_then(|i| record.get(i))
            .filter(|l| !l.trim().is_empty())
            .map_or_else(|| format!("term_{row}"), |l| l.trim().to_owned());
        spec.labels.push(label);
        spec.expressions.push(expression.to_owned());
        spec.cells.push(coef_cols.iter().map(|&i| record.get(i).unwrap_or_default().to_owned()).collect());
    }
    Ok(spec)
}

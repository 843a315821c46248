//! Columnar table with an `i64` row index.
//!
//! `Table` is the unit of data the pipeline passes around: households,
//! persons, tours, land use, and the duplicated-index sample tables produced
//! by destination sampling.  Columns are typed vectors kept in insertion
//! order; the index is not required to be unique unless an operation says so.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crate::{CoreError, CoreResult, IdMap};

// ── DType / Value ─────────────────────────────────────────────────────────────

/// Element type of a [`Column`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum DType {
    Int,
    Float,
    Str,
    Bool,
}

impl DType {
    pub fn as_str(self) -> &'static str {
        match self {
            DType::Int   => "int",
            DType::Float => "float",
            DType::Str   => "str",
            DType::Bool  => "bool",
        }
    }

    /// Whether a column of `other` can be stacked under one of `self`.
    /// Numeric types mix; text only stacks on text.
    pub fn appendable(self, other: DType) -> Result<(), (DType, DType)> {
        if self == other || (self != DType::Str && other != DType::Str) {
            Ok(())
        } else {
            Err((self, other))
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DType {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        match s {
            "int"   => Ok(DType::Int),
            "float" => Ok(DType::Float),
            "str"   => Ok(DType::Str),
            "bool"  => Ok(DType::Bool),
            other   => Err(CoreError::Parse(format!("unknown column type '{other}'"))),
        }
    }
}

/// A single cell.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
}

impl Value {
    /// Numeric view; `Bool` maps to 0/1, `Str` has none.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v)   => Some(*v as f64),
            Value::Float(v) => Some(*v),
            Value::Bool(v)  => Some(if *v { 1.0 } else { 0.0 }),
            Value::Str(_)   => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v)   => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Str(v)   => f.write_str(v),
            Value::Bool(v)  => write!(f, "{v}"),
        }
    }
}

// ── Column ────────────────────────────────────────────────────────────────────

/// A typed column vector.
#[derive(Clone, Debug, PartialEq)]
pub enum Column {
    Int(Vec<i64>),
    Float(Vec<f64>),
    Str(Vec<String>),
    Bool(Vec<bool>),
}

impl Column {
    pub fn with_capacity(dtype: DType, n: usize) -> Column {
        match dtype {
            DType::Int   => Column::Int(Vec::with_capacity(n)),
            DType::Float => Column::Float(Vec::with_capacity(n)),
            DType::Str   => Column::Str(Vec::with_capacity(n)),
            DType::Bool  => Column::Bool(Vec::with_capacity(n)),
        }
    }

    /// Placeholder values for `n` rows that have no data for a column of
    /// type `dtype`: empty strings for text, NaN for everything else.
    pub fn missing(dtype: DType, n: usize) -> Column {
        match dtype {
            DType::Str => Column::Str(vec![String::new(); n]),
            _          => Column::Float(vec![f64::NAN; n]),
        }
    }

    pub fn dtype(&self) -> DType {
        match self {
            Column::Int(_)   => DType::Int,
            Column::Float(_) => DType::Float,
            Column::Str(_)   => DType::Str,
            Column::Bool(_)  => DType::Bool,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Column::Int(v)   => v.len(),
            Column::Float(v) => v.len(),
            Column::Str(v)   => v.len(),
            Column::Bool(v)  => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, row: usize) -> Option<Value> {
        match self {
            Column::Int(v)   => v.get(row).map(|x| Value::Int(*x)),
            Column::Float(v) => v.get(row).map(|x| Value::Float(*x)),
            Column::Str(v)   => v.get(row).map(|x| Value::Str(x.clone())),
            Column::Bool(v)  => v.get(row).map(|x| Value::Bool(*x)),
        }
    }

    /// Numeric value at `row`; `None` for text columns or out-of-range rows.
    #[inline]
    pub fn f64_at(&self, row: usize) -> Option<f64> {
        match self {
            Column::Int(v)   => v.get(row).map(|x| *x as f64),
            Column::Float(v) => v.get(row).copied(),
            Column::Bool(v)  => v.get(row).map(|x| if *x { 1.0 } else { 0.0 }),
            Column::Str(_)   => None,
        }
    }

    /// Whole column as `f64`; `None` for text columns.
    pub fn to_f64(&self) -> Option<Vec<f64>> {
        match self {
            Column::Int(v)   => Some(v.iter().map(|x| *x as f64).collect()),
            Column::Float(v) => Some(v.clone()),
            Column::Bool(v)  => Some(v.iter().map(|x| if *x { 1.0 } else { 0.0 }).collect()),
            Column::Str(_)   => None,
        }
    }

    /// Gather rows by position.  Positions must be in range.
    pub fn take(&self, rows: &[usize]) -> Column {
        match self {
            Column::Int(v)   => Column::Int(rows.iter().map(|&r| v[r]).collect()),
            Column::Float(v) => Column::Float(rows.iter().map(|&r| v[r]).collect()),
            Column::Str(v)   => Column::Str(rows.iter().map(|&r| v[r].clone()).collect()),
            Column::Bool(v)  => Column::Bool(rows.iter().map(|&r| v[r]).collect()),
        }
    }

    fn into_float(self) -> Column {
        match self {
            Column::Int(v)  => Column::Float(v.into_iter().map(|x| x as f64).collect()),
            Column::Bool(v) => Column::Float(v.into_iter().map(|x| if x { 1.0 } else { 0.0 }).collect()),
            other           => other,
        }
    }

    /// Append `other` below `self`.
    ///
    /// Mixed numeric types are promoted to `Float`.  Text never mixes with
    /// numbers; that case returns the two offending types.
    pub fn append(&mut self, other: Column) -> Result<(), (DType, DType)> {
        let (a, b) = (self.dtype(), other.dtype());
        if a == b {
            match (self, other) {
                (Column::Int(x), Column::Int(y))     => x.extend(y),
                (Column::Float(x), Column::Float(y)) => x.extend(y),
                (Column::Str(x), Column::Str(y))     => x.extend(y),
                (Column::Bool(x), Column::Bool(y))   => x.extend(y),
                _ => unreachable!("dtypes checked equal"),
            }
            return Ok(());
        }
        a.appendable(b)?;
        let head = std::mem::replace(self, Column::Float(Vec::new())).into_float();
        let (Column::Float(mut x), Column::Float(y)) = (head, other.into_float()) else {
            return Err((a, b));
        };
        x.extend(y);
        *self = Column::Float(x);
        Ok(())
    }

    /// Parse one text cell and push it.  Used by the CSV readers.
    pub fn push_parsed(&mut self, cell: &str) -> CoreResult<()> {
        let bad = |t: &str| CoreError::Parse(format!("'{cell}' is not a valid {t}"));
        match self {
            Column::Int(v)   => v.push(cell.trim().parse().map_err(|_| bad("int"))?),
            Column::Float(v) => v.push(cell.trim().parse().map_err(|_| bad("float"))?),
            Column::Str(v)   => v.push(cell.to_owned()),
            Column::Bool(v)  => v.push(match cell.trim() {
                "true" | "True" | "1"  => true,
                "false" | "False" | "0" => false,
                _ => return Err(bad("bool")),
            }),
        }
        Ok(())
    }
}

impl From<Vec<i64>> for Column {
    fn from(v: Vec<i64>) -> Self {
        Column::Int(v)
    }
}

impl From<Vec<f64>> for Column {
    fn from(v: Vec<f64>) -> Self {
        Column::Float(v)
    }
}

impl From<Vec<String>> for Column {
    fn from(v: Vec<String>) -> Self {
        Column::Str(v)
    }
}

impl From<Vec<&str>> for Column {
    fn from(v: Vec<&str>) -> Self {
        Column::Str(v.into_iter().map(str::to_owned).collect())
    }
}

impl From<Vec<bool>> for Column {
    fn from(v: Vec<bool>) -> Self {
        Column::Bool(v)
    }
}

fn mismatch(name: &str, expected: DType, found: DType) -> CoreError {
    CoreError::TypeMismatch { column: name.to_owned(), expected: expected.as_str(), found: found.as_str() }
}

// ── Table ─────────────────────────────────────────────────────────────────────

/// An indexed, ordered collection of equal-length columns.
#[derive(Clone, Debug, PartialEq)]
pub struct Table {
    index_name: String,
    index:      Vec<i64>,
    names:      Vec<String>,
    columns:    Vec<Column>,
}

impl Table {
    pub fn new(index_name: impl Into<String>, index: Vec<i64>) -> Self {
        Self {
            index_name: index_name.into(),
            index,
            names:      Vec::new(),
            columns:    Vec::new(),
        }
    }

    /// Builder-style [`set_column`](Self::set_column).
    pub fn with_column(mut self, name: impl Into<String>, col: impl Into<Column>) -> CoreResult<Self> {
        self.set_column(name, col)?;
        Ok(self)
    }

    /// Insert a column, replacing any existing column of the same name in place.
    pub fn set_column(&mut self, name: impl Into<String>, col: impl Into<Column>) -> CoreResult<()> {
        let name = name.into();
        let col = col.into();
        if col.len() != self.index.len() {
            return Err(CoreError::LengthMismatch {
                column:   name,
                expected: self.index.len(),
                got:      col.len(),
            });
        }
        match self.position(&name) {
            Some(p) => self.columns[p] = col,
            None => {
                self.names.push(name);
                self.columns.push(col);
            }
        }
        Ok(())
    }

    pub fn drop_column(&mut self, name: &str) -> Option<Column> {
        let p = self.position(name)?;
        self.names.remove(p);
        Some(self.columns.remove(p))
    }

    pub fn rename_column(&mut self, from: &str, to: impl Into<String>) -> CoreResult<()> {
        let p = self.position(from).ok_or_else(|| self.not_found(from))?;
        let to = to.into();
        if let Some(q) = self.position(&to) {
            if q != p {
                self.names.remove(q);
                self.columns.remove(q);
            }
        }
        let p = self.position(from).ok_or_else(|| self.not_found(from))?;
        self.names[p] = to;
        Ok(())
    }

    // ── Shape & index ─────────────────────────────────────────────────────

    #[inline]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    pub fn set_index_name(&mut self, name: impl Into<String>) {
        self.index_name = name.into();
    }

    #[inline]
    pub fn index(&self) -> &[i64] {
        &self.index
    }

    /// `true` if the index is non-decreasing.
    pub fn is_monotonic_increasing(&self) -> bool {
        self.index.windows(2).all(|w| w[0] <= w[1])
    }

    pub fn ensure_unique_index(&self) -> CoreResult<()> {
        let mut seen = HashSet::with_capacity(self.index.len());
        for &id in &self.index {
            if !seen.insert(id) {
                return Err(CoreError::DuplicateIndex { index: self.index_name.clone(), value: id });
            }
        }
        Ok(())
    }

    /// Map from index value to row position.  Requires a unique index.
    pub fn positions(&self) -> CoreResult<IdMap<i64, usize>> {
        let mut map = IdMap::default();
        map.reserve(self.index.len());
        for (row, &id) in self.index.iter().enumerate() {
            if map.insert(id, row).is_some() {
                return Err(CoreError::DuplicateIndex { index: self.index_name.clone(), value: id });
            }
        }
        Ok(map)
    }

    /// Replace the index with an integer column, which is removed.
    pub fn set_index(mut self, column: &str) -> CoreResult<Table> {
        let ids = self.ints(column)?.to_vec();
        self.drop_column(column);
        self.index = ids;
        self.index_name = column.to_owned();
        Ok(self)
    }

    /// Move the index into a leading integer column and renumber rows `0..n`.
    pub fn reset_index(self, new_index_name: impl Into<String>) -> Table {
        let n = self.index.len() as i64;
        let mut names = Vec::with_capacity(self.names.len() + 1);
        let mut columns = Vec::with_capacity(self.columns.len() + 1);
        names.push(self.index_name);
        columns.push(Column::Int(self.index));
        names.extend(self.names);
        columns.extend(self.columns);
        Table {
            index_name: new_index_name.into(),
            index: (0..n).collect(),
            names,
            columns,
        }
    }

    // ── Column access ─────────────────────────────────────────────────────

    fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    fn not_found(&self, name: &str) -> CoreError {
        CoreError::ColumnNotFound { column: name.to_owned(), index: self.index_name.clone() }
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, &Column)> {
        self.names.iter().map(String::as_str).zip(self.columns.iter())
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.position(name).map(|p| &self.columns[p])
    }

    pub fn require(&self, name: &str) -> CoreResult<&Column> {
        self.column(name).ok_or_else(|| self.not_found(name))
    }


    pub fn ints(&self, name: &str) -> CoreResult<&[i64]> {
        match self.require(name)? {
            Column::Int(v) => Ok(v),
            other          => Err(mismatch(name, DType::Int, other.dtype())),
        }
    }

    pub fn floats(&self, name: &str) -> CoreResult<&[f64]> {
        match self.require(name)? {
            Column::Float(v) => Ok(v),
            other            => Err(mismatch(name, DType::Float, other.dtype())),
        }
    }

    pub fn strs(&self, name: &str) -> CoreResult<&[String]> {
        match self.require(name)? {
            Column::Str(v) => Ok(v),
            other          => Err(mismatch(name, DType::Str, other.dtype())),
        }
    }

    pub fn bools(&self, name: &str) -> CoreResult<&[bool]> {
        match self.require(name)? {
            Column::Bool(v) => Ok(v),
            other           => Err(mismatch(name, DType::Bool, other.dtype())),
        }
    }

    /// Any non-text column converted to `f64`.
    pub fn numeric(&self, name: &str) -> CoreResult<Vec<f64>> {
        let col = self.require(name)?;
        col.to_f64().ok_or_else(|| mismatch(name, DType::Float, col.dtype()))
    }

    pub fn get(&self, name: &str, row: usize) -> Option<Value> {
        self.column(name)?.get(row)
    }

    // ── Row/column selection ──────────────────────────────────────────────

    /// Copy of the table restricted to `names`, in the order given.
    pub fn select(&self, names: &[&str]) -> CoreResult<Table> {
        let mut out = Table::new(self.index_name.clone(), self.index.clone());
        for &name in names {
            out.names.push(name.to_owned());
            out.columns.push(self.require(name)?.clone());
        }
        Ok(out)
    }

    /// Gather rows by position.
    pub fn take(&self, rows: &[usize]) -> Table {
        Table {
            index_name: self.index_name.clone(),
            index:      rows.iter().map(|&r| self.index[r]).collect(),
            names:      self.names.clone(),
            columns:    self.columns.iter().map(|c| c.take(rows)).collect(),
        }
    }

    pub fn filter(&self, mask: &[bool]) -> Table {
        let rows: Vec<usize> = mask.iter().enumerate().filter(|(_, keep)| **keep).map(|(i, _)| i).collect();
        self.take(&rows)
    }

    /// Stable sort by index value.
    pub fn sort_index(&self) -> Table {
        let mut rows: Vec<usize> = (0..self.len()).collect();
        rows.sort_by_key(|&r| self.index[r]);
        self.take(&rows)
    }

    // ── Concatenation ─────────────────────────────────────────────────────

    /// Stack tables vertically.  All parts must carry the same columns;
    /// column order follows the first part.
    pub fn concat(parts: Vec<Table>) -> CoreResult<Table> {
        let mut parts = parts.into_iter();
        let Some(mut out) = parts.next() else {
            return Ok(Table::new(String::new(), Vec::new()));
        };
        for mut part in parts {
            if part.width() != out.width() {
                return Err(CoreError::Config(format!(
                    "cannot concat tables with {} and {} columns",
                    out.width(),
                    part.width()
                )));
            }
            for (name, col) in out.names.iter().zip(out.columns.iter_mut()) {
                let next = part.drop_column(name).ok_or_else(|| CoreError::ColumnNotFound {
                    column: name.clone(),
                    index:  part.index_name.clone(),
                })?;
                col.append(next).map_err(|(a, b)| CoreError::TypeMismatch {
                    column:   name.clone(),
                    expected: a.as_str(),
                    found:    b.as_str(),
                })?;
            }
            out.index.extend(part.index);
        }
        Ok(out)
    }

    /// Append rows from `other`.
    ///
    /// Index values must be disjoint.  Existing column order is kept and
    /// columns only present in `other` go at the end.  Any cell without data
    /// gets `""` in a text column, whether the column is new or old; numeric
    /// cells are filled with NaN, which promotes integer and boolean columns
    /// to `Float`.  On error `self` is left unchanged.
    pub fn extend_rows(&mut self, mut other: Table) -> CoreResult<()> {
        let existing: HashSet<i64> = self.index.iter().copied().collect();
        let overlap: Vec<i64> = other.index.iter().copied().filter(|id| existing.contains(id)).collect();
        if let Some(&first) = overlap.first() {
            return Err(CoreError::OverlappingIndex { count: overlap.len(), first });
        }

        let (n_old, n_new) = (self.len(), other.len());
        for (name, col) in self.names.iter().zip(&self.columns) {
            if let Some(tail) = other.column(name) {
                col.dtype().appendable(tail.dtype()).map_err(|(a, b)| mismatch(name, a, b))?;
            }
        }

        for (name, col) in self.names.iter().zip(self.columns.iter_mut()) {
            let tail = other
                .drop_column(name)
                .unwrap_or_else(|| Column::missing(col.dtype(), n_new));
            col.append(tail).map_err(|(a, b)| mismatch(name, a, b))?;
        }
        for (name, tail) in other.names.into_iter().zip(other.columns) {
            let mut col = Column::missing(tail.dtype(), n_old);
            col.append(tail).map_err(|(a, b)| mismatch(&name, a, b))?;
            self.names.push(name);
            self.columns.push(col);
        }
        self.index.extend(other.index);
        Ok(())
    }

    /// Add the columns of `other` that `self` does not already have.
    /// Both indexes must be identical, order included.
    pub fn extend_columns(&mut self, other: Table) -> CoreResult<()> {
        if self.index != other.index {
            return Err(CoreError::IndexMismatch);
        }
        for (name, col) in other.names.into_iter().zip(other.columns) {
            if !self.has_column(&name) {
                self.names.push(name);
                self.columns.push(col);
            }
        }
        Ok(())
    }
}

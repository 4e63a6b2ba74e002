use std::collections::{BTreeMap, BTreeSet, HashSet};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

pub type Row = BTreeMap<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Integer,
    Decimal,
    Text,
    Boolean,
    DateTime,
    Json,
}

impl ColumnKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::Decimal => "decimal",
            Self::Text => "text",
            Self::Boolean => "boolean",
            Self::DateTime => "datetime",
            Self::Json => "json",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub kind: ColumnKind,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl Column {
    pub fn new(name: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            name: name.into(),
            kind,
            nullable: false,
            default: None,
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Value given to rows that do not carry this column.
    fn fill_value(&self) -> Option<Value> {
        match &self.default {
            Some(value) => Some(value.clone()),
            None if self.nullable => Some(Value::Null),
            None => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Index {
    pub name: String,
    pub columns: Vec<String>,
    #[serde(default)]
    pub unique: bool,
}

impl Index {
    pub fn new(name: impl Into<String>, columns: &[&str]) -> Self {
        Self {
            name: name.into(),
            columns: columns.iter().map(|column| column.to_string()).collect(),
            unique: false,
        }
    }

    pub fn unique(name: impl Into<String>, columns: &[&str]) -> Self {
        Self {
            unique: true,
            ..Self::new(name, columns)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    #[serde(default)]
    pub columns: Vec<Column>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub indexes: Vec<Index>,
    #[serde(default)]
    pub rows: Vec<Row>,
}

impl Table {
    pub fn new(columns: Vec<Column>) -> Self {
        Self {
            columns,
            indexes: Vec::new(),
            rows: Vec::new(),
        }
    }

    pub fn with_index(mut self, index: Index) -> Self {
        self.indexes.push(index);
        self
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|column| column.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn index(&self, name: &str) -> Option<&Index> {
        self.indexes.iter().find(|index| index.name == name)
    }

    pub fn next_id(&self) -> i64 {
        self.rows
            .iter()
            .filter_map(|row| row.get("id").and_then(Value::as_i64))
            .max()
            .unwrap_or(0)
            + 1
    }

    fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for column in &self.columns {
            if column.name.trim().is_empty() {
                return Err(anyhow!("column name must not be empty"));
            }
            if !seen.insert(column.name.as_str()) {
                return Err(anyhow!("duplicate column '{}'", column.name));
            }
        }
        for index in &self.indexes {
            self.validate_index(index)?;
        }
        Ok(())
    }

    fn validate_index(&self, index: &Index) -> Result<()> {
        if index.columns.is_empty() {
            return Err(anyhow!("index '{}' must cover at least one column", index.name));
        }
        if let Some(missing) = index.columns.iter().find(|name| !self.has_column(name)) {
            return Err(anyhow!(
                "index '{}' references unknown column '{}'",
                index.name,
                missing
            ));
        }
        if index.unique {
            self.check_unique(index)?;
        }
        Ok(())
    }

    // NULLs never collide, matching SQL unique index semantics.
    fn check_unique(&self, index: &Index) -> Result<()> {
        let mut seen = BTreeSet::new();
        for row in &self.rows {
            let values = index
                .columns
                .iter()
                .map(|name| row.get(name).cloned().unwrap_or(Value::Null))
                .collect::<Vec<_>>();
            if values.iter().any(Value::is_null) {
                continue;
            }
            let key = values
                .iter()
                .map(Value::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            if !seen.insert(key.clone()) {
                return Err(anyhow!(
                    "duplicate value ({key}) violates unique index '{}'",
                    index.name
                ));
            }
        }
        Ok(())
    }
}

/// The persisted table set that migrations operate on.
///
/// Every mutation either applies completely or leaves the schema untouched,
/// so a failing call never needs a caller-side repair.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    #[serde(default)]
    pub tables: BTreeMap<String, Table>,
}

impl Schema {
    pub fn from_json_str(input: &str) -> Result<Self> {
        let schema: Self = serde_json::from_str(input).context("failed to parse schema document")?;
        for (name, table) in &schema.tables {
            table
                .validate()
                .with_context(|| format!("invalid table '{name}' in schema document"))?;
        }
        Ok(schema)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("failed to serialize schema document")
    }

    /// SHA-256 over the canonical serialization; equal fingerprints mean
    /// byte-identical persisted state.
    pub fn fingerprint(&self) -> Result<String> {
        let bytes = serde_json::to_vec(self).context("failed to serialize schema document")?;
        Ok(hex::encode(Sha256::digest(&bytes)))
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    pub fn table(&self, name: &str) -> Result<&Table> {
        self.tables
            .get(name)
            .ok_or_else(|| anyhow!("table '{name}' does not exist"))
    }

    pub fn table_mut(&mut self, name: &str) -> Result<&mut Table> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| anyhow!("table '{name}' does not exist"))
    }

    pub fn create_table(&mut self, name: &str, table: Table) -> Result<()> {
        if self.has_table(name) {
            return Err(anyhow!("table '{name}' already exists"));
        }
        table
            .validate()
            .with_context(|| format!("invalid definition for table '{name}'"))?;
        self.tables.insert(name.to_string(), table);
        Ok(())
    }

    pub fn rename_table(&mut self, from: &str, to: &str) -> Result<()> {
        if self.has_table(to) {
            return Err(anyhow!(
                "cannot rename table '{from}' to '{to}': target already exists"
            ));
        }
        let table = self
            .tables
            .remove(from)
            .ok_or_else(|| anyhow!("cannot rename table '{from}': table does not exist"))?;
        self.tables.insert(to.to_string(), table);
        Ok(())
    }

    pub fn add_column(&mut self, table_name: &str, column: Column) -> Result<()> {
        let table = self.table_mut(table_name)?;
        if table.has_column(&column.name) {
            return Err(anyhow!(
                "column '{table_name}.{}' already exists",
                column.name
            ));
        }

        let fill = column.fill_value();
        if fill.is_none() && !table.rows.is_empty() {
            return Err(anyhow!(
                "cannot add non-null column '{table_name}.{}' without a default to a table with rows",
                column.name
            ));
        }
        if let Some(fill) = fill {
            for row in &mut table.rows {
                row.insert(column.name.clone(), fill.clone());
            }
        }
        table.columns.push(column);
        Ok(())
    }

    pub fn drop_column(&mut self, table_name: &str, column_name: &str) -> Result<()> {
        let table = self.table_mut(table_name)?;
        if !table.has_column(column_name) {
            return Err(anyhow!(
                "cannot drop column '{table_name}.{column_name}': column does not exist"
            ));
        }
        if let Some(index) = table
            .indexes
            .iter()
            .find(|index| index.columns.iter().any(|name| name == column_name))
        {
            return Err(anyhow!(
                "cannot drop column '{table_name}.{column_name}': used by index '{}'",
                index.name
            ));
        }

        table.columns.retain(|column| column.name != column_name);
        for row in &mut table.rows {
            row.remove(column_name);
        }
        Ok(())
    }

    pub fn rename_column(&mut self, table_name: &str, from: &str, to: &str) -> Result<()> {
        let table = self.table_mut(table_name)?;
        if table.has_column(to) {
            return Err(anyhow!(
                "cannot rename column '{table_name}.{from}' to '{to}': target already exists"
            ));
        }
        let column = table
            .columns
            .iter_mut()
            .find(|column| column.name == from)
            .ok_or_else(|| {
                anyhow!("cannot rename column '{table_name}.{from}': column does not exist")
            })?;
        column.name = to.to_string();

        for row in &mut table.rows {
            if let Some(value) = row.remove(from) {
                row.insert(to.to_string(), value);
            }
        }
        for index in &mut table.indexes {
            for name in &mut index.columns {
                if name == from {
                    *name = to.to_string();
                }
            }
        }
        Ok(())
    }

    /// Changes a column definition in place. Renames go through
    /// [`Schema::rename_column`].
    pub fn alter_column<F>(&mut self, table_name: &str, column_name: &str, change: F) -> Result<()>
    where
        F: FnOnce(&mut Column),
    {
        let table = self.table_mut(table_name)?;
        let position = table
            .columns
            .iter()
            .position(|column| column.name == column_name)
            .ok_or_else(|| {
                anyhow!("cannot alter column '{table_name}.{column_name}': column does not exist")
            })?;

        let mut altered = table.columns[position].clone();
        change(&mut altered);
        if altered.name != column_name {
            return Err(anyhow!(
                "cannot alter column '{table_name}.{column_name}': use rename_column to rename"
            ));
        }
        if !altered.nullable
            && table
                .rows
                .iter()
                .any(|row| row.get(column_name).map_or(true, Value::is_null))
        {
            return Err(anyhow!(
                "cannot make column '{table_name}.{column_name}' non-null: existing rows hold NULL"
            ));
        }

        table.columns[position] = altered;
        Ok(())
    }

    pub fn create_index(&mut self, table_name: &str, index: Index) -> Result<()> {
        let table = self.table_mut(table_name)?;
        if table.index(&index.name).is_some() {
            return Err(anyhow!(
                "index '{}' already exists on table '{table_name}'",
                index.name
            ));
        }
        table
            .validate_index(&index)
            .with_context(|| format!("cannot create index on table '{table_name}'"))?;
        table.indexes.push(index);
        Ok(())
    }

    /// Inserts a row, filling absent columns from their defaults and
    /// assigning the next `id` when the table has one. Returns the row id
    /// (0 for tables without an `id` column).
    pub fn insert_row(&mut self, table_name: &str, row: Row) -> Result<i64> {
        let table = self.table_mut(table_name)?;
        if let Some(unknown) = row.keys().find(|name| !table.has_column(name)) {
            return Err(anyhow!(
                "cannot insert into '{table_name}': unknown column '{unknown}'"
            ));
        }

        let mut complete = Row::new();
        for column in &table.columns {
            let value = match row.get(&column.name) {
                Some(value) => value.clone(),
                None if column.name == "id" && column.kind == ColumnKind::Integer => {
                    Value::from(table.next_id())
                }
                None => column.fill_value().ok_or_else(|| {
                    anyhow!(
                        "cannot insert into '{table_name}': column '{}' requires a value",
                        column.name
                    )
                })?,
            };
            if value.is_null() && !column.nullable {
                return Err(anyhow!(
                    "cannot insert into '{table_name}': column '{}' is not nullable",
                    column.name
                ));
            }
            complete.insert(column.name.clone(), value);
        }

        let id = complete.get("id").and_then(Value::as_i64).unwrap_or(0);
        table.rows.push(complete);

        let violation = table
            .indexes
            .iter()
            .filter(|index| index.unique)
            .find_map(|index| table.check_unique(index).err());
        if let Some(err) = violation {
            table.rows.pop();
            return Err(err.context(format!("cannot insert into '{table_name}'")));
        }
        Ok(id)
    }
}

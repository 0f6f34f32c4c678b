//! Statement text built by the forms and the table.
//!
//! Values travel as `$[name]` placeholders with a parameter object, except
//! integer keys, which are validated before they are spliced in.

use std::fmt::Write as _;

/// `select <key>,<fields>,<foreign> from <table> order by <key>`.
#[must_use]
pub fn select_records(table: &str, key: &str, fields: &[&str], foreign: &[&str]) -> String {
    let mut columns = String::from(key);
    if fields.is_empty() {
        columns.push_str(",*");
    }
    for name in fields.iter().chain(foreign) {
        let _ = write!(columns, ",{name}");
    }
    format!("select {columns} from {table} order by {key}")
}

/// `insert into <table> (<names>) values ($[name],…)`.
#[must_use]
pub fn insert(table: &str, names: &[&str]) -> String {
    let values: Vec<String> = names.iter().map(|n| format!("$[{n}]")).collect();
    format!(
        "insert into {table} ({}) values ({})",
        names.join(","),
        values.join(",")
    )
}

/// `update <table> set f=$[f],… where <key> = <value>`.
#[must_use]
pub fn update(table: &str, names: &[&str], key: &str, value: i64) -> String {
    let sets: Vec<String> = names.iter().map(|n| format!("{n}=$[{n}]")).collect();
    format!("update {table} set {} where {key} = {value}", sets.join(","))
}

/// `delete from <table> where <field> in (k1,k2,…)`.
#[must_use]
pub fn delete_in(table: &str, field: &str, keys: &[i64]) -> String {
    let keys: Vec<String> = keys.iter().map(i64::to_string).collect();
    format!("delete from {table} where {field} in ({})", keys.join(","))
}

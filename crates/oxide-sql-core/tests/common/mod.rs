#![allow(dead_code)]

use oxide_sql_core::{ConvertContext, Record, Table, TableParser};

pub fn cx() -> ConvertContext {
    ConvertContext::default()
}

pub fn table_of<T: Record>() -> Table {
    TableParser::default()
        .parse(T::descriptor())
        .unwrap_or_else(|e| panic!("Failed to parse {}: {e}", T::descriptor().type_name))
}

pub fn column_names(table: &Table) -> Vec<&str> {
    table.columns.iter().map(|c| c.name.as_str()).collect()
}

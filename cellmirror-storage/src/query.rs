//! Read queries shared by the mirror and direct readers.
//!
//! Each constructor produces the SQL for one read operation plus the tables
//! it touches. The same query runs against the embedded mirror or straight
//! against the system of record; only the relation names differ.

use cellmirror_core::{CellId, MirroredTable, SwTestId};
use rusqlite::types::Value;

/// Which set of relation names a query is rendered against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relations {
    /// Local mirrored tables, e.g. `"CellByPCStation"`.
    Mirror,
    /// Remote source relations, e.g. `"cell_pc_station"`.
    Remote,
}

impl Relations {
    /// Quoted relation name for `table`.
    pub fn name(&self, table: MirroredTable) -> String {
        match self {
            Relations::Mirror => format!("\"{}\"", table.as_str()),
            Relations::Remote => format!("\"{}\"", table.source_relation()),
        }
    }
}

/// A rendered read operation.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadQuery {
    /// Operation name reported when the read fails.
    pub operation: &'static str,
    /// Every table the query reads, in gate-wait order.
    pub tables: Vec<MirroredTable>,
    /// SQL text with `?1`-style placeholders.
    pub sql: String,
    /// Positional parameters bound to `sql`.
    pub params: Vec<Value>,
}

/// Escape `%`, `_` and `\` so `prefix` matches literally under `ESCAPE '\'`.
pub fn escape_like(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len() + 2);
    for ch in prefix.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

fn select_all(
    operation: &'static str,
    rel: Relations,
    table: MirroredTable,
    order_by: &str,
) -> ReadQuery {
    ReadQuery {
        operation,
        tables: vec![table],
        sql: format!(
            "SELECT {} FROM {} ORDER BY {}",
            table.column_list(),
            rel.name(table),
            order_by
        ),
        params: Vec::new(),
    }
}

fn select_where(
    operation: &'static str,
    rel: Relations,
    table: MirroredTable,
    predicate: &str,
    order_by: &str,
    param: Value,
) -> ReadQuery {
    ReadQuery {
        operation,
        tables: vec![table],
        sql: format!(
            "SELECT {} FROM {} WHERE {} ORDER BY {}",
            table.column_list(),
            rel.name(table),
            predicate,
            order_by
        ),
        params: vec![param],
    }
}

/// Rows of `target` joined through `link` on `join_column`, filtered on a
/// link column.
#[allow(clippy::too_many_arguments)]
fn select_linked(
    operation: &'static str,
    rel: Relations,
    target: MirroredTable,
    link: MirroredTable,
    join_column: &str,
    filter_column: &str,
    order_by: &str,
    param: Value,
) -> ReadQuery {
    ReadQuery {
        operation,
        tables: vec![link, target],
        sql: format!(
            "SELECT DISTINCT {cols} FROM {target} t JOIN {link} l ON l.{join} = t.{join} \
             WHERE l.{filter} = ?1 ORDER BY t.{order}",
            cols = target.qualified_column_list("t"),
            target = rel.name(target),
            link = rel.name(link),
            join = join_column,
            filter = filter_column,
            order = order_by,
        ),
        params: vec![param],
    }
}

// ============================================================================
// CELLS
// ============================================================================

/// All cells, by name.
pub fn list_cells(rel: Relations) -> ReadQuery {
    select_all("list_cells", rel, MirroredTable::Cell, "name, cell_id")
}

/// The cell with `cell_id`, if any.
pub fn get_cell_by_id(rel: Relations, cell_id: CellId) -> ReadQuery {
    select_where(
        "get_cell_by_id",
        rel,
        MirroredTable::Cell,
        "cell_id = ?1",
        "cell_id",
        Value::Integer(cell_id),
    )
}

/// Cells whose name starts with `prefix`. An empty prefix matches every
/// cell; wildcards in `prefix` are matched literally.
pub fn search_cells_by_name(rel: Relations, prefix: &str) -> ReadQuery {
    select_where(
        "search_cells_by_name",
        rel,
        MirroredTable::Cell,
        "name LIKE ?1 ESCAPE '\\'",
        "name, cell_id",
        Value::Text(format!("{}%", escape_like(prefix))),
    )
}

// ============================================================================
// PC STATIONS
// ============================================================================

/// All PC stations, by name.
pub fn list_pc_stations(rel: Relations) -> ReadQuery {
    select_all("list_pc_stations", rel, MirroredTable::PcStation, "pc_name")
}

/// The station named `pc_name`, if any.
pub fn get_pc_station(rel: Relations, pc_name: &str) -> ReadQuery {
    select_where(
        "get_pc_station",
        rel,
        MirroredTable::PcStation,
        "pc_name = ?1",
        "pc_name",
        Value::Text(pc_name.to_string()),
    )
}

/// Cells linked to `pc_name`. Waits on the link table before the cell table.
pub fn cells_for_pc_station(rel: Relations, pc_name: &str) -> ReadQuery {
    select_linked(
        "cells_for_pc_station",
        rel,
        MirroredTable::Cell,
        MirroredTable::CellByPcStation,
        "cell_id",
        "pc_name",
        "name",
        Value::Text(pc_name.to_string()),
    )
}

/// Stations linked to `cell_id`.
pub fn pc_stations_for_cell(rel: Relations, cell_id: CellId) -> ReadQuery {
    select_linked(
        "pc_stations_for_cell",
        rel,
        MirroredTable::PcStation,
        MirroredTable::CellByPcStation,
        "pc_name",
        "cell_id",
        "pc_name",
        Value::Integer(cell_id),
    )
}

// ============================================================================
// SOFTWARE TESTS
// ============================================================================

/// All software tests, by name then version.
pub fn list_sw_tests(rel: Relations) -> ReadQuery {
    select_all("list_sw_tests", rel, MirroredTable::SwTestMap, "name, version")
}

/// The software test with `sw_test_id`, if any.
pub fn get_sw_test(rel: Relations, sw_test_id: SwTestId) -> ReadQuery {
    select_where(
        "get_sw_test",
        rel,
        MirroredTable::SwTestMap,
        "sw_test_id = ?1",
        "sw_test_id",
        Value::Integer(sw_test_id),
    )
}

/// Every cell/software test link with both display names, from the
/// denormalized view.
pub fn sw_test_links(rel: Relations) -> ReadQuery {
    select_all(
        "sw_test_links",
        rel,
        MirroredTable::CellBySwTestView,
        "sw_test_id, cell_id",
    )
}

/// Software tests linked to `cell_id`, from the view.
pub fn sw_tests_for_cell(rel: Relations, cell_id: CellId) -> ReadQuery {
    select_where(
        "sw_tests_for_cell",
        rel,
        MirroredTable::CellBySwTestView,
        "cell_id = ?1",
        "sw_test_name, sw_test_id",
        Value::Integer(cell_id),
    )
}

/// Cells linked to `sw_test_id`.
pub fn cells_for_sw_test(rel: Relations, sw_test_id: SwTestId) -> ReadQuery {
    select_linked(
        "cells_for_sw_test",
        rel,
        MirroredTable::Cell,
        MirroredTable::CellBySwTest,
        "cell_id",
        "sw_test_id",
        "name",
        Value::Integer(sw_test_id),
    )
}

// ============================================================================
// TOP-LEVEL ASSEMBLIES
// ============================================================================

/// All top-level assemblies, by part number.
pub fn list_tlas(rel: Relations) -> ReadQuery {
    select_all("list_tlas", rel, MirroredTable::Tla, "part_no")
}

/// The assembly with `part_no`, if any.
pub fn get_tla(rel: Relations, part_no: &str) -> ReadQuery {
    select_where(
        "get_tla",
        rel,
        MirroredTable::Tla,
        "part_no = ?1",
        "part_no",
        Value::Text(part_no.to_string()),
    )
}

/// Assemblies whose part number starts with `prefix`.
pub fn search_tlas_by_part_no(rel: Relations, prefix: &str) -> ReadQuery {
    select_where(
        "search_tlas_by_part_no",
        rel,
        MirroredTable::Tla,
        "part_no LIKE ?1 ESCAPE '\\'",
        "part_no",
        Value::Text(format!("{}%", escape_like(prefix))),
    )
}

/// Every cell/part number link, from the denormalized view.
pub fn part_no_links(rel: Relations) -> ReadQuery {
    select_all(
        "part_no_links",
        rel,
        MirroredTable::CellByPartNoView,
        "part_no, cell_id",
    )
}

/// Part numbers linked to `cell_id`.
pub fn part_numbers_for_cell(rel: Relations, cell_id: CellId) -> ReadQuery {
    select_where(
        "part_numbers_for_cell",
        rel,
        MirroredTable::CellByPartNoView,
        "cell_id = ?1",
        "part_no",
        Value::Integer(cell_id),
    )
}

/// Cells linked to `part_no`.
pub fn cells_for_part_no(rel: Relations, part_no: &str) -> ReadQuery {
    select_linked(
        "cells_for_part_no",
        rel,
        MirroredTable::Cell,
        MirroredTable::CellByPartNo,
        "cell_id",
        "part_no",
        "name",
        Value::Text(part_no.to_string()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_relations_naming() {
        assert_eq!(Relations::Mirror.name(MirroredTable::CellByPcStation), "\"CellByPCStation\"");
        assert_eq!(Relations::Remote.name(MirroredTable::CellByPcStation), "\"cell_pc_station\"");
    }

    #[test]
    fn test_linked_query_touches_both_tables() {
        let q = cells_for_pc_station(Relations::Mirror, "PC-01");
        assert_eq!(q.tables, vec![MirroredTable::CellByPcStation, MirroredTable::Cell]);
        assert!(q.sql.contains("\"Cell\" t JOIN \"CellByPCStation\" l"));
        assert_eq!(q.params, vec![Value::Text("PC-01".to_string())]);
    }

    #[test]
    fn test_get_cell_by_id() {
        let q = get_cell_by_id(Relations::Remote, 7);
        assert_eq!(q.operation, "get_cell_by_id");
        assert_eq!(q.tables, vec![MirroredTable::Cell]);
        assert!(q.sql.starts_with("SELECT cell_id, name, description, is_active FROM \"cell\""));
        assert_eq!(q.params, vec![Value::Integer(7)]);
    }

    #[test]
    fn test_search_escapes_prefix() {
        let q = search_tlas_by_part_no(Relations::Mirror, "90_0%");
        assert_eq!(q.params, vec![Value::Text("90\\_0\\%%".to_string())]);
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("abc"), "abc");
        assert_eq!(escape_like("a%b_c\\"), "a\\%b\\_c\\\\");
    }

    proptest! {
        #[test]
        fn prop_escape_like_leaves_no_bare_wildcards(s in ".{0,24}") {
            let escaped = escape_like(&s);
            let mut chars = escaped.chars();
            while let Some(c) = chars.next() {
                if c == '\\' {
                    let next = chars.next();
                    prop_assert!(matches!(next, Some('%') | Some('_') | Some('\\')));
                } else {
                    prop_assert!(c != '%' && c != '_');
                }
            }
        }
    }
}

//! Reconstruction of the nested tree from the three flat tables.

use std::collections::BTreeMap;

use rusqlite::types::Type;
use rusqlite::{Connection, Result, Row};
use tracing::{debug, warn};

use crate::schema::{ProcessNode, SubprocessNode, UseCaseDraft, UseCaseKind, UseCaseRecord};

/// Scan all three tables and join them in memory.
///
/// Nodes are ordered by ascending id at every level, which is insertion
/// order. Rows whose parent is missing are dropped.
pub(super) fn read_all(conn: &Connection) -> Result<Vec<ProcessNode>> {
    let processes = scan(
        conn,
        "SELECT id, name, description FROM process ORDER BY id",
        |row| {
            Ok(ProcessNode {
                id: row.get(0)?,
                name: row.get(1)?,
                description: row.get(2)?,
                subprocesses: Vec::new(),
            })
        },
    )?;
    let subprocesses = scan(
        conn,
        "SELECT id, process_id, name, description FROM subprocess ORDER BY id",
        |row| {
            Ok(SubprocessNode {
                id: row.get(0)?,
                process_id: row.get(1)?,
                name: row.get(2)?,
                description: row.get(3)?,
                use_cases: Vec::new(),
            })
        },
    )?;
    let use_cases = scan(
        conn,
        "SELECT id, subprocess_id, name, description, primary_actor, kind,
                preconditions, postconditions, acceptance_criteria
         FROM use_case ORDER BY id",
        use_case_from_row,
    )?;

    debug!(
        "Loaded {} processes, {} subprocesses, {} use cases",
        processes.len(),
        subprocesses.len(),
        use_cases.len()
    );

    let mut subprocess_by_id: BTreeMap<i64, SubprocessNode> =
        subprocesses.into_iter().map(|s| (s.id, s)).collect();
    for use_case in use_cases {
        match subprocess_by_id.get_mut(&use_case.subprocess_id) {
            Some(parent) => parent.use_cases.push(use_case),
            None => warn!(
                "Dropping orphan use case {} (subprocess {} not found)",
                use_case.id, use_case.subprocess_id
            ),
        }
    }

    let mut process_by_id: BTreeMap<i64, ProcessNode> =
        processes.into_iter().map(|p| (p.id, p)).collect();
    for subprocess in subprocess_by_id.into_values() {
        match process_by_id.get_mut(&subprocess.process_id) {
            Some(parent) => parent.subprocesses.push(subprocess),
            None => warn!(
                "Dropping orphan subprocess {} (process {} not found)",
                subprocess.id, subprocess.process_id
            ),
        }
    }

    Ok(process_by_id.into_values().collect())
}

fn scan<T>(conn: &Connection, sql: &str, map: impl FnMut(&Row<'_>) -> Result<T>) -> Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map([], map)?;
    let items = rows.collect::<Result<Vec<T>>>()?;
    Ok(items)
}

fn use_case_from_row(row: &Row<'_>) -> Result<UseCaseRecord> {
    let code: i64 = row.get(5)?;
    let kind = UseCaseKind::from_code(code).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            5,
            Type::Integer,
            format!("invalid use case kind {}", code).into(),
        )
    })?;

    Ok(UseCaseRecord {
        id: row.get(0)?,
        subprocess_id: row.get(1)?,
        body: UseCaseDraft {
            name: row.get(2)?,
            description: row.get(3)?,
            primary_actor: row.get(4)?,
            kind,
            preconditions: row.get(6)?,
            postconditions: row.get(7)?,
            acceptance_criteria: row.get(8)?,
        },
    })
}

//! Atomic insertion of a normalized hierarchy.

use rusqlite::{params, Connection, Result, TransactionBehavior};
use tracing::debug;

use crate::schema::{Hierarchy, ProcessNode, SubprocessNode, UseCaseRecord};

const INSERT_PROCESS: &str = "INSERT INTO process (name, description) VALUES (?1, ?2)";
const INSERT_SUBPROCESS: &str =
    "INSERT INTO subprocess (process_id, name, description) VALUES (?1, ?2, ?3)";
const INSERT_USE_CASE: &str = "INSERT INTO use_case
    (subprocess_id, name, description, primary_actor, kind, preconditions, postconditions, acceptance_criteria)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)";

/// Insert every node of `hierarchy` parent-first inside one transaction.
///
/// Each insert's generated id becomes the foreign key of its children. If any
/// insert fails the transaction is dropped uncommitted and rolls back, so no
/// part of the hierarchy is left behind.
pub(super) fn persist(conn: &mut Connection, hierarchy: &Hierarchy) -> Result<Vec<ProcessNode>> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let inserted = {
        let mut insert_process = tx.prepare(INSERT_PROCESS)?;
        let mut insert_subprocess = tx.prepare(INSERT_SUBPROCESS)?;
        let mut insert_use_case = tx.prepare(INSERT_USE_CASE)?;

        let mut processes = Vec::with_capacity(hierarchy.processes.len());
        for process in &hierarchy.processes {
            let process_id = insert_process.insert(params![process.name, process.description])?;

            let mut subprocesses = Vec::with_capacity(process.subprocesses.len());
            for subprocess in &process.subprocesses {
                let subprocess_id = insert_subprocess.insert(params![
                    process_id,
                    subprocess.name,
                    subprocess.description
                ])?;

                let mut use_cases = Vec::with_capacity(subprocess.use_cases.len());
                for use_case in &subprocess.use_cases {
                    let use_case_id = insert_use_case.insert(params![
                        subprocess_id,
                        use_case.name,
                        use_case.description,
                        use_case.primary_actor,
                        use_case.kind.code(),
                        use_case.preconditions,
                        use_case.postconditions,
                        use_case.acceptance_criteria,
                    ])?;
                    use_cases.push(UseCaseRecord {
                        id: use_case_id,
                        subprocess_id,
                        body: use_case.clone(),
                    });
                }

                subprocesses.push(SubprocessNode {
                    id: subprocess_id,
                    process_id,
                    name: subprocess.name.clone(),
                    description: subprocess.description.clone(),
                    use_cases,
                });
            }

            debug!("Inserted process {} ({:?})", process_id, process.name);
            processes.push(ProcessNode {
                id: process_id,
                name: process.name.clone(),
                description: process.description.clone(),
                subprocesses,
            });
        }
        processes
    };

    tx.commit()?;
    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::super::Store;
    use crate::schema::{Hierarchy, ProcessDraft, SubprocessDraft, UseCaseDraft, UseCaseKind};

    fn use_case(name: &str) -> UseCaseDraft {
        UseCaseDraft {
            name: name.to_string(),
            description: None,
            primary_actor: None,
            kind: UseCaseKind::Functional,
            preconditions: None,
            postconditions: None,
            acceptance_criteria: None,
        }
    }

    fn process(name: &str, subprocesses: Vec<SubprocessDraft>) -> ProcessDraft {
        ProcessDraft {
            name: name.to_string(),
            description: None,
            subprocesses,
        }
    }

    fn subprocess(name: &str, use_cases: Vec<UseCaseDraft>) -> SubprocessDraft {
        SubprocessDraft {
            name: name.to_string(),
            description: None,
            use_cases,
        }
    }

    #[test]
    fn test_foreign_keys_thread_through() {
        let store = Store::open_in_memory().unwrap();
        let hierarchy = Hierarchy {
            processes: vec![
                process("A", vec![subprocess("A1", vec![use_case("a"), use_case("b")])]),
                process(
                    "B",
                    vec![
                        subprocess("B1", vec![use_case("c")]),
                        subprocess("B2", vec![]),
                    ],
                ),
            ],
        };

        let persisted = store.persist(&hierarchy).unwrap();
        assert_eq!(persisted.len(), 2);

        let b = &persisted[1];
        assert_ne!(b.id, persisted[0].id);
        assert!(b.subprocesses.iter().all(|s| s.process_id == b.id));
        assert_eq!(b.subprocesses[0].use_cases[0].subprocess_id, b.subprocesses[0].id);
        assert!(b.subprocesses[1].use_cases.is_empty());

        assert_eq!(store.row_counts(), (2, 3, 3));
    }

    #[test]
    fn test_empty_hierarchy_persists_nothing() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.persist(&Hierarchy::default()).unwrap().is_empty());
        assert_eq!(store.row_counts(), (0, 0, 0));
    }

    #[test]
    fn test_failed_attempt_does_not_disturb_earlier_commits() {
        let store = Store::open_in_memory().unwrap();
        let good = Hierarchy {
            processes: vec![process("Kept", vec![subprocess("S", vec![use_case("u")])])],
        };
        store.persist(&good).unwrap();

        store
            .lock()
            .execute_batch(
                "CREATE TRIGGER reject_sub BEFORE INSERT ON subprocess
                 WHEN NEW.name = 'bad'
                 BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
            )
            .unwrap();

        let bad = Hierarchy {
            processes: vec![process("Dropped", vec![subprocess("ok", vec![]), subprocess("bad", vec![])])],
        };
        assert!(store.persist(&bad).is_err());

        let tree = store.read_all().unwrap();
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].name, "Kept");
        assert_eq!(store.row_counts(), (1, 1, 1));
    }
}

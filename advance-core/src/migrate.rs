//! Applies a reviewed requirement mapping to a scout's progress records

use serde::Serialize;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use crate::models::{ProgressRecord, Requirement};
use crate::reconcile::RequirementMapping;

/// Progress rewritten against the target version
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MigrationOutcome {
    /// Records now pointing at target requirement ids
    pub migrated: Vec<ProgressRecord>,
    /// Source requirement numbers whose history is lost
    pub unmapped: Vec<String>,
}

/// Rewrites completed progress onto the targets chosen in `mappings`.
///
/// The mapping list is consumed: once applied it has no further use. Records
/// that are not complete, or that belong to no source requirement, are left
/// out. When two source requirements map onto one target the first record
/// wins.
pub fn migrate_progress(
    progress: &[ProgressRecord],
    source: &[Requirement],
    mappings: Vec<RequirementMapping>,
) -> MigrationOutcome {
    let source_numbers: HashMap<Uuid, &str> = source
        .iter()
        .map(|r| (r.id, r.requirement_number.as_str()))
        .collect();
    let targets: HashMap<String, Option<Uuid>> = mappings
        .into_iter()
        .map(|m| (m.source_number, m.target_requirement_id))
        .collect();

    let mut outcome = MigrationOutcome::default();
    let mut claimed: HashSet<Uuid> = HashSet::new();

    for record in progress.iter().filter(|p| p.is_complete()) {
        let Some(number) = source_numbers.get(&record.requirement_id) else {
            log::debug!(
                "progress for unknown requirement {} skipped during migration",
                record.requirement_id
            );
            continue;
        };

        match targets.get(*number).copied().flatten() {
            Some(target_id) => {
                if !claimed.insert(target_id) {
                    log::warn!(
                        "requirement {} maps onto an already migrated target, keeping the first",
                        number
                    );
                    continue;
                }
                let mut migrated = record.clone();
                migrated.requirement_id = target_id;
                outcome.migrated.push(migrated);
            }
            None => outcome.unmapped.push(number.to_string()),
        }
    }

    outcome
}

/// Migrates `records` in place and reports what happened.
///
/// `records` may hold progress for other checklists too; only records of
/// `source` requirements are touched. They are removed, and the migrated
/// ones are merged in. When a target requirement already has progress the
/// more mature record is kept, so a target never ends up with two records.
pub fn apply_migration(
    records: &mut Vec<ProgressRecord>,
    source: &[Requirement],
    mappings: Vec<RequirementMapping>,
) -> MigrationOutcome {
    let outcome = migrate_progress(records.as_slice(), source, mappings);

    let source_ids: HashSet<Uuid> = source.iter().map(|r| r.id).collect();
    records.retain(|record| !source_ids.contains(&record.requirement_id));

    for migrated in &outcome.migrated {
        match records
            .iter_mut()
            .find(|r| r.requirement_id == migrated.requirement_id)
        {
            Some(existing) => {
                if migrated.status.maturity() > existing.status.maturity() {
                    *existing = migrated.clone();
                }
            }
            None => records.push(migrated.clone()),
        }
    }

    outcome
}

use super::{MigrationPlan, Target};
use crate::catalog::{MigrationCatalog, MigrationDefinition};
use crate::core::{Direction, MigrationError, MigrationId, Result};

/// Computes which migrations move a context from its recorded history to
/// a target.
///
/// The applied history must be a prefix of the catalog. Anything else
/// (an unknown id, a gap, a different order) is reported as
/// `HistoryDivergence` and never repaired automatically.
pub struct Planner<'a> {
    catalog: &'a MigrationCatalog,
}

impl<'a> Planner<'a> {
    pub fn new(catalog: &'a MigrationCatalog) -> Self {
        Self { catalog }
    }

    /// Verify that `applied` is a prefix of the catalog.
    pub fn check_history(&self, applied: &[MigrationId]) -> Result<()> {
        let known = self.catalog.list();

        for (position, id) in applied.iter().enumerate() {
            if !self.catalog.contains(id) {
                return Err(MigrationError::HistoryDivergence(format!(
                    "applied migration '{}' is not in the catalog",
                    id
                )));
            }
            let Some(expected) = known.get(position).map(|m| &m.id) else {
                return Err(MigrationError::HistoryDivergence(format!(
                    "{} migrations applied but the catalog only has {}",
                    applied.len(),
                    known.len()
                )));
            };
            if expected != id {
                return Err(MigrationError::HistoryDivergence(format!(
                    "applied migration #{} is '{}' but the catalog expects '{}'",
                    position + 1,
                    id,
                    expected
                )));
            }
        }
        Ok(())
    }

    /// Catalog migrations not yet applied, ascending.
    pub fn pending(&self, applied: &[MigrationId]) -> Result<Vec<&'a MigrationDefinition>> {
        self.check_history(applied)?;
        Ok(self.catalog.list()[applied.len()..].iter().collect())
    }

    pub fn plan(&self, applied: &[MigrationId], target: &Target) -> Result<MigrationPlan> {
        self.check_history(applied)?;

        let known = self.catalog.list();
        let current = applied.len();
        let desired = self.resolve(target)?;

        let plan = if desired > current {
            MigrationPlan::new(Direction::Up, known[current..desired].to_vec())
        } else if desired < current {
            let mut steps = known[desired..current].to_vec();
            steps.reverse();
            MigrationPlan::new(Direction::Down, steps)
        } else {
            MigrationPlan::empty()
        };

        tracing::debug!(
            %target,
            applied = current,
            direction = %plan.direction(),
            steps = plan.len(),
            "planned migrations"
        );
        Ok(plan)
    }

    /// Number of catalog migrations that are applied once `target` is reached.
    fn resolve(&self, target: &Target) -> Result<usize> {
        let known = self.catalog.list();
        match target {
            Target::Latest => Ok(known.len()),
            Target::Initial => Ok(0),
            Target::Id(id) => known
                .iter()
                .position(|m| &m.id == id)
                .map(|idx| idx + 1)
                .ok_or_else(|| MigrationError::NotFound(id.to_string())),
            Target::Name(name) => {
                let matches: Vec<usize> = known
                    .iter()
                    .enumerate()
                    .filter(|(_, m)| m.id.name() == name)
                    .map(|(idx, _)| idx)
                    .collect();
                match matches.as_slice() {
                    [] => Err(MigrationError::NotFound(name.clone())),
                    [idx] => Ok(idx + 1),
                    _ => Err(MigrationError::InvalidTarget(format!(
                        "'{}' matches {} migrations; use the full id",
                        name,
                        matches.len()
                    ))),
                }
            }
        }
    }
}

use crate::catalog::MigrationDefinition;
use crate::core::{Direction, MIGRATION_TIMESTAMP_WIDTH, MigrationError, MigrationId, Result};
use std::fmt;
use std::str::FromStr;

/// Where a migration run should leave the schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Every catalog migration applied
    Latest,
    /// No migration applied
    Initial,
    /// Exactly the catalog prefix ending at this id
    Id(MigrationId),
    /// A migration referenced by its name part, resolved against the catalog
    Name(String),
}

impl FromStr for Target {
    type Err = MigrationError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "" => Err(MigrationError::InvalidTarget("empty target".to_string())),
            "latest" => Ok(Target::Latest),
            "0" | "none" | "initial" | "$initialdatabase" => Ok(Target::Initial),
            _ if trimmed.len() > MIGRATION_TIMESTAMP_WIDTH
                && trimmed.as_bytes()[..MIGRATION_TIMESTAMP_WIDTH]
                    .iter()
                    .all(u8::is_ascii_digit) =>
            {
                Ok(Target::Id(MigrationId::parse(trimmed)?))
            }
            _ => Ok(Target::Name(trimmed.to_string())),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Latest => write!(f, "latest"),
            Target::Initial => write!(f, "initial"),
            Target::Id(id) => write!(f, "{}", id),
            Target::Name(name) => write!(f, "{}", name),
        }
    }
}

/// Ordered migrations to execute, all in one direction.
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationPlan {
    direction: Direction,
    steps: Vec<MigrationDefinition>,
}

impl MigrationPlan {
    pub fn new(direction: Direction, steps: Vec<MigrationDefinition>) -> Self {
        Self { direction, steps }
    }

    pub fn empty() -> Self {
        Self::new(Direction::Up, Vec::new())
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn steps(&self) -> &[MigrationDefinition] {
        &self.steps
    }

    pub fn ids(&self) -> Vec<&MigrationId> {
        self.steps.iter().map(|m| &m.id).collect()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Render the plan as a readable DDL script without executing it.
    pub fn render_script(&self) -> String {
        if self.steps.is_empty() {
            return "-- Nothing to do: schema is already at the target\n".to_string();
        }

        let mut script = String::new();
        for migration in &self.steps {
            script.push_str(&format!("-- {} ({})\n", migration.id, self.direction));
            let operations = migration.operations(self.direction);
            if operations.is_empty() {
                script.push_str("-- (no operations)\n");
            }
            for operation in operations {
                script.push_str(&format!("{};\n", operation));
            }
            script.push('\n');
        }
        script
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Operation;

    #[test]
    fn test_parse_targets() {
        assert_eq!("latest".parse::<Target>().unwrap(), Target::Latest);
        assert_eq!("0".parse::<Target>().unwrap(), Target::Initial);
        assert_eq!("$InitialDatabase".parse::<Target>().unwrap(), Target::Initial);
        assert_eq!(
            "UseFluentAPI".parse::<Target>().unwrap(),
            Target::Name("UseFluentAPI".to_string())
        );
        assert_eq!(
            "202212200104283_UseFluentAPI".parse::<Target>().unwrap(),
            Target::Id(MigrationId::parse("202212200104283_UseFluentAPI").unwrap())
        );
        assert!("".parse::<Target>().is_err());
    }

    #[test]
    fn test_render_script() {
        let migration = MigrationDefinition::new(
            MigrationId::parse("202212200104283_UseFluentAPI").unwrap(),
        )
        .up(Operation::rename_column("Users", "DisplayName", "Display_Name"));
        let plan = MigrationPlan::new(Direction::Up, vec![migration]);

        assert_eq!(
            plan.render_script(),
            "-- 202212200104283_UseFluentAPI (up)\nALTER TABLE Users RENAME COLUMN DisplayName TO Display_Name;\n\n"
        );
        assert!(MigrationPlan::empty().render_script().contains("Nothing to do"));
    }
}

//! Catalog of exercises that can earn requests.
//!
//! The mapping from exercise kind to required reps and awarded credits is
//! configuration. The built-in catalog matches the default config.

use crate::types::*;
use crate::{Config, Error, Result};
use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};

/// Cached default catalog - built once and reused across all operations
static DEFAULT_CATALOG: Lazy<ExerciseCatalog> =
    Lazy::new(|| ExerciseCatalog::from_definitions(Config::default().exercises));

/// Get a reference to the cached default catalog
pub fn get_default_catalog() -> &'static ExerciseCatalog {
    &DEFAULT_CATALOG
}

/// Exercises keyed by kind, in configured order
#[derive(Clone, Debug)]
pub struct ExerciseCatalog {
    exercises: HashMap<String, ExerciseDefinition>,
    order: Vec<String>,
}

impl ExerciseCatalog {
    pub fn from_definitions(definitions: Vec<ExerciseDefinition>) -> Self {
        let mut exercises = HashMap::new();
        let mut order = Vec::new();
        for def in definitions {
            if !exercises.contains_key(&def.name) {
                order.push(def.name.clone());
            }
            exercises.insert(def.name.clone(), def);
        }
        Self { exercises, order }
    }

    /// Build the catalog described by a config, rejecting invalid entries
    pub fn from_config(config: &Config) -> Result<Self> {
        let errors = validate_definitions(&config.exercises);
        if !errors.is_empty() {
            return Err(Error::Config(format!(
                "Invalid exercise catalog: {}",
                errors.join("; ")
            )));
        }
        Ok(Self::from_definitions(config.exercises.clone()))
    }

    pub fn get(&self, kind: &str) -> Option<&ExerciseDefinition> {
        self.exercises.get(kind)
    }

    /// The first configured exercise, used for remediation hints
    pub fn primary(&self) -> Option<&ExerciseDefinition> {
        self.order.first().and_then(|name| self.exercises.get(name))
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExerciseDefinition> {
        self.order.iter().filter_map(|name| self.exercises.get(name))
    }

    pub fn len(&self) -> usize {
        self.exercises.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exercises.is_empty()
    }

    /// Validate the catalog for internal consistency
    pub fn validate(&self) -> Vec<String> {
        let defs: Vec<_> = self.iter().cloned().collect();
        let mut errors = validate_definitions(&defs);
        if defs.is_empty() {
            errors.push("Catalog has no exercises".into());
        }
        errors
    }

    /// Check a completion against the catalog and compute its award
    pub fn validate_completion(&self, event: &CompletionEvent) -> Result<Award> {
        let def = self
            .get(&event.exercise_kind)
            .ok_or_else(|| Error::UnknownExercise(event.exercise_kind.clone()))?;

        if event.reps_completed < def.reps_required {
            return Err(Error::InsufficientReps {
                exercise: def.name.clone(),
                required: def.reps_required,
                completed: event.reps_completed,
            });
        }

        let plural = if def.credits_awarded == 1 { "" } else { "s" };
        Ok(Award {
            exercise_kind: def.name.clone(),
            display_name: def.display_name.clone(),
            reps: event.reps_completed,
            credits: def.credits_awarded,
            message: format!(
                "Nice! +{} request{} for {} {}",
                def.credits_awarded,
                plural,
                event.reps_completed,
                def.name.replace('_', " ")
            ),
        })
    }

    /// How to earn more requests, for blocked callers
    pub fn remediation(&self) -> String {
        match self.primary() {
            Some(def) => {
                let plural = if def.credits_awarded == 1 { "" } else { "s" };
                format!(
                    "You need to exercise to earn requests.\nComplete {} {} to earn {} request{}.",
                    def.reps_required,
                    def.name.replace('_', " "),
                    def.credits_awarded,
                    plural
                )
            }
            None => "You need to exercise to earn requests.".into(),
        }
    }
}

fn validate_definitions(definitions: &[ExerciseDefinition]) -> Vec<String> {
    let mut errors = Vec::new();
    let mut seen = HashSet::new();

    for def in definitions {
        if def.name.trim().is_empty() {
            errors.push("Exercise with empty name".to_string());
        }
        if !seen.insert(def.name.as_str()) {
            errors.push(format!("Duplicate exercise '{}'", def.name));
        }
        if def.reps_required == 0 {
            errors.push(format!("Exercise '{}' requires zero reps", def.name));
        }
        if def.credits_awarded == 0 {
            errors.push(format!("Exercise '{}' awards zero credits", def.name));
        }
    }

    errors
}

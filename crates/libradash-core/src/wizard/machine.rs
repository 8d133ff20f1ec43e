// ── Setup wizard state machine ──
//
// A strict linear sequence of steps that accumulates a Configuration
// and submits it atomically through the mutation coordinator. Next and
// Back are the only transitions; a failed validation is a surfaced
// no-op, never a silent one.

use serde_json::Value;
use tracing::{info, warn};

use crate::client::CacheClient;
use crate::error::CoreError;
use crate::key::QueryKey;
use crate::mutation::MutationOptions;

use super::configuration::{Configuration, ConfigurationPatch, MAX_COMPARISON_LIBRARIES};

/// Wizard steps in their fixed linear order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum WizardStep {
    Library,
    Categories,
    Metrics,
    Comparisons,
    Review,
}

impl WizardStep {
    pub const ALL: [WizardStep; 5] = [
        WizardStep::Library,
        WizardStep::Categories,
        WizardStep::Metrics,
        WizardStep::Comparisons,
        WizardStep::Review,
    ];
}

/// Observable machine state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WizardState {
    InProgress(WizardStep),
    Complete,
}

/// The multi-step setup flow.
pub struct SetupWizard {
    config: Configuration,
    current: usize,
    complete: bool,
    last_rejection: Option<String>,
}

impl SetupWizard {
    pub fn new() -> Self {
        Self {
            config: Configuration::default(),
            current: 0,
            complete: false,
            last_rejection: None,
        }
    }

    /// Resume from a previously accumulated configuration.
    pub fn with_configuration(config: Configuration) -> Self {
        Self {
            config,
            ..Self::new()
        }
    }

    pub fn configuration(&self) -> &Configuration {
        &self.config
    }

    pub fn current_step(&self) -> WizardStep {
        WizardStep::ALL
            .get(self.current)
            .copied()
            .unwrap_or(WizardStep::Review)
    }

    pub fn current_step_index(&self) -> usize {
        self.current
    }

    pub fn state(&self) -> WizardState {
        if self.complete {
            WizardState::Complete
        } else {
            WizardState::InProgress(self.current_step())
        }
    }

    /// The reason the last `next()` or `submit()` was rejected, if any.
    pub fn last_rejection(&self) -> Option<&str> {
        self.last_rejection.as_deref()
    }

    /// Shallow-merge a patch into the accumulated configuration.
    /// Allowed at any step; earlier answers always survive navigation.
    pub fn update_form_data(&mut self, patch: ConfigurationPatch) {
        self.config.apply(patch);
    }

    /// Advance one step. On validation failure the step index is
    /// unchanged, the configuration is untouched, and the reason is
    /// surfaced through the error and `last_rejection()`.
    pub fn next(&mut self) -> Result<WizardStep, CoreError> {
        let step = self.current_step();
        if let Err(err) = self.validate_step(step) {
            self.reject(&err);
            return Err(err);
        }
        if self.current + 1 >= WizardStep::ALL.len() {
            let err = CoreError::validation(
                "wizard",
                "already at the final step; use submit",
            );
            self.reject(&err);
            return Err(err);
        }
        self.current += 1;
        self.last_rejection = None;
        Ok(self.current_step())
    }

    /// Move back one step. Never discards previously entered fields.
    pub fn back(&mut self) -> WizardStep {
        self.current = self.current.saturating_sub(1);
        self.current_step()
    }

    /// Submit the completed configuration as one atomic mutation.
    ///
    /// Local validation runs first and never reaches the coordinator
    /// when it fails; a missing primary library additionally returns
    /// the wizard to step 0. On success the machine is `Complete` and
    /// the `["setupStatus"]` key is invalidated; on a backend failure
    /// it stays where it is with the error surfaced and zero cache
    /// effects.
    pub async fn submit<F, Fut>(
        &mut self,
        client: &CacheClient,
        op: F,
    ) -> Result<(), CoreError>
    where
        F: FnOnce(Configuration) -> Fut,
        Fut: Future<Output = Result<Value, CoreError>>,
    {
        if self.complete {
            return Ok(());
        }

        if self.config.primary_library_id.is_none() || self.config.primary_library_name.is_none() {
            self.current = 0;
            let err = CoreError::validation(
                "primary_library",
                "a primary library must be selected before submitting",
            );
            warn!("setup submitted without a primary library; returning to step 0");
            self.reject(&err);
            return Err(err);
        }

        if let Err(err) = self.validate_all() {
            self.reject(&err);
            return Err(err);
        }

        let mut payload = self.config.clone();
        payload.setup_complete = true;

        let options = MutationOptions::new().invalidate(QueryKey::named("setupStatus"));
        match client.mutate(options, payload.clone(), op).await {
            Ok(_) => {
                self.config = payload;
                self.complete = true;
                self.last_rejection = None;
                info!("library setup complete");
                Ok(())
            }
            Err(err) => {
                let err = (*err).clone();
                self.reject(&err);
                Err(err)
            }
        }
    }

    // ── Validation ───────────────────────────────────────────────────

    fn validate_step(&self, step: WizardStep) -> Result<(), CoreError> {
        match step {
            WizardStep::Library => {
                if self.config.primary_library_id.as_deref().is_none_or(str::is_empty)
                    || self.config.primary_library_name.as_deref().is_none_or(str::is_empty)
                {
                    return Err(CoreError::validation(
                        "primary_library",
                        "select a primary library to continue",
                    ));
                }
                Ok(())
            }
            WizardStep::Categories => {
                if !self.config.categories.any() {
                    return Err(CoreError::validation(
                        "categories",
                        "enable at least one statistic category",
                    ));
                }
                Ok(())
            }
            WizardStep::Metrics => {
                for (category, selected) in self
                    .config
                    .metrics
                    .selected_per_enabled_category(&self.config.categories)
                {
                    if selected == 0 {
                        return Err(CoreError::validation(
                            "metrics",
                            format!("select at least one {category} metric"),
                        ));
                    }
                }
                Ok(())
            }
            WizardStep::Comparisons => {
                let ids = &self.config.comparison_library_ids;
                if ids.len() > MAX_COMPARISON_LIBRARIES {
                    return Err(CoreError::validation(
                        "comparison_libraries",
                        format!("at most {MAX_COMPARISON_LIBRARIES} comparison libraries"),
                    ));
                }
                if let Some(primary) = self.config.primary_library_id.as_deref() {
                    if ids.iter().any(|id| id == primary) {
                        return Err(CoreError::validation(
                            "comparison_libraries",
                            "the primary library cannot also be a comparison library",
                        ));
                    }
                }
                Ok(())
            }
            WizardStep::Review => self.validate_all(),
        }
    }

    fn validate_all(&self) -> Result<(), CoreError> {
        for step in [
            WizardStep::Library,
            WizardStep::Categories,
            WizardStep::Metrics,
            WizardStep::Comparisons,
        ] {
            self.validate_step(step)?;
        }
        Ok(())
    }

    fn reject(&mut self, err: &CoreError) {
        self.last_rejection = Some(err.to_string());
    }
}

impl Default for SetupWizard {
    fn default() -> Self {
        Self::new()
    }
}

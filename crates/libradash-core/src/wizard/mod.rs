// ── Setup wizard ──
//
// Configuration aggregate plus the linear step machine that builds and
// atomically submits it.

mod configuration;
mod machine;

pub use configuration::{
    CategoryFlags, Configuration, ConfigurationPatch, MAX_COMPARISON_LIBRARIES, MetricSelections,
};
pub use machine::{SetupWizard, WizardState, WizardStep};

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::client::CacheClient;
    use crate::error::CoreError;
    use crate::key::QueryKey;
    use crate::store::CacheEntry;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::Instant;

    fn valid_wizard() -> SetupWizard {
        let mut wizard = SetupWizard::new();
        wizard.update_form_data(ConfigurationPatch {
            primary_library_id: Some("nyc-001".into()),
            primary_library_name: Some("New York Public Library".into()),
            categories: Some(CategoryFlags {
                collection: true,
                ..CategoryFlags::default()
            }),
            metrics: Some(MetricSelections {
                collection: BTreeMap::from([("volumes_held".to_owned(), true)]),
                ..MetricSelections::default()
            }),
            comparison_library_ids: Some(vec!["bos-002".into()]),
            auto_update_enabled: Some(true),
        });
        wizard
    }

    fn advance_to_review(wizard: &mut SetupWizard) {
        while wizard.current_step() != WizardStep::Review {
            wizard.next().unwrap();
        }
    }

    fn seed_setup_status(client: &CacheClient) -> QueryKey {
        let setup_status = QueryKey::named("setupStatus");
        client.store().set(
            &setup_status,
            CacheEntry::success(
                Arc::new(json!({"setup_complete": false})),
                Instant::now(),
                Duration::from_secs(600),
                false,
            ),
        );
        setup_status
    }

    #[test]
    fn next_rejects_invalid_step_without_moving() {
        let mut wizard = SetupWizard::new();

        let err = wizard.next().unwrap_err();

        assert!(matches!(err, CoreError::Validation { .. }));
        assert_eq!(wizard.current_step_index(), 0);
        assert!(wizard.last_rejection().is_some());
        // No configuration mutation happened as a side effect.
        assert_eq!(wizard.configuration(), &Configuration::default());
    }

    #[test]
    fn valid_wizard_walks_every_step_in_order() {
        let mut wizard = valid_wizard();

        assert_eq!(wizard.current_step(), WizardStep::Library);
        assert_eq!(wizard.next().unwrap(), WizardStep::Categories);
        assert_eq!(wizard.next().unwrap(), WizardStep::Metrics);
        assert_eq!(wizard.next().unwrap(), WizardStep::Comparisons);
        assert_eq!(wizard.next().unwrap(), WizardStep::Review);

        // Review is terminal for `next()`; only submit leaves it.
        assert!(wizard.next().is_err());
        assert_eq!(wizard.current_step(), WizardStep::Review);
    }

    #[test]
    fn back_preserves_previously_entered_fields() {
        let mut wizard = valid_wizard();
        wizard.next().unwrap();

        wizard.back();
        assert_eq!(wizard.current_step(), WizardStep::Library);
        assert_eq!(
            wizard.configuration().primary_library_id.as_deref(),
            Some("nyc-001")
        );

        // Forward again: earlier answers still in place.
        wizard.next().unwrap();
        assert_eq!(wizard.current_step(), WizardStep::Categories);
        assert!(wizard.configuration().categories.collection);
    }

    #[test]
    fn back_at_step_zero_stays_put() {
        let mut wizard = SetupWizard::new();
        assert_eq!(wizard.back(), WizardStep::Library);
    }

    #[test]
    fn metrics_step_requires_a_selection_per_enabled_category() {
        let mut wizard = valid_wizard();
        wizard.update_form_data(ConfigurationPatch {
            categories: Some(CategoryFlags {
                collection: true,
                usage: true,
                ..CategoryFlags::default()
            }),
            ..ConfigurationPatch::default()
        });
        wizard.next().unwrap();
        wizard.next().unwrap();
        assert_eq!(wizard.current_step(), WizardStep::Metrics);

        // Usage is enabled but has no selected metrics.
        let err = wizard.next().unwrap_err();
        assert!(err.to_string().contains("usage"));
        assert_eq!(wizard.current_step(), WizardStep::Metrics);
    }

    #[test]
    fn comparison_step_rejects_primary_overlap() {
        let mut wizard = valid_wizard();
        wizard.update_form_data(ConfigurationPatch {
            comparison_library_ids: Some(vec!["nyc-001".into()]),
            ..ConfigurationPatch::default()
        });
        for _ in 0..3 {
            wizard.next().unwrap();
        }
        assert_eq!(wizard.current_step(), WizardStep::Comparisons);

        let err = wizard.next().unwrap_err();
        assert!(matches!(err, CoreError::Validation { .. }));
        assert_eq!(wizard.current_step(), WizardStep::Comparisons);
    }

    #[tokio::test]
    async fn submit_without_primary_returns_to_step_zero() {
        let client = CacheClient::default();
        // A resumed setup that never picked a primary library.
        let mut wizard = SetupWizard::with_configuration(Configuration {
            categories: CategoryFlags {
                usage: true,
                ..CategoryFlags::default()
            },
            ..Configuration::default()
        });

        let err = wizard
            .submit(&client, |_config| async {
                panic!("the mutation must never run without a primary library")
            })
            .await
            .unwrap_err();

        assert!(matches!(err, CoreError::Validation { .. }));
        assert_eq!(wizard.current_step_index(), 0);
        assert_eq!(wizard.state(), WizardState::InProgress(WizardStep::Library));
        assert!(wizard.last_rejection().is_some());
    }

    #[tokio::test]
    async fn successful_submit_completes_and_invalidates_setup_status() {
        let client = CacheClient::default();
        let setup_status = seed_setup_status(&client);

        let mut wizard = valid_wizard();
        advance_to_review(&mut wizard);

        wizard
            .submit(&client, |config| async move {
                assert!(config.setup_complete, "payload must be marked complete");
                Ok(json!({"id": "cfg-1"}))
            })
            .await
            .unwrap();

        assert_eq!(wizard.state(), WizardState::Complete);
        assert!(wizard.configuration().setup_complete);
        assert!(
            !client
                .store()
                .get(&setup_status)
                .unwrap()
                .is_fresh(Instant::now()),
            "setupStatus must be stale after submission"
        );
    }

    #[tokio::test]
    async fn failed_submit_stays_put_with_no_cache_effects() {
        let client = CacheClient::default();
        let setup_status = seed_setup_status(&client);
        let before = client.store().get(&setup_status).unwrap();

        let mut wizard = valid_wizard();
        advance_to_review(&mut wizard);

        let err = wizard
            .submit(&client, |_config| async {
                Err(CoreError::Http {
                    status: 500,
                    message: "save failed".into(),
                })
            })
            .await
            .unwrap_err();

        assert!(matches!(err, CoreError::Http { status: 500, .. }));
        assert_eq!(wizard.state(), WizardState::InProgress(WizardStep::Review));
        assert!(!wizard.configuration().setup_complete);

        let after = client.store().get(&setup_status).unwrap();
        assert!(Arc::ptr_eq(&before, &after), "cache must be untouched");
    }
}

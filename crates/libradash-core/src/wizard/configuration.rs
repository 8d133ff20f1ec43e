// ── Configuration aggregate ──
//
// Built incrementally across wizard steps via shallow patch merge and
// submitted to the backend as one atomic unit. Never partially
// persisted.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Hard limit on comparison libraries.
pub const MAX_COMPARISON_LIBRARIES: usize = 2;

/// Which statistic categories the dashboard tracks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryFlags {
    pub collection: bool,
    pub usage: bool,
    pub program: bool,
    pub staff: bool,
    pub financial: bool,
}

impl CategoryFlags {
    pub fn any(&self) -> bool {
        self.collection || self.usage || self.program || self.staff || self.financial
    }
}

/// Per-category metric-id → enabled map. BTreeMap keeps the submitted
/// payload deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricSelections {
    #[serde(default)]
    pub collection: BTreeMap<String, bool>,
    #[serde(default)]
    pub usage: BTreeMap<String, bool>,
    #[serde(default)]
    pub program: BTreeMap<String, bool>,
    #[serde(default)]
    pub staff: BTreeMap<String, bool>,
    #[serde(default)]
    pub financial: BTreeMap<String, bool>,
}

impl MetricSelections {
    fn selected(map: &BTreeMap<String, bool>) -> usize {
        map.values().filter(|enabled| **enabled).count()
    }

    /// Number of selected metrics in each enabled category; `None`
    /// entries mean the category is disabled and exempt.
    pub fn selected_per_enabled_category(
        &self,
        categories: &CategoryFlags,
    ) -> Vec<(&'static str, usize)> {
        let mut out = Vec::new();
        if categories.collection {
            out.push(("collection", Self::selected(&self.collection)));
        }
        if categories.usage {
            out.push(("usage", Self::selected(&self.usage)));
        }
        if categories.program {
            out.push(("program", Self::selected(&self.program)));
        }
        if categories.staff {
            out.push(("staff", Self::selected(&self.staff)));
        }
        if categories.financial {
            out.push(("financial", Self::selected(&self.financial)));
        }
        out
    }
}

/// The full setup record the wizard accumulates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    pub primary_library_id: Option<String>,
    pub primary_library_name: Option<String>,
    #[serde(default)]
    pub categories: CategoryFlags,
    #[serde(default)]
    pub metrics: MetricSelections,
    #[serde(default)]
    pub comparison_library_ids: Vec<String>,
    #[serde(default)]
    pub auto_update_enabled: bool,
    #[serde(default)]
    pub setup_complete: bool,
}

/// A shallow patch: `Some` fields replace, `None` fields preserve.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigurationPatch {
    pub primary_library_id: Option<String>,
    pub primary_library_name: Option<String>,
    pub categories: Option<CategoryFlags>,
    pub metrics: Option<MetricSelections>,
    pub comparison_library_ids: Option<Vec<String>>,
    pub auto_update_enabled: Option<bool>,
}

impl Configuration {
    /// Shallow-merge a patch into the aggregate. Earlier answers
    /// survive: untouched fields are never reset.
    pub fn apply(&mut self, patch: ConfigurationPatch) {
        let ConfigurationPatch {
            primary_library_id,
            primary_library_name,
            categories,
            metrics,
            comparison_library_ids,
            auto_update_enabled,
        } = patch;

        if let Some(id) = primary_library_id {
            self.primary_library_id = Some(id);
        }
        if let Some(name) = primary_library_name {
            self.primary_library_name = Some(name);
        }
        if let Some(flags) = categories {
            self.categories = flags;
        }
        if let Some(selections) = metrics {
            self.metrics = selections;
        }
        if let Some(ids) = comparison_library_ids {
            self.comparison_library_ids = ids;
        }
        if let Some(enabled) = auto_update_enabled {
            self.auto_update_enabled = enabled;
        }
    }
}

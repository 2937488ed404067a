use crate::model::request::SourceType;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display};
use utoipa::ToSchema;

/// Key the settings blob is persisted under.
pub const SETTINGS_KEY: &str = "adminSettings";

pub const ALL_DEPARTMENTS: &str = "all";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, AsRefStr, ToSchema)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ApprovedFilterType {
    #[default]
    All,
    Leave,
    Out,
}

impl ApprovedFilterType {
    pub fn source_type(self) -> Option<SourceType> {
        match self {
            ApprovedFilterType::All => None,
            ApprovedFilterType::Leave => Some(SourceType::Leave),
            ApprovedFilterType::Out => Some(SourceType::Out),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum DarkMode {
    #[default]
    Auto,
    Light,
    Dark,
}

/// Per-session dashboard preferences. Missing keys take their defaults on load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub filter_current_month: bool,
    pub compact_view_approved: bool,
    pub approved_filter_type: ApprovedFilterType,
    pub filter_by_department: bool,
    #[schema(example = "all")]
    pub selected_department: String,
    pub dark_mode: DarkMode,
    #[schema(example = "original")]
    pub theme: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            filter_current_month: false,
            compact_view_approved: false,
            approved_filter_type: ApprovedFilterType::All,
            filter_by_department: false,
            selected_department: ALL_DEPARTMENTS.to_string(),
            dark_mode: DarkMode::Auto,
            theme: "original".to_string(),
        }
    }
}

impl Settings {
    /// Department to keep, when department filtering is active.
    pub fn department_filter(&self) -> Option<&str> {
        if self.filter_by_department && self.selected_department != ALL_DEPARTMENTS {
            Some(&self.selected_department)
        } else {
            None
        }
    }
}

/// Partial update sent by the dashboard.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPatch {
    pub filter_current_month: Option<bool>,
    pub compact_view_approved: Option<bool>,
    pub approved_filter_type: Option<ApprovedFilterType>,
    pub filter_by_department: Option<bool>,
    pub selected_department: Option<String>,
    pub dark_mode: Option<DarkMode>,
    pub theme: Option<String>,
}

/// What an applied patch means for the live view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SettingsChange {
    /// A client-side filter changed: the subscription must be rebuilt.
    pub refilter: bool,
    /// Only the layout density changed.
    pub relayout: bool,
}

impl SettingsPatch {
    pub fn apply(self, settings: &mut Settings) -> SettingsChange {
        let before = settings.clone();

        if let Some(v) = self.filter_current_month {
            settings.filter_current_month = v;
        }
        if let Some(v) = self.compact_view_approved {
            settings.compact_view_approved = v;
        }
        if let Some(v) = self.approved_filter_type {
            settings.approved_filter_type = v;
        }
        if let Some(v) = self.filter_by_department {
            settings.filter_by_department = v;
        }
        if let Some(v) = self.selected_department {
            let v = v.trim();
            settings.selected_department = if v.is_empty() {
                ALL_DEPARTMENTS.to_string()
            } else {
                v.to_string()
            };
        }
        if let Some(v) = self.dark_mode {
            settings.dark_mode = v;
        }
        if let Some(v) = self.theme {
            settings.theme = v;
        }

        // turning department filtering off also clears the selection
        if !settings.filter_by_department {
            settings.selected_department = ALL_DEPARTMENTS.to_string();
        }

        SettingsChange {
            refilter: before.filter_current_month != settings.filter_current_month
                || before.approved_filter_type != settings.approved_filter_type
                || before.filter_by_department != settings.filter_by_department
                || before.selected_department != settings.selected_department,
            relayout: before.compact_view_approved != settings.compact_view_approved,
        }
    }
}

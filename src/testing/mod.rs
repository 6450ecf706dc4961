//! Test templates, their expansion into run configurations, and the
//! campaign that drives those configurations end to end.

mod campaign;
mod expander;
mod template;

pub use campaign::{
    analysis_log_path, dump_path, CampaignOptions, ConfigurationSummary, DumpCampaign, SOS_DEBUG_COMMANDS,
};
pub use expander::{expand, expand_for_current_host, RunConfiguration};
pub use template::{AppSection, TestKind, TestSection, TestTemplate, ToolSetting};

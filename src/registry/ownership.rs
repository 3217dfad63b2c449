use serde::Deserialize;
use serde::Serialize;

use crate::RecordCategory;
use crate::UpdateScope;

/// Role this process plays in the proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessRole {
    /// Worker process; authoritative for process and plugin stats
    Server,
    /// Management process; authoritative for configuration and node stats
    Manager,
    /// Single process with no peer; owns everything
    #[default]
    Standalone,
}

/// Where a mutation of a record must be applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    Owned,
    Forward,
}

impl ProcessRole {
    pub fn ownership(
        self,
        category: RecordCategory,
    ) -> Ownership {
        let owned = match self {
            ProcessRole::Standalone => true,
            ProcessRole::Server => matches!(category, RecordCategory::ProcessStat | RecordCategory::PluginStat),
            ProcessRole::Manager => matches!(
                category,
                RecordCategory::Config | RecordCategory::NodeStat | RecordCategory::LocalConfig
            ),
        };
        if owned {
            Ownership::Owned
        } else {
            Ownership::Forward
        }
    }

    pub fn owns(
        self,
        category: RecordCategory,
    ) -> bool {
        self.ownership(category) == Ownership::Owned
    }

    /// Whether this process writes the on-disk snapshots.
    pub fn persists(self) -> bool {
        matches!(self, ProcessRole::Manager | ProcessRole::Standalone)
    }

    /// Update scope swept by this process. The manager leaves the process
    /// scope pending so it still reaches the server with the next push.
    pub fn update_scope(self) -> UpdateScope {
        match self {
            ProcessRole::Manager => UpdateScope::MANAGER,
            ProcessRole::Server | ProcessRole::Standalone => UpdateScope::PROCESS,
        }
    }
}

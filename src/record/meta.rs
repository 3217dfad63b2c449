use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;

use bitflags::bitflags;
use regex::Regex;
use serde::Deserialize;
use serde::Serialize;

use super::RecordValue;
use crate::RawStat;
use crate::RawStatBlock;
use crate::RawStatSyncKind;

/// Classification of a record; decides which process role owns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordCategory {
    Config,
    ProcessStat,
    NodeStat,
    LocalConfig,
    PluginStat,
}

impl RecordCategory {
    /// Config-like super-category
    pub fn is_config(self) -> bool {
        matches!(self, RecordCategory::Config | RecordCategory::LocalConfig)
    }

    /// Stat-like super-category
    pub fn is_stat(self) -> bool {
        !self.is_config()
    }

    pub fn mask(self) -> CategoryMask {
        match self {
            RecordCategory::Config => CategoryMask::CONFIG,
            RecordCategory::ProcessStat => CategoryMask::PROCESS,
            RecordCategory::NodeStat => CategoryMask::NODE,
            RecordCategory::LocalConfig => CategoryMask::LOCAL,
            RecordCategory::PluginStat => CategoryMask::PLUGIN,
        }
    }

    /// Keyword used in the config text snapshot
    pub fn label(self) -> &'static str {
        match self {
            RecordCategory::Config => "CONFIG",
            RecordCategory::ProcessStat => "PROCESS",
            RecordCategory::NodeStat => "NODE",
            RecordCategory::LocalConfig => "LOCAL",
            RecordCategory::PluginStat => "PLUGIN",
        }
    }

    pub(crate) fn to_wire(self) -> u8 {
        self.mask().bits() as u8
    }

    pub(crate) fn from_wire(v: u8) -> Option<Self> {
        match CategoryMask::from_bits(v as u32)? {
            CategoryMask::CONFIG => Some(RecordCategory::Config),
            CategoryMask::PROCESS => Some(RecordCategory::ProcessStat),
            CategoryMask::NODE => Some(RecordCategory::NodeStat),
            CategoryMask::LOCAL => Some(RecordCategory::LocalConfig),
            CategoryMask::PLUGIN => Some(RecordCategory::PluginStat),
            _ => None,
        }
    }
}

bitflags! {
    /// Category filter for scans.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CategoryMask: u32 {
        const CONFIG = 0x01;
        const PROCESS = 0x02;
        const NODE = 0x04;
        const LOCAL = 0x10;
        const PLUGIN = 0x20;

        const CONFIGS = Self::CONFIG.bits() | Self::LOCAL.bits();
        const STATS = Self::PROCESS.bits() | Self::NODE.bits() | Self::PLUGIN.bits();
    }
}

impl CategoryMask {
    pub fn matches(
        self,
        category: RecordCategory,
    ) -> bool {
        self.intersects(category.mask())
    }
}

bitflags! {
    /// Outstanding synchronization work for a record.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SyncFlags: u8 {
        const DISK = 0x01;
        const PEER = 0x02;
        const BUMP_VERSION = 0x04;

        const REQUIRED = Self::DISK.bits() | Self::PEER.bits();
    }
}

bitflags! {
    /// Scopes whose update callbacks still need to run.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct UpdateScope: u8 {
        const PROCESS = 0x01;
        const MANAGER = 0x02;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PersistType {
    Persistent,
    NonPersistent,
}

impl PersistType {
    pub(crate) fn to_wire(self) -> u8 {
        match self {
            PersistType::Persistent => 1,
            PersistType::NonPersistent => 2,
        }
    }

    pub(crate) fn from_wire(v: u8) -> Option<Self> {
        match v {
            1 => Some(PersistType::Persistent),
            2 => Some(PersistType::NonPersistent),
            _ => None,
        }
    }
}

/// Severity of applying a configuration change, ordered from least to most
/// disruptive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum UpdateType {
    #[default]
    None,
    Dynamic,
    RestartComponent,
    RestartAll,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CheckType {
    #[default]
    None,
    /// Value must match the regex in `check_expr`
    Str,
    /// Value must lie in the `[lo-hi]` range in `check_expr`
    Int,
    /// Value must be an IP address
    Ip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AccessType {
    #[default]
    Default,
    NoAccess,
    ReadOnly,
}

/// Where the current value of a config record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SourceType {
    #[default]
    Default,
    File,
    Environment,
    Explicit,
    Remote,
}

macro_rules! wire_enum {
    ($ty:ident { $($variant:ident = $v:expr),+ $(,)? }) => {
        impl $ty {
            pub(crate) fn to_wire(self) -> u8 {
                match self {
                    $($ty::$variant => $v,)+
                }
            }

            pub(crate) fn from_wire(v: u8) -> Option<Self> {
                match v {
                    $($v => Some($ty::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

wire_enum!(UpdateType { None = 0, Dynamic = 1, RestartComponent = 2, RestartAll = 3 });
wire_enum!(CheckType { None = 0, Str = 1, Int = 2, Ip = 3 });
wire_enum!(AccessType { Default = 0, NoAccess = 1, ReadOnly = 2 });
wire_enum!(SourceType { Default = 0, File = 1, Environment = 2, Explicit = 3, Remote = 4 });

/// Invoked with the record name and current value, under the record's lock.
pub type UpdateCallback = Arc<dyn Fn(&str, &RecordValue) + Send + Sync>;

/// Binding between a stat record and its slot in a raw-stat block.
#[derive(Debug, Clone)]
pub struct RawStatSync {
    pub block: Arc<RawStatBlock>,
    pub id: usize,
    pub kind: RawStatSyncKind,
}

#[derive(Debug)]
pub struct StatMeta {
    pub persist: PersistType,
    /// Canonical aggregation slot; a bound raw-stat block points at it.
    pub raw: Arc<RawStat>,
    pub sync: Option<RawStatSync>,
}

impl StatMeta {
    pub(crate) fn new(persist: PersistType) -> Self {
        Self {
            persist,
            raw: Arc::new(RawStat::default()),
            sync: None,
        }
    }
}

pub struct ConfigMeta {
    pub update_type: UpdateType,
    pub update_required: UpdateScope,
    pub check_type: CheckType,
    pub check_expr: Option<String>,
    pub access: AccessType,
    pub source: SourceType,
    pub callbacks: Vec<UpdateCallback>,
}

impl fmt::Debug for ConfigMeta {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("ConfigMeta")
            .field("update_type", &self.update_type)
            .field("update_required", &self.update_required)
            .field("check_type", &self.check_type)
            .field("check_expr", &self.check_expr)
            .field("access", &self.access)
            .field("source", &self.source)
            .field("callbacks", &self.callbacks.len())
            .finish()
    }
}

impl ConfigMeta {
    pub(crate) fn new(source: SourceType) -> Self {
        Self {
            update_type: UpdateType::None,
            update_required: UpdateScope::empty(),
            check_type: CheckType::None,
            check_expr: None,
            access: AccessType::Default,
            source,
            callbacks: Vec::new(),
        }
    }

    /// Runs the record's validity check against a textual value.
    pub fn validate(
        &self,
        text: &str,
    ) -> bool {
        validity_check(self.check_type, self.check_expr.as_deref(), text)
    }
}

/// Category-specific metadata. The variant is chosen when the record is
/// created and never changes.
#[derive(Debug)]
pub enum RecordMeta {
    Stat(StatMeta),
    Config(ConfigMeta),
}

impl RecordMeta {
    pub(crate) fn for_category(
        category: RecordCategory,
        source: SourceType,
    ) -> Self {
        if category.is_stat() {
            RecordMeta::Stat(StatMeta::new(PersistType::Persistent))
        } else {
            RecordMeta::Config(ConfigMeta::new(source))
        }
    }

    pub fn as_stat(&self) -> Option<&StatMeta> {
        match self {
            RecordMeta::Stat(m) => Some(m),
            RecordMeta::Config(_) => None,
        }
    }

    pub fn as_config(&self) -> Option<&ConfigMeta> {
        match self {
            RecordMeta::Config(m) => Some(m),
            RecordMeta::Stat(_) => None,
        }
    }

    pub fn as_config_mut(&mut self) -> Option<&mut ConfigMeta> {
        match self {
            RecordMeta::Config(m) => Some(m),
            RecordMeta::Stat(_) => None,
        }
    }

    pub fn as_stat_mut(&mut self) -> Option<&mut StatMeta> {
        match self {
            RecordMeta::Stat(m) => Some(m),
            RecordMeta::Config(_) => None,
        }
    }
}

pub(crate) fn validity_check(
    check_type: CheckType,
    check_expr: Option<&str>,
    text: &str,
) -> bool {
    match check_type {
        CheckType::None => true,
        CheckType::Str => match check_expr {
            Some(expr) => Regex::new(expr).map(|re| re.is_match(text)).unwrap_or(false),
            None => true,
        },
        CheckType::Int => match check_expr.and_then(parse_range) {
            Some((lo, hi)) => text.trim().parse::<i64>().map(|v| v >= lo && v <= hi).unwrap_or(false),
            None => false,
        },
        CheckType::Ip => text.trim().parse::<IpAddr>().is_ok(),
    }
}

/// `[lo-hi]`
fn parse_range(expr: &str) -> Option<(i64, i64)> {
    let inner = expr.trim().strip_prefix('[')?.strip_suffix(']')?;
    // lo may itself be negative, so split on the last '-' that follows a digit
    let split = inner
        .char_indices()
        .skip(1)
        .filter(|(_, c)| *c == '-')
        .map(|(i, _)| i)
        .find(|i| inner[..*i].trim().parse::<i64>().is_ok())?;
    let lo = inner[..split].trim().parse().ok()?;
    let hi = inner[split + 1..].trim().parse().ok()?;
    Some((lo, hi))
}

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

pub const FIELD_COMPUTER_NAME: &str = "ComputerName";
pub const FIELD_SYSTEM_MANUFACTURER: &str = "SystemManufacturer";
pub const FIELD_SYSTEM_PRODUCT_NAME: &str = "SystemProductName";
pub const FIELD_DESIGN_CAPACITY: &str = "DesignCapacity";
pub const FIELD_FULL_CHARGE_CAPACITY: &str = "FullChargeCapacity";
pub const FIELD_CYCLE_COUNT: &str = "CycleCount";
pub const FIELD_ACTIVE_RUNTIME: &str = "ActiveRuntime";
pub const FIELD_ACTIVE_RUNTIME_AT_DESIGN: &str = "ActiveRuntimeAtDesignCapacity";
pub const FIELD_MODERN_STANDBY: &str = "ModernStandby";
pub const FIELD_MODERN_STANDBY_AT_DESIGN: &str = "ModernStandbyAtDesignCapacity";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    UInt32,
}

impl FieldKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::UInt32 => "uint32",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "string" => Some(Self::String),
            "uint32" => Some(Self::UInt32),
            _ => None,
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: Cow<'static, str>,
    pub kind: FieldKind,
    pub nullable: bool,
    pub is_key: bool,
}

impl FieldSpec {
    const fn declared(name: &'static str, kind: FieldKind, nullable: bool, is_key: bool) -> Self {
        Self {
            name: Cow::Borrowed(name),
            kind,
            nullable,
            is_key,
        }
    }
}

pub const BATTERY_FIELDS: &[FieldSpec] = &[
    FieldSpec::declared(FIELD_COMPUTER_NAME, FieldKind::String, false, true),
    FieldSpec::declared(FIELD_SYSTEM_MANUFACTURER, FieldKind::String, true, false),
    FieldSpec::declared(FIELD_SYSTEM_PRODUCT_NAME, FieldKind::String, true, false),
    FieldSpec::declared(FIELD_DESIGN_CAPACITY, FieldKind::UInt32, false, false),
    FieldSpec::declared(FIELD_FULL_CHARGE_CAPACITY, FieldKind::UInt32, false, false),
    FieldSpec::declared(FIELD_CYCLE_COUNT, FieldKind::UInt32, false, false),
    FieldSpec::declared(FIELD_ACTIVE_RUNTIME, FieldKind::String, false, false),
    FieldSpec::declared(FIELD_ACTIVE_RUNTIME_AT_DESIGN, FieldKind::String, false, false),
    FieldSpec::declared(FIELD_MODERN_STANDBY, FieldKind::String, false, false),
    FieldSpec::declared(FIELD_MODERN_STANDBY_AT_DESIGN, FieldKind::String, false, false),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    UInt32(u32),
    Null,
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        match self {
            Self::UInt32(value) => Some(*value),
            _ => None,
        }
    }

    pub fn matches_kind(&self, kind: FieldKind) -> bool {
        matches!(
            (self, kind),
            (Self::Null, _) | (Self::Text(_), FieldKind::String) | (Self::UInt32(_), FieldKind::UInt32)
        )
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(value) => f.write_str(value),
            Self::UInt32(value) => write!(f, "{value}"),
            Self::Null => f.write_str("<null>"),
        }
    }
}

pub type FieldValues = BTreeMap<String, FieldValue>;

pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|char| char.is_ascii_alphanumeric() || char == '_')
        }
        _ => false,
    }
}

/// Canonical backslash-separated form; `None` for an empty path or an invalid segment.
pub fn normalize_namespace(path: &str) -> Option<String> {
    let segments: Vec<&str> = path
        .split(['\\', '/'])
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .collect();

    if segments.is_empty() || !segments.iter().all(|segment| is_valid_identifier(segment)) {
        return None;
    }

    Some(segments.join("\\"))
}

pub fn namespace_lineage(namespace: &str) -> Vec<String> {
    let mut lineage = Vec::new();
    let mut current = namespace;
    loop {
        lineage.push(current.to_string());
        match current.rfind('\\') {
            Some(index) => current = &current[..index],
            None => break,
        }
    }
    lineage
}

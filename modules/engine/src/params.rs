use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::EngineError;
use crate::parser::{AdvertisedKind, AdvertisedOption};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Bool(bool),
    Int(i64),
    Text(String),
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(n) => write!(f, "{}", n),
            Self::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<bool> for OptionValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for OptionValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for OptionValue {
    fn from(value: i32) -> Self {
        Self::Int(value as i64)
    }
}

impl From<u32> for OptionValue {
    fn from(value: u32) -> Self {
        Self::Int(value as i64)
    }
}

impl From<&str> for OptionValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionKind {
    Int { min: i64, max: i64 },
    Bool,
    Text,
    /// A combo option; the value must be one of the advertised `var`s.
    Choice(Vec<String>),
}

impl OptionKind {
    fn check(&self, name: &str, value: &OptionValue) -> Result<(), EngineError> {
        match (self, value) {
            (Self::Int { min, max }, OptionValue::Int(n)) => {
                if n < min || n > max {
                    return Err(EngineError::InvalidParameter(format!(
                        "{} must be within {}..={}, got {}",
                        name, min, max, n
                    )));
                }
                Ok(())
            }
            (Self::Bool, OptionValue::Bool(_)) => Ok(()),
            (Self::Text, OptionValue::Text(s)) => {
                if s.contains(['\n', '\r']) {
                    return Err(EngineError::InvalidParameter(format!(
                        "{} must not contain line breaks",
                        name
                    )));
                }
                Ok(())
            }
            (Self::Choice(vars), OptionValue::Text(s)) => {
                if !vars.iter().any(|v| v.eq_ignore_ascii_case(s)) {
                    return Err(EngineError::InvalidParameter(format!(
                        "{} must be one of {:?}, got {:?}",
                        name, vars, s
                    )));
                }
                Ok(())
            }
            (kind, value) => Err(EngineError::InvalidParameter(format!(
                "{} expects {:?}, got {:?}",
                name, kind, value
            ))),
        }
    }
}

enum Baseline {
    Int(i64),
    Bool(bool),
    Text(&'static str),
}

impl Baseline {
    fn value(&self) -> OptionValue {
        match self {
            Self::Int(n) => OptionValue::Int(*n),
            Self::Bool(b) => OptionValue::Bool(*b),
            Self::Text(s) => OptionValue::Text(s.to_string()),
        }
    }
}

struct CatalogEntry {
    name: &'static str,
    kind: OptionKind,
    default: Baseline,
}

const fn spin(name: &'static str, min: i64, max: i64, default: i64) -> CatalogEntry {
    CatalogEntry {
        name,
        kind: OptionKind::Int { min, max },
        default: Baseline::Int(default),
    }
}

const fn check(name: &'static str, default: bool) -> CatalogEntry {
    CatalogEntry {
        name,
        kind: OptionKind::Bool,
        default: Baseline::Bool(default),
    }
}

const CATALOG: [CatalogEntry; 15] = [
    CatalogEntry {
        name: "Debug Log File",
        kind: OptionKind::Text,
        default: Baseline::Text(""),
    },
    spin("Contempt", -100, 100, 0),
    spin("Min Split Depth", 0, 12, 0),
    spin("Threads", 1, 1024, 1),
    check("Ponder", false),
    spin("Hash", 1, 33_554_432, 16),
    spin("MultiPV", 1, 500, 1),
    spin("Skill Level", 0, 20, 20),
    spin("Move Overhead", 0, 5000, 10),
    spin("Minimum Thinking Time", 0, 5000, 20),
    spin("Slow Mover", 10, 1000, 100),
    check("UCI_Chess960", false),
    check("UCI_LimitStrength", false),
    spin("UCI_Elo", 1320, 3190, 1350),
    check("UCI_ShowWDL", false),
];

/// Mirror of the option values the engine has acknowledged.
#[derive(Debug, Clone)]
pub struct ParameterStore {
    kinds: BTreeMap<String, OptionKind>,
    defaults: BTreeMap<String, OptionValue>,
    current: BTreeMap<String, OptionValue>,
}

impl ParameterStore {
    /// Builds the accepted option set. When the engine advertised nothing the
    /// built-in catalog is trusted as is.
    pub fn new(advertised: &[AdvertisedOption]) -> Self {
        let mut kinds = BTreeMap::new();
        let mut defaults = BTreeMap::new();

        if advertised.is_empty() {
            for entry in CATALOG.iter() {
                kinds.insert(entry.name.to_string(), entry.kind.clone());
                defaults.insert(entry.name.to_string(), entry.default.value());
            }
        } else {
            let catalog_table = &CATALOG;
            for option in advertised {
                let catalog = catalog_table.iter().find(|e| e.name == option.name);
                let kind = match (&option.kind, catalog) {
                    (AdvertisedKind::Spin, _) => match (option.min, option.max, catalog) {
                        (Some(min), Some(max), _) => OptionKind::Int { min, max },
                        (_, _, Some(entry)) => entry.kind.clone(),
                        _ => OptionKind::Int {
                            min: i64::MIN,
                            max: i64::MAX,
                        },
                    },
                    (AdvertisedKind::Check, _) => OptionKind::Bool,
                    (AdvertisedKind::Text, _) => OptionKind::Text,
                    (AdvertisedKind::Combo(vars), _) => OptionKind::Choice(vars.clone()),
                    (AdvertisedKind::Button, _) => continue,
                };
                if let Some(entry) = catalog {
                    let baseline = entry.default.value();
                    let fallback = option
                        .default
                        .as_deref()
                        .and_then(|raw| Self::coerce(&kind, raw));
                    match (kind.check(entry.name, &baseline), fallback) {
                        (Ok(()), _) => {
                            defaults.insert(option.name.clone(), baseline);
                        }
                        (Err(_), Some(value)) => {
                            defaults.insert(option.name.clone(), value);
                        }
                        (Err(_), None) => {}
                    }
                }
                kinds.insert(option.name.clone(), kind);
            }
        }

        Self {
            kinds,
            defaults,
            current: BTreeMap::new(),
        }
    }

    fn coerce(kind: &OptionKind, raw: &str) -> Option<OptionValue> {
        match kind {
            OptionKind::Int { .. } => raw.parse().ok().map(OptionValue::Int),
            OptionKind::Bool => raw.parse().ok().map(OptionValue::Bool),
            OptionKind::Text | OptionKind::Choice(_) => Some(OptionValue::Text(raw.to_string())),
        }
    }

    pub fn supports(&self, name: &str) -> bool {
        self.kinds.contains_key(name)
    }

    pub fn kind(&self, name: &str) -> Option<&OptionKind> {
        self.kinds.get(name)
    }

    pub fn get(&self, name: &str) -> Option<OptionValue> {
        self.current.get(name).cloned()
    }

    pub fn get_all(&self) -> BTreeMap<String, OptionValue> {
        self.current.clone()
    }

    pub fn defaults(&self) -> BTreeMap<String, OptionValue> {
        self.defaults.clone()
    }

    pub fn validate(&self, name: &str, value: &OptionValue) -> Result<(), EngineError> {
        let kind = self
            .kinds
            .get(name)
            .ok_or_else(|| EngineError::InvalidParameter(format!("unknown option {:?}", name)))?;
        kind.check(name, value)
    }

    /// Validates the whole update up front and returns only the entries that
    /// differ from the acknowledged values.
    pub fn plan(
        &self,
        updates: &BTreeMap<String, OptionValue>,
    ) -> Result<Vec<(String, OptionValue)>, EngineError> {
        for (name, value) in updates {
            self.validate(name, value)?;
        }
        Ok(updates
            .iter()
            .filter(|(name, value)| self.current.get(*name) != Some(*value))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect())
    }

    /// Records values the engine has confirmed.
    pub fn commit(&mut self, changes: Vec<(String, OptionValue)>) {
        self.current.extend(changes);
    }
}

//! Zone structure specification (aisle/shelf/bin topology + addressing pattern).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use slotforge_core::{DomainError, DomainResult, ValueObject};

/// Widest zero-padding accepted for aisle/shelf digit fields.
pub const MAX_DIGITS: u32 = 6;

/// Alphabet used to render a bin's position on its shelf.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BinLabeling {
    /// Spreadsheet-column letters: A..Z, AA, AB, ...
    #[default]
    Letters,
    /// 1-based, zero-padded decimal numbers.
    Numbers,
}

/// Which end of the shelf gets the first label.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BinDirection {
    #[default]
    BottomUp,
    TopDown,
}

/// Rendering rules for bin addresses.
///
/// The address component order (`warehouse, zone, aisle, shelf, position`) is a
/// compatibility contract with the label printing subsystem; only the rendering
/// of each component is configurable here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CodePattern {
    pub separator: String,
    pub aisle_digits: u32,
    pub shelf_digits: u32,
    pub bin_labeling: BinLabeling,
    pub bin_direction: BinDirection,
}

impl Default for CodePattern {
    fn default() -> Self {
        Self {
            separator: "-".to_string(),
            aisle_digits: 2,
            shelf_digits: 2,
            bin_labeling: BinLabeling::Letters,
            bin_direction: BinDirection::BottomUp,
        }
    }
}

impl ValueObject for CodePattern {}

impl CodePattern {
    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    pub fn with_digits(mut self, aisle_digits: u32, shelf_digits: u32) -> Self {
        self.aisle_digits = aisle_digits;
        self.shelf_digits = shelf_digits;
        self
    }

    pub fn with_labeling(mut self, labeling: BinLabeling) -> Self {
        self.bin_labeling = labeling;
        self
    }

    pub fn with_direction(mut self, direction: BinDirection) -> Self {
        self.bin_direction = direction;
        self
    }

    fn validate(&self) -> DomainResult<()> {
        let sep_len = self.separator.chars().count();
        if !(1..=3).contains(&sep_len) {
            return Err(DomainError::field(
                "codePattern.separator",
                "must be 1 to 3 characters",
            ));
        }
        // Components are alphanumeric; a non-alphanumeric separator keeps
        // rendered addresses injective over coordinates.
        if self
            .separator
            .chars()
            .any(|c| c.is_alphanumeric() || c.is_whitespace())
        {
            return Err(DomainError::field(
                "codePattern.separator",
                "must not contain letters, digits or whitespace",
            ));
        }
        for (field, digits) in [
            ("codePattern.aisleDigits", self.aisle_digits),
            ("codePattern.shelfDigits", self.shelf_digits),
        ] {
            if !(1..=MAX_DIGITS).contains(&digits) {
                return Err(DomainError::field(
                    field,
                    format!("must be between 1 and {MAX_DIGITS}"),
                ));
            }
        }
        Ok(())
    }
}

/// Per-aisle override of the spec-wide shelf/bin defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AisleConfig {
    pub aisle_number: i64,
    pub shelves_count: i64,
    pub bins_per_shelf: i64,
}

impl AisleConfig {
    pub fn new(aisle_number: u32, shelves_count: u32, bins_per_shelf: u32) -> Self {
        Self {
            aisle_number: aisle_number.into(),
            shelves_count: shelves_count.into(),
            bins_per_shelf: bins_per_shelf.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct AisleOverride {
    shelves: u32,
    bins_per_shelf: u32,
}

/// Unvalidated structure configuration, as parsed by the API layer.
///
/// Counts are signed so that negative input reaches validation (and gets a
/// field-specific message) instead of failing inside the deserializer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructureDraft {
    pub aisles: i64,
    #[serde(default)]
    pub shelves_per_aisle: i64,
    #[serde(default)]
    pub bins_per_shelf: i64,
    #[serde(default)]
    pub aisle_configs: Vec<AisleConfig>,
    #[serde(default)]
    pub code_pattern: CodePattern,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<JsonValue>,
}

impl StructureDraft {
    pub fn uniform(aisles: u32, shelves_per_aisle: u32, bins_per_shelf: u32) -> Self {
        Self {
            aisles: aisles.into(),
            shelves_per_aisle: shelves_per_aisle.into(),
            bins_per_shelf: bins_per_shelf.into(),
            aisle_configs: Vec::new(),
            code_pattern: CodePattern::default(),
            dimensions: None,
        }
    }

    pub fn with_aisle_config(mut self, config: AisleConfig) -> Self {
        self.aisle_configs.push(config);
        self
    }

    pub fn with_code_pattern(mut self, pattern: CodePattern) -> Self {
        self.code_pattern = pattern;
        self
    }

    pub fn with_dimensions(mut self, dimensions: JsonValue) -> Self {
        self.dimensions = Some(dimensions);
        self
    }

    pub fn validate(self) -> DomainResult<StructureSpec> {
        StructureSpec::new(self)
    }
}

/// Validated, immutable zone structure.
///
/// Construction is the only validation point: every `StructureSpec` value in the
/// system satisfies `aisles >= 1`, every aisle has at least one shelf and one bin
/// per shelf (via the defaults or its override), and every override targets an
/// aisle in `1..=aisles`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "StructureDraft", into = "StructureDraft")]
pub struct StructureSpec {
    aisles: u32,
    shelves_per_aisle: u32,
    bins_per_shelf: u32,
    overrides: BTreeMap<u32, AisleOverride>,
    code_pattern: CodePattern,
    dimensions: Option<JsonValue>,
}

impl ValueObject for StructureSpec {}

fn count_field(field: &str, value: i64, min: i64) -> DomainResult<u32> {
    if value < min {
        return Err(DomainError::field(field, format!("must be at least {min}")));
    }
    u32::try_from(value).map_err(|_| DomainError::field(field, "is too large"))
}

impl StructureSpec {
    pub fn new(draft: StructureDraft) -> DomainResult<Self> {
        let aisles = count_field("aisles", draft.aisles, 1)?;
        // Defaults may be zero only when every aisle carries an override.
        let shelves_per_aisle = count_field("shelvesPerAisle", draft.shelves_per_aisle, 0)?;
        let bins_per_shelf = count_field("binsPerShelf", draft.bins_per_shelf, 0)?;

        let mut overrides = BTreeMap::new();
        for (idx, cfg) in draft.aisle_configs.iter().enumerate() {
            let aisle_number =
                count_field(&format!("aisleConfigs[{idx}].aisleNumber"), cfg.aisle_number, 1)?;
            if aisle_number > aisles {
                return Err(DomainError::field(
                    format!("aisleConfigs[{idx}].aisleNumber"),
                    format!("aisle {aisle_number} is outside 1..={aisles}"),
                ));
            }
            let shelves =
                count_field(&format!("aisleConfigs[{idx}].shelvesCount"), cfg.shelves_count, 1)?;
            let bins = count_field(
                &format!("aisleConfigs[{idx}].binsPerShelf"),
                cfg.bins_per_shelf,
                1,
            )?;
            let previous = overrides.insert(
                aisle_number,
                AisleOverride {
                    shelves,
                    bins_per_shelf: bins,
                },
            );
            if previous.is_some() {
                return Err(DomainError::field(
                    format!("aisleConfigs[{idx}].aisleNumber"),
                    format!("aisle {aisle_number} is configured more than once"),
                ));
            }
        }

        if (shelves_per_aisle == 0 || bins_per_shelf == 0) && overrides.len() < aisles as usize {
            let uncovered = (1..=aisles)
                .find(|a| !overrides.contains_key(a))
                .unwrap_or(1);
            let field = if shelves_per_aisle == 0 {
                "shelvesPerAisle"
            } else {
                "binsPerShelf"
            };
            return Err(DomainError::field(
                field,
                format!("must be at least 1 (aisle {uncovered} has no override)"),
            ));
        }

        draft.code_pattern.validate()?;

        Ok(Self {
            aisles,
            shelves_per_aisle,
            bins_per_shelf,
            overrides,
            code_pattern: draft.code_pattern,
            dimensions: draft.dimensions,
        })
    }

    /// Shorthand for a spec without overrides, using the default code pattern.
    pub fn uniform(aisles: u32, shelves_per_aisle: u32, bins_per_shelf: u32) -> DomainResult<Self> {
        Self::new(StructureDraft::uniform(aisles, shelves_per_aisle, bins_per_shelf))
    }

    pub fn aisles(&self) -> u32 {
        self.aisles
    }

    pub fn shelves_per_aisle(&self) -> u32 {
        self.shelves_per_aisle
    }

    pub fn bins_per_shelf(&self) -> u32 {
        self.bins_per_shelf
    }

    pub fn code_pattern(&self) -> &CodePattern {
        &self.code_pattern
    }

    pub fn dimensions(&self) -> Option<&JsonValue> {
        self.dimensions.as_ref()
    }

    /// Shelf count for an aisle: its override if present, else the spec-wide default.
    pub fn effective_shelves(&self, aisle_number: u32) -> u32 {
        self.overrides
            .get(&aisle_number)
            .map_or(self.shelves_per_aisle, |o| o.shelves)
    }

    /// Bins per shelf for an aisle: its override if present, else the spec-wide default.
    pub fn effective_bins_per_shelf(&self, aisle_number: u32) -> u32 {
        self.overrides
            .get(&aisle_number)
            .map_or(self.bins_per_shelf, |o| o.bins_per_shelf)
    }

    /// Number of aisles that fall back to the spec-wide defaults.
    pub fn default_aisle_count(&self) -> u32 {
        // Overrides are keyed within 1..=aisles, so this cannot underflow.
        self.aisles - self.overrides.len() as u32
    }

    /// Overrides in aisle order (a fresh copy; the spec keeps its own map).
    pub fn aisle_configs(&self) -> Vec<AisleConfig> {
        self.overrides
            .iter()
            .map(|(aisle, o)| AisleConfig::new(*aisle, o.shelves, o.bins_per_shelf))
            .collect()
    }

    pub(crate) fn overrides(&self) -> impl Iterator<Item = (u32, u32, u32)> + '_ {
        self.overrides
            .iter()
            .map(|(aisle, o)| (*aisle, o.shelves, o.bins_per_shelf))
    }

    /// `true` when both specs describe the same aisles with the same shelf and
    /// bin counts per aisle. Code pattern and dimensions are ignored.
    pub fn same_topology(&self, other: &StructureSpec) -> bool {
        self.aisles == other.aisles
            && (1..=self.aisles).all(|a| {
                self.effective_shelves(a) == other.effective_shelves(a)
                    && self.effective_bins_per_shelf(a) == other.effective_bins_per_shelf(a)
            })
    }

    pub fn to_draft(&self) -> StructureDraft {
        StructureDraft {
            aisles: self.aisles.into(),
            shelves_per_aisle: self.shelves_per_aisle.into(),
            bins_per_shelf: self.bins_per_shelf.into(),
            aisle_configs: self.aisle_configs(),
            code_pattern: self.code_pattern.clone(),
            dimensions: self.dimensions.clone(),
        }
    }

    pub fn with_aisles(&self, aisles: u32) -> DomainResult<Self> {
        let mut draft = self.to_draft();
        draft.aisles = aisles.into();
        Self::new(draft)
    }

    /// Adds or replaces the override for `config.aisle_number`.
    pub fn with_aisle_config(&self, config: AisleConfig) -> DomainResult<Self> {
        let mut draft = self.to_draft();
        draft
            .aisle_configs
            .retain(|c| c.aisle_number != config.aisle_number);
        draft.aisle_configs.push(config);
        Self::new(draft)
    }

    pub fn without_aisle_config(&self, aisle_number: u32) -> DomainResult<Self> {
        let mut draft = self.to_draft();
        draft
            .aisle_configs
            .retain(|c| c.aisle_number != i64::from(aisle_number));
        Self::new(draft)
    }

    pub fn with_code_pattern(&self, pattern: CodePattern) -> DomainResult<Self> {
        Self::new(self.to_draft().with_code_pattern(pattern))
    }

    pub fn with_dimensions(&self, dimensions: Option<JsonValue>) -> Self {
        Self {
            dimensions,
            ..self.clone()
        }
    }
}

impl TryFrom<StructureDraft> for StructureSpec {
    type Error = DomainError;

    fn try_from(value: StructureDraft) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<StructureSpec> for StructureDraft {
    fn from(value: StructureSpec) -> Self {
        value.to_draft()
    }
}

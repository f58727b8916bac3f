use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::model::Pointer;
use crate::text_view::WordIdFormat;

/// Edit distance implementation used by the candidate refiner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceAlgorithm {
    Levenshtein,
    #[default]
    BitParallelMyers,
}

impl FromStr for DistanceAlgorithm {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match canonical_name(s).as_str() {
            "levenshtein" => Ok(DistanceAlgorithm::Levenshtein),
            "bitparallelmyers" | "myers" => Ok(DistanceAlgorithm::BitParallelMyers),
            _ => Err(ConfigError::UnknownAlgorithm(s.to_string())),
        }
    }
}

/// The fixed set of resolution strategies run by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolverStrategy {
    Pointer,
    TokenFirst,
    Legacy,
}

impl ResolverStrategy {
    pub const DEFAULT_ORDER: [ResolverStrategy; 3] = [
        ResolverStrategy::Pointer,
        ResolverStrategy::TokenFirst,
        ResolverStrategy::Legacy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResolverStrategy::Pointer => "pointer",
            ResolverStrategy::TokenFirst => "token_first",
            ResolverStrategy::Legacy => "legacy",
        }
    }
}

impl fmt::Display for ResolverStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResolverStrategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match canonical_name(s).as_str() {
            "pointer" => Ok(ResolverStrategy::Pointer),
            "tokenfirst" => Ok(ResolverStrategy::TokenFirst),
            "legacy" => Ok(ResolverStrategy::Legacy),
            _ => Err(ConfigError::UnknownStrategy(s.to_string())),
        }
    }
}

/// Strategy order, either `auto` or an explicit list.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "StrategyOrderRepr", into = "StrategyOrderRepr")]
pub enum StrategyOrder {
    #[default]
    Auto,
    Explicit(Vec<ResolverStrategy>),
}

impl StrategyOrder {
    pub fn strategies(&self) -> Vec<ResolverStrategy> {
        match self {
            StrategyOrder::Auto => ResolverStrategy::DEFAULT_ORDER.to_vec(),
            StrategyOrder::Explicit(list) => list.clone(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let strategies = self.strategies();
        if strategies.is_empty() {
            return Err(ConfigError::EmptyStrategyOrder);
        }
        let mut seen = HashSet::new();
        for s in &strategies {
            if !seen.insert(*s) {
                return Err(ConfigError::DuplicateStrategy(*s));
            }
        }
        if let Some(pos) = strategies.iter().position(|s| *s == ResolverStrategy::Legacy) {
            if let Some(after) = strategies.get(pos + 1) {
                return Err(ConfigError::UnreachableStrategy { strategy: *after });
            }
        }
        Ok(())
    }
}

impl FromStr for StrategyOrder {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if canonical_name(s) == "auto" {
            return Ok(StrategyOrder::Auto);
        }
        let list = s
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(ResolverStrategy::from_str)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(StrategyOrder::Explicit(list))
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum StrategyOrderRepr {
    Name(String),
    List(Vec<ResolverStrategy>),
}

impl TryFrom<StrategyOrderRepr> for StrategyOrder {
    type Error = ConfigError;

    fn try_from(repr: StrategyOrderRepr) -> Result<Self, Self::Error> {
        match repr {
            StrategyOrderRepr::Name(name) => name.parse(),
            StrategyOrderRepr::List(list) => Ok(StrategyOrder::Explicit(list)),
        }
    }
}

impl From<StrategyOrder> for StrategyOrderRepr {
    fn from(order: StrategyOrder) -> Self {
        match order {
            StrategyOrder::Auto => StrategyOrderRepr::Name("auto".to_string()),
            StrategyOrder::Explicit(list) => StrategyOrderRepr::List(list),
        }
    }
}

/// Which pointer kinds the pointer strategy honours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointerMode {
    Disabled,
    WordIds,
    Offsets,
    #[default]
    Any,
}

impl PointerMode {
    pub fn accepts(&self, pointer: &Pointer) -> bool {
        matches!(
            (self, pointer),
            (PointerMode::Any, _)
                | (PointerMode::WordIds, Pointer::WordIds(_))
                | (PointerMode::Offsets, Pointer::Offsets { .. })
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PointerOptions {
    pub mode: PointerMode,
    pub strict: bool,
    pub max_gap_between_ids: u32,
    pub word_id_format: String,
    pub confidence_when_strict: f64,
    pub confidence_when_relaxed: f64,
    pub gap_penalty: f64,
}

impl Default for PointerOptions {
    fn default() -> Self {
        Self {
            mode: PointerMode::Any,
            strict: true,
            max_gap_between_ids: 1,
            word_id_format: WordIdFormat::DEFAULT_TEMPLATE.to_string(),
            confidence_when_strict: 0.98,
            confidence_when_relaxed: 0.9,
            gap_penalty: 0.05,
        }
    }
}

/// Weights used to blend a span score with the extraction confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceOptions {
    pub span_weight: f64,
    pub field_weight: f64,
    pub exact_match_score: f64,
}

impl Default for ConfidenceOptions {
    fn default() -> Self {
        Self {
            span_weight: 0.6,
            field_weight: 0.4,
            exact_match_score: 1.0,
        }
    }
}

impl ConfidenceOptions {
    pub fn blend(&self, span_score: f64, field_confidence: f64) -> f64 {
        self.span_weight * span_score + self.field_weight * field_confidence
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelOptions {
    pub enabled: bool,
    pub max_words: usize,
}

impl Default for LabelOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            max_words: 3,
        }
    }
}

/// All resolver settings. Every field has a default, so an empty JSON
/// object is a valid configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverOptions {
    pub distance_algorithm: DistanceAlgorithm,
    pub edit_distance_threshold: f64,
    pub max_candidates: usize,
    pub strategy_order: StrategyOrder,
    pub pointer: PointerOptions,
    pub confidence: ConfidenceOptions,
    pub label: LabelOptions,
    /// Worker threads used per strategy run; 0 uses the global rayon pool.
    pub max_degree_of_parallelism: usize,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            distance_algorithm: DistanceAlgorithm::default(),
            edit_distance_threshold: 0.25,
            max_candidates: 64,
            strategy_order: StrategyOrder::Auto,
            pointer: PointerOptions::default(),
            confidence: ConfidenceOptions::default(),
            label: LabelOptions::default(),
            max_degree_of_parallelism: 0,
        }
    }
}

impl ResolverOptions {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let options: ResolverOptions = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = self.edit_distance_threshold;
        if !(0.0..=1.0).contains(&t) {
            return Err(ConfigError::InvalidThreshold(t));
        }
        if self.max_candidates == 0 {
            return Err(ConfigError::ZeroMaxCandidates);
        }
        self.strategy_order.validate()?;
        WordIdFormat::new(&self.pointer.word_id_format)?;

        let confidences = [
            ("pointer.confidence_when_strict", self.pointer.confidence_when_strict),
            ("pointer.confidence_when_relaxed", self.pointer.confidence_when_relaxed),
            ("pointer.gap_penalty", self.pointer.gap_penalty),
            ("confidence.span_weight", self.confidence.span_weight),
            ("confidence.field_weight", self.confidence.field_weight),
            ("confidence.exact_match_score", self.confidence.exact_match_score),
        ];
        for (name, value) in confidences {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::InvalidConfidence { name, value });
            }
        }
        Ok(())
    }
}

fn canonical_name(s: &str) -> String {
    s.trim()
        .chars()
        .filter(|c| *c != '_' && *c != '-' && !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

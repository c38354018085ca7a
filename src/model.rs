use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

// ── Cards ──

/// A card in the internal schema, ready to be persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CardRecord {
    pub scryfall_id: String,
    pub name: String,
    pub mana_cost: String,
    pub cmc: f64,
    pub type_line: String,
    pub oracle_text: String,
    // "*" and "1+*" are legal values, so these stay strings.
    pub power: Option<String>,
    pub toughness: Option<String>,
    pub colors: Vec<String>,
    pub keywords: Vec<String>,
    pub rarity: String,
    pub set_code: String,
    pub set_name: String,
    pub collector_number: String,
    pub image_url: Option<String>,
    pub prices: BTreeMap<String, serde_json::Value>,
    pub legalities: BTreeMap<String, String>,
    pub flavor_text: Option<String>,
    pub artist: Option<String>,
    pub effects: EffectSet,
}

impl CardRecord {
    pub fn is_creature(&self) -> bool {
        self.type_line.to_lowercase().contains("creature")
    }

    pub fn is_instant_or_sorcery(&self) -> bool {
        let t = self.type_line.to_lowercase();
        t.contains("instant") || t.contains("sorcery")
    }

    /// True when the color set carries `code` ("R") or its long name ("red").
    pub fn has_color(&self, code: &str, long_name: &str) -> bool {
        self.colors
            .iter()
            .any(|c| c.eq_ignore_ascii_case(code) || c.eq_ignore_ascii_case(long_name))
    }
}

// ── Effects ──

/// Which enrichment strategy produced an [`EffectSet`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrichmentTier {
    Generated,
    TextAnalysis,
    Rules,
    #[default]
    Skipped,
}

impl EnrichmentTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnrichmentTier::Generated => "generated",
            EnrichmentTier::TextAnalysis => "text_analysis",
            EnrichmentTier::Rules => "rules",
            EnrichmentTier::Skipped => "skipped",
        }
    }
}

impl fmt::Display for EnrichmentTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpellEffect {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default, deserialize_with = "lenient_int")]
    pub value: i32,
    #[serde(rename = "targetType", alias = "target_type", default)]
    pub target_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "requiresTarget", alias = "requires_target", default)]
    pub requires_target: bool,
}

impl SpellEffect {
    pub fn damage(value: i32) -> Self {
        SpellEffect {
            kind: "DAMAGE".into(),
            value,
            target_type: "creature_or_player".into(),
            description: format!("Deal {} damage to target creature or player", value),
            requires_target: true,
        }
    }

    pub fn draw(value: i32) -> Self {
        SpellEffect {
            kind: "DRAW".into(),
            value,
            target_type: String::new(),
            description: if value == 1 {
                "Draw a card".into()
            } else {
                format!("Draw {} cards", value)
            },
            requires_target: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivatedAbility {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub cost: String,
    #[serde(default)]
    pub effect: SpellEffect,
    #[serde(default)]
    pub description: String,
}

/// Generated gameplay metadata attached to a card. Every field is always
/// present; an empty set is still a valid set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EffectSet {
    pub spell_effects: Vec<SpellEffect>,
    pub keywords: Vec<String>,
    pub activated_abilities: Vec<ActivatedAbility>,
    pub description: String,
    pub strategic_value: String,
    pub combo_potential: String,
    pub tier: EnrichmentTier,
}

impl EffectSet {
    /// Placeholder used when enrichment is turned off for a run.
    pub fn skipped() -> Self {
        EffectSet {
            description: "AI generation skipped".into(),
            strategic_value: "Unknown".into(),
            combo_potential: "Unknown".into(),
            tier: EnrichmentTier::Skipped,
            ..Default::default()
        }
    }
}

/// Generators emit `"value": "2"` or `"value": null` often enough that a strict
/// integer field would throw away otherwise usable output.
fn lenient_int<'de, D>(deserializer: D) -> Result<i32, D::Error>
where
    D: Deserializer<'de>,
{
    let v = serde_json::Value::deserialize(deserializer)?;
    Ok(match v {
        // Out-of-range numbers saturate rather than wrap.
        serde_json::Value::Number(n) => n
            .as_i64()
            .map(|i| i.clamp(i32::MIN as i64, i32::MAX as i64) as i32)
            .or_else(|| n.as_f64().map(|f| f as i32))
            .unwrap_or(0),
        serde_json::Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map(|i| i.clamp(i32::MIN as i64, i32::MAX as i64) as i32)
            .unwrap_or(0),
        _ => 0,
    })
}

fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let v = serde_json::Value::deserialize(deserializer)?;
    Ok(match v {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    })
}

// ── Import progress ──

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportStatus {
    #[default]
    Idle,
    Running,
    Completed,
    Failed,
}

impl ImportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportStatus::Idle => "idle",
            ImportStatus::Running => "running",
            ImportStatus::Completed => "completed",
            ImportStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "running" => ImportStatus::Running,
            "completed" => ImportStatus::Completed,
            "failed" => ImportStatus::Failed,
            _ => ImportStatus::Idle,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ImportStatus::Completed | ImportStatus::Failed)
    }
}

impl fmt::Display for ImportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Run status shared with external observers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportProgress {
    pub total: u64,
    pub processed: u64,
    pub failed: u64,
    pub last_processed_card: Option<String>,
    pub status: ImportStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

use serde::Deserialize;
use serde_json::Value;

use crate::model::{ActivatedAbility, EffectSet, EnrichmentTier, SpellEffect};

const KNOWN_KEYS: &[&str] = &[
    "spell_effects",
    "keywords",
    "activated_abilities",
    "ai_effect_description",
    "ai_strategic_value",
    "ai_combo_potential",
];

/// (tag, phrases that count as a mention), in scan order.
const KEYWORD_VOCAB: &[(&str, &[&str])] = &[
    ("FLYING", &["flying"]),
    ("FIRST_STRIKE", &["first strike", "first_strike"]),
    ("DOUBLE_STRIKE", &["double strike", "double_strike"]),
    ("TRAMPLE", &["trample"]),
    ("VIGILANCE", &["vigilance"]),
    ("HASTE", &["haste"]),
    ("LIFELINK", &["lifelink"]),
    ("DEATHTOUCH", &["deathtouch"]),
    ("REACH", &["reach"]),
    ("HEXPROOF", &["hexproof"]),
    ("INDESTRUCTIBLE", &["indestructible"]),
    ("MENACE", &["menace"]),
    ("PROWESS", &["prowess"]),
    ("FLASH", &["flash"]),
];

const MAX_TEXT_KEYWORDS: usize = 3;
const DAMAGE_TRIGGERS: &[&str] = &["damage", "deal", "burn"];
const DRAW_TRIGGERS: &[&str] = &["draw", "card"];

/// What a generation response turned out to be.
#[derive(Debug, Clone, PartialEq)]
pub enum Interpretation {
    /// A JSON object in the requested shape.
    Structured(EffectSet),
    /// No usable JSON, but the prose mentioned effects or keywords.
    TextAnalysis(EffectSet),
    /// Nothing we can use.
    Unusable,
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct GeneratedEffects {
    spell_effects: Vec<SpellEffect>,
    keywords: Vec<Value>,
    activated_abilities: Vec<ActivatedAbility>,
    ai_effect_description: Option<String>,
    ai_strategic_value: Option<String>,
    ai_combo_potential: Option<String>,
}

/// Strict decode first, tolerant text scan second.
pub fn interpret_response(text: &str) -> Interpretation {
    if let Some(effects) = parse_structured(text) {
        return Interpretation::Structured(effects);
    }
    match analyze_text(text) {
        Some(effects) => Interpretation::TextAnalysis(effects),
        None => Interpretation::Unusable,
    }
}

fn parse_structured(text: &str) -> Option<EffectSet> {
    let raw = extract_json_object(text)?;
    let value: Value = serde_json::from_str(raw).ok()?;
    let obj = value.as_object()?;
    if !KNOWN_KEYS.iter().any(|k| obj.contains_key(*k)) {
        return None;
    }
    let generated: GeneratedEffects = serde_json::from_value(value).ok()?;

    Some(EffectSet {
        spell_effects: generated.spell_effects,
        keywords: generated
            .keywords
            .iter()
            .filter_map(Value::as_str)
            .map(normalize_keyword)
            .filter(|k| !k.is_empty())
            .collect(),
        activated_abilities: generated.activated_abilities,
        description: generated.ai_effect_description.unwrap_or_default(),
        strategic_value: generated.ai_strategic_value.unwrap_or_default(),
        combo_potential: generated.ai_combo_potential.unwrap_or_default(),
        tier: EnrichmentTier::Generated,
    })
}

/// First balanced `{...}` in `text`, ignoring braces inside string literals.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + i + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

fn analyze_text(text: &str) -> Option<EffectSet> {
    let lower = text.to_lowercase();
    if lower.trim().is_empty() {
        return None;
    }

    let mut spell_effects = Vec::new();
    if DAMAGE_TRIGGERS.iter().any(|w| lower.contains(w)) {
        spell_effects.push(SpellEffect::damage(2));
    }
    if DRAW_TRIGGERS.iter().any(|w| lower.contains(w)) {
        spell_effects.push(SpellEffect::draw(1));
    }

    // Vocabulary order, not reply order; the first three hits win.
    let keywords: Vec<String> = KEYWORD_VOCAB
        .iter()
        .filter(|(_, phrases)| phrases.iter().any(|p| lower.contains(p)))
        .take(MAX_TEXT_KEYWORDS)
        .map(|(tag, _)| tag.to_string())
        .collect();

    if spell_effects.is_empty() && keywords.is_empty() {
        return None;
    }

    Some(EffectSet {
        spell_effects,
        keywords,
        activated_abilities: Vec::new(),
        description: "AI-generated effects based on card analysis".into(),
        strategic_value: "Provides utility and board presence".into(),
        combo_potential: "Synergizes with similar card types".into(),
        tier: EnrichmentTier::TextAnalysis,
    })
}

fn normalize_keyword(k: &str) -> String {
    k.trim().to_uppercase().replace([' ', '-'], "_")
}

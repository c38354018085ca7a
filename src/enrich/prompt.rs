use crate::model::CardRecord;

pub const SYSTEM_PROMPT: &str = "You are an expert Magic: The Gathering card designer. \
Generate balanced, thematic effects for cards based on their existing properties. \
Return valid JSON only.";

/// User prompt describing `card` and the JSON shape we expect back.
pub fn build_prompt(card: &CardRecord) -> String {
    let colors = if card.colors.is_empty() {
        "Colorless".to_string()
    } else {
        card.colors.join(", ")
    };

    format!(
        r#"Create balanced MTG effects for this card:

**Card Details:**
- Name: {name}
- Mana Cost: {cost}
- CMC: {cmc}
- Type: {type_line}
- Power/Toughness: {power}/{toughness}
- Colors: {colors}
- Rarity: {rarity}
- Original Text: {text}

**Guidelines:**
- Effects should be balanced for the mana cost
- Consider the card's colors and rarity
- Create 1-3 spell effects that fit the theme
- Add appropriate keywords if it's a creature
- Include activated abilities if suitable
- Provide strategic analysis

**Required JSON Format:**
{{
    "spell_effects": [
        {{
            "type": "DAMAGE|DRAW|LIFE_GAIN|DESTROY|etc",
            "value": number,
            "targetType": "creature|player|creature_or_player|etc",
            "description": "Clear effect description",
            "requiresTarget": boolean
        }}
    ],
    "keywords": ["FLYING", "HASTE", etc],
    "activated_abilities": [
        {{
            "id": "unique_id",
            "cost": "mana_cost_or_T",
            "effect": {{effect_object}},
            "description": "Full ability text"
        }}
    ],
    "ai_effect_description": "How these effects work together",
    "ai_strategic_value": "Strategic value and deck synergies",
    "ai_combo_potential": "Potential combos and interactions"
}}

Generate creative but balanced effects:
"#,
        name = card.name,
        cost = card.mana_cost,
        cmc = card.cmc,
        type_line = card.type_line,
        power = card.power.as_deref().unwrap_or(""),
        toughness = card.toughness.as_deref().unwrap_or(""),
        colors = colors,
        rarity = card.rarity,
        text = card.oracle_text,
    )
}

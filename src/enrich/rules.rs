use crate::model::{CardRecord, EffectSet, EnrichmentTier, SpellEffect};

/// Color → keyword for creatures, checked independently per color.
const CREATURE_KEYWORDS: &[(&str, &str, &str)] = &[
    ("R", "red", "HASTE"),
    ("W", "white", "VIGILANCE"),
    ("U", "blue", "FLYING"),
    ("B", "black", "DEATHTOUCH"),
    ("G", "green", "TRAMPLE"),
];

const MAX_RULE_DAMAGE: f64 = 4.0;

/// Effects derived only from the card's own attributes. Deterministic.
pub fn fallback_effects(card: &CardRecord) -> EffectSet {
    let mut keywords = Vec::new();
    if card.is_creature() {
        for (code, name, keyword) in CREATURE_KEYWORDS {
            if card.has_color(code, name) {
                keywords.push(keyword.to_string());
            }
        }
    }

    let mut spell_effects = Vec::new();
    if card.is_instant_or_sorcery() && card.has_color("R", "red") {
        let value = card.cmc.clamp(0.0, MAX_RULE_DAMAGE) as i32;
        spell_effects.push(SpellEffect::damage(value));
    }

    EffectSet {
        spell_effects,
        keywords,
        activated_abilities: Vec::new(),
        description: "Fallback effects based on card colors and type".into(),
        strategic_value: "Standard utility for its type and cost".into(),
        combo_potential: "Basic synergies with cards of similar type".into(),
        tier: EnrichmentTier::Rules,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card(type_line: &str, colors: &[&str], cmc: f64) -> CardRecord {
        CardRecord {
            type_line: type_line.into(),
            colors: colors.iter().map(|c| c.to_string()).collect(),
            cmc,
            ..Default::default()
        }
    }

    #[test]
    fn red_instant_deals_cmc_damage() {
        let e = fallback_effects(&card("Instant", &["R"], 1.0));
        assert_eq!(e.tier, EnrichmentTier::Rules);
        assert_eq!(e.spell_effects.len(), 1);
        let dmg = &e.spell_effects[0];
        assert_eq!(dmg.kind, "DAMAGE");
        assert_eq!(dmg.value, 1);
        assert_eq!(dmg.target_type, "creature_or_player");
        assert!(dmg.requires_target);
        assert!(e.keywords.is_empty());
    }

    #[test]
    fn damage_capped_at_four() {
        let e = fallback_effects(&card("Sorcery", &["red"], 7.0));
        assert_eq!(e.spell_effects[0].value, 4);
    }

    #[test]
    fn multicolor_creature_gets_one_keyword_per_color() {
        let e = fallback_effects(&card("Legendary Creature — Dragon", &["R", "G", "U"], 5.0));
        assert_eq!(e.keywords, vec!["HASTE", "FLYING", "TRAMPLE"]);
        assert!(e.spell_effects.is_empty());
    }

    #[test]
    fn non_red_spell_and_land_get_nothing() {
        assert!(fallback_effects(&card("Instant", &["U"], 2.0)).spell_effects.is_empty());
        let land = fallback_effects(&card("Land", &[], 0.0));
        assert!(land.spell_effects.is_empty());
        assert!(land.keywords.is_empty());
        assert!(!land.description.is_empty());
    }
}

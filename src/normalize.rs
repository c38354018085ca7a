use std::collections::BTreeMap;

use rayon::prelude::*;
use serde_json::Value;
use tracing::warn;

use crate::error::NormalizeError;
use crate::model::{CardRecord, EffectSet};

/// Records of one page after normalization, in source order.
pub struct NormalizedPage {
    pub cards: Vec<CardRecord>,
    pub malformed: usize,
}

/// Normalize a page of raw records, dropping the ones without an id.
pub fn normalize_page(raw: &[Value]) -> NormalizedPage {
    let results: Vec<_> = raw.par_iter().map(normalize).collect();

    let mut cards = Vec::with_capacity(results.len());
    let mut malformed = 0;
    for (record, result) in raw.iter().zip(results) {
        match result {
            Ok(card) => cards.push(card),
            Err(e) => {
                malformed += 1;
                warn!(
                    "Skipping record {}: {}",
                    str_field(record, "name").unwrap_or("<unnamed>"),
                    e
                );
            }
        }
    }
    NormalizedPage { cards, malformed }
}

/// Map one search API record into the internal schema.
///
/// Double-faced cards take their printed fields from the front face; identity,
/// colors, keywords, rarity and set data always come from the top level.
pub fn normalize(raw: &Value) -> Result<CardRecord, NormalizeError> {
    let scryfall_id = str_field(raw, "id")
        .filter(|id| !id.trim().is_empty())
        .ok_or(NormalizeError::MissingId)?
        .to_string();

    let front = raw
        .get("card_faces")
        .and_then(Value::as_array)
        .and_then(|faces| faces.first());

    // Printed fields: the front face when there is one, else the card itself.
    let printed = front.unwrap_or(raw);
    let name = str_field(printed, "name")
        .or_else(|| str_field(raw, "name"))
        .unwrap_or_default()
        .to_string();
    let type_line = str_field(printed, "type_line")
        .or_else(|| str_field(raw, "type_line"))
        .unwrap_or_default()
        .to_string();

    Ok(CardRecord {
        scryfall_id,
        name,
        mana_cost: owned(printed, "mana_cost"),
        cmc: raw.get("cmc").and_then(Value::as_f64).unwrap_or(0.0),
        type_line,
        oracle_text: owned(printed, "oracle_text"),
        power: str_field(printed, "power").map(String::from),
        toughness: str_field(printed, "toughness").map(String::from),
        colors: string_list(raw, "colors"),
        keywords: string_list(raw, "keywords"),
        rarity: owned(raw, "rarity"),
        set_code: owned(raw, "set"),
        set_name: owned(raw, "set_name"),
        collector_number: owned(raw, "collector_number"),
        image_url: image_url(raw, front),
        prices: raw
            .get("prices")
            .and_then(Value::as_object)
            .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default(),
        legalities: raw
            .get("legalities")
            .and_then(Value::as_object)
            .map(|m| {
                m.iter()
                    .filter_map(|(k, v)| Some((k.clone(), v.as_str()?.to_string())))
                    .collect::<BTreeMap<_, _>>()
            })
            .unwrap_or_default(),
        flavor_text: str_field(raw, "flavor_text")
            .or_else(|| front.and_then(|f| str_field(f, "flavor_text")))
            .map(String::from),
        artist: str_field(raw, "artist")
            .or_else(|| front.and_then(|f| str_field(f, "artist")))
            .map(String::from),
        effects: EffectSet::default(),
    })
}

/// normal → small on the card, then normal → small on the front face.
fn image_url(raw: &Value, front: Option<&Value>) -> Option<String> {
    let pick = |v: &Value| -> Option<String> {
        let uris = v.get("image_uris")?;
        str_field(uris, "normal")
            .or_else(|| str_field(uris, "small"))
            .map(String::from)
    };
    pick(raw).or_else(|| front.and_then(pick))
}

fn str_field<'a>(v: &'a Value, key: &str) -> Option<&'a str> {
    v.get(key).and_then(Value::as_str)
}

fn owned(v: &Value, key: &str) -> String {
    str_field(v, key).unwrap_or_default().to_string()
}

fn string_list(v: &Value, key: &str) -> Vec<String> {
    v.get(key)
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(|x| x.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default()
}

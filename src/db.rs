use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};

use crate::model::{CardRecord, EffectSet, ImportProgress, ImportStatus};

/// Storage contract the pipeline relies on. Inserts must be idempotent.
pub trait Persister: Send + Sync {
    fn exists(&self, scryfall_id: &str) -> Result<bool>;

    /// Insert `card` if absent. `Ok(false)` means it was already stored.
    fn upsert(&self, card: &CardRecord) -> Result<bool>;

    /// Audit trail for one enrichment. Stores without a log ignore it.
    fn record_generation(
        &self,
        _card: &CardRecord,
        _raw_response: Option<&str>,
        _elapsed_ms: i64,
    ) -> Result<()> {
        Ok(())
    }
}

/// SQLite-backed card store. One connection, serialized behind a mutex.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {:?}", dir))?;
        }
        let conn = Connection::open(path).with_context(|| format!("Failed to open {:?}", path))?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        let store = Store { conn: Mutex::new(conn) };
        store.init_schema()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let store = Store { conn: Mutex::new(Connection::open_in_memory()?) };
        store.init_schema()?;
        Ok(store)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| anyhow!("card store mutex poisoned"))
    }

    fn init_schema(&self) -> Result<()> {
        self.conn()?.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS cards (
                scryfall_id      TEXT PRIMARY KEY,
                name             TEXT NOT NULL,
                mana_cost        TEXT NOT NULL,
                cmc              REAL NOT NULL,
                type_line        TEXT NOT NULL,
                oracle_text      TEXT NOT NULL,
                power            TEXT,
                toughness        TEXT,
                colors           TEXT NOT NULL,
                keywords         TEXT NOT NULL,
                rarity           TEXT NOT NULL,
                set_code         TEXT NOT NULL,
                set_name         TEXT NOT NULL,
                collector_number TEXT NOT NULL,
                image_url        TEXT,
                prices           TEXT NOT NULL,
                legalities       TEXT NOT NULL,
                flavor_text      TEXT,
                artist           TEXT,
                ai_generated_effects   TEXT NOT NULL,
                ai_generated_abilities TEXT NOT NULL,
                ai_generated_keywords  TEXT NOT NULL,
                ai_effect_description  TEXT NOT NULL,
                ai_strategic_value     TEXT NOT NULL,
                ai_combo_potential     TEXT NOT NULL,
                enrichment_tier        TEXT NOT NULL,
                created_at       TEXT NOT NULL DEFAULT (datetime('now'))
            );
            CREATE INDEX IF NOT EXISTS idx_cards_name ON cards(name);
            CREATE INDEX IF NOT EXISTS idx_cards_set ON cards(set_code);

            CREATE TABLE IF NOT EXISTS import_progress (
                id                  INTEGER PRIMARY KEY CHECK (id = 1),
                total_cards         INTEGER NOT NULL DEFAULT 0,
                processed_cards     INTEGER NOT NULL DEFAULT 0,
                failed_cards        INTEGER NOT NULL DEFAULT 0,
                last_processed_card TEXT,
                status              TEXT NOT NULL DEFAULT 'idle'
                    CHECK (status IN ('idle','running','completed','failed')),
                started_at          TEXT,
                completed_at        TEXT,
                error_message       TEXT
            );
            INSERT OR IGNORE INTO import_progress (id) VALUES (1);

            CREATE TABLE IF NOT EXISTS generation_logs (
                id              INTEGER PRIMARY KEY,
                card_id         TEXT NOT NULL,
                card_name       TEXT NOT NULL,
                generation_type TEXT NOT NULL,
                ai_response     TEXT,
                elapsed_ms      INTEGER NOT NULL,
                created_at      TEXT NOT NULL DEFAULT (datetime('now'))
            );
            CREATE INDEX IF NOT EXISTS idx_generation_logs_card ON generation_logs(card_id);
            ",
        )?;
        Ok(())
    }

    // ── Cards ──

    pub fn card_count(&self) -> Result<usize> {
        Ok(self
            .conn()?
            .query_row("SELECT COUNT(*) FROM cards", [], |r| r.get(0))?)
    }

    pub fn fetch_card(&self, scryfall_id: &str) -> Result<Option<CardRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT scryfall_id, name, mana_cost, cmc, type_line, oracle_text, power, toughness,
                    colors, keywords, rarity, set_code, set_name, collector_number, image_url,
                    prices, legalities, flavor_text, artist,
                    ai_generated_effects, ai_generated_abilities, ai_generated_keywords,
                    ai_effect_description, ai_strategic_value, ai_combo_potential, enrichment_tier
             FROM cards WHERE scryfall_id = ?1",
        )?;
        let row = stmt
            .query_row([scryfall_id], |r| {
                Ok((
                    CardRecord {
                        scryfall_id: r.get(0)?,
                        name: r.get(1)?,
                        mana_cost: r.get(2)?,
                        cmc: r.get(3)?,
                        type_line: r.get(4)?,
                        oracle_text: r.get(5)?,
                        power: r.get(6)?,
                        toughness: r.get(7)?,
                        rarity: r.get(10)?,
                        set_code: r.get(11)?,
                        set_name: r.get(12)?,
                        collector_number: r.get(13)?,
                        image_url: r.get(14)?,
                        flavor_text: r.get(17)?,
                        artist: r.get(18)?,
                        ..Default::default()
                    },
                    [
                        r.get::<_, String>(8)?,
                        r.get(9)?,
                        r.get(15)?,
                        r.get(16)?,
                        r.get(19)?,
                        r.get(20)?,
                        r.get(21)?,
                    ],
                    [r.get::<_, String>(22)?, r.get(23)?, r.get(24)?, r.get(25)?],
                ))
            })
            .optional()?;

        let Some((mut card, json, text)) = row else {
            return Ok(None);
        };
        card.colors = serde_json::from_str(&json[0])?;
        card.keywords = serde_json::from_str(&json[1])?;
        card.prices = serde_json::from_str(&json[2])?;
        card.legalities = serde_json::from_str(&json[3])?;
        let [description, strategic_value, combo_potential, tier] = text;
        card.effects = EffectSet {
            spell_effects: serde_json::from_str(&json[4])?,
            activated_abilities: serde_json::from_str(&json[5])?,
            keywords: serde_json::from_str(&json[6])?,
            description,
            strategic_value,
            combo_potential,
            tier: serde_json::from_value(serde_json::Value::String(tier))?,
        };
        Ok(Some(card))
    }

    // ── Progress ──

    pub fn save_progress(&self, p: &ImportProgress) -> Result<()> {
        self.conn()?.execute(
            "UPDATE import_progress SET
                total_cards = ?1, processed_cards = ?2, failed_cards = ?3,
                last_processed_card = ?4, status = ?5, started_at = ?6,
                completed_at = ?7, error_message = ?8
             WHERE id = 1",
            rusqlite::params![
                p.total as i64,
                p.processed as i64,
                p.failed as i64,
                p.last_processed_card,
                p.status.as_str(),
                p.started_at.map(|t| t.to_rfc3339()),
                p.completed_at.map(|t| t.to_rfc3339()),
                p.error_message,
            ],
        )?;
        Ok(())
    }

    pub fn load_progress(&self) -> Result<ImportProgress> {
        let conn = self.conn()?;
        let p = conn.query_row(
            "SELECT total_cards, processed_cards, failed_cards, last_processed_card, status,
                    started_at, completed_at, error_message
             FROM import_progress WHERE id = 1",
            [],
            |r| {
                Ok(ImportProgress {
                    total: r.get::<_, i64>(0)? as u64,
                    processed: r.get::<_, i64>(1)? as u64,
                    failed: r.get::<_, i64>(2)? as u64,
                    last_processed_card: r.get(3)?,
                    status: ImportStatus::parse(&r.get::<_, String>(4)?),
                    started_at: parse_time(r.get(5)?),
                    completed_at: parse_time(r.get(6)?),
                    error_message: r.get(7)?,
                })
            },
        )?;
        Ok(p)
    }

    // ── Generation log ──

    pub fn log_generation(
        &self,
        card: &CardRecord,
        raw_response: Option<&str>,
        elapsed_ms: i64,
    ) -> Result<()> {
        self.conn()?.execute(
            "INSERT INTO generation_logs (card_id, card_name, generation_type, ai_response, elapsed_ms)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                card.scryfall_id,
                card.name,
                card.effects.tier.as_str(),
                raw_response,
                elapsed_ms
            ],
        )?;
        Ok(())
    }

    // ── Stats ──

    pub fn stats(&self) -> Result<Stats> {
        let conn = self.conn()?;
        let total: usize = conn.query_row("SELECT COUNT(*) FROM cards", [], |r| r.get(0))?;
        let with_effects: usize = conn.query_row(
            "SELECT COUNT(*) FROM cards WHERE ai_generated_effects != '[]'",
            [],
            |r| r.get(0),
        )?;
        let by_rarity = group_counts(&conn, "rarity")?;
        let by_tier = group_counts(&conn, "enrichment_tier")?;
        Ok(Stats {
            total,
            with_effects,
            by_rarity,
            by_tier,
        })
    }
}

impl Persister for Store {
    fn exists(&self, scryfall_id: &str) -> Result<bool> {
        let n: i64 = self.conn()?.query_row(
            "SELECT COUNT(*) FROM cards WHERE scryfall_id = ?1",
            [scryfall_id],
            |r| r.get(0),
        )?;
        Ok(n > 0)
    }

    fn upsert(&self, c: &CardRecord) -> Result<bool> {
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;
        let inserted = tx.execute(
            "INSERT OR IGNORE INTO cards
             (scryfall_id, name, mana_cost, cmc, type_line, oracle_text, power, toughness,
              colors, keywords, rarity, set_code, set_name, collector_number, image_url,
              prices, legalities, flavor_text, artist,
              ai_generated_effects, ai_generated_abilities, ai_generated_keywords,
              ai_effect_description, ai_strategic_value, ai_combo_potential, enrichment_tier)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19,
                     ?20,?21,?22,?23,?24,?25,?26)",
            rusqlite::params![
                c.scryfall_id,
                c.name,
                c.mana_cost,
                c.cmc,
                c.type_line,
                c.oracle_text,
                c.power,
                c.toughness,
                serde_json::to_string(&c.colors)?,
                serde_json::to_string(&c.keywords)?,
                c.rarity,
                c.set_code,
                c.set_name,
                c.collector_number,
                c.image_url,
                serde_json::to_string(&c.prices)?,
                serde_json::to_string(&c.legalities)?,
                c.flavor_text,
                c.artist,
                serde_json::to_string(&c.effects.spell_effects)?,
                serde_json::to_string(&c.effects.activated_abilities)?,
                serde_json::to_string(&c.effects.keywords)?,
                c.effects.description,
                c.effects.strategic_value,
                c.effects.combo_potential,
                c.effects.tier.as_str(),
            ],
        )?;
        tx.commit()?;
        Ok(inserted > 0)
    }

    fn record_generation(
        &self,
        card: &CardRecord,
        raw_response: Option<&str>,
        elapsed_ms: i64,
    ) -> Result<()> {
        self.log_generation(card, raw_response, elapsed_ms)
    }
}

fn parse_time(s: Option<String>) -> Option<DateTime<Utc>> {
    s.and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|t| t.with_timezone(&Utc))
}

fn group_counts(conn: &Connection, column: &str) -> Result<Vec<(String, usize)>> {
    let sql = format!(
        "SELECT COALESCE({col}, ''), COUNT(*) FROM cards GROUP BY {col} ORDER BY COUNT(*) DESC, 1",
        col = column
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Stats ──

pub struct Stats {
    pub total: usize,
    pub with_effects: usize,
    pub by_rarity: Vec<(String, usize)>,
    pub by_tier: Vec<(String, usize)>,
}

//! Wallet persistence over sqlite: the coin table, the transaction history,
//! the address book and the parameter blackboard.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context as _, Result};
use rusqlite::{Connection, OptionalExtension as _, params};

use crate::chain::{Amount, Height};
use crate::wallet::params::ParamId;
use crate::wallet::{
    Coin, CoinId, CoinStatus, FailureReason, KeyType, SubTxId, TxId, TxRecord, TxStatus, TxType,
    WalletId, now_millis,
};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("missing required parameter {0:?}")]
    MissingRequiredParameter(ParamId),
}

#[derive(Debug)]
pub struct WalletStore {
    conn: Connection,
    path: Option<PathBuf>,
}

impl WalletStore {
    pub fn open(path: PathBuf) -> Result<WalletStore> {
        if let Some(dir) = path.parent()
            && !dir.as_os_str().is_empty()
        {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("create wallet store dir {}", dir.display()))?;
        }

        let conn =
            Connection::open(&path).with_context(|| format!("open sqlite {}", path.display()))?;
        Self::configure(&conn)?;
        Ok(WalletStore { conn, path: Some(path) })
    }

    pub fn open_in_memory() -> Result<WalletStore> {
        let conn = Connection::open_in_memory().context("open in-memory sqlite")?;
        Self::configure(&conn)?;
        Ok(WalletStore { conn, path: None })
    }

    fn configure(conn: &Connection) -> Result<()> {
        conn.busy_timeout(Duration::from_secs(5))
            .context("set sqlite busy_timeout")?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;")
            .context("configure sqlite pragmas")?;
        migrate(conn).context("migrate sqlite schema")?;
        Ok(())
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    //
    // transaction history
    //

    pub fn insert_tx(&mut self, record: &TxRecord) -> Result<()> {
        self.conn
            .execute(
                r#"
INSERT INTO txs (
  tx_id, tx_type, status, amount, fee, change, min_height,
  my_id, peer_id, is_sender, is_initiator, create_time, modify_time, failure_reason
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
"#,
                params![
                    record.tx_id.to_hex(),
                    tx_type_to_str(record.tx_type),
                    status_to_str(record.status),
                    record.amount as i64,
                    record.fee as i64,
                    record.change as i64,
                    record.min_height as i64,
                    &record.my_id,
                    &record.peer_id,
                    record.is_sender,
                    record.is_initiator,
                    record.create_time as i64,
                    record.modify_time as i64,
                    record.failure_reason.map(reason_to_str),
                ],
            )
            .with_context(|| format!("insert tx {}", record.tx_id))?;
        Ok(())
    }

    pub fn get_tx(&self, tx_id: TxId) -> Result<Option<TxRecord>> {
        self.conn
            .query_row(
                r#"
SELECT tx_id, tx_type, status, amount, fee, change, min_height,
       my_id, peer_id, is_sender, is_initiator, create_time, modify_time, failure_reason
FROM txs WHERE tx_id = ?1
"#,
                params![tx_id.to_hex()],
                row_to_tx_record,
            )
            .optional()
            .with_context(|| format!("get tx {tx_id}"))
    }

    pub fn tx_history(&self) -> Result<Vec<TxRecord>> {
        let mut stmt = self
            .conn
            .prepare(
                r#"
SELECT tx_id, tx_type, status, amount, fee, change, min_height,
       my_id, peer_id, is_sender, is_initiator, create_time, modify_time, failure_reason
FROM txs ORDER BY rowid
"#,
            )
            .context("prepare tx history")?;

        let mut out = Vec::new();
        for row in stmt.query_map([], row_to_tx_record).context("query tx history")? {
            out.push(row.context("read tx row")?);
        }
        Ok(out)
    }

    pub fn update_tx_status(
        &mut self,
        tx_id: TxId,
        status: TxStatus,
        failure_reason: Option<FailureReason>,
    ) -> Result<()> {
        let rows = self
            .conn
            .execute(
                r#"
UPDATE txs SET status = ?2, failure_reason = COALESCE(?3, failure_reason), modify_time = ?4
WHERE tx_id = ?1
"#,
                params![
                    tx_id.to_hex(),
                    status_to_str(status),
                    failure_reason.map(reason_to_str),
                    now_millis() as i64,
                ],
            )
            .with_context(|| format!("update tx status {tx_id}"))?;
        anyhow::ensure!(rows == 1, "tx not found: {tx_id}");
        Ok(())
    }

    pub fn set_tx_change(&mut self, tx_id: TxId, change: Amount) -> Result<()> {
        let rows = self
            .conn
            .execute(
                "UPDATE txs SET change = ?2 WHERE tx_id = ?1",
                params![tx_id.to_hex(), change as i64],
            )
            .with_context(|| format!("set tx change {tx_id}"))?;
        anyhow::ensure!(rows == 1, "tx not found: {tx_id}");
        Ok(())
    }

    /// Removes a transaction; its parameters go with it via the cascade.
    pub fn delete_tx(&mut self, tx_id: TxId) -> Result<()> {
        self.conn
            .execute("DELETE FROM txs WHERE tx_id = ?1", params![tx_id.to_hex()])
            .with_context(|| format!("delete tx {tx_id}"))?;
        Ok(())
    }

    //
    // parameter blackboard
    //

    /// Durable once this returns. A parameter stored with `modifiable =
    /// false` rejects any overwrite; the call reports whether the write took
    /// effect.
    pub fn set_param(
        &mut self,
        tx_id: TxId,
        sub_tx_id: SubTxId,
        param_id: ParamId,
        value: &[u8],
        modifiable: bool,
    ) -> Result<bool> {
        let existing: Option<bool> = self
            .conn
            .query_row(
                "SELECT modifiable FROM params WHERE tx_id = ?1 AND sub_tx_id = ?2 AND param_id = ?3",
                params![tx_id.to_hex(), sub_tx_id as u32, param_id as u32],
                |row| row.get(0),
            )
            .optional()
            .with_context(|| format!("read param {param_id:?} of {tx_id}"))?;

        match existing {
            None => {
                self.conn
                    .execute(
                        r#"
INSERT INTO params (tx_id, sub_tx_id, param_id, value, modifiable)
VALUES (?1, ?2, ?3, ?4, ?5)
"#,
                        params![
                            tx_id.to_hex(),
                            sub_tx_id as u32,
                            param_id as u32,
                            value,
                            modifiable,
                        ],
                    )
                    .with_context(|| format!("insert param {param_id:?} of {tx_id}"))?;
                Ok(true)
            }
            Some(false) => Ok(false),
            Some(true) => {
                self.conn
                    .execute(
                        r#"
UPDATE params SET value = ?4, modifiable = ?5
WHERE tx_id = ?1 AND sub_tx_id = ?2 AND param_id = ?3
"#,
                        params![
                            tx_id.to_hex(),
                            sub_tx_id as u32,
                            param_id as u32,
                            value,
                            modifiable,
                        ],
                    )
                    .with_context(|| format!("update param {param_id:?} of {tx_id}"))?;
                Ok(true)
            }
        }
    }

    pub fn get_param(
        &self,
        tx_id: TxId,
        sub_tx_id: SubTxId,
        param_id: ParamId,
    ) -> Result<Option<Vec<u8>>> {
        self.conn
            .query_row(
                "SELECT value FROM params WHERE tx_id = ?1 AND sub_tx_id = ?2 AND param_id = ?3",
                params![tx_id.to_hex(), sub_tx_id as u32, param_id as u32],
                |row| row.get(0),
            )
            .optional()
            .with_context(|| format!("get param {param_id:?} of {tx_id}"))
    }

    pub fn get_mandatory_param(
        &self,
        tx_id: TxId,
        sub_tx_id: SubTxId,
        param_id: ParamId,
    ) -> Result<Vec<u8>> {
        self.get_param(tx_id, sub_tx_id, param_id)?
            .ok_or_else(|| StoreError::MissingRequiredParameter(param_id).into())
    }

    /// Full parameter snapshot of one transaction, for idempotency checks
    /// and diagnostics.
    pub fn dump_params(&self, tx_id: TxId) -> Result<Vec<(u32, u32, Vec<u8>)>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT sub_tx_id, param_id, value FROM params WHERE tx_id = ?1 ORDER BY sub_tx_id, param_id",
            )
            .context("prepare param dump")?;

        let mut out = Vec::new();
        let rows = stmt
            .query_map(params![tx_id.to_hex()], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })
            .context("query param dump")?;
        for row in rows {
            out.push(row.context("read param row")?);
        }
        Ok(out)
    }

    //
    // address book
    //

    pub fn save_address(&mut self, wallet_id: &WalletId, own: bool) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO addresses (wallet_id, own) VALUES (?1, ?2)",
                params![wallet_id, own],
            )
            .with_context(|| format!("save address {wallet_id}"))?;
        Ok(())
    }

    pub fn is_own_address(&self, wallet_id: &WalletId) -> Result<bool> {
        let own: Option<bool> = self
            .conn
            .query_row(
                "SELECT own FROM addresses WHERE wallet_id = ?1",
                params![wallet_id],
                |row| row.get(0),
            )
            .optional()
            .with_context(|| format!("look up address {wallet_id}"))?;
        Ok(own.unwrap_or(false))
    }

    //
    // coins
    //

    /// Reserves a coin derivation index without creating a row; used for
    /// outputs that only become wallet coins once their kernel confirms.
    pub fn allocate_coin_index(&mut self) -> Result<u64> {
        self.conn
            .execute(
                "UPDATE vars SET value = value + 1 WHERE name = 'next_coin_idx'",
                [],
            )
            .context("bump coin index")?;
        let idx: i64 = self
            .conn
            .query_row(
                "SELECT value FROM vars WHERE name = 'next_coin_idx'",
                [],
                |row| row.get(0),
            )
            .context("read coin index")?;
        Ok(idx as u64)
    }

    pub fn store_coin(
        &mut self,
        value: Amount,
        key_type: KeyType,
        status: CoinStatus,
        create_tx_id: Option<TxId>,
    ) -> Result<CoinId> {
        let idx = self.allocate_coin_index()?;
        let id = CoinId { idx, value, key_type };
        self.insert_coin(&Coin {
            id,
            status,
            create_tx_id,
            spent_tx_id: None,
            maturity: None,
        })?;
        Ok(id)
    }

    pub fn insert_coin(&mut self, coin: &Coin) -> Result<()> {
        self.conn
            .execute(
                r#"
INSERT INTO coins (idx, value, key_type, status, create_tx_id, spent_tx_id, maturity)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
"#,
                params![
                    coin.id.idx as i64,
                    coin.id.value as i64,
                    key_type_to_str(coin.id.key_type),
                    coin_status_to_str(coin.status),
                    coin.create_tx_id.map(|id| id.to_hex()),
                    coin.spent_tx_id.map(|id| id.to_hex()),
                    coin.maturity.map(|h| h as i64),
                ],
            )
            .with_context(|| format!("insert coin {}", coin.id.idx))?;
        Ok(())
    }

    pub fn save_coin(&mut self, coin: &Coin) -> Result<()> {
        let rows = self
            .conn
            .execute(
                r#"
UPDATE coins SET status = ?2, create_tx_id = ?3, spent_tx_id = ?4, maturity = ?5
WHERE idx = ?1
"#,
                params![
                    coin.id.idx as i64,
                    coin_status_to_str(coin.status),
                    coin.create_tx_id.map(|id| id.to_hex()),
                    coin.spent_tx_id.map(|id| id.to_hex()),
                    coin.maturity.map(|h| h as i64),
                ],
            )
            .with_context(|| format!("save coin {}", coin.id.idx))?;
        anyhow::ensure!(rows == 1, "coin not found: {}", coin.id.idx);
        Ok(())
    }

    pub fn coin(&self, idx: u64) -> Result<Option<Coin>> {
        Ok(self
            .query_coins(
                "SELECT idx, value, key_type, status, create_tx_id, spent_tx_id, maturity FROM coins WHERE idx = ?1",
                &[&(idx as i64)],
            )?
            .into_iter()
            .next())
    }

    pub fn coins(&self) -> Result<Vec<Coin>> {
        self.query_coins("SELECT idx, value, key_type, status, create_tx_id, spent_tx_id, maturity FROM coins ORDER BY idx", &[])
    }

    pub fn coins_by_tx(&self, tx_id: TxId) -> Result<Vec<Coin>> {
        let hex = tx_id.to_hex();
        self.query_coins(
            r#"
SELECT idx, value, key_type, status, create_tx_id, spent_tx_id, maturity FROM coins
WHERE create_tx_id = ?1 OR spent_tx_id = ?1 ORDER BY idx
"#,
            &[&hex],
        )
    }

    pub fn coins_by_id(&self, ids: &[CoinId]) -> Result<Vec<Coin>> {
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            let coin = self
                .query_coins(
                    "SELECT idx, value, key_type, status, create_tx_id, spent_tx_id, maturity FROM coins WHERE idx = ?1",
                    &[&(id.idx as i64)],
                )?
                .into_iter()
                .next()
                .ok_or_else(|| anyhow::anyhow!("coin not found: {}", id.idx))?;
            out.push(coin);
        }
        Ok(out)
    }

    fn query_coins(&self, sql: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Vec<Coin>> {
        let mut stmt = self.conn.prepare(sql).context("prepare coin query")?;
        let mut out = Vec::new();
        for row in stmt.query_map(args, row_to_coin).context("query coins")? {
            out.push(row.context("read coin row")?);
        }
        Ok(out)
    }

    pub fn available_total(&self) -> Result<Amount> {
        let total: i64 = self
            .conn
            .query_row(
                "SELECT COALESCE(SUM(value), 0) FROM coins WHERE status = 'available'",
                [],
                |row| row.get(0),
            )
            .context("sum available coins")?;
        Ok(total as u64)
    }

    /// Fewest-coins-that-cover selection. An exact combination wins so no
    /// change has to be produced; otherwise the smallest single coin that
    /// covers, otherwise smallest-first accumulation. Ties break by creation
    /// order. Returns an empty list when the target cannot be covered.
    pub fn select_coins(&self, target: Amount) -> Result<Vec<Coin>> {
        let mut available: Vec<Coin> = self
            .coins()?
            .into_iter()
            .filter(|coin| coin.status == CoinStatus::Available)
            .collect();
        available.sort_by_key(|coin| (coin.id.value, coin.id.idx));

        if target == 0 {
            return Ok(Vec::new());
        }

        if let Some(picked) = exact_subset(&available, target) {
            return Ok(picked.into_iter().map(|i| available[i].clone()).collect());
        }

        if let Some(coin) = available.iter().find(|coin| coin.id.value >= target) {
            return Ok(vec![coin.clone()]);
        }

        let mut sum = 0u64;
        let mut picked = Vec::new();
        for coin in &available {
            sum += coin.id.value;
            picked.push(coin.clone());
            if sum >= target {
                return Ok(picked);
            }
        }
        Ok(Vec::new())
    }

    //
    // status transitions
    //

    /// Failure rollback: reserved inputs go back to available, unconfirmed
    /// outputs disappear.
    pub fn rollback_tx(&mut self, tx_id: TxId) -> Result<()> {
        let hex = tx_id.to_hex();
        self.conn
            .execute(
                "UPDATE coins SET status = 'available', spent_tx_id = NULL WHERE spent_tx_id = ?1 AND status = 'outgoing'",
                params![hex],
            )
            .with_context(|| format!("release inputs of {tx_id}"))?;
        self.conn
            .execute(
                "DELETE FROM coins WHERE create_tx_id = ?1 AND status = 'maturing'",
                params![hex],
            )
            .with_context(|| format!("drop unconfirmed outputs of {tx_id}"))?;
        Ok(())
    }

    /// Kernel confirmed at `height`: inputs become spent, created outputs
    /// become available.
    pub fn complete_tx_coins(&mut self, tx_id: TxId, height: Height) -> Result<()> {
        let hex = tx_id.to_hex();
        self.conn
            .execute(
                "UPDATE coins SET status = 'spent' WHERE spent_tx_id = ?1 AND status = 'outgoing'",
                params![hex],
            )
            .with_context(|| format!("mark inputs of {tx_id} spent"))?;
        self.conn
            .execute(
                "UPDATE coins SET status = 'available', maturity = ?2 WHERE create_tx_id = ?1 AND status = 'maturing'",
                params![hex, height as i64],
            )
            .with_context(|| format!("mature outputs of {tx_id}"))?;
        Ok(())
    }
}

/// Exact subset-sum search, breadth-first over combination size so the
/// fewest-coins answer is found first. Index chains are strictly increasing,
/// which both avoids coin reuse and makes ties resolve in creation order.
fn exact_subset(coins: &[Coin], target: Amount) -> Option<Vec<usize>> {
    const MAX_COINS: usize = 64;
    const MAX_STATES: usize = 1 << 12;
    const MAX_DEPTH: usize = 8;

    let n = coins.len().min(MAX_COINS);
    let mut parents: HashMap<Amount, (usize, Amount)> = HashMap::new();
    let mut frontier: Vec<Amount> = vec![0];

    for _ in 0..MAX_DEPTH {
        let mut next = Vec::new();
        for &sum in &frontier {
            let first = match parents.get(&sum) {
                Some(&(coin, _)) => coin + 1,
                None => 0,
            };
            for (j, coin) in coins.iter().enumerate().take(n).skip(first) {
                let new_sum = match sum.checked_add(coin.id.value) {
                    Some(s) if s <= target => s,
                    _ => continue,
                };
                if parents.contains_key(&new_sum) {
                    continue;
                }
                parents.insert(new_sum, (j, sum));
                if new_sum == target {
                    let mut picked = Vec::new();
                    let mut cursor = target;
                    while cursor != 0 {
                        let (coin, prev) = parents[&cursor];
                        picked.push(coin);
                        cursor = prev;
                    }
                    picked.reverse();
                    return Some(picked);
                }
                if parents.len() >= MAX_STATES {
                    return None;
                }
                next.push(new_sum);
            }
        }
        if next.is_empty() {
            return None;
        }
        frontier = next;
    }
    None
}

fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
CREATE TABLE IF NOT EXISTS txs (
  tx_id TEXT PRIMARY KEY,
  tx_type TEXT NOT NULL,
  status TEXT NOT NULL,
  amount INTEGER NOT NULL,
  fee INTEGER NOT NULL,
  change INTEGER NOT NULL DEFAULT 0,
  min_height INTEGER NOT NULL,
  my_id TEXT NOT NULL,
  peer_id TEXT NOT NULL,
  is_sender INTEGER NOT NULL,
  is_initiator INTEGER NOT NULL,
  create_time INTEGER NOT NULL,
  modify_time INTEGER NOT NULL,
  failure_reason TEXT
);

CREATE TABLE IF NOT EXISTS params (
  tx_id TEXT NOT NULL REFERENCES txs(tx_id) ON DELETE CASCADE,
  sub_tx_id INTEGER NOT NULL,
  param_id INTEGER NOT NULL,
  value BLOB NOT NULL,
  modifiable INTEGER NOT NULL,
  PRIMARY KEY (tx_id, sub_tx_id, param_id)
);

CREATE TABLE IF NOT EXISTS coins (
  idx INTEGER PRIMARY KEY,
  value INTEGER NOT NULL,
  key_type TEXT NOT NULL,
  status TEXT NOT NULL,
  create_tx_id TEXT,
  spent_tx_id TEXT,
  maturity INTEGER
);
CREATE INDEX IF NOT EXISTS coins_status_idx ON coins(status);
CREATE INDEX IF NOT EXISTS coins_spent_tx_idx ON coins(spent_tx_id);
CREATE INDEX IF NOT EXISTS coins_create_tx_idx ON coins(create_tx_id);

CREATE TABLE IF NOT EXISTS addresses (
  wallet_id TEXT PRIMARY KEY,
  own INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS vars (
  name TEXT PRIMARY KEY,
  value INTEGER NOT NULL
);
INSERT OR IGNORE INTO vars (name, value) VALUES ('next_coin_idx', 0);
"#,
    )
    .context("create tables")?;
    Ok(())
}

fn row_to_tx_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<TxRecord> {
    let tx_id: String = row.get(0)?;
    let tx_type: String = row.get(1)?;
    let status: String = row.get(2)?;
    let amount: i64 = row.get(3)?;
    let fee: i64 = row.get(4)?;
    let change: i64 = row.get(5)?;
    let min_height: i64 = row.get(6)?;
    let create_time: i64 = row.get(11)?;
    let modify_time: i64 = row.get(12)?;
    let failure_reason: Option<String> = row.get(13)?;

    Ok(TxRecord {
        tx_id: TxId::from_hex(&tx_id).map_err(|e| text_error(0, &e.to_string()))?,
        tx_type: tx_type_from_str(&tx_type).map_err(|e| text_error(1, &e))?,
        status: status_from_str(&status).map_err(|e| text_error(2, &e))?,
        amount: amount as u64,
        fee: fee as u64,
        change: change as u64,
        min_height: min_height as u64,
        my_id: row.get(7)?,
        peer_id: row.get(8)?,
        is_sender: row.get(9)?,
        is_initiator: row.get(10)?,
        create_time: create_time as u64,
        modify_time: modify_time as u64,
        failure_reason: failure_reason
            .map(|s| reason_from_str(&s).map_err(|e| text_error(13, &e)))
            .transpose()?,
    })
}

fn row_to_coin(row: &rusqlite::Row<'_>) -> rusqlite::Result<Coin> {
    let idx: i64 = row.get(0)?;
    let value: i64 = row.get(1)?;
    let key_type: String = row.get(2)?;
    let status: String = row.get(3)?;
    let create_tx_id: Option<String> = row.get(4)?;
    let spent_tx_id: Option<String> = row.get(5)?;
    let maturity: Option<i64> = row.get(6)?;

    Ok(Coin {
        id: CoinId {
            idx: idx as u64,
            value: value as u64,
            key_type: key_type_from_str(&key_type).map_err(|e| text_error(2, &e))?,
        },
        status: coin_status_from_str(&status).map_err(|e| text_error(3, &e))?,
        create_tx_id: create_tx_id
            .map(|s| TxId::from_hex(&s).map_err(|e| text_error(4, &e.to_string())))
            .transpose()?,
        spent_tx_id: spent_tx_id
            .map(|s| TxId::from_hex(&s).map_err(|e| text_error(5, &e.to_string())))
            .transpose()?,
        maturity: maturity.map(|h| h as u64),
    })
}

fn text_error(col: usize, message: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        col,
        rusqlite::types::Type::Text,
        message.to_string().into(),
    )
}

fn status_to_str(status: TxStatus) -> &'static str {
    match status {
        TxStatus::Pending => "pending",
        TxStatus::InProgress => "in_progress",
        TxStatus::Registering => "registering",
        TxStatus::Completed => "completed",
        TxStatus::Failed => "failed",
        TxStatus::Cancelled => "cancelled",
    }
}

fn status_from_str(s: &str) -> Result<TxStatus, String> {
    match s {
        "pending" => Ok(TxStatus::Pending),
        "in_progress" => Ok(TxStatus::InProgress),
        "registering" => Ok(TxStatus::Registering),
        "completed" => Ok(TxStatus::Completed),
        "failed" => Ok(TxStatus::Failed),
        "cancelled" => Ok(TxStatus::Cancelled),
        other => Err(format!("unknown tx status: {other}")),
    }
}

fn tx_type_to_str(tx_type: TxType) -> &'static str {
    match tx_type {
        TxType::Simple => "simple",
        TxType::Split => "split",
        TxType::AtomicSwap => "atomic_swap",
    }
}

fn tx_type_from_str(s: &str) -> Result<TxType, String> {
    match s {
        "simple" => Ok(TxType::Simple),
        "split" => Ok(TxType::Split),
        "atomic_swap" => Ok(TxType::AtomicSwap),
        other => Err(format!("unknown tx type: {other}")),
    }
}

fn reason_to_str(reason: FailureReason) -> &'static str {
    match reason {
        FailureReason::NoInputs => "no_inputs",
        FailureReason::TransactionExpired => "transaction_expired",
        FailureReason::InvalidPeerSignature => "invalid_peer_signature",
        FailureReason::FailedToRegister => "failed_to_register",
        FailureReason::InvalidKernelProof => "invalid_kernel_proof",
        FailureReason::Cancelled => "cancelled",
        FailureReason::SwapSecondChainFailure => "swap_second_chain_failure",
        FailureReason::Unknown => "unknown",
    }
}

fn reason_from_str(s: &str) -> Result<FailureReason, String> {
    match s {
        "no_inputs" => Ok(FailureReason::NoInputs),
        "transaction_expired" => Ok(FailureReason::TransactionExpired),
        "invalid_peer_signature" => Ok(FailureReason::InvalidPeerSignature),
        "failed_to_register" => Ok(FailureReason::FailedToRegister),
        "invalid_kernel_proof" => Ok(FailureReason::InvalidKernelProof),
        "cancelled" => Ok(FailureReason::Cancelled),
        "swap_second_chain_failure" => Ok(FailureReason::SwapSecondChainFailure),
        "unknown" => Ok(FailureReason::Unknown),
        other => Err(format!("unknown failure reason: {other}")),
    }
}

fn key_type_to_str(key_type: KeyType) -> &'static str {
    match key_type {
        KeyType::Regular => "regular",
        KeyType::Change => "change",
        KeyType::Coinbase => "coinbase",
        KeyType::Shared => "shared",
    }
}

fn key_type_from_str(s: &str) -> Result<KeyType, String> {
    match s {
        "regular" => Ok(KeyType::Regular),
        "change" => Ok(KeyType::Change),
        "coinbase" => Ok(KeyType::Coinbase),
        "shared" => Ok(KeyType::Shared),
        other => Err(format!("unknown key type: {other}")),
    }
}

fn coin_status_to_str(status: CoinStatus) -> &'static str {
    match status {
        CoinStatus::Available => "available",
        CoinStatus::Maturing => "maturing",
        CoinStatus::Outgoing => "outgoing",
        CoinStatus::Spent => "spent",
    }
}

fn coin_status_from_str(s: &str) -> Result<CoinStatus, String> {
    match s {
        "available" => Ok(CoinStatus::Available),
        "maturing" => Ok(CoinStatus::Maturing),
        "outgoing" => Ok(CoinStatus::Outgoing),
        "spent" => Ok(CoinStatus::Spent),
        other => Err(format!("unknown coin status: {other}")),
    }
}

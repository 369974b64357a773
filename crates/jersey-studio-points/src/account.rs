/// Account and transaction types.
///
/// Rows exchanged with an `AccountStore` are JSON objects shaped like the
/// hosted database tables (`AccountRecord`, `TransactionRecord`). They are
/// validated into `PointsAccount` / `PointsTransaction` at the boundary;
/// anything that does not fit is reported as `LedgerError::MalformedRecord`.
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::{LedgerError, StoreError};

/// Row layout version written by this crate.
pub const SCHEMA_VERSION: u32 = 1;

/// Largest balance or counter representable in a stored row.
pub const MAX_POINTS: u64 = i64::MAX as u64;

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

/// Kind of a logged balance change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Purchase,
    Usage,
    Refund,
    Bonus,
}

impl TransactionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TransactionKind::Purchase => "purchase",
            TransactionKind::Usage => "usage",
            TransactionKind::Refund => "refund",
            TransactionKind::Bonus => "bonus",
        }
    }

    /// Usage is the only kind that takes points away.
    pub fn is_debit(self) -> bool {
        self == TransactionKind::Usage
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "purchase" => Ok(TransactionKind::Purchase),
            "usage" => Ok(TransactionKind::Usage),
            "refund" => Ok(TransactionKind::Refund),
            "bonus" => Ok(TransactionKind::Bonus),
            other => Err(format!("unknown transaction type '{other}'")),
        }
    }
}

/// Account row as stored remotely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountRecord {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub id: String,
    pub points_balance: i64,
    pub total_points_purchased: i64,
    pub total_points_used: i64,
    #[serde(default)]
    pub last_points_update: Option<String>,
}

/// Transaction row as stored remotely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub id: String,
    pub user_id: String,
    pub transaction_type: String,
    pub points_amount: i64,
    #[serde(default)]
    pub description: String,
    pub created_at: String,
}

fn check_version(entity: &'static str, version: u32) -> Result<(), LedgerError> {
    if version == 0 || version > SCHEMA_VERSION {
        return Err(LedgerError::malformed(
            entity,
            format!("unsupported schema version {version}"),
        ));
    }
    Ok(())
}

fn non_negative(entity: &'static str, field: &str, value: i64) -> Result<u64, LedgerError> {
    u64::try_from(value)
        .map_err(|_| LedgerError::malformed(entity, format!("{field} is negative ({value})")))
}

fn parse_timestamp(entity: &'static str, raw: &str) -> Result<DateTime<Utc>, LedgerError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| LedgerError::malformed(entity, format!("bad timestamp '{raw}': {e}")))
}

fn format_timestamp(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn to_row_int(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn overflow(points: u64) -> LedgerError {
    LedgerError::InvalidAmount(format!("adding {points} points overflows the account"))
}

/// A user's points balance and lifetime counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PointsAccount {
    pub user_id: String,
    pub balance: u64,
    pub total_purchased: u64,
    pub total_used: u64,
    pub updated_at: Option<DateTime<Utc>>,
}

impl PointsAccount {
    /// Account for a new user holding the free trial grant.
    ///
    /// The grant counts as purchased so `balance = purchased - used` holds
    /// from the first row.
    pub fn trial(user_id: impl Into<String>, grant: u64) -> Self {
        Self {
            user_id: user_id.into(),
            balance: grant,
            total_purchased: grant,
            total_used: 0,
            updated_at: Some(Utc::now()),
        }
    }

    /// Validates a remote account row.
    ///
    /// # Errors
    ///
    /// Returns `MalformedRecord` if the row has missing or mistyped fields,
    /// an unknown schema version, negative counters, an unparseable
    /// timestamp, or a balance that disagrees with its counters.
    pub fn parse(row: Value) -> Result<Self, LedgerError> {
        let record: AccountRecord = serde_json::from_value(row)
            .map_err(|e| LedgerError::malformed("account", e.to_string()))?;
        check_version("account", record.schema_version)?;

        let balance = non_negative("account", "points_balance", record.points_balance)?;
        let total_purchased =
            non_negative("account", "total_points_purchased", record.total_points_purchased)?;
        let total_used = non_negative("account", "total_points_used", record.total_points_used)?;

        if total_purchased.checked_sub(total_used) != Some(balance) {
            return Err(LedgerError::malformed(
                "account",
                format!(
                    "balance {balance} does not match purchased {total_purchased} \
                     minus used {total_used}"
                ),
            ));
        }

        let updated_at = record
            .last_points_update
            .as_deref()
            .map(|raw| parse_timestamp("account", raw))
            .transpose()?;

        Ok(Self {
            user_id: record.id,
            balance,
            total_purchased,
            total_used,
            updated_at,
        })
    }

    pub fn to_record(&self) -> AccountRecord {
        AccountRecord {
            schema_version: SCHEMA_VERSION,
            id: self.user_id.clone(),
            points_balance: to_row_int(self.balance),
            total_points_purchased: to_row_int(self.total_purchased),
            total_points_used: to_row_int(self.total_used),
            last_points_update: self.updated_at.map(format_timestamp),
        }
    }

    /// JSON row for the account store.
    pub fn to_row(&self) -> Result<Value, LedgerError> {
        serde_json::to_value(self.to_record())
            .map_err(|e| LedgerError::malformed("account", e.to_string()))
    }

    /// Returns the account after a change of `points` of the given kind.
    ///
    /// `self` is left untouched, so a rejected change never shows up in
    /// the caller's mirror.
    ///
    /// # Errors
    ///
    /// - `InvalidAmount` for zero points, counters that would overflow a
    ///   stored row, or a refund larger than `total_used`.
    ///
    /// A refund is a credit: it raises the balance and `total_purchased`
    /// and leaves `total_used` alone, so usage never goes backwards.
    /// - `InsufficientPoints` for usage above the balance.
    pub fn apply(&self, kind: TransactionKind, points: u64) -> Result<PointsAccount, LedgerError> {
        if points == 0 {
            return Err(LedgerError::InvalidAmount(
                "points must be greater than zero".to_string(),
            ));
        }

        let mut next = self.clone();
        match kind {
            TransactionKind::Usage => {
                if self.balance < points {
                    return Err(LedgerError::InsufficientPoints {
                        needed: points,
                        available: self.balance,
                    });
                }
                next.balance -= points;
                next.total_used += points;
            }
            TransactionKind::Purchase | TransactionKind::Bonus => {
                let total_purchased = self
                    .total_purchased
                    .checked_add(points)
                    .filter(|t| *t <= MAX_POINTS)
                    .ok_or_else(|| overflow(points))?;
                next.total_purchased = total_purchased;
                next.balance += points;
            }
            TransactionKind::Refund => {
                if points > self.total_used {
                    return Err(LedgerError::InvalidAmount(format!(
                        "cannot refund {points} points, only {} were used",
                        self.total_used
                    )));
                }
                next.total_purchased = self
                    .total_purchased
                    .checked_add(points)
                    .filter(|t| *t <= MAX_POINTS)
                    .ok_or_else(|| overflow(points))?;
                next.balance += points;
            }
        }
        next.updated_at = Some(Utc::now());
        Ok(next)
    }
}

/// One entry of the append-only points log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PointsTransaction {
    pub id: String,
    pub user_id: String,
    pub kind: TransactionKind,
    /// Signed change; negative only for usage.
    pub amount: i64,
    pub description: String,
    pub occurred_at: DateTime<Utc>,
}

impl PointsTransaction {
    /// New log entry for a change of `points` (always given as a magnitude).
    pub fn new(
        user_id: impl Into<String>,
        kind: TransactionKind,
        points: u64,
        description: impl Into<String>,
    ) -> Self {
        let magnitude = to_row_int(points);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            kind,
            amount: if kind.is_debit() { -magnitude } else { magnitude },
            description: description.into(),
            occurred_at: Utc::now(),
        }
    }

    /// Validates a remote transaction row.
    ///
    /// # Errors
    ///
    /// Returns `MalformedRecord` for missing fields, an unknown type, an
    /// amount whose sign disagrees with the type, or a bad timestamp.
    pub fn parse(row: Value) -> Result<Self, LedgerError> {
        let record: TransactionRecord = serde_json::from_value(row)
            .map_err(|e| LedgerError::malformed("transaction", e.to_string()))?;
        check_version("transaction", record.schema_version)?;

        let kind: TransactionKind = record
            .transaction_type
            .parse()
            .map_err(|e: String| LedgerError::malformed("transaction", e))?;

        let sign_ok = if kind.is_debit() {
            record.points_amount < 0
        } else {
            record.points_amount > 0
        };
        if !sign_ok {
            return Err(LedgerError::malformed(
                "transaction",
                format!("{kind} amount {} has the wrong sign", record.points_amount),
            ));
        }

        Ok(Self {
            id: record.id,
            user_id: record.user_id,
            kind,
            amount: record.points_amount,
            description: record.description,
            occurred_at: parse_timestamp("transaction", &record.created_at)?,
        })
    }

    pub fn to_record(&self) -> TransactionRecord {
        TransactionRecord {
            schema_version: SCHEMA_VERSION,
            id: self.id.clone(),
            user_id: self.user_id.clone(),
            transaction_type: self.kind.as_str().to_string(),
            points_amount: self.amount,
            description: self.description.clone(),
            created_at: format_timestamp(self.occurred_at),
        }
    }

    /// JSON row for the account store.
    pub fn to_row(&self) -> Result<Value, LedgerError> {
        serde_json::to_value(self.to_record())
            .map_err(|e| LedgerError::malformed("transaction", e.to_string()))
    }
}

/// Conditional balance write sent to an `AccountStore`.
///
/// The store applies it only if the stored row still carries all three
/// `expected_*` counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountUpdate {
    pub user_id: String,
    pub expected_balance: i64,
    pub expected_total_purchased: i64,
    pub expected_total_used: i64,
    pub balance: i64,
    pub total_purchased: i64,
    pub total_used: i64,
    pub updated_at: String,
}

impl AccountUpdate {
    /// Update that moves the stored account from `before` to `after`.
    pub fn between(before: &PointsAccount, after: &PointsAccount) -> Self {
        Self {
            user_id: after.user_id.clone(),
            expected_balance: to_row_int(before.balance),
            expected_total_purchased: to_row_int(before.total_purchased),
            expected_total_used: to_row_int(before.total_used),
            balance: to_row_int(after.balance),
            total_purchased: to_row_int(after.total_purchased),
            total_used: to_row_int(after.total_used),
            updated_at: format_timestamp(after.updated_at.unwrap_or_else(Utc::now)),
        }
    }

    /// Fails with `Conflict` unless `row` still holds the counters this
    /// update was computed from.
    pub fn check_row(&self, row: &Value) -> Result<(), StoreError> {
        let counter = |field: &str| row.get(field).and_then(Value::as_i64);
        let actual = row_balance(row).unwrap_or_default();
        let unchanged = actual == self.expected_balance
            && counter("total_points_purchased") == Some(self.expected_total_purchased)
            && counter("total_points_used") == Some(self.expected_total_used);
        if unchanged {
            Ok(())
        } else {
            Err(StoreError::Conflict {
                expected: self.expected_balance,
                actual,
            })
        }
    }

    /// Writes the new counters into an account row in place.
    pub fn apply_to_row(&self, row: &mut Value) {
        if let Some(obj) = row.as_object_mut() {
            obj.insert("points_balance".into(), json!(self.balance));
            obj.insert("total_points_purchased".into(), json!(self.total_purchased));
            obj.insert("total_points_used".into(), json!(self.total_used));
            obj.insert("last_points_update".into(), json!(self.updated_at));
        }
    }
}

/// Stored balance of an account row, if it has one.
pub(crate) fn row_balance(row: &Value) -> Option<i64> {
    row.get("points_balance").and_then(Value::as_i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(balance: u64, purchased: u64, used: u64) -> PointsAccount {
        PointsAccount {
            user_id: "u1".to_string(),
            balance,
            total_purchased: purchased,
            total_used: used,
            updated_at: None,
        }
    }

    #[test]
    fn test_trial_account_keeps_invariant() {
        let acc = PointsAccount::trial("u1", 5);
        assert_eq!(acc.balance, 5);
        assert_eq!(acc.total_purchased, 5);
        assert_eq!(acc.total_used, 0);
    }

    #[test]
    fn test_apply_usage() {
        let acc = account(5, 5, 0);
        let next = acc.apply(TransactionKind::Usage, 4).unwrap();
        assert_eq!((next.balance, next.total_purchased, next.total_used), (1, 5, 4));

        let err = next.apply(TransactionKind::Usage, 4).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InsufficientPoints {
                needed: 4,
                available: 1
            }
        ));
    }

    #[test]
    fn test_apply_purchase_and_bonus() {
        let acc = account(1, 5, 4);
        let next = acc.apply(TransactionKind::Purchase, 700).unwrap();
        assert_eq!((next.balance, next.total_purchased), (701, 705));
        let next = next.apply(TransactionKind::Bonus, 200).unwrap();
        assert_eq!((next.balance, next.total_purchased), (901, 905));
    }

    #[test]
    fn test_apply_refund() {
        let acc = account(1, 5, 4);
        let next = acc.apply(TransactionKind::Refund, 3).unwrap();
        assert_eq!((next.balance, next.total_purchased, next.total_used), (4, 8, 4));
        assert!(matches!(
            next.apply(TransactionKind::Refund, 5),
            Err(LedgerError::InvalidAmount(_))
        ));
    }

    #[test]
    fn test_refund_never_lowers_total_used() {
        let acc = account(5, 5, 0);
        let spent = acc.apply(TransactionKind::Usage, 4).unwrap();
        let refunded = spent.apply(TransactionKind::Refund, 4).unwrap();
        assert_eq!(refunded.balance, 5);
        assert_eq!(refunded.total_used, 4);
        assert_eq!(refunded.total_purchased, 9);

        let parsed = PointsAccount::parse(refunded.to_row().unwrap()).unwrap();
        assert_eq!((parsed.balance, parsed.total_purchased, parsed.total_used), (5, 9, 4));
    }

    #[test]
    fn test_apply_rejects_zero_and_overflow() {
        let acc = account(0, 0, 0);
        assert!(matches!(
            acc.apply(TransactionKind::Purchase, 0),
            Err(LedgerError::InvalidAmount(_))
        ));
        assert!(matches!(
            acc.apply(TransactionKind::Purchase, MAX_POINTS + 1),
            Err(LedgerError::InvalidAmount(_))
        ));
        assert!(acc.apply(TransactionKind::Purchase, MAX_POINTS).is_ok());
    }

    #[test]
    fn test_account_row_round_trip() {
        let acc = PointsAccount::trial("user-42", 5);
        let parsed = PointsAccount::parse(acc.to_row().unwrap()).unwrap();
        assert_eq!(parsed.user_id, "user-42");
        assert_eq!(parsed.balance, 5);
        // Millisecond precision survives the row format
        assert_eq!(
            parsed.updated_at.map(|t| t.timestamp_millis()),
            acc.updated_at.map(|t| t.timestamp_millis())
        );
    }

    #[test]
    fn test_account_row_without_version_is_v1() {
        let row = json!({
            "id": "u1",
            "points_balance": 3,
            "total_points_purchased": 5,
            "total_points_used": 2,
        });
        let acc = PointsAccount::parse(row).unwrap();
        assert_eq!(acc.balance, 3);
        assert!(acc.updated_at.is_none());
    }

    #[test]
    fn test_malformed_account_rows() {
        let row = |balance: Value, purchased: i64, used: i64, extra: Value| {
            let mut row = json!({
                "id": "u1",
                "points_balance": balance,
                "total_points_purchased": purchased,
                "total_points_used": used,
            });
            if let (Some(obj), Some(extra)) = (row.as_object_mut(), extra.as_object()) {
                obj.extend(extra.clone());
            }
            row
        };
        let rows = [
            row(json!("5"), 5, 0, json!({})),
            row(json!(-1), 0, 1, json!({})),
            row(json!(9), 5, 0, json!({})),
            row(json!(0), 0, 0, json!({ "schema_version": 7 })),
            row(json!(0), 0, 0, json!({ "last_points_update": "yesterday" })),
            json!({ "points_balance": 0 }),
        ];
        for row in rows {
            let err = PointsAccount::parse(row.clone()).unwrap_err();
            assert!(
                matches!(err, LedgerError::MalformedRecord { entity: "account", .. }),
                "row {row} gave {err:?}"
            );
        }
    }

    #[test]
    fn test_transaction_sign_follows_kind() {
        let usage =
            PointsTransaction::new("u1", TransactionKind::Usage, 4, "Exported 1 full jersey");
        assert_eq!(usage.amount, -4);
        let purchase =
            PointsTransaction::new("u1", TransactionKind::Purchase, 700, "basic package");
        assert_eq!(purchase.amount, 700);
        assert_ne!(usage.id, purchase.id);
    }

    #[test]
    fn test_transaction_row_round_trip() {
        let tx = PointsTransaction::new("u1", TransactionKind::Refund, 2, "Export failed");
        let parsed = PointsTransaction::parse(tx.to_row().unwrap()).unwrap();
        assert_eq!(parsed.id, tx.id);
        assert_eq!(parsed.kind, TransactionKind::Refund);
        assert_eq!(parsed.amount, 2);
        assert_eq!(parsed.description, "Export failed");
    }

    #[test]
    fn test_malformed_transaction_rows() {
        let base = |kind: &str, amount: i64| {
            json!({
                "id": "t1",
                "user_id": "u1",
                "transaction_type": kind,
                "points_amount": amount,
                "description": "",
                "created_at": "2026-01-01T00:00:00.000Z",
            })
        };
        assert!(PointsTransaction::parse(base("usage", -1)).is_ok());
        for row in [
            base("gift", 5),
            base("usage", 4),
            base("purchase", -4),
            base("bonus", 0),
        ] {
            assert!(matches!(
                PointsTransaction::parse(row),
                Err(LedgerError::MalformedRecord {
                    entity: "transaction",
                    ..
                })
            ));
        }
    }

    #[test]
    fn test_update_between_accounts() {
        let before = account(5, 5, 0);
        let after = before.apply(TransactionKind::Usage, 2).unwrap();
        let update = AccountUpdate::between(&before, &after);
        assert_eq!(update.expected_balance, 5);
        assert_eq!(update.expected_total_used, 0);
        assert_eq!(update.balance, 3);
        assert_eq!(update.total_used, 2);

        let mut row = before.to_row().unwrap();
        update.check_row(&row).unwrap();
        update.apply_to_row(&mut row);
        assert_eq!(row_balance(&row), Some(3));
        let parsed = PointsAccount::parse(row).unwrap();
        assert_eq!(parsed.total_used, 2);
    }

    #[test]
    fn test_check_row_compares_every_counter() {
        let before = account(5, 5, 0);
        let after = before.apply(TransactionKind::Usage, 1).unwrap();
        let update = AccountUpdate::between(&before, &after);

        // Same balance, but another session spent 4 and bought 4 meanwhile
        let moved = account(5, 9, 4).to_row().unwrap();
        let err = update.check_row(&moved).unwrap_err();
        assert!(matches!(err, StoreError::Conflict { expected: 5, actual: 5 }));

        let moved = account(3, 5, 2).to_row().unwrap();
        let err = update.check_row(&moved).unwrap_err();
        assert!(matches!(err, StoreError::Conflict { expected: 5, actual: 3 }));

        assert!(update.check_row(&before.to_row().unwrap()).is_ok());
    }

    #[test]
    fn test_kind_parse() {
        assert_eq!("bonus".parse::<TransactionKind>(), Ok(TransactionKind::Bonus));
        assert!("Bonus".parse::<TransactionKind>().is_err());
    }
}

use crate::report::{CategoryTotal, DateTotal, MonthRange, MonthlyReport, UserTotal};
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::schema::seed_defaults;

/// Which ledger table an entry lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Expense,
    Income,
}

impl EntryKind {
    fn table(&self) -> &'static str {
        match self {
            EntryKind::Expense => "expenses",
            EntryKind::Income => "incomes",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            EntryKind::Expense => "Expense",
            EntryKind::Income => "Income",
        }
    }
}

/// A stored expense or income row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedgerEntry {
    pub id: i64,
    pub date: String,
    pub category: String,
    pub amount: f64,
    pub currency: String,
    pub user: String,
}

/// Validated field values for inserting or replacing an entry
#[derive(Debug, Clone, PartialEq)]
pub struct EntryDraft {
    pub date: String,
    pub category: String,
    pub amount: f64,
    pub currency: String,
    pub user: String,
}

/// Category row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryInfo {
    pub id: i64,
    pub name: String,
}

/// Outcome of renaming a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserRename {
    Renamed { expenses: usize, incomes: usize },
    NotFound,
    NameTaken,
}

/// Outcome of deleting a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserRemoval {
    Removed,
    NotFound,
    /// Number of expenses still naming the user.
    InUse(usize),
}

/// Expense count and sum for one user in one currency.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserSpending {
    pub user: String,
    pub currency: String,
    pub count: usize,
    pub total: f64,
}

/// Row counts and totals for the admin dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct LedgerStats {
    pub expense_count: usize,
    pub income_count: usize,
    pub user_count: usize,
    pub category_count: usize,
    pub currency_totals: BTreeMap<String, f64>,
    pub user_stats: Vec<UserSpending>,
}

/// Repository over the ledger tables
#[derive(Clone)]
pub struct LedgerRepo {
    conn: Arc<Mutex<Connection>>,
}

fn entry_from_row(row: &Row<'_>) -> Result<LedgerEntry, rusqlite::Error> {
    Ok(LedgerEntry {
        id: row.get(0)?,
        date: row.get(1)?,
        category: row.get(2)?,
        amount: row.get(3)?,
        currency: row.get(4)?,
        user: row.get(5)?,
    })
}

impl LedgerRepo {
    /// Create a new LedgerRepo with the given connection
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ===== Expense / income operations =====

    /// Insert an entry and return its new ID
    pub fn insert_entry(&self, kind: EntryKind, draft: &EntryDraft) -> Result<i64, rusqlite::Error> {
        let conn = self.conn();
        conn.execute(
            &format!(
                "INSERT INTO {} (date, category, amount, currency, user) VALUES (?, ?, ?, ?, ?)",
                kind.table()
            ),
            params![
                draft.date,
                draft.category,
                draft.amount,
                draft.currency,
                draft.user
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// List entries, newest date first
    pub fn list_entries(&self, kind: EntryKind) -> Result<Vec<LedgerEntry>, rusqlite::Error> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT id, date, category, amount, currency, user FROM {} ORDER BY date DESC, id DESC",
            kind.table()
        ))?;
        let entries = stmt
            .query_map([], entry_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    pub fn get_entry(
        &self,
        kind: EntryKind,
        id: i64,
    ) -> Result<Option<LedgerEntry>, rusqlite::Error> {
        let conn = self.conn();
        conn.query_row(
            &format!(
                "SELECT id, date, category, amount, currency, user FROM {} WHERE id = ?",
                kind.table()
            ),
            [id],
            entry_from_row,
        )
        .optional()
    }

    /// Replace every field of an entry. Returns false if the ID is unknown.
    pub fn update_entry(
        &self,
        kind: EntryKind,
        id: i64,
        draft: &EntryDraft,
    ) -> Result<bool, rusqlite::Error> {
        let conn = self.conn();
        let changed = conn.execute(
            &format!(
                "UPDATE {} SET date = ?, category = ?, amount = ?, currency = ?, user = ? WHERE id = ?",
                kind.table()
            ),
            params![
                draft.date,
                draft.category,
                draft.amount,
                draft.currency,
                draft.user,
                id
            ],
        )?;
        Ok(changed > 0)
    }

    /// Delete an entry. Returns false if the ID is unknown.
    pub fn delete_entry(&self, kind: EntryKind, id: i64) -> Result<bool, rusqlite::Error> {
        let conn = self.conn();
        let changed = conn.execute(
            &format!("DELETE FROM {} WHERE id = ?", kind.table()),
            [id],
        )?;
        Ok(changed > 0)
    }

    // ===== Category operations =====

    pub fn list_categories(&self) -> Result<Vec<CategoryInfo>, rusqlite::Error> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT id, name FROM categories ORDER BY name")?;
        let categories = stmt
            .query_map([], |row| {
                Ok(CategoryInfo {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(categories)
    }

    /// Create a category. Returns `None` if the name is already taken.
    pub fn create_category(&self, name: &str) -> Result<Option<i64>, rusqlite::Error> {
        let conn = self.conn();
        let inserted = conn.execute("INSERT OR IGNORE INTO categories (name) VALUES (?)", [name])?;
        if inserted == 0 {
            return Ok(None);
        }
        Ok(Some(conn.last_insert_rowid()))
    }

    pub fn delete_category(&self, id: i64) -> Result<bool, rusqlite::Error> {
        let conn = self.conn();
        let changed = conn.execute("DELETE FROM categories WHERE id = ?", [id])?;
        Ok(changed > 0)
    }

    // ===== User operations =====

    /// User names in creation order
    pub fn list_users(&self) -> Result<Vec<String>, rusqlite::Error> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT name FROM users ORDER BY id")?;
        let users = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(users)
    }

    /// Create a user. Returns `None` if the name is already taken.
    pub fn create_user(&self, name: &str) -> Result<Option<i64>, rusqlite::Error> {
        let conn = self.conn();
        let inserted = conn.execute("INSERT OR IGNORE INTO users (name) VALUES (?)", [name])?;
        if inserted == 0 {
            return Ok(None);
        }
        Ok(Some(conn.last_insert_rowid()))
    }

    /// Rename a user and rewrite the name on every expense and income row.
    pub fn rename_user(&self, old_name: &str, new_name: &str) -> Result<UserRename, rusqlite::Error> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let user_id: Option<i64> = tx
            .query_row("SELECT id FROM users WHERE name = ?", [old_name], |row| {
                row.get(0)
            })
            .optional()?;
        let Some(user_id) = user_id else {
            return Ok(UserRename::NotFound);
        };

        if old_name != new_name {
            let taken: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM users WHERE name = ?)",
                [new_name],
                |row| row.get::<_, i64>(0),
            )? != 0;
            if taken {
                return Ok(UserRename::NameTaken);
            }
        }

        tx.execute(
            "UPDATE users SET name = ? WHERE id = ?",
            params![new_name, user_id],
        )?;
        let expenses = tx.execute(
            "UPDATE expenses SET user = ? WHERE user = ?",
            params![new_name, old_name],
        )?;
        let incomes = tx.execute(
            "UPDATE incomes SET user = ? WHERE user = ?",
            params![new_name, old_name],
        )?;
        tx.commit()?;

        Ok(UserRename::Renamed { expenses, incomes })
    }

    /// Delete a user unless any expense still names them.
    pub fn delete_user(&self, name: &str) -> Result<UserRemoval, rusqlite::Error> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let in_use: i64 = tx.query_row(
            "SELECT COUNT(*) FROM expenses WHERE user = ?",
            [name],
            |row| row.get(0),
        )?;
        if in_use > 0 {
            return Ok(UserRemoval::InUse(in_use as usize));
        }

        let removed = tx.execute("DELETE FROM users WHERE name = ?", [name])?;
        tx.commit()?;

        if removed == 0 {
            Ok(UserRemoval::NotFound)
        } else {
            Ok(UserRemoval::Removed)
        }
    }

    // ===== Reporting =====

    /// Sum expenses in `range` by category, user and date, per currency.
    pub fn monthly_report(&self, range: &MonthRange) -> Result<MonthlyReport, rusqlite::Error> {
        let conn = self.conn();
        let start = range.start_key();
        let end = range.end_key();

        let mut stmt = conn.prepare(
            "SELECT category, currency, SUM(amount) FROM expenses
             WHERE date >= ? AND date < ?
             GROUP BY category, currency ORDER BY category, currency",
        )?;
        let by_category = stmt
            .query_map(params![start, end], |row| {
                Ok(CategoryTotal {
                    category: row.get(0)?,
                    currency: row.get(1)?,
                    total: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut stmt = conn.prepare(
            "SELECT user, currency, SUM(amount) FROM expenses
             WHERE date >= ? AND date < ?
             GROUP BY user, currency ORDER BY user, currency",
        )?;
        let by_user = stmt
            .query_map(params![start, end], |row| {
                Ok(UserTotal {
                    user: row.get(0)?,
                    currency: row.get(1)?,
                    total: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut stmt = conn.prepare(
            "SELECT date, currency, SUM(amount) FROM expenses
             WHERE date >= ? AND date < ?
             GROUP BY date, currency ORDER BY date, currency",
        )?;
        let by_date = stmt
            .query_map(params![start, end], |row| {
                Ok(DateTotal {
                    date: row.get(0)?,
                    currency: row.get(1)?,
                    total: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(MonthlyReport {
            year: range.year(),
            month: range.month(),
            start,
            end,
            by_category,
            by_user,
            by_date,
        })
    }

    pub fn ledger_stats(&self) -> Result<LedgerStats, rusqlite::Error> {
        let conn = self.conn();
        let count = |table: &str| -> Result<usize, rusqlite::Error> {
            conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                row.get::<_, i64>(0)
            })
            .map(|n| n as usize)
        };
        let expense_count = count("expenses")?;
        let income_count = count("incomes")?;
        let user_count = count("users")?;
        let category_count = count("categories")?;

        let mut stmt =
            conn.prepare("SELECT currency, SUM(amount) FROM expenses GROUP BY currency")?;
        let currency_totals = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?)))?
            .collect::<Result<BTreeMap<_, _>, _>>()?;

        let mut stmt = conn.prepare(
            "SELECT user, currency, COUNT(*), SUM(amount) FROM expenses
             GROUP BY user, currency ORDER BY user, currency",
        )?;
        let user_stats = stmt
            .query_map([], |row| {
                Ok(UserSpending {
                    user: row.get(0)?,
                    currency: row.get(1)?,
                    count: row.get::<_, i64>(2)? as usize,
                    total: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(LedgerStats {
            expense_count,
            income_count,
            user_count,
            category_count,
            currency_totals,
            user_stats,
        })
    }

    // ===== Maintenance =====

    /// Delete every row and restore the default categories and users.
    pub fn reset_data(&self) -> Result<(), rusqlite::Error> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        tx.execute_batch(
            "DELETE FROM expenses;
             DELETE FROM incomes;
             DELETE FROM categories;
             DELETE FROM users;
             DELETE FROM sqlite_sequence
                WHERE name IN ('expenses', 'incomes', 'categories', 'users');",
        )?;
        seed_defaults(&tx)?;
        tx.commit()
    }
}

use rusqlite::Connection;

/// Categories inserted on startup and after a full reset.
pub const DEFAULT_CATEGORIES: &[&str] = &[
    "Food",
    "Transport",
    "Housing",
    "Utilities",
    "Health",
    "Education",
    "Entertainment",
    "Other",
];

/// Household members inserted on startup and after a full reset.
pub const DEFAULT_USERS: &[&str] = &["Dad", "Mom", "Kid1", "Kid2"];

/// SQL schema for the ledger tables
const SCHEMA: &str = r#"
-- Expenses (category and user are plain names, not foreign keys)
CREATE TABLE IF NOT EXISTS expenses (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    date TEXT NOT NULL,
    category TEXT NOT NULL,
    amount REAL NOT NULL,
    currency TEXT NOT NULL,
    user TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_expenses_date ON expenses(date);
CREATE INDEX IF NOT EXISTS idx_expenses_user ON expenses(user);

-- Incomes, same shape as expenses
CREATE TABLE IF NOT EXISTS incomes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    date TEXT NOT NULL,
    category TEXT NOT NULL,
    amount REAL NOT NULL,
    currency TEXT NOT NULL,
    user TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_incomes_date ON incomes(date);
CREATE INDEX IF NOT EXISTS idx_incomes_user ON incomes(user);

CREATE TABLE IF NOT EXISTS categories (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT UNIQUE NOT NULL
);

CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT UNIQUE NOT NULL
);
"#;

pub fn init_database(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA)?;
    seed_defaults(conn)?;
    Ok(())
}

/// Insert the default categories and users that are not present yet.
pub fn seed_defaults(conn: &Connection) -> Result<(), rusqlite::Error> {
    let mut insert_category = conn.prepare("INSERT OR IGNORE INTO categories (name) VALUES (?)")?;
    for name in DEFAULT_CATEGORIES {
        insert_category.execute([name])?;
    }

    let mut insert_user = conn.prepare("INSERT OR IGNORE INTO users (name) VALUES (?)")?;
    for name in DEFAULT_USERS {
        insert_user.execute([name])?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count(conn: &Connection, table: &str) -> i64 {
        conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
            row.get(0)
        })
        .unwrap()
    }

    #[test]
    fn test_init_database() {
        let conn = Connection::open_in_memory().unwrap();
        init_database(&conn).unwrap();

        for table in ["expenses", "incomes", "categories", "users"] {
            let exists = conn
                .query_row(
                    "SELECT 1 FROM sqlite_master WHERE type='table' AND name=?",
                    [table],
                    |_| Ok(()),
                )
                .is_ok();
            assert!(exists, "{table} table should exist");
        }

        assert_eq!(count(&conn, "categories"), DEFAULT_CATEGORIES.len() as i64);
        assert_eq!(count(&conn, "users"), DEFAULT_USERS.len() as i64);
    }

    #[test]
    fn test_init_is_idempotent_and_keeps_custom_rows() {
        let conn = Connection::open_in_memory().unwrap();
        init_database(&conn).unwrap();
        conn.execute("INSERT INTO categories (name) VALUES ('Pets')", [])
            .unwrap();

        init_database(&conn).unwrap();

        assert_eq!(
            count(&conn, "categories"),
            DEFAULT_CATEGORIES.len() as i64 + 1
        );
        assert_eq!(count(&conn, "users"), DEFAULT_USERS.len() as i64);
    }

    #[test]
    fn test_upgrades_expenses_only_database() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE expenses (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                date TEXT,
                category TEXT,
                amount REAL,
                currency TEXT,
                user TEXT
            );
            INSERT INTO expenses (date, category, amount, currency, user)
                VALUES ('2024-01-05', 'Food', 12.5, 'EUR', 'Dad');
            "#,
        )
        .unwrap();

        init_database(&conn).unwrap();

        assert_eq!(count(&conn, "expenses"), 1);
        assert_eq!(count(&conn, "incomes"), 0);
        assert_eq!(count(&conn, "users"), DEFAULT_USERS.len() as i64);
    }
}

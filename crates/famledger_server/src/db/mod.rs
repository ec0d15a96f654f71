mod repo;
mod schema;

pub use repo::{
    CategoryInfo, EntryDraft, EntryKind, LedgerEntry, LedgerRepo, LedgerStats, UserRemoval,
    UserRename, UserSpending,
};
pub use schema::{DEFAULT_CATEGORIES, DEFAULT_USERS, init_database, seed_defaults};

mod database;
mod fs_utils;
mod layout;
mod registry;
mod transactions;
mod types;

pub use database::{SchemaDatabase, SchemaStorage, TransactionScope};
pub use layout::{default_user_prefix, StoreLayout};
pub use registry::{FilePluginRegistry, PluginRegistry};
pub use transactions::{
    append_transaction_journal_entry, clear_active_transaction, current_unix_timestamp,
    execute_with_transaction, read_active_transaction, read_transaction_journal,
    read_transaction_metadata, set_active_transaction, update_transaction_status,
    write_transaction_metadata,
};
pub use types::{TransactionJournalEntry, TransactionMetadata, TransactionStatus};

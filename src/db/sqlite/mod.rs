mod intentions;

pub use intentions::SqliteIntentionRepo;
